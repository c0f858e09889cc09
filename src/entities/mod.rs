pub mod audit_log;
pub mod check_in;
pub mod commission;
pub mod payment;
pub mod payout;
pub mod payout_request;
pub mod system_setting;
pub mod user;
pub mod wallet;
pub mod wallet_transaction;
pub mod work_order;

pub use audit_log::Entity as AuditLog;
pub use check_in::Entity as CheckIn;
pub use commission::Entity as Commission;
pub use payment::Entity as Payment;
pub use payout::Entity as Payout;
pub use payout_request::Entity as PayoutRequest;
pub use system_setting::Entity as SystemSetting;
pub use user::Entity as User;
pub use wallet::Entity as Wallet;
pub use wallet_transaction::Entity as WalletTransaction;
pub use work_order::Entity as WorkOrder;
