pub mod audit_log_repository;
pub mod work_order_repository;

pub use audit_log_repository::AuditLogRepository;
pub use work_order_repository::WorkOrderRepository;
