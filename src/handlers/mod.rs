pub mod common;
pub mod deadlines;
pub mod health;
pub mod payments;
pub mod payouts;
pub mod rates;
pub mod wallets;
pub mod work_orders;

use axum::Router;
use sea_orm::DatabaseConnection;
use std::sync::Arc;

use crate::{
    clock::SharedClock,
    config::AppConfig,
    notifications::Notifier,
    services::{
        commission_rates::CommissionRateService,
        compensation::CompensationLedger,
        payments::PaymentService,
        payout_batches::PayoutBatchProcessor,
        response_deadlines::{DeadlineSettings, ResponseDeadlineScheduler},
        work_orders::WorkOrderStateMachine,
    },
};

pub use crate::AppState;

/// Services layer used by HTTP handlers and background loops
#[derive(Clone)]
pub struct AppServices {
    pub work_orders: Arc<WorkOrderStateMachine>,
    pub deadlines: Arc<ResponseDeadlineScheduler>,
    pub payments: Arc<PaymentService>,
    pub ledger: Arc<CompensationLedger>,
    pub payouts: Arc<PayoutBatchProcessor>,
}

impl AppServices {
    pub fn new(
        db: Arc<DatabaseConnection>,
        config: &AppConfig,
        clock: SharedClock,
        notifier: Notifier,
    ) -> Self {
        let deadlines = ResponseDeadlineScheduler::new(
            db.clone(),
            clock.clone(),
            notifier.clone(),
            DeadlineSettings::from(&config.dispatch),
        );
        let rates = CommissionRateService::new(db.clone(), config.compensation.clone(), clock.clone());
        let ledger = CompensationLedger::new(db.clone(), rates, notifier.clone(), clock.clone());
        let payments = PaymentService::new(db.clone(), ledger.clone(), notifier.clone(), clock.clone());
        let payouts = PayoutBatchProcessor::new(ledger.clone());
        let work_orders = WorkOrderStateMachine::new(db, deadlines.clone(), notifier, clock);

        Self {
            work_orders: Arc::new(work_orders),
            deadlines,
            payments: Arc::new(payments),
            ledger: Arc::new(ledger),
            payouts: Arc::new(payouts),
        }
    }
}

/// Every route under `/api/v1`.
pub fn api_v1_routes() -> Router<AppState> {
    Router::new()
        .merge(work_orders::work_orders_router())
        .nest("/wallets", wallets::wallets_router())
        .merge(deadlines::deadlines_router())
        .merge(payments::payments_router())
        .merge(payouts::payouts_router())
        .merge(rates::rates_router())
}
