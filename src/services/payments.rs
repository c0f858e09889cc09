use metrics::counter;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

use crate::{
    clock::SharedClock,
    entities::{
        payment::{self, Entity as Payment, PaymentStatus},
        work_order::WorkOrderStatus,
    },
    errors::ServiceError,
    money::round2,
    notifications::{NotificationType, Notifier},
    repositories::{AuditLogRepository, WorkOrderRepository},
    services::{
        compensation::{CompensationLedger, ReviewDecision, VerificationOutcome, WalletSummary},
        Actor,
    },
};

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct SubmitPaymentInput {
    pub amount: Decimal,
    #[validate(length(min = 1, max = 32))]
    pub method: String,
    #[validate(length(max = 128))]
    pub reference: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct VerifyPaymentInput {
    pub decision: ReviewDecision,
    #[validate(length(max = 500))]
    pub reason: Option<String>,
}

/// An approved payment together with the commission it produced and the
/// technician's earnings after the credit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaymentVerification {
    pub payment: payment::Model,
    #[serde(flatten)]
    pub outcome: VerificationOutcome,
    pub earnings: WalletSummary,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "result", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentReview {
    Verified(PaymentVerification),
    Rejected(payment::Model),
}

/// Customer payments collected by technicians, and their review.
#[derive(Clone)]
pub struct PaymentService {
    db: Arc<DatabaseConnection>,
    ledger: CompensationLedger,
    notifier: Notifier,
    clock: SharedClock,
}

impl PaymentService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        ledger: CompensationLedger,
        notifier: Notifier,
        clock: SharedClock,
    ) -> Self {
        Self {
            db,
            ledger,
            notifier,
            clock,
        }
    }

    /// Records a payment collected for a completed work order.
    #[instrument(skip(self, input))]
    pub async fn submit_payment(
        &self,
        actor: &Actor,
        work_order_id: i32,
        input: SubmitPaymentInput,
    ) -> Result<payment::Model, ServiceError> {
        input.validate()?;
        let amount = round2(input.amount);
        if amount <= Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "payment amount must be greater than zero".to_string(),
            ));
        }

        let txn = self.db.begin().await?;
        let work_order = WorkOrderRepository::load(&txn, work_order_id).await?;
        if !work_order.is_assigned_to(actor.id) {
            return Err(ServiceError::NotAssignedToYou(work_order_id));
        }
        if work_order.status != WorkOrderStatus::CompletedPendingPayment {
            return Err(ServiceError::InvalidTransition {
                work_order_id,
                from: work_order.status,
                action: "submit payment for",
            });
        }

        let pending = Payment::find()
            .filter(payment::Column::WorkOrderId.eq(work_order_id))
            .filter(payment::Column::Status.eq(PaymentStatus::PendingVerification))
            .count(&txn)
            .await?;
        if pending > 0 {
            return Err(ServiceError::Conflict(format!(
                "work order {} already has a payment awaiting verification",
                work_order_id
            )));
        }

        let payment = payment::ActiveModel {
            id: Set(Uuid::new_v4()),
            work_order_id: Set(work_order_id),
            technician_id: Set(actor.id),
            amount: Set(amount),
            method: Set(input.method),
            reference: Set(input.reference),
            status: Set(PaymentStatus::PendingVerification),
            reviewed_by: Set(None),
            reviewed_at: Set(None),
            rejection_reason: Set(None),
            created_at: Set(self.clock.now()),
        }
        .insert(&txn)
        .await?;
        txn.commit().await?;

        counter!("fieldops.payments.submitted", 1);
        info!(payment_id = %payment.id, work_order_id, amount = %amount, "payment submitted");
        Ok(payment)
    }

    /// Approves a payment into the ledger, or rejects it back to the technician.
    #[instrument(skip(self, input))]
    pub async fn verify_payment(
        &self,
        actor: &Actor,
        payment_id: Uuid,
        input: VerifyPaymentInput,
    ) -> Result<PaymentReview, ServiceError> {
        actor.require_staff("verify payments")?;
        input.validate()?;

        match input.decision {
            ReviewDecision::Approve => {
                let outcome = self
                    .ledger
                    .on_payment_verified(payment_id, actor.recorded_id())
                    .await?;
                let payment = Payment::find_by_id(payment_id)
                    .one(&*self.db)
                    .await?
                    .ok_or_else(|| ServiceError::not_found("Payment", payment_id))?;
                let earnings = self
                    .ledger
                    .wallet_summary(actor, payment.technician_id)
                    .await?;
                Ok(PaymentReview::Verified(PaymentVerification {
                    payment,
                    outcome,
                    earnings,
                }))
            }
            ReviewDecision::Reject => {
                let rejected = self.reject(actor, payment_id, input.reason).await?;
                Ok(PaymentReview::Rejected(rejected))
            }
        }
    }

    async fn reject(
        &self,
        actor: &Actor,
        payment_id: Uuid,
        reason: Option<String>,
    ) -> Result<payment::Model, ServiceError> {
        let now = self.clock.now();
        let txn = self.db.begin().await?;
        let payment = Payment::find_by_id(payment_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::not_found("Payment", payment_id))?;
        if payment.status != PaymentStatus::PendingVerification {
            return Err(ServiceError::Conflict(format!(
                "payment {} is not pending verification",
                payment_id
            )));
        }

        let mut active: payment::ActiveModel = payment.into();
        active.status = Set(PaymentStatus::Rejected);
        active.reviewed_by = Set(actor.recorded_id());
        active.reviewed_at = Set(Some(now));
        active.rejection_reason = Set(reason.clone());
        let rejected = active.update(&txn).await?;

        AuditLogRepository::record(
            &txn,
            "payment",
            payment_id,
            "payment_rejected",
            actor.recorded_id(),
            json!({ "work_order_id": rejected.work_order_id, "reason": reason }),
        )
        .await?;
        txn.commit().await?;

        counter!("fieldops.payments.rejected", 1);
        info!(%payment_id, work_order_id = rejected.work_order_id, "payment rejected");
        self.notifier.send(
            rejected.technician_id,
            NotificationType::PaymentRejected,
            "Payment rejected",
            match &rejected.rejection_reason {
                Some(reason) => format!("Your payment submission was rejected: {}", reason),
                None => "Your payment submission was rejected".to_string(),
            },
            json!({ "payment_id": payment_id, "work_order_id": rejected.work_order_id }),
        );
        Ok(rejected)
    }
}
