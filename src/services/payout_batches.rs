use rust_decimal::Decimal;
use serde::Serialize;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::{
    entities::payout,
    errors::ServiceError,
    money::sum_rounded,
    services::{compensation::CompensationLedger, Actor},
};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PayoutFailure {
    pub payout_id: Uuid,
    pub technician_id: Uuid,
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WeeklyCycleReport {
    pub scheduled: usize,
    pub completed: Vec<payout::Model>,
    pub failed: Vec<PayoutFailure>,
    pub total_paid: Decimal,
}

/// Drives weekly settlement on top of the ledger's batch operations.
#[derive(Clone)]
pub struct PayoutBatchProcessor {
    ledger: CompensationLedger,
}

impl PayoutBatchProcessor {
    pub fn new(ledger: CompensationLedger) -> Self {
        Self { ledger }
    }

    /// Creates this week's batch and settles every payout in it. A payout
    /// that fails stays SCHEDULED and is reported; the rest still settle.
    #[instrument(skip(self))]
    pub async fn run_weekly_cycle(&self, actor: &Actor) -> Result<WeeklyCycleReport, ServiceError> {
        let scheduled = self.ledger.create_weekly_batch(actor).await?;
        let mut report = WeeklyCycleReport {
            scheduled: scheduled.len(),
            ..Default::default()
        };

        for payout in scheduled {
            match self.ledger.process_payout(actor, payout.id, None).await {
                Ok(completed) => report.completed.push(completed),
                Err(e) => {
                    error!(
                        payout_id = %payout.id,
                        technician_id = %payout.technician_id,
                        error = %e,
                        "weekly payout failed"
                    );
                    report.failed.push(PayoutFailure {
                        payout_id: payout.id,
                        technician_id: payout.technician_id,
                        code: e.code(),
                        message: e.response_message(),
                    });
                }
            }
        }

        report.total_paid = sum_rounded(report.completed.iter().map(|p| p.total_amount));
        info!(
            scheduled = report.scheduled,
            completed = report.completed.len(),
            failed = report.failed.len(),
            total_paid = %report.total_paid,
            "weekly payout cycle finished"
        );
        Ok(report)
    }

    pub async fn process_batch(
        &self,
        actor: &Actor,
        payout_id: Uuid,
    ) -> Result<payout::Model, ServiceError> {
        self.ledger.process_payout(actor, payout_id, None).await
    }

    /// Settles a SCHEDULED payout that was paid outside the system.
    pub async fn mark_batch_paid(
        &self,
        actor: &Actor,
        payout_id: Uuid,
        payment_reference: String,
    ) -> Result<payout::Model, ServiceError> {
        let reference = required_reference(payment_reference)?;
        self.ledger
            .process_payout(actor, payout_id, Some(reference))
            .await
    }

    /// Pays out everything a technician has earned, without a prior batch.
    pub async fn mark_technician_paid(
        &self,
        actor: &Actor,
        technician_id: Uuid,
        payment_reference: String,
    ) -> Result<payout::Model, ServiceError> {
        let reference = required_reference(payment_reference)?;
        self.ledger
            .settle_technician(actor, technician_id, reference)
            .await
    }

    /// Runs the weekly cycle every `interval` as the system actor.
    pub fn spawn_weekly_cycle(self, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // The first tick completes immediately; wait a full interval.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if let Err(e) = self.run_weekly_cycle(&Actor::system()).await {
                    warn!(error = %e, "weekly payout cycle failed");
                }
            }
        })
    }
}

fn required_reference(reference: String) -> Result<String, ServiceError> {
    let trimmed = reference.trim();
    if trimmed.is_empty() {
        return Err(ServiceError::ValidationError(
            "payment reference is required".to_string(),
        ));
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_is_trimmed_and_required() {
        assert_eq!(required_reference("  TRF-001 ".into()).unwrap(), "TRF-001");
        assert!(matches!(
            required_reference("   ".into()),
            Err(ServiceError::ValidationError(_))
        ));
    }
}
