use chrono::{DateTime, Utc};
use metrics::counter;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveEnum, ActiveModelTrait, ActiveValue::Set, ColumnTrait, ConnectionTrait,
    DatabaseConnection, DbErr, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect,
    SqlErr, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use crate::{
    clock::SharedClock,
    entities::{
        commission::{self, CommissionKind, CommissionStatus, Entity as Commission},
        payment::{self, Entity as Payment, PaymentStatus},
        payout::{self, Entity as Payout, PayoutStatus, PayoutType},
        payout_request::{self, Entity as PayoutRequest, PayoutRequestStatus},
        user::Entity as User,
        wallet::{self, Entity as Wallet},
        wallet_transaction::{self, Entity as WalletTransaction, SourceType, TransactionType},
        work_order::{self, WorkOrderStatus},
    },
    errors::ServiceError,
    money::{round2, sum_rounded},
    notifications::{NotificationType, Notifier},
    repositories::{AuditLogRepository, WorkOrderRepository},
    services::{
        commission_rates::{commission_amount, CommissionRateService},
        Actor,
    },
};

/// Result of verifying a payment. A repeat verification returns the
/// commission created the first time with `already_processed` set.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VerificationOutcome {
    pub commission: commission::Model,
    pub already_processed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReviewDecision {
    Approve,
    Reject,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct EarlyPayoutInput {
    pub amount: Decimal,
    #[validate(length(min = 1, max = 32))]
    pub payment_method: String,
    #[validate(length(max = 500))]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct PayoutReviewInput {
    pub decision: ReviewDecision,
    #[validate(length(max = 500))]
    pub note: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct WalletAdjustmentInput {
    pub tx_type: TransactionType,
    pub amount: Decimal,
    #[validate(length(min = 1, max = 500))]
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WalletSummary {
    pub technician_id: Uuid,
    pub balance: Decimal,
    pub earned_total: Decimal,
    pub pending_payout_total: Decimal,
    pub paid_total: Decimal,
    pub commission_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WalletIntegrity {
    pub technician_id: Uuid,
    pub balance: Decimal,
    pub ledger_sum: Decimal,
    pub last_balance_after: Option<Decimal>,
    pub transaction_count: usize,
    pub consistent: bool,
}

/// One line to post against a technician's wallet.
#[derive(Debug, Clone)]
pub struct LedgerEntry {
    pub technician_id: Uuid,
    pub tx_type: TransactionType,
    pub source_type: SourceType,
    pub source_id: Option<Uuid>,
    pub amount: Decimal,
    pub description: String,
}

fn source_for(kind: CommissionKind) -> SourceType {
    match kind {
        CommissionKind::Commission => SourceType::Commission,
        CommissionKind::Bonus => SourceType::Bonus,
    }
}

fn positive_amount(amount: Decimal, what: &str) -> Result<Decimal, ServiceError> {
    let amount = round2(amount);
    if amount <= Decimal::ZERO {
        return Err(ServiceError::ValidationError(format!(
            "{} must be greater than zero",
            what
        )));
    }
    Ok(amount)
}

fn is_unique_violation(err: &ServiceError) -> bool {
    matches!(
        err,
        ServiceError::DatabaseError(db_err)
            if matches!(db_err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
    )
}

/// Commission calculation, wallets and payouts.
///
/// Every method that moves money runs in a single transaction, and the wallet
/// balance is only written by [`CompensationLedger::apply_wallet_entry`]
/// alongside the ledger line that explains it.
#[derive(Clone)]
pub struct CompensationLedger {
    db: Arc<DatabaseConnection>,
    rates: CommissionRateService,
    notifier: Notifier,
    clock: SharedClock,
}

impl CompensationLedger {
    pub fn new(
        db: Arc<DatabaseConnection>,
        rates: CommissionRateService,
        notifier: Notifier,
        clock: SharedClock,
    ) -> Self {
        Self {
            db,
            rates,
            notifier,
            clock,
        }
    }

    pub fn rates(&self) -> &CommissionRateService {
        &self.rates
    }

    /// Posts one ledger line and moves the wallet balance with it.
    pub async fn apply_wallet_entry<C: ConnectionTrait>(
        conn: &C,
        entry: LedgerEntry,
        now: DateTime<Utc>,
    ) -> Result<(wallet::Model, wallet_transaction::Model), ServiceError> {
        let amount = positive_amount(entry.amount, "ledger amount")?;
        let wallet = Self::wallet_for_update(conn, entry.technician_id, now).await?;

        let balance = round2(wallet.balance);
        let new_balance = match entry.tx_type {
            TransactionType::Credit => round2(balance + amount),
            TransactionType::Debit => {
                if balance < amount {
                    return Err(ServiceError::InsufficientBalance {
                        requested: amount,
                        available: balance,
                    });
                }
                round2(balance - amount)
            }
        };

        let result = Wallet::update_many()
            .set(wallet::ActiveModel {
                balance: Set(new_balance),
                version: Set(wallet.version + 1),
                updated_at: Set(now),
                ..Default::default()
            })
            .filter(wallet::Column::Id.eq(wallet.id))
            .filter(wallet::Column::Version.eq(wallet.version))
            .exec(conn)
            .await?;
        if result.rows_affected == 0 {
            return Err(ServiceError::concurrent("wallet", wallet.id));
        }

        let line = wallet_transaction::ActiveModel {
            id: Set(Uuid::new_v4()),
            wallet_id: Set(wallet.id),
            technician_id: Set(entry.technician_id),
            tx_type: Set(entry.tx_type),
            source_type: Set(entry.source_type),
            source_id: Set(entry.source_id),
            amount: Set(amount),
            balance_after: Set(new_balance),
            sequence: Set(wallet.version + 1),
            description: Set(entry.description),
            created_at: Set(now),
        }
        .insert(conn)
        .await?;

        let updated = wallet::Model {
            balance: new_balance,
            version: wallet.version + 1,
            updated_at: now,
            ..wallet
        };
        Ok((updated, line))
    }

    async fn wallet_for_update<C: ConnectionTrait>(
        conn: &C,
        technician_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<wallet::Model, ServiceError> {
        if let Some(existing) = Wallet::find()
            .filter(wallet::Column::TechnicianId.eq(technician_id))
            .one(conn)
            .await?
        {
            return Ok(existing);
        }

        let created = wallet::ActiveModel {
            id: Set(Uuid::new_v4()),
            technician_id: Set(technician_id),
            balance: Set(Decimal::ZERO),
            version: Set(1),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(conn)
        .await?;
        info!(%technician_id, wallet_id = %created.id, "wallet created");
        Ok(created)
    }

    async fn balance_of<C: ConnectionTrait>(
        conn: &C,
        technician_id: Uuid,
    ) -> Result<Decimal, ServiceError> {
        Ok(Wallet::find()
            .filter(wallet::Column::TechnicianId.eq(technician_id))
            .one(conn)
            .await?
            .map(|w| round2(w.balance))
            .unwrap_or(Decimal::ZERO))
    }

    async fn existing_commission<C: ConnectionTrait>(
        conn: &C,
        work_order_id: i32,
    ) -> Result<Option<commission::Model>, ServiceError> {
        Ok(Commission::find()
            .filter(commission::Column::WorkOrderId.eq(work_order_id))
            .one(conn)
            .await?)
    }

    /// Credits the technician for a verified payment, exactly once per work order.
    #[instrument(skip(self))]
    pub async fn on_payment_verified(
        &self,
        payment_id: Uuid,
        reviewer_id: Option<Uuid>,
    ) -> Result<VerificationOutcome, ServiceError> {
        let result = {
            let txn = self.db.begin().await?;
            match self.verify_within(&txn, payment_id, reviewer_id).await {
                Ok(outcome) if outcome.already_processed => Ok(outcome),
                Ok(outcome) => {
                    txn.commit().await?;
                    Ok(outcome)
                }
                Err(e) => Err(e),
            }
        };

        let outcome = match result {
            Ok(outcome) => outcome,
            Err(e) if is_unique_violation(&e) => {
                // A concurrent verification won the unique index.
                let payment = Payment::find_by_id(payment_id)
                    .one(&*self.db)
                    .await?
                    .ok_or_else(|| ServiceError::not_found("Payment", payment_id))?;
                let commission = Self::existing_commission(&*self.db, payment.work_order_id)
                    .await?
                    .ok_or(e)?;
                warn!(%payment_id, "duplicate payment verification collapsed onto existing commission");
                return Ok(VerificationOutcome {
                    commission,
                    already_processed: true,
                });
            }
            Err(e) => return Err(e),
        };

        if !outcome.already_processed {
            let commission = &outcome.commission;
            counter!("fieldops.commissions.earned", 1);
            info!(
                work_order_id = commission.work_order_id,
                technician_id = %commission.technician_id,
                amount = %commission.amount,
                rate = %commission.rate,
                "commission earned"
            );
            self.notifier.send(
                commission.technician_id,
                NotificationType::CommissionEarned,
                "Payment verified",
                format!(
                    "{} of {} credited to your wallet",
                    match commission.kind {
                        CommissionKind::Commission => "Commission",
                        CommissionKind::Bonus => "Bonus",
                    },
                    commission.amount
                ),
                json!({
                    "work_order_id": commission.work_order_id,
                    "commission_id": commission.id,
                    "amount": commission.amount,
                }),
            );
        }
        Ok(outcome)
    }

    async fn verify_within<C: ConnectionTrait>(
        &self,
        conn: &C,
        payment_id: Uuid,
        reviewer_id: Option<Uuid>,
    ) -> Result<VerificationOutcome, ServiceError> {
        let now = self.clock.now();
        let payment = Payment::find_by_id(payment_id)
            .one(conn)
            .await?
            .ok_or_else(|| ServiceError::not_found("Payment", payment_id))?;

        if let Some(commission) = Self::existing_commission(conn, payment.work_order_id).await? {
            return Ok(VerificationOutcome {
                commission,
                already_processed: true,
            });
        }

        if payment.status != PaymentStatus::PendingVerification {
            return Err(ServiceError::Conflict(format!(
                "payment {} is not pending verification",
                payment_id
            )));
        }

        let work_order = WorkOrderRepository::load(conn, payment.work_order_id).await?;
        if work_order.status != WorkOrderStatus::CompletedPendingPayment {
            return Err(ServiceError::InvalidTransition {
                work_order_id: work_order.id,
                from: work_order.status,
                action: "verify payment for",
            });
        }
        let technician_id = work_order
            .technician_id
            .ok_or_else(|| ServiceError::InternalError(format!(
                "work order {} has no technician",
                work_order.id
            )))?;
        let technician = User::find_by_id(technician_id)
            .one(conn)
            .await?
            .ok_or(ServiceError::TechnicianNotFound(technician_id))?;

        let resolved = self.rates.rate_for(conn, &technician).await?;
        let base_amount = round2(payment.amount);
        let amount = commission_amount(base_amount, resolved.rate)?;

        let commission = commission::ActiveModel {
            id: Set(Uuid::new_v4()),
            work_order_id: Set(work_order.id),
            technician_id: Set(technician_id),
            payment_id: Set(payment.id),
            kind: Set(resolved.kind),
            rate: Set(resolved.rate),
            base_amount: Set(base_amount),
            amount: Set(amount),
            status: Set(CommissionStatus::Earned),
            payout_id: Set(None),
            earned_at: Set(now),
            paid_at: Set(None),
            updated_at: Set(now),
        }
        .insert(conn)
        .await?;

        if amount > Decimal::ZERO {
            Self::apply_wallet_entry(
                conn,
                LedgerEntry {
                    technician_id,
                    tx_type: TransactionType::Credit,
                    source_type: source_for(resolved.kind),
                    source_id: Some(commission.id),
                    amount,
                    description: format!(
                        "{} for work order {}",
                        match resolved.kind {
                            CommissionKind::Commission => "Commission",
                            CommissionKind::Bonus => "Bonus",
                        },
                        work_order.number
                    ),
                },
                now,
            )
            .await?;
        }

        WorkOrderRepository::compare_and_set(
            conn,
            &work_order,
            work_order::ActiveModel {
                status: Set(WorkOrderStatus::PaidVerified),
                paid_verified_at: Set(Some(now)),
                ..Default::default()
            },
            now,
        )
        .await?;

        let mut reviewed: payment::ActiveModel = payment.into();
        reviewed.status = Set(PaymentStatus::Verified);
        reviewed.reviewed_by = Set(reviewer_id);
        reviewed.reviewed_at = Set(Some(now));
        reviewed.update(conn).await?;

        AuditLogRepository::record(
            conn,
            "payment",
            payment_id,
            "payment_verified",
            reviewer_id,
            json!({
                "work_order_id": work_order.id,
                "commission_id": commission.id,
                "rate": resolved.rate,
                "rate_source": resolved.source,
                "amount": amount,
            }),
        )
        .await?;

        Ok(VerificationOutcome {
            commission,
            already_processed: false,
        })
    }

    /// Files a technician's request to withdraw ahead of the weekly cycle.
    #[instrument(skip(self, input))]
    pub async fn request_early_payout(
        &self,
        actor: &Actor,
        input: EarlyPayoutInput,
    ) -> Result<payout_request::Model, ServiceError> {
        input.validate()?;
        let amount = positive_amount(input.amount, "payout amount")?;
        let technician_id = actor.id;
        let db = &*self.db;

        let technician = User::find_by_id(technician_id)
            .one(db)
            .await?
            .ok_or(ServiceError::TechnicianNotFound(technician_id))?;
        if !technician.is_technician() {
            return Err(ServiceError::InvalidTechnicianRole(technician_id));
        }

        let available = Self::balance_of(db, technician_id).await?;
        if available < amount {
            return Err(ServiceError::InsufficientBalance {
                requested: amount,
                available,
            });
        }

        let request = payout_request::ActiveModel {
            id: Set(Uuid::new_v4()),
            technician_id: Set(technician_id),
            amount: Set(amount),
            status: Set(PayoutRequestStatus::Pending),
            reason: Set(input.reason),
            payment_method: Set(input.payment_method),
            reviewer_id: Set(None),
            review_note: Set(None),
            payout_id: Set(None),
            requested_at: Set(self.clock.now()),
            reviewed_at: Set(None),
        }
        .insert(db)
        .await?;

        info!(
            request_id = %request.id,
            %technician_id,
            amount = %amount,
            "early payout requested; awaiting admin review"
        );
        self.notifier.send(
            technician_id,
            NotificationType::PayoutRequestReceived,
            "Payout request received",
            format!("Your request to withdraw {} is awaiting review", amount),
            json!({ "request_id": request.id, "amount": amount }),
        );
        Ok(request)
    }

    /// Approves (debiting the wallet) or rejects a pending payout request.
    #[instrument(skip(self, input))]
    pub async fn review_payout_request(
        &self,
        actor: &Actor,
        request_id: Uuid,
        input: PayoutReviewInput,
    ) -> Result<payout_request::Model, ServiceError> {
        actor.require_admin("review payout requests")?;
        input.validate()?;
        let now = self.clock.now();

        let txn = self.db.begin().await?;
        let request = PayoutRequest::find_by_id(request_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::not_found("Payout request", request_id))?;
        if request.status != PayoutRequestStatus::Pending {
            return Err(ServiceError::Conflict(format!(
                "payout request {} has already been reviewed",
                request_id
            )));
        }

        let technician_id = request.technician_id;
        let amount = round2(request.amount);
        let mut reviewed: payout_request::ActiveModel = request.into();
        reviewed.reviewer_id = Set(actor.recorded_id());
        reviewed.review_note = Set(input.note.clone());
        reviewed.reviewed_at = Set(Some(now));

        let payout = match input.decision {
            ReviewDecision::Reject => {
                reviewed.status = Set(PayoutRequestStatus::Rejected);
                None
            }
            ReviewDecision::Approve => {
                let payout = payout::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    technician_id: Set(technician_id),
                    total_amount: Set(amount),
                    payout_type: Set(PayoutType::Early),
                    status: Set(PayoutStatus::Completed),
                    payment_reference: Set(None),
                    processed_by: Set(actor.recorded_id()),
                    processed_at: Set(Some(now)),
                    created_at: Set(now),
                }
                .insert(&txn)
                .await?;

                Self::apply_wallet_entry(
                    &txn,
                    LedgerEntry {
                        technician_id,
                        tx_type: TransactionType::Debit,
                        source_type: SourceType::Payout,
                        source_id: Some(payout.id),
                        amount,
                        description: format!("Early payout {}", payout.id),
                    },
                    now,
                )
                .await?;

                let linked = Self::link_oldest_commissions(&txn, technician_id, payout.id, amount, now)
                    .await?;

                AuditLogRepository::record(
                    &txn,
                    "payout_request",
                    request_id,
                    "payout_request_approved",
                    actor.recorded_id(),
                    json!({
                        "payout_id": payout.id,
                        "amount": amount,
                        "linked_commissions": linked,
                    }),
                )
                .await?;

                reviewed.status = Set(PayoutRequestStatus::Approved);
                reviewed.payout_id = Set(Some(payout.id));
                Some(payout)
            }
        };

        let reviewed = reviewed.update(&txn).await?;
        txn.commit().await?;

        if let Some(payout) = &payout {
            counter!("fieldops.payouts.completed", 1, "type" => "EARLY");
            info!(request_id = %request_id, payout_id = %payout.id, amount = %amount, "early payout approved");
        } else {
            info!(request_id = %request_id, "early payout rejected");
        }
        self.notifier.send(
            technician_id,
            NotificationType::PayoutRequestReviewed,
            match input.decision {
                ReviewDecision::Approve => "Payout approved",
                ReviewDecision::Reject => "Payout rejected",
            },
            match input.decision {
                ReviewDecision::Approve => format!("{} is on its way to you", amount),
                ReviewDecision::Reject => format!(
                    "Your request to withdraw {} was rejected{}",
                    amount,
                    input.note.as_deref().map(|n| format!(": {}", n)).unwrap_or_default()
                ),
            },
            json!({ "request_id": request_id, "payout_id": reviewed.payout_id }),
        );
        Ok(reviewed)
    }

    /// Marks the oldest EARNED commissions PAID while their running total stays
    /// within `amount`. Bookkeeping only; the wallet debit already happened.
    async fn link_oldest_commissions<C: ConnectionTrait>(
        conn: &C,
        technician_id: Uuid,
        payout_id: Uuid,
        amount: Decimal,
        now: DateTime<Utc>,
    ) -> Result<Vec<Uuid>, ServiceError> {
        let earned = Commission::find()
            .filter(commission::Column::TechnicianId.eq(technician_id))
            .filter(commission::Column::Status.eq(CommissionStatus::Earned))
            .filter(commission::Column::PayoutId.is_null())
            .order_by_asc(commission::Column::EarnedAt)
            .all(conn)
            .await?;

        let mut cumulative = Decimal::ZERO;
        let mut linked = Vec::new();
        for c in earned {
            let next = round2(cumulative + c.amount);
            if next > amount {
                break;
            }
            cumulative = next;
            linked.push(c.id);
        }

        if !linked.is_empty() {
            Commission::update_many()
                .set(commission::ActiveModel {
                    status: Set(CommissionStatus::Paid),
                    payout_id: Set(Some(payout_id)),
                    paid_at: Set(Some(now)),
                    updated_at: Set(now),
                    ..Default::default()
                })
                .filter(commission::Column::Id.is_in(linked.clone()))
                .exec(conn)
                .await?;
        }
        Ok(linked)
    }

    /// Groups EARNED, unreserved commissions by technician into SCHEDULED payouts.
    pub(crate) async fn reserve_commissions<C: ConnectionTrait>(
        conn: &C,
        technician_id: Option<Uuid>,
        payout_type: PayoutType,
        now: DateTime<Utc>,
    ) -> Result<Vec<payout::Model>, ServiceError> {
        let mut query = Commission::find()
            .filter(commission::Column::Status.eq(CommissionStatus::Earned))
            .filter(commission::Column::PayoutId.is_null());
        if let Some(technician_id) = technician_id {
            query = query.filter(commission::Column::TechnicianId.eq(technician_id));
        }
        let earned = query
            .order_by_asc(commission::Column::EarnedAt)
            .all(conn)
            .await?;

        let mut by_technician: BTreeMap<Uuid, Vec<commission::Model>> = BTreeMap::new();
        for c in earned {
            by_technician.entry(c.technician_id).or_default().push(c);
        }

        let mut payouts = Vec::with_capacity(by_technician.len());
        for (technician_id, commissions) in by_technician {
            let total = sum_rounded(commissions.iter().map(|c| c.amount));
            let ids: Vec<Uuid> = commissions.iter().map(|c| c.id).collect();

            let payout = payout::ActiveModel {
                id: Set(Uuid::new_v4()),
                technician_id: Set(technician_id),
                total_amount: Set(total),
                payout_type: Set(payout_type),
                status: Set(PayoutStatus::Scheduled),
                payment_reference: Set(None),
                processed_by: Set(None),
                processed_at: Set(None),
                created_at: Set(now),
            }
            .insert(conn)
            .await?;

            let reserved = Commission::update_many()
                .set(commission::ActiveModel {
                    status: Set(CommissionStatus::PendingPayout),
                    payout_id: Set(Some(payout.id)),
                    updated_at: Set(now),
                    ..Default::default()
                })
                .filter(commission::Column::Id.is_in(ids.clone()))
                .filter(commission::Column::Status.eq(CommissionStatus::Earned))
                .filter(commission::Column::PayoutId.is_null())
                .exec(conn)
                .await?;
            if reserved.rows_affected != ids.len() as u64 {
                return Err(ServiceError::concurrent("commission batch", technician_id));
            }

            payouts.push(payout);
        }
        Ok(payouts)
    }

    /// Reserves every technician's EARNED commissions into weekly payouts.
    #[instrument(skip(self))]
    pub async fn create_weekly_batch(
        &self,
        actor: &Actor,
    ) -> Result<Vec<payout::Model>, ServiceError> {
        actor.require_admin("create payout batches")?;
        let now = self.clock.now();

        let txn = self.db.begin().await?;
        let payouts = Self::reserve_commissions(&txn, None, PayoutType::Weekly, now).await?;
        txn.commit().await?;

        counter!("fieldops.payouts.scheduled", payouts.len() as u64, "type" => "WEEKLY");
        info!(payouts = payouts.len(), "weekly payout batch created");
        Ok(payouts)
    }

    /// Reserves one technician's EARNED commissions into an on-demand payout.
    #[instrument(skip(self))]
    pub async fn create_on_demand_payout(
        &self,
        actor: &Actor,
        technician_id: Uuid,
    ) -> Result<payout::Model, ServiceError> {
        actor.require_admin("create on-demand payouts")?;
        let now = self.clock.now();

        let txn = self.db.begin().await?;
        let payout = Self::reserve_commissions(&txn, Some(technician_id), PayoutType::OnDemand, now)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| {
                ServiceError::ValidationError(format!(
                    "technician {} has no earned commissions to pay out",
                    technician_id
                ))
            })?;
        txn.commit().await?;

        counter!("fieldops.payouts.scheduled", 1, "type" => "ON_DEMAND");
        info!(payout_id = %payout.id, %technician_id, total = %payout.total_amount, "on-demand payout created");
        Ok(payout)
    }

    /// Settles a SCHEDULED payout: debit, commissions PAID, payout COMPLETED.
    #[instrument(skip(self))]
    pub async fn process_payout(
        &self,
        actor: &Actor,
        payout_id: Uuid,
        payment_reference: Option<String>,
    ) -> Result<payout::Model, ServiceError> {
        actor.require_admin("process payouts")?;
        let now = self.clock.now();

        let txn = self.db.begin().await?;
        let payout = Payout::find_by_id(payout_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::not_found("Payout", payout_id))?;
        let completed =
            Self::settle_within(&txn, payout, actor.recorded_id(), payment_reference, now).await?;
        txn.commit().await?;

        self.after_settlement(&completed);
        Ok(completed)
    }

    /// Reserves and settles a technician's EARNED commissions in one step.
    #[instrument(skip(self))]
    pub async fn settle_technician(
        &self,
        actor: &Actor,
        technician_id: Uuid,
        payment_reference: String,
    ) -> Result<payout::Model, ServiceError> {
        actor.require_admin("mark technicians paid")?;
        let now = self.clock.now();

        let txn = self.db.begin().await?;
        let payout = Self::reserve_commissions(&txn, Some(technician_id), PayoutType::Weekly, now)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| {
                ServiceError::ValidationError(format!(
                    "technician {} has no earned commissions to pay out",
                    technician_id
                ))
            })?;
        let completed = Self::settle_within(
            &txn,
            payout,
            actor.recorded_id(),
            Some(payment_reference),
            now,
        )
        .await?;
        txn.commit().await?;

        self.after_settlement(&completed);
        Ok(completed)
    }

    async fn settle_within<C: ConnectionTrait>(
        conn: &C,
        payout: payout::Model,
        processed_by: Option<Uuid>,
        payment_reference: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<payout::Model, ServiceError> {
        if payout.status != PayoutStatus::Scheduled {
            return Err(ServiceError::Conflict(format!(
                "payout {} is already completed",
                payout.id
            )));
        }

        let total = round2(payout.total_amount);
        if total > Decimal::ZERO {
            Self::apply_wallet_entry(
                conn,
                LedgerEntry {
                    technician_id: payout.technician_id,
                    tx_type: TransactionType::Debit,
                    source_type: SourceType::Payout,
                    source_id: Some(payout.id),
                    amount: total,
                    description: format!("Payout {}", payout.id),
                },
                now,
            )
            .await
            .map_err(|e| {
                if let ServiceError::InsufficientBalance {
                    requested,
                    available,
                } = &e
                {
                    counter!("fieldops.ledger.integrity_alarms", 1);
                    error!(
                        payout_id = %payout.id,
                        technician_id = %payout.technician_id,
                        %requested,
                        %available,
                        "ledger integrity alarm: wallet cannot cover reserved commissions"
                    );
                }
                e
            })?;
        }

        Commission::update_many()
            .set(commission::ActiveModel {
                status: Set(CommissionStatus::Paid),
                paid_at: Set(Some(now)),
                updated_at: Set(now),
                ..Default::default()
            })
            .filter(commission::Column::PayoutId.eq(payout.id))
            .exec(conn)
            .await?;

        let payout_id = payout.id;
        let mut completed: payout::ActiveModel = payout.into();
        completed.status = Set(PayoutStatus::Completed);
        completed.processed_by = Set(processed_by);
        completed.processed_at = Set(Some(now));
        completed.payment_reference = Set(payment_reference.clone());
        let completed = completed.update(conn).await?;

        AuditLogRepository::record(
            conn,
            "payout",
            payout_id,
            "payout_completed",
            processed_by,
            json!({
                "technician_id": completed.technician_id,
                "total_amount": total,
                "payment_reference": payment_reference,
            }),
        )
        .await?;

        Ok(completed)
    }

    fn after_settlement(&self, payout: &payout::Model) {
        counter!("fieldops.payouts.completed", 1, "type" => payout.payout_type.to_value());
        info!(
            payout_id = %payout.id,
            technician_id = %payout.technician_id,
            total = %payout.total_amount,
            "payout completed"
        );
        self.notifier.send(
            payout.technician_id,
            NotificationType::PayoutCompleted,
            "Payout sent",
            format!("A payout of {} has been sent to you", payout.total_amount),
            json!({
                "payout_id": payout.id,
                "amount": payout.total_amount,
                "payment_reference": payout.payment_reference,
            }),
        );
    }

    /// Admin credit or debit with a MANUAL source, e.g. corrections.
    #[instrument(skip(self, input))]
    pub async fn adjust_wallet(
        &self,
        actor: &Actor,
        technician_id: Uuid,
        input: WalletAdjustmentInput,
    ) -> Result<wallet_transaction::Model, ServiceError> {
        actor.require_admin("adjust wallets")?;
        input.validate()?;
        let amount = positive_amount(input.amount, "adjustment amount")?;
        let now = self.clock.now();

        let txn = self.db.begin().await?;
        let technician = User::find_by_id(technician_id)
            .one(&txn)
            .await?
            .ok_or(ServiceError::TechnicianNotFound(technician_id))?;
        if !technician.is_technician() {
            return Err(ServiceError::InvalidTechnicianRole(technician_id));
        }

        let (_, line) = Self::apply_wallet_entry(
            &txn,
            LedgerEntry {
                technician_id,
                tx_type: input.tx_type,
                source_type: SourceType::Manual,
                source_id: None,
                amount,
                description: input.reason.clone(),
            },
            now,
        )
        .await?;

        AuditLogRepository::record(
            &txn,
            "wallet",
            line.wallet_id,
            "wallet_adjusted",
            actor.recorded_id(),
            json!({
                "technician_id": technician_id,
                "tx_type": input.tx_type,
                "amount": amount,
                "reason": input.reason,
            }),
        )
        .await?;
        txn.commit().await?;

        info!(%technician_id, amount = %amount, tx_type = ?input.tx_type, "wallet adjusted");
        Ok(line)
    }

    pub async fn wallet_summary(
        &self,
        actor: &Actor,
        technician_id: Uuid,
    ) -> Result<WalletSummary, ServiceError> {
        actor.require_self_or_staff(technician_id)?;
        let db = &*self.db;

        let balance = Self::balance_of(db, technician_id).await?;
        let commissions = Commission::find()
            .filter(commission::Column::TechnicianId.eq(technician_id))
            .all(db)
            .await?;

        let total_for = |status: CommissionStatus| {
            sum_rounded(
                commissions
                    .iter()
                    .filter(|c| c.status == status)
                    .map(|c| c.amount),
            )
        };

        Ok(WalletSummary {
            technician_id,
            balance,
            earned_total: total_for(CommissionStatus::Earned),
            pending_payout_total: total_for(CommissionStatus::PendingPayout),
            paid_total: total_for(CommissionStatus::Paid),
            commission_count: commissions.len(),
        })
    }

    /// Newest ledger lines first.
    pub async fn list_transactions(
        &self,
        actor: &Actor,
        technician_id: Uuid,
        limit: u64,
    ) -> Result<Vec<wallet_transaction::Model>, ServiceError> {
        actor.require_self_or_staff(technician_id)?;
        Ok(WalletTransaction::find()
            .filter(wallet_transaction::Column::TechnicianId.eq(technician_id))
            .order_by_desc(wallet_transaction::Column::Sequence)
            .limit(limit.clamp(1, 500))
            .all(&*self.db)
            .await?)
    }

    /// Recomputes the balance from the ledger and compares it to the wallet.
    pub async fn verify_wallet_integrity(
        &self,
        technician_id: Uuid,
    ) -> Result<WalletIntegrity, ServiceError> {
        let db = &*self.db;
        let balance = Self::balance_of(db, technician_id).await?;
        let lines = WalletTransaction::find()
            .filter(wallet_transaction::Column::TechnicianId.eq(technician_id))
            .order_by_asc(wallet_transaction::Column::Sequence)
            .all(db)
            .await?;

        let ledger_sum = sum_rounded(lines.iter().map(|l| l.signed_amount()));
        let last_balance_after = lines.last().map(|l| round2(l.balance_after));
        let consistent = ledger_sum == balance
            && last_balance_after.map_or(balance.is_zero(), |after| after == balance);

        if !consistent {
            counter!("fieldops.ledger.integrity_alarms", 1);
            error!(
                %technician_id,
                %balance,
                %ledger_sum,
                "wallet balance disagrees with its ledger"
            );
        }

        Ok(WalletIntegrity {
            technician_id,
            balance,
            ledger_sum,
            last_balance_after,
            transaction_count: lines.len(),
            consistent,
        })
    }

    pub async fn pending_payout_count(&self) -> Result<u64, DbErr> {
        Payout::find()
            .filter(payout::Column::Status.eq(PayoutStatus::Scheduled))
            .count(&*self.db)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn commission_kind_maps_to_ledger_source() {
        assert_eq!(source_for(CommissionKind::Commission), SourceType::Commission);
        assert_eq!(source_for(CommissionKind::Bonus), SourceType::Bonus);
    }

    #[test]
    fn amounts_must_be_positive_after_rounding() {
        assert_eq!(positive_amount(dec!(30.004), "x").unwrap(), dec!(30.00));
        assert!(positive_amount(dec!(0.004), "x").is_err());
        assert!(positive_amount(dec!(-1), "x").is_err());
    }
}
