use chrono::{DateTime, Duration as ChronoDuration, Utc};
use dashmap::DashMap;
use metrics::counter;
use sea_orm::{ActiveValue::Set, DatabaseConnection, TransactionTrait};
use serde::Serialize;
use serde_json::json;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::{AbortHandle, JoinHandle};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::{
    clock::SharedClock,
    config::DispatchConfig,
    entities::work_order::{self, WorkOrderStatus},
    errors::ServiceError,
    middleware_helpers::retry::{with_retry, RetryConfig, TransientServicePolicy},
    notifications::{NotificationType, Notifier},
    repositories::{AuditLogRepository, WorkOrderRepository},
};

/// Prefix of the cancel reason written when a response window lapses.
pub const TIMEOUT_REASON_PREFIX: &str = "response timeout";
pub const EXPIRED_AUDIT_ACTION: &str = "response_deadline_expired";

#[derive(Debug, Clone)]
pub struct DeadlineSettings {
    pub window: ChronoDuration,
    pub warning_lead: ChronoDuration,
    pub retry: RetryConfig,
}

impl From<&DispatchConfig> for DeadlineSettings {
    fn from(cfg: &DispatchConfig) -> Self {
        Self {
            window: ChronoDuration::minutes(cfg.response_window_minutes),
            warning_lead: ChronoDuration::minutes(cfg.warning_lead_minutes),
            retry: cfg.expiry_retry(),
        }
    }
}

impl Default for DeadlineSettings {
    fn default() -> Self {
        Self::from(&DispatchConfig::default())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RemainingTime {
    pub expired: bool,
    /// Whole minutes left, rounded up; zero once expired
    pub minutes: i64,
    pub deadline: DateTime<Utc>,
}

impl RemainingTime {
    pub fn at(deadline: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        let left = deadline - now;
        let expired = left <= ChronoDuration::zero();
        let minutes = if expired {
            0
        } else {
            (left.num_seconds() + 59) / 60
        };
        Self {
            expired,
            minutes,
            deadline,
        }
    }
}

/// Diagnostic view of one registry entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActiveDeadline {
    pub work_order_id: i32,
    pub technician_id: Uuid,
    pub deadline: DateTime<Utc>,
    pub warning_at: DateTime<Utc>,
    pub generation: u64,
    pub needs_reconcile: bool,
    pub remaining: RemainingTime,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExpiryOutcome {
    /// The work order went back to UNASSIGNED.
    Reverted(work_order::Model),
    /// Someone else moved the work order first.
    AlreadyHandled,
    /// The persisted deadline lies in the future.
    NotDue,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub rearmed: usize,
    pub dropped: usize,
    pub expired: usize,
    pub already_handled: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Copy)]
enum TimerKind {
    Warning,
    Expiry,
}

struct Registration {
    technician_id: Uuid,
    deadline: DateTime<Utc>,
    warning_at: DateTime<Utc>,
    generation: u64,
    needs_reconcile: bool,
    warning: Option<AbortHandle>,
    expiry: Option<AbortHandle>,
}

impl Registration {
    fn abort_timers(&self, keep_expiry: bool) {
        if let Some(handle) = &self.warning {
            handle.abort();
        }
        if !keep_expiry {
            if let Some(handle) = &self.expiry {
                handle.abort();
            }
        }
    }
}

/// In-process registry of response deadlines, one per ASSIGNED work order.
///
/// Each registration arms a warning timer and an expiry timer. Timers carry
/// the generation they were armed for and do nothing once superseded, so
/// clearing or replacing a registration never races a callback into acting
/// on stale state. `response_deadline_at` on the work order is the durable
/// copy; [`ResponseDeadlineScheduler::reconcile`] rebuilds the registry from it.
pub struct ResponseDeadlineScheduler {
    db: Arc<DatabaseConnection>,
    clock: SharedClock,
    notifier: Notifier,
    settings: DeadlineSettings,
    registry: DashMap<i32, Registration>,
    generation: AtomicU64,
    this: Weak<Self>,
}

impl ResponseDeadlineScheduler {
    pub fn new(
        db: Arc<DatabaseConnection>,
        clock: SharedClock,
        notifier: Notifier,
        settings: DeadlineSettings,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            db,
            clock,
            notifier,
            settings,
            registry: DashMap::new(),
            generation: AtomicU64::new(0),
            this: this.clone(),
        })
    }

    pub fn settings(&self) -> &DeadlineSettings {
        &self.settings
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn window_for(&self, minutes: Option<i64>) -> ChronoDuration {
        minutes
            .map(ChronoDuration::minutes)
            .unwrap_or(self.settings.window)
    }

    /// Absolute deadline for a window starting now.
    pub fn deadline_from_now(&self, minutes: Option<i64>) -> DateTime<Utc> {
        self.clock.now() + self.window_for(minutes)
    }

    /// Registers a deadline `minutes` from now (default window when `None`).
    pub fn set_deadline(
        &self,
        work_order_id: i32,
        technician_id: Uuid,
        minutes: Option<i64>,
    ) -> DateTime<Utc> {
        let deadline = self.deadline_from_now(minutes);
        self.schedule(work_order_id, technician_id, deadline);
        deadline
    }

    /// Registers an absolute deadline, replacing any previous registration.
    pub fn schedule(&self, work_order_id: i32, technician_id: Uuid, deadline: DateTime<Utc>) -> u64 {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let warning_at = deadline - self.settings.warning_lead;
        let now = self.clock.now();

        let registration = Registration {
            technician_id,
            deadline,
            warning_at,
            generation,
            needs_reconcile: false,
            warning: None,
            expiry: None,
        };
        if let Some(previous) = self.registry.insert(work_order_id, registration) {
            previous.abort_timers(false);
        }

        // Timers are spawned after insertion so an immediately-due timer
        // still finds its registration.
        let warning = (warning_at > now).then(|| {
            self.spawn_timer(work_order_id, generation, warning_at - now, TimerKind::Warning)
        });
        let expiry = self.spawn_timer(work_order_id, generation, deadline - now, TimerKind::Expiry);

        match self.registry.get_mut(&work_order_id) {
            Some(mut entry) if entry.generation == generation => {
                entry.warning = warning;
                entry.expiry = Some(expiry);
            }
            _ => {
                if let Some(handle) = warning {
                    handle.abort();
                }
                expiry.abort();
            }
        }

        debug!(
            work_order_id,
            %technician_id,
            %deadline,
            generation,
            "response deadline registered"
        );
        generation
    }

    /// Drops the registration and its timers. Returns whether one existed.
    pub fn clear_deadline(&self, work_order_id: i32) -> bool {
        match self.registry.remove(&work_order_id) {
            Some((_, registration)) => {
                registration.abort_timers(false);
                debug!(work_order_id, "response deadline cleared");
                true
            }
            None => false,
        }
    }

    pub fn remaining_time(&self, work_order_id: i32) -> Option<RemainingTime> {
        let now = self.clock.now();
        self.registry
            .get(&work_order_id)
            .map(|entry| RemainingTime::at(entry.deadline, now))
    }

    pub fn is_registered(&self, work_order_id: i32) -> bool {
        self.registry.contains_key(&work_order_id)
    }

    /// Snapshot of every registration, soonest deadline first.
    pub fn list_active(&self) -> Vec<ActiveDeadline> {
        let now = self.clock.now();
        let mut active: Vec<ActiveDeadline> = self
            .registry
            .iter()
            .map(|entry| ActiveDeadline {
                work_order_id: *entry.key(),
                technician_id: entry.technician_id,
                deadline: entry.deadline,
                warning_at: entry.warning_at,
                generation: entry.generation,
                needs_reconcile: entry.needs_reconcile,
                remaining: RemainingTime::at(entry.deadline, now),
            })
            .collect();
        active.sort_by_key(|d| (d.deadline, d.work_order_id));
        active
    }

    /// Reverts an ASSIGNED work order whose response window lapsed.
    #[instrument(skip(self))]
    pub async fn handle_expiry(&self, work_order_id: i32) -> Result<ExpiryOutcome, ServiceError> {
        self.expire(work_order_id, false).await
    }

    /// Rebuilds the registry from persisted deadlines and expires anything overdue.
    #[instrument(skip(self))]
    pub async fn reconcile(&self) -> Result<ReconcileReport, ServiceError> {
        let now = self.clock.now();
        let mut report = ReconcileReport::default();

        let awaiting = WorkOrderRepository::find_awaiting_response(&*self.db).await?;
        let awaiting_ids: HashSet<i32> = awaiting.iter().map(|wo| wo.id).collect();

        let orphaned: Vec<i32> = self
            .registry
            .iter()
            .filter(|entry| !awaiting_ids.contains(entry.key()))
            .map(|entry| *entry.key())
            .collect();
        for work_order_id in orphaned {
            if self.clear_deadline(work_order_id) {
                report.dropped += 1;
            }
        }

        for wo in awaiting {
            let Some(technician_id) = wo.technician_id else {
                warn!(work_order_id = wo.id, "assigned work order has no technician");
                continue;
            };
            let deadline = wo
                .response_deadline_at
                .or_else(|| wo.assigned_at.map(|at| at + self.settings.window))
                .unwrap_or(now);
            let registered = self
                .registry
                .get(&wo.id)
                .map(|entry| (entry.technician_id, entry.deadline, entry.needs_reconcile));
            let flagged = matches!(registered, Some((_, _, true)));

            if deadline <= now || flagged {
                match self.expire_with_retry(wo.id, false).await {
                    Ok(ExpiryOutcome::Reverted(_)) => report.expired += 1,
                    Ok(ExpiryOutcome::AlreadyHandled) => report.already_handled += 1,
                    Ok(ExpiryOutcome::NotDue) => {
                        self.schedule(wo.id, technician_id, deadline);
                        report.rearmed += 1;
                    }
                    Err(_) => report.failed += 1,
                }
                continue;
            }

            match registered {
                Some((registered_technician, registered_deadline, _))
                    if registered_technician == technician_id
                        && registered_deadline == deadline => {}
                _ => {
                    self.schedule(wo.id, technician_id, deadline);
                    report.rearmed += 1;
                }
            }
        }

        counter!("fieldops.deadlines.reconcile_sweeps", 1);
        info!(
            rearmed = report.rearmed,
            dropped = report.dropped,
            expired = report.expired,
            failed = report.failed,
            "deadline reconcile sweep finished"
        );
        Ok(report)
    }

    /// Runs [`Self::reconcile`] immediately and then every `interval`.
    pub fn spawn_reconcile_loop(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let this = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(scheduler) = this.upgrade() else {
                    break;
                };
                if let Err(e) = scheduler.reconcile().await {
                    warn!(error = %e, "deadline reconcile sweep failed");
                }
            }
        })
    }

    fn spawn_timer(
        &self,
        work_order_id: i32,
        generation: u64,
        delay: ChronoDuration,
        kind: TimerKind,
    ) -> AbortHandle {
        let delay = delay.to_std().unwrap_or(Duration::ZERO);
        let this = self.this.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let Some(scheduler) = this.upgrade() else {
                return;
            };
            match kind {
                TimerKind::Warning => scheduler.on_warning(work_order_id, generation).await,
                TimerKind::Expiry => scheduler.on_expiry(work_order_id, generation).await,
            }
        })
        .abort_handle()
    }

    fn registered_technician(&self, work_order_id: i32, generation: u64) -> Option<Uuid> {
        self.registry
            .get(&work_order_id)
            .filter(|entry| entry.generation == generation)
            .map(|entry| entry.technician_id)
    }

    async fn on_warning(&self, work_order_id: i32, generation: u64) {
        let Some(technician_id) = self.registered_technician(work_order_id, generation) else {
            return;
        };

        match WorkOrderRepository::load(&*self.db, work_order_id).await {
            Ok(wo) if wo.status == WorkOrderStatus::Assigned && wo.is_assigned_to(technician_id) => {
                let remaining = self.remaining_time(work_order_id);
                let minutes = remaining.map(|r| r.minutes).unwrap_or_default();
                self.notifier.send(
                    technician_id,
                    NotificationType::ResponseDeadlineWarning,
                    "Response time running out",
                    format!(
                        "Work order {} needs your response within {} minutes",
                        wo.number, minutes
                    ),
                    json!({
                        "work_order_id": wo.id,
                        "minutes_remaining": minutes,
                        "deadline": remaining.map(|r| r.deadline),
                    }),
                );
            }
            Ok(_) => debug!(work_order_id, "skipping deadline warning for moved work order"),
            Err(e) => warn!(work_order_id, error = %e, "deadline warning lookup failed"),
        }
    }

    async fn on_expiry(&self, work_order_id: i32, generation: u64) {
        if self.registered_technician(work_order_id, generation).is_none() {
            return;
        }
        let _ = self.expire_with_retry(work_order_id, true).await;
    }

    async fn expire_with_retry(
        &self,
        work_order_id: i32,
        in_timer: bool,
    ) -> Result<ExpiryOutcome, ServiceError> {
        let result = with_retry(&self.settings.retry, TransientServicePolicy, || {
            self.expire(work_order_id, in_timer)
        })
        .await;

        if let Err(e) = &result {
            error!(
                work_order_id,
                error = %e,
                "deadline expiry failed; leaving work order assigned for reconcile"
            );
            counter!("fieldops.deadlines.expiry_failures", 1);
            if let Some(mut entry) = self.registry.get_mut(&work_order_id) {
                entry.needs_reconcile = true;
            }
        }
        result
    }

    async fn expire(&self, work_order_id: i32, in_timer: bool) -> Result<ExpiryOutcome, ServiceError> {
        let registered = self
            .registry
            .get(&work_order_id)
            .map(|entry| (entry.technician_id, entry.generation));
        let generation = registered.map(|(_, generation)| generation);
        let now = self.clock.now();

        let txn = self.db.begin().await?;
        let current = WorkOrderRepository::load(&txn, work_order_id).await?;

        if current.status != WorkOrderStatus::Assigned {
            drop(txn);
            self.release(work_order_id, generation, in_timer);
            return Ok(ExpiryOutcome::AlreadyHandled);
        }
        if let Some((technician_id, _)) = registered {
            if !current.is_assigned_to(technician_id) {
                return Ok(ExpiryOutcome::AlreadyHandled);
            }
        }
        if matches!(current.response_deadline_at, Some(deadline) if deadline > now) {
            return Ok(ExpiryOutcome::NotDue);
        }

        let window_minutes = match (current.assigned_at, current.response_deadline_at) {
            (Some(assigned_at), Some(deadline)) => (deadline - assigned_at).num_minutes(),
            _ => self.settings.window.num_minutes(),
        };
        let reason = format!(
            "{}: no response within {} minutes",
            TIMEOUT_REASON_PREFIX, window_minutes
        );
        let changes = work_order::ActiveModel {
            status: Set(WorkOrderStatus::Unassigned),
            technician_id: Set(None),
            assigned_at: Set(None),
            response_deadline_at: Set(None),
            cancel_reason: Set(Some(reason.clone())),
            ..Default::default()
        };

        let updated = match WorkOrderRepository::compare_and_set(&txn, &current, changes, now).await
        {
            Ok(updated) => updated,
            Err(ServiceError::ConcurrentModification { .. }) => {
                drop(txn);
                let latest = WorkOrderRepository::load(&*self.db, work_order_id).await?;
                if latest.status != WorkOrderStatus::Assigned {
                    self.release(work_order_id, generation, in_timer);
                    return Ok(ExpiryOutcome::AlreadyHandled);
                }
                return Err(ServiceError::concurrent("work order", work_order_id));
            }
            Err(e) => return Err(e),
        };

        AuditLogRepository::record(
            &txn,
            "work_order",
            work_order_id,
            EXPIRED_AUDIT_ACTION,
            None,
            json!({
                "technician_id": current.technician_id,
                "deadline": current.response_deadline_at,
                "reason": reason,
            }),
        )
        .await?;

        txn.commit().await?;
        self.release(work_order_id, generation, in_timer);
        counter!("fieldops.deadlines.expired", 1);
        info!(
            work_order_id,
            technician_id = ?current.technician_id,
            "response window expired; work order returned to dispatch"
        );

        if let Some(dispatcher_id) = updated.dispatcher_id {
            self.notifier.send(
                dispatcher_id,
                NotificationType::ResponseDeadlineExpired,
                "Technician did not respond",
                format!(
                    "Work order {} is unassigned again: {}",
                    updated.number, reason
                ),
                json!({
                    "work_order_id": updated.id,
                    "technician_id": current.technician_id,
                }),
            );
        }
        if let Some(technician_id) = current.technician_id {
            self.notifier.send(
                technician_id,
                NotificationType::ResponseDeadlineExpired,
                "Assignment expired",
                format!("Your response window for work order {} has closed", updated.number),
                json!({ "work_order_id": updated.id }),
            );
        }

        Ok(ExpiryOutcome::Reverted(updated))
    }

    /// Removes the registration this expiry observed, leaving newer ones alone.
    /// A running expiry timer must not abort itself.
    fn release(&self, work_order_id: i32, generation: Option<u64>, in_timer: bool) {
        let Some(generation) = generation else {
            return;
        };
        if let Some((_, registration)) = self
            .registry
            .remove_if(&work_order_id, |_, entry| entry.generation == generation)
        {
            registration.abort_timers(in_timer);
        }
    }
}
