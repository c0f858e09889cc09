use chrono::{DateTime, Utc};
use metrics::counter;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, ConnectionTrait, DatabaseConnection,
    EntityTrait, QueryFilter, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

use crate::{
    clock::SharedClock,
    entities::{
        check_in,
        user::{self, Entity as User, Presence, UserRole},
        work_order::{self, WorkOrderStatus},
    },
    errors::ServiceError,
    notifications::{NotificationType, Notifier},
    repositories::{AuditLogRepository, WorkOrderRepository},
    services::{
        response_deadlines::{
            RemainingTime, ResponseDeadlineScheduler, EXPIRED_AUDIT_ACTION, TIMEOUT_REASON_PREFIX,
        },
        Actor,
    },
};

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateWorkOrderInput {
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    #[validate(length(max = 2000))]
    pub description: Option<String>,
    #[validate(length(max = 500))]
    pub address: Option<String>,
    pub customer_id: Uuid,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub service_request_id: Option<Uuid>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct AssignInput {
    pub technician_id: Uuid,
    /// Overrides the configured response window
    #[validate(range(min = 1, max = 1440))]
    pub response_window_minutes: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResponseAction {
    Accept,
    Decline,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RespondInput {
    pub response: ResponseAction,
    #[validate(length(max = 500))]
    pub decline_reason: Option<String>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct StartInput {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CompleteInput {
    #[validate(length(max = 4000))]
    pub notes: Option<String>,
    pub materials: Option<Value>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CancelInput {
    #[validate(length(min = 1, max = 500))]
    pub reason: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RescheduleInput {
    pub scheduled_at: DateTime<Utc>,
}

/// A work order together with the time left on its response window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkOrderView {
    #[serde(flatten)]
    pub work_order: work_order::Model,
    pub deadline: Option<RemainingTime>,
}

/// `WO-YYYYMMDD-XXXXXX` with a random uppercase hex suffix.
pub fn generate_number(now: DateTime<Utc>) -> String {
    let suffix = Uuid::new_v4().simple().to_string()[..6].to_uppercase();
    format!("WO-{}-{}", now.format("%Y%m%d"), suffix)
}

pub fn validate_location(latitude: f64, longitude: f64) -> Result<(), ServiceError> {
    if !(-90.0..=90.0).contains(&latitude) {
        return Err(ServiceError::InvalidLocation(format!(
            "latitude {} is outside -90..90",
            latitude
        )));
    }
    if !(-180.0..=180.0).contains(&longitude) {
        return Err(ServiceError::InvalidLocation(format!(
            "longitude {} is outside -180..180",
            longitude
        )));
    }
    Ok(())
}

/// Accepts a JSON array, or a string holding one.
pub fn parse_materials(materials: Option<Value>) -> Result<Option<Value>, ServiceError> {
    match materials {
        None | Some(Value::Null) => Ok(None),
        Some(list @ Value::Array(_)) => Ok(Some(list)),
        Some(Value::String(raw)) => match serde_json::from_str::<Value>(&raw) {
            Ok(list @ Value::Array(_)) => Ok(Some(list)),
            Ok(_) => Err(ServiceError::InvalidMaterialsFormat(
                "materials string must contain a JSON array".to_string(),
            )),
            Err(e) => Err(ServiceError::InvalidMaterialsFormat(e.to_string())),
        },
        Some(_) => Err(ServiceError::InvalidMaterialsFormat(
            "materials must be a list".to_string(),
        )),
    }
}

fn invalid(work_order: &work_order::Model, action: &'static str) -> ServiceError {
    ServiceError::InvalidTransition {
        work_order_id: work_order.id,
        from: work_order.status,
        action,
    }
}

fn timed_out(work_order: &work_order::Model) -> bool {
    work_order.status == WorkOrderStatus::Unassigned
        && work_order
            .cancel_reason
            .as_deref()
            .is_some_and(|reason| reason.starts_with(TIMEOUT_REASON_PREFIX))
}

/// Whether the last response timeout on the work order was `technician_id`'s.
async fn lapsed_for<C: ConnectionTrait>(
    conn: &C,
    work_order_id: i32,
    technician_id: Uuid,
) -> Result<bool, ServiceError> {
    let expiry =
        AuditLogRepository::latest(conn, "work_order", work_order_id, EXPIRED_AUDIT_ACTION)
            .await?;
    Ok(expiry
        .and_then(|entry| {
            entry
                .details
                .get("technician_id")
                .and_then(Value::as_str)
                .and_then(|id| Uuid::parse_str(id).ok())
        })
        .is_some_and(|id| id == technician_id))
}

fn record_transition(to: WorkOrderStatus) {
    counter!("fieldops.work_orders.transitions", 1, "to" => to.to_string());
}

async fn set_presence<C: ConnectionTrait>(
    conn: &C,
    technician_id: Uuid,
    presence: Presence,
    now: DateTime<Utc>,
) -> Result<(), ServiceError> {
    User::update_many()
        .set(user::ActiveModel {
            presence: Set(presence),
            updated_at: Set(now),
            ..Default::default()
        })
        .filter(user::Column::Id.eq(technician_id))
        .exec(conn)
        .await?;
    Ok(())
}

/// Lifecycle transitions for work orders.
///
/// Each transition reads the row, checks the caller and the source status,
/// then writes through a version compare-and-set inside one transaction.
/// Deadline registration and notifications happen after commit.
#[derive(Clone)]
pub struct WorkOrderStateMachine {
    db: Arc<DatabaseConnection>,
    scheduler: Arc<ResponseDeadlineScheduler>,
    notifier: Notifier,
    clock: SharedClock,
}

impl WorkOrderStateMachine {
    pub fn new(
        db: Arc<DatabaseConnection>,
        scheduler: Arc<ResponseDeadlineScheduler>,
        notifier: Notifier,
        clock: SharedClock,
    ) -> Self {
        Self {
            db,
            scheduler,
            notifier,
            clock,
        }
    }

    pub fn scheduler(&self) -> &Arc<ResponseDeadlineScheduler> {
        &self.scheduler
    }

    #[instrument(skip(self, input))]
    pub async fn create(
        &self,
        actor: &Actor,
        input: CreateWorkOrderInput,
    ) -> Result<work_order::Model, ServiceError> {
        actor.require_staff("create work orders")?;
        input.validate()?;
        let now = self.clock.now();
        let db = &*self.db;

        let customer = User::find_by_id(input.customer_id)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::not_found("Customer", input.customer_id))?;
        if customer.role != UserRole::Customer {
            return Err(ServiceError::ValidationError(format!(
                "user {} is not a customer",
                customer.id
            )));
        }

        let created = work_order::ActiveModel {
            number: Set(generate_number(now)),
            title: Set(input.title),
            description: Set(input.description),
            address: Set(input.address),
            status: Set(WorkOrderStatus::Unassigned),
            customer_id: Set(customer.id),
            technician_id: Set(None),
            dispatcher_id: Set(actor.recorded_id()),
            service_request_id: Set(input.service_request_id),
            scheduled_at: Set(input.scheduled_at),
            assigned_at: Set(None),
            response_deadline_at: Set(None),
            accepted_at: Set(None),
            started_at: Set(None),
            completed_at: Set(None),
            paid_verified_at: Set(None),
            cancelled_at: Set(None),
            cancel_reason: Set(None),
            completion_notes: Set(None),
            materials: Set(None),
            version: Set(1),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(db)
        .await?;

        counter!("fieldops.work_orders.created", 1);
        info!(work_order_id = created.id, number = %created.number, "work order created");
        Ok(created)
    }

    pub async fn get(&self, actor: &Actor, work_order_id: i32) -> Result<WorkOrderView, ServiceError> {
        let work_order = WorkOrderRepository::load(&*self.db, work_order_id).await?;
        let visible = match actor.role {
            UserRole::Admin | UserRole::Dispatcher => true,
            UserRole::Technician => work_order.is_assigned_to(actor.id),
            UserRole::Customer => work_order.customer_id == actor.id,
        };
        if !visible {
            return Err(ServiceError::Forbidden(format!(
                "cannot view work order {}",
                work_order_id
            )));
        }

        let deadline = self.scheduler.remaining_time(work_order_id).or_else(|| {
            (work_order.status == WorkOrderStatus::Assigned)
                .then_some(work_order.response_deadline_at)
                .flatten()
                .map(|at| RemainingTime::at(at, self.clock.now()))
        });
        Ok(WorkOrderView {
            work_order,
            deadline,
        })
    }

    /// Dispatches to a technician and starts their response window.
    #[instrument(skip(self, input), fields(technician_id = %input.technician_id))]
    pub async fn assign(
        &self,
        actor: &Actor,
        work_order_id: i32,
        input: AssignInput,
    ) -> Result<work_order::Model, ServiceError> {
        actor.require_staff("assign work orders")?;
        input.validate()?;
        let technician_id = input.technician_id;
        let now = self.clock.now();

        let txn = self.db.begin().await?;
        let technician = User::find_by_id(technician_id)
            .one(&txn)
            .await?
            .ok_or(ServiceError::TechnicianNotFound(technician_id))?;
        if !technician.is_technician() {
            return Err(ServiceError::InvalidTechnicianRole(technician_id));
        }
        if technician.is_blocked {
            return Err(ServiceError::TechnicianBlocked(technician_id));
        }

        let current = WorkOrderRepository::load(&txn, work_order_id).await?;
        if !current.status.can_assign() {
            return Err(invalid(&current, "assign"));
        }
        if current.is_assigned_to(technician_id) {
            return Ok(current);
        }

        let deadline = now + self.scheduler.window_for(input.response_window_minutes);
        let previous_technician = current.technician_id;
        let changes = work_order::ActiveModel {
            status: Set(WorkOrderStatus::Assigned),
            technician_id: Set(Some(technician_id)),
            dispatcher_id: Set(actor.recorded_id().or(current.dispatcher_id)),
            assigned_at: Set(Some(now)),
            response_deadline_at: Set(Some(deadline)),
            accepted_at: Set(None),
            cancel_reason: Set(None),
            ..Default::default()
        };
        let updated = self
            .write(&txn, &current, changes, now, actor, "assign")
            .await?;
        txn.commit().await?;

        self.scheduler.schedule(work_order_id, technician_id, deadline);
        record_transition(WorkOrderStatus::Assigned);
        info!(work_order_id, %technician_id, %deadline, "work order assigned");

        if let Some(previous) = previous_technician {
            self.notifier.send(
                previous,
                NotificationType::WorkOrderCancelled,
                "Assignment removed",
                format!("Work order {} was reassigned", updated.number),
                json!({ "work_order_id": work_order_id }),
            );
        }
        self.notifier.send(
            technician_id,
            NotificationType::WorkOrderAssigned,
            "New work order",
            format!(
                "Work order {} was assigned to you. Please respond by {}",
                updated.number, deadline
            ),
            json!({ "work_order_id": work_order_id, "deadline": deadline }),
        );
        Ok(updated)
    }

    /// Takes the technician off a work order that has not started.
    #[instrument(skip(self))]
    pub async fn unassign(
        &self,
        actor: &Actor,
        work_order_id: i32,
    ) -> Result<work_order::Model, ServiceError> {
        actor.require_staff("unassign work orders")?;
        let now = self.clock.now();

        let txn = self.db.begin().await?;
        let current = WorkOrderRepository::load(&txn, work_order_id).await?;
        if !matches!(
            current.status,
            WorkOrderStatus::Assigned | WorkOrderStatus::Accepted
        ) {
            return Err(invalid(&current, "unassign"));
        }

        let changes = work_order::ActiveModel {
            status: Set(WorkOrderStatus::Unassigned),
            technician_id: Set(None),
            assigned_at: Set(None),
            accepted_at: Set(None),
            response_deadline_at: Set(None),
            ..Default::default()
        };
        let updated = self
            .write(&txn, &current, changes, now, actor, "unassign")
            .await?;
        txn.commit().await?;

        self.scheduler.clear_deadline(work_order_id);
        record_transition(WorkOrderStatus::Unassigned);
        info!(work_order_id, "work order unassigned");

        if let Some(technician_id) = current.technician_id {
            self.notifier.send(
                technician_id,
                NotificationType::WorkOrderCancelled,
                "Assignment removed",
                format!("You were removed from work order {}", updated.number),
                json!({ "work_order_id": work_order_id }),
            );
        }
        Ok(updated)
    }

    /// The assigned technician accepts or declines inside the response window.
    #[instrument(skip(self, input), fields(response = ?input.response))]
    pub async fn respond(
        &self,
        actor: &Actor,
        work_order_id: i32,
        input: RespondInput,
    ) -> Result<work_order::Model, ServiceError> {
        input.validate()?;
        let now = self.clock.now();

        let txn = self.db.begin().await?;
        let current = WorkOrderRepository::load(&txn, work_order_id).await?;
        if !current.is_assigned_to(actor.id) {
            if timed_out(&current) && lapsed_for(&txn, work_order_id, actor.id).await? {
                return Err(ServiceError::ResponseWindowExpired(work_order_id));
            }
            return Err(ServiceError::NotAssignedToYou(work_order_id));
        }
        match current.status {
            WorkOrderStatus::Assigned => {}
            WorkOrderStatus::Accepted => {
                return Err(ServiceError::AlreadyResponded(work_order_id))
            }
            _ => return Err(invalid(&current, "respond to")),
        }
        if matches!(current.response_deadline_at, Some(deadline) if deadline <= now) {
            return Err(ServiceError::ResponseWindowExpired(work_order_id));
        }

        let changes = match input.response {
            ResponseAction::Accept => work_order::ActiveModel {
                status: Set(WorkOrderStatus::Accepted),
                accepted_at: Set(Some(now)),
                response_deadline_at: Set(None),
                ..Default::default()
            },
            ResponseAction::Decline => work_order::ActiveModel {
                status: Set(WorkOrderStatus::Unassigned),
                technician_id: Set(None),
                assigned_at: Set(None),
                response_deadline_at: Set(None),
                cancel_reason: Set(Some(
                    input
                        .decline_reason
                        .clone()
                        .filter(|r| !r.trim().is_empty())
                        .unwrap_or_else(|| "declined by technician".to_string()),
                )),
                ..Default::default()
            },
        };
        let updated = self
            .write(&txn, &current, changes, now, actor, "respond to")
            .await?;
        txn.commit().await?;

        self.scheduler.clear_deadline(work_order_id);
        record_transition(updated.status);
        info!(work_order_id, technician_id = %actor.id, status = %updated.status, "technician responded");

        if let Some(dispatcher_id) = updated.dispatcher_id {
            let (kind, title, message) = match input.response {
                ResponseAction::Accept => (
                    NotificationType::WorkOrderAccepted,
                    "Work order accepted",
                    format!("Work order {} was accepted", updated.number),
                ),
                ResponseAction::Decline => (
                    NotificationType::WorkOrderDeclined,
                    "Work order declined",
                    format!(
                        "Work order {} was declined: {}",
                        updated.number,
                        updated.cancel_reason.as_deref().unwrap_or_default()
                    ),
                ),
            };
            self.notifier.send(
                dispatcher_id,
                kind,
                title,
                message,
                json!({ "work_order_id": work_order_id, "technician_id": actor.id }),
            );
        }
        Ok(updated)
    }

    /// Checks the technician in on site.
    #[instrument(skip(self, input))]
    pub async fn start(
        &self,
        actor: &Actor,
        work_order_id: i32,
        input: StartInput,
    ) -> Result<work_order::Model, ServiceError> {
        validate_location(input.latitude, input.longitude)?;
        let now = self.clock.now();

        let txn = self.db.begin().await?;
        let current = WorkOrderRepository::load(&txn, work_order_id).await?;
        if !current.is_assigned_to(actor.id) {
            return Err(ServiceError::NotAssignedToYou(work_order_id));
        }
        if current.status != WorkOrderStatus::Accepted {
            return Err(invalid(&current, "start"));
        }

        let changes = work_order::ActiveModel {
            status: Set(WorkOrderStatus::InProgress),
            started_at: Set(Some(now)),
            ..Default::default()
        };
        let updated = self.write(&txn, &current, changes, now, actor, "start").await?;

        check_in::ActiveModel {
            id: Set(Uuid::new_v4()),
            work_order_id: Set(work_order_id),
            technician_id: Set(actor.id),
            latitude: Set(input.latitude),
            longitude: Set(input.longitude),
            created_at: Set(now),
        }
        .insert(&txn)
        .await?;
        set_presence(&txn, actor.id, Presence::Busy, now).await?;
        txn.commit().await?;

        record_transition(WorkOrderStatus::InProgress);
        info!(work_order_id, technician_id = %actor.id, "work started");
        self.notifier.send(
            updated.customer_id,
            NotificationType::WorkOrderStarted,
            "Technician on site",
            format!("Work on {} has started", updated.number),
            json!({ "work_order_id": work_order_id }),
        );
        Ok(updated)
    }

    #[instrument(skip(self, input))]
    pub async fn complete(
        &self,
        actor: &Actor,
        work_order_id: i32,
        input: CompleteInput,
    ) -> Result<work_order::Model, ServiceError> {
        input.validate()?;
        let materials = parse_materials(input.materials)?;
        let now = self.clock.now();

        let txn = self.db.begin().await?;
        let current = WorkOrderRepository::load(&txn, work_order_id).await?;
        if !current.is_assigned_to(actor.id) {
            return Err(ServiceError::NotAssignedToYou(work_order_id));
        }
        if !matches!(
            current.status,
            WorkOrderStatus::Accepted | WorkOrderStatus::InProgress
        ) {
            return Err(invalid(&current, "complete"));
        }

        let changes = work_order::ActiveModel {
            status: Set(WorkOrderStatus::CompletedPendingPayment),
            completed_at: Set(Some(now)),
            completion_notes: Set(input.notes),
            materials: Set(materials),
            ..Default::default()
        };
        let updated = self
            .write(&txn, &current, changes, now, actor, "complete")
            .await?;
        set_presence(&txn, actor.id, Presence::Available, now).await?;
        txn.commit().await?;

        record_transition(WorkOrderStatus::CompletedPendingPayment);
        info!(work_order_id, technician_id = %actor.id, "work completed; awaiting payment");
        for recipient in [Some(updated.customer_id), updated.dispatcher_id]
            .into_iter()
            .flatten()
        {
            self.notifier.send(
                recipient,
                NotificationType::WorkOrderCompleted,
                "Work completed",
                format!("Work order {} is complete and awaiting payment", updated.number),
                json!({ "work_order_id": work_order_id }),
            );
        }
        Ok(updated)
    }

    #[instrument(skip(self, input))]
    pub async fn cancel(
        &self,
        actor: &Actor,
        work_order_id: i32,
        input: CancelInput,
    ) -> Result<work_order::Model, ServiceError> {
        input.validate()?;
        let now = self.clock.now();

        let txn = self.db.begin().await?;
        let current = WorkOrderRepository::load(&txn, work_order_id).await?;
        match actor.role {
            UserRole::Admin | UserRole::Dispatcher => {}
            UserRole::Customer if current.customer_id == actor.id => {}
            UserRole::Customer => {
                return Err(ServiceError::Forbidden(
                    "customers may only cancel their own work orders".to_string(),
                ))
            }
            UserRole::Technician => {
                return Err(ServiceError::Forbidden(
                    "technicians may not cancel work orders".to_string(),
                ))
            }
        }
        if !current.status.can_cancel() {
            return Err(invalid(&current, "cancel"));
        }

        let changes = work_order::ActiveModel {
            status: Set(WorkOrderStatus::Cancelled),
            cancelled_at: Set(Some(now)),
            cancel_reason: Set(Some(input.reason.clone())),
            technician_id: Set(None),
            response_deadline_at: Set(None),
            ..Default::default()
        };
        let updated = self.write(&txn, &current, changes, now, actor, "cancel").await?;
        if let (WorkOrderStatus::InProgress, Some(technician_id)) =
            (current.status, current.technician_id)
        {
            set_presence(&txn, technician_id, Presence::Available, now).await?;
        }
        txn.commit().await?;

        self.scheduler.clear_deadline(work_order_id);
        record_transition(WorkOrderStatus::Cancelled);
        info!(work_order_id, reason = %input.reason, "work order cancelled");

        let recipients = [
            current.technician_id,
            (actor.id != updated.customer_id).then_some(updated.customer_id),
        ];
        for recipient in recipients.into_iter().flatten() {
            self.notifier.send(
                recipient,
                NotificationType::WorkOrderCancelled,
                "Work order cancelled",
                format!("Work order {} was cancelled: {}", updated.number, input.reason),
                json!({ "work_order_id": work_order_id }),
            );
        }
        Ok(updated)
    }

    #[instrument(skip(self, input))]
    pub async fn reschedule(
        &self,
        actor: &Actor,
        work_order_id: i32,
        input: RescheduleInput,
    ) -> Result<work_order::Model, ServiceError> {
        let now = self.clock.now();

        let txn = self.db.begin().await?;
        let current = WorkOrderRepository::load(&txn, work_order_id).await?;
        let allowed = actor.is_staff()
            || (actor.role == UserRole::Customer && current.customer_id == actor.id);
        if !allowed {
            return Err(ServiceError::Forbidden(format!(
                "cannot reschedule work order {}",
                work_order_id
            )));
        }
        if !current.status.can_reschedule() {
            return Err(invalid(&current, "reschedule"));
        }

        let changes = work_order::ActiveModel {
            scheduled_at: Set(Some(input.scheduled_at)),
            ..Default::default()
        };
        let updated = self
            .write(&txn, &current, changes, now, actor, "reschedule")
            .await?;
        txn.commit().await?;

        info!(work_order_id, scheduled_at = %input.scheduled_at, "work order rescheduled");
        Ok(updated)
    }

    /// Compare-and-set that turns a lost race into the error the caller
    /// would have seen had it read the winning write.
    async fn write<C: ConnectionTrait>(
        &self,
        conn: &C,
        current: &work_order::Model,
        changes: work_order::ActiveModel,
        now: DateTime<Utc>,
        actor: &Actor,
        action: &'static str,
    ) -> Result<work_order::Model, ServiceError> {
        match WorkOrderRepository::compare_and_set(conn, current, changes, now).await {
            Err(ServiceError::ConcurrentModification { .. }) => {
                let latest = WorkOrderRepository::load(conn, current.id).await?;
                Err(Self::conflict_for(&latest, actor, action))
            }
            other => other,
        }
    }

    fn conflict_for(
        latest: &work_order::Model,
        actor: &Actor,
        action: &'static str,
    ) -> ServiceError {
        if action == "respond to" {
            if timed_out(latest) {
                return ServiceError::ResponseWindowExpired(latest.id);
            }
            if latest.status == WorkOrderStatus::Accepted && latest.is_assigned_to(actor.id) {
                return ServiceError::AlreadyResponded(latest.id);
            }
            if latest.status == WorkOrderStatus::Assigned && latest.is_assigned_to(actor.id) {
                return ServiceError::concurrent("work order", latest.id);
            }
        }
        invalid(latest, action)
    }
}
