use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle status of a dispatched job.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    strum::Display,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkOrderStatus {
    #[sea_orm(string_value = "UNASSIGNED")]
    Unassigned,
    #[sea_orm(string_value = "ASSIGNED")]
    Assigned,
    #[sea_orm(string_value = "ACCEPTED")]
    Accepted,
    #[sea_orm(string_value = "IN_PROGRESS")]
    InProgress,
    #[sea_orm(string_value = "COMPLETED_PENDING_PAYMENT")]
    CompletedPendingPayment,
    #[sea_orm(string_value = "PAID_VERIFIED")]
    PaidVerified,
    #[sea_orm(string_value = "CANCELLED")]
    Cancelled,
}

impl WorkOrderStatus {
    /// Statuses in which a technician must be attached to the work order.
    pub fn requires_technician(&self) -> bool {
        matches!(
            self,
            Self::Assigned
                | Self::Accepted
                | Self::InProgress
                | Self::CompletedPendingPayment
                | Self::PaidVerified
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::PaidVerified | Self::Cancelled)
    }

    pub fn can_cancel(&self) -> bool {
        !matches!(
            self,
            Self::CompletedPendingPayment | Self::PaidVerified | Self::Cancelled
        )
    }

    /// Rescheduling shares the cancellation cut-off.
    pub fn can_reschedule(&self) -> bool {
        self.can_cancel()
    }

    pub fn can_assign(&self) -> bool {
        matches!(self, Self::Unassigned | Self::Assigned | Self::Accepted)
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "work_orders")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    #[sea_orm(unique)]
    pub number: String,
    pub title: String,
    pub description: Option<String>,
    pub address: Option<String>,
    pub status: WorkOrderStatus,
    pub customer_id: Uuid,
    pub technician_id: Option<Uuid>,
    pub dispatcher_id: Option<Uuid>,
    pub service_request_id: Option<Uuid>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub assigned_at: Option<DateTime<Utc>>,
    pub response_deadline_at: Option<DateTime<Utc>>,
    pub accepted_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub paid_verified_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub cancel_reason: Option<String>,
    pub completion_notes: Option<String>,
    #[sea_orm(column_type = "Json", nullable)]
    pub materials: Option<Json>,
    pub version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub fn is_assigned_to(&self, technician_id: Uuid) -> bool {
        self.technician_id == Some(technician_id)
    }

    /// The technician/status pairing every transition must preserve.
    pub fn technician_invariant_holds(&self) -> bool {
        self.technician_id.is_some() == self.status.requires_technician()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancellation_cut_off_matches_payment_stage() {
        assert!(WorkOrderStatus::Unassigned.can_cancel());
        assert!(WorkOrderStatus::Assigned.can_cancel());
        assert!(WorkOrderStatus::InProgress.can_cancel());
        assert!(!WorkOrderStatus::CompletedPendingPayment.can_cancel());
        assert!(!WorkOrderStatus::PaidVerified.can_cancel());
        assert!(!WorkOrderStatus::Cancelled.can_cancel());
    }

    #[test]
    fn status_displays_as_wire_name() {
        assert_eq!(
            WorkOrderStatus::CompletedPendingPayment.to_string(),
            "COMPLETED_PENDING_PAYMENT"
        );
        assert_eq!(
            serde_json::to_string(&WorkOrderStatus::InProgress).unwrap(),
            "\"IN_PROGRESS\""
        );
    }
}
