use chrono::{DateTime, Utc};
use sea_orm::{ActiveValue::Set, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder};

use crate::entities::work_order::{
    ActiveModel as WorkOrderActiveModel, Column, Entity as WorkOrder, Model as WorkOrderModel,
    WorkOrderStatus,
};
use crate::errors::ServiceError;

/// Work order reads and versioned writes.
///
/// Writes go through [`WorkOrderRepository::compare_and_set`], which only
/// succeeds when the row still carries the version the caller read.
pub struct WorkOrderRepository;

impl WorkOrderRepository {
    /// Work orders currently awaiting a technician response, oldest deadline first.
    pub async fn find_awaiting_response<C: ConnectionTrait>(
        conn: &C,
    ) -> Result<Vec<WorkOrderModel>, ServiceError> {
        Ok(WorkOrder::find()
            .filter(Column::Status.eq(WorkOrderStatus::Assigned))
            .order_by_asc(Column::ResponseDeadlineAt)
            .all(conn)
            .await?)
    }

    pub async fn load<C: ConnectionTrait>(
        conn: &C,
        id: i32,
    ) -> Result<WorkOrderModel, ServiceError> {
        WorkOrder::find_by_id(id)
            .one(conn)
            .await?
            .ok_or_else(|| ServiceError::not_found("Work order", id))
    }

    /// Applies `changes` if the row is still at `current.version`, bumping the
    /// version and `updated_at`. Returns the row as written.
    pub async fn compare_and_set<C: ConnectionTrait>(
        conn: &C,
        current: &WorkOrderModel,
        mut changes: WorkOrderActiveModel,
        now: DateTime<Utc>,
    ) -> Result<WorkOrderModel, ServiceError> {
        changes.version = Set(current.version + 1);
        changes.updated_at = Set(now);

        let result = WorkOrder::update_many()
            .set(changes)
            .filter(Column::Id.eq(current.id))
            .filter(Column::Version.eq(current.version))
            .exec(conn)
            .await?;

        if result.rows_affected == 0 {
            return Err(ServiceError::concurrent("work order", current.id));
        }

        Self::load(conn, current.id).await
    }
}
