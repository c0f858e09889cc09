use chrono::Utc;
use sea_orm::{ActiveModelTrait, ActiveValue::Set, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder};
use serde_json::Value;
use uuid::Uuid;

use crate::entities::audit_log::{self, Entity as AuditLog};
use crate::errors::ServiceError;

/// Append-only audit trail writes.
pub struct AuditLogRepository;

impl AuditLogRepository {
    pub async fn record<C: ConnectionTrait>(
        conn: &C,
        entity_type: &str,
        entity_id: impl ToString,
        action: &str,
        actor_id: Option<Uuid>,
        details: Value,
    ) -> Result<audit_log::Model, ServiceError> {
        let entry = audit_log::ActiveModel {
            id: Set(Uuid::new_v4()),
            entity_type: Set(entity_type.to_string()),
            entity_id: Set(entity_id.to_string()),
            action: Set(action.to_string()),
            actor_id: Set(actor_id),
            details: Set(details),
            created_at: Set(Utc::now()),
        };
        Ok(entry.insert(conn).await?)
    }

    pub async fn for_entity<C: ConnectionTrait>(
        conn: &C,
        entity_type: &str,
        entity_id: impl ToString,
    ) -> Result<Vec<audit_log::Model>, ServiceError> {
        Ok(AuditLog::find()
            .filter(audit_log::Column::EntityType.eq(entity_type))
            .filter(audit_log::Column::EntityId.eq(entity_id.to_string()))
            .order_by_asc(audit_log::Column::CreatedAt)
            .all(conn)
            .await?)
    }

    /// Most recent entry for `action` on the entity, if any.
    pub async fn latest<C: ConnectionTrait>(
        conn: &C,
        entity_type: &str,
        entity_id: impl ToString,
        action: &str,
    ) -> Result<Option<audit_log::Model>, ServiceError> {
        Ok(AuditLog::find()
            .filter(audit_log::Column::EntityType.eq(entity_type))
            .filter(audit_log::Column::EntityId.eq(entity_id.to_string()))
            .filter(audit_log::Column::Action.eq(action))
            .order_by_desc(audit_log::Column::CreatedAt)
            .one(conn)
            .await?)
    }
}
