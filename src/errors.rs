use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use rust_decimal::Decimal;
use sea_orm::error::DbErr;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entities::work_order::WorkOrderStatus;

/// Error body returned by every HTTP endpoint.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// HTTP status category (e.g., "Not Found", "Gone")
    pub error: String,
    /// Stable machine-readable reason code (e.g., "response_window_expired")
    pub code: String,
    /// Human-readable error description naming the failed precondition
    pub message: String,
    /// RFC 3339 timestamp when the error occurred
    pub timestamp: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] DbErr),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Invalid location: {0}")]
    InvalidLocation(String),

    #[error("Invalid materials format: {0}")]
    InvalidMaterialsFormat(String),

    #[error("Invalid commission amount: {0}")]
    InvalidCommissionAmount(String),

    #[error("Cannot {action} work order {work_order_id} while it is {from}")]
    InvalidTransition {
        work_order_id: i32,
        from: WorkOrderStatus,
        action: &'static str,
    },

    #[error("Response window for work order {0} has expired")]
    ResponseWindowExpired(i32),

    #[error("Work order {0} is not assigned to you")]
    NotAssignedToYou(i32),

    #[error("Work order {0} has already been responded to")]
    AlreadyResponded(i32),

    #[error("Concurrent modification of {entity} {id}")]
    ConcurrentModification { entity: &'static str, id: String },

    #[error("Technician {0} is blocked")]
    TechnicianBlocked(Uuid),

    #[error("Technician {0} not found")]
    TechnicianNotFound(Uuid),

    #[error("User {0} does not have the technician role")]
    InvalidTechnicianRole(Uuid),

    #[error("Insufficient wallet balance: requested {requested}, available {available}")]
    InsufficientBalance {
        requested: Decimal,
        available: Decimal,
    },

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal error: {0}")]
    InternalError(String),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::ValidationError(err.to_string())
    }
}

impl ServiceError {
    pub fn not_found(entity: &str, id: impl std::fmt::Display) -> Self {
        ServiceError::NotFound(format!("{} {} not found", entity, id))
    }

    pub fn concurrent(entity: &'static str, id: impl ToString) -> Self {
        ServiceError::ConcurrentModification {
            entity,
            id: id.to_string(),
        }
    }

    /// Returns the HTTP status code for this error.
    /// This is the single source of truth for error-to-status mapping.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) | Self::TechnicianNotFound(_) => StatusCode::NOT_FOUND,
            Self::ValidationError(_)
            | Self::InvalidLocation(_)
            | Self::InvalidMaterialsFormat(_) => StatusCode::BAD_REQUEST,
            Self::InvalidCommissionAmount(_)
            | Self::InsufficientBalance { .. }
            | Self::TechnicianBlocked(_)
            | Self::InvalidTechnicianRole(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::InvalidTransition { .. }
            | Self::AlreadyResponded(_)
            | Self::ConcurrentModification { .. }
            | Self::Conflict(_) => StatusCode::CONFLICT,
            Self::ResponseWindowExpired(_) => StatusCode::GONE,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::NotAssignedToYou(_) | Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::DatabaseError(_) | Self::InternalError(_) | Self::Other(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Stable reason code surfaced alongside the message.
    pub fn code(&self) -> &'static str {
        match self {
            Self::DatabaseError(_) => "database_error",
            Self::NotFound(_) => "not_found",
            Self::ValidationError(_) => "validation_error",
            Self::InvalidLocation(_) => "invalid_location",
            Self::InvalidMaterialsFormat(_) => "invalid_materials_format",
            Self::InvalidCommissionAmount(_) => "invalid_commission_amount",
            Self::InvalidTransition { .. } => "invalid_transition",
            Self::ResponseWindowExpired(_) => "response_window_expired",
            Self::NotAssignedToYou(_) => "not_assigned_to_you",
            Self::AlreadyResponded(_) => "already_responded",
            Self::ConcurrentModification { .. } => "concurrent_modification",
            Self::TechnicianBlocked(_) => "technician_blocked",
            Self::TechnicianNotFound(_) => "technician_not_found",
            Self::InvalidTechnicianRole(_) => "invalid_technician_role",
            Self::InsufficientBalance { .. } => "insufficient_balance",
            Self::Unauthorized(_) => "unauthorized",
            Self::Forbidden(_) => "forbidden",
            Self::Conflict(_) => "conflict",
            Self::InternalError(_) | Self::Other(_) => "internal_error",
        }
    }

    /// Returns the error message suitable for HTTP responses.
    /// Internal errors return generic messages to avoid leaking implementation details.
    pub fn response_message(&self) -> String {
        match self {
            Self::DatabaseError(_) => "Database error".to_string(),
            Self::InternalError(_) | Self::Other(_) => "Internal server error".to_string(),
            _ => self.to_string(),
        }
    }

    /// Transient store faults worth retrying from background callbacks.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::DatabaseError(DbErr::ConnectionAcquire(_)) | Self::DatabaseError(DbErr::Conn(_))
        )
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }

        let body = ErrorResponse {
            error: status.canonical_reason().unwrap_or("Error").to_string(),
            code: self.code().to_string(),
            message: self.response_message(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use rust_decimal_macros::dec;

    #[test]
    fn service_error_status_code_mapping() {
        assert_eq!(
            ServiceError::ResponseWindowExpired(7).status_code(),
            StatusCode::GONE
        );
        assert_eq!(
            ServiceError::NotAssignedToYou(7).status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            ServiceError::TechnicianNotFound(Uuid::nil()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ServiceError::InvalidTransition {
                work_order_id: 1,
                from: WorkOrderStatus::Cancelled,
                action: "start",
            }
            .status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ServiceError::InsufficientBalance {
                requested: dec!(100),
                available: dec!(42),
            }
            .status_code(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            ServiceError::InternalError("x".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn insufficient_balance_names_both_amounts() {
        let err = ServiceError::InsufficientBalance {
            requested: dec!(100),
            available: dec!(42),
        };
        assert_eq!(
            err.to_string(),
            "Insufficient wallet balance: requested 100, available 42"
        );
    }

    #[test]
    fn response_message_hides_internal_details() {
        assert_eq!(
            ServiceError::InternalError("pool exhausted".into()).response_message(),
            "Internal server error"
        );
        assert_eq!(
            ServiceError::Forbidden("not your work order".into()).response_message(),
            "Forbidden: not your work order"
        );
    }

    #[tokio::test]
    async fn error_response_carries_reason_code() {
        let response = ServiceError::ResponseWindowExpired(12).into_response();
        assert_eq!(response.status(), StatusCode::GONE);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let payload: ErrorResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(payload.code, "response_window_expired");
        assert_eq!(payload.error, "Gone");
    }
}
