use async_trait::async_trait;
use axum::{
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

use crate::entities::user::UserRole;
use crate::errors::ServiceError;
use crate::services::Actor;

/// Caller id, set by the upstream gateway after authentication.
pub const ACTOR_ID_HEADER: &str = "x-actor-id";
/// Caller role: ADMIN, DISPATCHER, TECHNICIAN or CUSTOMER.
pub const ACTOR_ROLE_HEADER: &str = "x-actor-role";

/// Standard success envelope
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
    pub timestamp: String,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data,
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

/// Standard success response
pub fn success_response<T: Serialize>(data: T) -> Response {
    (StatusCode::OK, Json(ApiResponse::success(data))).into_response()
}

/// Standard created response
pub fn created_response<T: Serialize>(data: T) -> Response {
    (StatusCode::CREATED, Json(ApiResponse::success(data))).into_response()
}

#[derive(Debug, Deserialize)]
pub struct LimitParams {
    #[serde(default = "default_limit")]
    pub limit: u64,
}

fn default_limit() -> u64 {
    50
}

impl Default for LimitParams {
    fn default() -> Self {
        Self {
            limit: default_limit(),
        }
    }
}

fn header<'a>(parts: &'a Parts, name: &str) -> Result<&'a str, ServiceError> {
    parts
        .headers
        .get(name)
        .ok_or_else(|| ServiceError::Unauthorized(format!("missing {} header", name)))?
        .to_str()
        .map_err(|_| ServiceError::Unauthorized(format!("{} header is not valid text", name)))
}

#[async_trait]
impl<S> FromRequestParts<S> for Actor
where
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let id = Uuid::parse_str(header(parts, ACTOR_ID_HEADER)?.trim()).map_err(|_| {
            ServiceError::Unauthorized(format!("{} header is not a UUID", ACTOR_ID_HEADER))
        })?;
        let role = UserRole::from_str(header(parts, ACTOR_ROLE_HEADER)?.trim()).map_err(|_| {
            ServiceError::Unauthorized(format!("{} header is not a known role", ACTOR_ROLE_HEADER))
        })?;
        Ok(Actor::new(id, role))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    async fn extract(builder: axum::http::request::Builder) -> Result<Actor, ServiceError> {
        let (mut parts, _) = builder.body(()).unwrap().into_parts();
        Actor::from_request_parts(&mut parts, &()).await
    }

    #[tokio::test]
    async fn actor_is_read_from_gateway_headers() {
        let id = Uuid::new_v4();
        let actor = extract(
            Request::builder()
                .header(ACTOR_ID_HEADER, id.to_string())
                .header(ACTOR_ROLE_HEADER, "dispatcher"),
        )
        .await
        .unwrap();
        assert_eq!(actor, Actor::new(id, UserRole::Dispatcher));
    }

    #[tokio::test]
    async fn missing_or_malformed_headers_are_unauthorized() {
        let err = extract(Request::builder()).await.unwrap_err();
        assert_eq!(err.status_code(), StatusCode::UNAUTHORIZED);

        let err = extract(
            Request::builder()
                .header(ACTOR_ID_HEADER, "not-a-uuid")
                .header(ACTOR_ROLE_HEADER, "ADMIN"),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ServiceError::Unauthorized(_)));

        let err = extract(
            Request::builder()
                .header(ACTOR_ID_HEADER, Uuid::new_v4().to_string())
                .header(ACTOR_ROLE_HEADER, "janitor"),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ServiceError::Unauthorized(_)));
    }
}
