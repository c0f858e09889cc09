use axum::{
    extract::{Json, Path, State},
    response::Response,
    routing::put,
    Router,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use uuid::Uuid;

use super::common::success_response;
use crate::{entities::commission::CommissionKind, errors::ServiceError, services::Actor, AppState};

#[derive(Debug, Deserialize)]
pub struct SystemRateRequest {
    pub kind: CommissionKind,
    pub rate: Decimal,
}

#[derive(Debug, Deserialize)]
pub struct TechnicianRateRequest {
    pub rate: Option<Decimal>,
    pub enabled: bool,
}

pub fn rates_router() -> Router<AppState> {
    Router::new()
        .route("/commission-rates", put(set_system_rate))
        .route(
            "/technicians/:technician_id/commission-rate",
            put(set_technician_rate),
        )
}

async fn set_system_rate(
    State(state): State<AppState>,
    actor: Actor,
    Json(body): Json<SystemRateRequest>,
) -> Result<Response, ServiceError> {
    let saved = state
        .services
        .ledger
        .rates()
        .set_system_rate(&actor, body.kind, body.rate)
        .await?;
    Ok(success_response(saved))
}

async fn set_technician_rate(
    State(state): State<AppState>,
    actor: Actor,
    Path(technician_id): Path<Uuid>,
    Json(body): Json<TechnicianRateRequest>,
) -> Result<Response, ServiceError> {
    let technician = state
        .services
        .ledger
        .rates()
        .set_technician_rate(&actor, technician_id, body.rate, body.enabled)
        .await?;
    Ok(success_response(technician))
}
