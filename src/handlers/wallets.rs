use axum::{
    extract::{Json, Path, Query, State},
    response::Response,
    routing::{get, post},
    Router,
};
use uuid::Uuid;

use super::common::{created_response, success_response, LimitParams};
use crate::{
    errors::ServiceError,
    services::{compensation::WalletAdjustmentInput, Actor},
    AppState,
};

pub fn wallets_router() -> Router<AppState> {
    Router::new()
        .route("/:technician_id", get(get_wallet))
        .route("/:technician_id/transactions", get(list_transactions))
        .route("/:technician_id/adjustments", post(adjust_wallet))
}

async fn get_wallet(
    State(state): State<AppState>,
    actor: Actor,
    Path(technician_id): Path<Uuid>,
) -> Result<Response, ServiceError> {
    let summary = state
        .services
        .ledger
        .wallet_summary(&actor, technician_id)
        .await?;
    Ok(success_response(summary))
}

async fn list_transactions(
    State(state): State<AppState>,
    actor: Actor,
    Path(technician_id): Path<Uuid>,
    Query(params): Query<LimitParams>,
) -> Result<Response, ServiceError> {
    let lines = state
        .services
        .ledger
        .list_transactions(&actor, technician_id, params.limit)
        .await?;
    Ok(success_response(lines))
}

async fn adjust_wallet(
    State(state): State<AppState>,
    actor: Actor,
    Path(technician_id): Path<Uuid>,
    Json(input): Json<WalletAdjustmentInput>,
) -> Result<Response, ServiceError> {
    let line = state
        .services
        .ledger
        .adjust_wallet(&actor, technician_id, input)
        .await?;
    Ok(created_response(line))
}
