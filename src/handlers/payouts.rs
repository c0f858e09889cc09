use axum::{
    extract::{Json, Path, State},
    response::Response,
    routing::post,
    Router,
};
use serde::Deserialize;
use uuid::Uuid;

use super::common::{created_response, success_response};
use crate::{
    errors::ServiceError,
    services::{
        compensation::{EarlyPayoutInput, PayoutReviewInput},
        Actor,
    },
    AppState,
};

#[derive(Debug, Deserialize)]
pub struct MarkPaidRequest {
    pub payment_reference: String,
}

pub fn payouts_router() -> Router<AppState> {
    Router::new()
        .route("/payout-requests", post(request_early_payout))
        .route("/payout-requests/:id/review", post(review_payout_request))
        .route("/payouts/weekly-batch", post(create_weekly_batch))
        .route("/payouts/:id/process", post(process_payout))
        .route("/payouts/:id/mark-paid", post(mark_payout_paid))
        .route(
            "/payouts/technicians/:technician_id/mark-paid",
            post(mark_technician_paid),
        )
        .route(
            "/payouts/technicians/:technician_id/on-demand",
            post(create_on_demand_payout),
        )
}

async fn request_early_payout(
    State(state): State<AppState>,
    actor: Actor,
    Json(input): Json<EarlyPayoutInput>,
) -> Result<Response, ServiceError> {
    let request = state
        .services
        .ledger
        .request_early_payout(&actor, input)
        .await?;
    Ok(created_response(request))
}

async fn review_payout_request(
    State(state): State<AppState>,
    actor: Actor,
    Path(request_id): Path<Uuid>,
    Json(input): Json<PayoutReviewInput>,
) -> Result<Response, ServiceError> {
    let reviewed = state
        .services
        .ledger
        .review_payout_request(&actor, request_id, input)
        .await?;
    Ok(success_response(reviewed))
}

async fn create_weekly_batch(
    State(state): State<AppState>,
    actor: Actor,
) -> Result<Response, ServiceError> {
    let payouts = state.services.ledger.create_weekly_batch(&actor).await?;
    Ok(created_response(payouts))
}

async fn process_payout(
    State(state): State<AppState>,
    actor: Actor,
    Path(payout_id): Path<Uuid>,
) -> Result<Response, ServiceError> {
    let payout = state
        .services
        .payouts
        .process_batch(&actor, payout_id)
        .await?;
    Ok(success_response(payout))
}

async fn mark_payout_paid(
    State(state): State<AppState>,
    actor: Actor,
    Path(payout_id): Path<Uuid>,
    Json(request): Json<MarkPaidRequest>,
) -> Result<Response, ServiceError> {
    let payout = state
        .services
        .payouts
        .mark_batch_paid(&actor, payout_id, request.payment_reference)
        .await?;
    Ok(success_response(payout))
}

async fn mark_technician_paid(
    State(state): State<AppState>,
    actor: Actor,
    Path(technician_id): Path<Uuid>,
    Json(request): Json<MarkPaidRequest>,
) -> Result<Response, ServiceError> {
    let payout = state
        .services
        .payouts
        .mark_technician_paid(&actor, technician_id, request.payment_reference)
        .await?;
    Ok(success_response(payout))
}

async fn create_on_demand_payout(
    State(state): State<AppState>,
    actor: Actor,
    Path(technician_id): Path<Uuid>,
) -> Result<Response, ServiceError> {
    let payout = state
        .services
        .ledger
        .create_on_demand_payout(&actor, technician_id)
        .await?;
    Ok(created_response(payout))
}
