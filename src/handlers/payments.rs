use axum::{
    extract::{Json, Path, State},
    response::Response,
    routing::post,
    Router,
};
use uuid::Uuid;

use super::common::{created_response, success_response};
use crate::{
    errors::ServiceError,
    services::{
        payments::{SubmitPaymentInput, VerifyPaymentInput},
        Actor,
    },
    AppState,
};

pub fn payments_router() -> Router<AppState> {
    Router::new()
        .route("/work-orders/:id/payments", post(submit_payment))
        .route("/payments/:id/verify", post(verify_payment))
}

async fn submit_payment(
    State(state): State<AppState>,
    actor: Actor,
    Path(work_order_id): Path<i32>,
    Json(input): Json<SubmitPaymentInput>,
) -> Result<Response, ServiceError> {
    let payment = state
        .services
        .payments
        .submit_payment(&actor, work_order_id, input)
        .await?;
    Ok(created_response(payment))
}

async fn verify_payment(
    State(state): State<AppState>,
    actor: Actor,
    Path(payment_id): Path<Uuid>,
    Json(input): Json<VerifyPaymentInput>,
) -> Result<Response, ServiceError> {
    let review = state
        .services
        .payments
        .verify_payment(&actor, payment_id, input)
        .await?;
    Ok(success_response(review))
}
