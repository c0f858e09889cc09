use axum::{
    extract::{Json, Path, State},
    response::Response,
    routing::{get, post},
    Router,
};

use super::common::{created_response, success_response};
use crate::{
    errors::ServiceError,
    services::{
        work_orders::{
            AssignInput, CancelInput, CompleteInput, CreateWorkOrderInput, RescheduleInput,
            RespondInput, StartInput,
        },
        Actor,
    },
    AppState,
};

pub fn work_orders_router() -> Router<AppState> {
    Router::new()
        .route("/work-orders", post(create_work_order))
        .route("/work-orders/:id", get(get_work_order))
        .route("/work-orders/:id/assign", post(assign_work_order))
        .route("/work-orders/:id/unassign", post(unassign_work_order))
        .route("/work-orders/:id/respond", post(respond_to_work_order))
        .route("/work-orders/:id/start", post(start_work_order))
        .route("/work-orders/:id/complete", post(complete_work_order))
        .route("/work-orders/:id/cancel", post(cancel_work_order))
        .route("/work-orders/:id/reschedule", post(reschedule_work_order))
}

async fn create_work_order(
    State(state): State<AppState>,
    actor: Actor,
    Json(input): Json<CreateWorkOrderInput>,
) -> Result<Response, ServiceError> {
    let created = state.services.work_orders.create(&actor, input).await?;
    Ok(created_response(created))
}

async fn get_work_order(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<i32>,
) -> Result<Response, ServiceError> {
    let view = state.services.work_orders.get(&actor, id).await?;
    Ok(success_response(view))
}

async fn assign_work_order(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<i32>,
    Json(input): Json<AssignInput>,
) -> Result<Response, ServiceError> {
    let updated = state.services.work_orders.assign(&actor, id, input).await?;
    Ok(success_response(updated))
}

async fn unassign_work_order(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<i32>,
) -> Result<Response, ServiceError> {
    let updated = state.services.work_orders.unassign(&actor, id).await?;
    Ok(success_response(updated))
}

async fn respond_to_work_order(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<i32>,
    Json(input): Json<RespondInput>,
) -> Result<Response, ServiceError> {
    let updated = state.services.work_orders.respond(&actor, id, input).await?;
    Ok(success_response(updated))
}

async fn start_work_order(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<i32>,
    Json(input): Json<StartInput>,
) -> Result<Response, ServiceError> {
    let updated = state.services.work_orders.start(&actor, id, input).await?;
    Ok(success_response(updated))
}

async fn complete_work_order(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<i32>,
    Json(input): Json<CompleteInput>,
) -> Result<Response, ServiceError> {
    let updated = state.services.work_orders.complete(&actor, id, input).await?;
    Ok(success_response(updated))
}

async fn cancel_work_order(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<i32>,
    Json(input): Json<CancelInput>,
) -> Result<Response, ServiceError> {
    let updated = state.services.work_orders.cancel(&actor, id, input).await?;
    Ok(success_response(updated))
}

async fn reschedule_work_order(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<i32>,
    Json(input): Json<RescheduleInput>,
) -> Result<Response, ServiceError> {
    let updated = state
        .services
        .work_orders
        .reschedule(&actor, id, input)
        .await?;
    Ok(success_response(updated))
}
