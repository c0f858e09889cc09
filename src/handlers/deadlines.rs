use axum::{
    extract::{Path, State},
    response::Response,
    routing::{get, post},
    Router,
};
use serde::Serialize;

use super::common::success_response;
use crate::{
    errors::ServiceError,
    services::{response_deadlines::RemainingTime, Actor},
    AppState,
};

#[derive(Debug, Serialize)]
struct DeadlineStatus {
    work_order_id: i32,
    registered: bool,
    remaining: Option<RemainingTime>,
}

pub fn deadlines_router() -> Router<AppState> {
    Router::new()
        .route("/work-orders/:id/deadline", get(get_deadline))
        .route("/deadlines", get(list_deadlines))
        .route("/deadlines/reconcile", post(reconcile_deadlines))
}

async fn get_deadline(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<i32>,
) -> Result<Response, ServiceError> {
    let view = state.services.work_orders.get(&actor, id).await?;
    Ok(success_response(DeadlineStatus {
        work_order_id: id,
        registered: state.services.deadlines.is_registered(id),
        remaining: view.deadline,
    }))
}

async fn list_deadlines(
    State(state): State<AppState>,
    actor: Actor,
) -> Result<Response, ServiceError> {
    actor.require_staff("list response deadlines")?;
    Ok(success_response(state.services.deadlines.list_active()))
}

async fn reconcile_deadlines(
    State(state): State<AppState>,
    actor: Actor,
) -> Result<Response, ServiceError> {
    actor.require_admin("reconcile response deadlines")?;
    let report = state.services.deadlines.reconcile().await?;
    Ok(success_response(report))
}
