mod common;

use assert_matches::assert_matches;
use chrono::Duration;
use sea_orm::{ActiveModelTrait, ActiveValue::Set, ColumnTrait, EntityTrait, QueryFilter};
use serde_json::json;

use common::TestApp;
use fieldops_api::{
    entities::{
        check_in,
        user::{self, Presence, UserRole},
        work_order::WorkOrderStatus,
        CheckIn,
    },
    errors::ServiceError,
    notifications::NotificationType,
    services::work_orders::{
        AssignInput, CancelInput, CompleteInput, RescheduleInput, RespondInput, ResponseAction,
        StartInput,
    },
};

fn on_site() -> StartInput {
    StartInput {
        latitude: 6.5244,
        longitude: 3.3792,
    }
}

fn decline(reason: Option<&str>) -> RespondInput {
    RespondInput {
        response: ResponseAction::Decline,
        decline_reason: reason.map(str::to_string),
    }
}

#[tokio::test]
async fn full_lifecycle_keeps_technician_invariant() {
    let app = TestApp::new().await;
    let tech = app.freelancer("Tunde").await;
    let machine = &app.state.services.work_orders;

    let wo = app.create_work_order("Fix AC").await;
    assert_eq!(wo.status, WorkOrderStatus::Unassigned);
    assert!(wo.number.starts_with("WO-20240603-"));
    assert!(wo.technician_invariant_holds());

    let assigned = app.assign(wo.id, &tech, Some(30)).await;
    assert_eq!(assigned.status, WorkOrderStatus::Assigned);
    assert_eq!(
        assigned.response_deadline_at,
        Some(app.clock_now() + Duration::minutes(30))
    );
    assert!(assigned.technician_invariant_holds());

    let accepted = app.accept(wo.id, &tech).await;
    assert_eq!(accepted.status, WorkOrderStatus::Accepted);
    assert!(accepted.response_deadline_at.is_none());

    let started = machine.start(&tech, wo.id, on_site()).await.unwrap();
    assert_eq!(started.status, WorkOrderStatus::InProgress);
    assert_eq!(app.user(tech.id).await.presence, Presence::Busy);

    let completed = machine
        .complete(
            &tech,
            wo.id,
            CompleteInput {
                notes: Some("Replaced capacitor".into()),
                materials: Some(json!([{ "name": "capacitor", "qty": 1 }])),
            },
        )
        .await
        .unwrap();
    assert_eq!(completed.status, WorkOrderStatus::CompletedPendingPayment);
    assert_eq!(completed.completion_notes.as_deref(), Some("Replaced capacitor"));
    assert!(completed.technician_invariant_holds());
    assert_eq!(app.user(tech.id).await.presence, Presence::Available);

    let check_ins = CheckIn::find()
        .filter(check_in::Column::WorkOrderId.eq(wo.id))
        .all(&*app.db)
        .await
        .unwrap();
    assert_eq!(check_ins.len(), 1);
    assert_eq!(check_ins[0].technician_id, tech.id);

    let commission = app.paid_job_for(wo.id, &tech).await;
    assert_eq!(commission.work_order_id, wo.id);

    let view = machine.get(&app.dispatcher, wo.id).await.unwrap();
    assert_eq!(view.work_order.status, WorkOrderStatus::PaidVerified);
    assert!(view.work_order.technician_invariant_holds());
    assert!(view.work_order.version > wo.version);
}

#[tokio::test]
async fn only_staff_create_work_orders() {
    let app = TestApp::new().await;
    let tech = app.freelancer("Tunde").await;

    let result = app
        .state
        .services
        .work_orders
        .create(
            &tech,
            fieldops_api::services::work_orders::CreateWorkOrderInput {
                title: "Leaking tap".into(),
                description: None,
                address: None,
                customer_id: app.customer.id,
                scheduled_at: None,
                service_request_id: None,
            },
        )
        .await;
    assert_matches!(result, Err(ServiceError::Forbidden(_)));
}

#[tokio::test]
async fn assignment_rejects_unusable_technicians() {
    let app = TestApp::new().await;
    let wo = app.create_work_order("Fix AC").await;
    let machine = &app.state.services.work_orders;

    let unknown = uuid::Uuid::new_v4();
    let result = machine
        .assign(
            &app.dispatcher,
            wo.id,
            AssignInput {
                technician_id: unknown,
                response_window_minutes: None,
            },
        )
        .await;
    assert_matches!(result, Err(ServiceError::TechnicianNotFound(id)) if id == unknown);

    let result = machine
        .assign(
            &app.dispatcher,
            wo.id,
            AssignInput {
                technician_id: app.customer.id,
                response_window_minutes: None,
            },
        )
        .await;
    assert_matches!(result, Err(ServiceError::InvalidTechnicianRole(_)));

    let blocked = app.freelancer("Blocked Ben").await;
    let mut active: user::ActiveModel = app.user(blocked.id).await.into();
    active.is_blocked = Set(true);
    active.update(&*app.db).await.unwrap();
    let result = machine
        .assign(
            &app.dispatcher,
            wo.id,
            AssignInput {
                technician_id: blocked.id,
                response_window_minutes: None,
            },
        )
        .await;
    assert_matches!(result, Err(ServiceError::TechnicianBlocked(_)));

    let view = machine.get(&app.dispatcher, wo.id).await.unwrap();
    assert_eq!(view.work_order.status, WorkOrderStatus::Unassigned);
    assert!(view.work_order.technician_id.is_none());
}

#[tokio::test]
async fn reassignment_notifies_previous_technician() {
    let app = TestApp::new().await;
    let first = app.freelancer("First").await;
    let second = app.freelancer("Second").await;
    let wo = app.create_work_order("Fix AC").await;

    app.assign(wo.id, &first, None).await;
    let reassigned = app.assign(wo.id, &second, None).await;
    assert_eq!(reassigned.technician_id, Some(second.id));

    let scheduler = &app.state.services.deadlines;
    let active = scheduler.list_active();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].technician_id, second.id);

    assert!(
        app.gateway
            .wait_for(
                first.id,
                NotificationType::WorkOrderCancelled,
                std::time::Duration::from_secs(1)
            )
            .await
    );
    assert!(
        app.gateway
            .wait_for(
                second.id,
                NotificationType::WorkOrderAssigned,
                std::time::Duration::from_secs(1)
            )
            .await
    );

    let result = app
        .state
        .services
        .work_orders
        .respond(
            &first,
            wo.id,
            RespondInput {
                response: ResponseAction::Accept,
                decline_reason: None,
            },
        )
        .await;
    assert_matches!(result, Err(ServiceError::NotAssignedToYou(_)));
}

#[tokio::test]
async fn assigning_same_technician_twice_is_a_no_op() {
    let app = TestApp::new().await;
    let tech = app.freelancer("Tunde").await;
    let wo = app.create_work_order("Fix AC").await;

    let first = app.assign(wo.id, &tech, Some(30)).await;
    app.advance(Duration::minutes(5));
    let second = app.assign(wo.id, &tech, Some(30)).await;
    assert_eq!(first.version, second.version);
    assert_eq!(first.response_deadline_at, second.response_deadline_at);
}

#[tokio::test]
async fn decline_returns_work_order_to_dispatch() {
    let app = TestApp::new().await;
    let tech = app.freelancer("Tunde").await;
    let wo = app.create_work_order("Fix AC").await;
    app.assign(wo.id, &tech, None).await;

    let declined = app
        .state
        .services
        .work_orders
        .respond(&tech, wo.id, decline(None))
        .await
        .unwrap();
    assert_eq!(declined.status, WorkOrderStatus::Unassigned);
    assert!(declined.technician_id.is_none());
    assert!(declined.response_deadline_at.is_none());
    assert_eq!(declined.cancel_reason.as_deref(), Some("declined by technician"));
    assert!(!app.state.services.deadlines.is_registered(wo.id));

    assert!(
        app.gateway
            .wait_for(
                app.dispatcher.id,
                NotificationType::WorkOrderDeclined,
                std::time::Duration::from_secs(1)
            )
            .await
    );
}

#[tokio::test]
async fn second_response_is_rejected() {
    let app = TestApp::new().await;
    let tech = app.freelancer("Tunde").await;
    let wo = app.create_work_order("Fix AC").await;
    app.assign(wo.id, &tech, None).await;
    app.accept(wo.id, &tech).await;

    let again = app
        .state
        .services
        .work_orders
        .respond(&tech, wo.id, decline(Some("changed my mind")))
        .await;
    assert_matches!(again, Err(ServiceError::AlreadyResponded(id)) if id == wo.id);
}

#[tokio::test]
async fn concurrent_accepts_produce_one_winner() {
    let app = TestApp::new().await;
    let tech = app.freelancer("Tunde").await;
    let wo = app.create_work_order("Fix AC").await;
    app.assign(wo.id, &tech, None).await;

    let machine = &app.state.services.work_orders;
    let accept = || RespondInput {
        response: ResponseAction::Accept,
        decline_reason: None,
    };
    let (a, b) = tokio::join!(
        machine.respond(&tech, wo.id, accept()),
        machine.respond(&tech, wo.id, accept())
    );

    let outcomes = [a, b];
    let wins = outcomes.iter().filter(|r| r.is_ok()).count();
    assert_eq!(wins, 1);
    assert!(outcomes
        .iter()
        .any(|r| matches!(r, Err(ServiceError::AlreadyResponded(_)))));
}

#[tokio::test]
async fn start_requires_acceptance_and_valid_location() {
    let app = TestApp::new().await;
    let tech = app.freelancer("Tunde").await;
    let other = app.freelancer("Other").await;
    let wo = app.create_work_order("Fix AC").await;
    app.assign(wo.id, &tech, None).await;
    let machine = &app.state.services.work_orders;

    let early = machine.start(&tech, wo.id, on_site()).await;
    assert_matches!(
        early,
        Err(ServiceError::InvalidTransition { from: WorkOrderStatus::Assigned, .. })
    );

    app.accept(wo.id, &tech).await;

    let stranger = machine.start(&other, wo.id, on_site()).await;
    assert_matches!(stranger, Err(ServiceError::NotAssignedToYou(_)));

    let off_map = machine
        .start(
            &tech,
            wo.id,
            StartInput {
                latitude: 91.0,
                longitude: 0.0,
            },
        )
        .await;
    assert_matches!(off_map, Err(ServiceError::InvalidLocation(_)));

    let still = machine.get(&tech, wo.id).await.unwrap();
    assert_eq!(still.work_order.status, WorkOrderStatus::Accepted);
}

#[tokio::test]
async fn complete_accepts_material_list_encoded_as_string() {
    let app = TestApp::new().await;
    let tech = app.freelancer("Tunde").await;
    let wo = app.create_work_order("Fix AC").await;
    app.assign(wo.id, &tech, None).await;
    app.accept(wo.id, &tech).await;
    let machine = &app.state.services.work_orders;

    let bad = machine
        .complete(
            &tech,
            wo.id,
            CompleteInput {
                notes: None,
                materials: Some(json!({ "name": "pipe" })),
            },
        )
        .await;
    assert_matches!(bad, Err(ServiceError::InvalidMaterialsFormat(_)));

    let done = machine
        .complete(
            &tech,
            wo.id,
            CompleteInput {
                notes: None,
                materials: Some(json!("[{\"name\":\"pipe\",\"qty\":2}]")),
            },
        )
        .await
        .unwrap();
    assert_eq!(done.status, WorkOrderStatus::CompletedPendingPayment);
    assert_eq!(done.materials, Some(json!([{ "name": "pipe", "qty": 2 }])));
}

#[tokio::test]
async fn cancelling_in_progress_work_frees_the_technician() {
    let app = TestApp::new().await;
    let tech = app.freelancer("Tunde").await;
    let wo = app.create_work_order("Fix AC").await;
    app.assign(wo.id, &tech, None).await;
    app.accept(wo.id, &tech).await;
    let machine = &app.state.services.work_orders;
    machine.start(&tech, wo.id, on_site()).await.unwrap();
    assert_eq!(app.user(tech.id).await.presence, Presence::Busy);

    let cancelled = machine
        .cancel(
            &app.customer,
            wo.id,
            CancelInput {
                reason: "No longer needed".into(),
            },
        )
        .await
        .unwrap();
    assert_eq!(cancelled.status, WorkOrderStatus::Cancelled);
    assert!(cancelled.technician_id.is_none());
    assert!(cancelled.technician_invariant_holds());
    assert_eq!(app.user(tech.id).await.presence, Presence::Available);

    let again = machine
        .cancel(
            &app.dispatcher,
            wo.id,
            CancelInput {
                reason: "twice".into(),
            },
        )
        .await;
    assert_matches!(
        again,
        Err(ServiceError::InvalidTransition { from: WorkOrderStatus::Cancelled, .. })
    );
}

#[tokio::test]
async fn customers_cannot_cancel_someone_elses_work_order() {
    let app = TestApp::new().await;
    let neighbour = app
        .seed_user("Nia Neighbour", UserRole::Customer, None)
        .await;
    let wo = app.create_work_order("Fix AC").await;
    let machine = &app.state.services.work_orders;

    let result = machine
        .cancel(
            &neighbour,
            wo.id,
            CancelInput {
                reason: "not mine".into(),
            },
        )
        .await;
    assert_matches!(result, Err(ServiceError::Forbidden(_)));

    let view = machine.get(&app.dispatcher, wo.id).await.unwrap();
    assert_eq!(view.work_order.status, WorkOrderStatus::Unassigned);
    assert!(view.work_order.cancel_reason.is_none());
}

#[tokio::test]
async fn completed_work_cannot_be_cancelled_or_rescheduled() {
    let app = TestApp::new().await;
    let tech = app.freelancer("Tunde").await;
    let wo = app.completed_work_order(&tech).await;
    let machine = &app.state.services.work_orders;

    let cancel = machine
        .cancel(
            &app.admin,
            wo.id,
            CancelInput {
                reason: "too late".into(),
            },
        )
        .await;
    assert_matches!(cancel, Err(ServiceError::InvalidTransition { .. }));

    let reschedule = machine
        .reschedule(
            &app.admin,
            wo.id,
            RescheduleInput {
                scheduled_at: app.clock_now() + Duration::days(1),
            },
        )
        .await;
    assert_matches!(reschedule, Err(ServiceError::InvalidTransition { .. }));
}

#[tokio::test]
async fn customers_and_technicians_see_only_their_work_orders() {
    let app = TestApp::new().await;
    let tech = app.freelancer("Tunde").await;
    let other_tech = app.freelancer("Other").await;
    let other_customer = app
        .seed_user("Other Customer", UserRole::Customer, None)
        .await;
    let wo = app.create_work_order("Fix AC").await;
    app.assign(wo.id, &tech, Some(30)).await;
    let machine = &app.state.services.work_orders;

    let own = machine.get(&app.customer, wo.id).await.unwrap();
    assert_eq!(own.work_order.id, wo.id);

    let assigned = machine.get(&tech, wo.id).await.unwrap();
    let deadline = assigned.deadline.expect("deadline while assigned");
    assert_eq!(deadline.minutes, 30);
    assert!(!deadline.expired);

    assert_matches!(
        machine.get(&other_customer, wo.id).await,
        Err(ServiceError::Forbidden(_))
    );
    assert_matches!(
        machine.get(&other_tech, wo.id).await,
        Err(ServiceError::Forbidden(_))
    );
    assert_matches!(
        machine.get(&app.admin, 9_999).await,
        Err(ServiceError::NotFound(_))
    );
}

#[tokio::test]
async fn customer_reschedules_own_work_order() {
    let app = TestApp::new().await;
    let wo = app.create_work_order("Fix AC").await;
    let when = app.clock_now() + Duration::days(2);

    let moved = app
        .state
        .services
        .work_orders
        .reschedule(&app.customer, wo.id, RescheduleInput { scheduled_at: when })
        .await
        .unwrap();
    assert_eq!(moved.scheduled_at, Some(when));
    assert_eq!(moved.status, WorkOrderStatus::Unassigned);
}

#[tokio::test]
async fn unassign_clears_deadline_and_technician() {
    let app = TestApp::new().await;
    let tech = app.freelancer("Tunde").await;
    let wo = app.create_work_order("Fix AC").await;
    app.assign(wo.id, &tech, None).await;
    assert!(app.state.services.deadlines.is_registered(wo.id));

    let unassigned = app
        .state
        .services
        .work_orders
        .unassign(&app.dispatcher, wo.id)
        .await
        .unwrap();
    assert_eq!(unassigned.status, WorkOrderStatus::Unassigned);
    assert!(unassigned.technician_id.is_none());
    assert!(unassigned.response_deadline_at.is_none());
    assert!(!app.state.services.deadlines.is_registered(wo.id));

    let again = app
        .state
        .services
        .work_orders
        .unassign(&app.dispatcher, wo.id)
        .await;
    assert_matches!(again, Err(ServiceError::InvalidTransition { .. }));
}
