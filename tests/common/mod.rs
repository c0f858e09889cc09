#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Method, Request},
    Router,
};
use chrono::{DateTime, Duration, TimeZone, Utc};
use http_body_util::BodyExt;
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, ActiveValue::Set, DatabaseConnection, EntityTrait};
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use fieldops_api::{
    build_router,
    clock::{ManualClock, SharedClock},
    config::AppConfig,
    db::{self, DbConfig},
    entities::{
        commission, payment,
        user::{self, EmploymentType, Presence, UserRole},
        wallet, work_order, Wallet,
    },
    handlers::common::{ACTOR_ID_HEADER, ACTOR_ROLE_HEADER},
    notifications::{Notifier, RecordingGateway},
    services::{
        compensation::VerificationOutcome,
        payments::{PaymentReview, SubmitPaymentInput, VerifyPaymentInput},
        compensation::ReviewDecision,
        work_orders::{
            AssignInput, CompleteInput, CreateWorkOrderInput, RespondInput, ResponseAction,
            StartInput,
        },
        Actor,
    },
    AppState,
};
use sea_orm::{ColumnTrait, QueryFilter};

pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 3, 9, 0, 0).unwrap()
}

/// Application state over a fresh in-memory SQLite database, a manual clock
/// and a notification gateway that records everything it is given.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub db: Arc<DatabaseConnection>,
    pub clock: Arc<ManualClock>,
    pub gateway: Arc<RecordingGateway>,
    pub admin: Actor,
    pub dispatcher: Actor,
    pub customer: Actor,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    pub async fn with_config(adjust: impl FnOnce(&mut AppConfig)) -> Self {
        let mut cfg = AppConfig::new("sqlite::memory:".to_string(), "test".to_string());
        adjust(&mut cfg);

        let pool = db::establish_connection_with_config(&DbConfig::in_memory())
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");
        let db = Arc::new(pool);

        let clock = Arc::new(ManualClock::new(start_time()));
        let shared_clock: SharedClock = clock.clone();
        let gateway = Arc::new(RecordingGateway::new());
        let notifier = Notifier::spawn(gateway.clone(), 1024);

        let state = AppState::new(db.clone(), cfg, shared_clock, notifier);
        let router = build_router(state.clone());

        let mut app = Self {
            router,
            state,
            db,
            clock,
            gateway,
            admin: Actor::new(Uuid::nil(), UserRole::Admin),
            dispatcher: Actor::new(Uuid::nil(), UserRole::Dispatcher),
            customer: Actor::new(Uuid::nil(), UserRole::Customer),
        };
        app.admin = app.seed_user("Ada Admin", UserRole::Admin, None).await;
        app.dispatcher = app
            .seed_user("Dana Dispatcher", UserRole::Dispatcher, None)
            .await;
        app.customer = app.seed_user("Casey Customer", UserRole::Customer, None).await;
        app
    }

    pub async fn seed_user(
        &self,
        name: &str,
        role: UserRole,
        employment_type: Option<EmploymentType>,
    ) -> Actor {
        let now = self.clock_now();
        let model = user::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(name.to_string()),
            role: Set(role),
            employment_type: Set(employment_type),
            is_blocked: Set(false),
            presence: Set(Presence::Available),
            use_custom_rate: Set(false),
            custom_rate: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.db)
        .await
        .expect("seed user");
        Actor::new(model.id, model.role)
    }

    pub async fn freelancer(&self, name: &str) -> Actor {
        self.seed_user(name, UserRole::Technician, Some(EmploymentType::Freelancer))
            .await
    }

    pub async fn internal_technician(&self, name: &str) -> Actor {
        self.seed_user(name, UserRole::Technician, Some(EmploymentType::Internal))
            .await
    }

    pub async fn user(&self, id: Uuid) -> user::Model {
        fieldops_api::entities::User::find_by_id(id)
            .one(&*self.db)
            .await
            .unwrap()
            .expect("user exists")
    }

    pub fn clock_now(&self) -> DateTime<Utc> {
        use fieldops_api::clock::Clock;
        self.clock.now()
    }

    pub fn advance(&self, by: Duration) {
        self.clock.advance(by);
    }

    pub async fn create_work_order(&self, title: &str) -> work_order::Model {
        self.state
            .services
            .work_orders
            .create(
                &self.dispatcher,
                CreateWorkOrderInput {
                    title: title.to_string(),
                    description: Some("Customer reports no heating".to_string()),
                    address: Some("12 Harbour Road".to_string()),
                    customer_id: self.customer.id,
                    scheduled_at: None,
                    service_request_id: None,
                },
            )
            .await
            .expect("create work order")
    }

    pub async fn assign(
        &self,
        work_order_id: i32,
        technician: &Actor,
        window_minutes: Option<i64>,
    ) -> work_order::Model {
        self.state
            .services
            .work_orders
            .assign(
                &self.dispatcher,
                work_order_id,
                AssignInput {
                    technician_id: technician.id,
                    response_window_minutes: window_minutes,
                },
            )
            .await
            .expect("assign work order")
    }

    pub async fn accept(&self, work_order_id: i32, technician: &Actor) -> work_order::Model {
        self.state
            .services
            .work_orders
            .respond(
                technician,
                work_order_id,
                RespondInput {
                    response: ResponseAction::Accept,
                    decline_reason: None,
                },
            )
            .await
            .expect("accept work order")
    }

    /// Creates a work order and drives it to COMPLETED_PENDING_PAYMENT.
    pub async fn completed_work_order(&self, technician: &Actor) -> work_order::Model {
        let wo = self.create_work_order("Replace boiler valve").await;
        self.assign(wo.id, technician, None).await;
        self.accept(wo.id, technician).await;
        let machine = &self.state.services.work_orders;
        machine
            .start(
                technician,
                wo.id,
                StartInput {
                    latitude: 51.5072,
                    longitude: -0.1276,
                },
            )
            .await
            .expect("start work order");
        machine
            .complete(
                technician,
                wo.id,
                CompleteInput {
                    notes: Some("Valve replaced".to_string()),
                    materials: Some(json!([{ "name": "valve", "qty": 1 }])),
                },
            )
            .await
            .expect("complete work order")
    }

    pub async fn submit_payment(
        &self,
        work_order_id: i32,
        technician: &Actor,
        amount: Decimal,
    ) -> payment::Model {
        self.state
            .services
            .payments
            .submit_payment(
                technician,
                work_order_id,
                SubmitPaymentInput {
                    amount,
                    method: "CASH".to_string(),
                    reference: None,
                },
            )
            .await
            .expect("submit payment")
    }

    pub async fn approve_payment(&self, payment_id: Uuid) -> VerificationOutcome {
        let review = self
            .state
            .services
            .payments
            .verify_payment(
                &self.admin,
                payment_id,
                VerifyPaymentInput {
                    decision: ReviewDecision::Approve,
                    reason: None,
                },
            )
            .await
            .expect("verify payment");
        match review {
            PaymentReview::Verified(verification) => verification.outcome,
            PaymentReview::Rejected(_) => panic!("payment was rejected"),
        }
    }

    /// Full job from creation to a verified payment of `amount`.
    pub async fn paid_job(&self, technician: &Actor, amount: Decimal) -> commission::Model {
        let wo = self.completed_work_order(technician).await;
        let payment = self.submit_payment(wo.id, technician, amount).await;
        self.approve_payment(payment.id).await.commission
    }

    /// Pays 1000.00 against an already completed work order.
    pub async fn paid_job_for(&self, work_order_id: i32, technician: &Actor) -> commission::Model {
        let payment = self
            .submit_payment(work_order_id, technician, Decimal::new(1000, 0))
            .await;
        self.approve_payment(payment.id).await.commission
    }

    pub async fn wallet(&self, technician_id: Uuid) -> Option<wallet::Model> {
        Wallet::find()
            .filter(wallet::Column::TechnicianId.eq(technician_id))
            .one(&*self.db)
            .await
            .unwrap()
    }

    pub async fn balance(&self, technician_id: Uuid) -> Decimal {
        self.wallet(technician_id)
            .await
            .map(|w| fieldops_api::money::round2(w.balance))
            .unwrap_or(Decimal::ZERO)
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        actor: Option<&Actor>,
    ) -> axum::response::Response {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(actor) = actor {
            builder = builder
                .header(ACTOR_ID_HEADER, actor.id.to_string())
                .header(ACTOR_ROLE_HEADER, actor.role.to_string());
        }

        let body = match body {
            Some(json) => {
                builder = builder.header("content-type", "application/json");
                Body::from(serde_json::to_vec(&json).expect("serialize request body"))
            }
            None => Body::empty(),
        };

        self.router
            .clone()
            .oneshot(builder.body(body).expect("build request"))
            .await
            .expect("router error during test request")
    }
}

pub async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("read response body")
        .to_bytes();
    serde_json::from_slice(&bytes).expect("response body is json")
}
