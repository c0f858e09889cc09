use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, Notify};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Represents a notification addressed to one user
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Notification {
    pub user_id: Uuid,
    #[serde(rename = "type")]
    pub notification_type: NotificationType,
    pub title: String,
    pub message: String,
    pub data: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(
        user_id: Uuid,
        notification_type: NotificationType,
        title: impl Into<String>,
        message: impl Into<String>,
        data: serde_json::Value,
    ) -> Self {
        Self {
            user_id,
            notification_type,
            title: title.into(),
            message: message.into(),
            data,
            created_at: Utc::now(),
        }
    }
}

/// Types of notifications
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, strum::Display)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationType {
    WorkOrderAssigned,
    WorkOrderAccepted,
    WorkOrderDeclined,
    WorkOrderStarted,
    WorkOrderCompleted,
    WorkOrderCancelled,
    ResponseDeadlineWarning,
    ResponseDeadlineExpired,
    PaymentRejected,
    CommissionEarned,
    PayoutRequestReceived,
    PayoutRequestReviewed,
    PayoutCompleted,
}

#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("Delivery failed: {0}")]
    Delivery(String),
}

/// Outbound transport (push, SMS, in-app). Implementations live outside the core.
#[async_trait]
pub trait NotificationGateway: Send + Sync {
    async fn deliver(&self, notification: &Notification) -> Result<(), NotificationError>;
}

/// Default gateway: writes each notification to the log.
#[derive(Debug, Default)]
pub struct LoggingGateway;

#[async_trait]
impl NotificationGateway for LoggingGateway {
    async fn deliver(&self, notification: &Notification) -> Result<(), NotificationError> {
        info!(
            user_id = %notification.user_id,
            notification_type = %notification.notification_type,
            title = %notification.title,
            "notification"
        );
        Ok(())
    }
}

/// Keeps every delivered notification in memory.
#[derive(Debug, Default)]
pub struct RecordingGateway {
    sent: Mutex<Vec<Notification>>,
    delivered: Notify,
}

impl RecordingGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn sent_to(&self, user_id: Uuid, notification_type: NotificationType) -> usize {
        self.sent()
            .iter()
            .filter(|n| n.user_id == user_id && n.notification_type == notification_type)
            .count()
    }

    /// Waits until a matching notification was delivered or the timeout elapses.
    pub async fn wait_for(
        &self,
        user_id: Uuid,
        notification_type: NotificationType,
        timeout: Duration,
    ) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let notified = self.delivered.notified();
            if self.sent_to(user_id, notification_type) > 0 {
                return true;
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return self.sent_to(user_id, notification_type) > 0;
            }
        }
    }
}

#[async_trait]
impl NotificationGateway for RecordingGateway {
    async fn deliver(&self, notification: &Notification) -> Result<(), NotificationError> {
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(notification.clone());
        }
        self.delivered.notify_waiters();
        Ok(())
    }
}

/// Fire-and-forget handle onto the dispatcher task. Never fails the caller.
#[derive(Clone)]
pub struct Notifier {
    tx: mpsc::Sender<Notification>,
}

impl Notifier {
    /// Spawns the dispatcher task draining the queue into `gateway`.
    pub fn spawn(gateway: Arc<dyn NotificationGateway>, capacity: usize) -> Self {
        let (tx, mut rx) = mpsc::channel::<Notification>(capacity.max(1));
        tokio::spawn(async move {
            while let Some(notification) = rx.recv().await {
                if let Err(e) = gateway.deliver(&notification).await {
                    warn!(
                        user_id = %notification.user_id,
                        notification_type = %notification.notification_type,
                        error = %e,
                        "notification delivery failed"
                    );
                }
            }
            debug!("notification dispatcher stopped");
        });
        Self { tx }
    }

    pub fn notify(&self, notification: Notification) {
        if let Err(e) = self.tx.try_send(notification) {
            let dropped = match &e {
                mpsc::error::TrySendError::Full(n) | mpsc::error::TrySendError::Closed(n) => n,
            };
            warn!(
                user_id = %dropped.user_id,
                notification_type = %dropped.notification_type,
                "notification dropped: {}",
                e
            );
        }
    }

    pub fn send(
        &self,
        user_id: Uuid,
        notification_type: NotificationType,
        title: impl Into<String>,
        message: impl Into<String>,
        data: serde_json::Value,
    ) {
        self.notify(Notification::new(
            user_id,
            notification_type,
            title,
            message,
            data,
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct FailingGateway;

    #[async_trait]
    impl NotificationGateway for FailingGateway {
        async fn deliver(&self, _: &Notification) -> Result<(), NotificationError> {
            Err(NotificationError::Delivery("sms provider down".into()))
        }
    }

    #[tokio::test]
    async fn notifier_delivers_through_gateway() {
        let gateway = Arc::new(RecordingGateway::new());
        let notifier = Notifier::spawn(gateway.clone(), 8);
        let user = Uuid::new_v4();

        notifier.send(
            user,
            NotificationType::WorkOrderAssigned,
            "New assignment",
            "Work order WO-1 was assigned to you",
            json!({ "work_order_id": 1 }),
        );

        assert!(
            gateway
                .wait_for(
                    user,
                    NotificationType::WorkOrderAssigned,
                    Duration::from_secs(1)
                )
                .await
        );
        assert_eq!(gateway.sent()[0].data["work_order_id"], 1);
    }

    #[tokio::test]
    async fn gateway_failures_do_not_reach_caller() {
        let notifier = Notifier::spawn(Arc::new(FailingGateway), 1);
        for _ in 0..4 {
            notifier.send(
                Uuid::new_v4(),
                NotificationType::PayoutCompleted,
                "Paid",
                "Your payout completed",
                json!({}),
            );
        }
    }

    #[test]
    fn notification_type_serializes_screaming_snake() {
        let value = serde_json::to_value(NotificationType::ResponseDeadlineWarning).unwrap();
        assert_eq!(value, "RESPONSE_DEADLINE_WARNING");
        assert_eq!(
            NotificationType::ResponseDeadlineWarning.to_string(),
            "RESPONSE_DEADLINE_WARNING"
        );
    }
}
