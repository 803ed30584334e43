//! Notification Fan-out (C10): a typed broadcast of pipeline and
//! intervention events, with a user-scoped filtered subscription on top
//! of one shared channel.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::intervention::Intervention;
use crate::model::{ApplicationStatus, PipelineResult};

/// Default buffer: enough to absorb a burst of progress events between
/// a slow subscriber's polls without blocking publishers.
const CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum NotificationEvent {
    InterventionCreated { intervention: Box<Intervention> },
    InterventionResolved { intervention: Box<Intervention> },
    ProgressUpdate { user_id: Uuid, job_id: Uuid, message: String, timestamp: DateTime<Utc> },
    StatusChanged { user_id: Uuid, job_id: Uuid, status: ApplicationStatus, timestamp: DateTime<Utc> },
    PipelineFinished { user_id: Uuid, result: PipelineResult, timestamp: DateTime<Utc> },
}

impl NotificationEvent {
    #[must_use]
    pub fn user_id(&self) -> Option<Uuid> {
        match self {
            Self::InterventionCreated { intervention } | Self::InterventionResolved { intervention } => {
                Some(intervention.user_id)
            }
            Self::ProgressUpdate { user_id, .. }
            | Self::StatusChanged { user_id, .. }
            | Self::PipelineFinished { user_id, .. } => Some(*user_id),
        }
    }
}

/// Thin wrapper over a single `tokio::sync::broadcast` channel. Callers
/// needing only one user's events should filter the receiver themselves
/// with `user_id()`; the hub does not fan the channel out per-user.
pub struct NotificationHub {
    sender: broadcast::Sender<NotificationEvent>,
}

impl NotificationHub {
    #[must_use]
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<NotificationEvent> {
        self.sender.subscribe()
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    fn publish(&self, event: NotificationEvent) {
        // No subscribers is the common case outside interactive use; a
        // broadcast send error there is expected, not a failure to log.
        let _ = self.sender.send(event);
    }

    pub async fn broadcast_intervention(&self, intervention: &Intervention) {
        let event = if intervention.is_resolved() {
            NotificationEvent::InterventionResolved { intervention: Box::new(intervention.clone()) }
        } else {
            NotificationEvent::InterventionCreated { intervention: Box::new(intervention.clone()) }
        };
        self.publish(event);
    }

    pub async fn broadcast_progress(&self, user_id: Uuid, job_id: Uuid, message: impl Into<String>) {
        self.publish(NotificationEvent::ProgressUpdate {
            user_id,
            job_id,
            message: message.into(),
            timestamp: Utc::now(),
        });
    }

    pub async fn broadcast_status_change(&self, user_id: Uuid, job_id: Uuid, status: ApplicationStatus) {
        self.publish(NotificationEvent::StatusChanged { user_id, job_id, status, timestamp: Utc::now() });
    }

    pub async fn broadcast_pipeline_finished(&self, user_id: Uuid, result: PipelineResult) {
        self.publish(NotificationEvent::PipelineFinished { user_id, result, timestamp: Utc::now() });
    }
}

impl Default for NotificationHub {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{BlockerKind, CaptchaFamily, DetectedBlocker, InterventionType};

    #[tokio::test]
    async fn subscriber_receives_progress_event() {
        let hub = NotificationHub::new();
        let mut rx = hub.subscribe();
        let user_id = Uuid::new_v4();
        let job_id = Uuid::new_v4();

        hub.broadcast_progress(user_id, job_id, "navigated to form").await;

        let event = rx.recv().await.unwrap();
        assert_eq!(event.user_id(), Some(user_id));
        assert!(matches!(event, NotificationEvent::ProgressUpdate { .. }));
    }

    #[tokio::test]
    async fn intervention_event_reflects_resolution_state() {
        let hub = NotificationHub::new();
        let mut rx = hub.subscribe();
        let intervention = crate::intervention::Intervention {
            id: Uuid::new_v4(),
            session_id: Uuid::new_v4(),
            job_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            kind: InterventionType::Captcha,
            blocker: DetectedBlocker {
                kind: BlockerKind::Captcha { family: CaptchaFamily::Turnstile },
                message: "captcha".into(),
                element_locator: None,
                suggested_action: None,
            },
            resolution: None,
            created_at: Utc::now(),
            resolved_at: None,
        };
        hub.broadcast_intervention(&intervention).await;
        let event = rx.recv().await.unwrap();
        assert!(matches!(event, NotificationEvent::InterventionCreated { .. }));
    }
}
