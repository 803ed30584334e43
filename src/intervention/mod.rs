//! Intervention Store (C6): tracks paused sessions waiting on a human,
//! resolved exactly once.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::model::{DetectedBlocker, InterventionResolution, InterventionType};
use crate::notifications::NotificationHub;

#[derive(Debug, Error)]
pub enum InterventionError {
    #[error("intervention {0} not found")]
    NotFound(Uuid),
    #[error("intervention {0} was already resolved")]
    AlreadyResolved(Uuid),
}

pub type InterventionResult<T> = Result<T, InterventionError>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Intervention {
    pub id: Uuid,
    pub session_id: Uuid,
    pub job_id: Uuid,
    pub user_id: Uuid,
    pub kind: InterventionType,
    pub blocker: DetectedBlocker,
    pub resolution: Option<InterventionResolution>,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl Intervention {
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        self.resolution.is_some()
    }
}

/// In-memory registry of open and resolved interventions, backed by a
/// single mutex-guarded map (the whole table is small and short-lived
/// enough that fine-grained locking isn't worth the complexity).
pub struct InterventionStore {
    interventions: Arc<Mutex<HashMap<Uuid, Intervention>>>,
    notifications: Arc<NotificationHub>,
}

impl InterventionStore {
    #[must_use]
    pub fn new(notifications: Arc<NotificationHub>) -> Self {
        Self { interventions: Arc::new(Mutex::new(HashMap::new())), notifications }
    }

    /// Record a new paused intervention and notify subscribers.
    pub async fn create(
        &self,
        session_id: Uuid,
        job_id: Uuid,
        user_id: Uuid,
        blocker: DetectedBlocker,
    ) -> Intervention {
        let intervention = Intervention {
            id: Uuid::new_v4(),
            session_id,
            job_id,
            user_id,
            kind: InterventionType::from(&blocker.kind),
            blocker,
            resolution: None,
            created_at: Utc::now(),
            resolved_at: None,
        };
        self.interventions.lock().await.insert(intervention.id, intervention.clone());
        self.notifications.broadcast_intervention(&intervention).await;
        intervention
    }

    pub async fn get(&self, id: Uuid) -> InterventionResult<Intervention> {
        self.interventions.lock().await.get(&id).cloned().ok_or(InterventionError::NotFound(id))
    }

    pub async fn list_for_user(&self, user_id: Uuid) -> Vec<Intervention> {
        self.interventions.lock().await.values().filter(|i| i.user_id == user_id).cloned().collect()
    }

    /// Interventions still waiting on a human, across every user.
    pub async fn list_paused(&self) -> Vec<Intervention> {
        self.interventions.lock().await.values().filter(|i| !i.is_resolved()).cloned().collect()
    }

    /// Resolve an intervention exactly once; a second resolve attempt is
    /// rejected rather than silently overwritten.
    pub async fn resolve(&self, id: Uuid, resolution: InterventionResolution) -> InterventionResult<Intervention> {
        let resolved = {
            let mut interventions = self.interventions.lock().await;
            let intervention = interventions.get_mut(&id).ok_or(InterventionError::NotFound(id))?;
            if intervention.is_resolved() {
                return Err(InterventionError::AlreadyResolved(id));
            }
            intervention.resolution = Some(resolution);
            intervention.resolved_at = Some(Utc::now());
            intervention.clone()
        };
        self.notifications.broadcast_intervention(&resolved).await;
        Ok(resolved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{BlockerKind, CaptchaFamily};

    fn blocker() -> DetectedBlocker {
        DetectedBlocker {
            kind: BlockerKind::Captcha { family: CaptchaFamily::Turnstile },
            message: "captcha".into(),
            element_locator: None,
            suggested_action: None,
        }
    }

    #[tokio::test]
    async fn second_resolve_is_rejected() {
        let store = InterventionStore::new(Arc::new(NotificationHub::new()));
        let intervention = store.create(Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4(), blocker()).await;

        store.resolve(intervention.id, InterventionResolution::Continue).await.unwrap();
        let err = store.resolve(intervention.id, InterventionResolution::Cancel).await.unwrap_err();
        assert!(matches!(err, InterventionError::AlreadyResolved(_)));
    }

    #[tokio::test]
    async fn paused_list_excludes_resolved() {
        let store = InterventionStore::new(Arc::new(NotificationHub::new()));
        let intervention = store.create(Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4(), blocker()).await;
        assert_eq!(store.list_paused().await.len(), 1);

        store.resolve(intervention.id, InterventionResolution::Continue).await.unwrap();
        assert_eq!(store.list_paused().await.len(), 0);
    }
}
