//! Session Manager (C2): owns every live browser session, keyed by
//! `Uuid`, and reclaims idle ones on a background timer.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::browser::{direct::DirectAdapter, devtools_mcp::McpAdapter, AdapterConfig, BrowserAdapter};
use crate::config::{ApplicationConfig, BrowserBackend};

/// Pre-allocated capacity for the session table; most deployments keep a
/// handful of concurrent browser sessions open.
const SESSION_CACHE_INITIAL_CAPACITY: usize = 16;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session {0} not found")]
    NotFound(Uuid),
    #[error(transparent)]
    Browser(#[from] crate::browser::BrowserError),
}

pub type SessionResult<T> = Result<T, SessionError>;

pub struct SessionRecord {
    pub id: Uuid,
    pub adapter: Arc<dyn BrowserAdapter>,
    pub current_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    /// Count of successful adapter operations recorded via `update_activity`.
    pub action_count: u64,
}

/// A snapshot of session bookkeeping, without the adapter handle itself.
#[derive(Debug, Clone)]
pub struct SessionInfo {
    pub id: Uuid,
    pub current_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub action_count: u64,
}

impl From<&SessionRecord> for SessionInfo {
    fn from(record: &SessionRecord) -> Self {
        Self {
            id: record.id,
            current_url: record.current_url.clone(),
            created_at: record.created_at,
            last_activity: record.last_activity,
            action_count: record.action_count,
        }
    }
}

/// Tracks every live session and evicts ones idle past the configured
/// timeout, closing their adapter as it removes them.
#[derive(Clone)]
pub struct SessionManager {
    sessions: Arc<Mutex<HashMap<Uuid, SessionRecord>>>,
    config: Arc<ApplicationConfig>,
}

impl SessionManager {
    #[must_use]
    pub fn new(config: Arc<ApplicationConfig>) -> Self {
        Self {
            sessions: Arc::new(Mutex::new(HashMap::with_capacity(SESSION_CACHE_INITIAL_CAPACITY))),
            config,
        }
    }

    /// Launch a new browser session using the configured backend and
    /// register it under a fresh id.
    pub async fn create_session(&self) -> SessionResult<Uuid> {
        let adapter_config = AdapterConfig {
            viewport_width: self.config.viewport().0,
            viewport_height: self.config.viewport().1,
            headless: self.config.headless(),
            action_slowdown: self.config.action_slowdown(),
            user_agent: self.config.user_agent().map(str::to_string),
            default_timeout: self.config.default_timeout(),
            remote_debugging_endpoint: None,
        };

        let adapter: Arc<dyn BrowserAdapter> = match self.config.backend() {
            BrowserBackend::DirectAutomation => Arc::new(DirectAdapter::new()),
            BrowserBackend::DevtoolsMcp => Arc::new(McpAdapter::new(
                self.config.devtools_mcp_command().unwrap_or("npx chrome-devtools-mcp@latest"),
            )),
        };
        adapter.initialize(adapter_config).await?;

        let id = Uuid::new_v4();
        let now = Utc::now();
        let mut sessions = self.sessions.lock().await;
        sessions.insert(
            id,
            SessionRecord { id, adapter, current_url: None, created_at: now, last_activity: now, action_count: 0 },
        );
        tracing::info!(session_id = %id, "session created");
        Ok(id)
    }

    pub async fn get_adapter(&self, id: Uuid) -> SessionResult<Arc<dyn BrowserAdapter>> {
        let sessions = self.sessions.lock().await;
        sessions.get(&id).map(|r| r.adapter.clone()).ok_or(SessionError::NotFound(id))
    }

    /// Fetch a bookkeeping snapshot for `id` without touching its adapter.
    pub async fn get_session(&self, id: Uuid) -> SessionResult<SessionInfo> {
        let sessions = self.sessions.lock().await;
        sessions.get(&id).map(SessionInfo::from).ok_or(SessionError::NotFound(id))
    }

    /// Record one successful adapter operation against `id`, bumping
    /// `last_activity` and `action_count`.
    pub async fn update_activity(&self, id: Uuid) {
        let mut sessions = self.sessions.lock().await;
        if let Some(record) = sessions.get_mut(&id) {
            record.last_activity = Utc::now();
            record.action_count += 1;
        }
    }

    pub async fn update_url(&self, id: Uuid, url: String) {
        let mut sessions = self.sessions.lock().await;
        if let Some(record) = sessions.get_mut(&id) {
            record.current_url = Some(url);
            record.last_activity = Utc::now();
            record.action_count += 1;
        }
    }

    pub async fn close_session(&self, id: Uuid) -> SessionResult<()> {
        let record = {
            let mut sessions = self.sessions.lock().await;
            sessions.remove(&id).ok_or(SessionError::NotFound(id))?
        };
        record.adapter.close().await?;
        tracing::info!(session_id = %id, "session closed");
        Ok(())
    }

    pub async fn list_sessions(&self) -> Vec<Uuid> {
        self.sessions.lock().await.keys().copied().collect()
    }

    /// Evict sessions idle past `session_idle_timeout`, closing each
    /// adapter concurrently.
    async fn evict_idle(&self) {
        let idle_timeout = self.config.session_idle_timeout();
        let now = Utc::now();

        let expired: Vec<(Uuid, Arc<dyn BrowserAdapter>)> = {
            let mut sessions = self.sessions.lock().await;
            let expired_ids: Vec<Uuid> = sessions
                .iter()
                .filter(|(_, record)| {
                    now.signed_duration_since(record.last_activity)
                        .to_std()
                        .map(|age| age >= idle_timeout)
                        .unwrap_or(false)
                })
                .map(|(id, _)| *id)
                .collect();
            expired_ids
                .into_iter()
                .filter_map(|id| sessions.remove(&id).map(|r| (id, r.adapter)))
                .collect()
        };

        for (id, adapter) in expired {
            if let Err(err) = adapter.close().await {
                tracing::warn!(session_id = %id, %err, "failed to close idle session cleanly");
            } else {
                tracing::info!(session_id = %id, "evicted idle session");
            }
        }
    }

    /// Spawn the periodic idle-eviction task. Call once after wrapping
    /// the manager in `Arc`.
    pub fn start_cleanup_task(self: Arc<Self>) {
        let interval = self.config.session_cleanup_interval();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                self.evict_idle().await;
            }
        });
    }

    /// Close every open session, used on shutdown.
    pub async fn close_all(&self) {
        let records: Vec<(Uuid, Arc<dyn BrowserAdapter>)> = {
            let mut sessions = self.sessions.lock().await;
            sessions.drain().map(|(id, r)| (id, r.adapter)).collect()
        };
        let closes = records.into_iter().map(|(id, adapter)| async move {
            if let Err(err) = adapter.close().await {
                tracing::warn!(session_id = %id, %err, "error closing session during shutdown");
            }
        });
        futures::future::join_all(closes).await;
    }
}
