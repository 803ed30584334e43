//! Session State Store (C7): one JSON file per application attempt,
//! written atomically via a temp-file-then-rename in the target
//! directory, with an in-memory read-through cache.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::model::ApplicationStatus;

#[derive(Debug, Error)]
pub enum StateStoreError {
    #[error("state for session {0} not found")]
    NotFound(Uuid),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("persist error: {0}")]
    Persist(#[from] tempfile::PersistError),
}

pub type StateStoreResult<T> = Result<T, StateStoreError>;

/// Resumable per-session progress, persisted across process restarts
/// and keyed by the browser session that is driving the application —
/// the same key the session manager and the intervention store use.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionState {
    pub session_id: Uuid,
    pub job_id: Uuid,
    pub user_id: Uuid,
    pub status: ApplicationStatus,
    pub current_url: Option<String>,
    pub fields_filled: std::collections::BTreeMap<String, String>,
    pub retry_count: u32,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SessionState {
    #[must_use]
    pub fn new(session_id: Uuid, job_id: Uuid, user_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            session_id,
            job_id,
            user_id,
            status: ApplicationStatus::Pending,
            current_url: None,
            fields_filled: std::collections::BTreeMap::new(),
            retry_count: 0,
            last_error: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// File-per-job JSON store under `state_dir`, backed by an in-memory
/// cache so repeated reads within a run avoid disk I/O.
pub struct StateStore {
    dir: PathBuf,
    cache: Arc<RwLock<HashMap<Uuid, SessionState>>>,
}

impl StateStore {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into(), cache: Arc::new(RwLock::new(HashMap::new())) }
    }

    fn path_for(&self, session_id: Uuid) -> PathBuf {
        self.dir.join(format!("{session_id}.json"))
    }

    pub async fn ensure_dir(&self) -> StateStoreResult<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        Ok(())
    }

    /// Write `state` to disk atomically (temp file in the same directory,
    /// then rename) and refresh the cache.
    pub async fn save(&self, state: SessionState) -> StateStoreResult<()> {
        self.ensure_dir().await?;
        let path = self.path_for(state.session_id);
        let json = serde_json::to_vec_pretty(&state)?;
        let dir = self.dir.clone();

        tokio::task::spawn_blocking(move || -> StateStoreResult<()> {
            use std::io::Write;
            let mut temp_file = NamedTempFile::new_in(&dir)?;
            temp_file.write_all(&json)?;
            temp_file.persist(&path)?;
            Ok(())
        })
        .await
        .expect("save blocking task panicked")?;

        self.cache.write().await.insert(state.session_id, state);
        Ok(())
    }

    pub async fn load(&self, session_id: Uuid) -> StateStoreResult<SessionState> {
        if let Some(state) = self.cache.read().await.get(&session_id) {
            return Ok(state.clone());
        }
        let path = self.path_for(session_id);
        let bytes = tokio::fs::read(&path).await.map_err(|_| StateStoreError::NotFound(session_id))?;
        let state: SessionState = serde_json::from_slice(&bytes)?;
        self.cache.write().await.insert(session_id, state.clone());
        Ok(state)
    }

    pub async fn delete(&self, session_id: Uuid) -> StateStoreResult<()> {
        self.cache.write().await.remove(&session_id);
        let path = self.path_for(session_id);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn update_status(&self, session_id: Uuid, status: ApplicationStatus) -> StateStoreResult<()> {
        let mut state = self.load(session_id).await?;
        state.status = status;
        state.updated_at = Utc::now();
        self.save(state).await
    }

    pub async fn update_progress(
        &self,
        session_id: Uuid,
        current_url: Option<String>,
        fields_filled: std::collections::BTreeMap<String, String>,
    ) -> StateStoreResult<()> {
        let mut state = self.load(session_id).await?;
        if let Some(url) = current_url {
            state.current_url = Some(url);
        }
        state.fields_filled.extend(fields_filled);
        state.updated_at = Utc::now();
        self.save(state).await
    }

    /// List every session id with a persisted state file.
    pub async fn list(&self) -> StateStoreResult<Vec<Uuid>> {
        self.ensure_dir().await?;
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        let mut ids = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if let Some(stem) = entry.path().file_stem().and_then(|s| s.to_str()) {
                if let Ok(id) = Uuid::parse_str(stem) {
                    ids.push(id);
                }
            }
        }
        Ok(ids)
    }

    /// Records in `paused`/`needs_intervention`, younger than
    /// `max_age_hours` since their last update, that have enough browser
    /// state (a checkpointed URL) to prime a new session on resume.
    pub async fn list_resumable(&self, max_age_hours: u64) -> StateStoreResult<Vec<SessionState>> {
        let session_ids = self.list().await?;
        let cutoff = Utc::now() - chrono::Duration::hours(max_age_hours as i64);
        let mut resumable = Vec::new();
        for id in session_ids {
            if let Ok(state) = self.load(id).await {
                let is_paused = matches!(
                    state.status,
                    ApplicationStatus::Paused | ApplicationStatus::NeedsIntervention
                );
                if is_paused && state.updated_at >= cutoff && state.current_url.is_some() {
                    resumable.push(state);
                }
            }
        }
        Ok(resumable)
    }

    /// Called once at process start: any record left `in_progress` was
    /// orphaned by an unclean shutdown (its browser session is gone), so
    /// it moves to `failed`. Records already `paused`/`needs_intervention`
    /// are left untouched — they're resumable, not interrupted.
    pub async fn recover_interrupted(&self) -> StateStoreResult<usize> {
        let session_ids = self.list().await?;
        let mut recovered = 0;
        for id in session_ids {
            let mut state = self.load(id).await?;
            if state.status == ApplicationStatus::InProgress {
                state.status = ApplicationStatus::Failed;
                state.last_error = Some("interrupted by restart".to_string());
                state.updated_at = Utc::now();
                self.save(state).await?;
                recovered += 1;
            }
        }
        Ok(recovered)
    }

    /// Delete state files older than `retention_hours`, regardless of status.
    pub async fn cleanup_old(&self, retention_hours: u64) -> StateStoreResult<usize> {
        let session_ids = self.list().await?;
        let cutoff = Utc::now() - chrono::Duration::hours(retention_hours as i64);
        let mut removed = 0;
        for id in session_ids {
            if let Ok(state) = self.load(id).await {
                if state.updated_at < cutoff {
                    self.delete(id).await?;
                    removed += 1;
                }
            }
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path());
        let session_id = Uuid::new_v4();
        let state = SessionState::new(session_id, Uuid::new_v4(), Uuid::new_v4());
        store.save(state.clone()).await.unwrap();

        let loaded = store.load(session_id).await.unwrap();
        assert_eq!(loaded.session_id, session_id);
        assert_eq!(loaded.status, ApplicationStatus::Pending);
    }

    #[tokio::test]
    async fn missing_job_returns_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path());
        let err = store.load(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, StateStoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn recover_interrupted_fails_in_progress_but_leaves_paused() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path());

        let interrupted_id = Uuid::new_v4();
        let mut interrupted = SessionState::new(interrupted_id, Uuid::new_v4(), Uuid::new_v4());
        interrupted.status = ApplicationStatus::InProgress;
        store.save(interrupted).await.unwrap();

        let paused_id = Uuid::new_v4();
        let mut paused = SessionState::new(paused_id, Uuid::new_v4(), Uuid::new_v4());
        paused.status = ApplicationStatus::Paused;
        store.save(paused).await.unwrap();

        let recovered = store.recover_interrupted().await.unwrap();
        assert_eq!(recovered, 1);

        assert_eq!(store.load(interrupted_id).await.unwrap().status, ApplicationStatus::Failed);
        assert_eq!(store.load(paused_id).await.unwrap().status, ApplicationStatus::Paused);
    }

    #[tokio::test]
    async fn list_resumable_requires_paused_status_and_browser_state() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path());

        let paused_id = Uuid::new_v4();
        let mut paused = SessionState::new(paused_id, Uuid::new_v4(), Uuid::new_v4());
        paused.status = ApplicationStatus::Paused;
        paused.current_url = Some("https://example.com/careers/eng".to_string());
        store.save(paused).await.unwrap();

        // Paused but never checkpointed a URL: not resumable.
        let no_url_id = Uuid::new_v4();
        let mut no_url = SessionState::new(no_url_id, Uuid::new_v4(), Uuid::new_v4());
        no_url.status = ApplicationStatus::Paused;
        store.save(no_url).await.unwrap();

        // Pending, not paused: not resumable even with a URL.
        let pending_id = Uuid::new_v4();
        let mut pending = SessionState::new(pending_id, Uuid::new_v4(), Uuid::new_v4());
        pending.current_url = Some("https://example.com".to_string());
        store.save(pending).await.unwrap();

        let resumable = store.list_resumable(24).await.unwrap();
        assert_eq!(resumable.len(), 1);
        assert_eq!(resumable[0].session_id, paused_id);
    }

    #[tokio::test]
    async fn cleanup_old_removes_stale_entries_only() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path());
        let session_id = Uuid::new_v4();
        let mut state = SessionState::new(session_id, Uuid::new_v4(), Uuid::new_v4());
        state.updated_at = Utc::now() - chrono::Duration::hours(100);
        store.save(state).await.unwrap();

        let removed = store.cleanup_old(48).await.unwrap();
        assert_eq!(removed, 1);
        assert!(store.load(session_id).await.is_err());
    }
}
