//! Orchestrator Agent (C8): drives one job application end to end —
//! open a session, navigate, detect and react to blockers, hand the form
//! to an ATS strategy, then submit or pause for review.

use std::collections::BTreeMap;
use std::sync::Arc;

use thiserror::Error;
use uuid::Uuid;

use crate::ats::AtsRegistry;
use crate::blockers;
use crate::browser::{BrowserError, WaitUntil};
use crate::captcha::CaptchaSolver;
use crate::config::ApplicationConfig;
use crate::intervention::InterventionStore;
use crate::model::{
    ApplicationStatus, BlockerKind, ExecutionMode, InterventionResolution, Job, UserProfile,
};
use crate::notifications::NotificationHub;
use crate::session::SessionManager;
use crate::state_store::{SessionState, StateStore};

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error(transparent)]
    Browser(#[from] BrowserError),
    #[error(transparent)]
    Session(#[from] crate::session::SessionError),
    #[error(transparent)]
    Ats(#[from] crate::ats::AtsError),
    #[error(transparent)]
    StateStore(#[from] crate::state_store::StateStoreError),
    #[error(transparent)]
    Intervention(#[from] crate::intervention::InterventionError),
}

pub type OrchestratorResult<T> = Result<T, OrchestratorError>;

#[derive(Debug, Clone)]
pub struct ApplicationOutcome {
    pub status: ApplicationStatus,
    pub session_id: Uuid,
    pub fields_filled: BTreeMap<String, String>,
    pub blocker: Option<BlockerKind>,
    pub blocker_message: Option<String>,
    pub error_message: Option<String>,
}

/// Coordinates every other component for a single job application.
pub struct Orchestrator {
    config: Arc<ApplicationConfig>,
    sessions: Arc<SessionManager>,
    state_store: Arc<StateStore>,
    interventions: Arc<InterventionStore>,
    notifications: Arc<NotificationHub>,
    ats: Arc<AtsRegistry>,
    captcha: Arc<CaptchaSolver>,
}

impl Orchestrator {
    #[must_use]
    pub fn new(
        config: Arc<ApplicationConfig>,
        sessions: Arc<SessionManager>,
        state_store: Arc<StateStore>,
        interventions: Arc<InterventionStore>,
        notifications: Arc<NotificationHub>,
        ats: Arc<AtsRegistry>,
        captcha: Arc<CaptchaSolver>,
    ) -> Self {
        Self { config, sessions, state_store, interventions, notifications, ats, captcha }
    }

    /// Run the full step loop for one job and leave the session open on
    /// a pause (so a human can keep driving it) or closed on any
    /// terminal outcome.
    pub async fn apply(
        &self,
        job: &Job,
        user: &UserProfile,
        mode: ExecutionMode,
        cover_letter: Option<&str>,
    ) -> OrchestratorResult<ApplicationOutcome> {
        if self.config.max_steps() == 0 {
            return Ok(ApplicationOutcome {
                status: ApplicationStatus::Failed,
                session_id: Uuid::nil(),
                fields_filled: BTreeMap::new(),
                blocker: None,
                blocker_message: None,
                error_message: Some("no steps".to_string()),
            });
        }

        let session_id = self.sessions.create_session().await?;
        let adapter = self.sessions.get_adapter(session_id).await?;

        let mut state = SessionState::new(session_id, job.id, user.id);
        state.status = ApplicationStatus::InProgress;
        self.state_store.save(state.clone()).await?;

        self.notifications.broadcast_status_change(user.id, job.id, ApplicationStatus::InProgress).await;

        adapter
            .navigate(job.url.clone(), WaitUntil::NetworkIdle, self.config.navigation_timeout())
            .await?;
        self.sessions.update_url(session_id, job.url.clone()).await;

        let mut fields_filled: BTreeMap<String, String> = BTreeMap::new();
        let mut steps = 0;

        let outcome = loop {
            steps += 1;
            if steps > self.config.max_steps() {
                break self
                    .pause(session_id, job, user, fields_filled, "exceeded maximum step count")
                    .await;
            }

            let html = adapter.get_page_content().await?.value;
            let url = adapter.get_current_url().await?.value;
            self.sessions.update_activity(session_id).await;

            let blockers = blockers::detect_all(&html, &url, None);
            if let Some(first) = blockers.into_iter().next() {
                match &first.kind {
                    BlockerKind::Captcha { family } => {
                        if self.captcha.is_configured() {
                            match self.captcha.solve_from_html(&html, &url).await {
                                Ok(solved) => {
                                    let script = crate::captcha::injection_script(*family, &solved.token);
                                    adapter.evaluate(script, Vec::new()).await?;
                                    continue;
                                }
                                Err(err) => {
                                    tracing::warn!(%err, "captcha solve failed, pausing for a human");
                                }
                            }
                        }
                        break self
                            .pause_on_blocker(session_id, job, user, fields_filled, first)
                            .await?;
                    }
                    BlockerKind::LoginRequired
                    | BlockerKind::MultiStepForm
                    | BlockerKind::LocationMismatch
                    | BlockerKind::Unknown => {
                        break self
                            .pause_on_blocker(session_id, job, user, fields_filled, first)
                            .await?;
                    }
                }
            }

            let strategy = self.ats.detect(&html, &url);
            let analysis = strategy.analyze_form(adapter.as_ref()).await?;
            let fill = strategy.fill_form(adapter.as_ref(), user, cover_letter).await?;
            fields_filled.extend(fill.fields_filled);
            self.sessions.update_activity(session_id).await;

            if !analysis.custom_questions.is_empty() {
                let answers = strategy
                    .handle_custom_questions(adapter.as_ref(), &analysis.custom_questions, user)
                    .await?;
                let unanswered: Vec<&String> =
                    analysis.custom_questions.iter().filter(|q| !answers.contains_key(*q)).collect();
                if !unanswered.is_empty() {
                    let blocker = crate::model::DetectedBlocker {
                        kind: BlockerKind::Unknown,
                        message: format!(
                            "unanswered custom questions: {}",
                            unanswered.iter().map(|s| s.as_str()).collect::<Vec<_>>().join(", ")
                        ),
                        element_locator: None,
                        suggested_action: Some("answer the custom questions manually".into()),
                    };
                    break self.pause_on_blocker(session_id, job, user, fields_filled, blocker).await?;
                }
                fields_filled.extend(answers);
            }

            if mode == ExecutionMode::Assisted {
                break self.pause(session_id, job, user, fields_filled, "awaiting review before submit").await;
            }

            let submit = strategy.submit(adapter.as_ref()).await?;
            if submit.success {
                break self.submitted(session_id, job, user, fields_filled).await;
            }
            break self
                .failed(session_id, job, user, fields_filled, submit.error.unwrap_or_default())
                .await;
        };

        Ok(outcome)
    }

    async fn submitted(
        &self,
        session_id: Uuid,
        job: &Job,
        user: &UserProfile,
        fields_filled: BTreeMap<String, String>,
    ) -> ApplicationOutcome {
        self.state_store.update_status(session_id, ApplicationStatus::Submitted).await.ok();
        self.notifications.broadcast_status_change(user.id, job.id, ApplicationStatus::Submitted).await;
        let _ = self.sessions.close_session(session_id).await;
        ApplicationOutcome {
            status: ApplicationStatus::Submitted,
            session_id,
            fields_filled,
            blocker: None,
            blocker_message: None,
            error_message: None,
        }
    }

    async fn pause(
        &self,
        session_id: Uuid,
        job: &Job,
        user: &UserProfile,
        fields_filled: BTreeMap<String, String>,
        reason: &str,
    ) -> ApplicationOutcome {
        self.state_store.update_status(session_id, ApplicationStatus::Paused).await.ok();
        self.notifications.broadcast_progress(user.id, job.id, reason).await;
        self.notifications.broadcast_status_change(user.id, job.id, ApplicationStatus::Paused).await;
        ApplicationOutcome {
            status: ApplicationStatus::Paused,
            session_id,
            fields_filled,
            blocker: None,
            blocker_message: Some(reason.to_string()),
            error_message: None,
        }
    }

    async fn pause_on_blocker(
        &self,
        session_id: Uuid,
        job: &Job,
        user: &UserProfile,
        fields_filled: BTreeMap<String, String>,
        blocker: crate::model::DetectedBlocker,
    ) -> OrchestratorResult<ApplicationOutcome> {
        self.state_store.update_status(session_id, ApplicationStatus::NeedsIntervention).await?;
        self.interventions.create(session_id, job.id, user.id, blocker.clone()).await;
        self.notifications
            .broadcast_status_change(user.id, job.id, ApplicationStatus::NeedsIntervention)
            .await;
        Ok(ApplicationOutcome {
            status: ApplicationStatus::NeedsIntervention,
            session_id,
            fields_filled,
            blocker: Some(blocker.kind),
            blocker_message: Some(blocker.message),
            error_message: None,
        })
    }

    async fn failed(
        &self,
        session_id: Uuid,
        job: &Job,
        user: &UserProfile,
        fields_filled: BTreeMap<String, String>,
        error_message: String,
    ) -> ApplicationOutcome {
        self.state_store.update_status(session_id, ApplicationStatus::Failed).await.ok();
        self.notifications.broadcast_status_change(user.id, job.id, ApplicationStatus::Failed).await;
        let _ = self.sessions.close_session(session_id).await;
        ApplicationOutcome {
            status: ApplicationStatus::Failed,
            session_id,
            fields_filled,
            blocker: None,
            blocker_message: None,
            error_message: Some(error_message),
        }
    }

    /// Resume a paused application after a human resolves its
    /// intervention: `Continue` keeps driving the same session,
    /// `Retry` re-navigates from scratch, `Cancel` ends it as Cancelled.
    pub async fn resume_after_intervention(
        &self,
        intervention_id: Uuid,
        job: &Job,
        user: &UserProfile,
        mode: ExecutionMode,
        cover_letter: Option<&str>,
    ) -> OrchestratorResult<ApplicationOutcome> {
        let intervention = self.interventions.get(intervention_id).await?;

        match intervention.resolution {
            Some(InterventionResolution::Cancel) => {
                self.state_store.update_status(intervention.session_id, ApplicationStatus::Cancelled).await?;
                let _ = self.sessions.close_session(intervention.session_id).await;
                Ok(ApplicationOutcome {
                    status: ApplicationStatus::Cancelled,
                    session_id: intervention.session_id,
                    fields_filled: BTreeMap::new(),
                    blocker: None,
                    blocker_message: None,
                    error_message: None,
                })
            }
            Some(InterventionResolution::Retry) => {
                let _ = self.sessions.close_session(intervention.session_id).await;
                self.apply(job, user, mode, cover_letter).await
            }
            Some(InterventionResolution::Continue) | None => {
                let adapter = self.sessions.get_adapter(intervention.session_id).await?;
                let html = adapter.get_page_content().await?.value;
                let url = adapter.get_current_url().await?.value;
                let strategy = self.ats.detect(&html, &url);
                let fill = strategy.fill_form(adapter.as_ref(), user, cover_letter).await?;
                if mode != ExecutionMode::Assisted {
                    let submit = strategy.submit(adapter.as_ref()).await?;
                    if submit.success {
                        return Ok(self.submitted(intervention.session_id, job, user, fill.fields_filled).await);
                    }
                }
                Ok(self
                    .pause(
                        intervention.session_id,
                        job,
                        user,
                        fill.fields_filled,
                        "awaiting review after intervention",
                    )
                    .await)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ats::AtsRegistry;
    use crate::captcha::CaptchaSolver;
    use crate::model::{AtsPlatformHint, JobStatus};

    fn sample_job() -> Job {
        Job {
            id: Uuid::new_v4(),
            url: "https://example.com/careers/eng".to_string(),
            title: "Engineer".to_string(),
            company: "Acme".to_string(),
            location: None,
            ats_platform_hint: Some(AtsPlatformHint::Other("example".to_string())),
            user_id: Uuid::new_v4(),
            status: JobStatus::Inbox,
        }
    }

    fn sample_user(job: &Job) -> UserProfile {
        UserProfile {
            id: job.user_id,
            first_name: "John".to_string(),
            last_name: "Doe".to_string(),
            email: "j@x.com".to_string(),
            phone: Some("7000000000".to_string()),
            phone_country_code: Some("+44".to_string()),
            addresses: Vec::new(),
            linkedin_url: None,
            github_url: None,
            portfolio_url: None,
            cv_content: String::new(),
            cv_path: None,
        }
    }

    #[tokio::test]
    async fn max_steps_zero_fails_immediately_with_no_steps_reason() {
        let dir = tempfile::tempdir().unwrap();
        let config = Arc::new(
            ApplicationConfig::builder().state_dir(dir.path()).max_steps(0).build().unwrap(),
        );
        let notifications = Arc::new(NotificationHub::new());
        let orchestrator = Orchestrator::new(
            config.clone(),
            Arc::new(SessionManager::new(config)),
            Arc::new(StateStore::new(dir.path())),
            Arc::new(InterventionStore::new(notifications.clone())),
            notifications,
            Arc::new(AtsRegistry::new()),
            Arc::new(CaptchaSolver::new(None, "https://2captcha.com")),
        );

        let job = sample_job();
        let user = sample_user(&job);
        let outcome = orchestrator.apply(&job, &user, ExecutionMode::Assisted, None).await.unwrap();

        assert_eq!(outcome.status, ApplicationStatus::Failed);
        assert_eq!(outcome.error_message.as_deref(), Some("no steps"));
    }
}
