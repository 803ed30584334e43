//! Application Pipeline (C9): the batch driver — fetch eligible jobs,
//! apply skip rules and the rate limiter, run each through the
//! orchestrator with linear-backoff retry, and write a run report.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use thiserror::Error;
use uuid::Uuid;

use crate::config::ApplicationConfig;
use crate::model::{
    ExecutionMode, Job, JobStatus, PipelineAttempt, PipelineReport, PipelineResult, UserProfile,
};
use crate::notifications::NotificationHub;
use crate::orchestrator::Orchestrator;
use crate::rate_limiter::RateLimiter;
use crate::remote::{JobStore, UserStore};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Remote(#[from] crate::remote::RemoteError),
    #[error("user data could not be loaded, aborting run")]
    UserDataUnavailable,
    #[error("io error writing report: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

pub type PipelineResultT<T> = Result<T, PipelineError>;

/// Substrings in a lowercased error message that mark it as transient
/// and worth an automatic retry.
const RETRYABLE_ERRORS: &[&str] =
    &["429", "too many requests", "rate limit", "taskgroup", "timeout", "connection", "temporary"];

fn is_retryable(error_message: &str) -> bool {
    let lower = error_message.to_lowercase();
    RETRYABLE_ERRORS.iter().any(|pattern| lower.contains(pattern))
}

/// LinkedIn jobs are skipped unless the user has a connected LinkedIn
/// session; Indeed still requires a manual login and is always skipped.
fn should_skip(url: &str, has_linkedin_session: bool) -> bool {
    let lower = url.to_lowercase();
    if lower.contains("linkedin.com") {
        return !has_linkedin_session;
    }
    lower.contains("indeed.com")
}

fn status_for_result(result: PipelineResult) -> JobStatus {
    match result {
        PipelineResult::Success => JobStatus::Applied,
        PipelineResult::Paused => JobStatus::Ready,
        PipelineResult::Blocked => JobStatus::Blocked,
        PipelineResult::Failed | PipelineResult::Skipped => JobStatus::Inbox,
        PipelineResult::JobClosed => JobStatus::Archived,
    }
}

pub struct PipelineOptions {
    pub user_id: Uuid,
    pub max_applications: usize,
    pub job_ids: Option<Vec<Uuid>>,
    pub mode: ExecutionMode,
    pub cover_letter: Option<String>,
    pub has_linkedin_session: bool,
}

/// Batch-runs the orchestrator over a user's eligible jobs and produces
/// a `PipelineReport`.
pub struct ApplicationPipeline {
    config: Arc<ApplicationConfig>,
    orchestrator: Arc<Orchestrator>,
    jobs: Arc<dyn JobStore>,
    users: Arc<dyn UserStore>,
    rate_limiter: Arc<RateLimiter>,
    notifications: Arc<NotificationHub>,
}

impl ApplicationPipeline {
    #[must_use]
    pub fn new(
        config: Arc<ApplicationConfig>,
        orchestrator: Arc<Orchestrator>,
        jobs: Arc<dyn JobStore>,
        users: Arc<dyn UserStore>,
        rate_limiter: Arc<RateLimiter>,
        notifications: Arc<NotificationHub>,
    ) -> Self {
        Self { config, orchestrator, jobs, users, rate_limiter, notifications }
    }

    /// Apply to one job, retrying transient failures with linear
    /// backoff (`retry_delay_base * (retry_count + 1)`) up to
    /// `max_retries`.
    async fn apply_with_retry(
        &self,
        job: &Job,
        user: &UserProfile,
        opts: &PipelineOptions,
    ) -> PipelineAttempt {
        let start = std::time::Instant::now();
        let mut retry_count = 0u32;

        loop {
            let outcome = self
                .orchestrator
                .apply(job, user, opts.mode, opts.cover_letter.as_deref())
                .await;

            let (result, session_id, fields_filled, blocker, error_message) = match outcome {
                Ok(o) => {
                    use crate::model::ApplicationStatus as S;
                    let result = match o.status {
                        S::Submitted => PipelineResult::Success,
                        S::Paused => PipelineResult::Paused,
                        S::NeedsIntervention => PipelineResult::Blocked,
                        S::Cancelled | S::Failed => PipelineResult::Failed,
                        S::Pending | S::InProgress => PipelineResult::Failed,
                    };
                    let blocker = o
                        .blocker
                        .map(|kind| ((&kind).into(), o.blocker_message.clone().unwrap_or_default()));
                    (result, Some(o.session_id), o.fields_filled, blocker, o.error_message)
                }
                Err(err) => (PipelineResult::Failed, None, Default::default(), None, Some(err.to_string())),
            };

            let should_retry = result == PipelineResult::Failed
                && error_message.as_deref().map(is_retryable).unwrap_or(false)
                && retry_count < self.config.max_retries();

            if should_retry {
                let wait = self.config.retry_delay_base_secs() * u64::from(retry_count + 1);
                tracing::warn!(job_id = %job.id, retry_count, wait_secs = wait, "retrying transient failure");
                tokio::time::sleep(Duration::from_secs(wait)).await;
                retry_count += 1;
                continue;
            }

            break PipelineAttempt {
                job_id: job.id,
                url: job.url.clone(),
                title: job.title.clone(),
                company: job.company.clone(),
                result,
                session_id,
                fields_filled,
                blocker,
                error_message,
                duration_ms: start.elapsed().as_millis() as u64,
                timestamp: Utc::now(),
            };
        }
    }

    async fn jobs_to_process(&self, opts: &PipelineOptions) -> PipelineResultT<Vec<Job>> {
        let mut jobs = if let Some(ids) = &opts.job_ids {
            let mut fetched = Vec::with_capacity(ids.len());
            for id in ids {
                match self.jobs.get_job(*id).await {
                    Ok(job) => fetched.push(job),
                    Err(err) => tracing::warn!(job_id = %id, %err, "failed to fetch requested job"),
                }
            }
            fetched
        } else {
            self.jobs
                .list_jobs_for_user(
                    opts.user_id,
                    &[JobStatus::Inbox, JobStatus::Interesting],
                    opts.max_applications.max(50),
                )
                .await?
        };

        jobs.retain(|job| {
            !matches!(job.status, JobStatus::Applied | JobStatus::Blocked | JobStatus::Rejected | JobStatus::Archived)
        });
        jobs.truncate(opts.max_applications);
        Ok(jobs)
    }

    /// Run the full batch: load the user, gather jobs, apply skip rules
    /// and the rate limiter, and drive each remaining job through the
    /// orchestrator with a pacing delay between attempts.
    pub async fn run(&self, opts: PipelineOptions) -> PipelineResultT<PipelineReport> {
        let started_at = Utc::now();
        let user = self.users.get_user(opts.user_id).await.map_err(|_| PipelineError::UserDataUnavailable)?;

        let jobs = self.jobs_to_process(&opts).await?;
        tracing::info!(count = jobs.len(), "jobs selected for this run");

        let mut attempts = Vec::with_capacity(jobs.len());
        let total = jobs.len();

        for (i, job) in jobs.iter().enumerate() {
            if should_skip(&job.url, opts.has_linkedin_session) {
                attempts.push(PipelineAttempt {
                    job_id: job.id,
                    url: job.url.clone(),
                    title: job.title.clone(),
                    company: job.company.clone(),
                    result: PipelineResult::Skipped,
                    session_id: None,
                    fields_filled: Default::default(),
                    blocker: None,
                    error_message: Some("URL not suitable for automation".into()),
                    duration_ms: 0,
                    timestamp: Utc::now(),
                });
                continue;
            }

            if let Err(limit) = self.rate_limiter.check(opts.user_id, opts.mode) {
                tracing::warn!(job_id = %job.id, %limit, "rate limit reached, stopping run early");
                break;
            }

            let attempt = self.apply_with_retry(job, &user, &opts).await;
            let new_status = status_for_result(attempt.result);
            if let Err(err) = self.jobs.update_status(job.id, new_status).await {
                tracing::warn!(job_id = %job.id, %err, "failed to update job status");
            }
            if attempt.result == PipelineResult::Success {
                self.rate_limiter.record_submission(opts.user_id, opts.mode);
            }

            attempts.push(attempt);

            if i + 1 < total {
                tokio::time::sleep(self.config.delay_between_apps()).await;
            }
        }

        let finished_at = Utc::now();
        let report = PipelineReport { user_id: opts.user_id, started_at, finished_at, attempts };
        self.notifications
            .broadcast_pipeline_finished(
                opts.user_id,
                report.attempts.last().map(|a| a.result).unwrap_or(PipelineResult::Skipped),
            )
            .await;
        Ok(report)
    }

    /// Serialize `report` to `reports_dir` using its canonical filename
    /// and return the path written.
    pub async fn save_report(&self, report: &PipelineReport) -> PipelineResultT<std::path::PathBuf> {
        tokio::fs::create_dir_all(self.config.reports_dir()).await?;
        let path = self.config.reports_dir().join(report.report_filename());
        let json = serde_json::to_vec_pretty(report)?;
        tokio::fs::write(&path, json).await?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linkedin_is_skipped_without_a_connected_session() {
        assert!(should_skip("https://www.linkedin.com/jobs/view/123", false));
        assert!(!should_skip("https://www.linkedin.com/jobs/view/123", true));
    }

    #[test]
    fn indeed_is_always_skipped() {
        assert!(should_skip("https://www.indeed.com/viewjob?jk=abc", true));
    }

    #[test]
    fn retryable_error_detection_is_case_insensitive() {
        assert!(is_retryable("Connection RESET by peer"));
        assert!(is_retryable("429 Too Many Requests"));
        assert!(!is_retryable("invalid form field selector"));
    }

    #[test]
    fn status_mapping_matches_terminal_outcomes() {
        assert_eq!(status_for_result(PipelineResult::Success), JobStatus::Applied);
        assert_eq!(status_for_result(PipelineResult::JobClosed), JobStatus::Archived);
        assert_eq!(status_for_result(PipelineResult::Failed), JobStatus::Inbox);
    }
}
