//! External interfaces: the job board and user-profile stores this
//! engine reads from and writes back to, kept behind traits so the
//! pipeline can be tested against an in-memory fake instead of a live API.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::browser::BoxFuture;
use crate::model::{Job, JobStatus, UserProfile};

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("job {0} not found")]
    JobNotFound(Uuid),
    #[error("user {0} not found")]
    UserNotFound(Uuid),
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),
}

pub type RemoteResult<T> = Result<T, RemoteError>;

/// Read/write access to job postings, owned by the external job board.
pub trait JobStore: Send + Sync {
    fn list_jobs_for_user<'a>(
        &'a self,
        user_id: Uuid,
        statuses: &'a [JobStatus],
        max: usize,
    ) -> BoxFuture<'a, RemoteResult<Vec<Job>>>;

    fn get_job<'a>(&'a self, job_id: Uuid) -> BoxFuture<'a, RemoteResult<Job>>;

    fn update_status<'a>(&'a self, job_id: Uuid, status: JobStatus) -> BoxFuture<'a, RemoteResult<()>>;
}

/// Read-only access to user profiles, owned by the external user store.
pub trait UserStore: Send + Sync {
    fn get_user<'a>(&'a self, user_id: Uuid) -> BoxFuture<'a, RemoteResult<UserProfile>>;
}

/// REST-backed `JobStore`/`UserStore` pair talking to one base API URL.
pub struct HttpRemoteClient {
    client: Client,
    base_url: String,
}

impl HttpRemoteClient {
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self { client: Client::new(), base_url: base_url.into() }
    }
}

#[derive(Debug, Serialize)]
struct ListJobsQuery<'a> {
    user_id: Uuid,
    statuses: &'a [JobStatus],
    max: usize,
}

#[derive(Debug, Deserialize)]
struct JobListResponse {
    jobs: Vec<Job>,
}

impl JobStore for HttpRemoteClient {
    fn list_jobs_for_user<'a>(
        &'a self,
        user_id: Uuid,
        statuses: &'a [JobStatus],
        max: usize,
    ) -> BoxFuture<'a, RemoteResult<Vec<Job>>> {
        Box::pin(async move {
            let response = self
                .client
                .get(format!("{}/jobs", self.base_url))
                .query(&ListJobsQuery { user_id, statuses, max })
                .send()
                .await?
                .error_for_status()?
                .json::<JobListResponse>()
                .await?;
            Ok(response.jobs)
        })
    }

    fn get_job<'a>(&'a self, job_id: Uuid) -> BoxFuture<'a, RemoteResult<Job>> {
        Box::pin(async move {
            let response = self.client.get(format!("{}/jobs/{job_id}", self.base_url)).send().await?;
            if response.status() == reqwest::StatusCode::NOT_FOUND {
                return Err(RemoteError::JobNotFound(job_id));
            }
            Ok(response.error_for_status()?.json::<Job>().await?)
        })
    }

    fn update_status<'a>(&'a self, job_id: Uuid, status: JobStatus) -> BoxFuture<'a, RemoteResult<()>> {
        Box::pin(async move {
            #[derive(Serialize)]
            struct Body {
                status: JobStatus,
            }
            self.client
                .patch(format!("{}/jobs/{job_id}", self.base_url))
                .json(&Body { status })
                .send()
                .await?
                .error_for_status()?;
            Ok(())
        })
    }
}

impl UserStore for HttpRemoteClient {
    fn get_user<'a>(&'a self, user_id: Uuid) -> BoxFuture<'a, RemoteResult<UserProfile>> {
        Box::pin(async move {
            let response = self.client.get(format!("{}/users/{user_id}", self.base_url)).send().await?;
            if response.status() == reqwest::StatusCode::NOT_FOUND {
                return Err(RemoteError::UserNotFound(user_id));
            }
            Ok(response.error_for_status()?.json::<UserProfile>().await?)
        })
    }
}
