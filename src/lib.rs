pub mod ats;
pub mod blockers;
pub mod browser;
pub mod captcha;
pub mod config;
pub mod intervention;
pub mod model;
pub mod notifications;
pub mod orchestrator;
pub mod pipeline;
pub mod rate_limiter;
pub mod remote;
pub mod session;
pub mod state_store;

pub use ats::{AtsError, AtsRegistry, AtsStrategy};
pub use blockers::detect_all as detect_blockers;
pub use browser::{BoxFuture, BrowserAdapter, BrowserError, WaitUntil};
pub use captcha::{CaptchaError, CaptchaSolver};
pub use config::{ApplicationConfig, BrowserBackend};
pub use intervention::{Intervention, InterventionError, InterventionStore};
pub use model::{
    ApplicationStatus, AtsPlatformHint, BlockerKind, CaptchaFamily, DetectedBlocker, ExecutionMode,
    FormField, FormFieldType, InterventionResolution, InterventionType, Job, JobStatus,
    PipelineAttempt, PipelineReport, PipelineResult, UserProfile,
};
pub use notifications::{NotificationEvent, NotificationHub};
pub use orchestrator::{ApplicationOutcome, Orchestrator, OrchestratorError};
pub use pipeline::{ApplicationPipeline, PipelineError, PipelineOptions};
pub use rate_limiter::{RateLimitExceeded, RateLimiter, UsageReport};
pub use remote::{HttpRemoteClient, JobStore, RemoteError, UserStore};
pub use session::{SessionError, SessionInfo, SessionManager};
pub use state_store::{SessionState, StateStore, StateStoreError};
