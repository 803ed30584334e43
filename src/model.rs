//! Shared data-model types for the application engine.
//!
//! These are the entities named in the data model: users, jobs, form
//! fields, and the small vocabulary of statuses/kinds that every
//! component (sessions, interventions, the pipeline) agrees on.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identity fields the core reads from the external user store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub phone_country_code: Option<String>,
    pub addresses: Vec<String>,
    pub linkedin_url: Option<String>,
    pub github_url: Option<String>,
    pub portfolio_url: Option<String>,
    /// Canonical CV text, owned by the external user store.
    pub cv_content: String,
    /// Local path to a CV file for upload fields, if available.
    pub cv_path: Option<String>,
}

/// Partial order a job's status may move through.
///
/// `inbox -> interesting -> adapted -> ready -> applied | blocked | rejected | archived`.
/// The pipeline itself writes only the leaf transitions named in C9.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Inbox,
    Interesting,
    Adapted,
    Ready,
    Applied,
    Blocked,
    Rejected,
    Archived,
}

/// A hint about which ATS vendor hosts a job posting, used by the skip
/// rules and as a tie-breaker before content-based ATS detection.
///
/// `LinkedIn` serializes as the literal `"LINKEDIN"` — see DESIGN.md for
/// why uppercase was chosen over the source's other, lowercase, migration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AtsPlatformHint {
    LinkedIn,
    Indeed,
    Greenhouse,
    Lever,
    Workday,
    Breezy,
    Other(String),
}

impl AtsPlatformHint {
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::LinkedIn => "LINKEDIN",
            Self::Indeed => "INDEED",
            Self::Greenhouse => "GREENHOUSE",
            Self::Lever => "LEVER",
            Self::Workday => "WORKDAY",
            Self::Breezy => "BREEZY",
            Self::Other(s) => s,
        }
    }
}

impl Serialize for AtsPlatformHint {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for AtsPlatformHint {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(match raw.as_str() {
            "LINKEDIN" => Self::LinkedIn,
            "INDEED" => Self::Indeed,
            "GREENHOUSE" => Self::Greenhouse,
            "LEVER" => Self::Lever,
            "WORKDAY" => Self::Workday,
            "BREEZY" => Self::Breezy,
            _ => Self::Other(raw),
        })
    }
}

/// Job entity; owned by the external job store, read and partially
/// updated by the core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub url: String,
    pub title: String,
    pub company: String,
    pub location: Option<String>,
    pub ats_platform_hint: Option<AtsPlatformHint>,
    pub user_id: Uuid,
    pub status: JobStatus,
}

/// How aggressively the orchestrator is allowed to act without a human.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    Assisted,
    SemiAuto,
    Auto,
}

/// Terminal and non-terminal states of a single application attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationStatus {
    Pending,
    InProgress,
    Paused,
    NeedsIntervention,
    Submitted,
    Failed,
    Cancelled,
}

impl ApplicationStatus {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Submitted | Self::Failed | Self::Cancelled)
    }
}

/// The outcome the pipeline records for one attempt at one job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineResult {
    Success,
    Paused,
    Blocked,
    Failed,
    Skipped,
    JobClosed,
}

/// CAPTCHA vendor family, each with its own sitekey pattern and response
/// field name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptchaFamily {
    Turnstile,
    HCaptcha,
    RecaptchaV2,
    RecaptchaV3,
}

impl CaptchaFamily {
    /// Name of the hidden form field the solved token is written into.
    #[must_use]
    pub fn response_field(self) -> &'static str {
        match self {
            Self::Turnstile => "cf-turnstile-response",
            Self::HCaptcha => "h-captcha-response",
            Self::RecaptchaV2 | Self::RecaptchaV3 => "g-recaptcha-response",
        }
    }
}

/// A page obstacle as classified by the blocker detector (C3).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BlockerKind {
    Captcha { family: CaptchaFamily },
    LoginRequired,
    MultiStepForm,
    LocationMismatch,
    /// Unfilled custom application questions the active ATS strategy
    /// could not answer on its own.
    Unknown,
}

/// A single detected obstacle, with enough context for an intervention.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectedBlocker {
    pub kind: BlockerKind,
    pub message: String,
    pub element_locator: Option<String>,
    pub suggested_action: Option<String>,
}

/// Kind of human action an intervention record is waiting for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterventionType {
    Captcha,
    LoginRequired,
    FileUpload,
    MultiStepForm,
    LocationMismatch,
    Unknown,
}

impl From<&BlockerKind> for InterventionType {
    fn from(kind: &BlockerKind) -> Self {
        match kind {
            BlockerKind::Captcha { .. } => Self::Captcha,
            BlockerKind::LoginRequired => Self::LoginRequired,
            BlockerKind::MultiStepForm => Self::MultiStepForm,
            BlockerKind::LocationMismatch => Self::LocationMismatch,
            BlockerKind::Unknown => Self::Unknown,
        }
    }
}

/// How a human resolved a paused intervention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterventionResolution {
    Continue,
    Cancel,
    Retry,
}

/// Type of a single form field, as produced by DOM extraction (C1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormFieldType {
    Text,
    Email,
    Tel,
    Select,
    Radio,
    Checkbox,
    File,
    Textarea,
    Submit,
    Search,
    Number,
}

/// A single fillable element, located either by CSS selector or an
/// accessibility-tree UID, depending on which backend produced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormField {
    pub locator: String,
    pub name: String,
    pub field_type: FormFieldType,
    pub label: Option<String>,
    pub placeholder: Option<String>,
    pub required: bool,
    pub value: Option<String>,
    pub options: Vec<String>,
    pub visible: bool,
    pub enabled: bool,
}

/// Append-only record of one job-application attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineAttempt {
    pub job_id: Uuid,
    pub url: String,
    pub title: String,
    pub company: String,
    pub result: PipelineResult,
    pub session_id: Option<Uuid>,
    pub fields_filled: std::collections::BTreeMap<String, String>,
    pub blocker: Option<(InterventionType, String)>,
    pub error_message: Option<String>,
    pub duration_ms: u64,
    pub timestamp: DateTime<Utc>,
}

/// The report a pipeline run writes to disk at completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineReport {
    pub user_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub attempts: Vec<PipelineAttempt>,
}

impl PipelineReport {
    #[must_use]
    pub fn success_count(&self) -> usize {
        self.attempts
            .iter()
            .filter(|a| a.result == PipelineResult::Success)
            .count()
    }

    #[must_use]
    pub fn report_filename(&self) -> String {
        format!(
            "pipeline_report_{}.json",
            self.started_at.format("%Y%m%d_%H%M%S")
        )
    }
}
