//! Core configuration types for the application engine.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Which browser-control backend a session uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BrowserBackend {
    /// `chromiumoxide`-driven direct CDP control.
    DirectAutomation,
    /// Accessibility-tree control over an `rmcp` sidecar.
    DevtoolsMcp,
}

impl Default for BrowserBackend {
    fn default() -> Self {
        Self::DirectAutomation
    }
}

/// Process-wide configuration for the application engine.
///
/// **INVARIANT:** `state_dir` is always an absolute path (normalized in the
/// builder), matching every other directory derived from it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationConfig {
    pub(crate) state_dir: PathBuf,
    pub(crate) reports_dir: PathBuf,
    pub(crate) screenshot_dir: PathBuf,

    pub(crate) backend: BrowserBackend,
    pub(crate) headless: bool,
    pub(crate) viewport_width: u32,
    pub(crate) viewport_height: u32,
    pub(crate) action_slowdown_ms: u64,
    pub(crate) user_agent: Option<String>,
    pub(crate) default_timeout_secs: u64,
    pub(crate) navigation_timeout_secs: u64,
    pub(crate) devtools_mcp_command: Option<String>,

    pub(crate) captcha_api_key: Option<String>,
    pub(crate) captcha_provider_url: String,

    pub(crate) session_idle_timeout_secs: u64,
    pub(crate) session_cleanup_interval_secs: u64,
    pub(crate) state_retention_hours: u64,
    pub(crate) resumable_max_age_hours: u64,

    pub(crate) max_applications_per_day: u32,
    pub(crate) max_auto_applications_per_day: u32,

    pub(crate) max_applications: u32,
    pub(crate) delay_between_apps_secs: u64,
    pub(crate) max_retries: u32,
    pub(crate) retry_delay_base_secs: u64,
    pub(crate) auto_submit: bool,
    pub(crate) max_steps: u32,
}

impl ApplicationConfig {
    /// Start a builder; `state_dir` is the only required field.
    #[must_use]
    pub fn builder() -> super::builder::ApplicationConfigBuilder<()> {
        super::builder::ApplicationConfigBuilder::default()
    }
}
