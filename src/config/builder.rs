//! Type-safe builder for `ApplicationConfig` using the typestate pattern.

use anyhow::{anyhow, Result};
use std::marker::PhantomData;
use std::path::PathBuf;

use super::types::{ApplicationConfig, BrowserBackend};

pub struct Complete;

pub struct ApplicationConfigBuilder<State = ()> {
    pub(crate) state_dir: Option<PathBuf>,
    pub(crate) reports_dir: Option<PathBuf>,
    pub(crate) screenshot_dir: Option<PathBuf>,
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
    pub(crate) _phantom: PhantomData<State>,
}

impl Default for ApplicationConfigBuilder<()> {
    fn default() -> Self {
        Self {
            state_dir: None,
            reports_dir: None,
            screenshot_dir: None,
            backend: BrowserBackend::default(),
            headless: true,
            viewport_width: 1280,
            viewport_height: 800,
            action_slowdown_ms: 0,
            user_agent: None,
            default_timeout_secs: 30,
            navigation_timeout_secs: 60,
            devtools_mcp_command: None,
            captcha_api_key: None,
            captcha_provider_url: "https://2captcha.com".to_string(),
            session_idle_timeout_secs: 1800,
            session_cleanup_interval_secs: 300,
            state_retention_hours: 48,
            resumable_max_age_hours: 24,
            max_applications_per_day: 10,
            max_auto_applications_per_day: 5,
            max_applications: 5,
            delay_between_apps_secs: 60,
            max_retries: 3,
            retry_delay_base_secs: 120,
            auto_submit: false,
            max_steps: 30,
            _phantom: PhantomData,
        }
    }
}

impl ApplicationConfigBuilder<()> {
    /// Set the directory session state and interventions are persisted under.
    #[must_use]
    pub fn state_dir(self, dir: impl Into<PathBuf>) -> ApplicationConfigBuilder<Complete> {
        let state_dir = dir.into();
        let reports_dir = self.reports_dir.unwrap_or_else(|| state_dir.join("reports"));
        let screenshot_dir = self
            .screenshot_dir
            .unwrap_or_else(|| state_dir.join("screenshots"));
        ApplicationConfigBuilder {
            state_dir: Some(state_dir),
            reports_dir: Some(reports_dir),
            screenshot_dir: Some(screenshot_dir),
            backend: self.backend,
            headless: self.headless,
            viewport_width: self.viewport_width,
            viewport_height: self.viewport_height,
            action_slowdown_ms: self.action_slowdown_ms,
            user_agent: self.user_agent,
            default_timeout_secs: self.default_timeout_secs,
            navigation_timeout_secs: self.navigation_timeout_secs,
            devtools_mcp_command: self.devtools_mcp_command,
            captcha_api_key: self.captcha_api_key,
            captcha_provider_url: self.captcha_provider_url,
            session_idle_timeout_secs: self.session_idle_timeout_secs,
            session_cleanup_interval_secs: self.session_cleanup_interval_secs,
            state_retention_hours: self.state_retention_hours,
            resumable_max_age_hours: self.resumable_max_age_hours,
            max_applications_per_day: self.max_applications_per_day,
            max_auto_applications_per_day: self.max_auto_applications_per_day,
            max_applications: self.max_applications,
            delay_between_apps_secs: self.delay_between_apps_secs,
            max_retries: self.max_retries,
            retry_delay_base_secs: self.retry_delay_base_secs,
            auto_submit: self.auto_submit,
            max_steps: self.max_steps,
            _phantom: PhantomData,
        }
    }
}

impl ApplicationConfigBuilder<Complete> {
    pub fn build(self) -> Result<ApplicationConfig> {
        Ok(ApplicationConfig {
            state_dir: self.state_dir.ok_or_else(|| anyhow!("state_dir is required"))?,
            reports_dir: self
                .reports_dir
                .ok_or_else(|| anyhow!("reports_dir is required"))?,
            screenshot_dir: self
                .screenshot_dir
                .ok_or_else(|| anyhow!("screenshot_dir is required"))?,
            backend: self.backend,
            headless: self.headless,
            viewport_width: self.viewport_width,
            viewport_height: self.viewport_height,
            action_slowdown_ms: self.action_slowdown_ms,
            user_agent: self.user_agent,
            default_timeout_secs: self.default_timeout_secs,
            navigation_timeout_secs: self.navigation_timeout_secs,
            devtools_mcp_command: self.devtools_mcp_command,
            captcha_api_key: self.captcha_api_key,
            captcha_provider_url: self.captcha_provider_url,
            session_idle_timeout_secs: self.session_idle_timeout_secs,
            session_cleanup_interval_secs: self.session_cleanup_interval_secs,
            state_retention_hours: self.state_retention_hours,
            resumable_max_age_hours: self.resumable_max_age_hours,
            max_applications_per_day: self.max_applications_per_day,
            max_auto_applications_per_day: self.max_auto_applications_per_day,
            max_applications: self.max_applications,
            delay_between_apps_secs: self.delay_between_apps_secs,
            max_retries: self.max_retries,
            retry_delay_base_secs: self.retry_delay_base_secs,
            auto_submit: self.auto_submit,
            max_steps: self.max_steps,
        })
    }
}

// Methods available regardless of builder state.
impl<State> ApplicationConfigBuilder<State> {
    #[must_use]
    pub fn backend(mut self, backend: BrowserBackend) -> Self {
        self.backend = backend;
        self
    }

    #[must_use]
    pub fn headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    #[must_use]
    pub fn viewport(mut self, width: u32, height: u32) -> Self {
        self.viewport_width = width;
        self.viewport_height = height;
        self
    }

    #[must_use]
    pub fn action_slowdown_ms(mut self, ms: u64) -> Self {
        self.action_slowdown_ms = ms;
        self
    }

    #[must_use]
    pub fn user_agent(mut self, ua: impl Into<String>) -> Self {
        self.user_agent = Some(ua.into());
        self
    }

    #[must_use]
    pub fn devtools_mcp_command(mut self, command: impl Into<String>) -> Self {
        self.devtools_mcp_command = Some(command.into());
        self
    }

    #[must_use]
    pub fn captcha_api_key(mut self, key: impl Into<String>) -> Self {
        self.captcha_api_key = Some(key.into());
        self
    }

    #[must_use]
    pub fn captcha_provider_url(mut self, url: impl Into<String>) -> Self {
        self.captcha_provider_url = url.into();
        self
    }

    #[must_use]
    pub fn session_idle_timeout_secs(mut self, secs: u64) -> Self {
        self.session_idle_timeout_secs = secs;
        self
    }

    #[must_use]
    pub fn max_applications_per_day(mut self, n: u32) -> Self {
        self.max_applications_per_day = n;
        self
    }

    #[must_use]
    pub fn max_auto_applications_per_day(mut self, n: u32) -> Self {
        self.max_auto_applications_per_day = n;
        self
    }

    #[must_use]
    pub fn max_applications(mut self, n: u32) -> Self {
        self.max_applications = n;
        self
    }

    #[must_use]
    pub fn delay_between_apps_secs(mut self, secs: u64) -> Self {
        self.delay_between_apps_secs = secs;
        self
    }

    #[must_use]
    pub fn max_retries(mut self, n: u32) -> Self {
        self.max_retries = n;
        self
    }

    #[must_use]
    pub fn retry_delay_base_secs(mut self, secs: u64) -> Self {
        self.retry_delay_base_secs = secs;
        self
    }

    #[must_use]
    pub fn auto_submit(mut self, auto_submit: bool) -> Self {
        self.auto_submit = auto_submit;
        self
    }

    /// Maximum orchestrator step iterations for one job before it gives
    /// up; `0` fails immediately with reason "no steps".
    #[must_use]
    pub fn max_steps(mut self, n: u32) -> Self {
        self.max_steps = n;
        self
    }
}
