//! Accessor methods for `ApplicationConfig`.

use std::path::PathBuf;
use std::time::Duration;

use super::types::{ApplicationConfig, BrowserBackend};

impl ApplicationConfig {
    #[must_use]
    pub fn state_dir(&self) -> &PathBuf {
        &self.state_dir
    }

    #[must_use]
    pub fn reports_dir(&self) -> &PathBuf {
        &self.reports_dir
    }

    #[must_use]
    pub fn screenshot_dir(&self) -> &PathBuf {
        &self.screenshot_dir
    }

    #[must_use]
    pub fn backend(&self) -> BrowserBackend {
        self.backend
    }

    #[must_use]
    pub fn headless(&self) -> bool {
        self.headless
    }

    #[must_use]
    pub fn viewport(&self) -> (u32, u32) {
        (self.viewport_width, self.viewport_height)
    }

    #[must_use]
    pub fn action_slowdown(&self) -> Duration {
        Duration::from_millis(self.action_slowdown_ms)
    }

    #[must_use]
    pub fn user_agent(&self) -> Option<&str> {
        self.user_agent.as_deref()
    }

    #[must_use]
    pub fn default_timeout(&self) -> Duration {
        Duration::from_secs(self.default_timeout_secs)
    }

    #[must_use]
    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_secs(self.navigation_timeout_secs)
    }

    #[must_use]
    pub fn devtools_mcp_command(&self) -> Option<&str> {
        self.devtools_mcp_command.as_deref()
    }

    #[must_use]
    pub fn captcha_api_key(&self) -> Option<&str> {
        self.captcha_api_key.as_deref()
    }

    #[must_use]
    pub fn captcha_provider_url(&self) -> &str {
        &self.captcha_provider_url
    }

    #[must_use]
    pub fn session_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.session_idle_timeout_secs)
    }

    #[must_use]
    pub fn session_cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.session_cleanup_interval_secs)
    }

    #[must_use]
    pub fn state_retention_hours(&self) -> u64 {
        self.state_retention_hours
    }

    #[must_use]
    pub fn resumable_max_age_hours(&self) -> u64 {
        self.resumable_max_age_hours
    }

    #[must_use]
    pub fn max_applications_per_day(&self) -> u32 {
        self.max_applications_per_day
    }

    #[must_use]
    pub fn max_auto_applications_per_day(&self) -> u32 {
        self.max_auto_applications_per_day
    }

    #[must_use]
    pub fn max_applications(&self) -> u32 {
        self.max_applications
    }

    #[must_use]
    pub fn delay_between_apps(&self) -> Duration {
        Duration::from_secs(self.delay_between_apps_secs)
    }

    #[must_use]
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    #[must_use]
    pub fn retry_delay_base_secs(&self) -> u64 {
        self.retry_delay_base_secs
    }

    #[must_use]
    pub fn auto_submit(&self) -> bool {
        self.auto_submit
    }

    #[must_use]
    pub fn max_steps(&self) -> u32 {
        self.max_steps
    }
}
