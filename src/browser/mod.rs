//! Browser Adapter (C1): a uniform low-level contract over two very
//! different automation backends — direct CDP control via `chromiumoxide`,
//! and accessibility-tree control over a devtools-mcp sidecar.
//!
//! Everything above this module speaks only the vocabulary defined here
//! (locators, `FormField`, `Outcome<T>`); the two backends keep their
//! element-identification schemes to themselves.

pub mod direct;
pub mod devtools_mcp;

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use serde_json::Value;
use thiserror::Error;

use crate::model::FormField;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("browser launch failed: {0}")]
    LaunchFailed(String),
    #[error("element not found for locator {0:?}")]
    ElementNotFound(String),
    #[error("navigation failed: {0}")]
    NavigationFailed(String),
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),
    #[error("script evaluation failed: {0}")]
    EvaluateFailed(String),
    #[error("devtools-mcp sidecar error: {0}")]
    Mcp(String),
    #[error("adapter already closed")]
    Closed,
}

pub type BrowserResult<T> = Result<T, BrowserError>;

/// Every adapter operation reports elapsed time alongside its result so
/// the orchestrator can log latency without instrumenting every call site.
#[derive(Debug, Clone)]
pub struct Outcome<T> {
    pub value: T,
    pub elapsed: Duration,
}

impl<T> Outcome<T> {
    #[must_use]
    pub fn new(value: T, elapsed: Duration) -> Self {
        Self { value, elapsed }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitUntil {
    Load,
    DomContentLoaded,
    NetworkIdle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementState {
    Visible,
    Hidden,
    Attached,
    Detached,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
}

#[derive(Debug, Clone)]
pub struct NavigateResult {
    pub url: String,
    pub title: String,
}

#[derive(Debug, Clone)]
pub struct DomSnapshot {
    pub url: String,
    pub title: String,
    pub html_snippet: String,
    pub fields: Vec<FormField>,
}

#[derive(Debug, Clone)]
pub struct AdapterConfig {
    pub viewport_width: u32,
    pub viewport_height: u32,
    pub headless: bool,
    pub action_slowdown: Duration,
    pub user_agent: Option<String>,
    pub default_timeout: Duration,
    /// Required by the devtools-mcp backend; ignored by direct-automation.
    pub remote_debugging_endpoint: Option<String>,
}

/// Uniform contract implemented by both backends. Every method returns a
/// `BoxFuture` (matching the `ShutdownHook` idiom elsewhere in this crate)
/// rather than using `async fn` so the trait stays dyn-dispatchable —
/// the session manager stores adapters as `Box<dyn BrowserAdapter>`.
pub trait BrowserAdapter: Send + Sync {
    fn initialize(&self, config: AdapterConfig) -> BoxFuture<'_, BrowserResult<Outcome<()>>>;

    fn close(&self) -> BoxFuture<'_, BrowserResult<Outcome<()>>>;

    fn navigate(
        &self,
        url: String,
        wait_until: WaitUntil,
        timeout: Duration,
    ) -> BoxFuture<'_, BrowserResult<Outcome<NavigateResult>>>;

    fn fill(
        &self,
        locator: String,
        value: String,
        clear_first: bool,
        force: bool,
        timeout: Duration,
    ) -> BoxFuture<'_, BrowserResult<Outcome<()>>>;

    fn click(
        &self,
        locator: String,
        button: MouseButton,
        count: u32,
        force: bool,
        timeout: Duration,
    ) -> BoxFuture<'_, BrowserResult<Outcome<()>>>;

    fn select(
        &self,
        locator: String,
        value: String,
        timeout: Duration,
    ) -> BoxFuture<'_, BrowserResult<Outcome<()>>>;

    fn upload(
        &self,
        locator: String,
        file_path: String,
        timeout: Duration,
    ) -> BoxFuture<'_, BrowserResult<Outcome<()>>>;

    fn screenshot(
        &self,
        full_page: bool,
        path: Option<String>,
    ) -> BoxFuture<'_, BrowserResult<Outcome<String>>>;

    fn evaluate(
        &self,
        script: String,
        args: Vec<Value>,
    ) -> BoxFuture<'_, BrowserResult<Outcome<Value>>>;

    fn get_dom(
        &self,
        scope_selector: Option<String>,
        form_fields_only: bool,
    ) -> BoxFuture<'_, BrowserResult<Outcome<DomSnapshot>>>;

    fn wait_for(
        &self,
        locator: String,
        state: ElementState,
        timeout: Duration,
    ) -> BoxFuture<'_, BrowserResult<Outcome<bool>>>;

    fn get_current_url(&self) -> BoxFuture<'_, BrowserResult<Outcome<String>>>;

    fn get_page_title(&self) -> BoxFuture<'_, BrowserResult<Outcome<String>>>;

    fn get_page_content(&self) -> BoxFuture<'_, BrowserResult<Outcome<String>>>;

    /// True once `is_element_visible`/`get_element_text` defaults below can
    /// be relied on to return meaningful data (i.e. after `initialize`).
    fn is_ready(&self) -> bool;
}

/// Default convenience wrappers over `evaluate`, mirroring the original
/// adapter base class's `is_element_visible`/`get_element_text` helpers.
pub trait BrowserAdapterExt: BrowserAdapter {
    fn is_element_visible<'a>(&'a self, locator: &str) -> BoxFuture<'a, BrowserResult<bool>> {
        let script = format!(
            "(() => {{ const el = document.querySelector({locator:?}); \
             if (!el) return false; \
             const r = el.getBoundingClientRect(); \
             return r.width > 0 && r.height > 0; }})()"
        );
        Box::pin(async move {
            let outcome = self.evaluate(script, Vec::new()).await?;
            Ok(outcome.value.as_bool().unwrap_or(false))
        })
    }

    fn get_element_text<'a>(&'a self, locator: &str) -> BoxFuture<'a, BrowserResult<String>> {
        let script = format!(
            "(() => {{ const el = document.querySelector({locator:?}); \
             return el ? (el.textContent || '').trim() : ''; }})()"
        );
        Box::pin(async move {
            let outcome = self.evaluate(script, Vec::new()).await?;
            Ok(outcome.value.as_str().unwrap_or_default().to_string())
        })
    }
}

impl<T: BrowserAdapter + ?Sized> BrowserAdapterExt for T {}
