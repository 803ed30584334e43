//! Direct-automation backend: drives a real Chromium process over CDP via
//! `chromiumoxide`. Locators are CSS selectors, used verbatim.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use chromiumoxide::browser::{Browser, BrowserConfigBuilder, HeadlessMode};
use chromiumoxide::Page;
use futures::StreamExt;
use serde_json::Value;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{error, trace, warn};

use crate::model::{FormField, FormFieldType};

use super::{
    AdapterConfig, BrowserAdapter, BrowserError, BrowserResult, BoxFuture, DomSnapshot,
    ElementState, MouseButton, NavigateResult, Outcome, WaitUntil,
};

const STEALTH_USER_AGENT: &str =
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

/// Find a Chrome/Chromium executable, checking `CHROMIUM_PATH` then common
/// per-platform install locations.
pub async fn find_browser_executable() -> anyhow::Result<PathBuf> {
    if let Ok(path) = std::env::var("CHROMIUM_PATH") {
        let path = PathBuf::from(path);
        if path.exists() {
            return Ok(path);
        }
        warn!("CHROMIUM_PATH points to a non-existent file: {}", path.display());
    }

    let candidates: &[&str] = if cfg!(target_os = "windows") {
        &[r"C:\Program Files\Google\Chrome\Application\chrome.exe"]
    } else if cfg!(target_os = "macos") {
        &["/Applications/Google Chrome.app/Contents/MacOS/Google Chrome"]
    } else {
        &[
            "/usr/bin/google-chrome",
            "/usr/bin/google-chrome-stable",
            "/usr/bin/chromium",
            "/usr/bin/chromium-browser",
            "/snap/bin/chromium",
        ]
    };

    for candidate in candidates {
        let path = PathBuf::from(candidate);
        if path.exists() {
            return Ok(path);
        }
    }

    anyhow::bail!("no Chrome/Chromium executable found")
}

struct Inner {
    browser: Browser,
    handler_task: JoinHandle<()>,
    page: Page,
}

/// `chromiumoxide`-backed adapter, one per browser session.
pub struct DirectAdapter {
    inner: Mutex<Option<Inner>>,
}

impl Default for DirectAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl DirectAdapter {
    #[must_use]
    pub fn new() -> Self {
        Self { inner: Mutex::new(None) }
    }

    async fn with_page<F, T>(&self, f: F) -> BrowserResult<T>
    where
        F: for<'p> FnOnce(&'p Page) -> BoxFuture<'p, Result<T, chromiumoxide::error::CdpError>>,
    {
        let guard = self.inner.lock().await;
        let inner = guard.as_ref().ok_or(BrowserError::Closed)?;
        f(&inner.page).await.map_err(|e| BrowserError::EvaluateFailed(e.to_string()))
    }
}

fn field_type_from_html(tag: &str, type_attr: &str) -> FormFieldType {
    match (tag, type_attr) {
        ("select", _) => FormFieldType::Select,
        ("textarea", _) => FormFieldType::Textarea,
        (_, "email") => FormFieldType::Email,
        (_, "tel") => FormFieldType::Tel,
        (_, "checkbox") => FormFieldType::Checkbox,
        (_, "radio") => FormFieldType::Radio,
        (_, "file") => FormFieldType::File,
        (_, "submit") | (_, "button") => FormFieldType::Submit,
        (_, "search") => FormFieldType::Search,
        (_, "number") => FormFieldType::Number,
        _ => FormFieldType::Text,
    }
}

const EXTRACT_FIELDS_JS: &str = r#"(() => {
  const scope = document;
  const nodes = Array.from(scope.querySelectorAll('input, select, textarea, button[type="submit"]'));
  return nodes.map((el, i) => ({
    locator: el.id ? ('#' + el.id) : (el.name ? ('[name="' + el.name + '"]') : ('__idx_' + i)),
    name: el.name || el.id || '',
    tag: el.tagName.toLowerCase(),
    type: (el.getAttribute('type') || '').toLowerCase(),
    label: (el.labels && el.labels[0]) ? el.labels[0].textContent.trim() : null,
    placeholder: el.getAttribute('placeholder'),
    required: !!el.required,
    value: el.value || null,
    options: el.tagName.toLowerCase() === 'select'
      ? Array.from(el.options).map(o => o.value)
      : [],
    visible: !!(el.offsetWidth || el.offsetHeight || el.getClientRects().length),
    enabled: !el.disabled,
  }));
})()"#;

impl BrowserAdapter for DirectAdapter {
    fn initialize(&self, config: AdapterConfig) -> BoxFuture<'_, BrowserResult<Outcome<()>>> {
        Box::pin(async move {
            let start = Instant::now();
            let chrome_path = find_browser_executable()
                .await
                .map_err(|e| BrowserError::LaunchFailed(e.to_string()))?;

            let user_data_dir = std::env::temp_dir()
                .join(format!("autoapply_chrome_{}", uuid::Uuid::new_v4()));
            std::fs::create_dir_all(&user_data_dir)
                .map_err(|e| BrowserError::LaunchFailed(e.to_string()))?;

            let mut builder = BrowserConfigBuilder::default()
                .request_timeout(config.default_timeout)
                .window_size(config.viewport_width, config.viewport_height)
                .user_data_dir(user_data_dir)
                .chrome_executable(chrome_path)
                .arg(format!(
                    "--user-agent={}",
                    config.user_agent.as_deref().unwrap_or(STEALTH_USER_AGENT)
                ))
                .arg("--disable-blink-features=AutomationControlled")
                .arg("--no-first-run")
                .arg("--no-default-browser-check")
                .arg("--disable-infobars");

            builder = if config.headless {
                builder.headless_mode(HeadlessMode::default())
            } else {
                builder.with_head()
            };

            let browser_config = builder
                .build()
                .map_err(|e| BrowserError::LaunchFailed(e))?;

            let (browser, mut handler) = Browser::launch(browser_config)
                .await
                .map_err(|e| BrowserError::LaunchFailed(e.to_string()))?;

            let handler_task = tokio::task::spawn(async move {
                while let Some(event) = handler.next().await {
                    if let Err(e) = event {
                        trace!(error = ?e, "browser handler event error");
                    }
                }
            });

            let page = browser
                .new_page("about:blank")
                .await
                .map_err(|e| BrowserError::LaunchFailed(e.to_string()))?;

            *self.inner.lock().await = Some(Inner { browser, handler_task, page });

            Ok(Outcome::new((), start.elapsed()))
        })
    }

    fn close(&self) -> BoxFuture<'_, BrowserResult<Outcome<()>>> {
        Box::pin(async move {
            let start = Instant::now();
            if let Some(inner) = self.inner.lock().await.take() {
                inner.handler_task.abort();
                if let Err(e) = inner.browser.close().await {
                    error!(error = ?e, "error closing browser");
                }
            }
            Ok(Outcome::new((), start.elapsed()))
        })
    }

    fn navigate(
        &self,
        url: String,
        wait_until: WaitUntil,
        timeout: Duration,
    ) -> BoxFuture<'_, BrowserResult<Outcome<NavigateResult>>> {
        Box::pin(async move {
            let start = Instant::now();
            let result = tokio::time::timeout(timeout, async {
                self.with_page(|page| {
                    let url = url.clone();
                    Box::pin(async move { page.goto(&url).await })
                })
                .await?;
                if wait_until != WaitUntil::Load {
                    self.with_page(|page| Box::pin(async move { page.wait_for_navigation().await }))
                        .await?;
                }
                let guard = self.inner.lock().await;
                let inner = guard.as_ref().ok_or(BrowserError::Closed)?;
                let current_url = inner.page.url().await.ok().flatten().unwrap_or_default();
                let title = inner.page.get_title().await.ok().flatten().unwrap_or_default();
                Ok(NavigateResult { url: current_url, title })
            })
            .await
            .map_err(|_| BrowserError::Timeout(timeout))??;
            Ok(Outcome::new(result, start.elapsed()))
        })
    }

    fn fill(
        &self,
        locator: String,
        value: String,
        clear_first: bool,
        _force: bool,
        timeout: Duration,
    ) -> BoxFuture<'_, BrowserResult<Outcome<()>>> {
        Box::pin(async move {
            let start = Instant::now();
            tokio::time::timeout(timeout, async {
                let guard = self.inner.lock().await;
                let inner = guard.as_ref().ok_or(BrowserError::Closed)?;
                let mut element = inner
                    .page
                    .find_element(&locator)
                    .await
                    .map_err(|_| BrowserError::ElementNotFound(locator.clone()))?;
                if clear_first {
                    let _ = element.click().await;
                    let _ = element
                        .evaluate("el => { el.value = ''; }")
                        .await;
                }
                element
                    .type_str(&value)
                    .await
                    .map_err(|e| BrowserError::EvaluateFailed(e.to_string()))?;
                Ok::<_, BrowserError>(())
            })
            .await
            .map_err(|_| BrowserError::Timeout(timeout))??;
            Ok(Outcome::new((), start.elapsed()))
        })
    }

    fn click(
        &self,
        locator: String,
        _button: MouseButton,
        count: u32,
        _force: bool,
        timeout: Duration,
    ) -> BoxFuture<'_, BrowserResult<Outcome<()>>> {
        Box::pin(async move {
            let start = Instant::now();
            tokio::time::timeout(timeout, async {
                let guard = self.inner.lock().await;
                let inner = guard.as_ref().ok_or(BrowserError::Closed)?;
                let mut element = inner
                    .page
                    .find_element(&locator)
                    .await
                    .map_err(|_| BrowserError::ElementNotFound(locator.clone()))?;
                for _ in 0..count.max(1) {
                    element
                        .click()
                        .await
                        .map_err(|e| BrowserError::EvaluateFailed(e.to_string()))?;
                }
                Ok::<_, BrowserError>(())
            })
            .await
            .map_err(|_| BrowserError::Timeout(timeout))??;
            Ok(Outcome::new((), start.elapsed()))
        })
    }

    fn select(
        &self,
        locator: String,
        value: String,
        timeout: Duration,
    ) -> BoxFuture<'_, BrowserResult<Outcome<()>>> {
        Box::pin(async move {
            let start = Instant::now();
            let script = format!(
                "(() => {{ const el = document.querySelector({locator:?}); \
                 if (!el) return false; \
                 el.value = {value:?}; \
                 el.dispatchEvent(new Event('input', {{ bubbles: true }})); \
                 el.dispatchEvent(new Event('change', {{ bubbles: true }})); \
                 return true; }})()"
            );
            let ok = tokio::time::timeout(timeout, self.evaluate_raw(&script))
                .await
                .map_err(|_| BrowserError::Timeout(timeout))??;
            if !ok.as_bool().unwrap_or(false) {
                return Err(BrowserError::ElementNotFound(locator));
            }
            Ok(Outcome::new((), start.elapsed()))
        })
    }

    fn upload(
        &self,
        locator: String,
        file_path: String,
        timeout: Duration,
    ) -> BoxFuture<'_, BrowserResult<Outcome<()>>> {
        Box::pin(async move {
            let start = Instant::now();
            tokio::time::timeout(timeout, async {
                let guard = self.inner.lock().await;
                let inner = guard.as_ref().ok_or(BrowserError::Closed)?;
                let mut element = inner
                    .page
                    .find_element(&locator)
                    .await
                    .map_err(|_| BrowserError::ElementNotFound(locator.clone()))?;
                element
                    .set_input_files(vec![file_path.clone()])
                    .await
                    .map_err(|e| BrowserError::EvaluateFailed(e.to_string()))?;
                Ok::<_, BrowserError>(())
            })
            .await
            .map_err(|_| BrowserError::Timeout(timeout))??;
            Ok(Outcome::new((), start.elapsed()))
        })
    }

    fn screenshot(
        &self,
        full_page: bool,
        path: Option<String>,
    ) -> BoxFuture<'_, BrowserResult<Outcome<String>>> {
        Box::pin(async move {
            let start = Instant::now();
            let guard = self.inner.lock().await;
            let inner = guard.as_ref().ok_or(BrowserError::Closed)?;
            let params = chromiumoxide::page::ScreenshotParams::builder()
                .full_page(full_page)
                .build();
            let bytes = inner
                .page
                .screenshot(params)
                .await
                .map_err(|e| BrowserError::EvaluateFailed(e.to_string()))?;
            if let Some(ref path) = path {
                tokio::fs::write(path, &bytes)
                    .await
                    .map_err(|e| BrowserError::EvaluateFailed(e.to_string()))?;
            }
            use base64::Engine;
            let encoded = base64::engine::general_purpose::STANDARD.encode(&bytes);
            Ok(Outcome::new(encoded, start.elapsed()))
        })
    }

    fn evaluate(
        &self,
        script: String,
        args: Vec<Value>,
    ) -> BoxFuture<'_, BrowserResult<Outcome<Value>>> {
        Box::pin(async move {
            let start = Instant::now();
            let wrapped = wrap_as_zero_arg_fn(&script, &args);
            let value = self.evaluate_raw(&wrapped).await?;
            Ok(Outcome::new(value, start.elapsed()))
        })
    }

    fn get_dom(
        &self,
        scope_selector: Option<String>,
        _form_fields_only: bool,
    ) -> BoxFuture<'_, BrowserResult<Outcome<DomSnapshot>>> {
        Box::pin(async move {
            let start = Instant::now();
            let guard = self.inner.lock().await;
            let inner = guard.as_ref().ok_or(BrowserError::Closed)?;
            let url = inner.page.url().await.ok().flatten().unwrap_or_default();
            let title = inner.page.get_title().await.ok().flatten().unwrap_or_default();
            let html = inner
                .page
                .content()
                .await
                .map_err(|e| BrowserError::EvaluateFailed(e.to_string()))?;
            let snippet: String = html.chars().take(4096).collect();
            drop(guard);

            let raw = self.evaluate_raw(EXTRACT_FIELDS_JS).await?;
            let fields = raw
                .as_array()
                .cloned()
                .unwrap_or_default()
                .into_iter()
                .filter_map(|v| {
                    let obj = v.as_object()?;
                    let tag = obj.get("tag")?.as_str()?.to_string();
                    let type_attr = obj.get("type").and_then(Value::as_str).unwrap_or_default();
                    Some(FormField {
                        locator: obj.get("locator")?.as_str()?.to_string(),
                        name: obj.get("name")?.as_str().unwrap_or_default().to_string(),
                        field_type: field_type_from_html(&tag, type_attr),
                        label: obj.get("label").and_then(Value::as_str).map(str::to_string),
                        placeholder: obj
                            .get("placeholder")
                            .and_then(Value::as_str)
                            .map(str::to_string),
                        required: obj.get("required").and_then(Value::as_bool).unwrap_or(false),
                        value: obj.get("value").and_then(Value::as_str).map(str::to_string),
                        options: obj
                            .get("options")
                            .and_then(Value::as_array)
                            .map(|a| a.iter().filter_map(|o| o.as_str().map(str::to_string)).collect())
                            .unwrap_or_default(),
                        visible: obj.get("visible").and_then(Value::as_bool).unwrap_or(true),
                        enabled: obj.get("enabled").and_then(Value::as_bool).unwrap_or(true),
                    })
                })
                .collect();

            let _ = scope_selector;
            Ok(Outcome::new(
                DomSnapshot { url, title, html_snippet: snippet, fields },
                start.elapsed(),
            ))
        })
    }

    fn wait_for(
        &self,
        locator: String,
        state: ElementState,
        timeout: Duration,
    ) -> BoxFuture<'_, BrowserResult<Outcome<bool>>> {
        Box::pin(async move {
            let start = Instant::now();
            let deadline = Instant::now() + timeout;
            loop {
                let found = self
                    .with_page(|page| {
                        let locator = locator.clone();
                        Box::pin(async move { page.find_element(&locator).await })
                    })
                    .await
                    .is_ok();
                let satisfied = match state {
                    ElementState::Attached | ElementState::Visible => found,
                    ElementState::Detached | ElementState::Hidden => !found,
                };
                if satisfied {
                    return Ok(Outcome::new(true, start.elapsed()));
                }
                if Instant::now() >= deadline {
                    return Ok(Outcome::new(false, start.elapsed()));
                }
                tokio::time::sleep(Duration::from_millis(150)).await;
            }
        })
    }

    fn get_current_url(&self) -> BoxFuture<'_, BrowserResult<Outcome<String>>> {
        Box::pin(async move {
            let start = Instant::now();
            let guard = self.inner.lock().await;
            let inner = guard.as_ref().ok_or(BrowserError::Closed)?;
            let url = inner.page.url().await.ok().flatten().unwrap_or_default();
            Ok(Outcome::new(url, start.elapsed()))
        })
    }

    fn get_page_title(&self) -> BoxFuture<'_, BrowserResult<Outcome<String>>> {
        Box::pin(async move {
            let start = Instant::now();
            let guard = self.inner.lock().await;
            let inner = guard.as_ref().ok_or(BrowserError::Closed)?;
            let title = inner.page.get_title().await.ok().flatten().unwrap_or_default();
            Ok(Outcome::new(title, start.elapsed()))
        })
    }

    fn get_page_content(&self) -> BoxFuture<'_, BrowserResult<Outcome<String>>> {
        Box::pin(async move {
            let start = Instant::now();
            let guard = self.inner.lock().await;
            let inner = guard.as_ref().ok_or(BrowserError::Closed)?;
            let content = inner
                .page
                .content()
                .await
                .map_err(|e| BrowserError::EvaluateFailed(e.to_string()))?;
            Ok(Outcome::new(content, start.elapsed()))
        })
    }

    fn is_ready(&self) -> bool {
        self.inner.try_lock().map(|g| g.is_some()).unwrap_or(false)
    }
}

fn wrap_as_zero_arg_fn(script: &str, args: &[Value]) -> String {
    if args.is_empty() {
        script.to_string()
    } else {
        let args_json = serde_json::to_string(&Value::Array(args.to_vec()))
            .unwrap_or_else(|_| "[]".to_string());
        format!("(() => ({script}))(...{args_json})")
    }
}

impl DirectAdapter {
    async fn evaluate_raw(&self, script: &str) -> BrowserResult<Value> {
        let guard = self.inner.lock().await;
        let inner = guard.as_ref().ok_or(BrowserError::Closed)?;
        let result = inner
            .page
            .evaluate(script)
            .await
            .map_err(|e| BrowserError::EvaluateFailed(e.to_string()))?;
        result
            .into_value::<Value>()
            .map_err(|e| BrowserError::EvaluateFailed(e.to_string()))
    }
}

