//! Accessibility-tree backend: drives a devtools-mcp sidecar over stdio.
//!
//! Locators arriving from above this module are CSS-like selectors; this
//! adapter is responsible for translating them into accessibility-tree
//! UIDs by (1) guessing a role from the selector, (2) extracting a name
//! hint from `name=`/`id=` fragments, (3) taking a fresh snapshot, and
//! (4) searching role-then-name-then-first-of-role.

use std::time::{Duration, Instant};

use regex::Regex;
use rmcp::model::CallToolRequestParam;
use rmcp::service::{RoleClient, RunningService};
use rmcp::transport::TokioChildProcess;
use rmcp::ServiceExt;
use serde_json::{json, Map, Value};
use tokio::process::Command;
use tokio::sync::Mutex;

use crate::model::{FormField, FormFieldType};

use super::{
    AdapterConfig, BrowserAdapter, BrowserError, BrowserResult, BoxFuture, DomSnapshot,
    ElementState, MouseButton, NavigateResult, Outcome, WaitUntil,
};

#[derive(Debug, Clone)]
struct SnapshotElement {
    uid: String,
    role: String,
    name: String,
}

fn parse_snapshot(text: &str) -> Vec<SnapshotElement> {
    static PATTERN: &str = r#"uid=(\d+_\d+)\s+(\w+)(?:\s+"([^"]*)")?"#;
    let re = Regex::new(PATTERN).expect("snapshot pattern is a valid regex");
    re.captures_iter(text)
        .map(|cap| SnapshotElement {
            uid: cap[1].to_string(),
            role: cap[2].to_string(),
            name: cap.get(3).map(|m| m.as_str().to_string()).unwrap_or_default(),
        })
        .collect()
}

/// Best-effort mapping from a CSS-like selector to an accessibility role
/// and an optional name hint, mirroring the original adapter's heuristic.
fn guess_role_from_selector(selector: &str) -> (String, String) {
    let lower = selector.to_lowercase();

    if lower.contains("input") {
        if lower.contains("type=") {
            if lower.contains("submit") {
                return ("button".into(), String::new());
            }
            if lower.contains("checkbox") {
                return ("checkbox".into(), String::new());
            }
            if lower.contains("radio") {
                return ("radio".into(), String::new());
            }
            if lower.contains("file") {
                return ("button".into(), String::new());
            }
        }
        return ("textbox".into(), String::new());
    }
    if lower.contains("button") {
        return ("button".into(), String::new());
    }
    if lower.contains("select") {
        return ("combobox".into(), String::new());
    }
    if lower.contains("textarea") {
        return ("textbox".into(), String::new());
    }
    if lower.contains("a[") || lower.contains("link") {
        return ("link".into(), String::new());
    }

    if let Some(cap) = Regex::new(r#"name="([^"]+)""#).unwrap().captures(selector) {
        return ("textbox".into(), cap[1].to_string());
    }
    if let Some(cap) = Regex::new(r"#([a-zA-Z0-9_-]+)").unwrap().captures(selector) {
        return (String::new(), cap[1].to_string());
    }

    (String::new(), String::new())
}

fn field_type_from_role(role: &str) -> FormFieldType {
    match role {
        "textbox" | "searchbox" => FormFieldType::Text,
        "textarea" => FormFieldType::Textarea,
        "combobox" | "listbox" => FormFieldType::Select,
        "checkbox" | "switch" => FormFieldType::Checkbox,
        "radio" | "menuitemradio" => FormFieldType::Radio,
        "button" => FormFieldType::Submit,
        "spinbutton" | "slider" => FormFieldType::Number,
        _ => FormFieldType::Text,
    }
}

struct Inner {
    peer: RunningService<RoleClient, ()>,
    cached_elements: Vec<SnapshotElement>,
    last_url: String,
    last_title: String,
}

/// devtools-mcp-backed adapter, one per browser session. The sidecar
/// process is spawned from `AdapterConfig::remote_debugging_endpoint`
/// (an `npx chrome-devtools-mcp@latest --browserUrl=<endpoint>`-style
/// command) via `devtools_mcp_command` in the application config.
pub struct McpAdapter {
    inner: Mutex<Option<Inner>>,
    command: String,
}

impl McpAdapter {
    #[must_use]
    pub fn new(command: impl Into<String>) -> Self {
        Self { inner: Mutex::new(None), command: command.into() }
    }

    async fn call_tool(&self, name: &str, arguments: Map<String, Value>) -> BrowserResult<Value> {
        let guard = self.inner.lock().await;
        let inner = guard.as_ref().ok_or(BrowserError::Closed)?;
        let result = inner
            .peer
            .peer()
            .call_tool(CallToolRequestParam { name: name.to_string().into(), arguments: Some(arguments) })
            .await
            .map_err(|e| BrowserError::Mcp(e.to_string()))?;
        Ok(serde_json::to_value(result).unwrap_or(Value::Null))
    }

    async fn refresh_snapshot(&self) -> BrowserResult<()> {
        let raw = self.call_tool("take_snapshot", Map::new()).await?;
        let text = extract_text_payload(&raw);
        let elements = parse_snapshot(&text);
        let mut guard = self.inner.lock().await;
        if let Some(inner) = guard.as_mut() {
            inner.cached_elements = elements;
        }
        Ok(())
    }

    async fn find_uid_for_selector(&self, selector: &str) -> BrowserResult<String> {
        self.refresh_snapshot().await?;
        let (role_hint, name_hint) = guess_role_from_selector(selector);
        let guard = self.inner.lock().await;
        let inner = guard.as_ref().ok_or(BrowserError::Closed)?;

        if !role_hint.is_empty() {
            if let Some(el) = inner.cached_elements.iter().find(|el| {
                el.role.eq_ignore_ascii_case(&role_hint)
                    && (name_hint.is_empty()
                        || el.name.to_lowercase().contains(&name_hint.to_lowercase()))
            }) {
                return Ok(el.uid.clone());
            }
        }
        if !name_hint.is_empty() {
            if let Some(el) = inner
                .cached_elements
                .iter()
                .find(|el| el.name.to_lowercase().contains(&name_hint.to_lowercase()))
            {
                return Ok(el.uid.clone());
            }
        }
        if selector.to_lowercase().contains("input") || selector.to_lowercase().contains("textarea")
        {
            if let Some(el) = inner.cached_elements.iter().find(|el| el.role == "textbox") {
                return Ok(el.uid.clone());
            }
        }
        Err(BrowserError::ElementNotFound(selector.to_string()))
    }
}

fn extract_text_payload(raw: &Value) -> String {
    if let Some(text) = raw.get("content").and_then(Value::as_array).and_then(|arr| arr.first()) {
        if let Some(s) = text.get("text").and_then(Value::as_str) {
            return s.to_string();
        }
    }
    raw.as_str().map(str::to_string).unwrap_or_else(|| raw.to_string())
}

impl BrowserAdapter for McpAdapter {
    fn initialize(&self, config: AdapterConfig) -> BoxFuture<'_, BrowserResult<Outcome<()>>> {
        Box::pin(async move {
            let start = Instant::now();
            let endpoint = config
                .remote_debugging_endpoint
                .ok_or_else(|| BrowserError::Mcp("devtools-mcp requires a remote-debugging endpoint".into()))?;

            let mut parts = self.command.split_whitespace();
            let program = parts.next().ok_or_else(|| BrowserError::Mcp("empty devtools-mcp command".into()))?;
            let mut cmd = Command::new(program);
            cmd.args(parts);
            cmd.arg(format!("--browserUrl={endpoint}"));

            let transport = TokioChildProcess::new(cmd)
                .map_err(|e| BrowserError::Mcp(e.to_string()))?;
            let peer = ().serve(transport).await.map_err(|e| BrowserError::Mcp(e.to_string()))?;

            *self.inner.lock().await = Some(Inner {
                peer,
                cached_elements: Vec::new(),
                last_url: String::new(),
                last_title: String::new(),
            });
            Ok(Outcome::new((), start.elapsed()))
        })
    }

    fn close(&self) -> BoxFuture<'_, BrowserResult<Outcome<()>>> {
        Box::pin(async move {
            let start = Instant::now();
            if let Some(inner) = self.inner.lock().await.take() {
                let _ = inner.peer.cancel().await;
            }
            Ok(Outcome::new((), start.elapsed()))
        })
    }

    fn navigate(
        &self,
        url: String,
        _wait_until: WaitUntil,
        timeout: Duration,
    ) -> BoxFuture<'_, BrowserResult<Outcome<NavigateResult>>> {
        Box::pin(async move {
            let start = Instant::now();
            let mut args = Map::new();
            args.insert("url".into(), json!(url));
            tokio::time::timeout(timeout, self.call_tool("navigate_page", args))
                .await
                .map_err(|_| BrowserError::Timeout(timeout))??;

            let mut guard = self.inner.lock().await;
            let inner = guard.as_mut().ok_or(BrowserError::Closed)?;
            inner.last_url = url.clone();
            let result = NavigateResult { url, title: inner.last_title.clone() };
            Ok(Outcome::new(result, start.elapsed()))
        })
    }

    fn fill(
        &self,
        locator: String,
        value: String,
        _clear_first: bool,
        _force: bool,
        timeout: Duration,
    ) -> BoxFuture<'_, BrowserResult<Outcome<()>>> {
        Box::pin(async move {
            let start = Instant::now();
            let uid = tokio::time::timeout(timeout, self.find_uid_for_selector(&locator))
                .await
                .map_err(|_| BrowserError::Timeout(timeout))??;
            let mut args = Map::new();
            args.insert("uid".into(), json!(uid));
            args.insert("value".into(), json!(value));
            self.call_tool("fill", args).await?;
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
            let uid = tokio::time::timeout(timeout, self.find_uid_for_selector(&locator))
                .await
                .map_err(|_| BrowserError::Timeout(timeout))??;
            for _ in 0..count.max(1) {
                let mut args = Map::new();
                args.insert("uid".into(), json!(uid));
                self.call_tool("click", args).await?;
            }
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
            let uid = tokio::time::timeout(timeout, self.find_uid_for_selector(&locator))
                .await
                .map_err(|_| BrowserError::Timeout(timeout))??;
            let mut click_args = Map::new();
            click_args.insert("uid".into(), json!(uid.clone()));
            self.call_tool("click", click_args).await?;
            let mut press_args = Map::new();
            press_args.insert("uid".into(), json!(uid));
            press_args.insert("text".into(), json!(value));
            self.call_tool("press_key", press_args).await?;
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
            let uid = tokio::time::timeout(timeout, self.find_uid_for_selector(&locator))
                .await
                .map_err(|_| BrowserError::Timeout(timeout))??;
            let mut args = Map::new();
            args.insert("uid".into(), json!(uid));
            args.insert("filePath".into(), json!(file_path));
            self.call_tool("upload_file", args).await?;
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
            let mut args = Map::new();
            args.insert("fullPage".into(), json!(full_page));
            let raw = self.call_tool("take_screenshot", args).await?;
            let data = extract_text_payload(&raw);
            if let Some(ref path) = path {
                use base64::Engine;
                if let Ok(bytes) = base64::engine::general_purpose::STANDARD.decode(&data) {
                    let _ = tokio::fs::write(path, bytes).await;
                }
            }
            Ok(Outcome::new(data, start.elapsed()))
        })
    }

    fn evaluate(
        &self,
        script: String,
        args: Vec<Value>,
    ) -> BoxFuture<'_, BrowserResult<Outcome<Value>>> {
        Box::pin(async move {
            let start = Instant::now();
            let wrapped = if args.is_empty() {
                format!("() => {{ return ({script}); }}")
            } else {
                format!("() => {{ return ({script})({args:?}); }}", args = json!(args))
            };
            let mut call_args = Map::new();
            call_args.insert("function".into(), json!(wrapped));
            let raw = self.call_tool("evaluate_script", call_args).await?;
            Ok(Outcome::new(raw, start.elapsed()))
        })
    }

    fn get_dom(
        &self,
        _scope_selector: Option<String>,
        _form_fields_only: bool,
    ) -> BoxFuture<'_, BrowserResult<Outcome<DomSnapshot>>> {
        Box::pin(async move {
            let start = Instant::now();
            self.refresh_snapshot().await?;
            let guard = self.inner.lock().await;
            let inner = guard.as_ref().ok_or(BrowserError::Closed)?;

            let fields = inner
                .cached_elements
                .iter()
                .filter(|el| {
                    matches!(
                        el.role.as_str(),
                        "textbox" | "searchbox" | "textarea" | "combobox" | "listbox"
                            | "checkbox" | "switch" | "radio" | "menuitemradio" | "button"
                            | "spinbutton" | "slider"
                    )
                })
                .map(|el| FormField {
                    locator: format!("uid={}", el.uid),
                    name: el.name.clone(),
                    field_type: field_type_from_role(&el.role),
                    label: if el.name.is_empty() { None } else { Some(el.name.clone()) },
                    placeholder: None,
                    required: false,
                    value: None,
                    options: Vec::new(),
                    visible: true,
                    enabled: true,
                })
                .collect();

            Ok(Outcome::new(
                DomSnapshot {
                    url: inner.last_url.clone(),
                    title: inner.last_title.clone(),
                    html_snippet: String::new(),
                    fields,
                },
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
                let found = self.find_uid_for_selector(&locator).await.is_ok();
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
                tokio::time::sleep(Duration::from_millis(200)).await;
            }
        })
    }

    fn get_current_url(&self) -> BoxFuture<'_, BrowserResult<Outcome<String>>> {
        Box::pin(async move {
            let start = Instant::now();
            let guard = self.inner.lock().await;
            let inner = guard.as_ref().ok_or(BrowserError::Closed)?;
            Ok(Outcome::new(inner.last_url.clone(), start.elapsed()))
        })
    }

    fn get_page_title(&self) -> BoxFuture<'_, BrowserResult<Outcome<String>>> {
        Box::pin(async move {
            let start = Instant::now();
            let guard = self.inner.lock().await;
            let inner = guard.as_ref().ok_or(BrowserError::Closed)?;
            Ok(Outcome::new(inner.last_title.clone(), start.elapsed()))
        })
    }

    fn get_page_content(&self) -> BoxFuture<'_, BrowserResult<Outcome<String>>> {
        Box::pin(async move {
            let start = Instant::now();
            let raw = self.call_tool("take_snapshot", Map::new()).await?;
            Ok(Outcome::new(extract_text_payload(&raw), start.elapsed()))
        })
    }

    fn is_ready(&self) -> bool {
        self.inner.try_lock().map(|g| g.is_some()).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_uid_role_name_lines() {
        let snapshot = r#"uid=1_0 RootWebArea "Example Domain" url="https://example.com/"
  uid=1_1 heading "Example Domain" level="1"
  uid=1_2 textbox "Email""#;
        let elements = parse_snapshot(snapshot);
        assert_eq!(elements.len(), 3);
        assert_eq!(elements[2].uid, "1_2");
        assert_eq!(elements[2].role, "textbox");
        assert_eq!(elements[2].name, "Email");
    }

    #[test]
    fn guesses_textbox_role_for_email_input() {
        let (role, _) = guess_role_from_selector(r#"input[type="email"]"#);
        assert_eq!(role, "textbox");
    }

    #[test]
    fn guesses_button_role_for_submit_input() {
        let (role, _) = guess_role_from_selector(r#"input[type="submit"]"#);
        assert_eq!(role, "button");
    }

    #[test]
    fn maps_combobox_role_to_select_field_type() {
        assert_eq!(field_type_from_role("combobox"), FormFieldType::Select);
        assert_eq!(field_type_from_role("spinbutton"), FormFieldType::Number);
    }
}
