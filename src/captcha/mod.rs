//! CAPTCHA Solver (C4): sitekey extraction plus an HTTP client for an
//! external solving provider's `in.php`/`res.php` polling API.
//!
//! Token injection is a DOM concern handled by the browser adapter; this
//! module only produces the JavaScript snippet and the solved token.

use std::time::Duration;

use regex::Regex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::CaptchaFamily;

#[derive(Debug, Error)]
pub enum CaptchaError {
    #[error("no CAPTCHA provider API key configured")]
    NotConfigured,
    #[error("could not detect CAPTCHA type on page")]
    TypeNotDetected,
    #[error("could not extract sitekey for {0:?}")]
    SitekeyNotFound(CaptchaFamily),
    #[error("provider request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("provider returned an error: {0}")]
    Provider(String),
    #[error("timed out waiting for solve after {0:?}")]
    Timeout(Duration),
}

pub type CaptchaResult<T> = Result<T, CaptchaError>;

fn sitekey_patterns(family: CaptchaFamily) -> &'static [&'static str] {
    match family {
        CaptchaFamily::Turnstile => &[
            r#"data-sitekey=["']([^"']+)["']"#,
            r#"sitekey:\s*["']([^"']+)["']"#,
        ],
        CaptchaFamily::HCaptcha => &[
            r#"data-sitekey=["']([^"']+)["']"#,
            r#"h-captcha[\s\S]*?data-sitekey=["']([^"']+)["']"#,
        ],
        CaptchaFamily::RecaptchaV2 => &[
            r#"data-sitekey=["']([^"']+)["']"#,
            r#"g-recaptcha[\s\S]*?data-sitekey=["']([^"']+)["']"#,
        ],
        CaptchaFamily::RecaptchaV3 => &[
            r#"grecaptcha\.execute\s*\(\s*["']([^"']+)["']"#,
            r"recaptcha/api\.js\?render=([^\"'&]+)",
        ],
    }
}

/// Detect which CAPTCHA family a page is showing, in priority order
/// matching the blocker detector: Turnstile, hCaptcha, reCAPTCHA v3, v2.
#[must_use]
pub fn detect_type(page_html: &str) -> Option<CaptchaFamily> {
    let html_lower = page_html.to_lowercase();
    if html_lower.contains("turnstile") || html_lower.contains("cf-turnstile") {
        Some(CaptchaFamily::Turnstile)
    } else if html_lower.contains("hcaptcha") || html_lower.contains("h-captcha") {
        Some(CaptchaFamily::HCaptcha)
    } else if html_lower.contains("grecaptcha.execute") {
        Some(CaptchaFamily::RecaptchaV3)
    } else if html_lower.contains("g-recaptcha") || html_lower.contains("recaptcha") {
        Some(CaptchaFamily::RecaptchaV2)
    } else {
        None
    }
}

/// Pull a sitekey out of page HTML for a known CAPTCHA family, trying
/// each pattern for that family in order.
#[must_use]
pub fn extract_sitekey(page_html: &str, family: CaptchaFamily) -> Option<String> {
    for pattern in sitekey_patterns(family) {
        let re = Regex::new(&format!("(?i){pattern}")).ok()?;
        if let Some(cap) = re.captures(page_html) {
            if let Some(m) = cap.get(1) {
                return Some(m.as_str().to_string());
            }
        }
    }
    None
}

#[derive(Debug, Clone)]
pub struct SolveOutcome {
    pub token: String,
    pub family: CaptchaFamily,
    pub solve_time: Duration,
}

#[derive(Debug, Deserialize)]
struct CreateTaskResponse {
    status: u8,
    request: String,
}

#[derive(Debug, Deserialize)]
struct TaskResultResponse {
    status: u8,
    request: Value,
}

use serde_json::Value;

/// Client for an external solving provider exposing the widely-copied
/// 2captcha `in.php`/`res.php` polling contract.
pub struct CaptchaSolver {
    client: Client,
    api_key: Option<String>,
    provider_url: String,
    poll_interval: Duration,
    timeout: Duration,
}

impl CaptchaSolver {
    #[must_use]
    pub fn new(api_key: Option<String>, provider_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key,
            provider_url: provider_url.into(),
            poll_interval: Duration::from_secs(5),
            timeout: Duration::from_secs(120),
        }
    }

    #[must_use]
    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    async fn create_task(&self, family: CaptchaFamily, sitekey: &str, page_url: &str) -> CaptchaResult<String> {
        let api_key = self.api_key.as_ref().ok_or(CaptchaError::NotConfigured)?;
        let method = match family {
            CaptchaFamily::Turnstile => "turnstile",
            CaptchaFamily::HCaptcha => "hcaptcha",
            CaptchaFamily::RecaptchaV2 | CaptchaFamily::RecaptchaV3 => "userrecaptcha",
        };
        let mut form = vec![
            ("key".to_string(), api_key.clone()),
            ("method".to_string(), method.to_string()),
            ("sitekey".to_string(), sitekey.to_string()),
            ("pageurl".to_string(), page_url.to_string()),
            ("json".to_string(), "1".to_string()),
        ];
        if family == CaptchaFamily::RecaptchaV3 {
            form.push(("version".to_string(), "v3".to_string()));
            form.push(("action".to_string(), "submit".to_string()));
            form.push(("min_score".to_string(), "0.9".to_string()));
        }

        let response: CreateTaskResponse = self
            .client
            .post(format!("{}/in.php", self.provider_url))
            .form(&form)
            .send()
            .await?
            .json()
            .await?;

        if response.status != 1 {
            return Err(CaptchaError::Provider(response.request));
        }
        Ok(response.request)
    }

    async fn poll_result(&self, task_id: &str) -> CaptchaResult<String> {
        let api_key = self.api_key.as_ref().ok_or(CaptchaError::NotConfigured)?;
        let deadline = tokio::time::Instant::now() + self.timeout;

        loop {
            tokio::time::sleep(self.poll_interval).await;

            let response: TaskResultResponse = self
                .client
                .get(format!("{}/res.php", self.provider_url))
                .query(&[
                    ("key", api_key.as_str()),
                    ("action", "get"),
                    ("id", task_id),
                    ("json", "1"),
                ])
                .send()
                .await?
                .json()
                .await?;

            if response.status == 1 {
                return Ok(response.request.as_str().unwrap_or_default().to_string());
            }
            if response.request != Value::String("CAPCHA_NOT_READY".to_string()) {
                return Err(CaptchaError::Provider(response.request.to_string()));
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(CaptchaError::Timeout(self.timeout));
            }
        }
    }

    /// Submit a CAPTCHA for solving and poll until a token is returned or
    /// `timeout` elapses.
    pub async fn solve(
        &self,
        family: CaptchaFamily,
        sitekey: &str,
        page_url: &str,
    ) -> CaptchaResult<SolveOutcome> {
        let start = std::time::Instant::now();
        let task_id = self.create_task(family, sitekey, page_url).await?;
        let token = self.poll_result(&task_id).await?;
        Ok(SolveOutcome { token, family, solve_time: start.elapsed() })
    }

    /// Detect, extract, and solve in one call.
    pub async fn solve_from_html(&self, page_html: &str, page_url: &str) -> CaptchaResult<SolveOutcome> {
        let family = detect_type(page_html).ok_or(CaptchaError::TypeNotDetected)?;
        let sitekey = extract_sitekey(page_html, family).ok_or(CaptchaError::SitekeyNotFound(family))?;
        self.solve(family, &sitekey, page_url).await
    }

    /// Query the provider account's remaining balance, in USD.
    pub async fn get_balance(&self) -> CaptchaResult<f64> {
        let api_key = self.api_key.as_ref().ok_or(CaptchaError::NotConfigured)?;
        #[derive(Deserialize)]
        struct BalanceResponse {
            status: u8,
            request: Value,
        }
        let response: BalanceResponse = self
            .client
            .get(format!("{}/res.php", self.provider_url))
            .query(&[("key", api_key.as_str()), ("action", "getbalance"), ("json", "1")])
            .send()
            .await?
            .json()
            .await?;
        if response.status != 1 {
            return Err(CaptchaError::Provider(response.request.to_string()));
        }
        response
            .request
            .as_str()
            .and_then(|s| s.parse::<f64>().ok())
            .or_else(|| response.request.as_f64())
            .ok_or_else(|| CaptchaError::Provider("non-numeric balance".into()))
    }
}

/// Build the JavaScript that writes a solved token into the page's
/// hidden response field(s) and, where the vendor exposes one, fires its
/// widget callback.
#[must_use]
pub fn injection_script(family: CaptchaFamily, token: &str) -> String {
    let field_name = family.response_field();
    let mut script = format!(
        r#"(function() {{
    var fields = document.querySelectorAll('[name="{field_name}"], [id="{field_name}"]');
    fields.forEach(function(field) {{ field.value = "{token}"; }});
    var textareas = document.querySelectorAll('textarea[name*="response"], textarea[name*="captcha"]');
    textareas.forEach(function(ta) {{ ta.value = "{token}"; }});
"#
    );

    let vendor_block = match family {
        CaptchaFamily::Turnstile | CaptchaFamily::HCaptcha => format!(
            r#"
    var widgets = document.querySelectorAll('[data-callback]');
    widgets.forEach(function(w) {{
        var callback = w.getAttribute('data-callback');
        if (window[callback]) window[callback]("{token}");
    }});
"#
        ),
        CaptchaFamily::RecaptchaV2 | CaptchaFamily::RecaptchaV3 => format!(
            r#"
    if (typeof grecaptcha !== 'undefined') {{
        document.querySelectorAll('.g-recaptcha-response').forEach(function(el) {{
            el.innerHTML = "{token}";
            el.value = "{token}";
        }});
    }}
    var widgets = document.querySelectorAll('[data-callback]');
    widgets.forEach(function(w) {{
        var callback = w.getAttribute('data-callback');
        if (window[callback]) window[callback]("{token}");
    }});
"#
        ),
    };
    script.push_str(&vendor_block);
    script.push_str("\n    return true;\n})();");
    script
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_turnstile_before_recaptcha() {
        let html = r#"<div class="cf-turnstile"></div><script>grecaptcha.execute()</script>"#;
        assert_eq!(detect_type(html), Some(CaptchaFamily::Turnstile));
    }

    #[test]
    fn extracts_sitekey_from_data_attribute() {
        let html = r#"<div class="cf-turnstile" data-sitekey="0x4AAAABC123"></div>"#;
        assert_eq!(
            extract_sitekey(html, CaptchaFamily::Turnstile),
            Some("0x4AAAABC123".to_string())
        );
    }

    #[test]
    fn missing_sitekey_returns_none() {
        let html = r#"<div class="cf-turnstile"></div>"#;
        assert_eq!(extract_sitekey(html, CaptchaFamily::Turnstile), None);
    }

    #[test]
    fn injection_script_targets_response_field_by_name() {
        let script = injection_script(CaptchaFamily::HCaptcha, "tok123");
        assert!(script.contains("h-captcha-response"));
        assert!(script.contains("tok123"));
    }
}
