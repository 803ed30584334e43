//! Strategy for Breezy.hr application forms. Breezy's native fill/click
//! paths are prone to timeouts, so fields and the submit button are set
//! via `evaluate` first, falling back to the adapter's native fill/click.

use std::time::Duration;

use serde_json::Value;

use super::{AtsError, AtsResult, AtsStrategy, FormAnalysis, FormFillOutcome, SubmitOutcome};
use crate::browser::{BrowserAdapter, BrowserAdapterExt, BoxFuture};
use crate::model::UserProfile;

const FIRST_NAME: &[&str] = &[r#"input[name*="first_name"]"#, r#"input[placeholder*="First name"]"#];
const LAST_NAME: &[&str] = &[r#"input[name*="last_name"]"#, r#"input[placeholder*="Last name"]"#];
const EMAIL: &[&str] = &[r#"input[type="email"]"#, r#"input[name*="email"]"#];
const PHONE: &[&str] = &[r#"input[type="tel"]"#, r#"input[name*="phone"]"#];
const LINKEDIN: &[&str] = &[r#"input[name*="linkedin"]"#, r#"input[placeholder*="LinkedIn"]"#];
const PORTFOLIO: &[&str] = &[r#"input[name*="portfolio"]"#, r#"input[name*="website"]"#];
const RESUME: &[&str] = &[r#"input[type="file"][name*="resume"]"#, r#"input[accept*="pdf"]"#];
const COVER_LETTER: &[&str] = &[r#"textarea[name*="cover"]"#, r#"textarea[placeholder*="Cover"]"#];
const SUBMIT_BUTTONS: &[&str] =
    &[r#"button[type="submit"]"#, "button.btn-primary", r#"input[type="submit"]"#];

const SUCCESS_INDICATORS: &[&str] =
    &["thank you", "application received", "successfully submitted", "we'll be in touch"];

/// Set `.value` on the first element matching `selector` and dispatch an
/// `input` event so frameworks observing the DOM pick up the change.
async fn fill_with_js(adapter: &dyn BrowserAdapter, selector: &str, value: &str) -> bool {
    let script = format!(
        "(() => {{ const el = document.querySelector({selector:?}); \
         if (!el) return false; \
         el.value = {value:?}; \
         el.dispatchEvent(new Event('input', {{ bubbles: true }})); \
         return true; }})()"
    );
    matches!(adapter.evaluate(script, Vec::new()).await, Ok(outcome) if outcome.value == Value::Bool(true))
}

async fn click_with_js(adapter: &dyn BrowserAdapter, selector: &str) -> bool {
    let script = format!(
        "(() => {{ const el = document.querySelector({selector:?}); \
         if (!el) return false; el.click(); return true; }})()"
    );
    matches!(adapter.evaluate(script, Vec::new()).await, Ok(outcome) if outcome.value == Value::Bool(true))
}

async fn fill_field(adapter: &dyn BrowserAdapter, selectors: &[&str], value: &str) -> Option<String> {
    for selector in selectors {
        if fill_with_js(adapter, selector, value).await {
            return Some((*selector).to_string());
        }
    }
    for selector in selectors {
        if adapter.is_element_visible(selector).await.unwrap_or(false)
            && adapter
                .fill((*selector).to_string(), value.to_string(), true, false, Duration::from_secs(5))
                .await
                .is_ok()
        {
            return Some((*selector).to_string());
        }
    }
    None
}

pub struct BreezyStrategy;

impl BreezyStrategy {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Default for BreezyStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl AtsStrategy for BreezyStrategy {
    fn name(&self) -> &'static str {
        "breezy"
    }

    fn url_patterns(&self) -> &[&'static str] {
        &[r".*\.breezy\.hr/.*", r".*breezyhr\.com/.*"]
    }

    fn detect_content(&self, page_html: &str, page_url: &str) -> bool {
        let lower_url = page_url.to_lowercase();
        lower_url.contains("breezy.hr")
            || lower_url.contains("breezyhr")
            || page_html.contains("data-breezy")
            || page_html.contains("Powered by Breezy")
            || page_html.to_lowercase().contains("breezy-career")
    }

    fn analyze_form<'a>(&'a self, adapter: &'a dyn BrowserAdapter) -> BoxFuture<'a, AtsResult<FormAnalysis>> {
        Box::pin(async move {
            let dom = adapter.get_dom(None, true).await.map_err(AtsError::Browser)?.value;
            let has_file_upload = dom.fields.iter().any(|f| {
                f.field_type == crate::model::FormFieldType::File
                    && (f.name.to_lowercase().contains("resume") || f.name.to_lowercase().contains("cv"))
            });
            let has_cover_letter = dom.fields.iter().any(|f| {
                f.field_type == crate::model::FormFieldType::Textarea
                    && (f.name.to_lowercase().contains("cover")
                        || f.label.as_deref().unwrap_or_default().to_lowercase().contains("cover"))
            });
            let standard_hints =
                ["first_name", "last_name", "email", "phone", "linkedin", "resume", "cover", "portfolio"];
            let custom_questions: Vec<String> = dom
                .fields
                .iter()
                .filter(|f| f.visible && f.enabled)
                .filter(|f| {
                    let name = f.name.to_lowercase();
                    let label = f.label.as_deref().unwrap_or_default().to_lowercase();
                    !standard_hints.iter().any(|s| name.contains(s) || label.contains(s))
                })
                .map(|f| f.label.clone().unwrap_or_else(|| f.name.clone()))
                .collect();
            let custom_field_count = custom_questions.len();
            Ok(FormAnalysis {
                page_url: dom.url,
                page_title: dom.title,
                total_fields: dom.fields.len(),
                standard_field_count: dom.fields.len().saturating_sub(custom_field_count),
                custom_field_count,
                has_file_upload,
                has_cover_letter_field: has_cover_letter,
                custom_questions,
            })
        })
    }

    fn fill_form<'a>(
        &'a self,
        adapter: &'a dyn BrowserAdapter,
        user: &'a UserProfile,
        cover_letter: Option<&'a str>,
    ) -> BoxFuture<'a, AtsResult<FormFillOutcome>> {
        Box::pin(async move {
            let mut filled = std::collections::BTreeMap::new();
            let mut errors = Vec::new();

            let phone_value = user.phone.as_ref().map(|phone| {
                let code = user.phone_country_code.as_deref().unwrap_or_default();
                format!("{code} {phone}").trim().to_string()
            });

            let attempts: Vec<(&[&str], Option<String>)> = vec![
                (FIRST_NAME, Some(user.first_name.clone())),
                (LAST_NAME, Some(user.last_name.clone())),
                (EMAIL, Some(user.email.clone())),
                (PHONE, phone_value),
                (LINKEDIN, user.linkedin_url.clone()),
                (PORTFOLIO, user.portfolio_url.clone()),
            ];

            for (selectors, value) in attempts {
                let Some(value) = value.filter(|v| !v.is_empty()) else { continue };
                match fill_field(adapter, selectors, &value).await {
                    Some(selector) => {
                        filled.insert(selector, value);
                    }
                    None => errors.push(format!("no field matched selectors: {selectors:?}")),
                }
            }

            if let Some(cover_letter) = cover_letter.filter(|c| !c.is_empty()) {
                if let Some(selector) = fill_field(adapter, COVER_LETTER, cover_letter).await {
                    let preview: String = cover_letter.chars().take(50).collect();
                    filled.insert(selector, format!("{preview}..."));
                }
            }

            if let Some(cv_path) = user.cv_path.as_deref() {
                for selector in RESUME {
                    if adapter
                        .upload((*selector).to_string(), cv_path.to_string(), Duration::from_secs(15))
                        .await
                        .is_ok()
                    {
                        filled.insert((*selector).to_string(), cv_path.to_string());
                        break;
                    }
                }
            }

            Ok(FormFillOutcome { success: !filled.is_empty(), fields_filled: filled, errors })
        })
    }

    fn submit<'a>(&'a self, adapter: &'a dyn BrowserAdapter) -> BoxFuture<'a, AtsResult<SubmitOutcome>> {
        Box::pin(async move {
            for selector in SUBMIT_BUTTONS {
                if click_with_js(adapter, selector).await {
                    tokio::time::sleep(Duration::from_secs(2)).await;
                    let page_content =
                        adapter.get_page_content().await.map_err(AtsError::Browser)?.value.to_lowercase();
                    if SUCCESS_INDICATORS.iter().any(|ind| page_content.contains(ind)) {
                        let redirect_url = adapter.get_current_url().await.ok().map(|o| o.value);
                        return Ok(SubmitOutcome {
                            success: true,
                            confirmation_message: Some("Application submitted successfully".into()),
                            redirect_url,
                            error: None,
                        });
                    }
                }
            }

            for selector in SUBMIT_BUTTONS {
                if adapter.is_element_visible(selector).await.unwrap_or(false) {
                    let clicked = adapter
                        .click(
                            (*selector).to_string(),
                            crate::browser::MouseButton::Left,
                            1,
                            false,
                            Duration::from_secs(10),
                        )
                        .await;
                    if clicked.is_ok() {
                        let _ = adapter
                            .wait_for("body".to_string(), crate::browser::ElementState::Visible, Duration::from_secs(5))
                            .await;
                        let redirect_url = adapter.get_current_url().await.ok().map(|o| o.value);
                        return Ok(SubmitOutcome {
                            success: true,
                            confirmation_message: None,
                            redirect_url,
                            error: None,
                        });
                    }
                }
            }

            Ok(SubmitOutcome {
                success: false,
                confirmation_message: None,
                redirect_url: None,
                error: Some("could not find or click submit button".into()),
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_breezy_by_url() {
        let strategy = BreezyStrategy::new();
        assert!(strategy.detect_content("", "https://acme.breezy.hr/p/abc123"));
    }

    #[test]
    fn detects_breezy_by_powered_by_footer() {
        let strategy = BreezyStrategy::new();
        assert!(strategy.detect_content("<footer>Powered by Breezy</footer>", "https://jobs.example.com"));
    }

    #[test]
    fn does_not_falsely_detect_unrelated_pages() {
        let strategy = BreezyStrategy::new();
        assert!(!strategy.detect_content("<html></html>", "https://careers.example.com/apply"));
    }
}
