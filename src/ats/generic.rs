//! Fallback strategy for ATS platforms with no dedicated strategy: tries
//! broad, commonly-seen selectors for each logical field.

use std::time::Duration;

use super::{fill_first_visible, AtsError, AtsResult, AtsStrategy, FormAnalysis, FormFillOutcome, SubmitOutcome};
use crate::browser::{BrowserAdapter, BrowserAdapterExt, BoxFuture};
use crate::model::{FormFieldType, UserProfile};

const FIRST_NAME: &[&str] = &[
    r#"input[name*="first_name"]"#,
    r#"input[name*="firstname"]"#,
    r#"input[name*="fname"]"#,
    r#"input[id*="firstName"]"#,
];
const LAST_NAME: &[&str] = &[
    r#"input[name*="last_name"]"#,
    r#"input[name*="lastname"]"#,
    r#"input[name*="lname"]"#,
    r#"input[id*="lastName"]"#,
];
const EMAIL: &[&str] = &[
    r#"input[type="email"]"#,
    r#"input[name*="email"]"#,
    r#"input[id*="email"]"#,
];
const PHONE: &[&str] = &[
    r#"input[type="tel"]"#,
    r#"input[name*="phone"]"#,
    r#"input[name*="telephone"]"#,
];
const LINKEDIN: &[&str] = &[r#"input[name*="linkedin"]"#, r#"input[id*="linkedin"]"#];
const RESUME: &[&str] = &[
    r#"input[type="file"][name*="resume"]"#,
    r#"input[type="file"][name*="cv"]"#,
    r#"input[type="file"][accept*="pdf"]"#,
    r#"input[type="file"]"#,
];
const COVER_LETTER: &[&str] = &[
    r#"textarea[name*="cover"]"#,
    r#"textarea[id*="cover"]"#,
];
const SUBMIT_BUTTONS: &[&str] = &[
    r#"button[type="submit"]"#,
    r#"input[type="submit"]"#,
    "button.submit",
    ".submit-button",
];

const STANDARD_NAME_HINTS: &[&str] =
    &["first_name", "last_name", "email", "phone", "linkedin", "github", "resume", "cv"];

pub struct GenericStrategy;

impl GenericStrategy {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Default for GenericStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl AtsStrategy for GenericStrategy {
    fn name(&self) -> &'static str {
        "generic"
    }

    fn detect_content(&self, _page_html: &str, _page_url: &str) -> bool {
        true
    }

    fn analyze_form<'a>(&'a self, adapter: &'a dyn BrowserAdapter) -> BoxFuture<'a, AtsResult<FormAnalysis>> {
        Box::pin(async move {
            let dom = adapter.get_dom(None, true).await.map_err(AtsError::Browser)?.value;

            let mut standard = 0;
            let mut custom = 0;
            let mut has_file_upload = false;
            let mut has_cover_letter_field = false;
            let mut custom_questions = Vec::new();

            for field in &dom.fields {
                if field.field_type == FormFieldType::File {
                    has_file_upload = true;
                }
                let name_lower = field.name.to_lowercase();
                let label_lower = field.label.as_deref().unwrap_or_default().to_lowercase();
                if field.field_type == FormFieldType::Textarea
                    && (name_lower.contains("cover") || label_lower.contains("cover"))
                {
                    has_cover_letter_field = true;
                }
                let is_standard = matches!(
                    field.field_type,
                    FormFieldType::Text | FormFieldType::Email | FormFieldType::Tel | FormFieldType::File
                ) && STANDARD_NAME_HINTS
                    .iter()
                    .any(|hint| name_lower.contains(hint) || label_lower.contains(hint));

                if is_standard {
                    standard += 1;
                } else {
                    custom += 1;
                    custom_questions.push(field.label.clone().unwrap_or(field.name.clone()));
                }
            }

            Ok(FormAnalysis {
                page_url: dom.url,
                page_title: dom.title,
                total_fields: dom.fields.len(),
                standard_field_count: standard,
                custom_field_count: custom,
                has_file_upload,
                has_cover_letter_field,
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
            ];

            for (selectors, value) in attempts {
                let Some(value) = value.filter(|v| !v.is_empty()) else { continue };
                match fill_first_visible(adapter, selectors, &value).await {
                    Some(selector) => {
                        filled.insert(selector, value);
                    }
                    None => errors.push(format!("no visible field matched selectors: {selectors:?}")),
                }
            }

            if let Some(cover_letter) = cover_letter.filter(|c| !c.is_empty()) {
                if let Some(selector) = fill_first_visible(adapter, COVER_LETTER, cover_letter).await {
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
                            .wait_for(
                                "body".to_string(),
                                crate::browser::ElementState::Visible,
                                Duration::from_secs(5),
                            )
                            .await;
                        let redirect_url = adapter.get_current_url().await.ok().map(|o| o.value);
                        return Ok(SubmitOutcome {
                            success: true,
                            confirmation_message: Some("form submitted".into()),
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
                error: Some("could not find a submit button".into()),
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generic_always_detects() {
        assert!(GenericStrategy::new().detect_content("", ""));
    }
}
