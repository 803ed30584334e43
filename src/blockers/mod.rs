//! Blocker Detector (C3): pure inspection of a page's HTML and URL for
//! obstacles that require a human or a CAPTCHA solve before the pipeline
//! can keep driving the form.
//!
//! Every `detect_*` function takes already-fetched page content — this
//! module never touches the network or the browser adapter itself.

use regex::Regex;
use std::sync::OnceLock;

use crate::model::{BlockerKind, CaptchaFamily, DetectedBlocker};

fn captcha_patterns() -> &'static [(CaptchaFamily, &'static [&'static str])] {
    static PATTERNS: [(CaptchaFamily, &[&str]); 3] = [
        (
            CaptchaFamily::Turnstile,
            &["cf-turnstile", "challenge-platform", "cloudflare", "__cf_bm", "turnstile"],
        ),
        (CaptchaFamily::HCaptcha, &["h-captcha", "hcaptcha.com", "hcaptcha-response"]),
        (
            CaptchaFamily::RecaptchaV2,
            &["g-recaptcha", "recaptcha.net", "grecaptcha", "recaptcha-response"],
        ),
    ];
    &PATTERNS
}

static LOGIN_PATTERNS: &[&str] = &[
    r"/sign[-_]?in",
    r"/log[-_]?in",
    r"/auth/",
    r"please\s+(log|sign)\s+in",
    r"(log|sign)\s+in\s+to\s+continue",
    r"login\s+required",
    r"authentication\s+required",
    r"session\s+expired",
];

static MULTI_STEP_PATTERNS: &[&str] = &[
    r"step\s+\d+\s+of\s+\d+",
    r"page\s+\d+\s+of\s+\d+",
    r#"class="[^"]*step[^"]*progress[^"]*""#,
    r#"class="[^"]*wizard[^"]*""#,
    r#"class="[^"]*multi[^"]*step[^"]*""#,
];

static LOCATION_PATTERNS: &[&str] = &[
    r"location\s+requirement",
    r"must\s+be\s+located\s+in",
    r"eligibility.*location",
    r"work\s+authorization",
];

fn compiled(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .map(|p| Regex::new(&format!("(?i){p}")).expect("blocker pattern is a valid regex"))
        .collect()
}

fn login_regexes() -> &'static Vec<Regex> {
    static CELL: OnceLock<Vec<Regex>> = OnceLock::new();
    CELL.get_or_init(|| compiled(LOGIN_PATTERNS))
}

fn multi_step_regexes() -> &'static Vec<Regex> {
    static CELL: OnceLock<Vec<Regex>> = OnceLock::new();
    CELL.get_or_init(|| compiled(MULTI_STEP_PATTERNS))
}

fn location_regexes() -> &'static Vec<Regex> {
    static CELL: OnceLock<Vec<Regex>> = OnceLock::new();
    CELL.get_or_init(|| compiled(LOCATION_PATTERNS))
}

/// Scan a CAPTCHA family's substring markers in already-lowercased HTML.
fn detect_captcha(html_lower: &str) -> Option<DetectedBlocker> {
    for (family, patterns) in captcha_patterns() {
        if patterns.iter().any(|p| html_lower.contains(p)) {
            tracing::info!(?family, "captcha blocker detected");
            return Some(DetectedBlocker {
                kind: BlockerKind::Captcha { family: *family },
                message: format!("{family:?} CAPTCHA detected"),
                element_locator: None,
                suggested_action: Some("complete the CAPTCHA manually or via the solver".into()),
            });
        }
    }
    None
}

fn detect_login_required(html_lower: &str, url_lower: &str) -> Option<DetectedBlocker> {
    if login_regexes().iter().any(|re| re.is_match(url_lower)) {
        return Some(DetectedBlocker {
            kind: BlockerKind::LoginRequired,
            message: "login required to access application form".into(),
            element_locator: None,
            suggested_action: Some("log in to the platform".into()),
        });
    }
    if login_regexes().iter().any(|re| re.is_match(html_lower)) {
        return Some(DetectedBlocker {
            kind: BlockerKind::LoginRequired,
            message: "page content indicates authentication is needed".into(),
            element_locator: None,
            suggested_action: Some("log in to the platform".into()),
        });
    }

    let has_password_field = html_lower.contains(r#"type="password""#);
    let has_login_action =
        html_lower.contains(r#"action="login""#) || html_lower.contains(r#"action="signin""#);
    if has_password_field || has_login_action {
        let looks_like_application_form = ["apply", "application", "resume", "cover letter"]
            .iter()
            .any(|needle| html_lower.contains(needle));
        if !looks_like_application_form {
            return Some(DetectedBlocker {
                kind: BlockerKind::LoginRequired,
                message: "page appears to be a login page".into(),
                element_locator: None,
                suggested_action: Some("log in to access the application".into()),
            });
        }
    }
    None
}

fn detect_multi_step_form(html_lower: &str) -> Option<DetectedBlocker> {
    if multi_step_regexes().iter().any(|re| re.is_match(html_lower)) {
        return Some(DetectedBlocker {
            kind: BlockerKind::MultiStepForm,
            message: "complex multi-step form detected".into(),
            element_locator: None,
            suggested_action: Some("form may span multiple pages; handle step by step".into()),
        });
    }
    None
}

fn detect_location_mismatch(html_lower: &str) -> Option<DetectedBlocker> {
    if location_regexes().iter().any(|re| re.is_match(html_lower)) {
        return Some(DetectedBlocker {
            kind: BlockerKind::LocationMismatch,
            message: "job may have location requirements".into(),
            element_locator: None,
            suggested_action: Some("verify you meet the stated location requirements".into()),
        });
    }
    None
}

/// Run every detector over one page and return every blocker found, in
/// the fixed order CAPTCHA, login, multi-step, location.
#[must_use]
pub fn detect_all(page_html: &str, page_url: &str, _user_location: Option<&str>) -> Vec<DetectedBlocker> {
    let html_lower = page_html.to_lowercase();
    let url_lower = page_url.to_lowercase();
    let mut found = Vec::new();

    if let Some(b) = detect_captcha(&html_lower) {
        found.push(b);
    }
    if let Some(b) = detect_login_required(&html_lower, &url_lower) {
        found.push(b);
    }
    if let Some(b) = detect_multi_step_form(&html_lower) {
        found.push(b);
    }
    if let Some(b) = detect_location_mismatch(&html_lower) {
        found.push(b);
    }
    found
}

/// CSS selector used to locate a detected CAPTCHA's widget on the page.
#[must_use]
pub fn captcha_selector(family: CaptchaFamily) -> &'static str {
    match family {
        CaptchaFamily::Turnstile => ".cf-turnstile, [data-cf-turnstile], iframe[src*='turnstile']",
        CaptchaFamily::HCaptcha => ".h-captcha, [data-hcaptcha], iframe[src*='hcaptcha']",
        CaptchaFamily::RecaptchaV2 | CaptchaFamily::RecaptchaV3 => {
            ".g-recaptcha, [data-recaptcha], iframe[src*='recaptcha']"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_cloudflare_turnstile_widget() {
        let html = r#"<div class="cf-turnstile" data-sitekey="x"></div>"#;
        let found = detect_all(html, "https://example.com/apply", None);
        assert_eq!(found.len(), 1);
        assert!(matches!(
            found[0].kind,
            BlockerKind::Captcha { family: CaptchaFamily::Turnstile }
        ));
    }

    #[test]
    fn detects_login_required_from_url() {
        let found = detect_all("<html></html>", "https://boards.example.com/signin", None);
        assert!(found.iter().any(|b| b.kind == BlockerKind::LoginRequired));
    }

    #[test]
    fn password_field_on_application_page_is_not_a_login_blocker() {
        let html = r#"<form><input type="password"> apply now with your cover letter</form>"#;
        let found = detect_all(html, "https://jobs.example.com/apply/42", None);
        assert!(!found.iter().any(|b| b.kind == BlockerKind::LoginRequired));
    }

    #[test]
    fn detects_multi_step_wizard() {
        let html = "<p>Step 2 of 5</p>";
        let found = detect_all(html, "https://jobs.example.com/apply", None);
        assert!(found.iter().any(|b| b.kind == BlockerKind::MultiStepForm));
    }

    #[test]
    fn detects_location_mismatch_unconditionally() {
        let html = "<p>Must be located in the United States</p>";
        let found = detect_all(html, "https://jobs.example.com/apply", None);
        assert!(found.iter().any(|b| b.kind == BlockerKind::LocationMismatch));
    }
}
