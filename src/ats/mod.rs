//! ATS Strategy Registry (C5): per-vendor form-filling strategies behind
//! one trait, matched by URL pattern first and content second, falling
//! back to the generic strategy when nothing else claims the page.

pub mod breezy;
pub mod generic;

use std::collections::BTreeMap;

use regex::Regex;
use thiserror::Error;

use crate::browser::{BrowserAdapter, BrowserAdapterExt, BrowserError};
use crate::model::UserProfile;

#[derive(Debug, Error)]
pub enum AtsError {
    #[error(transparent)]
    Browser(#[from] BrowserError),
    #[error("no ATS strategy matched this page")]
    NoStrategyMatched,
}

pub type AtsResult<T> = Result<T, AtsError>;

#[derive(Debug, Clone, Default)]
pub struct FormAnalysis {
    pub page_url: String,
    pub page_title: String,
    pub total_fields: usize,
    pub standard_field_count: usize,
    pub custom_field_count: usize,
    pub has_file_upload: bool,
    pub has_cover_letter_field: bool,
    /// Labels/names of fields outside the standard set, in page order.
    pub custom_questions: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct FormFillOutcome {
    pub success: bool,
    pub fields_filled: BTreeMap<String, String>,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct SubmitOutcome {
    pub success: bool,
    pub confirmation_message: Option<String>,
    pub redirect_url: Option<String>,
    pub error: Option<String>,
}

/// Per-vendor application-form driver. Implementors hold no state beyond
/// their own selector tables — one instance is shared across jobs.
pub trait AtsStrategy: Send + Sync {
    /// Short identifier used for config overrides and logging (e.g. `"greenhouse"`).
    fn name(&self) -> &'static str;

    /// Regexes checked against the page URL before falling back to content sniffing.
    fn url_patterns(&self) -> &[&'static str] {
        &[]
    }

    /// Content-based detection, tried only after `url_patterns` misses.
    /// The generic fallback strategy always returns `true`.
    fn detect_content(&self, _page_html: &str, _page_url: &str) -> bool {
        false
    }

    fn analyze_form<'a>(
        &'a self,
        adapter: &'a dyn BrowserAdapter,
    ) -> crate::browser::BoxFuture<'a, AtsResult<FormAnalysis>>;

    fn fill_form<'a>(
        &'a self,
        adapter: &'a dyn BrowserAdapter,
        user: &'a UserProfile,
        cover_letter: Option<&'a str>,
    ) -> crate::browser::BoxFuture<'a, AtsResult<FormFillOutcome>>;

    fn submit<'a>(
        &'a self,
        adapter: &'a dyn BrowserAdapter,
    ) -> crate::browser::BoxFuture<'a, AtsResult<SubmitOutcome>>;

    /// Answer free-text custom questions the standard field set doesn't
    /// cover. The default answers none of them — the orchestrator falls
    /// back to an intervention for anything left unanswered. A strategy
    /// may override this to consult platform-specific hints (e.g. a
    /// `data-question-id` attribute) before giving up.
    fn handle_custom_questions<'a>(
        &'a self,
        _adapter: &'a dyn BrowserAdapter,
        _questions: &'a [String],
        _user: &'a UserProfile,
    ) -> crate::browser::BoxFuture<'a, AtsResult<BTreeMap<String, String>>> {
        Box::pin(async { Ok(BTreeMap::new()) })
    }
}

/// Registry of strategies, matched URL-first then content-first, with
/// `generic` always present as the final fallback.
pub struct AtsRegistry {
    strategies: Vec<Box<dyn AtsStrategy>>,
}

impl AtsRegistry {
    /// A registry pre-loaded with every strategy this crate ships,
    /// `generic` last as the fallback.
    #[must_use]
    pub fn new() -> Self {
        Self {
            strategies: vec![Box::new(breezy::BreezyStrategy::new()), Box::new(generic::GenericStrategy::new())],
        }
    }

    pub fn register(&mut self, strategy: Box<dyn AtsStrategy>) {
        self.strategies.insert(self.strategies.len() - 1, strategy);
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&dyn AtsStrategy> {
        self.strategies.iter().find(|s| s.name() == name).map(AsRef::as_ref)
    }

    #[must_use]
    pub fn list_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// Detect which strategy owns this page: URL patterns across every
    /// strategy first, then content detection, then `generic`.
    #[must_use]
    pub fn detect(&self, page_html: &str, page_url: &str) -> &dyn AtsStrategy {
        for strategy in &self.strategies {
            for pattern in strategy.url_patterns() {
                if let Ok(re) = Regex::new(&format!("(?i){pattern}")) {
                    if re.is_match(page_url) {
                        tracing::info!(ats = strategy.name(), "matched ATS by URL pattern");
                        return strategy.as_ref();
                    }
                }
            }
        }
        for strategy in &self.strategies {
            if strategy.name() != "generic" && strategy.detect_content(page_html, page_url) {
                tracing::info!(ats = strategy.name(), "matched ATS by content");
                return strategy.as_ref();
            }
        }
        self.get("generic").expect("generic strategy is always registered")
    }
}

impl Default for AtsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Try each comma-equivalent selector in turn, filling the first visible
/// match. Shared by every strategy's `fill_form` implementation.
pub(crate) async fn fill_first_visible(
    adapter: &dyn BrowserAdapter,
    selectors: &[&str],
    value: &str,
) -> Option<String> {
    for selector in selectors {
        if adapter.is_element_visible(selector).await.unwrap_or(false)
            && adapter.fill((*selector).to_string(), value.to_string(), true, false, std::time::Duration::from_secs(5)).await.is_ok()
        {
            return Some((*selector).to_string());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_always_has_generic_as_fallback() {
        let registry = AtsRegistry::new();
        assert!(registry.get("generic").is_some());
        let chosen = registry.detect("<html></html>", "https://careers.example.com/apply");
        assert_eq!(chosen.name(), "generic");
    }
}
