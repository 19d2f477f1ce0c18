//! The extractor cascade.
//!
//! A strict, ordered pipeline per payload:
//!
//! ```text
//! plugins → classifier → JSON-LD → meta/OpenGraph → DOM selectors
//!         → label heuristics → regex → AI fallback (budgeted)
//! ```
//!
//! Fusion is fill-only-missing with stage-assigned confidences. A stage
//! that throws is recorded and skipped; later stages still run. For
//! rss/api sources the same interface runs over feed entries / JSON
//! records instead of DOM nodes.

pub mod ai;
pub mod api;
pub mod classify;
pub mod detail;
pub mod dom;
pub mod feed;
pub mod html;
pub mod jsonld;
pub mod labels;
pub mod meta;
pub mod regexes;
pub mod registry;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::PIPELINE_VERSION;
use crate::schedule::budget::RunBudget;
use crate::types::{
    ExtractionResult, FieldName, Source, SourceType, Stage, StageError,
};

pub use ai::AiExtractor;
pub use classify::{Classification, KeywordClassifier, PageClassifier};
pub use detail::DetailEnricher;
pub use registry::{ExtractorRegistry, SiteExtractor};

/// The composed cascade: one extractor implementation per source type,
/// one shared stage order.
pub struct Cascade {
    classifier: Arc<dyn PageClassifier>,
    registry: ExtractorRegistry,
    ai: Option<AiExtractor>,
}

impl Cascade {
    pub fn new(classifier: Arc<dyn PageClassifier>) -> Self {
        Self {
            classifier,
            registry: ExtractorRegistry::new(),
            ai: None,
        }
    }

    pub fn with_registry(mut self, registry: ExtractorRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_ai(mut self, ai: AiExtractor) -> Self {
        self.ai = Some(ai);
        self
    }

    pub fn set_classifier(&mut self, classifier: Arc<dyn PageClassifier>) {
        self.classifier = classifier;
    }

    pub fn set_registry(&mut self, registry: ExtractorRegistry) {
        self.registry = registry;
    }

    /// Run the synchronous stages (everything except detail fetches and
    /// the AI fallback). Returns the result plus the payload text used
    /// for later AI prompting.
    pub fn extract_static(&self, source: &Source, url: &str, body: &str) -> (ExtractionResult, String) {
        if let Some(result) = self.registry.try_extract(source, url, body) {
            return (result, String::new());
        }

        match source.source_type {
            SourceType::Html => {
                let hint = source.html_hint();
                html::extract_html(self.classifier.as_ref(), url, body, hint.as_ref())
            }
            SourceType::Rss => match feed::extract_feed(body, url) {
                Ok(result) => (result, body.to_string()),
                Err(e) => {
                    let mut result = ExtractionResult::new(url, PIPELINE_VERSION);
                    result.record_error(StageError::new(Stage::Dom, e.kind.as_str(), e.message));
                    (result, String::new())
                }
            },
            SourceType::Api => {
                let mut result = ExtractionResult::new(url, PIPELINE_VERSION);
                match source.api_hint() {
                    Ok(hint) => match api::extract_api(body, url, &hint) {
                        Ok(parsed) => result = parsed,
                        Err(e) => {
                            result.record_error(StageError::new(Stage::Dom, e.kind.as_str(), e.message))
                        }
                    },
                    Err(e) => {
                        result.record_error(StageError::new(Stage::Plugin, e.kind.as_str(), e.message))
                    }
                }
                (result, String::new())
            }
        }
    }

    /// The full cascade: static stages, optional one-hop detail
    /// enrichment, then the budgeted AI fallback for fields still
    /// missing. Cancellation is observed at stage boundaries.
    pub async fn extract(
        &self,
        source: &Source,
        url: &str,
        body: &str,
        budget: &RunBudget,
        detail: Option<&DetailEnricher>,
        cancel: &CancellationToken,
    ) -> ExtractionResult {
        let (mut result, page_text) = self.extract_static(source, url, body);

        if cancel.is_cancelled() || result.candidates.is_empty() {
            return result;
        }

        if source.detail_fetch_enabled {
            if let Some(detail) = detail {
                let fetched = detail
                    .enrich(&mut result.candidates, source.ignore_robots, cancel)
                    .await;
                if fetched > 0 {
                    debug!(source = %source.name, fetched, "detail enrichment complete");
                }
            }
        }

        if cancel.is_cancelled() {
            return result;
        }

        // AI fallback: only candidates still missing a core field, and
        // only while the budget holds.
        if let Some(ai) = &self.ai {
            for cand in &mut result.candidates {
                if cancel.is_cancelled() {
                    break;
                }
                let needs_ai = cand.is_missing(FieldName::Title)
                    || cand.is_missing(FieldName::Location)
                    || cand.is_missing(FieldName::Deadline);
                if !needs_ai {
                    continue;
                }
                let context = if page_text.is_empty() {
                    body
                } else {
                    page_text.as_str()
                };
                if !ai.try_fill_missing(cand, context, budget).await {
                    // Budget spent or provider down: later candidates
                    // would fail the same way, unless it was a cache miss
                    // on this one only. Cheap to just continue.
                    continue;
                }
            }
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockCompleter;

    #[tokio::test]
    async fn cascade_runs_ai_for_missing_core_fields() {
        let completer = Arc::new(MockCompleter::with_response(
            r#"{"title":null,"employer":null,"location":"Juba, South Sudan","deadline":"2025-12-01","description":null,"application_url":null,"salary":null,"employment_type":null,"posted_on":null}"#,
        ));
        let cascade = Cascade::new(Arc::new(KeywordClassifier::new()))
            .with_ai(AiExtractor::new(completer.clone(), 8));

        let source = Source::new("acme", "https://acme.org/careers", SourceType::Html);
        let body = r#"<html><body>
            <h1>Logistics Officer</h1>
            <p>Join our vacancy team, apply today. Based in our field office.</p>
        </body></html>"#;

        let budget = RunBudget::unlimited();
        let result = cascade
            .extract(
                &source,
                "https://acme.org/careers/logistics",
                body,
                &budget,
                None,
                &CancellationToken::new(),
            )
            .await;

        assert_eq!(result.candidates.len(), 1);
        let cand = &result.candidates[0];
        assert_eq!(cand.value(FieldName::Title), Some("Logistics Officer"));
        assert_eq!(cand.value(FieldName::Location), Some("Juba, South Sudan"));
        assert_eq!(completer.calls(), 1);
    }

    #[tokio::test]
    async fn exhausted_budget_skips_ai_entirely() {
        let completer = Arc::new(MockCompleter::with_response("{}"));
        let cascade = Cascade::new(Arc::new(KeywordClassifier::new()))
            .with_ai(AiExtractor::new(completer.clone(), 8));

        let source = Source::new("acme", "https://acme.org/careers", SourceType::Html);
        let body = "<html><body><h1>Driver vacancy, apply now</h1></body></html>";

        let budget = RunBudget::exhausted();
        let result = cascade
            .extract(
                &source,
                "https://acme.org/careers/driver",
                body,
                &budget,
                None,
                &CancellationToken::new(),
            )
            .await;

        assert_eq!(result.candidates.len(), 1);
        assert!(result.candidates[0].is_missing(FieldName::Location));
        assert_eq!(completer.calls(), 0);
    }
}
