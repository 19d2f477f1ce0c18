//! Site-specific extractor plugins.
//!
//! Plugins run before the generic cascade, in registration order. The
//! first matching plugin that produces a non-empty result wins; anything
//! else falls through to the cascade.

use std::sync::Arc;

use tracing::debug;

use crate::types::{ExtractionResult, Source};

/// A per-site extractor.
pub trait SiteExtractor: Send + Sync {
    fn name(&self) -> &str;

    /// Does this plugin handle the given source?
    fn matches(&self, source: &Source) -> bool;

    /// Extract from the payload. `None` or an empty result falls through.
    fn extract(&self, url: &str, body: &str) -> Option<ExtractionResult>;
}

/// Priority-ordered plugin list.
#[derive(Default, Clone)]
pub struct ExtractorRegistry {
    entries: Vec<Arc<dyn SiteExtractor>>,
}

impl ExtractorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, extractor: Arc<dyn SiteExtractor>) {
        self.entries.push(extractor);
    }

    pub fn with(mut self, extractor: Arc<dyn SiteExtractor>) -> Self {
        self.register(extractor);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Run matching plugins in order; first non-empty result wins.
    pub fn try_extract(&self, source: &Source, url: &str, body: &str) -> Option<ExtractionResult> {
        for extractor in &self.entries {
            if !extractor.matches(source) {
                continue;
            }
            match extractor.extract(url, body) {
                Some(result) if !result.is_empty() => {
                    debug!(plugin = extractor.name(), url = %url, count = result.candidates.len(), "site plugin matched");
                    return Some(result);
                }
                _ => {}
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PIPELINE_VERSION;
    use crate::types::{FieldName, FieldValue, JobCandidate, Provenance, SourceType};

    struct FixedExtractor {
        host: &'static str,
        title: &'static str,
    }

    impl SiteExtractor for FixedExtractor {
        fn name(&self) -> &str {
            "fixed"
        }

        fn matches(&self, source: &Source) -> bool {
            source.host().as_deref() == Some(self.host)
        }

        fn extract(&self, url: &str, _body: &str) -> Option<ExtractionResult> {
            let mut result = ExtractionResult::new(url, PIPELINE_VERSION);
            let mut cand = JobCandidate::new(url);
            cand.fill(FieldName::Title, FieldValue::new(self.title, Provenance::Dom));
            result.candidates.push(cand);
            Some(result)
        }
    }

    #[test]
    fn first_matching_plugin_wins() {
        let registry = ExtractorRegistry::new()
            .with(Arc::new(FixedExtractor { host: "a.org", title: "From A" }))
            .with(Arc::new(FixedExtractor { host: "a.org", title: "Shadowed" }));

        let source = Source::new("a", "https://a.org/jobs", SourceType::Html);
        let result = registry.try_extract(&source, "https://a.org/jobs", "").unwrap();
        assert_eq!(result.candidates[0].value(FieldName::Title), Some("From A"));
    }

    #[test]
    fn non_matching_plugins_fall_through() {
        let registry =
            ExtractorRegistry::new().with(Arc::new(FixedExtractor { host: "a.org", title: "A" }));
        let source = Source::new("b", "https://b.org/jobs", SourceType::Html);
        assert!(registry.try_extract(&source, "https://b.org/jobs", "").is_none());
    }
}
