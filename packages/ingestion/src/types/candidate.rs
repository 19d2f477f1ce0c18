//! In-flight extraction output: candidates and the per-run result.
//!
//! The string-keyed field map stops at this boundary; normalization turns
//! candidates into explicit [`NewJob`](crate::types::job::NewJob) records.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::types::field::{FieldName, FieldValue, Provenance};

/// Cascade stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Plugin,
    Classifier,
    JsonLd,
    Meta,
    Dom,
    Labels,
    Regex,
    Ai,
    Detail,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Plugin => "plugin",
            Self::Classifier => "classifier",
            Self::JsonLd => "jsonld",
            Self::Meta => "meta",
            Self::Dom => "dom",
            Self::Labels => "labels",
            Self::Regex => "regex",
            Self::Ai => "ai",
            Self::Detail => "detail",
        }
    }
}

/// A stage that threw: recorded, then skipped. Later stages still run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageError {
    pub stage: Stage,
    pub kind: String,
    pub message: String,
}

impl StageError {
    pub fn new(stage: Stage, kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            stage,
            kind: kind.into(),
            message: message.into(),
        }
    }
}

/// One job candidate as assembled by the cascade.
///
/// Fusion rule: the first stage that produced a non-empty value for a
/// field wins. Stages may add fields but never lower an existing field's
/// confidence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobCandidate {
    /// Page (or feed entry / API record) the candidate came from
    pub url: String,

    pub fields: IndexMap<FieldName, FieldValue>,

    pub extracted_at: DateTime<Utc>,
}

impl JobCandidate {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            fields: IndexMap::new(),
            extracted_at: Utc::now(),
        }
    }

    pub fn get(&self, name: FieldName) -> Option<&FieldValue> {
        self.fields.get(&name)
    }

    /// The trimmed value for a field, if present and non-empty.
    pub fn value(&self, name: FieldName) -> Option<&str> {
        self.fields
            .get(&name)
            .filter(|v| !v.is_empty())
            .map(|v| v.value.as_str())
    }

    pub fn is_missing(&self, name: FieldName) -> bool {
        self.value(name).is_none()
    }

    /// Fill a field only if it is still missing (the fusion rule).
    /// Returns true if the value was taken.
    pub fn fill(&mut self, name: FieldName, value: FieldValue) -> bool {
        if value.is_empty() || !self.is_missing(name) {
            return false;
        }
        self.fields.insert(name, value);
        true
    }

    /// Overwrite a field unconditionally. Used by per-source overrides only.
    pub fn set(&mut self, name: FieldName, value: FieldValue) {
        self.fields.insert(name, value);
    }

    /// Builder-style fill for extractors.
    pub fn with_field(mut self, name: FieldName, value: FieldValue) -> Self {
        self.fill(name, value);
        self
    }

    pub fn missing_fields(&self) -> Vec<FieldName> {
        FieldName::ALL
            .iter()
            .copied()
            .filter(|f| self.is_missing(*f))
            .collect()
    }

    /// Names of the fields that have values, for the extraction log.
    pub fn present_fields(&self) -> Vec<&'static str> {
        FieldName::ALL
            .iter()
            .filter(|f| !self.is_missing(**f))
            .map(|f| f.as_str())
            .collect()
    }

    /// A candidate is worth carrying forward once it has a title or a link.
    pub fn is_viable(&self) -> bool {
        !self.is_missing(FieldName::Title) || !self.is_missing(FieldName::ApplicationUrl)
    }
}

/// The full output of one extraction pass over one payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub url: String,

    pub extracted_at: DateTime<Utc>,

    /// Version stamp of the cascade that produced this result
    pub pipeline_version: String,

    /// Classifier verdict for the payload as a whole
    pub is_job: bool,
    pub classifier_score: f64,

    pub candidates: Vec<JobCandidate>,

    pub stage_errors: Vec<StageError>,
}

impl ExtractionResult {
    pub fn new(url: impl Into<String>, pipeline_version: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            extracted_at: Utc::now(),
            pipeline_version: pipeline_version.into(),
            is_job: true,
            classifier_score: 0.0,
            candidates: Vec::new(),
            stage_errors: Vec::new(),
        }
    }

    pub fn record_error(&mut self, error: StageError) {
        self.stage_errors.push(error);
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    /// Union of field names present across candidates, for the run log.
    pub fn extracted_field_names(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for field in FieldName::ALL {
            if self.candidates.iter().any(|c| !c.is_missing(field)) {
                names.push(field.as_str().to_string());
            }
        }
        names
    }

    /// Highest-confidence provenance seen for a field across candidates.
    pub fn dominant_provenance(&self, field: FieldName) -> Option<Provenance> {
        self.candidates
            .iter()
            .filter_map(|c| c.get(field))
            .max_by(|a, b| a.confidence.total_cmp(&b.confidence))
            .map(|v| v.source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fill_never_overwrites() {
        let mut cand = JobCandidate::new("https://example.org/jobs/1");
        assert!(cand.fill(
            FieldName::Title,
            FieldValue::new("Data Analyst", Provenance::Jsonld)
        ));
        assert!(!cand.fill(
            FieldName::Title,
            FieldValue::new("Something Else", Provenance::Regex)
        ));
        assert_eq!(cand.value(FieldName::Title), Some("Data Analyst"));
        assert_eq!(cand.get(FieldName::Title).unwrap().confidence, 0.90);
    }

    #[test]
    fn fill_rejects_empty_values() {
        let mut cand = JobCandidate::new("https://example.org/jobs/1");
        assert!(!cand.fill(FieldName::Location, FieldValue::new("   ", Provenance::Dom)));
        assert!(cand.is_missing(FieldName::Location));
    }

    #[test]
    fn missing_fields_shrink_as_fills_land() {
        let mut cand = JobCandidate::new("https://example.org/jobs/1");
        assert_eq!(cand.missing_fields().len(), FieldName::ALL.len());
        cand.fill(
            FieldName::Title,
            FieldValue::new("Program Officer", Provenance::Dom),
        );
        assert_eq!(cand.missing_fields().len(), FieldName::ALL.len() - 1);
        assert!(!cand.missing_fields().contains(&FieldName::Title));
    }
}
