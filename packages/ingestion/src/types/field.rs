//! Per-field extraction values with provenance and confidence.

use serde::{Deserialize, Serialize};

/// The fields a posting can carry out of the extractor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldName {
    Title,
    Employer,
    Location,
    Deadline,
    Description,
    Requirements,
    ApplicationUrl,
    Salary,
    EmploymentType,
    PostedOn,
}

impl FieldName {
    /// All fields, in display order.
    pub const ALL: [FieldName; 10] = [
        FieldName::Title,
        FieldName::Employer,
        FieldName::Location,
        FieldName::Deadline,
        FieldName::Description,
        FieldName::Requirements,
        FieldName::ApplicationUrl,
        FieldName::Salary,
        FieldName::EmploymentType,
        FieldName::PostedOn,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Title => "title",
            Self::Employer => "employer",
            Self::Location => "location",
            Self::Deadline => "deadline",
            Self::Description => "description",
            Self::Requirements => "requirements",
            Self::ApplicationUrl => "application_url",
            Self::Salary => "salary",
            Self::EmploymentType => "employment_type",
            Self::PostedOn => "posted_on",
        }
    }
}

impl std::fmt::Display for FieldName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which cascade stage produced a value.
///
/// Confidence is a property of the stage, not of the individual value:
/// structured data beats scraped data beats guessed data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    Jsonld,
    Meta,
    Dom,
    Heuristic,
    Regex,
    Ai,
}

impl Provenance {
    pub fn confidence(&self) -> f64 {
        match self {
            Self::Jsonld => 0.90,
            Self::Meta => 0.80,
            Self::Dom => 0.70,
            Self::Heuristic => 0.60,
            Self::Regex => 0.50,
            Self::Ai => 0.40,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Jsonld => "jsonld",
            Self::Meta => "meta",
            Self::Dom => "dom",
            Self::Heuristic => "heuristic",
            Self::Regex => "regex",
            Self::Ai => "ai",
        }
    }
}

/// One extracted value with its origin.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldValue {
    /// The extracted text, trimmed
    pub value: String,

    /// Stage that produced the value
    pub source: Provenance,

    /// Confidence in [0, 1], assigned by stage
    pub confidence: f64,

    /// Raw surrounding text the value was lifted from, for auditing
    pub raw_snippet: Option<String>,
}

impl FieldValue {
    /// Create a value with the stage's default confidence.
    pub fn new(value: impl Into<String>, source: Provenance) -> Self {
        Self {
            value: value.into().trim().to_string(),
            source,
            confidence: source.confidence(),
            raw_snippet: None,
        }
    }

    pub fn with_snippet(mut self, snippet: impl Into<String>) -> Self {
        self.raw_snippet = Some(snippet.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.value.trim().is_empty()
    }
}
