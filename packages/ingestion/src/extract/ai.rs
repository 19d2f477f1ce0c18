//! AI fallback extraction.
//!
//! Runs only for fields still missing after the deterministic stages,
//! and only while the run's budget holds. The prompt is deterministic
//! (fixed few-shot exemplars, stable field order) so responses can be
//! cached by prompt hash. Anything that is not strict JSON matching the
//! schema leaves the fields missing.

use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::canonical::sha256_hex;
use crate::capabilities::Completer;
use crate::error::AiError;
use crate::schedule::budget::RunBudget;
use crate::types::{FieldName, FieldValue, JobCandidate, Provenance};

const SYSTEM_PROMPT: &str = "You extract job-posting fields from text. \
Respond with a single strict JSON object and nothing else. \
Use null for any field not present in the text. Never invent values.";

const FEW_SHOT: &str = r#"Example input:
  Senior Nutrition Officer
  Duty Station: Maiduguri, Nigeria. Apply by 30 June 2025.
Example output:
  {"title":"Senior Nutrition Officer","employer":null,"location":"Maiduguri, Nigeria","deadline":"2025-06-30","description":null,"application_url":null,"salary":null,"employment_type":null,"posted_on":null}

Example input:
  Join our finance team in Geneva (CHF 90k-110k, full time). Openings close 2025-02-01.
Example output:
  {"title":null,"employer":null,"location":"Geneva","deadline":"2025-02-01","description":null,"application_url":null,"salary":"CHF 90k-110k","employment_type":"full time","posted_on":null}"#;

/// Strict response schema. Unknown keys are rejected so that prose
/// answers cannot sneak through as "valid".
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AiJobFields {
    pub title: Option<String>,
    pub employer: Option<String>,
    pub location: Option<String>,
    pub deadline: Option<String>,
    pub description: Option<String>,
    pub application_url: Option<String>,
    pub salary: Option<String>,
    pub employment_type: Option<String>,
    pub posted_on: Option<String>,
}

impl AiJobFields {
    fn value_for(&self, field: FieldName) -> Option<&str> {
        let v = match field {
            FieldName::Title => &self.title,
            FieldName::Employer => &self.employer,
            FieldName::Location => &self.location,
            FieldName::Deadline => &self.deadline,
            FieldName::Description => &self.description,
            FieldName::ApplicationUrl => &self.application_url,
            FieldName::Salary => &self.salary,
            FieldName::EmploymentType => &self.employment_type,
            FieldName::PostedOn => &self.posted_on,
            FieldName::Requirements => &None,
        };
        v.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }
}

/// How much page text goes into the prompt.
const EXCERPT_CAP: usize = 6_000;

pub struct AiExtractor {
    completer: Arc<dyn Completer>,
    cache: Mutex<LruCache<String, AiJobFields>>,
}

impl AiExtractor {
    pub fn new(completer: Arc<dyn Completer>, cache_size: usize) -> Self {
        let cap = NonZeroUsize::new(cache_size.max(1)).expect("max(1) is nonzero");
        Self {
            completer,
            cache: Mutex::new(LruCache::new(cap)),
        }
    }

    /// Fill the candidate's missing fields from the page text. Returns
    /// true when anything landed. Budget exhaustion and provider errors
    /// both degrade to "no improvement".
    pub async fn fill_missing(
        &self,
        cand: &mut JobCandidate,
        page_text: &str,
        budget: &RunBudget,
    ) -> Result<bool, AiError> {
        let missing: Vec<FieldName> = cand
            .missing_fields()
            .into_iter()
            .filter(|f| *f != FieldName::Requirements)
            .collect();
        if missing.is_empty() {
            return Ok(false);
        }

        let prompt = build_prompt(&missing, page_text);
        let prompt_hash = sha256_hex(prompt.as_bytes());

        let fields = {
            let mut cache = self.cache.lock().await;
            cache.get(&prompt_hash).cloned()
        };

        let fields = match fields {
            Some(hit) => {
                debug!(prompt_hash = %&prompt_hash[..12], "AI extraction cache hit");
                hit
            }
            None => {
                if !budget.try_spend() {
                    return Err(AiError::BudgetExhausted);
                }
                let raw = self.completer.complete(SYSTEM_PROMPT, &prompt).await?;
                let parsed: AiJobFields = serde_json::from_str(raw.trim())
                    .map_err(|e| AiError::InvalidJsonResponse(e.to_string()))?;
                let mut cache = self.cache.lock().await;
                cache.put(prompt_hash, parsed.clone());
                parsed
            }
        };

        let mut filled = false;
        for field in missing {
            if let Some(value) = fields.value_for(field) {
                if cand.fill(field, FieldValue::new(value, Provenance::Ai)) {
                    filled = true;
                }
            }
        }
        Ok(filled)
    }

    /// Non-erroring wrapper: degrade and log.
    pub async fn try_fill_missing(
        &self,
        cand: &mut JobCandidate,
        page_text: &str,
        budget: &RunBudget,
    ) -> bool {
        match self.fill_missing(cand, page_text, budget).await {
            Ok(filled) => filled,
            Err(AiError::BudgetExhausted) => {
                debug!(url = %cand.url, "AI budget exhausted, fields stay missing");
                false
            }
            Err(e) => {
                warn!(url = %cand.url, error = %e, "AI extraction failed");
                false
            }
        }
    }
}

/// Deterministic prompt: stable field order, capped excerpt, fixed
/// few-shot block.
fn build_prompt(missing: &[FieldName], page_text: &str) -> String {
    let fields: Vec<&str> = missing.iter().map(|f| f.as_str()).collect();
    let excerpt: String = page_text.chars().take(EXCERPT_CAP).collect();
    format!(
        "{}\n\nExtract exactly these fields: {}\nDates must be ISO YYYY-MM-DD.\n\nText:\n{}",
        FEW_SHOT,
        fields.join(", "),
        excerpt
    )
}
