//! Field normalization: candidates in, `NewJob` payloads out.
//!
//! Pure heuristics run first (dates, locations, title cleanup, country
//! table); fields they cannot settle are escalated to the AI normalizer
//! under the same budget rules as the AI extraction stage.

pub mod dates;
pub mod location;
pub mod orgname;
pub mod salary;
pub mod title;

use std::num::NonZeroUsize;
use std::sync::Arc;

use chrono::Utc;
use lru::LruCache;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::canonical::{canonical_hash, sha256_hex};
use crate::capabilities::Completer;
use crate::error::AiError;
use crate::schedule::budget::RunBudget;
use crate::types::{FieldName, JobCandidate, NewJob};
use uuid::Uuid;

/// Non-blocking issues observed while normalizing one candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NormalizeIssue {
    UnparseableDeadline(String),
    UnresolvedLocation(String),
}

/// Seniority buckets derived from the title.
static LEVELS: &[(&str, &[&str])] = &[
    ("intern", &["intern", "trainee", "graduate"]),
    ("junior", &["junior", "assistant", "associate"]),
    ("senior", &["senior", "principal", "expert"]),
    ("lead", &["lead", "head of", "chief", "director", "coordinator", "manager"]),
];

/// Thematic tags mined from title and description.
static MISSION_TAGS: &[(&str, &[&str])] = &[
    ("health", &["health", "medical", "nurse", "doctor", "clinic", "nutrition"]),
    ("education", &["education", "teacher", "school", "learning"]),
    ("wash", &["wash", "water", "sanitation", "hygiene"]),
    ("protection", &["protection", "gbv", "child protection", "safeguarding"]),
    ("logistics", &["logistics", "supply chain", "procurement", "fleet", "warehouse"]),
    ("finance", &["finance", "accounting", "budget", "grants"]),
    ("data", &["data", "analyst", "information management", "monitoring", "evaluation", "meal"]),
    ("emergency", &["emergency", "humanitarian", "relief", "crisis", "response"]),
];

static INTERNATIONAL_MARKERS: &[&str] = &[
    "international applicants",
    "all nationalities",
    "internationally recruited",
    "expatriate",
    "visa sponsorship",
];

static NATIONAL_MARKERS: &[&str] = &[
    "national position",
    "nationals only",
    "local recruitment",
    "locally recruited",
    "right to work in",
];

#[derive(Debug, Clone, Deserialize)]
struct AiDateAnswer {
    date: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct AiLocationAnswer {
    city: Option<String>,
    country_iso: Option<String>,
    #[serde(default)]
    is_remote: bool,
}

/// The normalizer. Construct once per pipeline; the AI cache is shared
/// across runs.
pub struct Normalizer {
    completer: Option<Arc<dyn Completer>>,
    cache: Mutex<LruCache<String, String>>,
}

impl Normalizer {
    pub fn new(completer: Option<Arc<dyn Completer>>, cache_size: usize) -> Self {
        Self {
            completer,
            cache: Mutex::new(LruCache::new(
                NonZeroUsize::new(cache_size.max(1)).expect("max(1) is nonzero"),
            )),
        }
    }

    /// Normalize one candidate into an upsert payload.
    pub async fn normalize(
        &self,
        source_id: Uuid,
        cand: &JobCandidate,
        budget: &RunBudget,
    ) -> (NewJob, Vec<NormalizeIssue>) {
        let mut issues = Vec::new();

        let raw_title = cand.value(FieldName::Title).unwrap_or_default();
        let cleaned_title = title::clean_title(raw_title);
        let apply_url = cand
            .value(FieldName::ApplicationUrl)
            .unwrap_or_default()
            .to_string();

        let mut job = NewJob::minimal(source_id, cleaned_title, apply_url);

        job.org_name = cand
            .value(FieldName::Employer)
            .map(orgname::clean_org_name)
            .filter(|s| !s.is_empty());
        job.description = cand.value(FieldName::Description).map(str::to_string);
        job.salary_raw = cand.value(FieldName::Salary).and_then(salary::clean_salary);
        job.employment_type = cand
            .value(FieldName::EmploymentType)
            .and_then(salary::normalize_employment_type);

        // Deadline: heuristics, then AI.
        if let Some(raw) = cand.value(FieldName::Deadline) {
            job.deadline_raw = Some(raw.to_string());
            job.deadline = dates::parse_date(raw);
            if job.deadline.is_none() {
                job.deadline = self.ai_normalize_date(raw, budget).await;
            }
            if job.deadline.is_none() {
                issues.push(NormalizeIssue::UnparseableDeadline(raw.to_string()));
            }
        }

        if let Some(raw) = cand.value(FieldName::PostedOn) {
            job.posted_on = dates::parse_date(raw);
        }

        // Location: split, escalating tangled strings.
        if let Some(raw) = cand.value(FieldName::Location) {
            job.location_raw = Some(raw.to_string());
            if location::is_ambiguous(raw) {
                match self.ai_normalize_location(raw, budget).await {
                    Some(answer) => {
                        job.city = answer.city;
                        job.country_iso = answer.country_iso.clone();
                        job.country = answer
                            .country_iso
                            .as_deref()
                            .and_then(location::country_name)
                            .map(|n| titlecase(n));
                        job.is_remote = answer.is_remote;
                    }
                    None => issues.push(NormalizeIssue::UnresolvedLocation(raw.to_string())),
                }
            } else {
                let parts = location::split_location(raw);
                job.city = parts.city;
                job.country = parts.country;
                job.country_iso = parts.country_iso;
            }
        }

        job.level_norm = level_for_title(&job.title);
        job.mission_tags = mission_tags(&job.title, job.description.as_deref());
        job.international_eligible = international_eligible(job.description.as_deref());

        // Title and URL may have changed since `minimal` hashed them.
        job.canonical_hash = canonical_hash(&job.title, &job.apply_url);

        (job, issues)
    }

    async fn ai_normalize_date(&self, raw: &str, budget: &RunBudget) -> Option<chrono::NaiveDate> {
        let user = format!(
            "Normalize this job application deadline to an ISO date (YYYY-MM-DD). \
             Today is {}. Respond with strict JSON: {{\"date\": \"YYYY-MM-DD\"}} or {{\"date\": null}}.\n\
             Deadline text: {}",
            Utc::now().format("%Y-%m-%d"),
            raw
        );
        let answer: AiDateAnswer = self.ask("You normalize dates.", &user, budget).await?;
        answer.date.as_deref().and_then(dates::parse_date)
    }

    async fn ai_normalize_location(
        &self,
        raw: &str,
        budget: &RunBudget,
    ) -> Option<AiLocationAnswer> {
        let user = format!(
            "Normalize this job location. Respond with strict JSON: \
             {{\"city\": string|null, \"country_iso\": string|null, \"is_remote\": bool}}. \
             country_iso is ISO-3166 alpha-2.\nLocation text: {}",
            raw
        );
        self.ask("You normalize locations.", &user, budget).await
    }

    /// Budgeted, cached, strict-JSON question to the completer.
    async fn ask<T: serde::de::DeserializeOwned>(
        &self,
        system: &str,
        user: &str,
        budget: &RunBudget,
    ) -> Option<T> {
        let completer = self.completer.as_ref()?;
        let key = sha256_hex(format!("{}\n{}", system, user).as_bytes());

        let cached = {
            let mut cache = self.cache.lock().await;
            cache.get(&key).cloned()
        };
        let raw = match cached {
            Some(hit) => hit,
            None => {
                if !budget.try_spend() {
                    debug!("AI normalizer budget exhausted");
                    return None;
                }
                match completer.complete(system, user).await {
                    Ok(raw) => {
                        let mut cache = self.cache.lock().await;
                        cache.put(key, raw.clone());
                        raw
                    }
                    Err(AiError::BudgetExhausted) => return None,
                    Err(e) => {
                        warn!(error = %e, "AI normalizer call failed");
                        return None;
                    }
                }
            }
        };

        match serde_json::from_str::<T>(raw.trim()) {
            Ok(parsed) => Some(parsed),
            Err(e) => {
                warn!(error = %e, "AI normalizer returned invalid JSON");
                None
            }
        }
    }
}

fn level_for_title(job_title: &str) -> Option<String> {
    let lower = job_title.to_lowercase();
    // Scan specific-to-general so "senior manager" lands on senior? No:
    // leadership keywords outrank modifiers, so check lead last wins.
    let mut matched: Option<&str> = None;
    for (level, keywords) in LEVELS {
        if keywords.iter().any(|kw| lower.contains(kw)) {
            matched = Some(level);
        }
    }
    matched.map(str::to_string)
}

fn mission_tags(job_title: &str, description: Option<&str>) -> Vec<String> {
    let haystack = format!("{} {}", job_title, description.unwrap_or("")).to_lowercase();
    MISSION_TAGS
        .iter()
        .filter(|(_, keywords)| keywords.iter().any(|kw| haystack.contains(kw)))
        .map(|(tag, _)| tag.to_string())
        .collect()
}

fn international_eligible(description: Option<&str>) -> Option<bool> {
    let description = description?.to_lowercase();
    if NATIONAL_MARKERS.iter().any(|m| description.contains(m)) {
        return Some(false);
    }
    if INTERNATIONAL_MARKERS.iter().any(|m| description.contains(m)) {
        return Some(true);
    }
    None
}

fn titlecase(name: &str) -> String {
    name.split(' ')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockCompleter;
    use crate::types::{FieldValue, Provenance};

    fn candidate() -> JobCandidate {
        let mut cand = JobCandidate::new("https://acme.org/jobs/1");
        cand.fill(FieldName::Title, FieldValue::new("Senior Health Officer - Apply by 31 Dec 2025", Provenance::Dom));
        cand.fill(FieldName::ApplicationUrl, FieldValue::new("https://acme.org/jobs/1?utm_source=rss", Provenance::Dom));
        cand.fill(FieldName::Location, FieldValue::new("Nairobi, Kenya", Provenance::Heuristic));
        cand.fill(FieldName::Deadline, FieldValue::new("31-12-2025", Provenance::Heuristic));
        cand
    }

    #[tokio::test]
    async fn heuristics_cover_the_plain_case() {
        let normalizer = Normalizer::new(None, 16);
        let budget = RunBudget::exhausted();

        let (job, issues) = normalizer
            .normalize(Uuid::new_v4(), &candidate(), &budget)
            .await;

        assert!(issues.is_empty());
        assert_eq!(job.title, "Senior Health Officer");
        assert_eq!(job.city.as_deref(), Some("Nairobi"));
        assert_eq!(job.country_iso.as_deref(), Some("KE"));
        assert_eq!(
            job.deadline,
            chrono::NaiveDate::from_ymd_opt(2025, 12, 31)
        );
        assert_eq!(job.level_norm.as_deref(), Some("senior"));
        assert!(job.mission_tags.contains(&"health".to_string()));
        assert_eq!(
            job.canonical_hash,
            canonical_hash("Senior Health Officer", "https://acme.org/jobs/1?utm_source=rss")
        );
    }

    #[tokio::test]
    async fn unparseable_deadline_without_ai_is_an_issue() {
        let normalizer = Normalizer::new(None, 16);
        let budget = RunBudget::exhausted();

        let mut cand = candidate();
        cand.set(FieldName::Deadline, FieldValue::new("until filled", Provenance::Regex));

        let (job, issues) = normalizer.normalize(Uuid::new_v4(), &cand, &budget).await;
        assert_eq!(job.deadline, None);
        assert!(matches!(issues[0], NormalizeIssue::UnparseableDeadline(_)));
    }

    #[tokio::test]
    async fn ambiguous_location_escalates_to_ai() {
        let completer = Arc::new(MockCompleter::with_response(
            r#"{"city": "Lagos", "country_iso": "NG", "is_remote": true}"#,
        ));
        let normalizer = Normalizer::new(Some(completer.clone()), 16);
        let budget = RunBudget::unlimited();

        let mut cand = candidate();
        cand.set(FieldName::Location, FieldValue::new("Lagos / Remote", Provenance::Heuristic));

        let (job, issues) = normalizer.normalize(Uuid::new_v4(), &cand, &budget).await;
        assert!(issues.is_empty());
        assert_eq!(job.city.as_deref(), Some("Lagos"));
        assert_eq!(job.country_iso.as_deref(), Some("NG"));
        assert!(job.is_remote);
        assert_eq!(completer.calls(), 1);
    }

    #[tokio::test]
    async fn exhausted_budget_leaves_ambiguous_location_unresolved() {
        let completer = Arc::new(MockCompleter::with_response(r#"{"city": null}"#));
        let normalizer = Normalizer::new(Some(completer.clone()), 16);
        let budget = RunBudget::exhausted();

        let mut cand = candidate();
        cand.set(FieldName::Location, FieldValue::new("Lagos / Remote", Provenance::Heuristic));

        let (job, issues) = normalizer.normalize(Uuid::new_v4(), &cand, &budget).await;
        assert_eq!(job.city, None);
        assert!(issues.contains(&NormalizeIssue::UnresolvedLocation("Lagos / Remote".into())));
        assert_eq!(completer.calls(), 0);
    }

    #[test]
    fn eligibility_markers() {
        assert_eq!(
            international_eligible(Some("Open to all nationalities.")),
            Some(true)
        );
        assert_eq!(
            international_eligible(Some("This is a national position.")),
            Some(false)
        );
        assert_eq!(international_eligible(Some("A role.")), None);
        assert_eq!(international_eligible(None), None);
    }
}
