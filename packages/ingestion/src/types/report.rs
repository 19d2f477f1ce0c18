//! Per-run outcome surfaced to operators.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Top-level status of one source run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    /// At least one job extracted and the store accepted the batch
    Ok,
    /// Candidates extracted but none survived validation (or the run was
    /// cut short after partial commits)
    Partial,
    /// No candidates found
    Empty,
    /// Extraction succeeded but the upsert failed wholesale
    DbFail,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::Partial => "PARTIAL",
            Self::Empty => "EMPTY",
            Self::DbFail => "DB_FAIL",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "OK" => Some(Self::Ok),
            "PARTIAL" => Some(Self::Partial),
            "EMPTY" => Some(Self::Empty),
            "DB_FAIL" => Some(Self::DbFail),
            _ => None,
        }
    }
}

/// Upsert accounting for one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunCounts {
    /// Candidates that came out of the extractor
    pub found: usize,
    pub inserted: usize,
    pub updated: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl RunCounts {
    pub fn committed(&self) -> usize {
        self.inserted + self.updated
    }

    pub fn merge(&mut self, other: &RunCounts) {
        self.found += other.found;
        self.inserted += other.inserted;
        self.updated += other.updated;
        self.skipped += other.skipped;
        self.failed += other.failed;
    }
}

/// Maximum length of the human-readable run message.
const MESSAGE_CAP: usize = 200;

/// The single top-level report a run surfaces. Detailed reasons live in
/// `extraction_logs` and `failed_inserts`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub source_id: Uuid,
    pub status: RunStatus,
    pub counts: RunCounts,
    pub duration_ms: u64,
    pub message: String,
    pub raw_page_id: Option<Uuid>,
    pub not_modified: bool,
}

impl RunReport {
    pub fn new(source_id: Uuid, status: RunStatus, counts: RunCounts) -> Self {
        Self {
            source_id,
            status,
            counts,
            duration_ms: 0,
            message: String::new(),
            raw_page_id: None,
            not_modified: false,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        let mut message = message.into();
        if message.len() > MESSAGE_CAP {
            message.truncate(MESSAGE_CAP.saturating_sub(1));
            message.push('…');
        }
        self.message = message;
        self
    }

    pub fn with_duration_ms(mut self, ms: u64) -> Self {
        self.duration_ms = ms;
        self
    }

    /// Did the run commit or keep any rows (used for nochange tracking)?
    pub fn changed_anything(&self) -> bool {
        self.counts.committed() > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_strings_round_trip() {
        for status in [RunStatus::Ok, RunStatus::Partial, RunStatus::Empty, RunStatus::DbFail] {
            assert_eq!(RunStatus::parse(status.as_str()), Some(status));
        }
    }

    #[test]
    fn message_is_capped_at_200() {
        let report = RunReport::new(Uuid::new_v4(), RunStatus::Ok, RunCounts::default())
            .with_message("x".repeat(500));
        assert!(report.message.chars().count() <= 200);
    }

    #[test]
    fn counts_merge() {
        let mut a = RunCounts { found: 3, inserted: 1, updated: 1, skipped: 1, failed: 0 };
        let b = RunCounts { found: 2, inserted: 0, updated: 0, skipped: 1, failed: 1 };
        a.merge(&b);
        assert_eq!(a.found, 5);
        assert_eq!(a.committed(), 2);
        assert_eq!(a.failed, 1);
    }
}
