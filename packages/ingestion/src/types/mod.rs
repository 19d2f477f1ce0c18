//! Domain types for the ingestion pipeline.

pub mod candidate;
pub mod field;
pub mod job;
pub mod report;
pub mod source;

pub use candidate::{ExtractionResult, JobCandidate, Stage, StageError};
pub use field::{FieldName, FieldValue, Provenance};
pub use job::{JobRecord, NewJob};
pub use report::{RunCounts, RunReport, RunStatus};
pub use source::{ApiAuth, ApiParserHint, HtmlHint, HtmlSelectors, Source, SourceStatus, SourceType};
