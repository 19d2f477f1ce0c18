//! Content-addressed storage of fetched payloads.
//!
//! Key layout: `<domain>/<YYYY-MM-DD>/<sha256hex(body)>.<ext>`. Writes
//! are at-least-once with idempotent keys; a second write of the same
//! content is a no-op. Bodies are never mutated after the first write.

pub mod fs;
pub mod memory;

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::canonical::sha256_hex;
use crate::error::StoreResult;

pub use fs::FsRawStore;
pub use memory::MemoryRawStore;

/// File extension of a stored payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayloadExt {
    Html,
    Xml,
    Json,
    Png,
}

impl PayloadExt {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Html => "html",
            Self::Xml => "xml",
            Self::Json => "json",
            Self::Png => "png",
        }
    }
}

/// Metadata for one stored payload; becomes the `raw_pages` sidecar row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawPageMeta {
    pub source_id: Uuid,
    pub url: String,
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub fetched_at: DateTime<Utc>,
    pub ext: PayloadExt,
}

/// Derive the storage key for a payload.
pub fn storage_key(url: &str, fetched_at: DateTime<Utc>, body: &[u8], ext: PayloadExt) -> String {
    let domain = url::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_lowercase()))
        .unwrap_or_else(|| "unknown".to_string());
    format!(
        "{}/{}/{}.{}",
        domain,
        fetched_at.format("%Y-%m-%d"),
        sha256_hex(body),
        ext.as_str()
    )
}

/// Extract the sha256 hex embedded in a storage key, for round-trip
/// verification.
pub fn key_hash(storage_path: &str) -> Option<&str> {
    let file = storage_path.rsplit('/').next()?;
    let (hash, _ext) = file.rsplit_once('.')?;
    (hash.len() == 64).then_some(hash)
}

/// Write-once/read-many blob store for fetched payloads.
#[async_trait]
pub trait RawPageStore: Send + Sync {
    /// Store a payload, returning its storage path. Idempotent: storing
    /// identical content twice returns the same path without rewriting.
    async fn put(&self, body: &[u8], meta: &RawPageMeta) -> StoreResult<String>;

    /// Read a payload back by storage path.
    async fn get(&self, path: &str) -> StoreResult<Vec<u8>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn key_embeds_domain_date_and_hash() {
        let at = Utc.with_ymd_and_hms(2025, 7, 1, 12, 0, 0).unwrap();
        let key = storage_key("https://acme.org/jobs", at, b"<html></html>", PayloadExt::Html);
        assert!(key.starts_with("acme.org/2025-07-01/"));
        assert!(key.ends_with(".html"));
        assert_eq!(key_hash(&key).unwrap(), sha256_hex(b"<html></html>"));
    }

    #[test]
    fn key_hash_rejects_malformed_paths() {
        assert!(key_hash("acme.org/2025-07-01/short.html").is_none());
        assert!(key_hash("nonsense").is_none());
    }
}
