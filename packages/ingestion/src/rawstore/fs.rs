//! Filesystem raw-page store.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::NaiveDate;
use tracing::{debug, warn};

use crate::error::{StoreError, StoreResult};
use crate::rawstore::{storage_key, RawPageMeta, RawPageStore};

/// Stores payloads under `<root>/<domain>/<YYYY-MM-DD>/<sha256>.<ext>`.
pub struct FsRawStore {
    root: PathBuf,
}

impl FsRawStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn abs(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }

    /// Delete date directories older than the retention cutoff.
    /// Sidecar rows referencing pruned blobs stay; `get` on them reports
    /// `NotFound`.
    pub async fn prune_before(&self, cutoff: NaiveDate) -> StoreResult<usize> {
        let mut pruned = 0usize;
        let mut domains = tokio::fs::read_dir(&self.root).await?;

        while let Some(domain) = domains.next_entry().await? {
            if !domain.file_type().await?.is_dir() {
                continue;
            }
            let mut dates = tokio::fs::read_dir(domain.path()).await?;
            while let Some(date_dir) = dates.next_entry().await? {
                let name = date_dir.file_name();
                let Some(date) = name
                    .to_str()
                    .and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok())
                else {
                    continue;
                };
                if date < cutoff {
                    if let Err(e) = tokio::fs::remove_dir_all(date_dir.path()).await {
                        warn!(path = %date_dir.path().display(), error = %e, "prune failed");
                    } else {
                        pruned += 1;
                    }
                }
            }
        }

        debug!(pruned, cutoff = %cutoff, "raw-page retention sweep complete");
        Ok(pruned)
    }

    async fn write_once(path: &Path, body: &[u8]) -> StoreResult<()> {
        if tokio::fs::try_exists(path).await? {
            // Content-addressed: same key means same bytes.
            return Ok(());
        }
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        // Write to a temp name then rename so readers never observe a
        // partial blob.
        let tmp = path.with_extension("tmp");
        tokio::fs::write(&tmp, body).await?;
        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }
}

#[async_trait]
impl RawPageStore for FsRawStore {
    async fn put(&self, body: &[u8], meta: &RawPageMeta) -> StoreResult<String> {
        let key = storage_key(&meta.url, meta.fetched_at, body, meta.ext);
        let path = self.abs(&key);
        Self::write_once(&path, body).await?;
        debug!(key = %key, bytes = body.len(), "raw page stored");
        Ok(key)
    }

    async fn get(&self, key: &str) -> StoreResult<Vec<u8>> {
        let path = self.abs(key);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StoreError::NotFound(key.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }
}
