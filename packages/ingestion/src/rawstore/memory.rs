//! In-memory raw-page store for tests.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::{StoreError, StoreResult};
use crate::rawstore::{storage_key, RawPageMeta, RawPageStore};

#[derive(Default)]
pub struct MemoryRawStore {
    blobs: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryRawStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.blobs.read().await.len()
    }

    pub async fn keys(&self) -> Vec<String> {
        self.blobs.read().await.keys().cloned().collect()
    }
}

#[async_trait]
impl RawPageStore for MemoryRawStore {
    async fn put(&self, body: &[u8], meta: &RawPageMeta) -> StoreResult<String> {
        let key = storage_key(&meta.url, meta.fetched_at, body, meta.ext);
        self.blobs
            .write()
            .await
            .entry(key.clone())
            .or_insert_with(|| body.to_vec());
        Ok(key)
    }

    async fn get(&self, key: &str) -> StoreResult<Vec<u8>> {
        self.blobs
            .read()
            .await
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(key.to_string()))
    }
}
