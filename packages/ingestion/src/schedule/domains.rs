//! Per-host concurrency limits.
//!
//! A keyed semaphore: at most `per_domain` in-flight requests per host,
//! shared by source runs and detail fetches. Acquisition is FIFO.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};

pub struct DomainLimits {
    per_domain: usize,
    semaphores: Mutex<HashMap<String, Arc<Semaphore>>>,
}

impl DomainLimits {
    pub fn new(per_domain: usize) -> Self {
        Self {
            per_domain: per_domain.max(1),
            semaphores: Mutex::new(HashMap::new()),
        }
    }

    /// Acquire a slot for a host. The permit releases on drop.
    pub async fn acquire(&self, host: &str) -> OwnedSemaphorePermit {
        let semaphore = {
            let mut map = self.semaphores.lock().await;
            Arc::clone(
                map.entry(host.to_lowercase())
                    .or_insert_with(|| Arc::new(Semaphore::new(self.per_domain))),
            )
        };
        semaphore
            .acquire_owned()
            .await
            .expect("domain semaphore is never closed")
    }

    /// Acquire for a URL's host; unkeyed URLs share the "unknown" slot.
    pub async fn acquire_for_url(&self, url: &str) -> OwnedSemaphorePermit {
        let host = url::Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(|h| h.to_lowercase()))
            .unwrap_or_else(|| "unknown".to_string());
        self.acquire(&host).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn serializes_same_host() {
        let limits = Arc::new(DomainLimits::new(1));

        let permit = limits.acquire("acme.org").await;

        // Second acquire on the same host must wait
        let pending = {
            let limits = Arc::clone(&limits);
            tokio::spawn(async move {
                let _p = limits.acquire("acme.org").await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!pending.is_finished());

        drop(permit);
        tokio::time::timeout(Duration::from_secs(1), pending)
            .await
            .expect("released permit unblocks the waiter")
            .unwrap();
    }

    #[tokio::test]
    async fn different_hosts_run_concurrently() {
        let limits = DomainLimits::new(1);
        let _a = limits.acquire("a.org").await;
        // Must not block
        let _b = tokio::time::timeout(Duration::from_millis(100), limits.acquire("b.org"))
            .await
            .expect("different host does not contend");
    }
}
