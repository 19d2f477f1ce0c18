//! One-hop detail enrichment.
//!
//! For candidates whose list page left `location` or `deadline` empty,
//! fetch the application URL once and re-run the static stages over the
//! detail body. Bounded per run and per host.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::extract::html::extract_detail_fields;
use crate::fetch::{Conditional, HtmlFetcher};
use crate::schedule::domains::DomainLimits;
use crate::types::{FieldName, JobCandidate};

pub struct DetailEnricher {
    fetcher: Arc<HtmlFetcher>,
    domains: Arc<DomainLimits>,
    max_per_run: usize,
}

impl DetailEnricher {
    pub fn new(fetcher: Arc<HtmlFetcher>, domains: Arc<DomainLimits>, max_per_run: usize) -> Self {
        Self {
            fetcher,
            domains,
            max_per_run,
        }
    }

    fn needs_detail(cand: &JobCandidate) -> bool {
        cand.is_missing(FieldName::Location) || cand.is_missing(FieldName::Deadline)
    }

    /// Enrich candidates in place. Returns how many detail pages were
    /// fetched. Fetch failures degrade silently per candidate.
    pub async fn enrich(
        &self,
        candidates: &mut [JobCandidate],
        ignore_robots: bool,
        cancel: &CancellationToken,
    ) -> usize {
        let mut fetched = 0usize;

        for cand in candidates.iter_mut() {
            if fetched >= self.max_per_run || cancel.is_cancelled() {
                break;
            }
            if !Self::needs_detail(cand) {
                continue;
            }
            let Some(url) = cand.value(FieldName::ApplicationUrl).map(str::to_string) else {
                continue;
            };
            // The list page doubling as the apply link has nothing new.
            if url == cand.url {
                continue;
            }

            let _permit = self.domains.acquire_for_url(&url).await;
            fetched += 1;

            match self
                .fetcher
                .fetch_url(&url, &Conditional::default(), ignore_robots)
                .await
            {
                Ok(outcome) => {
                    let Some(body) = outcome.body else { continue };
                    let fields = extract_detail_fields(&body, &url);
                    let mut filled = 0usize;
                    for (field, value) in fields {
                        if cand.fill(field, value) {
                            filled += 1;
                        }
                    }
                    debug!(url = %url, filled, "detail page enriched candidate");
                }
                Err(e) => {
                    warn!(url = %url, kind = e.kind.as_str(), "detail fetch failed");
                }
            }
        }

        fetched
    }
}
