//! Canonical posting identity.
//!
//! `canonical_hash = sha256_hex(lower(trim(title)) || "|" || canonicalize(apply_url))`
//! with URL canonicalization that is idempotent: applying it twice yields
//! the same string.

use sha2::{Digest, Sha256};
use url::Url;

/// Query keys stripped during canonicalization. Tracking parameters churn
/// per-visit and would split one posting into many identities.
const TRACKING_PARAMS: &[&str] = &[
    "utm_source",
    "utm_medium",
    "utm_campaign",
    "utm_term",
    "utm_content",
    "utm_id",
    "gclid",
    "fbclid",
    "mc_cid",
    "mc_eid",
    "ref",
    "source",
];

/// Canonicalize an apply URL: lowercase scheme and host, strip the
/// fragment, drop known tracking query keys, and remove the trailing
/// slash from any path longer than "/".
///
/// Unparseable input is returned trimmed, so hashing stays total.
pub fn canonicalize_url(raw: &str) -> String {
    let trimmed = raw.trim();
    let mut url = match Url::parse(trimmed) {
        Ok(u) => u,
        Err(_) => return trimmed.to_string(),
    };

    url.set_fragment(None);

    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| !TRACKING_PARAMS.contains(&k.to_lowercase().as_str()))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    if kept.is_empty() {
        url.set_query(None);
    } else {
        let query: String = kept
            .iter()
            .map(|(k, v)| {
                if v.is_empty() {
                    k.clone()
                } else {
                    format!("{}={}", k, v)
                }
            })
            .collect::<Vec<_>>()
            .join("&");
        url.set_query(Some(&query));
    }

    // Url already lowercases scheme and host; normalize the path slash.
    let path = url.path().to_string();
    if path.len() > 1 && path.ends_with('/') {
        url.set_path(path.trim_end_matches('/'));
    }

    url.to_string()
}

/// Deterministic identity of a posting under `(title, apply_url)`.
pub fn canonical_hash(title: &str, apply_url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(title.trim().to_lowercase().as_bytes());
    hasher.update(b"|");
    hasher.update(canonicalize_url(apply_url).as_bytes());
    hex(&hasher.finalize())
}

/// sha256 of an arbitrary payload, for raw-page keys and AI cache keys.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex(&hasher.finalize())
}

fn hex(digest: &[u8]) -> String {
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}
