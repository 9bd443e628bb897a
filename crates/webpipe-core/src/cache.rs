//! Cache contract (spec §4.1): `lookup`, `store`, `prune`. The concrete
//! filesystem-backed implementation is `webpipe_local::cache::FsCache`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub body_path: String,
    pub metadata: serde_json::Value,
    pub stored_at_epoch_s: u64,
}

/// Inputs to a fingerprint: method + final-URL-post-normalization + the
/// relevant header subset (accept, accept-language, user-agent) — these
/// participate because they alter content negotiation (spec §3).
#[derive(Debug, Clone)]
pub struct FingerprintInput {
    pub method: String,
    pub url: String,
    pub headers: BTreeMap<String, String>,
}

pub const FINGERPRINT_HEADER_ALLOWLIST: [&str; 3] = ["accept", "accept-language", "user-agent"];
