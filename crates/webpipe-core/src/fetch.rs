//! Fetch Engine contract (spec §4.2): `fetch(url, FetchOptions) -> FetchResult`.

use crate::document::Document;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Request-shaped knobs for a single fetch. Headers here exclude
/// `Authorization`/`Cookie`/`Set-Cookie` — the Fetch Engine rejects those
/// with `Error::InvalidUsage` before issuing any request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchOptions {
    pub headers: BTreeMap<String, String>,
    pub accept: Option<String>,
    pub user_agent: Option<String>,
    pub max_bytes: u64,
    pub timeout_ms: u64,
    pub follow_redirects: bool,
    pub detect_blocks: bool,
    /// Read from / write to cache; see `webpipe_core::CachePolicy`.
    pub fresh: bool,
    pub no_cache: bool,
}

impl Default for FetchOptions {
    fn default() -> Self {
        FetchOptions {
            headers: BTreeMap::new(),
            accept: None,
            user_agent: None,
            max_bytes: 5_000_000,
            timeout_ms: 20_000,
            follow_redirects: true,
            detect_blocks: true,
            fresh: false,
            no_cache: false,
        }
    }
}

pub const FORBIDDEN_REQUEST_HEADERS: [&str; 3] = ["authorization", "cookie", "set-cookie"];

impl FetchOptions {
    /// `Err` if a caller-supplied header is one of the forbidden secret
    /// carriers (spec §4.2): `Authorization`, `Cookie`, `Set-Cookie`.
    pub fn validate_headers(&self) -> crate::error::Result<()> {
        for k in self.headers.keys() {
            let kl = k.trim().to_ascii_lowercase();
            if FORBIDDEN_REQUEST_HEADERS.contains(&kl.as_str()) {
                return Err(crate::error::Error::InvalidUsage(format!(
                    "header '{k}' is not allowed; secrets are never accepted as headers"
                )));
            }
        }
        Ok(())
    }
}

/// First-match-wins classification (spec §4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    Ok,
    Blocked,
    NeedsRender,
    NotFound,
    Timeout,
    TransportError,
}

impl Classification {
    pub fn error_code(&self) -> &'static str {
        match self {
            Classification::Ok => "ok",
            Classification::Blocked => "blocked",
            Classification::NeedsRender => "needs_render",
            Classification::NotFound => "not_found",
            Classification::Timeout => "timeout",
            Classification::TransportError => "transport_error",
        }
    }

    pub fn exit_code(&self) -> i32 {
        match self {
            Classification::Ok => 0,
            Classification::Blocked => 4,
            Classification::NeedsRender => 5,
            Classification::NotFound => 3,
            Classification::Timeout | Classification::TransportError => 1,
        }
    }
}

/// Suggested next command/flag for a non-`ok` classification (spec §4.2).
pub fn next_steps_for(classification: Classification, reason: &str) -> Vec<String> {
    match classification {
        Classification::Ok => Vec::new(),
        Classification::Blocked => vec![
            "retry with adjusted --header values".to_string(),
            "retry through --proxy".to_string(),
            "switch search provider with --provider".to_string(),
        ],
        Classification::NeedsRender => vec![
            "retry with `render <url>`".to_string(),
            "retry with `extract --method browser`".to_string(),
        ],
        Classification::NotFound => vec!["verify the URL is correct".to_string()],
        Classification::Timeout | Classification::TransportError => vec![
            "retry with --fresh".to_string(),
            "retry with a larger --timeout".to_string(),
        ],
    }
    .into_iter()
    .chain(if reason.is_empty() {
        None
    } else {
        Some(format!("reason: {reason}"))
    })
    .collect()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchResult {
    pub document: Document,
    pub classification: Classification,
    pub reason: String,
    pub next_steps: Vec<String>,
}

impl FetchResult {
    pub fn ok(document: Document) -> Self {
        FetchResult {
            document,
            classification: Classification::Ok,
            reason: String::new(),
            next_steps: Vec::new(),
        }
    }

    pub fn classified(document: Document, classification: Classification, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        let next_steps = next_steps_for(classification, &reason);
        FetchResult {
            document,
            classification,
            reason,
            next_steps,
        }
    }
}

/// `fetch(url, FetchOptions) -> FetchResult`. Implementors never throw for
/// expected network conditions (blocked, 404, 5xx, timeout): those become a
/// `Classification`. Only programmer errors (bad URL, forbidden header)
/// propagate as `Err`.
#[async_trait::async_trait]
pub trait FetchBackend: Send + Sync {
    async fn fetch(&self, url: &str, options: &FetchOptions) -> crate::error::Result<FetchResult>;
}
