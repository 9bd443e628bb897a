//! Search registry contract (spec §4.5, §9). The core depends only on this
//! interface; concrete providers live in `webpipe-local::search`.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchQuery {
    pub query: String,
    pub max_results: Option<usize>,
    pub language: Option<String>,
    pub country: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    pub snippet: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub published_at: Option<String>,
    pub source_provider: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    pub result_id: String,
}

impl SearchResult {
    /// Stable hash of provider+url+title (spec §3 `SearchResult.result_id`).
    pub fn compute_result_id(provider: &str, url: &str, title: &str) -> String {
        let mut h = Sha256::new();
        h.update(provider.as_bytes());
        h.update(b"\0");
        h.update(url.as_bytes());
        h.update(b"\0");
        h.update(title.as_bytes());
        hex::encode(h.finalize())
    }
}

/// Registry entry metadata surfaced by the `providers` subcommand (spec §9).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderMeta {
    pub id: String,
    pub kind: ProviderKind,
    pub enabled: bool,
    pub required_env: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub privacy_warning: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    Search,
    Fetch,
    Render,
}

#[async_trait::async_trait]
pub trait SearchProvider: Send + Sync {
    fn meta(&self) -> ProviderMeta;
    async fn search(&self, q: &SearchQuery) -> crate::error::Result<Vec<SearchResult>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn result_id_is_stable_and_order_sensitive() {
        let a = SearchResult::compute_result_id("brave", "https://x/", "Title");
        let b = SearchResult::compute_result_id("brave", "https://x/", "Title");
        assert_eq!(a, b);
        let c = SearchResult::compute_result_id("tavily", "https://x/", "Title");
        assert_ne!(a, c);
    }
}
