//! `firecrawl_endpoint` search provider (spec §9 open question: Firecrawl is
//! an endpoint integration consumed through the same `search`/`fetch`
//! interface as any other provider, not a first-class internal extractor).

use serde::Deserialize;
use webpipe_core::{Error, ProviderKind, ProviderMeta, Result, SearchProvider, SearchQuery, SearchResult};

pub struct FirecrawlEndpointProvider {
    client: reqwest::Client,
}

impl FirecrawlEndpointProvider {
    pub fn new(client: reqwest::Client) -> Self {
        FirecrawlEndpointProvider { client }
    }

    fn base_url() -> String {
        std::env::var("FIRECRAWL_BASE_URL")
            .ok()
            .map(|s| s.trim().trim_end_matches('/').to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "https://api.firecrawl.dev".to_string())
    }

    fn api_key() -> Option<String> {
        std::env::var("FIRECRAWL_API_KEY").ok().filter(|v| !v.trim().is_empty())
    }

    /// Whether this provider participates in `auto` fallback at all — opt-in
    /// because it is a paid third-party endpoint (spec §6 `FIRECRAWL_ALLOW_AUTO`).
    pub fn allowed_in_auto() -> bool {
        std::env::var("FIRECRAWL_ALLOW_AUTO")
            .map(|v| matches!(v.trim(), "1" | "true" | "TRUE" | "yes"))
            .unwrap_or(false)
    }
}

#[derive(Debug, Deserialize)]
struct FirecrawlSearchResponse {
    success: bool,
    data: Option<Vec<FirecrawlSearchResult>>,
}

#[derive(Debug, Deserialize)]
struct FirecrawlSearchResult {
    url: String,
    title: Option<String>,
    description: Option<String>,
}

#[async_trait::async_trait]
impl SearchProvider for FirecrawlEndpointProvider {
    fn meta(&self) -> ProviderMeta {
        ProviderMeta {
            id: "firecrawl_endpoint".to_string(),
            kind: ProviderKind::Search,
            enabled: Self::api_key().is_some(),
            required_env: vec!["FIRECRAWL_API_KEY".to_string()],
            privacy_warning: Some(
                "queries and results are sent to a third-party hosted endpoint".to_string(),
            ),
        }
    }

    async fn search(&self, q: &SearchQuery) -> Result<Vec<SearchResult>> {
        let api_key = Self::api_key().ok_or_else(|| Error::ProviderError("missing FIRECRAWL_API_KEY".to_string()))?;

        let body = serde_json::json!({
            "query": q.query,
            "limit": q.max_results.unwrap_or(10),
        });

        let resp = self
            .client
            .post(format!("{}/v1/search", Self::base_url()))
            .header(reqwest::header::AUTHORIZATION, format!("Bearer {api_key}"))
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::ProviderError(format!("firecrawl_endpoint request failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(Error::ProviderError(format!("firecrawl_endpoint HTTP {status}")));
        }

        let parsed: FirecrawlSearchResponse = resp
            .json()
            .await
            .map_err(|e| Error::ProviderError(format!("firecrawl_endpoint response parse failed: {e}")))?;
        if !parsed.success {
            return Err(Error::ProviderError("firecrawl_endpoint returned success=false".to_string()));
        }

        let mut out = Vec::new();
        for r in parsed.data.unwrap_or_default() {
            let title = r.title.unwrap_or_default();
            let snippet = r.description.unwrap_or_default();
            out.push(SearchResult {
                result_id: SearchResult::compute_result_id("firecrawl_endpoint", &r.url, &title),
                title,
                url: r.url,
                snippet,
                published_at: None,
                source_provider: "firecrawl_endpoint".to_string(),
                score: None,
            });
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_response_shape() {
        let js = r#"{"success":true,"data":[{"url":"https://example.com","title":"E","description":"D"}]}"#;
        let parsed: FirecrawlSearchResponse = serde_json::from_str(js).unwrap();
        assert!(parsed.success);
        assert_eq!(parsed.data.unwrap().len(), 1);
    }
}
