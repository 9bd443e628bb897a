//! `searxng_local` search provider: a self-hosted metasearch instance.

use serde::Deserialize;
use webpipe_core::{Error, ProviderKind, ProviderMeta, Result, SearchProvider, SearchQuery, SearchResult};

pub struct SearxngLocalProvider {
    client: reqwest::Client,
}

impl SearxngLocalProvider {
    pub fn new(client: reqwest::Client) -> Self {
        SearxngLocalProvider { client }
    }

    fn endpoint() -> Option<String> {
        std::env::var("SEARXNG_ENDPOINT")
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }

    fn search_endpoint(base: &str) -> String {
        let mut base = base.trim_end_matches('/').to_string();
        if !base.ends_with("/search") {
            base.push_str("/search");
        }
        base
    }
}

#[derive(Debug, Deserialize)]
struct SearxngResponse {
    results: Option<Vec<SearxngResult>>,
}

#[derive(Debug, Deserialize)]
struct SearxngResult {
    url: Option<String>,
    title: Option<String>,
    content: Option<String>,
}

#[async_trait::async_trait]
impl SearchProvider for SearxngLocalProvider {
    fn meta(&self) -> ProviderMeta {
        ProviderMeta {
            id: "searxng_local".to_string(),
            kind: ProviderKind::Search,
            enabled: Self::endpoint().is_some(),
            required_env: vec!["SEARXNG_ENDPOINT".to_string()],
            privacy_warning: None,
        }
    }

    async fn search(&self, q: &SearchQuery) -> Result<Vec<SearchResult>> {
        let endpoint = Self::endpoint().ok_or_else(|| Error::ProviderError("missing SEARXNG_ENDPOINT".to_string()))?;
        let max_results = q.max_results.unwrap_or(10).min(50);

        let mut req = self
            .client
            .get(Self::search_endpoint(&endpoint))
            .query(&[("q", q.query.as_str()), ("format", "json")]);
        if let Some(lang) = q.language.as_deref() {
            req = req.query(&[("language", lang)]);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| Error::ProviderError(format!("searxng_local request failed: {e}")))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(Error::ProviderError(format!("searxng_local HTTP {status}")));
        }

        let parsed: SearxngResponse = resp
            .json()
            .await
            .map_err(|e| Error::ProviderError(format!("searxng_local response parse failed: {e}")))?;

        let mut out = Vec::new();
        for r in parsed.results.unwrap_or_default().into_iter().take(max_results) {
            let Some(url) = r.url else { continue };
            let title = r.title.unwrap_or_default();
            let snippet = r.content.unwrap_or_default();
            out.push(SearchResult {
                result_id: SearchResult::compute_result_id("searxng_local", &url, &title),
                title,
                url,
                snippet,
                published_at: None,
                source_provider: "searxng_local".to_string(),
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
    fn search_endpoint_appends_path_when_missing() {
        assert_eq!(SearxngLocalProvider::search_endpoint("http://localhost:8080"), "http://localhost:8080/search");
        assert_eq!(SearxngLocalProvider::search_endpoint("http://localhost:8080/search"), "http://localhost:8080/search");
    }

    #[test]
    fn parses_minimal_response_shape() {
        let js = r#"{"results":[{"url":"https://example.com","title":"E","content":"C"}]}"#;
        let parsed: SearxngResponse = serde_json::from_str(js).unwrap();
        assert_eq!(parsed.results.unwrap().len(), 1);
    }
}
