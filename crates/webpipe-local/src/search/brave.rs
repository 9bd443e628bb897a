//! `brave_api` search provider (spec §6 `BRAVE_API_KEY`).

use serde::Deserialize;
use webpipe_core::{Error, ProviderKind, ProviderMeta, Result, SearchProvider, SearchQuery, SearchResult};

const ENDPOINT: &str = "https://api.search.brave.com/res/v1/web/search";

pub struct BraveApiProvider {
    client: reqwest::Client,
}

impl BraveApiProvider {
    pub fn new(client: reqwest::Client) -> Self {
        BraveApiProvider { client }
    }

    fn api_key() -> Option<String> {
        std::env::var("BRAVE_API_KEY").ok().filter(|v| !v.trim().is_empty())
    }
}

#[derive(Debug, Deserialize)]
struct BraveWebSearchResponse {
    web: Option<BraveWeb>,
}

#[derive(Debug, Deserialize)]
struct BraveWeb {
    results: Option<Vec<BraveWebResult>>,
}

#[derive(Debug, Deserialize)]
struct BraveWebResult {
    url: String,
    title: Option<String>,
    description: Option<String>,
}

#[async_trait::async_trait]
impl SearchProvider for BraveApiProvider {
    fn meta(&self) -> ProviderMeta {
        ProviderMeta {
            id: "brave_api".to_string(),
            kind: ProviderKind::Search,
            enabled: Self::api_key().is_some(),
            required_env: vec!["BRAVE_API_KEY".to_string()],
            privacy_warning: None,
        }
    }

    async fn search(&self, q: &SearchQuery) -> Result<Vec<SearchResult>> {
        let api_key = Self::api_key().ok_or_else(|| Error::ProviderError("missing BRAVE_API_KEY".to_string()))?;

        let mut req = self
            .client
            .get(ENDPOINT)
            .header("X-Subscription-Token", &api_key)
            .query(&[("q", q.query.as_str())]);
        if let Some(n) = q.max_results {
            req = req.query(&[("count", n.to_string())]);
        }
        if let Some(lang) = q.language.as_deref() {
            req = req.query(&[("search_lang", lang)]);
        }
        if let Some(country) = q.country.as_deref() {
            req = req.query(&[("country", country)]);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| Error::ProviderError(format!("brave_api request failed: {e}")))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(Error::ProviderError(format!("brave_api HTTP {status}")));
        }

        let parsed: BraveWebSearchResponse = resp
            .json()
            .await
            .map_err(|e| Error::ProviderError(format!("brave_api response parse failed: {e}")))?;

        let mut out = Vec::new();
        for r in parsed.web.and_then(|w| w.results).unwrap_or_default() {
            let title = r.title.unwrap_or_default();
            let snippet = r.description.unwrap_or_default();
            out.push(SearchResult {
                result_id: SearchResult::compute_result_id("brave_api", &r.url, &title),
                title,
                url: r.url,
                snippet,
                published_at: None,
                source_provider: "brave_api".to_string(),
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
    fn parses_minimal_brave_response_shape() {
        let js = r#"{"web":{"results":[{"url":"https://example.com","title":"Example","description":"Hello"}]}}"#;
        let parsed: BraveWebSearchResponse = serde_json::from_str(js).unwrap();
        let results = parsed.web.unwrap().results.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].url, "https://example.com");
    }
}
