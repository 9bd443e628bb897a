//! `ddgs` keyless fallback provider: scrapes the DuckDuckGo HTML endpoint,
//! used when no API-keyed provider is configured (spec §4.5 auto order's
//! last resort).

use html_scraper::{Html, Selector};
use once_cell::sync::Lazy;
use webpipe_core::{Error, ProviderKind, ProviderMeta, Result, SearchProvider, SearchQuery, SearchResult};

const ENDPOINT: &str = "https://html.duckduckgo.com/html/";

static RESULT_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse(".result__a").unwrap());
static SNIPPET_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse(".result__snippet").unwrap());

pub struct DdgsProvider {
    client: reqwest::Client,
}

impl DdgsProvider {
    pub fn new(client: reqwest::Client) -> Self {
        DdgsProvider { client }
    }
}

#[async_trait::async_trait]
impl SearchProvider for DdgsProvider {
    fn meta(&self) -> ProviderMeta {
        ProviderMeta {
            id: "ddgs".to_string(),
            kind: ProviderKind::Search,
            enabled: true,
            required_env: vec![],
            privacy_warning: Some("keyless fallback scrapes a public HTML results page".to_string()),
        }
    }

    async fn search(&self, q: &SearchQuery) -> Result<Vec<SearchResult>> {
        let resp = self
            .client
            .get(ENDPOINT)
            .query(&[("q", q.query.as_str())])
            .send()
            .await
            .map_err(|e| Error::ProviderError(format!("ddgs request failed: {e}")))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(Error::ProviderError(format!("ddgs HTTP {status}")));
        }
        let body = resp
            .text()
            .await
            .map_err(|e| Error::ProviderError(format!("ddgs response read failed: {e}")))?;

        let max_results = q.max_results.unwrap_or(10);
        Ok(parse_results(&body, max_results))
    }
}

fn parse_results(html: &str, max_results: usize) -> Vec<SearchResult> {
    let doc = Html::parse_document(html);
    let titles: Vec<_> = doc.select(&RESULT_SELECTOR).collect();
    let snippets: Vec<_> = doc.select(&SNIPPET_SELECTOR).collect();

    let mut out = Vec::new();
    for (i, a) in titles.into_iter().enumerate() {
        if out.len() >= max_results {
            break;
        }
        let Some(href) = a.value().attr("href") else { continue };
        let url = resolve_ddg_redirect(href);
        let title = a.text().collect::<String>().trim().to_string();
        if url.is_empty() || title.is_empty() {
            continue;
        }
        let snippet = snippets
            .get(i)
            .map(|s| s.text().collect::<String>().trim().to_string())
            .unwrap_or_default();

        out.push(SearchResult {
            result_id: SearchResult::compute_result_id("ddgs", &url, &title),
            title,
            url,
            snippet,
            published_at: None,
            source_provider: "ddgs".to_string(),
            score: None,
        });
    }
    out
}

/// DuckDuckGo's HTML results wrap destinations in `//duckduckgo.com/l/?uddg=<encoded>`.
fn resolve_ddg_redirect(href: &str) -> String {
    if let Some(idx) = href.find("uddg=") {
        let encoded = &href[idx + "uddg=".len()..];
        let encoded = encoded.split('&').next().unwrap_or(encoded);
        return percent_encoding::percent_decode_str(encoded)
            .decode_utf8_lossy()
            .to_string();
    }
    href.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_result_anchors_and_snippets() {
        let html = r#"<html><body>
            <a class="result__a" href="//duckduckgo.com/l/?uddg=https%3A%2F%2Fexample.com%2F&rut=x">Example</a>
            <a class="result__snippet">A snippet about the example site.</a>
        </body></html>"#;
        let results = parse_results(html, 10);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].url, "https://example.com/");
        assert_eq!(results[0].title, "Example");
        assert!(results[0].snippet.contains("snippet"));
    }

    #[test]
    fn resolves_uddg_redirect_wrapper() {
        let resolved = resolve_ddg_redirect("//duckduckgo.com/l/?uddg=https%3A%2F%2Fexample.com%2Fx&rut=1");
        assert_eq!(resolved, "https://example.com/x");
    }
}
