//! Search registry (spec §4.5, §9): a static ordered provider list plus
//! per-provider metadata, chosen by first-enabled-match. No runtime
//! monkey-patching — providers are fixed at construction.

mod brave;
mod ddgs;
mod firecrawl;
mod searxng;

use webpipe_core::{Error, Mode, ProviderMeta, Result, SearchProvider, SearchQuery, SearchResult};

pub use brave::BraveApiProvider;
pub use ddgs::DdgsProvider;
pub use firecrawl::FirecrawlEndpointProvider;
pub use searxng::SearxngLocalProvider;

/// Auto fallback order (spec §4.5): `brave_api` > `searxng_local` >
/// `firecrawl_endpoint` (standard mode only, and only when opted into auto
/// via `FIRECRAWL_ALLOW_AUTO`) > `ddgs`.
pub struct SearchRegistry {
    providers: Vec<Box<dyn SearchProvider>>,
}

impl SearchRegistry {
    pub fn new(client: reqwest::Client) -> Self {
        SearchRegistry {
            providers: vec![
                Box::new(BraveApiProvider::new(client.clone())),
                Box::new(SearxngLocalProvider::new(client.clone())),
                Box::new(FirecrawlEndpointProvider::new(client.clone())),
                Box::new(DdgsProvider::new(client)),
            ],
        }
    }

    pub fn provider_metas(&self) -> Vec<ProviderMeta> {
        self.providers.iter().map(|p| p.meta()).collect()
    }

    fn eligible_for_auto(&self, id: &str, mode: Mode) -> bool {
        if id == "firecrawl_endpoint" {
            return mode == Mode::Standard && FirecrawlEndpointProvider::allowed_in_auto();
        }
        true
    }

    /// Explicit provider by id (used when `--provider <id>` is passed).
    pub async fn search_with(&self, provider_id: &str, q: &SearchQuery) -> Result<(Vec<SearchResult>, String)> {
        let provider = self
            .providers
            .iter()
            .find(|p| p.meta().id == provider_id)
            .ok_or_else(|| Error::InvalidUsage(format!("unknown search provider '{provider_id}'")))?;
        let results = provider.search(q).await?;
        Ok((results, provider_id.to_string()))
    }

    /// `auto`: sequential fallback, first enabled provider that returns
    /// successfully wins. No parallel race (spec §5).
    pub async fn search_auto(&self, q: &SearchQuery, mode: Mode) -> Result<(Vec<SearchResult>, String)> {
        let mut last_err: Option<Error> = None;
        for provider in &self.providers {
            let meta = provider.meta();
            if !meta.enabled || !self.eligible_for_auto(&meta.id, mode) {
                continue;
            }
            match provider.search(q).await {
                Ok(results) => return Ok((results, meta.id)),
                Err(e) => last_err = Some(e),
            }
        }
        Err(last_err.unwrap_or_else(|| Error::ProviderError("no search provider is enabled".to_string())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_metas_lists_all_four_in_declared_order() {
        let registry = SearchRegistry::new(reqwest::Client::new());
        let ids: Vec<_> = registry.provider_metas().into_iter().map(|m| m.id).collect();
        assert_eq!(ids, vec!["brave_api", "searxng_local", "firecrawl_endpoint", "ddgs"]);
    }

    #[test]
    fn ddgs_is_always_enabled_as_keyless_fallback() {
        let registry = SearchRegistry::new(reqwest::Client::new());
        let ddgs_meta = registry.provider_metas().into_iter().find(|m| m.id == "ddgs").unwrap();
        assert!(ddgs_meta.enabled);
    }

    #[test]
    fn firecrawl_is_not_eligible_for_auto_outside_standard_mode() {
        let registry = SearchRegistry::new(reqwest::Client::new());
        assert!(!registry.eligible_for_auto("firecrawl_endpoint", Mode::Strict));
        assert!(!registry.eligible_for_auto("firecrawl_endpoint", Mode::Permissive));
    }
}
