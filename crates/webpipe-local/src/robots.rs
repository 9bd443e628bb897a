//! Process-scoped robots.txt cache (spec §4.4, §9).
//!
//! Deliberately separate from [`crate::cache::FsCache`]: this is an
//! in-memory, per-host mapping with its own short TTL and must never
//! leak into the on-disk response cache.

use robotstxt::DefaultMatcher;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use webpipe_core::{Error, Result};

const ROBOTS_TTL: Duration = Duration::from_secs(30 * 60);
const ROBOTS_FETCH_TIMEOUT_MS: u64 = 5_000;

struct Entry {
    body: String,
    fetched_at: Instant,
}

pub struct RobotsCache {
    client: reqwest::Client,
    entries: Mutex<HashMap<String, Entry>>,
}

impl RobotsCache {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(ROBOTS_FETCH_TIMEOUT_MS))
            .build()
            .expect("building a bare http client with only a timeout never fails");
        RobotsCache {
            client,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// `respect` mode entry point: `Ok(())` when allowed, `Err(RobotsDisallow)` otherwise.
    /// A robots.txt fetch failure (missing file, timeout) is treated as allow-all,
    /// matching the conventional crawler convention.
    pub async fn check(&self, url: &str, user_agent: &str) -> Result<()> {
        let parsed = url::Url::parse(url).map_err(|e| Error::InvalidUsage(format!("invalid url: {e}")))?;
        let host_key = format!(
            "{}://{}",
            parsed.scheme(),
            parsed.host_str().unwrap_or_default()
        );
        let path = if parsed.path().is_empty() {
            "/".to_string()
        } else {
            let mut p = parsed.path().to_string();
            if let Some(q) = parsed.query() {
                p.push('?');
                p.push_str(q);
            }
            p
        };

        let body = self.body_for_host(&host_key).await;
        let mut matcher = DefaultMatcher::default();
        let allowed = match &body {
            Some(txt) => matcher.one_agent_allowed_by_robots(txt, user_agent, &path),
            None => true,
        };

        if allowed {
            Ok(())
        } else {
            Err(Error::RobotsDisallow(format!(
                "{path} is disallowed by {host_key}/robots.txt for user-agent '{user_agent}'"
            )))
        }
    }

    async fn body_for_host(&self, host_key: &str) -> Option<String> {
        if let Some(entry) = self.entries.lock().unwrap().get(host_key) {
            if entry.fetched_at.elapsed() < ROBOTS_TTL {
                return Some(entry.body.clone());
            }
        }

        let robots_url = format!("{host_key}/robots.txt");
        let body = match self.client.get(&robots_url).send().await {
            Ok(resp) if resp.status().is_success() => resp.text().await.unwrap_or_default(),
            _ => String::new(),
        };

        self.entries.lock().unwrap().insert(
            host_key.to_string(),
            Entry {
                body: body.clone(),
                fetched_at: Instant::now(),
            },
        );
        Some(body)
    }
}

impl Default for RobotsCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn allows_when_robots_txt_has_no_matching_disallow() {
        let cache = RobotsCache::new();
        cache.entries.lock().unwrap().insert(
            "https://example.com".to_string(),
            Entry {
                body: "User-agent: *\nDisallow: /private\n".to_string(),
                fetched_at: Instant::now(),
            },
        );
        assert!(cache.check("https://example.com/public", "webpipe").await.is_ok());
    }

    #[tokio::test]
    async fn disallows_matching_path() {
        let cache = RobotsCache::new();
        cache.entries.lock().unwrap().insert(
            "https://example.com".to_string(),
            Entry {
                body: "User-agent: *\nDisallow: /private\n".to_string(),
                fetched_at: Instant::now(),
            },
        );
        let err = cache
            .check("https://example.com/private/x", "webpipe")
            .await
            .unwrap_err();
        assert_eq!(err.code(), "robots_disallow");
    }

    #[tokio::test]
    async fn stale_entry_is_not_reused_past_ttl() {
        // body_for_host() only trusts an entry while `elapsed() < ROBOTS_TTL`; an
        // entry older than that must not be returned from the cache as-is. We
        // assert the staleness check directly rather than forcing a real refetch,
        // which would make this test depend on network access.
        let cache = RobotsCache::new();
        cache.entries.lock().unwrap().insert(
            "https://example.com".to_string(),
            Entry {
                body: "User-agent: *\nDisallow: /private\n".to_string(),
                fetched_at: Instant::now() - Duration::from_secs(60 * 60),
            },
        );
        let guard = cache.entries.lock().unwrap();
        let entry = guard.get("https://example.com").unwrap();
        assert!(entry.fetched_at.elapsed() >= ROBOTS_TTL);
    }

    #[tokio::test]
    async fn robots_fetch_failure_is_treated_as_allow_all() {
        // A host with no reachable robots.txt (loopback port nothing listens on)
        // must not block the request (spec §4.4: fetch failure -> allow-all).
        let cache = RobotsCache::new();
        let res = cache.check("http://127.0.0.1:1/anything", "webpipe").await;
        assert!(res.is_ok());
    }
}
