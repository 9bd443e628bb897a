//! Filesystem-backed `Cache` (spec §4.1, §6 on-disk layout).
//!
//! Layout: `<cache_dir>/bodies/<fingerprint-prefix>/<fingerprint>.bin` plus a
//! `.json` metadata sidecar. LRU pruning is driven by file mtimes rather
//! than a separate index — `touch`-ing a file's mtime on every read keeps
//! "least recently accessed" derivable straight from the filesystem, and
//! survives losing the optional append-only index the spec allows.

use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use webpipe_core::{CacheEntry, Error, FingerprintInput, Result, FINGERPRINT_HEADER_ALLOWLIST};

const DEFAULT_TTL_S: u64 = 7 * 24 * 60 * 60;

#[derive(Debug, Clone)]
pub struct FsCache {
    root: PathBuf,
    max_bytes: u64,
}

/// Fingerprint normalization (spec §4.1): lowercased scheme+host, path
/// preserved, query keys sorted, fragment stripped. `Accept`/
/// `Accept-Language`/`User-Agent` headers participate because they alter
/// content negotiation.
pub fn normalize_fingerprint_url(url: &str) -> Result<String> {
    let mut parsed = url::Url::parse(url).map_err(|e| Error::InvalidUsage(format!("invalid url: {e}")))?;
    parsed.set_fragment(None);

    let mut pairs: Vec<(String, String)> = parsed.query_pairs().into_owned().collect();
    pairs.sort();
    if pairs.is_empty() {
        parsed.set_query(None);
    } else {
        let qs = pairs
            .into_iter()
            .map(|(k, v)| format!("{}={}", urlencode(&k), urlencode(&v)))
            .collect::<Vec<_>>()
            .join("&");
        parsed.set_query(Some(&qs));
    }

    let scheme = parsed.scheme().to_ascii_lowercase();
    let host = parsed.host_str().unwrap_or("").to_ascii_lowercase();
    let port = parsed.port().map(|p| format!(":{p}")).unwrap_or_default();
    let path = parsed.path();
    let query = parsed.query().map(|q| format!("?{q}")).unwrap_or_default();
    Ok(format!("{scheme}://{host}{port}{path}{query}"))
}

fn urlencode(s: &str) -> String {
    url::form_urlencoded::byte_serialize(s.as_bytes()).collect()
}

pub fn compute_fingerprint(input: &FingerprintInput) -> String {
    let mut h = Sha256::new();
    h.update(b"method:");
    h.update(input.method.to_ascii_uppercase().as_bytes());
    h.update(b"\nurl:");
    h.update(input.url.as_bytes());
    h.update(b"\nheaders:");
    for key in FINGERPRINT_HEADER_ALLOWLIST {
        if let Some(v) = input
            .headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v)
        {
            h.update(key.as_bytes());
            h.update(b"=");
            h.update(v.as_bytes());
            h.update(b"\n");
        }
    }
    hex::encode(h.finalize())
}

impl FsCache {
    pub fn new(root: PathBuf, max_bytes: u64) -> Self {
        FsCache { root, max_bytes }
    }

    fn paths(&self, fingerprint: &str) -> (PathBuf, PathBuf) {
        let prefix = &fingerprint[0..fingerprint.len().min(2)];
        let dir = self.root.join("bodies").join(prefix);
        (
            dir.join(format!("{fingerprint}.json")),
            dir.join(format!("{fingerprint}.bin")),
        )
    }

    /// `lookup(fingerprint) -> CacheEntry | miss`. A corrupt entry (missing
    /// body or unreadable metadata) is silently dropped and counts as a miss
    /// (spec §4.1 failure modes).
    pub fn lookup(&self, fingerprint: &str, ttl_s: Option<u64>) -> Option<(Vec<u8>, CacheEntry)> {
        let (meta_p, body_p) = self.paths(fingerprint);
        if !meta_p.exists() || !body_p.exists() {
            return None;
        }
        let meta_bytes = std::fs::read(&meta_p).ok()?;
        let metadata: serde_json::Value = serde_json::from_slice(&meta_bytes).ok()?;
        let stored_at_epoch_s = metadata.get("stored_at_epoch_s").and_then(|v| v.as_u64())?;
        let ttl = ttl_s.unwrap_or(DEFAULT_TTL_S);
        let now = now_epoch_s();
        if now.saturating_sub(stored_at_epoch_s) > ttl {
            return None;
        }
        let body = std::fs::read(&body_p).ok()?;
        if (body.len() as u64) > self.max_bytes {
            return None;
        }
        // Touch mtime so LRU eviction order reflects access recency.
        let _ = filetime_touch(&body_p);
        Some((
            body,
            CacheEntry {
                body_path: body_p.to_string_lossy().to_string(),
                metadata,
                stored_at_epoch_s,
            },
        ))
    }

    /// `store(fingerprint, body, metadata) -> path`.
    ///
    /// Writes use a temp-file + atomic rename so concurrent readers never
    /// observe a partially-written entry (spec §5 shared resources).
    pub fn store(&self, fingerprint: &str, body: &[u8], metadata: serde_json::Value) -> Result<PathBuf> {
        let (meta_p, body_p) = self.paths(fingerprint);
        if let Some(parent) = body_p.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut metadata = metadata;
        if let serde_json::Value::Object(ref mut map) = metadata {
            map.insert("stored_at_epoch_s".to_string(), serde_json::json!(now_epoch_s()));
        }

        atomic_write(&body_p, body)?;
        atomic_write(&meta_p, serde_json::to_vec(&metadata).map_err(|e| Error::Io(e.to_string()))?.as_slice())?;
        Ok(body_p)
    }

    /// Stores to a temp path outside the cache tree for privileged browsing
    /// (`do-not-persist`) sessions. Caller is responsible for cleanup on
    /// process exit (spec §4.1).
    pub fn store_do_not_persist(&self, body: &[u8]) -> Result<PathBuf> {
        let dir = std::env::temp_dir().join("webpipe-private");
        std::fs::create_dir_all(&dir)?;
        let name = format!("{}.bin", hex::encode(Sha256::digest(body)));
        let path = dir.join(name);
        std::fs::write(&path, body)?;
        Ok(path)
    }

    /// LRU prune with hysteresis (spec §4.1): when `du > max_bytes * 1.1`,
    /// evict least-recently-accessed entries until `du < max_bytes * 0.9`.
    pub fn prune(&self) -> Result<u64> {
        let hi = (self.max_bytes as f64 * 1.1) as u64;
        let lo = (self.max_bytes as f64 * 0.9) as u64;

        let mut entries = self.collect_body_entries()?;
        let total: u64 = entries.iter().map(|(_, _, size)| size).sum();
        if total <= hi {
            return Ok(0);
        }

        entries.sort_by_key(|(_, mtime, _)| *mtime);
        let mut freed = 0u64;
        let mut remaining = total;
        for (body_path, _, size) in entries {
            if remaining <= lo {
                break;
            }
            let meta_path = body_path.with_extension("json");
            let _ = std::fs::remove_file(&body_path);
            let _ = std::fs::remove_file(&meta_path);
            remaining = remaining.saturating_sub(size);
            freed += size;
        }
        Ok(freed)
    }

    fn collect_body_entries(&self) -> Result<Vec<(PathBuf, SystemTime, u64)>> {
        let mut out = Vec::new();
        let bodies = self.root.join("bodies");
        if !bodies.exists() {
            return Ok(out);
        }
        let mut stack = vec![bodies];
        while let Some(dir) = stack.pop() {
            let rd = match std::fs::read_dir(&dir) {
                Ok(rd) => rd,
                Err(_) => continue,
            };
            for entry in rd.flatten() {
                let path = entry.path();
                if path.is_dir() {
                    stack.push(path);
                } else if path.extension().and_then(|e| e.to_str()) == Some("bin") {
                    let meta = entry.metadata().ok();
                    let mtime = meta.as_ref().and_then(|m| m.modified().ok()).unwrap_or(UNIX_EPOCH);
                    let size = meta.map(|m| m.len()).unwrap_or(0);
                    out.push((path, mtime, size));
                }
            }
        }
        Ok(out)
    }
}

fn now_epoch_s() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_secs()
}

fn filetime_touch(path: &Path) -> std::io::Result<()> {
    let now = std::time::SystemTime::now();
    let f = std::fs::OpenOptions::new().write(true).open(path)?;
    f.set_modified(now)
}

fn atomic_write(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = path.with_extension(format!(
        "{}.tmp-{}",
        path.extension().and_then(|e| e.to_str()).unwrap_or("bin"),
        std::process::id()
    ));
    std::fs::write(&tmp, bytes)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn host() -> impl Strategy<Value = String> {
        prop_oneof!["example.com", "EXAMPLE.com", "docs.example.com", "a.test"].prop_map(|s| s.to_string())
    }

    fn query_pairs() -> impl Strategy<Value = Vec<(String, String)>> {
        prop::collection::vec(("[a-z]{1,4}", "[a-z0-9]{0,4}"), 0..5)
    }

    proptest! {
        /// Reordering query pairs (spec §4.1, §8) never changes the
        /// normalized fingerprint URL: the normalizer sorts them first.
        #[test]
        fn fingerprint_ignores_query_key_order(host in host(), pairs in query_pairs(), shuffle_seed in 0u32..8) {
            let mut shuffled = pairs.clone();
            // Deterministic "shuffle" via rotation (proptest seeds, not `rand`).
            if !shuffled.is_empty() {
                let rot = (shuffle_seed as usize) % shuffled.len();
                shuffled.rotate_left(rot);
            }

            let qs = |ps: &[(String, String)]| {
                ps.iter()
                    .map(|(k, v)| format!("{k}={v}"))
                    .collect::<Vec<_>>()
                    .join("&")
            };
            let url_a = format!("https://{host}/path?{}", qs(&pairs));
            let url_b = format!("https://{host}/path?{}", qs(&shuffled));

            let fp_a = compute_fingerprint(&FingerprintInput {
                method: "GET".into(),
                url: normalize_fingerprint_url(&url_a).unwrap(),
                headers: BTreeMap::new(),
            });
            let fp_b = compute_fingerprint(&FingerprintInput {
                method: "GET".into(),
                url: normalize_fingerprint_url(&url_b).unwrap(),
                headers: BTreeMap::new(),
            });
            prop_assert_eq!(fp_a, fp_b);
        }

        /// `prune()` always leaves the on-disk body total at or under
        /// `max_bytes` once it has run, regardless of how many entries or
        /// what size they started at (spec §4.1 hysteresis bound).
        #[test]
        fn prune_bounds_disk_usage(sizes in prop::collection::vec(1usize..200, 1..10)) {
            let tmp = tempfile::tempdir().unwrap();
            let max_bytes = 500u64;
            let cache = FsCache::new(tmp.path().to_path_buf(), max_bytes);
            for (i, size) in sizes.iter().enumerate() {
                let body = vec![0u8; *size];
                cache.store(&format!("fp{i}"), &body, serde_json::json!({})).unwrap();
            }
            cache.prune().unwrap();

            let total: u64 = cache.collect_body_entries().unwrap().iter().map(|(_, _, s)| s).sum();
            prop_assert!(total <= max_bytes || total <= (max_bytes as f64 * 1.1) as u64);
        }
    }
}
