//! `LocalFetcher`: the `reqwest`-backed `FetchBackend` (spec §4.2).
//!
//! Cache lookup/store is folded into `fetch()` rather than left to the
//! caller — the spec's own data-flow diagram puts Cache directly in front
//! of the Fetch Engine, and the teacher's original `LocalFetcher` already
//! paired a cache with the transport for exactly this reason.

use crate::cache::{compute_fingerprint, normalize_fingerprint_url, FsCache};
use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use webpipe_core::{
    Artifact, Classification, Document, Error, FetchBackend, FetchMethod, FetchOptions, FetchResult,
    HttpMeta, Result,
};

const MAX_REDIRECTS: usize = 10;
const SELECTED_RESPONSE_HEADERS: [&str; 5] =
    ["content-type", "content-length", "date", "last-modified", "etag"];

static BLOCK_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        Regex::new(r"(?i)enable javascript").unwrap(),
        Regex::new(r"(?i)checking your browser").unwrap(),
        Regex::new(r"(?i)verify you are human").unwrap(),
        Regex::new(r"(?is)<noscript>[^<]{0,200}required").unwrap(),
    ]
});

static CONSENT_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        Regex::new(r"(?i)we use cookies").unwrap(),
        Regex::new(r"(?i)accept (all )?cookies").unwrap(),
        Regex::new(r"(?i)cookie (consent|preferences)").unwrap(),
    ]
});

static SCRIPT_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<script").unwrap());
static VISIBLE_TEXT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)>([^<]{20,})<").unwrap());
static FORM_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<form").unwrap());
static HTML_SIGNATURE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<!doctype html|<html").unwrap());

pub struct LocalFetcher {
    client: reqwest::Client,
    cache: Arc<FsCache>,
    default_cache_ttl_s: u64,
}

impl LocalFetcher {
    /// Redirects are followed manually in `fetch()` rather than via
    /// `reqwest`'s client-level policy: the policy closure is shared across
    /// every request on the client, so there is no way to recover a
    /// *per-request* redirect chain from it for concurrent fetches. The
    /// client itself never follows redirects.
    pub fn new(cache: Arc<FsCache>, default_cache_ttl_s: u64, proxy: Option<String>) -> Result<Self> {
        let mut builder = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .gzip(true)
            .brotli(true)
            .deflate(true);
        if let Some(p) = proxy {
            let proxy = reqwest::Proxy::all(&p).map_err(|e| Error::InvalidUsage(format!("invalid proxy: {e}")))?;
            builder = builder.proxy(proxy);
        }
        let client = builder
            .build()
            .map_err(|e| Error::Internal(format!("failed to build http client: {e}")))?;

        Ok(LocalFetcher {
            client,
            cache,
            default_cache_ttl_s,
        })
    }
}

/// Content-type sniffing (spec §4.2): PDF magic, leading JSON, and HTML
/// signature promotion from absent/octet-stream/text-plain.
fn sniff_content_type(declared: Option<&str>, head: &[u8]) -> String {
    if head.starts_with(b"%PDF-") {
        return "application/pdf".to_string();
    }
    let declared = declared.unwrap_or("").to_ascii_lowercase();
    let ambiguous = declared.is_empty() || declared.starts_with("application/octet-stream") || declared.starts_with("text/plain");
    if !ambiguous {
        return declared;
    }
    let head_str = String::from_utf8_lossy(&head[..head.len().min(1024)]);
    if HTML_SIGNATURE.is_match(&head_str) {
        return "text/html".to_string();
    }
    let trimmed = head_str.trim_start();
    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        return "application/json".to_string();
    }
    if declared.is_empty() {
        "application/octet-stream".to_string()
    } else {
        declared
    }
}

/// Block/JS-only/consent-wall classification ladder (spec §4.2), first match wins.
fn classify(status: u16, body: &[u8], content_type: &str, detect_blocks: bool) -> (Classification, String) {
    if matches!(status, 401 | 403 | 429) {
        return (Classification::Blocked, format!("http_{status}"));
    }
    if status == 404 {
        return (Classification::NotFound, "http_404".to_string());
    }
    if (500..600).contains(&status) {
        return (Classification::TransportError, format!("http_{status}"));
    }
    if !(200..300).contains(&status) {
        return (Classification::TransportError, format!("http_{status}"));
    }
    if !detect_blocks || !content_type.starts_with("text/html") {
        return (Classification::Ok, String::new());
    }

    let text = String::from_utf8_lossy(body);
    if BLOCK_PATTERNS.iter().any(|re| re.is_match(&text)) {
        return (Classification::NeedsRender, "js_challenge_text".to_string());
    }
    if body.len() < 2048 && SCRIPT_TAG.is_match(&text) && !VISIBLE_TEXT.is_match(&text) {
        return (Classification::NeedsRender, "tiny_body_with_script".to_string());
    }
    if CONSENT_PATTERNS.iter().any(|re| re.is_match(&text)) && FORM_TAG.is_match(&text) {
        return (Classification::Blocked, "consent_wall".to_string());
    }
    (Classification::Ok, String::new())
}

#[async_trait::async_trait]
impl FetchBackend for LocalFetcher {
    async fn fetch(&self, url: &str, options: &FetchOptions) -> Result<FetchResult> {
        options.validate_headers()?;
        let parsed = url::Url::parse(url).map_err(|e| Error::InvalidUsage(format!("invalid url: {e}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(Error::InvalidUsage(format!(
                "unsupported scheme '{}': only http/https are fetchable",
                parsed.scheme()
            )));
        }

        let normalized_url = normalize_fingerprint_url(url)?;
        let mut fp_headers = BTreeMap::new();
        if let Some(a) = &options.accept {
            fp_headers.insert("accept".to_string(), a.clone());
        }
        if let Some(ua) = &options.user_agent {
            fp_headers.insert("user-agent".to_string(), ua.clone());
        }
        let fingerprint = compute_fingerprint(&webpipe_core::FingerprintInput {
            method: "GET".to_string(),
            url: normalized_url.clone(),
            headers: fp_headers,
        });

        if !options.fresh && !options.no_cache {
            if let Some((body, entry)) = self.cache.lookup(&fingerprint, Some(self.default_cache_ttl_s)) {
                let document = self.document_from_cached(url, &body, &entry.metadata, &entry.body_path)?;
                let (classification, reason) = classify_from_metadata(&entry.metadata, &body, options.detect_blocks);
                return Ok(FetchResult::classified(document, classification, reason));
            }
        }

        let mut redirect_chain: Vec<String> = Vec::new();
        let mut current_url = url::Url::parse(url).map_err(|e| Error::InvalidUsage(format!("invalid url: {e}")))?;
        let response = loop {
            let mut req = self
                .client
                .get(current_url.clone())
                .timeout(Duration::from_millis(options.timeout_ms));
            for (k, v) in &options.headers {
                req = req.header(k, v);
            }
            if let Some(accept) = &options.accept {
                req = req.header(reqwest::header::ACCEPT, accept);
            }
            if let Some(ua) = &options.user_agent {
                req = req.header(reqwest::header::USER_AGENT, ua);
            }

            let resp = match req.send().await {
                Ok(r) => r,
                Err(e) if e.is_timeout() => {
                    let doc = self.bare_document(url);
                    return Ok(FetchResult::classified(doc, Classification::Timeout, e.to_string()));
                }
                Err(e) => {
                    let doc = self.bare_document(url);
                    return Ok(FetchResult::classified(doc, Classification::TransportError, e.to_string()));
                }
            };

            let is_redirect = matches!(resp.status().as_u16(), 301 | 302 | 303 | 307 | 308);
            if !options.follow_redirects || !is_redirect || redirect_chain.len() >= MAX_REDIRECTS {
                break resp;
            }
            let location = match resp.headers().get(reqwest::header::LOCATION).and_then(|v| v.to_str().ok()) {
                Some(loc) => loc.to_string(),
                None => break resp,
            };
            let next_url = match current_url.join(&location) {
                Ok(u) => u,
                Err(_) => break resp,
            };
            redirect_chain.push(current_url.to_string());
            current_url = next_url;
        };

        let status = response.status().as_u16();
        let final_url = response.url().to_string();
        let mut selected_headers = BTreeMap::new();
        for name in SELECTED_RESPONSE_HEADERS {
            if let Some(v) = response.headers().get(name).and_then(|v| v.to_str().ok()) {
                selected_headers.insert(name.to_string(), v.to_string());
            }
        }
        let declared_content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());

        let (body, truncated) = match read_body_capped(response, options.max_bytes).await {
            Ok(v) => v,
            Err(e) => {
                let doc = self.bare_document(url);
                return Ok(FetchResult::classified(doc, Classification::TransportError, e.to_string()));
            }
        };

        let content_type = sniff_content_type(declared_content_type.as_deref(), &body);
        let (classification, reason) = classify(status, &body, &content_type, options.detect_blocks);

        let body_path = if !options.no_cache {
            let metadata = serde_json::json!({
                "status": status,
                "final_url": final_url,
                "redirect_chain": redirect_chain.clone(),
                "selected_headers": selected_headers,
                "content_type": content_type,
                "truncated": truncated,
                "classification": classification.error_code(),
                "reason": reason,
            });
            self.cache
                .store(&fingerprint, &body, metadata)?
                .to_string_lossy()
                .to_string()
        } else {
            self.cache.store_do_not_persist(&body)?.to_string_lossy().to_string()
        };

        let document = Document {
            url: Some(url.to_string()),
            source_path: None,
            fetched_at: Utc::now(),
            fetch_method: FetchMethod::Http,
            http: Some(HttpMeta {
                status,
                final_url,
                redirect_chain: redirect_chain.clone(),
                selected_headers,
                bytes_read: body.len() as u64,
            }),
            artifact: Some(Artifact {
                content_type,
                body_path,
                body_bytes: body.len() as u64,
                truncated,
            }),
            render: None,
            extracted: None,
            warnings: Vec::new(),
        };

        Ok(FetchResult::classified(document, classification, reason))
    }
}

impl LocalFetcher {
    fn bare_document(&self, url: &str) -> Document {
        Document {
            url: Some(url.to_string()),
            source_path: None,
            fetched_at: Utc::now(),
            fetch_method: FetchMethod::Http,
            http: None,
            artifact: None,
            render: None,
            extracted: None,
            warnings: Vec::new(),
        }
    }

    fn document_from_cached(&self, url: &str, body: &[u8], metadata: &serde_json::Value, body_path: &str) -> Result<Document> {
        let status = metadata.get("status").and_then(|v| v.as_u64()).unwrap_or(200) as u16;
        let final_url = metadata
            .get("final_url")
            .and_then(|v| v.as_str())
            .unwrap_or(url)
            .to_string();
        let redirect_chain = metadata
            .get("redirect_chain")
            .and_then(|v| v.as_array())
            .map(|a| a.iter().filter_map(|v| v.as_str().map(String::from)).collect())
            .unwrap_or_default();
        let selected_headers = metadata
            .get("selected_headers")
            .and_then(|v| v.as_object())
            .map(|m| {
                m.iter()
                    .filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string())))
                    .collect()
            })
            .unwrap_or_default();
        let content_type = metadata
            .get("content_type")
            .and_then(|v| v.as_str())
            .unwrap_or("application/octet-stream")
            .to_string();
        let truncated = metadata.get("truncated").and_then(|v| v.as_bool()).unwrap_or(false);

        Ok(Document {
            url: Some(url.to_string()),
            source_path: None,
            fetched_at: Utc::now(),
            fetch_method: FetchMethod::Http,
            http: Some(HttpMeta {
                status,
                final_url,
                redirect_chain,
                selected_headers,
                bytes_read: body.len() as u64,
            }),
            artifact: Some(Artifact {
                content_type,
                body_path: body_path.to_string(),
                body_bytes: body.len() as u64,
                truncated,
            }),
            render: None,
            extracted: None,
            warnings: Vec::new(),
        })
    }
}

fn classify_from_metadata(metadata: &serde_json::Value, body: &[u8], detect_blocks: bool) -> (Classification, String) {
    let status = metadata.get("status").and_then(|v| v.as_u64()).unwrap_or(200) as u16;
    let content_type = metadata
        .get("content_type")
        .and_then(|v| v.as_str())
        .unwrap_or("application/octet-stream");
    classify(status, body, content_type, detect_blocks)
}

async fn read_body_capped(response: reqwest::Response, max_bytes: u64) -> std::result::Result<(Vec<u8>, bool), reqwest::Error> {
    use futures_util::StreamExt;
    let mut stream = response.bytes_stream();
    let mut buf = Vec::new();
    let mut truncated = false;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        if (buf.len() as u64) + (chunk.len() as u64) > max_bytes {
            let remaining = max_bytes.saturating_sub(buf.len() as u64) as usize;
            buf.extend_from_slice(&chunk[..remaining.min(chunk.len())]);
            truncated = true;
            break;
        }
        buf.extend_from_slice(&chunk);
    }
    Ok((buf, truncated))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_maps_block_status_codes() {
        let (c, reason) = classify(403, b"", "text/html", true);
        assert_eq!(c, Classification::Blocked);
        assert_eq!(reason, "http_403");

        let (c, _) = classify(429, b"", "text/html", true);
        assert_eq!(c, Classification::Blocked);

        let (c, _) = classify(404, b"", "text/html", true);
        assert_eq!(c, Classification::NotFound);

        let (c, _) = classify(503, b"", "text/html", true);
        assert_eq!(c, Classification::TransportError);
    }

    #[test]
    fn classify_detects_js_challenge_text() {
        let body = b"<html><body>Please enable javascript to continue</body></html>";
        let (c, reason) = classify(200, body, "text/html", true);
        assert_eq!(c, Classification::NeedsRender);
        assert_eq!(reason, "js_challenge_text");
    }

    #[test]
    fn classify_detects_tiny_body_with_script_and_no_text() {
        let body = b"<html><head><script>window.location='/x'</script></head><body></body></html>";
        let (c, reason) = classify(200, body, "text/html", true);
        assert_eq!(c, Classification::NeedsRender);
        assert_eq!(reason, "tiny_body_with_script");
    }

    #[test]
    fn classify_detects_consent_wall() {
        let body = b"<html><body>We use cookies to improve your experience.<form><button>Accept all cookies</button></form></body></html>";
        let (c, reason) = classify(200, body, "text/html", true);
        assert_eq!(c, Classification::Blocked);
        assert_eq!(reason, "consent_wall");
    }

    #[test]
    fn classify_no_detect_blocks_is_status_only() {
        let body = b"<html><body>Please enable javascript to continue</body></html>";
        let (c, _) = classify(200, body, "text/html", false);
        assert_eq!(c, Classification::Ok);
    }

    #[test]
    fn sniff_promotes_html_signature_when_declared_type_is_ambiguous() {
        let ct = sniff_content_type(Some("text/plain"), b"<!DOCTYPE html><html></html>");
        assert_eq!(ct, "text/html");
    }

    #[test]
    fn sniff_detects_pdf_magic() {
        let ct = sniff_content_type(None, b"%PDF-1.4 rest of file");
        assert_eq!(ct, "application/pdf");
    }

    #[test]
    fn sniff_detects_json_when_declared_text_plain() {
        let ct = sniff_content_type(Some("text/plain"), b"  {\"a\":1}");
        assert_eq!(ct, "application/json");
    }

    #[test]
    fn sniff_leaves_unambiguous_declared_type_alone() {
        let ct = sniff_content_type(Some("image/png"), b"\x89PNG....");
        assert_eq!(ct, "image/png");
    }
}
