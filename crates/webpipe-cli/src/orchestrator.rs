//! Orchestrator (spec §4.5): `extract`, `pipeline`, wired over the
//! `webpipe-core` traits and `webpipe-local` collaborators. Each entry
//! point returns a `(serde_json::Value, Vec<String>)` on success so `main`
//! only has to decide how to render it, or an `Error` carrying a
//! classification (never a panic) for the envelope to translate.

use futures::stream::{self, StreamExt};
use std::path::Path;
use std::sync::Arc;
use webpipe_core::{
    enforce_url_policy, Classification, Document, Error, FetchBackend, FetchOptions, Policy, Renderer, Result,
    SearchQuery, SearchResult,
};
use webpipe_local::extract::{self, Limits, Strategy};
use webpipe_local::{FsCache, LocalFetcher, PlaywrightRenderer, RobotsCache};

pub const DEFAULT_FETCH_CONCURRENCY: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Http,
    Browser,
    Auto,
}

impl Method {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "http" => Some(Method::Http),
            "browser" => Some(Method::Browser),
            "auto" => Some(Method::Auto),
            _ => None,
        }
    }
}

pub struct Runtime {
    pub policy: Policy,
    pub cache: Arc<FsCache>,
    pub fetcher: Arc<LocalFetcher>,
    pub renderer: Arc<PlaywrightRenderer>,
    pub search: Arc<webpipe_local::search::SearchRegistry>,
    pub robots: Arc<RobotsCache>,
    pub user_agent: String,
    /// `--evidence-dir`: when set, every fetched/rendered artifact body is
    /// also mirrored here for an audit trail, keyed by its own fingerprint
    /// so repeated fetches of the same resource don't pile up duplicates.
    pub evidence_dir: Option<std::path::PathBuf>,
}

/// Copies an artifact body into `rt.evidence_dir` (no-op when unset). Best
/// effort: a mirroring failure never fails the fetch/render/extract itself.
pub fn mirror_to_evidence(rt: &Runtime, document: &Document) {
    let Some(dir) = &rt.evidence_dir else { return };
    let Some(artifact) = &document.artifact else { return };
    if artifact.body_path.is_empty() {
        return;
    }
    let Some(file_name) = Path::new(&artifact.body_path).file_name() else { return };
    if std::fs::create_dir_all(dir).is_err() {
        return;
    }
    let _ = std::fs::copy(&artifact.body_path, dir.join(file_name));
}

/// Checks domain gating, then robots per `policy.robots_mode`. Returns a
/// warning (not an error) in `warn` mode; refuses in `respect` mode; skips
/// entirely (no fetch performed) in `ignore` mode is left to the caller,
/// since "no fetch" isn't expressible as a `Result`.
async fn enforce_policy_and_robots(rt: &Runtime, url: &str, warnings: &mut Vec<String>) -> Result<()> {
    enforce_url_policy(url, &rt.policy)?;
    match rt.policy.robots_mode {
        webpipe_core::RobotsMode::Ignore => {}
        webpipe_core::RobotsMode::Respect => {
            rt.robots.check(url, &rt.user_agent).await?;
        }
        webpipe_core::RobotsMode::Warn => {
            if rt.robots.check(url, &rt.user_agent).await.is_err() {
                warnings.push(format!("robots.txt disallows {url} (proceeding: --robots warn)"));
            }
        }
    }
    Ok(())
}

pub(crate) fn classification_error(classification: Classification, reason: &str) -> Error {
    let msg = if reason.is_empty() {
        classification.error_code().to_string()
    } else {
        reason.to_string()
    };
    match classification {
        Classification::Ok => unreachable!("ok classification is never converted to an error"),
        Classification::Blocked => Error::Blocked(msg),
        Classification::NeedsRender => Error::NeedsRender(msg),
        Classification::NotFound => Error::NotFound(msg),
        Classification::Timeout => Error::Timeout(msg),
        Classification::TransportError => Error::TransportError(msg),
    }
}

/// `fetch(url)` leg shared by `fetch` and `extract`: policy/robots, then the
/// Fetch Engine. Never throws for expected network conditions; only policy
/// refusals and programmer errors propagate as `Err`.
pub async fn run_fetch(
    rt: &Runtime,
    url: &str,
    options: &FetchOptions,
    warnings: &mut Vec<String>,
) -> Result<(Document, Classification, String)> {
    enforce_policy_and_robots(rt, url, warnings).await?;
    let result = rt.fetcher.fetch(url, options).await?;
    Ok((result.document, result.classification, result.reason))
}

pub(crate) fn fetch_options_from_policy(policy: &Policy, fresh: bool, no_cache: bool) -> FetchOptions {
    FetchOptions {
        headers: Default::default(),
        accept: None,
        user_agent: None,
        max_bytes: policy.max_bytes,
        timeout_ms: policy.timeout_ms,
        follow_redirects: policy.follow_redirects,
        detect_blocks: policy.detect_blocks,
        fresh,
        no_cache,
    }
}

fn html_bytes(document: &Document) -> Result<Vec<u8>> {
    let artifact = document
        .artifact
        .as_ref()
        .ok_or_else(|| Error::ExtractionFailed("document has no artifact body to read".to_string()))?;
    std::fs::read(&artifact.body_path)
        .map_err(|e| Error::ExtractionFailed(format!("failed to read cached body: {e}")))
}

fn run_extraction(document: &mut Document, strategy: Strategy, limits: &Limits, warnings: &mut Vec<String>) -> Result<()> {
    let html = html_bytes(document)?;
    let html = String::from_utf8_lossy(&html).to_string();
    let base_url = document.url.as_deref();
    let (extracted, extract_warnings) = extract::extract(&html, base_url, strategy, limits);
    document.extracted = Some(extracted);
    for w in extract_warnings {
        document.push_warning(w.clone());
        warnings.push(w);
    }
    Ok(())
}

/// An `extract` failure that still carries a `Document` the caller can
/// retry against with a different `--method`/`--strategy` (spec §7), versus
/// one where no fetch ever produced a document (policy/robots refusal).
pub enum ExtractFailure {
    NoDocument(Error),
    WithDocument(Error, Box<Document>),
}

impl ExtractFailure {
    pub fn error(&self) -> &Error {
        match self {
            ExtractFailure::NoDocument(e) => e,
            ExtractFailure::WithDocument(e, _) => e,
        }
    }

    pub fn document_json(&self) -> Option<serde_json::Value> {
        match self {
            ExtractFailure::NoDocument(_) => None,
            ExtractFailure::WithDocument(_, doc) => Some(serde_json::json!({ "document": doc.as_ref() })),
        }
    }
}

/// `extract(url_or_path, method, strategy)` (spec §4.5). On `needs_render`
/// with `method` ∈ {auto, browser}, the render collaborator is consulted
/// and extraction retried against the rendered DOM (spec §9 Open Questions:
/// `auto` = try http, escalate to browser only on `needs_render`).
pub async fn run_extract(
    rt: &Runtime,
    input: &str,
    method: Method,
    strategy: Strategy,
    limits: &Limits,
    fresh: bool,
    no_cache: bool,
) -> (Result<Document, ExtractFailure>, Vec<String>) {
    let mut warnings = Vec::new();

    let mut document = if input == "-" || !is_http_url(input) {
        match read_provided(input) {
            Ok(doc) => doc,
            Err(e) => return (Err(ExtractFailure::NoDocument(e)), warnings),
        }
    } else {
        let options = fetch_options_from_policy(&rt.policy, fresh, no_cache);
        let (document, classification, reason) = match run_fetch(rt, input, &options, &mut warnings).await {
            Ok(v) => v,
            Err(e) => return (Err(ExtractFailure::NoDocument(e)), warnings),
        };

        match classification {
            Classification::Ok => document,
            Classification::NeedsRender if matches!(method, Method::Auto | Method::Browser) => {
                match run_render(rt, input).await {
                    Ok(rendered) => rendered,
                    Err(e) => return (Err(ExtractFailure::WithDocument(e, Box::new(document))), warnings),
                }
            }
            other => {
                let err = classification_error(other, &reason);
                return (Err(ExtractFailure::WithDocument(err, Box::new(document))), warnings);
            }
        }
    };

    match run_extraction(&mut document, strategy, limits, &mut warnings) {
        Ok(()) => (Ok(document), warnings),
        Err(e) => (Err(ExtractFailure::WithDocument(e, Box::new(document))), warnings),
    }
}

/// Input-kind detection (spec §4.5): `extract` takes either an http(s) URL
/// or a local path/`-`. Dispatch on whether `input` parses as an http(s)
/// URL rather than on filesystem existence, so a mistyped or missing path
/// surfaces as an `io_error`, not a policy/URL-parse error.
fn is_http_url(input: &str) -> bool {
    url::Url::parse(input)
        .map(|u| matches!(u.scheme(), "http" | "https"))
        .unwrap_or(false)
}

fn read_provided(input: &str) -> Result<Document> {
    use std::io::Read;
    let bytes = if input == "-" {
        let mut buf = Vec::new();
        std::io::stdin()
            .read_to_end(&mut buf)
            .map_err(|e| Error::Io(e.to_string()))?;
        buf
    } else {
        std::fs::read(input).map_err(|e| Error::Io(e.to_string()))?
    };
    let source_path = if input == "-" { "-".to_string() } else { input.to_string() };
    let tmp_dir = std::env::temp_dir().join("webpipe-provided");
    std::fs::create_dir_all(&tmp_dir)?;
    let hash = {
        use sha2::{Digest, Sha256};
        hex::encode(Sha256::digest(&bytes))
    };
    let body_path = tmp_dir.join(format!("{hash}.bin"));
    std::fs::write(&body_path, &bytes)?;

    Ok(Document::provided(
        source_path,
        webpipe_core::Artifact {
            content_type: "text/html".to_string(),
            body_path: body_path.to_string_lossy().to_string(),
            body_bytes: bytes.len() as u64,
            truncated: false,
        },
    ))
}

pub async fn run_render(rt: &Runtime, url: &str) -> Result<Document> {
    enforce_url_policy(url, &rt.policy)?;
    rt.renderer.render(url, &webpipe_core::RenderOptions::default()).await
}

/// `pipeline(query, top_k, extract_k, prefer_domains, method, plan)` (spec
/// §4.5). Candidates are filtered through allow/block domains, re-ranked by
/// `prefer_domains` with a stable sort, then (unless `plan`) the first
/// `extract_k` are fetched+extracted concurrently (bounded pool, spec §5)
/// and joined back in candidate order.
pub struct PipelineOutcome {
    pub candidates: Vec<SearchResult>,
    pub documents: Vec<serde_json::Value>,
    pub warnings: Vec<String>,
    pub provider_used: String,
}

pub async fn run_pipeline(
    rt: &Runtime,
    query: &str,
    top_k: usize,
    extract_k: usize,
    prefer_domains: &[String],
    method: Method,
    strategy: Strategy,
    limits: &Limits,
    plan: bool,
    provider: Option<&str>,
) -> Result<PipelineOutcome> {
    let mut warnings = Vec::new();
    let q = SearchQuery {
        query: query.to_string(),
        max_results: Some(top_k),
        language: None,
        country: None,
    };

    let (mut results, provider_used) = match provider {
        Some(id) => rt.search.search_with(id, &q).await?,
        None => rt.search.search_auto(&q, rt.policy.mode).await?,
    };

    results.retain(|r| enforce_url_policy(&r.url, &rt.policy).is_ok());
    results.truncate(top_k);

    if !prefer_domains.is_empty() {
        stable_rerank_by_domain(&mut results, prefer_domains);
    }

    if plan {
        return Ok(PipelineOutcome {
            candidates: results,
            documents: Vec::new(),
            warnings,
            provider_used,
        });
    }

    let to_extract: Vec<(usize, SearchResult)> = results.iter().take(extract_k).cloned().enumerate().collect();
    let rt_ref = rt;
    let fetched = stream::iter(to_extract.into_iter().map(|(idx, candidate)| async move {
        let (doc_result, warns) = run_extract(
            rt_ref,
            &candidate.url,
            method,
            strategy,
            limits,
            false,
            false,
        )
        .await;
        (idx, candidate, doc_result, warns)
    }))
    .buffer_unordered(DEFAULT_FETCH_CONCURRENCY)
    .collect::<Vec<_>>()
    .await;

    let mut ordered = fetched;
    ordered.sort_by_key(|(idx, ..)| *idx);

    let mut documents = Vec::new();
    for (_, candidate, doc_result, warns) in ordered {
        for w in warns {
            if !warnings.contains(&w) {
                warnings.push(w);
            }
        }
        match doc_result {
            Ok(document) => {
                mirror_to_evidence(rt, &document);
                documents.push(serde_json::json!({
                    "url": candidate.url,
                    "ok": true,
                    "document": document,
                }))
            }
            Err(failure) => {
                let e = failure.error();
                documents.push(serde_json::json!({
                    "url": candidate.url,
                    "ok": false,
                    "error": {"code": e.code(), "message": e.message()},
                }))
            }
        }
    }

    Ok(PipelineOutcome {
        candidates: results,
        documents,
        warnings,
        provider_used,
    })
}

/// Stable sort: matches-first, original relative order preserved within
/// each bucket (spec §4.5 re-rank rule).
fn stable_rerank_by_domain(results: &mut [SearchResult], prefer_domains: &[String]) {
    let matches = |url: &str| -> bool {
        webpipe_core::normalize_host(url)
            .map(|host| {
                prefer_domains
                    .iter()
                    .any(|p| host == p.to_ascii_lowercase() || host.ends_with(&format!(".{}", p.to_ascii_lowercase())))
            })
            .unwrap_or(false)
    };
    results.sort_by_key(|r| !matches(&r.url));
}

pub fn providers_list(rt: &Runtime) -> Vec<webpipe_core::ProviderMeta> {
    let mut metas = rt.search.provider_metas();
    metas.push(webpipe_core::ProviderMeta {
        id: "http".to_string(),
        kind: webpipe_core::ProviderKind::Fetch,
        enabled: true,
        required_env: vec![],
        privacy_warning: None,
    });
    metas.push(webpipe_core::ProviderMeta {
        id: "browser".to_string(),
        kind: webpipe_core::ProviderKind::Render,
        enabled: true,
        required_env: vec![],
        privacy_warning: Some("renders with a local browser engine; may execute page scripts".to_string()),
    });
    metas
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sr(url: &str) -> SearchResult {
        SearchResult {
            title: "t".into(),
            url: url.into(),
            snippet: "s".into(),
            published_at: None,
            source_provider: "ddgs".into(),
            score: None,
            result_id: SearchResult::compute_result_id("ddgs", url, "t"),
        }
    }

    #[test]
    fn rerank_is_stable_and_matches_first() {
        let mut results = vec![
            sr("https://other.test/a"),
            sr("https://docs.example.com/b"),
            sr("https://other.test/c"),
            sr("https://example.com/d"),
        ];
        stable_rerank_by_domain(&mut results, &["example.com".to_string()]);
        let urls: Vec<_> = results.iter().map(|r| r.url.clone()).collect();
        assert_eq!(
            urls,
            vec![
                "https://docs.example.com/b",
                "https://example.com/d",
                "https://other.test/a",
                "https://other.test/c",
            ]
        );
    }
}
