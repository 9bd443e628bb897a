//! `Renderer` adapter (spec §1): shells out to Node + Playwright. This is
//! the one genuinely opaque collaborator — the core only ever calls
//! `render(url, options) -> Document`; the engine behind it is
//! replaceable.

use chrono::Utc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use webpipe_core::{
    Artifact, Document, Error, FetchMethod, RenderMeta, RenderOptions, Renderer, Result, WaitStrategy,
};

use crate::cache::FsCache;
use std::sync::Arc;

const RENDER_JS: &str = r#"
const fs = require('fs');
function ok(obj) { process.stdout.write(JSON.stringify(obj)); }
function bad(message) { ok({ ok: false, error: message }); }

async function main() {
  let arg = '';
  try { arg = fs.readFileSync(0, 'utf8'); } catch (_) {}
  let req;
  try { req = JSON.parse(arg); } catch (e) { return bad('bad JSON args'); }

  let pw;
  try { pw = require('playwright'); } catch (e) {
    return bad('Playwright is not installed for Node.js');
  }

  const url = String(req.url || '').trim();
  if (!url) return bad('url must be non-empty');
  const timeoutMs = Number(req.timeout_ms || 20000);
  const waitUntil = String(req.wait_until || 'networkidle');

  const t0 = Date.now();
  let browser;
  try {
    browser = await pw.chromium.launch({ headless: true });
    const context = await browser.newContext();
    const page = await context.newPage();
    const resp = await page.goto(url, { waitUntil, timeout: timeoutMs });
    const html = await page.content();
    const finalUrl = page.url();
    const status = resp ? resp.status() : null;
    ok({ ok: true, final_url: finalUrl, status, html, elapsed_ms: Date.now() - t0 });
  } catch (e) {
    bad(String(e && e.message ? e.message : e));
  } finally {
    try { if (browser) await browser.close(); } catch (_) {}
  }
}

main().catch((e) => bad(String(e && e.message ? e.message : e)));
"#;

#[derive(serde::Deserialize)]
struct RenderScriptOutput {
    ok: bool,
    #[serde(default)]
    final_url: Option<String>,
    #[serde(default)]
    status: Option<u16>,
    #[serde(default)]
    html: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

fn wait_until_str(strategy: WaitStrategy) -> &'static str {
    match strategy {
        WaitStrategy::Load => "load",
        WaitStrategy::NetworkIdle => "networkidle",
        WaitStrategy::DomContentLoaded => "domcontentloaded",
    }
}

pub struct PlaywrightRenderer {
    cache: Arc<FsCache>,
    node_bin: String,
}

impl PlaywrightRenderer {
    pub fn new(cache: Arc<FsCache>) -> Self {
        let node_bin = std::env::var("WEBPIPE_NODE").unwrap_or_else(|_| "node".to_string());
        PlaywrightRenderer { cache, node_bin }
    }

    /// `do-not-persist` (spec §4.1): rendered pages using a real browser
    /// profile must never land in the shared response cache.
    fn persist_html(&self, html: &[u8], privileged: bool) -> Result<String> {
        if privileged {
            Ok(self.cache.store_do_not_persist(html)?.to_string_lossy().to_string())
        } else {
            let fingerprint = hex::encode(<sha2::Sha256 as sha2::Digest>::digest(html));
            Ok(self
                .cache
                .store(&fingerprint, html, serde_json::json!({"rendered": true}))?
                .to_string_lossy()
                .to_string())
        }
    }
}

#[async_trait::async_trait]
impl Renderer for PlaywrightRenderer {
    async fn render(&self, url: &str, options: &RenderOptions) -> Result<Document> {
        let parsed = url::Url::parse(url).map_err(|e| Error::InvalidUsage(format!("invalid url: {e}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(Error::InvalidUsage(format!(
                "unsupported scheme '{}': only http/https are renderable",
                parsed.scheme()
            )));
        }

        let args = serde_json::json!({
            "url": url,
            "timeout_ms": options.timeout_ms,
            "wait_until": wait_until_str(options.wait_strategy),
        })
        .to_string();

        let mut cmd = tokio::process::Command::new(&self.node_bin);
        let mut child = cmd
            .arg("-e")
            .arg(RENDER_JS)
            .kill_on_drop(true)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .spawn()
            .map_err(|e| {
                Error::Internal(format!(
                    "render requires Node.js (`node`) and the Playwright npm package: {e}"
                ))
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            let _ = stdin.write_all(args.as_bytes()).await;
            let _ = stdin.shutdown().await;
        }

        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Internal("render: missing stdout pipe".to_string()))?;
        let hard_timeout = Duration::from_millis(options.timeout_ms.saturating_add(10_000));

        let stdout_task = tokio::spawn(async move {
            let mut buf = Vec::new();
            let _ = stdout.read_to_end(&mut buf).await;
            buf
        });

        match tokio::time::timeout(hard_timeout, child.wait()).await {
            Ok(r) => {
                r.map_err(|e| Error::Internal(format!("render process wait failed: {e}")))?;
            }
            Err(_) => {
                let _ = child.kill().await;
                let _ = child.wait().await;
                stdout_task.abort();
                return Err(Error::Timeout(format!(
                    "render hard timeout after {}ms",
                    hard_timeout.as_millis()
                )));
            }
        }

        let stdout_bytes = stdout_task.await.unwrap_or_default();
        let parsed: RenderScriptOutput = serde_json::from_slice(&stdout_bytes)
            .map_err(|e| Error::Internal(format!("render script produced unparseable output: {e}")))?;

        if !parsed.ok {
            return Err(Error::TransportError(
                parsed.error.unwrap_or_else(|| "render failed".to_string()),
            ));
        }

        let html = parsed.html.unwrap_or_default();
        let body_path = self.persist_html(html.as_bytes(), false)?;

        Ok(Document {
            url: Some(url.to_string()),
            source_path: None,
            fetched_at: Utc::now(),
            fetch_method: FetchMethod::Browser,
            http: Some(webpipe_core::HttpMeta {
                status: parsed.status.unwrap_or(200),
                final_url: parsed.final_url.unwrap_or_else(|| url.to_string()),
                redirect_chain: Vec::new(),
                selected_headers: Default::default(),
                bytes_read: html.len() as u64,
            }),
            artifact: Some(Artifact {
                content_type: "text/html".to_string(),
                body_path,
                body_bytes: html.len() as u64,
                truncated: false,
            }),
            render: Some(RenderMeta {
                screenshot_path: None,
                dom_snapshot_id: None,
                wait_strategy_used: wait_until_str(options.wait_strategy).to_string(),
            }),
            extracted: None,
            warnings: Vec::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wait_until_str_maps_every_variant() {
        assert_eq!(wait_until_str(WaitStrategy::Load), "load");
        assert_eq!(wait_until_str(WaitStrategy::NetworkIdle), "networkidle");
        assert_eq!(wait_until_str(WaitStrategy::DomContentLoaded), "domcontentloaded");
    }

    #[test]
    fn render_script_output_parses_success_shape() {
        let js = r#"{"ok":true,"final_url":"https://example.com/","status":200,"html":"<html></html>","elapsed_ms":10}"#;
        let parsed: RenderScriptOutput = serde_json::from_str(js).unwrap();
        assert!(parsed.ok);
        assert_eq!(parsed.status, Some(200));
    }

    #[test]
    fn render_script_output_parses_failure_shape() {
        let js = r#"{"ok":false,"error":"Playwright is not installed"}"#;
        let parsed: RenderScriptOutput = serde_json::from_str(js).unwrap();
        assert!(!parsed.ok);
        assert_eq!(parsed.error.as_deref(), Some("Playwright is not installed"));
    }
}
