//! `webpipe` binary: a portable search/fetch/render/extract CLI for
//! web-retrieval agents, wired over `webpipe-core`'s traits and
//! `webpipe-local`'s concrete collaborators.

mod config;
mod envelope;
mod eval;
mod orchestrator;

use std::sync::Arc;
use std::time::Instant;

use clap::{Parser, Subcommand};
use webpipe_core::CacheMeta;
use webpipe_local::extract::{Limits, Strategy};
use webpipe_local::search::SearchRegistry;
use webpipe_local::{FsCache, LocalFetcher, PlaywrightRenderer, RobotsCache};

use config::PolicyOverrides;
use envelope::{Outcome, OutputMode};
use orchestrator::{classification_error, mirror_to_evidence, run_extract, run_fetch, run_pipeline, run_render, Method, Runtime};

#[derive(Parser)]
#[command(name = "webpipe", version, about = "Search, fetch, render, and extract the web for agent pipelines.")]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,
    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Args, Clone)]
struct GlobalArgs {
    /// Emit the JSON envelope (default output mode).
    #[arg(long, global = true)]
    json: bool,
    /// Emit a pretty-printed JSON envelope.
    #[arg(long, global = true)]
    pretty: bool,
    /// Emit one semantic value per line instead of an envelope.
    #[arg(long, global = true)]
    plain: bool,
    /// Suppress warning/error diagnostics on stderr.
    #[arg(long, global = true)]
    quiet: bool,
    /// Raise log verbosity (stacks: -v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    /// Disable ANSI color in diagnostics.
    #[arg(long, global = true)]
    no_color: bool,
    /// Forbid any interactive prompt; consult only flags/env/config.
    #[arg(long, global = true)]
    no_input: bool,
    /// Per-request timeout in seconds.
    #[arg(long, global = true)]
    timeout: Option<f64>,
    /// HTTP/HTTPS proxy URL.
    #[arg(long, global = true)]
    proxy: Option<String>,
    /// Override the cache directory.
    #[arg(long, global = true)]
    cache_dir: Option<String>,
    /// Bypass the cache entirely for this invocation (no read, no write).
    #[arg(long, global = true)]
    no_cache: bool,
    /// Ignore any cached entry and force a live fetch (still writes through).
    #[arg(long, global = true)]
    fresh: bool,
    /// Cache size budget in megabytes.
    #[arg(long, global = true)]
    cache_max_mb: Option<u64>,
    /// Cache TTL, in seconds.
    #[arg(long, global = true)]
    cache_ttl: Option<u64>,
    /// Directory to mirror raw response bodies into for audit/evidence trails.
    #[arg(long, global = true)]
    evidence_dir: Option<String>,
    /// Redact secret-shaped values from error details.
    #[arg(long, global = true)]
    redact: bool,
    /// Skip the block/JS-challenge heuristics; classify by HTTP status alone.
    #[arg(long, global = true)]
    no_detect_blocks: bool,
    /// Never follow HTTP redirects; return the first response as-is.
    #[arg(long, global = true)]
    no_follow_redirects: bool,
    /// robots.txt handling: warn|respect|ignore.
    #[arg(long, global = true)]
    robots: Option<String>,
    /// Allow only these domains (repeatable).
    #[arg(long = "allow-domain", global = true)]
    allow_domain: Vec<String>,
    /// Block these domains (repeatable).
    #[arg(long = "block-domain", global = true)]
    block_domain: Vec<String>,
    /// Policy mode: standard|strict|permissive.
    #[arg(long, global = true)]
    policy: Option<String>,
}

#[derive(Subcommand)]
enum Command {
    /// List registered search/fetch/render providers and their availability.
    Providers,
    /// Search the web for a query.
    Search {
        query: String,
        #[arg(short = 'n', long, default_value_t = 10)]
        max_results: usize,
        #[arg(long)]
        provider: Option<String>,
    },
    /// Fetch a single URL through the cache-backed HTTP engine.
    Fetch {
        url: String,
        #[arg(long, default_value = "http")]
        method: String,
    },
    /// Render a URL with a headless browser.
    Render { url: String },
    /// Extract structured content from a URL, local file, or stdin (`-`).
    Extract {
        input: String,
        #[arg(long, default_value = "auto")]
        method: String,
        #[arg(long, default_value = "auto")]
        strategy: String,
        #[arg(long)]
        max_chars: Option<usize>,
        #[arg(long)]
        max_tokens: Option<usize>,
    },
    /// Search then fetch+extract the top candidates in one pipeline.
    Pipeline {
        query: String,
        #[arg(long, default_value_t = 10)]
        top_k: usize,
        #[arg(long, default_value_t = 3)]
        extract_k: usize,
        #[arg(long = "prefer-domain")]
        prefer_domain: Vec<String>,
        #[arg(long, default_value = "auto")]
        method: String,
        #[arg(long, default_value = "auto")]
        strategy: String,
        #[arg(long)]
        plan: bool,
        #[arg(long)]
        provider: Option<String>,
    },
    /// Replay a suite of search/fetch cases and score retrieval quality.
    Eval {
        #[arg(long)]
        suite: String,
        #[arg(long)]
        provider: Option<String>,
        #[arg(long, default_value_t = 10)]
        k: usize,
        #[arg(long, default_value = "none")]
        fail_on: String,
    },
}

fn init_tracing(global: &GlobalArgs) {
    use tracing_subscriber::EnvFilter;
    let default_directive = if global.quiet {
        "error"
    } else {
        match global.verbose {
            0 => "warn",
            1 => "info",
            _ => "debug",
        }
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(!global.no_color)
        .with_writer(std::io::stderr)
        .try_init();
}

fn output_mode(global: &GlobalArgs) -> OutputMode {
    if global.plain {
        OutputMode::Plain
    } else if global.pretty {
        OutputMode::Pretty
    } else {
        OutputMode::Json
    }
}

fn default_cache_dir() -> std::path::PathBuf {
    dirs::cache_dir().unwrap_or_else(std::env::temp_dir).join("webpipe")
}

fn build_runtime(global: &GlobalArgs) -> anyhow::Result<Runtime> {
    let overrides = PolicyOverrides {
        mode: global.policy.as_deref().map(config::parse_mode),
        allow_domains: global.allow_domain.clone(),
        block_domains: global.block_domain.clone(),
        robots_mode: global.robots.as_deref().map(config::parse_robots),
        redact: if global.redact { Some(true) } else { None },
        no_detect_blocks: global.no_detect_blocks,
        no_follow_redirects: global.no_follow_redirects,
        timeout_s: global.timeout,
        // No dedicated per-response byte-limit flag is exposed; `--cache-max-mb`
        // governs the on-disk cache budget only (set separately below).
        max_bytes: None,
    };
    let policy = config::load_policy(&overrides)?;

    let cache_dir = global.cache_dir.clone().map(std::path::PathBuf::from).unwrap_or_else(default_cache_dir);
    std::fs::create_dir_all(&cache_dir)?;
    let cache_max_bytes = global.cache_max_mb.map(|mb| mb * 1_000_000).unwrap_or(500_000_000);
    let cache = Arc::new(FsCache::new(cache_dir, cache_max_bytes));

    let cache_ttl_s = global.cache_ttl.unwrap_or(24 * 60 * 60);
    let fetcher = Arc::new(LocalFetcher::new(cache.clone(), cache_ttl_s, global.proxy.clone())?);
    let renderer = Arc::new(PlaywrightRenderer::new(cache.clone()));
    let robots = Arc::new(RobotsCache::new());

    let user_agent = format!("webpipe/{}", env!("CARGO_PKG_VERSION"));
    let search_client = reqwest::Client::builder()
        .user_agent(user_agent.clone())
        .build()
        .map_err(|e| anyhow::anyhow!("failed to build search client: {e}"))?;
    let search = Arc::new(SearchRegistry::new(search_client));

    Ok(Runtime {
        policy,
        cache,
        fetcher,
        renderer,
        search,
        robots,
        user_agent,
        evidence_dir: global.evidence_dir.clone().map(std::path::PathBuf::from),
    })
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(&cli.global);

    let rt = match build_runtime(&cli.global) {
        Ok(rt) => rt,
        Err(e) => {
            if !cli.global.quiet {
                eprintln!("error[internal_error]: {e}");
            }
            std::process::exit(1);
        }
    };

    let mode = output_mode(&cli.global);
    let redact = rt.policy.redact;
    let quiet = cli.global.quiet;

    let exit_code = dispatch(&rt, cli.command).await.emit(mode, redact, quiet);
    let _ = rt.cache.prune();
    std::process::exit(exit_code);
}

fn parse_strategy(s: &str) -> Strategy {
    Strategy::parse(s).unwrap_or(Strategy::Auto)
}

fn parse_method(s: &str) -> Method {
    Method::parse(s).unwrap_or(Method::Auto)
}

async fn dispatch(rt: &Runtime, command: Command) -> Outcome {
    let start = Instant::now();
    match command {
        Command::Providers => providers_outcome(rt, start),
        Command::Search { query, max_results, provider } => search_outcome(rt, start, &query, max_results, provider.as_deref()).await,
        Command::Fetch { url, method } => fetch_outcome(rt, start, &url, parse_method(&method)).await,
        Command::Render { url } => render_outcome(rt, start, &url).await,
        Command::Extract { input, method, strategy, max_chars, max_tokens } => {
            let limits = Limits { max_chars, max_tokens };
            extract_outcome(rt, start, &input, parse_method(&method), parse_strategy(&strategy), &limits).await
        }
        Command::Pipeline {
            query,
            top_k,
            extract_k,
            prefer_domain,
            method,
            strategy,
            plan,
            provider,
        } => {
            let limits = Limits::default();
            pipeline_outcome(
                rt,
                start,
                &query,
                top_k,
                extract_k,
                &prefer_domain,
                parse_method(&method),
                parse_strategy(&strategy),
                &limits,
                plan,
                provider.as_deref(),
            )
            .await
        }
        Command::Eval { suite, provider, k, fail_on } => eval_outcome(rt, start, &suite, provider.as_deref(), k, &fail_on).await,
    }
}

fn duration_ms(start: Instant) -> u128 {
    start.elapsed().as_millis()
}

fn bare_outcome(command: &str, start: Instant, providers: Vec<String>) -> Outcome {
    Outcome {
        command: command.to_string(),
        result: Ok(serde_json::Value::Null),
        data_on_error: None,
        error_details: None,
        warnings: vec![],
        duration_ms: duration_ms(start),
        cache: CacheMeta::default(),
        providers,
        plain: None,
        exit_override: None,
    }
}

fn providers_outcome(rt: &Runtime, start: Instant) -> Outcome {
    let providers = orchestrator::providers_list(rt);
    let ids: Vec<String> = providers.iter().map(|p| p.id.clone()).collect();
    let plain = ids.join("\n");
    Outcome {
        result: Ok(serde_json::json!({ "providers": providers })),
        plain: Some(plain),
        ..bare_outcome("providers", start, vec![])
    }
}

async fn search_outcome(rt: &Runtime, start: Instant, query: &str, max_results: usize, provider: Option<&str>) -> Outcome {
    let q = webpipe_core::SearchQuery {
        query: query.to_string(),
        max_results: Some(max_results),
        language: None,
        country: None,
    };
    let outcome = match provider {
        Some(id) => rt.search.search_with(id, &q).await,
        None => rt.search.search_auto(&q, rt.policy.mode).await,
    };
    match outcome {
        Ok((results, provider_used)) => {
            let plain = results.iter().map(|r| r.url.clone()).collect::<Vec<_>>().join("\n");
            Outcome {
                result: Ok(serde_json::json!({ "results": results, "query": query, "provider": provider_used })),
                plain: Some(plain),
                ..bare_outcome("search", start, vec![provider_used])
            }
        }
        Err(e) => Outcome {
            result: Err(e),
            ..bare_outcome("search", start, vec![])
        },
    }
}

async fn fetch_outcome(rt: &Runtime, start: Instant, url: &str, method: Method) -> Outcome {
    let mut warnings = Vec::new();
    let options = orchestrator::fetch_options_from_policy(&rt.policy, false, false);
    let fetch = if matches!(method, Method::Browser) {
        run_render(rt, url).await.map(|doc| (doc, webpipe_core::Classification::Ok, String::new()))
    } else {
        run_fetch(rt, url, &options, &mut warnings).await
    };

    match fetch {
        Ok((document, classification, reason)) if classification != webpipe_core::Classification::Ok => {
            let error = classification_error(classification, &reason);
            let next_steps = webpipe_core::next_steps_for(classification, &reason);
            let data = serde_json::json!({ "document": document });
            let details = serde_json::json!({ "reason": reason, "next_steps": next_steps });
            Outcome {
                result: Err(error),
                data_on_error: Some(data),
                error_details: Some(details),
                warnings,
                ..bare_outcome("fetch", start, vec!["http".to_string()])
            }
        }
        Ok((document, _, _)) => {
            mirror_to_evidence(rt, &document);
            let plain = document.artifact.as_ref().map(|a| a.body_path.clone());
            Outcome {
                result: Ok(serde_json::json!({ "document": document })),
                warnings,
                plain,
                cache: CacheMeta { hit: false, stored: Some(true), hit_ratio: None },
                ..bare_outcome("fetch", start, vec!["http".to_string()])
            }
        }
        Err(e) => Outcome {
            result: Err(e),
            warnings,
            ..bare_outcome("fetch", start, vec!["http".to_string()])
        },
    }
}

async fn render_outcome(rt: &Runtime, start: Instant, url: &str) -> Outcome {
    match run_render(rt, url).await {
        Ok(document) => {
            mirror_to_evidence(rt, &document);
            let plain = document.artifact.as_ref().map(|a| a.body_path.clone());
            Outcome {
                result: Ok(serde_json::json!({ "document": document })),
                plain,
                ..bare_outcome("render", start, vec!["browser".to_string()])
            }
        }
        Err(e) => Outcome {
            result: Err(e),
            ..bare_outcome("render", start, vec!["browser".to_string()])
        },
    }
}

async fn extract_outcome(rt: &Runtime, start: Instant, input: &str, method: Method, strategy: Strategy, limits: &Limits) -> Outcome {
    let (result, warnings) = run_extract(rt, input, method, strategy, limits, false, false).await;
    match result {
        Ok(document) => {
            mirror_to_evidence(rt, &document);
            let plain = document.extracted.as_ref().map(|e| e.markdown.clone());
            Outcome {
                result: Ok(serde_json::json!({ "document": document })),
                warnings,
                plain,
                ..bare_outcome("extract", start, vec!["http".to_string()])
            }
        }
        Err(failure) => {
            let error = failure.error().clone();
            let data_on_error = failure.document_json();
            Outcome {
                result: Err(error),
                data_on_error,
                warnings,
                ..bare_outcome("extract", start, vec!["http".to_string()])
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn pipeline_outcome(
    rt: &Runtime,
    start: Instant,
    query: &str,
    top_k: usize,
    extract_k: usize,
    prefer_domain: &[String],
    method: Method,
    strategy: Strategy,
    limits: &Limits,
    plan: bool,
    provider: Option<&str>,
) -> Outcome {
    match run_pipeline(rt, query, top_k, extract_k, prefer_domain, method, strategy, limits, plan, provider).await {
        Ok(outcome) => {
            let plain = outcome
                .documents
                .iter()
                .filter_map(|d| {
                    d.get("document")
                        .and_then(|doc| doc.get("extracted"))
                        .and_then(|e| e.get("markdown"))
                        .and_then(|m| m.as_str())
                })
                .collect::<Vec<_>>()
                .join("\n---\n");
            Outcome {
                result: Ok(serde_json::json!({
                    "query": query,
                    "candidates": outcome.candidates,
                    "documents": outcome.documents,
                    "plan": plan,
                })),
                warnings: outcome.warnings,
                plain: Some(plain),
                ..bare_outcome("pipeline", start, vec![outcome.provider_used])
            }
        }
        Err(e) => Outcome {
            result: Err(e),
            ..bare_outcome("pipeline", start, vec![])
        },
    }
}

async fn eval_outcome(rt: &Runtime, start: Instant, suite: &str, provider: Option<&str>, k: usize, fail_on: &str) -> Outcome {
    let cases = match eval::parse_suite(std::path::Path::new(suite)) {
        Ok(cases) => cases,
        Err(e) => {
            return Outcome {
                result: Err(webpipe_core::Error::ParseError(format!("failed to parse suite: {e}"))),
                ..bare_outcome("eval", start, vec![])
            };
        }
    };

    let outcome = eval::run_eval(rt, &cases, provider, k).await;
    let fail_on = eval::FailOn::parse(fail_on).unwrap_or(eval::FailOn::None);
    let exit_override = eval::fail_on_exit_code(fail_on, &outcome);

    let plain = outcome
        .cases
        .iter()
        .map(|c| format!("{}\t{}\t{}", c.query, c.hit, c.fetch_target.clone().unwrap_or_default()))
        .collect::<Vec<_>>()
        .join("\n");

    let cache = CacheMeta {
        hit: outcome.cache_hit_ratio > 0.0,
        stored: None,
        hit_ratio: Some(outcome.cache_hit_ratio),
    };

    Outcome {
        result: Ok(serde_json::json!({ "cases": outcome.cases, "summary": outcome.summary })),
        warnings: outcome.warnings,
        cache,
        plain: Some(plain),
        exit_override: if exit_override != 0 { Some(exit_override) } else { None },
        ..bare_outcome("eval", start, outcome.providers)
    }
}
