//! Policy loading (spec §3): `flags > env > project-config > user-config >
//! mode-defaults`. Layered with `figment` the way `stormlightlabs-thndrs-web-mcp`'s
//! `crates/core/src/config` builds its config — `Serialized` defaults, then TOML
//! files, then `Env::prefixed`, with explicit CLI-flag overrides applied last
//! since clap's `Option<T>` fields can't be expressed as a figment provider.

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::PathBuf;
use webpipe_core::{Mode, Policy, RobotsMode};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct FileConfig {
    mode: Option<String>,
    allow_domains: Option<Vec<String>>,
    block_domains: Option<Vec<String>>,
    robots: Option<String>,
    redact: Option<bool>,
    detect_blocks: Option<bool>,
    follow_redirects: Option<bool>,
    timeout_ms: Option<u64>,
    max_bytes: Option<u64>,
}

impl Default for FileConfig {
    fn default() -> Self {
        let d = Policy::default();
        FileConfig {
            mode: Some("standard".to_string()),
            allow_domains: Some(Vec::new()),
            block_domains: Some(Vec::new()),
            robots: Some("warn".to_string()),
            redact: Some(d.redact),
            detect_blocks: Some(d.detect_blocks),
            follow_redirects: Some(d.follow_redirects),
            timeout_ms: Some(d.timeout_ms),
            max_bytes: Some(d.max_bytes),
        }
    }
}

fn project_config_path() -> PathBuf {
    PathBuf::from(".webpipe.toml")
}

fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("webpipe").join("config.toml"))
}

/// Flag-shaped overrides; `None` means "flag not passed", so lower layers win.
#[derive(Debug, Clone, Default)]
pub struct PolicyOverrides {
    pub mode: Option<Mode>,
    pub allow_domains: Vec<String>,
    pub block_domains: Vec<String>,
    pub robots_mode: Option<RobotsMode>,
    pub redact: Option<bool>,
    pub no_detect_blocks: bool,
    pub no_follow_redirects: bool,
    pub timeout_s: Option<f64>,
    pub max_bytes: Option<u64>,
}

pub(crate) fn parse_mode(s: &str) -> Mode {
    match s {
        "strict" => Mode::Strict,
        "permissive" => Mode::Permissive,
        _ => Mode::Standard,
    }
}

pub(crate) fn parse_robots(s: &str) -> RobotsMode {
    match s {
        "respect" => RobotsMode::Respect,
        "ignore" => RobotsMode::Ignore,
        _ => RobotsMode::Warn,
    }
}

/// Build the effective `Policy` for one invocation. Mode-defaults are the
/// figment base layer (lowest priority); user config, project config, and
/// `WEBPIPE_*` env vars are merged on top in increasing priority; CLI flags
/// win outright over everything, applied after figment extraction.
pub fn load_policy(overrides: &PolicyOverrides) -> anyhow::Result<Policy> {
    let mut figment = Figment::new().merge(Serialized::defaults(FileConfig::default()));

    if let Some(user_path) = user_config_path() {
        if user_path.exists() {
            figment = figment.merge(Toml::file(user_path));
        }
    }
    let project_path = project_config_path();
    if project_path.exists() {
        figment = figment.merge(Toml::file(project_path));
    }
    figment = figment.merge(Env::prefixed("WEBPIPE_").split("_"));

    let file_config: FileConfig = figment.extract()?;

    let mut allow_domains: BTreeSet<String> = file_config.allow_domains.unwrap_or_default().into_iter().collect();
    let mut block_domains: BTreeSet<String> = file_config.block_domains.unwrap_or_default().into_iter().collect();
    allow_domains.extend(overrides.allow_domains.iter().cloned());
    block_domains.extend(overrides.block_domains.iter().cloned());

    let mode = overrides
        .mode
        .unwrap_or_else(|| parse_mode(file_config.mode.as_deref().unwrap_or("standard")));
    let robots_mode = overrides
        .robots_mode
        .unwrap_or_else(|| parse_robots(file_config.robots.as_deref().unwrap_or("warn")));

    Ok(Policy {
        mode,
        allow_domains,
        block_domains,
        robots_mode,
        redact: overrides.redact.unwrap_or(file_config.redact.unwrap_or(false)),
        detect_blocks: if overrides.no_detect_blocks {
            false
        } else {
            file_config.detect_blocks.unwrap_or(true)
        },
        follow_redirects: if overrides.no_follow_redirects {
            false
        } else {
            file_config.follow_redirects.unwrap_or(true)
        },
        timeout_ms: overrides
            .timeout_s
            .map(|s| (s * 1000.0) as u64)
            .unwrap_or(file_config.timeout_ms.unwrap_or(20_000)),
        max_bytes: overrides.max_bytes.unwrap_or(file_config.max_bytes.unwrap_or(5_000_000)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_overrides_win_over_mode_defaults() {
        let overrides = PolicyOverrides {
            mode: Some(Mode::Strict),
            allow_domains: vec!["example.com".to_string()],
            max_bytes: Some(1234),
            ..Default::default()
        };
        let policy = load_policy(&overrides).unwrap();
        assert_eq!(policy.mode, Mode::Strict);
        assert!(policy.allow_domains.contains("example.com"));
        assert_eq!(policy.max_bytes, 1234);
    }

    #[test]
    fn defaults_apply_when_nothing_overridden() {
        let policy = load_policy(&PolicyOverrides::default()).unwrap();
        assert_eq!(policy.mode, Mode::Standard);
        assert_eq!(policy.robots_mode, RobotsMode::Warn);
        assert!(policy.detect_blocks);
    }
}
