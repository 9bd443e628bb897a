//! The `Document` shared data model (spec §3).
//!
//! Invariant: every `Document` has a non-empty origin identifier (`url` or
//! `source_path`) and a `fetched_at` timestamp. Optional fields are `None`
//! rather than empty-string/zero sentinels, so callers can distinguish
//! "absent" from "empty but present".

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchMethod {
    Http,
    Browser,
    Provided,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpMeta {
    pub status: u16,
    pub final_url: String,
    /// Ordered chain of intermediate URLs, not including `final_url`.
    pub redirect_chain: Vec<String>,
    /// Allowlisted subset: content-type, content-length, date, last-modified, etag.
    pub selected_headers: BTreeMap<String, String>,
    pub bytes_read: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artifact {
    pub content_type: String,
    pub body_path: String,
    pub body_bytes: u64,
    #[serde(default)]
    pub truncated: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub screenshot_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dom_snapshot_id: Option<String>,
    pub wait_strategy_used: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocSection {
    pub heading_level: u8,
    pub heading_text: String,
    pub body_markdown: String,
    pub links: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Extracted {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    pub markdown: String,
    pub text: String,
    pub content_hash: String,
    pub extraction_method: String,
    pub extraction_version: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doc_sections: Option<Vec<DocSection>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_path: Option<String>,
    pub fetched_at: DateTime<Utc>,
    pub fetch_method: FetchMethod,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http: Option<HttpMeta>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact: Option<Artifact>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub render: Option<RenderMeta>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extracted: Option<Extracted>,
    pub warnings: Vec<String>,
}

impl Document {
    /// Construct a `provided` document for file/stdin input (spec §4.5 `extract`).
    pub fn provided(source_path: impl Into<String>, artifact: Artifact) -> Self {
        Document {
            url: None,
            source_path: Some(source_path.into()),
            fetched_at: Utc::now(),
            fetch_method: FetchMethod::Provided,
            http: None,
            artifact: Some(artifact),
            render: None,
            extracted: None,
            warnings: Vec::new(),
        }
    }

    /// Origin identifier used in diagnostics and dedup keys: `url` if
    /// present, else `source_path`. Never both absent (construction
    /// invariant enforced by callers).
    pub fn origin(&self) -> &str {
        self.url
            .as_deref()
            .or(self.source_path.as_deref())
            .unwrap_or("<unknown>")
    }

    /// Append a warning, deduplicated by exact message (spec §3, §5 ordering
    /// guarantee: warnings appear in discovery order, deduped by string).
    pub fn push_warning(&mut self, msg: impl Into<String>) {
        let msg = msg.into();
        if !self.warnings.iter().any(|w| w == &msg) {
            self.warnings.push(msg);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_warning_dedupes_by_exact_string() {
        let mut d = Document::provided(
            "x.html",
            Artifact {
                content_type: "text/html".into(),
                body_path: "x.html".into(),
                body_bytes: 0,
                truncated: false,
            },
        );
        d.push_warning("truncated: chars=1 of 2");
        d.push_warning("truncated: chars=1 of 2");
        d.push_warning("other");
        assert_eq!(d.warnings.len(), 2);
    }

    #[test]
    fn origin_prefers_url_over_source_path() {
        let mut d = Document::provided(
            "x.html",
            Artifact {
                content_type: "text/html".into(),
                body_path: "x.html".into(),
                body_bytes: 0,
                truncated: false,
            },
        );
        assert_eq!(d.origin(), "x.html");
        d.url = Some("https://example.com/".into());
        assert_eq!(d.origin(), "https://example.com/");
    }
}
