//! The canonical output envelope (spec §4.4, §6).
//!
//! `webpipe_cli::envelope` is the only place allowed to *construct* one of
//! these for a command's final output; this module only defines the shape
//! and the law `ok == error.is_none()`.

use crate::error::ErrorObject;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheMeta {
    pub hit: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stored: Option<bool>,
    /// Fraction of cacheable lookups that hit, for commands that perform many
    /// fetches in one invocation (`eval`). `None` for single-fetch commands,
    /// where `hit` alone is the whole story.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hit_ratio: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Meta {
    pub duration_ms: u128,
    pub cache: CacheMeta,
    pub providers: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub ok: bool,
    pub command: String,
    pub version: String,
    pub data: serde_json::Value,
    pub warnings: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorObject>,
    pub meta: Meta,
}

impl Envelope {
    pub fn success(command: impl Into<String>, data: serde_json::Value, warnings: Vec<String>, meta: Meta) -> Self {
        Envelope {
            ok: true,
            command: command.into(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            data,
            warnings,
            error: None,
            meta,
        }
    }

    pub fn failure(
        command: impl Into<String>,
        error: ErrorObject,
        warnings: Vec<String>,
        meta: Meta,
    ) -> Self {
        Self::failure_with_data(command, serde_json::Value::Object(serde_json::Map::new()), error, warnings, meta)
    }

    /// Like [`Self::failure`] but keeps partial `data` alongside the error —
    /// used when a classified fetch/extract failure still carries a usable
    /// `Document` the caller can retry against (spec §7).
    pub fn failure_with_data(
        command: impl Into<String>,
        data: serde_json::Value,
        error: ErrorObject,
        warnings: Vec<String>,
        meta: Meta,
    ) -> Self {
        Envelope {
            ok: false,
            command: command.into(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            data,
            warnings,
            error: Some(error),
            meta,
        }
    }

    /// Envelope <-> exit-code law (spec §8): `ok == (error.is_none())`.
    pub fn invariant_holds(&self) -> bool {
        self.ok == self.error.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_and_failure_satisfy_the_ok_error_law() {
        let meta = Meta {
            duration_ms: 1,
            cache: CacheMeta::default(),
            providers: vec![],
        };
        let s = Envelope::success("fetch", serde_json::json!({}), vec![], meta.clone());
        assert!(s.invariant_holds());
        let f = Envelope::failure(
            "fetch",
            ErrorObject {
                code: "blocked".into(),
                message: "x".into(),
                details: None,
            },
            vec![],
            meta,
        );
        assert!(f.invariant_holds());
    }
}
