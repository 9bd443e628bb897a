//! Stable error taxonomy shared by every command.
//!
//! `Error` is the leaf type returned by traits in this crate (`FetchBackend`,
//! `SearchProvider`, `Renderer`). It never crosses the Fetch Engine boundary
//! for expected network conditions — those are encoded in
//! [`crate::fetch::Classification`] instead. `Error` is reserved for
//! programmer errors and collaborator failures (bad config, a provider that
//! rejects the request, a cache that cannot be read).

use serde::{Deserialize, Serialize};

pub type Result<T> = std::result::Result<T, Error>;

/// `error.code` strings from spec §7. Stable — do not rename variants
/// without updating the taxonomy in lockstep.
#[derive(thiserror::Error, Debug, Clone)]
pub enum Error {
    #[error("invalid usage: {0}")]
    InvalidUsage(String),
    #[error("policy refused: {0}")]
    PolicyRefused(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("blocked: {0}")]
    Blocked(String),
    #[error("needs render: {0}")]
    NeedsRender(String),
    #[error("robots disallow: {0}")]
    RobotsDisallow(String),
    #[error("timeout: {0}")]
    Timeout(String),
    #[error("transport error: {0}")]
    TransportError(String),
    #[error("provider error: {0}")]
    ProviderError(String),
    #[error("parse error: {0}")]
    ParseError(String),
    #[error("extraction failed: {0}")]
    ExtractionFailed(String),
    #[error("io error: {0}")]
    Io(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn code(&self) -> &'static str {
        match self {
            Error::InvalidUsage(_) => "invalid_usage",
            Error::PolicyRefused(_) => "policy_refused",
            Error::NotFound(_) => "not_found",
            Error::Blocked(_) => "blocked",
            Error::NeedsRender(_) => "needs_render",
            Error::RobotsDisallow(_) => "robots_disallow",
            Error::Timeout(_) => "timeout",
            Error::TransportError(_) => "transport_error",
            Error::ProviderError(_) => "provider_error",
            Error::ParseError(_) => "parse_error",
            Error::ExtractionFailed(_) => "extraction_failed",
            Error::Io(_) => "io_error",
            Error::Internal(_) => "internal_error",
        }
    }

    /// §4.4 exit-code mapping: 0 success, 1 runtime error, 2 invalid usage or
    /// policy refusal, 3 not_found, 4 blocked (incl. robots_disallow),
    /// 5 needs_render. Every other taxonomy member is a "runtime error".
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::InvalidUsage(_) | Error::PolicyRefused(_) => 2,
            Error::NotFound(_) => 3,
            Error::Blocked(_) | Error::RobotsDisallow(_) => 4,
            Error::NeedsRender(_) => 5,
            _ => 1,
        }
    }

    pub fn message(&self) -> String {
        self.to_string()
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e.to_string())
    }
}

/// A wire-shaped `{code, message, details?}` triple, used directly as
/// `envelope.error`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorObject {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl From<&Error> for ErrorObject {
    fn from(e: &Error) -> Self {
        ErrorObject {
            code: e.code().to_string(),
            message: e.message(),
            details: None,
        }
    }
}

impl ErrorObject {
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_code_law_matches_taxonomy() {
        assert_eq!(Error::InvalidUsage("x".into()).exit_code(), 2);
        assert_eq!(Error::PolicyRefused("x".into()).exit_code(), 2);
        assert_eq!(Error::NotFound("x".into()).exit_code(), 3);
        assert_eq!(Error::Blocked("x".into()).exit_code(), 4);
        assert_eq!(Error::RobotsDisallow("x".into()).exit_code(), 4);
        assert_eq!(Error::NeedsRender("x".into()).exit_code(), 5);
        assert_eq!(Error::TransportError("x".into()).exit_code(), 1);
        assert_eq!(Error::Timeout("x".into()).exit_code(), 1);
        assert_eq!(Error::Internal("x".into()).exit_code(), 1);
    }

    #[test]
    fn code_strings_are_stable() {
        assert_eq!(Error::Blocked("x".into()).code(), "blocked");
        assert_eq!(Error::RobotsDisallow("x".into()).code(), "robots_disallow");
        assert_eq!(Error::ExtractionFailed("x".into()).code(), "extraction_failed");
    }
}
