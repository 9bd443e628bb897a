//! Render collaborator contract (spec §1): a single `render(url, options)
//! -> Document` interface. The engine behind it is opaque to the core —
//! concrete adapters live in `webpipe-local::render`.

use crate::document::Document;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderOptions {
    pub timeout_ms: u64,
    pub wait_strategy: WaitStrategy,
    pub screenshot: bool,
}

impl Default for RenderOptions {
    fn default() -> Self {
        RenderOptions {
            timeout_ms: 30_000,
            wait_strategy: WaitStrategy::NetworkIdle,
            screenshot: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaitStrategy {
    Load,
    NetworkIdle,
    DomContentLoaded,
}

#[async_trait::async_trait]
pub trait Renderer: Send + Sync {
    async fn render(&self, url: &str, options: &RenderOptions) -> crate::error::Result<Document>;
}
