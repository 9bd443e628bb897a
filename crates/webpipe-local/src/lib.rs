//! Local (`reqwest` + filesystem cache) implementations of the
//! `webpipe-core` collaborator traits: `Cache`, `FetchBackend`,
//! `SearchProvider`, `Renderer`, plus the strategy-dispatched extractor.

pub mod cache;
pub mod extract;
pub mod fetch;
pub mod render;
pub mod robots;
pub mod search;

pub use cache::FsCache;
pub use fetch::LocalFetcher;
pub use render::PlaywrightRenderer;
pub use robots::RobotsCache;
