// src/fetch/mod.rs
pub mod cache;
pub mod http;

use thiserror::Error;

use crate::feed::types::RawFeed;

pub use cache::{CacheKey, CachingFetcher, FeedCache, SingleSlotCache};
pub use http::HttpFetcher;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("no candidate source URLs configured")]
    NoCandidates,

    /// Every candidate failed; `last_error` is the failure of the final one.
    #[error("all {attempts} candidate source URLs failed; last error: {last_error}")]
    Exhausted { attempts: usize, last_error: String },
}

/// Retrieves the upstream feed, trying candidate URLs in order and returning
/// the first success.
#[async_trait::async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, candidates: &[String]) -> Result<RawFeed, FetchError>;

    fn name(&self) -> &'static str;
}
