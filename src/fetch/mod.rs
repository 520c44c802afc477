//! Code fetchers.

mod http;

pub use http::HttpFetcher;

use async_trait::async_trait;

use crate::codes::FetchedCode;
use crate::error::FetchError;

/// Source of the current code for a site key.
///
/// Transport, auth and timeouts belong to the implementation.
#[async_trait]
pub trait Fetcher: Send + Sync {
  async fn fetch(&self, key: &str) -> Result<FetchedCode, FetchError>;
}
