use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::codes::FetchedCode;
use crate::config::{Config, ServerConfig};
use crate::error::FetchError;

use super::Fetcher;

/// Fetches codes from `GET {url}/{path}/{key}` as JSON.
pub struct HttpFetcher {
  client: reqwest::Client,
  base: Url,
  path: Vec<String>,
  token: Option<String>,
}

impl HttpFetcher {
  pub fn new(server: &ServerConfig) -> Result<Self> {
    let base = Url::parse(&server.url)
      .map_err(|e| eyre!("Invalid server url '{}': {}", server.url, e))?;
    if base.cannot_be_a_base() {
      return Err(eyre!("Server url '{}' cannot be used as a base", server.url));
    }

    let client = reqwest::Client::builder()
      .timeout(Duration::from_secs(server.timeout_secs))
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self {
      client,
      base,
      path: split_path(&server.path),
      token: Config::get_token(),
    })
  }

  /// Build the endpoint for `key`. The key is percent-encoded as one path segment.
  fn endpoint(&self, key: &str) -> Result<Url, FetchError> {
    let mut url = self.base.clone();
    url
      .path_segments_mut()
      .map_err(|_| FetchError::Url(self.base.to_string()))?
      .pop_if_empty()
      .extend(self.path.iter())
      .push(key);
    Ok(url)
  }
}

fn split_path(path: &str) -> Vec<String> {
  path
    .split('/')
    .filter(|s| !s.is_empty())
    .map(String::from)
    .collect()
}

#[async_trait]
impl Fetcher for HttpFetcher {
  async fn fetch(&self, key: &str) -> Result<FetchedCode, FetchError> {
    let url = self.endpoint(key)?;
    debug!(key = %key, url = %url, "Fetching code");

    let mut request = self.client.get(url);
    if let Some(token) = &self.token {
      request = request.bearer_auth(token);
    }

    let response = request
      .send()
      .await
      .map_err(|e| FetchError::Transport(e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
      return Err(FetchError::Status(status.as_u16()));
    }

    response
      .json::<FetchedCode>()
      .await
      .map_err(|e| FetchError::Decode(e.to_string()))
  }
}
