use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::registry::Site;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
  #[serde(default)]
  pub server: ServerConfig,
  #[serde(default)]
  pub refresh: RefreshConfig,
  #[serde(default)]
  pub storage: StorageConfig,
  /// Sites added on first start, when the saved site list is empty
  #[serde(default)]
  pub sites: Vec<Site>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
  /// Base URL of the code server, e.g. "http://127.0.0.1:9019"
  #[serde(default)]
  pub url: String,
  /// Path under the base URL; the site key is appended as the last segment
  #[serde(default = "default_server_path")]
  pub path: String,
  #[serde(default = "default_timeout_secs")]
  pub timeout_secs: u64,
}

impl Default for ServerConfig {
  fn default() -> Self {
    Self {
      url: String::new(),
      path: default_server_path(),
      timeout_secs: default_timeout_secs(),
    }
  }
}

fn default_server_path() -> String {
  "api/2fa".to_string()
}

fn default_timeout_secs() -> u64 {
  10
}

#[derive(Debug, Clone, Deserialize)]
pub struct RefreshConfig {
  /// Fixed refresh interval. When unset it follows the shortest code TTL.
  pub interval_secs: Option<u64>,
  /// Fraction of the shortest TTL to wait between refreshes
  #[serde(default = "default_ttl_fraction")]
  pub ttl_fraction: f64,
  /// Interval used before any code has been seen
  #[serde(default = "default_fallback_interval_secs")]
  pub fallback_interval_secs: u64,
}

impl Default for RefreshConfig {
  fn default() -> Self {
    Self {
      interval_secs: None,
      ttl_fraction: default_ttl_fraction(),
      fallback_interval_secs: default_fallback_interval_secs(),
    }
  }
}

fn default_ttl_fraction() -> f64 {
  0.5
}

fn default_fallback_interval_secs() -> u64 {
  60
}

impl RefreshConfig {
  pub fn interval(&self) -> Option<Duration> {
    self.interval_secs.map(Duration::from_secs)
  }

  pub fn fallback_interval(&self) -> Duration {
    Duration::from_secs(self.fallback_interval_secs)
  }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
  /// Keep the site list and last codes on disk
  #[serde(default = "default_true")]
  pub enabled: bool,
  /// Database path (default: $XDG_DATA_HOME/codeboard/codeboard.db)
  pub path: Option<PathBuf>,
}

impl Default for StorageConfig {
  fn default() -> Self {
    Self {
      enabled: true,
      path: None,
    }
  }
}

fn default_true() -> bool {
  true
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./codeboard.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/codeboard/config.yaml
  ///
  /// Without any file the defaults are used.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Ok(Self::default()),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("codeboard.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("codeboard").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::parse(&contents).map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  fn parse(contents: &str) -> Result<Self> {
    let config: Config = serde_yaml::from_str(contents)?;
    config.validate()?;
    Ok(config)
  }

  fn validate(&self) -> Result<()> {
    if !(self.refresh.ttl_fraction > 0.0 && self.refresh.ttl_fraction <= 1.0) {
      return Err(eyre!(
        "refresh.ttl_fraction must be in (0, 1], got {}",
        self.refresh.ttl_fraction
      ));
    }
    if self.refresh.interval_secs == Some(0) || self.refresh.fallback_interval_secs == 0 {
      return Err(eyre!("refresh intervals must be at least one second"));
    }
    Ok(())
  }

  /// Check that a server has been configured.
  pub fn require_server(&self) -> Result<()> {
    if self.server.url.trim().is_empty() {
      return Err(eyre!(
        "No code server configured. Set server.url in ~/.config/codeboard/config.yaml\n\
                 or pass --server <URL>."
      ));
    }
    Ok(())
  }

  /// Get the bearer token for the code server, if any.
  ///
  /// Reads CODEBOARD_TOKEN.
  pub fn get_token() -> Option<String> {
    std::env::var("CODEBOARD_TOKEN")
      .ok()
      .filter(|t| !t.is_empty())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_defaults_from_empty_document() {
    let config = Config::parse("{}").unwrap();
    assert_eq!(config.server.path, "api/2fa");
    assert_eq!(config.server.timeout_secs, 10);
    assert_eq!(config.refresh.ttl_fraction, 0.5);
    assert_eq!(config.refresh.fallback_interval(), Duration::from_secs(60));
    assert!(config.refresh.interval().is_none());
    assert!(config.storage.enabled);
    assert!(config.sites.is_empty());
    assert!(config.require_server().is_err());
  }

  #[test]
  fn test_full_document() {
    let yaml = r#"
server:
  url: http://127.0.0.1:9019
  path: v1/codes
refresh:
  interval_secs: 15
storage:
  enabled: false
sites:
  - key: "2459115"
    label: http://127.0.0.1:9019
"#;
    let config = Config::parse(yaml).unwrap();
    assert_eq!(config.server.url, "http://127.0.0.1:9019");
    assert_eq!(config.server.path, "v1/codes");
    assert_eq!(config.refresh.interval(), Some(Duration::from_secs(15)));
    assert!(!config.storage.enabled);
    assert_eq!(
      config.sites,
      vec![Site::new("2459115", "http://127.0.0.1:9019")]
    );
    assert!(config.require_server().is_ok());
  }

  #[test]
  fn test_rejects_bad_ttl_fraction() {
    assert!(Config::parse("refresh:\n  ttl_fraction: 0").is_err());
    assert!(Config::parse("refresh:\n  ttl_fraction: 1.5").is_err());
  }

  #[test]
  fn test_rejects_zero_interval() {
    assert!(Config::parse("refresh:\n  interval_secs: 0").is_err());
  }
}
