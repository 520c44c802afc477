//! The user's list of tracked sites.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use crate::codes::CodeStore;
use crate::error::{PersistenceError, RegistryError, ValidationError};
use crate::storage::{PersistenceStore, RegistrySnapshot};

/// A tracked site: unique key plus display label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Site {
  pub key: String,
  pub label: String,
}

impl Site {
  pub fn new(key: impl Into<String>, label: impl Into<String>) -> Self {
    Self {
      key: key.into(),
      label: label.into(),
    }
  }
}

/// Ordered, key-unique list of sites. Insertion order is display order.
pub struct SiteRegistry {
  sites: Vec<Site>,
  persistence: Option<Arc<dyn PersistenceStore>>,
}

impl SiteRegistry {
  /// Build an unpersisted registry from a list of sites. Later duplicates are skipped.
  pub fn from_sites(sites: Vec<Site>) -> Self {
    let mut registry = Self {
      sites: Vec::with_capacity(sites.len()),
      persistence: None,
    };
    for site in sites {
      if !registry.contains(&site.key) {
        registry.sites.push(site);
      }
    }
    registry
  }

  /// Restore the registry from storage.
  ///
  /// Unreadable or corrupt data falls back to an empty registry and the load
  /// error is handed back so the caller can warn the user; the next
  /// successful save overwrites the stored data.
  pub async fn load(
    persistence: Arc<dyn PersistenceStore>,
  ) -> (Self, Option<PersistenceError>) {
    let (sites, error) = match persistence.load().await {
      Ok(snapshot) => (snapshot.sites, None),
      Err(e) => {
        warn!(error = %e, "Failed to load site list, starting empty");
        (Vec::new(), Some(e))
      }
    };

    let mut registry = Self::from_sites(sites);
    registry.persistence = Some(persistence);
    info!(count = registry.len(), "Loaded site list");
    (registry, error)
  }

  /// Append a site. Fails with `DuplicateKey` if the key is already tracked.
  ///
  /// A `Persistence` error means the site was added in memory but not saved.
  pub async fn add(
    &mut self,
    key: impl Into<String>,
    label: impl Into<String>,
  ) -> Result<(), RegistryError> {
    let key = key.into();
    if key.trim().is_empty() {
      return Err(ValidationError::EmptyKey.into());
    }
    if self.contains(&key) {
      return Err(RegistryError::DuplicateKey(key));
    }

    info!(key = %key, "Adding site");
    self.sites.push(Site::new(key, label));
    self.persist().await
  }

  /// Remove a site and its stored code. Returns whether the key was tracked.
  pub async fn remove(&mut self, key: &str, store: &mut CodeStore) -> Result<bool, RegistryError> {
    store.remove(key);

    let Some(pos) = self.sites.iter().position(|s| s.key == key) else {
      return Ok(false);
    };

    info!(key = %key, "Removing site");
    self.sites.remove(pos);
    self.persist().await?;
    Ok(true)
  }

  pub fn list(&self) -> &[Site] {
    &self.sites
  }

  pub fn contains(&self, key: &str) -> bool {
    self.sites.iter().any(|s| s.key == key)
  }

  pub fn label(&self, key: &str) -> Option<&str> {
    self
      .sites
      .iter()
      .find(|s| s.key == key)
      .map(|s| s.label.as_str())
  }

  pub fn keys(&self) -> Vec<String> {
    self.sites.iter().map(|s| s.key.clone()).collect()
  }

  pub fn len(&self) -> usize {
    self.sites.len()
  }

  pub fn is_empty(&self) -> bool {
    self.sites.is_empty()
  }

  pub fn snapshot(&self) -> RegistrySnapshot {
    RegistrySnapshot {
      sites: self.sites.clone(),
    }
  }

  async fn persist(&self) -> Result<(), RegistryError> {
    if let Some(persistence) = &self.persistence {
      persistence.save(&self.snapshot()).await?;
    }
    Ok(())
  }
}
