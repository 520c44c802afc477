//! Persistence collaborators used by the registry and the scheduler.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::codes::CodeRecord;
use crate::error::PersistenceError;
use crate::registry::Site;

/// Serialized state of the site registry, in display order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrySnapshot {
  pub sites: Vec<Site>,
}

/// Durable storage for the site registry.
#[async_trait]
pub trait PersistenceStore: Send + Sync {
  /// Load the last saved snapshot. An empty snapshot when nothing was saved yet.
  async fn load(&self) -> Result<RegistrySnapshot, PersistenceError>;

  async fn save(&self, snapshot: &RegistrySnapshot) -> Result<(), PersistenceError>;
}

/// Fast local cache of the last response seen for each key.
///
/// Used for first paint before the network answers. Callers treat failures as
/// cache misses.
#[async_trait]
pub trait ResponseCache: Send + Sync {
  async fn get(&self, key: &str) -> Result<Option<CodeRecord>, PersistenceError>;

  async fn put(&self, record: &CodeRecord) -> Result<(), PersistenceError>;

  async fn evict(&self, key: &str) -> Result<(), PersistenceError>;
}
