//! In-process storage, used when on-disk storage is disabled and in tests.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

use crate::codes::CodeRecord;
use crate::error::PersistenceError;

use super::traits::{PersistenceStore, RegistrySnapshot, ResponseCache};

/// Keeps everything in memory; nothing survives a restart.
#[derive(Default)]
pub struct MemoryStore {
  snapshot: Mutex<RegistrySnapshot>,
  codes: Mutex<HashMap<String, CodeRecord>>,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }
}

fn poisoned<T>(e: std::sync::PoisonError<T>) -> PersistenceError {
  PersistenceError::Unavailable(format!("lock poisoned: {}", e))
}

#[async_trait]
impl PersistenceStore for MemoryStore {
  async fn load(&self) -> Result<RegistrySnapshot, PersistenceError> {
    Ok(self.snapshot.lock().map_err(poisoned)?.clone())
  }

  async fn save(&self, snapshot: &RegistrySnapshot) -> Result<(), PersistenceError> {
    *self.snapshot.lock().map_err(poisoned)? = snapshot.clone();
    Ok(())
  }
}

#[async_trait]
impl ResponseCache for MemoryStore {
  async fn get(&self, key: &str) -> Result<Option<CodeRecord>, PersistenceError> {
    Ok(self.codes.lock().map_err(poisoned)?.get(key).cloned())
  }

  async fn put(&self, record: &CodeRecord) -> Result<(), PersistenceError> {
    self
      .codes
      .lock()
      .map_err(poisoned)?
      .insert(record.key.clone(), record.clone());
    Ok(())
  }

  async fn evict(&self, key: &str) -> Result<(), PersistenceError> {
    self.codes.lock().map_err(poisoned)?.remove(key);
    Ok(())
  }
}
