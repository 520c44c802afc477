//! In-memory code store with the staleness guard.

use std::collections::HashMap;

use crate::error::ValidationError;
use crate::registry::{Site, SiteRegistry};

use super::record::CodeRecord;

/// Mapping of site key to its latest code record.
///
/// A record is only ever replaced by one with a strictly newer `issued_at`, so
/// merges are order-independent and late responses cannot roll data back.
#[derive(Debug, Default)]
pub struct CodeStore {
  records: HashMap<String, CodeRecord>,
}

impl CodeStore {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn get(&self, key: &str) -> Option<&CodeRecord> {
    self.records.get(key)
  }

  /// Apply `candidate` if it is the first record for its key or strictly newer
  /// than the stored one. Returns whether the write took effect.
  pub fn upsert(&mut self, candidate: CodeRecord) -> Result<bool, ValidationError> {
    candidate.validate()?;

    if let Some(existing) = self.records.get(&candidate.key) {
      if candidate.issued_at <= existing.issued_at {
        return Ok(false);
      }
    }

    self.records.insert(candidate.key.clone(), candidate);
    Ok(true)
  }

  /// Delete the record for `key`. Unknown keys are ignored.
  pub fn remove(&mut self, key: &str) {
    self.records.remove(key);
  }

  /// Records in the registry's display order. Call again (or clone) to restart.
  pub fn all<'a>(&'a self, registry: &'a SiteRegistry) -> Records<'a> {
    Records {
      store: self,
      sites: registry.list().iter(),
    }
  }

  /// Shortest validity window among stored records.
  pub fn shortest_ttl(&self) -> Option<u32> {
    self.records.values().map(|r| r.ttl_seconds).min()
  }

  pub fn len(&self) -> usize {
    self.records.len()
  }

  pub fn is_empty(&self) -> bool {
    self.records.is_empty()
  }
}

/// Lazy iterator over stored records in display order.
#[derive(Clone)]
pub struct Records<'a> {
  store: &'a CodeStore,
  sites: std::slice::Iter<'a, Site>,
}

impl<'a> Iterator for Records<'a> {
  type Item = &'a CodeRecord;

  fn next(&mut self) -> Option<Self::Item> {
    let store = self.store;
    self.sites.by_ref().find_map(|site| store.get(&site.key))
  }
}
