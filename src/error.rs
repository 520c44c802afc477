//! Error taxonomy for the code refresh core.
//!
//! Every error is caught at the component that produced it and turned into a
//! return value or a presenter notification. None of them stop the refresh loop.

use thiserror::Error;

/// Network or transport failure while fetching a code. Retried on the next tick.
#[derive(Debug, Clone, Error)]
pub enum FetchError {
  #[error("request failed: {0}")]
  Transport(String),
  #[error("server returned status {0}")]
  Status(u16),
  #[error("invalid response body: {0}")]
  Decode(String),
  #[error("invalid url: {0}")]
  Url(String),
}

/// A malformed record. Dropped and logged.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
  #[error("record has an empty key")]
  EmptyKey,
  #[error("record for {0} has an empty code")]
  EmptyCode(String),
  #[error("record for {0} has a zero ttl")]
  ZeroTtl(String),
  #[error("record for {key} has an unreadable timestamp '{raw}'")]
  Timestamp { key: String, raw: String },
}

/// Failure of the persistence collaborator.
#[derive(Debug, Clone, Error)]
pub enum PersistenceError {
  #[error("storage unavailable: {0}")]
  Unavailable(String),
  #[error("stored data is corrupt: {0}")]
  Corrupt(String),
}

#[derive(Debug, Clone, Error)]
pub enum RegistryError {
  #[error("site '{0}' is already registered")]
  DuplicateKey(String),
  #[error(transparent)]
  Invalid(#[from] ValidationError),
  /// The in-memory change was applied but could not be saved.
  #[error("site list changed but was not saved: {0}")]
  Persistence(#[from] PersistenceError),
}

/// Outcome reported to the presenter when refreshing one key fails.
#[derive(Debug, Clone, Error)]
pub enum RefreshError {
  #[error(transparent)]
  Fetch(#[from] FetchError),
  #[error(transparent)]
  Invalid(#[from] ValidationError),
  #[error("site '{0}' is not registered")]
  UnknownKey(String),
}
