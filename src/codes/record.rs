//! Code records and the wire shape fetchers decode into.

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// One site's current code and its validity window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeRecord {
  pub key: String,
  pub label: String,
  pub code: String,
  pub issued_at: DateTime<Utc>,
  pub ttl_seconds: u32,
}

impl CodeRecord {
  pub fn new(
    key: impl Into<String>,
    label: impl Into<String>,
    code: impl Into<String>,
    issued_at: DateTime<Utc>,
    ttl_seconds: u32,
  ) -> Self {
    Self {
      key: key.into(),
      label: label.into(),
      code: code.into(),
      issued_at,
      ttl_seconds,
    }
  }

  /// Check the field contracts a stored record must satisfy.
  pub fn validate(&self) -> Result<(), ValidationError> {
    if self.key.is_empty() {
      return Err(ValidationError::EmptyKey);
    }
    if self.code.is_empty() {
      return Err(ValidationError::EmptyCode(self.key.clone()));
    }
    if self.ttl_seconds == 0 {
      return Err(ValidationError::ZeroTtl(self.key.clone()));
    }
    Ok(())
  }

  pub fn expires_at(&self) -> DateTime<Utc> {
    self.issued_at + Duration::seconds(i64::from(self.ttl_seconds))
  }

  /// Time left before the code expires, zero once expired.
  pub fn remaining(&self, now: DateTime<Utc>) -> Duration {
    (self.expires_at() - now).max(Duration::zero())
  }

  pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
    now >= self.expires_at()
  }
}

/// Timestamp as servers send it: unix seconds or an RFC 3339 string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WireTimestamp {
  Unix(i64),
  Text(String),
}

impl WireTimestamp {
  fn parse(&self) -> Option<DateTime<Utc>> {
    match self {
      WireTimestamp::Unix(secs) => Utc.timestamp_opt(*secs, 0).single(),
      WireTimestamp::Text(s) => DateTime::parse_from_rfc3339(s.trim())
        .ok()
        .map(|dt| dt.with_timezone(&Utc)),
    }
  }

  fn raw(&self) -> String {
    match self {
      WireTimestamp::Unix(secs) => secs.to_string(),
      WireTimestamp::Text(s) => s.clone(),
    }
  }
}

/// Response payload of a fetch, before validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchedCode {
  #[serde(alias = "user1timeKey")]
  pub code: String,
  #[serde(alias = "created")]
  pub issued_at: WireTimestamp,
  pub ttl_seconds: u32,
  #[serde(default)]
  pub label: Option<String>,
}

impl FetchedCode {
  /// Convert into a record for `key`, using `fallback_label` when the server sent none.
  pub fn into_record(self, key: &str, fallback_label: &str) -> Result<CodeRecord, ValidationError> {
    let issued_at = self
      .issued_at
      .parse()
      .ok_or_else(|| ValidationError::Timestamp {
        key: key.to_string(),
        raw: self.issued_at.raw(),
      })?;

    let label = self
      .label
      .filter(|l| !l.trim().is_empty())
      .unwrap_or_else(|| fallback_label.to_string());

    let record = CodeRecord::new(key, label, self.code, issued_at, self.ttl_seconds);
    record.validate()?;
    Ok(record)
  }
}
