//! Scripted collaborators for scheduler tests.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::codes::{CodeRecord, FetchedCode, WireTimestamp};
use crate::error::{FetchError, RefreshError};
use crate::fetch::Fetcher;
use crate::presenter::Presenter;
use crate::refresh::RefreshSummary;
use crate::registry::Site;

pub fn at(secs: i64) -> DateTime<Utc> {
  Utc.timestamp_opt(secs, 0).unwrap()
}

pub fn fetched(code: &str, issued_at: i64, ttl_seconds: u32) -> FetchedCode {
  FetchedCode {
    code: code.to_string(),
    issued_at: WireTimestamp::Unix(issued_at),
    ttl_seconds,
    label: None,
  }
}

#[derive(Clone)]
struct Script {
  result: Result<FetchedCode, FetchError>,
  delay: Duration,
}

/// Fetcher answering from a per-key script, optionally after a delay.
#[derive(Clone, Default)]
pub struct ScriptedFetcher {
  scripts: Arc<Mutex<HashMap<String, Script>>>,
  calls: Arc<AtomicUsize>,
}

impl ScriptedFetcher {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn respond(&self, key: &str, code: FetchedCode) -> &Self {
    self.respond_after(key, Ok(code), Duration::ZERO)
  }

  pub fn fail(&self, key: &str) -> &Self {
    self.respond_after(
      key,
      Err(FetchError::Transport("connection refused".to_string())),
      Duration::ZERO,
    )
  }

  pub fn respond_after(
    &self,
    key: &str,
    result: Result<FetchedCode, FetchError>,
    delay: Duration,
  ) -> &Self {
    self
      .scripts
      .lock()
      .unwrap()
      .insert(key.to_string(), Script { result, delay });
    self
  }

  pub fn calls(&self) -> usize {
    self.calls.load(Ordering::SeqCst)
  }
}

#[async_trait]
impl Fetcher for ScriptedFetcher {
  async fn fetch(&self, key: &str) -> Result<FetchedCode, FetchError> {
    self.calls.fetch_add(1, Ordering::SeqCst);
    let script = self.scripts.lock().unwrap().get(key).cloned();

    match script {
      Some(script) => {
        if !script.delay.is_zero() {
          tokio::time::sleep(script.delay).await;
        }
        script.result
      }
      None => Err(FetchError::Status(404)),
    }
  }
}

/// Presenter that remembers every notification.
#[derive(Debug, Default)]
pub struct RecordingPresenter {
  pub updated: Vec<CodeRecord>,
  pub errors: Vec<(String, String)>,
  pub completed: Vec<RefreshSummary>,
  pub site_changes: Vec<Vec<Site>>,
  pub warnings: Vec<String>,
}

impl RecordingPresenter {
  pub fn errors_for(&self, key: &str) -> usize {
    self.errors.iter().filter(|(k, _)| k == key).count()
  }
}

impl Presenter for RecordingPresenter {
  fn on_record_updated(&mut self, record: &CodeRecord) {
    self.updated.push(record.clone());
  }

  fn on_refresh_error(&mut self, key: &str, error: &RefreshError) {
    self.errors.push((key.to_string(), error.to_string()));
  }

  fn on_refresh_complete(&mut self, summary: &RefreshSummary) {
    self.completed.push(*summary);
  }

  fn on_sites_changed(&mut self, sites: &[Site]) {
    self.site_changes.push(sites.to_vec());
  }

  fn on_warning(&mut self, message: &str) {
    self.warnings.push(message.to_string());
  }
}
