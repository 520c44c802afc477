use chrono::Utc;
use futures::stream::{FuturesUnordered, StreamExt};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::codes::{CodeRecord, CodeStore, FetchedCode, Records};
use crate::error::{FetchError, RefreshError, RegistryError, ValidationError};
use crate::fetch::Fetcher;
use crate::presenter::Presenter;
use crate::registry::SiteRegistry;
use crate::storage::ResponseCache;

use super::{IntervalPolicy, KeyState, RefreshOutcome, RefreshSummary};

/// Fetches codes for registered sites and merges them into the store.
pub struct RefreshScheduler<P: Presenter> {
  pub(super) registry: SiteRegistry,
  pub(super) store: CodeStore,
  pub(super) fetcher: Arc<dyn Fetcher>,
  pub(super) cache: Option<Arc<dyn ResponseCache>>,
  pub(super) presenter: P,
  policy: IntervalPolicy,
  /// Fetches in flight per key
  in_flight: HashMap<String, usize>,
}

impl<P: Presenter> RefreshScheduler<P> {
  pub fn new(registry: SiteRegistry, fetcher: Arc<dyn Fetcher>, presenter: P) -> Self {
    Self {
      registry,
      store: CodeStore::new(),
      fetcher,
      cache: None,
      presenter,
      policy: IntervalPolicy::default(),
      in_flight: HashMap::new(),
    }
  }

  /// Consult `cache` before going to the network, and keep it current.
  pub fn with_cache(mut self, cache: Arc<dyn ResponseCache>) -> Self {
    self.cache = Some(cache);
    self
  }

  pub fn with_policy(mut self, policy: IntervalPolicy) -> Self {
    self.policy = policy;
    self
  }

  pub fn registry(&self) -> &SiteRegistry {
    &self.registry
  }

  pub fn store(&self) -> &CodeStore {
    &self.store
  }

  pub fn presenter(&self) -> &P {
    &self.presenter
  }

  /// Stored records in display order.
  pub fn records(&self) -> Records<'_> {
    self.store.all(&self.registry)
  }

  /// Time until the next timer-driven refresh should run.
  pub fn current_interval(&self) -> Duration {
    self.policy.interval(self.store.shortest_ttl())
  }

  pub fn key_state(&self, key: &str, now: chrono::DateTime<Utc>) -> KeyState {
    if self.in_flight.contains_key(key) {
      return KeyState::Pending;
    }
    match self.store.get(key) {
      None => KeyState::Uninitialized,
      Some(record) if record.is_expired(now) => KeyState::Stale,
      Some(_) => KeyState::Fresh,
    }
  }

  /// Add a site and notify the presenter.
  ///
  /// A save failure is surfaced as a warning; the site stays registered.
  pub async fn add_site(&mut self, key: String, label: String) -> Result<(), RegistryError> {
    match self.registry.add(key, label).await {
      Ok(()) => {}
      Err(RegistryError::Persistence(e)) => {
        warn!(error = %e, "Site added but not saved");
        self.presenter.on_warning(&format!("Site list not saved: {}", e));
      }
      Err(e) => return Err(e),
    }
    self.presenter.on_sites_changed(self.registry.list());
    Ok(())
  }

  /// Remove a site, its code and its cached response.
  pub async fn remove_site(&mut self, key: &str) -> bool {
    let removed = match self.registry.remove(key, &mut self.store).await {
      Ok(removed) => removed,
      Err(e) => {
        warn!(key = %key, error = %e, "Site removed but not saved");
        self.presenter.on_warning(&format!("Site list not saved: {}", e));
        true
      }
    };

    if let Some(cache) = &self.cache {
      if let Err(e) = cache.evict(key).await {
        debug!(key = %key, error = %e, "Failed to evict cached code");
      }
    }

    if removed {
      self.presenter.on_sites_changed(self.registry.list());
    }
    removed
  }

  /// Apply still-valid cached responses for every registered key.
  pub async fn restore_cached(&mut self) -> usize {
    let mut restored = 0;
    for key in self.registry.keys() {
      if self.apply_cached(&key).await {
        restored += 1;
      }
    }
    if restored > 0 {
      info!(count = restored, "Restored cached codes");
    }
    restored
  }

  /// Refresh a single key.
  ///
  /// On failure the stored record is left as it was and the error is reported
  /// to the presenter as well as returned.
  pub async fn refresh_one(&mut self, key: &str) -> Result<RefreshOutcome, RefreshError> {
    if !self.registry.contains(key) {
      let error = RefreshError::UnknownKey(key.to_string());
      self.presenter.on_refresh_error(key, &error);
      return Err(error);
    }

    self.apply_cached(key).await;

    self.begin(key);
    let result = self.fetcher.fetch(key).await;
    self.finish(key);

    self.complete(key, result).await
  }

  /// Refresh every registered key concurrently and merge results as they arrive.
  pub async fn refresh_all(&mut self) -> RefreshSummary {
    let keys = self.registry.keys();
    for key in &keys {
      self.apply_cached(key).await;
      self.begin(key);
    }

    let mut pending: FuturesUnordered<_> = keys
      .into_iter()
      .map(|key| {
        let fetcher = Arc::clone(&self.fetcher);
        async move {
          let result = fetcher.fetch(&key).await;
          (key, result)
        }
      })
      .collect();

    let mut summary = RefreshSummary::default();
    while let Some((key, result)) = pending.next().await {
      self.finish(&key);
      let outcome = self.complete(&key, result).await;
      tally(&mut summary, &outcome);
    }

    self.report_batch(&summary);
    summary
  }

  pub(super) fn report_batch(&mut self, summary: &RefreshSummary) {
    info!(
      applied = summary.applied,
      rejected = summary.rejected,
      failed = summary.failed,
      "Refresh finished"
    );
    self.presenter.on_refresh_complete(summary);
  }

  pub(super) fn begin(&mut self, key: &str) {
    *self.in_flight.entry(key.to_string()).or_insert(0) += 1;
  }

  pub(super) fn finish(&mut self, key: &str) {
    if let Some(count) = self.in_flight.get_mut(key) {
      *count -= 1;
      if *count == 0 {
        self.in_flight.remove(key);
      }
    }
  }

  pub(super) fn is_in_flight(&self, key: &str) -> bool {
    self.in_flight.contains_key(key)
  }

  pub(super) fn in_flight_count(&self) -> usize {
    self.in_flight.values().sum()
  }

  /// Merge the result of a finished fetch for `key`.
  pub(super) async fn complete(
    &mut self,
    key: &str,
    result: Result<FetchedCode, FetchError>,
  ) -> Result<RefreshOutcome, RefreshError> {
    let Some(label) = self.registry.label(key).map(String::from) else {
      debug!(key = %key, "Dropping result for unregistered site");
      return Ok(RefreshOutcome::Dropped);
    };

    let record = match result {
      Ok(fetched) => fetched.into_record(key, &label),
      Err(e) => {
        warn!(key = %key, error = %e, "Failed to fetch code");
        let error = RefreshError::Fetch(e);
        self.presenter.on_refresh_error(key, &error);
        return Err(error);
      }
    };

    let outcome = record.and_then(|record| self.apply(record));
    match outcome {
      Ok(Some(record)) => {
        if let Some(cache) = &self.cache {
          if let Err(e) = cache.put(&record).await {
            debug!(key = %key, error = %e, "Failed to cache code");
          }
        }
        Ok(RefreshOutcome::Applied)
      }
      Ok(None) => Ok(RefreshOutcome::Rejected),
      Err(e) => {
        warn!(key = %key, error = %e, "Dropping malformed code");
        let error = RefreshError::Invalid(e);
        self.presenter.on_refresh_error(key, &error);
        Err(error)
      }
    }
  }

  /// Upsert `record`, notifying the presenter when it took effect.
  fn apply(&mut self, record: CodeRecord) -> Result<Option<CodeRecord>, ValidationError> {
    if self.store.upsert(record.clone())? {
      self.presenter.on_record_updated(&record);
      Ok(Some(record))
    } else {
      debug!(key = %record.key, issued_at = %record.issued_at, "Ignoring stale code");
      Ok(None)
    }
  }

  /// Apply the cached response for `key` if it is still within its TTL.
  pub(super) async fn apply_cached(&mut self, key: &str) -> bool {
    let Some(cache) = self.cache.clone() else {
      return false;
    };

    let cached = match cache.get(key).await {
      Ok(Some(record)) => record,
      Ok(None) => return false,
      Err(e) => {
        debug!(key = %key, error = %e, "Cached code unreadable");
        return false;
      }
    };

    if cached.is_expired(Utc::now()) {
      return false;
    }

    matches!(self.apply(cached), Ok(Some(_)))
  }
}

pub(super) fn tally(summary: &mut RefreshSummary, outcome: &Result<RefreshOutcome, RefreshError>) {
  match outcome {
    Ok(RefreshOutcome::Applied) => summary.applied += 1,
    Ok(RefreshOutcome::Rejected) => summary.rejected += 1,
    Ok(RefreshOutcome::Dropped) => {}
    Err(_) => summary.failed += 1,
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::refresh::test_support::{at, fetched, RecordingPresenter, ScriptedFetcher};
  use crate::registry::Site;
  use crate::storage::MemoryStore;

  fn scheduler(
    sites: &[(&str, &str)],
    fetcher: &ScriptedFetcher,
  ) -> RefreshScheduler<RecordingPresenter> {
    let registry = SiteRegistry::from_sites(
      sites
        .iter()
        .map(|(key, label)| Site::new(*key, *label))
        .collect(),
    );
    RefreshScheduler::new(
      registry,
      Arc::new(fetcher.clone()),
      RecordingPresenter::default(),
    )
  }

  #[tokio::test]
  async fn test_late_response_does_not_roll_back() {
    let fetcher = ScriptedFetcher::new();
    let mut scheduler = scheduler(&[("A", "site-A")], &fetcher);

    fetcher.respond("A", fetched("111111", 100, 30));
    assert_eq!(
      scheduler.refresh_one("A").await.unwrap(),
      RefreshOutcome::Applied
    );
    assert_eq!(scheduler.store().get("A").unwrap().code, "111111");

    fetcher.respond("A", fetched("000000", 90, 30));
    assert_eq!(
      scheduler.refresh_one("A").await.unwrap(),
      RefreshOutcome::Rejected
    );
    assert_eq!(scheduler.store().get("A").unwrap().code, "111111");

    fetcher.respond("A", fetched("222222", 140, 30));
    assert_eq!(
      scheduler.refresh_one("A").await.unwrap(),
      RefreshOutcome::Applied
    );
    assert_eq!(scheduler.store().get("A").unwrap().code, "222222");

    assert_eq!(scheduler.presenter().updated.len(), 2);
  }

  #[tokio::test]
  async fn test_failed_fetch_keeps_previous_record() {
    let fetcher = ScriptedFetcher::new();
    let mut scheduler = scheduler(&[("B", "site-B")], &fetcher);

    fetcher.respond("B", fetched("123456", 100, 30));
    scheduler.refresh_one("B").await.unwrap();

    fetcher.fail("B");
    let result = scheduler.refresh_one("B").await;
    assert!(matches!(result, Err(RefreshError::Fetch(_))));

    assert_eq!(scheduler.store().get("B").unwrap().code, "123456");
    assert_eq!(scheduler.presenter().errors_for("B"), 1);
  }

  #[tokio::test]
  async fn test_unknown_key_is_reported() {
    let fetcher = ScriptedFetcher::new();
    let mut scheduler = scheduler(&[], &fetcher);

    let result = scheduler.refresh_one("nope").await;
    assert!(matches!(result, Err(RefreshError::UnknownKey(_))));
    assert_eq!(fetcher.calls(), 0);
    assert_eq!(scheduler.presenter().errors_for("nope"), 1);
  }

  #[tokio::test]
  async fn test_malformed_response_is_dropped() {
    let fetcher = ScriptedFetcher::new();
    let mut scheduler = scheduler(&[("A", "site-A")], &fetcher);

    fetcher.respond("A", fetched("", 100, 30));
    let result = scheduler.refresh_one("A").await;

    assert!(matches!(result, Err(RefreshError::Invalid(_))));
    assert!(scheduler.store().get("A").is_none());
    assert_eq!(scheduler.presenter().errors_for("A"), 1);
  }

  #[tokio::test]
  async fn test_missing_label_uses_registry_label() {
    let fetcher = ScriptedFetcher::new();
    let mut scheduler = scheduler(&[("A", "site-A")], &fetcher);

    fetcher.respond("A", fetched("111111", 100, 30));
    scheduler.refresh_one("A").await.unwrap();
    assert_eq!(scheduler.store().get("A").unwrap().label, "site-A");
  }

  #[tokio::test(start_paused = true)]
  async fn test_refresh_all_counts_regardless_of_completion_order() {
    let fetcher = ScriptedFetcher::new();
    let mut scheduler = scheduler(
      &[("a", "A"), ("b", "B"), ("c", "C"), ("d", "D"), ("e", "E")],
      &fetcher,
    );

    // Later keys finish first; two of five fail
    fetcher
      .respond_after("a", Ok(fetched("1", 100, 30)), Duration::from_secs(5))
      .respond_after(
        "b",
        Err(FetchError::Transport("reset".to_string())),
        Duration::from_secs(4),
      )
      .respond_after("c", Ok(fetched("3", 100, 30)), Duration::from_secs(3))
      .respond_after("d", Err(FetchError::Status(500)), Duration::from_secs(2))
      .respond_after("e", Ok(fetched("5", 100, 30)), Duration::from_secs(1));

    let summary = scheduler.refresh_all().await;

    assert_eq!(
      summary,
      RefreshSummary {
        applied: 3,
        rejected: 0,
        failed: 2,
      }
    );
    assert_eq!(scheduler.store().len(), 3);
    assert_eq!(scheduler.presenter().updated.len(), 3);
    assert_eq!(scheduler.presenter().errors.len(), 2);
    assert_eq!(scheduler.presenter().completed, vec![summary]);

    let order: Vec<&str> = scheduler.records().map(|r| r.key.as_str()).collect();
    assert_eq!(order, vec!["a", "c", "e"]);
  }

  #[tokio::test]
  async fn test_key_state_transitions() {
    let fetcher = ScriptedFetcher::new();
    let mut scheduler = scheduler(&[("A", "site-A")], &fetcher);

    assert_eq!(scheduler.key_state("A", at(0)), KeyState::Uninitialized);

    scheduler.begin("A");
    assert_eq!(scheduler.key_state("A", at(0)), KeyState::Pending);
    scheduler.finish("A");

    fetcher.respond("A", fetched("111111", 100, 30));
    scheduler.refresh_one("A").await.unwrap();
    assert_eq!(scheduler.key_state("A", at(110)), KeyState::Fresh);
    assert_eq!(scheduler.key_state("A", at(130)), KeyState::Stale);
  }

  #[tokio::test]
  async fn test_cached_response_gives_first_paint() {
    let fetcher = ScriptedFetcher::new();
    let cache = Arc::new(MemoryStore::new());
    let now = Utc::now().timestamp();

    cache
      .put(&CodeRecord::new("A", "site-A", "cached", at(now), 120))
      .await
      .unwrap();

    let mut scheduler = scheduler(&[("A", "site-A")], &fetcher).with_cache(cache.clone());
    assert_eq!(scheduler.restore_cached().await, 1);
    assert_eq!(scheduler.store().get("A").unwrap().code, "cached");
    assert_eq!(fetcher.calls(), 0);

    // The network answer is newer and supersedes the cached one
    fetcher.respond("A", fetched("network", now + 5, 120));
    scheduler.refresh_one("A").await.unwrap();
    assert_eq!(scheduler.store().get("A").unwrap().code, "network");
    assert_eq!(
      cache.get("A").await.unwrap().map(|r| r.code),
      Some("network".to_string())
    );
  }

  #[tokio::test]
  async fn test_expired_cache_entry_is_ignored() {
    let fetcher = ScriptedFetcher::new();
    let cache = Arc::new(MemoryStore::new());
    cache
      .put(&CodeRecord::new("A", "site-A", "old", at(100), 30))
      .await
      .unwrap();

    let mut scheduler = scheduler(&[("A", "site-A")], &fetcher).with_cache(cache);
    assert_eq!(scheduler.restore_cached().await, 0);
    assert!(scheduler.store().get("A").is_none());
  }

  #[tokio::test]
  async fn test_add_and_remove_site() {
    let fetcher = ScriptedFetcher::new();
    let mut scheduler = scheduler(&[], &fetcher);

    scheduler
      .add_site("A".to_string(), "site-A".to_string())
      .await
      .unwrap();
    let duplicate = scheduler
      .add_site("A".to_string(), "again".to_string())
      .await;
    assert!(matches!(duplicate, Err(RegistryError::DuplicateKey(_))));

    fetcher.respond("A", fetched("111111", 100, 30));
    scheduler.refresh_one("A").await.unwrap();

    assert!(scheduler.remove_site("A").await);
    assert!(scheduler.registry().is_empty());
    assert!(scheduler.store().is_empty());
    assert_eq!(scheduler.presenter().site_changes.len(), 2);
  }

  #[tokio::test]
  async fn test_result_for_removed_key_is_dropped() {
    let fetcher = ScriptedFetcher::new();
    let mut scheduler = scheduler(&[("A", "site-A")], &fetcher);

    scheduler.remove_site("A").await;
    let outcome = scheduler
      .complete("A", Ok(fetched("111111", 100, 30)))
      .await;

    assert_eq!(outcome.unwrap(), RefreshOutcome::Dropped);
    assert!(scheduler.store().is_empty());
  }

  #[tokio::test]
  async fn test_interval_follows_shortest_ttl() {
    let fetcher = ScriptedFetcher::new();
    let mut scheduler = scheduler(&[("A", "a"), ("B", "b")], &fetcher);
    assert_eq!(scheduler.current_interval(), Duration::from_secs(60));

    fetcher
      .respond("A", fetched("1", 100, 120))
      .respond("B", fetched("2", 100, 30));
    scheduler.refresh_all().await;

    assert_eq!(scheduler.current_interval(), Duration::from_secs(15));
  }
}
