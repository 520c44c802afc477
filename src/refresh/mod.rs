//! Periodic and on-demand refresh of tracked codes.
//!
//! `RefreshScheduler` owns the registry and the code store and is the only
//! writer to either. The run loop (see `runner`) serializes timer ticks,
//! commands and fetch completions onto one task, so merges need no locks.

mod runner;
mod scheduler;
#[cfg(test)]
mod test_support;

pub use runner::{Command, SchedulerHandle};
pub use scheduler::RefreshScheduler;

use std::time::Duration;

use crate::config::RefreshConfig;

/// Floor for the derived refresh interval.
pub const MIN_INTERVAL: Duration = Duration::from_secs(1);

/// Lifecycle of one key as seen by the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyState {
  /// No code has been received yet
  Uninitialized,
  /// A fetch is in flight
  Pending,
  /// The stored code is within its TTL
  Fresh,
  /// The stored code expired and awaits a refresh
  Stale,
}

/// What happened to a successful fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
  /// Stored as the newest code
  Applied,
  /// Older than or as old as the stored code
  Rejected,
  /// The key was unregistered while the fetch was in flight
  Dropped,
}

/// Aggregated result of refreshing every registered key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefreshSummary {
  pub applied: usize,
  pub rejected: usize,
  pub failed: usize,
}

impl RefreshSummary {
  pub fn total(&self) -> usize {
    self.applied + self.rejected + self.failed
  }
}

/// How long to wait between timer-driven refreshes.
#[derive(Debug, Clone, PartialEq)]
pub struct IntervalPolicy {
  fixed: Option<Duration>,
  ttl_fraction: f64,
  fallback: Duration,
}

impl Default for IntervalPolicy {
  fn default() -> Self {
    Self::from_config(&RefreshConfig::default())
  }
}

impl IntervalPolicy {
  pub fn from_config(config: &RefreshConfig) -> Self {
    Self {
      fixed: config.interval(),
      ttl_fraction: config.ttl_fraction,
      fallback: config.fallback_interval(),
    }
  }

  pub fn fixed(interval: Duration) -> Self {
    Self {
      fixed: Some(interval.max(MIN_INTERVAL)),
      ..Self::default()
    }
  }

  /// Interval for the given shortest TTL among tracked codes.
  pub fn interval(&self, shortest_ttl: Option<u32>) -> Duration {
    if let Some(fixed) = self.fixed {
      return fixed;
    }

    match shortest_ttl {
      Some(ttl) => Duration::from_secs_f64(f64::from(ttl) * self.ttl_fraction).max(MIN_INTERVAL),
      None => self.fallback,
    }
  }
}
