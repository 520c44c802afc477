//! Notification sinks for the refresh core.

use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::codes::CodeRecord;
use crate::error::RefreshError;
use crate::refresh::RefreshSummary;
use crate::registry::Site;

/// Receives updates from the scheduler. The core knows nothing about rendering.
pub trait Presenter: Send + Sync {
  fn on_record_updated(&mut self, record: &CodeRecord);

  fn on_refresh_error(&mut self, key: &str, error: &RefreshError);

  fn on_refresh_complete(&mut self, _summary: &RefreshSummary) {}

  fn on_sites_changed(&mut self, _sites: &[Site]) {}

  fn on_warning(&mut self, _message: &str) {}
}

/// Notifications as messages, for consumers on another task.
#[derive(Debug, Clone)]
pub enum DashboardEvent {
  RecordUpdated(CodeRecord),
  RefreshFailed { key: String, error: String },
  RefreshComplete(RefreshSummary),
  SitesChanged(Vec<Site>),
  Warning(String),
}

/// Forwards notifications over a channel.
pub struct ChannelPresenter {
  tx: mpsc::UnboundedSender<DashboardEvent>,
}

impl ChannelPresenter {
  pub fn new(tx: mpsc::UnboundedSender<DashboardEvent>) -> Self {
    Self { tx }
  }

  fn send(&self, event: DashboardEvent) {
    // The receiver going away just means nobody is watching anymore
    let _ = self.tx.send(event);
  }
}

impl Presenter for ChannelPresenter {
  fn on_record_updated(&mut self, record: &CodeRecord) {
    self.send(DashboardEvent::RecordUpdated(record.clone()));
  }

  fn on_refresh_error(&mut self, key: &str, error: &RefreshError) {
    self.send(DashboardEvent::RefreshFailed {
      key: key.to_string(),
      error: error.to_string(),
    });
  }

  fn on_refresh_complete(&mut self, summary: &RefreshSummary) {
    self.send(DashboardEvent::RefreshComplete(*summary));
  }

  fn on_sites_changed(&mut self, sites: &[Site]) {
    self.send(DashboardEvent::SitesChanged(sites.to_vec()));
  }

  fn on_warning(&mut self, message: &str) {
    self.send(DashboardEvent::Warning(message.to_string()));
  }
}

/// Logs notifications; used when there is no interactive UI.
#[derive(Debug, Default)]
pub struct LogPresenter;

impl Presenter for LogPresenter {
  fn on_record_updated(&mut self, record: &CodeRecord) {
    info!(key = %record.key, issued_at = %record.issued_at, "Code updated");
  }

  fn on_refresh_error(&mut self, key: &str, error: &RefreshError) {
    warn!(key = %key, error = %error, "Refresh failed");
  }

  fn on_warning(&mut self, message: &str) {
    warn!("{}", message);
  }
}
