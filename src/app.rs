use crate::codes::CodeRecord;
use crate::event::{Event, EventHandler};
use crate::presenter::{ChannelPresenter, DashboardEvent};
use crate::refresh::{Command, RefreshSummary, SchedulerHandle};
use crate::registry::Site;
use crate::ui;
use crate::ui::dialog::{AddSiteDialog, DialogResult};
use chrono::{DateTime, Utc};
use color_eyre::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use crossterm::terminal::{
  disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use crossterm::ExecutableCommand;
use ratatui::prelude::*;
use std::collections::HashMap;
use std::io::stdout;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::info;

/// Input mode
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
  Normal,
  AddSite,
}

/// Main application state
pub struct App {
  /// Tracked sites in display order
  sites: Vec<Site>,

  /// Latest code per site key
  records: HashMap<String, CodeRecord>,

  /// Last refresh error per site key, cleared by the next update
  errors: HashMap<String, String>,

  selected: usize,

  mode: Mode,

  dialog: AddSiteDialog,

  /// Message shown in the status bar
  status: Option<String>,

  last_refresh: Option<(DateTime<Utc>, RefreshSummary)>,

  /// Server shown in the header
  server: String,

  /// Commands to the refresh scheduler
  commands: Option<SchedulerHandle<ChannelPresenter>>,

  /// Whether to quit
  should_quit: bool,
}

impl App {
  pub fn new(server: String, sites: Vec<Site>, records: Vec<CodeRecord>) -> Self {
    Self {
      sites,
      records: records.into_iter().map(|r| (r.key.clone(), r)).collect(),
      errors: HashMap::new(),
      selected: 0,
      mode: Mode::Normal,
      dialog: AddSiteDialog::new(),
      status: None,
      last_refresh: None,
      server,
      commands: None,
      should_quit: false,
    }
  }

  pub async fn run(
    &mut self,
    handle: SchedulerHandle<ChannelPresenter>,
    dashboard: mpsc::UnboundedReceiver<DashboardEvent>,
  ) -> Result<()> {
    self.commands = Some(handle);

    // Setup terminal
    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    let result = self.event_loop(dashboard).await;

    // Cleanup terminal
    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;

    if let Some(handle) = self.commands.take() {
      handle.stop().await;
    }
    info!("Dashboard closed");

    result
  }

  async fn event_loop(&mut self, dashboard: mpsc::UnboundedReceiver<DashboardEvent>) -> Result<()> {
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;
    let mut events = EventHandler::new(Duration::from_millis(250), dashboard);

    // Main loop
    while !self.should_quit {
      // Draw UI
      terminal.draw(|frame| ui::draw(frame, self))?;

      // Handle events
      match events.next().await {
        Some(event) => self.handle_event(event),
        None => break,
      }
    }

    Ok(())
  }

  fn handle_event(&mut self, event: Event) {
    match event {
      Event::Key(key) => self.handle_key(key),
      Event::Tick => {} // Countdown redraw happens automatically
      Event::Dashboard(event) => self.handle_dashboard_event(event),
    }
  }

  fn handle_dashboard_event(&mut self, event: DashboardEvent) {
    match event {
      DashboardEvent::RecordUpdated(record) => {
        self.errors.remove(&record.key);
        self.records.insert(record.key.clone(), record);
      }
      DashboardEvent::RefreshFailed { key, error } => {
        self.errors.insert(key, error);
      }
      DashboardEvent::RefreshComplete(summary) => {
        self.last_refresh = Some((Utc::now(), summary));
      }
      DashboardEvent::SitesChanged(sites) => {
        self.records.retain(|key, _| sites.iter().any(|s| &s.key == key));
        self.errors.retain(|key, _| sites.iter().any(|s| &s.key == key));
        self.sites = sites;
        self.clamp_selection();
      }
      DashboardEvent::Warning(message) => {
        self.status = Some(message);
      }
    }
  }

  fn handle_key(&mut self, key: KeyEvent) {
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
      self.should_quit = true;
      return;
    }

    match self.mode {
      Mode::Normal => self.handle_normal_mode_key(key),
      Mode::AddSite => self.handle_dialog_key(key),
    }
  }

  fn handle_normal_mode_key(&mut self, key: KeyEvent) {
    match key.code {
      KeyCode::Char('q') | KeyCode::Esc => self.should_quit = true,

      // Navigation
      KeyCode::Up | KeyCode::Char('k') => self.move_selection(-1),
      KeyCode::Down | KeyCode::Char('j') => self.move_selection(1),

      KeyCode::Char('r') => {
        self.status = Some("Refreshing...".to_string());
        self.send(Command::RefreshNow);
      }
      KeyCode::Char('a') => {
        self.dialog = AddSiteDialog::new();
        self.mode = Mode::AddSite;
      }
      KeyCode::Char('d') | KeyCode::Delete => {
        if let Some(site) = self.sites.get(self.selected) {
          self.status = Some(format!("Removed {}", site.label));
          let key = site.key.clone();
          self.send(Command::RemoveSite { key });
        }
      }

      _ => {}
    }
  }

  fn handle_dialog_key(&mut self, key: KeyEvent) {
    match self.dialog.handle_key(key) {
      DialogResult::Consumed => {}
      DialogResult::Cancelled => self.mode = Mode::Normal,
      DialogResult::Submitted { key, label } => {
        self.mode = Mode::Normal;
        if self.sites.iter().any(|s| s.key == key) {
          self.status = Some(format!("Site '{}' is already on the dashboard", key));
          return;
        }
        self.status = Some(format!("Added {}", label));
        self.send(Command::AddSite { key, label });
      }
    }
  }

  fn send(&mut self, command: Command) {
    let sent = self
      .commands
      .as_ref()
      .map(|handle| handle.send(command))
      .unwrap_or(false);
    if !sent {
      self.status = Some("Refresh scheduler is not running".to_string());
    }
  }

  fn move_selection(&mut self, delta: i32) {
    if self.sites.is_empty() {
      return;
    }
    let max = self.sites.len() as i32 - 1;
    self.selected = (self.selected as i32 + delta).clamp(0, max) as usize;
  }

  fn clamp_selection(&mut self) {
    self.selected = self.selected.min(self.sites.len().saturating_sub(1));
  }

  // Accessors for rendering

  pub fn mode(&self) -> &Mode {
    &self.mode
  }

  pub fn dialog(&self) -> &AddSiteDialog {
    &self.dialog
  }

  pub fn server(&self) -> &str {
    &self.server
  }

  pub fn status(&self) -> Option<&str> {
    self.status.as_deref()
  }

  pub fn last_refresh(&self) -> Option<&(DateTime<Utc>, RefreshSummary)> {
    self.last_refresh.as_ref()
  }

  /// Cards in display order
  pub fn cards(&self) -> Vec<ui::cards::CardView<'_>> {
    self
      .sites
      .iter()
      .enumerate()
      .map(|(i, site)| ui::cards::CardView {
        site,
        record: self.records.get(&site.key),
        error: self.errors.get(&site.key).map(String::as_str),
        selected: i == self.selected,
      })
      .collect()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::TimeZone;

  fn record(key: &str, code: &str) -> CodeRecord {
    CodeRecord::new(key, key, code, Utc.timestamp_opt(100, 0).unwrap(), 30)
  }

  fn app() -> App {
    App::new(
      "http://localhost:9019".to_string(),
      vec![Site::new("a", "site-a"), Site::new("b", "site-b")],
      vec![record("a", "111111")],
    )
  }

  fn key(code: KeyCode) -> KeyEvent {
    KeyEvent::new(code, KeyModifiers::NONE)
  }

  #[test]
  fn test_record_update_clears_error() {
    let mut app = app();
    app.handle_dashboard_event(DashboardEvent::RefreshFailed {
      key: "b".to_string(),
      error: "timeout".to_string(),
    });
    assert_eq!(app.cards()[1].error, Some("timeout"));

    app.handle_dashboard_event(DashboardEvent::RecordUpdated(record("b", "222222")));
    let cards = app.cards();
    assert_eq!(cards[1].error, None);
    assert_eq!(cards[1].record.map(|r| r.code.as_str()), Some("222222"));
  }

  #[test]
  fn test_sites_changed_drops_removed_cards() {
    let mut app = app();
    app.move_selection(1);

    app.handle_dashboard_event(DashboardEvent::SitesChanged(vec![Site::new("b", "site-b")]));
    let cards = app.cards();
    assert_eq!(cards.len(), 1);
    assert!(cards[0].selected);
    assert!(app.records.get("a").is_none());
  }

  #[test]
  fn test_selection_is_clamped() {
    let mut app = app();
    app.handle_key(key(KeyCode::Char('k')));
    assert_eq!(app.selected, 0);
    app.handle_key(key(KeyCode::Char('j')));
    app.handle_key(key(KeyCode::Char('j')));
    assert_eq!(app.selected, 1);
  }

  #[test]
  fn test_add_dialog_rejects_known_key() {
    let mut app = app();
    app.handle_key(key(KeyCode::Char('a')));
    assert_eq!(app.mode(), &Mode::AddSite);

    app.handle_key(key(KeyCode::Char('a')));
    app.handle_key(key(KeyCode::Enter));
    app.handle_key(key(KeyCode::Enter));

    assert_eq!(app.mode(), &Mode::Normal);
    assert!(app.status().unwrap().contains("already"));
  }

  #[test]
  fn test_commands_without_scheduler_report_status() {
    let mut app = app();
    app.handle_key(key(KeyCode::Char('r')));
    assert_eq!(app.status(), Some("Refresh scheduler is not running"));
  }

  #[test]
  fn test_storage_warning_reaches_status_bar() {
    use crate::presenter::Presenter;

    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut presenter = ChannelPresenter::new(tx);
    presenter.on_warning("Saved site list could not be read, starting empty");

    let mut app = app();
    app.handle_dashboard_event(rx.try_recv().unwrap());
    assert_eq!(
      app.status(),
      Some("Saved site list could not be read, starting empty")
    );
  }

  #[test]
  fn test_quit_keys() {
    let mut app = app();
    app.handle_key(KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL));
    assert!(app.should_quit);
  }
}
