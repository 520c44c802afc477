mod app;
mod codes;
mod config;
mod error;
mod event;
mod fetch;
mod presenter;
mod refresh;
mod registry;
mod storage;
mod ui;

use clap::Parser;
use color_eyre::{eyre::eyre, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use crate::config::{Config, StorageConfig};
use crate::fetch::HttpFetcher;
use crate::presenter::{ChannelPresenter, LogPresenter, Presenter};
use crate::refresh::{IntervalPolicy, RefreshScheduler};
use crate::registry::SiteRegistry;
use crate::storage::{MemoryStore, PersistenceStore, ResponseCache, SqliteStore};

#[derive(Parser, Debug)]
#[command(name = "codeboard")]
#[command(about = "A terminal dashboard for rotating two-factor codes")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/codeboard/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Code server base URL, overrides server.url
  #[arg(short, long)]
  server: Option<String>,

  /// Keep the site list and codes in memory only
  #[arg(long)]
  no_cache: bool,

  /// Refresh once, print the codes and exit
  #[arg(long)]
  once: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Load configuration
  let mut config = Config::load(args.config.as_deref())?;

  // Command line overrides
  if let Some(server) = args.server {
    config.server.url = server;
  }
  if args.no_cache {
    config.storage.enabled = false;
  }
  config.require_server()?;

  let _guard = init_logging(args.once)?;

  let (persistence, cache) = open_storage(&config.storage);
  let (mut registry, load_error) = SiteRegistry::load(persistence).await;
  let load_warning =
    load_error.map(|e| format!("Saved site list could not be read, starting empty: {}", e));

  // First start: seed the configured sites
  if registry.is_empty() && !config.sites.is_empty() {
    for site in &config.sites {
      if let Err(e) = registry.add(site.key.clone(), site.label.clone()).await {
        warn!(key = %site.key, error = %e, "Failed to seed site");
      }
    }
  }

  let fetcher = Arc::new(HttpFetcher::new(&config.server)?);
  let policy = IntervalPolicy::from_config(&config.refresh);

  if args.once {
    let mut presenter = LogPresenter;
    if let Some(message) = &load_warning {
      presenter.on_warning(message);
    }
    let mut scheduler = RefreshScheduler::new(registry, fetcher, presenter)
      .with_cache(cache)
      .with_policy(policy);
    return print_once(&mut scheduler).await;
  }

  let (tx, rx) = mpsc::unbounded_channel();
  let mut presenter = ChannelPresenter::new(tx);
  if let Some(message) = &load_warning {
    presenter.on_warning(message);
  }
  let mut scheduler = RefreshScheduler::new(registry, fetcher, presenter)
    .with_cache(cache)
    .with_policy(policy);
  scheduler.restore_cached().await;

  let sites = scheduler.registry().list().to_vec();
  let records = scheduler.records().cloned().collect();

  // Initialize and run the app
  let mut app = app::App::new(config.server.url.clone(), sites, records);
  app.run(scheduler.spawn(), rx).await?;

  Ok(())
}

/// Set up tracing. The dashboard owns the terminal, so it logs to a file.
fn init_logging(to_stderr: bool) -> Result<Option<WorkerGuard>> {
  let filter =
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("codeboard=info"));

  if to_stderr {
    tracing_subscriber::fmt()
      .with_env_filter(filter)
      .with_writer(std::io::stderr)
      .init();
    return Ok(None);
  }

  let log_dir = dirs::data_dir()
    .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
    .ok_or_else(|| eyre!("Could not determine data directory"))?
    .join("codeboard")
    .join("logs");
  std::fs::create_dir_all(&log_dir)
    .map_err(|e| eyre!("Failed to create log directory {}: {}", log_dir.display(), e))?;

  let appender = tracing_appender::rolling::daily(&log_dir, "codeboard.log");
  let (writer, guard) = tracing_appender::non_blocking(appender);

  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(writer)
    .with_ansi(false)
    .init();

  Ok(Some(guard))
}

/// Open on-disk storage, falling back to memory when it is disabled or unavailable.
fn open_storage(config: &StorageConfig) -> (Arc<dyn PersistenceStore>, Arc<dyn ResponseCache>) {
  if config.enabled {
    match SqliteStore::open(config.path.as_deref()) {
      Ok(store) => {
        let store = Arc::new(store);
        return (store.clone(), store);
      }
      Err(e) => warn!(error = %e, "Storage unavailable, keeping sites in memory"),
    }
  } else {
    info!("Storage disabled, keeping sites in memory");
  }

  let store = Arc::new(MemoryStore::new());
  (store.clone(), store)
}

/// Refresh every site once and print `label code remaining` lines.
async fn print_once(scheduler: &mut RefreshScheduler<LogPresenter>) -> Result<()> {
  scheduler.restore_cached().await;
  let summary = scheduler.refresh_all().await;

  let now = chrono::Utc::now();
  for site in scheduler.registry().list() {
    match scheduler.store().get(&site.key) {
      Some(record) => println!(
        "{:<32} {:>10} {:>4}s",
        ui::cards::truncate(&record.label, 32),
        record.code,
        record.remaining(now).num_seconds()
      ),
      None => println!("{:<32} {:>10} {:>5}", ui::cards::truncate(&site.label, 32), "-", "-"),
    }
  }

  if summary.failed > 0 && summary.failed == summary.total() {
    return Err(eyre!("All {} refreshes failed", summary.failed));
  }
  Ok(())
}
