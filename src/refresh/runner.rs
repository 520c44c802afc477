//! Timer-driven run loop for the scheduler.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::codes::FetchedCode;
use crate::error::FetchError;
use crate::presenter::Presenter;

use super::scheduler::{tally, RefreshScheduler};
use super::RefreshSummary;

/// Requests a running scheduler accepts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
  RefreshNow,
  AddSite { key: String, label: String },
  RemoveSite { key: String },
}

/// A finished fetch on its way back to the loop.
struct Completion {
  batch: Option<u64>,
  key: String,
  result: Result<FetchedCode, FetchError>,
}

/// Progress of one refresh-all batch.
#[derive(Default)]
struct Batch {
  remaining: usize,
  summary: RefreshSummary,
}

/// Control handle for a scheduler running on its own task.
pub struct SchedulerHandle<P: Presenter> {
  commands: mpsc::UnboundedSender<Command>,
  shutdown: CancellationToken,
  task: JoinHandle<RefreshScheduler<P>>,
}

impl<P: Presenter + 'static> SchedulerHandle<P> {
  /// Queue a command. Returns false once the loop has exited.
  pub fn send(&self, command: Command) -> bool {
    self.commands.send(command).is_ok()
  }

  pub fn refresh_now(&self) -> bool {
    self.send(Command::RefreshNow)
  }

  /// Cancel the timer, let in-flight fetches land, and hand the scheduler back.
  pub async fn stop(self) -> Option<RefreshScheduler<P>> {
    self.shutdown.cancel();
    match self.task.await {
      Ok(scheduler) => Some(scheduler),
      Err(e) => {
        warn!(error = %e, "Refresh loop ended abnormally");
        None
      }
    }
  }
}

impl<P: Presenter + 'static> RefreshScheduler<P> {
  /// Start the refresh loop on the current runtime. The first refresh runs immediately.
  pub fn spawn(self) -> SchedulerHandle<P> {
    let (tx, rx) = mpsc::unbounded_channel();
    let shutdown = CancellationToken::new();
    let task = tokio::spawn(self.run(rx, shutdown.clone()));

    SchedulerHandle {
      commands: tx,
      shutdown,
      task,
    }
  }

  async fn run(
    mut self,
    mut commands: mpsc::UnboundedReceiver<Command>,
    shutdown: CancellationToken,
  ) -> Self {
    let (done_tx, mut done_rx) = mpsc::unbounded_channel::<Completion>();
    let mut batches: HashMap<u64, Batch> = HashMap::new();
    let mut next_batch_id = 0u64;
    let mut next_tick = Instant::now();
    let mut stopping = false;

    info!("Refresh loop started");

    loop {
      if stopping && self.in_flight_count() == 0 {
        break;
      }

      tokio::select! {
        _ = shutdown.cancelled(), if !stopping => {
          info!(in_flight = self.in_flight_count(), "Stopping refresh timer");
          stopping = true;
        }
        _ = tokio::time::sleep_until(next_tick), if !stopping => {
          let id = next_batch_id;
          next_batch_id += 1;
          self.start_batch(id, &mut batches, &done_tx).await;
          next_tick = Instant::now() + self.current_interval();
          debug!(next_in = ?self.current_interval(), "Scheduled next refresh");
        }
        command = commands.recv(), if !stopping => match command {
          Some(Command::RefreshNow) => {
            let id = next_batch_id;
            next_batch_id += 1;
            self.start_batch(id, &mut batches, &done_tx).await;
            next_tick = Instant::now() + self.current_interval();
          }
          Some(Command::AddSite { key, label }) => {
            match self.add_site(key.clone(), label).await {
              Ok(()) => {
                self.apply_cached(&key).await;
                self.spawn_fetch(None, key, &done_tx);
              }
              Err(e) => {
                warn!(key = %key, error = %e, "Failed to add site");
                self.presenter.on_warning(&e.to_string());
              }
            }
          }
          Some(Command::RemoveSite { key }) => {
            self.remove_site(&key).await;
          }
          None => {
            debug!("Command channel closed");
            stopping = true;
          }
        },
        Some(completion) = done_rx.recv() => {
          self.finish(&completion.key);
          let outcome = self.complete(&completion.key, completion.result).await;

          let settled = match completion.batch {
            Some(id) => match batches.get_mut(&id) {
              Some(batch) => {
                tally(&mut batch.summary, &outcome);
                batch.remaining -= 1;
                if batch.remaining == 0 {
                  let summary = batch.summary;
                  batches.remove(&id);
                  self.report_batch(&summary);
                  true
                } else {
                  false
                }
              }
              None => false,
            },
            None => true,
          };

          // New codes can shorten the interval; never push the tick later
          if settled && !stopping {
            let due = Instant::now() + self.current_interval();
            if due < next_tick {
              next_tick = due;
              debug!(next_in = ?self.current_interval(), "Rescheduled next refresh");
            }
          }
        }
      }
    }

    info!("Refresh loop stopped");
    self
  }

  /// Issue a fetch for every registered key that is not already in flight.
  async fn start_batch(
    &mut self,
    id: u64,
    batches: &mut HashMap<u64, Batch>,
    done_tx: &mpsc::UnboundedSender<Completion>,
  ) {
    let keys: Vec<String> = self
      .registry
      .keys()
      .into_iter()
      .filter(|key| {
        let busy = self.is_in_flight(key);
        if busy {
          debug!(key = %key, "Fetch already in flight, skipping");
        }
        !busy
      })
      .collect();

    if keys.is_empty() {
      self.report_batch(&RefreshSummary::default());
      return;
    }

    batches.insert(
      id,
      Batch {
        remaining: keys.len(),
        summary: RefreshSummary::default(),
      },
    );

    for key in keys {
      self.apply_cached(&key).await;
      self.spawn_fetch(Some(id), key, done_tx);
    }
  }

  fn spawn_fetch(
    &mut self,
    batch: Option<u64>,
    key: String,
    done_tx: &mpsc::UnboundedSender<Completion>,
  ) {
    self.begin(&key);
    let fetcher = Arc::clone(&self.fetcher);
    let tx = done_tx.clone();

    tokio::spawn(async move {
      let result = fetcher.fetch(&key).await;
      let _ = tx.send(Completion { batch, key, result });
    });
  }
}
