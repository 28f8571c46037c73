//! Resubmits queued writes once the backend is reachable again.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::cache::QueueStore;
use crate::error::{OfflineError, Result};
use crate::net::{Method, Transport};
use crate::queue::{PersistentQueue, QueuedRequest};

/// What one completed drain did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DrainReport {
  /// Entries in the snapshot
  pub attempted: usize,
  /// Ids accepted by the backend and removed from the queue
  pub synced: Vec<String>,
  /// Ids left queued, with the reason
  pub failed: Vec<(String, String)>,
  /// Queue length after the drain, including entries added meanwhile
  pub remaining: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DrainOutcome {
  Completed(DrainReport),
  Skipped(SkipReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
  /// Another drain was still in flight
  AlreadyRunning,
  /// Nothing was queued
  Empty,
}

pub struct Reconciler<T: Transport, B: QueueStore> {
  queue: Arc<PersistentQueue<B>>,
  transport: Arc<T>,
  in_flight: Mutex<()>,
  /// Set by a drain that found another one running
  rerun: AtomicBool,
}

impl<T: Transport, B: QueueStore> Reconciler<T, B> {
  pub fn new(queue: Arc<PersistentQueue<B>>, transport: Arc<T>) -> Self {
    Self {
      queue,
      transport,
      in_flight: Mutex::new(()),
      rerun: AtomicBool::new(false),
    }
  }

  pub fn queue(&self) -> &Arc<PersistentQueue<B>> {
    &self.queue
  }

  pub fn is_draining(&self) -> bool {
    self.in_flight.try_lock().is_err()
  }

  /// Resubmit a snapshot of the queue, oldest first.
  ///
  /// Accepted entries are removed; everything else stays queued and the
  /// drain moves on. Entries enqueued after the snapshot wait for the next
  /// drain. While one drain runs, further calls return
  /// `Skipped(AlreadyRunning)` so no entry is submitted twice, and the
  /// running drain takes one more pass with a fresh snapshot once it is done.
  /// The returned report covers every pass.
  pub async fn drain(&self) -> DrainOutcome {
    let mut outcome: Option<DrainOutcome> = None;

    loop {
      let Ok(guard) = self.in_flight.try_lock() else {
        self.rerun.store(true, Ordering::SeqCst);
        return match outcome {
          Some(outcome) => outcome,
          None => {
            debug!("Drain already in progress, deferring to it");
            DrainOutcome::Skipped(SkipReason::AlreadyRunning)
          }
        };
      };
      self.rerun.store(false, Ordering::SeqCst);

      let pass = self.drain_snapshot().await;
      outcome = Some(match outcome {
        Some(previous) => merge(previous, pass),
        None => pass,
      });
      drop(guard);

      if !self.rerun.load(Ordering::SeqCst) {
        break;
      }
      debug!("Drain requested while running, taking another pass");
    }

    outcome.unwrap_or(DrainOutcome::Skipped(SkipReason::Empty))
  }

  async fn drain_snapshot(&self) -> DrainOutcome {
    let snapshot = self.queue.all().await;
    if snapshot.is_empty() {
      return DrainOutcome::Skipped(SkipReason::Empty);
    }

    info!("Syncing {} pending request(s)", snapshot.len());
    let mut report = DrainReport {
      attempted: snapshot.len(),
      ..Default::default()
    };

    for entry in &snapshot {
      match self.submit(entry).await {
        Ok(()) => {
          if let Err(e) = self.queue.remove(&entry.id).await {
            warn!("Synced {} but could not persist its removal: {}", entry.id, e);
          }
          report.synced.push(entry.id.clone());
        }
        Err(e) => {
          warn!(
            "Sync failed for {} {}: {}",
            Method::from(entry.method),
            entry.target,
            e
          );
          report.failed.push((entry.id.clone(), e.to_string()));
        }
      }
    }

    report.remaining = self.queue.count().await;
    info!(
      synced = report.synced.len(),
      failed = report.failed.len(),
      remaining = report.remaining,
      "Drain finished"
    );
    DrainOutcome::Completed(report)
  }

  async fn submit(&self, entry: &QueuedRequest) -> Result<()> {
    let response = self.transport.send(&entry.to_request()).await?;
    if response.is_success() {
      Ok(())
    } else {
      Err(OfflineError::NonSuccessStatus {
        target: entry.target.clone(),
        status: response.status,
      })
    }
  }
}

/// Fold a follow-up pass into the outcome of the passes before it.
fn merge(previous: DrainOutcome, next: DrainOutcome) -> DrainOutcome {
  match (previous, next) {
    (DrainOutcome::Completed(mut report), DrainOutcome::Completed(more)) => {
      report.attempted += more.attempted;
      report.synced.extend(more.synced);
      report.failed.extend(more.failed);
      report.remaining = more.remaining;
      DrainOutcome::Completed(report)
    }
    (DrainOutcome::Completed(mut report), DrainOutcome::Skipped(SkipReason::Empty)) => {
      report.remaining = 0;
      DrainOutcome::Completed(report)
    }
    (DrainOutcome::Completed(report), DrainOutcome::Skipped(_)) => DrainOutcome::Completed(report),
    (DrainOutcome::Skipped(_), next) => next,
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::net::{Response, WriteMethod};
  use crate::testing::{payload, FakeTransport, MemoryStorage};
  use serde_json::json;
  use tokio::sync::Semaphore;

  fn queue() -> Arc<PersistentQueue<MemoryStorage>> {
    Arc::new(PersistentQueue::open(Arc::new(MemoryStorage::new())))
  }

  async fn fill(queue: &PersistentQueue<MemoryStorage>, n: usize) -> Vec<QueuedRequest> {
    let mut entries = Vec::new();
    for i in 0..n {
      entries.push(
        queue
          .enqueue(
            WriteMethod::Create,
            "/grading/api/students/",
            payload(json!({ "position": i })),
          )
          .await
          .unwrap(),
      );
    }
    entries
  }

  /// Accepts entries at even positions and rejects odd ones.
  fn even_only() -> FakeTransport {
    FakeTransport::new(|req| {
      let position = req
        .payload
        .as_ref()
        .and_then(|p| p.get("position"))
        .and_then(|v| v.as_u64())
        .unwrap_or(1);
      if position % 2 == 0 {
        Ok(Response::new(201, None, Vec::new()))
      } else {
        Ok(Response::new(400, None, b"invalid".to_vec()))
      }
    })
  }

  #[tokio::test]
  async fn test_drain_removes_exactly_accepted_entries() {
    let queue = queue();
    let entries = fill(&queue, 7).await;
    let reconciler = Reconciler::new(Arc::clone(&queue), Arc::new(even_only()));

    let DrainOutcome::Completed(report) = reconciler.drain().await else {
      panic!("drain should run");
    };

    let odd: Vec<QueuedRequest> = entries.iter().skip(1).step_by(2).cloned().collect();
    assert_eq!(queue.all().await, odd);
    assert_eq!(report.attempted, 7);
    assert_eq!(report.synced.len(), 4);
    assert_eq!(report.failed.len(), 3);
    assert_eq!(report.remaining, 3);
  }

  #[tokio::test]
  async fn test_drain_submits_in_fifo_order_and_continues_after_failures() {
    let queue = queue();
    fill(&queue, 3).await;
    let transport = Arc::new(FakeTransport::unreachable());
    let reconciler = Reconciler::new(Arc::clone(&queue), Arc::clone(&transport));

    reconciler.drain().await;

    let positions: Vec<u64> = transport
      .calls()
      .iter()
      .filter_map(|r| r.payload.as_ref()?.get("position")?.as_u64())
      .collect();
    assert_eq!(positions, vec![0, 1, 2]);
    assert_eq!(queue.count().await, 3);
  }

  #[tokio::test]
  async fn test_drain_on_empty_queue_is_skipped() {
    let transport = Arc::new(FakeTransport::accepting());
    let reconciler = Reconciler::new(queue(), Arc::clone(&transport));

    assert_eq!(
      reconciler.drain().await,
      DrainOutcome::Skipped(SkipReason::Empty)
    );
    assert_eq!(transport.call_count(), 0);
  }

  #[tokio::test]
  async fn test_concurrent_drain_is_suppressed() {
    let queue = queue();
    fill(&queue, 2).await;
    let gate = Arc::new(Semaphore::new(0));
    let transport = Arc::new(FakeTransport::accepting().with_gate(Arc::clone(&gate)));
    let reconciler = Arc::new(Reconciler::new(Arc::clone(&queue), Arc::clone(&transport)));

    let first = tokio::spawn({
      let reconciler = Arc::clone(&reconciler);
      async move { reconciler.drain().await }
    });
    while transport.call_count() == 0 {
      tokio::task::yield_now().await;
    }
    assert!(reconciler.is_draining());

    assert_eq!(
      reconciler.drain().await,
      DrainOutcome::Skipped(SkipReason::AlreadyRunning)
    );

    gate.add_permits(2);
    let DrainOutcome::Completed(report) = first.await.unwrap() else {
      panic!("first drain should complete");
    };
    assert_eq!(report.synced.len(), 2);
    assert_eq!(transport.call_count(), 2);
    assert_eq!(queue.count().await, 0);
  }

  #[tokio::test]
  async fn test_entries_enqueued_during_drain_wait_for_next_drain() {
    let queue = queue();
    fill(&queue, 1).await;
    let gate = Arc::new(Semaphore::new(0));
    let transport = Arc::new(FakeTransport::accepting().with_gate(Arc::clone(&gate)));
    let reconciler = Arc::new(Reconciler::new(Arc::clone(&queue), Arc::clone(&transport)));

    let first = tokio::spawn({
      let reconciler = Arc::clone(&reconciler);
      async move { reconciler.drain().await }
    });
    while transport.call_count() == 0 {
      tokio::task::yield_now().await;
    }
    let late = queue
      .enqueue(WriteMethod::Create, "/grading/api/students/", None)
      .await
      .unwrap();
    gate.add_permits(1);

    let DrainOutcome::Completed(report) = first.await.unwrap() else {
      panic!("drain should complete");
    };
    assert_eq!(report.attempted, 1);
    assert_eq!(report.remaining, 1);
    assert_eq!(queue.all().await, vec![late]);

    gate.add_permits(1);
    reconciler.drain().await;
    assert_eq!(queue.count().await, 0);
  }

  #[tokio::test]
  async fn test_suppressed_drain_triggers_another_pass() {
    let queue = queue();
    fill(&queue, 1).await;
    let gate = Arc::new(Semaphore::new(0));
    let transport = Arc::new(FakeTransport::accepting().with_gate(Arc::clone(&gate)));
    let reconciler = Arc::new(Reconciler::new(Arc::clone(&queue), Arc::clone(&transport)));

    let first = tokio::spawn({
      let reconciler = Arc::clone(&reconciler);
      async move { reconciler.drain().await }
    });
    while transport.call_count() == 0 {
      tokio::task::yield_now().await;
    }
    fill(&queue, 2).await;
    assert_eq!(
      reconciler.drain().await,
      DrainOutcome::Skipped(SkipReason::AlreadyRunning)
    );

    gate.add_permits(3);
    let DrainOutcome::Completed(report) = first.await.unwrap() else {
      panic!("drain should complete");
    };
    assert_eq!(report.attempted, 3);
    assert_eq!(report.synced.len(), 3);
    assert_eq!(report.remaining, 0);
    assert_eq!(transport.call_count(), 3);
    assert!(!reconciler.is_draining());
  }

  #[tokio::test]
  async fn test_unsaved_removal_is_not_resubmitted_this_session() {
    let storage = Arc::new(MemoryStorage::new());
    let queue = Arc::new(PersistentQueue::open(Arc::clone(&storage)));
    fill(&queue, 2).await;
    let transport = Arc::new(FakeTransport::accepting());
    let reconciler = Reconciler::new(Arc::clone(&queue), Arc::clone(&transport));

    storage.fail_writes(true);
    let DrainOutcome::Completed(report) = reconciler.drain().await else {
      panic!("drain should complete");
    };
    assert_eq!(report.synced.len(), 2);
    assert_eq!(report.remaining, 0);
    assert!(!queue.is_available().await);

    assert_eq!(
      reconciler.drain().await,
      DrainOutcome::Skipped(SkipReason::Empty)
    );
    assert_eq!(transport.call_count(), 2);

    // The stored blob still lists both, so a restart sends them again
    storage.fail_writes(false);
    let reloaded = PersistentQueue::open(Arc::clone(&storage));
    assert_eq!(reloaded.count().await, 2);
  }

  #[tokio::test]
  async fn test_removal_save_is_retried_once() {
    let storage = Arc::new(MemoryStorage::new());
    let queue = Arc::new(PersistentQueue::open(Arc::clone(&storage)));
    fill(&queue, 1).await;
    let reconciler = Reconciler::new(Arc::clone(&queue), Arc::new(FakeTransport::accepting()));

    storage.fail_next_writes(1);
    assert!(matches!(reconciler.drain().await, DrainOutcome::Completed(_)));

    assert!(queue.is_available().await);
    assert_eq!(PersistentQueue::open(storage).count().await, 0);
  }
}

