//! Pending-count and connectivity state for the UI layer.

use std::sync::Arc;
use tokio::sync::watch;

use crate::cache::QueueStore;
use crate::net::Connectivity;
use crate::queue::PersistentQueue;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusSnapshot {
  pub connectivity: Connectivity,
  pub pending: usize,
  /// False when local storage failed and writes can no longer be deferred
  pub queue_available: bool,
}

impl StatusSnapshot {
  /// Offline banner text, `None` while online.
  pub fn banner(&self) -> Option<String> {
    if self.connectivity.is_online() {
      return None;
    }
    if self.pending > 0 {
      Some(format!("You are offline ({} pending)", self.pending))
    } else {
      Some("You are offline".to_string())
    }
  }
}

pub struct StatusReporter<B: QueueStore> {
  queue: Arc<PersistentQueue<B>>,
  connectivity: watch::Receiver<Connectivity>,
}

impl<B: QueueStore> StatusReporter<B> {
  pub fn new(queue: Arc<PersistentQueue<B>>, connectivity: watch::Receiver<Connectivity>) -> Self {
    Self {
      queue,
      connectivity,
    }
  }

  pub async fn pending_count(&self) -> usize {
    self.queue.count().await
  }

  pub fn connectivity(&self) -> Connectivity {
    *self.connectivity.borrow()
  }

  pub async fn snapshot(&self) -> StatusSnapshot {
    StatusSnapshot {
      connectivity: self.connectivity(),
      pending: self.queue.count().await,
      queue_available: self.queue.is_available().await,
    }
  }
}
