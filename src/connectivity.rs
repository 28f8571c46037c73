//! Online/offline state machine that kicks off reconciliation.

use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::info;

use crate::cache::QueueStore;
use crate::net::{Connectivity, Transport};
use crate::reconciler::{DrainOutcome, Reconciler};

/// Tracks connectivity as reported by the environment.
///
/// The monitor never polls. Whoever observes the environment calls
/// [`ConnectivityMonitor::report`], and everyone else reads the state
/// through [`ConnectivityMonitor::subscribe`].
pub struct ConnectivityMonitor<T: Transport, B: QueueStore + 'static> {
  state: watch::Sender<Connectivity>,
  reconciler: Arc<Reconciler<T, B>>,
}

impl<T: Transport, B: QueueStore + 'static> ConnectivityMonitor<T, B> {
  /// Start in `initial` state.
  ///
  /// When starting online with writes left over from an earlier session, a
  /// drain is spawned right away and its handle returned.
  pub async fn start(
    initial: Connectivity,
    reconciler: Arc<Reconciler<T, B>>,
  ) -> (Self, Option<JoinHandle<DrainOutcome>>) {
    let (state, _) = watch::channel(initial);
    let monitor = Self { state, reconciler };

    let pending = monitor.reconciler.queue().count().await;
    let startup_drain = if initial.is_online() && pending > 0 {
      info!("Online at startup with {} pending request(s)", pending);
      Some(monitor.spawn_drain())
    } else {
      None
    };

    (monitor, startup_drain)
  }

  pub fn current(&self) -> Connectivity {
    *self.state.borrow()
  }

  pub fn subscribe(&self) -> watch::Receiver<Connectivity> {
    self.state.subscribe()
  }

  /// Record a connectivity change from the environment.
  ///
  /// OFFLINE to ONLINE spawns a drain and returns its handle. Any other
  /// report only updates the state.
  pub fn report(&self, next: Connectivity) -> Option<JoinHandle<DrainOutcome>> {
    let previous = self.state.send_replace(next);

    match (previous, next) {
      (Connectivity::Offline, Connectivity::Online) => {
        info!("Back online");
        Some(self.spawn_drain())
      }
      (Connectivity::Online, Connectivity::Offline) => {
        info!("Went offline");
        None
      }
      _ => None,
    }
  }

  fn spawn_drain(&self) -> JoinHandle<DrainOutcome> {
    let reconciler = Arc::clone(&self.reconciler);
    tokio::spawn(async move { reconciler.drain().await })
  }
}
