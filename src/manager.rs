//! One explicit offline manager per process, built from injected storage and
//! transport and handed by reference to the UI layer.

use std::sync::Arc;
use tokio::task::JoinHandle;

use crate::cache::{CacheLayer, CacheStorage, QueueStore};
use crate::config::Config;
use crate::connectivity::ConnectivityMonitor;
use crate::net::{Connectivity, Transport};
use crate::proxy::NetworkProxy;
use crate::queue::PersistentQueue;
use crate::reconciler::{DrainOutcome, Reconciler};
use crate::status::StatusReporter;

pub struct OfflineManager<T: Transport, S: CacheStorage + QueueStore + 'static> {
  transport: Arc<T>,
  proxy: NetworkProxy<T, S>,
  monitor: ConnectivityMonitor<T, S>,
  reconciler: Arc<Reconciler<T, S>>,
  status: StatusReporter<S>,
  startup_drain: Option<JoinHandle<DrainOutcome>>,
}

impl<T: Transport, S: CacheStorage + QueueStore + 'static> OfflineManager<T, S> {
  /// Build the manager, probing the transport for the initial connectivity.
  pub async fn start(config: &Config, transport: T, storage: Arc<S>) -> Self {
    let initial = transport.probe().await;
    Self::start_with_connectivity(config, transport, storage, initial).await
  }

  /// Build the manager with a known initial connectivity.
  pub async fn start_with_connectivity(
    config: &Config,
    transport: T,
    storage: Arc<S>,
    initial: Connectivity,
  ) -> Self {
    let transport = Arc::new(transport);
    let queue = Arc::new(PersistentQueue::open(Arc::clone(&storage)));
    let reconciler = Arc::new(Reconciler::new(Arc::clone(&queue), Arc::clone(&transport)));

    let (monitor, startup_drain) =
      ConnectivityMonitor::start(initial, Arc::clone(&reconciler)).await;

    let proxy = NetworkProxy::new(
      Arc::clone(&transport),
      CacheLayer::new(storage, &config.cache),
      Arc::clone(&queue),
      monitor.subscribe(),
      &config.proxy,
      config.cache.precache.clone(),
    );
    let status = StatusReporter::new(queue, monitor.subscribe());

    Self {
      transport,
      proxy,
      monitor,
      reconciler,
      status,
      startup_drain,
    }
  }

  pub fn transport(&self) -> &Arc<T> {
    &self.transport
  }

  pub fn proxy(&self) -> &NetworkProxy<T, S> {
    &self.proxy
  }

  pub fn status(&self) -> &StatusReporter<S> {
    &self.status
  }

  pub fn monitor(&self) -> &ConnectivityMonitor<T, S> {
    &self.monitor
  }

  pub fn reconciler(&self) -> &Arc<Reconciler<T, S>> {
    &self.reconciler
  }

  /// Forward a connectivity change from the environment.
  pub fn report_connectivity(&self, state: Connectivity) -> Option<JoinHandle<DrainOutcome>> {
    self.monitor.report(state)
  }

  /// Handle of the drain started because the queue was non-empty at startup.
  pub fn take_startup_drain(&mut self) -> Option<JoinHandle<DrainOutcome>> {
    self.startup_drain.take()
  }
}
