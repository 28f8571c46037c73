//! Request interception: picks a cache strategy per request and defers
//! eligible writes while offline.

use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::cache::{CacheKey, CacheLayer, CacheResult, CacheStorage, InstallReport, QueueStore};
use crate::config::{DeferRule, ProxyConfig};
use crate::error::{OfflineError, Result};
use crate::net::{Connectivity, Method, Request, Response, Transport, WriteMethod};
use crate::queue::{PersistentQueue, QueuedRequest};

/// How a request is served.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
  /// Page or static asset: cache-first, network fallback
  Static,
  /// API call: network-first, cache fallback
  Api,
}

/// Result of a user-initiated write.
#[derive(Debug, Clone)]
pub enum Submission {
  /// The backend accepted the write
  Confirmed(Response),
  /// Saved locally; it will be sent when connectivity returns
  Deferred(QueuedRequest),
}

impl Submission {
  pub fn is_deferred(&self) -> bool {
    matches!(self, Submission::Deferred(_))
  }

  /// Acknowledgement shown to the user.
  pub fn message(&self) -> String {
    match self {
      Submission::Confirmed(response) => format!("Saved ({})", response.status),
      Submission::Deferred(_) => {
        "Saved offline. It will be synced when you reconnect.".to_string()
      }
    }
  }
}

pub struct NetworkProxy<T: Transport, S: CacheStorage + QueueStore> {
  transport: Arc<T>,
  cache: CacheLayer<S>,
  queue: Arc<PersistentQueue<S>>,
  connectivity: watch::Receiver<Connectivity>,
  api_prefixes: Vec<String>,
  deferrable: Vec<DeferRule>,
  precache: Vec<String>,
}

impl<T: Transport, S: CacheStorage + QueueStore> NetworkProxy<T, S> {
  pub fn new(
    transport: Arc<T>,
    cache: CacheLayer<S>,
    queue: Arc<PersistentQueue<S>>,
    connectivity: watch::Receiver<Connectivity>,
    config: &ProxyConfig,
    precache: Vec<String>,
  ) -> Self {
    Self {
      transport,
      cache,
      queue,
      connectivity,
      api_prefixes: config.api_prefixes.clone(),
      deferrable: config.deferrable.clone(),
      precache,
    }
  }

  pub fn classify(&self, request: &Request) -> RequestKind {
    let path = request.path();
    if self.api_prefixes.iter().any(|p| path.starts_with(p.as_str())) {
      RequestKind::Api
    } else {
      RequestKind::Static
    }
  }

  /// Whether the allow-list permits queueing this write while offline.
  pub fn is_deferrable(&self, request: &Request) -> bool {
    let Ok(method) = WriteMethod::try_from(request.method) else {
      return false;
    };
    self
      .deferrable
      .iter()
      .any(|rule| rule.matches(method, request.path()))
  }

  /// Serve any request through the cache strategy for its kind.
  pub async fn fetch(&self, request: &Request) -> Result<CacheResult<Response>> {
    let key = CacheKey::for_request(request);
    let transport = &self.transport;

    match self.classify(request) {
      RequestKind::Api => {
        self
          .cache
          .network_first(&key, || transport.send(request))
          .await
      }
      RequestKind::Static => self.cache.cache_first(&key, || transport.send(request)).await,
    }
  }

  /// Perform a user-initiated write.
  ///
  /// While offline, an allow-listed write is queued instead of sent and
  /// comes back as [`Submission::Deferred`]. If the queue is unavailable the
  /// write is sent anyway (online-only mode). Rejections surface as
  /// `NonSuccessStatus`, unreachable backends as `TransportFailure`.
  pub async fn submit(&self, request: Request) -> Result<Submission> {
    if !request.method.is_write() {
      return Err(OfflineError::InvalidRequest(format!(
        "{} {} is not a write",
        request.method, request.target
      )));
    }

    let online = self.connectivity.borrow().is_online();
    if !online && self.is_deferrable(&request) {
      let method = WriteMethod::try_from(request.method)?;
      match self
        .queue
        .enqueue(method, request.target.clone(), request.payload.clone())
        .await
      {
        Ok(queued) => {
          info!("Deferred {} {} while offline", request.method, request.target);
          return Ok(Submission::Deferred(queued));
        }
        Err(e) => warn!("Cannot defer {}, sending anyway: {}", request.target, e),
      }
    }

    // Writes skip the cache strategies: never stored, never answered from cache
    let response = self.transport.send(&request).await?;
    if response.is_success() {
      Ok(Submission::Confirmed(response))
    } else {
      Err(OfflineError::NonSuccessStatus {
        target: request.target,
        status: response.status,
      })
    }
  }

  /// Precache the configured pages and assets, then drop caches left by
  /// older namespace versions.
  pub async fn install(&self) -> Result<InstallReport> {
    let keys: Vec<CacheKey> = self
      .precache
      .iter()
      .map(|target| CacheKey::new(Method::Get, target))
      .collect();
    let transport = &self.transport;

    let mut report = self
      .cache
      .precache(&keys, |key| async move {
        let request = Request::get(key.target);
        transport.send(&request).await
      })
      .await;
    report.evicted_namespaces = self.cache.activate()?;

    info!(
      cached = report.cached,
      failed = report.failed.len(),
      "Install finished"
    );
    Ok(report)
  }
}
