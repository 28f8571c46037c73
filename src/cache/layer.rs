//! Cache layer that applies the caching strategies around network fetches.

use futures::future::join_all;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::storage::CacheStorage;
use super::traits::{CacheKey, CacheResult, CachedResponse};
use crate::config::CacheConfig;
use crate::error::{OfflineError, Result};
use crate::net::{Method, Response};

/// Outcome of precaching and namespace cleanup.
#[derive(Debug, Clone, Default)]
pub struct InstallReport {
  pub cached: usize,
  pub failed: Vec<(String, String)>,
  pub evicted_namespaces: Vec<String>,
}

/// Cache layer that manages caching logic and network fetching.
///
/// Owns two namespaces: one for pages and static assets, one for API reads.
/// Storage errors are logged and treated as a miss or a skipped store; they
/// never fail the request being served.
pub struct CacheLayer<S: CacheStorage> {
  storage: Arc<S>,
  static_namespace: String,
  api_namespace: String,
}

impl<S: CacheStorage> CacheLayer<S> {
  /// Create a new cache layer with the given storage backend.
  pub fn new(storage: Arc<S>, config: &CacheConfig) -> Self {
    Self {
      storage,
      static_namespace: config.static_namespace(),
      api_namespace: config.api_namespace(),
    }
  }

  pub fn static_namespace(&self) -> &str {
    &self.static_namespace
  }

  pub fn api_namespace(&self) -> &str {
    &self.api_namespace
  }

  fn lookup(&self, namespace: &str, key: &CacheKey) -> Option<CachedResponse> {
    match self.storage.get_response(namespace, key) {
      Ok(hit) => hit,
      Err(e) => {
        warn!("Cache read failed for {}: {}", key.description(), e);
        None
      }
    }
  }

  /// Only successful GET responses are ever stored.
  fn store(&self, namespace: &str, key: &CacheKey, response: &Response) {
    if key.method != Method::Get || !response.is_success() {
      return;
    }
    if let Err(e) = self.storage.store_response(namespace, key, response) {
      warn!("Cache write failed for {}: {}", key.description(), e);
    }
  }

  /// Cache-first with network fallback, for pages and static assets.
  ///
  /// 1. Return the static cache entry if there is one, without any network call
  /// 2. Otherwise fetch; store a copy of a successful GET response
  /// 3. Transport failures propagate when nothing is cached
  pub async fn cache_first<F, Fut>(&self, key: &CacheKey, fetcher: F) -> Result<CacheResult<Response>>
  where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<Response>>,
  {
    if let Some(cached) = self.lookup(&self.static_namespace, key) {
      debug!("Static cache hit: {}", key.description());
      return Ok(CacheResult::from_cache(cached.response, cached.cached_at));
    }

    debug!("Static cache miss: {}", key.description());
    let response = fetcher().await?;
    self.store(&self.static_namespace, key, &response);
    Ok(CacheResult::from_network(response))
  }

  /// Network-first with cache fallback, for API requests.
  ///
  /// 1. Fetch; store a copy of a successful GET response
  /// 2. On transport failure, serve the API cache entry for the same key
  /// 3. With no entry, return a synthesized 503 `no_cached_data` response
  pub async fn network_first<F, Fut>(
    &self,
    key: &CacheKey,
    fetcher: F,
  ) -> Result<CacheResult<Response>>
  where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<Response>>,
  {
    match fetcher().await {
      Ok(response) => {
        self.store(&self.api_namespace, key, &response);
        Ok(CacheResult::from_network(response))
      }
      Err(e @ OfflineError::TransportFailure { .. }) => {
        if let Some(cached) = self.lookup(&self.api_namespace, key) {
          info!("Network failed, serving cached {}: {}", key.description(), e);
          return Ok(CacheResult::offline(cached.response, cached.cached_at));
        }
        warn!("Network failed and nothing cached for {}: {}", key.description(), e);
        Ok(CacheResult::unavailable(Response::no_cached_data()))
      }
      Err(e) => Err(e),
    }
  }

  /// Fetch every key and store the successful responses in the static cache.
  ///
  /// Runs the fetches concurrently. Failures are reported, not fatal.
  pub async fn precache<F, Fut>(&self, keys: &[CacheKey], fetcher: F) -> InstallReport
  where
    F: Fn(CacheKey) -> Fut,
    Fut: Future<Output = Result<Response>>,
  {
    let fetches = keys.iter().map(|key| {
      let fut = fetcher(key.clone());
      async move { (key, fut.await) }
    });

    let mut report = InstallReport::default();
    for (key, result) in join_all(fetches).await {
      match result {
        Ok(response) if response.is_success() => {
          self.store(&self.static_namespace, key, &response);
          report.cached += 1;
        }
        Ok(response) => report.failed.push((
          key.target.clone(),
          OfflineError::NonSuccessStatus {
            target: key.target.clone(),
            status: response.status,
          }
          .to_string(),
        )),
        Err(e) => report.failed.push((key.target.clone(), e.to_string())),
      }
    }
    report
  }

  /// Delete every namespace other than the current static and API ones.
  pub fn activate(&self) -> Result<Vec<String>> {
    let mut evicted = Vec::new();
    for namespace in self.storage.namespaces()? {
      if namespace != self.static_namespace && namespace != self.api_namespace {
        let removed = self.storage.delete_namespace(&namespace)?;
        info!("Evicted cache namespace {} ({} entries)", namespace, removed);
        evicted.push(namespace);
      }
    }
    Ok(evicted)
  }
}

impl<S: CacheStorage> Clone for CacheLayer<S> {
  fn clone(&self) -> Self {
    Self {
      storage: Arc::clone(&self.storage),
      static_namespace: self.static_namespace.clone(),
      api_namespace: self.api_namespace.clone(),
    }
  }
}
