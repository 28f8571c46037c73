//! Core types for the response caches.

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

use crate::net::{Method, Request, Response};

/// Identity of a cacheable request: method plus target.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
  pub method: Method,
  pub target: String,
}

impl CacheKey {
  pub fn new(method: Method, target: &str) -> Self {
    Self {
      method,
      target: normalize_target(target),
    }
  }

  pub fn for_request(request: &Request) -> Self {
    Self::new(request.method, &request.target)
  }

  /// SHA256 hash for stable, fixed-length keys
  pub fn cache_hash(&self) -> String {
    let mut hasher = Sha256::new();
    hasher.update(self.description().as_bytes());
    hex::encode(hasher.finalize())
  }

  pub fn description(&self) -> String {
    format!("{} {}", self.method, self.target)
  }
}

/// Trim whitespace and drop the fragment, which never reaches the server.
fn normalize_target(target: &str) -> String {
  let target = target.trim();
  match target.find('#') {
    Some(idx) => target[..idx].to_string(),
    None => target.to_string(),
  }
}

/// A response as stored in a cache namespace.
#[derive(Debug, Clone)]
pub struct CachedResponse {
  pub response: Response,
  pub cached_at: DateTime<Utc>,
}

/// Result from a cache operation, including data and metadata about the source.
#[derive(Debug, Clone)]
pub struct CacheResult<T> {
  /// The actual data
  pub data: T,
  /// Where the data came from
  pub source: CacheSource,
  /// When the data was cached (if from cache)
  pub cached_at: Option<DateTime<Utc>>,
}

impl<T> CacheResult<T> {
  /// Create a new cache result from fresh network data.
  pub fn from_network(data: T) -> Self {
    Self {
      data,
      source: CacheSource::Network,
      cached_at: None,
    }
  }

  /// Create a new cache result served from cache without asking the network.
  pub fn from_cache(data: T, cached_at: DateTime<Utc>) -> Self {
    Self {
      data,
      source: CacheSource::Cache,
      cached_at: Some(cached_at),
    }
  }

  /// Create a new cache result for offline mode.
  pub fn offline(data: T, cached_at: DateTime<Utc>) -> Self {
    Self {
      data,
      source: CacheSource::Offline,
      cached_at: Some(cached_at),
    }
  }

  /// Network failed and there was nothing to fall back to.
  pub fn unavailable(data: T) -> Self {
    Self {
      data,
      source: CacheSource::Unavailable,
      cached_at: None,
    }
  }
}

/// Indicates where a response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSource {
  /// Fresh data from network
  Network,
  /// Served from cache, network not contacted
  Cache,
  /// Network unavailable, serving cached data
  Offline,
  /// Network unavailable and nothing cached; the data is a synthesized failure
  Unavailable,
}

impl std::fmt::Display for CacheSource {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let label = match self {
      CacheSource::Network => "network",
      CacheSource::Cache => "cache",
      CacheSource::Offline => "offline cache",
      CacheSource::Unavailable => "unavailable offline",
    };
    f.write_str(label)
  }
}
