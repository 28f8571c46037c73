//! Error taxonomy for the offline core.

use thiserror::Error;

pub type Result<T, E = OfflineError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum OfflineError {
  /// Network unreachable, connection reset, request aborted or timed out.
  #[error("Transport failure for {target}: {message}")]
  TransportFailure { target: String, message: String },

  /// Backend reachable but rejected the request.
  #[error("{target} rejected with status {status}")]
  NonSuccessStatus { target: String, status: u16 },

  /// A read failed and nothing was cached for it.
  #[error("Network failed and no cached data available for {target}")]
  NoCachedData { target: String },

  /// The local persistence medium cannot be read or written.
  #[error("Local storage unavailable: {0}")]
  StorageUnavailable(String),

  #[error("Invalid request: {0}")]
  InvalidRequest(String),
}

impl OfflineError {
  pub fn transport(target: impl Into<String>, message: impl ToString) -> Self {
    Self::TransportFailure {
      target: target.into(),
      message: message.to_string(),
    }
  }

  pub fn storage(message: impl Into<String>) -> Self {
    Self::StorageUnavailable(message.into())
  }

  /// Machine-readable code, also used in synthesized response bodies.
  pub fn code(&self) -> &'static str {
    match self {
      Self::TransportFailure { .. } => "transport_failure",
      Self::NonSuccessStatus { .. } => "non_success_status",
      Self::NoCachedData { .. } => "no_cached_data",
      Self::StorageUnavailable(_) => "storage_unavailable",
      Self::InvalidRequest(_) => "invalid_request",
    }
  }
}
