use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::OfflineError;

/// Structured request body: field name to value.
pub type Payload = serde_json::Map<String, serde_json::Value>;

/// Transport verb
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
  Get,
  Post,
  Put,
  Patch,
  Delete,
}

impl Method {
  pub fn as_str(&self) -> &'static str {
    match self {
      Method::Get => "GET",
      Method::Post => "POST",
      Method::Put => "PUT",
      Method::Patch => "PATCH",
      Method::Delete => "DELETE",
    }
  }

  pub fn is_write(&self) -> bool {
    !matches!(self, Method::Get)
  }
}

impl fmt::Display for Method {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for Method {
  type Err = OfflineError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_uppercase().as_str() {
      "GET" => Ok(Method::Get),
      "POST" => Ok(Method::Post),
      "PUT" => Ok(Method::Put),
      "PATCH" => Ok(Method::Patch),
      "DELETE" => Ok(Method::Delete),
      other => Err(OfflineError::InvalidRequest(format!(
        "unsupported method {}",
        other
      ))),
    }
  }
}

/// Kind of write that can sit in the pending queue.
///
/// Serialized as the transport verb so the persisted queue reads naturally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WriteMethod {
  #[serde(rename = "POST")]
  Create,
  #[serde(rename = "PATCH")]
  Update,
  #[serde(rename = "PUT")]
  Replace,
  #[serde(rename = "DELETE")]
  Delete,
}

impl From<WriteMethod> for Method {
  fn from(method: WriteMethod) -> Self {
    match method {
      WriteMethod::Create => Method::Post,
      WriteMethod::Update => Method::Patch,
      WriteMethod::Replace => Method::Put,
      WriteMethod::Delete => Method::Delete,
    }
  }
}

impl TryFrom<Method> for WriteMethod {
  type Error = OfflineError;

  fn try_from(method: Method) -> Result<Self, Self::Error> {
    match method {
      Method::Post => Ok(WriteMethod::Create),
      Method::Patch => Ok(WriteMethod::Update),
      Method::Put => Ok(WriteMethod::Replace),
      Method::Delete => Ok(WriteMethod::Delete),
      Method::Get => Err(OfflineError::InvalidRequest(
        "GET requests are reads and are never queued".to_string(),
      )),
    }
  }
}

/// Outgoing request as seen by the proxy
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
  pub method: Method,
  /// Path (plus optional query) relative to the backend base URL
  pub target: String,
  pub payload: Option<Payload>,
}

impl Request {
  pub fn get(target: impl Into<String>) -> Self {
    Self {
      method: Method::Get,
      target: target.into(),
      payload: None,
    }
  }

  pub fn write(method: WriteMethod, target: impl Into<String>, payload: Option<Payload>) -> Self {
    Self {
      method: method.into(),
      target: target.into(),
      payload,
    }
  }

  /// Path component of the target, without query string or fragment.
  pub fn path(&self) -> &str {
    let end = self
      .target
      .find(|c| c == '?' || c == '#')
      .unwrap_or(self.target.len());
    &self.target[..end]
  }
}

/// Response received from (or synthesized in place of) the backend.
///
/// Immutable once built. Cloning yields an independent copy, which is how
/// one response is both cached and handed to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
  pub status: u16,
  pub content_type: Option<String>,
  pub body: Vec<u8>,
}

impl Response {
  pub fn new(status: u16, content_type: Option<String>, body: Vec<u8>) -> Self {
    Self {
      status,
      content_type,
      body,
    }
  }

  pub fn json(status: u16, value: &serde_json::Value) -> Self {
    Self {
      status,
      content_type: Some("application/json".to_string()),
      body: value.to_string().into_bytes(),
    }
  }

  /// Failure response returned when a read fails and nothing is cached.
  pub fn no_cached_data() -> Self {
    Self::json(
      503,
      &serde_json::json!({
        "error": "Network failed and no cached data available",
        "code": "no_cached_data",
      }),
    )
  }

  pub fn is_success(&self) -> bool {
    (200..300).contains(&self.status)
  }

  /// Machine-readable error code from a JSON body, if any.
  pub fn error_code(&self) -> Option<String> {
    let value: serde_json::Value = serde_json::from_slice(&self.body).ok()?;
    value.get("code")?.as_str().map(String::from)
  }

  pub fn text(&self) -> String {
    String::from_utf8_lossy(&self.body).into_owned()
  }
}

/// Connectivity as reported by the environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Connectivity {
  Online,
  Offline,
}

impl Connectivity {
  pub fn is_online(&self) -> bool {
    matches!(self, Connectivity::Online)
  }
}

impl fmt::Display for Connectivity {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Connectivity::Online => f.write_str("online"),
      Connectivity::Offline => f.write_str("offline"),
    }
  }
}
