//! Test doubles for the storage and transport boundaries.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;

use crate::cache::QueueStore;
use crate::error::{OfflineError, Result};
use crate::net::{Connectivity, Request, Response, Transport};

/// In-memory blob store with switchable failures.
#[derive(Default)]
pub struct MemoryStorage {
  blobs: Mutex<HashMap<String, Vec<u8>>>,
  fail_reads: AtomicBool,
  /// Number of upcoming writes to reject, `usize::MAX` for all of them
  failing_writes: AtomicUsize,
  writes: AtomicUsize,
}

impl MemoryStorage {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn fail_reads(&self, fail: bool) {
    self.fail_reads.store(fail, Ordering::SeqCst);
  }

  pub fn fail_writes(&self, fail: bool) {
    let count = if fail { usize::MAX } else { 0 };
    self.failing_writes.store(count, Ordering::SeqCst);
  }

  /// Reject only the next `count` writes.
  pub fn fail_next_writes(&self, count: usize) {
    self.failing_writes.store(count, Ordering::SeqCst);
  }

  pub fn write_count(&self) -> usize {
    self.writes.load(Ordering::SeqCst)
  }
}

impl QueueStore for MemoryStorage {
  fn read_blob(&self, key: &str) -> Result<Option<Vec<u8>>> {
    if self.fail_reads.load(Ordering::SeqCst) {
      return Err(OfflineError::storage("read failed"));
    }
    Ok(self.blobs.lock().unwrap().get(key).cloned())
  }

  fn write_blob(&self, key: &str, value: &[u8]) -> Result<()> {
    let failing = self
      .failing_writes
      .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| match n {
        0 => None,
        usize::MAX => Some(usize::MAX),
        n => Some(n - 1),
      })
      .is_ok();
    if failing {
      return Err(OfflineError::storage("write failed"));
    }
    self.writes.fetch_add(1, Ordering::SeqCst);
    self
      .blobs
      .lock()
      .unwrap()
      .insert(key.to_string(), value.to_vec());
    Ok(())
  }
}

type Responder = Box<dyn Fn(&Request) -> Result<Response> + Send + Sync>;

/// Scripted transport that records every request it receives.
pub struct FakeTransport {
  responder: Responder,
  calls: Mutex<Vec<Request>>,
  connectivity: Mutex<Connectivity>,
  gate: Option<Arc<Semaphore>>,
}

impl FakeTransport {
  pub fn new(responder: impl Fn(&Request) -> Result<Response> + Send + Sync + 'static) -> Self {
    Self {
      responder: Box::new(responder),
      calls: Mutex::new(Vec::new()),
      connectivity: Mutex::new(Connectivity::Online),
      gate: None,
    }
  }

  /// Backend that accepts everything with 201.
  pub fn accepting() -> Self {
    Self::new(|_| Ok(Response::new(201, None, b"{}".to_vec())))
  }

  /// Backend that cannot be reached.
  pub fn unreachable() -> Self {
    Self::new(|req| Err(OfflineError::transport(&req.target, "connection refused")))
      .with_connectivity(Connectivity::Offline)
  }

  pub fn with_connectivity(self, connectivity: Connectivity) -> Self {
    *self.connectivity.lock().unwrap() = connectivity;
    self
  }

  /// Hold every `send` until a permit is added to `gate`.
  pub fn with_gate(mut self, gate: Arc<Semaphore>) -> Self {
    self.gate = Some(gate);
    self
  }

  pub fn calls(&self) -> Vec<Request> {
    self.calls.lock().unwrap().clone()
  }

  pub fn call_count(&self) -> usize {
    self.calls.lock().unwrap().len()
  }

  pub fn calls_to(&self, target: &str) -> usize {
    self
      .calls
      .lock()
      .unwrap()
      .iter()
      .filter(|r| r.target == target)
      .count()
  }
}

impl Transport for FakeTransport {
  async fn send(&self, request: &Request) -> Result<Response> {
    self.calls.lock().unwrap().push(request.clone());
    if let Some(gate) = &self.gate {
      gate.acquire().await.expect("gate closed").forget();
    }
    (self.responder)(request)
  }

  async fn probe(&self) -> Connectivity {
    *self.connectivity.lock().unwrap()
  }
}

/// Build a JSON object payload from a `json!` literal.
pub fn payload(value: serde_json::Value) -> Option<crate::net::Payload> {
  match value {
    serde_json::Value::Object(map) => Some(map),
    _ => None,
  }
}
