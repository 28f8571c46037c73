//! Durable FIFO of writes made while offline that the backend has not yet confirmed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::cache::QueueStore;
use crate::error::{OfflineError, Result};
use crate::net::{Payload, Request, WriteMethod};

/// Fixed key of the persisted queue blob.
pub const STORAGE_KEY: &str = "pendingRequests";

/// A pending write awaiting confirmation from the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedRequest {
  pub id: String,
  pub method: WriteMethod,
  pub target: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub payload: Option<Payload>,
  pub enqueued_at: DateTime<Utc>,
}

impl QueuedRequest {
  pub fn to_request(&self) -> Request {
    Request::write(self.method, self.target.clone(), self.payload.clone())
  }
}

struct QueueState {
  entries: Vec<QueuedRequest>,
  /// False once the store failed; the queue then refuses new writes.
  available: bool,
}

/// Ordered queue persisted as a single blob after every mutation.
///
/// Mutations go through one async lock, so read-modify-write cycles on the
/// persisted blob never interleave.
pub struct PersistentQueue<B: QueueStore> {
  store: Arc<B>,
  state: Mutex<QueueState>,
}

impl<B: QueueStore> PersistentQueue<B> {
  /// Load the queue from the store.
  ///
  /// A store that cannot be read, or holds an undecodable blob, leaves the
  /// queue empty and unavailable for this session.
  pub fn open(store: Arc<B>) -> Self {
    let (entries, available) = match Self::load(store.as_ref()) {
      Ok(entries) => {
        if !entries.is_empty() {
          info!("Loaded {} pending request(s)", entries.len());
        }
        (entries, true)
      }
      Err(e) => {
        warn!("Offline queue disabled: {}", e);
        (Vec::new(), false)
      }
    };

    Self {
      store,
      state: Mutex::new(QueueState { entries, available }),
    }
  }

  fn load(store: &B) -> Result<Vec<QueuedRequest>> {
    match store.read_blob(STORAGE_KEY)? {
      Some(blob) => serde_json::from_slice(&blob)
        .map_err(|e| OfflineError::storage(format!("Corrupt pending queue: {}", e))),
      None => Ok(Vec::new()),
    }
  }

  fn persist(&self, entries: &[QueuedRequest]) -> Result<()> {
    let blob = serde_json::to_vec(entries)
      .map_err(|e| OfflineError::storage(format!("Failed to serialize pending queue: {}", e)))?;
    self.store.write_blob(STORAGE_KEY, &blob)
  }

  /// Append a new write and persist the whole queue.
  ///
  /// Fails only with `StorageUnavailable`, in which case nothing was queued.
  pub async fn enqueue(
    &self,
    method: WriteMethod,
    target: impl Into<String>,
    payload: Option<Payload>,
  ) -> Result<QueuedRequest> {
    let mut state = self.state.lock().await;
    if !state.available {
      return Err(OfflineError::storage(
        "offline queue is disabled for this session",
      ));
    }

    let request = QueuedRequest {
      id: Uuid::new_v4().to_string(),
      method,
      target: target.into(),
      payload,
      enqueued_at: Utc::now(),
    };

    state.entries.push(request.clone());
    if let Err(e) = self.persist(&state.entries) {
      state.entries.pop();
      state.available = false;
      warn!("Offline queue disabled: {}", e);
      return Err(e);
    }

    info!(id = %request.id, target = %request.target, "Queued write for later sync");
    Ok(request)
  }

  /// Remove the entry with `id`. Returns whether anything was removed.
  ///
  /// An unknown id is a no-op and does not touch storage. A failed save is
  /// retried once. If that fails too, the entry stays removed in memory so
  /// this session never resubmits it, the error is returned and the queue
  /// stops accepting new writes. The stored blob still holds the entry, so
  /// a restart on the same store sends it again.
  pub async fn remove(&self, id: &str) -> Result<bool> {
    let mut state = self.state.lock().await;
    let Some(position) = state.entries.iter().position(|r| r.id == id) else {
      return Ok(false);
    };

    state.entries.remove(position);
    let saved = self.persist(&state.entries).or_else(|e| {
      debug!("Retrying queue save after {}", e);
      self.persist(&state.entries)
    });
    if let Err(e) = saved {
      state.available = false;
      warn!("Offline queue disabled: {}", e);
      return Err(e);
    }
    Ok(true)
  }

  /// Snapshot of the pending entries in insertion order.
  pub async fn all(&self) -> Vec<QueuedRequest> {
    self.state.lock().await.entries.clone()
  }

  pub async fn count(&self) -> usize {
    self.state.lock().await.entries.len()
  }

  pub async fn is_available(&self) -> bool {
    self.state.lock().await.available
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::testing::{payload, MemoryStorage};
  use proptest::prelude::*;
  use serde_json::json;

  fn student(name: &str) -> Option<Payload> {
    payload(json!({ "name": name }))
  }

  #[tokio::test]
  async fn test_enqueue_appends_in_order() {
    let queue = PersistentQueue::open(Arc::new(MemoryStorage::new()));

    let a = queue
      .enqueue(WriteMethod::Create, "/grading/api/students/", student("Ana"))
      .await
      .unwrap();
    let b = queue
      .enqueue(WriteMethod::Create, "/grading/api/students/", student("Bruno"))
      .await
      .unwrap();

    assert_ne!(a.id, b.id);
    let all = queue.all().await;
    assert_eq!(all, vec![a, b]);
    assert_eq!(queue.count().await, 2);
  }

  #[tokio::test]
  async fn test_remove_is_idempotent() {
    let storage = Arc::new(MemoryStorage::new());
    let queue = PersistentQueue::open(Arc::clone(&storage));
    let a = queue
      .enqueue(WriteMethod::Delete, "/grading/api/students/7/", None)
      .await
      .unwrap();
    let writes_after_enqueue = storage.write_count();

    assert!(queue.remove(&a.id).await.unwrap());
    assert!(!queue.remove(&a.id).await.unwrap());

    assert_eq!(queue.count().await, 0);
    assert_eq!(storage.write_count(), writes_after_enqueue + 1);
  }

  #[tokio::test]
  async fn test_reload_yields_identical_sequence() {
    let storage = Arc::new(MemoryStorage::new());
    let queue = PersistentQueue::open(Arc::clone(&storage));
    queue
      .enqueue(WriteMethod::Create, "/grading/api/students/", student("Ana"))
      .await
      .unwrap();
    queue
      .enqueue(WriteMethod::Update, "/grading/api/grades/3/", student("Ana"))
      .await
      .unwrap();
    queue
      .enqueue(WriteMethod::Delete, "/grading/api/subjects/1/", None)
      .await
      .unwrap();

    let reloaded = PersistentQueue::open(storage);
    assert_eq!(reloaded.all().await, queue.all().await);
  }

  #[tokio::test]
  async fn test_persisted_blob_uses_transport_verbs() {
    let storage = Arc::new(MemoryStorage::new());
    let queue = PersistentQueue::open(Arc::clone(&storage));
    queue
      .enqueue(WriteMethod::Create, "/grading/api/students/", student("Ana"))
      .await
      .unwrap();

    let blob = storage.read_blob(STORAGE_KEY).unwrap().unwrap();
    let value: serde_json::Value = serde_json::from_slice(&blob).unwrap();
    assert_eq!(value[0]["method"], "POST");
    assert_eq!(value[0]["payload"]["name"], "Ana");
  }

  #[tokio::test]
  async fn test_unreadable_store_disables_queue() {
    let storage = Arc::new(MemoryStorage::new());
    storage.fail_reads(true);
    let queue = PersistentQueue::open(storage);

    assert!(!queue.is_available().await);
    let result = queue
      .enqueue(WriteMethod::Create, "/grading/api/students/", None)
      .await;
    assert!(matches!(result, Err(OfflineError::StorageUnavailable(_))));
    assert_eq!(queue.count().await, 0);
  }

  #[tokio::test]
  async fn test_corrupt_blob_disables_queue() {
    let storage = Arc::new(MemoryStorage::new());
    storage.write_blob(STORAGE_KEY, b"not json").unwrap();
    let queue = PersistentQueue::open(storage);
    assert!(!queue.is_available().await);
  }

  #[tokio::test]
  async fn test_failed_persist_rolls_back_enqueue() {
    let storage = Arc::new(MemoryStorage::new());
    let queue = PersistentQueue::open(Arc::clone(&storage));
    queue
      .enqueue(WriteMethod::Create, "/grading/api/students/", student("Ana"))
      .await
      .unwrap();

    storage.fail_writes(true);
    let result = queue
      .enqueue(WriteMethod::Create, "/grading/api/students/", student("Bruno"))
      .await;

    assert!(matches!(result, Err(OfflineError::StorageUnavailable(_))));
    assert_eq!(queue.count().await, 1);
    assert!(!queue.is_available().await);
  }

  #[derive(Debug, Clone)]
  enum Op {
    Enqueue,
    Remove(usize),
  }

  fn op() -> impl Strategy<Value = Op> {
    prop_oneof![Just(Op::Enqueue), (0usize..16).prop_map(Op::Remove)]
  }

  proptest! {
    #[test]
    fn prop_all_matches_unremoved_entries_in_insertion_order(ops in prop::collection::vec(op(), 0..40)) {
      let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
      rt.block_on(async {
        let storage = Arc::new(MemoryStorage::new());
        let queue = PersistentQueue::open(Arc::clone(&storage));
        let mut created: Vec<QueuedRequest> = Vec::new();
        let mut removed: Vec<String> = Vec::new();

        for op in &ops {
          match op {
            Op::Enqueue => {
              let target = format!("/grading/api/grades/{}/", created.len());
              created.push(queue.enqueue(WriteMethod::Update, target, None).await.unwrap());
            }
            Op::Remove(i) => {
              if let Some(entry) = created.get(*i) {
                queue.remove(&entry.id).await.unwrap();
                removed.push(entry.id.clone());
              }
            }
          }
        }

        let expected: Vec<QueuedRequest> = created
          .into_iter()
          .filter(|r| !removed.contains(&r.id))
          .collect();
        assert_eq!(queue.all().await, expected);
        assert_eq!(PersistentQueue::open(storage).all().await, expected);
      });
    }
  }
}
