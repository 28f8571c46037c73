//! Offline resilience for the MGPAS grading app.
//!
//! Requests go through a [`proxy::NetworkProxy`] that serves pages and assets
//! cache-first and API reads network-first. Writes made while offline are
//! held in a [`queue::PersistentQueue`] and resubmitted by the
//! [`reconciler::Reconciler`] once the [`connectivity::ConnectivityMonitor`]
//! sees the backend again. [`manager::OfflineManager`] wires it all together.

pub mod cache;
pub mod config;
pub mod connectivity;
pub mod db;
pub mod error;
pub mod manager;
pub mod net;
pub mod proxy;
pub mod queue;
pub mod reconciler;
pub mod status;

#[cfg(test)]
mod testing;

pub use error::{OfflineError, Result};
pub use manager::OfflineManager;
