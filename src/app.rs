use crate::event::{Event, EventHandler};
use crate::Command;
use color_eyre::eyre::eyre;
use color_eyre::Result;
use mgpas_offline::cache::{CacheStorage, QueueStore};
use mgpas_offline::config::Config;
use mgpas_offline::net::{Method, Payload, Request, Transport};
use mgpas_offline::reconciler::{DrainOutcome, SkipReason};
use mgpas_offline::OfflineManager;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::warn;

/// Runs one CLI command against the offline manager
pub struct App<T: Transport, S: CacheStorage + QueueStore + 'static> {
  manager: OfflineManager<T, S>,
  config: Config,
}

impl<T: Transport, S: CacheStorage + QueueStore + 'static> App<T, S> {
  pub fn new(manager: OfflineManager<T, S>, config: Config) -> Self {
    Self { manager, config }
  }

  pub async fn execute(&mut self, command: Command) -> Result<()> {
    match command {
      Command::Fetch { target, method } => self.fetch(method, target).await?,
      Command::Submit {
        target,
        method,
        data,
      } => self.submit(method, target, data).await?,
      Command::Pending => self.pending().await,
      Command::Status => self.status().await,
      Command::Drain => self.drain().await?,
      Command::Install => self.install().await?,
      Command::Watch => return self.watch().await,
    }

    // Let a drain started at launch finish before the process exits
    if let Some(handle) = self.manager.take_startup_drain() {
      print_drain(&handle.await?);
    }
    Ok(())
  }

  async fn fetch(&self, method: Method, target: String) -> Result<()> {
    let request = Request {
      method,
      target,
      payload: None,
    };
    let result = self.manager.proxy().fetch(&request).await?;

    match result.cached_at {
      Some(at) => println!(
        "{} ({}, cached {})",
        result.data.status,
        result.source,
        at.format("%Y-%m-%d %H:%M:%S")
      ),
      None => println!("{} ({})", result.data.status, result.source),
    }
    println!("{}", result.data.text());
    Ok(())
  }

  async fn submit(&self, method: Method, target: String, data: Option<String>) -> Result<()> {
    let payload = data.as_deref().map(parse_payload).transpose()?;
    let request = Request {
      method,
      target,
      payload,
    };

    let submission = self.manager.proxy().submit(request).await?;
    println!("{}", submission.message());
    Ok(())
  }

  async fn pending(&self) {
    let entries = self.manager.reconciler().queue().all().await;
    if entries.is_empty() {
      println!("No pending requests");
      return;
    }
    for entry in entries {
      println!(
        "{}  {:<6} {}  {}",
        entry.enqueued_at.format("%Y-%m-%d %H:%M:%S"),
        Method::from(entry.method),
        entry.target,
        entry.id
      );
    }
  }

  async fn status(&self) {
    let snapshot = self.manager.status().snapshot().await;
    println!("Server:       {}", self.config.server.url);
    println!("Connectivity: {}", snapshot.connectivity);
    println!("Pending:      {}", snapshot.pending);
    if !snapshot.queue_available {
      println!("Queue:        unavailable (writes are sent directly)");
    }
    if let Some(banner) = snapshot.banner() {
      println!("{}", banner);
    }
  }

  async fn drain(&mut self) -> Result<()> {
    if let Some(handle) = self.manager.take_startup_drain() {
      print_drain(&handle.await?);
    }
    print_drain(&self.manager.reconciler().drain().await);
    Ok(())
  }

  async fn install(&self) -> Result<()> {
    let report = self.manager.proxy().install().await?;
    println!("Cached {} target(s)", report.cached);
    for (target, reason) in &report.failed {
      println!("  failed {}: {}", target, reason);
    }
    for namespace in &report.evicted_namespaces {
      println!("  evicted {}", namespace);
    }
    Ok(())
  }

  async fn watch(&mut self) -> Result<()> {
    let initial = self.manager.monitor().current();
    let mut events = EventHandler::new(
      Arc::clone(self.manager.transport()),
      initial,
      self.config.watch.probe_interval(),
    );
    let tx = events.sender();

    if let Some(handle) = self.manager.take_startup_drain() {
      forward_drain(handle, tx.clone());
    }
    self.status().await;

    loop {
      tokio::select! {
        _ = tokio::signal::ctrl_c() => break,
        event = events.next() => match event {
          Some(Event::Connectivity(state)) => {
            println!("Connectivity: {}", state);
            if let Some(handle) = self.manager.report_connectivity(state) {
              forward_drain(handle, tx.clone());
            }
          }
          Some(Event::Drained(outcome)) => {
            print_drain(&outcome);
            if let Some(banner) = self.manager.status().snapshot().await.banner() {
              println!("{}", banner);
            }
          }
          Some(Event::Tick) => {}
          None => break,
        },
      }
    }

    Ok(())
  }
}

fn forward_drain(handle: JoinHandle<DrainOutcome>, tx: mpsc::UnboundedSender<Event>) {
  tokio::spawn(async move {
    match handle.await {
      Ok(outcome) => {
        let _ = tx.send(Event::Drained(outcome));
      }
      Err(e) => warn!("Drain task failed: {}", e),
    }
  });
}

fn print_drain(outcome: &DrainOutcome) {
  match outcome {
    DrainOutcome::Completed(report) => {
      println!(
        "Synced {} of {} pending request(s), {} remaining",
        report.synced.len(),
        report.attempted,
        report.remaining
      );
      for (id, reason) in &report.failed {
        println!("  kept {}: {}", id, reason);
      }
    }
    DrainOutcome::Skipped(SkipReason::Empty) => println!("Nothing to sync"),
    DrainOutcome::Skipped(SkipReason::AlreadyRunning) => println!("A sync is already running"),
  }
}

fn parse_payload(data: &str) -> Result<Payload> {
  match serde_json::from_str(data)? {
    serde_json::Value::Object(map) => Ok(map),
    other => Err(eyre!("Payload must be a JSON object, got {}", other)),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_parse_payload_requires_object() {
    let payload = parse_payload(r#"{"name": "Ana", "grade": 7}"#).unwrap();
    assert_eq!(payload["name"], "Ana");

    assert!(parse_payload("[1, 2]").is_err());
    assert!(parse_payload("not json").is_err());
  }
}
