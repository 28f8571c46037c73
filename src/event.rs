use mgpas_offline::net::{Connectivity, Transport};
use mgpas_offline::reconciler::DrainOutcome;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Watch-mode events
#[derive(Debug)]
pub enum Event {
  /// The probe saw a different connectivity than last time
  Connectivity(Connectivity),
  /// A drain spawned by a reconnect finished
  Drained(DrainOutcome),
  /// Probe round with no change
  Tick,
}

/// Produces connectivity events by probing the backend on a timer
pub struct EventHandler {
  tx: mpsc::UnboundedSender<Event>,
  rx: mpsc::UnboundedReceiver<Event>,
}

impl EventHandler {
  /// Probe every `interval`, starting from the `initial` state.
  pub fn new<T: Transport>(transport: Arc<T>, initial: Connectivity, interval: Duration) -> Self {
    let (tx, rx) = mpsc::unbounded_channel();

    let probe_tx = tx.clone();
    tokio::spawn(async move {
      let mut ticker = tokio::time::interval(interval);
      let mut last = initial;
      loop {
        ticker.tick().await;
        let current = transport.probe().await;
        let event = if current == last {
          Event::Tick
        } else {
          last = current;
          Event::Connectivity(current)
        };
        if probe_tx.send(event).is_err() {
          break;
        }
      }
    });

    Self { tx, rx }
  }

  /// Sender for tasks that report back into the loop
  pub fn sender(&self) -> mpsc::UnboundedSender<Event> {
    self.tx.clone()
  }

  /// Receive the next event
  pub async fn next(&mut self) -> Option<Event> {
    self.rx.recv().await
  }
}
