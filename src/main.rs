mod app;
mod event;
mod logging;

use clap::{Parser, Subcommand};
use color_eyre::eyre::eyre;
use color_eyre::Result;
use mgpas_offline::cache::{CacheStorage, NoopStorage, QueueStore, SqliteStorage};
use mgpas_offline::config::Config;
use mgpas_offline::net::{Connectivity, HttpTransport, Method, Transport};
use mgpas_offline::OfflineManager;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "mgpas-offline")]
#[command(about = "Offline queue and cache for the MGPAS grading app")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/mgpas-offline/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Backend base URL
  #[arg(short, long)]
  server: Option<String>,

  /// Start offline instead of probing the backend
  #[arg(long)]
  offline: bool,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
  /// Request a page, asset or API resource through the cache
  Fetch {
    target: String,
    #[arg(short, long, default_value = "GET")]
    method: Method,
  },
  /// Send a write, queueing it if offline
  Submit {
    target: String,
    #[arg(short, long, default_value = "POST")]
    method: Method,
    /// JSON object body
    #[arg(short, long)]
    data: Option<String>,
  },
  /// List queued writes, oldest first
  Pending,
  /// Show connectivity and pending count
  Status,
  /// Resubmit queued writes now
  Drain,
  /// Precache pages and assets, drop stale cache versions
  Install,
  /// Probe the backend until Ctrl-C, syncing on reconnect
  Watch,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();
  let _guard = match logging::init() {
    Ok(guard) => Some(guard),
    Err(e) => {
      eprintln!("File logging disabled: {}", e);
      None
    }
  };

  let mut config = Config::load(args.config.as_deref())?;
  if let Some(server) = args.server {
    config.server.url = server;
  }

  let transport = HttpTransport::new(&config)?;
  let initial = args.offline.then_some(Connectivity::Offline);

  match open_storage(&config) {
    Ok(storage) => run(config, transport, Arc::new(storage), initial, args.command).await,
    Err(e) => {
      warn!("Offline storage unavailable: {}", e);
      eprintln!("Offline storage unavailable, running online-only");
      run(config, transport, Arc::new(NoopStorage), initial, args.command).await
    }
  }
}

/// Open the SQLite store, creating its directory if needed.
fn open_storage(config: &Config) -> Result<SqliteStorage> {
  let path = config.storage_path()?;
  SqliteStorage::open(&path).map_err(|e| eyre!("{}: {}", path.display(), e))
}

async fn run<T: Transport, S: CacheStorage + QueueStore + 'static>(
  config: Config,
  transport: T,
  storage: Arc<S>,
  initial: Option<Connectivity>,
  command: Command,
) -> Result<()> {
  let manager = match initial {
    Some(state) => OfflineManager::start_with_connectivity(&config, transport, storage, state).await,
    None => OfflineManager::start(&config, transport, storage).await,
  };
  info!(
    connectivity = %manager.monitor().current(),
    "Started against {}",
    config.server.url
  );

  let mut app = app::App::new(manager, config);
  app.execute(command).await
}
