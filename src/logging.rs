use color_eyre::Result;
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use mgpas_offline::config;

/// Route tracing output to a daily log file under the data directory.
///
/// Level comes from `MGPAS_LOG` (default `info`). Keep the guard alive for
/// the whole run or buffered lines are lost.
pub fn init() -> Result<WorkerGuard> {
  init_in(&config::data_dir()?.join("logs"))
}

fn init_in(log_dir: &Path) -> Result<WorkerGuard> {
  std::fs::create_dir_all(log_dir)?;

  let filter = EnvFilter::try_from_env("MGPAS_LOG").unwrap_or_else(|_| EnvFilter::new("info"));

  let file_appender = RollingFileAppender::builder()
    .rotation(Rotation::DAILY)
    .filename_prefix("mgpas-offline.log")
    .build(log_dir)?;
  let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

  tracing_subscriber::registry()
    .with(filter)
    .with(
      fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true),
    )
    .try_init()?;

  Ok(guard)
}
