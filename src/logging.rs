use color_eyre::{eyre::eyre, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;

/// Install the global subscriber.
///
/// RUST_LOG takes precedence over the configured level. Logs go to stderr
/// unless a file is configured, so stdout stays clean for command output.
/// Keep the returned guard alive until exit or buffered lines are lost.
pub fn init(config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
  let env_filter = match EnvFilter::try_from_default_env() {
    Ok(f) => f,
    Err(_) => match config.level.parse::<EnvFilter>() {
      Ok(f) => f,
      Err(e) => {
        eprintln!(
          "WARN: log level '{}' is not a valid tracing filter ({}); falling back to 'info'",
          config.level, e
        );
        EnvFilter::new("info")
      }
    },
  };

  let builder = tracing_subscriber::fmt()
    .with_env_filter(env_filter)
    .with_target(true);

  match &config.file {
    Some(path) => {
      if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
          .map_err(|e| eyre!("Failed to create log directory {}: {}", parent.display(), e))?;
      }
      let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| eyre!("Failed to open log file {}: {}", path.display(), e))?;

      let (writer, guard) = tracing_appender::non_blocking(file);
      builder
        .with_writer(writer)
        .with_ansi(false)
        .try_init()
        .map_err(|e| eyre!("Failed to install logger: {}", e))?;
      Ok(Some(guard))
    }
    None => {
      builder
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| eyre!("Failed to install logger: {}", e))?;
      Ok(None)
    }
  }
}
