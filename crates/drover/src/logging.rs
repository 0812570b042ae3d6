//! Tracing setup: a human-readable console layer plus an optional
//! daily-rolling JSON file.

use std::fs;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

use drover_config::LoggingConfig;

use crate::{DroverError, Result};

/// File name prefix of the rolling JSON log.
pub const LOG_FILE_PREFIX: &str = "drover.log";

/// The JSON file keeps everything the workspace crates emit.
const JSON_FILTER: &str = "drover=trace,drover_config=trace,drover_secrets=trace,drover_task=trace,\
                           drover_guard=trace,drover_session=trace,info";

/// Console filter: `RUST_LOG` when set, the configured level otherwise.
pub fn console_filter(config: &LoggingConfig) -> Result<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    EnvFilter::try_new(&config.level)
        .map_err(|e| DroverError::Logging(format!("invalid log level '{}': {e}", config.level)))
}

/// Install the global subscriber.
///
/// Returns the file writer's guard when JSON logging is enabled; buffered
/// lines are flushed when it is dropped, so keep it alive for the life of
/// the process.
pub fn init(config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let console = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_filter(console_filter(config)?);

    let (json, guard) = match &config.json_dir {
        Some(dir) => {
            fs::create_dir_all(dir)?;
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .json()
                .with_writer(writer)
                .with_filter(EnvFilter::new(JSON_FILTER));
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(console)
        .with(json)
        .try_init()
        .map_err(|e| DroverError::Logging(e.to_string()))?;

    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_console_filter_accepts_directives() {
        let config = LoggingConfig {
            level: "drover_session=debug,warn".to_string(),
            json_dir: None,
        };
        assert!(console_filter(&config).is_ok());
    }
}
