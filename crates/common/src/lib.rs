use snafu::ResultExt;
use tracing_subscriber::EnvFilter;

#[derive(Debug, snafu::Snafu)]
pub enum InitLoggerError {
    #[snafu(display("Failed to initialize logger: {}", source))]
    LoggerFailed {
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

/// Install the global subscriber. `RUST_LOG` wins over `log_level` when set.
pub fn init_logger(log_level: &str) -> Result<(), InitLoggerError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init()
        .context(LoggerFailedSnafu)?;

    Ok(())
}
