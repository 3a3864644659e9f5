//! Structured logging setup with tracing.

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Logging format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable text format.
    #[default]
    Text,
    /// JSON format for structured logging.
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" | "pretty" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => Err(format!("unknown log format: {s}")),
        }
    }
}

/// Install the global tracing subscriber.
///
/// * `level` - filter directive such as `info` or `runtime=debug,info`
/// * `format` - text for terminals, JSON for log shippers
///
/// `RUST_LOG`, when set, overrides `level`. Calling this more than once
/// keeps the first subscriber.
pub fn init_logging(level: &str, format: LogFormat) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    match format {
        LogFormat::Text => {
            let subscriber = tracing_subscriber::registry().with(env_filter).with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_names(true),
            );

            let _ = tracing::subscriber::set_global_default(subscriber);
        }
        LogFormat::Json => {
            let subscriber = tracing_subscriber::registry().with(env_filter).with(
                fmt::layer()
                    .json()
                    .flatten_event(true)
                    .with_target(true)
                    .with_thread_names(true),
            );

            let _ = tracing::subscriber::set_global_default(subscriber);
        }
    }
}
