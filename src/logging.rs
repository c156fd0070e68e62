//! Logging setup
//!
//! The library only emits `tracing` events. Applications that want them on
//! stdout call [`init_logging`] once at startup.

use crate::config::{LogFormat, LoggingConfig};
use crate::error::{PaymentError, PaymentResult};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Installs a global fmt subscriber.
///
/// `RUST_LOG` takes precedence over the configured level. Does nothing when
/// logging is disabled. Fails if a global subscriber is already installed.
pub fn init_logging(config: &LoggingConfig) -> PaymentResult<()> {
    if !config.enabled {
        return Ok(());
    }

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(config.level.as_str()));

    let registry = tracing_subscriber::registry().with(env_filter);
    let result = match config.format {
        LogFormat::Plain => registry
            .with(tracing_subscriber::fmt::layer().with_target(config.with_target))
            .try_init(),
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(config.with_target)
                    .json()
                    .flatten_event(true),
            )
            .try_init(),
    };

    result.map_err(|e| PaymentError::configuration(format!("Failed to initialize logging: {}", e)))
}
