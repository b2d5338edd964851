//! Tracing initialization for the hovel control plane.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::error::{HovelError, Result};

/// Initialize the tracing subscriber with environment-based configuration.
///
/// Uses standard RUST_LOG environment variable for filtering:
/// - `RUST_LOG=debug` - Set global level
/// - `RUST_LOG=hovel_engine=debug,tower_http=debug` - Per-module levels
///
/// Uses RUST_LOG_FORMAT for output format (optional):
/// - `json` - JSON formatted output
/// - `compact` - Compact single-line output
/// - `pretty` - Pretty formatted output (default)
pub fn init() -> Result<()> {
    init_with_defaults("info")
}

/// Initialize with a default filter if RUST_LOG is not set.
pub fn init_with_defaults(default_filter: &str) -> Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let format = std::env::var("RUST_LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string());

    match format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().with_ansi(false).json())
                .try_init()
                .map_err(|e| {
                    HovelError::Internal(format!("Failed to initialize tracing: {}", e))
                })?;
        }
        "compact" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().compact())
                .try_init()
                .map_err(|e| {
                    HovelError::Internal(format!("Failed to initialize tracing: {}", e))
                })?;
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().pretty())
                .try_init()
                .map_err(|e| {
                    HovelError::Internal(format!("Failed to initialize tracing: {}", e))
                })?;
        }
    }

    Ok(())
}
