//! # routerboot-log
//!
//! Logging setup shared by routerboot binaries. Library crates only emit
//! `tracing` events; this crate installs the subscriber that renders them.
//!
//! ```no_run
//! let _guard = routerboot_log::auto_init()?;
//! tracing::info!(directory = "/var/lib/router", "Bootstrapping");
//! # Ok::<(), routerboot_log::LogError>(())
//! ```

#![forbid(unsafe_code)]

mod builder;
mod config;

pub use builder::{LoggerBuilder, LoggerGuard};
pub use config::{Config, DisplayConfig, Format};

use thiserror::Error;

/// Logger setup errors
#[derive(Debug, Error)]
pub enum LogError {
    /// Filter directive could not be parsed
    #[error("Invalid log filter '{filter}': {reason}")]
    Filter {
        /// The filter as given
        filter: String,
        /// Parser message
        reason: String,
    },

    /// Unknown output format name
    #[error("Unknown log format '{0}', expected pretty, compact or json")]
    Format(String),

    /// A global subscriber is already installed
    #[error("Failed to install logger: {0}")]
    Init(String),
}

/// Result type for logger setup
pub type LogResult<T> = Result<T, LogError>;

/// Pick a configuration from the environment and install it
///
/// `ROUTERBOOT_LOG` or `RUST_LOG` select [`Config::from_env`]; otherwise debug
/// builds log for development and release builds for production.
pub fn auto_init() -> LogResult<LoggerGuard> {
    if std::env::var_os("ROUTERBOOT_LOG").is_some() || std::env::var_os("RUST_LOG").is_some() {
        init_with(Config::from_env())
    } else if cfg!(debug_assertions) {
        init_with(Config::development())
    } else {
        init_with(Config::production())
    }
}

/// Install `config`
pub fn init_with(config: Config) -> LogResult<LoggerGuard> {
    LoggerBuilder::from_config(config).build()
}
