//! Logger builder

#[macro_use]
mod format;

use tracing_subscriber::{EnvFilter, Registry, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{Config, Format};
use crate::{LogError, LogResult};

/// Logger builder
#[derive(Debug)]
pub struct LoggerBuilder {
    config: Config,
}

/// Keeps the logger installed
///
/// Everything is written synchronously to stderr, so dropping the guard
/// flushes nothing; it exists so callers hold logging for the process
/// lifetime the same way regardless of configuration.
#[derive(Debug)]
#[must_use = "dropping the guard early is allowed but usually unintended"]
pub struct LoggerGuard {
    _installed: (),
}

impl LoggerBuilder {
    /// Create builder from config
    #[must_use]
    pub fn from_config(config: Config) -> Self {
        Self { config }
    }

    /// Install the global subscriber
    ///
    /// Fails when the filter does not parse or a subscriber is already set.
    pub fn build(self) -> LogResult<LoggerGuard> {
        let filter = EnvFilter::try_new(&self.config.level).map_err(|e| LogError::Filter {
            filter: self.config.level.clone(),
            reason: e.to_string(),
        })?;
        let display = &self.config.display;
        let registry = Registry::default().with(filter);

        let installed = match self.config.format {
            Format::Pretty => registry.with(create_fmt_layer!(pretty, display)).try_init(),
            Format::Compact => registry.with(create_fmt_layer!(compact, display)).try_init(),
            Format::Json => registry.with(create_json_layer!(display)).try_init(),
        };
        installed.map_err(|e| LogError::Init(e.to_string()))?;

        Ok(LoggerGuard { _installed: () })
    }
}
