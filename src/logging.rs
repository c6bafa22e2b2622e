//! Structured log output for handler and health-monitor events.
//!
//! Events are emitted through `tracing`; this module only installs a
//! subscriber. Logs go to stderr. `RUST_LOG` overrides the configured level.

use crate::context::Environment;
use crate::error::{SuzuminaError, SuzuminaResult};
use tracing_subscriber::{fmt, EnvFilter};

/// Log level for the subscriber.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
    Off,
}

impl LogLevel {
    fn directive(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
            LogLevel::Off => "off",
        }
    }
}

/// Configuration for the log subscriber.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: LogLevel,
    pub with_timestamps: bool,
    pub with_target: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            with_timestamps: true,
            with_target: true,
        }
    }
}

impl LoggingConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Debug output in development, info everywhere else.
    pub fn for_environment(environment: Environment) -> Self {
        let level = match environment {
            Environment::Development => LogLevel::Debug,
            Environment::Production | Environment::Test => LogLevel::Info,
        };
        Self::default().with_level(level)
    }

    pub fn with_level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }

    pub fn with_timestamps(mut self, enabled: bool) -> Self {
        self.with_timestamps = enabled;
        self
    }

    pub fn with_target(mut self, enabled: bool) -> Self {
        self.with_target = enabled;
        self
    }

    fn env_filter(&self) -> EnvFilter {
        if std::env::var("RUST_LOG").is_ok() {
            EnvFilter::from_default_env()
        } else {
            EnvFilter::new(self.level.directive())
        }
    }
}

/// Install the global subscriber.
///
/// # Errors
/// Returns `SuzuminaError::Initialization` if a global subscriber is already set.
pub fn init_logging(config: LoggingConfig) -> SuzuminaResult<()> {
    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(config.env_filter())
        .with_writer(std::io::stderr)
        .with_target(config.with_target);

    let installed = if config.with_timestamps {
        subscriber.try_init()
    } else {
        subscriber.without_time().try_init()
    };

    installed.map_err(|err| SuzuminaError::initialization(err.to_string()))
}
