//! Handler configuration and environment variable handling.
//!
//! Settings are read once, when a handler is constructed. Nothing re-reads the
//! environment afterwards.

use crate::breaker::CircuitBreakerConfig;
use crate::context::Environment;
use crate::error::{SuzuminaError, SuzuminaResult};
use std::time::Duration;

pub const ENV_ENVIRONMENT: &str = "SUZUMINA_ENV";
pub const ENV_NODE_ENV: &str = "NODE_ENV";
pub const ENV_AUTO_RECOVERY: &str = "SUZUMINA_AUTO_RECOVERY";
pub const ENV_BREAKER_THRESHOLD: &str = "SUZUMINA_CIRCUIT_BREAKER_THRESHOLD";
pub const ENV_BREAKER_COOLDOWN_SECS: &str = "SUZUMINA_CIRCUIT_BREAKER_COOLDOWN_SECS";

/// Configuration for an `ErrorHandler`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerSettings {
    /// Deployment environment stamped onto every classified error.
    pub environment: Environment,
    /// Emit per-error metrics lines at debug level.
    pub debug_mode: bool,
    /// When false, every error is reported as needing manual intervention.
    pub auto_recovery_enabled: bool,
    pub circuit_breaker: CircuitBreakerConfig,
}

impl Default for HandlerSettings {
    fn default() -> Self {
        Self {
            environment: Environment::Development,
            debug_mode: true,
            auto_recovery_enabled: true,
            circuit_breaker: CircuitBreakerConfig::default(),
        }
    }
}

impl HandlerSettings {
    /// Read settings from process environment variables.
    ///
    /// # Environment Variables
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `SUZUMINA_ENV` | - | Environment name, takes precedence over `NODE_ENV` |
    /// | `NODE_ENV` | `development` | `production`, `test` or `development` |
    /// | `SUZUMINA_AUTO_RECOVERY` | `true` | Run recovery strategies (`true`/`false`) |
    /// | `SUZUMINA_CIRCUIT_BREAKER_THRESHOLD` | `5` | Failure count written on activation |
    /// | `SUZUMINA_CIRCUIT_BREAKER_COOLDOWN_SECS` | `300` | Seconds before an open breaker closes |
    ///
    /// # Errors
    /// Returns `SuzuminaError::Configuration` for values that do not parse.
    pub fn from_env() -> SuzuminaResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read settings through an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> SuzuminaResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let environment = lookup(ENV_ENVIRONMENT)
            .or_else(|| lookup(ENV_NODE_ENV))
            .map(|value| Environment::parse(&value))
            .unwrap_or(defaults.environment);

        let auto_recovery_enabled = match lookup(ENV_AUTO_RECOVERY) {
            Some(value) => parse_bool(ENV_AUTO_RECOVERY, &value)?,
            None => defaults.auto_recovery_enabled,
        };

        let failure_threshold = match lookup(ENV_BREAKER_THRESHOLD) {
            Some(value) => value.trim().parse::<u32>().map_err(|err| {
                SuzuminaError::configuration(ENV_BREAKER_THRESHOLD, err.to_string())
            })?,
            None => defaults.circuit_breaker.failure_threshold,
        };

        let cooldown = match lookup(ENV_BREAKER_COOLDOWN_SECS) {
            Some(value) => value
                .trim()
                .parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|err| {
                    SuzuminaError::configuration(ENV_BREAKER_COOLDOWN_SECS, err.to_string())
                })?,
            None => defaults.circuit_breaker.cooldown,
        };

        Ok(Self {
            environment,
            debug_mode: environment == Environment::Development,
            auto_recovery_enabled,
            circuit_breaker: CircuitBreakerConfig {
                failure_threshold,
                cooldown,
            },
        })
    }

    pub fn with_environment(mut self, environment: Environment) -> Self {
        self.environment = environment;
        self
    }

    pub fn with_debug_mode(mut self, debug_mode: bool) -> Self {
        self.debug_mode = debug_mode;
        self
    }

    pub fn with_auto_recovery(mut self, enabled: bool) -> Self {
        self.auto_recovery_enabled = enabled;
        self
    }

    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.circuit_breaker.failure_threshold = threshold;
        self
    }

    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.circuit_breaker.cooldown = cooldown;
        self
    }
}

fn parse_bool(key: &str, value: &str) -> SuzuminaResult<bool> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        other => Err(SuzuminaError::configuration(
            key,
            format!("expected a boolean, got '{other}'"),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_settings_default() {
        let settings = HandlerSettings::default();
        assert_eq!(settings.environment, Environment::Development);
        assert!(settings.debug_mode);
        assert!(settings.auto_recovery_enabled);
        assert_eq!(settings.circuit_breaker.failure_threshold, 5);
        assert_eq!(settings.circuit_breaker.cooldown, Duration::from_secs(300));
    }

    #[test]
    fn test_empty_environment_should_yield_defaults() {
        let settings = HandlerSettings::from_lookup(lookup(&[])).unwrap();
        assert_eq!(settings, HandlerSettings::default());
    }

    #[test]
    fn test_production_should_disable_debug_mode() {
        let settings = HandlerSettings::from_lookup(lookup(&[
            ("NODE_ENV", "production"),
            ("SUZUMINA_AUTO_RECOVERY", "false"),
            ("SUZUMINA_CIRCUIT_BREAKER_THRESHOLD", "3"),
            ("SUZUMINA_CIRCUIT_BREAKER_COOLDOWN_SECS", "60"),
        ]))
        .unwrap();

        assert_eq!(settings.environment, Environment::Production);
        assert!(!settings.debug_mode);
        assert!(!settings.auto_recovery_enabled);
        assert_eq!(settings.circuit_breaker.failure_threshold, 3);
        assert_eq!(settings.circuit_breaker.cooldown, Duration::from_secs(60));
    }

    #[test]
    fn test_suzumina_env_should_take_precedence() {
        let settings = HandlerSettings::from_lookup(lookup(&[
            ("SUZUMINA_ENV", "test"),
            ("NODE_ENV", "production"),
        ]))
        .unwrap();

        assert_eq!(settings.environment, Environment::Test);
        assert!(!settings.debug_mode);
    }

    #[test]
    fn test_invalid_values_should_be_configuration_errors() {
        let err = HandlerSettings::from_lookup(lookup(&[("SUZUMINA_AUTO_RECOVERY", "maybe")]))
            .unwrap_err();
        assert!(matches!(
            err,
            SuzuminaError::Configuration { ref key, .. } if key == ENV_AUTO_RECOVERY
        ));

        let err = HandlerSettings::from_lookup(lookup(&[(
            "SUZUMINA_CIRCUIT_BREAKER_THRESHOLD",
            "-1",
        )]))
        .unwrap_err();
        assert!(matches!(
            err,
            SuzuminaError::Configuration { ref key, .. } if key == ENV_BREAKER_THRESHOLD
        ));
    }

    #[test]
    fn test_builder_setters() {
        let settings = HandlerSettings::default()
            .with_environment(Environment::Test)
            .with_debug_mode(false)
            .with_auto_recovery(false)
            .with_failure_threshold(2)
            .with_cooldown(Duration::from_secs(10));

        assert_eq!(settings.environment, Environment::Test);
        assert!(!settings.debug_mode);
        assert!(!settings.auto_recovery_enabled);
        assert_eq!(settings.circuit_breaker.failure_threshold, 2);
        assert_eq!(settings.circuit_breaker.cooldown, Duration::from_secs(10));
    }
}
