//! Per-operation circuit breakers with lazy cooldown reset.
//!
//! A breaker is opened explicitly by the circuit-breaker recovery strategy and
//! closes again the first time it is checked after the cooldown has elapsed.
//! There is no background timer and no half-open trial state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// Source of the current time.
pub trait Clock: fmt::Debug + Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to. Useful for exercising cooldowns.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now += chrono::Duration::from_std(by).unwrap_or(chrono::Duration::zero());
    }

    pub fn set(&self, at: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner) = at;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(Utc::now())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Circuit breaker configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    /// Failure count recorded when a breaker is activated.
    pub failure_threshold: u32,
    /// How long a breaker stays open before the next check closes it.
    pub cooldown: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cooldown: Duration::from_secs(5 * 60),
        }
    }
}

/// State of one operation's breaker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakerEntry {
    pub is_open: bool,
    pub last_failure_at: DateTime<Utc>,
    pub failure_count: u32,
}

/// Answer to a breaker lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakerStatus {
    pub is_open: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl BreakerStatus {
    fn closed() -> Self {
        Self {
            is_open: false,
            reason: None,
        }
    }
}

/// Registry of breakers keyed by `"{function}.{operation}"`.
///
/// Check-then-reset and activation both run under one lock, so concurrent
/// callers never observe a half-reset entry.
#[derive(Debug)]
pub struct CircuitBreakerRegistry {
    config: CircuitBreakerConfig,
    clock: Arc<dyn Clock>,
    entries: Mutex<HashMap<String, BreakerEntry>>,
}

impl Default for CircuitBreakerRegistry {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}

impl CircuitBreakerRegistry {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: CircuitBreakerConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            clock,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Look up `key`, closing it first if its cooldown has elapsed.
    pub fn check(&self, key: &str) -> BreakerStatus {
        let now = self.clock.now();
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(entry) = entries.get_mut(key) else {
            return BreakerStatus::closed();
        };

        if entry.is_open && self.cooldown_elapsed(entry.last_failure_at, now) {
            entry.is_open = false;
            entry.failure_count = 0;
            tracing::info!(key, "circuit breaker closed after cooldown");
        }

        if entry.is_open {
            BreakerStatus {
                is_open: true,
                reason: Some(format!(
                    "circuit breaker for {key} open since {} ({} failures)",
                    entry.last_failure_at.to_rfc3339(),
                    entry.failure_count
                )),
            }
        } else {
            BreakerStatus::closed()
        }
    }

    /// Open the breaker for `key`.
    pub fn activate(&self, key: &str) {
        let now = self.clock.now();
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.insert(
            key.to_string(),
            BreakerEntry {
                is_open: true,
                last_failure_at: now,
                failure_count: self.config.failure_threshold,
            },
        );
        tracing::warn!(
            key,
            cooldown_secs = self.config.cooldown.as_secs(),
            "circuit breaker activated"
        );
    }

    /// Current entry for `key` without applying the cooldown reset.
    pub fn entry(&self, key: &str) -> Option<BreakerEntry> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    /// Keys whose entry is currently marked open.
    pub fn open_keys(&self) -> Vec<String> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let mut keys: Vec<String> = entries
            .iter()
            .filter(|(_, entry)| entry.is_open)
            .map(|(key, _)| key.clone())
            .collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn cooldown_elapsed(&self, since: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(since)
            .to_std()
            .map(|elapsed| elapsed > self.config.cooldown)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> (CircuitBreakerRegistry, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::default());
        let config = CircuitBreakerConfig {
            failure_threshold: 5,
            cooldown: Duration::from_secs(60),
        };
        (CircuitBreakerRegistry::with_clock(config, clock.clone()), clock)
    }

    #[test]
    fn test_unknown_key_should_be_closed_without_entry() {
        let (breakers, _) = registry();

        assert!(!breakers.check("fetchYouTubeVideos.search").is_open);
        assert!(breakers.is_empty());
    }

    #[test]
    fn test_activate_should_open_immediately() {
        // Given: an activated breaker
        let (breakers, _) = registry();
        breakers.activate("fetchYouTubeVideos.search");

        // When: checking right away
        let status = breakers.check("fetchYouTubeVideos.search");

        // Then: it is open and records the threshold
        assert!(status.is_open);
        assert!(status.reason.unwrap().contains("fetchYouTubeVideos.search"));
        assert_eq!(breakers.entry("fetchYouTubeVideos.search").unwrap().failure_count, 5);
    }

    #[test]
    fn test_check_after_cooldown_should_reset_lazily() {
        let (breakers, clock) = registry();
        breakers.activate("k");

        // Exactly at the cooldown boundary the breaker stays open
        clock.advance(Duration::from_secs(60));
        assert!(breakers.check("k").is_open);

        // The stored entry is untouched until the next check past the cooldown
        clock.advance(Duration::from_secs(1));
        assert!(breakers.entry("k").unwrap().is_open);

        let status = breakers.check("k");
        assert!(!status.is_open);
        assert_eq!(status.reason, None);

        let entry = breakers.entry("k").unwrap();
        assert!(!entry.is_open);
        assert_eq!(entry.failure_count, 0);
        assert_eq!(breakers.len(), 1);
    }

    #[test]
    fn test_breakers_should_be_independent_per_key() {
        let (breakers, _) = registry();
        breakers.activate("a.x");

        assert!(breakers.check("a.x").is_open);
        assert!(!breakers.check("a.y").is_open);
        assert_eq!(breakers.open_keys(), vec!["a.x".to_string()]);
    }

    #[test]
    fn test_reactivation_should_restart_cooldown() {
        let (breakers, clock) = registry();
        breakers.activate("k");
        clock.advance(Duration::from_secs(50));
        breakers.activate("k");
        clock.advance(Duration::from_secs(50));

        assert!(breakers.check("k").is_open);
    }

    #[test]
    fn test_concurrent_checks_should_reset_once() {
        let (breakers, clock) = registry();
        breakers.activate("k");
        clock.advance(Duration::from_secs(120));

        std::thread::scope(|scope| {
            for _ in 0..8 {
                scope.spawn(|| {
                    assert!(!breakers.check("k").is_open);
                });
            }
        });

        assert_eq!(breakers.entry("k").unwrap().failure_count, 0);
    }
}
