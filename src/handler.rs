//! The error handler facade.
//!
//! `ErrorHandler::handle_error` is the single entry point: it classifies the
//! failure, logs it, counts it, consults the circuit breaker and finally runs
//! the selected recovery strategy. It never returns an error and never panics.

use crate::breaker::{CircuitBreakerRegistry, Clock, SystemClock};
use crate::classifier::{ErrorClassifier, RuleClassifier, SourceError};
use crate::context::{ClassifiedError, ErrorContext, ErrorInput};
use crate::kind::{ErrorKind, Severity};
use crate::recovery::{DefaultRecovery, HandlingResult, RecoveryExecutor, ResultCategory};
use crate::settings::HandlerSettings;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

/// Snapshot of what a handler has seen so far.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorStatistics {
    pub total_errors: u64,
    pub by_kind: HashMap<ErrorKind, u64>,
    pub open_circuit_breakers: Vec<String>,
}

/// Classifies failures and decides how the calling job should proceed.
///
/// Counters and breakers live as long as the handler. Construct one per
/// process and share it, or use [`ErrorHandler::global`].
#[derive(Debug)]
pub struct ErrorHandler {
    settings: HandlerSettings,
    classifier: Box<dyn ErrorClassifier>,
    executor: Arc<dyn RecoveryExecutor>,
    breakers: CircuitBreakerRegistry,
    error_counts: Mutex<HashMap<(ErrorKind, String), u64>>,
}

impl Default for ErrorHandler {
    fn default() -> Self {
        Self::new(HandlerSettings::default())
    }
}

impl ErrorHandler {
    pub fn new(settings: HandlerSettings) -> Self {
        let breakers = CircuitBreakerRegistry::with_clock(
            settings.circuit_breaker.clone(),
            Arc::new(SystemClock),
        );
        Self {
            settings,
            classifier: Box::new(RuleClassifier::default()),
            executor: Arc::new(DefaultRecovery),
            breakers,
            error_counts: Mutex::new(HashMap::new()),
        }
    }

    /// Process-wide handler, built from the environment on first access.
    ///
    /// Invalid environment values are logged and replaced by defaults.
    pub fn global() -> &'static ErrorHandler {
        static HANDLER: OnceLock<ErrorHandler> = OnceLock::new();
        HANDLER.get_or_init(|| {
            let settings = HandlerSettings::from_env().unwrap_or_else(|err| {
                tracing::warn!(error = %err, "invalid error handler settings, using defaults");
                HandlerSettings::default()
            });
            ErrorHandler::new(settings)
        })
    }

    pub fn with_classifier(mut self, classifier: Box<dyn ErrorClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn with_executor(mut self, executor: Arc<dyn RecoveryExecutor>) -> Self {
        self.executor = executor;
        self
    }

    /// Replace the breaker clock. Existing breaker state is discarded.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.breakers =
            CircuitBreakerRegistry::with_clock(self.settings.circuit_breaker.clone(), clock);
        self
    }

    pub fn settings(&self) -> &HandlerSettings {
        &self.settings
    }

    pub fn breakers(&self) -> &CircuitBreakerRegistry {
        &self.breakers
    }

    /// Classify a raw failure without handling it.
    pub fn classify(&self, source: SourceError, context: ErrorContext) -> ClassifiedError {
        let kind = self.classifier.classify(&source);
        let context = context.with_environment(self.settings.environment);
        ClassifiedError::new(source, kind, context)
    }

    /// Handle one failure and report how the caller should proceed.
    ///
    /// An already classified input passes through unchanged and `context` is
    /// ignored for it.
    pub async fn handle_error<E>(&self, input: E, context: ErrorContext) -> HandlingResult
    where
        E: Into<ErrorInput>,
    {
        let error = match input.into() {
            ErrorInput::Raw(source) => self.classify(source, context),
            ErrorInput::Classified(classified) => classified,
        };

        log_classified(&error);
        let count = self.increment(&error);

        let result = self.recover(&error).await;

        if self.settings.debug_mode {
            tracing::debug!(
                target: "suzumina_errors::metrics",
                error_id = %error.error_id,
                kind = %error.kind,
                function = %error.context.function,
                operation = %error.context.operation,
                count,
                category = %result.category,
                can_continue = result.can_continue,
                recovery_successful = result.recovery_successful,
                "error handled"
            );
        }

        result
    }

    async fn recover(&self, error: &ClassifiedError) -> HandlingResult {
        if !self.settings.auto_recovery_enabled {
            return HandlingResult::new(ResultCategory::ManualInterventionRequired)
                .with_action("Automatic recovery is disabled; handle this error manually")
                .with_actions(error.kind.recommendations().iter().copied());
        }

        let status = self.breakers.check(&error.breaker_key());
        if status.is_open {
            tracing::warn!(
                error_id = %error.error_id,
                key = %error.breaker_key(),
                "circuit breaker open, skipping recovery"
            );
            let mut result = HandlingResult::new(ResultCategory::CircuitBreaker);
            if let Some(reason) = status.reason {
                result = result.with_action(reason);
            }
            return result;
        }

        self.executor
            .execute(error.strategy, error, &self.breakers)
            .await
    }

    fn increment(&self, error: &ClassifiedError) -> u64 {
        let mut counts = self
            .error_counts
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let count = counts
            .entry((error.kind, error.context.function.clone()))
            .or_insert(0);
        *count += 1;
        *count
    }

    /// Times `kind` was handled for `function`.
    pub fn error_count(&self, kind: ErrorKind, function: &str) -> u64 {
        self.error_counts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(kind, function.to_string()))
            .copied()
            .unwrap_or(0)
    }

    /// All counters keyed by `"{KIND}_{function}"`.
    pub fn error_counts(&self) -> HashMap<String, u64> {
        self.error_counts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|((kind, function), count)| (format!("{}_{}", kind.as_str(), function), *count))
            .collect()
    }

    pub fn statistics(&self) -> ErrorStatistics {
        let (total_errors, by_kind) = {
            let counts = self
                .error_counts
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            let mut by_kind: HashMap<ErrorKind, u64> = HashMap::new();
            for ((kind, _), count) in counts.iter() {
                *by_kind.entry(*kind).or_insert(0) += count;
            }
            (counts.values().sum(), by_kind)
        };

        ErrorStatistics {
            total_errors,
            by_kind,
            open_circuit_breakers: self.breakers.open_keys(),
        }
    }
}

fn log_classified(error: &ClassifiedError) {
    macro_rules! emit {
        ($level:ident) => {
            tracing::$level!(
                error_id = %error.error_id,
                kind = %error.kind,
                severity = %error.severity,
                strategy = %error.strategy,
                function = %error.context.function,
                operation = %error.context.operation,
                environment = %error.context.environment,
                "{}",
                error.message
            )
        };
    }

    match error.severity {
        Severity::Critical | Severity::High => emit!(error),
        Severity::Medium => emit!(warn),
        Severity::Low => emit!(info),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::breaker::ManualClock;
    use crate::context::Environment;
    use crate::kind::RecoveryStrategy;
    use std::time::Duration;

    fn handler() -> ErrorHandler {
        ErrorHandler::new(HandlerSettings::default().with_environment(Environment::Test))
    }

    #[tokio::test]
    async fn test_network_timeout_should_report_retry_disabled() {
        // Given: a timeout in a network request
        let handler = handler();
        let context = ErrorContext::new("test", "network-request");
        let classified = handler.classify(SourceError::new("Network timeout occurred"), context.clone());

        // Then: it is a medium-severity timeout with a retry strategy
        assert_eq!(classified.kind, ErrorKind::Timeout);
        assert_eq!(classified.severity, Severity::Medium);
        assert_eq!(classified.strategy, RecoveryStrategy::Retry);

        // When: handling it
        let result = handler
            .handle_error(SourceError::new("Network timeout occurred"), context)
            .await;

        // Then: retry is disabled, so the caller must stop
        assert!(!result.can_continue);
        assert!(!result.recovery_successful);
        assert_eq!(result.category, ResultCategory::RetryDisabled);
    }

    #[tokio::test]
    async fn test_counts_should_increment_per_kind_and_function() {
        let handler = handler();
        assert_eq!(handler.error_count(ErrorKind::Timeout, "test"), 0);

        handler
            .handle_error("Network timeout occurred", ErrorContext::new("test", "a"))
            .await;
        assert_eq!(handler.error_count(ErrorKind::Timeout, "test"), 1);
        assert!(!handler.error_counts().is_empty());

        handler
            .handle_error("request timed out", ErrorContext::new("test", "b"))
            .await;
        assert_eq!(handler.error_count(ErrorKind::Timeout, "test"), 2);
        assert_eq!(handler.error_counts()["TIMEOUT_ERROR_test"], 2);
    }

    #[tokio::test]
    async fn test_disabled_auto_recovery_should_override_everything() {
        let handler = ErrorHandler::new(HandlerSettings::default().with_auto_recovery(false));
        handler.breakers().activate("f.o");

        for message in [
            "DLsite page structure changed",
            "YouTube quota exceeded",
            "Network timeout occurred",
            "something odd",
        ] {
            let result = handler.handle_error(message, ErrorContext::new("f", "o")).await;
            assert_eq!(result.category, ResultCategory::ManualInterventionRequired);
            assert!(!result.can_continue);
            assert!(!result.recovery_successful);
        }
    }

    #[tokio::test]
    async fn test_quota_should_open_breaker_and_short_circuit_next_call() {
        // Given: a handler with a controllable clock
        let clock = Arc::new(ManualClock::default());
        let handler = ErrorHandler::new(
            HandlerSettings::default().with_cooldown(Duration::from_secs(60)),
        )
        .with_clock(clock.clone());
        let context = || ErrorContext::new("fetchYouTubeVideos", "search");

        // When: the quota is exhausted
        let first = handler
            .handle_error("YouTube API quota exceeded", context())
            .await;
        assert_eq!(first.category, ResultCategory::CircuitBreakerActivated);

        // Then: the next failure for the operation skips recovery entirely
        let second = handler.handle_error("DLsite page structure changed", context()).await;
        assert_eq!(second.category, ResultCategory::CircuitBreaker);
        assert!(!second.can_continue);
        assert_eq!(
            handler.statistics().open_circuit_breakers,
            vec!["fetchYouTubeVideos.search".to_string()]
        );

        // And: after the cooldown the strategy runs again
        clock.advance(Duration::from_secs(61));
        let third = handler.handle_error("DLsite page structure changed", context()).await;
        assert_eq!(third.category, ResultCategory::FallbackSuccess);
        assert!(third.recovery_successful);
    }

    #[tokio::test]
    async fn test_classified_input_should_pass_through() {
        // Given: an error classified elsewhere with a deliberately odd kind
        let handler = handler();
        let classified = ClassifiedError::new(
            SourceError::new("Network timeout occurred"),
            ErrorKind::DataQuality,
            ErrorContext::new("upstream", "op"),
        );

        // When: handling it under a different context
        let result = handler
            .handle_error(classified, ErrorContext::new("ignored", "ignored"))
            .await;

        // Then: its own kind and context are used
        assert_eq!(result.category, ResultCategory::GracefulDegradation);
        assert_eq!(handler.error_count(ErrorKind::DataQuality, "upstream"), 1);
        assert_eq!(handler.error_count(ErrorKind::Timeout, "ignored"), 0);
    }

    #[tokio::test]
    async fn test_statistics_should_aggregate_by_kind() {
        let handler = handler();
        handler.handle_error("invalid work id", ErrorContext::new("a", "x")).await;
        handler.handle_error("invalid price", ErrorContext::new("b", "x")).await;
        handler.handle_error("Firestore unavailable", ErrorContext::new("a", "x")).await;

        let stats = handler.statistics();
        assert_eq!(stats.total_errors, 3);
        assert_eq!(stats.by_kind[&ErrorKind::Validation], 2);
        assert_eq!(stats.by_kind[&ErrorKind::Firestore], 1);
        assert!(stats.open_circuit_breakers.is_empty());
    }

    #[test]
    fn test_classify_should_stamp_environment() {
        let handler = ErrorHandler::new(
            HandlerSettings::default().with_environment(Environment::Production),
        );
        let classified = handler.classify(SourceError::new("x"), ErrorContext::new("f", "o"));

        assert_eq!(classified.context.environment, Environment::Production);
    }

    #[test]
    fn test_global_should_return_same_instance() {
        let a = ErrorHandler::global() as *const ErrorHandler;
        let b = ErrorHandler::global() as *const ErrorHandler;
        assert_eq!(a, b);
    }
}
