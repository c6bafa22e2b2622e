//! Recovery strategy execution.
//!
//! `DefaultRecovery` turns a selected strategy into a `HandlingResult`. None of
//! the default strategies perform I/O; the trait is async so that executors
//! with real side effects (for example a genuine retry loop) can be plugged in
//! through `ErrorHandler::with_executor`.

use crate::breaker::CircuitBreakerRegistry;
use crate::context::ClassifiedError;
use crate::kind::{ErrorKind, RecoveryStrategy};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Outcome class of a handled error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultCategory {
    ManualInterventionRequired,
    CircuitBreaker,
    RetryDisabled,
    FallbackSuccess,
    FallbackUnavailable,
    PartialSkip,
    GracefulDegradation,
    CircuitBreakerActivated,
    NoRecoveryStrategy,
}

impl ResultCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResultCategory::ManualInterventionRequired => "manual_intervention_required",
            ResultCategory::CircuitBreaker => "circuit_breaker",
            ResultCategory::RetryDisabled => "retry_disabled",
            ResultCategory::FallbackSuccess => "fallback_success",
            ResultCategory::FallbackUnavailable => "fallback_unavailable",
            ResultCategory::PartialSkip => "partial_skip",
            ResultCategory::GracefulDegradation => "graceful_degradation",
            ResultCategory::CircuitBreakerActivated => "circuit_breaker_activated",
            ResultCategory::NoRecoveryStrategy => "no_recovery_strategy",
        }
    }
}

impl fmt::Display for ResultCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the caller should do after an error was handled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandlingResult {
    /// Whether the calling job may carry on with its remaining work.
    pub can_continue: bool,
    pub recovery_successful: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recovered_data: Option<serde_json::Value>,
    pub recommended_actions: Vec<String>,
    pub category: ResultCategory,
}

impl HandlingResult {
    /// A result that neither continues nor recovers.
    pub fn new(category: ResultCategory) -> Self {
        Self {
            can_continue: false,
            recovery_successful: false,
            recovered_data: None,
            recommended_actions: Vec::new(),
            category,
        }
    }

    pub fn continuing(mut self) -> Self {
        self.can_continue = true;
        self
    }

    pub fn recovered(mut self) -> Self {
        self.recovery_successful = true;
        self
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.recovered_data = Some(data);
        self
    }

    pub fn with_action<S: Into<String>>(mut self, action: S) -> Self {
        self.recommended_actions.push(action.into());
        self
    }

    pub fn with_actions<I, S>(mut self, actions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.recommended_actions
            .extend(actions.into_iter().map(Into::into));
        self
    }
}

/// Executes a recovery strategy for a classified error.
#[async_trait]
pub trait RecoveryExecutor: fmt::Debug + Send + Sync {
    async fn execute(
        &self,
        strategy: RecoveryStrategy,
        error: &ClassifiedError,
        breakers: &CircuitBreakerRegistry,
    ) -> HandlingResult;
}

/// Built-in strategy executor.
///
/// Retry is intentionally disabled: it always reports failure so callers never
/// assume an operation was re-run. Supply a custom `RecoveryExecutor` to add a
/// real retry loop.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultRecovery;

impl DefaultRecovery {
    pub fn retry(&self, error: &ClassifiedError) -> HandlingResult {
        HandlingResult::new(ResultCategory::RetryDisabled)
            .with_action(format!(
                "Automatic retry is disabled; re-run {}.{} once the cause is fixed",
                error.context.function, error.context.operation
            ))
            .with_actions(error.kind.recommendations().iter().copied())
    }

    pub fn fallback(&self, error: &ClassifiedError) -> HandlingResult {
        match error.kind {
            ErrorKind::DlsiteStructureChanged => HandlingResult::new(ResultCategory::FallbackSuccess)
                .continuing()
                .recovered()
                .with_data(serde_json::json!({ "fallbackMode": true }))
                .with_action("Switched to fallback parsing; update the DLsite selectors"),
            kind => HandlingResult::new(ResultCategory::FallbackUnavailable)
                .continuing()
                .with_action(format!("No fallback is implemented for {kind}; add one or fix the cause")),
        }
    }

    pub fn partial_skip(&self, error: &ClassifiedError) -> HandlingResult {
        HandlingResult::new(ResultCategory::PartialSkip)
            .continuing()
            .recovered()
            .with_action(format!(
                "Skip the failing item in {} and continue with the rest",
                error.context.function
            ))
    }

    pub fn graceful_degradation(&self, _error: &ClassifiedError) -> HandlingResult {
        HandlingResult::new(ResultCategory::GracefulDegradation)
            .continuing()
            .recovered()
            .with_data(serde_json::json!({ "degradedMode": true }))
            .with_action("Continue with reduced data; affected fields may be missing")
    }

    pub fn circuit_breaker(
        &self,
        error: &ClassifiedError,
        breakers: &CircuitBreakerRegistry,
    ) -> HandlingResult {
        let key = error.breaker_key();
        breakers.activate(&key);
        HandlingResult::new(ResultCategory::CircuitBreakerActivated)
            .with_action(format!(
                "Circuit breaker opened for {key}; recovery is paused for {} seconds",
                breakers.config().cooldown.as_secs()
            ))
            .with_actions(error.kind.recommendations().iter().copied())
    }

    pub fn no_recovery(&self, error: &ClassifiedError) -> HandlingResult {
        HandlingResult::new(ResultCategory::NoRecoveryStrategy)
            .with_actions(error.kind.recommendations().iter().copied())
    }
}

#[async_trait]
impl RecoveryExecutor for DefaultRecovery {
    async fn execute(
        &self,
        strategy: RecoveryStrategy,
        error: &ClassifiedError,
        breakers: &CircuitBreakerRegistry,
    ) -> HandlingResult {
        match strategy {
            RecoveryStrategy::Retry => self.retry(error),
            RecoveryStrategy::Fallback => self.fallback(error),
            RecoveryStrategy::PartialSkip => self.partial_skip(error),
            RecoveryStrategy::GracefulDegradation => self.graceful_degradation(error),
            RecoveryStrategy::CircuitBreaker => self.circuit_breaker(error, breakers),
            RecoveryStrategy::None => self.no_recovery(error),
        }
    }
}
