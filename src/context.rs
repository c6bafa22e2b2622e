//! Error context and classified error records.
//!
//! This module provides the caller-supplied `ErrorContext`, the
//! `ClassifiedError` produced for every handled failure, and `ErrorInput`,
//! the sum type accepted by the handler.

use crate::classifier::{ErrorCode, SourceError};
use crate::kind::{ErrorKind, RecoveryStrategy, Severity};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

/// Deployment environment the handler runs in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Production,
    Test,
}

impl Environment {
    /// Parse a `NODE_ENV` style value. Anything unrecognised is development.
    pub fn parse(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "production" | "prod" => Environment::Production,
            "test" => Environment::Test,
            _ => Environment::Development,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Production => "production",
            Environment::Test => "test",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a failure happened.
///
/// `function` and `operation` together key the circuit breaker; `function`
/// alone (with the kind) keys the error counter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorContext {
    /// Name of the function (job) that failed.
    pub function: String,
    /// Operation within that function.
    pub operation: String,
    /// When the failure was reported.
    pub timestamp: DateTime<Utc>,
    /// Filled in by the handler from its settings.
    pub environment: Environment,
    /// Free-form details for debugging.
    pub additional_info: HashMap<String, serde_json::Value>,
}

impl ErrorContext {
    /// Create a context stamped with the current time.
    pub fn new<F: Into<String>, O: Into<String>>(function: F, operation: O) -> Self {
        Self {
            function: function.into(),
            operation: operation.into(),
            timestamp: Utc::now(),
            environment: Environment::default(),
            additional_info: HashMap::new(),
        }
    }

    /// Add a debugging detail using builder pattern.
    ///
    /// # Example
    /// ```rust
    /// use suzumina_errors::ErrorContext;
    ///
    /// let context = ErrorContext::new("fetchDLsiteWorks", "parse-page")
    ///     .with_info("page", serde_json::json!(3))
    ///     .with_info("url", serde_json::json!("https://www.dlsite.com/maniax/"));
    /// assert_eq!(context.additional_info.len(), 2);
    /// ```
    pub fn with_info<K: Into<String>>(mut self, key: K, value: serde_json::Value) -> Self {
        self.additional_info.insert(key.into(), value);
        self
    }

    pub fn with_environment(mut self, environment: Environment) -> Self {
        self.environment = environment;
        self
    }

    /// Circuit breaker key: `"{function}.{operation}"`.
    pub fn breaker_key(&self) -> String {
        format!("{}.{}", self.function, self.operation)
    }
}

/// One classified occurrence of a failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassifiedError {
    /// Correlation token for logs; not guaranteed unique.
    pub error_id: String,
    pub kind: ErrorKind,
    pub severity: Severity,
    pub strategy: RecoveryStrategy,
    pub name: String,
    pub message: String,
    pub code: Option<ErrorCode>,
    pub context: ErrorContext,
}

impl ClassifiedError {
    /// Build a classified error for `source`, deriving severity and strategy
    /// from `kind`.
    pub fn new(source: SourceError, kind: ErrorKind, context: ErrorContext) -> Self {
        let severity = kind.severity();
        Self {
            error_id: generate_error_id(context.timestamp),
            kind,
            severity,
            strategy: crate::kind::select_strategy(kind, severity),
            name: source.name,
            message: source.message,
            code: source.code,
            context,
        }
    }

    /// Error counter key: `"{KIND}_{function}"`.
    pub fn counter_key(&self) -> String {
        format!("{}_{}", self.kind.as_str(), self.context.function)
    }

    pub fn breaker_key(&self) -> String {
        self.context.breaker_key()
    }
}

impl fmt::Display for ClassifiedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.error_id, self.kind, self.message)
    }
}

/// `err_{unix millis}_{9 random hex chars}`.
fn generate_error_id(at: DateTime<Utc>) -> String {
    let random = Uuid::new_v4().simple().to_string();
    format!("err_{}_{}", at.timestamp_millis(), &random[..9])
}

/// What the handler accepts: a raw failure, or one that was already classified
/// upstream and must pass through untouched.
#[derive(Debug, Clone, PartialEq)]
pub enum ErrorInput {
    Raw(SourceError),
    Classified(ClassifiedError),
}

impl From<SourceError> for ErrorInput {
    fn from(error: SourceError) -> Self {
        ErrorInput::Raw(error)
    }
}

impl From<ClassifiedError> for ErrorInput {
    fn from(error: ClassifiedError) -> Self {
        ErrorInput::Classified(error)
    }
}

impl From<&str> for ErrorInput {
    fn from(message: &str) -> Self {
        ErrorInput::Raw(SourceError::new(message))
    }
}

impl From<String> for ErrorInput {
    fn from(message: String) -> Self {
        ErrorInput::Raw(SourceError::new(message))
    }
}

impl From<crate::error::SuzuminaError> for ErrorInput {
    fn from(error: crate::error::SuzuminaError) -> Self {
        ErrorInput::Raw(error.into())
    }
}
