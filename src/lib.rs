//! # suzumina-errors
//!
//! Error classification and recovery for the suzumina.click background
//! functions, plus a health monitor for the DLsite pages those functions scrape.
//!
//! ## Features
//!
//! - **Classification**: ordered keyword rules map raw failures onto a closed
//!   set of error kinds (YouTube, DLsite, Firestore, network, ...)
//! - **Severity and strategy tables**: every kind has a fixed severity and
//!   recovery strategy
//! - **Recovery**: fallback, partial skip, graceful degradation and circuit
//!   breaking; retry is deliberately disabled
//! - **Circuit breakers**: per `function.operation`, closed lazily after a cooldown
//! - **Health monitoring**: DLsite selector probes with a risk score
//!
//! ## Quick Start
//!
//! ```rust
//! use suzumina_errors::{ErrorContext, ErrorHandler, HandlerSettings, ResultCategory};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let handler = ErrorHandler::new(HandlerSettings::default());
//!
//! let result = handler
//!     .handle_error(
//!         "DLsite page structure changed: selector .work_name not found",
//!         ErrorContext::new("fetchDLsiteWorks", "parse-page"),
//!     )
//!     .await;
//!
//! assert!(result.can_continue);
//! assert_eq!(result.category, ResultCategory::FallbackSuccess);
//! # }
//! ```
//!
//! ## Classification only
//!
//! ```rust
//! use suzumina_errors::{ErrorClassifier, ErrorKind, RuleClassifier, Severity, SourceError};
//!
//! let classifier = RuleClassifier::default();
//! let kind = classifier.classify(&SourceError::new("YouTube API quota exceeded"));
//!
//! assert_eq!(kind, ErrorKind::YoutubeQuotaExceeded);
//! assert_eq!(kind.severity(), Severity::Critical);
//! ```

pub mod breaker;
pub mod classifier;
pub mod context;
pub mod error;
pub mod handler;
pub mod health;
pub mod kind;
pub mod logging;
pub mod recovery;
pub mod settings;

pub use breaker::{
    BreakerEntry, BreakerStatus, CircuitBreakerConfig, CircuitBreakerRegistry, Clock, ManualClock,
    SystemClock,
};
pub use classifier::{
    ClassificationRule, ErrorClassifier, ErrorCode, ErrorSignals, RuleClassifier, SourceError,
    DEFAULT_RULES,
};
pub use context::{ClassifiedError, Environment, ErrorContext, ErrorInput};
pub use error::{SuzuminaError, SuzuminaResult};
pub use handler::{ErrorHandler, ErrorStatistics};
pub use health::{
    analyze, HealthMonitor, HealthMonitorConfig, HealthReport, HttpFetcher, PageFetcher,
    RiskLevel, SelectorProbe,
};
pub use kind::{select_strategy, ErrorKind, RecoveryStrategy, Severity};
pub use recovery::{DefaultRecovery, HandlingResult, RecoveryExecutor, ResultCategory};
pub use settings::HandlerSettings;
