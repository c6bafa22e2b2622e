//! Error kinds, severities and recovery strategies.
//!
//! This module holds the closed set of error kinds the classifier can produce,
//! together with the static tables that map each kind to a severity and a
//! recovery strategy.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Closed set of error categories produced by classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// YouTube Data API failure.
    #[serde(rename = "YOUTUBE_API_ERROR")]
    YoutubeApi,
    /// YouTube Data API quota exhausted.
    #[serde(rename = "YOUTUBE_QUOTA_EXCEEDED")]
    YoutubeQuotaExceeded,
    /// DLsite scraping failure.
    #[serde(rename = "DLSITE_SCRAPING_ERROR")]
    DlsiteScraping,
    /// DLsite page structure no longer matches the expected selectors.
    #[serde(rename = "DLSITE_STRUCTURE_CHANGED")]
    DlsiteStructureChanged,
    /// Firestore read or write failure.
    #[serde(rename = "FIRESTORE_ERROR")]
    Firestore,
    /// Firestore batched write failure.
    #[serde(rename = "FIRESTORE_BATCH_ERROR")]
    FirestoreBatch,
    /// Payload could not be parsed (JSON, HTML, dates).
    #[serde(rename = "PARSING_ERROR")]
    Parsing,
    /// Input rejected by a validation check.
    #[serde(rename = "VALIDATION_ERROR")]
    Validation,
    /// Data passed validation but failed a quality check.
    #[serde(rename = "DATA_QUALITY_ERROR")]
    DataQuality,
    /// Source metadata missing or incomplete.
    #[serde(rename = "METADATA_ERROR")]
    Metadata,
    /// Connection-level failure.
    #[serde(rename = "NETWORK_ERROR")]
    Network,
    /// Request or operation timed out.
    #[serde(rename = "TIMEOUT_ERROR")]
    Timeout,
    /// Missing or invalid configuration.
    #[serde(rename = "CONFIGURATION_ERROR")]
    Configuration,
    /// Nothing in the rule list matched.
    #[serde(rename = "UNKNOWN_ERROR")]
    Unknown,
}

/// How urgently an error needs attention. Drives the log level only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    /// Logged at info; the job carries on.
    Low,
    /// Logged at warn.
    Medium,
    /// Logged at error.
    High,
    /// Logged at error; usually needs someone to act.
    Critical,
}

/// The recovery action class selected for a kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecoveryStrategy {
    /// No automatic recovery; only recommendations are returned.
    None,
    /// Re-run the operation. Disabled in the default executor.
    Retry,
    /// Switch to an alternative code path.
    Fallback,
    /// Skip the failing item and continue with the rest.
    PartialSkip,
    /// Continue with reduced data.
    GracefulDegradation,
    /// Open the operation's circuit breaker.
    CircuitBreaker,
}

impl ErrorKind {
    /// Every kind, in declaration order.
    pub const ALL: [ErrorKind; 14] = [
        ErrorKind::YoutubeApi,
        ErrorKind::YoutubeQuotaExceeded,
        ErrorKind::DlsiteScraping,
        ErrorKind::DlsiteStructureChanged,
        ErrorKind::Firestore,
        ErrorKind::FirestoreBatch,
        ErrorKind::Parsing,
        ErrorKind::Validation,
        ErrorKind::DataQuality,
        ErrorKind::Metadata,
        ErrorKind::Network,
        ErrorKind::Timeout,
        ErrorKind::Configuration,
        ErrorKind::Unknown,
    ];

    /// Stable wire name, also used in counter keys.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::YoutubeApi => "YOUTUBE_API_ERROR",
            ErrorKind::YoutubeQuotaExceeded => "YOUTUBE_QUOTA_EXCEEDED",
            ErrorKind::DlsiteScraping => "DLSITE_SCRAPING_ERROR",
            ErrorKind::DlsiteStructureChanged => "DLSITE_STRUCTURE_CHANGED",
            ErrorKind::Firestore => "FIRESTORE_ERROR",
            ErrorKind::FirestoreBatch => "FIRESTORE_BATCH_ERROR",
            ErrorKind::Parsing => "PARSING_ERROR",
            ErrorKind::Validation => "VALIDATION_ERROR",
            ErrorKind::DataQuality => "DATA_QUALITY_ERROR",
            ErrorKind::Metadata => "METADATA_ERROR",
            ErrorKind::Network => "NETWORK_ERROR",
            ErrorKind::Timeout => "TIMEOUT_ERROR",
            ErrorKind::Configuration => "CONFIGURATION_ERROR",
            ErrorKind::Unknown => "UNKNOWN_ERROR",
        }
    }

    /// Severity for this kind. Kinds without a table entry are `Medium`.
    pub fn severity(&self) -> Severity {
        severity_entry(*self).unwrap_or(Severity::Medium)
    }

    /// Recovery strategy for this kind at its own severity.
    pub fn strategy(&self) -> RecoveryStrategy {
        select_strategy(*self, self.severity())
    }

    /// Static, human-readable follow-up actions for this kind.
    pub fn recommendations(&self) -> &'static [&'static str] {
        match self {
            ErrorKind::YoutubeApi => &[
                "Check the YouTube Data API status page",
                "Verify the API key and the request parameters",
            ],
            ErrorKind::YoutubeQuotaExceeded => &[
                "Wait for the daily quota reset (midnight Pacific Time)",
                "Reduce the number of API calls per run",
                "Request a quota increase in the Google Cloud console",
            ],
            ErrorKind::DlsiteScraping => &[
                "Check that DLsite is reachable",
                "Lower the request rate in case of throttling",
            ],
            ErrorKind::DlsiteStructureChanged => &[
                "Inspect the current DLsite page markup",
                "Update the CSS selectors used by the parser",
                "Run the DLsite health monitor to confirm the change",
            ],
            ErrorKind::Firestore => &[
                "Check Firestore availability and IAM permissions",
                "Verify document paths and field types",
            ],
            ErrorKind::FirestoreBatch => &[
                "Reduce the batch size (maximum 500 writes)",
                "Check which documents in the batch were rejected",
            ],
            ErrorKind::Parsing => &[
                "Inspect the raw payload that failed to parse",
                "Update the parser for the new payload format",
            ],
            ErrorKind::Validation => &[
                "Review the rejected input against the schema",
            ],
            ErrorKind::DataQuality => &[
                "Review the data quality report for the affected items",
            ],
            ErrorKind::Metadata => &[
                "Check the source metadata for missing fields",
            ],
            ErrorKind::Network => &[
                "Check network connectivity from the function",
                "Verify DNS resolution for the target host",
            ],
            ErrorKind::Timeout => &[
                "Check the latency of the target service",
                "Increase the timeout if the operation is legitimately slow",
            ],
            ErrorKind::Configuration => &[
                "Check the required environment variables",
                "Verify the deployed configuration matches the expected values",
            ],
            ErrorKind::Unknown => &[
                "Inspect the logs for this error id",
                "Add a classification rule if this error recurs",
            ],
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "LOW",
            Severity::Medium => "MEDIUM",
            Severity::High => "HIGH",
            Severity::Critical => "CRITICAL",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl RecoveryStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecoveryStrategy::None => "NONE",
            RecoveryStrategy::Retry => "RETRY",
            RecoveryStrategy::Fallback => "FALLBACK",
            RecoveryStrategy::PartialSkip => "PARTIAL_SKIP",
            RecoveryStrategy::GracefulDegradation => "GRACEFUL_DEGRADATION",
            RecoveryStrategy::CircuitBreaker => "CIRCUIT_BREAKER",
        }
    }
}

impl fmt::Display for RecoveryStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn severity_entry(kind: ErrorKind) -> Option<Severity> {
    match kind {
        ErrorKind::YoutubeQuotaExceeded | ErrorKind::Configuration => Some(Severity::Critical),
        ErrorKind::DlsiteStructureChanged | ErrorKind::Firestore | ErrorKind::FirestoreBatch => {
            Some(Severity::High)
        }
        ErrorKind::YoutubeApi
        | ErrorKind::DlsiteScraping
        | ErrorKind::Network
        | ErrorKind::Timeout => Some(Severity::Medium),
        ErrorKind::Parsing
        | ErrorKind::Validation
        | ErrorKind::DataQuality
        | ErrorKind::Metadata => Some(Severity::Low),
        ErrorKind::Unknown => None,
    }
}

fn strategy_entry(kind: ErrorKind) -> Option<RecoveryStrategy> {
    match kind {
        ErrorKind::YoutubeQuotaExceeded => Some(RecoveryStrategy::CircuitBreaker),
        ErrorKind::YoutubeApi
        | ErrorKind::DlsiteScraping
        | ErrorKind::Firestore
        | ErrorKind::Network
        | ErrorKind::Timeout => Some(RecoveryStrategy::Retry),
        ErrorKind::DlsiteStructureChanged => Some(RecoveryStrategy::Fallback),
        ErrorKind::FirestoreBatch | ErrorKind::Parsing | ErrorKind::Validation => {
            Some(RecoveryStrategy::PartialSkip)
        }
        ErrorKind::DataQuality | ErrorKind::Metadata => {
            Some(RecoveryStrategy::GracefulDegradation)
        }
        ErrorKind::Configuration => Some(RecoveryStrategy::None),
        ErrorKind::Unknown => None,
    }
}

/// Select a recovery strategy for a kind.
///
/// The kind table wins; severity only decides for kinds the table does not
/// cover.
pub fn select_strategy(kind: ErrorKind, severity: Severity) -> RecoveryStrategy {
    strategy_entry(kind).unwrap_or(match severity {
        Severity::Critical => RecoveryStrategy::CircuitBreaker,
        Severity::High | Severity::Medium => RecoveryStrategy::None,
        Severity::Low => RecoveryStrategy::PartialSkip,
    })
}
