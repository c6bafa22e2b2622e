//! Keyword-cascade error classification.
//!
//! Classification runs an ordered list of rules against the lower-cased error
//! message and name plus the optional error code. The first rule that matches
//! decides the kind, so more specific rules sit above the general ones of the
//! same family (quota before generic YouTube, structure before generic
//! scraping, batch before generic Firestore, timeout before network).

use crate::error::SuzuminaError;
use crate::kind::ErrorKind;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Code attached to a source error: an HTTP-style status or a symbolic code
/// such as `ETIMEDOUT`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ErrorCode {
    Status(i64),
    Text(String),
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCode::Status(status) => write!(f, "{status}"),
            ErrorCode::Text(text) => f.write_str(text),
        }
    }
}

/// A failure as reported by the code that hit it, before classification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceError {
    pub name: String,
    pub message: String,
    pub code: Option<ErrorCode>,
}

impl SourceError {
    /// Create a source error with the generic name `Error`.
    pub fn new<S: Into<String>>(message: S) -> Self {
        Self {
            name: "Error".to_string(),
            message: message.into(),
            code: None,
        }
    }

    pub fn with_name<S: Into<String>>(mut self, name: S) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_status(mut self, status: i64) -> Self {
        self.code = Some(ErrorCode::Status(status));
        self
    }

    pub fn with_code<S: Into<String>>(mut self, code: S) -> Self {
        self.code = Some(ErrorCode::Text(code.into()));
        self
    }

    /// Capture any standard error, joining its source chain into the message.
    pub fn from_error(err: &(dyn std::error::Error + 'static)) -> Self {
        let mut message = err.to_string();
        let mut source = err.source();
        while let Some(inner) = source {
            message.push_str(": ");
            message.push_str(&inner.to_string());
            source = inner.source();
        }
        Self::new(message)
    }
}

impl From<&str> for SourceError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

impl From<String> for SourceError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

impl From<SuzuminaError> for SourceError {
    fn from(err: SuzuminaError) -> Self {
        let source = Self::new(err.to_string()).with_name(err.name());
        match err {
            SuzuminaError::Http {
                status: Some(status),
                ..
            } => source.with_status(i64::from(status)),
            _ => source,
        }
    }
}

impl From<reqwest::Error> for SourceError {
    fn from(err: reqwest::Error) -> Self {
        let mut source = Self::from_error(&err);
        if err.is_timeout() {
            source = source.with_name("TimeoutError").with_code("ETIMEDOUT");
        } else if err.is_connect() {
            source = source.with_name("NetworkError").with_code("ECONNREFUSED");
        }
        if let Some(status) = err.status() {
            source = source.with_status(i64::from(status.as_u16()));
        }
        source
    }
}

/// Lower-cased view of a source error, computed once per classification.
#[derive(Debug, Clone)]
pub struct ErrorSignals {
    message: String,
    name: String,
    code: Option<ErrorCode>,
}

impl ErrorSignals {
    pub fn new(error: &SourceError) -> Self {
        Self {
            message: error.message.to_lowercase(),
            name: error.name.to_lowercase(),
            code: error.code.clone(),
        }
    }

    /// True if the message contains any of the (lower-case) keywords.
    pub fn message_has(&self, keywords: &[&str]) -> bool {
        keywords.iter().any(|keyword| self.message.contains(keyword))
    }

    /// True if the message or the name contains any of the keywords.
    pub fn mentions(&self, keywords: &[&str]) -> bool {
        keywords
            .iter()
            .any(|keyword| self.message.contains(keyword) || self.name.contains(keyword))
    }

    pub fn name_is(&self, name: &str) -> bool {
        self.name == name.to_lowercase()
    }

    pub fn status_is(&self, status: i64) -> bool {
        matches!(self.code, Some(ErrorCode::Status(code)) if code == status)
    }

    /// True if a symbolic code matches any of `codes` (case-insensitive).
    pub fn code_is_any(&self, codes: &[&str]) -> bool {
        match &self.code {
            Some(ErrorCode::Text(code)) => codes.iter().any(|c| code.eq_ignore_ascii_case(c)),
            _ => false,
        }
    }
}

/// One `(predicate, kind)` pair in the classification cascade.
#[derive(Clone, Copy)]
pub struct ClassificationRule {
    pub name: &'static str,
    pub kind: ErrorKind,
    pub predicate: fn(&ErrorSignals) -> bool,
}

impl ClassificationRule {
    pub const fn new(
        name: &'static str,
        kind: ErrorKind,
        predicate: fn(&ErrorSignals) -> bool,
    ) -> Self {
        Self {
            name,
            kind,
            predicate,
        }
    }

    pub fn matches(&self, signals: &ErrorSignals) -> bool {
        (self.predicate)(signals)
    }
}

impl fmt::Debug for ClassificationRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassificationRule")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .finish()
    }
}

/// Seam for plugging a different classification scheme into the handler.
pub trait ErrorClassifier: fmt::Debug + Send + Sync {
    /// Map a source error onto a kind.
    fn classify(&self, error: &SourceError) -> ErrorKind;
}

const YOUTUBE: &[&str] = &["youtube", "googleapis"];
const SCRAPING: &[&str] = &["dlsite", "scraping", "scrape"];
const FIRESTORE: &[&str] = &["firestore", "firebase"];

fn youtube_quota(s: &ErrorSignals) -> bool {
    s.message_has(&["quota"]) || (s.mentions(YOUTUBE) && s.status_is(403))
}

fn youtube(s: &ErrorSignals) -> bool {
    s.mentions(YOUTUBE)
}

fn dlsite_structure(s: &ErrorSignals) -> bool {
    s.mentions(SCRAPING) && s.message_has(&["structure", "selector"])
}

fn dlsite(s: &ErrorSignals) -> bool {
    s.mentions(SCRAPING)
}

fn firestore_batch(s: &ErrorSignals) -> bool {
    s.mentions(FIRESTORE) && s.message_has(&["batch"])
}

fn firestore(s: &ErrorSignals) -> bool {
    s.mentions(FIRESTORE)
}

fn parsing(s: &ErrorSignals) -> bool {
    s.name_is("SyntaxError") || s.message_has(&["parse", "parsing", "json", "syntax"])
}

fn validation(s: &ErrorSignals) -> bool {
    s.mentions(&["validation", "invalid"])
}

fn data_quality(s: &ErrorSignals) -> bool {
    s.message_has(&["data quality", "data_quality"])
}

fn metadata(s: &ErrorSignals) -> bool {
    s.message_has(&["metadata"])
}

fn timeout(s: &ErrorSignals) -> bool {
    s.name_is("TimeoutError")
        || s.code_is_any(&["ETIMEDOUT", "ESOCKETTIMEDOUT"])
        || s.message_has(&["timeout", "timed out"])
}

fn network(s: &ErrorSignals) -> bool {
    s.code_is_any(&["ECONNREFUSED", "ECONNRESET", "ENOTFOUND", "EAI_AGAIN"])
        || s.mentions(&["network"])
        || s.message_has(&["econnrefused", "econnreset", "enotfound", "fetch failed", "socket"])
}

fn configuration(s: &ErrorSignals) -> bool {
    s.mentions(&["config"]) || s.message_has(&["environment variable"])
}

/// Default rule list, highest precedence first.
pub const DEFAULT_RULES: [ClassificationRule; 13] = [
    ClassificationRule::new("youtube-quota", ErrorKind::YoutubeQuotaExceeded, youtube_quota),
    ClassificationRule::new("youtube-api", ErrorKind::YoutubeApi, youtube),
    ClassificationRule::new("dlsite-structure", ErrorKind::DlsiteStructureChanged, dlsite_structure),
    ClassificationRule::new("dlsite-scraping", ErrorKind::DlsiteScraping, dlsite),
    ClassificationRule::new("firestore-batch", ErrorKind::FirestoreBatch, firestore_batch),
    ClassificationRule::new("firestore", ErrorKind::Firestore, firestore),
    ClassificationRule::new("parsing", ErrorKind::Parsing, parsing),
    ClassificationRule::new("validation", ErrorKind::Validation, validation),
    ClassificationRule::new("data-quality", ErrorKind::DataQuality, data_quality),
    ClassificationRule::new("metadata", ErrorKind::Metadata, metadata),
    ClassificationRule::new("timeout", ErrorKind::Timeout, timeout),
    ClassificationRule::new("network", ErrorKind::Network, network),
    ClassificationRule::new("configuration", ErrorKind::Configuration, configuration),
];

/// Classifier that walks an ordered rule list; first match wins.
#[derive(Debug, Clone)]
pub struct RuleClassifier {
    rules: Vec<ClassificationRule>,
}

impl Default for RuleClassifier {
    fn default() -> Self {
        Self::with_rules(DEFAULT_RULES.to_vec())
    }
}

impl RuleClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rules(rules: Vec<ClassificationRule>) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &[ClassificationRule] {
        &self.rules
    }

    /// The first rule matching `error`, if any.
    pub fn matching_rule(&self, error: &SourceError) -> Option<&ClassificationRule> {
        let signals = ErrorSignals::new(error);
        self.rules.iter().find(|rule| rule.matches(&signals))
    }
}

impl ErrorClassifier for RuleClassifier {
    fn classify(&self, error: &SourceError) -> ErrorKind {
        self.matching_rule(error)
            .map(|rule| rule.kind)
            .unwrap_or(ErrorKind::Unknown)
    }
}
