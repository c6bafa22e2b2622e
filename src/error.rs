//! Core SuzuminaError type and constructor methods.
//!
//! The handler itself never fails; this type covers the crate's own fallible
//! edges: reading configuration, installing the log subscriber, and fetching or
//! parsing pages for the health monitor.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for fallible operations in this crate.
pub type SuzuminaResult<T> = Result<T, SuzuminaError>;

/// Errors raised by the crate's own configuration, logging and monitoring code.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SuzuminaError {
    #[error("Configuration error: {key}: {message}")]
    Configuration { key: String, message: String },

    #[error("HTTP error for {url}: {message}")]
    Http {
        url: String,
        status: Option<u16>,
        message: String,
    },

    #[error("Invalid selector '{selector}': {message}")]
    Selector { selector: String, message: String },

    #[error("Initialization error: {message}")]
    Initialization { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl SuzuminaError {
    // === Constructors ===

    /// Create a configuration error for a specific setting.
    pub fn configuration<K: Into<String>, M: Into<String>>(key: K, message: M) -> Self {
        Self::Configuration {
            key: key.into(),
            message: message.into(),
        }
    }

    /// Create an HTTP error, optionally carrying the response status.
    pub fn http<U: Into<String>, M: Into<String>>(url: U, status: Option<u16>, message: M) -> Self {
        Self::Http {
            url: url.into(),
            status,
            message: message.into(),
        }
    }

    /// Create a CSS selector parsing error.
    pub fn selector<S: Into<String>, M: Into<String>>(selector: S, message: M) -> Self {
        Self::Selector {
            selector: selector.into(),
            message: message.into(),
        }
    }

    /// Create an initialization error.
    pub fn initialization<S: Into<String>>(message: S) -> Self {
        Self::Initialization {
            message: message.into(),
        }
    }

    /// Create an internal error.
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Short name used when this error is handed to the classifier.
    ///
    /// Configuration and selector names match their classification rules on
    /// purpose. `HttpError` matches none, so the message decides.
    pub fn name(&self) -> &'static str {
        match self {
            SuzuminaError::Configuration { .. } => "ConfigurationError",
            SuzuminaError::Http { .. } => "HttpError",
            SuzuminaError::Selector { .. } => "ScrapingError",
            SuzuminaError::Initialization { .. } => "InitializationError",
            SuzuminaError::Internal { .. } => "InternalError",
        }
    }
}

impl From<serde_json::Error> for SuzuminaError {
    fn from(err: serde_json::Error) -> Self {
        Self::Internal {
            message: format!("JSON serialization error: {err}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_should_format_correctly() {
        // Given: errors built through the constructors
        let config = SuzuminaError::configuration("SUZUMINA_AUTO_RECOVERY", "expected a boolean");
        let selector = SuzuminaError::selector("div[", "unexpected end of input");

        // Then: messages carry the offending key or selector
        assert_eq!(
            config.to_string(),
            "Configuration error: SUZUMINA_AUTO_RECOVERY: expected a boolean"
        );
        assert_eq!(
            selector.to_string(),
            "Invalid selector 'div[': unexpected end of input"
        );
    }

    #[test]
    fn test_error_serialization_should_preserve_data() {
        let error = SuzuminaError::http("https://www.dlsite.com/maniax/", Some(503), "bad gateway");
        let json = serde_json::to_string(&error).unwrap();
        let back: SuzuminaError = serde_json::from_str(&json).unwrap();

        assert_eq!(error, back);
    }

    #[test]
    fn test_json_error_should_become_internal() {
        let err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let error: SuzuminaError = err.into();

        assert!(matches!(error, SuzuminaError::Internal { .. }));
        assert_eq!(error.name(), "InternalError");
    }
}
