//! Latest error classification and message for an engine

use log::{error, warn};
use serde::{Deserialize, Serialize};

/// Classification of an engine failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ErrorReason {
    #[default]
    NoError,
    /// Native engine or handle could not be created
    Initialization,
    /// No voices, or a locale/voice change failed
    Configuration,
    /// Content given to speak was rejected
    Input,
}

/// Holds the most recent error until overwritten or cleared
#[derive(Debug, Clone, Default)]
pub struct ErrorReporter {
    reason: ErrorReason,
    message: String,
}

impl ErrorReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an error, replacing any previous one
    pub fn record(&mut self, reason: ErrorReason, message: &str) {
        match reason {
            ErrorReason::NoError => {}
            ErrorReason::Initialization => error!("{:?} error: {}", reason, message),
            _ => warn!("{:?} error: {}", reason, message),
        }
        self.reason = reason;
        self.message = message.to_string();
    }

    pub fn clear(&mut self) {
        self.reason = ErrorReason::NoError;
        self.message.clear();
    }

    pub fn reason(&self) -> ErrorReason {
        self.reason
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn has_error(&self) -> bool {
        self.reason != ErrorReason::NoError
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_clear() {
        let reporter = ErrorReporter::new();
        assert_eq!(reporter.reason(), ErrorReason::NoError);
        assert_eq!(reporter.message(), "");
        assert!(!reporter.has_error());
    }

    #[test]
    fn test_record_overwrites() {
        let mut reporter = ErrorReporter::new();
        reporter.record(ErrorReason::Input, "bad text");
        reporter.record(ErrorReason::Configuration, "no voice");
        assert_eq!(reporter.reason(), ErrorReason::Configuration);
        assert_eq!(reporter.message(), "no voice");
    }

    #[test]
    fn test_clear() {
        let mut reporter = ErrorReporter::new();
        reporter.record(ErrorReason::Initialization, "no handle");
        reporter.clear();
        assert!(!reporter.has_error());
        assert!(reporter.message().is_empty());
    }
}
