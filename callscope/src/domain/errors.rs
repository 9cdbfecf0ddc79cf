//! Structured error types for callscope
//!
//! Using thiserror for automatic Display implementation and error chaining.
//! A missing instrumentation backend is not an error here: the session
//! reports it as a skipped test instead.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum InstrumentationError {
    #[error("Call-graph instrumentation is not installed in this process")]
    NotInstalled,

    #[error("Profiling is already enabled; sessions cannot be nested")]
    AlreadyEnabled,

    #[error("Profiling is not enabled on this thread")]
    NotEnabled,

    #[error("Failed to install the call-graph subscriber: {0}")]
    Subscriber(String),
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum StorageError {
    #[error("Invalid directory name {0:?}")]
    InvalidName(String),

    #[error("Directory {0} already exists")]
    AlreadyExists(String),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid value in {variable}: {source}")]
    InvalidFlags {
        variable: &'static str,
        #[source]
        source: callscope_common::ParseFlagsError,
    },

    #[error("{0} is not valid unicode")]
    InvalidVariable(&'static str),
}

#[derive(Error, Debug)]
pub enum ProfileError {
    #[error("Invalid match expression {expression:?}: {source}")]
    InvalidMatchExpression {
        expression: String,
        #[source]
        source: regex::Error,
    },

    #[error(transparent)]
    Instrumentation(#[from] InstrumentationError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_match_expression_display() {
        let source = regex::Regex::new("(unclosed").unwrap_err();
        let err = ProfileError::InvalidMatchExpression {
            expression: "(unclosed".to_string(),
            source,
        };
        assert!(err.to_string().contains("\"(unclosed\""));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_instrumentation_error_is_transparent() {
        let err = ProfileError::from(InstrumentationError::AlreadyEnabled);
        assert_eq!(
            err.to_string(),
            "Profiling is already enabled; sessions cannot be nested"
        );
    }
}
