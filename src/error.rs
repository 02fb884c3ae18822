//! Error handling for edunify.
//!
//! Per-record problems during unification are not errors: they are collected
//! as [`crate::model::RejectedRecord`] values and reported with the batch.
//! [`EdError`] covers the failures that abort an operation: malformed search
//! requests and invalid configuration.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for edunify operations.
#[derive(Error, Debug)]
pub enum EdError {
    /// A search request named an unknown filter field or supplied a
    /// constraint of the wrong shape. Always attributable to one filter.
    #[error("Invalid filter '{filter}': {reason}")]
    Validation { filter: String, reason: String },

    /// Invalid weights, priorities, or tolerances. Raised at startup before
    /// any scoring happens.
    #[error("Config error: {0}")]
    Config(String),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl EdError {
    pub fn validation(filter: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            filter: filter.into(),
            reason: reason.into(),
        }
    }

    /// Get the error code for this error.
    #[must_use]
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Validation { .. } => ErrorCode::InvalidFilter,
            Self::Config(_) => ErrorCode::ConfigInvalid,
            Self::Json(_) => ErrorCode::SerializationError,
        }
    }
}

/// Standardized error codes for machine parsing by the serving layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    InvalidFilter,
    ConfigInvalid,
    SerializationError,
}

/// Result type alias using EdError.
pub type Result<T> = std::result::Result<T, EdError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_names_offending_filter() {
        let err = EdError::validation("min_gpa", "expected a number");
        assert_eq!(
            err.to_string(),
            "Invalid filter 'min_gpa': expected a number"
        );
        assert_eq!(err.code(), ErrorCode::InvalidFilter);
    }

    #[test]
    fn test_error_code_serialization() {
        let json = serde_json::to_string(&ErrorCode::InvalidFilter).unwrap();
        assert_eq!(json, "\"INVALID_FILTER\"");
    }

    #[test]
    fn test_config_error_code() {
        assert_eq!(
            EdError::Config("bad weights".into()).code(),
            ErrorCode::ConfigInvalid
        );
    }
}
