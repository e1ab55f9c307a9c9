//! Domain-specific error types following panic-free policy.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur in domain operations.
#[derive(Error, Debug, Clone)]
pub enum DomainError {
    /// Invalid field value
    #[error("Invalid {field}: {value} (expected {expected})")]
    InvalidFieldValue {
        field: String,
        value: String,
        expected: String,
    },

    /// Parse error for incoming data
    #[error("Failed to parse {field}: {reason}")]
    ParseError { field: String, reason: String },

    /// A screenshot reference could not be decoded into image bytes
    #[error("Screenshot is not a usable image: {reason}")]
    InvalidScreenshot { reason: String },

    /// Configuration file exists but could not be read or parsed
    #[error("Invalid configuration at {path}: {reason}")]
    Config { path: PathBuf, reason: String },
}

/// Result type for domain operations.
pub type DomainResult<T> = Result<T, DomainError>;
