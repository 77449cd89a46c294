//! Error types for Ruzma operations.
//!
//! All fallible operations in the workspace return [`Result`], which wraps
//! [`RuzmaError`]. I/O errors from underlying readers and writers convert
//! automatically; everything else is constructed through the helper methods.

use std::io;
use thiserror::Error;

/// The error type for Ruzma operations.
#[derive(Debug, Error)]
pub enum RuzmaError {
    /// I/O error from the underlying reader or writer.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// An encoder tunable was outside its accepted range.
    #[error("Invalid parameter {name}: {message}")]
    InvalidParameter {
        /// Name of the offending tunable.
        name: String,
        /// What was wrong with it.
        message: String,
    },

    /// The stream header could not be parsed.
    #[error("Invalid header: {message}")]
    InvalidHeader {
        /// Description of what was invalid.
        message: String,
    },

    /// The compressed payload is inconsistent with the format.
    #[error("Corrupted data at offset {offset}: {message}")]
    CorruptedData {
        /// Byte offset in the decoded output where the problem was detected.
        offset: u64,
        /// Description of the inconsistency.
        message: String,
    },
}

impl RuzmaError {
    /// Create an `InvalidParameter` error.
    pub fn invalid_parameter(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Create an `InvalidHeader` error.
    pub fn invalid_header(message: impl Into<String>) -> Self {
        Self::InvalidHeader {
            message: message.into(),
        }
    }

    /// Create a `CorruptedData` error.
    pub fn corrupted_data(offset: u64, message: impl Into<String>) -> Self {
        Self::CorruptedData {
            offset,
            message: message.into(),
        }
    }
}

/// A specialized Result type for Ruzma operations.
pub type Result<T> = std::result::Result<T, RuzmaError>;
