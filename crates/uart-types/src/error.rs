//! Error types for telemetry parsing in uart-types.

use thiserror::Error;

/// Errors that can occur when parsing a telemetry record.
///
/// This error type is platform-agnostic and does not include
/// BLE-specific errors (those belong in uart-core).
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ParseError {
    /// The record did not contain the expected number of fields.
    #[error("expected {expected} fields, got {actual}")]
    FieldCount {
        /// Number of numeric fields a telemetry record carries.
        expected: usize,
        /// Number of fields found in the record.
        actual: usize,
    },

    /// A field could not be parsed as a number.
    #[error("field {index} is not a number: {value:?}")]
    InvalidField {
        /// Zero-based position of the field in the record.
        index: usize,
        /// The offending text.
        value: String,
    },

    /// The microcontroller token is not one of the known identifiers.
    #[error("unknown microcontroller: {0}")]
    UnknownMicrocontroller(String),
}

/// Result type alias using uart-types' ParseError type.
pub type ParseResult<T> = std::result::Result<T, ParseError>;
