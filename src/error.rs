//! Error types for Daylog

use chrono::NaiveDate;
use thiserror::Error;

/// Result alias used throughout the crate
pub type JournalResult<T> = Result<T, JournalError>;

/// Errors that can occur while loading, mutating or analysing a journal
#[derive(Debug, Error)]
pub enum JournalError {
    #[error("Corrupt store: {0}")]
    CorruptStore(String),

    #[error("Unknown field: {0}")]
    UnknownField(String),

    #[error("Derivation cycle through field: {0}")]
    SchemaCycle(String),

    #[error("Invalid schema declaration for {field}: {reason}")]
    InvalidSchema { field: String, reason: String },

    #[error("Configuration file not found: {0}")]
    ConfigMissing(String),

    #[error("Malformed configuration in {path}: {message}")]
    ConfigMalformed { path: String, message: String },

    #[error("Invalid date range: {0}")]
    InvalidDateRange(String),

    #[error("No record for date {0}")]
    DateNotFound(NaiveDate),

    #[error("Store is empty")]
    EmptyStore,

    #[error("Invalid value for {field}: {source}")]
    InvalidValue {
        field: String,
        #[source]
        source: FieldError,
    },

    #[error("Field {field} is {actual}, expected {expected}")]
    FieldKindMismatch {
        field: String,
        expected: &'static str,
        actual: &'static str,
    },

    #[error("Invalid window size: {0} days")]
    InvalidWindow(u32),

    #[error("Percentile out of range [0, 100]: {0}")]
    InvalidPercentile(f64),

    #[error("Invalid scale: maximum {max} must exceed minimum {min}")]
    InvalidScale { min: f64, max: f64 },

    #[error("Empty period cannot be resampled")]
    EmptyPeriod,

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Value input failed: {0}")]
    Input(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Failure to parse or validate a single field value
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FieldError {
    #[error("expected a number, got {0:?}")]
    NotANumber(String),

    #[error("expected y/n, got {0:?}")]
    NotABoolean(String),

    #[error("{value} outside [{min}, {max}]")]
    OutOfRange { value: f64, min: f64, max: f64 },

    #[error("expected {expected} value, got {actual}")]
    WrongType {
        expected: &'static str,
        actual: &'static str,
    },
}
