//! Typed error handling for table-query
//!
//! # Error Categories
//!
//! - [`ValidationError`]: malformed filter input detected locally (bad
//!   pagination, inverted date range, invalid field path). The codec recovers
//!   from these by keeping the previous query options.
//! - [`NetworkError`]: the remote source rejected or failed a fetch. The list
//!   controller surfaces these as an `Error` state and a notification.
//! - [`ConfigError`]: list profile loading and validation failures.
//!
//! # Example
//!
//! ```rust,ignore
//! use table_query::prelude::*;
//!
//! match Pagination::new(0, 25) {
//!     Ok(p) => println!("page {}", p.page),
//!     Err(ValidationError::InvalidPagination { page, .. }) => {
//!         println!("page {} is out of range", page);
//!     }
//!     Err(e) => eprintln!("other: {}", e),
//! }
//! ```

use serde::Serialize;
use std::fmt;

/// The main error type for table-query
#[derive(Debug)]
pub enum TableQueryError {
    /// Local validation errors
    Validation(ValidationError),

    /// Remote fetch errors
    Network(NetworkError),

    /// Configuration errors
    Config(ConfigError),

    /// Internal errors (should not happen in normal operation)
    Internal(String),
}

impl fmt::Display for TableQueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TableQueryError::Validation(e) => write!(f, "{}", e),
            TableQueryError::Network(e) => write!(f, "{}", e),
            TableQueryError::Config(e) => write!(f, "{}", e),
            TableQueryError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for TableQueryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TableQueryError::Validation(e) => Some(e),
            TableQueryError::Network(e) => Some(e),
            TableQueryError::Config(e) => Some(e),
            TableQueryError::Internal(_) => None,
        }
    }
}

/// Serializable error payload, e.g. for a notification toast
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error code for programmatic handling
    pub code: String,
    /// Human-readable error message
    pub message: String,
    /// Optional additional details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl TableQueryError {
    /// Get the error code for this error
    pub fn error_code(&self) -> &'static str {
        match self {
            TableQueryError::Validation(e) => e.error_code(),
            TableQueryError::Network(_) => "NETWORK_ERROR",
            TableQueryError::Config(_) => "CONFIG_ERROR",
            TableQueryError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Whether the error is recovered locally (no state change, no notification)
    pub fn is_recoverable_locally(&self) -> bool {
        matches!(self, TableQueryError::Validation(_))
    }

    /// Convert to an error response
    pub fn to_response(&self) -> ErrorResponse {
        ErrorResponse {
            code: self.error_code().to_string(),
            message: self.to_string(),
            details: self.details(),
        }
    }

    fn details(&self) -> Option<serde_json::Value> {
        match self {
            TableQueryError::Validation(ValidationError::InvalidPagination { page, per_page }) => {
                Some(serde_json::json!({ "page": page, "perPage": per_page }))
            }
            TableQueryError::Validation(ValidationError::InvalidDateRange { start, end }) => {
                Some(serde_json::json!({ "start": start, "end": end }))
            }
            TableQueryError::Validation(ValidationError::InvalidFieldPath { field }) => {
                Some(serde_json::json!({ "field": field }))
            }
            TableQueryError::Config(ConfigError::UnknownList { name }) => {
                Some(serde_json::json!({ "list": name }))
            }
            _ => None,
        }
    }
}

// =============================================================================
// Validation Errors
// =============================================================================

/// Malformed filter input detected before anything reaches the remote source
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// Page must be >= 1 and per-page > 0
    #[error("Invalid pagination: page {page}, perPage {per_page}")]
    InvalidPagination { page: u64, per_page: u64 },

    /// Start bound is after the end bound
    #[error("Invalid date range: {start} is after {end}")]
    InvalidDateRange { start: String, end: String },

    /// Field is not a dotted relation path
    #[error("Invalid field path '{field}'")]
    InvalidFieldPath { field: String },

    /// A search bucket needs at least one field
    #[error("Search requires at least one field")]
    EmptySearchFields,

    /// The value cannot be expressed as a predicate leaf
    #[error("Unsupported filter value for '{field}': {message}")]
    UnsupportedFilterValue { field: String, message: String },
}

impl ValidationError {
    pub fn error_code(&self) -> &'static str {
        match self {
            ValidationError::InvalidPagination { .. } => "INVALID_PAGINATION",
            ValidationError::InvalidDateRange { .. } => "INVALID_DATE_RANGE",
            ValidationError::InvalidFieldPath { .. } => "INVALID_FIELD_PATH",
            ValidationError::EmptySearchFields => "EMPTY_SEARCH_FIELDS",
            ValidationError::UnsupportedFilterValue { .. } => "UNSUPPORTED_FILTER_VALUE",
        }
    }
}

impl From<ValidationError> for TableQueryError {
    fn from(err: ValidationError) -> Self {
        TableQueryError::Validation(err)
    }
}

// =============================================================================
// Network Errors
// =============================================================================

/// A fetch against the remote source failed
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NetworkError {
    /// The remote source returned an error
    #[error("Fetch failed: {message}")]
    RequestFailed { message: String },
}

impl NetworkError {
    /// Build from any collaborator error, keeping the full context chain
    pub fn from_source(err: &anyhow::Error) -> Self {
        NetworkError::RequestFailed {
            message: format!("{:#}", err),
        }
    }

    pub fn message(&self) -> &str {
        match self {
            NetworkError::RequestFailed { message } => message,
        }
    }
}

impl From<NetworkError> for TableQueryError {
    fn from(err: NetworkError) -> Self {
        TableQueryError::Network(err)
    }
}

// =============================================================================
// Config Errors
// =============================================================================

/// Errors raised while loading list profiles
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The config file could not be read
    #[error("Failed to read config '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The YAML could not be parsed
    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// A list profile failed validation
    #[error("Invalid list config '{list}': {message}")]
    Invalid { list: String, message: String },

    /// No list profile with that name
    #[error("Unknown list '{name}'")]
    UnknownList { name: String },
}

impl From<ConfigError> for TableQueryError {
    fn from(err: ConfigError) -> Self {
        TableQueryError::Config(err)
    }
}

/// Result type alias for table-query operations
pub type TableQueryResult<T> = Result<T, TableQueryError>;
