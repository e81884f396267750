//! Domain error types
//!
//! These errors are framework-agnostic. Row, geocoding and validation errors
//! are recoverable; only `BuildError` stops a catalog from being published.

use std::time::Duration;
use thiserror::Error;

/// A source row that could not be turned into a `ListingRecord`.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("line {line}: malformed row: {message}")]
    Malformed { line: u64, message: String },

    #[error("line {line}: column '{column}' is not valid UTF-8")]
    Encoding { line: u64, column: String },

    #[error("line {line}: missing listing id")]
    MissingId { line: u64 },
}

/// Errors reported by an external geocoding source.
#[derive(Debug, Error)]
pub enum LookupError {
    #[error("address not found")]
    NotFound,

    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("geocoder returned HTTP {status}")]
    Status { status: reqwest::StatusCode },

    #[error("invalid geocoder response: {0}")]
    InvalidResponse(String),

    #[error("retry limit exceeded after {attempts} attempts")]
    RetriesExhausted { attempts: u32 },
}

impl LookupError {
    /// Transient errors worth another attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            LookupError::Request(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            LookupError::Timeout(_) => true,
            LookupError::Status { status } => {
                status.is_server_error() || *status == reqwest::StatusCode::TOO_MANY_REQUESTS
            }
            _ => false,
        }
    }
}

/// Why an address ended up unresolved.
#[derive(Debug, Error)]
pub enum GeocodeFailure {
    #[error("no match for address")]
    NotFound,

    #[error("match confidence {confidence:.3} below threshold {threshold:.3}")]
    LowConfidence { confidence: f64, threshold: f64 },

    #[error(transparent)]
    Lookup(LookupError),
}

impl From<LookupError> for GeocodeFailure {
    fn from(e: LookupError) -> Self {
        match e {
            LookupError::NotFound => GeocodeFailure::NotFound,
            other => GeocodeFailure::Lookup(other),
        }
    }
}

/// A query request parameter failed validation.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("invalid '{field}': {message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Errors surfaced by the query boundary.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("listing '{0}' not found")]
    NotFound(String),
}

/// Fatal to a catalog build; no partial catalog is published.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("cannot read listing source {path}: {source}")]
    SourceUnreadable {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot read listing source header: {0}")]
    Header(#[from] csv::Error),

    #[error("listing source has no '{0}' column")]
    MissingColumn(String),

    #[error("listing source contains no valid rows")]
    NoValidRows,

    #[error("failed to set up geocoder: {0}")]
    Geocoder(String),
}

/// Durable catalog cache failures. Never fatal: the pipeline rebuilds or
/// serves the in-memory catalog instead.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("catalog cache I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("catalog cache is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Top-level error for the binary.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error(transparent)]
    Build(#[from] BuildError),

    #[error(transparent)]
    Query(#[from] QueryError),

    #[error("server error: {0}")]
    Server(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_errors_retryable() {
        let server = LookupError::Status {
            status: reqwest::StatusCode::BAD_GATEWAY,
        };
        let throttled = LookupError::Status {
            status: reqwest::StatusCode::TOO_MANY_REQUESTS,
        };
        let forbidden = LookupError::Status {
            status: reqwest::StatusCode::FORBIDDEN,
        };
        assert!(server.is_retryable());
        assert!(throttled.is_retryable());
        assert!(!forbidden.is_retryable());
        assert!(!LookupError::NotFound.is_retryable());
        assert!(LookupError::Timeout(Duration::from_secs(1)).is_retryable());
    }

    #[test]
    fn test_validation_error_names_field() {
        let err = ValidationError::new("near.radius_km", "must be positive");
        assert_eq!(err.to_string(), "invalid 'near.radius_km': must be positive");
    }
}
