use thiserror::Error;

use crate::records::SourceKind;

/// Application-wide error types for sealane.
#[derive(Error, Debug)]
pub enum AppError {
    /// HTTP request failed (non-2xx response while fetching a page).
    #[error("fetch error: {0}")]
    Fetch(String),

    /// Request timed out.
    #[error("request timed out after {0} seconds")]
    Timeout(u64),

    /// Network/connection error.
    #[error("network error: {0}")]
    Network(String),

    /// Page structure does not match any expected pattern.
    #[error("malformed {kind} page: {fragment}")]
    MalformedPage { kind: SourceKind, fragment: String },

    /// A record references a route we have never resolved.
    #[error("unknown route: {0}")]
    UnknownRoute(String),

    /// A record references some other entity we cannot find.
    #[error("unknown entity: {0}")]
    UnknownEntity(String),

    /// An optional field could not be extracted; the field stays unset.
    #[error("field extraction failed: {0}")]
    FieldExtraction(String),

    /// Entity or event storage failed.
    #[error("store error: {0}")]
    Store(String),

    /// JSON serialization/deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl AppError {
    /// Returns true if this error only invalidates a single record.
    ///
    /// The pipeline skips the affected record with a warning and keeps
    /// processing the rest of the batch. Everything else fails the run.
    pub fn is_record_skip(&self) -> bool {
        matches!(
            self,
            AppError::UnknownRoute(_) | AppError::UnknownEntity(_) | AppError::FieldExtraction(_)
        )
    }

    /// Returns true if this error occurred before any entity was touched.
    pub fn is_fetch_failure(&self) -> bool {
        matches!(
            self,
            AppError::Fetch(_) | AppError::Timeout(_) | AppError::Network(_)
        )
    }

    pub fn malformed(kind: SourceKind, fragment: impl Into<String>) -> Self {
        AppError::MalformedPage {
            kind,
            fragment: fragment.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_skip_classification() {
        assert!(AppError::UnknownRoute("Tsawwassen to Duke Point".into()).is_record_skip());
        assert!(AppError::UnknownEntity("ferry Queen of Oak Bay".into()).is_record_skip());
        assert!(AppError::FieldExtraction("deck space".into()).is_record_skip());
        assert!(!AppError::Fetch("HTTP 500".into()).is_record_skip());
        assert!(!AppError::malformed(SourceKind::Departures, "<td>").is_record_skip());
    }

    #[test]
    fn test_fetch_failure_classification() {
        assert!(AppError::Fetch("HTTP 500".into()).is_fetch_failure());
        assert!(AppError::Timeout(30).is_fetch_failure());
        assert!(AppError::Network("reset".into()).is_fetch_failure());
        assert!(!AppError::Store("locked".into()).is_fetch_failure());
    }

    #[test]
    fn test_malformed_display_names_page_kind() {
        let err = AppError::malformed(SourceKind::Conditions, "missing route link");
        assert!(err.to_string().contains("conditions"));
        assert!(err.to_string().contains("missing route link"));
    }
}
