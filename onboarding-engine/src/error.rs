// Engine error taxonomy
//
// Catalog problems are SOFT: a broken descriptor degrades (field hidden, or always valid) and is
// reported as a warning, never as a load failure. Persistence problems are transient and
// retryable. Finalize problems are terminal for the attempt only; session state is preserved.

use thiserror::Error;

/// Failures surfaced by store operations and the finalize flow.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("unknown location id: {0}")]
    UnknownLocation(String),

    /// Step (or full-wizard) validation did not pass; details are in the store's error map.
    #[error("validation failed for {field_count} field(s)")]
    ValidationFailed { field_count: usize },

    #[error("finalize is only allowed from the last visible step")]
    NotOnLastStep,

    /// The backend rejected the final submission. Session state is kept so the user can retry.
    #[error("finalize rejected: {0}")]
    FinalizeRejected(String),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

/// Draft persistence failures (network API or local fallback cache).
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("request failed with HTTP {0}")]
    Status(u16),

    #[error("network error: {0}")]
    Network(String),

    #[error("response could not be decoded: {0}")]
    Decode(String),

    #[error("draft not found: {0}")]
    NotFound(String),

    #[error("local cache error: {0}")]
    Cache(String),
}

impl PersistenceError {
    /// Transient failures are eligible for automatic retry with backoff; everything else
    /// (4xx contract errors, decode failures) is surfaced immediately.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network(_) => true,
            Self::Status(code) => *code >= 500 || *code == 408 || *code == 429,
            _ => false,
        }
    }
}

/// Catalog documents that fail to parse at all. Individual broken entries inside a
/// well-formed document are NOT errors; they surface as [`CatalogIntegrityWarning`]s.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("catalog document could not be parsed: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Soft integrity findings from a catalog scan. Logged, never fatal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogIntegrityWarning {
    /// Two descriptors in the same entity type share a key; the later one wins at read time.
    DuplicateFieldKey { entity_type: String, key: String },
    /// A condition references a sibling field that does not exist; the field degrades to hidden.
    DanglingConditionRef { entity_type: String, key: String, referenced: String },
    /// A select descriptor repeats an option value.
    DuplicateOptionValue { entity_type: String, key: String, value: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_detection_covers_server_errors_and_network() {
        assert!(PersistenceError::Network("connection reset".into()).is_transient());
        assert!(PersistenceError::Status(503).is_transient());
        assert!(PersistenceError::Status(429).is_transient());
        assert!(!PersistenceError::Status(404).is_transient());
        assert!(!PersistenceError::Decode("bad json".into()).is_transient());
    }
}
