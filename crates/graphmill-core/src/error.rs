//! Error types for graphmill.

use thiserror::Error;

/// Result type alias using graphmill's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Broad classification of an [`Error`], used by callers to pick a retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad schema deployment or configuration. Never retried.
    Configuration,
    /// The record itself cannot be resolved. Re-running reproduces the failure.
    Data,
    /// A vault, store, index, or ledger call failed. Retry belongs to the caller.
    Collaborator,
    /// A worker died or a queue closed underneath the pipeline.
    Concurrency,
}

/// Core error type for graphmill operations.
#[derive(Error, Debug)]
pub enum Error {
    // ─── Configuration / schema ──────────────────────────────────────────

    /// A property declares a data type outside the accepted set.
    #[error("Invalid property type for {property_name}: {data_type} (accepted: String, Number, DateTime, Boolean)")]
    InvalidPropertyType {
        property_name: String,
        data_type: String,
    },

    /// The schema document is malformed or internally inconsistent.
    #[error("Invalid schema: {0}")]
    InvalidSchema(String),

    /// A schema entry was requested by name but is not registered.
    #[error("Unknown schema entry: {0}")]
    UnknownSchemaEntry(String),

    /// A specifier/property function is referenced but not registered.
    #[error("Specifier function named {0} is not registered with the system")]
    UnknownSpecifierFunction(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    // ─── Data ────────────────────────────────────────────────────────────

    /// The identity of a source/known object could not be derived.
    #[error("Could not derive identity for {object_type}: {reason}")]
    IdentityDerivation { object_type: String, reason: String },

    /// An extraction yielded more than one distinct value for a property.
    #[error("Extraction {extraction_name} yielded multiple values for {property_name}: {values:?}")]
    AmbiguousExtraction {
        extraction_name: String,
        property_name: String,
        values: Vec<String>,
    },

    /// An edge property names an extraction the record does not carry.
    #[error("Extraction {extraction_name} not found in the extracted data")]
    UnknownExtraction { extraction_name: String },

    /// A required edge property could not be resolved.
    #[error("Could not derive value for {edge_type} edge property {property_name}: {reason}")]
    MissingEdgeProperty {
        edge_type: String,
        property_name: String,
        reason: String,
    },

    /// The source vertex built from the record is not schema-complete.
    #[error("Could not completely construct a {object_type} source vertex: {detail}")]
    IncompleteSourceVertex { object_type: String, detail: String },

    /// An edge's endpoint types violate the schema's from/to constraints.
    #[error("Cannot build a {edge_type} edge from {from_type} to {to_type}: accepted from {accepted_from:?}, accepted to {accepted_to:?}")]
    EdgeConstraintViolation {
        edge_type: String,
        from_type: String,
        to_type: String,
        accepted_from: Vec<String>,
        accepted_to: Vec<String>,
    },

    /// A create-required linking rule found no existing vertex.
    #[error("Could not satisfy {edge_type} rule for {target_type} candidate {candidate}: no existing vertex and the rule requires one")]
    UnsatisfiableRule {
        edge_type: String,
        target_type: String,
        candidate: String,
    },

    /// The incoming record does not have the expected shape.
    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    /// A raw value could not be coerced to its declared data type.
    #[error("Invalid value for {property_name} ({data_type}): {value}")]
    InvalidValue {
        property_name: String,
        data_type: String,
        value: String,
    },

    // ─── Collaborators ───────────────────────────────────────────────────

    /// The sensitive vault or oversized-value store failed.
    #[error("Storage tier error: {0}")]
    StorageTier(String),

    /// The dedup/search collaborator failed.
    #[error("Search error: {0}")]
    Search(String),

    /// The progress ledger failed.
    #[error("Ledger error: {0}")]
    Ledger(String),

    /// Database operation failed (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// HTTP/network request failed
    #[error("Request error: {0}")]
    Request(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// File I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // ─── Concurrency ─────────────────────────────────────────────────────

    /// A pipeline worker panicked or a queue closed early.
    #[error("Worker error: {0}")]
    Worker(String),
}

impl Error {
    /// Classify this error per the configuration/data/collaborator/concurrency taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidPropertyType { .. }
            | Error::InvalidSchema(_)
            | Error::UnknownSchemaEntry(_)
            | Error::UnknownSpecifierFunction(_)
            | Error::Config(_) => ErrorKind::Configuration,
            Error::IdentityDerivation { .. }
            | Error::AmbiguousExtraction { .. }
            | Error::UnknownExtraction { .. }
            | Error::MissingEdgeProperty { .. }
            | Error::IncompleteSourceVertex { .. }
            | Error::EdgeConstraintViolation { .. }
            | Error::UnsatisfiableRule { .. }
            | Error::InvalidRecord(_)
            | Error::InvalidValue { .. } => ErrorKind::Data,
            Error::StorageTier(_)
            | Error::Search(_)
            | Error::Ledger(_)
            | Error::Database(_)
            | Error::Request(_)
            | Error::Serialization(_)
            | Error::Io(_) => ErrorKind::Collaborator,
            Error::Worker(_) => ErrorKind::Concurrency,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Request(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_invalid_property_type() {
        let err = Error::InvalidPropertyType {
            property_name: "dob".to_string(),
            data_type: "Date".to_string(),
        };
        assert!(err.to_string().contains("dob"));
        assert!(err.to_string().contains("Date"));
    }

    #[test]
    fn test_error_display_unknown_function() {
        let err = Error::UnknownSpecifierFunction("derive_thing".to_string());
        assert_eq!(
            err.to_string(),
            "Specifier function named derive_thing is not registered with the system"
        );
    }

    #[test]
    fn test_error_display_edge_constraint() {
        let err = Error::EdgeConstraintViolation {
            edge_type: "_received".to_string(),
            from_type: "Provider".to_string(),
            to_type: "Encounter".to_string(),
            accepted_from: vec!["Patient".to_string()],
            accepted_to: vec!["Encounter".to_string()],
        };
        let msg = err.to_string();
        assert!(msg.contains("_received"));
        assert!(msg.contains("Provider"));
        assert!(msg.contains("Encounter"));
    }

    #[test]
    fn test_error_kind_configuration() {
        assert_eq!(
            Error::InvalidSchema("x".into()).kind(),
            ErrorKind::Configuration
        );
        assert_eq!(
            Error::UnknownSpecifierFunction("x".into()).kind(),
            ErrorKind::Configuration
        );
    }

    #[test]
    fn test_error_kind_data() {
        let err = Error::UnsatisfiableRule {
            edge_type: "_attended".into(),
            target_type: "Provider".into(),
            candidate: "Provider-1001".into(),
        };
        assert_eq!(err.kind(), ErrorKind::Data);
        let err = Error::AmbiguousExtraction {
            extraction_name: "patients".into(),
            property_name: "patient_id".into(),
            values: vec!["1".into(), "2".into()],
        };
        assert_eq!(err.kind(), ErrorKind::Data);
        let err = Error::UnknownExtraction {
            extraction_name: "visits".into(),
        };
        assert_eq!(err.kind(), ErrorKind::Data);
    }

    #[test]
    fn test_error_kind_collaborator() {
        assert_eq!(
            Error::StorageTier("vault down".into()).kind(),
            ErrorKind::Collaborator
        );
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        assert_eq!(Error::from(io_err).kind(), ErrorKind::Collaborator);
    }

    #[test]
    fn test_error_kind_concurrency() {
        assert_eq!(
            Error::Worker("panicked".into()).kind(),
            ErrorKind::Concurrency
        );
    }

    #[test]
    fn test_from_serde_json_error() {
        let json_err = serde_json::from_str::<i32>("not a number").unwrap_err();
        let err: Error = json_err.into();
        match err {
            Error::Serialization(msg) => assert!(!msg.is_empty()),
            _ => panic!("Expected Serialization error"),
        }
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<Error>();
        assert_sync::<Error>();
    }
}
