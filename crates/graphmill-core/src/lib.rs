//! # graphmill-core
//!
//! Core types and traits for graphmill.
//!
//! This crate provides:
//! - The schema registry (vertex/edge entries, property tiers, linking rules)
//! - Value normalization and deterministic identity derivation
//! - Graph objects and their exchange representation
//! - Collaborator traits (dedup index, vault, blob store, graph writer, ledger)
//! - The progress ledger adapter
//! - Error types and defaults
//!
//! ## Log Level Contract
//!
//! | Level | Usage |
//! |-------|-------|
//! | ERROR | Job failed, or a collaborator fault aborted a worker |
//! | WARN  | Recoverable issue, stub accepted in place of a full match |
//! | INFO  | Job lifecycle (seeded, dispatched, completed) |
//! | DEBUG | Decision points (candidate status, rule evaluation) |
//! | TRACE | Per-property and per-item work |

pub mod config;
pub mod defaults;
pub mod error;
pub mod graph;
pub mod identity;
pub mod progress;
pub mod record;
pub mod schema;
pub mod traits;
pub mod values;

pub use config::ResolverConfig;
pub use error::{Error, ErrorKind, Result};
pub use graph::{
    EdgeData, GraphObject, LocalProperty, PropertySlot, ResolvedTriple, SensitiveProperty,
    StoredProperty, VertexData,
};
pub use identity::{
    derive_id_value, derive_identifier_stem, derive_internal_id, internal_id_digest, IdValue,
    IdentifierStem, InternalId, NormalizedProperties, StemState,
};
pub use progress::{CandidateStatus, JobProgress, ProgressTracker, StageRecord};
pub use record::ExtractedRecord;
pub use schema::{
    AcceptedTypes, EdgeEntry, EdgePropertySchema, EdgePropertySource, FunctionCatalog,
    PropertySchema, PropertyTier, RuleEntry, RuleSet, Schema, SchemaEntry, SpecifierSource,
    StorageLocation, StorageSpec, TargetConstant, TargetSpecifier, VertexEntry,
};
pub use traits::{
    BlobLocation, BlobStore, CandidatePage, DedupQuery, GraphWriter, ProgressLedger,
    SensitiveVault, VertexFinder,
};
pub use values::{normalize, DataType, NormalizedValue, PropertyValue, TypedPayload};
