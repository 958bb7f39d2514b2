//! Centralized default constants for graphmill.
//!
//! Crates reference these constants instead of defining their own magic
//! numbers and literals.

// =============================================================================
// PIPELINE
// =============================================================================

/// Number of candidate-resolution workers per job.
pub const CANDIDATE_WORKERS: usize = 5;

/// Number of edge-resolution workers per job.
pub const EDGE_WORKERS: usize = 5;

/// Capacity of each bounded work queue.
pub const QUEUE_CAPACITY: usize = 64;

// =============================================================================
// IDENTITY
// =============================================================================

/// Literal substituted into internal-id keys for a missing property.
pub const MISSING_OBJECT_PROPERTY: &str = "MISSING_OBJECT_PROPERTY";

/// Literal substituted into internal-id keys for a null property.
pub const NULL_OBJECT_PROPERTY: &str = "NULL_OBJECT_PROPERTY";

/// Suffix appended to an identifier stem's object type for incomplete provenance.
pub const STUB_SUFFIX: &str = "::stub";

/// Graph kind segment for vertex identifier stems.
pub const VERTEX_KIND: &str = "vertex";

/// Graph kind segment for edge identifier stems.
pub const EDGE_KIND: &str = "edge";

// =============================================================================
// PROGRESS STAGES
// =============================================================================

/// Stage recorded once the source vertex is built.
pub const STAGE_GENERATE_SOURCE_VERTEX: &str = "generate_source_vertex";

/// Stage recorded once the rule arbiter has produced its candidates.
pub const STAGE_DERIVE_POTENTIAL_CONNECTIONS: &str = "derive_potential_connections";

/// Prefix for per-candidate dedup stages.
pub const STAGE_CHECK_FOR_EXISTING_VERTEXES: &str = "check_for_existing_vertexes";

/// Prefix for per-edge stages.
pub const STAGE_GENERATE_POTENTIAL_EDGE: &str = "generate_potential_edge";

/// Stage recorded once the whole job has completed.
pub const STAGE_LEECH: &str = "leech";

// =============================================================================
// STORAGE
// =============================================================================

/// Root directory for the filesystem oversized-value store.
pub const BLOB_ROOT: &str = "./blobs";

/// Environment variable prefix for named storage locations.
pub const STORAGE_LOCATION_ENV_PREFIX: &str = "GRAPHMILL_STORAGE_";

// =============================================================================
// SEARCH
// =============================================================================

/// Upper bound on pages followed for one dedup lookup.
pub const SEARCH_MAX_PAGES: usize = 1_000;

/// HTTP timeout for graph/search requests, in seconds.
pub const GRAPH_REQUEST_TIMEOUT_SECS: u64 = 30;
