//! # graphmill-store
//!
//! Collaborator implementations for graphmill.
//!
//! - Sensitive vault: in-memory and PostgreSQL
//! - Oversized-value store: in-memory and filesystem
//! - Progress ledger: in-memory and PostgreSQL
//! - In-memory vertex index (dedup lookups and graph writes)
//!
//! ## Example
//!
//! ```rust,ignore
//! use graphmill_store::{connect, PgProgressLedger, PgSensitiveVault, PoolConfig};
//!
//! let pool = connect("postgres://localhost/graphmill", PoolConfig::from_env()).await?;
//! let vault = PgSensitiveVault::new(pool.clone());
//! let ledger = PgProgressLedger::new(pool);
//! ```

pub mod blob;
pub mod index;
pub mod ledger;
pub mod pool;
pub mod vault;

pub use blob::{FilesystemBlobStore, InMemoryBlobStore};
pub use index::InMemoryVertexIndex;
pub use ledger::{InMemoryProgressLedger, PgProgressLedger};
pub use pool::{connect, ensure_schema, PoolConfig};
pub use vault::{sensitive_pointer, InMemoryVault, PgSensitiveVault};
