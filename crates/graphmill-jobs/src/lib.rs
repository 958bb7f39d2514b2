//! # graphmill-jobs
//!
//! Concurrent resolution pipeline for graphmill.
//!
//! A [`ResolutionJob`] takes one extracted record through four states:
//! it seeds the source vertex, dispatches one candidate per linking rule,
//! drains two worker pools (candidate resolution, then edge building) and
//! completes with the list of resolved triples. The first worker error
//! fails the whole job.
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use graphmill_core::{ExtractedRecord, Schema};
//! use graphmill_jobs::{PipelineConfig, ResolutionPipeline};
//!
//! let pipeline = ResolutionPipeline::builder(Schema::from_json(&schema_json)?)
//!     .with_config(PipelineConfig::from_env())
//!     .with_finder(finder)
//!     .with_ledger(ledger)
//!     .with_vault(vault)
//!     .with_blob_store(blobs)
//!     .build()?;
//!
//! let triples = pipeline.run(ExtractedRecord::from_json(&record_json)?).await?;
//! ```

pub mod config;
pub mod job;
pub mod pipeline;
pub mod queue;
pub mod workers;

pub use config::PipelineConfig;
pub use job::{JobState, ResolutionJob};
pub use pipeline::{publish, PipelineBuilder, ResolutionPipeline};
pub use queue::{WorkItem, WorkQueue};
pub use workers::FaultSlot;
