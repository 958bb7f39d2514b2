//! # graphmill-regulators
//!
//! Turns extracted records into schema-typed graph objects.
//!
//! - [`ObjectRegulator`] normalizes raw values, derives identity and places
//!   every property in its storage tier.
//! - [`RuleArbiter`] reads a vertex's linking rules and produces one candidate
//!   vertex per rule.
//! - [`EdgeRegulator`] validates edge endpoints and resolves edge properties.
//! - [`FunctionRegistry`] is the closed set of functions schemas may name.

pub mod arbiter;
pub mod edge;
pub mod extraction;
pub mod functions;
pub mod object;
pub mod tiers;

use std::sync::Arc;

use graphmill_core::{BlobStore, ResolverConfig, SensitiveVault};

pub use arbiter::RuleArbiter;
pub use edge::EdgeRegulator;
pub use extraction::distinct_value;
pub use functions::{FunctionContext, FunctionRegistry, PropertyFunction};
pub use object::{normalize_properties, ObjectRegulator};
pub use tiers::{Buckets, StorageTiers};

/// The three regulators wired to one set of storage tiers and functions.
#[derive(Clone)]
pub struct Regulators {
    pub objects: ObjectRegulator,
    pub arbiter: RuleArbiter,
    pub edges: EdgeRegulator,
    functions: Arc<FunctionRegistry>,
}

impl Regulators {
    pub fn new(
        vault: Arc<dyn SensitiveVault>,
        blobs: Arc<dyn BlobStore>,
        functions: Arc<FunctionRegistry>,
        config: Arc<ResolverConfig>,
    ) -> Self {
        let tiers = StorageTiers::new(vault, blobs, config);
        let objects = ObjectRegulator::new(tiers.clone());
        Self {
            arbiter: RuleArbiter::new(objects.clone(), functions.clone()),
            edges: EdgeRegulator::new(tiers, functions.clone()),
            objects,
            functions,
        }
    }

    /// The function registry shared by the arbiter and edge regulator.
    pub fn functions(&self) -> &FunctionRegistry {
        &self.functions
    }
}
