//! # graphmill-gql
//!
//! GraphQL client implementing the dedup lookup ([`VertexFinder`]) and the
//! graph writer ([`GraphWriter`]).
//!
//! Dedup lookups page through results by continuation token; callers use
//! [`VertexFinder::find_candidates`] and never see the tokens.
//!
//! [`VertexFinder`]: graphmill_core::VertexFinder
//! [`VertexFinder::find_candidates`]: graphmill_core::VertexFinder::find_candidates
//! [`GraphWriter`]: graphmill_core::GraphWriter

pub mod client;
pub mod queries;

pub use client::{GqlClient, ENV_GRAPH_ENDPOINT, ENV_GRAPH_TIMEOUT_SECS};
