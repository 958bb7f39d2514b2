//! Progress ledger adapter and stage naming.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::trace;

use crate::defaults;
use crate::error::Result;
use crate::traits::ProgressLedger;

/// One completed stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageRecord {
    pub step_name: String,
    pub completed_at: DateTime<Utc>,
    pub stage_results: JsonValue,
}

/// All recorded stages of one job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobProgress {
    pub identifier: String,
    pub id_value: String,
    pub steps: Vec<StageRecord>,
}

impl JobProgress {
    pub fn has_completed_step(&self, step_name: &str) -> bool {
        self.steps.iter().any(|s| s.step_name == step_name)
    }

    pub fn step(&self, step_name: &str) -> Option<&StageRecord> {
        self.steps.iter().find(|s| s.step_name == step_name)
    }

    /// Latest completed stage.
    pub fn most_recent_step(&self) -> Option<&StageRecord> {
        self.steps.iter().max_by_key(|s| s.completed_at)
    }

    pub fn last_activity_time(&self) -> Option<DateTime<Utc>> {
        self.most_recent_step().map(|s| s.completed_at)
    }
}

/// Outcome of checking one candidate against the dedup index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateStatus {
    /// Already schema-complete; graphed as is.
    FullyReadyToGraph,
    /// Matched one or more existing vertices.
    FoundExistingVertexes,
    /// No match; the incomplete candidate is graphed as a stub.
    Stub,
}

impl fmt::Display for CandidateStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CandidateStatus::FullyReadyToGraph => write!(f, "fully_ready_to_graph"),
            CandidateStatus::FoundExistingVertexes => write!(f, "found_existing_vertexes"),
            CandidateStatus::Stub => write!(f, "stub"),
        }
    }
}

impl FromStr for CandidateStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "fully_ready_to_graph" => Ok(CandidateStatus::FullyReadyToGraph),
            "found_existing_vertexes" => Ok(CandidateStatus::FoundExistingVertexes),
            "stub" => Ok(CandidateStatus::Stub),
            _ => Err(format!("Invalid candidate status: {}", s)),
        }
    }
}

/// Stage name for checking a candidate produced by an edge-typed rule.
pub fn candidate_stage(candidate_internal_id: &str, edge_type: &str) -> String {
    format!(
        "{}_{}_{}",
        defaults::STAGE_CHECK_FOR_EXISTING_VERTEXES,
        candidate_internal_id,
        edge_type
    )
}

/// Stage name for building the edge to a resolved vertex.
pub fn edge_stage(resolved_internal_id: &str, edge_object_type: &str) -> String {
    format!(
        "{}_{}_{}",
        defaults::STAGE_GENERATE_POTENTIAL_EDGE,
        resolved_internal_id,
        edge_object_type
    )
}

/// Ledger handle bound to one job's `(identifier, id_value)` key.
#[derive(Clone)]
pub struct ProgressTracker {
    identifier: String,
    id_value: String,
    ledger: Arc<dyn ProgressLedger>,
}

impl ProgressTracker {
    pub fn new(
        identifier: impl Into<String>,
        id_value: impl Into<String>,
        ledger: Arc<dyn ProgressLedger>,
    ) -> Self {
        Self {
            identifier: identifier.into(),
            id_value: id_value.into(),
            ledger,
        }
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn id_value(&self) -> &str {
        &self.id_value
    }

    pub async fn mark_stage_completed(&self, stage_name: &str, payload: JsonValue) -> Result<()> {
        trace!(
            identifier = %self.identifier,
            id_value = %self.id_value,
            stage = stage_name,
            "Marking stage completed"
        );
        self.ledger
            .mark_stage_completed(&self.identifier, &self.id_value, stage_name, payload)
            .await
    }

    pub async fn progress(&self) -> Result<Option<JobProgress>> {
        self.ledger.get_progress(&self.identifier, &self.id_value).await
    }
}

impl fmt::Debug for ProgressTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgressTracker")
            .field("identifier", &self.identifier)
            .field("id_value", &self.id_value)
            .finish()
    }
}
