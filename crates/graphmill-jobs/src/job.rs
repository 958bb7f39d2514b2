//! One resolution job: a single extracted record taken from source vertex
//! to a list of resolved triples.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use graphmill_core::{
    defaults, Error, ExtractedRecord, ProgressTracker, ResolvedTriple, Result, Schema,
    SchemaEntry, VertexData, VertexFinder,
};
use graphmill_regulators::Regulators;
use serde_json::json;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, error, info, instrument, warn};

use crate::config::PipelineConfig;
use crate::queue::WorkQueue;
use crate::workers::{
    candidate_worker, edge_worker, CandidateItem, FaultSlot, JobContext, ResolvedItem,
};

/// Where a job is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Created,
    /// Building the source vertex.
    Seeding,
    /// Generating candidates and feeding the candidate queue.
    Dispatching,
    /// Waiting on both queues to empty.
    Draining,
    Completed,
    Failed,
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JobState::Created => "created",
            JobState::Seeding => "seeding",
            JobState::Dispatching => "dispatching",
            JobState::Draining => "draining",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// A single record's resolution run.
pub struct ResolutionJob {
    schema: Arc<Schema>,
    regulators: Regulators,
    finder: Arc<dyn VertexFinder>,
    tracker: ProgressTracker,
    config: PipelineConfig,
    record: Arc<ExtractedRecord>,
    state: JobState,
    source_vertex: Option<Arc<VertexData>>,
}

impl ResolutionJob {
    pub(crate) fn new(
        schema: Arc<Schema>,
        regulators: Regulators,
        finder: Arc<dyn VertexFinder>,
        tracker: ProgressTracker,
        config: PipelineConfig,
        record: ExtractedRecord,
    ) -> Self {
        Self {
            schema,
            regulators,
            finder,
            tracker,
            config,
            record: Arc::new(record),
            state: JobState::Created,
            source_vertex: None,
        }
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    pub fn record(&self) -> &ExtractedRecord {
        &self.record
    }

    /// The source vertex, once seeding has built it.
    pub fn source_vertex(&self) -> Option<&VertexData> {
        self.source_vertex.as_deref()
    }

    pub fn tracker(&self) -> &ProgressTracker {
        &self.tracker
    }

    fn transition(&mut self, next: JobState) {
        debug!(from = %self.state, to = %next, "Job state change");
        self.state = next;
    }

    /// Run the job to completion. Returns every resolved triple, or the first
    /// error any stage raised.
    #[instrument(
        skip(self),
        fields(
            identifier = %self.record.identifier,
            id_value = %self.record.id_value_key(),
            object_type = %self.record.object_type
        )
    )]
    pub async fn work(&mut self) -> Result<Vec<ResolvedTriple>> {
        let start = Instant::now();
        info!("Resolving record");
        match self.run().await {
            Ok(results) => {
                self.transition(JobState::Completed);
                info!(
                    result_count = results.len(),
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Record resolved"
                );
                Ok(results)
            }
            Err(e) => {
                self.transition(JobState::Failed);
                error!(
                    error = %e,
                    kind = ?e.kind(),
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Record resolution failed"
                );
                Err(e)
            }
        }
    }

    async fn run(&mut self) -> Result<Vec<ResolvedTriple>> {
        self.transition(JobState::Seeding);
        let source = Arc::new(self.seed().await?);
        self.source_vertex = Some(source.clone());

        self.transition(JobState::Dispatching);
        let entry = self.schema.vertex_entry(&self.record.object_type)?;
        let candidates = self
            .regulators
            .arbiter
            .process_rules(&self.schema, &source, entry, &self.record)
            .await?;
        let edge_types: Vec<&str> = candidates
            .iter()
            .map(|(_, rule)| rule.edge_type.as_str())
            .collect();
        self.tracker
            .mark_stage_completed(
                defaults::STAGE_DERIVE_POTENTIAL_CONNECTIONS,
                json!({"candidate_count": candidates.len(), "edge_types": edge_types}),
            )
            .await?;

        let ctx = Arc::new(JobContext {
            schema: self.schema.clone(),
            record: self.record.clone(),
            source_vertex: source,
            regulators: self.regulators.clone(),
            finder: self.finder.clone(),
            tracker: self.tracker.clone(),
            fault: FaultSlot::new(),
        });
        let capacity = self.config.queue_capacity();
        let candidate_queue: WorkQueue<CandidateItem> = WorkQueue::new(capacity);
        let resolved_queue: WorkQueue<ResolvedItem> = WorkQueue::new(capacity);
        let (results_tx, mut results_rx) = mpsc::channel::<ResolvedTriple>(capacity);

        let collector = tokio::spawn(async move {
            let mut results = Vec::new();
            while let Some(triple) = results_rx.recv().await {
                results.push(triple);
            }
            results
        });

        let mut candidate_workers = JoinSet::new();
        for _ in 0..self.config.candidate_workers() {
            candidate_workers.spawn(candidate_worker(
                ctx.clone(),
                candidate_queue.clone(),
                resolved_queue.clone(),
            ));
        }
        let mut edge_workers = JoinSet::new();
        for _ in 0..self.config.edge_workers() {
            edge_workers.spawn(edge_worker(
                ctx.clone(),
                resolved_queue.clone(),
                results_tx.clone(),
            ));
        }
        drop(results_tx);

        for (candidate, rule) in candidates {
            if ctx.fault.is_set() {
                warn!("Worker fault recorded; no further candidates dispatched");
                break;
            }
            if let Err(e) = candidate_queue.put(CandidateItem { candidate, rule }).await {
                ctx.fault.record(e);
                break;
            }
        }

        self.transition(JobState::Draining);
        candidate_queue.join().await;
        resolved_queue.join().await;
        retire(&candidate_queue, &mut candidate_workers, &ctx.fault).await;
        retire(&resolved_queue, &mut edge_workers, &ctx.fault).await;

        let results = collector
            .await
            .map_err(|e| Error::Worker(format!("result collector failed: {}", e)))?;
        if let Some(fault) = ctx.fault.take() {
            return Err(fault);
        }

        let edges: Vec<String> = results
            .iter()
            .map(|t| t.edge.internal_id.to_string())
            .collect();
        self.tracker
            .mark_stage_completed(
                defaults::STAGE_LEECH,
                json!({"result_count": results.len(), "edges": edges}),
            )
            .await?;
        Ok(results)
    }

    /// Build the source vertex. Its identity and every declared property
    /// must be present.
    async fn seed(&self) -> Result<VertexData> {
        let entry = self.schema.vertex_entry(&self.record.object_type)?;
        let source = self
            .regulators
            .objects
            .create_known_entity(entry, self.record.source()?)
            .await?;
        if !source.is_schema_complete(SchemaEntry::Vertex(entry)) {
            return Err(Error::IncompleteSourceVertex {
                object_type: entry.vertex_name.clone(),
                detail: describe_incomplete(&source),
            });
        }
        self.tracker
            .mark_stage_completed(
                defaults::STAGE_GENERATE_SOURCE_VERTEX,
                json!({"internal_id": source.internal_id.to_string()}),
            )
            .await?;
        debug!(internal_id = %source.internal_id, "Source vertex built");
        Ok(source)
    }
}

impl fmt::Debug for ResolutionJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolutionJob")
            .field("identifier", &self.record.identifier)
            .field("object_type", &self.record.object_type)
            .field("state", &self.state)
            .finish()
    }
}

fn describe_incomplete(vertex: &VertexData) -> String {
    let identity = if vertex.is_identifiable() {
        "derived"
    } else {
        "pending"
    };
    if vertex.missing_properties.is_empty() {
        format!("identity {}", identity)
    } else {
        format!(
            "identity {}; missing [{}]",
            identity,
            vertex.missing_properties.join(", ")
        )
    }
}

/// Send one shutdown per worker and wait for all of them to exit.
async fn retire<T: Send>(queue: &WorkQueue<T>, workers: &mut JoinSet<()>, fault: &FaultSlot) {
    for _ in 0..workers.len() {
        if let Err(e) = queue.shutdown().await {
            fault.record(e);
            break;
        }
    }
    while let Some(joined) = workers.join_next().await {
        if let Err(e) = joined {
            fault.record(Error::Worker(format!("worker task failed: {}", e)));
        }
    }
}
