//! Candidate and edge workers.
//!
//! A worker that hits an error records it in the job's [`FaultSlot`] and
//! keeps draining its queue without doing more work, so the orchestrator's
//! join barrier always resolves.

use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};

use futures::FutureExt;
use graphmill_core::progress::{candidate_stage, edge_stage};
use graphmill_core::{
    CandidateStatus, DedupQuery, Error, ExtractedRecord, ProgressTracker, ResolvedTriple, Result,
    RuleEntry, Schema, SchemaEntry, VertexData, VertexFinder,
};
use graphmill_regulators::Regulators;
use serde_json::json;
use tokio::sync::mpsc;
use tracing::{debug, error, trace, warn};

use crate::queue::{WorkItem, WorkQueue};

/// First error raised by any worker of a job.
#[derive(Debug, Clone, Default)]
pub struct FaultSlot {
    inner: Arc<Mutex<Option<Error>>>,
}

impl FaultSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep `err` unless a fault is already recorded.
    pub fn record(&self, err: Error) {
        let mut slot = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if slot.is_none() {
            error!(error = %err, "Worker fault");
            *slot = Some(err);
        } else {
            debug!(error = %err, "Additional worker fault ignored");
        }
    }

    pub fn is_set(&self) -> bool {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }

    pub fn take(&self) -> Option<Error> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).take()
    }
}

/// Everything a worker reads. Shared read-only across all workers of a job.
pub(crate) struct JobContext {
    pub schema: Arc<Schema>,
    pub record: Arc<ExtractedRecord>,
    pub source_vertex: Arc<VertexData>,
    pub regulators: Regulators,
    pub finder: Arc<dyn VertexFinder>,
    pub tracker: ProgressTracker,
    pub fault: FaultSlot,
}

/// A candidate and the rule that produced it.
#[derive(Debug)]
pub(crate) struct CandidateItem {
    pub candidate: VertexData,
    pub rule: RuleEntry,
}

/// A vertex the source will link to.
#[derive(Debug)]
pub(crate) struct ResolvedItem {
    pub vertex: VertexData,
    pub rule: RuleEntry,
    /// Unmatched incomplete candidate graphed under a stub rule.
    pub stub: bool,
}

async fn guarded<F>(ctx: &JobContext, what: &str, work: F)
where
    F: std::future::Future<Output = Result<()>>,
{
    match AssertUnwindSafe(work).catch_unwind().await {
        Ok(Ok(())) => {}
        Ok(Err(err)) => ctx.fault.record(err),
        Err(_) => ctx
            .fault
            .record(Error::Worker(format!("{} panicked", what))),
    }
}

pub(crate) async fn candidate_worker(
    ctx: Arc<JobContext>,
    candidates: WorkQueue<CandidateItem>,
    resolved: WorkQueue<ResolvedItem>,
) {
    while let Some(WorkItem::Work(item)) = candidates.recv().await {
        if !ctx.fault.is_set() {
            guarded(&ctx, "candidate worker", resolve_candidate(&ctx, &resolved, item)).await;
        }
        candidates.task_done();
    }
    trace!("Candidate worker retired");
}

async fn resolve_candidate(
    ctx: &JobContext,
    resolved: &WorkQueue<ResolvedItem>,
    item: CandidateItem,
) -> Result<()> {
    let CandidateItem { candidate, rule } = item;
    let entry = ctx.schema.vertex_entry(&rule.target_type)?;
    let stage = candidate_stage(&candidate.internal_id.to_string(), &rule.edge_type);

    if candidate.is_schema_complete(SchemaEntry::Vertex(entry)) {
        debug!(
            object_type = %candidate.object_type,
            internal_id = %candidate.internal_id,
            edge_type = %rule.edge_type,
            "Candidate fully ready to graph"
        );
        ctx.tracker
            .mark_stage_completed(
                &stage,
                json!({"status": CandidateStatus::FullyReadyToGraph, "existing_vertexes": []}),
            )
            .await?;
        return resolved
            .put(ResolvedItem {
                vertex: candidate,
                rule,
                stub: false,
            })
            .await;
    }

    let matches = ctx
        .finder
        .find_candidates(&DedupQuery::for_candidate(&candidate))
        .await?;
    debug!(
        object_type = %candidate.object_type,
        edge_type = %rule.edge_type,
        result_count = matches.len(),
        "Dedup lookup finished"
    );

    if matches.is_empty() {
        if rule.is_create {
            return Err(Error::UnsatisfiableRule {
                edge_type: rule.edge_type.clone(),
                target_type: rule.target_type.clone(),
                candidate: serde_json::to_string(&candidate)?,
            });
        }
        if rule.is_stub {
            warn!(
                object_type = %candidate.object_type,
                edge_type = %rule.edge_type,
                "No existing vertex; graphing stub"
            );
            ctx.tracker
                .mark_stage_completed(
                    &stage,
                    json!({"status": CandidateStatus::Stub, "existing_vertexes": []}),
                )
                .await?;
            return resolved
                .put(ResolvedItem {
                    vertex: candidate,
                    rule,
                    stub: true,
                })
                .await;
        }
        debug!(edge_type = %rule.edge_type, "No existing vertex and rule neither creates nor stubs");
    }

    let existing: Vec<String> = matches.iter().map(|v| v.internal_id.to_string()).collect();
    ctx.tracker
        .mark_stage_completed(
            &stage,
            json!({"status": CandidateStatus::FoundExistingVertexes, "existing_vertexes": existing}),
        )
        .await?;
    for vertex in matches {
        resolved
            .put(ResolvedItem {
                vertex,
                rule: rule.clone(),
                stub: false,
            })
            .await?;
    }
    Ok(())
}

pub(crate) async fn edge_worker(
    ctx: Arc<JobContext>,
    resolved: WorkQueue<ResolvedItem>,
    results: mpsc::Sender<ResolvedTriple>,
) {
    while let Some(WorkItem::Work(item)) = resolved.recv().await {
        if !ctx.fault.is_set() {
            guarded(&ctx, "edge worker", async {
                let triple = resolve_edge(&ctx, item).await?;
                results
                    .send(triple)
                    .await
                    .map_err(|_| Error::Worker("result collector closed".to_string()))
            })
            .await;
        }
        resolved.task_done();
    }
    trace!("Edge worker retired");
}

async fn resolve_edge(ctx: &JobContext, item: ResolvedItem) -> Result<ResolvedTriple> {
    let ResolvedItem { vertex, rule, stub } = item;
    let entry = ctx.schema.edge_entry(&rule.edge_type)?;
    let edges = &ctx.regulators.edges;
    let edge = if stub {
        edges
            .build_stub_edge(entry, &ctx.source_vertex, &vertex, &ctx.record, rule.inbound)
            .await?
    } else {
        edges
            .build_edge(entry, &ctx.source_vertex, &vertex, &ctx.record, rule.inbound)
            .await?
    };

    let stage = edge_stage(&vertex.internal_id.to_string(), edge.edge_label());
    ctx.tracker
        .mark_stage_completed(
            &stage,
            json!({
                "edge_internal_id": edge.internal_id.to_string(),
                "source_vertex_internal_id": edge.source_vertex_internal_id.to_string(),
                "target_vertex_internal_id": edge.target_vertex_internal_id.to_string(),
                "stub": stub,
            }),
        )
        .await?;
    trace!(edge_type = %edge.edge_label(), internal_id = %edge.internal_id, "Edge resolved");

    Ok(ResolvedTriple {
        source_vertex: (*ctx.source_vertex).clone(),
        other_vertex: vertex,
        edge,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fault_slot_keeps_first_error() {
        let slot = FaultSlot::new();
        assert!(!slot.is_set());
        slot.record(Error::Worker("first".to_string()));
        slot.record(Error::Worker("second".to_string()));
        assert!(slot.is_set());
        assert!(matches!(slot.take(), Some(Error::Worker(msg)) if msg == "first"));
        assert!(slot.take().is_none());
    }
}
