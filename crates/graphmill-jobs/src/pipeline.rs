//! Pipeline wiring and publishing.

use std::sync::Arc;

use graphmill_core::{
    BlobStore, Error, ExtractedRecord, GraphWriter, ProgressLedger, ProgressTracker,
    ResolvedTriple, ResolverConfig, Result, Schema, SensitiveVault, VertexData, VertexFinder,
};
use graphmill_regulators::{FunctionRegistry, Regulators};
use tracing::{debug, info};

use crate::config::PipelineConfig;
use crate::job::ResolutionJob;

/// A validated schema wired to its collaborators. Hands out one
/// [`ResolutionJob`] per record.
#[derive(Clone)]
pub struct ResolutionPipeline {
    schema: Arc<Schema>,
    regulators: Regulators,
    finder: Arc<dyn VertexFinder>,
    ledger: Arc<dyn ProgressLedger>,
    config: PipelineConfig,
}

impl ResolutionPipeline {
    pub fn builder(schema: Schema) -> PipelineBuilder {
        PipelineBuilder::new(schema)
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn regulators(&self) -> &Regulators {
        &self.regulators
    }

    /// Prepare a job for `record` without running it.
    pub fn job(&self, record: ExtractedRecord) -> ResolutionJob {
        let tracker = ProgressTracker::new(
            record.identifier.clone(),
            record.id_value_key(),
            self.ledger.clone(),
        );
        ResolutionJob::new(
            self.schema.clone(),
            self.regulators.clone(),
            self.finder.clone(),
            tracker,
            self.config.clone(),
            record,
        )
    }

    /// Resolve one record.
    pub async fn run(&self, record: ExtractedRecord) -> Result<Vec<ResolvedTriple>> {
        self.job(record).work().await
    }
}

/// Builder for [`ResolutionPipeline`].
pub struct PipelineBuilder {
    schema: Schema,
    config: PipelineConfig,
    resolver_config: ResolverConfig,
    functions: FunctionRegistry,
    finder: Option<Arc<dyn VertexFinder>>,
    ledger: Option<Arc<dyn ProgressLedger>>,
    vault: Option<Arc<dyn SensitiveVault>>,
    blobs: Option<Arc<dyn BlobStore>>,
}

impl PipelineBuilder {
    pub fn new(schema: Schema) -> Self {
        Self {
            schema,
            config: PipelineConfig::default(),
            resolver_config: ResolverConfig::default(),
            functions: FunctionRegistry::with_builtins(),
            finder: None,
            ledger: None,
            vault: None,
            blobs: None,
        }
    }

    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    /// Storage bucket resolution for stored properties.
    pub fn with_resolver_config(mut self, config: ResolverConfig) -> Self {
        self.resolver_config = config;
        self
    }

    /// Replace the function registry. Defaults to the built-ins.
    pub fn with_functions(mut self, functions: FunctionRegistry) -> Self {
        self.functions = functions;
        self
    }

    pub fn with_finder(mut self, finder: Arc<dyn VertexFinder>) -> Self {
        self.finder = Some(finder);
        self
    }

    pub fn with_ledger(mut self, ledger: Arc<dyn ProgressLedger>) -> Self {
        self.ledger = Some(ledger);
        self
    }

    pub fn with_vault(mut self, vault: Arc<dyn SensitiveVault>) -> Self {
        self.vault = Some(vault);
        self
    }

    pub fn with_blob_store(mut self, blobs: Arc<dyn BlobStore>) -> Self {
        self.blobs = Some(blobs);
        self
    }

    /// Validate the schema against the function registry and wire the
    /// regulators.
    pub fn build(self) -> Result<ResolutionPipeline> {
        let finder = self
            .finder
            .ok_or_else(|| Error::Config("pipeline has no dedup index".to_string()))?;
        let ledger = self
            .ledger
            .ok_or_else(|| Error::Config("pipeline has no progress ledger".to_string()))?;
        let vault = self
            .vault
            .ok_or_else(|| Error::Config("pipeline has no sensitive vault".to_string()))?;
        let blobs = self
            .blobs
            .ok_or_else(|| Error::Config("pipeline has no blob store".to_string()))?;

        self.schema.validate(&self.functions)?;
        debug!(functions = ?self.functions.names(), "Schema validated");

        let regulators = Regulators::new(
            vault,
            blobs,
            Arc::new(self.functions),
            Arc::new(self.resolver_config),
        );
        info!(
            candidate_workers = self.config.candidate_workers(),
            edge_workers = self.config.edge_workers(),
            queue_capacity = self.config.queue_capacity(),
            "Resolution pipeline ready"
        );
        Ok(ResolutionPipeline {
            schema: Arc::new(self.schema),
            regulators,
            finder,
            ledger,
            config: self.config,
        })
    }
}

/// Write a job's output: the source vertex once, then each triple as a
/// cluster.
pub async fn publish(
    writer: &dyn GraphWriter,
    source_vertex: &VertexData,
    triples: &[ResolvedTriple],
) -> Result<()> {
    writer.write_vertex(source_vertex).await?;
    for triple in triples {
        writer.write_cluster(triple).await?;
    }
    info!(
        internal_id = %source_vertex.internal_id,
        cluster_count = triples.len(),
        "Published resolution results"
    );
    Ok(())
}
