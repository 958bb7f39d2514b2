//! graphmill: resolve extracted records into graph triples.
//!
//! # Environment
//!
//! | Variable | Effect |
//! |----------|--------|
//! | `GRAPHMILL_GRAPH_ENDPOINT` | GraphQL endpoint for dedup and publishing (in-memory index if unset) |
//! | `DATABASE_URL` | PostgreSQL vault and progress ledger (in-memory if unset) |
//! | `GRAPHMILL_BLOB_ROOT` | Root directory of the oversized-value store |
//! | `GRAPHMILL_STORAGE_<NAME>` | Bucket of the named storage location `<name>` |
//! | `LOG_FORMAT` | `json` for JSON log lines, anything else for text |
//! | `RUST_LOG` | Log filter (default `info`) |

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use graphmill_core::{
    defaults, BlobStore, ExtractedRecord, GraphWriter, ProgressLedger, ResolverConfig, Schema,
    SensitiveVault, VertexFinder,
};
use graphmill_gql::GqlClient;
use graphmill_jobs::{publish, PipelineConfig, ResolutionPipeline};
use graphmill_regulators::FunctionRegistry;
use graphmill_store::{
    connect, FilesystemBlobStore, InMemoryProgressLedger, InMemoryVault, InMemoryVertexIndex,
    PgProgressLedger, PgSensitiveVault, PoolConfig,
};
use serde_json::json;
use tokio::io::AsyncReadExt;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "graphmill")]
#[command(author, version, about = "Schema-driven entity resolution into a property graph")]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve one extracted record and print the resulting triples
    Resolve {
        /// Schema document (JSON)
        #[arg(short, long)]
        schema: PathBuf,

        /// Extracted record (JSON file, or `-` for stdin)
        #[arg(short, long)]
        record: String,

        /// Write the source vertex and every triple through the graph writer
        #[arg(long)]
        publish: bool,

        /// Candidate workers (overrides GRAPHMILL_CANDIDATE_WORKERS)
        #[arg(long)]
        candidate_workers: Option<usize>,

        /// Edge workers (overrides GRAPHMILL_EDGE_WORKERS)
        #[arg(long)]
        edge_workers: Option<usize>,

        /// Root directory of the oversized-value store
        #[arg(long, env = "GRAPHMILL_BLOB_ROOT", default_value = defaults::BLOB_ROOT)]
        blob_root: PathBuf,
    },

    /// Check a schema document and its function references
    Validate {
        /// Schema document (JSON)
        #[arg(short, long)]
        schema: PathBuf,
    },

    /// Show the recorded stages of a job (requires DATABASE_URL)
    Progress {
        /// Record identifier
        #[arg(short, long)]
        identifier: String,

        /// Record id value
        #[arg(long)]
        id_value: String,
    },
}

/// Dedup index and graph writer backed by the same service.
struct GraphBackend {
    finder: Arc<dyn VertexFinder>,
    writer: Arc<dyn GraphWriter>,
}

impl GraphBackend {
    fn from_env() -> Self {
        match GqlClient::from_env() {
            Some(client) => {
                info!(endpoint = client.endpoint(), "Using GraphQL graph endpoint");
                let client = Arc::new(client);
                Self {
                    finder: client.clone(),
                    writer: client,
                }
            }
            None => {
                warn!("GRAPHMILL_GRAPH_ENDPOINT not set; using an empty in-memory index");
                let index = Arc::new(InMemoryVertexIndex::new());
                Self {
                    finder: index.clone(),
                    writer: index,
                }
            }
        }
    }
}

/// Vault and ledger, in PostgreSQL when configured.
async fn durable_stores() -> anyhow::Result<(Arc<dyn SensitiveVault>, Arc<dyn ProgressLedger>)> {
    match std::env::var("DATABASE_URL").ok().filter(|url| !url.is_empty()) {
        Some(url) => {
            let pool = connect(&url, PoolConfig::from_env())
                .await
                .context("connecting to DATABASE_URL")?;
            Ok((
                Arc::new(PgSensitiveVault::new(pool.clone())),
                Arc::new(PgProgressLedger::new(pool)),
            ))
        }
        None => {
            warn!("DATABASE_URL not set; vault and progress ledger are in-memory");
            Ok((
                Arc::new(InMemoryVault::new()),
                Arc::new(InMemoryProgressLedger::new()),
            ))
        }
    }
}

async fn load_schema(path: &Path) -> anyhow::Result<Schema> {
    let document = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("reading schema {}", path.display()))?;
    Ok(Schema::from_json(&document)?)
}

async fn load_record(source: &str) -> anyhow::Result<ExtractedRecord> {
    let document = if source == "-" {
        let mut buf = String::new();
        tokio::io::stdin()
            .read_to_string(&mut buf)
            .await
            .context("reading record from stdin")?;
        buf
    } else {
        tokio::fs::read_to_string(source)
            .await
            .with_context(|| format!("reading record {}", source))?
    };
    Ok(ExtractedRecord::from_json(&document)?)
}

fn pipeline_config(candidate_workers: Option<usize>, edge_workers: Option<usize>) -> PipelineConfig {
    let mut config = PipelineConfig::from_env();
    if let Some(n) = candidate_workers {
        config = config.with_candidate_workers(n);
    }
    if let Some(n) = edge_workers {
        config = config.with_edge_workers(n);
    }
    config
}

async fn cmd_resolve(
    schema: &Path,
    record: &str,
    publish_results: bool,
    config: PipelineConfig,
    blob_root: PathBuf,
) -> anyhow::Result<()> {
    let schema = load_schema(schema).await?;
    let record = load_record(record).await?;

    let backend = GraphBackend::from_env();
    let (vault, ledger) = durable_stores().await?;
    let blobs: Arc<dyn BlobStore> = Arc::new(FilesystemBlobStore::new(blob_root));

    let pipeline = ResolutionPipeline::builder(schema)
        .with_config(config)
        .with_resolver_config(ResolverConfig::from_env())
        .with_finder(backend.finder)
        .with_ledger(ledger)
        .with_vault(vault)
        .with_blob_store(blobs)
        .build()?;

    let mut job = pipeline.job(record);
    let triples = job.work().await?;
    let source_vertex = job
        .source_vertex()
        .context("job completed without a source vertex")?;

    if publish_results {
        publish(backend.writer.as_ref(), source_vertex, &triples).await?;
    }

    let output = json!({
        "source_vertex": source_vertex,
        "triples": triples,
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

async fn cmd_validate(schema: &Path) -> anyhow::Result<()> {
    let schema = load_schema(schema).await?;
    schema.validate(&FunctionRegistry::with_builtins())?;
    let output = json!({
        "vertexes": schema.vertexes().iter().map(|v| &v.vertex_name).collect::<Vec<_>>(),
        "edges": schema.edges().iter().map(|e| &e.edge_label).collect::<Vec<_>>(),
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

async fn cmd_progress(identifier: &str, id_value: &str) -> anyhow::Result<()> {
    if std::env::var("DATABASE_URL").map_or(true, |url| url.is_empty()) {
        bail!("progress lookup needs DATABASE_URL");
    }
    let (_, ledger) = durable_stores().await?;
    match ledger.get_progress(identifier, id_value).await? {
        Some(progress) => println!("{}", serde_json::to_string_pretty(&progress)?),
        None => bail!("no progress recorded for {} / {}", identifier, id_value),
    }
    Ok(())
}

fn init_logging() {
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info".into());
    let registry = tracing_subscriber::registry().with(env_filter);

    // Logs go to stderr; stdout carries the JSON output.
    if log_format == "json" {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Resolve {
            schema,
            record,
            publish,
            candidate_workers,
            edge_workers,
            blob_root,
        } => {
            let config = pipeline_config(candidate_workers, edge_workers);
            cmd_resolve(&schema, &record, publish, config, blob_root).await
        }
        Commands::Validate { schema } => cmd_validate(&schema).await,
        Commands::Progress {
            identifier,
            id_value,
        } => cmd_progress(&identifier, &id_value).await,
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    init_logging();
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "graphmill failed");
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
