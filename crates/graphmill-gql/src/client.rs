//! GraphQL client for the graph endpoint.
//!
//! # Configuration
//!
//! - `GRAPHMILL_GRAPH_ENDPOINT`: GraphQL URL. Unset or empty disables the client.
//! - `GRAPHMILL_GRAPH_TIMEOUT_SECS`: request timeout (default: 30)

use std::time::Duration;

use async_trait::async_trait;
use graphmill_core::{
    defaults, CandidatePage, DedupQuery, Error, GraphWriter, ResolvedTriple, Result, VertexData,
    VertexFinder,
};
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};
use tracing::{debug, trace};

use crate::queries;

/// Environment variable naming the GraphQL endpoint.
pub const ENV_GRAPH_ENDPOINT: &str = "GRAPHMILL_GRAPH_ENDPOINT";

/// Environment variable overriding the request timeout.
pub const ENV_GRAPH_TIMEOUT_SECS: &str = "GRAPHMILL_GRAPH_TIMEOUT_SECS";

#[derive(Debug, Deserialize)]
struct GqlError {
    message: String,
}

#[derive(Debug, Deserialize)]
struct GqlResponse {
    #[serde(default)]
    data: Option<JsonValue>,
    #[serde(default)]
    errors: Option<Vec<GqlError>>,
}

/// Dedup index and graph writer over GraphQL.
#[derive(Debug, Clone)]
pub struct GqlClient {
    endpoint: String,
    client: reqwest::Client,
    timeout_secs: u64,
}

impl GqlClient {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            client: reqwest::Client::new(),
            timeout_secs: defaults::GRAPH_REQUEST_TIMEOUT_SECS,
        }
    }

    /// Create from environment variables. Returns `None` when no endpoint
    /// is configured.
    pub fn from_env() -> Option<Self> {
        let endpoint = std::env::var(ENV_GRAPH_ENDPOINT).unwrap_or_default();
        if endpoint.is_empty() {
            return None;
        }
        let client = Self::new(endpoint);
        match std::env::var(ENV_GRAPH_TIMEOUT_SECS)
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
        {
            Some(secs) => Some(client.with_timeout(secs)),
            None => Some(client),
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs.max(1);
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Run one operation and return the named field of `data`.
    async fn execute(&self, query: &str, variables: JsonValue, field: &str) -> Result<JsonValue> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&json!({"query": query, "variables": variables}))
            .timeout(Duration::from_secs(self.timeout_secs))
            .send()
            .await
            .map_err(|e| Error::Request(format!("graph request {} failed: {}", field, e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Request(format!(
                "graph endpoint returned {} for {}: {}",
                status, field, body
            )));
        }

        let body: GqlResponse = response.json().await.map_err(|e| {
            Error::Request(format!("unreadable graph response for {}: {}", field, e))
        })?;
        if let Some(errors) = body.errors.filter(|e| !e.is_empty()) {
            let messages: Vec<String> = errors.into_iter().map(|e| e.message).collect();
            return Err(Error::Request(format!(
                "graph endpoint rejected {}: {}",
                field,
                messages.join("; ")
            )));
        }
        body.data
            .and_then(|mut data| data.get_mut(field).map(JsonValue::take))
            .ok_or_else(|| Error::Request(format!("graph response has no {} field", field)))
    }
}

#[async_trait]
impl VertexFinder for GqlClient {
    async fn find_page(&self, query: &DedupQuery, token: Option<&str>) -> Result<CandidatePage> {
        let object_properties = serde_json::to_value(&query.local_properties)?;
        let (document, field, variables) = match &query.identifier_stem {
            Some(stem) => (
                queries::list_vertexes(),
                "list_vertexes",
                json!({
                    "object_type": query.object_type,
                    "identifier_stem": stem.to_string(),
                    "object_properties": object_properties,
                    "token": token,
                }),
            ),
            None => (
                queries::find_vertexes(),
                "find_vertexes",
                json!({
                    "object_type": query.object_type,
                    "object_properties": object_properties,
                    "token": token,
                }),
            ),
        };
        trace!(object_type = %query.object_type, field, token, "Dedup page request");

        let page = self.execute(&document, variables, field).await?;
        let page: CandidatePage = serde_json::from_value(page).map_err(|e| {
            Error::Search(format!(
                "malformed {} page for {}: {}",
                field, query.object_type, e
            ))
        })?;
        debug!(
            object_type = %query.object_type,
            result_count = page.vertexes.len(),
            more = page.token.is_some(),
            "Dedup page received"
        );
        Ok(page)
    }
}

#[async_trait]
impl GraphWriter for GqlClient {
    async fn write_vertex(&self, vertex: &VertexData) -> Result<()> {
        let variables = json!({ "vertex": serde_json::to_value(vertex)? });
        self.execute(queries::GRAPH_VERTEX, variables, "graph_vertex")
            .await?;
        debug!(object_type = %vertex.object_type, internal_id = %vertex.internal_id, "Published vertex");
        Ok(())
    }

    async fn write_cluster(&self, triple: &ResolvedTriple) -> Result<()> {
        let variables = json!({
            "source_vertex": serde_json::to_value(&triple.source_vertex)?,
            "potential_vertex": serde_json::to_value(&triple.other_vertex)?,
            "edge": serde_json::to_value(&triple.edge)?,
        });
        self.execute(queries::GRAPH_CLUSTER, variables, "graph_cluster")
            .await?;
        debug!(
            edge_type = %triple.edge.edge_label(),
            internal_id = %triple.edge.internal_id,
            "Published cluster"
        );
        Ok(())
    }
}
