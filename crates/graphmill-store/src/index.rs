//! In-memory vertex index: dedup lookups and graph writes against a map of
//! materialized objects.

use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use graphmill_core::{
    CandidatePage, DedupQuery, EdgeData, Error, GraphWriter, ResolvedTriple, Result, VertexData,
    VertexFinder,
};

/// Default number of vertices per dedup page.
pub const DEFAULT_PAGE_SIZE: usize = 50;

#[derive(Debug, Default)]
struct Contents {
    vertexes: BTreeMap<String, VertexData>,
    edges: BTreeMap<String, EdgeData>,
}

/// Graph held in memory. Objects are keyed by internal id, so writing the
/// same object twice keeps one copy.
#[derive(Debug)]
pub struct InMemoryVertexIndex {
    contents: RwLock<Contents>,
    page_size: usize,
}

impl Default for InMemoryVertexIndex {
    fn default() -> Self {
        Self {
            contents: RwLock::new(Contents::default()),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl InMemoryVertexIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub async fn vertex_count(&self) -> usize {
        self.contents.read().await.vertexes.len()
    }

    pub async fn edge_count(&self) -> usize {
        self.contents.read().await.edges.len()
    }

    pub async fn vertex(&self, internal_id: &str) -> Option<VertexData> {
        self.contents.read().await.vertexes.get(internal_id).cloned()
    }

    pub async fn edges(&self) -> Vec<EdgeData> {
        self.contents.read().await.edges.values().cloned().collect()
    }
}

fn key_of(vertex: &VertexData) -> Result<String> {
    vertex
        .internal_id
        .as_derived()
        .map(str::to_string)
        .ok_or_else(|| {
            Error::InvalidRecord(format!(
                "cannot graph {} without a derived internal id",
                vertex
            ))
        })
}

/// Whether a stored vertex satisfies a dedup query. Null query values do not
/// constrain the match.
fn matches(query: &DedupQuery, vertex: &VertexData) -> bool {
    if vertex.object_type != query.object_type {
        return false;
    }
    if let Some(stem) = &query.identifier_stem {
        if vertex.identifier_stem.as_derived() != Some(stem) {
            return false;
        }
    }
    query.local_properties.iter().all(|wanted| match &wanted.value {
        None => true,
        Some(value) => vertex
            .local_properties
            .iter()
            .any(|p| p.name == wanted.name && p.value.as_ref() == Some(value)),
    })
}

#[async_trait]
impl VertexFinder for InMemoryVertexIndex {
    async fn find_page(&self, query: &DedupQuery, token: Option<&str>) -> Result<CandidatePage> {
        let offset = match token {
            Some(token) => token
                .parse::<usize>()
                .map_err(|_| Error::Search(format!("invalid page token {}", token)))?,
            None => 0,
        };
        let contents = self.contents.read().await;
        let matching: Vec<&VertexData> = contents
            .vertexes
            .values()
            .filter(|v| matches(query, v))
            .collect();
        let end = (offset + self.page_size).min(matching.len());
        let vertexes = matching
            .get(offset..end)
            .unwrap_or_default()
            .iter()
            .map(|v| (*v).clone())
            .collect();
        let token = (end < matching.len()).then(|| end.to_string());
        Ok(CandidatePage { vertexes, token })
    }
}

#[async_trait]
impl GraphWriter for InMemoryVertexIndex {
    async fn write_vertex(&self, vertex: &VertexData) -> Result<()> {
        let key = key_of(vertex)?;
        self.contents.write().await.vertexes.insert(key, vertex.clone());
        debug!(object_type = %vertex.object_type, internal_id = %vertex.internal_id, "Graphed vertex");
        Ok(())
    }

    async fn write_cluster(&self, triple: &ResolvedTriple) -> Result<()> {
        let source_key = key_of(&triple.source_vertex)?;
        let other_key = key_of(&triple.other_vertex)?;
        let edge_key = key_of(&triple.edge.object)?;
        let mut contents = self.contents.write().await;
        contents
            .vertexes
            .insert(source_key, triple.source_vertex.clone());
        contents
            .vertexes
            .insert(other_key, triple.other_vertex.clone());
        contents.edges.insert(edge_key, triple.edge.clone());
        debug!(edge_type = %triple.edge.edge_label(), internal_id = %triple.edge.internal_id, "Graphed cluster");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use graphmill_core::{
        DataType, IdValue, IdentifierStem, InternalId, LocalProperty, PropertyValue, StemState,
    };

    fn vertex(id: &str, clinic: &str) -> VertexData {
        VertexData {
            object_type: "Encounter".to_string(),
            internal_id: InternalId::Derived(id.to_string()),
            identifier_stem: StemState::Derived(IdentifierStem::vertex(
                "Encounter",
                vec!["ICFS".to_string()],
            )),
            id_value: IdValue::Pending("encounter_id".to_string()),
            local_properties: vec![LocalProperty {
                name: "clinic".to_string(),
                data_type: DataType::String,
                value: Some(PropertyValue::String(clinic.to_string())),
            }],
            sensitive_properties: Vec::new(),
            stored_properties: Vec::new(),
            missing_properties: Vec::new(),
        }
    }

    fn query(clinic: Option<&str>) -> DedupQuery {
        DedupQuery {
            object_type: "Encounter".to_string(),
            identifier_stem: None,
            local_properties: vec![LocalProperty {
                name: "clinic".to_string(),
                data_type: DataType::String,
                value: clinic.map(|c| PropertyValue::String(c.to_string())),
            }],
        }
    }

    #[tokio::test]
    async fn test_matches_on_local_properties() {
        let index = InMemoryVertexIndex::new();
        index.write_vertex(&vertex("a", "north")).await.unwrap();
        index.write_vertex(&vertex("b", "south")).await.unwrap();

        let found = index.find_candidates(&query(Some("north"))).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].internal_id.to_string(), "a");

        let all = index.find_candidates(&query(None)).await.unwrap();
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn test_pages_follow_tokens() {
        let index = InMemoryVertexIndex::new().with_page_size(2);
        for id in ["a", "b", "c", "d", "e"] {
            index.write_vertex(&vertex(id, "north")).await.unwrap();
        }
        let first = index.find_page(&query(Some("north")), None).await.unwrap();
        assert_eq!(first.vertexes.len(), 2);
        assert_eq!(first.token.as_deref(), Some("2"));

        let found = index.find_candidates(&query(Some("north"))).await.unwrap();
        assert_eq!(found.len(), 5);
    }

    #[tokio::test]
    async fn test_stem_narrows_lookup() {
        let index = InMemoryVertexIndex::new();
        index.write_vertex(&vertex("a", "north")).await.unwrap();
        let mut q = query(None);
        q.identifier_stem = Some(IdentifierStem::vertex("Encounter", vec!["OTHER".to_string()]));
        assert!(index.find_candidates(&q).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_pending_vertex_rejected() {
        let index = InMemoryVertexIndex::new();
        let mut v = vertex("a", "north");
        v.internal_id = InternalId::Pending(vec!["encounter_id".to_string()]);
        assert!(index.write_vertex(&v).await.is_err());
        assert_eq!(index.vertex_count().await, 0);
    }
}
