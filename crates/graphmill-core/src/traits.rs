//! Collaborator traits.
//!
//! The pipeline talks to the outside world only through these interfaces:
//! the dedup index, the sensitive vault, the oversized-value store, the graph
//! writer and the progress ledger.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::defaults;
use crate::error::{Error, Result};
use crate::graph::{LocalProperty, ResolvedTriple, VertexData};
use crate::identity::IdentifierStem;
use crate::progress::JobProgress;
use crate::values::TypedPayload;

// =============================================================================
// DEDUP / SEARCH
// =============================================================================

/// Lookup for existing vertices matching a candidate.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DedupQuery {
    pub object_type: String,
    /// Set when the candidate's stem is derived; narrows the lookup to it.
    pub identifier_stem: Option<IdentifierStem>,
    pub local_properties: Vec<LocalProperty>,
}

impl DedupQuery {
    pub fn for_candidate(candidate: &VertexData) -> Self {
        Self {
            object_type: candidate.object_type.clone(),
            identifier_stem: candidate.identifier_stem.as_derived().cloned(),
            local_properties: candidate.local_properties.clone(),
        }
    }
}

/// One page of dedup results.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CandidatePage {
    pub vertexes: Vec<VertexData>,
    /// Continuation token; `None` when exhausted.
    pub token: Option<String>,
}

/// Dedup/search collaborator.
#[async_trait]
pub trait VertexFinder: Send + Sync {
    /// Fetch one page of matches.
    async fn find_page(&self, query: &DedupQuery, token: Option<&str>) -> Result<CandidatePage>;

    /// All matches, following continuation tokens until exhausted.
    async fn find_candidates(&self, query: &DedupQuery) -> Result<Vec<VertexData>> {
        let mut found = Vec::new();
        let mut token: Option<String> = None;
        for _ in 0..defaults::SEARCH_MAX_PAGES {
            let page = self.find_page(query, token.as_deref()).await?;
            found.extend(page.vertexes);
            match page.token {
                Some(next) if !next.is_empty() => token = Some(next),
                _ => return Ok(found),
            }
        }
        Err(Error::Search(format!(
            "dedup lookup for {} exceeded {} pages",
            query.object_type,
            defaults::SEARCH_MAX_PAGES
        )))
    }
}

// =============================================================================
// STORAGE TIERS
// =============================================================================

/// Restricted store for sensitive values.
#[async_trait]
pub trait SensitiveVault: Send + Sync {
    /// Store a value and return its pointer. Storing an existing
    /// `(source_internal_id, property_name)` pair keeps the first value and
    /// returns the same pointer.
    async fn store(
        &self,
        source_internal_id: &str,
        property_name: &str,
        value: &TypedPayload,
    ) -> Result<String>;

    async fn retrieve(&self, pointer: &str) -> Result<TypedPayload>;
}

/// Computed location of a stored-tier value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobLocation {
    pub storage_class: String,
    pub bucket: String,
    pub key: String,
}

impl BlobLocation {
    /// Location of a property value: `<property>/<source id>_<property>.json`.
    pub fn for_property(
        storage_class: &str,
        bucket: &str,
        property_name: &str,
        source_internal_id: &str,
    ) -> Self {
        Self {
            storage_class: storage_class.to_string(),
            bucket: bucket.to_string(),
            key: format!(
                "{}/{}_{}.json",
                property_name, source_internal_id, property_name
            ),
        }
    }

    /// `<storage_class>://<bucket>/<key>`
    pub fn locator(&self) -> String {
        format!("{}://{}/{}", self.storage_class, self.bucket, self.key)
    }

    /// Parse a locator back into its parts.
    pub fn parse(locator: &str) -> Result<Self> {
        let invalid = || Error::StorageTier(format!("invalid storage locator: {}", locator));
        let (storage_class, rest) = locator.split_once("://").ok_or_else(invalid)?;
        let (bucket, key) = rest.split_once('/').ok_or_else(invalid)?;
        if storage_class.is_empty() || bucket.is_empty() || key.is_empty() {
            return Err(invalid());
        }
        Ok(Self {
            storage_class: storage_class.to_string(),
            bucket: bucket.to_string(),
            key: key.to_string(),
        })
    }
}

/// Bulk store for oversized values.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store a value and return its locator. An object already at the
    /// location is left untouched and its locator returned.
    async fn store(&self, location: &BlobLocation, value: &TypedPayload) -> Result<String>;

    async fn retrieve(&self, locator: &str) -> Result<TypedPayload>;
}

// =============================================================================
// GRAPH WRITER
// =============================================================================

/// Writes resolved objects to the graph.
#[async_trait]
pub trait GraphWriter: Send + Sync {
    async fn write_vertex(&self, vertex: &VertexData) -> Result<()>;

    /// Write both vertices and the edge between them.
    async fn write_cluster(&self, triple: &ResolvedTriple) -> Result<()>;
}

// =============================================================================
// PROGRESS LEDGER
// =============================================================================

/// Per-stage completion record keyed by `(identifier, id_value)`.
#[async_trait]
pub trait ProgressLedger: Send + Sync {
    /// Record a stage as completed. Writing the same stage again replaces the
    /// previous payload and timestamp.
    async fn mark_stage_completed(
        &self,
        identifier: &str,
        id_value: &str,
        stage_name: &str,
        payload: JsonValue,
    ) -> Result<()>;

    async fn get_progress(&self, identifier: &str, id_value: &str) -> Result<Option<JobProgress>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_blob_location() {
        let loc = BlobLocation::for_property("s3", "notes-bucket", "notes", "abc123");
        assert_eq!(loc.key, "notes/abc123_notes.json");
        assert_eq!(loc.locator(), "s3://notes-bucket/notes/abc123_notes.json");
        assert_eq!(BlobLocation::parse(&loc.locator()).unwrap(), loc);
    }

    #[test]
    fn test_blob_location_parse_rejects_garbage() {
        assert!(BlobLocation::parse("notes/abc.json").is_err());
        assert!(BlobLocation::parse("s3://bucket").is_err());
        assert!(BlobLocation::parse("://bucket/key").is_err());
    }

    struct PagedFinder {
        calls: AtomicUsize,
    }

    fn vertex(n: usize) -> VertexData {
        serde_json::from_value(serde_json::json!({
            "object_type": "Encounter",
            "internal_id": format!("id{}", n),
            "identifier_stem": "#vertex#Encounter#ICFS#",
            "id_value": {"data_type": "N", "property_value": n.to_string()},
        }))
        .unwrap()
    }

    #[async_trait]
    impl VertexFinder for PagedFinder {
        async fn find_page(&self, _query: &DedupQuery, token: Option<&str>) -> Result<CandidatePage> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(match token {
                None => CandidatePage {
                    vertexes: vec![vertex(1), vertex(2)],
                    token: Some("page2".to_string()),
                },
                Some("page2") => CandidatePage {
                    vertexes: vec![vertex(3)],
                    token: None,
                },
                Some(other) => panic!("unexpected token {}", other),
            })
        }
    }

    #[tokio::test]
    async fn test_find_candidates_follows_tokens() {
        let finder = PagedFinder {
            calls: AtomicUsize::new(0),
        };
        let query = DedupQuery {
            object_type: "Encounter".to_string(),
            identifier_stem: None,
            local_properties: Vec::new(),
        };
        let found = finder.find_candidates(&query).await.unwrap();
        assert_eq!(found.len(), 3);
        assert_eq!(finder.calls.load(Ordering::SeqCst), 2);
    }
}
