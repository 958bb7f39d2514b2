//! Edge regulator: a schema-validated edge between two resolved vertices.

use std::sync::Arc;

use graphmill_core::identity::key_fragment;
use graphmill_core::{
    internal_id_digest, EdgeData, EdgeEntry, EdgePropertySource, Error, ExtractedRecord,
    GraphObject, IdValue, InternalId, NormalizedProperties, PropertySchema, PropertyValue, Result,
    SchemaEntry, VertexData,
};
use serde_json::{Map, Value as JsonValue};
use tracing::debug;

use crate::extraction::distinct_value;
use crate::functions::{FunctionContext, FunctionRegistry};
use crate::object::normalize_properties;
use crate::tiers::StorageTiers;

/// The two endpoints of an edge after applying direction.
struct Endpoints<'a> {
    from: &'a VertexData,
    to: &'a VertexData,
}

impl<'a> Endpoints<'a> {
    fn new(source: &'a VertexData, candidate: &'a VertexData, inbound: bool) -> Self {
        if inbound {
            Self {
                from: candidate,
                to: source,
            }
        } else {
            Self {
                from: source,
                to: candidate,
            }
        }
    }
}

/// Builds edges between a source vertex and a resolved candidate.
#[derive(Clone)]
pub struct EdgeRegulator {
    tiers: StorageTiers,
    functions: Arc<FunctionRegistry>,
}

impl EdgeRegulator {
    pub fn new(tiers: StorageTiers, functions: Arc<FunctionRegistry>) -> Self {
        Self { tiers, functions }
    }

    /// Build an edge. Every edge property must resolve.
    pub async fn build_edge(
        &self,
        entry: &EdgeEntry,
        source_vertex: &VertexData,
        candidate: &VertexData,
        record: &ExtractedRecord,
        inbound: bool,
    ) -> Result<EdgeData> {
        self.build(entry, source_vertex, candidate, record, inbound, false)
            .await
    }

    /// Build an edge to a stub. Unresolvable properties become null.
    pub async fn build_stub_edge(
        &self,
        entry: &EdgeEntry,
        source_vertex: &VertexData,
        candidate: &VertexData,
        record: &ExtractedRecord,
        inbound: bool,
    ) -> Result<EdgeData> {
        self.build(entry, source_vertex, candidate, record, inbound, true)
            .await
    }

    async fn build(
        &self,
        entry: &EdgeEntry,
        source_vertex: &VertexData,
        candidate: &VertexData,
        record: &ExtractedRecord,
        inbound: bool,
        for_stub: bool,
    ) -> Result<EdgeData> {
        let ends = Endpoints::new(source_vertex, candidate, inbound);
        validate_endpoints(entry, &ends)?;

        let mut raw = Map::new();
        for property in &entry.properties {
            let name = &property.property.name;
            let value = self
                .resolve_property(
                    entry,
                    name,
                    &property.source,
                    &ends,
                    source_vertex,
                    candidate,
                    record,
                    inbound,
                )
                .await?;
            match value {
                Some(value) => {
                    raw.insert(name.clone(), value);
                }
                None if for_stub => {
                    raw.insert(name.clone(), JsonValue::Null);
                }
                None => {
                    return Err(Error::MissingEdgeProperty {
                        edge_type: entry.edge_label.clone(),
                        property_name: name.clone(),
                        reason: format!("{:?} yielded no value", property.source),
                    })
                }
            }
        }
        let properties = normalize_properties(entry.property_schemas(), &raw)?;

        let internal_id = self.derive_internal_id(entry, &ends, &properties).await?;
        let schemas: Vec<&PropertySchema> = entry.property_schemas().collect();
        let buckets = self
            .tiers
            .partition(&internal_id, &schemas, &properties)
            .await?;

        let mut object = GraphObject {
            object_type: entry.edge_label.clone(),
            internal_id: InternalId::Derived(internal_id.clone()),
            identifier_stem: EdgeData::stem_for(&entry.edge_label),
            id_value: IdValue::Set(PropertyValue::String(internal_id)),
            local_properties: Vec::new(),
            sensitive_properties: Vec::new(),
            stored_properties: Vec::new(),
            missing_properties: Vec::new(),
        };
        buckets.fill(&mut object);

        let edge = EdgeData {
            object,
            source_vertex_internal_id: ends.from.internal_id.clone(),
            target_vertex_internal_id: ends.to.internal_id.clone(),
        };
        debug!(
            edge_type = %entry.edge_label,
            internal_id = %edge.internal_id,
            inbound,
            for_stub,
            "Built edge"
        );
        Ok(edge)
    }

    #[allow(clippy::too_many_arguments)]
    async fn resolve_property(
        &self,
        entry: &EdgeEntry,
        name: &str,
        source: &EdgePropertySource,
        ends: &Endpoints<'_>,
        source_vertex: &VertexData,
        candidate: &VertexData,
        record: &ExtractedRecord,
        inbound: bool,
    ) -> Result<Option<JsonValue>> {
        match source {
            EdgePropertySource::SourceVertex {
                vertex_property_name,
            } => Ok(self
                .tiers
                .held_value(ends.from, vertex_property_name)
                .await?
                .to_json()),
            EdgePropertySource::TargetVertex {
                vertex_property_name,
            } => Ok(self
                .tiers
                .held_value(ends.to, vertex_property_name)
                .await?
                .to_json()),
            EdgePropertySource::Extraction {
                extraction_name, ..
            } if !record.has_extraction(extraction_name) => Err(Error::UnknownExtraction {
                extraction_name: extraction_name.clone(),
            }),
            EdgePropertySource::Extraction {
                extraction_name,
                extracted_property,
            } => distinct_value(
                record,
                extraction_name,
                extracted_property.as_deref().unwrap_or(name),
            ),
            EdgePropertySource::Function { function_name } => {
                let ctx = FunctionContext {
                    source_vertex,
                    target_vertex: Some(candidate),
                    record,
                    entry: SchemaEntry::Edge(entry),
                    inbound,
                };
                self.functions.call(function_name, &ctx)
            }
        }
    }

    /// Digest of the path-qualified `internal_id_key`.
    async fn derive_internal_id(
        &self,
        entry: &EdgeEntry,
        ends: &Endpoints<'_>,
        properties: &NormalizedProperties,
    ) -> Result<String> {
        let mut key = String::new();
        for field in &entry.internal_id_key {
            let fragment = if let Some(name) = field.strip_prefix("from.") {
                key_fragment(&self.tiers.held_value(ends.from, name).await?)
            } else if let Some(name) = field.strip_prefix("to.") {
                key_fragment(&self.tiers.held_value(ends.to, name).await?)
            } else if let Some(name) = field.strip_prefix("schema.") {
                entry
                    .schema_field(name)
                    .ok_or_else(|| {
                        Error::InvalidSchema(format!(
                            "edge {} has no schema field {}",
                            entry.edge_label, name
                        ))
                    })?
                    .to_string()
            } else {
                let value = properties.get(field).ok_or_else(|| {
                    Error::InvalidSchema(format!(
                        "internal_id_key of {} names unknown field {}",
                        entry.edge_label, field
                    ))
                })?;
                key_fragment(value)
            };
            key.push_str(&fragment);
        }
        Ok(internal_id_digest(&key))
    }
}

fn validate_endpoints(entry: &EdgeEntry, ends: &Endpoints<'_>) -> Result<()> {
    if entry.from_types.accepts(&ends.from.object_type) && entry.to_types.accepts(&ends.to.object_type) {
        return Ok(());
    }
    Err(Error::EdgeConstraintViolation {
        edge_type: entry.edge_label.clone(),
        from_type: ends.from.object_type.clone(),
        to_type: ends.to.object_type.clone(),
        accepted_from: entry.from_types.listed(),
        accepted_to: entry.to_types.listed(),
    })
}
