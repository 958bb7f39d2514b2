//! Object regulator: raw extracted data to schema-typed vertices.

use graphmill_core::{
    derive_id_value, derive_identifier_stem, derive_internal_id, normalize, GraphObject,
    NormalizedProperties, PropertySchema, Result, VertexData, VertexEntry,
};
use serde_json::{Map, Value as JsonValue};
use tracing::debug;

use crate::tiers::StorageTiers;

/// Normalize every declared property from a raw map.
pub fn normalize_properties<'a>(
    schemas: impl IntoIterator<Item = &'a PropertySchema>,
    raw: &Map<String, JsonValue>,
) -> Result<NormalizedProperties> {
    schemas
        .into_iter()
        .map(|schema| {
            let value = normalize(&schema.name, schema.data_type, raw.get(&schema.name))?;
            Ok((schema.name.clone(), value))
        })
        .collect()
}

/// Builds vertices from raw property maps.
#[derive(Clone)]
pub struct ObjectRegulator {
    tiers: StorageTiers,
}

impl ObjectRegulator {
    pub fn new(tiers: StorageTiers) -> Self {
        Self { tiers }
    }

    pub fn tiers(&self) -> &StorageTiers {
        &self.tiers
    }

    /// Build a candidate vertex. An identity that cannot be derived yet is
    /// left pending.
    pub async fn create_entity(
        &self,
        entry: &VertexEntry,
        raw: &Map<String, JsonValue>,
    ) -> Result<VertexData> {
        self.build(entry, raw, false).await
    }

    /// Build a vertex whose identity must be derivable (the source vertex).
    pub async fn create_known_entity(
        &self,
        entry: &VertexEntry,
        raw: &Map<String, JsonValue>,
    ) -> Result<VertexData> {
        self.build(entry, raw, true).await
    }

    async fn build(
        &self,
        entry: &VertexEntry,
        raw: &Map<String, JsonValue>,
        known: bool,
    ) -> Result<VertexData> {
        let properties = normalize_properties(&entry.properties, raw)?;
        let internal_id = derive_internal_id(entry, &properties, known)?;
        let identifier_stem = derive_identifier_stem(entry, &properties, raw);
        let id_value = derive_id_value(entry, &properties);

        let schemas: Vec<&PropertySchema> = entry.properties.iter().collect();
        let buckets = self
            .tiers
            .partition(&internal_id.to_string(), &schemas, &properties)
            .await?;

        let mut vertex = GraphObject {
            object_type: entry.vertex_name.clone(),
            internal_id,
            identifier_stem,
            id_value,
            local_properties: Vec::new(),
            sensitive_properties: Vec::new(),
            stored_properties: Vec::new(),
            missing_properties: Vec::new(),
        };
        buckets.fill(&mut vertex);

        debug!(
            object_type = %vertex.object_type,
            internal_id = %vertex.internal_id,
            missing = vertex.missing_properties.len(),
            "Created entity"
        );
        Ok(vertex)
    }
}
