//! Rule arbiter: linking rules to candidate vertices.

use std::collections::HashMap;
use std::sync::Arc;

use graphmill_core::{
    ExtractedRecord, Result, RuleEntry, Schema, SchemaEntry, SpecifierSource, VertexData,
    VertexEntry,
};
use serde_json::{Map, Value as JsonValue};
use tracing::{debug, trace};

use crate::extraction::distinct_value;
use crate::functions::{FunctionContext, FunctionRegistry};
use crate::object::ObjectRegulator;

/// Interprets a vertex's linking rules against an extracted record.
#[derive(Clone)]
pub struct RuleArbiter {
    objects: ObjectRegulator,
    functions: Arc<FunctionRegistry>,
}

impl RuleArbiter {
    pub fn new(objects: ObjectRegulator, functions: Arc<FunctionRegistry>) -> Self {
        Self { objects, functions }
    }

    /// One candidate per rule, in rule-set then rule order.
    pub async fn process_rules(
        &self,
        schema: &Schema,
        source_vertex: &VertexData,
        entry: &VertexEntry,
        record: &ExtractedRecord,
    ) -> Result<Vec<(VertexData, RuleEntry)>> {
        let mut candidates = Vec::new();
        for rule_set in &entry.rule_sets {
            if !rule_set.admits(record) {
                continue;
            }
            for rule in &rule_set.rules {
                let target_entry = schema.vertex_entry(&rule.target_type)?;
                let candidate = self
                    .generate_candidate(source_vertex, target_entry, rule, record)
                    .await?;
                trace!(
                    edge_type = %rule.edge_type,
                    target_type = %rule.target_type,
                    internal_id = %candidate.internal_id,
                    "Generated candidate"
                );
                candidates.push((candidate, rule.clone()));
            }
        }
        debug!(
            object_type = %entry.vertex_name,
            candidate_count = candidates.len(),
            "Processed linking rules"
        );
        Ok(candidates)
    }

    async fn generate_candidate(
        &self,
        source_vertex: &VertexData,
        target_entry: &VertexEntry,
        rule: &RuleEntry,
        record: &ExtractedRecord,
    ) -> Result<VertexData> {
        let constants = self.derive_target_constants(source_vertex, rule).await?;

        let mut specified = Map::new();
        for specifier in &rule.target_specifiers {
            let value = match &specifier.source {
                SpecifierSource::Constant { value } => Some(value.clone()),
                SpecifierSource::SourceVertex {
                    vertex_property_name,
                } => self
                    .objects
                    .tiers()
                    .held_value(source_vertex, vertex_property_name)
                    .await?
                    .to_json(),
                SpecifierSource::TargetConstant { constant_name } => {
                    constants.get(constant_name).cloned()
                }
                SpecifierSource::Extraction {
                    extraction_name,
                    extracted_property,
                } => distinct_value(
                    record,
                    extraction_name,
                    extracted_property
                        .as_deref()
                        .unwrap_or(&specifier.property_name),
                )?,
                SpecifierSource::Function { function_name } => {
                    let ctx = FunctionContext {
                        source_vertex,
                        target_vertex: None,
                        record,
                        entry: SchemaEntry::Vertex(target_entry),
                        inbound: rule.inbound,
                    };
                    self.functions.call(function_name, &ctx)?
                }
            };
            if let Some(value) = value {
                specified.insert(specifier.property_name.clone(), value);
            }
        }
        self.objects.create_entity(target_entry, &specified).await
    }

    /// Resolve `target_constants`, substituting `source.<field>` references
    /// with the source vertex's value.
    async fn derive_target_constants(
        &self,
        source_vertex: &VertexData,
        rule: &RuleEntry,
    ) -> Result<HashMap<String, JsonValue>> {
        let mut constants = HashMap::new();
        for constant in &rule.target_constants {
            let value = match constant.source_field() {
                Some(field) => self
                    .objects
                    .tiers()
                    .held_value(source_vertex, field)
                    .await?
                    .to_json(),
                None => Some(JsonValue::String(constant.constant_value.clone())),
            };
            if let Some(value) = value {
                constants.insert(constant.constant_name.clone(), value);
            }
        }
        Ok(constants)
    }
}
