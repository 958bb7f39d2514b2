//! Schema registry: typed vertex and edge entries loaded once per job.
//!
//! The document shape is `{ "vertex": [...], "edge": [...] }`. Property data
//! types are checked while loading; cross-references between entries and
//! function names are checked by [`Schema::validate`].

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::record::ExtractedRecord;
use crate::values::DataType;

/// Anything that can answer whether a named function is registered.
///
/// Implemented by the function registry so the schema can be checked at
/// load time without depending on it.
pub trait FunctionCatalog {
    fn has_function(&self, name: &str) -> bool;
}

// =============================================================================
// PROPERTIES
// =============================================================================

/// Where a property's value lives once an object is built.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyTier {
    /// Inline on the graph object.
    Local,
    /// Behind an opaque pointer in the sensitive vault.
    Sensitive,
    /// Behind a locator in the oversized-value store.
    Stored(StorageSpec),
}

/// Storage declaration for a stored-tier property.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageSpec {
    pub storage_class: String,
    pub location: StorageLocation,
}

/// How the bucket for a stored-tier property is found.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum StorageLocation {
    /// Bucket named directly in the schema.
    Static { bucket_name: String },
    /// Bucket resolved by name through the resolver configuration.
    Config { location_name: String },
}

/// A schema-declared property.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertySchema {
    pub name: String,
    pub data_type: DataType,
    pub tier: PropertyTier,
}

#[derive(Debug, Clone, Deserialize)]
struct RawProperty {
    property_name: String,
    property_data_type: String,
    #[serde(default)]
    sensitive: bool,
    #[serde(default)]
    stored: Option<StorageSpec>,
}

impl RawProperty {
    fn into_schema(self) -> Result<PropertySchema> {
        let data_type: DataType =
            self.property_data_type
                .parse()
                .map_err(|_| Error::InvalidPropertyType {
                    property_name: self.property_name.clone(),
                    data_type: self.property_data_type.clone(),
                })?;
        let tier = match (self.sensitive, self.stored) {
            (true, Some(_)) => {
                return Err(Error::InvalidSchema(format!(
                    "property {} is declared both sensitive and stored",
                    self.property_name
                )))
            }
            (true, None) => PropertyTier::Sensitive,
            (false, Some(spec)) => PropertyTier::Stored(spec),
            (false, None) => PropertyTier::Local,
        };
        Ok(PropertySchema {
            name: self.property_name,
            data_type,
            tier,
        })
    }
}

// =============================================================================
// LINKING RULES
// =============================================================================

/// Where a target specifier draws its value from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "specifier_type", rename_all = "snake_case")]
pub enum SpecifierSource {
    /// A literal value.
    Constant { value: Value },
    /// A property (or identity field) held by the source vertex.
    SourceVertex { vertex_property_name: String },
    /// One of the rule's resolved target constants.
    TargetConstant { constant_name: String },
    /// The single distinct value of a field across a named extraction.
    Extraction {
        extraction_name: String,
        #[serde(default)]
        extracted_property: Option<String>,
    },
    /// A registered function.
    Function { function_name: String },
}

/// One property of a candidate vertex, and where to find its value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetSpecifier {
    pub property_name: String,
    #[serde(flatten)]
    pub source: SpecifierSource,
}

/// A named constant attached to a rule. A value of the form `source.<field>`
/// is replaced by that field of the source vertex.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetConstant {
    pub constant_name: String,
    pub constant_value: String,
}

impl TargetConstant {
    /// The source-vertex field referenced by this constant, if any.
    pub fn source_field(&self) -> Option<&str> {
        self.constant_value.strip_prefix("source.")
    }
}

/// A single linking rule: how to derive a candidate and the edge to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleEntry {
    pub target_type: String,
    pub edge_type: String,
    #[serde(default)]
    pub target_specifiers: Vec<TargetSpecifier>,
    #[serde(default)]
    pub target_constants: Vec<TargetConstant>,
    #[serde(default)]
    pub inbound: bool,
    #[serde(default)]
    pub is_stub: bool,
    #[serde(default)]
    pub is_create: bool,
}

impl fmt::Display for RuleEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.edge_type)
    }
}

/// A guarded group of linking rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleSet {
    #[serde(default)]
    pub vertex_specifiers: Vec<Value>,
    #[serde(default)]
    pub rules: Vec<RuleEntry>,
}

impl RuleSet {
    /// Whether this rule set applies to the record. Guards are not evaluated
    /// yet; every rule set applies.
    pub fn admits(&self, _record: &ExtractedRecord) -> bool {
        true
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
struct RawRules {
    #[serde(default)]
    linking_rules: Vec<RuleSet>,
}

// =============================================================================
// ENTRIES
// =============================================================================

/// A vertex type.
#[derive(Debug, Clone, PartialEq)]
pub struct VertexEntry {
    pub vertex_name: String,
    pub identifier_stem: Vec<String>,
    pub id_value_field: String,
    pub internal_id_key: Vec<String>,
    pub properties: Vec<PropertySchema>,
    pub rule_sets: Vec<RuleSet>,
}

impl VertexEntry {
    pub fn object_type(&self) -> &str {
        &self.vertex_name
    }

    pub fn property(&self, name: &str) -> Option<&PropertySchema> {
        self.properties.iter().find(|p| p.name == name)
    }

    /// Value of a schema constant usable in `internal_id_key`.
    pub fn constant(&self, name: &str) -> Option<&str> {
        match name {
            "object_type" | "entry_name" => Some(&self.vertex_name),
            "id_value_field" => Some(&self.id_value_field),
            _ => None,
        }
    }

    pub fn rules(&self) -> impl Iterator<Item = &RuleEntry> {
        self.rule_sets.iter().flat_map(|set| set.rules.iter())
    }
}

#[derive(Debug, Clone, Deserialize)]
struct RawVertexEntry {
    vertex_name: String,
    identifier_stem: Vec<String>,
    id_value_field: String,
    internal_id_key: Vec<String>,
    #[serde(default)]
    vertex_properties: Vec<RawProperty>,
    #[serde(default)]
    rules: RawRules,
}

impl TryFrom<RawVertexEntry> for VertexEntry {
    type Error = Error;

    fn try_from(raw: RawVertexEntry) -> Result<Self> {
        let properties = raw
            .vertex_properties
            .into_iter()
            .map(RawProperty::into_schema)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            vertex_name: raw.vertex_name,
            identifier_stem: raw.identifier_stem,
            id_value_field: raw.id_value_field,
            internal_id_key: raw.internal_id_key,
            properties,
            rule_sets: raw.rules.linking_rules,
        })
    }
}

/// Accepted endpoint types of an edge.
#[derive(Debug, Clone, PartialEq)]
pub enum AcceptedTypes {
    /// Wildcard `*`.
    Any,
    Only(Vec<String>),
}

impl AcceptedTypes {
    pub fn accepts(&self, object_type: &str) -> bool {
        match self {
            AcceptedTypes::Any => true,
            AcceptedTypes::Only(types) => types.iter().any(|t| t == object_type),
        }
    }

    /// The accepted set as listed in the schema.
    pub fn listed(&self) -> Vec<String> {
        match self {
            AcceptedTypes::Any => vec!["*".to_string()],
            AcceptedTypes::Only(types) => types.clone(),
        }
    }
}

impl From<Vec<String>> for AcceptedTypes {
    fn from(types: Vec<String>) -> Self {
        if types.iter().any(|t| t == "*") {
            AcceptedTypes::Any
        } else {
            AcceptedTypes::Only(types)
        }
    }
}

/// Where an edge property's value comes from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "source_type", rename_all = "snake_case")]
pub enum EdgePropertySource {
    /// Held by the edge's origin vertex.
    SourceVertex { vertex_property_name: String },
    /// Held by the edge's destination vertex.
    TargetVertex { vertex_property_name: String },
    Extraction {
        extraction_name: String,
        #[serde(default)]
        extracted_property: Option<String>,
    },
    Function { function_name: String },
}

/// An edge property with its value source.
#[derive(Debug, Clone, PartialEq)]
pub struct EdgePropertySchema {
    pub property: PropertySchema,
    pub source: EdgePropertySource,
}

#[derive(Debug, Clone, Deserialize)]
struct RawEdgeProperty {
    #[serde(flatten)]
    property: RawProperty,
    property_source: EdgePropertySource,
}

/// An edge type.
#[derive(Debug, Clone, PartialEq)]
pub struct EdgeEntry {
    pub edge_label: String,
    pub from_types: AcceptedTypes,
    pub to_types: AcceptedTypes,
    pub internal_id_key: Vec<String>,
    pub properties: Vec<EdgePropertySchema>,
}

impl EdgeEntry {
    pub fn object_type(&self) -> &str {
        &self.edge_label
    }

    /// Value of a `schema.<field>` reference.
    pub fn schema_field(&self, field: &str) -> Option<&str> {
        match field {
            "edge_label" | "entry_name" | "object_type" => Some(&self.edge_label),
            _ => None,
        }
    }

    pub fn property_schemas(&self) -> impl Iterator<Item = &PropertySchema> {
        self.properties.iter().map(|p| &p.property)
    }
}

#[derive(Debug, Clone, Deserialize)]
struct RawEdgeEntry {
    edge_label: String,
    from: Vec<String>,
    to: Vec<String>,
    internal_id_key: Vec<String>,
    #[serde(default)]
    edge_properties: Vec<RawEdgeProperty>,
}

impl TryFrom<RawEdgeEntry> for EdgeEntry {
    type Error = Error;

    fn try_from(raw: RawEdgeEntry) -> Result<Self> {
        let properties = raw
            .edge_properties
            .into_iter()
            .map(|p| {
                Ok(EdgePropertySchema {
                    property: p.property.into_schema()?,
                    source: p.property_source,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            edge_label: raw.edge_label,
            from_types: raw.from.into(),
            to_types: raw.to.into(),
            internal_id_key: raw.internal_id_key,
            properties,
        })
    }
}

/// Borrowed view over either kind of entry.
#[derive(Debug, Clone, Copy)]
pub enum SchemaEntry<'a> {
    Vertex(&'a VertexEntry),
    Edge(&'a EdgeEntry),
}

impl<'a> SchemaEntry<'a> {
    pub fn properties(&self) -> Vec<&'a PropertySchema> {
        match self {
            SchemaEntry::Vertex(v) => v.properties.iter().collect(),
            SchemaEntry::Edge(e) => e.property_schemas().collect(),
        }
    }
}

// =============================================================================
// REGISTRY
// =============================================================================

#[derive(Debug, Clone, Deserialize)]
struct RawSchema {
    #[serde(default)]
    vertex: Vec<RawVertexEntry>,
    #[serde(default)]
    edge: Vec<RawEdgeEntry>,
}

/// All vertex and edge entries of a deployment.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Schema {
    vertexes: Vec<VertexEntry>,
    edges: Vec<EdgeEntry>,
}

impl Schema {
    pub fn new(vertexes: Vec<VertexEntry>, edges: Vec<EdgeEntry>) -> Self {
        Self { vertexes, edges }
    }

    /// Parse a schema document, checking property types and tiers.
    pub fn from_json(document: &str) -> Result<Self> {
        let raw: RawSchema = serde_json::from_str(document)
            .map_err(|e| Error::InvalidSchema(format!("malformed schema document: {}", e)))?;
        Self::from_raw(raw)
    }

    /// Same as [`Schema::from_json`] for an already-parsed document.
    pub fn from_value(document: Value) -> Result<Self> {
        let raw: RawSchema = serde_json::from_value(document)
            .map_err(|e| Error::InvalidSchema(format!("malformed schema document: {}", e)))?;
        Self::from_raw(raw)
    }

    fn from_raw(raw: RawSchema) -> Result<Self> {
        let vertexes = raw
            .vertex
            .into_iter()
            .map(VertexEntry::try_from)
            .collect::<Result<Vec<_>>>()?;
        let edges = raw
            .edge
            .into_iter()
            .map(EdgeEntry::try_from)
            .collect::<Result<Vec<_>>>()?;

        let mut seen = HashSet::new();
        for name in vertexes
            .iter()
            .map(|v| v.vertex_name.as_str())
            .chain(edges.iter().map(|e| e.edge_label.as_str()))
        {
            if !seen.insert(name) {
                return Err(Error::InvalidSchema(format!("duplicate schema entry: {}", name)));
            }
        }
        Ok(Self { vertexes, edges })
    }

    pub fn vertexes(&self) -> &[VertexEntry] {
        &self.vertexes
    }

    pub fn edges(&self) -> &[EdgeEntry] {
        &self.edges
    }

    /// Look up an entry by name, vertex entries first.
    pub fn entry(&self, name: &str) -> Result<SchemaEntry<'_>> {
        if let Some(v) = self.vertexes.iter().find(|v| v.vertex_name == name) {
            return Ok(SchemaEntry::Vertex(v));
        }
        if let Some(e) = self.edges.iter().find(|e| e.edge_label == name) {
            return Ok(SchemaEntry::Edge(e));
        }
        Err(Error::UnknownSchemaEntry(name.to_string()))
    }

    pub fn vertex_entry(&self, name: &str) -> Result<&VertexEntry> {
        self.vertexes
            .iter()
            .find(|v| v.vertex_name == name)
            .ok_or_else(|| Error::UnknownSchemaEntry(name.to_string()))
    }

    pub fn edge_entry(&self, name: &str) -> Result<&EdgeEntry> {
        self.edges
            .iter()
            .find(|e| e.edge_label == name)
            .ok_or_else(|| Error::UnknownSchemaEntry(name.to_string()))
    }

    /// Check cross-references: rule targets, edge types, identity keys and
    /// function names. Run once before any record is processed.
    pub fn validate(&self, functions: &dyn FunctionCatalog) -> Result<()> {
        for vertex in &self.vertexes {
            validate_vertex_keys(vertex)?;
            for rule in vertex.rules() {
                self.vertex_entry(&rule.target_type).map_err(|_| {
                    Error::InvalidSchema(format!(
                        "rule {} on {} targets unknown vertex type {}",
                        rule.edge_type, vertex.vertex_name, rule.target_type
                    ))
                })?;
                self.edge_entry(&rule.edge_type).map_err(|_| {
                    Error::InvalidSchema(format!(
                        "rule on {} names unknown edge type {}",
                        vertex.vertex_name, rule.edge_type
                    ))
                })?;
                for specifier in &rule.target_specifiers {
                    if let SpecifierSource::Function { function_name } = &specifier.source {
                        if !functions.has_function(function_name) {
                            return Err(Error::UnknownSpecifierFunction(function_name.clone()));
                        }
                    }
                }
            }
        }
        for edge in &self.edges {
            validate_edge_keys(edge)?;
            for property in &edge.properties {
                if let EdgePropertySource::Function { function_name } = &property.source {
                    if !functions.has_function(function_name) {
                        return Err(Error::UnknownSpecifierFunction(function_name.clone()));
                    }
                }
            }
        }
        Ok(())
    }
}

fn validate_vertex_keys(vertex: &VertexEntry) -> Result<()> {
    for key in &vertex.internal_id_key {
        if vertex.constant(key).is_none() && vertex.property(key).is_none() {
            return Err(Error::InvalidSchema(format!(
                "internal_id_key of {} names {}, which is neither a property nor a schema constant",
                vertex.vertex_name, key
            )));
        }
    }
    if vertex.identifier_stem.is_empty() {
        return Err(Error::InvalidSchema(format!(
            "identifier_stem of {} is empty",
            vertex.vertex_name
        )));
    }
    Ok(())
}

fn validate_edge_keys(edge: &EdgeEntry) -> Result<()> {
    for key in &edge.internal_id_key {
        let known = if let Some(field) = key.strip_prefix("schema.") {
            edge.schema_field(field).is_some()
        } else if key.starts_with("from.") || key.starts_with("to.") {
            true
        } else {
            edge.property_schemas().any(|p| &p.name == key)
        };
        if !known {
            return Err(Error::InvalidSchema(format!(
                "internal_id_key of {} names unknown field {}",
                edge.edge_label, key
            )));
        }
    }
    Ok(())
}
