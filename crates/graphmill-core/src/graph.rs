//! Graph objects and their exchange representation.

use std::ops::Deref;

use serde::{Deserialize, Serialize};

use crate::identity::{IdValue, IdentifierStem, InternalId, StemState};
use crate::schema::{PropertyTier, SchemaEntry};
use crate::values::{data_type_code, normalize, DataType, NormalizedValue, PropertyValue};

/// A property held inline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ExchangeLocal", into = "ExchangeLocal")]
pub struct LocalProperty {
    pub name: String,
    pub data_type: DataType,
    /// `None` for a present-but-null value.
    pub value: Option<PropertyValue>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ExchangeLocal {
    property_name: String,
    #[serde(with = "data_type_code")]
    data_type: DataType,
    property_value: Option<String>,
}

impl From<LocalProperty> for ExchangeLocal {
    fn from(p: LocalProperty) -> Self {
        Self {
            property_name: p.name,
            data_type: p.data_type,
            property_value: p.value.map(|v| v.to_string()),
        }
    }
}

impl TryFrom<ExchangeLocal> for LocalProperty {
    type Error = crate::error::Error;

    fn try_from(e: ExchangeLocal) -> crate::error::Result<Self> {
        let raw = e.property_value.map(serde_json::Value::String);
        let value = match normalize(&e.property_name, e.data_type, raw.as_ref())? {
            NormalizedValue::Value(v) => Some(v),
            _ => None,
        };
        Ok(Self {
            name: e.property_name,
            data_type: e.data_type,
            value,
        })
    }
}

/// A property held in the sensitive vault.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensitiveProperty {
    #[serde(rename = "property_name")]
    pub name: String,
    #[serde(with = "data_type_code")]
    pub data_type: DataType,
    pub pointer: String,
}

/// A property held in the oversized-value store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredProperty {
    #[serde(rename = "property_name")]
    pub name: String,
    #[serde(with = "data_type_code")]
    pub data_type: DataType,
    pub storage_class: String,
    #[serde(rename = "storage_uri")]
    pub locator: String,
}

/// Typed view of one named property of a graph object.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PropertySlot<'a> {
    Local(Option<&'a PropertyValue>),
    Sensitive(&'a SensitiveProperty),
    Stored(&'a StoredProperty),
    Missing,
}

/// Base of vertices and edges.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphObject {
    pub object_type: String,
    pub internal_id: InternalId,
    pub identifier_stem: StemState,
    pub id_value: IdValue,
    #[serde(default)]
    pub local_properties: Vec<LocalProperty>,
    #[serde(default)]
    pub sensitive_properties: Vec<SensitiveProperty>,
    #[serde(default)]
    pub stored_properties: Vec<StoredProperty>,
    /// Schema-declared properties absent from the raw data.
    #[serde(skip)]
    pub missing_properties: Vec<String>,
}

/// A vertex is a plain graph object.
pub type VertexData = GraphObject;

impl GraphObject {
    /// Locate a property across the three buckets.
    pub fn property(&self, name: &str) -> PropertySlot<'_> {
        if let Some(p) = self.local_properties.iter().find(|p| p.name == name) {
            return PropertySlot::Local(p.value.as_ref());
        }
        if let Some(p) = self.sensitive_properties.iter().find(|p| p.name == name) {
            return PropertySlot::Sensitive(p);
        }
        if let Some(p) = self.stored_properties.iter().find(|p| p.name == name) {
            return PropertySlot::Stored(p);
        }
        PropertySlot::Missing
    }

    pub fn internal_id(&self) -> &InternalId {
        &self.internal_id
    }

    pub fn identifier_stem(&self) -> &StemState {
        &self.identifier_stem
    }

    pub fn id_value(&self) -> &IdValue {
        &self.id_value
    }

    /// Identity fields addressable by name (`internal_id`, `id_value`, ...).
    pub fn identity_field(&self, name: &str) -> Option<NormalizedValue> {
        let value = match name {
            "object_type" => PropertyValue::String(self.object_type.clone()),
            "internal_id" => PropertyValue::String(self.internal_id.as_derived()?.to_string()),
            "identifier_stem" => PropertyValue::String(self.identifier_stem.as_derived()?.to_string()),
            "id_value" => self.id_value.as_value()?.clone(),
            _ => return None,
        };
        Some(NormalizedValue::Value(value))
    }

    /// Whether the identity fields are all derived.
    pub fn is_identifiable(&self) -> bool {
        self.internal_id.is_derived()
            && self.identifier_stem.as_derived().is_some()
            && self.id_value.is_set()
    }

    /// Whether every schema-declared property sits in its declared bucket.
    pub fn is_properties_complete(&self, entry: SchemaEntry<'_>) -> bool {
        if !self.missing_properties.is_empty() {
            return false;
        }
        entry.properties().into_iter().all(|schema| {
            matches!(
                (&schema.tier, self.property(&schema.name)),
                (PropertyTier::Local, PropertySlot::Local(_))
                    | (PropertyTier::Sensitive, PropertySlot::Sensitive(_))
                    | (PropertyTier::Stored(_), PropertySlot::Stored(_))
            )
        })
    }

    /// Identity set and every declared property present in its tier.
    pub fn is_schema_complete(&self, entry: SchemaEntry<'_>) -> bool {
        self.is_identifiable() && self.is_properties_complete(entry)
    }
}

impl std::fmt::Display for GraphObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.object_type, self.id_value)
    }
}

/// An edge between two resolved vertices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeData {
    #[serde(flatten)]
    pub object: GraphObject,
    pub source_vertex_internal_id: InternalId,
    pub target_vertex_internal_id: InternalId,
}

impl EdgeData {
    pub fn edge_label(&self) -> &str {
        &self.object.object_type
    }

    /// The fixed stem of an edge type.
    pub fn stem_for(edge_label: &str) -> StemState {
        StemState::Derived(IdentifierStem::edge(edge_label))
    }
}

impl Deref for EdgeData {
    type Target = GraphObject;

    fn deref(&self) -> &GraphObject {
        &self.object
    }
}

/// One pipeline output: a source vertex, the vertex it links to, and the
/// edge between them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedTriple {
    pub source_vertex: VertexData,
    pub other_vertex: VertexData,
    pub edge: EdgeData,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{PropertySchema, VertexEntry};
    use crate::values::number;
    use serde_json::json;

    fn entry() -> VertexEntry {
        VertexEntry {
            vertex_name: "Patient".to_string(),
            identifier_stem: vec!["id_source".to_string()],
            id_value_field: "patient_id".to_string(),
            internal_id_key: vec!["patient_id".to_string()],
            properties: vec![
                PropertySchema {
                    name: "patient_id".to_string(),
                    data_type: DataType::Number,
                    tier: PropertyTier::Local,
                },
                PropertySchema {
                    name: "ssn".to_string(),
                    data_type: DataType::String,
                    tier: PropertyTier::Sensitive,
                },
            ],
            rule_sets: Vec::new(),
        }
    }

    fn vertex() -> VertexData {
        GraphObject {
            object_type: "Patient".to_string(),
            internal_id: InternalId::Derived("abc".to_string()),
            identifier_stem: StemState::Derived(IdentifierStem::vertex("Patient", vec!["ICFS".into()])),
            id_value: IdValue::Set(number(1001)),
            local_properties: vec![LocalProperty {
                name: "patient_id".to_string(),
                data_type: DataType::Number,
                value: Some(number(1001)),
            }],
            sensitive_properties: vec![SensitiveProperty {
                name: "ssn".to_string(),
                data_type: DataType::String,
                pointer: "ptr".to_string(),
            }],
            stored_properties: Vec::new(),
            missing_properties: Vec::new(),
        }
    }

    #[test]
    fn test_property_slots() {
        let v = vertex();
        assert_eq!(v.property("patient_id"), PropertySlot::Local(Some(&number(1001))));
        assert!(matches!(v.property("ssn"), PropertySlot::Sensitive(p) if p.pointer == "ptr"));
        assert_eq!(v.property("nope"), PropertySlot::Missing);
    }

    #[test]
    fn test_complete_vertex() {
        let e = entry();
        assert!(vertex().is_schema_complete(SchemaEntry::Vertex(&e)));
    }

    #[test]
    fn test_missing_property_breaks_completeness() {
        let e = entry();
        let mut v = vertex();
        v.sensitive_properties.clear();
        v.missing_properties.push("ssn".to_string());
        assert!(!v.is_schema_complete(SchemaEntry::Vertex(&e)));
    }

    #[test]
    fn test_wrong_tier_breaks_completeness() {
        let e = entry();
        let mut v = vertex();
        v.sensitive_properties.clear();
        v.local_properties.push(LocalProperty {
            name: "ssn".to_string(),
            data_type: DataType::String,
            value: Some(PropertyValue::String("123".into())),
        });
        assert!(!v.is_schema_complete(SchemaEntry::Vertex(&e)));
    }

    #[test]
    fn test_pending_identity_breaks_completeness() {
        let e = entry();
        let mut v = vertex();
        v.id_value = IdValue::Pending("patient_id".to_string());
        assert!(!v.is_schema_complete(SchemaEntry::Vertex(&e)));
        let mut v = vertex();
        v.internal_id = InternalId::Pending(vec!["patient_id".to_string()]);
        assert!(!v.is_identifiable());
    }

    #[test]
    fn test_identity_fields() {
        let v = vertex();
        assert_eq!(
            v.identity_field("internal_id"),
            Some(NormalizedValue::Value(PropertyValue::String("abc".into())))
        );
        assert_eq!(v.identity_field("id_value"), Some(NormalizedValue::Value(number(1001))));
        assert_eq!(v.identity_field("patient_id"), None);
    }

    #[test]
    fn test_exchange_representation() {
        let json = serde_json::to_value(vertex()).unwrap();
        assert_eq!(json["object_type"], json!("Patient"));
        assert_eq!(json["internal_id"], json!("abc"));
        assert_eq!(json["identifier_stem"], json!("#vertex#Patient#ICFS#"));
        assert_eq!(json["id_value"], json!({"data_type": "N", "property_value": "1001"}));
        assert_eq!(
            json["local_properties"][0],
            json!({"property_name": "patient_id", "data_type": "N", "property_value": "1001"})
        );
        assert_eq!(
            json["sensitive_properties"][0],
            json!({"property_name": "ssn", "data_type": "S", "pointer": "ptr"})
        );
        assert!(json.get("missing_properties").is_none());

        let back: VertexData = serde_json::from_value(json).unwrap();
        assert_eq!(back, vertex());
    }

    #[test]
    fn test_edge_exchange_representation() {
        let edge = EdgeData {
            object: GraphObject {
                object_type: "_received".to_string(),
                internal_id: InternalId::Derived("e1".to_string()),
                identifier_stem: EdgeData::stem_for("_received"),
                id_value: IdValue::Set(PropertyValue::String("e1".into())),
                local_properties: Vec::new(),
                sensitive_properties: Vec::new(),
                stored_properties: Vec::new(),
                missing_properties: Vec::new(),
            },
            source_vertex_internal_id: InternalId::Derived("a".to_string()),
            target_vertex_internal_id: InternalId::Derived("b".to_string()),
        };
        let json = serde_json::to_value(&edge).unwrap();
        assert_eq!(json["identifier_stem"], json!("#edge#_received#"));
        assert_eq!(json["source_vertex_internal_id"], json!("a"));
        let back: EdgeData = serde_json::from_value(json).unwrap();
        assert_eq!(back, edge);
        assert_eq!(back.edge_label(), "_received");
    }
}
