//! Deterministic identity: internal ids, identifier stems and id values.
//!
//! Everything here is pure. Equal inputs always produce equal outputs, which
//! is what makes re-running a job idempotent.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::defaults;
use crate::error::{Error, Result};
use crate::schema::VertexEntry;
use crate::values::{NormalizedValue, PropertyValue};

/// Normalized values of every schema-declared property, keyed by name.
pub type NormalizedProperties = BTreeMap<String, NormalizedValue>;

/// Lowercase hex MD5 of a key string.
pub fn internal_id_digest(key: &str) -> String {
    format!("{:x}", md5::compute(key.as_bytes()))
}

/// String contribution of a normalized value to an internal-id key.
pub fn key_fragment(value: &NormalizedValue) -> String {
    match value {
        NormalizedValue::Value(v) => v.to_string(),
        NormalizedValue::Null => defaults::NULL_OBJECT_PROPERTY.to_string(),
        NormalizedValue::Missing => defaults::MISSING_OBJECT_PROPERTY.to_string(),
    }
}

/// Internal id of a graph object.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InternalId {
    /// Digest of the resolved key.
    Derived(String),
    /// Not yet derivable; holds the unresolved key descriptor.
    Pending(Vec<String>),
}

impl InternalId {
    pub fn is_derived(&self) -> bool {
        matches!(self, InternalId::Derived(_))
    }

    pub fn as_derived(&self) -> Option<&str> {
        match self {
            InternalId::Derived(id) => Some(id),
            InternalId::Pending(_) => None,
        }
    }
}

impl fmt::Display for InternalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InternalId::Derived(id) => write!(f, "{}", id),
            InternalId::Pending(keys) => write!(f, "pending[{}]", keys.join(",")),
        }
    }
}

/// Derive the internal id of a vertex from its normalized properties.
///
/// `internal_id_key` entries are schema constants or property names. Missing
/// properties contribute [`defaults::MISSING_OBJECT_PROPERTY`]. A key found
/// in neither place is an error when `known` is set (source objects), and a
/// pending id otherwise.
pub fn derive_internal_id(
    entry: &VertexEntry,
    properties: &NormalizedProperties,
    known: bool,
) -> Result<InternalId> {
    let mut key = String::new();
    for field in &entry.internal_id_key {
        if let Some(constant) = entry.constant(field) {
            key.push_str(constant);
            continue;
        }
        match properties.get(field) {
            Some(value) => key.push_str(&key_fragment(value)),
            None if known => {
                return Err(Error::IdentityDerivation {
                    object_type: entry.vertex_name.clone(),
                    reason: format!(
                        "internal id key {} is neither a property nor a schema constant",
                        field
                    ),
                })
            }
            None => return Ok(InternalId::Pending(entry.internal_id_key.clone())),
        }
    }
    Ok(InternalId::Derived(internal_id_digest(&key)))
}

/// Parsed identifier stem: `#<graph_type>#<object_type>#<k1>#...#`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IdentifierStem {
    pub graph_type: String,
    pub object_type: String,
    pub identifiers: Vec<String>,
}

impl IdentifierStem {
    pub fn vertex(object_type: impl Into<String>, identifiers: Vec<String>) -> Self {
        Self {
            graph_type: defaults::VERTEX_KIND.to_string(),
            object_type: object_type.into(),
            identifiers,
        }
    }

    pub fn edge(edge_label: impl Into<String>) -> Self {
        Self {
            graph_type: defaults::EDGE_KIND.to_string(),
            object_type: edge_label.into(),
            identifiers: Vec::new(),
        }
    }

    pub fn is_edge(&self) -> bool {
        self.graph_type == defaults::EDGE_KIND
    }

    pub fn is_stub(&self) -> bool {
        self.object_type.ends_with(defaults::STUB_SUFFIX)
    }
}

impl fmt::Display for IdentifierStem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}#{}#", self.graph_type, self.object_type)?;
        for identifier in &self.identifiers {
            write!(f, "{}#", identifier)?;
        }
        Ok(())
    }
}

impl FromStr for IdentifierStem {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let inner = s
            .strip_prefix('#')
            .and_then(|rest| rest.strip_suffix('#'))
            .ok_or_else(|| format!("Invalid identifier stem: {}", s))?;
        let mut pieces = inner.split('#');
        let graph_type = pieces.next().filter(|p| !p.is_empty());
        let object_type = pieces.next().filter(|p| !p.is_empty());
        match (graph_type, object_type) {
            (Some(graph_type), Some(object_type)) => Ok(Self {
                graph_type: graph_type.to_string(),
                object_type: object_type.to_string(),
                identifiers: pieces.map(str::to_string).collect(),
            }),
            _ => Err(format!("Invalid identifier stem: {}", s)),
        }
    }
}

impl Serialize for IdentifierStem {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for IdentifierStem {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Identifier stem of a graph object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StemState {
    Derived(IdentifierStem),
    /// A key was missing; holds the undecorated schema stem key.
    Pending(Vec<String>),
}

impl StemState {
    pub fn as_derived(&self) -> Option<&IdentifierStem> {
        match self {
            StemState::Derived(stem) => Some(stem),
            StemState::Pending(_) => None,
        }
    }
}

impl fmt::Display for StemState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StemState::Derived(stem) => write!(f, "{}", stem),
            StemState::Pending(keys) => write!(f, "pending[{}]", keys.join(",")),
        }
    }
}

/// Derive the identifier stem of a vertex.
///
/// Keys are read from the normalized properties, falling back to the raw
/// data. A missing key yields the undecorated schema stem. A null key
/// contributes an empty segment and marks the object type `::stub`.
pub fn derive_identifier_stem(
    entry: &VertexEntry,
    properties: &NormalizedProperties,
    raw: &Map<String, Value>,
) -> StemState {
    let pending = || StemState::Pending(entry.identifier_stem.clone());
    let mut object_type = entry.vertex_name.clone();
    let mut identifiers = Vec::with_capacity(entry.identifier_stem.len());

    for field in &entry.identifier_stem {
        let segment = match properties.get(field) {
            Some(NormalizedValue::Missing) => return pending(),
            Some(NormalizedValue::Null) => None,
            Some(NormalizedValue::Value(v)) => Some(v.to_string()),
            None => match raw.get(field) {
                None => return pending(),
                Some(Value::Null) => None,
                Some(Value::String(s)) if s.is_empty() => None,
                Some(Value::String(s)) => Some(s.clone()),
                Some(other) => Some(other.to_string()),
            },
        };
        match segment {
            Some(segment) => identifiers.push(segment),
            None => {
                if !object_type.ends_with(defaults::STUB_SUFFIX) {
                    object_type.push_str(defaults::STUB_SUFFIX);
                }
                identifiers.push(String::new());
            }
        }
    }
    StemState::Derived(IdentifierStem::vertex(object_type, identifiers))
}

/// Derive the id value from the property named by `id_value_field`.
///
/// DateTime id values become epoch seconds. A missing or null value leaves
/// the id value pending on the field name.
pub fn derive_id_value(entry: &VertexEntry, properties: &NormalizedProperties) -> IdValue {
    match properties.get(&entry.id_value_field) {
        Some(NormalizedValue::Value(value)) => match value.to_epoch() {
            Some(epoch) => IdValue::Set(PropertyValue::Number(epoch)),
            None => IdValue::Set(value.clone()),
        },
        _ => IdValue::Pending(entry.id_value_field.clone()),
    }
}

/// The link from a graph object back to its source record.
#[derive(Debug, Clone, PartialEq)]
pub enum IdValue {
    Set(PropertyValue),
    /// Not derivable; holds the id-value field name.
    Pending(String),
}

impl IdValue {
    pub fn is_set(&self) -> bool {
        matches!(self, IdValue::Set(_))
    }

    pub fn as_value(&self) -> Option<&PropertyValue> {
        match self {
            IdValue::Set(v) => Some(v),
            IdValue::Pending(_) => None,
        }
    }
}

impl fmt::Display for IdValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdValue::Set(v) => write!(f, "{}", v),
            IdValue::Pending(field) => write!(f, "pending[{}]", field),
        }
    }
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum ExchangeIdValue {
    Set {
        #[serde(with = "crate::values::data_type_code")]
        data_type: crate::values::DataType,
        property_value: String,
    },
    Pending(String),
}

impl Serialize for IdValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let exchange = match self {
            IdValue::Set(v) => ExchangeIdValue::Set {
                data_type: v.data_type(),
                property_value: v.to_string(),
            },
            IdValue::Pending(field) => ExchangeIdValue::Pending(field.clone()),
        };
        exchange.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for IdValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        match ExchangeIdValue::deserialize(deserializer)? {
            ExchangeIdValue::Set {
                data_type,
                property_value,
            } => {
                let raw = Value::String(property_value);
                match crate::values::normalize("id_value", data_type, Some(&raw)) {
                    Ok(NormalizedValue::Value(v)) => Ok(IdValue::Set(v)),
                    Ok(_) => Err(serde::de::Error::custom("empty id_value")),
                    Err(e) => Err(serde::de::Error::custom(e.to_string())),
                }
            }
            ExchangeIdValue::Pending(field) => Ok(IdValue::Pending(field)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{PropertySchema, PropertyTier};
    use crate::values::{number, DataType};
    use serde_json::json;

    fn patient_entry() -> VertexEntry {
        let prop = |name: &str, data_type| PropertySchema {
            name: name.to_string(),
            data_type,
            tier: PropertyTier::Local,
        };
        VertexEntry {
            vertex_name: "Patient".to_string(),
            identifier_stem: vec!["id_source".to_string(), "patient_id".to_string()],
            id_value_field: "patient_id".to_string(),
            internal_id_key: vec![
                "id_source".to_string(),
                "object_type".to_string(),
                "patient_id".to_string(),
            ],
            properties: vec![
                prop("id_source", DataType::String),
                prop("patient_id", DataType::Number),
            ],
            rule_sets: Vec::new(),
        }
    }

    fn props(id_source: NormalizedValue, patient_id: NormalizedValue) -> NormalizedProperties {
        let mut p = NormalizedProperties::new();
        p.insert("id_source".to_string(), id_source);
        p.insert("patient_id".to_string(), patient_id);
        p
    }

    fn s(v: &str) -> NormalizedValue {
        NormalizedValue::Value(PropertyValue::String(v.to_string()))
    }

    fn n(v: i64) -> NormalizedValue {
        NormalizedValue::Value(number(v))
    }

    #[test]
    fn test_digest_is_md5_hex() {
        assert_eq!(internal_id_digest(""), "d41d8cd98f00b204e9800998ecf8427e");
        assert_eq!(internal_id_digest("ICFSPatient1001").len(), 32);
    }

    #[test]
    fn test_internal_id_deterministic() {
        let entry = patient_entry();
        let p = props(s("ICFS"), n(1001));
        let first = derive_internal_id(&entry, &p, true).unwrap();
        let second = derive_internal_id(&entry, &p.clone(), true).unwrap();
        assert_eq!(first, second);
        assert_eq!(first, InternalId::Derived(internal_id_digest("ICFSPatient1001")));
    }

    #[test]
    fn test_internal_id_missing_substitution() {
        let entry = patient_entry();
        let p = props(s("ICFS"), NormalizedValue::Missing);
        let id = derive_internal_id(&entry, &p, true).unwrap();
        assert_eq!(
            id,
            InternalId::Derived(internal_id_digest("ICFSPatientMISSING_OBJECT_PROPERTY"))
        );
    }

    #[test]
    fn test_internal_id_unresolvable_key() {
        let entry = patient_entry();
        let mut p = NormalizedProperties::new();
        p.insert("id_source".to_string(), s("ICFS"));

        let pending = derive_internal_id(&entry, &p, false).unwrap();
        assert_eq!(pending, InternalId::Pending(entry.internal_id_key.clone()));

        let err = derive_internal_id(&entry, &p, true).unwrap_err();
        assert!(matches!(err, Error::IdentityDerivation { .. }));
    }

    #[test]
    fn test_stem_plain() {
        let entry = patient_entry();
        let stem = derive_identifier_stem(&entry, &props(s("ICFS"), n(123)), &Map::new());
        assert_eq!(stem.to_string(), "#vertex#Patient#ICFS#123#");
        assert!(!stem.as_derived().unwrap().is_stub());
    }

    #[test]
    fn test_stem_null_key_is_stub() {
        let entry = patient_entry();
        let stem = derive_identifier_stem(&entry, &props(s("ICFS"), NormalizedValue::Null), &Map::new());
        let derived = stem.as_derived().unwrap();
        assert!(derived.object_type.ends_with("::stub"));
        assert_eq!(stem.to_string(), "#vertex#Patient::stub#ICFS##");
    }

    #[test]
    fn test_stem_suffix_applied_once() {
        let entry = patient_entry();
        let stem = derive_identifier_stem(
            &entry,
            &props(NormalizedValue::Null, NormalizedValue::Null),
            &Map::new(),
        );
        assert_eq!(stem.as_derived().unwrap().object_type, "Patient::stub");
    }

    #[test]
    fn test_stem_missing_key_is_undecorated() {
        let entry = patient_entry();
        let stem = derive_identifier_stem(&entry, &props(s("ICFS"), NormalizedValue::Missing), &Map::new());
        assert_eq!(stem, StemState::Pending(entry.identifier_stem.clone()));
    }

    #[test]
    fn test_stem_falls_back_to_raw_data() {
        let mut entry = patient_entry();
        entry.identifier_stem = vec!["id_source".to_string(), "region".to_string()];
        let raw = json!({"region": "north"});
        let stem = derive_identifier_stem(&entry, &props(s("ICFS"), n(1)), raw.as_object().unwrap());
        assert_eq!(stem.to_string(), "#vertex#Patient#ICFS#north#");
    }

    #[test]
    fn test_stem_parse() {
        let stem: IdentifierStem = "#vertex#Patient#ICFS#123#".parse().unwrap();
        assert_eq!(stem.graph_type, "vertex");
        assert_eq!(stem.object_type, "Patient");
        assert_eq!(stem.identifiers, vec!["ICFS", "123"]);

        let edge: IdentifierStem = "#edge#_received#".parse().unwrap();
        assert!(edge.is_edge());
        assert!(edge.identifiers.is_empty());
        assert_eq!(edge, IdentifierStem::edge("_received"));

        assert!("vertex#Patient#".parse::<IdentifierStem>().is_err());
        assert!("##".parse::<IdentifierStem>().is_err());
    }

    #[test]
    fn test_id_value_datetime_to_epoch() {
        let mut entry = patient_entry();
        entry.id_value_field = "admitted".to_string();
        let mut p = NormalizedProperties::new();
        let raw = json!("2019-03-04T10:30:00Z");
        p.insert(
            "admitted".to_string(),
            crate::values::normalize("admitted", DataType::DateTime, Some(&raw)).unwrap(),
        );
        assert_eq!(derive_id_value(&entry, &p).to_string(), "1551695400");
    }

    #[test]
    fn test_id_value_pending() {
        let entry = patient_entry();
        let p = props(s("ICFS"), NormalizedValue::Missing);
        assert_eq!(derive_id_value(&entry, &p), IdValue::Pending("patient_id".to_string()));
    }

    #[test]
    fn test_id_value_exchange_form() {
        let set = IdValue::Set(number(1001));
        let json = serde_json::to_value(&set).unwrap();
        assert_eq!(json, json!({"data_type": "N", "property_value": "1001"}));
        let back: IdValue = serde_json::from_value(json).unwrap();
        assert_eq!(back, set);

        let pending: IdValue = serde_json::from_value(json!("patient_id")).unwrap();
        assert!(!pending.is_set());
    }

    #[test]
    fn test_internal_id_exchange_form() {
        let derived: InternalId = serde_json::from_value(json!("abc")).unwrap();
        assert!(derived.is_derived());
        let pending: InternalId = serde_json::from_value(json!(["a", "b"])).unwrap();
        assert!(!pending.is_derived());
    }
}
