//! Incoming record shape.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// One record extracted from a source system, ready for resolution.
///
/// `extracted_data` holds the `source` object plus any number of named
/// extractions, each an array of objects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedRecord {
    pub object_type: String,
    pub identifier: String,
    pub id_value: Value,
    pub extracted_data: Map<String, Value>,
}

impl ExtractedRecord {
    /// Parse a record and check its shape.
    pub fn from_json(document: &str) -> Result<Self> {
        let record: Self = serde_json::from_str(document)
            .map_err(|e| Error::InvalidRecord(format!("malformed record: {}", e)))?;
        record.source()?;
        Ok(record)
    }

    /// The `source` sub-object the source vertex is built from.
    pub fn source(&self) -> Result<&Map<String, Value>> {
        match self.extracted_data.get("source") {
            Some(Value::Object(map)) => Ok(map),
            Some(_) => Err(Error::InvalidRecord(
                "extracted_data.source is not an object".to_string(),
            )),
            None => Err(Error::InvalidRecord(
                "extracted_data has no source object".to_string(),
            )),
        }
    }

    /// Entries of a named extraction. An absent extraction has no entries.
    pub fn extraction(&self, name: &str) -> Result<Vec<&Map<String, Value>>> {
        match self.extracted_data.get(name) {
            None | Some(Value::Null) => Ok(Vec::new()),
            Some(Value::Array(entries)) => entries
                .iter()
                .map(|entry| {
                    entry.as_object().ok_or_else(|| {
                        Error::InvalidRecord(format!("extraction {} holds a non-object entry", name))
                    })
                })
                .collect(),
            Some(_) => Err(Error::InvalidRecord(format!(
                "extraction {} is not an array",
                name
            ))),
        }
    }

    /// Whether the record carries the named extraction at all. An explicit
    /// `null` counts as carried.
    pub fn has_extraction(&self, name: &str) -> bool {
        self.extracted_data.contains_key(name)
    }

    /// The `id_value` rendered as a ledger key.
    pub fn id_value_key(&self) -> String {
        match &self.id_value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}
