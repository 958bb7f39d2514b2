//! Deriving a single value from a named extraction.

use graphmill_core::{Error, ExtractedRecord, Result};
use serde_json::Value as JsonValue;
use tracing::trace;

/// The one distinct value of `property_name` across every entry of the
/// extraction `extraction_name`.
///
/// Entries without the field are skipped. No value at all (including an
/// absent extraction) is `Ok(None)`; more than one distinct value is an
/// [`Error::AmbiguousExtraction`].
pub fn distinct_value(
    record: &ExtractedRecord,
    extraction_name: &str,
    property_name: &str,
) -> Result<Option<JsonValue>> {
    let mut distinct: Vec<&JsonValue> = Vec::new();
    for entry in record.extraction(extraction_name)? {
        if let Some(value) = entry.get(property_name) {
            if !distinct.contains(&value) {
                distinct.push(value);
            }
        }
    }
    trace!(
        extraction = extraction_name,
        property = property_name,
        distinct = distinct.len(),
        "Derived extraction value"
    );
    match distinct.len() {
        0 => Ok(None),
        1 => Ok(Some(distinct[0].clone())),
        _ => Err(Error::AmbiguousExtraction {
            extraction_name: extraction_name.to_string(),
            property_name: property_name.to_string(),
            values: distinct.iter().map(|v| v.to_string()).collect(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(extractions: JsonValue) -> ExtractedRecord {
        let mut data = extractions;
        data["source"] = json!({});
        serde_json::from_value(json!({
            "object_type": "Patient",
            "identifier": "#vertex#Patient#",
            "id_value": 1,
            "extracted_data": data
        }))
        .unwrap()
    }

    #[test]
    fn test_single_distinct_value() {
        let r = record(json!({"visits": [{"clinic": "A"}, {"clinic": "A"}, {"other": 1}]}));
        assert_eq!(distinct_value(&r, "visits", "clinic").unwrap(), Some(json!("A")));
    }

    #[test]
    fn test_no_entries() {
        let r = record(json!({"visits": []}));
        assert_eq!(distinct_value(&r, "visits", "clinic").unwrap(), None);
        assert_eq!(distinct_value(&r, "absent", "clinic").unwrap(), None);
    }

    #[test]
    fn test_ambiguous() {
        let r = record(json!({"visits": [{"clinic": "A"}, {"clinic": "B"}]}));
        let err = distinct_value(&r, "visits", "clinic").unwrap_err();
        match err {
            Error::AmbiguousExtraction {
                extraction_name,
                property_name,
                values,
            } => {
                assert_eq!(extraction_name, "visits");
                assert_eq!(property_name, "clinic");
                assert_eq!(values.len(), 2);
            }
            other => panic!("expected AmbiguousExtraction, got {:?}", other),
        }
    }
}
