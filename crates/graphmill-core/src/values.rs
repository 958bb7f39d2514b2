//! Property data types and value normalization.
//!
//! Raw extracted values arrive as arbitrary JSON. Every schema-declared
//! property is coerced to its declared [`DataType`] before identity derivation
//! or tier placement, producing a [`NormalizedValue`].

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

/// Declared data type of a schema property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    String,
    Number,
    DateTime,
    Boolean,
}

impl DataType {
    /// Short code used in the exchange representation.
    pub fn code(&self) -> &'static str {
        match self {
            DataType::String => "S",
            DataType::Number => "N",
            DataType::DateTime => "DT",
            DataType::Boolean => "B",
        }
    }

    /// Parse an exchange code (`S`, `N`, `DT`, `B`).
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "S" => Some(DataType::String),
            "N" => Some(DataType::Number),
            "DT" => Some(DataType::DateTime),
            "B" => Some(DataType::Boolean),
            _ => None,
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::String => write!(f, "String"),
            DataType::Number => write!(f, "Number"),
            DataType::DateTime => write!(f, "DateTime"),
            DataType::Boolean => write!(f, "Boolean"),
        }
    }
}

impl FromStr for DataType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "String" => Ok(DataType::String),
            "Number" => Ok(DataType::Number),
            "DateTime" => Ok(DataType::DateTime),
            "Boolean" => Ok(DataType::Boolean),
            _ => Err(format!("Invalid data type: {}", s)),
        }
    }
}

/// Serde adapter that writes a [`DataType`] as its exchange code.
pub mod data_type_code {
    use super::DataType;
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(data_type: &DataType, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(data_type.code())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DataType, D::Error> {
        let code = String::deserialize(deserializer)?;
        DataType::from_code(&code)
            .or_else(|| code.parse().ok())
            .ok_or_else(|| de::Error::custom(format!("unknown data type code: {}", code)))
    }
}

/// A typed, non-null property value.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    String(String),
    Number(Decimal),
    DateTime(DateTime<Utc>),
    Boolean(bool),
}

impl PropertyValue {
    pub fn data_type(&self) -> DataType {
        match self {
            PropertyValue::String(_) => DataType::String,
            PropertyValue::Number(_) => DataType::Number,
            PropertyValue::DateTime(_) => DataType::DateTime,
            PropertyValue::Boolean(_) => DataType::Boolean,
        }
    }

    /// JSON encoding used for payloads and for feeding values back into
    /// normalization. Numbers are written as strings to keep their precision.
    pub fn to_json(&self) -> Value {
        match self {
            PropertyValue::String(s) => Value::String(s.clone()),
            PropertyValue::Number(n) => Value::String(n.to_string()),
            PropertyValue::DateTime(dt) => Value::String(dt.to_rfc3339()),
            PropertyValue::Boolean(b) => Value::Bool(*b),
        }
    }

    /// Numeric epoch representation of a DateTime, used for id values.
    pub fn to_epoch(&self) -> Option<Decimal> {
        match self {
            PropertyValue::DateTime(dt) => {
                let micros = Decimal::from(dt.timestamp_micros());
                Some((micros / Decimal::from(1_000_000)).normalize())
            }
            _ => None,
        }
    }
}

impl fmt::Display for PropertyValue {
    /// Canonical string form. Internal ids are digests of these strings, so the
    /// format must not change.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::String(s) => write!(f, "{}", s),
            PropertyValue::Number(n) => write!(f, "{}", n),
            PropertyValue::DateTime(dt) => {
                if dt.timestamp_subsec_nanos() == 0 {
                    write!(f, "{}", dt.format("%Y-%m-%d %H:%M:%S%:z"))
                } else {
                    write!(f, "{}", dt.format("%Y-%m-%d %H:%M:%S%.6f%:z"))
                }
            }
            PropertyValue::Boolean(true) => write!(f, "True"),
            PropertyValue::Boolean(false) => write!(f, "False"),
        }
    }
}

/// Outcome of normalizing one schema-declared property.
#[derive(Debug, Clone, PartialEq)]
pub enum NormalizedValue {
    Value(PropertyValue),
    /// Key present but null or empty.
    Null,
    /// Key absent from the raw data.
    Missing,
}

impl NormalizedValue {
    pub fn is_missing(&self) -> bool {
        matches!(self, NormalizedValue::Missing)
    }

    pub fn as_value(&self) -> Option<&PropertyValue> {
        match self {
            NormalizedValue::Value(v) => Some(v),
            _ => None,
        }
    }

    /// JSON encoding; `Missing` has none.
    pub fn to_json(&self) -> Option<Value> {
        match self {
            NormalizedValue::Value(v) => Some(v.to_json()),
            NormalizedValue::Null => Some(Value::Null),
            NormalizedValue::Missing => None,
        }
    }
}

/// Coerce a raw JSON value to `data_type`.
///
/// `None` (absent key) yields `Missing`; JSON null or an empty string yields
/// `Null`. Anything else that cannot be coerced is an `InvalidValue` error.
pub fn normalize(
    property_name: &str,
    data_type: DataType,
    raw: Option<&Value>,
) -> Result<NormalizedValue> {
    let raw = match raw {
        None => return Ok(NormalizedValue::Missing),
        Some(Value::Null) => return Ok(NormalizedValue::Null),
        Some(Value::String(s)) if s.is_empty() => return Ok(NormalizedValue::Null),
        Some(v) => v,
    };

    let invalid = || Error::InvalidValue {
        property_name: property_name.to_string(),
        data_type: data_type.to_string(),
        value: raw.to_string(),
    };

    let value = match data_type {
        DataType::String => match raw {
            Value::String(s) => PropertyValue::String(s.clone()),
            Value::Number(n) => PropertyValue::String(n.to_string()),
            Value::Bool(b) => PropertyValue::String(b.to_string()),
            _ => return Err(invalid()),
        },
        DataType::Number => match raw {
            Value::Number(n) => PropertyValue::Number(parse_decimal(&n.to_string()).ok_or_else(invalid)?),
            Value::String(s) => PropertyValue::Number(parse_decimal(s.trim()).ok_or_else(invalid)?),
            _ => return Err(invalid()),
        },
        DataType::DateTime => match raw {
            Value::String(s) => PropertyValue::DateTime(parse_datetime(s.trim()).ok_or_else(invalid)?),
            Value::Number(n) => {
                let secs = n.as_f64().ok_or_else(invalid)?;
                PropertyValue::DateTime(from_epoch(secs).ok_or_else(invalid)?)
            }
            _ => return Err(invalid()),
        },
        DataType::Boolean => match raw {
            Value::Bool(b) => PropertyValue::Boolean(*b),
            Value::String(s) if s.eq_ignore_ascii_case("true") => PropertyValue::Boolean(true),
            Value::String(s) if s.eq_ignore_ascii_case("false") => PropertyValue::Boolean(false),
            _ => return Err(invalid()),
        },
    };
    Ok(NormalizedValue::Value(value))
}

fn parse_decimal(s: &str) -> Option<Decimal> {
    Decimal::from_str(s)
        .ok()
        .or_else(|| Decimal::from_scientific(s).ok())
}

/// Epoch seconds to a timestamp. Non-finite or out-of-range input is
/// `None`, never a saturated cast.
fn from_epoch(secs: f64) -> Option<DateTime<Utc>> {
    let micros = (secs * 1_000_000.0).round();
    if !micros.is_finite() || micros < i64::MIN as f64 || micros >= i64::MAX as f64 {
        return None;
    }
    let micros = micros as i64;
    let nanos = (micros.rem_euclid(1_000_000) * 1_000) as u32;
    DateTime::from_timestamp(micros.div_euclid(1_000_000), nanos)
}

/// Parse the accepted DateTime spellings. Naive forms are taken as UTC.
pub fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f%:z") {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0).map(|naive| Utc.from_utc_datetime(&naive));
    }
    s.parse::<f64>().ok().and_then(from_epoch)
}

/// Self-describing payload persisted by the sensitive and stored tiers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypedPayload {
    #[serde(with = "data_type_code")]
    pub data_type: DataType,
    pub property_value: Value,
}

impl TypedPayload {
    /// Build a payload; `Missing` values are never persisted.
    pub fn from_normalized(data_type: DataType, value: &NormalizedValue) -> Option<Self> {
        value.to_json().map(|property_value| Self {
            data_type,
            property_value,
        })
    }

    /// Re-normalize the payload to its declared type.
    pub fn normalize(&self, property_name: &str) -> Result<NormalizedValue> {
        normalize(property_name, self.data_type, Some(&self.property_value))
    }
}

/// Build a Number value from an integer.
pub fn number(n: i64) -> PropertyValue {
    PropertyValue::Number(Decimal::from(n))
}
