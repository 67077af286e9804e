//! Conversion between plain JSON and Firestore's typed REST `Value` encoding.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use std::collections::BTreeMap;

pub type Fields = BTreeMap<String, FirestoreValue>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FirestoreValue {
    NullValue(()),
    BooleanValue(bool),
    /// int64 travels as a decimal string.
    IntegerValue(String),
    DoubleValue(f64),
    TimestampValue(String),
    StringValue(String),
    BytesValue(String),
    ReferenceValue(String),
    GeoPointValue(GeoPoint),
    ArrayValue(ArrayValue),
    MapValue(MapValue),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    #[serde(default)]
    pub latitude: f64,
    #[serde(default)]
    pub longitude: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArrayValue {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<FirestoreValue>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MapValue {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub fields: Fields,
}

impl FirestoreValue {
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => FirestoreValue::NullValue(()),
            Value::Bool(b) => FirestoreValue::BooleanValue(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => FirestoreValue::IntegerValue(i.to_string()),
                None => FirestoreValue::DoubleValue(n.as_f64().unwrap_or(f64::NAN)),
            },
            Value::String(s) => FirestoreValue::StringValue(s.clone()),
            Value::Array(items) => FirestoreValue::ArrayValue(ArrayValue {
                values: items.iter().map(Self::from_json).collect(),
            }),
            Value::Object(map) => FirestoreValue::MapValue(MapValue {
                fields: encode_fields(map),
            }),
        }
    }

    pub fn into_json(self) -> Result<Value> {
        Ok(match self {
            FirestoreValue::NullValue(()) => Value::Null,
            FirestoreValue::BooleanValue(b) => Value::Bool(b),
            FirestoreValue::IntegerValue(s) => {
                let i: i64 = s
                    .parse()
                    .map_err(|e| Error::Store(format!("Invalid integerValue '{}': {}", s, e)))?;
                Value::Number(i.into())
            }
            // Non-finite doubles have no JSON form.
            FirestoreValue::DoubleValue(f) => Number::from_f64(f).map_or(Value::Null, Value::Number),
            FirestoreValue::TimestampValue(s)
            | FirestoreValue::StringValue(s)
            | FirestoreValue::BytesValue(s)
            | FirestoreValue::ReferenceValue(s) => Value::String(s),
            FirestoreValue::GeoPointValue(p) => serde_json::json!({
                "latitude": p.latitude,
                "longitude": p.longitude,
            }),
            FirestoreValue::ArrayValue(array) => Value::Array(
                array
                    .values
                    .into_iter()
                    .map(Self::into_json)
                    .collect::<Result<Vec<_>>>()?,
            ),
            FirestoreValue::MapValue(map) => Value::Object(decode_fields(map.fields)?),
        })
    }
}

pub fn encode_fields(map: &Map<String, Value>) -> Fields {
    map.iter()
        .map(|(k, v)| (k.clone(), FirestoreValue::from_json(v)))
        .collect()
}

pub fn decode_fields(fields: Fields) -> Result<Map<String, Value>> {
    fields
        .into_iter()
        .map(|(k, v)| Ok((k, v.into_json()?)))
        .collect()
}
