//! JSON rendering of rows, series and metadata.

use chrono::SecondsFormat;
use serde_json::{Map, Value as Json};

use crate::infer::{Metadata, format_type};
use crate::value::{Row, Value};

/// One cell as JSON. Dates render as ISO-8601 extended instants.
pub fn json_value(value: &Value) -> Json {
    match value {
        Value::Bool(b) => Json::Bool(*b),
        Value::Number(n) => Json::from(*n),
        Value::String(s) => Json::String(s.clone()),
        Value::Date(d) => Json::String(d.to_rfc3339_opts(SecondsFormat::Secs, true)),
    }
}

/// Rows as an array of records, preserving column order.
pub fn records(rows: &[Row]) -> Json {
    Json::Array(
        rows.iter()
            .map(|row| {
                Json::Object(
                    row.iter()
                        .map(|(name, value)| (name.clone(), json_value(value)))
                        .collect::<Map<_, _>>(),
                )
            })
            .collect(),
    )
}

/// Key/value pairs as an array of 2-tuples.
pub fn series(pairs: &[(Value, Value)]) -> Json {
    Json::Array(
        pairs
            .iter()
            .map(|(key, value)| Json::Array(vec![json_value(key), json_value(value)]))
            .collect(),
    )
}

/// Scalar values as a flat array.
pub fn scalars(values: &[Value]) -> Json {
    Json::Array(values.iter().map(json_value).collect())
}

/// Column name → external type name object, in column order.
pub fn metadata_object(metadata: &Metadata) -> Json {
    Json::Object(
        metadata
            .iter()
            .map(|(name, ty)| (name.clone(), Json::String(format_type(*ty).to_string())))
            .collect::<Map<_, _>>(),
    )
}

// ============ Sanity Tests ============
