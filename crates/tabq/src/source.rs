//! Building typed datasets from textual records.
//!
//! The delimited-text collaborator delivers a header plus string records;
//! this module infers the column types from a sample and materializes every
//! cell into a [`Value`] guided by its column's type.

use thiserror::Error;

use crate::infer::{InferredType, Metadata, infer_metadata, parse_date, parse_date_any};
use crate::value::{Row, Value};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DataError {
    #[error("input has no header row")]
    Empty,
    #[error("row {row} has {got} fields, expected {expected}")]
    RaggedRow {
        row: usize,
        got: usize,
        expected: usize,
    },
    #[error("row {row}, column {column:?}: {value:?} is not a valid {ty}")]
    CellMismatch {
        row: usize,
        column: String,
        value: String,
        ty: &'static str,
    },
}

/// A materialized table: inferred metadata plus typed rows.
#[derive(Debug, Clone, PartialEq)]
pub struct DataSet {
    pub metadata: Metadata,
    pub rows: Vec<Row>,
}

/// Infer types and materialize a dataset from a header and records.
pub fn from_records<S: AsRef<str>>(
    header: &[S],
    records: &[Vec<S>],
) -> Result<DataSet, DataError> {
    if header.is_empty() {
        return Err(DataError::Empty);
    }
    let metadata = infer_metadata(header, records);

    let mut rows = Vec::with_capacity(records.len());
    for (index, record) in records.iter().enumerate() {
        if record.len() != metadata.len() {
            return Err(DataError::RaggedRow {
                row: index,
                got: record.len(),
                expected: metadata.len(),
            });
        }
        let row = metadata
            .iter()
            .zip(record)
            .map(|((name, ty), raw)| {
                let raw = raw.as_ref();
                let value = cell_value(raw, *ty).ok_or_else(|| DataError::CellMismatch {
                    row: index,
                    column: name.clone(),
                    value: raw.to_string(),
                    ty: type_label(*ty),
                })?;
                Ok((name.clone(), value))
            })
            .collect::<Result<Row, DataError>>()?;
        rows.push(row);
    }

    Ok(DataSet { metadata, rows })
}

fn cell_value(raw: &str, ty: InferredType) -> Option<Value> {
    match ty {
        InferredType::Any | InferredType::String => Some(Value::String(raw.to_string())),
        InferredType::Int | InferredType::Float => raw.parse::<f64>().ok().map(Value::Number),
        // Parse the way the classifier does: "01" and "+1" are OneZero too.
        InferredType::OneZero => match raw.parse::<i32>() {
            Ok(0) => Some(Value::Bool(false)),
            Ok(1) => Some(Value::Bool(true)),
            _ => None,
        },
        InferredType::Bool => {
            if raw.eq_ignore_ascii_case("true") {
                Some(Value::Bool(true))
            } else if raw.eq_ignore_ascii_case("false") {
                Some(Value::Bool(false))
            } else {
                None
            }
        }
        InferredType::Date(Some(culture)) => parse_date(raw, culture).map(Value::Date),
        InferredType::Date(None) => parse_date_any(raw).map(Value::Date),
    }
}

fn type_label(ty: InferredType) -> &'static str {
    match ty {
        InferredType::Any => "any",
        InferredType::String => "string",
        InferredType::Int => "int",
        InferredType::Float => "float",
        InferredType::Bool => "bool",
        InferredType::OneZero => "0/1",
        InferredType::Date(_) => "date",
    }
}

// ============ Sanity Tests ============
