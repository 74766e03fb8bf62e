//! Scalar values and the coercions the evaluator relies on.

use std::hash::{Hash, Hasher};

use chrono::{DateTime, Utc};
use thiserror::Error;

/// One record: ordered `(column, value)` pairs. Order is the emission order
/// for JSON records, so rows are vectors of pairs rather than maps.
pub type Row = Vec<(String, Value)>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValueError {
    #[error("cannot read {0:?} as a number")]
    NotANumber(String),
}

/// Runtime cell value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    String(String),
    Number(f64),
    Date(DateTime<Utc>),
}

// .NET-style ticks: 100ns intervals since 0001-01-01T00:00:00Z.
const TICKS_PER_SECOND: i64 = 10_000_000;
const UNIX_EPOCH_TICKS: i64 = 621_355_968_000_000_000;

impl Value {
    /// Render the value the way the aggregators and `concat` see it.
    pub fn as_string(&self) -> String {
        match self {
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            Value::Date(d) => d.format("%m/%d/%Y %H:%M").to_string(),
            Value::Bool(true) => "True".to_string(),
            Value::Bool(false) => "False".to_string(),
        }
    }

    /// Numeric view used by arithmetic aggregations. Strings must parse,
    /// dates coerce to ticks, booleans to 0/1.
    pub fn as_float(&self) -> Result<f64, ValueError> {
        match self {
            Value::String(s) => s
                .parse::<f64>()
                .map_err(|_| ValueError::NotANumber(s.clone())),
            Value::Number(n) => Ok(*n),
            Value::Date(d) => Ok(ticks(d) as f64),
            Value::Bool(true) => Ok(1.0),
            Value::Bool(false) => Ok(0.0),
        }
    }

    /// Short tag for error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Bool(_) => "bool",
            Value::String(_) => "string",
            Value::Number(_) => "number",
            Value::Date(_) => "date",
        }
    }
}

fn ticks(d: &DateTime<Utc>) -> i64 {
    UNIX_EPOCH_TICKS + d.timestamp() * TICKS_PER_SECOND + i64::from(d.timestamp_subsec_nanos()) / 100
}

// Grouping keys and distinct sets index rows by value, so Value needs a
// total equality. NaN never occurs in inferred data.
impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            Value::Bool(b) => {
                state.write_u8(0);
                b.hash(state);
            }
            Value::String(s) => {
                state.write_u8(1);
                s.hash(state);
            }
            Value::Number(n) => {
                state.write_u8(2);
                n.to_bits().hash(state);
            }
            Value::Date(d) => {
                state.write_u8(3);
                d.hash(state);
            }
        }
    }
}

// ============ Sanity Tests ============
