//! In-memory evaluation of the transformation pipeline.
//!
//! Each transformation consumes the previous stage's rows and materializes
//! the next. Condition evaluation is type-directed: the cell's runtime
//! value decides how the textual literal is read.

use std::cmp::Ordering;

use indexmap::{IndexMap, IndexSet};
use thiserror::Error;

use crate::ast::{
    Combine, Condition, GroupAggregation, PageOp, RelationalOperator, SortDirection,
    Transformation, WindowAggregation,
};
use crate::infer::parse_date_any;
use crate::value::{Row, Value, ValueError};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvalError {
    #[error("unknown column: {0}")]
    UnknownColumn(String),
    #[error("cannot compare {0} with {1}")]
    Incomparable(&'static str, &'static str),
    #[error("{op:?} is not valid for {kind} cells")]
    BadConditionType {
        op: RelationalOperator,
        kind: &'static str,
    },
    #[error("cannot read {0:?} as a date")]
    BadDateLiteral(String),
    #[error("cannot read {0:?} as a number")]
    BadNumberLiteral(String),
    #[error("range literal must be \"lo,hi\", got {0:?}")]
    BadRangeLiteral(String),
    #[error("cannot skip {wanted} rows, only {have} remain")]
    ShortSkip { wanted: usize, have: usize },
    #[error(transparent)]
    Value(#[from] ValueError),
}

/// Evaluator knobs. The running mean in `expandby` historically accumulates
/// its count by the observed value; `corrected_running_mean` switches it to
/// a true mean.
#[derive(Debug, Clone, Copy, Default)]
pub struct EvalOptions {
    pub corrected_running_mean: bool,
}

/// Fold the whole pipeline over a row set.
pub fn apply_pipeline(
    rows: Vec<Row>,
    transformations: &[Transformation],
    options: EvalOptions,
) -> Result<Vec<Row>, EvalError> {
    transformations
        .iter()
        .try_fold(rows, |rows, transformation| {
            apply(rows, transformation, options)
        })
}

/// Apply a single transformation.
pub fn apply(
    rows: Vec<Row>,
    transformation: &Transformation,
    options: EvalOptions,
) -> Result<Vec<Row>, EvalError> {
    match transformation {
        Transformation::DropColumns(names) => Ok(drop_columns(rows, names)),
        Transformation::SortBy(fields) => sort_by(rows, fields),
        Transformation::FilterBy {
            combine,
            conditions,
        } => filter_by(rows, *combine, conditions),
        Transformation::GroupBy { keys, aggregations } => group_by(rows, keys, aggregations),
        Transformation::WindowBy {
            key,
            size,
            aggregations,
        } => window_by(rows, key, *size, aggregations),
        Transformation::ExpandBy { key, aggregations } => {
            expand_by(rows, key, aggregations, options)
        }
        Transformation::Paging(ops) => paging(rows, ops),
        Transformation::Empty => Ok(rows),
    }
}

/// Look up a cell by column name.
pub(crate) fn field<'a>(row: &'a Row, name: &str) -> Result<&'a Value, EvalError> {
    row.iter()
        .find(|(column, _)| column == name)
        .map(|(_, value)| value)
        .ok_or_else(|| EvalError::UnknownColumn(name.to_string()))
}

// ============ Drop ============

fn drop_columns(rows: Vec<Row>, names: &[String]) -> Vec<Row> {
    rows.into_iter()
        .map(|row| {
            row.into_iter()
                .filter(|(column, _)| !names.iter().any(|dropped| dropped == column))
                .collect()
        })
        .collect()
}

// ============ Sort ============

fn compare_values(a: &Value, b: &Value) -> Result<Ordering, EvalError> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => Ok(x.total_cmp(y)),
        (Value::String(x), Value::String(y)) => Ok(x.cmp(y)),
        (Value::Date(x), Value::Date(y)) => Ok(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Ok(x.cmp(y)),
        _ => Err(EvalError::Incomparable(a.kind(), b.kind())),
    }
}

/// Stable sort under a lexicographic comparator over the declared fields;
/// the first declared field is the primary key.
fn sort_by(mut rows: Vec<Row>, fields: &[(String, SortDirection)]) -> Result<Vec<Row>, EvalError> {
    let mut failure: Option<EvalError> = None;
    rows.sort_by(|a, b| {
        for (name, direction) in fields {
            let ordering = match (field(a, name), field(b, name)) {
                (Ok(x), Ok(y)) => match compare_values(x, y) {
                    Ok(ordering) => ordering,
                    Err(e) => {
                        failure.get_or_insert(e);
                        return Ordering::Equal;
                    }
                },
                (Err(e), _) | (_, Err(e)) => {
                    failure.get_or_insert(e);
                    return Ordering::Equal;
                }
            };
            let ordering = match direction {
                SortDirection::Ascending => ordering,
                SortDirection::Descending => ordering.reverse(),
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    });
    match failure {
        Some(e) => Err(e),
        None => Ok(rows),
    }
}

fn sort_on_key(rows: Vec<Row>, key: &str) -> Result<Vec<Row>, EvalError> {
    sort_by(rows, &[(key.to_string(), SortDirection::Ascending)])
}

// ============ Filter ============

fn filter_by(
    rows: Vec<Row>,
    combine: Combine,
    conditions: &[Condition],
) -> Result<Vec<Row>, EvalError> {
    let mut kept = Vec::new();
    for row in rows {
        let keep = match combine {
            Combine::And => {
                let mut all = true;
                for condition in conditions {
                    if !eval_condition(&row, condition)? {
                        all = false;
                        break;
                    }
                }
                all
            }
            Combine::Or => {
                let mut any = false;
                for condition in conditions {
                    if eval_condition(&row, condition)? {
                        any = true;
                        break;
                    }
                }
                any
            }
        };
        if keep {
            kept.push(row);
        }
    }
    Ok(kept)
}

fn eval_condition(row: &Row, condition: &Condition) -> Result<bool, EvalError> {
    use RelationalOperator::*;
    let cell = field(row, &condition.field)?;
    let literal = condition.value.as_str();
    match (condition.op, cell) {
        (Like, Value::String(s)) => Ok(s.to_lowercase().contains(&literal.to_lowercase())),
        (InRange, Value::Date(d)) => {
            let (lo, hi) = split_range(literal)?;
            Ok(*d >= date_literal(lo)? && *d <= date_literal(hi)?)
        }
        (op, Value::Date(d)) => {
            let bound = date_literal(literal)?;
            match op {
                Equals => Ok(*d == bound),
                NotEquals => Ok(*d != bound),
                LessThan => Ok(*d < bound),
                GreaterThan => Ok(*d > bound),
                _ => Err(EvalError::BadConditionType { op, kind: "date" }),
            }
        }
        (Equals, Value::Bool(b)) => Ok(*b == literal.eq_ignore_ascii_case("true")),
        (NotEquals, Value::Bool(b)) => Ok(*b != literal.eq_ignore_ascii_case("true")),
        (Equals, Value::String(s)) => Ok(s == literal),
        (NotEquals, Value::String(s)) => Ok(s != literal),
        (GreaterThan, Value::Number(n)) => Ok(*n > number_literal(literal)?),
        (LessThan, Value::Number(n)) => Ok(*n < number_literal(literal)?),
        (InRange, Value::Number(n)) => {
            let (lo, hi) = split_range(literal)?;
            Ok(*n >= number_literal(lo)? && *n <= number_literal(hi)?)
        }
        (op, cell) => Err(EvalError::BadConditionType {
            op,
            kind: cell.kind(),
        }),
    }
}

fn split_range(literal: &str) -> Result<(&str, &str), EvalError> {
    literal
        .split_once(',')
        .ok_or_else(|| EvalError::BadRangeLiteral(literal.to_string()))
}

fn date_literal(literal: &str) -> Result<chrono::DateTime<chrono::Utc>, EvalError> {
    parse_date_any(literal).ok_or_else(|| EvalError::BadDateLiteral(literal.to_string()))
}

fn number_literal(literal: &str) -> Result<f64, EvalError> {
    literal
        .parse::<f64>()
        .map_err(|_| EvalError::BadNumberLiteral(literal.to_string()))
}

// ============ Grouping ============

fn floats(rows: &[Row], name: &str) -> Result<Vec<f64>, EvalError> {
    rows.iter()
        .map(|row| Ok(field(row, name)?.as_float()?))
        .collect()
}

fn distinct_values(rows: &[Row], name: &str) -> Result<IndexSet<Value>, EvalError> {
    let mut seen = IndexSet::new();
    for row in rows {
        seen.insert(field(row, name)?.clone());
    }
    Ok(seen)
}

fn group_by(
    rows: Vec<Row>,
    keys: &[String],
    aggregations: &[GroupAggregation],
) -> Result<Vec<Row>, EvalError> {
    let mut groups: IndexMap<Vec<Value>, Vec<Row>> = IndexMap::new();
    for row in rows {
        let key = keys
            .iter()
            .map(|k| Ok(field(&row, k)?.clone()))
            .collect::<Result<Vec<_>, EvalError>>()?;
        groups.entry(key).or_default().push(row);
    }

    let mut out = Vec::with_capacity(groups.len());
    for (key, members) in &groups {
        let mut row = Row::new();
        for aggregation in aggregations {
            match aggregation {
                GroupAggregation::GroupKey => {
                    for (name, value) in keys.iter().zip(key) {
                        row.push((name.clone(), value.clone()));
                    }
                }
                GroupAggregation::CountAll => {
                    row.push(("count".to_string(), Value::Number(members.len() as f64)));
                }
                GroupAggregation::CountDistinct(name) => {
                    let seen = distinct_values(members, name)?;
                    row.push((name.clone(), Value::Number(seen.len() as f64)));
                }
                GroupAggregation::ConcatValues(name) => {
                    let seen = distinct_values(members, name)?;
                    let joined = seen
                        .iter()
                        .map(Value::as_string)
                        .collect::<Vec<_>>()
                        .join(", ");
                    row.push((name.clone(), Value::String(joined)));
                }
                GroupAggregation::Sum(name) => {
                    row.push((name.clone(), Value::Number(floats(members, name)?.iter().sum())));
                }
                GroupAggregation::Mean(name) => {
                    let values = floats(members, name)?;
                    let mean = values.iter().sum::<f64>() / values.len() as f64;
                    row.push((name.clone(), Value::Number(mean)));
                }
            }
        }
        out.push(row);
    }
    Ok(out)
}

// ============ Sliding windows ============

fn window_by(
    rows: Vec<Row>,
    key: &str,
    size: usize,
    aggregations: &[WindowAggregation],
) -> Result<Vec<Row>, EvalError> {
    let rows = sort_on_key(rows, key)?;
    if size == 0 || rows.len() < size {
        return Ok(Vec::new());
    }

    let mut out = Vec::with_capacity(rows.len() + 1 - size);
    for window in rows.windows(size) {
        let keys = window
            .iter()
            .map(|row| Ok(field(row, key)?.clone()))
            .collect::<Result<Vec<_>, EvalError>>()?;
        let mut row = Row::new();
        for aggregation in aggregations {
            row.push(window_output(aggregation, window, key, &keys)?);
        }
        out.push(row);
    }
    Ok(out)
}

fn window_output(
    aggregation: &WindowAggregation,
    window: &[Row],
    key: &str,
    keys: &[Value],
) -> Result<(String, Value), EvalError> {
    let output = match aggregation {
        WindowAggregation::Min(name) => {
            let min = floats(window, name)?
                .into_iter()
                .fold(f64::INFINITY, f64::min);
            (name.clone(), Value::Number(min))
        }
        WindowAggregation::Max(name) => {
            let max = floats(window, name)?
                .into_iter()
                .fold(f64::NEG_INFINITY, f64::max);
            (name.clone(), Value::Number(max))
        }
        WindowAggregation::Sum(name) => {
            (name.clone(), Value::Number(floats(window, name)?.iter().sum()))
        }
        WindowAggregation::Mean(name) => {
            let values = floats(window, name)?;
            let mean = values.iter().sum::<f64>() / values.len() as f64;
            (name.clone(), Value::Number(mean))
        }
        WindowAggregation::FirstKey => (format!("first {key}"), keys[0].clone()),
        WindowAggregation::LastKey => (format!("last {key}"), keys[keys.len() - 1].clone()),
        WindowAggregation::MiddleKey => {
            (format!("middle {key}"), keys[(keys.len() - 1) / 2].clone())
        }
    };
    Ok(output)
}

// ============ Expanding windows ============

/// Running aggregator: one mutable state stepped once per row.
trait Accumulator {
    fn step(&mut self, row: &Row) -> Result<(String, Value), EvalError>;
}

struct RunningFold {
    name: String,
    state: Option<f64>,
    fold: fn(f64, f64) -> f64,
}

impl Accumulator for RunningFold {
    fn step(&mut self, row: &Row) -> Result<(String, Value), EvalError> {
        let x = field(row, &self.name)?.as_float()?;
        let next = match self.state {
            None => x,
            Some(acc) => (self.fold)(acc, x),
        };
        self.state = Some(next);
        Ok((self.name.clone(), Value::Number(next)))
    }
}

struct RunningMean {
    name: String,
    sum: f64,
    count: f64,
    corrected: bool,
}

impl Accumulator for RunningMean {
    fn step(&mut self, row: &Row) -> Result<(String, Value), EvalError> {
        let x = field(row, &self.name)?.as_float()?;
        self.sum += x;
        // The historical accumulator grows the count by the value itself.
        self.count += if self.corrected { 1.0 } else { x };
        Ok((self.name.clone(), Value::Number(self.sum / self.count)))
    }
}

struct PinnedFirst {
    key: String,
    first: Option<Value>,
}

impl Accumulator for PinnedFirst {
    fn step(&mut self, row: &Row) -> Result<(String, Value), EvalError> {
        let value = field(row, &self.key)?.clone();
        let first = self.first.get_or_insert(value);
        Ok((format!("first {}", self.key), first.clone()))
    }
}

struct CurrentLast {
    key: String,
}

impl Accumulator for CurrentLast {
    fn step(&mut self, row: &Row) -> Result<(String, Value), EvalError> {
        Ok((format!("last {}", self.key), field(row, &self.key)?.clone()))
    }
}

struct BufferedMiddle {
    key: String,
    seen: Vec<Value>,
}

impl Accumulator for BufferedMiddle {
    fn step(&mut self, row: &Row) -> Result<(String, Value), EvalError> {
        self.seen.push(field(row, &self.key)?.clone());
        let middle = self.seen[self.seen.len() / 2].clone();
        Ok((format!("middle {}", self.key), middle))
    }
}

fn accumulator(
    aggregation: &WindowAggregation,
    key: &str,
    options: EvalOptions,
) -> Box<dyn Accumulator> {
    match aggregation {
        WindowAggregation::Min(name) => Box::new(RunningFold {
            name: name.clone(),
            state: None,
            fold: f64::min,
        }),
        WindowAggregation::Max(name) => Box::new(RunningFold {
            name: name.clone(),
            state: None,
            fold: f64::max,
        }),
        WindowAggregation::Sum(name) => Box::new(RunningFold {
            name: name.clone(),
            state: None,
            fold: |acc, x| acc + x,
        }),
        WindowAggregation::Mean(name) => Box::new(RunningMean {
            name: name.clone(),
            sum: 0.0,
            count: 0.0,
            corrected: options.corrected_running_mean,
        }),
        WindowAggregation::FirstKey => Box::new(PinnedFirst {
            key: key.to_string(),
            first: None,
        }),
        WindowAggregation::LastKey => Box::new(CurrentLast {
            key: key.to_string(),
        }),
        WindowAggregation::MiddleKey => Box::new(BufferedMiddle {
            key: key.to_string(),
            seen: Vec::new(),
        }),
    }
}

fn expand_by(
    rows: Vec<Row>,
    key: &str,
    aggregations: &[WindowAggregation],
    options: EvalOptions,
) -> Result<Vec<Row>, EvalError> {
    let rows = sort_on_key(rows, key)?;
    let mut accumulators: Vec<Box<dyn Accumulator>> = aggregations
        .iter()
        .map(|aggregation| accumulator(aggregation, key, options))
        .collect();

    let mut out = Vec::with_capacity(rows.len());
    for row in &rows {
        let mut emitted = Row::new();
        for accumulator in &mut accumulators {
            emitted.push(accumulator.step(row)?);
        }
        out.push(emitted);
    }
    Ok(out)
}

// ============ Paging ============

fn paging(rows: Vec<Row>, ops: &[PageOp]) -> Result<Vec<Row>, EvalError> {
    ops.iter().try_fold(rows, |mut rows, op| match *op {
        PageOp::Take(n) => {
            rows.truncate(n);
            Ok(rows)
        }
        PageOp::Skip(n) => {
            if rows.len() < n {
                return Err(EvalError::ShortSkip {
                    wanted: n,
                    have: rows.len(),
                });
            }
            Ok(rows.split_off(n))
        }
    })
}

// ============ Action projections ============

/// Distinct values of one column, in first-occurrence order.
pub fn range_values(rows: &[Row], name: &str) -> Result<Vec<Value>, EvalError> {
    Ok(distinct_values(rows, name)?.into_iter().collect())
}

/// Project each row to exactly its `(key, value)` cells.
pub fn series_pairs(rows: &[Row], key: &str, value: &str) -> Result<Vec<(Value, Value)>, EvalError> {
    rows.iter()
        .map(|row| Ok((field(row, key)?.clone(), field(row, value)?.clone())))
        .collect()
}

// ============ Sanity Tests ============
// End-to-end coverage lives in tests/integration.rs.
