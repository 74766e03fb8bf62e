//! Column type inference over textual samples.
//!
//! Each cell is classified on its own, then a column's type is the fold of
//! `unify` over the sampled cells. The lattice keeps numeric and date
//! refinements as long as every sample agrees and collapses to `String`
//! otherwise.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};

/// Classification reads at most this many rows.
pub const SAMPLE_ROWS: usize = 100;

/// Date parsing locale. `Invariant` reads month-first slash dates, `EnGb`
/// day-first; ISO dates parse under both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Culture {
    Invariant,
    EnGb,
}

/// Inferred column type. `Date(None)` is a date whose samples were all
/// ambiguous between locales.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InferredType {
    Any,
    String,
    Int,
    Float,
    Bool,
    OneZero,
    Date(Option<Culture>),
}

/// Ordered `(column, type)` pairs for one table.
pub type Metadata = Vec<(String, InferredType)>;

const ISO_DATETIME: &[&str] = &["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"];
const ISO_DATE: &[&str] = &["%Y-%m-%d"];

fn slash_formats(culture: Culture) -> (&'static [&'static str], &'static [&'static str]) {
    match culture {
        Culture::Invariant => (
            &["%m/%d/%Y %H:%M:%S", "%m/%d/%Y %H:%M"],
            &["%m/%d/%Y"],
        ),
        Culture::EnGb => (
            &["%d/%m/%Y %H:%M:%S", "%d/%m/%Y %H:%M"],
            &["%d/%m/%Y"],
        ),
    }
}

/// Parse a textual date as a UTC instant under one locale.
pub fn parse_date(s: &str, culture: Culture) -> Option<DateTime<Utc>> {
    let (slash_datetime, slash_date) = slash_formats(culture);
    for fmt in slash_datetime.iter().chain(ISO_DATETIME) {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt.and_utc());
        }
    }
    for fmt in slash_date.iter().chain(ISO_DATE) {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return Some(d.and_time(NaiveTime::MIN).and_utc());
        }
    }
    None
}

/// Parse a textual date, preferring the invariant locale when unambiguous.
pub fn parse_date_any(s: &str) -> Option<DateTime<Utc>> {
    parse_date(s, Culture::Invariant).or_else(|| parse_date(s, Culture::EnGb))
}

/// Classify a single cell.
pub fn infer_type(s: &str) -> InferredType {
    if let Ok(n) = s.parse::<i32>() {
        return if n == 0 || n == 1 {
            InferredType::OneZero
        } else {
            InferredType::Int
        };
    }
    if let Ok(f) = s.parse::<f64>()
        && f.is_finite()
    {
        return InferredType::Float;
    }
    let invariant = parse_date(s, Culture::Invariant).is_some();
    let en_gb = parse_date(s, Culture::EnGb).is_some();
    match (invariant, en_gb) {
        (true, true) => return InferredType::Date(None),
        (true, false) => return InferredType::Date(Some(Culture::Invariant)),
        (false, true) => return InferredType::Date(Some(Culture::EnGb)),
        (false, false) => {}
    }
    if s.eq_ignore_ascii_case("true") || s.eq_ignore_ascii_case("false") {
        return InferredType::Bool;
    }
    InferredType::String
}

/// Join of two inferred types. Commutative and associative; `Any` is the
/// identity and `String` the top.
pub fn unify(a: InferredType, b: InferredType) -> InferredType {
    use InferredType::*;
    match (a, b) {
        _ if a == b => a,
        (Any, t) | (t, Any) => t,
        (Date(c), Date(None)) | (Date(None), Date(c)) => Date(c),
        (Bool, OneZero) | (OneZero, Bool) => Bool,
        (Int, OneZero) | (OneZero, Int) => Int,
        (Float, OneZero) | (OneZero, Float) => Float,
        (Int, Float) | (Float, Int) => Float,
        _ => String,
    }
}

/// Infer per-column types from a header and textual records, sampling at
/// most the first [`SAMPLE_ROWS`] rows.
pub fn infer_metadata<S: AsRef<str>>(header: &[S], records: &[Vec<S>]) -> Metadata {
    header
        .iter()
        .enumerate()
        .map(|(index, name)| {
            let ty = records
                .iter()
                .take(SAMPLE_ROWS)
                .filter_map(|record| record.get(index))
                .fold(InferredType::Any, |acc, cell| {
                    unify(acc, infer_type(cell.as_ref()))
                });
            (name.as_ref().to_string(), ty)
        })
        .collect()
}

/// External type name used by the metadata action.
pub fn format_type(ty: InferredType) -> &'static str {
    match ty {
        InferredType::Bool | InferredType::OneZero => "bool",
        InferredType::Int | InferredType::Float => "number",
        InferredType::Date(_) => "date",
        InferredType::Any | InferredType::String => "string",
    }
}

// ============ Sanity Tests ============
