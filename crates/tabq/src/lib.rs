//! tabq - tabular pivot/query engine
//!
//! Parses a compact URL-encoded transformation DSL into a typed query AST
//! and executes it either in-memory over columnar-typed rows or by
//! translating a subset of the pipeline into a paging-aware SQL statement.
//!
//! ## Quick Start
//!
//! ```ignore
//! use tabq::{QueryEngine, Request, from_records};
//!
//! let people = from_records(&header, &records)?;
//!
//! let mut engine = QueryEngine::new();
//! engine.add_dataset("people", people);
//!
//! let json = engine.execute(
//!     "people",
//!     &Request::query("$filter(age gte 18)$sort(name asc)$take(20)"),
//! )?;
//! ```
//!
//! ## DSL
//!
//! - `drop`, `sort`, `filter`, `groupby`, `windowby`, `expandby`, `take`,
//!   `skip` transform rows in pipeline order
//! - a trailing `metadata`, `series(k,v)` or `range(f)` chunk selects the
//!   response shape; the default is the full record array
//! - single-quoted identifiers keep commas and spaces literal

pub mod ast;
mod engine;
mod eval;
mod infer;
mod parse;
mod pretty;
mod render;
mod source;
mod sql;
mod value;

use thiserror::Error;

// ============ Primary Public API ============

pub use engine::{PREVIEW_ROWS, QueryEngine, Request, run_in_memory};
pub use eval::{EvalError, EvalOptions, apply_pipeline};
pub use infer::{
    Culture, InferredType, Metadata, format_type, infer_metadata, infer_type, parse_date,
    parse_date_any, unify,
};
pub use parse::{ParseError, parse};
pub use pretty::stringify;
pub use source::{DataError, DataSet, from_records};
pub use sql::{
    OrderByItem, SelectItem, SqlClient, SqlError, SqlQuery, SqlRow, SqlSource, format_name,
    format_sql_query, materialize_row, translate, translates,
};
pub use value::{Row, Value, ValueError};

/// Run a one-off query against a dataset.
pub fn run(query: &str, dataset: &DataSet) -> Result<serde_json::Value, TabqError> {
    let parsed = parse::parse(query)?;
    engine::run_in_memory(dataset, &parsed, false, EvalOptions::default())
}

// ============ Errors ============

#[derive(Error, Debug)]
pub enum TabqError {
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),
    #[error("Eval error: {0}")]
    Eval(#[from] EvalError),
    #[error("SQL error: {0}")]
    Sql(#[from] SqlError),
    #[error("Data error: {0}")]
    Data(#[from] DataError),
    #[error("unknown table: {0}")]
    UnknownTable(String),
}
