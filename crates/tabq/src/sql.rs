//! Partial translation of queries into paging-aware T-SQL.
//!
//! Only `SortBy` and `Paging` survive translation; other transformations
//! are skipped (callers can probe with [`translates`]). A sort arriving
//! after paging wraps the paged query in a subquery so the new ordering
//! applies to the already-paged rows.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::ast::{PageOp, SortDirection, Transformation};
use crate::infer::{InferredType, Metadata};
use crate::value::{Row, Value};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SqlError {
    #[error("Invalid column or table name: {0:?}")]
    InvalidIdentifier(String),
    #[error("unexpected null in column {0}")]
    UnexpectedNull(String),
    #[error("SQL client error: {0}")]
    Client(String),
}

// ============ SQL AST ============

#[derive(Debug, Clone, PartialEq)]
pub enum SqlSource {
    Table(String),
    Nested(Box<SqlQuery>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum SelectItem {
    Column(String),
    /// Verbatim select-list text, e.g. the synthetic sort key.
    Literal(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderByItem {
    pub column: String,
    pub direction: SortDirection,
    /// Wrap the column in `CAST(… AS nvarchar(1000))`; required for
    /// text-typed columns under `ORDER BY` with `OFFSET`.
    pub cast: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SqlQuery {
    pub select: Vec<SelectItem>,
    pub source: SqlSource,
    /// `(skip, take)`; `take` may be infinite.
    pub paging: Option<(f64, f64)>,
    pub order_by: Option<Vec<OrderByItem>>,
}

const TEMP_SORT: &str = "temp_sort";

// ============ Translation ============

/// Whether a transformation survives SQL translation.
pub fn translates(transformation: &Transformation) -> bool {
    matches!(
        transformation,
        Transformation::SortBy(_) | Transformation::Paging(_) | Transformation::Empty
    )
}

fn all_columns(metadata: &Metadata) -> Vec<SelectItem> {
    metadata
        .iter()
        .map(|(name, _)| SelectItem::Column(name.clone()))
        .collect()
}

fn column_type(metadata: &Metadata, name: &str) -> Option<InferredType> {
    metadata
        .iter()
        .find(|(column, _)| column == name)
        .map(|(_, ty)| *ty)
}

/// Fold the translatable transformations into a [`SqlQuery`] over `table`.
pub fn translate(table: &str, metadata: &Metadata, transformations: &[Transformation]) -> SqlQuery {
    let mut query = SqlQuery {
        select: all_columns(metadata),
        source: SqlSource::Table(table.to_string()),
        paging: None,
        order_by: None,
    };

    for transformation in transformations {
        match transformation {
            Transformation::SortBy(fields) if !fields.is_empty() => {
                if query.paging.is_some() {
                    // Nesting rule: ordering after paging must apply to the
                    // paged rows, not the base table.
                    query = SqlQuery {
                        select: all_columns(metadata),
                        source: SqlSource::Nested(Box::new(query)),
                        paging: None,
                        order_by: None,
                    };
                }
                let order = fields
                    .iter()
                    .map(|(name, direction)| OrderByItem {
                        column: name.clone(),
                        direction: *direction,
                        cast: matches!(
                            column_type(metadata, name),
                            Some(InferredType::String | InferredType::Any)
                        ),
                    })
                    .collect();
                query.order_by = Some(order);
            }
            Transformation::Paging(ops) => {
                if query.order_by.is_none() {
                    // SQL Server requires ORDER BY before OFFSET.
                    query
                        .select
                        .push(SelectItem::Literal(format!("0 as [{TEMP_SORT}]")));
                    query.order_by = Some(vec![OrderByItem {
                        column: TEMP_SORT.to_string(),
                        direction: SortDirection::Ascending,
                        cast: false,
                    }]);
                }
                let (mut skip, mut take) = query.paging.unwrap_or((0.0, f64::INFINITY));
                for op in ops {
                    match *op {
                        PageOp::Skip(n) => {
                            skip += n as f64;
                            take -= n as f64;
                        }
                        PageOp::Take(n) => {
                            take = take.min(n as f64);
                        }
                    }
                }
                query.paging = Some((skip, take));
            }
            _ => {}
        }
    }

    query
}

// ============ Rendering ============

/// Bracket an identifier after an allow-list check.
pub fn format_name(name: &str) -> Result<String, SqlError> {
    let allowed = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'));
    if !allowed {
        return Err(SqlError::InvalidIdentifier(name.to_string()));
    }
    Ok(format!("[{name}]"))
}

/// Render a [`SqlQuery`] as T-SQL text.
pub fn format_sql_query(query: &SqlQuery) -> Result<String, SqlError> {
    let select = query
        .select
        .iter()
        .map(|item| match item {
            SelectItem::Column(name) => format_name(name),
            SelectItem::Literal(text) => Ok(text.clone()),
        })
        .collect::<Result<Vec<_>, _>>()?
        .join(", ");

    let source = match &query.source {
        SqlSource::Table(table) => format_name(table)?,
        SqlSource::Nested(inner) => format!("({}) t", format_sql_query(inner)?),
    };

    let mut sql = format!("SELECT {select} FROM {source}");

    if let Some(order) = &query.order_by {
        let items = order
            .iter()
            .map(|item| {
                let name = format_name(&item.column)?;
                let column = if item.cast {
                    format!("CAST({name} AS nvarchar(1000))")
                } else {
                    name
                };
                let direction = match item.direction {
                    SortDirection::Ascending => "ASC",
                    SortDirection::Descending => "DESC",
                };
                Ok(format!("{column} {direction}"))
            })
            .collect::<Result<Vec<_>, SqlError>>()?
            .join(", ");
        sql.push_str(" ORDER BY ");
        sql.push_str(&items);
    }

    if let Some((skip, take)) = query.paging {
        sql.push_str(&format!(" OFFSET {skip} ROWS"));
        if take.is_finite() {
            sql.push_str(&format!(" FETCH NEXT {take} ROWS ONLY"));
        }
    }

    Ok(sql)
}

// ============ Client seam ============

/// One row from the SQL reader, read positionally.
pub trait SqlRow {
    fn is_null(&self, index: usize) -> bool;
    fn get_string(&self, index: usize) -> String;
    fn get_bool(&self, index: usize) -> bool;
    fn get_date(&self, index: usize) -> DateTime<Utc>;
    fn get_int32(&self, index: usize) -> i32;
    fn get_float(&self, index: usize) -> f64;
}

/// The SQL client collaborator: executes a statement and maps each reader
/// row through the supplied closure.
pub trait SqlClient: Send + Sync {
    fn execute_reader(
        &self,
        connection_string: &str,
        sql: &str,
        mapper: &mut dyn FnMut(&dyn SqlRow) -> Result<Row, SqlError>,
    ) -> Result<Vec<Row>, SqlError>;
}

/// Materialize one reader row into typed values, guided by metadata. Only
/// text-typed columns tolerate nulls (as empty strings).
pub fn materialize_row(reader_row: &dyn SqlRow, metadata: &Metadata) -> Result<Row, SqlError> {
    metadata
        .iter()
        .enumerate()
        .map(|(index, (name, ty))| {
            if reader_row.is_null(index) {
                return match ty {
                    InferredType::String | InferredType::Any => {
                        Ok((name.clone(), Value::String(String::new())))
                    }
                    _ => Err(SqlError::UnexpectedNull(name.clone())),
                };
            }
            let value = match ty {
                InferredType::String | InferredType::Any => {
                    Value::String(reader_row.get_string(index))
                }
                InferredType::Bool | InferredType::OneZero => {
                    Value::Bool(reader_row.get_bool(index))
                }
                InferredType::Date(_) => Value::Date(reader_row.get_date(index)),
                InferredType::Int => Value::Number(f64::from(reader_row.get_int32(index))),
                InferredType::Float => Value::Number(reader_row.get_float(index)),
            };
            Ok((name.clone(), value))
        })
        .collect()
}

// ============ Sanity Tests ============
