//! Request dispatch across the in-memory and SQL backends.

use std::sync::Arc;

use indexmap::IndexMap;
use serde_json::Value as Json;

use crate::TabqError;
use crate::ast::{Action, PageOp, Query, Transformation};
use crate::eval::{self, EvalOptions};
use crate::infer::Metadata;
use crate::parse;
use crate::render;
use crate::source::DataSet;
use crate::sql::{self, SqlClient, SqlError};

/// Preview responses carry at most this many rows.
pub const PREVIEW_ROWS: usize = 10;

const PREVIEW_FLAG: &str = "preview";

/// One incoming request: a flat parameter list mixing recognized flags with
/// the query text.
#[derive(Debug, Clone, Default)]
pub struct Request {
    pub params: Vec<String>,
}

impl Request {
    pub fn new(params: Vec<String>) -> Self {
        Request { params }
    }

    /// Convenience for a bare query string.
    pub fn query(text: impl Into<String>) -> Self {
        Request {
            params: vec![text.into()],
        }
    }

    /// Partition flags from the query text; the first non-flag parameter is
    /// the query, defaulting to empty.
    fn split(&self) -> (bool, &str) {
        let preview = self.params.iter().any(|p| p == PREVIEW_FLAG);
        let query = self
            .params
            .iter()
            .find(|p| p.as_str() != PREVIEW_FLAG)
            .map(String::as_str)
            .unwrap_or("");
        (preview, query)
    }
}

enum Table {
    Memory(DataSet),
    Sql { table: String, metadata: Metadata },
}

/// Named-table registry routing each request to its backing store.
pub struct QueryEngine {
    tables: IndexMap<String, Table>,
    client: Option<Arc<dyn SqlClient>>,
    connection_string: String,
    options: EvalOptions,
}

impl QueryEngine {
    pub fn new() -> Self {
        Self::with_options(EvalOptions::default())
    }

    pub fn with_options(options: EvalOptions) -> Self {
        QueryEngine {
            tables: IndexMap::new(),
            client: None,
            connection_string: String::new(),
            options,
        }
    }

    /// Register an in-memory dataset.
    pub fn add_dataset(&mut self, name: impl Into<String>, dataset: DataSet) {
        self.tables.insert(name.into(), Table::Memory(dataset));
    }

    /// Register a SQL-backed table; queries against it go through the
    /// configured client.
    pub fn add_sql_table(
        &mut self,
        name: impl Into<String>,
        table: impl Into<String>,
        metadata: Metadata,
    ) {
        self.tables.insert(
            name.into(),
            Table::Sql {
                table: table.into(),
                metadata,
            },
        );
    }

    /// Install the SQL client collaborator.
    pub fn set_sql_client(&mut self, connection_string: impl Into<String>, client: Arc<dyn SqlClient>) {
        self.connection_string = connection_string.into();
        self.client = Some(client);
    }

    /// Names of all registered tables, in registration order.
    pub fn table_names(&self) -> Vec<String> {
        self.tables.keys().cloned().collect()
    }

    /// Execute a request against a registered table.
    pub fn execute(&self, name: &str, request: &Request) -> Result<Json, TabqError> {
        let (preview, text) = request.split();
        let query = parse::parse(text)?;
        match self.tables.get(name) {
            None => Err(TabqError::UnknownTable(name.to_string())),
            Some(Table::Memory(dataset)) => run_in_memory(dataset, &query, preview, self.options),
            Some(Table::Sql { table, metadata }) => {
                self.run_sql(table, metadata, query, preview)
            }
        }
    }

    fn run_sql(
        &self,
        table: &str,
        metadata: &Metadata,
        mut query: Query,
        preview: bool,
    ) -> Result<Json, TabqError> {
        match &query.action {
            // Metadata comes from inference; no SQL round-trip.
            Action::Metadata => Ok(render::metadata_object(metadata)),
            // Not implemented on the SQL path.
            Action::GetSeries { .. } | Action::GetRange { .. } => Ok(Json::Array(Vec::new())),
            Action::GetTheData => {
                if preview {
                    query
                        .transformations
                        .push(Transformation::Paging(vec![PageOp::Take(PREVIEW_ROWS)]));
                }
                let client = self
                    .client
                    .as_ref()
                    .ok_or_else(|| SqlError::Client("no SQL client configured".to_string()))?;
                let translated = sql::translate(table, metadata, &query.transformations);
                let statement = sql::format_sql_query(&translated)?;
                let rows = client.execute_reader(&self.connection_string, &statement, &mut |r| {
                    sql::materialize_row(r, metadata)
                })?;
                Ok(render::records(&rows))
            }
        }
    }
}

impl Default for QueryEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// The in-memory path: fold the pipeline, truncate for preview, project the
/// action, render JSON.
pub fn run_in_memory(
    dataset: &DataSet,
    query: &Query,
    preview: bool,
    options: EvalOptions,
) -> Result<Json, TabqError> {
    match &query.action {
        Action::Metadata => Ok(render::metadata_object(&dataset.metadata)),
        Action::GetRange { field } => {
            let rows = eval::apply_pipeline(dataset.rows.clone(), &query.transformations, options)?;
            Ok(render::scalars(&eval::range_values(&rows, field)?))
        }
        Action::GetTheData => {
            let mut rows =
                eval::apply_pipeline(dataset.rows.clone(), &query.transformations, options)?;
            if preview {
                rows.truncate(PREVIEW_ROWS);
            }
            Ok(render::records(&rows))
        }
        Action::GetSeries { key, value } => {
            let mut rows =
                eval::apply_pipeline(dataset.rows.clone(), &query.transformations, options)?;
            if preview {
                rows.truncate(PREVIEW_ROWS);
            }
            Ok(render::series(&eval::series_pairs(&rows, key, value)?))
        }
    }
}
