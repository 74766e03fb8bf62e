//! HTTP REST handlers.

use axum::Json;
use axum::extract::{Path, Query, State};
use log::{debug, info};
use serde::Deserialize;
use serde_json::Value as JsonValue;
use utoipa::IntoParams;

use tabq::Request;

use crate::error::AppError;
use crate::state::{SharedState, TablesResponse};

/// Query-string parameters for table requests.
#[derive(Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct TableQuery {
    /// `$`-separated transformation pipeline
    pub q: Option<String>,
    /// Comma-separated flags; only `preview` is recognized
    pub flags: Option<String>,
}

impl TableQuery {
    fn into_request(self) -> Request {
        let mut params = Vec::new();
        if let Some(q) = self.q {
            params.push(q);
        }
        if let Some(flags) = self.flags {
            params.extend(
                flags
                    .split(',')
                    .filter(|flag| !flag.is_empty())
                    .map(str::to_string),
            );
        }
        Request::new(params)
    }
}

/// Execute a transformation query against a registered table
#[utoipa::path(
    get,
    path = "/tables/{name}",
    params(
        ("name" = String, Path, description = "Registered table name"),
        TableQuery
    ),
    responses(
        (status = 200, description = "Query result as JSON", content_type = "application/json"),
        (status = 400, description = "Query error", body = crate::state::ErrorResponse)
    )
)]
pub async fn query_table(
    State(state): State<SharedState>,
    Path(name): Path<String>,
    Query(params): Query<TableQuery>,
) -> Result<Json<JsonValue>, AppError> {
    let request = params.into_request();
    info!("GET /tables/{name}");
    debug!("Request params: {:?}", request.params);

    let result = state.engine.execute(&name, &request)?;
    Ok(Json(result))
}

/// List registered tables
#[utoipa::path(
    get,
    path = "/tables",
    responses(
        (status = 200, description = "Registered table names", body = TablesResponse)
    )
)]
pub async fn list_tables(State(state): State<SharedState>) -> Json<TablesResponse> {
    info!("GET /tables");
    Json(TablesResponse {
        names: state.engine.table_names(),
    })
}
