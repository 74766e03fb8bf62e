//! tabq-server: HTTP framing for the tabq engine.
//!
//! Loads delimited text files into typed datasets, registers them with a
//! [`tabq::QueryEngine`], and answers transformation queries with JSON.

pub mod error;
pub mod handlers;
pub mod loader;
pub mod state;

use axum::Router;
use axum::routing::get;
use utoipa::OpenApi;

use crate::state::{ErrorResponse, SharedState, TablesResponse};

// ============ OpenAPI ============

#[derive(OpenApi)]
#[openapi(
    paths(handlers::query_table, handlers::list_tables),
    components(schemas(ErrorResponse, TablesResponse))
)]
pub struct ApiDoc;

async fn openapi() -> axum::Json<utoipa::openapi::OpenApi> {
    axum::Json(ApiDoc::openapi())
}

// ============ Router ============

pub fn create_router(state: SharedState) -> Router {
    Router::new()
        .route("/tables", get(handlers::list_tables))
        .route("/tables/{name}", get(handlers::query_table))
        .route("/openapi.json", get(openapi))
        .with_state(state)
}
