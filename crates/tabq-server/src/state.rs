//! Shared server state and API response types.

use std::sync::Arc;

use serde::Serialize;
use tabq::QueryEngine;
use utoipa::ToSchema;

/// Application state: the engine is read-only once tables are loaded.
pub struct AppState {
    pub engine: QueryEngine,
}

pub type SharedState = Arc<AppState>;

// ============ API Types ============

#[derive(Serialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Serialize, ToSchema)]
pub struct TablesResponse {
    pub names: Vec<String>,
}
