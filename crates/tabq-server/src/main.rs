//! tabq-server binary: load tables, bind, serve.

use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use tabq::QueryEngine;

use tabq_server::create_router;
use tabq_server::loader::{collect_files, load_dataset, table_name_from_path};
use tabq_server::state::{AppState, SharedState};

// ============ CLI ============

#[derive(Parser)]
#[command(name = "tabq-server")]
#[command(about = "HTTP server answering transformation queries over delimited text tables")]
struct Args {
    /// Files or directories to serve (csv, txt)
    #[arg(required = true)]
    paths: Vec<std::path::PathBuf>,

    /// Port to listen on
    #[arg(short, long, default_value = "3000")]
    port: u16,

    /// Host to bind to
    #[arg(long, default_value = "127.0.0.1")]
    host: String,
}

// ============ Main ============

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    let files = collect_files(&args.paths);
    if files.is_empty() {
        log::error!("No supported files found in provided paths");
        std::process::exit(1);
    }

    let mut engine = QueryEngine::new();
    for file in &files {
        let name = table_name_from_path(file);
        match load_dataset(file) {
            Ok(dataset) => {
                log::info!(
                    "Loaded: {} -> {} ({} rows)",
                    file.display(),
                    name,
                    dataset.rows.len()
                );
                engine.add_dataset(name, dataset);
            }
            Err(e) => {
                log::warn!("Failed to load {}: {}", file.display(), e);
            }
        }
    }
    if engine.table_names().is_empty() {
        log::error!("No tables loaded successfully");
        std::process::exit(1);
    }

    let state: SharedState = Arc::new(AppState { engine });

    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    log::info!("Starting server at http://{addr}");
    log::info!("OpenAPI document: http://{addr}/openapi.json");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, create_router(state)).await?;

    Ok(())
}
