mod routes;
mod controllers;
mod services;
mod models;
mod simulation;
mod api_docs;
mod shared_state;
mod config;
mod error;

use std::net::SocketAddr;
use anyhow::{Context, Result};
use axum::{Router, routing::get, response::Html};
use crate::routes::simulation_routes::api_routes;
use utoipa::OpenApi;
use utoipa_scalar::Scalar;
use crate::api_docs::ApiDoc;
use crate::shared_state::AppState;
use crate::config::{CacheConfig, Config};
use crate::services::pvgis_service::PvgisClient;
use crate::services::response_cache::{MemoryCache, ResponseCache, SqliteStore};

use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const DEFAULT_CONFIG_PATH: &str = "config.json";

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // 1. Load configuration
    let config_path =
        std::env::var("PVSIM_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_owned());
    let config = Config::load(&config_path)?;
    info!("[CONFIG] Loaded {} (PVGIS {} {})", config_path, config.pvgis.base_url, config.pvgis.api_version);

    // 2. PVGIS client with its response cache
    let cache = open_cache(&config.cache);
    let pvgis = PvgisClient::new(&config.pvgis, cache).context("Failed to build PVGIS client")?;
    let state = AppState::new(pvgis, config.monte_carlo.clone());

    // 3. Start Axum HTTP server
    let app = app(state);

    let addr: SocketAddr = format!("{}:{}", config.server.bind_address, config.server.port)
        .parse()
        .with_context(|| format!("Invalid bind address {}:{}", config.server.bind_address, config.server.port))?;
    info!("API Server listening on http://{}", addr);
    info!("Scalar UI: http://{}/scalar", addr);

    axum_server::bind(addr)
        .serve(app.into_make_service())
        .await
        .context("HTTP server terminated")?;
    Ok(())
}

fn app(state: AppState) -> Router {
    Router::new()
        .nest("/api", api_routes(state))
        .route("/scalar", get(|| async {
            Html(Scalar::new(ApiDoc::openapi()).to_html())
        }))
        .fallback_service(ServeDir::new("static"))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Memory cache plus the SQLite store when it can be opened.
fn open_cache(config: &CacheConfig) -> ResponseCache {
    let memory = MemoryCache::new(config.memory_capacity, config.ttl());
    let store = config.db_path.as_deref().and_then(|path| match SqliteStore::open(path) {
        Ok(store) => {
            info!("[CACHE] Persistent cache at {}", path);
            Some(store)
        }
        Err(e) => {
            warn!("[CACHE] Could not open {}, using memory only: {}", path, e);
            None
        }
    });
    ResponseCache::new(memory, store)
}
