mod audit;
mod config;
mod demo_seed;
mod drift;
mod embedder;
mod error;
mod gate;
mod ingest;
mod llm;
mod routes_datasets;
mod state;
#[cfg(test)]
mod test_support;
mod types;
mod validator;
mod vector_store;

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::routing::{get, patch, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::embedder::{Embedder, HashEmbedder, HttpEmbedder};
use crate::llm::{AuditService, GeminiAudit};
use crate::state::{AppState, DatasetRegistry};
use crate::vector_store::{QdrantStore, VectorStore};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cfg = AppConfig::from_env()?;

    let embedder: Arc<dyn Embedder> = match &cfg.embed_url {
        Some(url) => {
            info!(url = %url, "using http embedding service");
            Arc::new(HttpEmbedder::new(url.clone(), cfg.vector_dim))
        }
        None => {
            info!("EMBED_URL not set, using deterministic hash embedder");
            Arc::new(HashEmbedder::new(cfg.vector_dim))
        }
    };

    let qdrant = QdrantStore::new(cfg.qdrant_url.clone(), cfg.collection.clone(), cfg.vector_dim)?;
    // The collection itself is created lazily on first write, so an
    // unreachable store only degrades ingestion, not startup.
    match qdrant.ping().await {
        Ok(()) => info!("qdrant: ok"),
        Err(e) => warn!(error = %e, "qdrant unreachable at startup"),
    }
    let vectors: Arc<dyn VectorStore> = Arc::new(qdrant);

    if cfg.gemini_api_key.is_none() {
        warn!("GEMINI_API_KEY not set; L2 audits will degrade to the WARN fallback");
    }
    let auditor: Arc<dyn AuditService> = Arc::new(GeminiAudit::new(
        cfg.gemini_api_key.clone(),
        cfg.gemini_model.clone(),
        cfg.gemini_base_url.clone(),
    ));

    let app_state = Arc::new(AppState {
        config: cfg.clone(),
        registry: DatasetRegistry::new(),
        embedder,
        vectors,
        auditor,
    });

    if cfg.seed_demo {
        tokio::spawn(demo_seed::seed_if_needed(app_state.clone()));
    }

    let app = Router::new()
        .route("/healthz", get(routes_datasets::healthz))
        .route("/datasets", post(routes_datasets::create_dataset))
        .route("/datasets/:dataset_id", get(routes_datasets::list_versions))
        .route(
            "/datasets/:dataset_id/v/:version",
            get(routes_datasets::get_version),
        )
        .route(
            "/datasets/:dataset_id/v/:version/samples",
            get(routes_datasets::get_samples),
        )
        .route(
            "/datasets/:dataset_id/v/:version/validate-l1",
            patch(routes_datasets::validate_l1),
        )
        .route(
            "/datasets/:dataset_id/v/:version/audit-l2",
            patch(routes_datasets::audit_l2),
        )
        .route(
            "/datasets/:dataset_id/v/:version/trigger-l2",
            post(routes_datasets::trigger_l2),
        )
        .route(
            "/datasets/:dataset_id/v/:version/approve",
            post(routes_datasets::approve),
        )
        .layer(CorsLayer::permissive())
        .with_state(app_state);

    let addr = &cfg.bind_addr;
    info!("control-plane listening on http://{addr}");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    axum::serve(listener, app).await.context("server error")?;

    Ok(())
}
