//! rp API: serves request pipelines over HTTP
//!
//! Each endpoint under /v1 is a [`route::Route`]: one chain run per request
//! with a fresh context. `/health` and `/metrics` are plain handlers.
pub mod config;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod route;

use axum::{http::StatusCode, routing::get, Router};
use prometheus::Registry;
use rp_core::{DefaultLogger, MultiLogger, SharedLogger};
use rp_stages::{MemoryStore, SharedStore};
use std::sync::Arc;
use thiserror::Error;

pub use config::ServerConfig;
pub use route::{add_route, Route, RouteError};

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("route error: {0}")]
    Route(#[from] RouteError),

    #[error("metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Builds the router with an empty in-memory store.
pub fn create_app(config: &ServerConfig) -> Result<Router, ApiError> {
    create_app_with_store(config, MemoryStore::shared())
}

pub fn create_app_with_store(config: &ServerConfig, store: SharedStore) -> Result<Router, ApiError> {
    let registry = Registry::new();
    let metrics_logger: SharedLogger = Arc::new(metrics::MetricsLogger::register(&registry)?);

    let mut logger = MultiLogger::new(vec![metrics_logger]);
    if config.debug {
        logger = logger.with(DefaultLogger::shared());
    }
    let logger: SharedLogger = Arc::new(logger);

    let options = handlers::RouteOptions {
        store,
        logger: Some(logger),
        log_branches: config.log_branches,
    };

    let mut router = Router::new().route("/health", get(handlers::health));
    for route in handlers::v1_routes(&options) {
        router = add_route(router, route)?;
    }

    let router = router.route(
        "/metrics",
        get(move || {
            let body = metrics::encode(&registry).map_err(|e| e.to_string());
            async move {
                match body {
                    Ok(text) => (StatusCode::OK, text),
                    Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, err),
                }
            }
        }),
    );

    Ok(router.layer(middleware::trace()).layer(middleware::cors()))
}

pub async fn run(config: ServerConfig) -> Result<(), ApiError> {
    let app = create_app(&config)?;
    let listener = tokio::net::TcpListener::bind(&config.addr).await?;

    tracing::info!(addr = %config.addr, debug = config.debug, "rp API listening");
    axum::serve(listener, app).await?;
    Ok(())
}
