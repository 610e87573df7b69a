//! HTTP boundary for the cost query engine.

pub mod error;
pub mod routes;

use std::future::Future;
use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use cloudcost_core::{CostQueryEngine, ServerConfig};
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::{self, TraceLayer};
use tracing::{info, warn, Level};

pub use error::{status_for, ApiError};

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<CostQueryEngine>,
}

pub fn router(engine: Arc<CostQueryEngine>, config: &ServerConfig) -> Router {
    let app = Router::new()
        .route("/", get(routes::index))
        .route("/healthz", get(routes::healthz))
        .route("/api/projects/{project_id}/costs", get(routes::project_costs))
        .route(
            "/api/projects/{project_id}/costs/last-month",
            get(routes::last_month_costs),
        )
        .route(
            "/api/projects/{project_id}/costs/monthly",
            get(routes::monthly_costs),
        )
        .route(
            "/api/projects/{project_id}/costs/{month}",
            get(routes::month_costs),
        )
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(trace::DefaultMakeSpan::new().level(Level::INFO))
                .on_response(trace::DefaultOnResponse::new().level(Level::INFO)),
        );

    let app = if config.cors_permissive {
        app.layer(CorsLayer::permissive())
    } else {
        app
    };

    app.with_state(AppState { engine })
}

/// Binds `config.bind_addr()` and serves until ctrl-c.
pub async fn serve(engine: Arc<CostQueryEngine>, config: &ServerConfig) -> anyhow::Result<()> {
    let listener = TcpListener::bind(config.bind_addr()).await?;
    serve_until(listener, engine, config, shutdown_signal()).await
}

/// Serves on an already bound listener until `shutdown` completes.
pub async fn serve_until<F>(
    listener: TcpListener,
    engine: Arc<CostQueryEngine>,
    config: &ServerConfig,
    shutdown: F,
) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    info!("HTTP API server listening on {}", listener.local_addr()?);

    axum::serve(listener, router(engine, config))
        .with_graceful_shutdown(shutdown)
        .await?;
    info!("Shutting down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for ctrl-c, serving until killed: {}", e);
        std::future::pending::<()>().await;
    }
}
