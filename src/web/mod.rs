//! Status API: health, stats, posted offers, link conversion and manual runs.

use axum::{
    error_handling::HandleErrorLayer,
    http::StatusCode,
    response::Json,
    routing::{get, post},
    BoxError, Router,
};
use chrono::{DateTime, Utc};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::{
    compression::CompressionLayer,
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use crate::config::{AppConfig, ServerConfig};
use crate::pipeline::DealPipeline;
use crate::scheduler::DealScheduler;
use crate::utils::error::Result;

pub mod handlers;
pub mod responses;

pub use handlers::{
    approve_offer, convert_link, get_stats, health_check, list_moderation, list_offers, pause_scheduler,
    reject_offer, resume_scheduler, run_pipeline,
};
pub use responses::*;

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<DealPipeline>,
    pub scheduler: Arc<DealScheduler>,
    pub config: AppConfig,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(pipeline: Arc<DealPipeline>, scheduler: Arc<DealScheduler>, config: AppConfig) -> Self {
        Self {
            pipeline,
            scheduler,
            config,
            started_at: Utc::now(),
        }
    }
}

pub fn create_router(state: AppState) -> Router {
    let timeout = Duration::from_secs(state.config.server.request_timeout);

    Router::new()
        .route("/health", get(health_check))
        .nest("/api/v1", api_routes())
        .layer(
            ServiceBuilder::new()
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                        .on_response(DefaultOnResponse::new().level(Level::INFO)),
                )
                .layer(CompressionLayer::new())
                .layer(CorsLayer::permissive())
                .layer(HandleErrorLayer::new(handle_timeout))
                .timeout(timeout),
        )
        .with_state(state)
}

fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/stats", get(get_stats))
        .route("/offers", get(list_offers))
        .route("/convert", post(convert_link))
        .route("/run", post(run_pipeline))
        .route("/queue/moderation", get(list_moderation))
        .route("/queue/:id/approve", post(approve_offer))
        .route("/queue/:id/reject", post(reject_offer))
        .route("/scheduler/pause", post(pause_scheduler))
        .route("/scheduler/resume", post(resume_scheduler))
}

async fn handle_timeout(err: BoxError) -> (StatusCode, Json<ApiResponse<()>>) {
    if err.is::<tower::timeout::error::Elapsed>() {
        (
            StatusCode::REQUEST_TIMEOUT,
            Json(ApiResponse::<()>::error("REQUEST_TIMEOUT", "Request took too long")),
        )
    } else {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ApiResponse::<()>::error("INTERNAL_SERVER_ERROR", err.to_string())),
        )
    }
}

/// Bind and serve until `shutdown` resolves.
pub async fn serve<F>(state: AppState, config: &ServerConfig, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "Status API listening");

    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}
