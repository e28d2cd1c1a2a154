use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};
use std::time::Instant;

use super::{ApiResponse, AppError, AppState, HealthCheck, HealthResponse};
use crate::affiliate::Conversion;
use crate::models::PostedOffer;
use crate::pipeline::RunReport;
use crate::queue::{ApproveOutcome, QueueStats, QueuedOffer};
use crate::scheduler::SchedulerStats;
use crate::storage::StoreCount;

const DEFAULT_OFFER_LIMIT: u32 = 20;
const MAX_OFFER_LIMIT: u32 = 100;

#[derive(Debug, Serialize, Deserialize)]
pub struct OffersParams {
    pub limit: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ConvertRequest {
    pub url: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatsResponse {
    pub posted_total: i64,
    pub by_store: Vec<StoreCount>,
    pub scheduler: SchedulerStats,
    pub queue: QueueStats,
}

pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let started = Instant::now();
    let database = match sqlx::query("SELECT 1").execute(state.pipeline.repository().pool()).await {
        Ok(_) => HealthCheck::healthy("database", started.elapsed().as_millis() as u64),
        Err(e) => HealthCheck::unhealthy("database", e.to_string()),
    };

    let uptime = chrono::Utc::now().signed_duration_since(state.started_at);
    let health = HealthResponse::from_checks(vec![database], uptime.num_seconds().max(0) as u64);
    let status = if health.is_healthy() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(health))
}

pub async fn get_stats(State(state): State<AppState>) -> Result<Json<ApiResponse<StatsResponse>>, AppError> {
    let repository = state.pipeline.repository();
    let stats = StatsResponse {
        posted_total: repository.count().await?,
        by_store: repository.stats_by_store().await?,
        scheduler: state.scheduler.stats().await,
        queue: state.pipeline.queue_stats().await,
    };
    Ok(Json(ApiResponse::success(stats)))
}

pub async fn list_offers(
    State(state): State<AppState>,
    Query(params): Query<OffersParams>,
) -> Result<Json<ApiResponse<Vec<PostedOffer>>>, AppError> {
    let limit = params.limit.unwrap_or(DEFAULT_OFFER_LIMIT);
    if !(1..=MAX_OFFER_LIMIT).contains(&limit) {
        return Err(AppError::bad_request(format!(
            "limit must be between 1 and {MAX_OFFER_LIMIT}"
        )));
    }

    let offers = state.pipeline.repository().recent(limit).await?;
    let meta = serde_json::json!({ "limit": limit, "returned": offers.len() });
    Ok(Json(ApiResponse::success_with_meta(offers, meta)))
}

pub async fn convert_link(
    State(state): State<AppState>,
    Json(request): Json<ConvertRequest>,
) -> Result<Json<ApiResponse<Conversion>>, AppError> {
    let valid = url::Url::parse(request.url.trim())
        .is_ok_and(|u| matches!(u.scheme(), "http" | "https") && u.host_str().is_some());
    if !valid {
        return Err(AppError::bad_request(format!("Invalid URL: {}", request.url)));
    }

    let conversion = state.pipeline.converter().convert_detailed(&request.url).await;
    tracing::info!(
        original = %conversion.original,
        converted = %conversion.converted,
        store = ?conversion.store,
        "Converted link via API"
    );
    Ok(Json(ApiResponse::success(conversion)))
}

pub async fn run_pipeline(State(state): State<AppState>) -> Result<Json<ApiResponse<RunReport>>, AppError> {
    match state.scheduler.run_now().await {
        Ok(Some(report)) => Ok(Json(ApiResponse::success(report))),
        Ok(None) => Err(AppError::conflict("A pipeline run is already in progress")),
        Err(e) => {
            tracing::error!(error = %e, "Manual pipeline run failed");
            Err(AppError::internal(e.to_string()))
        }
    }
}

pub async fn list_moderation(State(state): State<AppState>) -> Json<ApiResponse<Vec<QueuedOffer>>> {
    Json(ApiResponse::success(state.pipeline.pending_moderation().await))
}

pub async fn approve_offer(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<QueueStats>>, AppError> {
    match state.pipeline.approve(&id).await {
        ApproveOutcome::Queued => Ok(Json(ApiResponse::success(state.pipeline.queue_stats().await))),
        ApproveOutcome::NotFound => Err(AppError::not_found(format!("Queued offer {id}"))),
        ApproveOutcome::QueueFull => Err(AppError::conflict(format!(
            "Queue is full; offer {id} stays in moderation"
        ))),
    }
}

pub async fn reject_offer(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<QueueStats>>, AppError> {
    if !state.pipeline.reject(&id).await {
        return Err(AppError::not_found(format!("Queued offer {id}")));
    }
    Ok(Json(ApiResponse::success(state.pipeline.queue_stats().await)))
}

pub async fn pause_scheduler(State(state): State<AppState>) -> Json<ApiResponse<SchedulerStats>> {
    state.scheduler.pause().await;
    Json(ApiResponse::success(state.scheduler.stats().await))
}

pub async fn resume_scheduler(State(state): State<AppState>) -> Json<ApiResponse<SchedulerStats>> {
    state.scheduler.resume().await;
    Json(ApiResponse::success(state.scheduler.stats().await))
}
