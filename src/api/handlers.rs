use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use uuid::Uuid;

use crate::api::requests::{CreateFoodLogRequest, ListFoodLogsQuery};
use crate::api::responses::{
    ApiResponse, FoodLogResponse, HealthResponse, PaginatedResponse, ValidationErrorDetail,
};
use crate::error::{AppError, Result};
use crate::models::FoodLog;
use crate::observability::{get_metrics, LatencyTimer};
use crate::repositories::FoodLogRepository;

use super::routes::AppState;

/// Health check endpoint.
pub async fn health_check(State(state): State<AppState>) -> Json<ApiResponse<HealthResponse>> {
    let db_healthy = sqlx::query("SELECT 1")
        .fetch_one(&state.pool)
        .await
        .is_ok();

    let response = HealthResponse {
        status: if db_healthy { "healthy".to_string() } else { "degraded".to_string() },
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: chrono::Utc::now(),
        database: db_healthy,
        scheduler_running: state.scheduler_running(),
    };

    Json(ApiResponse::success(response))
}

/// Readiness check endpoint.
pub async fn readiness_check(State(state): State<AppState>) -> StatusCode {
    let db_healthy = sqlx::query("SELECT 1")
        .fetch_one(&state.pool)
        .await
        .is_ok();

    if db_healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

/// Liveness check endpoint.
pub async fn liveness_check() -> StatusCode {
    StatusCode::OK
}

/// Prometheus scrape endpoint.
pub async fn metrics_endpoint(State(state): State<AppState>) -> impl IntoResponse {
    match &state.metrics_handle {
        Some(handle) => (StatusCode::OK, handle.render()),
        None => (StatusCode::SERVICE_UNAVAILABLE, "metrics not initialized".to_string()),
    }
}

// ============================================================================
// Food Log Handlers
// ============================================================================

/// Log a food entry. Mounted behind the idempotency middleware.
pub async fn create_food_log(
    State(state): State<AppState>,
    Json(request): Json<CreateFoodLogRequest>,
) -> Result<(StatusCode, Json<ApiResponse<FoodLogResponse>>)> {
    if let Err(errors) = request.validate() {
        let details = errors
            .into_iter()
            .map(|e| ValidationErrorDetail {
                field: e.field,
                message: e.message,
            })
            .collect();
        return Err(AppError::InvalidFields(details));
    }

    let repository = FoodLogRepository::new(state.pool.clone());
    let log = FoodLog::new(request.food_name.trim(), request.calories.unwrap_or(0), request.consumed_at);

    let timer = LatencyTimer::new();
    let result = repository.create(&log).await;
    get_metrics().record_db_query("food_log_insert", timer.elapsed_ms(), result.is_ok());

    let created = result?;
    get_metrics().record_food_log_created();
    tracing::info!(food_log_id = %created.id, "Food log created");

    Ok((StatusCode::CREATED, Json(ApiResponse::success(FoodLogResponse::from(created)))))
}

/// Get a food log entry by ID.
pub async fn get_food_log(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<FoodLogResponse>>> {
    let repository = FoodLogRepository::new(state.pool.clone());

    let log = repository
        .find_by_id(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Food log {} not found", id)))?;

    Ok(Json(ApiResponse::success(FoodLogResponse::from(log))))
}

/// List food log entries with pagination.
pub async fn list_food_logs(
    State(state): State<AppState>,
    Query(query): Query<ListFoodLogsQuery>,
) -> Result<Json<ApiResponse<PaginatedResponse<FoodLogResponse>>>> {
    let repository = FoodLogRepository::new(state.pool.clone());
    let (limit, offset) = (query.limit(), query.offset());

    let logs = repository.list(limit, offset).await?;
    let total = repository.count().await?;

    let items = logs.into_iter().map(FoodLogResponse::from).collect();
    Ok(Json(ApiResponse::success(PaginatedResponse::new(items, total, limit, offset))))
}
