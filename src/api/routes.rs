use axum::{
    middleware::from_fn_with_state,
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use sqlx::PgPool;
use std::sync::Arc;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use super::handlers;
use crate::idempotency::{idempotency_middleware, IdempotencyLayer};
use crate::scheduler::JobScheduler;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub idempotency: IdempotencyLayer,
    pub metrics_handle: Option<PrometheusHandle>,
    pub scheduler: Option<Arc<JobScheduler>>,
}

impl AppState {
    pub fn new(pool: PgPool, idempotency: IdempotencyLayer) -> Self {
        Self {
            pool,
            idempotency,
            metrics_handle: None,
            scheduler: None,
        }
    }

    /// Adds metrics handle to the state.
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics_handle = Some(handle);
        self
    }

    /// Adds the job scheduler so health checks can report on it.
    pub fn with_scheduler(mut self, scheduler: Arc<JobScheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    pub fn scheduler_running(&self) -> bool {
        self.scheduler.as_ref().is_some_and(|scheduler| scheduler.is_running())
    }
}

/// Wraps a group of mutating routes with the idempotency middleware.
pub fn idempotent<S>(routes: Router<S>, layer: IdempotencyLayer) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    routes.route_layer(from_fn_with_state(layer, idempotency_middleware))
}

/// Creates the main API router with all routes.
pub fn create_router(state: AppState) -> Router {
    let mutations = idempotent(
        Router::new().route("/logs", post(handlers::create_food_log)),
        state.idempotency.clone(),
    );

    Router::new()
        // Health endpoints
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .route("/live", get(handlers::liveness_check))
        // Metrics endpoint
        .route("/metrics", get(handlers::metrics_endpoint))
        // Food log endpoints
        .route("/logs", get(handlers::list_food_logs))
        .route("/logs/:id", get(handlers::get_food_log))
        .merge(mutations)
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .with_state(state)
}
