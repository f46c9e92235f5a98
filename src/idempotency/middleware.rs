use crate::error::{AppError, Result};
use crate::idempotency::fingerprint::Fingerprint;
use crate::idempotency::storage::{
    ConflictKind, Decision, IdempotencyStore, Lease, ResponseSnapshot,
};
use crate::observability::{get_metrics, mask_sensitive};
use axum::{
    body::{Body, Bytes},
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use http::{header::CONTENT_TYPE, HeaderName, HeaderValue, StatusCode};
use http_body_util::LengthLimitError;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Header set on responses served from a stored snapshot.
pub const REPLAYED_HEADER: &str = "idempotent-replayed";

/// Counters for idempotency handling.
#[derive(Debug, Default)]
pub struct IdempotencyMetrics {
    pub total_requests: AtomicU64,
    pub passthrough_requests: AtomicU64,
    pub new_requests: AtomicU64,
    pub replayed_requests: AtomicU64,
    pub in_flight_conflicts: AtomicU64,
    pub key_reused_conflicts: AtomicU64,
    pub completed_requests: AtomicU64,
    pub abandoned_requests: AtomicU64,
}

impl IdempotencyMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_passthrough(&self) {
        self.passthrough_requests.fetch_add(1, Ordering::Relaxed);
        get_metrics().record_idempotency_outcome("passthrough");
    }

    pub fn record_request(&self) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_new(&self) {
        self.new_requests.fetch_add(1, Ordering::Relaxed);
        get_metrics().record_idempotency_outcome("new");
    }

    pub fn record_replay(&self) {
        self.replayed_requests.fetch_add(1, Ordering::Relaxed);
        get_metrics().record_idempotency_outcome("replayed");
    }

    pub fn record_conflict(&self, kind: ConflictKind) {
        match kind {
            ConflictKind::InFlight => self.in_flight_conflicts.fetch_add(1, Ordering::Relaxed),
            ConflictKind::KeyReused => self.key_reused_conflicts.fetch_add(1, Ordering::Relaxed),
        };
        get_metrics().record_idempotency_outcome(kind.as_str());
    }

    pub fn record_completed(&self) {
        self.completed_requests.fetch_add(1, Ordering::Relaxed);
        get_metrics().record_idempotency_outcome("completed");
    }

    pub fn record_abandoned(&self) {
        self.abandoned_requests.fetch_add(1, Ordering::Relaxed);
        get_metrics().record_idempotency_outcome("abandoned");
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            total_requests: self.total_requests.load(Ordering::Relaxed),
            passthrough_requests: self.passthrough_requests.load(Ordering::Relaxed),
            new_requests: self.new_requests.load(Ordering::Relaxed),
            replayed_requests: self.replayed_requests.load(Ordering::Relaxed),
            in_flight_conflicts: self.in_flight_conflicts.load(Ordering::Relaxed),
            key_reused_conflicts: self.key_reused_conflicts.load(Ordering::Relaxed),
            completed_requests: self.completed_requests.load(Ordering::Relaxed),
            abandoned_requests: self.abandoned_requests.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub total_requests: u64,
    pub passthrough_requests: u64,
    pub new_requests: u64,
    pub replayed_requests: u64,
    pub in_flight_conflicts: u64,
    pub key_reused_conflicts: u64,
    pub completed_requests: u64,
    pub abandoned_requests: u64,
}

impl MetricsSnapshot {
    pub fn replay_rate(&self) -> f64 {
        if self.total_requests == 0 {
            0.0
        } else {
            self.replayed_requests as f64 / self.total_requests as f64
        }
    }
}

/// Configuration for the idempotency layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IdempotencyConfig {
    /// Request header carrying the client token.
    pub header_name: String,
    /// How long a completed response is kept for replay.
    pub ttl_seconds: i64,
    /// How long an unfinished record blocks its key before it can be pruned.
    pub in_flight_ttl_seconds: i64,
    pub max_key_length: usize,
    pub max_body_bytes: usize,
}

impl Default for IdempotencyConfig {
    fn default() -> Self {
        Self {
            header_name: "Idempotency-Key".to_string(),
            ttl_seconds: 86400, // 24 hours
            in_flight_ttl_seconds: 3600,
            max_key_length: 255,
            max_body_bytes: 1024 * 1024,
        }
    }
}

/// Shared state of the idempotency middleware.
#[derive(Clone)]
pub struct IdempotencyLayer {
    store: Arc<dyn IdempotencyStore>,
    config: Arc<IdempotencyConfig>,
    metrics: Arc<IdempotencyMetrics>,
}

impl IdempotencyLayer {
    pub fn new(store: Arc<dyn IdempotencyStore>, config: IdempotencyConfig) -> Self {
        Self {
            store,
            config: Arc::new(config),
            metrics: Arc::new(IdempotencyMetrics::new()),
        }
    }

    pub fn store(&self) -> Arc<dyn IdempotencyStore> {
        Arc::clone(&self.store)
    }

    pub fn config(&self) -> &IdempotencyConfig {
        &self.config
    }

    pub fn metrics(&self) -> Arc<IdempotencyMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Reads and validates the client token. `None` means the request opted out.
    fn client_key(&self, request: &Request) -> Result<Option<String>> {
        let Some(value) = request.headers().get(self.config.header_name.as_str()) else {
            return Ok(None);
        };

        let key = value
            .to_str()
            .map_err(|_| AppError::Validation("Idempotency key must be visible ASCII".to_string()))?
            .trim();

        if key.is_empty() {
            return Err(AppError::Validation("Idempotency key cannot be empty".to_string()));
        }
        if key.len() > self.config.max_key_length {
            return Err(AppError::Validation(format!(
                "Idempotency key exceeds {} characters",
                self.config.max_key_length
            )));
        }

        Ok(Some(key.to_string()))
    }
}

impl IntoResponse for ResponseSnapshot {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let content_type = self
            .content_type
            .as_deref()
            .and_then(|value| HeaderValue::from_str(value).ok());

        let mut response = (status, self.body).into_response();
        let headers = response.headers_mut();
        match content_type {
            Some(value) => {
                headers.insert(CONTENT_TYPE, value);
            }
            None => {
                headers.remove(CONTENT_TYPE);
            }
        }
        headers.insert(
            HeaderName::from_static(REPLAYED_HEADER),
            HeaderValue::from_static("true"),
        );

        response
    }
}

/// Axum middleware enforcing at-most-once execution per idempotency key.
///
/// Protection is opt-in: requests without the configured header reach the
/// handler untouched. Install it with `route_layer` on the mutating routes
/// only.
pub async fn idempotency_middleware(
    State(layer): State<IdempotencyLayer>,
    request: Request,
    next: Next,
) -> Response {
    let key = match layer.client_key(&request) {
        Ok(Some(key)) => key,
        Ok(None) => {
            layer.metrics.record_passthrough();
            return next.run(request).await;
        }
        Err(e) => return e.into_response(),
    };

    match guard(layer, key, request, next).await {
        Ok(response) => response,
        Err(e) => e.into_response(),
    }
}

async fn guard(layer: IdempotencyLayer, key: String, request: Request, next: Next) -> Result<Response> {
    let (parts, body) = request.into_parts();
    let limit = layer.config.max_body_bytes;
    let bytes = axum::body::to_bytes(body, limit)
        .await
        .map_err(|e| body_read_error(e, limit))?;

    let fingerprint = Fingerprint::compute(parts.method.as_str(), parts.uri.path(), &bytes);
    let masked_key = mask_sensitive(&key, 4);
    layer.metrics.record_request();

    match layer.store.begin(&key, &fingerprint).await? {
        Decision::Replay(snapshot) => {
            layer.metrics.record_replay();
            tracing::debug!(key = %masked_key, status = snapshot.status, "Replaying stored response");
            Ok(snapshot.into_response())
        }
        Decision::Conflict(kind) => {
            layer.metrics.record_conflict(kind);
            tracing::warn!(key = %masked_key, kind = %kind, "Rejected idempotent request");
            Err(AppError::IdempotencyConflict(kind))
        }
        Decision::Proceed(lease) => {
            layer.metrics.record_new();
            let request = Request::from_parts(parts, Body::from(bytes));

            // Detached from the connection: a client hanging up must not cancel
            // the mutation between its side effect and settling the record.
            tokio::spawn(execute(layer, lease, masked_key, request, next))
                .await
                .map_err(|e| AppError::Internal(anyhow::anyhow!("Idempotent request task failed: {}", e)))
        }
    }
}

/// Only the length limit maps to 413; a broken or aborted upload is a bad request.
fn body_read_error(error: axum::Error, limit: usize) -> AppError {
    let source = error.into_inner();
    if source.downcast_ref::<LengthLimitError>().is_some() {
        AppError::PayloadTooLarge(limit)
    } else {
        AppError::Validation(format!("Failed to read request body: {}", source))
    }
}

async fn execute(
    layer: IdempotencyLayer,
    lease: Lease,
    masked_key: String,
    request: Request,
    next: Next,
) -> Response {
    match tokio::spawn(next.run(request)).await {
        Ok(response) if !response.status().is_server_error() => {
            settle(&layer, &lease, &masked_key, response).await
        }
        Ok(response) => {
            tracing::warn!(key = %masked_key, status = %response.status(), "Handler failed, releasing idempotency key");
            release(&layer, &lease, &masked_key).await;
            response
        }
        Err(e) => {
            tracing::error!(key = %masked_key, error = %e, "Handler panicked, releasing idempotency key");
            release(&layer, &lease, &masked_key).await;
            AppError::Internal(anyhow::anyhow!("Request handler panicked")).into_response()
        }
    }
}

/// Stores the handler's response against the lease and returns it.
///
/// A transient storage error on `complete` is retried once. If the record
/// still cannot be completed it stays `in_progress`: retries see `in_flight`
/// until `in_flight_ttl_seconds` elapses, after which the cleanup job prunes
/// it and a further retry would execute the mutation again.
async fn settle(layer: &IdempotencyLayer, lease: &Lease, masked_key: &str, response: Response) -> Response {
    let (parts, body) = response.into_parts();
    let bytes: Bytes = match axum::body::to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::error!(key = %masked_key, error = %e, "Failed to capture handler response");
            release(layer, lease, masked_key).await;
            return AppError::Internal(anyhow::anyhow!("Failed to capture response body")).into_response();
        }
    };

    let snapshot = ResponseSnapshot {
        status: parts.status.as_u16(),
        content_type: parts
            .headers
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned),
        body: bytes.to_vec(),
    };

    let mut outcome = layer.store.complete(lease, &snapshot).await;
    if let Err(AppError::Database(e)) = &outcome {
        tracing::warn!(key = %masked_key, error = %e, "Completing idempotency key failed, retrying once");
        outcome = layer.store.complete(lease, &snapshot).await;
    }

    match outcome {
        Ok(()) => layer.metrics.record_completed(),
        // The mutation already happened, so the client still gets its response.
        Err(e) => tracing::error!(key = %masked_key, error = %e, "Failed to mark idempotency key as completed"),
    }

    Response::from_parts(parts, Body::from(bytes))
}

async fn release(layer: &IdempotencyLayer, lease: &Lease, masked_key: &str) {
    match layer.store.abandon(lease).await {
        Ok(true) => layer.metrics.record_abandoned(),
        Ok(false) => tracing::warn!(key = %masked_key, "Idempotency record already released"),
        Err(e) => tracing::error!(key = %masked_key, error = %e, "Failed to release idempotency key"),
    }
}
