use foodlog::api::{create_router, AppState};
use foodlog::config::Settings;
use foodlog::idempotency::{
    IdempotencyCleanupJob, IdempotencyLayer, IdempotencyStore, PostgresIdempotencyStore,
};
use foodlog::observability::{init_logging, init_metrics, LogConfig};
use foodlog::scheduler::JobRegistry;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    // Load configuration
    let settings = Settings::new()?;

    // Initialize logging
    init_logging(&LogConfig::from_settings(&settings.application));
    info!("Configuration loaded");

    // Connect to PostgreSQL
    let pool = PgPoolOptions::new()
        .max_connections(settings.database.pool_size)
        .acquire_timeout(Duration::from_secs(5))
        .connect(&settings.database.url)
        .await?;

    info!("Database connection established");

    // Run migrations
    info!("Running database migrations...");
    sqlx::migrate!("./migrations").run(&pool).await?;
    info!("Migrations applied successfully");

    // Idempotency store and middleware state share the request pool
    let idempotency = &settings.idempotency;
    let store: Arc<dyn IdempotencyStore> = Arc::new(PostgresIdempotencyStore::new(
        pool.clone(),
        idempotency.ttl_seconds,
        idempotency.in_flight_ttl_seconds,
    ));
    let layer = IdempotencyLayer::new(Arc::clone(&store), idempotency.clone());

    // Background jobs. The erasure and reminder services plug in here with
    // `.register_fn(GDPR_ERASURE, ..)` and `.register_fn(REMINDERS, ..)`;
    // their intervals are already read from `[jobs.intervals]`.
    let registry = JobRegistry::new().register(IdempotencyCleanupJob::new(store));
    info!(jobs = ?registry.job_names(), "Background jobs registered");
    let scheduler = Arc::new(registry.into_scheduler(settings.jobs.intervals.clone()));
    scheduler.start();

    let metrics_handle = init_metrics();
    let state = AppState::new(pool, layer)
        .with_metrics(metrics_handle)
        .with_scheduler(Arc::clone(&scheduler));

    let address = format!("{}:{}", settings.application.host, settings.application.port);
    let listener = tokio::net::TcpListener::bind(&address).await?;
    info!("Listening on {}", address);

    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    scheduler.stop();
    info!("Shutdown complete");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
