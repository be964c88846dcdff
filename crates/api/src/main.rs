use anyhow::Result;
use std::net::SocketAddr;
use std::time::Duration;
use tracing::{info, warn};

use control_plane_api::app::{create_app, AppState};
use control_plane_api::config::Config;
use control_plane_api::jobs::{
    BackupCleanupJob, DeletionExecutionJob, JobScheduler, LoginAttemptRetentionJob,
    PoolMetricsJob, RateLimiterSweepJob,
};
use control_plane_api::middleware;

const STALE_BACKUP_BATCH: i64 = 100;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let config = Config::load()?;

    middleware::logging::init_logging(&config.logging);
    middleware::init_metrics()?;

    info!(
        environment = %config.flag_environment(),
        "Starting control plane v{}",
        env!("CARGO_PKG_VERSION")
    );

    let pool = persistence::db::create_pool(&(&config.database).into()).await?;

    info!("Running database migrations...");
    persistence::db::run_migrations(&pool).await?;
    info!("Migrations completed");

    let addr = config.socket_addr()?;
    let data_deletion = config.data_deletion.clone();
    let purge_batch_size = config.login_security.purge_batch_size;

    let state = AppState::postgres(config, pool.clone());

    match state.backups.fail_stale(STALE_BACKUP_BATCH).await {
        Ok(0) => {}
        Ok(failed) => warn!(failed, "Marked interrupted backups as failed"),
        Err(e) => warn!(error = %e, "Failed to reconcile interrupted backups"),
    }

    let mut scheduler = JobScheduler::new();
    scheduler.register(PoolMetricsJob::new(pool));
    scheduler.register(DeletionExecutionJob::new(
        state.data_deletion.clone(),
        data_deletion.poll_interval_secs,
        data_deletion.batch_size,
    ));
    scheduler.register(LoginAttemptRetentionJob::new(
        state.login_security.clone(),
        purge_batch_size,
    ));
    scheduler.register(BackupCleanupJob::new(state.backups.clone()));
    if let Some(limiter) = state.rate_limiter.clone() {
        scheduler.register(RateLimiterSweepJob::new(limiter));
    }
    scheduler.start();

    let app = create_app(state);

    info!("Server listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    scheduler.shutdown();
    scheduler.wait_for_shutdown(Duration::from_secs(30)).await;
    info!("Server stopped");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
