use axum::{middleware, routing::get, Router};
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{
    compression::CompressionLayer,
    cors::{AllowOrigin, Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use domain::services::{
    AuditSink, BackupOrchestrator, Clock, DataDeletionService, DataEraser, DryRunEraser,
    FeatureFlagService, LoginSecurityService, SystemClock, TokioProcessRunner, TracingAuditSink,
};
use persistence::repositories::{
    BackupRepository, DeletionRequestRepository, FeatureFlagRepository, LoginAttemptRepository,
};

use crate::config::Config;
use crate::middleware::{
    metrics_handler, metrics_middleware, rate_limit_middleware, security_headers_middleware,
    trace_id, RateLimiterState,
};
use crate::routes::health::{self, PgReadiness, ReadinessProbe};
use crate::routes::{backups, data_deletion_requests, feature_flags, login_attempts};

/// The four control plane services.
#[derive(Clone)]
pub struct Services {
    pub feature_flags: Arc<FeatureFlagService>,
    pub login_security: Arc<LoginSecurityService>,
    pub data_deletion: Arc<DataDeletionService>,
    pub backups: Arc<BackupOrchestrator>,
}

impl Services {
    /// Wires every service to its PostgreSQL repository.
    pub fn postgres(config: &Config, pool: PgPool) -> Self {
        let audit: Arc<dyn AuditSink> = Arc::new(TracingAuditSink);
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let eraser: Arc<dyn DataEraser> = Arc::new(DryRunEraser);

        Self {
            feature_flags: Arc::new(FeatureFlagService::new(
                Arc::new(FeatureFlagRepository::new(pool.clone())),
                audit.clone(),
                clock.clone(),
                config.flag_environment(),
            )),
            login_security: Arc::new(LoginSecurityService::new(
                Arc::new(LoginAttemptRepository::new(pool.clone())),
                clock.clone(),
                (&config.login_security).into(),
            )),
            data_deletion: Arc::new(DataDeletionService::new(
                Arc::new(DeletionRequestRepository::new(pool.clone())),
                eraser,
                audit.clone(),
                clock.clone(),
                config.data_deletion.grace_period_days,
            )),
            backups: Arc::new(BackupOrchestrator::new(
                Arc::new(BackupRepository::new(pool)),
                Arc::new(TokioProcessRunner),
                audit,
                clock,
                config.backup_settings(),
            )),
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub feature_flags: Arc<FeatureFlagService>,
    pub login_security: Arc<LoginSecurityService>,
    pub data_deletion: Arc<DataDeletionService>,
    pub backups: Arc<BackupOrchestrator>,
    pub readiness: Arc<dyn ReadinessProbe>,
    pub rate_limiter: Option<Arc<RateLimiterState>>,
}

impl AppState {
    pub fn new(config: Config, services: Services, readiness: Arc<dyn ReadinessProbe>) -> Self {
        let rate_limiter =
            RateLimiterState::new(config.security.rate_limit_per_minute).map(Arc::new);

        Self {
            config: Arc::new(config),
            feature_flags: services.feature_flags,
            login_security: services.login_security,
            data_deletion: services.data_deletion,
            backups: services.backups,
            readiness,
            rate_limiter,
        }
    }

    pub fn postgres(config: Config, pool: PgPool) -> Self {
        let services = Services::postgres(&config, pool.clone());
        Self::new(config, services, Arc::new(PgReadiness::new(pool)))
    }
}

pub fn create_app(state: AppState) -> Router {
    let config = state.config.clone();

    let cors = if config.security.cors_origins.is_empty() {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<_> = config
            .security
            .cors_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods(Any)
            .allow_headers(Any)
    };

    // Every admin handler extracts AdminIdentity, so no auth layer here.
    let admin_routes = Router::new()
        .nest("/api/admin/v1/feature-flags", feature_flags::admin_router())
        .nest("/api/admin/v1/login-attempts", login_attempts::admin_router())
        .nest(
            "/api/admin/v1/data-deletion-requests",
            data_deletion_requests::router(),
        )
        .nest("/api/admin/v1/backups", backups::admin_router());

    let service_routes = Router::new()
        .nest("/api/v1/feature-flags", feature_flags::service_router())
        .nest("/api/v1/login-attempts", login_attempts::service_router())
        .nest("/api/v1/backups", backups::download_router())
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit_middleware,
        ));

    let public_routes = Router::new()
        .route("/api/health", get(health::health_check))
        .route("/api/health/ready", get(health::ready))
        .route("/api/health/live", get(health::live))
        .route("/metrics", get(metrics_handler));

    Router::new()
        .merge(public_routes)
        .merge(admin_routes)
        .merge(service_routes)
        // Global middleware (bottom layers run first)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            security_headers_middleware,
        ))
        .layer(CompressionLayer::new())
        .layer(TimeoutLayer::new(Duration::from_secs(
            config.server.request_timeout_secs,
        )))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(trace_id))
        .layer(cors)
        .with_state(state)
}
