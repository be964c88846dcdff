//! Database metrics collection.

use metrics::{counter, gauge, histogram};
use sqlx::PgPool;
use std::time::Instant;

/// Records how long a named query took.
pub fn record_query_duration(query_name: &'static str, duration_secs: f64) {
    histogram!("database_query_duration_seconds", "query" => query_name).record(duration_secs);
}

/// Connection pool occupancy at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolSnapshot {
    pub size: usize,
    pub idle: usize,
    pub active: usize,
    pub max: usize,
}

/// Publishes the pool's occupancy as gauges and returns it.
pub fn record_pool_metrics(pool: &PgPool) -> PoolSnapshot {
    let size = pool.size() as usize;
    let idle = pool.num_idle();
    let snapshot = PoolSnapshot {
        size,
        idle,
        active: size.saturating_sub(idle),
        max: pool.options().get_max_connections() as usize,
    };

    gauge!("database_connections_active").set(snapshot.active as f64);
    gauge!("database_connections_idle").set(snapshot.idle as f64);
    gauge!("database_connections_total").set(snapshot.size as f64);
    gauge!("database_connections_max").set(snapshot.max as f64);
    snapshot
}

/// Times one repository call.
///
/// ```ignore
/// let timer = QueryTimer::new("find_backup_by_id");
/// let result = sqlx::query_as::<_, BackupEntity>(...).fetch_optional(&pool).await;
/// timer.record();
/// ```
pub struct QueryTimer {
    query_name: &'static str,
    start: Instant,
}

impl QueryTimer {
    pub fn new(query_name: &'static str) -> Self {
        Self {
            query_name,
            start: Instant::now(),
        }
    }

    pub fn record(self) {
        record_query_duration(self.query_name, self.start.elapsed().as_secs_f64());
    }

    /// Records the duration and counts the call as failed when `result` is an error.
    pub fn record_result<T, E>(self, result: &Result<T, E>) {
        if result.is_err() {
            counter!("database_query_errors_total", "query" => self.query_name).increment(1);
        }
        self.record();
    }
}
