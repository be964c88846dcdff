//! Connection pool gauges and saturation warnings.

use persistence::metrics::PoolSnapshot;
use sqlx::PgPool;
use tracing::warn;

use super::scheduler::{Job, JobFrequency};

const SAMPLE_INTERVAL_SECS: u64 = 10;

/// Samples the pool every few seconds.
pub struct PoolMetricsJob {
    pool: PgPool,
}

impl PoolMetricsJob {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Every connection the pool may open is checked out.
fn is_saturated(snapshot: &PoolSnapshot) -> bool {
    snapshot.max > 0 && snapshot.active >= snapshot.max
}

#[async_trait::async_trait]
impl Job for PoolMetricsJob {
    fn name(&self) -> &'static str {
        "pool_metrics"
    }

    fn frequency(&self) -> JobFrequency {
        JobFrequency::Seconds(SAMPLE_INTERVAL_SECS)
    }

    async fn execute(&self) -> Result<(), String> {
        let snapshot = persistence::metrics::record_pool_metrics(&self.pool);
        if is_saturated(&snapshot) {
            warn!(
                active = snapshot.active,
                max = snapshot.max,
                "Database connection pool saturated"
            );
        }
        Ok(())
    }
}
