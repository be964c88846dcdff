//! Drops idle keys from the per-IP rate limiter.

use std::sync::Arc;
use tracing::debug;

use crate::middleware::RateLimiterState;

use super::scheduler::{Job, JobFrequency};

pub struct RateLimiterSweepJob {
    limiter: Arc<RateLimiterState>,
}

impl RateLimiterSweepJob {
    pub fn new(limiter: Arc<RateLimiterState>) -> Self {
        Self { limiter }
    }
}

#[async_trait::async_trait]
impl Job for RateLimiterSweepJob {
    fn name(&self) -> &'static str {
        "rate_limiter_sweep"
    }

    fn frequency(&self) -> JobFrequency {
        JobFrequency::Minutes(5)
    }

    async fn execute(&self) -> Result<(), String> {
        let remaining = self.limiter.retain_recent();
        debug!(tracked_keys = remaining, "Rate limiter swept");
        Ok(())
    }
}
