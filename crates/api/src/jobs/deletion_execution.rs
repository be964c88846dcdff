//! Executes approved data deletion requests once their grace period ends.

use std::sync::Arc;
use tracing::info;

use domain::services::DataDeletionService;

use super::scheduler::{Job, JobFrequency};

pub struct DeletionExecutionJob {
    service: Arc<DataDeletionService>,
    poll_interval_secs: u64,
    batch_size: i64,
}

impl DeletionExecutionJob {
    pub fn new(service: Arc<DataDeletionService>, poll_interval_secs: u64, batch_size: i64) -> Self {
        Self {
            service,
            poll_interval_secs,
            batch_size: batch_size.max(1),
        }
    }
}

#[async_trait::async_trait]
impl Job for DeletionExecutionJob {
    fn name(&self) -> &'static str {
        "deletion_execution"
    }

    fn frequency(&self) -> JobFrequency {
        JobFrequency::Seconds(self.poll_interval_secs)
    }

    async fn execute(&self) -> Result<(), String> {
        let report = self
            .service
            .execute_due(self.batch_size)
            .await
            .map_err(|e| format!("Failed to load due deletion requests: {}", e))?;

        if report.executed + report.skipped + report.failed > 0 {
            info!(
                executed = report.executed,
                skipped = report.skipped,
                failed = report.failed,
                "Processed due deletion requests"
            );
        }

        if report.failed > 0 {
            return Err(format!("{} deletion requests failed", report.failed));
        }
        Ok(())
    }
}
