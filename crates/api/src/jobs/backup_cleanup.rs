//! Fails interrupted backup jobs and removes backups past their retention date.

use std::sync::Arc;

use domain::services::BackupOrchestrator;

use super::scheduler::{Job, JobFrequency};

const CLEANUP_BATCH: i64 = 100;

pub struct BackupCleanupJob {
    orchestrator: Arc<BackupOrchestrator>,
}

impl BackupCleanupJob {
    pub fn new(orchestrator: Arc<BackupOrchestrator>) -> Self {
        Self { orchestrator }
    }
}

#[async_trait::async_trait]
impl Job for BackupCleanupJob {
    fn name(&self) -> &'static str {
        "backup_cleanup"
    }

    fn frequency(&self) -> JobFrequency {
        JobFrequency::Hourly
    }

    async fn execute(&self) -> Result<(), String> {
        self.orchestrator
            .fail_stale(CLEANUP_BATCH)
            .await
            .map_err(|e| format!("Failed to reconcile interrupted backups: {}", e))?;

        self.orchestrator
            .cleanup_expired(CLEANUP_BATCH)
            .await
            .map(|_| ())
            .map_err(|e| format!("Failed to clean up expired backups: {}", e))
    }
}
