//! Asynchronous backup orchestration around an external dump utility.
//!
//! `create_backup` stores a `pending` record and returns. A spawned task then
//! drives the record `pending -> in-progress -> completed | failed`. Failures in
//! that task are written to the record and never reach the original caller.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use shared::pagination::{PageRequest, Pagination};
use tracing::{error, info, warn};
use validator::Validate;

use crate::error::{DomainError, DomainResult};
use crate::models::backup::{
    BackupCompletion, BackupDownloadHandle, BackupRecord, BackupStatus, BackupType,
    CreateBackupRequest, ListBackupsQuery, NewBackupRecord, DEFAULT_BACKUP_RETENTION_DAYS,
};
use crate::models::AuditAction;
use crate::services::audit::{AuditEntryBuilder, AuditSink};
use crate::services::clock::Clock;
use crate::services::process_runner::ProcessRunner;

const BACKUP_ID_ATTEMPTS: usize = 3;
const MAX_ERROR_MESSAGE_LEN: usize = 1000;
/// Grace on top of the dump timeout before an unfinished job counts as stale.
const STALE_JOB_MARGIN_SECS: i64 = 300;

/// Storage collaborator for backup records.
///
/// Every `mark_*` call is conditional on the stored status and returns `None`
/// when the record is missing or in the wrong state.
#[async_trait::async_trait]
pub trait BackupStore: Send + Sync {
    /// Inserts a record. Returns `Conflict` when the backup id is taken.
    async fn insert(&self, record: NewBackupRecord) -> DomainResult<BackupRecord>;

    async fn find_by_backup_id(&self, backup_id: &str) -> DomainResult<Option<BackupRecord>>;

    async fn list(
        &self,
        query: &ListBackupsQuery,
        page: PageRequest,
    ) -> DomainResult<(Vec<BackupRecord>, i64)>;

    /// `pending -> in-progress`.
    async fn mark_started(
        &self,
        backup_id: &str,
        started_at: DateTime<Utc>,
    ) -> DomainResult<Option<BackupRecord>>;

    /// `in-progress -> completed`.
    async fn mark_completed(
        &self,
        backup_id: &str,
        completion: BackupCompletion,
    ) -> DomainResult<Option<BackupRecord>>;

    /// `pending | in-progress -> failed`.
    async fn mark_failed(
        &self,
        backup_id: &str,
        error_message: &str,
        completed_at: DateTime<Utc>,
        duration_ms: Option<i64>,
    ) -> DomainResult<Option<BackupRecord>>;

    /// Sets the restore stamp on a `completed` record.
    async fn mark_restored(
        &self,
        backup_id: &str,
        restored_by: Option<&str>,
        restored_at: DateTime<Utc>,
    ) -> DomainResult<Option<BackupRecord>>;

    async fn delete(&self, backup_id: &str) -> DomainResult<bool>;

    /// Terminal records whose `expires_at` is before `now`.
    async fn find_expired(&self, now: DateTime<Utc>, limit: i64) -> DomainResult<Vec<BackupRecord>>;

    /// `pending | in-progress` records last updated before `cutoff`.
    async fn find_stale(&self, cutoff: DateTime<Utc>, limit: i64)
        -> DomainResult<Vec<BackupRecord>>;
}

/// How backups are produced and served.
#[derive(Debug, Clone)]
pub struct BackupSettings {
    /// Dump executable, e.g. `pg_dump`.
    pub dump_command: String,
    pub connection_uri: String,
    pub output_dir: PathBuf,
    /// Wall-clock limit for one dump.
    pub timeout: std::time::Duration,
    pub retention_days: i64,
    pub download_ttl_seconds: i64,
    /// HMAC key for download links.
    pub download_secret: String,
}

impl Default for BackupSettings {
    fn default() -> Self {
        Self {
            dump_command: "pg_dump".to_string(),
            connection_uri: String::new(),
            output_dir: PathBuf::from("./backups"),
            timeout: std::time::Duration::from_secs(3600),
            retention_days: DEFAULT_BACKUP_RETENTION_DAYS,
            download_ttl_seconds: 900,
            download_secret: String::new(),
        }
    }
}

/// A page of backup records.
#[derive(Debug, Clone)]
pub struct BackupPage {
    pub data: Vec<BackupRecord>,
    pub pagination: Pagination,
}

/// Artifact produced by a successful dump.
struct DumpArtifact {
    path: PathBuf,
    size: i64,
    checksum: String,
}

/// Backup orchestrator.
#[derive(Clone)]
pub struct BackupOrchestrator {
    store: Arc<dyn BackupStore>,
    runner: Arc<dyn ProcessRunner>,
    audit: Arc<dyn AuditSink>,
    clock: Arc<dyn Clock>,
    settings: Arc<BackupSettings>,
}

impl BackupOrchestrator {
    pub fn new(
        store: Arc<dyn BackupStore>,
        runner: Arc<dyn ProcessRunner>,
        audit: Arc<dyn AuditSink>,
        clock: Arc<dyn Clock>,
        settings: BackupSettings,
    ) -> Self {
        Self {
            store,
            runner,
            audit,
            clock,
            settings: Arc::new(settings),
        }
    }

    /// Records a `pending` backup and starts the dump in the background.
    pub async fn create_backup(
        &self,
        request: CreateBackupRequest,
        admin_id: Option<&str>,
    ) -> DomainResult<BackupRecord> {
        request.validate()?;
        let collections = request.collections.unwrap_or_default();
        for name in &collections {
            shared::validation::validate_collection_name(name)?;
        }
        let backup_type = if collections.is_empty() {
            BackupType::Full
        } else {
            BackupType::Collections
        };

        let mut attempt = 0;
        let record = loop {
            attempt += 1;
            let now = self.clock.now();
            let result = self
                .store
                .insert(NewBackupRecord {
                    backup_id: shared::ids::generate_backup_id(now),
                    backup_type,
                    collections: collections.clone(),
                    description: request.description.clone(),
                    created_by: admin_id.map(str::to_string),
                    created_at: now,
                    expires_at: now + Duration::days(self.settings.retention_days),
                })
                .await;
            match result {
                Err(DomainError::Conflict(_)) if attempt < BACKUP_ID_ATTEMPTS => {
                    warn!(attempt, "Backup id collision, regenerating");
                }
                other => break other?,
            }
        };

        info!(
            backup_id = %record.backup_id,
            backup_type = %record.backup_type,
            collections = record.collections.len(),
            "Backup scheduled"
        );

        let entry = AuditEntryBuilder::admin_action(admin_id, AuditAction::BackupCreate)
            .on_resource("backup", record.backup_id.clone())
            .with_metadata("status", record.status.as_str())
            .with_metadata("collections", record.collections.join(","))
            .with_metadata("expires_at", record.expires_at.to_rfc3339())
            .build(self.clock.now());
        self.audit.record(entry).await;

        let orchestrator = self.clone();
        let backup_id = record.backup_id.clone();
        tokio::spawn(async move {
            orchestrator.run_job(&backup_id).await;
        });

        Ok(record)
    }

    /// Drives one job to a terminal status. Never returns an error.
    pub async fn run_job(&self, backup_id: &str) {
        let started_at = self.clock.now();
        let record = match self.store.mark_started(backup_id, started_at).await {
            Ok(Some(record)) => record,
            Ok(None) => {
                warn!(backup_id = %backup_id, "Backup is not pending, skipping job");
                return;
            }
            Err(e) => {
                error!(backup_id = %backup_id, error = %e, "Failed to start backup job");
                self.fail(backup_id, &e.to_string(), started_at).await;
                return;
            }
        };

        info!(backup_id = %backup_id, "Backup started");

        match self.dump(&record).await {
            Ok(artifact) => {
                let completed_at = self.clock.now();
                let duration_ms = (completed_at - started_at).num_milliseconds().max(0);
                let completion = BackupCompletion {
                    size: artifact.size,
                    path: artifact.path.to_string_lossy().into_owned(),
                    checksum: Some(artifact.checksum),
                    completed_at,
                    duration_ms,
                };
                match self.store.mark_completed(backup_id, completion).await {
                    Ok(Some(done)) => {
                        metrics::counter!("backups_total", "status" => "completed").increment(1);
                        info!(
                            backup_id = %backup_id,
                            size = done.size.unwrap_or_default(),
                            duration_ms,
                            "Backup completed"
                        );
                    }
                    Ok(None) => {
                        error!(backup_id = %backup_id, "Backup left in-progress state before completion");
                    }
                    Err(e) => {
                        error!(backup_id = %backup_id, error = %e, "Failed to record backup completion");
                        self.fail(backup_id, &e.to_string(), started_at).await;
                    }
                }
            }
            Err(message) => {
                error!(backup_id = %backup_id, error = %message, "Backup failed");
                self.fail(backup_id, &message, started_at).await;
            }
        }
    }

    async fn fail(&self, backup_id: &str, message: &str, started_at: DateTime<Utc>) {
        let completed_at = self.clock.now();
        let duration_ms = (completed_at - started_at).num_milliseconds().max(0);
        let message: String = message.chars().take(MAX_ERROR_MESSAGE_LEN).collect();
        match self
            .store
            .mark_failed(backup_id, &message, completed_at, Some(duration_ms))
            .await
        {
            Ok(Some(_)) => {
                metrics::counter!("backups_total", "status" => "failed").increment(1);
            }
            Ok(None) => {
                warn!(backup_id = %backup_id, "Backup already terminal, failure not recorded");
            }
            Err(e) => {
                error!(backup_id = %backup_id, error = %e, "Failed to record backup failure");
            }
        }
    }

    /// Arguments for `(connection_uri, output_path, collection_filters)`.
    pub fn dump_args(&self, output_path: &Path, collections: &[String]) -> Vec<String> {
        let mut args = vec![
            "--dbname".to_string(),
            self.settings.connection_uri.clone(),
            "--file".to_string(),
            output_path.to_string_lossy().into_owned(),
            "--format".to_string(),
            "custom".to_string(),
        ];
        for collection in collections {
            args.push("--table".to_string());
            args.push(collection.clone());
        }
        args
    }

    async fn dump(&self, record: &BackupRecord) -> Result<DumpArtifact, String> {
        tokio::fs::create_dir_all(&self.settings.output_dir)
            .await
            .map_err(|e| format!("Failed to create output directory: {}", e))?;

        let path = self
            .settings
            .output_dir
            .join(format!("{}.dump", record.backup_id));
        let args = self.dump_args(&path, &record.collections);

        let output = match tokio::time::timeout(
            self.settings.timeout,
            self.runner.run(&self.settings.dump_command, &args),
        )
        .await
        {
            Err(_) => {
                remove_artifact(&path).await;
                return Err(format!(
                    "Dump timed out after {} seconds",
                    self.settings.timeout.as_secs()
                ));
            }
            Ok(Err(e)) => return Err(format!("Failed to run dump utility: {}", e)),
            Ok(Ok(output)) => output,
        };

        if !output.success() {
            remove_artifact(&path).await;
            return Err(format!(
                "Dump utility exited with code {}: {}",
                output.exit_code,
                output.stderr.trim()
            ));
        }

        let metadata = tokio::fs::metadata(&path)
            .await
            .map_err(|e| format!("Dump output unavailable: {}", e))?;

        let checksum_path = path.clone();
        let checksum = tokio::task::spawn_blocking(move || shared::crypto::sha256_file(&checksum_path))
            .await
            .map_err(|e| format!("Checksum task failed: {}", e))?
            .map_err(|e| format!("Failed to checksum dump output: {}", e))?;

        Ok(DumpArtifact {
            size: i64::try_from(metadata.len()).unwrap_or(i64::MAX),
            path,
            checksum,
        })
    }

    pub async fn get(&self, backup_id: &str) -> DomainResult<BackupRecord> {
        self.store
            .find_by_backup_id(backup_id)
            .await?
            .ok_or_else(|| DomainError::NotFound(format!("Backup '{}' not found", backup_id)))
    }

    pub async fn list(&self, query: &ListBackupsQuery) -> DomainResult<BackupPage> {
        let page = PageRequest::new(query.page, query.per_page);
        let (data, total) = self.store.list(query, page).await?;
        Ok(BackupPage {
            data,
            pagination: Pagination::new(page, total),
        })
    }

    /// Marks a completed backup as restored.
    ///
    /// The caller must echo the backup id in `confirm_backup_id`. No data is
    /// written back to the database.
    pub async fn restore_backup(
        &self,
        backup_id: &str,
        confirm_backup_id: &str,
        admin_id: Option<&str>,
    ) -> DomainResult<BackupRecord> {
        if confirm_backup_id != backup_id {
            return Err(DomainError::Validation(
                "confirm_backup_id must match the backup being restored".into(),
            ));
        }

        let record = self.get(backup_id).await?;
        if record.status != BackupStatus::Completed {
            return Err(DomainError::Conflict(format!(
                "Only completed backups can be restored; backup is '{}'",
                record.status
            )));
        }

        warn!(
            backup_id = %backup_id,
            admin_id = admin_id.unwrap_or("-"),
            "Restore requested; restore mechanics are not executed, recording restore stamp only"
        );

        let now = self.clock.now();
        let restored = self
            .store
            .mark_restored(backup_id, admin_id, now)
            .await?
            .ok_or_else(|| {
                DomainError::Conflict(format!("Backup '{}' is no longer restorable", backup_id))
            })?;

        let entry = AuditEntryBuilder::admin_action(admin_id, AuditAction::BackupRestore)
            .on_resource("backup", backup_id)
            .with_metadata("status", restored.status.as_str())
            .build(now);
        self.audit.record(entry).await;

        Ok(restored)
    }

    /// Issues a signed, time-limited link to a completed backup's artifact.
    pub async fn download_backup(
        &self,
        backup_id: &str,
        admin_id: Option<&str>,
    ) -> DomainResult<BackupDownloadHandle> {
        let record = self.get(backup_id).await?;
        if record.status != BackupStatus::Completed || record.path.is_none() {
            return Err(DomainError::Conflict(format!(
                "Backup '{}' has no downloadable artifact",
                backup_id
            )));
        }

        let now = self.clock.now();
        let expires_at = now + Duration::seconds(self.settings.download_ttl_seconds);
        let signature = shared::crypto::sign_download(
            &self.settings.download_secret,
            backup_id,
            expires_at.timestamp(),
        );

        let entry = AuditEntryBuilder::admin_action(admin_id, AuditAction::BackupDownload)
            .on_resource("backup", backup_id)
            .with_metadata("expires_at", expires_at.to_rfc3339())
            .build(now);
        self.audit.record(entry).await;

        Ok(BackupDownloadHandle {
            backup_id: backup_id.to_string(),
            download_url: format!(
                "/api/v1/backups/download/{}?expires={}&signature={}",
                backup_id,
                expires_at.timestamp(),
                signature
            ),
            expires_at,
            size: record.size,
            checksum: record.checksum,
        })
    }

    /// Resolves a signed download link to the artifact path.
    pub async fn open_download(
        &self,
        backup_id: &str,
        expires: i64,
        signature: &str,
    ) -> DomainResult<(BackupRecord, PathBuf)> {
        if !shared::crypto::verify_download(
            &self.settings.download_secret,
            backup_id,
            expires,
            signature,
        ) {
            return Err(DomainError::Validation("Invalid download signature".into()));
        }
        if self.clock.now().timestamp() > expires {
            return Err(DomainError::Validation("Download link has expired".into()));
        }

        let record = self.get(backup_id).await?;
        match (&record.status, &record.path) {
            (BackupStatus::Completed, Some(path)) => {
                let path = PathBuf::from(path);
                Ok((record, path))
            }
            _ => Err(DomainError::Conflict(format!(
                "Backup '{}' has no downloadable artifact",
                backup_id
            ))),
        }
    }

    /// Deletes a terminal backup record and its artifact.
    pub async fn delete_backup(&self, backup_id: &str, admin_id: Option<&str>) -> DomainResult<()> {
        let record = self.get(backup_id).await?;
        if !record.status.is_terminal() {
            return Err(DomainError::Conflict(format!(
                "Backup '{}' is still {}",
                backup_id, record.status
            )));
        }

        self.remove(&record).await?;

        info!(backup_id = %backup_id, "Backup deleted");
        let entry = AuditEntryBuilder::admin_action(admin_id, AuditAction::BackupDelete)
            .on_resource("backup", backup_id)
            .build(self.clock.now());
        self.audit.record(entry).await;
        Ok(())
    }

    /// Deletes expired terminal backups. Returns how many were removed.
    pub async fn cleanup_expired(&self, limit: i64) -> DomainResult<usize> {
        let expired = self.store.find_expired(self.clock.now(), limit).await?;
        let mut removed = 0;

        for record in expired {
            match self.remove(&record).await {
                Ok(()) => {
                    removed += 1;
                    let entry = AuditEntryBuilder::system_action(AuditAction::BackupDelete)
                        .on_resource("backup", record.backup_id.clone())
                        .with_metadata("expires_at", record.expires_at.to_rfc3339())
                        .build(self.clock.now());
                    self.audit.record(entry).await;
                }
                Err(e) => {
                    error!(backup_id = %record.backup_id, error = %e, "Failed to delete expired backup");
                }
            }
        }

        if removed > 0 {
            info!(removed, "Expired backups cleaned up");
        }
        Ok(removed)
    }

    /// Fails jobs left `pending` or `in-progress` longer than the dump timeout
    /// plus a margin. Their task died with a previous process, so nothing else
    /// will move them to a terminal status.
    pub async fn fail_stale(&self, limit: i64) -> DomainResult<usize> {
        let now = self.clock.now();
        let stale = self.store.find_stale(now - self.stale_after(), limit).await?;
        let mut failed = 0;

        for record in stale {
            let started_at = record.started_at.unwrap_or(record.created_at);
            let duration_ms = (now - started_at).num_milliseconds().max(0);
            let message = format!("Backup job was interrupted while {}", record.status);
            if self
                .store
                .mark_failed(&record.backup_id, &message, now, Some(duration_ms))
                .await?
                .is_some()
            {
                failed += 1;
                metrics::counter!("backups_total", "status" => "failed").increment(1);
                warn!(
                    backup_id = %record.backup_id,
                    status = %record.status,
                    "Interrupted backup marked failed"
                );
            }
        }

        Ok(failed)
    }

    fn stale_after(&self) -> Duration {
        Duration::from_std(self.settings.timeout).unwrap_or_else(|_| Duration::days(365))
            + Duration::seconds(STALE_JOB_MARGIN_SECS)
    }

    async fn remove(&self, record: &BackupRecord) -> DomainResult<()> {
        if let Some(path) = &record.path {
            match tokio::fs::remove_file(path).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(DomainError::ExternalFailure(format!(
                        "Failed to remove backup artifact: {}",
                        e
                    )))
                }
            }
        }
        self.store.delete(&record.backup_id).await?;
        Ok(())
    }
}

async fn remove_artifact(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(path = %path.display(), error = %e, "Failed to remove partial dump output");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::memory::{
        FakeProcessRunner, InMemoryBackupStore, ManualClock, RecordingAuditSink,
    };
    use chrono::TimeZone;
    use tempfile::TempDir;

    struct Fixture {
        orchestrator: BackupOrchestrator,
        store: Arc<InMemoryBackupStore>,
        runner: Arc<FakeProcessRunner>,
        audit: Arc<RecordingAuditSink>,
        clock: Arc<ManualClock>,
        _dir: TempDir,
    }

    fn fixture(runner: FakeProcessRunner) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(InMemoryBackupStore::new());
        let runner = Arc::new(runner);
        let audit = Arc::new(RecordingAuditSink::new());
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 10, 16, 12, 0, 0).unwrap(),
        ));
        let settings = BackupSettings {
            dump_command: "pg_dump".into(),
            connection_uri: "postgres://localhost/delivery".into(),
            output_dir: dir.path().to_path_buf(),
            timeout: std::time::Duration::from_millis(200),
            retention_days: 30,
            download_ttl_seconds: 900,
            download_secret: "test-secret".into(),
        };
        let orchestrator = BackupOrchestrator::new(
            store.clone(),
            runner.clone(),
            audit.clone(),
            clock.clone(),
            settings,
        );
        Fixture {
            orchestrator,
            store,
            runner,
            audit,
            clock,
            _dir: dir,
        }
    }

    async fn wait_terminal(f: &Fixture, backup_id: &str) -> BackupRecord {
        for _ in 0..200 {
            let record = f.orchestrator.get(backup_id).await.unwrap();
            if record.status.is_terminal() {
                return record;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        panic!("backup {} did not finish", backup_id);
    }

    async fn completed_backup(f: &Fixture) -> BackupRecord {
        let record = f
            .orchestrator
            .create_backup(CreateBackupRequest::default(), Some("admin-1"))
            .await
            .unwrap();
        wait_terminal(f, &record.backup_id).await
    }

    #[tokio::test]
    async fn test_create_returns_pending() {
        let f = fixture(FakeProcessRunner::succeeding(b"dump-bytes".to_vec()));
        let record = f
            .orchestrator
            .create_backup(CreateBackupRequest::default(), Some("admin-1"))
            .await
            .unwrap();
        assert_eq!(record.status, BackupStatus::Pending);
        assert_eq!(record.backup_type, BackupType::Full);
        assert!(record.backup_id.starts_with("backup-20261016-"));
        assert_eq!(record.expires_at - record.created_at, Duration::days(30));
    }

    #[tokio::test]
    async fn test_successful_dump_completes() {
        let f = fixture(FakeProcessRunner::succeeding(b"dump-bytes".to_vec()));
        let record = completed_backup(&f).await;

        assert_eq!(record.status, BackupStatus::Completed);
        assert_eq!(record.size, Some(10));
        assert_eq!(
            record.checksum.as_deref(),
            Some(shared::crypto::sha256_hex("dump-bytes").as_str())
        );
        assert!(record.duration_ms.unwrap() >= 0);
        assert!(record.completed_at.unwrap() >= record.started_at.unwrap());
        assert!(record.error_message.is_none());
        assert!(Path::new(record.path.as_deref().unwrap()).exists());
    }

    #[tokio::test]
    async fn test_dump_receives_collection_filters() {
        let f = fixture(FakeProcessRunner::succeeding(b"x".to_vec()));
        let record = f
            .orchestrator
            .create_backup(
                CreateBackupRequest {
                    collections: Some(vec!["orders".into(), "vendors".into()]),
                    description: Some("Before migration".into()),
                },
                None,
            )
            .await
            .unwrap();
        assert_eq!(record.backup_type, BackupType::Collections);
        wait_terminal(&f, &record.backup_id).await;

        let calls = f.runner.calls();
        assert_eq!(calls.len(), 1);
        let (cmd, args) = &calls[0];
        assert_eq!(cmd, "pg_dump");
        assert!(args.windows(2).any(|w| w[0] == "--table" && w[1] == "orders"));
        assert!(args.windows(2).any(|w| w[0] == "--table" && w[1] == "vendors"));
        assert!(args.contains(&"postgres://localhost/delivery".to_string()));
    }

    #[tokio::test]
    async fn test_invalid_collection_rejected() {
        let f = fixture(FakeProcessRunner::succeeding(b"x".to_vec()));
        let err = f
            .orchestrator
            .create_backup(
                CreateBackupRequest {
                    collections: Some(vec!["orders; rm -rf /".into()]),
                    description: None,
                },
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
        assert!(f.runner.calls().is_empty());
    }

    #[tokio::test]
    async fn test_non_zero_exit_fails() {
        let f = fixture(FakeProcessRunner::failing(1, "connection refused"));
        let record = completed_backup(&f).await;
        assert_eq!(record.status, BackupStatus::Failed);
        let message = record.error_message.unwrap();
        assert!(message.contains("code 1"));
        assert!(message.contains("connection refused"));
    }

    #[tokio::test]
    async fn test_missing_output_fails() {
        let f = fixture(FakeProcessRunner::without_output());
        let record = completed_backup(&f).await;
        assert_eq!(record.status, BackupStatus::Failed);
        assert!(record.error_message.unwrap().contains("Dump output unavailable"));
    }

    #[tokio::test]
    async fn test_spawn_error_fails() {
        let f = fixture(FakeProcessRunner::unavailable());
        let record = completed_backup(&f).await;
        assert_eq!(record.status, BackupStatus::Failed);
        assert!(record.error_message.is_some());
    }

    #[tokio::test]
    async fn test_timeout_fails() {
        let f = fixture(FakeProcessRunner::hanging());
        let record = completed_backup(&f).await;
        assert_eq!(record.status, BackupStatus::Failed);
        assert!(record.error_message.unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn test_job_runs_once() {
        let f = fixture(FakeProcessRunner::succeeding(b"x".to_vec()));
        let record = completed_backup(&f).await;
        f.orchestrator.run_job(&record.backup_id).await;
        assert_eq!(f.runner.calls().len(), 1);
        assert_eq!(
            f.orchestrator.get(&record.backup_id).await.unwrap().status,
            BackupStatus::Completed
        );
    }

    #[tokio::test]
    async fn test_restore_requires_confirmation_and_completed() {
        let f = fixture(FakeProcessRunner::succeeding(b"x".to_vec()));
        let record = completed_backup(&f).await;

        assert!(matches!(
            f.orchestrator
                .restore_backup(&record.backup_id, "something-else", Some("admin-1"))
                .await,
            Err(DomainError::Validation(_))
        ));

        let restored = f
            .orchestrator
            .restore_backup(&record.backup_id, &record.backup_id, Some("admin-1"))
            .await
            .unwrap();
        assert!(restored.is_restored);
        assert_eq!(restored.restored_by.as_deref(), Some("admin-1"));
        assert!(restored.restored_at.is_some());
    }

    #[tokio::test]
    async fn test_restore_failed_backup_conflicts() {
        let f = fixture(FakeProcessRunner::failing(2, "boom"));
        let record = completed_backup(&f).await;
        assert!(matches!(
            f.orchestrator
                .restore_backup(&record.backup_id, &record.backup_id, None)
                .await,
            Err(DomainError::Conflict(_))
        ));
        assert!(matches!(
            f.orchestrator.restore_backup("missing", "missing", None).await,
            Err(DomainError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_download_handle_round_trip() {
        let f = fixture(FakeProcessRunner::succeeding(b"x".to_vec()));
        let record = completed_backup(&f).await;

        let handle = f
            .orchestrator
            .download_backup(&record.backup_id, Some("admin-1"))
            .await
            .unwrap();
        assert_eq!(handle.expires_at, f.clock.now() + Duration::seconds(900));
        let signature = handle.download_url.rsplit("signature=").next().unwrap().to_string();
        let expires = handle.expires_at.timestamp();

        let (_, path) = f
            .orchestrator
            .open_download(&record.backup_id, expires, &signature)
            .await
            .unwrap();
        assert!(path.exists());

        assert!(matches!(
            f.orchestrator
                .open_download(&record.backup_id, expires + 1, &signature)
                .await,
            Err(DomainError::Validation(_))
        ));

        f.clock.advance(Duration::seconds(901));
        assert!(matches!(
            f.orchestrator
                .open_download(&record.backup_id, expires, &signature)
                .await,
            Err(DomainError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_download_requires_completed() {
        let f = fixture(FakeProcessRunner::failing(1, "boom"));
        let record = completed_backup(&f).await;
        assert!(matches!(
            f.orchestrator.download_backup(&record.backup_id, None).await,
            Err(DomainError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_removes_record_and_artifact() {
        let f = fixture(FakeProcessRunner::succeeding(b"x".to_vec()));
        let record = completed_backup(&f).await;
        let path = PathBuf::from(record.path.clone().unwrap());

        f.orchestrator
            .delete_backup(&record.backup_id, Some("admin-1"))
            .await
            .unwrap();
        assert!(!path.exists());
        assert!(matches!(
            f.orchestrator.get(&record.backup_id).await,
            Err(DomainError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_cleanup_expired() {
        let f = fixture(FakeProcessRunner::succeeding(b"x".to_vec()));
        completed_backup(&f).await;
        assert_eq!(f.orchestrator.cleanup_expired(10).await.unwrap(), 0);

        f.clock.advance(Duration::days(31));
        assert_eq!(f.orchestrator.cleanup_expired(10).await.unwrap(), 1);
        assert_eq!(f.store.len(), 0);
    }

    async fn orphaned_backup(f: &Fixture, backup_id: &str, started: bool) -> BackupRecord {
        let now = f.clock.now();
        let record = f
            .store
            .insert(NewBackupRecord {
                backup_id: backup_id.to_string(),
                backup_type: BackupType::Full,
                collections: vec![],
                description: None,
                created_by: None,
                created_at: now,
                expires_at: now + Duration::days(30),
            })
            .await
            .unwrap();
        if started {
            f.store.mark_started(backup_id, now).await.unwrap().unwrap()
        } else {
            record
        }
    }

    #[tokio::test]
    async fn test_fail_stale_reconciles_orphaned_jobs() {
        let f = fixture(FakeProcessRunner::succeeding(b"x".to_vec()));
        orphaned_backup(&f, "backup-orphan-pending", false).await;
        orphaned_backup(&f, "backup-orphan-running", true).await;

        assert_eq!(f.orchestrator.fail_stale(10).await.unwrap(), 0);
        assert!(matches!(
            f.orchestrator.delete_backup("backup-orphan-pending", None).await,
            Err(DomainError::Conflict(_))
        ));

        f.clock.advance(Duration::seconds(STALE_JOB_MARGIN_SECS + 1));
        assert_eq!(f.orchestrator.fail_stale(10).await.unwrap(), 2);
        assert_eq!(f.orchestrator.fail_stale(10).await.unwrap(), 0);

        let running = f.orchestrator.get("backup-orphan-running").await.unwrap();
        assert_eq!(running.status, BackupStatus::Failed);
        assert!(running.error_message.unwrap().contains("in-progress"));
        assert!(running.duration_ms.unwrap() > 0);

        f.orchestrator
            .delete_backup("backup-orphan-pending", None)
            .await
            .unwrap();

        f.clock.advance(Duration::days(31));
        assert_eq!(f.orchestrator.cleanup_expired(10).await.unwrap(), 1);
        assert!(f.store.is_empty());
    }

    #[tokio::test]
    async fn test_fail_stale_leaves_finished_jobs() {
        let f = fixture(FakeProcessRunner::succeeding(b"x".to_vec()));
        let record = completed_backup(&f).await;

        f.clock.advance(Duration::days(1));
        assert_eq!(f.orchestrator.fail_stale(10).await.unwrap(), 0);
        assert_eq!(
            f.orchestrator.get(&record.backup_id).await.unwrap().status,
            BackupStatus::Completed
        );
    }

    #[tokio::test]
    async fn test_mutations_are_audited() {
        let f = fixture(FakeProcessRunner::succeeding(b"x".to_vec()));
        let record = completed_backup(&f).await;
        f.orchestrator
            .restore_backup(&record.backup_id, &record.backup_id, Some("admin-1"))
            .await
            .unwrap();

        let actions: Vec<_> = f.audit.entries().iter().map(|e| e.action).collect();
        assert_eq!(actions, vec![AuditAction::BackupCreate, AuditAction::BackupRestore]);
    }
}
