//! In-memory collaborators for tests and local development.
//!
//! Every store can be switched into a failing mode to exercise the
//! fail-closed paths of the services.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use shared::pagination::PageRequest;
use uuid::Uuid;

use crate::error::{DomainError, DomainResult};
use crate::models::backup::{
    BackupCompletion, BackupRecord, BackupStatus, ListBackupsQuery, NewBackupRecord,
};
use crate::models::data_deletion::{
    DataDeletionRequest, DeletionStatus, DeletionSummary, DeletionTransition,
    ListDeletionRequestsQuery, NewDeletionRequest,
};
use crate::models::feature_flag::{FeatureFlag, ListFeatureFlagsQuery, NewFeatureFlag};
use crate::models::login_attempt::{
    FailedAttemptSummary, LoginAttempt, LoginAttemptFilter, LoginAttemptStats, NewLoginAttempt,
};
use crate::models::AuditEntry;
use crate::services::audit::AuditSink;
use crate::services::backup::BackupStore;
use crate::services::clock::Clock;
use crate::services::data_deletion::{DataEraser, DeletionRequestStore};
use crate::services::feature_flags::FeatureFlagStore;
use crate::services::login_security::{FailureWindow, LoginAttemptStore};
use crate::services::process_runner::{ProcessOutput, ProcessRunner};

fn unavailable() -> DomainError {
    DomainError::Storage("In-memory store unavailable".into())
}

fn paginate<T: Clone>(items: &[T], page: PageRequest) -> Vec<T> {
    items
        .iter()
        .skip(page.offset() as usize)
        .take(page.limit() as usize)
        .cloned()
        .collect()
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }

    pub fn set(&self, to: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(|e| e.into_inner()) = to;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Audit sink that keeps every entry.
#[derive(Debug, Default)]
pub struct RecordingAuditSink {
    entries: Mutex<Vec<AuditEntry>>,
}

impl RecordingAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait::async_trait]
impl AuditSink for RecordingAuditSink {
    async fn record(&self, entry: AuditEntry) {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(entry);
    }
}

// ============================================================================
// Feature flags
// ============================================================================

#[derive(Debug, Default)]
pub struct InMemoryFeatureFlagStore {
    flags: Mutex<HashMap<String, FeatureFlag>>,
    failing: AtomicBool,
}

impl InMemoryFeatureFlagStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check(&self) -> DomainResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            Err(unavailable())
        } else {
            Ok(())
        }
    }
}

#[async_trait::async_trait]
impl FeatureFlagStore for InMemoryFeatureFlagStore {
    async fn find_by_key(&self, key: &str) -> DomainResult<Option<FeatureFlag>> {
        self.check()?;
        Ok(self
            .flags
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .cloned())
    }

    async fn list(&self, query: &ListFeatureFlagsQuery) -> DomainResult<Vec<FeatureFlag>> {
        self.check()?;
        let flags = self.flags.lock().unwrap_or_else(|e| e.into_inner());
        let mut result: Vec<FeatureFlag> = flags
            .values()
            .filter(|f| query.environment.map_or(true, |env| f.environment == Some(env)))
            .filter(|f| query.enabled.map_or(true, |enabled| f.enabled == enabled))
            .cloned()
            .collect();
        result.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(result)
    }

    async fn insert(&self, flag: NewFeatureFlag) -> DomainResult<FeatureFlag> {
        self.check()?;
        let mut flags = self.flags.lock().unwrap_or_else(|e| e.into_inner());
        if flags.contains_key(&flag.key) {
            return Err(DomainError::Conflict(format!(
                "Feature flag '{}' already exists",
                flag.key
            )));
        }
        let now = flag.created_at;
        let created = FeatureFlag {
            id: Uuid::new_v4(),
            key: flag.key,
            description: flag.description,
            enabled: flag.enabled,
            environment: flag.environment,
            enabled_for_users: flag.enabled_for_users,
            enabled_for_roles: flag.enabled_for_roles,
            rollout_percentage: flag.rollout_percentage,
            start_date: flag.start_date,
            end_date: flag.end_date,
            created_by: flag.created_by,
            updated_by: None,
            created_at: now,
            updated_at: now,
        };
        flags.insert(created.key.clone(), created.clone());
        Ok(created)
    }

    async fn update(
        &self,
        flag: &FeatureFlag,
        expected_updated_at: DateTime<Utc>,
    ) -> DomainResult<Option<FeatureFlag>> {
        self.check()?;
        let mut flags = self.flags.lock().unwrap_or_else(|e| e.into_inner());
        match flags.get_mut(&flag.key) {
            Some(stored) if stored.updated_at == expected_updated_at => {
                let created_at = stored.created_at;
                let created_by = stored.created_by.clone();
                *stored = FeatureFlag {
                    created_at,
                    created_by,
                    ..flag.clone()
                };
                Ok(Some(stored.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn delete(&self, key: &str) -> DomainResult<bool> {
        self.check()?;
        Ok(self
            .flags
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(key)
            .is_some())
    }
}

// ============================================================================
// Login attempts
// ============================================================================

#[derive(Debug, Default)]
pub struct InMemoryLoginAttemptStore {
    attempts: Mutex<Vec<LoginAttempt>>,
    failing: AtomicBool,
}

impl InMemoryLoginAttemptStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.attempts.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check(&self) -> DomainResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            Err(unavailable())
        } else {
            Ok(())
        }
    }
}

#[async_trait::async_trait]
impl LoginAttemptStore for InMemoryLoginAttemptStore {
    async fn insert(&self, attempt: NewLoginAttempt) -> DomainResult<LoginAttempt> {
        self.check()?;
        let stored = LoginAttempt {
            id: Uuid::new_v4(),
            identifier: attempt.identifier,
            user_id: attempt.user_id,
            ip_address: attempt.ip_address,
            user_agent: attempt.user_agent,
            status: attempt.status,
            failure_reason: attempt.failure_reason,
            device: attempt.device,
            browser: attempt.browser,
            is_suspicious: attempt.is_suspicious,
            created_at: attempt.created_at,
            expires_at: attempt.expires_at,
        };
        self.attempts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(stored.clone());
        Ok(stored)
    }

    async fn count_failures_for_identifier(
        &self,
        identifier: &str,
        since: DateTime<Utc>,
    ) -> DomainResult<u64> {
        self.check()?;
        let attempts = self.attempts.lock().unwrap_or_else(|e| e.into_inner());
        Ok(attempts
            .iter()
            .filter(|a| a.identifier == identifier && a.status.is_failure() && a.created_at >= since)
            .count() as u64)
    }

    async fn distinct_ips_for_identifier(
        &self,
        identifier: &str,
        since: DateTime<Utc>,
    ) -> DomainResult<Vec<String>> {
        self.check()?;
        let attempts = self.attempts.lock().unwrap_or_else(|e| e.into_inner());
        let ips: BTreeSet<String> = attempts
            .iter()
            .filter(|a| a.identifier == identifier && a.created_at >= since)
            .map(|a| a.ip_address.clone())
            .collect();
        Ok(ips.into_iter().collect())
    }

    async fn failure_window(
        &self,
        identifier: &str,
        ip: Option<&str>,
        since: DateTime<Utc>,
    ) -> DomainResult<FailureWindow> {
        self.check()?;
        let attempts = self.attempts.lock().unwrap_or_else(|e| e.into_inner());
        let matching: Vec<&LoginAttempt> = attempts
            .iter()
            .filter(|a| a.status.is_failure() && a.created_at >= since)
            .filter(|a| a.identifier == identifier || ip.is_some_and(|ip| a.ip_address == ip))
            .collect();
        Ok(FailureWindow {
            count: matching.len() as u64,
            oldest: matching.iter().map(|a| a.created_at).min(),
        })
    }

    async fn failed_attempts_by_identifier(
        &self,
        since: DateTime<Utc>,
        threshold: u32,
    ) -> DomainResult<Vec<FailedAttemptSummary>> {
        self.check()?;
        let attempts = self.attempts.lock().unwrap_or_else(|e| e.into_inner());
        let mut grouped: HashMap<&str, (u32, BTreeSet<String>, DateTime<Utc>)> = HashMap::new();
        for attempt in attempts
            .iter()
            .filter(|a| a.status.is_failure() && a.created_at >= since)
        {
            let entry = grouped
                .entry(attempt.identifier.as_str())
                .or_insert((0, BTreeSet::new(), attempt.created_at));
            entry.0 += 1;
            entry.1.insert(attempt.ip_address.clone());
            entry.2 = entry.2.max(attempt.created_at);
        }

        let mut summaries: Vec<FailedAttemptSummary> = grouped
            .into_iter()
            .filter(|(_, (count, _, _))| *count >= threshold)
            .map(|(identifier, (count, ips, last))| FailedAttemptSummary {
                identifier: identifier.to_string(),
                count,
                ip_addresses: ips.into_iter().collect(),
                last_attempt_at: last,
            })
            .collect();
        summaries.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.identifier.cmp(&b.identifier)));
        Ok(summaries)
    }

    async fn list(
        &self,
        filter: &LoginAttemptFilter,
        page: PageRequest,
    ) -> DomainResult<(Vec<LoginAttempt>, i64)> {
        self.check()?;
        let attempts = self.attempts.lock().unwrap_or_else(|e| e.into_inner());
        let mut matching: Vec<LoginAttempt> = attempts
            .iter()
            .filter(|a| filter.identifier.as_ref().map_or(true, |v| &a.identifier == v))
            .filter(|a| filter.ip_address.as_ref().map_or(true, |v| &a.ip_address == v))
            .filter(|a| filter.status.map_or(true, |v| a.status == v))
            .filter(|a| filter.suspicious.map_or(true, |v| a.is_suspicious == v))
            .filter(|a| filter.from.map_or(true, |v| a.created_at >= v))
            .filter(|a| filter.to.map_or(true, |v| a.created_at <= v))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let total = matching.len() as i64;
        Ok((paginate(&matching, page), total))
    }

    async fn stats(&self, since: DateTime<Utc>) -> DomainResult<LoginAttemptStats> {
        self.check()?;
        let attempts = self.attempts.lock().unwrap_or_else(|e| e.into_inner());
        let window: Vec<&LoginAttempt> = attempts.iter().filter(|a| a.created_at >= since).collect();
        let failed = window.iter().filter(|a| a.status.is_failure()).count() as i64;
        Ok(LoginAttemptStats {
            total: window.len() as i64,
            successful: window.len() as i64 - failed,
            failed,
            suspicious: window.iter().filter(|a| a.is_suspicious).count() as i64,
            unique_identifiers: window
                .iter()
                .map(|a| a.identifier.as_str())
                .collect::<HashSet<_>>()
                .len() as i64,
            unique_ips: window
                .iter()
                .map(|a| a.ip_address.as_str())
                .collect::<HashSet<_>>()
                .len() as i64,
        })
    }

    async fn delete_expired(&self, now: DateTime<Utc>, limit: i64) -> DomainResult<u64> {
        self.check()?;
        let mut attempts = self.attempts.lock().unwrap_or_else(|e| e.into_inner());
        let mut remaining = limit.max(0) as u64;
        let mut deleted = 0;
        attempts.retain(|a| {
            if remaining > 0 && a.expires_at < now {
                remaining -= 1;
                deleted += 1;
                false
            } else {
                true
            }
        });
        Ok(deleted)
    }
}

// ============================================================================
// Data deletion requests
// ============================================================================

#[derive(Debug, Default)]
pub struct InMemoryDeletionRequestStore {
    requests: Mutex<HashMap<Uuid, DataDeletionRequest>>,
    failing: AtomicBool,
}

impl InMemoryDeletionRequestStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check(&self) -> DomainResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            Err(unavailable())
        } else {
            Ok(())
        }
    }
}

#[async_trait::async_trait]
impl DeletionRequestStore for InMemoryDeletionRequestStore {
    async fn insert(&self, request: NewDeletionRequest) -> DomainResult<DataDeletionRequest> {
        self.check()?;
        let mut requests = self.requests.lock().unwrap_or_else(|e| e.into_inner());
        if requests
            .values()
            .any(|r| r.request_number == request.request_number)
        {
            return Err(DomainError::Conflict(format!(
                "Request number {} already exists",
                request.request_number
            )));
        }
        let created = DataDeletionRequest {
            id: Uuid::new_v4(),
            request_number: request.request_number,
            subject: request.subject,
            status: DeletionStatus::Pending,
            reason: request.reason,
            data_types: request.data_types,
            hard_delete: request.hard_delete,
            requested_by: request.requested_by,
            reviewed_by: None,
            reviewed_at: None,
            rejection_reason: None,
            approved_by: None,
            approved_at: None,
            scheduled_deletion_date: None,
            deleted_by: None,
            deleted_at: None,
            deletion_summary: None,
            created_at: request.created_at,
            updated_at: request.created_at,
        };
        requests.insert(created.id, created.clone());
        Ok(created)
    }

    async fn find_by_id(&self, id: Uuid) -> DomainResult<Option<DataDeletionRequest>> {
        self.check()?;
        Ok(self
            .requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&id)
            .cloned())
    }

    async fn list(
        &self,
        query: &ListDeletionRequestsQuery,
        page: PageRequest,
    ) -> DomainResult<(Vec<DataDeletionRequest>, i64)> {
        self.check()?;
        let requests = self.requests.lock().unwrap_or_else(|e| e.into_inner());
        let mut matching: Vec<DataDeletionRequest> = requests
            .values()
            .filter(|r| query.status.map_or(true, |s| r.status == s))
            .filter(|r| {
                query
                    .subject_id
                    .as_ref()
                    .map_or(true, |id| &r.subject.subject_id == id)
            })
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let total = matching.len() as i64;
        Ok((paginate(&matching, page), total))
    }

    async fn transition(
        &self,
        id: Uuid,
        from: &[DeletionStatus],
        to: DeletionStatus,
        changes: DeletionTransition,
    ) -> DomainResult<Option<DataDeletionRequest>> {
        self.check()?;
        let mut requests = self.requests.lock().unwrap_or_else(|e| e.into_inner());
        let Some(request) = requests.get_mut(&id) else {
            return Ok(None);
        };
        if !from.contains(&request.status) {
            return Ok(None);
        }

        request.status = to;
        if changes.reviewed_by.is_some() {
            request.reviewed_by = changes.reviewed_by;
        }
        if changes.reviewed_at.is_some() {
            request.reviewed_at = changes.reviewed_at;
        }
        if changes.rejection_reason.is_some() {
            request.rejection_reason = changes.rejection_reason;
        }
        if changes.approved_by.is_some() {
            request.approved_by = changes.approved_by;
        }
        if changes.approved_at.is_some() {
            request.approved_at = changes.approved_at;
        }
        if changes.scheduled_deletion_date.is_some() {
            request.scheduled_deletion_date = changes.scheduled_deletion_date;
        }
        if changes.deleted_by.is_some() {
            request.deleted_by = changes.deleted_by;
        }
        if changes.deleted_at.is_some() {
            request.deleted_at = changes.deleted_at;
        }
        if changes.deletion_summary.is_some() {
            request.deletion_summary = changes.deletion_summary;
        }
        if let Some(updated_at) = changes.updated_at {
            request.updated_at = updated_at;
        }
        Ok(Some(request.clone()))
    }

    async fn find_due(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> DomainResult<Vec<DataDeletionRequest>> {
        self.check()?;
        let requests = self.requests.lock().unwrap_or_else(|e| e.into_inner());
        let mut due: Vec<DataDeletionRequest> = requests
            .values()
            .filter(|r| r.status == DeletionStatus::Approved)
            .filter(|r| r.scheduled_deletion_date.is_some_and(|d| d <= now))
            .cloned()
            .collect();
        due.sort_by_key(|r| r.scheduled_deletion_date);
        due.truncate(limit.max(0) as usize);
        Ok(due)
    }
}

/// Eraser that counts calls and can be made to fail.
#[derive(Debug, Default)]
pub struct FakeDataEraser {
    calls: AtomicUsize,
    failing: AtomicBool,
}

impl FakeDataEraser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl DataEraser for FakeDataEraser {
    async fn erase(&self, request: &DataDeletionRequest) -> DomainResult<DeletionSummary> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(DomainError::ExternalFailure("Eraser unavailable".into()));
        }
        Ok(DeletionSummary {
            counts: request
                .data_types
                .iter()
                .map(|t| (t.clone(), 1))
                .collect(),
            hard_delete: request.hard_delete,
            dry_run: false,
        })
    }
}

// ============================================================================
// Backups
// ============================================================================

#[derive(Debug, Default)]
pub struct InMemoryBackupStore {
    records: Mutex<HashMap<String, BackupRecord>>,
    failing: AtomicBool,
}

impl InMemoryBackupStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.records.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check(&self) -> DomainResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            Err(unavailable())
        } else {
            Ok(())
        }
    }

    fn update_if<F>(
        &self,
        backup_id: &str,
        allowed: &[BackupStatus],
        apply: F,
    ) -> DomainResult<Option<BackupRecord>>
    where
        F: FnOnce(&mut BackupRecord),
    {
        self.check()?;
        let mut records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        match records.get_mut(backup_id) {
            Some(record) if allowed.contains(&record.status) => {
                apply(record);
                Ok(Some(record.clone()))
            }
            _ => Ok(None),
        }
    }
}

#[async_trait::async_trait]
impl BackupStore for InMemoryBackupStore {
    async fn insert(&self, record: NewBackupRecord) -> DomainResult<BackupRecord> {
        self.check()?;
        let mut records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        if records.contains_key(&record.backup_id) {
            return Err(DomainError::Conflict(format!(
                "Backup '{}' already exists",
                record.backup_id
            )));
        }
        let created = BackupRecord {
            id: Uuid::new_v4(),
            backup_id: record.backup_id,
            backup_type: record.backup_type,
            collections: record.collections,
            status: BackupStatus::Pending,
            description: record.description,
            size: None,
            path: None,
            s3_key: None,
            checksum: None,
            encrypted: false,
            error_message: None,
            created_by: record.created_by,
            started_at: None,
            completed_at: None,
            duration_ms: None,
            is_restored: false,
            restored_by: None,
            restored_at: None,
            expires_at: record.expires_at,
            created_at: record.created_at,
            updated_at: record.created_at,
        };
        records.insert(created.backup_id.clone(), created.clone());
        Ok(created)
    }

    async fn find_by_backup_id(&self, backup_id: &str) -> DomainResult<Option<BackupRecord>> {
        self.check()?;
        Ok(self
            .records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(backup_id)
            .cloned())
    }

    async fn list(
        &self,
        query: &ListBackupsQuery,
        page: PageRequest,
    ) -> DomainResult<(Vec<BackupRecord>, i64)> {
        self.check()?;
        let records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        let mut matching: Vec<BackupRecord> = records
            .values()
            .filter(|r| query.status.map_or(true, |s| r.status == s))
            .cloned()
            .collect();
        matching.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.backup_id.cmp(&a.backup_id))
        });
        let total = matching.len() as i64;
        Ok((paginate(&matching, page), total))
    }

    async fn mark_started(
        &self,
        backup_id: &str,
        started_at: DateTime<Utc>,
    ) -> DomainResult<Option<BackupRecord>> {
        self.update_if(backup_id, &[BackupStatus::Pending], |r| {
            r.status = BackupStatus::InProgress;
            r.started_at = Some(started_at);
            r.updated_at = started_at;
        })
    }

    async fn mark_completed(
        &self,
        backup_id: &str,
        completion: BackupCompletion,
    ) -> DomainResult<Option<BackupRecord>> {
        self.update_if(backup_id, &[BackupStatus::InProgress], |r| {
            r.status = BackupStatus::Completed;
            r.size = Some(completion.size);
            r.path = Some(completion.path);
            r.checksum = completion.checksum;
            r.completed_at = Some(completion.completed_at);
            r.duration_ms = Some(completion.duration_ms);
            r.updated_at = completion.completed_at;
        })
    }

    async fn mark_failed(
        &self,
        backup_id: &str,
        error_message: &str,
        completed_at: DateTime<Utc>,
        duration_ms: Option<i64>,
    ) -> DomainResult<Option<BackupRecord>> {
        self.update_if(
            backup_id,
            &[BackupStatus::Pending, BackupStatus::InProgress],
            |r| {
                r.status = BackupStatus::Failed;
                r.error_message = Some(error_message.to_string());
                r.completed_at = Some(completed_at);
                r.duration_ms = duration_ms;
                r.updated_at = completed_at;
            },
        )
    }

    async fn mark_restored(
        &self,
        backup_id: &str,
        restored_by: Option<&str>,
        restored_at: DateTime<Utc>,
    ) -> DomainResult<Option<BackupRecord>> {
        self.update_if(backup_id, &[BackupStatus::Completed], |r| {
            r.is_restored = true;
            r.restored_by = restored_by.map(str::to_string);
            r.restored_at = Some(restored_at);
            r.updated_at = restored_at;
        })
    }

    async fn delete(&self, backup_id: &str) -> DomainResult<bool> {
        self.check()?;
        Ok(self
            .records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(backup_id)
            .is_some())
    }

    async fn find_expired(&self, now: DateTime<Utc>, limit: i64) -> DomainResult<Vec<BackupRecord>> {
        self.check()?;
        let records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        let mut expired: Vec<BackupRecord> = records
            .values()
            .filter(|r| r.status.is_terminal() && r.expires_at < now)
            .cloned()
            .collect();
        expired.sort_by_key(|r| r.expires_at);
        expired.truncate(limit.max(0) as usize);
        Ok(expired)
    }
    async fn find_stale(
        &self,
        cutoff: DateTime<Utc>,
        limit: i64,
    ) -> DomainResult<Vec<BackupRecord>> {
        self.check()?;
        let records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        let mut stale: Vec<BackupRecord> = records
            .values()
            .filter(|r| !r.status.is_terminal() && r.updated_at < cutoff)
            .cloned()
            .collect();
        stale.sort_by_key(|r| r.updated_at);
        stale.truncate(limit.max(0) as usize);
        Ok(stale)
    }
}

/// Scripted outcome of [`FakeProcessRunner`].
#[derive(Debug, Clone)]
enum FakeOutcome {
    /// Writes the bytes to the `--file` argument and exits 0.
    Succeed(Vec<u8>),
    Fail { exit_code: i32, stderr: String },
    /// Exits 0 without producing output.
    NoOutput,
    /// The executable cannot be started.
    Unavailable,
    /// Never finishes on its own.
    Hang,
}

/// Process runner with a scripted outcome that records every call.
#[derive(Debug)]
pub struct FakeProcessRunner {
    outcome: FakeOutcome,
    calls: Mutex<Vec<(String, Vec<String>)>>,
}

impl FakeProcessRunner {
    fn with(outcome: FakeOutcome) -> Self {
        Self {
            outcome,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn succeeding(contents: Vec<u8>) -> Self {
        Self::with(FakeOutcome::Succeed(contents))
    }

    pub fn failing(exit_code: i32, stderr: &str) -> Self {
        Self::with(FakeOutcome::Fail {
            exit_code,
            stderr: stderr.to_string(),
        })
    }

    pub fn without_output() -> Self {
        Self::with(FakeOutcome::NoOutput)
    }

    pub fn unavailable() -> Self {
        Self::with(FakeOutcome::Unavailable)
    }

    pub fn hanging() -> Self {
        Self::with(FakeOutcome::Hang)
    }

    pub fn calls(&self) -> Vec<(String, Vec<String>)> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait::async_trait]
impl ProcessRunner for FakeProcessRunner {
    async fn run(&self, cmd: &str, args: &[String]) -> io::Result<ProcessOutput> {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((cmd.to_string(), args.to_vec()));

        match &self.outcome {
            FakeOutcome::Succeed(contents) => {
                let target = args
                    .iter()
                    .position(|a| a == "--file")
                    .and_then(|i| args.get(i + 1))
                    .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "missing --file"))?;
                tokio::fs::write(target, contents).await?;
                Ok(ProcessOutput {
                    exit_code: 0,
                    stdout: String::new(),
                    stderr: String::new(),
                })
            }
            FakeOutcome::Fail { exit_code, stderr } => Ok(ProcessOutput {
                exit_code: *exit_code,
                stdout: String::new(),
                stderr: stderr.clone(),
            }),
            FakeOutcome::NoOutput => Ok(ProcessOutput::default()),
            FakeOutcome::Unavailable => Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("{}: command not found", cmd),
            )),
            FakeOutcome::Hang => {
                tokio::time::sleep(std::time::Duration::from_secs(3600)).await;
                Ok(ProcessOutput::default())
            }
        }
    }
}
