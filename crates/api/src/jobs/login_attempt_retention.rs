//! Login ledger retention background job.

use std::sync::Arc;
use tracing::info;

use domain::services::LoginSecurityService;

use super::scheduler::{Job, JobFrequency};

/// Deletes ledger entries past their `expires_at`.
pub struct LoginAttemptRetentionJob {
    service: Arc<LoginSecurityService>,
    batch_size: i64,
}

impl LoginAttemptRetentionJob {
    pub fn new(service: Arc<LoginSecurityService>, batch_size: i64) -> Self {
        Self {
            service,
            batch_size: batch_size.max(1),
        }
    }
}

#[async_trait::async_trait]
impl Job for LoginAttemptRetentionJob {
    fn name(&self) -> &'static str {
        "login_attempt_retention"
    }

    fn frequency(&self) -> JobFrequency {
        JobFrequency::Hourly
    }

    async fn execute(&self) -> Result<(), String> {
        let deleted = self
            .service
            .purge_expired(self.batch_size)
            .await
            .map_err(|e| format!("Failed to purge login attempts: {}", e))?;

        info!(
            deleted,
            retention_days = self.service.settings().retention_days,
            "Login attempt retention pass finished"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use domain::models::login_attempt::{LogLoginAttemptRequest, LoginAttemptFilter};
    use domain::models::LoginStatus;
    use domain::services::memory::{InMemoryLoginAttemptStore, ManualClock};
    use domain::services::LoginSecuritySettings;

    fn service(
        store: Arc<InMemoryLoginAttemptStore>,
        clock: Arc<ManualClock>,
    ) -> Arc<LoginSecurityService> {
        Arc::new(LoginSecurityService::new(
            store,
            clock,
            LoginSecuritySettings {
                max_attempts: 5,
                window_minutes: 15,
                retention_days: 30,
            },
        ))
    }

    #[tokio::test]
    async fn test_purges_expired_entries() {
        let store = Arc::new(InMemoryLoginAttemptStore::new());
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let service = service(store.clone(), clock.clone());

        service
            .log_attempt(LogLoginAttemptRequest {
                identifier: "rider@example.com".into(),
                ip_address: Some("10.0.0.1".into()),
                user_agent: None,
                status: LoginStatus::Success,
                failure_reason: None,
                user_id: None,
            })
            .await
            .unwrap();

        let job = LoginAttemptRetentionJob::new(service.clone(), 100);
        job.execute().await.unwrap();
        assert_eq!(store.len(), 1);

        clock.advance(Duration::days(31));
        job.execute().await.unwrap();
        assert!(store.is_empty());

        let page = service.list(&LoginAttemptFilter::default()).await.unwrap();
        assert!(page.data.is_empty());
    }

    #[tokio::test]
    async fn test_store_failure_fails_the_run() {
        let store = Arc::new(InMemoryLoginAttemptStore::new());
        store.set_failing(true);
        let job = LoginAttemptRetentionJob::new(
            service(store, Arc::new(ManualClock::new(Utc::now()))),
            100,
        );

        assert_eq!(job.frequency(), JobFrequency::Hourly);
        assert!(job.execute().await.is_err());
    }
}
