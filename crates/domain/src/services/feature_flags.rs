//! Feature flag evaluation and administration.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{info, warn};
use validator::Validate;

use crate::error::{DomainError, DomainResult};
use crate::models::feature_flag::{
    CreateFeatureFlagRequest, FeatureFlag, FlagEnvironment, ListFeatureFlagsQuery, NewFeatureFlag,
    UpdateFeatureFlagRequest,
};
use crate::models::AuditAction;
use crate::services::audit::{AuditEntryBuilder, AuditSink};
use crate::services::clock::Clock;

/// Storage collaborator for feature flags.
#[async_trait::async_trait]
pub trait FeatureFlagStore: Send + Sync {
    async fn find_by_key(&self, key: &str) -> DomainResult<Option<FeatureFlag>>;

    async fn list(&self, query: &ListFeatureFlagsQuery) -> DomainResult<Vec<FeatureFlag>>;

    /// Inserts a flag. Returns `Conflict` when the key already exists.
    async fn insert(&self, flag: NewFeatureFlag) -> DomainResult<FeatureFlag>;

    /// Overwrites the mutable fields of the flag with the same key, only if its
    /// stored `updated_at` still equals `expected_updated_at`.
    ///
    /// Returns `None` when the flag is missing or was changed in between.
    async fn update(
        &self,
        flag: &FeatureFlag,
        expected_updated_at: DateTime<Utc>,
    ) -> DomainResult<Option<FeatureFlag>>;

    /// Returns whether a flag was removed.
    async fn delete(&self, key: &str) -> DomainResult<bool>;
}

/// Decides whether `flag` is active for the identity at `now`.
///
/// Rules are applied in order and the first decisive rule wins:
/// disabled, environment mismatch, outside the date window, user allowlist,
/// role allowlist, percentage rollout, then enabled.
pub fn evaluate(
    flag: &FeatureFlag,
    user_id: Option<&str>,
    role: Option<&str>,
    runtime: FlagEnvironment,
    now: DateTime<Utc>,
) -> bool {
    if !flag.enabled {
        return false;
    }

    if let Some(environment) = flag.environment {
        if !environment.applies_to(runtime) {
            return false;
        }
    }

    if !flag.is_within_window(now) {
        return false;
    }

    if !flag.enabled_for_users.is_empty() {
        return user_id.is_some_and(|id| flag.enabled_for_users.iter().any(|u| u == id));
    }

    if !flag.enabled_for_roles.is_empty() {
        return role.is_some_and(|r| flag.enabled_for_roles.iter().any(|allowed| allowed == r));
    }

    if let (Some(percentage), Some(user_id)) = (flag.rollout_percentage, user_id) {
        return shared::rollout::in_rollout(user_id, &flag.key, percentage);
    }

    true
}

fn checked_percentage(value: Option<i32>) -> DomainResult<Option<u8>> {
    match value {
        None => Ok(None),
        Some(v) => {
            shared::validation::validate_rollout_percentage(v)?;
            u8::try_from(v)
                .map(Some)
                .map_err(|_| DomainError::Validation("Rollout percentage out of range".into()))
        }
    }
}

/// Feature flag service.
#[derive(Clone)]
pub struct FeatureFlagService {
    store: Arc<dyn FeatureFlagStore>,
    audit: Arc<dyn AuditSink>,
    clock: Arc<dyn Clock>,
    runtime_environment: FlagEnvironment,
}

impl FeatureFlagService {
    pub fn new(
        store: Arc<dyn FeatureFlagStore>,
        audit: Arc<dyn AuditSink>,
        clock: Arc<dyn Clock>,
        runtime_environment: FlagEnvironment,
    ) -> Self {
        Self {
            store,
            audit,
            clock,
            runtime_environment,
        }
    }

    pub fn runtime_environment(&self) -> FlagEnvironment {
        self.runtime_environment
    }

    /// Evaluates a flag for an identity.
    ///
    /// Never fails: a missing flag or a store error evaluates to `false`.
    pub async fn is_enabled(&self, key: &str, user_id: Option<&str>, role: Option<&str>) -> bool {
        let result = match self.store.find_by_key(key).await {
            Ok(Some(flag)) => evaluate(
                &flag,
                user_id,
                role,
                self.runtime_environment,
                self.clock.now(),
            ),
            Ok(None) => false,
            Err(e) => {
                warn!(flag_key = %key, error = %e, "Flag lookup failed, evaluating as disabled");
                false
            }
        };

        metrics::counter!(
            "feature_flag_evaluations_total",
            "result" => if result { "enabled" } else { "disabled" }
        )
        .increment(1);

        result
    }

    pub async fn get(&self, key: &str) -> DomainResult<FeatureFlag> {
        self.store
            .find_by_key(key)
            .await?
            .ok_or_else(|| DomainError::NotFound(format!("Feature flag '{}' not found", key)))
    }

    pub async fn list(&self, query: &ListFeatureFlagsQuery) -> DomainResult<Vec<FeatureFlag>> {
        self.store.list(query).await
    }

    pub async fn create(
        &self,
        request: CreateFeatureFlagRequest,
        admin_id: Option<&str>,
    ) -> DomainResult<FeatureFlag> {
        request.validate()?;
        shared::validation::validate_flag_key(&request.key)?;
        shared::validation::validate_date_window(request.start_date, request.end_date)?;
        let rollout_percentage = checked_percentage(request.rollout_percentage)?;

        let flag = self
            .store
            .insert(NewFeatureFlag {
                key: request.key,
                description: request.description,
                enabled: request.enabled,
                environment: request.environment,
                enabled_for_users: request.enabled_for_users,
                enabled_for_roles: request.enabled_for_roles,
                rollout_percentage,
                start_date: request.start_date,
                end_date: request.end_date,
                created_by: admin_id.map(str::to_string),
                created_at: self.clock.now(),
            })
            .await?;

        info!(flag_key = %flag.key, enabled = flag.enabled, "Feature flag created");
        self.record(AuditAction::FeatureFlagCreate, &flag, admin_id).await;
        Ok(flag)
    }

    pub async fn update(
        &self,
        key: &str,
        request: UpdateFeatureFlagRequest,
        admin_id: Option<&str>,
    ) -> DomainResult<FeatureFlag> {
        request.validate()?;
        let mut flag = self.get(key).await?;
        let expected_updated_at = flag.updated_at;

        if let Some(description) = request.description {
            flag.description = Some(description);
        }
        if let Some(enabled) = request.enabled {
            flag.enabled = enabled;
        }
        if let Some(environment) = request.environment {
            flag.environment = environment;
        }
        if let Some(users) = request.enabled_for_users {
            flag.enabled_for_users = users;
        }
        if let Some(roles) = request.enabled_for_roles {
            flag.enabled_for_roles = roles;
        }
        if let Some(percentage) = request.rollout_percentage {
            flag.rollout_percentage = checked_percentage(percentage)?;
        }
        if let Some(start) = request.start_date {
            flag.start_date = start;
        }
        if let Some(end) = request.end_date {
            flag.end_date = end;
        }
        shared::validation::validate_date_window(flag.start_date, flag.end_date)?;

        flag.updated_by = admin_id.map(str::to_string);
        let flag = self.save(flag, expected_updated_at).await?;
        info!(flag_key = %flag.key, enabled = flag.enabled, "Feature flag updated");
        self.record(AuditAction::FeatureFlagUpdate, &flag, admin_id).await;
        Ok(flag)
    }

    /// Flips `enabled`.
    pub async fn toggle(&self, key: &str, admin_id: Option<&str>) -> DomainResult<FeatureFlag> {
        let mut flag = self.get(key).await?;
        let expected_updated_at = flag.updated_at;
        flag.enabled = !flag.enabled;
        flag.updated_by = admin_id.map(str::to_string);

        let flag = self.save(flag, expected_updated_at).await?;
        info!(flag_key = %flag.key, enabled = flag.enabled, "Feature flag toggled");
        self.record(AuditAction::FeatureFlagToggle, &flag, admin_id).await;
        Ok(flag)
    }

    /// Writes `flag` if nobody changed it since it was read.
    async fn save(
        &self,
        mut flag: FeatureFlag,
        expected_updated_at: DateTime<Utc>,
    ) -> DomainResult<FeatureFlag> {
        // updated_at doubles as the row version, so it must move forward.
        flag.updated_at = self
            .clock
            .now()
            .max(expected_updated_at + Duration::microseconds(1));

        if let Some(saved) = self.store.update(&flag, expected_updated_at).await? {
            return Ok(saved);
        }
        match self.store.find_by_key(&flag.key).await? {
            None => Err(DomainError::NotFound(format!(
                "Feature flag '{}' not found",
                flag.key
            ))),
            Some(_) => Err(DomainError::Conflict(format!(
                "Feature flag '{}' was modified concurrently",
                flag.key
            ))),
        }
    }

    pub async fn delete(&self, key: &str, admin_id: Option<&str>) -> DomainResult<()> {
        if !self.store.delete(key).await? {
            return Err(DomainError::NotFound(format!(
                "Feature flag '{}' not found",
                key
            )));
        }

        info!(flag_key = %key, "Feature flag deleted");
        let entry = AuditEntryBuilder::admin_action(admin_id, AuditAction::FeatureFlagDelete)
            .on_resource("feature_flag", key)
            .build(self.clock.now());
        self.audit.record(entry).await;
        Ok(())
    }

    async fn record(&self, action: AuditAction, flag: &FeatureFlag, admin_id: Option<&str>) {
        let mut builder = AuditEntryBuilder::admin_action(admin_id, action)
            .on_resource("feature_flag", flag.key.clone())
            .with_metadata("enabled", flag.enabled);
        if let Some(percentage) = flag.rollout_percentage {
            builder = builder.with_metadata("rollout_percentage", i64::from(percentage));
        }
        if let Some(environment) = flag.environment {
            builder = builder.with_metadata("environment", environment.to_string());
        }
        self.audit.record(builder.build(self.clock.now())).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AuditAction;
    use crate::services::memory::{InMemoryFeatureFlagStore, ManualClock, RecordingAuditSink};
    use chrono::{Duration, TimeZone};
    use fake::faker::internet::en::SafeEmail;
    use fake::Fake;

    struct Fixture {
        service: FeatureFlagService,
        store: Arc<InMemoryFeatureFlagStore>,
        audit: Arc<RecordingAuditSink>,
        clock: Arc<ManualClock>,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(InMemoryFeatureFlagStore::new());
        let audit = Arc::new(RecordingAuditSink::new());
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 10, 16, 12, 0, 0).unwrap(),
        ));
        let service = FeatureFlagService::new(
            store.clone(),
            audit.clone(),
            clock.clone(),
            FlagEnvironment::Prod,
        );
        Fixture {
            service,
            store,
            audit,
            clock,
        }
    }

    fn create_request(key: &str) -> CreateFeatureFlagRequest {
        CreateFeatureFlagRequest {
            key: key.to_string(),
            description: None,
            enabled: true,
            environment: None,
            enabled_for_users: vec![],
            enabled_for_roles: vec![],
            rollout_percentage: None,
            start_date: None,
            end_date: None,
        }
    }

    #[tokio::test]
    async fn test_missing_flag_is_disabled() {
        let f = fixture();
        assert!(!f.service.is_enabled("nope", Some("u1"), None).await);
    }

    #[tokio::test]
    async fn test_store_error_fails_closed() {
        let f = fixture();
        f.service.create(create_request("checkout"), None).await.unwrap();
        f.store.set_failing(true);
        assert!(!f.service.is_enabled("checkout", Some("u1"), None).await);
    }

    #[tokio::test]
    async fn test_disabled_flag() {
        let f = fixture();
        let mut request = create_request("checkout");
        request.enabled = false;
        request.enabled_for_users = vec!["u1".into()];
        f.service.create(request, None).await.unwrap();
        assert!(!f.service.is_enabled("checkout", Some("u1"), None).await);
    }

    #[tokio::test]
    async fn test_environment_mismatch() {
        let f = fixture();
        let mut request = create_request("staging-only");
        request.environment = Some(FlagEnvironment::Staging);
        f.service.create(request, None).await.unwrap();

        let mut request = create_request("everywhere");
        request.environment = Some(FlagEnvironment::All);
        f.service.create(request, None).await.unwrap();

        assert!(!f.service.is_enabled("staging-only", None, None).await);
        assert!(f.service.is_enabled("everywhere", None, None).await);
    }

    #[tokio::test]
    async fn test_date_window() {
        let f = fixture();
        let now = f.clock.now();
        let mut request = create_request("launch");
        request.start_date = Some(now + Duration::days(1));
        f.service.create(request, None).await.unwrap();

        assert!(!f.service.is_enabled("launch", None, None).await);
        f.clock.advance(Duration::days(2));
        assert!(f.service.is_enabled("launch", None, None).await);
    }

    #[tokio::test]
    async fn test_user_allowlist_bypasses_rollout() {
        let f = fixture();
        let mut request = create_request("beta");
        request.enabled_for_users = vec!["u1".into()];
        request.rollout_percentage = Some(0);
        f.service.create(request, None).await.unwrap();

        assert!(f.service.is_enabled("beta", Some("u1"), None).await);
        assert!(!f.service.is_enabled("beta", Some("u2"), None).await);
        assert!(!f.service.is_enabled("beta", None, None).await);
    }

    #[tokio::test]
    async fn test_role_allowlist() {
        let f = fixture();
        let mut request = create_request("vendor-tools");
        request.enabled_for_roles = vec!["vendor".into()];
        f.service.create(request, None).await.unwrap();

        assert!(f.service.is_enabled("vendor-tools", Some("u1"), Some("vendor")).await);
        assert!(!f.service.is_enabled("vendor-tools", Some("u1"), Some("rider")).await);
        assert!(!f.service.is_enabled("vendor-tools", Some("u1"), None).await);
    }

    #[tokio::test]
    async fn test_rollout_bounds() {
        let f = fixture();
        let mut zero = create_request("zero");
        zero.rollout_percentage = Some(0);
        f.service.create(zero, None).await.unwrap();
        let mut full = create_request("full");
        full.rollout_percentage = Some(100);
        f.service.create(full, None).await.unwrap();

        for _ in 0..200 {
            let user: String = SafeEmail().fake();
            assert!(!f.service.is_enabled("zero", Some(&user), None).await);
            assert!(f.service.is_enabled("full", Some(&user), None).await);
        }
    }

    #[tokio::test]
    async fn test_rollout_is_deterministic() {
        let f = fixture();
        let mut request = create_request("half");
        request.rollout_percentage = Some(50);
        f.service.create(request, None).await.unwrap();

        for i in 0..100 {
            let user = format!("user-{}", i);
            let first = f.service.is_enabled("half", Some(&user), None).await;
            let second = f.service.is_enabled("half", Some(&user), None).await;
            assert_eq!(first, second);
        }
    }

    #[tokio::test]
    async fn test_rollout_distribution() {
        let f = fixture();
        let mut request = create_request("half");
        request.rollout_percentage = Some(50);
        f.service.create(request, None).await.unwrap();

        let mut enabled = 0;
        for i in 0..10_000 {
            let user = format!("user-{}", i);
            if f.service.is_enabled("half", Some(&user), None).await {
                enabled += 1;
            }
        }
        assert!((4_500..=5_500).contains(&enabled), "enabled = {}", enabled);
    }

    #[tokio::test]
    async fn test_no_rules_is_enabled() {
        let f = fixture();
        f.service.create(create_request("plain"), None).await.unwrap();
        assert!(f.service.is_enabled("plain", None, None).await);
    }

    #[tokio::test]
    async fn test_create_duplicate_key_conflicts() {
        let f = fixture();
        f.service.create(create_request("dup"), None).await.unwrap();
        let err = f.service.create(create_request("dup"), None).await.unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_create_rejects_bad_input() {
        let f = fixture();
        let mut request = create_request("pct");
        request.rollout_percentage = Some(101);
        assert!(matches!(
            f.service.create(request, None).await,
            Err(DomainError::Validation(_))
        ));

        assert!(matches!(
            f.service.create(create_request("Bad Key"), None).await,
            Err(DomainError::Validation(_))
        ));

        let now = f.clock.now();
        let mut request = create_request("window");
        request.start_date = Some(now);
        request.end_date = Some(now - Duration::days(1));
        assert!(matches!(
            f.service.create(request, None).await,
            Err(DomainError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_update_stamps_updated_by_and_audits() {
        let f = fixture();
        f.service.create(create_request("flag"), Some("admin-1")).await.unwrap();
        f.clock.advance(Duration::minutes(5));

        let updated = f
            .service
            .update(
                "flag",
                UpdateFeatureFlagRequest {
                    rollout_percentage: Some(Some(25)),
                    ..Default::default()
                },
                Some("admin-2"),
            )
            .await
            .unwrap();

        assert_eq!(updated.rollout_percentage, Some(25));
        assert_eq!(updated.created_by.as_deref(), Some("admin-1"));
        assert_eq!(updated.updated_by.as_deref(), Some("admin-2"));
        assert!(updated.updated_at > updated.created_at);

        let actions: Vec<_> = f.audit.entries().iter().map(|e| e.action).collect();
        assert_eq!(
            actions,
            vec![AuditAction::FeatureFlagCreate, AuditAction::FeatureFlagUpdate]
        );
    }

    #[tokio::test]
    async fn test_update_clears_nullable_settings() {
        let f = fixture();
        f.service.create(create_request("flag"), None).await.unwrap();
        let start = f.clock.now() - Duration::days(1);
        f.service
            .update(
                "flag",
                UpdateFeatureFlagRequest {
                    environment: Some(Some(FlagEnvironment::Staging)),
                    rollout_percentage: Some(Some(0)),
                    start_date: Some(Some(start)),
                    ..Default::default()
                },
                None,
            )
            .await
            .unwrap();
        assert!(!f.service.is_enabled("flag", Some("user-1"), None).await);

        let request: UpdateFeatureFlagRequest = serde_json::from_value(serde_json::json!({
            "environment": null,
            "rollout_percentage": null,
            "description": "Cleared"
        }))
        .unwrap();
        let cleared = f.service.update("flag", request, None).await.unwrap();

        assert_eq!(cleared.environment, None);
        assert_eq!(cleared.rollout_percentage, None);
        assert_eq!(cleared.start_date, Some(start));
        assert_eq!(cleared.description.as_deref(), Some("Cleared"));
        assert!(f.service.is_enabled("flag", Some("user-1"), None).await);
    }

    #[tokio::test]
    async fn test_update_rejects_out_of_range_percentage() {
        let f = fixture();
        f.service.create(create_request("flag"), None).await.unwrap();
        let err = f
            .service
            .update(
                "flag",
                UpdateFeatureFlagRequest {
                    rollout_percentage: Some(Some(101)),
                    ..Default::default()
                },
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[tokio::test]
    async fn test_stale_write_conflicts() {
        let f = fixture();
        let created = f.service.create(create_request("flag"), None).await.unwrap();
        let stale = created.clone();

        f.service.toggle("flag", Some("admin-1")).await.unwrap();

        let mut overwrite = stale.clone();
        overwrite.rollout_percentage = Some(10);
        overwrite.updated_at = stale.updated_at + Duration::seconds(1);
        assert!(f
            .store
            .update(&overwrite, stale.updated_at)
            .await
            .unwrap()
            .is_none());
        assert!(!f.service.get("flag").await.unwrap().enabled);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_updates_never_lose_a_write() {
        let f = fixture();
        for i in 0..20 {
            let key = format!("flag-{}", i);
            f.service.create(create_request(&key), None).await.unwrap();

            let (first, second) = (f.service.clone(), f.service.clone());
            let (k1, k2) = (key.clone(), key.clone());
            let (a, b) = tokio::join!(
                tokio::spawn(async move {
                    let request = UpdateFeatureFlagRequest {
                        description: Some("Set by first".into()),
                        ..Default::default()
                    };
                    first.update(&k1, request, Some("admin-1")).await
                }),
                tokio::spawn(async move {
                    let request = UpdateFeatureFlagRequest {
                        enabled_for_roles: Some(vec!["ops".into()]),
                        ..Default::default()
                    };
                    second.update(&k2, request, Some("admin-2")).await
                }),
            );
            let (a, b) = (a.unwrap(), b.unwrap());
            let stored = f.service.get(&key).await.unwrap();

            match &a {
                Ok(_) => assert_eq!(stored.description.as_deref(), Some("Set by first")),
                Err(e) => assert!(matches!(e, DomainError::Conflict(_))),
            }
            match &b {
                Ok(_) => assert_eq!(stored.enabled_for_roles, vec!["ops".to_string()]),
                Err(e) => assert!(matches!(e, DomainError::Conflict(_))),
            }
            assert!(a.is_ok() || b.is_ok());
        }
    }

    #[tokio::test]
    async fn test_update_missing_flag() {
        let f = fixture();
        let err = f
            .service
            .update("missing", UpdateFeatureFlagRequest::default(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_toggle_and_delete() {
        let f = fixture();
        f.service.create(create_request("flag"), None).await.unwrap();

        let toggled = f.service.toggle("flag", Some("admin-1")).await.unwrap();
        assert!(!toggled.enabled);
        assert!(!f.service.is_enabled("flag", None, None).await);

        f.service.delete("flag", Some("admin-1")).await.unwrap();
        assert!(matches!(
            f.service.delete("flag", Some("admin-1")).await,
            Err(DomainError::NotFound(_))
        ));
        assert_eq!(f.audit.entries().len(), 3);
    }
}
