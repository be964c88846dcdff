//! Login attempt ledger, sliding-window rate limiter and anomaly heuristics.
//!
//! The ledger is append-only. Both the rate limit and the suspicious flag are
//! recomputed from ledger history on every call rather than kept in counters.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use shared::pagination::{PageRequest, Pagination};
use tracing::{info, warn};
use validator::Validate;

use crate::error::DomainResult;
use crate::models::login_attempt::{
    CheckRateLimitRequest, FailedAttemptSummary, FailedAttemptsQuery, LogLoginAttemptRequest,
    LoginAttempt, LoginAttemptFilter, LoginAttemptStats, NewLoginAttempt,
    RateLimitDecision,
};
use crate::services::clock::Clock;

/// Failures inside the short burst window that mark further attempts suspicious.
pub const BURST_FAILURE_THRESHOLD: u64 = 3;
pub const BURST_WINDOW_MINUTES: i64 = 5;
/// Distinct source addresses per identifier inside an hour that mark an attempt suspicious.
pub const DISTINCT_IP_THRESHOLD: usize = 5;
pub const DISTINCT_IP_WINDOW_MINUTES: i64 = 60;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;
pub const DEFAULT_WINDOW_MINUTES: u32 = 15;
pub const DEFAULT_RETENTION_DAYS: i64 = 30;

/// Failures matching a rate-limit key inside a window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FailureWindow {
    pub count: u64,
    /// Oldest counted failure.
    pub oldest: Option<DateTime<Utc>>,
}

/// Storage collaborator for the login ledger.
#[async_trait::async_trait]
pub trait LoginAttemptStore: Send + Sync {
    async fn insert(&self, attempt: NewLoginAttempt) -> DomainResult<LoginAttempt>;

    async fn count_failures_for_identifier(
        &self,
        identifier: &str,
        since: DateTime<Utc>,
    ) -> DomainResult<u64>;

    async fn distinct_ips_for_identifier(
        &self,
        identifier: &str,
        since: DateTime<Utc>,
    ) -> DomainResult<Vec<String>>;

    /// Failures whose identifier matches, or whose address matches when `ip` is given.
    async fn failure_window(
        &self,
        identifier: &str,
        ip: Option<&str>,
        since: DateTime<Utc>,
    ) -> DomainResult<FailureWindow>;

    /// Failures grouped by identifier with `count >= threshold`, highest count first.
    async fn failed_attempts_by_identifier(
        &self,
        since: DateTime<Utc>,
        threshold: u32,
    ) -> DomainResult<Vec<FailedAttemptSummary>>;

    async fn list(
        &self,
        filter: &LoginAttemptFilter,
        page: PageRequest,
    ) -> DomainResult<(Vec<LoginAttempt>, i64)>;

    async fn stats(&self, since: DateTime<Utc>) -> DomainResult<LoginAttemptStats>;

    /// Deletes up to `limit` entries whose `expires_at` is before `now`.
    async fn delete_expired(&self, now: DateTime<Utc>, limit: i64) -> DomainResult<u64>;
}

/// Tunables for the ledger.
#[derive(Debug, Clone, Copy)]
pub struct LoginSecuritySettings {
    pub max_attempts: u32,
    pub window_minutes: u32,
    pub retention_days: i64,
}

impl Default for LoginSecuritySettings {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            window_minutes: DEFAULT_WINDOW_MINUTES,
            retention_days: DEFAULT_RETENTION_DAYS,
        }
    }
}

/// A page of ledger entries.
#[derive(Debug, Clone)]
pub struct LoginAttemptPage {
    pub data: Vec<LoginAttempt>,
    pub pagination: Pagination,
}

/// Login security service.
#[derive(Clone)]
pub struct LoginSecurityService {
    store: Arc<dyn LoginAttemptStore>,
    clock: Arc<dyn Clock>,
    settings: LoginSecuritySettings,
}

impl LoginSecurityService {
    pub fn new(
        store: Arc<dyn LoginAttemptStore>,
        clock: Arc<dyn Clock>,
        settings: LoginSecuritySettings,
    ) -> Self {
        Self {
            store,
            clock,
            settings,
        }
    }

    /// Appends one attempt to the ledger, computing `is_suspicious` first.
    pub async fn log_attempt(&self, request: LogLoginAttemptRequest) -> DomainResult<LoginAttempt> {
        request.validate()?;

        let now = self.clock.now();
        let ip_address = request
            .ip_address
            .filter(|ip| !ip.trim().is_empty())
            .unwrap_or_else(|| "unknown".to_string());
        let user_agent = request.user_agent.unwrap_or_default();

        let is_suspicious = self
            .is_suspicious(&request.identifier, &ip_address, now)
            .await;

        let attempt = self
            .store
            .insert(NewLoginAttempt {
                identifier: request.identifier,
                user_id: request.user_id,
                device: shared::user_agent::classify_device(&user_agent).to_string(),
                browser: shared::user_agent::classify_browser(&user_agent).to_string(),
                ip_address,
                user_agent,
                status: request.status,
                failure_reason: request.failure_reason,
                is_suspicious,
                created_at: now,
                expires_at: now + Duration::days(self.settings.retention_days),
            })
            .await?;

        metrics::counter!(
            "login_attempts_total",
            "status" => attempt.status.to_string(),
            "suspicious" => attempt.is_suspicious.to_string()
        )
        .increment(1);

        if attempt.is_suspicious {
            warn!(
                identifier = %attempt.identifier,
                ip_address = %attempt.ip_address,
                "Suspicious login activity detected"
            );
        } else {
            info!(
                identifier = %attempt.identifier,
                status = %attempt.status,
                "Login attempt recorded"
            );
        }

        Ok(attempt)
    }

    /// Burst of failures for the identifier, or too many distinct source addresses.
    ///
    /// Evaluated against entries already in the ledger plus the incoming address.
    /// The burst check ignores the incoming status, so a success right after a
    /// burst is flagged too.
    /// A ledger read failure leaves the attempt unflagged.
    async fn is_suspicious(&self, identifier: &str, ip_address: &str, now: DateTime<Utc>) -> bool {
        let burst_since = now - Duration::minutes(BURST_WINDOW_MINUTES);
        let burst = match self
            .store
            .count_failures_for_identifier(identifier, burst_since)
            .await
        {
            Ok(count) => count >= BURST_FAILURE_THRESHOLD,
            Err(e) => {
                warn!(identifier = %identifier, error = %e, "Burst heuristic unavailable");
                false
            }
        };
        if burst {
            return true;
        }

        let ip_since = now - Duration::minutes(DISTINCT_IP_WINDOW_MINUTES);
        match self
            .store
            .distinct_ips_for_identifier(identifier, ip_since)
            .await
        {
            Ok(mut ips) => {
                if !ips.iter().any(|ip| ip == ip_address) {
                    ips.push(ip_address.to_string());
                }
                ips.len() >= DISTINCT_IP_THRESHOLD
            }
            Err(e) => {
                warn!(identifier = %identifier, error = %e, "Address heuristic unavailable");
                false
            }
        }
    }

    /// Sliding-window rate limit over failures matching the identifier or address.
    ///
    /// Fails closed: when the ledger cannot be read the caller is denied.
    pub async fn check_rate_limit(
        &self,
        request: &CheckRateLimitRequest,
    ) -> DomainResult<RateLimitDecision> {
        request.validate()?;

        let max_attempts = request.max_attempts.unwrap_or(self.settings.max_attempts);
        let window = Duration::minutes(i64::from(
            request.window_minutes.unwrap_or(self.settings.window_minutes),
        ));
        let now = self.clock.now();
        let ip = request.ip_address.as_deref().filter(|ip| !ip.is_empty());

        let failures = match self
            .store
            .failure_window(&request.identifier, ip, now - window)
            .await
        {
            Ok(failures) => failures,
            Err(e) => {
                warn!(
                    identifier = %request.identifier,
                    error = %e,
                    "Rate limit ledger unavailable, denying"
                );
                return Ok(RateLimitDecision {
                    allowed: false,
                    remaining: 0,
                    reset_at: now + window,
                    failed_attempts: 0,
                });
            }
        };

        let count = u32::try_from(failures.count).unwrap_or(u32::MAX);
        Ok(RateLimitDecision {
            allowed: count < max_attempts,
            remaining: max_attempts.saturating_sub(count),
            reset_at: failures.oldest.map_or(now + window, |oldest| oldest + window),
            failed_attempts: count,
        })
    }

    /// Identifiers with at least `threshold` failures in the window, highest first.
    pub async fn get_failed_password_attempts(
        &self,
        query: &FailedAttemptsQuery,
    ) -> DomainResult<Vec<FailedAttemptSummary>> {
        let threshold = query.threshold.unwrap_or(BURST_FAILURE_THRESHOLD as u32).max(1);
        let window_minutes = query.window_minutes.unwrap_or(60).clamp(1, 10_080);
        let since = self.clock.now() - Duration::minutes(i64::from(window_minutes));
        self.store
            .failed_attempts_by_identifier(since, threshold)
            .await
    }

    pub async fn list(&self, filter: &LoginAttemptFilter) -> DomainResult<LoginAttemptPage> {
        let page = PageRequest::new(filter.page, filter.per_page);
        let (data, total) = self.store.list(filter, page).await?;
        Ok(LoginAttemptPage {
            data,
            pagination: Pagination::new(page, total),
        })
    }

    pub async fn suspicious(&self, filter: &LoginAttemptFilter) -> DomainResult<LoginAttemptPage> {
        let filter = LoginAttemptFilter {
            suspicious: Some(true),
            ..filter.clone()
        };
        self.list(&filter).await
    }

    pub async fn stats(&self, window_hours: Option<u32>) -> DomainResult<LoginAttemptStats> {
        let hours = window_hours.unwrap_or(24).clamp(1, 24 * 30);
        self.store
            .stats(self.clock.now() - Duration::hours(i64::from(hours)))
            .await
    }

    /// Removes expired entries in batches. Returns the number removed.
    pub async fn purge_expired(&self, batch_size: i64) -> DomainResult<u64> {
        let now = self.clock.now();
        let mut total = 0;
        loop {
            let deleted = self.store.delete_expired(now, batch_size).await?;
            total += deleted;
            if deleted < batch_size as u64 {
                break;
            }
        }
        if total > 0 {
            info!(deleted = total, "Purged expired login attempts");
        }
        Ok(total)
    }

    pub fn settings(&self) -> LoginSecuritySettings {
        self.settings
    }
}
