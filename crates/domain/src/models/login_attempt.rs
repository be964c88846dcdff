//! Login attempt ledger domain models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;
use validator::Validate;

/// Outcome of an authentication attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoginStatus {
    Success,
    Failure,
}

impl LoginStatus {
    pub fn is_failure(&self) -> bool {
        matches!(self, LoginStatus::Failure)
    }
}

impl FromStr for LoginStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "success" => Ok(LoginStatus::Success),
            "failure" | "failed" => Ok(LoginStatus::Failure),
            _ => Err(format!("Unknown login status: {}", s)),
        }
    }
}

impl std::fmt::Display for LoginStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoginStatus::Success => write!(f, "success"),
            LoginStatus::Failure => write!(f, "failure"),
        }
    }
}

/// An immutable ledger entry for one authentication attempt.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct LoginAttempt {
    pub id: Uuid,
    /// Email or phone number used in the attempt.
    pub identifier: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub ip_address: String,
    pub user_agent: String,
    pub status: LoginStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    /// Coarse device class derived from the user agent.
    pub device: String,
    /// Browser family derived from the user agent.
    pub browser: String,
    /// Computed once at write time from the ledger heuristics.
    pub is_suspicious: bool,
    pub created_at: DateTime<Utc>,
    /// Retention deadline; expired entries are purged.
    pub expires_at: DateTime<Utc>,
}

/// Storage input for appending a ledger entry.
#[derive(Debug, Clone)]
pub struct NewLoginAttempt {
    pub identifier: String,
    pub user_id: Option<String>,
    pub ip_address: String,
    pub user_agent: String,
    pub status: LoginStatus,
    pub failure_reason: Option<String>,
    pub device: String,
    pub browser: String,
    pub is_suspicious: bool,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Request to record an authentication attempt.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "snake_case")]
pub struct LogLoginAttemptRequest {
    #[validate(length(min = 1, max = 255, message = "Identifier must be 1-255 characters"))]
    pub identifier: String,
    /// Falls back to the forwarded client address when absent.
    #[validate(length(max = 64, message = "IP address too long"))]
    #[serde(default)]
    pub ip_address: Option<String>,
    /// Falls back to the request's User-Agent header when absent.
    #[validate(length(max = 1024, message = "User agent too long"))]
    #[serde(default)]
    pub user_agent: Option<String>,
    pub status: LoginStatus,
    #[validate(length(max = 255, message = "Failure reason too long"))]
    #[serde(default)]
    pub failure_reason: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
}

/// Request to check the login rate limit.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "snake_case")]
pub struct CheckRateLimitRequest {
    #[validate(length(min = 1, max = 255, message = "Identifier must be 1-255 characters"))]
    pub identifier: String,
    #[serde(default)]
    pub ip_address: Option<String>,
    #[validate(range(min = 1, max = 1000, message = "max_attempts must be between 1 and 1000"))]
    #[serde(default)]
    pub max_attempts: Option<u32>,
    #[validate(range(min = 1, max = 1440, message = "window_minutes must be between 1 and 1440"))]
    #[serde(default)]
    pub window_minutes: Option<u32>,
}

/// Result of a sliding-window rate limit check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub remaining: u32,
    /// When the oldest counted failure leaves the window.
    pub reset_at: DateTime<Utc>,
    /// Failures counted inside the window.
    pub failed_attempts: u32,
}

/// Identifier with repeated failed attempts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct FailedAttemptSummary {
    pub identifier: String,
    pub count: u32,
    pub ip_addresses: Vec<String>,
    pub last_attempt_at: DateTime<Utc>,
}

/// Query parameters for the failed-password report.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct FailedAttemptsQuery {
    #[serde(default)]
    pub threshold: Option<u32>,
    #[serde(default)]
    pub window_minutes: Option<u32>,
}

/// Filter for listing ledger entries.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoginAttemptFilter {
    #[serde(default)]
    pub identifier: Option<String>,
    #[serde(default)]
    pub ip_address: Option<String>,
    #[serde(default)]
    pub status: Option<LoginStatus>,
    #[serde(default)]
    pub suspicious: Option<bool>,
    #[serde(default)]
    pub from: Option<DateTime<Utc>>,
    #[serde(default)]
    pub to: Option<DateTime<Utc>>,
    #[serde(default)]
    pub page: Option<u32>,
    #[serde(default)]
    pub per_page: Option<u32>,
}

/// Aggregate counts over a time window.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct LoginAttemptStats {
    pub total: i64,
    pub successful: i64,
    pub failed: i64,
    pub suspicious: i64,
    pub unique_identifiers: i64,
    pub unique_ips: i64,
}

/// Query parameters for the stats endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoginStatsQuery {
    #[serde(default)]
    pub window_hours: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_display_and_parse() {
        assert_eq!(LoginStatus::Failure.to_string(), "failure");
        assert_eq!("failed".parse::<LoginStatus>().unwrap(), LoginStatus::Failure);
        assert_eq!("SUCCESS".parse::<LoginStatus>().unwrap(), LoginStatus::Success);
        assert!("maybe".parse::<LoginStatus>().is_err());
    }

    #[test]
    fn test_log_request_validation() {
        let request: LogLoginAttemptRequest = serde_json::from_value(serde_json::json!({
            "identifier": "",
            "status": "failure"
        }))
        .unwrap();
        assert!(request.validate().is_err());
    }

    #[test]
    fn test_rate_limit_request_bounds() {
        let request: CheckRateLimitRequest = serde_json::from_value(serde_json::json!({
            "identifier": "user@example.com",
            "max_attempts": 0
        }))
        .unwrap();
        assert!(request.validate().is_err());
    }
}
