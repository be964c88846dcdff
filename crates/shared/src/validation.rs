//! Common validation utilities.

use chrono::{DateTime, Utc};
use validator::ValidationError;

/// Largest accepted rollout percentage.
pub const MAX_ROLLOUT_PERCENTAGE: i32 = 100;

/// Validates that a rollout percentage is within 0..=100.
pub fn validate_rollout_percentage(percentage: i32) -> Result<(), ValidationError> {
    if (0..=MAX_ROLLOUT_PERCENTAGE).contains(&percentage) {
        Ok(())
    } else {
        let mut err = ValidationError::new("rollout_percentage_range");
        err.message = Some("Rollout percentage must be between 0 and 100".into());
        Err(err)
    }
}

/// Validates a feature flag key: lowercase letters, digits, `-`, `_` and `.`.
pub fn validate_flag_key(key: &str) -> Result<(), ValidationError> {
    let valid = !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '-' | '_' | '.'));
    if valid {
        Ok(())
    } else {
        let mut err = ValidationError::new("flag_key_format");
        err.message = Some(
            "Flag key may only contain lowercase letters, digits, '-', '_' and '.'".into(),
        );
        Err(err)
    }
}

/// Validates that an optional activation window is ordered.
pub fn validate_date_window(
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
) -> Result<(), ValidationError> {
    match (start, end) {
        (Some(start), Some(end)) if start > end => {
            let mut err = ValidationError::new("date_window_order");
            err.message = Some("Start date must not be after end date".into());
            Err(err)
        }
        _ => Ok(()),
    }
}

/// Validates that a collection name is safe to pass to the dump utility.
pub fn validate_collection_name(name: &str) -> Result<(), ValidationError> {
    let valid = !name.is_empty()
        && name.len() <= 120
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));
    if valid {
        Ok(())
    } else {
        let mut err = ValidationError::new("collection_name_format");
        err.message = Some("Invalid collection name".into());
        Err(err)
    }
}
