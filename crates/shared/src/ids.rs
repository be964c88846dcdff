//! Human-readable identifier generation.

use chrono::{DateTime, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;

/// Prefix of data deletion request numbers.
pub const REQUEST_NUMBER_PREFIX: &str = "DDR";

/// Prefix of backup identifiers.
pub const BACKUP_ID_PREFIX: &str = "backup";

fn random_suffix(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// Generates a deletion request number, e.g. `DDR-20261016-4K7QZ2`.
pub fn generate_request_number(now: DateTime<Utc>) -> String {
    format!(
        "{}-{}-{}",
        REQUEST_NUMBER_PREFIX,
        now.format("%Y%m%d"),
        random_suffix(6).to_uppercase()
    )
}

/// Generates a time-derived backup id, e.g. `backup-20261016-142501-a9x3`.
///
/// The random suffix keeps ids unique when two backups start in the same second.
pub fn generate_backup_id(now: DateTime<Utc>) -> String {
    format!(
        "{}-{}-{}",
        BACKUP_ID_PREFIX,
        now.format("%Y%m%d-%H%M%S"),
        random_suffix(4).to_lowercase()
    )
}
