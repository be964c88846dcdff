//! Deterministic percentage rollout bucketing.
//!
//! Buckets are derived from a seedless FNV-1a hash so the same user lands in
//! the same bucket for a given flag across restarts and processes.

const FNV_OFFSET_BASIS: u32 = 0x811c_9dc5;
const FNV_PRIME: u32 = 0x0100_0193;

/// Number of rollout buckets.
pub const BUCKET_COUNT: u32 = 100;

/// 32-bit FNV-1a hash of the input bytes.
pub fn fnv1a_32(bytes: &[u8]) -> u32 {
    let mut hash = FNV_OFFSET_BASIS;
    for byte in bytes {
        hash ^= u32::from(*byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

/// Returns the bucket (0..=99) of a user for a flag key.
///
/// The hash input is the user id immediately followed by the flag key.
pub fn rollout_bucket(user_id: &str, flag_key: &str) -> u32 {
    let mut input = Vec::with_capacity(user_id.len() + flag_key.len());
    input.extend_from_slice(user_id.as_bytes());
    input.extend_from_slice(flag_key.as_bytes());
    fnv1a_32(&input) % BUCKET_COUNT
}

/// Whether a user falls inside the given rollout percentage.
pub fn in_rollout(user_id: &str, flag_key: &str, percentage: u8) -> bool {
    rollout_bucket(user_id, flag_key) < u32::from(percentage)
}
