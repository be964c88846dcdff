//! Cryptographic utilities for backup checksums and signed download links.

use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

type HmacSha256 = Hmac<Sha256>;

/// Computes SHA-256 hash of the input and returns it as a hex string.
pub fn sha256_hex(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
}

/// Computes the SHA-256 checksum of a file, streaming it in 64 KiB chunks.
pub fn sha256_file(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; 64 * 1024];

    loop {
        let read = file.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// Signs a backup download handle.
///
/// The signed message is `"{backup_id}|{expires_at_unix}"`.
pub fn sign_download(secret: &str, backup_id: &str, expires_at_unix: i64) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(download_message(backup_id, expires_at_unix).as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Verifies a download signature in constant time.
pub fn verify_download(
    secret: &str,
    backup_id: &str,
    expires_at_unix: i64,
    signature_hex: &str,
) -> bool {
    let Ok(signature) = hex::decode(signature_hex) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(download_message(backup_id, expires_at_unix).as_bytes());
    mac.verify_slice(&signature).is_ok()
}

fn download_message(backup_id: &str, expires_at_unix: i64) -> String {
    format!("{}|{}", backup_id, expires_at_unix)
}
