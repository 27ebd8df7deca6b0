//! Content hashing for build output.

use sha2::{Digest, Sha256};
use std::path::Path;

/// SHA-256 of a byte slice as lowercase hex.
pub fn content_sha256(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// SHA-256 of a file's contents as lowercase hex.
pub async fn file_sha256<P: AsRef<Path>>(path: P) -> std::io::Result<String> {
    let bytes = tokio::fs::read(path).await?;
    Ok(content_sha256(&bytes))
}
