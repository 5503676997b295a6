//! SHA-256 verification of cached and downloaded files.

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use std::path::Path;
use tokio::io::AsyncReadExt;
use tracing::debug;

use crate::plog;

/// Computes the SHA-256 of a file as lowercase hex.
pub async fn sha256_file(path: &Path) -> Result<String> {
    let mut file = tokio::fs::File::open(path)
        .await
        .with_context(|| format!("Failed to open {}", path.display()))?;

    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; 64 * 1024];
    loop {
        let n = file
            .read(&mut buf)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    Ok(format_sha256_hex(&hasher.finalize()))
}

/// Returns true if `path` exists and hashes to `expected`.
///
/// A missing or unreadable file is simply "not valid"; a mismatch is reported
/// to the output buffer so the user can see why a download is repeated.
pub async fn check_file(path: &Path, expected: &str) -> bool {
    if !path.exists() {
        debug!("No cached file at {}", path.display());
        return false;
    }

    let actual = match sha256_file(path).await {
        Ok(hex) => hex,
        Err(e) => {
            debug!("Could not hash {}: {}", path.display(), e);
            return false;
        }
    };

    let ok = digests_match(expected, &actual);
    if !ok {
        plog!("Expected:", expected.trim(), "got:", actual);
    }
    ok
}

/// Compares two hex digests, ignoring case and surrounding whitespace.
pub fn digests_match(expected: &str, actual: &str) -> bool {
    expected.trim().eq_ignore_ascii_case(actual.trim())
}

/// Formats a SHA256 hash as lowercase hex.
pub(crate) fn format_sha256_hex(hash: &[u8]) -> String {
    hash.iter().map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const HELLO_SHA256: &str = "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824";

    #[test]
    fn test_format_sha256_hex() {
        let empty_hash = Sha256::digest(b"");
        assert_eq!(
            format_sha256_hex(&empty_hash),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_digests_match_normalizes() {
        assert!(digests_match(" ABCDEF\n", "abcdef"));
        assert!(!digests_match("abcdef", "abcdee"));
    }

    #[tokio::test]
    async fn test_sha256_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("hello.txt");
        std::fs::write(&path, "hello").unwrap();

        assert_eq!(sha256_file(&path).await.unwrap(), HELLO_SHA256);
    }

    #[tokio::test]
    async fn test_check_file_matches() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("hello.txt");
        std::fs::write(&path, "hello").unwrap();

        assert!(check_file(&path, HELLO_SHA256).await);
        assert!(check_file(&path, &format!("  {}  \n", HELLO_SHA256.to_uppercase())).await);
    }

    #[tokio::test]
    async fn test_check_file_mismatch() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("hello.txt");
        std::fs::write(&path, "hello, world").unwrap();

        assert!(!check_file(&path, HELLO_SHA256).await);
    }

    #[tokio::test]
    async fn test_check_file_missing() {
        let temp = TempDir::new().unwrap();
        assert!(!check_file(&temp.path().join("missing"), HELLO_SHA256).await);
    }
}
