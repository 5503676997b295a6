//! Async file downloader with redirect following, progress reporting and
//! integrity checks.
//!
//! Downloads stream straight to disk while being hashed, so a checksum
//! mismatch is detected without a second pass over the file.

use anyhow::{Context, Result};
use futures::StreamExt;
use serde::de::DeserializeOwned;
use sha2::{Digest, Sha256};
use std::path::Path;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};
use url::Url;

use super::checksum::{digests_match, format_sha256_hex};
use super::paths::remove_file;
use super::types::Checksum;
use crate::plog;

// ============================================================================
// URL Security Validation
// ============================================================================

/// Allowed domains for downloads and release lookups.
const ALLOWED_DOMAINS: &[&str] = &[
    "github.com",
    "githubusercontent.com",
    "kernel.org",
    "rust-lang.org",
    "rustup.rs",
];

/// Maximum number of redirects followed for a single request.
const MAX_REDIRECTS: usize = 10;

/// GitHub's API rejects requests without a user agent.
const USER_AGENT: &str = concat!("librespot-patcher/", env!("CARGO_PKG_VERSION"));

/// Validates that a URL is safe to fetch.
///
/// Checks:
/// - URL scheme must be HTTPS
/// - Host must be in the allowed domain list (subdomains included)
fn validate_url(url_str: &str) -> Result<()> {
    let url = Url::parse(url_str).with_context(|| format!("Invalid URL: {}", url_str))?;

    if url.scheme() != "https" {
        anyhow::bail!("URL must use HTTPS: {}", url_str);
    }

    let host = url
        .host_str()
        .ok_or_else(|| anyhow::anyhow!("URL must have a host: {}", url_str))?;

    let is_allowed = ALLOWED_DOMAINS
        .iter()
        .any(|domain| host == *domain || host.ends_with(&format!(".{}", domain)));

    if !is_allowed {
        anyhow::bail!(
            "Download domain not allowed: {}. Allowed: {:?}",
            host,
            ALLOWED_DOMAINS
        );
    }

    Ok(())
}

/// Builds the HTTP client shared by downloads and lookups.
///
/// Release assets on GitHub and rustup's installer both answer with a
/// redirect; each hop is reported to the output buffer and must stay on HTTPS.
fn http_client() -> Result<reqwest::Client> {
    let policy = reqwest::redirect::Policy::custom(|attempt| {
        if attempt.previous().len() >= MAX_REDIRECTS {
            return attempt.error(format!("more than {} redirects", MAX_REDIRECTS));
        }
        if attempt.url().scheme() != "https" {
            let message = format!("refusing non-HTTPS redirect to {}", attempt.url());
            return attempt.error(message);
        }
        plog!("redirecting to", attempt.url());
        attempt.follow()
    });

    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .redirect(policy)
        .build()
        .context("Failed to build HTTP client")
}

// ============================================================================
// Download Progress
// ============================================================================

/// Progress information during a download.
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadProgress {
    /// Bytes downloaded so far.
    pub bytes_downloaded: u64,
    /// Total bytes expected (if known from Content-Length header).
    pub total_bytes: Option<u64>,
    /// Progress percentage (0.0 to 100.0), or None if total is unknown.
    pub percent: Option<f32>,
}

impl DownloadProgress {
    pub(crate) fn new(bytes_downloaded: u64, total_bytes: Option<u64>) -> Self {
        let percent = total_bytes.map(|total| {
            if total > 0 {
                (bytes_downloaded as f32 / total as f32) * 100.0
            } else {
                0.0
            }
        });

        Self {
            bytes_downloaded,
            total_bytes,
            percent,
        }
    }
}

// ============================================================================
// Download Function
// ============================================================================

/// Downloads a file from a URL with streaming and progress reporting.
///
/// Any existing file at `dest` is removed first. Redirects are followed.
///
/// # Returns
///
/// The total number of bytes downloaded.
///
/// # Errors
///
/// Returns an error if:
/// - The URL is not HTTPS or from an allowed domain.
/// - The network request fails or ends in a non-success status.
/// - The file cannot be created or written.
/// - The SHA256 checksum does not match (the file is deleted).
pub async fn download_file<F>(
    url: &str,
    dest: &Path,
    checksum: &Checksum,
    progress_cb: F,
) -> Result<u64>
where
    F: Fn(DownloadProgress),
{
    info!("Downloading {} to {}", url, dest.display());
    validate_url(url)?;

    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    remove_file(dest).await;

    let response = http_client()?
        .get(url)
        .send()
        .await
        .with_context(|| format!("Failed to start download from {}", url))?;

    let status = response.status();
    if !status.is_success() {
        anyhow::bail!(
            "Download failed with status {}: {}",
            status.as_u16(),
            status.canonical_reason().unwrap_or("Unknown error")
        );
    }

    let total_bytes = response.content_length();
    debug!("Content-Length: {:?}", total_bytes);

    let mut file = File::create(dest)
        .await
        .with_context(|| format!("Failed to create file: {}", dest.display()))?;

    let mut stream = response.bytes_stream();
    let mut bytes_downloaded: u64 = 0;
    let mut hasher = Sha256::new();

    progress_cb(DownloadProgress::new(0, total_bytes));

    while let Some(chunk_result) = stream.next().await {
        let chunk = chunk_result.context("Failed to read chunk from response stream")?;

        hasher.update(&chunk);
        file.write_all(&chunk)
            .await
            .context("Failed to write chunk to file")?;

        bytes_downloaded += chunk.len() as u64;
        progress_cb(DownloadProgress::new(bytes_downloaded, total_bytes));
    }

    file.flush().await.context("Failed to flush file")?;
    drop(file);

    if let Some(expected) = checksum.expected() {
        let actual_hex = format_sha256_hex(&hasher.finalize());
        if !digests_match(expected, &actual_hex) {
            remove_file(dest).await;
            anyhow::bail!(
                "SHA256 checksum mismatch for {}!\nExpected: {}\nActual: {}",
                url,
                expected.trim(),
                actual_hex
            );
        }
        debug!("SHA256 verified: {}", actual_hex);
    }

    info!(
        "Download complete: {} bytes written to {}",
        bytes_downloaded,
        dest.display()
    );

    Ok(bytes_downloaded)
}

// ============================================================================
// Lookups
// ============================================================================

/// Fetches a text document (checksum lists and the like).
pub async fn fetch_text(url: &str) -> Result<String> {
    validate_url(url)?;
    debug!("Fetching {}", url);

    let response = http_client()?
        .get(url)
        .send()
        .await
        .with_context(|| format!("Failed to fetch {}", url))?
        .error_for_status()
        .with_context(|| format!("Request to {} failed", url))?;

    response
        .text()
        .await
        .with_context(|| format!("Failed to read body from {}", url))
}

/// Fetches and deserializes a JSON document (GitHub API responses).
pub async fn fetch_json<T: DeserializeOwned>(url: &str) -> Result<T> {
    validate_url(url)?;
    debug!("Fetching {}", url);

    let response = http_client()?
        .get(url)
        .header(reqwest::header::ACCEPT, "application/vnd.github+json")
        .send()
        .await
        .with_context(|| format!("Failed to fetch {}", url))?
        .error_for_status()
        .with_context(|| format!("Request to {} failed", url))?;

    response
        .json::<T>()
        .await
        .with_context(|| format!("Failed to parse JSON from {}", url))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_download_progress_calculation() {
        let progress = DownloadProgress::new(50, Some(100));
        assert_eq!(progress.bytes_downloaded, 50);
        assert_eq!(progress.total_bytes, Some(100));
        assert_eq!(progress.percent, Some(50.0));

        let progress_no_total = DownloadProgress::new(50, None);
        assert_eq!(progress_no_total.percent, None);

        let progress_zero_total = DownloadProgress::new(0, Some(0));
        assert_eq!(progress_zero_total.percent, Some(0.0));
    }

    #[test]
    fn test_validate_url_https_required() {
        assert!(validate_url("http://github.com/file.zip").is_err());
        assert!(validate_url("https://github.com/file.zip").is_ok());
    }

    #[test]
    fn test_validate_url_allowed_domains() {
        assert!(validate_url("https://sh.rustup.rs").is_ok());
        assert!(validate_url("https://api.github.com/repos/git/git/tags").is_ok());
        assert!(validate_url(
            "https://mirrors.edge.kernel.org/pub/software/scm/git/sha256sums.asc"
        )
        .is_ok());
        assert!(validate_url(
            "https://static.rust-lang.org/rustup/dist/x86_64-pc-windows-msvc/rustup-init.exe"
        )
        .is_ok());
        assert!(validate_url("https://objects.githubusercontent.com/asset").is_ok());

        assert!(validate_url("https://evil.com/malware.zip").is_err());
        assert!(validate_url("https://github.com.evil.org/fake.zip").is_err());
        assert!(validate_url("https://notkernel.org/git.tar.gz").is_err());
    }

    #[test]
    fn test_validate_url_invalid() {
        assert!(validate_url("not-a-url").is_err());
        assert!(validate_url("").is_err());
        assert!(validate_url("file:///etc/passwd").is_err());
    }

    #[tokio::test]
    async fn test_download_rejects_disallowed_url_before_touching_disk() {
        let temp = TempDir::new().unwrap();
        let dest = temp.path().join("sub").join("file.zip");

        let result = download_file(
            "https://evil.com/file.zip",
            &dest,
            &Checksum::Unverified,
            |_| {},
        )
        .await;

        assert!(result.is_err());
        assert!(!dest.parent().unwrap().exists());
    }

    #[tokio::test]
    async fn test_fetch_rejects_plain_http() {
        assert!(fetch_text("http://kernel.org/sha256sums.asc").await.is_err());
        assert!(fetch_json::<serde_json::Value>("http://api.github.com/")
            .await
            .is_err());
    }
}
