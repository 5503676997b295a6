//! Shared provisioning plumbing.
//!
//! Every toolchain follows the same shape: locate an executable, and when that
//! fails download, extract and locate again. [`Provisioner`] captures that
//! shape; [`ProvisionContext`] carries the directories and download policy
//! the three implementations share.

use anyhow::Result;
use async_trait::async_trait;
use std::fmt::Debug;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::checksum::check_file;
use super::downloader::{download_file, DownloadProgress};
use super::manifest::{load_manifest_from, save_manifest_to, ToolsManifest};
use super::paths;
use super::types::{Checksum, Pin, Platform, ToolId};
use crate::plog;

/// Callback receiving download progress.
pub type ProgressFn = dyn Fn(DownloadProgress) + Send + Sync;

/// Directories and policy shared by all provisioners.
#[derive(Debug, Clone)]
pub struct ProvisionContext {
    pub platform: Platform,
    /// Cached archives and installers.
    pub download_dir: PathBuf,
    /// Extracted and installed toolchains.
    pub binary_dir: PathBuf,
    pub manifest_path: PathBuf,
    /// When false, downloads are not hash-checked (cache reuse still is).
    pub verify_downloads: bool,
}

impl ProvisionContext {
    /// Creates a context with the default binary dir and manifest location.
    pub fn new(platform: Platform, download_dir: PathBuf) -> Self {
        Self {
            platform,
            download_dir,
            binary_dir: paths::get_binary_dir(),
            manifest_path: paths::get_manifest_path(),
            verify_downloads: true,
        }
    }

    pub fn with_binary_dir(mut self, binary_dir: PathBuf) -> Self {
        self.binary_dir = binary_dir;
        self
    }

    pub fn with_manifest_path(mut self, manifest_path: PathBuf) -> Self {
        self.manifest_path = manifest_path;
        self
    }

    pub fn with_verify_downloads(mut self, verify: bool) -> Self {
        self.verify_downloads = verify;
        self
    }

    /// Path of `file_name` inside the download cache.
    pub fn download_path(&self, file_name: &str) -> PathBuf {
        self.download_dir.join(file_name)
    }

    /// Extraction directory for an archive or installer in the binary dir.
    pub fn extract_dir(&self, file_name: &str) -> PathBuf {
        self.binary_dir
            .join(super::types::ArchiveFormat::strip_suffix(file_name))
    }

    /// Downloads `url` into the cache as `file_name`, unless a cached copy
    /// already hashes to the pinned value.
    pub async fn fetch_cached(
        &self,
        url: &str,
        file_name: &str,
        pin: Pin<'_>,
        progress: &ProgressFn,
    ) -> Result<PathBuf> {
        let dest = self.download_path(file_name);

        if let Some(hash) = pin.cache_hash() {
            if check_file(&dest, hash).await {
                debug!("Reusing cached {}", dest.display());
                return Ok(dest);
            }
        }

        let checksum = self.download_checksum(pin, file_name);
        plog!("Downloading", url);
        download_file(url, &dest, &checksum, |p| progress(p)).await?;
        Ok(dest)
    }

    /// Checksum a fresh download of `file_name` is held to.
    fn download_checksum(&self, pin: Pin<'_>, file_name: &str) -> Checksum {
        match pin {
            Pin::Exact(hash) if self.verify_downloads => Checksum::sha256(hash),
            Pin::Exact(_) => {
                warn!("Checksum verification disabled for {}", file_name);
                Checksum::Unverified
            }
            Pin::CacheOnly(_) => {
                debug!("{} is not pinned to a fixed build", file_name);
                Checksum::Unverified
            }
            Pin::None => {
                plog!("No published checksum for", file_name, "- downloading unverified");
                Checksum::Unverified
            }
        }
    }

    pub fn load_manifest(&self) -> ToolsManifest {
        load_manifest_from(&self.manifest_path).unwrap_or_else(|e| {
            warn!("Failed to load manifest: {}", e);
            ToolsManifest::new()
        })
    }

    /// Records a provisioned executable. Failures are logged only; the
    /// executable is usable either way.
    pub fn record(&self, tool: ToolId, version: &str, executable: &Path) {
        let mut manifest = self.load_manifest();
        manifest.mark_installed(tool, version.to_string(), executable.to_path_buf());
        if let Err(e) = save_manifest_to(&manifest, &self.manifest_path) {
            warn!("Failed to record {} in manifest: {}", tool, e);
        }
    }
}

/// Locate-or-install for one toolchain.
#[async_trait]
pub trait Provisioner: Send + Sync {
    /// What the build step needs from this toolchain.
    type Output: Debug + Send;

    fn tool_id(&self) -> ToolId;

    /// Finds an already usable toolchain without touching the network.
    async fn locate(&self) -> Option<Self::Output>;

    /// Downloads and installs the toolchain, then locates it.
    async fn install(&self, progress: &ProgressFn) -> Result<Self::Output>;

    async fn provision(&self, progress: &ProgressFn) -> Result<Self::Output> {
        if let Some(found) = self.locate().await {
            info!(tool = %self.tool_id(), "Using existing {:?}", found);
            plog!("Found", self.tool_id(), "at", format!("{:?}", found));
            return Ok(found);
        }

        plog!("Installing", self.tool_id());
        self.install(progress).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const HELLO_SHA256: &str = "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824";

    fn context(temp: &TempDir) -> ProvisionContext {
        ProvisionContext::new(Platform::Linux, temp.path().join("downloads"))
            .with_binary_dir(temp.path().join("bin"))
            .with_manifest_path(temp.path().join("manifest.json"))
    }

    #[test]
    fn test_extract_dir_strips_archive_suffix() {
        let temp = TempDir::new().unwrap();
        let ctx = context(&temp);
        assert_eq!(
            ctx.extract_dir("git-2.45.0.tar.gz"),
            temp.path().join("bin").join("git-2.45.0")
        );
        assert_eq!(
            ctx.extract_dir("rustup-init.sh"),
            temp.path().join("bin").join("rustup-init")
        );
    }

    #[tokio::test]
    async fn test_fetch_cached_reuses_matching_file() {
        let temp = TempDir::new().unwrap();
        let ctx = context(&temp);
        std::fs::create_dir_all(&ctx.download_dir).unwrap();
        std::fs::write(ctx.download_path("hello.tar.gz"), "hello").unwrap();

        // Disallowed host: only succeeds when the network is never touched.
        let path = ctx
            .fetch_cached(
                "https://example.invalid/hello.tar.gz",
                "hello.tar.gz",
                Pin::Exact(HELLO_SHA256),
                &|_| {},
            )
            .await
            .unwrap();
        assert_eq!(path, ctx.download_path("hello.tar.gz"));
    }

    #[tokio::test]
    async fn test_fetch_cached_redownloads_on_mismatch() {
        let temp = TempDir::new().unwrap();
        let ctx = context(&temp);
        std::fs::create_dir_all(&ctx.download_dir).unwrap();
        std::fs::write(ctx.download_path("hello.tar.gz"), "stale").unwrap();

        let result = ctx
            .fetch_cached(
                "https://example.invalid/hello.tar.gz",
                "hello.tar.gz",
                Pin::Exact(HELLO_SHA256),
                &|_| {},
            )
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_fetch_cached_reuses_cache_only_pin() {
        let temp = TempDir::new().unwrap();
        let ctx = context(&temp);
        std::fs::create_dir_all(&ctx.download_dir).unwrap();
        std::fs::write(ctx.download_path("rustup-init.sh"), "hello").unwrap();

        let path = ctx
            .fetch_cached(
                "https://example.invalid/rustup-init.sh",
                "rustup-init.sh",
                Pin::CacheOnly(HELLO_SHA256),
                &|_| {},
            )
            .await
            .unwrap();
        assert_eq!(path, ctx.download_path("rustup-init.sh"));
    }

    #[test]
    fn test_download_checksum_per_pin() {
        let temp = TempDir::new().unwrap();
        let ctx = context(&temp);

        assert_eq!(
            ctx.download_checksum(Pin::Exact(HELLO_SHA256), "a.tar.gz"),
            Checksum::sha256(HELLO_SHA256)
        );
        // A moving URL is never held to an old pin, even with verification on.
        assert_eq!(
            ctx.download_checksum(Pin::CacheOnly(HELLO_SHA256), "rustup-init.sh"),
            Checksum::Unverified
        );
        assert_eq!(ctx.download_checksum(Pin::None, "a.zip"), Checksum::Unverified);

        let relaxed = context(&temp).with_verify_downloads(false);
        assert_eq!(
            relaxed.download_checksum(Pin::Exact(HELLO_SHA256), "a.tar.gz"),
            Checksum::Unverified
        );
    }

    #[test]
    fn test_record_writes_manifest() {
        let temp = TempDir::new().unwrap();
        let ctx = context(&temp);

        ctx.record(ToolId::Git, "2.45.0", Path::new("/opt/git/bin/git"));

        let manifest = ctx.load_manifest();
        let info = manifest.get_tool(ToolId::Git).unwrap();
        assert_eq!(info.version, "2.45.0");
        assert_eq!(info.executable, PathBuf::from("/opt/git/bin/git"));
    }
}
