//! Git provisioner.
//!
//! Linux builds git from the kernel.org source tarball; Windows uses the
//! portable MinGit archive from git-for-windows.

use anyhow::{Context, Result};
use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::downloader::fetch_json;
use super::downloader::fetch_text;
use super::extractor::extract_archive_async;
use super::process::{self, CommandSpec};
use super::provisioner::{ProgressFn, ProvisionContext, Provisioner};
use super::types::{Platform, ToolId};
use crate::plog;

const GIT_FOR_WINDOWS_RELEASES: &str =
    "https://api.github.com/repos/git-for-windows/git/releases";
const GIT_TAGS: &str = "https://api.github.com/repos/git/git/tags";
const KERNEL_SHA256SUMS: &str =
    "https://mirrors.edge.kernel.org/pub/software/scm/git/sha256sums.asc";

#[derive(Debug, Deserialize)]
struct GithubRelease {
    tag_name: String,
    #[serde(default)]
    body: Option<String>,
    #[serde(default)]
    assets: Vec<GithubAsset>,
}

#[derive(Debug, Deserialize)]
struct GithubAsset {
    name: String,
    browser_download_url: String,
}

#[derive(Debug, Deserialize)]
struct GithubTag {
    name: String,
}

/// A resolved git release ready to download.
#[derive(Debug, Clone, PartialEq, Eq)]
struct GitRelease {
    version: String,
    file_name: String,
    url: String,
    sha256: Option<String>,
}

/// Finds the first line of `body` matching `pattern` and returns field
/// `index` of that line split on `separator`, trimmed.
///
/// Release notes list checksums as `| MinGit-2.45.0-64-bit.zip | <hash> |`;
/// kernel.org lists them as `<hash>  git-2.45.0.tar.gz`.
pub fn hash_from_body(body: &str, pattern: &str, separator: char, index: usize) -> Option<String> {
    let re = match Regex::new(pattern) {
        Ok(re) => re,
        Err(e) => {
            debug!("Invalid hash pattern {}: {}", pattern, e);
            return None;
        }
    };

    body.lines()
        .find(|line| re.is_match(line))
        .and_then(|line| line.split(separator).nth(index))
        .map(|field| field.trim().to_string())
        .filter(|field| !field.is_empty())
}

/// `v2.45.0.windows.1` -> `2.45.0`
fn windows_version(tag: &str) -> String {
    tag.replace(".windows.1", "").replacen('v', "", 1)
}

fn first_stable_tag(tags: &[GithubTag]) -> Option<String> {
    tags.iter()
        .find(|t| !t.name.contains("rc"))
        .map(|t| t.name.replacen('v', "", 1))
}

fn resolve_windows_release(release: &GithubRelease) -> Option<GitRelease> {
    let version = windows_version(&release.tag_name);
    let file_name = format!("MinGit-{}-64-bit.zip", version);
    let pattern = regex::escape(&file_name);

    let url = release
        .assets
        .iter()
        .find(|a| a.name == file_name)?
        .browser_download_url
        .clone();

    let sha256 = release
        .body
        .as_deref()
        .and_then(|body| hash_from_body(body, &pattern, '|', 1));

    Some(GitRelease {
        version,
        file_name,
        url,
        sha256,
    })
}

/// Provisions git, building it from source on Linux.
pub struct GitProvisioner {
    ctx: ProvisionContext,
}

impl GitProvisioner {
    pub fn new(ctx: ProvisionContext) -> Self {
        Self { ctx }
    }

    /// Executable inside an extracted (and, on Linux, installed) tree.
    fn executable_in(&self, extract_dir: &Path) -> PathBuf {
        match self.ctx.platform {
            Platform::Windows => extract_dir.join("cmd").join("git.exe"),
            _ => extract_dir.join("bin").join("git"),
        }
    }

    async fn resolve_release(&self) -> Result<GitRelease> {
        let release = match self.ctx.platform {
            Platform::Windows => {
                let releases: Vec<GithubRelease> = fetch_json(GIT_FOR_WINDOWS_RELEASES).await?;
                releases.first().and_then(resolve_windows_release)
            }
            Platform::Linux => {
                let tags: Vec<GithubTag> = fetch_json(GIT_TAGS).await?;
                match first_stable_tag(&tags) {
                    Some(version) => {
                        let file_name = format!("git-{}.tar.gz", version);
                        let sums = fetch_text(KERNEL_SHA256SUMS).await?;
                        let sha256 = hash_from_body(&sums, &regex::escape(&file_name), ' ', 0);
                        Some(GitRelease {
                            url: format!(
                                "https://www.kernel.org/pub/software/scm/git/{}",
                                file_name
                            ),
                            version,
                            file_name,
                            sha256,
                        })
                    }
                    None => None,
                }
            }
            Platform::Unsupported => None,
        };

        release.ok_or_else(|| anyhow::anyhow!("Failed to find download URL for git"))
    }

    async fn compile(&self, extract_dir: &Path, version: &str) -> Result<()> {
        plog!("Compiling git...");
        // joining "" keeps the trailing separator configure expects
        let prefix = process::quote_path(&extract_dir.join(""));
        let script = format!(
            "make configure && chmod +x ./configure && ./configure --prefix {} && make all && make install",
            prefix
        );
        let spec =
            CommandSpec::shell(script).current_dir(extract_dir.join(format!("git-{}", version)));
        process::spawn_checked(&spec)
            .await
            .context("Failed to compile git")
    }
}

#[async_trait]
impl Provisioner for GitProvisioner {
    type Output = PathBuf;

    fn tool_id(&self) -> ToolId {
        ToolId::Git
    }

    async fn locate(&self) -> Option<PathBuf> {
        if let Some(system) = process::which("git") {
            return Some(system);
        }

        self.ctx
            .load_manifest()
            .existing_executable(ToolId::Git)
            .map(Path::to_path_buf)
    }

    async fn install(&self, progress: &ProgressFn) -> Result<PathBuf> {
        let release = self.resolve_release().await?;
        debug!(?release, "Resolved git release");

        let archive = self
            .ctx
            .fetch_cached(
                &release.url,
                &release.file_name,
                release.sha256.as_deref().into(),
                progress,
            )
            .await?;

        let extract_dir =
            extract_archive_async(&archive, &self.ctx.extract_dir(&release.file_name)).await?;

        if self.ctx.platform == Platform::Linux {
            self.compile(&extract_dir, &release.version).await?;
        }

        let executable = self.executable_in(&extract_dir);
        if !executable.exists() {
            anyhow::bail!("git executable not found at {}", executable.display());
        }

        self.ctx.record(ToolId::Git, &release.version, &executable);
        Ok(executable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const RELEASE_BODY: &str = "\
Changes since Git for Windows v2.44.0

Filename | SHA-256
-------- | -------
Git-2.45.0-64-bit.exe | aaaa
MinGit-2.45.0-64-bit.zip | 0123abcd
MinGit-2.45.0-busybox-64-bit.zip | ffff";

    const KERNEL_SUMS: &str = "\
-----BEGIN PGP SIGNED MESSAGE-----
Hash: SHA256

1111aaaa  git-2.44.0.tar.gz
2222bbbb  git-2.45.0.tar.gz
3333cccc  git-2.45.0.tar.xz";

    #[test]
    fn test_hash_from_body_pipe_table() {
        assert_eq!(
            hash_from_body(RELEASE_BODY, &regex::escape("MinGit-2.45.0-64-bit.zip"), '|', 1),
            Some("0123abcd".to_string())
        );
    }

    #[test]
    fn test_hash_from_body_space_separated() {
        assert_eq!(
            hash_from_body(KERNEL_SUMS, &regex::escape("git-2.45.0.tar.gz"), ' ', 0),
            Some("2222bbbb".to_string())
        );
    }

    #[test]
    fn test_hash_from_body_no_match() {
        assert_eq!(hash_from_body(KERNEL_SUMS, "git-9.9.9", ' ', 0), None);
        assert_eq!(hash_from_body("", "anything", ' ', 0), None);
    }

    #[test]
    fn test_hash_from_body_invalid_pattern() {
        assert_eq!(hash_from_body(KERNEL_SUMS, "git-(", ' ', 0), None);
    }

    #[test]
    fn test_windows_version() {
        assert_eq!(windows_version("v2.45.0.windows.1"), "2.45.0");
        assert_eq!(windows_version("v2.45.1"), "2.45.1");
    }

    #[test]
    fn test_first_stable_tag_skips_release_candidates() {
        let tags = vec![
            GithubTag { name: "v2.46.0-rc1".into() },
            GithubTag { name: "v2.46.0-rc0".into() },
            GithubTag { name: "v2.45.2".into() },
        ];
        assert_eq!(first_stable_tag(&tags), Some("2.45.2".to_string()));
        assert_eq!(first_stable_tag(&[]), None);
    }

    #[test]
    fn test_resolve_windows_release() {
        let release = GithubRelease {
            tag_name: "v2.45.0.windows.1".into(),
            body: Some(RELEASE_BODY.into()),
            assets: vec![
                GithubAsset {
                    name: "Git-2.45.0-64-bit.exe".into(),
                    browser_download_url: "https://github.com/a/Git.exe".into(),
                },
                GithubAsset {
                    name: "MinGit-2.45.0-64-bit.zip".into(),
                    browser_download_url: "https://github.com/a/MinGit.zip".into(),
                },
            ],
        };

        let resolved = resolve_windows_release(&release).unwrap();
        assert_eq!(resolved.version, "2.45.0");
        assert_eq!(resolved.file_name, "MinGit-2.45.0-64-bit.zip");
        assert_eq!(resolved.url, "https://github.com/a/MinGit.zip");
        assert_eq!(resolved.sha256.as_deref(), Some("0123abcd"));
    }

    #[test]
    fn test_resolve_windows_release_without_asset() {
        let release = GithubRelease {
            tag_name: "v2.45.0.windows.1".into(),
            body: None,
            assets: vec![],
        };
        assert!(resolve_windows_release(&release).is_none());
    }

    #[tokio::test]
    async fn test_unsupported_platform_has_no_download() {
        let temp = TempDir::new().unwrap();
        let ctx = ProvisionContext::new(Platform::Unsupported, temp.path().to_path_buf());
        let err = GitProvisioner::new(ctx).resolve_release().await.unwrap_err();
        assert_eq!(err.to_string(), "Failed to find download URL for git");
    }

    #[test]
    fn test_executable_in_per_platform() {
        let temp = TempDir::new().unwrap();
        let base = temp.path().join("git-2.45.0");

        let linux = GitProvisioner::new(ProvisionContext::new(
            Platform::Linux,
            temp.path().to_path_buf(),
        ));
        assert_eq!(linux.executable_in(&base), base.join("bin").join("git"));

        let windows = GitProvisioner::new(ProvisionContext::new(
            Platform::Windows,
            temp.path().to_path_buf(),
        ));
        assert_eq!(
            windows.executable_in(&base),
            base.join("cmd").join("git.exe")
        );
    }
}
