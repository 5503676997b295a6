//! Replacing the host application's copy of the addon.
//!
//! The host ships `librespot.node` in one of three layouts: next to an
//! `app.asar` archive, inside an unpacked `resources` tree, or inside an
//! AppImage that has to be extracted and repacked.

use anyhow::{Context, Result};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info};

use crate::plog;
use crate::toolchain::checksum::{digests_match, sha256_file};
use crate::toolchain::downloader::download_file;
use crate::toolchain::extractor::make_executable;
use crate::toolchain::paths::make_dir;
use crate::toolchain::process::{self, CommandSpec};
use crate::toolchain::provisioner::ProgressFn;
use crate::toolchain::types::Checksum;

/// Location of the addon relative to a `node_modules` parent.
const ADDON_RELATIVE: &[&str] = &[
    "node_modules",
    "librespot-node",
    "dist",
    "build",
    "librespot.node",
];

const APPIMAGETOOL_BASE: &str =
    "https://github.com/AppImage/appimagetool/releases/download/continuous";

/// Where and how the compiled addon gets installed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallTarget {
    /// Host packaged as `app.asar`; the addon lives in `app.asar.unpacked`.
    Asar { addon: PathBuf },
    /// Host running from an unpacked `resources/app` tree.
    Unpacked { addon: PathBuf },
    /// Host distributed as an AppImage that must be repacked.
    AppImage { image: PathBuf },
}

impl InstallTarget {
    /// Classifies the host installation. An AppImage path, when set, wins.
    pub fn detect(install_path: &Path, appimage: Option<&Path>) -> Self {
        if let Some(image) = appimage.filter(|p| !p.as_os_str().is_empty()) {
            return Self::AppImage {
                image: image.to_path_buf(),
            };
        }

        if install_path.to_string_lossy().ends_with("asar") {
            let base = install_path.parent().unwrap_or(install_path);
            Self::Asar {
                addon: join_all(&base.join("app.asar.unpacked"), ADDON_RELATIVE),
            }
        } else {
            Self::Unpacked {
                addon: join_all(&install_path.join(".."), ADDON_RELATIVE),
            }
        }
    }

    /// The file that ends up replaced on disk.
    pub fn destination(&self) -> &Path {
        match self {
            Self::Asar { addon } | Self::Unpacked { addon } => addon,
            Self::AppImage { image } => image,
        }
    }
}

fn join_all(base: &Path, parts: &[&str]) -> PathBuf {
    parts.iter().fold(base.to_path_buf(), |acc, p| acc.join(p))
}

/// Installs `compiled` into `target` and returns the replaced path.
///
/// `scratch_dir` holds the extracted AppImage while it is repacked.
pub async fn replace_addon(
    compiled: &Path,
    target: &InstallTarget,
    scratch_dir: &Path,
    progress: &ProgressFn,
) -> Result<PathBuf> {
    info!(?target, "Replacing addon");

    let replaced = match target {
        InstallTarget::Asar { addon } | InstallTarget::Unpacked { addon } => {
            replace_file(compiled, addon).await?;
            addon.clone()
        }
        InstallTarget::AppImage { image } => {
            repack_appimage(compiled, image, scratch_dir, progress).await?;
            image.clone()
        }
    };

    plog!("### Patch completed. Please restart the app");
    Ok(replaced)
}

/// Copies `src` over `dest`, retrying with elevated privileges when the
/// destination is not writable.
pub async fn replace_file(src: &Path, dest: &Path) -> Result<()> {
    if let Err(e) = tokio::fs::remove_file(dest).await {
        if e.kind() != ErrorKind::NotFound {
            error!("Failed to unlink {}: {}", dest.display(), e);
        }
    }

    plog!("  \nreplacing file at", dest.display());

    match tokio::fs::copy(src, dest).await {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == ErrorKind::PermissionDenied => {
            plog!("Permission denied, retrying with elevated privileges");
            process::sudo_exec(&copy_command(src, dest))
                .await
                .with_context(|| format!("Failed to replace {}", dest.display()))?;
            verify_replaced(src, dest).await
        }
        Err(e) => Err(e).with_context(|| {
            format!("Failed to copy {} to {}", src.display(), dest.display())
        }),
    }
}

/// Confirms `dest` now holds the same bytes as `src`.
///
/// The elevated copy runs out of process and cannot always report failure.
async fn verify_replaced(src: &Path, dest: &Path) -> Result<()> {
    let expected = sha256_file(src).await?;
    let actual = sha256_file(dest)
        .await
        .with_context(|| format!("{} was not replaced", dest.display()))?;
    if !digests_match(&expected, &actual) {
        anyhow::bail!("{} was not replaced: contents differ", dest.display());
    }
    Ok(())
}

fn copy_command(src: &Path, dest: &Path) -> String {
    let (src, dest) = (process::quote_path(src), process::quote_path(dest));
    if cfg!(windows) {
        format!("copy /Y {} {}", src, dest)
    } else {
        format!("cp -f {} {}", src, dest)
    }
}

/// Path of the addon inside an extracted AppImage.
fn appimage_addon(squashfs_root: &Path) -> PathBuf {
    join_all(
        &squashfs_root.join("resources").join("app.asar.unpacked"),
        ADDON_RELATIVE,
    )
}

async fn repack_appimage(
    compiled: &Path,
    image: &Path,
    scratch_dir: &Path,
    progress: &ProgressFn,
) -> Result<()> {
    if !image.is_file() {
        anyhow::bail!("AppImage not found at {}", image.display());
    }

    make_dir(scratch_dir, true).await;

    plog!("Extracting", image.display());
    process::spawn_checked(
        &CommandSpec::new(image)
            .arg("--appimage-extract")
            .current_dir(scratch_dir),
    )
    .await
    .context("Failed to extract AppImage")?;

    let squashfs_root = scratch_dir.join("squashfs-root");
    let addon = appimage_addon(&squashfs_root);
    if let Some(parent) = addon.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    replace_file(compiled, &addon).await?;

    let arch = std::env::consts::ARCH;
    let tool = scratch_dir.join(format!("appimagetool-{}.AppImage", arch));
    download_file(
        &format!("{}/appimagetool-{}.AppImage", APPIMAGETOOL_BASE, arch),
        &tool,
        &Checksum::Unverified,
        |p| progress(p),
    )
    .await?;
    make_executable(&tool)?;

    let file_name = image
        .file_name()
        .ok_or_else(|| anyhow::anyhow!("Invalid AppImage path: {}", image.display()))?;
    let repacked = scratch_dir.join(file_name);

    plog!("Repacking", repacked.display());
    process::spawn_checked(
        &CommandSpec::new(&tool)
            .arg("squashfs-root")
            .arg(&repacked)
            .current_dir(scratch_dir)
            .env("ARCH", arch)
            .env("APPIMAGE_EXTRACT_AND_RUN", "1"),
    )
    .await
    .context("appimagetool failed")?;

    make_executable(&repacked)?;
    replace_file(&repacked, image).await?;

    if let Err(e) = make_executable(image) {
        debug!("Could not restore executable bit on {}: {}", image.display(), e);
    }
    Ok(())
}
