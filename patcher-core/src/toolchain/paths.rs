//! Default directory layout for downloads, toolchains and builds.
//!
//! Everything lives under the platform data directory:
//!
//! - Linux: `~/.local/share/librespot-patcher/`
//! - Windows: `C:\Users\<User>\AppData\Roaming\librespot-patcher\`
//!
//! Downloads and builds can each exceed a gigabyte, so both are overridable
//! from the settings.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Subdirectory name under the data folder.
const PATCHER_DIR: &str = "librespot-patcher";

// ============================================================================
// Path Resolution
// ============================================================================

/// Returns the base patcher directory.
///
/// Falls back to the OS temp directory when no data directory is known.
pub fn get_patcher_dir() -> PathBuf {
    dirs::data_dir()
        .or_else(|| dirs::home_dir().map(|h| h.join(".local/share")))
        .unwrap_or_else(std::env::temp_dir)
        .join(PATCHER_DIR)
}

/// Where downloaded archives and installers are cached.
///
/// Path: `{data}/librespot-patcher/downloads/`
pub fn get_download_dir() -> PathBuf {
    get_patcher_dir().join("downloads")
}

/// Where toolchains are extracted and installed.
///
/// Path: `{data}/librespot-patcher/bin/`
pub fn get_binary_dir() -> PathBuf {
    get_patcher_dir().join("bin")
}

/// Where the sources are cloned and compiled.
///
/// Path: `{data}/librespot-patcher/build/`
pub fn get_build_dir() -> PathBuf {
    get_patcher_dir().join("build")
}

/// Path: `{data}/librespot-patcher/manifest.json`
pub fn get_manifest_path() -> PathBuf {
    get_patcher_dir().join("manifest.json")
}

// ============================================================================
// Filesystem Helpers
// ============================================================================

/// Creates `dir` (recursively), removing it first when `force` is set.
///
/// Failures are logged rather than returned; the step that actually needs the
/// directory reports the real error.
pub async fn make_dir(dir: &Path, force: bool) {
    if force && dir.exists() {
        if let Err(e) = remove_dir_with_retries(dir, 3).await {
            warn!("Failed to clear {}: {}", dir.display(), e);
        }
    }

    if !dir.exists() {
        if let Err(e) = tokio::fs::create_dir_all(dir).await {
            warn!("Failed to create {}: {}", dir.display(), e);
        }
    }
}

/// Removes a file, ignoring a missing one.
pub async fn remove_file(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!("Removed {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove {}: {}", path.display(), e),
    }
}

/// Recursively removes a directory, retrying a few times.
///
/// Windows keeps handles open on freshly-written git objects for a moment,
/// which makes the first attempt fail intermittently.
pub async fn remove_dir_with_retries(dir: &Path, retries: u32) -> Result<()> {
    let mut attempt = 0;
    loop {
        match tokio::fs::remove_dir_all(dir).await {
            Ok(()) => return Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) if attempt < retries => {
                attempt += 1;
                debug!(attempt, "Retrying removal of {}: {}", dir.display(), e);
                tokio::time::sleep(std::time::Duration::from_millis(100 * attempt as u64)).await;
            }
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to remove {}", dir.display()));
            }
        }
    }
}
