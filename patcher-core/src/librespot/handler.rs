//! Clone, patch and build of the librespot-node addon.

use anyhow::{Context, Result};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use super::patches::{apply_to_file, patch_bitrate, patch_cargo, patch_session};
use crate::plog;
use crate::toolchain::paths::{make_dir, remove_dir_with_retries};
use crate::toolchain::process::{self, CommandSpec};
use crate::toolchain::types::{CargoToolchain, Platform, YarnExec};

const LIBRESPOT_NODE_REPO: &str = "https://github.com/Moosync/librespot-node";
const LIBRESPOT_REPO: &str = "https://github.com/librespot-org/librespot";
const LIBRESPOT_BRANCH: &str = "dev";
const LIBRESPOT_CHECKOUT: &str = "librespot-custom";

/// Drives the addon build inside `build_dir`.
#[derive(Debug, Clone)]
pub struct LibrespotNodeHandler {
    platform: Platform,
    build_dir: PathBuf,
}

impl LibrespotNodeHandler {
    pub fn new(platform: Platform, build_dir: PathBuf) -> Self {
        Self {
            platform,
            build_dir,
        }
    }

    /// `build_dir/librespot-node`
    pub fn clone_dir(&self) -> PathBuf {
        self.build_dir.join("librespot-node")
    }

    /// `librespot-node/native`, the addon's Rust crate.
    pub fn native_dir(&self) -> PathBuf {
        self.clone_dir().join("native")
    }

    /// The patched librespot checkout inside the native crate.
    pub fn librespot_dir(&self) -> PathBuf {
        self.native_dir().join(LIBRESPOT_CHECKOUT)
    }

    /// Build output checked after `yarn install`.
    pub fn compiled_addon(&self) -> PathBuf {
        self.clone_dir()
            .join("dist")
            .join("build")
            .join("librespot.node")
    }

    /// Scratch space for AppImage repacking.
    pub fn scratch_dir(&self) -> PathBuf {
        self.build_dir.join("appimage")
    }

    /// Fresh clones of librespot-node and of librespot's dev branch.
    pub async fn clone_sources(&self, git: &Path) -> Result<()> {
        make_dir(&self.build_dir, false).await;

        let clone_dir = self.clone_dir();
        remove_dir_with_retries(&clone_dir, 3).await?;
        plog!("Cloning", LIBRESPOT_NODE_REPO);
        process::spawn_checked(
            &CommandSpec::new(git)
                .args(["clone", LIBRESPOT_NODE_REPO])
                .current_dir(&self.build_dir),
        )
        .await
        .context("Failed to clone librespot-node")?;

        remove_dir_with_retries(&self.librespot_dir(), 3).await?;
        plog!("Cloning", LIBRESPOT_REPO);
        process::spawn_checked(
            &CommandSpec::new(git)
                .args([
                    "clone",
                    LIBRESPOT_REPO,
                    "-b",
                    LIBRESPOT_BRANCH,
                    LIBRESPOT_CHECKOUT,
                ])
                .current_dir(self.native_dir()),
        )
        .await
        .context("Failed to clone librespot")?;

        Ok(())
    }

    pub async fn patch_sources(&self) -> Result<()> {
        let session = self
            .librespot_dir()
            .join("core")
            .join("src")
            .join("session.rs");
        apply_to_file(&session, patch_session).await?;

        apply_to_file(&self.native_dir().join("Cargo.toml"), patch_cargo).await?;

        let utils = self.native_dir().join("src").join("utils.rs");
        apply_to_file(&utils, patch_bitrate).await?;

        plog!("Applied patches");
        Ok(())
    }

    /// Runs `yarn install`, which builds the native addon through cargo.
    pub async fn compile(&self, yarn: &YarnExec, cargo: &CargoToolchain) -> Result<PathBuf> {
        let mut spec = yarn
            .command(["install"])?
            .current_dir(self.clone_dir())
            .env("PATH", build_path(cargo)?);
        if let Some(home) = &cargo.cargo_home {
            spec = spec.env("CARGO_HOME", home);
        }
        if let Some(home) = &cargo.rustup_home {
            spec = spec.env("RUSTUP_HOME", home);
        }

        info!(platform = %self.platform, "Compiling librespot-node");
        plog!("Starting compilation");
        let status = process::spawn_logged(&spec).await?;
        if !status.success() {
            warn!(?status, "yarn install exited unsuccessfully");
        }

        let compiled = self.compiled_addon();
        if !compiled.is_file() {
            anyhow::bail!(
                "Compiled addon not found at {} (yarn install: {})",
                compiled.display(),
                status
            );
        }
        Ok(compiled)
    }
}

/// Current `PATH` with cargo's directory appended.
fn build_path(cargo: &CargoToolchain) -> Result<OsString> {
    let mut entries: Vec<PathBuf> = std::env::var_os("PATH")
        .map(|p| std::env::split_paths(&p).collect())
        .unwrap_or_default();
    if let Some(dir) = cargo.bin_dir() {
        entries.push(dir.to_path_buf());
    }
    std::env::join_paths(entries).context("Invalid PATH entry")
}
