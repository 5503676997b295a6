//! Rust provisioner.
//!
//! Installs a minimal toolchain through `rustup-init` into a private
//! `CARGO_HOME`/`RUSTUP_HOME` pair. A system cargo is never reused so the
//! addon always builds with a known toolchain.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::Path;
use tracing::debug;

use super::extractor::make_executable;
use super::process::{self, CommandSpec};
use super::provisioner::{ProgressFn, ProvisionContext, Provisioner};
use super::types::{CargoToolchain, Pin, Platform, ToolId};

/// rustup installer for one platform.
///
/// Both URLs serve the newest rustup, so `sha256` identifies a known cached
/// copy and is never required of a fresh download.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct RustupInstaller {
    url: &'static str,
    file_name: &'static str,
    sha256: &'static str,
}

impl RustupInstaller {
    fn pin(&self) -> Pin<'static> {
        Pin::CacheOnly(self.sha256)
    }
}

const LINUX_INSTALLER: RustupInstaller = RustupInstaller {
    url: "https://sh.rustup.rs",
    file_name: "rustup-init.sh",
    sha256: "173f4881e2de99ba9ad1acb59e65be01b2a44979d83b6ec648d0d22f8654cbce",
};

const WINDOWS_INSTALLER: RustupInstaller = RustupInstaller {
    url: "https://static.rust-lang.org/rustup/dist/x86_64-pc-windows-msvc/rustup-init.exe",
    file_name: "rustup-init.exe",
    sha256: "2220ddb49fea0e0945b1b5913e33d66bd223a67f19fd1c116be0318de7ed9d9c",
};

const RUSTUP_ARGS: &[&str] = &["-v", "-y", "--profile", "minimal", "--no-modify-path"];

fn installer_for(platform: Platform) -> Option<RustupInstaller> {
    match platform {
        Platform::Linux => Some(LINUX_INSTALLER),
        Platform::Windows => Some(WINDOWS_INSTALLER),
        Platform::Unsupported => None,
    }
}

/// Provisions cargo through rustup.
pub struct RustProvisioner {
    ctx: ProvisionContext,
}

impl RustProvisioner {
    pub fn new(ctx: ProvisionContext) -> Self {
        Self { ctx }
    }

    /// The private toolchain layout under the binary dir.
    fn toolchain(&self) -> Option<CargoToolchain> {
        let installer = installer_for(self.ctx.platform)?;
        let root = self.ctx.extract_dir(installer.file_name);
        let cargo_home = root.join("cargo");

        Some(CargoToolchain {
            cargo: cargo_home
                .join("bin")
                .join(self.ctx.platform.exe_name("cargo")),
            rustup_home: Some(root.join("rustup")),
            cargo_home: Some(cargo_home),
        })
    }

    async fn cargo_version(cargo: &Path) -> String {
        match process::exec(cargo, &["--version"]).await {
            Ok(out) if out.success() => out.stdout.trim().to_string(),
            Ok(out) => {
                debug!("cargo --version failed: {}", out.stderr.trim());
                "unknown".to_string()
            }
            Err(e) => {
                debug!("cargo --version failed: {}", e);
                "unknown".to_string()
            }
        }
    }
}

#[async_trait]
impl Provisioner for RustProvisioner {
    type Output = CargoToolchain;

    fn tool_id(&self) -> ToolId {
        ToolId::Rust
    }

    async fn locate(&self) -> Option<CargoToolchain> {
        self.toolchain().filter(|t| t.cargo.exists())
    }

    async fn install(&self, progress: &ProgressFn) -> Result<CargoToolchain> {
        let installer = installer_for(self.ctx.platform)
            .ok_or_else(|| anyhow::anyhow!("rustup is not available for this platform"))?;
        let toolchain = self
            .toolchain()
            .ok_or_else(|| anyhow::anyhow!("rustup is not available for this platform"))?;

        let script = self
            .ctx
            .fetch_cached(
                installer.url,
                installer.file_name,
                installer.pin(),
                progress,
            )
            .await?;
        make_executable(&script)?;

        let spec = match self.ctx.platform {
            Platform::Windows => CommandSpec::new(&script),
            _ => CommandSpec::new("sh").arg(&script),
        };
        let mut spec = spec.args(RUSTUP_ARGS).current_dir(&self.ctx.download_dir);
        if let Some(home) = &toolchain.cargo_home {
            spec = spec.env("CARGO_HOME", home);
        }
        if let Some(home) = &toolchain.rustup_home {
            spec = spec.env("RUSTUP_HOME", home);
        }

        process::spawn_checked(&spec)
            .await
            .context("rustup-init failed")?;

        if !toolchain.cargo.exists() {
            anyhow::bail!("cargo not found at {}", toolchain.cargo.display());
        }

        let version = Self::cargo_version(&toolchain.cargo).await;
        self.ctx.record(ToolId::Rust, &version, &toolchain.cargo);
        Ok(toolchain)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn provisioner(temp: &TempDir, platform: Platform) -> RustProvisioner {
        let ctx = ProvisionContext::new(platform, temp.path().join("downloads"))
            .with_binary_dir(temp.path().join("bin"))
            .with_manifest_path(temp.path().join("manifest.json"));
        RustProvisioner::new(ctx)
    }

    #[test]
    fn test_installer_pins() {
        assert_eq!(installer_for(Platform::Linux).unwrap().file_name, "rustup-init.sh");
        assert_eq!(
            installer_for(Platform::Windows).unwrap().file_name,
            "rustup-init.exe"
        );
        assert!(installer_for(Platform::Unsupported).is_none());
    }

    #[test]
    fn test_installer_hash_only_guards_cache() {
        for platform in [Platform::Linux, Platform::Windows] {
            let installer = installer_for(platform).unwrap();
            assert_eq!(installer.pin(), Pin::CacheOnly(installer.sha256));
        }
    }

    #[test]
    fn test_private_toolchain_layout() {
        let temp = TempDir::new().unwrap();
        let toolchain = provisioner(&temp, Platform::Linux).toolchain().unwrap();
        let root = temp.path().join("bin").join("rustup-init");

        assert_eq!(toolchain.cargo, root.join("cargo").join("bin").join("cargo"));
        assert_eq!(toolchain.cargo_home, Some(root.join("cargo")));
        assert_eq!(toolchain.rustup_home, Some(root.join("rustup")));

        let windows = provisioner(&temp, Platform::Windows).toolchain().unwrap();
        assert!(windows.cargo.ends_with("cargo.exe"));
    }

    #[tokio::test]
    async fn test_locate_only_finds_private_toolchain() {
        let temp = TempDir::new().unwrap();
        let rust = provisioner(&temp, Platform::Linux);
        assert!(rust.locate().await.is_none());

        let cargo = rust.toolchain().unwrap().cargo;
        std::fs::create_dir_all(cargo.parent().unwrap()).unwrap();
        std::fs::write(&cargo, "").unwrap();

        let found = rust.locate().await.unwrap();
        assert_eq!(found.cargo, cargo);
    }
}
