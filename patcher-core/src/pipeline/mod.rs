//! The patch run: provision toolchains, build the addon and install it.
//!
//! Stages run strictly in order with no retries. Progress goes out as
//! [`PatchEvent`]s on an unbounded channel so the caller never blocks a stage.

mod events;

pub use events::{PatchEvent, PipelineError, Stage};

use std::future::Future;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{error, info};

use crate::config::Settings;
use crate::librespot::{replace_addon, InstallTarget, LibrespotNodeHandler};
use crate::output;
use crate::plog;
use crate::toolchain::paths;
use crate::toolchain::{
    GitProvisioner, Platform, ProvisionContext, Provisioner, RustProvisioner, YarnProvisioner,
};

/// Everything a run needs, resolved from the settings.
#[derive(Debug, Clone)]
pub struct PatcherConfig {
    pub platform: Platform,
    pub download_dir: PathBuf,
    pub binary_dir: PathBuf,
    pub build_dir: PathBuf,
    pub manifest_path: PathBuf,
    pub install_path: Option<PathBuf>,
    pub appimage_path: Option<PathBuf>,
    pub verify_downloads: bool,
}

impl PatcherConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        let dirs = settings.resolve_dirs();
        Self {
            platform: Platform::detect(),
            download_dir: dirs.download_dir,
            binary_dir: paths::get_binary_dir(),
            build_dir: dirs.build_dir,
            manifest_path: paths::get_manifest_path(),
            install_path: dirs.install_path,
            appimage_path: dirs.appimage_path,
            verify_downloads: settings.verify_downloads,
        }
    }

    fn provision_context(&self) -> ProvisionContext {
        ProvisionContext::new(self.platform, self.download_dir.clone())
            .with_binary_dir(self.binary_dir.clone())
            .with_manifest_path(self.manifest_path.clone())
            .with_verify_downloads(self.verify_downloads)
    }
}

/// Clears the running flag when a run ends, however it ends.
struct RunGuard<'a>(&'a AtomicBool);

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Runs the patch sequence, one run at a time.
#[derive(Debug)]
pub struct Patcher {
    config: PatcherConfig,
    running: AtomicBool,
}

impl Patcher {
    pub fn new(settings: &Settings) -> Self {
        Self::with_config(PatcherConfig::from_settings(settings))
    }

    pub fn with_config(config: PatcherConfig) -> Self {
        Self {
            config,
            running: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &PatcherConfig {
        &self.config
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Runs every stage and returns the replaced addon path.
    ///
    /// A second call while a run is in flight fails immediately with
    /// [`PipelineError::AlreadyRunning`] and touches nothing.
    pub async fn run(&self, events: UnboundedSender<PatchEvent>) -> Result<PathBuf, PipelineError> {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(PipelineError::AlreadyRunning);
        }
        let _guard = RunGuard(&self.running);

        output::global().clear();

        let result = self.run_stages(&events).await;
        match &result {
            Ok(path) => {
                info!(path = %path.display(), "Patch run completed");
                let _ = events.send(PatchEvent::Completed(path.clone()));
            }
            Err(e) => {
                error!("Patch run failed: {}", e);
                plog!("Error:", e);
                let _ = events.send(PatchEvent::Failed(e.to_string()));
            }
        }
        result
    }

    async fn run_stages(&self, events: &UnboundedSender<PatchEvent>) -> Result<PathBuf, PipelineError> {
        let config = &self.config;
        if !config.platform.is_supported() {
            return Err(PipelineError::UnsupportedPlatform);
        }
        let install_path = config
            .install_path
            .clone()
            .ok_or(PipelineError::MissingInstallPath)?;
        let target = InstallTarget::detect(&install_path, config.appimage_path.as_deref());

        let progress_tx = events.clone();
        let progress = move |p| {
            let _ = progress_tx.send(PatchEvent::Download(p));
        };

        let ctx = config.provision_context();
        let handler = LibrespotNodeHandler::new(config.platform, config.build_dir.clone());

        let git = stage(events, Stage::ProvisionGit, async {
            GitProvisioner::new(ctx.clone()).provision(&progress).await
        })
        .await?;

        let cargo = stage(events, Stage::ProvisionRust, async {
            RustProvisioner::new(ctx.clone()).provision(&progress).await
        })
        .await?;

        let yarn = stage(events, Stage::ProvisionYarn, async {
            YarnProvisioner::new(ctx.clone()).provision(&progress).await
        })
        .await?;

        stage(events, Stage::CloneSources, handler.clone_sources(&git)).await?;
        stage(events, Stage::PatchSources, handler.patch_sources()).await?;
        let compiled = stage(events, Stage::Compile, handler.compile(&yarn, &cargo)).await?;

        stage(events, Stage::ReplaceAddon, async {
            replace_addon(&compiled, &target, &handler.scratch_dir(), &progress).await
        })
        .await
    }
}

/// Announces `stage`, awaits it and tags a failure with the stage.
async fn stage<T, F>(
    events: &UnboundedSender<PatchEvent>,
    stage: Stage,
    fut: F,
) -> Result<T, PipelineError>
where
    F: Future<Output = anyhow::Result<T>>,
{
    info!(%stage, "Starting stage");
    plog!("###", stage.label());
    let _ = events.send(PatchEvent::StageStarted {
        stage,
        index: stage.index(),
        total: Stage::total(),
    });

    fut.await.map_err(|e| PipelineError::stage(stage, e))
}
