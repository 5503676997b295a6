//! Main application state and update loop.

use std::path::PathBuf;
use std::sync::Arc;

use eframe::egui;
use tokio::runtime::Runtime;
use tokio::sync::mpsc::{self, error::TryRecvError, UnboundedReceiver};
use tracing::{debug, error, info, warn};

use patcher_core::output;
use patcher_core::{
    Database, DownloadProgress, PatchEvent, PatchRun, Patcher, Settings, Stage, Theme,
};

use crate::ui;

// =============================================================================
// Picker Targets
// =============================================================================

/// Which setting a pending file dialog fills in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PickTarget {
    DownloadDir,
    BuildDir,
    InstallPath,
    /// Same setting as `InstallPath`, for hosts running from `resources/app`.
    UnpackedApp,
    AppImage,
}

impl PickTarget {
    pub fn label(&self) -> &'static str {
        match self {
            Self::DownloadDir => "Dependency download directory",
            Self::BuildDir => "Librespot build dir",
            Self::InstallPath => "Host install (app.asar or resources/app)",
            Self::UnpackedApp => "Host resources/app folder",
            Self::AppImage => "Host AppImage",
        }
    }

    fn picks_folder(&self) -> bool {
        matches!(self, Self::DownloadDir | Self::BuildDir | Self::UnpackedApp)
    }
}

// =============================================================================
// Application State
// =============================================================================

/// Main application state.
pub struct PatcherApp {
    /// Tokio runtime for async operations.
    pub runtime: Runtime,

    /// Database connection.
    pub db: Database,

    /// User settings.
    pub settings: Settings,

    /// Rebuilt from the settings whenever they change and no run is active.
    patcher: Arc<Patcher>,

    // -------------------------------------------------------------------------
    // Run State
    // -------------------------------------------------------------------------
    /// Events from the active run.
    event_rx: Option<UnboundedReceiver<PatchEvent>>,

    /// Stage currently executing.
    pub stage: Option<Stage>,

    /// Overall progress in `[0, 1]`.
    pub progress: f32,

    /// Latest download progress of the current stage.
    pub download: Option<DownloadProgress>,

    /// Outcome of the most recent finished run.
    pub last_run: Option<PatchRun>,

    // -------------------------------------------------------------------------
    // Output Mirror
    // -------------------------------------------------------------------------
    /// Non-blank lines of the output buffer.
    pub output_lines: Vec<String>,

    /// Buffer generation `output_lines` was copied at.
    output_generation: u64,

    // -------------------------------------------------------------------------
    // UI State
    // -------------------------------------------------------------------------
    /// Show settings dialog.
    pub show_settings: bool,

    /// Status message.
    pub status_message: Option<(String, chrono::DateTime<chrono::Utc>)>,

    /// Pending file dialog result receiver.
    pick_result_rx: Option<(PickTarget, tokio::sync::oneshot::Receiver<Option<PathBuf>>)>,
}

impl PatcherApp {
    /// Create a new application instance.
    pub fn new(cc: &eframe::CreationContext<'_>, runtime: Runtime, db: Database) -> Self {
        info!("Initializing PatcherApp");

        let settings = Settings::load(&db);
        debug!(?settings, "Loaded settings");

        let last_run = db.last_run().unwrap_or_else(|e| {
            warn!("Failed to read run history: {}", e);
            None
        });

        cc.egui_ctx.set_visuals(visuals_for(settings.theme));

        let mut style = (*cc.egui_ctx.style()).clone();
        style.spacing.item_spacing = egui::vec2(8.0, 6.0);
        cc.egui_ctx.set_style(style);

        let patcher = Arc::new(Patcher::new(&settings));

        Self {
            runtime,
            db,
            settings,
            patcher,
            event_rx: None,
            stage: None,
            progress: 0.0,
            download: None,
            last_run,
            output_lines: Vec::new(),
            output_generation: 0,
            show_settings: false,
            status_message: None,
            pick_result_rx: None,
        }
    }

    /// True while a run is in flight.
    pub fn is_patching(&self) -> bool {
        self.event_rx.is_some() || self.patcher.is_running()
    }

    // =========================================================================
    // Patch Run
    // =========================================================================

    /// Start a patch run on the runtime.
    pub fn start_patch(&mut self) {
        if self.is_patching() {
            self.set_status("A patch is already in progress");
            return;
        }

        info!("Starting patch run");
        let (tx, rx) = mpsc::unbounded_channel();
        self.event_rx = Some(rx);
        self.stage = None;
        self.progress = 0.0;
        self.download = None;

        let patcher = Arc::clone(&self.patcher);
        self.runtime.spawn(async move {
            if let Err(e) = patcher.run(tx).await {
                debug!("Patch task ended: {}", e);
            }
        });
    }

    /// Drain events from the active run.
    pub fn process_events(&mut self, ctx: &egui::Context) {
        let Some(mut rx) = self.event_rx.take() else {
            return;
        };

        loop {
            match rx.try_recv() {
                Ok(PatchEvent::StageStarted {
                    stage,
                    index,
                    total,
                }) => {
                    debug!(%stage, index, total, "Stage started");
                    self.stage = Some(stage);
                    self.progress = Stage::fraction(index);
                    self.download = None;
                    ctx.request_repaint();
                }
                Ok(PatchEvent::Download(progress)) => {
                    self.download = Some(progress);
                }
                Ok(PatchEvent::Completed(path)) => {
                    info!(path = %path.display(), "Patch completed");
                    self.progress = 1.0;
                    self.finish_run(true, &path.display().to_string());
                    self.set_status("Patch completed. Please restart the app");
                    return;
                }
                Ok(PatchEvent::Failed(msg)) => {
                    error!(error = %msg, "Patch failed");
                    self.finish_run(false, &msg);
                    self.set_status(&format!("Patch failed: {}", msg));
                    return;
                }
                Err(TryRecvError::Empty) => {
                    self.event_rx = Some(rx);
                    return;
                }
                Err(TryRecvError::Disconnected) => {
                    warn!("Patch task ended without a result");
                    self.stage = None;
                    self.download = None;
                    return;
                }
            }
        }
    }

    fn finish_run(&mut self, succeeded: bool, detail: &str) {
        self.stage = None;
        self.download = None;
        if let Err(e) = self.db.record_run(succeeded, detail) {
            warn!("Failed to record run: {}", e);
        }
        self.last_run = self.db.last_run().ok().flatten();
    }

    /// Copy the output buffer if it changed since the last frame.
    fn sync_output(&mut self) {
        let buffer = output::global();
        let generation = buffer.generation();
        if generation != self.output_generation {
            self.output_lines = ui::patch_panel::split_output(&buffer.snapshot());
            self.output_generation = generation;
        }
    }

    pub fn clear_output(&mut self) {
        if !self.is_patching() {
            output::global().clear();
        }
    }

    // =========================================================================
    // Settings
    // =========================================================================

    /// Set a status message.
    pub fn set_status(&mut self, msg: &str) {
        self.status_message = Some((msg.to_string(), chrono::Utc::now()));
    }

    /// Clear old status messages.
    pub fn clear_old_status(&mut self) {
        if let Some((_, time)) = &self.status_message {
            if chrono::Utc::now() - *time > chrono::Duration::seconds(5) {
                self.status_message = None;
            }
        }
    }

    /// Save settings to the database and rebuild the patcher from them.
    pub fn save_settings(&mut self) {
        self.settings.validate();
        if let Err(e) = self.settings.save(&self.db) {
            error!("Failed to save settings: {}", e);
            self.set_status("Failed to save settings");
            return;
        }

        if self.is_patching() {
            self.set_status("Settings saved; they apply to the next run");
        } else {
            self.patcher = Arc::new(Patcher::new(&self.settings));
            self.set_status("Settings saved");
        }
    }

    /// Discard unsaved edits.
    pub fn reload_settings(&mut self, ctx: &egui::Context) {
        self.settings = Settings::load(&self.db);
        ctx.set_visuals(visuals_for(self.settings.theme));
    }

    /// Resolved path shown next to a picker.
    pub fn display_path(&self, target: PickTarget) -> String {
        let dirs = self.patcher.config();
        let path = match target {
            PickTarget::DownloadDir => Some(dirs.download_dir.clone()),
            PickTarget::BuildDir => Some(dirs.build_dir.clone()),
            PickTarget::InstallPath | PickTarget::UnpackedApp => dirs.install_path.clone(),
            PickTarget::AppImage => dirs.appimage_path.clone(),
        };
        path.map(|p| p.display().to_string())
            .unwrap_or_else(|| "Not set".to_string())
    }

    fn setting_mut(&mut self, target: PickTarget) -> &mut Option<String> {
        match target {
            PickTarget::DownloadDir => &mut self.settings.download_dir,
            PickTarget::BuildDir => &mut self.settings.build_dir,
            PickTarget::InstallPath | PickTarget::UnpackedApp => &mut self.settings.install_path,
            PickTarget::AppImage => &mut self.settings.appimage_path,
        }
    }

    /// Reset one setting to its default.
    pub fn clear_setting(&mut self, target: PickTarget) {
        *self.setting_mut(target) = None;
        self.save_settings();
    }

    /// Open a file or folder dialog asynchronously.
    pub fn open_pick_dialog(&mut self, target: PickTarget) {
        // Don't open another dialog if one is pending
        if self.pick_result_rx.is_some() {
            return;
        }

        let (tx, rx) = tokio::sync::oneshot::channel();
        self.pick_result_rx = Some((target, rx));

        self.runtime.spawn(async move {
            let dialog = rfd::AsyncFileDialog::new().set_title(target.label());
            let picked = match target {
                t if t.picks_folder() => dialog.pick_folder().await,
                PickTarget::AppImage => dialog.add_filter("AppImage", &["AppImage"]).pick_file().await,
                _ => dialog.add_filter("Electron archive", &["asar"]).pick_file().await,
            };
            let _ = tx.send(picked.map(|f| f.path().to_path_buf()));
        });
    }

    /// Check for dialog completion.
    fn check_pick_selection(&mut self) {
        if let Some((target, mut rx)) = self.pick_result_rx.take() {
            match rx.try_recv() {
                Ok(Some(path)) => {
                    info!("{}: {}", target.label(), path.display());
                    *self.setting_mut(target) = Some(path.to_string_lossy().to_string());
                    self.save_settings();
                }
                Ok(None) => {
                    debug!("Selection cancelled");
                }
                Err(tokio::sync::oneshot::error::TryRecvError::Empty) => {
                    self.pick_result_rx = Some((target, rx));
                }
                Err(tokio::sync::oneshot::error::TryRecvError::Closed) => {
                    warn!("Selection channel closed unexpectedly");
                }
            }
        }
    }

    pub fn set_theme(&mut self, theme: Theme, ctx: &egui::Context) {
        self.settings.theme = theme;
        ctx.set_visuals(visuals_for(theme));
    }
}

fn visuals_for(theme: Theme) -> egui::Visuals {
    match theme {
        Theme::Dark => egui::Visuals::dark(),
        Theme::Light => egui::Visuals::light(),
    }
}

impl eframe::App for PatcherApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.check_pick_selection();
        self.process_events(ctx);
        self.sync_output();
        self.clear_old_status();

        egui::TopBottomPanel::top("menu_panel").show(ctx, |ui| {
            ui::menu::render(self, ui, ctx);
        });

        egui::TopBottomPanel::bottom("status_panel")
            .max_height(24.0)
            .show(ctx, |ui| {
                ui::status::render(self, ui);
            });

        if self.show_settings {
            ui::settings::render(self, ctx);
        }

        egui::CentralPanel::default().show(ctx, |ui| {
            ui::patch_panel::render(self, ui);
        });

        if self.is_patching() || self.pick_result_rx.is_some() {
            ctx.request_repaint();
        }
    }
}
