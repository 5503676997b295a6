//! Application settings for Librespot Patcher.
//!
//! Settings are persisted to the SQLite database as JSON.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::toolchain::paths;

/// Database key the settings JSON is stored under.
const SETTINGS_KEY: &str = "settings";

// =============================================================================
// Theme Selection
// =============================================================================

/// App theme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Theme {
    #[default]
    Dark,
    Light,
}

impl Theme {
    /// Get all available themes.
    pub fn all() -> &'static [Theme] {
        &[Self::Dark, Self::Light]
    }
}

impl std::fmt::Display for Theme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Dark => write!(f, "Dark"),
            Self::Light => write!(f, "Light"),
        }
    }
}

// =============================================================================
// Application Settings
// =============================================================================

/// Application settings - persisted to database as JSON.
///
/// Every directory is optional; an unset (or empty) value falls back to the
/// default layout under the data directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Dependency download directory.
    #[serde(default)]
    pub download_dir: Option<String>,

    /// Librespot build dir.
    #[serde(default)]
    pub build_dir: Option<String>,

    /// Host application's `resources/app.asar` (or unpacked `resources/app`).
    #[serde(default)]
    pub install_path: Option<String>,

    /// Host AppImage to repack instead of patching in place.
    #[serde(default)]
    pub appimage_path: Option<String>,

    /// Check downloads against their published SHA-256.
    #[serde(default = "default_verify_downloads")]
    pub verify_downloads: bool,

    /// UI theme.
    #[serde(default)]
    pub theme: Theme,
}

fn default_verify_downloads() -> bool {
    true
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            download_dir: None,
            build_dir: None,
            install_path: None,
            appimage_path: None,
            verify_downloads: default_verify_downloads(),
            theme: Theme::default(),
        }
    }
}

/// Settings with every directory filled in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedDirs {
    pub download_dir: PathBuf,
    pub build_dir: PathBuf,
    /// `None` until the user picks the host installation.
    pub install_path: Option<PathBuf>,
    pub appimage_path: Option<PathBuf>,
}

impl Settings {
    /// Load settings from database, using defaults for missing values.
    ///
    /// If settings don't exist or can't be parsed, returns defaults.
    pub fn load(db: &crate::db::Database) -> Self {
        let mut settings = Self::default();

        if let Ok(Some(json)) = db.get_setting(SETTINGS_KEY) {
            match serde_json::from_str::<Settings>(&json) {
                Ok(loaded) => settings = loaded,
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to parse settings, using defaults");
                }
            }
        }

        settings.validate();
        settings
    }

    /// Save settings to database.
    pub fn save(&self, db: &crate::db::Database) -> anyhow::Result<()> {
        let json = serde_json::to_string(self)?;
        db.set_setting(SETTINGS_KEY, &json)?;
        Ok(())
    }

    /// Trims paths and turns empty strings into `None`.
    pub fn validate(&mut self) {
        for field in [
            &mut self.download_dir,
            &mut self.build_dir,
            &mut self.install_path,
            &mut self.appimage_path,
        ] {
            *field = non_empty(field.as_deref()).map(str::to_string);
        }
    }

    /// Fills unset directories from the defaults.
    pub fn resolve_dirs(&self) -> ResolvedDirs {
        ResolvedDirs {
            download_dir: non_empty(self.download_dir.as_deref())
                .map(PathBuf::from)
                .unwrap_or_else(paths::get_download_dir),
            build_dir: non_empty(self.build_dir.as_deref())
                .map(PathBuf::from)
                .unwrap_or_else(paths::get_build_dir),
            install_path: non_empty(self.install_path.as_deref()).map(PathBuf::from),
            appimage_path: non_empty(self.appimage_path.as_deref()).map(PathBuf::from),
        }
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|s| !s.is_empty())
}
