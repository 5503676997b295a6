//! Toolchain manifest persistence.
//!
//! `manifest.json` remembers which toolchains were provisioned and where their
//! executables ended up, so a later run can locate them without downloading
//! again.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::types::ToolId;

/// Current schema version for the manifest file.
const SCHEMA_VERSION: u32 = 1;

// ============================================================================
// Manifest Data Structures
// ============================================================================

/// Information about a single provisioned toolchain.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InstalledToolInfo {
    /// Installed version string.
    pub version: String,
    /// Absolute path of the located executable.
    pub executable: PathBuf,
    /// When the toolchain was provisioned.
    pub installed_at: DateTime<Utc>,
}

/// Root structure for the manifest file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsManifest {
    /// Schema version for forward compatibility.
    pub schema_version: u32,
    /// Map of tool ID to installation info.
    #[serde(default)]
    pub tools: HashMap<String, InstalledToolInfo>,
}

impl Default for ToolsManifest {
    fn default() -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            tools: HashMap::new(),
        }
    }
}

impl ToolsManifest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_tool(&self, tool_id: ToolId) -> Option<&InstalledToolInfo> {
        self.tools.get(tool_id.as_str())
    }

    /// Returns the recorded executable if it still exists on disk.
    pub fn existing_executable(&self, tool_id: ToolId) -> Option<&Path> {
        self.get_tool(tool_id)
            .map(|info| info.executable.as_path())
            .filter(|p| p.exists())
    }

    /// Records a toolchain as provisioned.
    pub fn mark_installed(&mut self, tool_id: ToolId, version: String, executable: PathBuf) {
        let info = InstalledToolInfo {
            version,
            executable,
            installed_at: Utc::now(),
        };
        self.tools.insert(tool_id.as_str().to_string(), info);
    }
}

// ============================================================================
// Manifest Persistence
// ============================================================================

/// Loads the manifest from a specific path.
///
/// A missing file yields an empty manifest. A corrupted file is logged and
/// also yields an empty manifest; it will be overwritten on the next save.
pub fn load_manifest_from(path: &Path) -> Result<ToolsManifest> {
    if !path.exists() {
        debug!("Manifest not found at {}, creating new", path.display());
        return Ok(ToolsManifest::new());
    }

    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read manifest from {}", path.display()))?;

    match serde_json::from_str::<ToolsManifest>(&content) {
        Ok(mut manifest) => {
            if manifest.schema_version != SCHEMA_VERSION {
                info!(
                    "Manifest schema version {} differs from current {}, migrating",
                    manifest.schema_version, SCHEMA_VERSION
                );
                manifest.schema_version = SCHEMA_VERSION;
            }
            Ok(manifest)
        }
        Err(e) => {
            warn!(
                "Failed to parse manifest at {}: {}. Starting fresh.",
                path.display(),
                e
            );
            Ok(ToolsManifest::new())
        }
    }
}

/// Saves the manifest to a specific path, creating parent directories.
pub fn save_manifest_to(manifest: &ToolsManifest, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }

    let content =
        serde_json::to_string_pretty(manifest).context("Failed to serialize manifest")?;

    fs::write(path, content)
        .with_context(|| format!("Failed to write manifest to {}", path.display()))?;

    debug!("Manifest saved to {}", path.display());
    Ok(())
}
