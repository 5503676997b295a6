//! Core types for toolchain provisioning.
//!
//! This module defines the foundational types shared by the provisioners:
//! tool identifiers, platform detection, archive formats, checksums and the
//! located executables handed to the build step.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

// ============================================================================
// Tool Identifiers
// ============================================================================

/// Identifier for each provisioned toolchain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolId {
    /// Git, used to clone the sources.
    Git,
    /// Rust toolchain installed through rustup.
    Rust,
    /// Yarn, drives the native addon build.
    Yarn,
}

impl ToolId {
    /// Returns the lowercase string identifier for this tool.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Git => "git",
            Self::Rust => "rust",
            Self::Yarn => "yarn",
        }
    }
}

impl fmt::Display for ToolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Platform Detection
// ============================================================================

/// Operating systems the patcher knows how to provision for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Platform {
    Linux,
    Windows,
    Unsupported,
}

impl Platform {
    /// Detects the current platform at compile time.
    pub fn detect() -> Self {
        if cfg!(target_os = "linux") {
            Platform::Linux
        } else if cfg!(target_os = "windows") {
            Platform::Windows
        } else {
            Platform::Unsupported
        }
    }

    pub fn is_supported(&self) -> bool {
        !matches!(self, Self::Unsupported)
    }

    /// Appends `.exe` on Windows.
    pub fn exe_name(&self, name: &str) -> String {
        match self {
            Self::Windows => format!("{}.exe", name),
            _ => name.to_string(),
        }
    }

    /// Returns a human-readable description of the platform.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Linux => "Linux",
            Self::Windows => "Windows",
            Self::Unsupported => "Unsupported",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

// ============================================================================
// Archives and Checksums
// ============================================================================

/// Archive format of a downloaded toolchain package.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArchiveFormat {
    /// Gzip-compressed tar archive (.tar.gz, .tgz)
    TarGz,
    /// ZIP archive (.zip)
    Zip,
}

impl ArchiveFormat {
    /// Infers the archive format from a URL or filename.
    pub fn from_path(path: &str) -> Option<Self> {
        let lower = path.to_lowercase();
        if lower.ends_with(".tar.gz") || lower.ends_with(".tgz") {
            Some(Self::TarGz)
        } else if lower.ends_with(".zip") {
            Some(Self::Zip)
        } else {
            None
        }
    }

    /// Strips the archive suffix from a file name.
    ///
    /// `git-2.45.0.tar.gz` becomes `git-2.45.0`. Names without a known suffix
    /// only lose their last extension.
    pub fn strip_suffix(file_name: &str) -> String {
        let lower = file_name.to_lowercase();
        for suffix in [".tar.gz", ".tgz", ".zip"] {
            if lower.ends_with(suffix) {
                return file_name[..file_name.len() - suffix.len()].to_string();
            }
        }

        Path::new(file_name)
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| file_name.to_string())
    }
}

/// Expected integrity of a download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Checksum {
    /// SHA-256 as hex (case-insensitive, surrounding whitespace ignored).
    Sha256(String),
    /// No checksum is published for this artifact.
    Unverified,
}

impl Checksum {
    pub fn sha256(hex: impl Into<String>) -> Self {
        Self::Sha256(hex.into())
    }

    /// Returns the expected hex digest, if any.
    pub fn expected(&self) -> Option<&str> {
        match self {
            Self::Sha256(hex) => Some(hex.as_str()),
            Self::Unverified => None,
        }
    }
}

/// How a known SHA-256 applies to a download URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pin<'a> {
    /// The URL serves fixed bytes; a fresh download must match.
    Exact(&'a str),
    /// The URL always serves the latest build; the hash only decides whether
    /// a cached copy can be reused.
    CacheOnly(&'a str),
    /// Nothing is published.
    None,
}

impl<'a> Pin<'a> {
    /// Hash a cached copy must match to be reused.
    pub fn cache_hash(&self) -> Option<&'a str> {
        match *self {
            Self::Exact(hash) | Self::CacheOnly(hash) => Some(hash),
            Self::None => None,
        }
    }
}

impl<'a> From<Option<&'a str>> for Pin<'a> {
    fn from(hash: Option<&'a str>) -> Self {
        hash.map_or(Self::None, Self::Exact)
    }
}

// ============================================================================
// Located Executables
// ============================================================================

/// A cargo executable plus the homes it was installed with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CargoToolchain {
    pub cargo: PathBuf,
    /// `CARGO_HOME` of a private install; `None` inherits the environment.
    pub cargo_home: Option<PathBuf>,
    /// `RUSTUP_HOME` of a private install; `None` inherits the environment.
    pub rustup_home: Option<PathBuf>,
}

impl CargoToolchain {
    /// Directory containing `cargo`, appended to `PATH` for the build.
    pub fn bin_dir(&self) -> Option<&Path> {
        self.cargo.parent()
    }
}

/// How yarn gets invoked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum YarnExec {
    /// A `yarn.js` entry point that has to run under node.
    Script(PathBuf),
    /// A yarn executable found on the system.
    Binary(PathBuf),
}

impl YarnExec {
    pub fn path(&self) -> &Path {
        match self {
            Self::Script(p) | Self::Binary(p) => p,
        }
    }
}
