//! Stages, progress events and errors of a patch run.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

use crate::toolchain::downloader::DownloadProgress;

/// One step of the fixed patch sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    ProvisionGit,
    ProvisionRust,
    ProvisionYarn,
    CloneSources,
    PatchSources,
    Compile,
    ReplaceAddon,
}

impl Stage {
    /// All stages in execution order.
    pub fn all() -> &'static [Stage] {
        &[
            Self::ProvisionGit,
            Self::ProvisionRust,
            Self::ProvisionYarn,
            Self::CloneSources,
            Self::PatchSources,
            Self::Compile,
            Self::ReplaceAddon,
        ]
    }

    pub fn total() -> usize {
        Self::all().len()
    }

    /// Position in [`Stage::all`].
    pub fn index(&self) -> usize {
        Self::all().iter().position(|s| s == self).unwrap_or(0)
    }

    /// Fraction of the run completed once `index` stages have finished.
    pub fn fraction(index: usize) -> f32 {
        (index.min(Self::total()) as f32) / (Self::total() as f32)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::ProvisionGit => "Setting up git",
            Self::ProvisionRust => "Setting up rust",
            Self::ProvisionYarn => "Setting up yarn",
            Self::CloneSources => "Cloning sources",
            Self::PatchSources => "Patching sources",
            Self::Compile => "Compiling librespot-node",
            Self::ReplaceAddon => "Replacing addon",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Progress reported while a run is in flight.
#[derive(Debug, Clone, PartialEq)]
pub enum PatchEvent {
    StageStarted {
        stage: Stage,
        index: usize,
        total: usize,
    },
    Download(DownloadProgress),
    /// The run finished; carries the replaced path.
    Completed(PathBuf),
    Failed(String),
}

/// Reasons a run stops.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("A patch is already in progress")]
    AlreadyRunning,

    #[error("Unsupported platform: only Linux and Windows can be patched")]
    UnsupportedPlatform,

    #[error("Install path of the host application is not set")]
    MissingInstallPath,

    #[error("{stage} failed: {message}")]
    Stage { stage: Stage, message: String },
}

impl PipelineError {
    /// Wraps a stage failure, keeping the whole context chain.
    pub fn stage(stage: Stage, err: anyhow::Error) -> Self {
        Self::Stage {
            stage,
            message: format!("{:#}", err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_order() {
        assert_eq!(Stage::total(), 7);
        assert_eq!(Stage::all()[0], Stage::ProvisionGit);
        assert_eq!(Stage::all()[6], Stage::ReplaceAddon);
        assert_eq!(Stage::Compile.index(), 5);
    }

    #[test]
    fn test_stage_fraction_bounds() {
        assert_eq!(Stage::fraction(0), 0.0);
        assert_eq!(Stage::fraction(7), 1.0);
        assert_eq!(Stage::fraction(42), 1.0);
        let mid = Stage::fraction(Stage::PatchSources.index());
        assert!(mid > 0.0 && mid < 1.0);
    }

    #[test]
    fn test_stage_error_keeps_context() {
        let err = anyhow::anyhow!("exit code 128").context("Failed to clone librespot");
        let wrapped = PipelineError::stage(Stage::CloneSources, err);
        assert_eq!(
            wrapped.to_string(),
            "Cloning sources failed: Failed to clone librespot: exit code 128"
        );
    }
}
