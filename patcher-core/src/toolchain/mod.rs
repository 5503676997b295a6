//! Toolchain provisioning.
//!
//! The build needs git, cargo and yarn. Each is located on the system (or in
//! a previous private install) and otherwise downloaded, verified, extracted
//! and located again.
//!
//! # Architecture
//!
//! - `types`: Core types (ToolId, Platform, ArchiveFormat, Checksum, ...)
//! - `paths`: Data-folder path resolution
//! - `checksum`: SHA-256 verification of cached files
//! - `downloader`: Async file download with redirects and progress reporting
//! - `extractor`: Archive extraction (zip, tar.gz)
//! - `process`: Subprocess exec/spawn/elevation helpers
//! - `manifest`: JSON persistence of provisioned toolchains
//! - `provisioner`: The locate-or-install trait and shared context
//! - `git`, `rust`, `yarn`: The three provisioners
//!
//! # Example
//!
//! ```ignore
//! use patcher_core::toolchain::{GitProvisioner, Platform, ProvisionContext, Provisioner};
//!
//! let ctx = ProvisionContext::new(Platform::detect(), download_dir);
//! let git = GitProvisioner::new(ctx).provision(&|progress| {
//!     if let Some(percent) = progress.percent {
//!         println!("Progress: {:.1}%", percent);
//!     }
//! }).await?;
//! ```

pub mod checksum;
pub mod downloader;
pub mod extractor;
pub mod git;
pub mod manifest;
pub mod paths;
pub mod process;
pub mod provisioner;
pub mod rust;
pub mod types;
pub mod yarn;

pub use checksum::{check_file, sha256_file};
pub use downloader::{download_file, DownloadProgress};
pub use extractor::{extract_archive, make_executable};
pub use git::{hash_from_body, GitProvisioner};
pub use manifest::{InstalledToolInfo, ToolsManifest};
pub use process::{exec, spawn_logged, sudo_exec, which, CommandSpec, ExecOutput};
pub use provisioner::{ProgressFn, ProvisionContext, Provisioner};
pub use rust::RustProvisioner;
pub use types::{ArchiveFormat, CargoToolchain, Checksum, Pin, Platform, ToolId, YarnExec};
pub use yarn::YarnProvisioner;
