//! The librespot-node addon: sources, patches, build and installation.

pub mod handler;
pub mod install;
pub mod patches;

pub use handler::LibrespotNodeHandler;
pub use install::{replace_addon, InstallTarget};
pub use patches::{patch_bitrate, patch_cargo, patch_session, PatchError};
