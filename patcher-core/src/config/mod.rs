//! Configuration module for Librespot Patcher.
//!
//! Manages application settings stored in SQLite.

mod settings;

pub use settings::{ResolvedDirs, Settings, Theme};
