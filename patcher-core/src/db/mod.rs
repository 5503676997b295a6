//! SQLite database layer for Librespot Patcher.
//!
//! Provides persistent storage for:
//! - Settings (directory preferences)
//! - Patch run history (outcome of each finished run)

mod migrations;

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use std::path::PathBuf;

/// One finished patch run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchRun {
    pub succeeded: bool,
    /// Replaced path on success, error message on failure.
    pub detail: String,
    pub finished_at: DateTime<Utc>,
}

/// Database connection wrapper.
///
/// Provides a high-level API for interacting with the SQLite database.
pub struct Database {
    conn: Connection,
    path: PathBuf,
}

impl Database {
    /// Open the database at the default location.
    ///
    /// Default path: `~/.local/share/librespot-patcher/patcher.db`
    pub fn open() -> anyhow::Result<Self> {
        let path = Self::default_path()?;
        Self::open_at(path)
    }

    /// Open the database at a specific path.
    ///
    /// Creates parent directories if they don't exist.
    pub fn open_at(path: PathBuf) -> anyhow::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(&path)?;
        tracing::debug!(path = %path.display(), "Opened database");

        Ok(Self { conn, path })
    }

    /// Get the default database path.
    ///
    /// Returns `~/.local/share/librespot-patcher/patcher.db` (or platform equivalent).
    pub fn default_path() -> anyhow::Result<PathBuf> {
        let data_dir = dirs::data_dir()
            .or_else(|| dirs::home_dir().map(|h| h.join(".local/share")))
            .ok_or_else(|| anyhow::anyhow!("Could not determine data directory"))?;

        Ok(data_dir.join("librespot-patcher").join("patcher.db"))
    }

    /// Run database migrations.
    ///
    /// Safe to call multiple times - migrations are tracked and only run once.
    pub fn migrate(&self) -> anyhow::Result<()> {
        migrations::run_migrations(&self.conn)?;
        Ok(())
    }

    /// Get the database file path.
    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    // =========================================================================
    // Settings Storage
    // =========================================================================

    /// Save a setting to the database (upsert).
    pub fn set_setting(&self, key: &str, value: &str) -> Result<(), rusqlite::Error> {
        self.conn.execute(
            "INSERT INTO settings (key, value, updated_at) VALUES (?, ?, unixepoch())
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            [key, value],
        )?;
        Ok(())
    }

    /// Get a setting from the database.
    ///
    /// Returns `None` if the setting doesn't exist.
    pub fn get_setting(&self, key: &str) -> Result<Option<String>, rusqlite::Error> {
        let mut stmt = self
            .conn
            .prepare("SELECT value FROM settings WHERE key = ?")?;
        let result = stmt.query_row([key], |row| row.get(0));
        match result {
            Ok(value) => Ok(Some(value)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e),
        }
    }

    // =========================================================================
    // Patch Run History
    // =========================================================================

    pub fn record_run(&self, succeeded: bool, detail: &str) -> Result<(), rusqlite::Error> {
        self.conn.execute(
            "INSERT INTO patch_runs (succeeded, detail) VALUES (?, ?)",
            rusqlite::params![succeeded, detail],
        )?;
        Ok(())
    }

    /// Most recent run, if any.
    pub fn last_run(&self) -> Result<Option<PatchRun>, rusqlite::Error> {
        let result = self.conn.query_row(
            "SELECT succeeded, detail, finished_at FROM patch_runs ORDER BY id DESC LIMIT 1",
            [],
            |row| {
                let finished_at: i64 = row.get(2)?;
                Ok(PatchRun {
                    succeeded: row.get(0)?,
                    detail: row.get(1)?,
                    finished_at: DateTime::from_timestamp(finished_at, 0).unwrap_or_default(),
                })
            },
        );
        match result {
            Ok(run) => Ok(Some(run)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
