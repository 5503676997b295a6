//! Librespot Patcher GUI Application
//!
//! Rebuilds the librespot-node addon of an installed media player with a
//! patched librespot and swaps it in.

mod app;
mod ui;

use std::path::PathBuf;

use anyhow::Context;
use eframe::egui;
use patcher_core::Database;

fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("patcher=debug".parse()?)
                .add_directive("patcher_core=debug".parse()?)
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    tracing::info!("Starting Librespot Patcher v{}", patcher_core::VERSION);

    let db = open_database()?;

    // Create tokio runtime for async operations
    let runtime = tokio::runtime::Runtime::new().context("Failed to create tokio runtime")?;

    // Window configuration
    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([900.0, 650.0])
            .with_min_inner_size([640.0, 480.0])
            .with_title("Librespot Patcher"),
        renderer: eframe::Renderer::Glow,
        ..Default::default()
    };

    // Run the application
    eframe::run_native(
        "Librespot Patcher",
        options,
        Box::new(|cc| Ok(Box::new(app::PatcherApp::new(cc, runtime, db)))),
    )
    .map_err(|e| anyhow::anyhow!("Failed to start the window: {e}"))
}

/// Open the settings database, falling back to an in-memory one.
fn open_database() -> anyhow::Result<Database> {
    let db = match Database::open() {
        Ok(db) => db,
        Err(e) => {
            tracing::error!("Failed to open database: {}", e);
            Database::open_at(PathBuf::from(":memory:"))
                .context("Failed to create in-memory database")?
        }
    };

    if let Err(e) = db.migrate() {
        tracing::error!("Failed to migrate database: {}", e);
    }
    Ok(db)
}
