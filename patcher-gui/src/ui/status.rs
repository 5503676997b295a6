//! Status bar at the bottom of the window.

use eframe::egui::{self, RichText};

use crate::app::PatcherApp;
use crate::ui::colors;

/// Render the status bar.
pub fn render(app: &PatcherApp, ui: &mut egui::Ui) {
    let muted = colors::muted(ui.visuals());

    ui.horizontal(|ui| {
        // Status message
        if let Some((msg, _)) = &app.status_message {
            ui.label(RichText::new(msg).size(11.0).color(muted));
        }

        ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
            ui.label(
                RichText::new(format!("v{}", patcher_core::VERSION))
                    .size(11.0)
                    .color(muted),
            );

            if let Some(run) = &app.last_run {
                ui.separator();
                let (text, color) = if run.succeeded {
                    ("Last patch succeeded", colors::SUCCESS)
                } else {
                    ("Last patch failed", colors::ERROR)
                };
                let when = run
                    .finished_at
                    .with_timezone(&chrono::Local)
                    .format("%Y-%m-%d %H:%M");
                ui.label(
                    RichText::new(format!("{} ({})", text, when))
                        .size(11.0)
                        .color(color),
                )
                .on_hover_text(run.detail.as_str());
            }
        });
    });
}
