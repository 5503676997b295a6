//! Settings dialog.

use eframe::egui::{self, RichText, Rounding, Vec2};

use crate::app::{PatcherApp, PickTarget};
use crate::ui::colors;
use patcher_core::Theme;

/// Render the settings dialog.
pub fn render(app: &mut PatcherApp, ctx: &egui::Context) {
    egui::Window::new("Settings")
        .collapsible(false)
        .resizable(false)
        .default_width(480.0)
        .anchor(egui::Align2::CENTER_CENTER, Vec2::ZERO)
        .show(ctx, |ui| {
            let muted = colors::muted(ui.visuals());

            ui.spacing_mut().item_spacing = Vec2::new(8.0, 12.0);

            // -----------------------------------------------------------------
            // Downloads
            // -----------------------------------------------------------------
            ui.heading("Downloads");
            ui.separator();

            ui.checkbox(&mut app.settings.verify_downloads, "Verify downloads");
            ui.label(
                RichText::new(
                    "Checks git, rustup and yarn against their published SHA-256. \
                     Turning this off also allows downloads that have none.",
                )
                .size(11.0)
                .color(muted)
                .italics(),
            );

            // -----------------------------------------------------------------
            // Locations
            // -----------------------------------------------------------------
            ui.add_space(8.0);
            ui.heading("Locations");
            ui.separator();

            egui::Grid::new("settings_locations")
                .num_columns(3)
                .spacing([8.0, 8.0])
                .show(ui, |ui| {
                    for target in [
                        PickTarget::DownloadDir,
                        PickTarget::BuildDir,
                        PickTarget::InstallPath,
                        PickTarget::AppImage,
                    ] {
                        ui.label(target.label());
                        ui.label(RichText::new(app.display_path(target)).size(11.0).color(muted));
                        if ui.small_button("Reset").clicked() {
                            app.clear_setting(target);
                        }
                        ui.end_row();
                    }
                });

            // -----------------------------------------------------------------
            // Appearance
            // -----------------------------------------------------------------
            ui.add_space(8.0);
            ui.heading("Appearance");
            ui.separator();

            ui.horizontal(|ui| {
                ui.label("Theme:");
                for &theme in Theme::all() {
                    if ui
                        .selectable_label(app.settings.theme == theme, theme.to_string())
                        .clicked()
                    {
                        app.set_theme(theme, ctx);
                    }
                }
            });

            // -----------------------------------------------------------------
            // Footer
            // -----------------------------------------------------------------
            ui.add_space(16.0);
            ui.separator();

            ui.horizontal(|ui| {
                if ui
                    .add_sized(
                        Vec2::new(100.0, 30.0),
                        egui::Button::new(RichText::new("Save").strong())
                            .fill(colors::ACCENT)
                            .rounding(Rounding::same(8.0)),
                    )
                    .clicked()
                {
                    app.save_settings();
                    app.show_settings = false;
                }

                if ui
                    .add_sized(
                        Vec2::new(100.0, 30.0),
                        egui::Button::new("Cancel").rounding(Rounding::same(8.0)),
                    )
                    .clicked()
                {
                    app.reload_settings(ctx);
                    app.show_settings = false;
                }
            });
        });
}
