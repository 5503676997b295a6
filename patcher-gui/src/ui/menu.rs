//! Top menu bar.

use eframe::egui::{self, RichText};

use crate::app::{PatcherApp, PickTarget};
use crate::ui::colors;
use patcher_core::Theme;

/// Render the top menu bar.
pub fn render(app: &mut PatcherApp, ui: &mut egui::Ui, ctx: &egui::Context) {
    egui::menu::bar(ui, |ui| {
        ui.label(RichText::new("Librespot Patcher").strong().size(15.0));
        ui.separator();

        // File menu
        ui.menu_button("File", |ui| {
            if ui.button("Select app.asar...").clicked() {
                app.open_pick_dialog(PickTarget::InstallPath);
                ui.close_menu();
            }

            if ui.button("Select resources/app folder...").clicked() {
                app.open_pick_dialog(PickTarget::UnpackedApp);
                ui.close_menu();
            }

            if ui.button("Select AppImage...").clicked() {
                app.open_pick_dialog(PickTarget::AppImage);
                ui.close_menu();
            }

            ui.separator();

            if ui
                .add_enabled(!app.is_patching(), egui::Button::new("Clear Output"))
                .clicked()
            {
                app.clear_output();
                ui.close_menu();
            }

            ui.separator();

            if ui.button("Quit").clicked() {
                ctx.send_viewport_cmd(egui::ViewportCommand::Close);
            }
        });

        // Edit menu
        ui.menu_button("Edit", |ui| {
            if ui.button("Settings...").clicked() {
                app.show_settings = true;
                ui.close_menu();
            }
        });

        // View menu
        ui.menu_button("View", |ui| {
            let dark_mode = app.settings.theme == Theme::Dark;

            if ui.checkbox(&mut { dark_mode }, "Dark Mode").changed() {
                let theme = if dark_mode { Theme::Light } else { Theme::Dark };
                app.set_theme(theme, ctx);
                app.save_settings();
            }
        });

        ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
            if let Some(stage) = app.stage {
                ui.label(RichText::new(stage.label()).color(colors::ACCENT).size(12.0));
                ui.spinner();
            }
        });
    });
}
