//! Main panel: target locations, the patch button, progress and output.

use eframe::egui::{self, RichText, Rounding, Vec2};

use crate::app::{PatcherApp, PickTarget};
use crate::ui::colors;
use patcher_core::{DownloadProgress, Stage};

/// Render the patch panel.
pub fn render(app: &mut PatcherApp, ui: &mut egui::Ui) {
    let muted = colors::muted(ui.visuals());
    let patching = app.is_patching();

    // -------------------------------------------------------------------------
    // Locations
    // -------------------------------------------------------------------------
    egui::Grid::new("patch_locations")
        .num_columns(3)
        .spacing([8.0, 6.0])
        .show(ui, |ui| {
            for target in [
                PickTarget::DownloadDir,
                PickTarget::BuildDir,
                PickTarget::InstallPath,
                PickTarget::AppImage,
            ] {
                ui.label(target.label());
                ui.label(RichText::new(app.display_path(target)).monospace().color(muted));
                ui.horizontal(|ui| {
                    if ui
                        .add_enabled(!patching, egui::Button::new("Browse..."))
                        .clicked()
                    {
                        app.open_pick_dialog(target);
                    }
                    if target == PickTarget::InstallPath
                        && ui
                            .add_enabled(!patching, egui::Button::new("Folder..."))
                            .on_hover_text(PickTarget::UnpackedApp.label())
                            .clicked()
                    {
                        app.open_pick_dialog(PickTarget::UnpackedApp);
                    }
                });
                ui.end_row();
            }
        });

    ui.add_space(8.0);

    // -------------------------------------------------------------------------
    // Action and progress
    // -------------------------------------------------------------------------
    ui.horizontal(|ui| {
        if ui
            .add_enabled(
                !patching,
                egui::Button::new(RichText::new("Patch Librespot").strong().size(14.0))
                    .fill(colors::ACCENT)
                    .rounding(Rounding::same(8.0))
                    .min_size(Vec2::new(160.0, 32.0)),
            )
            .clicked()
        {
            app.start_patch();
        }

        if patching {
            ui.spinner();
        }
    });

    if patching || app.progress > 0.0 {
        let text = match app.stage {
            Some(stage) => format!(
                "{}/{} {}",
                stage.index() + 1,
                Stage::total(),
                stage.label()
            ),
            None if app.progress >= 1.0 => "Done".to_string(),
            None => String::new(),
        };
        ui.add(egui::ProgressBar::new(app.progress).text(text));

        if let Some(progress) = &app.download {
            ui.label(RichText::new(download_text(progress)).size(11.0).color(muted));
        }
    }

    ui.add_space(8.0);

    // -------------------------------------------------------------------------
    // Output
    // -------------------------------------------------------------------------
    egui::Frame::none()
        .fill(colors::code_bg(ui.visuals()))
        .stroke(egui::Stroke::new(1.0, colors::border(ui.visuals())))
        .rounding(Rounding::same(6.0))
        .inner_margin(8.0)
        .show(ui, |ui| {
            ui.set_min_size(ui.available_size());
            if app.output_lines.is_empty() {
                ui.label(RichText::new("No output yet").italics().color(muted));
                return;
            }

            // Only the visible rows are laid out; build logs run to thousands of lines.
            let row_height = ui.text_style_height(&egui::TextStyle::Monospace);
            egui::ScrollArea::both()
                .auto_shrink([false, false])
                .stick_to_bottom(true)
                .show_rows(ui, row_height, app.output_lines.len(), |ui, rows| {
                    for line in &app.output_lines[rows] {
                        render_line(ui, line);
                    }
                });
        });
}

/// Splits the output buffer into display rows, dropping blank lines.
pub fn split_output(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim_end)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// Headings start with `###`; everything else is plain log output.
///
/// Rows never wrap so every row keeps the height `show_rows` assumes.
fn render_line(ui: &mut egui::Ui, line: &str) {
    let text = match line.strip_prefix("###") {
        Some(heading) => RichText::new(heading.trim()).monospace().strong(),
        None => RichText::new(line).monospace(),
    };
    ui.add(egui::Label::new(text).wrap_mode(egui::TextWrapMode::Extend));
}

fn download_text(progress: &DownloadProgress) -> String {
    let mb = |bytes: u64| bytes as f64 / (1024.0 * 1024.0);
    match (progress.total_bytes, progress.percent) {
        (Some(total), Some(percent)) => format!(
            "Downloaded {:.1} of {:.1} MiB ({:.0}%)",
            mb(progress.bytes_downloaded),
            mb(total),
            percent
        ),
        _ => format!("Downloaded {:.1} MiB", mb(progress.bytes_downloaded)),
    }
}
