use std::sync::mpsc::{self, Receiver};
use std::time::Duration;

use crate::config::SessionConfig;
use crate::pad::{PadOptions, PadPanel};
use crate::renderer::TypesetView;

const PREFS_KEY: &str = "mathink-prefs";

/// The handful of UI settings worth restoring across runs.
#[derive(serde::Serialize, serde::Deserialize)]
#[serde(default)]
struct Prefs {
    display_mode: bool,
}

impl Default for Prefs {
    fn default() -> Self {
        Self { display_mode: true }
    }
}

/// Page shell: owns the current markup string and composes the typeset view
/// over the drawing pad. The pad reports conversions through a channel; the
/// latest markup wins.
pub struct MathInkApp {
    latex: String,
    display_mode: bool,
    converted: Receiver<String>,
    pad: PadPanel,
    typeset: TypesetView,
}

impl MathInkApp {
    pub fn new(cc: &eframe::CreationContext<'_>, config: SessionConfig) -> Self {
        let prefs: Prefs = cc
            .storage
            .and_then(|storage| eframe::get_value(storage, PREFS_KEY))
            .unwrap_or_default();
        let (on_convert, converted) = mpsc::channel();
        Self {
            latex: String::new(),
            display_mode: prefs.display_mode,
            converted,
            pad: PadPanel::new(config, on_convert, PadOptions::default()),
            typeset: TypesetView,
        }
    }
}

impl eframe::App for MathInkApp {
    fn save(&mut self, storage: &mut dyn eframe::Storage) {
        eframe::set_value(storage, PREFS_KEY, &Prefs { display_mode: self.display_mode });
    }

    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        while let Ok(markup) = self.converted.try_recv() {
            self.latex = markup;
        }

        egui::TopBottomPanel::bottom("hand-writing-pad")
            .exact_height(300.0)
            .show(ctx, |ui| {
                self.pad.show(ui);
            });

        egui::CentralPanel::default().show(ctx, |ui| {
            ui.checkbox(&mut self.display_mode, "display mode");
            self.typeset.render(ui, &self.latex, self.display_mode);
        });

        // Session events arrive between frames; keep pumping the controller.
        ctx.request_repaint_after(Duration::from_millis(100));
    }

    fn on_exit(&mut self, _gl: Option<&eframe::glow::Context>) {
        self.pad.dispose();
    }
}
