use egui::RichText;

/// Typeset output region.
///
/// Boundary contract: given a markup string (possibly empty) and a display-mode
/// flag, either clear any previously displayed output (empty string) or show a
/// best-effort rendering of the markup. Malformed markup is displayed as-is
/// rather than raising a user-visible fault, and every invocation fully
/// replaces the previous output.
#[derive(Default)]
pub struct TypesetView;

impl TypesetView {
    pub fn render(&self, ui: &mut egui::Ui, markup: &str, display_mode: bool) {
        if markup.is_empty() {
            // Blank display: the output region simply stays empty this frame.
            return;
        }
        let size = if display_mode { 36.0 } else { 20.0 };
        let text = RichText::new(markup).monospace().size(size);
        if display_mode {
            ui.vertical_centered(|ui| {
                ui.add_space(24.0);
                ui.label(text);
            });
        } else {
            ui.label(text);
        }
    }
}
