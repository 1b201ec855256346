use std::sync::mpsc::Sender;
use std::time::Instant;

use egui::{Color32, Pos2, Rounding, Sense, Shape};
use uuid::Uuid;

use super::controller::{PadController, PadOptions};
use crate::config::SessionConfig;
use crate::session::{InkStroke, RemoteSession};

const SURFACE_FILL: Color32 = Color32::from_rgb(241, 245, 249);
const GRID_DOT: Color32 = Color32::from_rgb(175, 189, 196);
const GRID_SPACING: f32 = 17.0;
const INK_COLOR: Color32 = Color32::from_rgb(30, 41, 59);
const INK_WIDTH: f32 = 2.0;

// A stroke while the pointer is still down.
struct PendingStroke {
    points: Vec<Pos2>,
    times: Vec<u64>,
}

impl PendingStroke {
    fn starting_at(pos: Pos2, time_ms: u64) -> Self {
        Self {
            points: vec![pos],
            times: vec![time_ms],
        }
    }

    fn push(&mut self, pos: Pos2, time_ms: u64) {
        self.points.push(pos);
        self.times.push(time_ms);
    }

    fn to_ink(&self) -> InkStroke {
        InkStroke {
            id: Uuid::new_v4(),
            x: self.points.iter().map(|p| p.x).collect(),
            y: self.points.iter().map(|p| p.y).collect(),
            t: self.times.clone(),
            p: vec![0.5; self.points.len()],
        }
    }
}

/// The drawing surface plus its three control buttons.
///
/// Owns the lifecycle controller. The ink kept here is display-only; the
/// recognition history lives on the server, so button enablement comes from
/// the controller's `Changed`-derived flags, never from the local stroke list.
pub struct PadPanel {
    controller: PadController<RemoteSession>,
    strokes: Vec<Vec<Pos2>>,
    undone: Vec<Vec<Pos2>>,
    pending: Option<PendingStroke>,
    mounted: bool,
}

impl PadPanel {
    pub fn new(config: SessionConfig, on_convert: Sender<String>, options: PadOptions) -> Self {
        let factory = Box::new(move || RemoteSession::connect(&config));
        Self {
            controller: PadController::new(factory, on_convert, options),
            strokes: Vec::new(),
            undone: Vec::new(),
            pending: None,
            mounted: false,
        }
    }

    pub fn show(&mut self, ui: &mut egui::Ui) {
        let now = Instant::now();

        // Mount: initialize once the surface and its controls exist. A failed
        // initialization is not retried.
        if !self.mounted {
            self.mounted = true;
            self.controller.initialize(now);
        }
        self.controller.tick(now);

        if self.controller.take_remote_cleared() {
            self.strokes.clear();
            self.undone.clear();
            self.pending = None;
        }

        if let Some(message) = self.controller.init_error().map(str::to_owned) {
            ui.colored_label(
                Color32::from_rgb(220, 80, 80),
                format!("Handwriting recognition unavailable: {message}"),
            );
        }

        self.controls(ui);
        self.surface(ui);
    }

    pub fn dispose(&mut self) {
        self.controller.dispose();
    }

    fn controls(&mut self, ui: &mut egui::Ui) {
        let buttons = self.controller.buttons();
        ui.horizontal(|ui| {
            if ui
                .add_enabled(!buttons.undo_disabled, egui::Button::new("undo"))
                .clicked()
            {
                self.controller.undo();
                if let Some(stroke) = self.strokes.pop() {
                    self.undone.push(stroke);
                }
            }
            if ui
                .add_enabled(!buttons.redo_disabled, egui::Button::new("redo"))
                .clicked()
            {
                self.controller.redo();
                if let Some(stroke) = self.undone.pop() {
                    self.strokes.push(stroke);
                }
            }
            if ui
                .add_enabled(!buttons.clear_disabled, egui::Button::new("clear"))
                .clicked()
            {
                self.controller.clear();
                self.strokes.clear();
                self.undone.clear();
                self.pending = None;
            }
        });
    }

    fn surface(&mut self, ui: &mut egui::Ui) {
        let size = ui.available_size();
        let (response, painter) = ui.allocate_painter(size, Sense::drag());
        let rect = response.rect;

        painter.rect_filled(rect, Rounding::same(12.0), SURFACE_FILL);

        // Dot grid, graph-paper style.
        let mut y = rect.top() + GRID_SPACING;
        while y < rect.bottom() {
            let mut x = rect.left() + GRID_SPACING;
            while x < rect.right() {
                painter.circle_filled(Pos2::new(x, y), 1.0, GRID_DOT);
                x += GRID_SPACING;
            }
            y += GRID_SPACING;
        }

        let ink = egui::Stroke::new(INK_WIDTH, INK_COLOR);
        for stroke in &self.strokes {
            painter.add(Shape::line(stroke.clone(), ink));
        }
        if let Some(pending) = &self.pending {
            painter.add(Shape::line(pending.points.clone(), ink));
        }

        let time_ms = (ui.input(|i| i.time) * 1000.0) as u64;
        if response.drag_started() {
            if let Some(pos) = response.interact_pointer_pos() {
                self.pending = Some(PendingStroke::starting_at(pos, time_ms));
                self.undone.clear();
            }
        } else if response.dragged() {
            if let (Some(pending), Some(pos)) = (self.pending.as_mut(), response.interact_pointer_pos()) {
                pending.push(pos, time_ms);
            }
        } else if response.drag_stopped() {
            if let Some(pending) = self.pending.take() {
                if pending.points.len() > 1 {
                    self.controller.submit_strokes(&[pending.to_ink()]);
                    self.strokes.push(pending.points);
                }
            }
        }
    }
}
