mod controller;
mod panel;

pub use controller::{ButtonState, PadController, PadOptions, PadState, SessionFactory, KEEP_ALIVE_INTERVAL};
pub use panel::PadPanel;
