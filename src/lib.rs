#![warn(clippy::all, rust_2018_idioms)]

pub mod app;
pub mod config;
pub mod pad;
pub mod renderer;
pub mod session;

pub use app::MathInkApp;
pub use config::{ConfigError, SessionConfig};
pub use pad::{ButtonState, PadController, PadOptions, PadState, KEEP_ALIVE_INTERVAL};
pub use renderer::TypesetView;
pub use session::{InkStroke, Session, SessionError, SessionEvent, CLOSED_MARKER, LATEX_MIME};
