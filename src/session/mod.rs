use std::collections::HashMap;

use thiserror::Error;

use crate::config::ConfigError;

pub mod protocol;
mod remote;

pub use protocol::{hmac_answer, ClientMessage, InkStroke, ServerMessage};
pub use remote::RemoteSession;

/// The single export format this application accepts from the service.
pub const LATEX_MIME: &str = "application/x-latex";

/// Substring (matched case-insensitively) of an internal-error message that
/// identifies the recoverable "remote session closed" condition.
pub const CLOSED_MARKER: &str = "session closed";

/// Events a recognition session can emit, decoded once at the boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Handshake finished; the session accepts strokes from now on.
    Loaded,
    /// The service produced a recognition result, keyed by MIME type.
    Exported { exports: HashMap<String, String> },
    /// The remote surface content changed.
    Changed { empty: bool, can_undo: bool, can_redo: bool },
    /// A low-level failure. Messages containing [`CLOSED_MARKER`] are
    /// recoverable by rebuilding the session; everything else is logged only.
    InternalError { message: String },
}

impl SessionEvent {
    /// True when this error event indicates the remote session was closed.
    pub fn is_closed_error(&self) -> bool {
        match self {
            Self::InternalError { message } => message.to_ascii_lowercase().contains(CLOSED_MARKER),
            _ => false,
        }
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("connect failed after {attempts} attempt(s): {message}")]
    Connect { attempts: u32, message: String },
    #[error("transport: {0}")]
    Transport(String),
    /// The session's transport thread has already shut down.
    #[error("session closed")]
    Closed,
}

/// The seam between the lifecycle controller and a concrete session.
///
/// Command methods are fire-and-forget from the controller's point of view:
/// completion ordering relative to later UI events is not guaranteed, and the
/// observable effects arrive back through [`Session::poll_events`].
pub trait Session {
    /// Drain every event that arrived since the last poll, in arrival order.
    fn poll_events(&mut self) -> Vec<SessionEvent>;

    /// Submit a batch of captured ink. An empty batch is a keep-alive ping.
    fn add_strokes(&mut self, strokes: &[InkStroke]) -> Result<(), SessionError>;

    fn clear(&mut self) -> Result<(), SessionError>;
    fn undo(&mut self) -> Result<(), SessionError>;
    fn redo(&mut self) -> Result<(), SessionError>;

    /// Request an explicit re-conversion of the accumulated strokes.
    fn convert(&mut self) -> Result<(), SessionError>;

    /// Shut the session down. Must be safe to call more than once.
    fn close(&mut self);
}
