//! Lifecycle controller for the drawing pad.
//!
//! Owns the recognition session for the pad's mounted lifetime and translates
//! its events into button-enablement state and an outward conversion channel.
//! The controller is pumped once per frame from the single UI thread; the only
//! effect visible outside it is the channel receiving an updated markup string.

use std::sync::mpsc::Sender;
use std::time::{Duration, Instant};

use crate::session::{InkStroke, Session, SessionError, SessionEvent, LATEX_MIME};

/// Interval of the keep-alive watchdog that stops the remote connection from
/// idling out while the user is thinking.
pub const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(10);

/// The pad's lifecycle, driven by a single transition function so tests can
/// assert on state directly instead of inferring it from side effects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PadState {
    /// No session exists yet; entered again when initialization fails.
    Uninitialized,
    /// Session construction and handshake are in flight.
    Initializing,
    /// Steady state: strokes are accepted and events are handled.
    Ready,
    /// A recoverable error tore the session down; a rebuild is underway.
    Recovering,
    /// Terminal. The session is closed and the watchdog is cancelled.
    Disposed,
}

/// Enablement of the three control buttons, derived entirely from the most
/// recent `Changed` event. When the surface is empty all three are disabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ButtonState {
    pub undo_disabled: bool,
    pub redo_disabled: bool,
    pub clear_disabled: bool,
}

impl Default for ButtonState {
    fn default() -> Self {
        Self::all_disabled()
    }
}

impl ButtonState {
    pub fn all_disabled() -> Self {
        Self {
            undo_disabled: true,
            redo_disabled: true,
            clear_disabled: true,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PadOptions {
    /// When set, every export additionally triggers an explicit convert
    /// request. Off by default; fixed for the controller's lifetime.
    pub auto_convert: bool,
}

/// Builds a fresh session; invoked on initialization and once more per
/// recovery cycle.
pub type SessionFactory<S> = Box<dyn FnMut() -> Result<S, SessionError> + Send>;

pub struct PadController<S: Session> {
    factory: SessionFactory<S>,
    session: Option<S>,
    state: PadState,
    buttons: ButtonState,
    // Capabilities reported by the most recent Changed event.
    can_undo: bool,
    can_redo: bool,
    auto_convert: bool,
    on_convert: Sender<String>,
    last_ping: Option<Instant>,
    init_error: Option<String>,
    remote_cleared: bool,
}

impl<S: Session> PadController<S> {
    pub fn new(factory: SessionFactory<S>, on_convert: Sender<String>, options: PadOptions) -> Self {
        Self {
            factory,
            session: None,
            state: PadState::Uninitialized,
            buttons: ButtonState::all_disabled(),
            can_undo: false,
            can_redo: false,
            auto_convert: options.auto_convert,
            on_convert,
            last_ping: None,
            init_error: None,
            remote_cleared: false,
        }
    }

    pub fn state(&self) -> PadState {
        self.state
    }

    pub fn buttons(&self) -> ButtonState {
        self.buttons
    }

    /// Last initialization failure, for the visible error banner.
    pub fn init_error(&self) -> Option<&str> {
        self.init_error.as_deref()
    }

    /// Construct the session. Failure is logged and leaves the controller
    /// non-functional (back in `Uninitialized`) with no automatic retry.
    pub fn initialize(&mut self, now: Instant) {
        if self.state == PadState::Disposed {
            return;
        }
        self.transition(PadState::Initializing);
        match (self.factory)() {
            Ok(session) => {
                self.session = Some(session);
                self.last_ping = Some(now);
                self.init_error = None;
            }
            Err(err) => {
                log::error!("session initialization failed: {err}");
                self.init_error = Some(err.to_string());
                self.session = None;
                self.transition(PadState::Uninitialized);
            }
        }
    }

    /// Pump session events and the keep-alive watchdog. Called once per frame.
    pub fn tick(&mut self, now: Instant) {
        if self.state == PadState::Disposed {
            return;
        }
        let events = match self.session.as_mut() {
            Some(session) => session.poll_events(),
            None => Vec::new(),
        };
        for event in events {
            let torn_down = self.handle_event(event, now);
            if torn_down {
                // Remaining drained events came from the torn-down session.
                break;
            }
        }
        self.keep_alive(now);
    }

    /// Returns true when the event tore the session down.
    fn handle_event(&mut self, event: SessionEvent, now: Instant) -> bool {
        let closed = event.is_closed_error();
        match event {
            SessionEvent::Loaded => {
                if self.state == PadState::Initializing {
                    self.transition(PadState::Ready);
                }
            }
            SessionEvent::Exported { exports } => {
                if let Some(latex) = exports.get(LATEX_MIME) {
                    self.emit(latex.clone());
                    if self.auto_convert {
                        if let Some(session) = self.session.as_mut() {
                            if let Err(err) = session.convert() {
                                log::warn!("convert request failed: {err}");
                            }
                        }
                    }
                }
            }
            SessionEvent::Changed { empty, can_undo, can_redo } => {
                if empty {
                    self.can_undo = false;
                    self.can_redo = false;
                    self.buttons = ButtonState::all_disabled();
                    self.remote_cleared = true;
                    self.emit(String::new());
                } else {
                    self.can_undo = can_undo;
                    self.can_redo = can_redo;
                    self.buttons = ButtonState {
                        undo_disabled: !can_undo,
                        redo_disabled: !can_redo,
                        // Clear is only meaningful when there is history to clear.
                        clear_disabled: !can_undo,
                    };
                }
            }
            SessionEvent::InternalError { message } => {
                if self.state == PadState::Initializing {
                    // The session died during construction or handshake: an
                    // initialization failure, not a recoverable drop.
                    log::error!("session initialization failed: {message}");
                    self.init_error = Some(message);
                    if let Some(mut session) = self.session.take() {
                        session.close();
                    }
                    self.last_ping = None;
                    self.transition(PadState::Uninitialized);
                    return true;
                }
                if closed {
                    log::warn!("recognition session closed, rebuilding: {message}");
                    self.recover(now);
                    return true;
                }
                log::error!("recognition session error: {message}");
            }
        }
        false
    }

    /// Tear the session fully down, then construct a replacement. Exactly one
    /// rebuild per closed-session error; a failed rebuild is logged by
    /// `initialize` and not retried.
    fn recover(&mut self, now: Instant) {
        self.transition(PadState::Recovering);
        if let Some(mut session) = self.session.take() {
            session.close();
        }
        self.last_ping = None;
        self.initialize(now);
    }

    fn keep_alive(&mut self, now: Instant) {
        if self.state != PadState::Ready {
            return;
        }
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let due = self
            .last_ping
            .is_none_or(|at| now.duration_since(at) >= KEEP_ALIVE_INTERVAL);
        if due {
            // An empty input batch keeps the remote connection warm.
            if let Err(err) = session.add_strokes(&[]) {
                log::warn!("keep-alive ping failed: {err}");
            }
            self.last_ping = Some(now);
        }
    }

    /// Forward captured ink to the session. Ignored outside `Ready`;
    /// degenerate (pointless) strokes are dropped from the batch.
    pub fn submit_strokes(&mut self, strokes: &[InkStroke]) {
        if self.state != PadState::Ready {
            return;
        }
        let strokes: Vec<InkStroke> = strokes
            .iter()
            .filter(|stroke| !stroke.is_empty())
            .cloned()
            .collect();
        if strokes.is_empty() {
            return;
        }
        if let Some(session) = self.session.as_mut() {
            if let Err(err) = session.add_strokes(&strokes) {
                log::warn!("stroke submission failed: {err}");
            }
        }
    }

    /// Clear the surface. The blank markup is forwarded immediately rather
    /// than waiting for the `Changed` round-trip, so the displayed expression
    /// is blanked even if that event is delayed or dropped. Idempotent.
    pub fn clear(&mut self) {
        if let Some(session) = self.session.as_mut() {
            if let Err(err) = session.clear() {
                log::warn!("clear request failed: {err}");
            }
        }
        self.can_undo = false;
        self.can_redo = false;
        self.buttons = ButtonState::all_disabled();
        self.emit(String::new());
    }

    /// Request an undo when the surface reports the capability; otherwise
    /// blank the display.
    pub fn undo(&mut self) {
        if self.can_undo {
            if let Some(session) = self.session.as_mut() {
                if let Err(err) = session.undo() {
                    log::warn!("undo request failed: {err}");
                }
            }
        } else {
            self.emit(String::new());
        }
    }

    pub fn redo(&mut self) {
        if self.can_redo {
            if let Some(session) = self.session.as_mut() {
                if let Err(err) = session.redo() {
                    log::warn!("redo request failed: {err}");
                }
            }
        } else {
            self.emit(String::new());
        }
    }

    /// True once since the remote surface last reported itself empty. Lets
    /// the widget drop its local ink display when the server clears content.
    pub fn take_remote_cleared(&mut self) -> bool {
        std::mem::take(&mut self.remote_cleared)
    }

    /// Close the session and cancel the keep-alive watchdog. Terminal.
    pub fn dispose(&mut self) {
        if self.state == PadState::Disposed {
            return;
        }
        if let Some(mut session) = self.session.take() {
            session.close();
        }
        self.last_ping = None;
        self.transition(PadState::Disposed);
    }

    fn transition(&mut self, next: PadState) {
        if self.state != next {
            log::debug!("pad state {:?} -> {:?}", self.state, next);
            self.state = next;
        }
    }

    fn emit(&mut self, markup: String) {
        if self.on_convert.send(markup).is_err() {
            log::warn!("conversion receiver dropped");
        }
    }
}
