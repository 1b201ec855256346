use std::collections::{HashMap, VecDeque};
use std::sync::mpsc::{self, Receiver};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use uuid::Uuid;

use mathink::pad::{PadController, PadOptions, PadState, SessionFactory, KEEP_ALIVE_INTERVAL};
use mathink::session::{InkStroke, Session, SessionError, SessionEvent, LATEX_MIME};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Call {
    AddStrokes(usize),
    Clear,
    Undo,
    Redo,
    Convert,
    Close,
}

#[derive(Default)]
struct SharedLog {
    calls: Vec<Call>,
    sessions_created: u32,
    /// When set, the factory fails from this creation attempt (1-based) on.
    fail_from_attempt: Option<u32>,
}

struct MockSession {
    log: Arc<Mutex<SharedLog>>,
    events: Arc<Mutex<VecDeque<SessionEvent>>>,
}

impl Session for MockSession {
    fn poll_events(&mut self) -> Vec<SessionEvent> {
        self.events.lock().drain(..).collect()
    }

    fn add_strokes(&mut self, strokes: &[InkStroke]) -> Result<(), SessionError> {
        self.log.lock().calls.push(Call::AddStrokes(strokes.len()));
        Ok(())
    }

    fn clear(&mut self) -> Result<(), SessionError> {
        self.log.lock().calls.push(Call::Clear);
        Ok(())
    }

    fn undo(&mut self) -> Result<(), SessionError> {
        self.log.lock().calls.push(Call::Undo);
        Ok(())
    }

    fn redo(&mut self) -> Result<(), SessionError> {
        self.log.lock().calls.push(Call::Redo);
        Ok(())
    }

    fn convert(&mut self) -> Result<(), SessionError> {
        self.log.lock().calls.push(Call::Convert);
        Ok(())
    }

    fn close(&mut self) {
        self.log.lock().calls.push(Call::Close);
    }
}

struct Harness {
    controller: PadController<MockSession>,
    log: Arc<Mutex<SharedLog>>,
    events: Arc<Mutex<VecDeque<SessionEvent>>>,
    converted: Receiver<String>,
    epoch: Instant,
}

impl Harness {
    fn new(options: PadOptions) -> Self {
        let log = Arc::new(Mutex::new(SharedLog::default()));
        let events = Arc::new(Mutex::new(VecDeque::new()));
        let (on_convert, converted) = mpsc::channel();
        let factory: SessionFactory<MockSession> = Box::new({
            let log = Arc::clone(&log);
            let events = Arc::clone(&events);
            move || {
                let mut shared = log.lock();
                shared.sessions_created += 1;
                if shared
                    .fail_from_attempt
                    .is_some_and(|attempt| shared.sessions_created >= attempt)
                {
                    return Err(SessionError::Transport("connection refused".to_owned()));
                }
                drop(shared);
                Ok(MockSession {
                    log: Arc::clone(&log),
                    events: Arc::clone(&events),
                })
            }
        });
        Self {
            controller: PadController::new(factory, on_convert, options),
            log,
            events,
            converted,
            epoch: Instant::now(),
        }
    }

    fn at(&self, secs: u64) -> Instant {
        self.epoch + Duration::from_secs(secs)
    }

    fn push(&self, event: SessionEvent) {
        self.events.lock().push_back(event);
    }

    /// Initialize and complete the handshake, landing in `Ready`.
    fn mount(&mut self) {
        self.controller.initialize(self.at(0));
        assert_eq!(self.controller.state(), PadState::Initializing);
        self.push(SessionEvent::Loaded);
        self.controller.tick(self.at(0));
        assert_eq!(self.controller.state(), PadState::Ready);
    }

    fn calls(&self) -> Vec<Call> {
        self.log.lock().calls.clone()
    }

    fn sessions_created(&self) -> u32 {
        self.log.lock().sessions_created
    }

    fn drain_converted(&self) -> Vec<String> {
        self.converted.try_iter().collect()
    }
}

fn exported(latex: &str) -> SessionEvent {
    SessionEvent::Exported {
        exports: HashMap::from([(LATEX_MIME.to_owned(), latex.to_owned())]),
    }
}

fn changed(empty: bool, can_undo: bool, can_redo: bool) -> SessionEvent {
    SessionEvent::Changed { empty, can_undo, can_redo }
}

fn sample_stroke() -> InkStroke {
    InkStroke {
        id: Uuid::new_v4(),
        x: vec![1.0, 2.0, 3.0],
        y: vec![1.0, 1.5, 2.0],
        t: vec![0, 16, 32],
        p: vec![0.5, 0.5, 0.5],
    }
}

#[test]
fn mount_reaches_ready_through_loaded() {
    let mut h = Harness::new(PadOptions::default());
    assert_eq!(h.controller.state(), PadState::Uninitialized);
    h.mount();
    assert_eq!(h.sessions_created(), 1);
}

#[test]
fn initialization_failure_is_not_retried() {
    let mut h = Harness::new(PadOptions::default());
    h.log.lock().fail_from_attempt = Some(1);
    h.controller.initialize(h.at(0));
    assert_eq!(h.controller.state(), PadState::Uninitialized);
    assert!(h.controller.init_error().is_some());
    h.controller.tick(h.at(1));
    assert_eq!(h.sessions_created(), 1);
}

#[test]
fn empty_surface_disables_all_buttons() {
    let mut h = Harness::new(PadOptions::default());
    h.mount();

    h.push(changed(false, true, true));
    h.controller.tick(h.at(1));
    assert!(!h.controller.buttons().undo_disabled);

    // Empty overrides whatever the capability flags claim.
    h.push(changed(true, true, true));
    h.controller.tick(h.at(1));
    let buttons = h.controller.buttons();
    assert!(buttons.undo_disabled);
    assert!(buttons.redo_disabled);
    assert!(buttons.clear_disabled);
    assert_eq!(h.drain_converted().last().map(String::as_str), Some(""));
}

#[test]
fn enablement_follows_capability_flags() {
    let mut h = Harness::new(PadOptions::default());
    h.mount();
    h.push(changed(false, true, false));
    h.controller.tick(h.at(1));
    let buttons = h.controller.buttons();
    assert!(!buttons.undo_disabled);
    assert!(buttons.redo_disabled);
    assert!(!buttons.clear_disabled);
}

#[test]
fn exports_forward_latex_in_arrival_order() {
    let mut h = Harness::new(PadOptions::default());
    h.mount();
    h.push(exported("x^2+1"));
    h.push(exported("x^2+2"));
    h.controller.tick(h.at(1));
    assert_eq!(h.drain_converted(), vec!["x^2+1".to_owned(), "x^2+2".to_owned()]);
    // Auto-convert is off by default: no follow-up convert request.
    assert!(!h.calls().contains(&Call::Convert));
}

#[test]
fn export_without_latex_entry_is_ignored() {
    let mut h = Harness::new(PadOptions::default());
    h.mount();
    h.push(SessionEvent::Exported {
        exports: HashMap::from([("image/svg+xml".to_owned(), "<svg/>".to_owned())]),
    });
    h.controller.tick(h.at(1));
    assert!(h.drain_converted().is_empty());
}

#[test]
fn auto_convert_requests_follow_up_per_export() {
    let mut h = Harness::new(PadOptions { auto_convert: true });
    h.mount();
    h.push(exported("a"));
    h.push(exported("b"));
    h.controller.tick(h.at(1));
    let converts = h.calls().iter().filter(|c| **c == Call::Convert).count();
    assert_eq!(converts, 2);
    assert_eq!(h.drain_converted(), vec!["a".to_owned(), "b".to_owned()]);
}

#[test]
fn closed_error_rebuilds_session_exactly_once() {
    let mut h = Harness::new(PadOptions::default());
    h.mount();
    h.push(SessionEvent::InternalError {
        message: "Session closed unexpectedly".to_owned(),
    });
    h.controller.tick(h.at(1));
    assert_eq!(h.sessions_created(), 2);
    assert!(h.calls().contains(&Call::Close));
    // The fresh session has not finished its handshake yet.
    assert_eq!(h.controller.state(), PadState::Initializing);

    h.push(SessionEvent::Loaded);
    h.controller.tick(h.at(2));
    assert_eq!(h.controller.state(), PadState::Ready);
}

#[test]
fn other_errors_do_not_rebuild() {
    let mut h = Harness::new(PadOptions::default());
    h.mount();
    h.push(SessionEvent::InternalError {
        message: "unsupported gesture".to_owned(),
    });
    h.controller.tick(h.at(1));
    assert_eq!(h.sessions_created(), 1);
    assert_eq!(h.controller.state(), PadState::Ready);
}

#[test]
fn events_behind_a_recovery_are_dropped() {
    let mut h = Harness::new(PadOptions::default());
    h.mount();
    // Both events are drained in one tick; the export belongs to the session
    // that just died and must not reach the callback.
    h.push(SessionEvent::InternalError {
        message: "session closed by remote".to_owned(),
    });
    h.push(exported("stale"));
    h.controller.tick(h.at(1));
    assert_eq!(h.sessions_created(), 2);
    assert!(h.drain_converted().is_empty());
}

#[test]
fn failed_rebuild_is_logged_not_retried() {
    let mut h = Harness::new(PadOptions::default());
    h.mount();
    h.log.lock().fail_from_attempt = Some(2);
    h.push(SessionEvent::InternalError {
        message: "session closed: heartbeats lost".to_owned(),
    });
    h.controller.tick(h.at(1));
    assert_eq!(h.sessions_created(), 2);
    assert_eq!(h.controller.state(), PadState::Uninitialized);
    assert!(h.controller.init_error().is_some());
    // No second-level retry on subsequent frames.
    h.controller.tick(h.at(2));
    h.controller.tick(h.at(3));
    assert_eq!(h.sessions_created(), 2);
}

#[test]
fn keep_alive_pings_with_empty_batches() {
    let mut h = Harness::new(PadOptions::default());
    h.mount();

    h.controller.tick(h.at(5));
    assert!(!h.calls().contains(&Call::AddStrokes(0)));

    h.controller.tick(h.at(10));
    let pings = |calls: &[Call]| calls.iter().filter(|c| **c == Call::AddStrokes(0)).count();
    assert_eq!(pings(&h.calls()), 1);

    // Not due again until a full interval has elapsed.
    h.controller.tick(h.at(12));
    assert_eq!(pings(&h.calls()), 1);

    h.controller.tick(h.at(10 + KEEP_ALIVE_INTERVAL.as_secs()));
    assert_eq!(pings(&h.calls()), 2);
}

#[test]
fn disposed_pad_never_pings_again() {
    let mut h = Harness::new(PadOptions::default());
    h.mount();
    h.controller.dispose();
    assert_eq!(h.controller.state(), PadState::Disposed);
    assert!(h.calls().contains(&Call::Close));

    h.controller.tick(h.at(30));
    h.controller.tick(h.at(60));
    assert!(!h.calls().contains(&Call::AddStrokes(0)));

    // Terminal: dispose and initialize are no-ops from here on.
    h.controller.dispose();
    h.controller.initialize(h.at(61));
    assert_eq!(h.controller.state(), PadState::Disposed);
    assert_eq!(h.sessions_created(), 1);
}

#[test]
fn clear_blanks_immediately_and_is_idempotent() {
    let mut h = Harness::new(PadOptions::default());
    h.mount();
    h.push(changed(false, true, false));
    h.controller.tick(h.at(1));

    h.controller.clear();
    let buttons = h.controller.buttons();
    assert!(buttons.undo_disabled && buttons.redo_disabled && buttons.clear_disabled);
    assert_eq!(h.drain_converted(), vec![String::new()]);
    assert!(h.calls().contains(&Call::Clear));

    // Clearing an already-empty surface must not fault.
    h.controller.clear();
    let buttons = h.controller.buttons();
    assert!(buttons.undo_disabled && buttons.redo_disabled && buttons.clear_disabled);
}

#[test]
fn undo_redo_are_gated_on_reported_capabilities() {
    let mut h = Harness::new(PadOptions::default());
    h.mount();
    h.push(changed(false, false, true));
    h.controller.tick(h.at(1));

    h.controller.undo();
    assert!(!h.calls().contains(&Call::Undo));
    // The no-op path blanks the display.
    assert_eq!(h.drain_converted(), vec![String::new()]);

    h.controller.redo();
    assert!(h.calls().contains(&Call::Redo));
    assert!(h.drain_converted().is_empty());
}

#[test]
fn strokes_only_flow_while_ready() {
    let mut h = Harness::new(PadOptions::default());
    h.controller.initialize(h.at(0));
    // Handshake still in flight: strokes are dropped.
    h.controller.submit_strokes(&[sample_stroke()]);
    assert!(!h.calls().iter().any(|c| matches!(c, Call::AddStrokes(_))));

    h.push(SessionEvent::Loaded);
    h.controller.tick(h.at(0));
    h.controller.submit_strokes(&[sample_stroke()]);
    assert!(h.calls().contains(&Call::AddStrokes(1)));
}

#[test]
fn errors_while_initializing_fail_the_mount() {
    let mut h = Harness::new(PadOptions::default());
    h.controller.initialize(h.at(0));
    assert_eq!(h.controller.state(), PadState::Initializing);

    // The transport reports its (asynchronous) connect failure as an event.
    h.push(SessionEvent::InternalError {
        message: "initialization failed: connection refused".to_owned(),
    });
    h.controller.tick(h.at(1));
    assert_eq!(h.controller.state(), PadState::Uninitialized);
    assert!(h.controller.init_error().is_some());
    assert!(h.calls().contains(&Call::Close));

    // Not retried on later frames.
    h.controller.tick(h.at(2));
    h.controller.tick(h.at(3));
    assert_eq!(h.sessions_created(), 1);
}

#[test]
fn degenerate_strokes_are_dropped_from_batches() {
    let mut h = Harness::new(PadOptions::default());
    h.mount();

    let pointless = InkStroke {
        id: Uuid::new_v4(),
        x: Vec::new(),
        y: Vec::new(),
        t: Vec::new(),
        p: Vec::new(),
    };
    h.controller.submit_strokes(&[pointless.clone()]);
    assert!(!h.calls().iter().any(|c| matches!(c, Call::AddStrokes(_))));

    // A mixed batch is trimmed, not rejected.
    h.controller.submit_strokes(&[pointless, sample_stroke()]);
    assert!(h.calls().contains(&Call::AddStrokes(1)));
}

#[test]
fn remote_clear_notification_is_surfaced_once() {
    let mut h = Harness::new(PadOptions::default());
    h.mount();
    assert!(!h.controller.take_remote_cleared());
    h.push(changed(true, false, false));
    h.controller.tick(h.at(1));
    assert!(h.controller.take_remote_cleared());
    assert!(!h.controller.take_remote_cleared());
}
