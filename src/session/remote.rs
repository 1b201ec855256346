//! Native websocket implementation of the recognition session.
//!
//! The socket lives on a background thread that polls a non-blocking stream:
//! commands arrive over one channel, decoded server events leave over another.
//! The UI thread only ever talks to the channels, so no handler logic runs in
//! parallel with the frame loop.

use std::io;
use std::net::TcpStream;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tungstenite::stream::MaybeTlsStream;
use tungstenite::{Error as WsError, Message, WebSocket};

use super::protocol::{hmac_answer, ClientMessage, InkStroke, ServerMessage};
use super::{Session, SessionError, SessionEvent, CLOSED_MARKER, LATEX_MIME};
use crate::config::SessionConfig;

const POLL_INTERVAL: Duration = Duration::from_millis(10);
const RETRY_BACKOFF: Duration = Duration::from_millis(500);

type WsSocket = WebSocket<MaybeTlsStream<TcpStream>>;

/// A live connection to the remote recognition service.
pub struct RemoteSession {
    commands: Sender<ClientMessage>,
    events: Receiver<SessionEvent>,
    closing: Arc<Mutex<bool>>,
    worker: Option<JoinHandle<()>>,
}

impl RemoteSession {
    /// Start the transport thread. Returns immediately: the connection itself
    /// (with up to `config.max_retry` attempts) and the handshake happen on
    /// the thread, so a slow or unreachable service never stalls the frame
    /// loop. A connect failure surfaces as an `InternalError` event without
    /// [`CLOSED_MARKER`], which the controller treats as an initialization
    /// failure rather than a recoverable drop.
    pub fn connect(config: &SessionConfig) -> Result<Self, SessionError> {
        config.validate()?;

        let (command_tx, command_rx) = mpsc::channel();
        let (event_tx, event_rx) = mpsc::channel();
        let closing = Arc::new(Mutex::new(false));

        let worker = thread::Builder::new()
            .name("mathink-session".to_owned())
            .spawn({
                let config = config.clone();
                let closing = Arc::clone(&closing);
                move || {
                    let socket = match connect_with_retry(&config) {
                        Ok(socket) => socket,
                        Err(err) => {
                            log::error!("recognition service unreachable: {err}");
                            let _ = event_tx.send(SessionEvent::InternalError {
                                message: format!("initialization failed: {err}"),
                            });
                            return;
                        }
                    };
                    log::info!("recognition session connected to {}", config.host);
                    Transport::new(socket, config, event_tx).run(command_rx, closing);
                }
            })
            .map_err(|err| SessionError::Transport(format!("spawn transport thread: {err}")))?;

        Ok(Self {
            commands: command_tx,
            events: event_rx,
            closing,
            worker: Some(worker),
        })
    }

    fn send(&self, message: ClientMessage) -> Result<(), SessionError> {
        self.commands.send(message).map_err(|_| SessionError::Closed)
    }
}

impl Session for RemoteSession {
    fn poll_events(&mut self) -> Vec<SessionEvent> {
        self.events.try_iter().collect()
    }

    fn add_strokes(&mut self, strokes: &[InkStroke]) -> Result<(), SessionError> {
        self.send(ClientMessage::AddStrokes { strokes: strokes.to_vec() })
    }

    fn clear(&mut self) -> Result<(), SessionError> {
        self.send(ClientMessage::Clear)
    }

    fn undo(&mut self) -> Result<(), SessionError> {
        self.send(ClientMessage::Undo)
    }

    fn redo(&mut self) -> Result<(), SessionError> {
        self.send(ClientMessage::Redo)
    }

    fn convert(&mut self) -> Result<(), SessionError> {
        self.send(ClientMessage::Convert)
    }

    fn close(&mut self) {
        *self.closing.lock() = true;
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                log::error!("transport thread panicked during shutdown");
            }
        }
    }
}

impl Drop for RemoteSession {
    fn drop(&mut self) {
        self.close();
    }
}

fn connect_with_retry(config: &SessionConfig) -> Result<WsSocket, SessionError> {
    let url = config.endpoint_url();
    let mut attempts = 0;
    let mut socket = loop {
        attempts += 1;
        match tungstenite::connect(url.as_str()) {
            Ok((socket, _response)) => break socket,
            Err(err) if attempts < config.max_retry => {
                log::warn!("connect attempt {attempts} failed: {err}");
                thread::sleep(RETRY_BACKOFF);
            }
            Err(err) => {
                return Err(SessionError::Connect { attempts, message: err.to_string() });
            }
        }
    };
    set_nonblocking(&mut socket)?;
    Ok(socket)
}

fn set_nonblocking(socket: &mut WsSocket) -> Result<(), SessionError> {
    let result = match socket.get_mut() {
        MaybeTlsStream::Plain(stream) => stream.set_nonblocking(true),
        MaybeTlsStream::NativeTls(stream) => stream.get_mut().set_nonblocking(true),
        _ => Ok(()),
    };
    result.map_err(|err| SessionError::Transport(format!("set_nonblocking: {err}")))
}

/// Why the transport loop stopped.
enum Exit {
    /// The connection is unusable; the message carries [`CLOSED_MARKER`] when
    /// the controller should rebuild the session.
    Fatal(String),
    /// Orderly shutdown requested through `close()`.
    Requested,
}

struct Transport {
    socket: WsSocket,
    config: SessionConfig,
    events: Sender<SessionEvent>,
    part_open: bool,
    last_ping: Instant,
    pings_unanswered: u32,
}

impl Transport {
    fn new(socket: WsSocket, config: SessionConfig, events: Sender<SessionEvent>) -> Self {
        Self {
            socket,
            config,
            events,
            part_open: false,
            last_ping: Instant::now(),
            pings_unanswered: 0,
        }
    }

    fn run(mut self, commands: Receiver<ClientMessage>, closing: Arc<Mutex<bool>>) {
        let exit = self.run_inner(&commands, &closing);
        match exit {
            Exit::Requested => log::debug!("transport shut down"),
            Exit::Fatal(message) => {
                log::warn!("transport stopped: {message}");
                let _ = self.events.send(SessionEvent::InternalError { message });
            }
        }
    }

    fn run_inner(&mut self, commands: &Receiver<ClientMessage>, closing: &Mutex<bool>) -> Exit {
        // Announce the content package; the server replies with an HMAC
        // challenge before it opens the part.
        if let Err(exit) = self.send_message(&ClientMessage::NewContentPackage {
            application_key: self.config.application_key.clone(),
            protocol_version: self.config.protocol_version.clone(),
        }) {
            return exit;
        }

        loop {
            if *closing.lock() {
                let _ = self.socket.close(None);
                let _ = self.socket.flush();
                return Exit::Requested;
            }

            if let Err(exit) = self.drain_inbound() {
                return exit;
            }
            if let Err(exit) = self.drain_commands(commands) {
                return exit;
            }
            if let Err(exit) = self.heartbeat() {
                return exit;
            }

            // Retry partial writes left queued by the non-blocking socket.
            match self.socket.flush() {
                Ok(()) => {}
                Err(WsError::Io(err)) if err.kind() == io::ErrorKind::WouldBlock => {}
                Err(err) => return Exit::Fatal(format!("{CLOSED_MARKER}: flush failed: {err}")),
            }

            thread::sleep(POLL_INTERVAL);
        }
    }

    fn drain_inbound(&mut self) -> Result<(), Exit> {
        loop {
            match self.socket.read() {
                Ok(Message::Text(text)) => self.handle_server_text(&text)?,
                Ok(Message::Pong(_)) => self.pings_unanswered = 0,
                Ok(Message::Ping(payload)) => {
                    let _ = self.socket.send(Message::Pong(payload));
                }
                Ok(Message::Close(frame)) => {
                    let reason = frame.map(|f| f.reason.to_string()).unwrap_or_default();
                    return Err(Exit::Fatal(format!("{CLOSED_MARKER} by remote: {reason}")));
                }
                Ok(_) => {}
                Err(WsError::Io(err)) if err.kind() == io::ErrorKind::WouldBlock => return Ok(()),
                Err(err) => return Err(Exit::Fatal(format!("{CLOSED_MARKER}: read failed: {err}"))),
            }
        }
    }

    fn handle_server_text(&mut self, text: &str) -> Result<(), Exit> {
        let message = match serde_json::from_str::<ServerMessage>(text) {
            Ok(message) => message,
            Err(err) => {
                // Unknown message kinds are reported, not fatal.
                self.emit(SessionEvent::InternalError {
                    message: format!("undecodable server message: {err}"),
                })?;
                return Ok(());
            }
        };

        match message {
            ServerMessage::HmacChallenge { challenge } => {
                let answer =
                    hmac_answer(&self.config.application_key, &self.config.hmac_key, &challenge)
                        .map_err(|err| Exit::Fatal(format!("{CLOSED_MARKER}: {err}")))?;
                self.send_message(&ClientMessage::Hmac { hmac: answer })?;
                self.send_message(&ClientMessage::NewContentPart {
                    content_type: "Math".to_owned(),
                    mime_types: vec![LATEX_MIME.to_owned()],
                })?;
            }
            ServerMessage::PartChanged => {
                if !self.part_open {
                    self.part_open = true;
                    self.emit(SessionEvent::Loaded)?;
                }
            }
            ServerMessage::ContentChanged { empty, can_undo, can_redo } => {
                self.emit(SessionEvent::Changed { empty, can_undo, can_redo })?;
            }
            ServerMessage::Exported { exports } => {
                self.emit(SessionEvent::Exported { exports })?;
            }
            ServerMessage::Error { message } => {
                self.emit(SessionEvent::InternalError { message })?;
            }
        }
        Ok(())
    }

    fn drain_commands(&mut self, commands: &Receiver<ClientMessage>) -> Result<(), Exit> {
        while let Ok(command) = commands.try_recv() {
            self.send_message(&command)?;
        }
        Ok(())
    }

    fn heartbeat(&mut self) -> Result<(), Exit> {
        if self.last_ping.elapsed() < self.config.ping_interval {
            return Ok(());
        }
        if self.pings_unanswered >= self.config.max_ping_lost {
            return Err(Exit::Fatal(format!(
                "{CLOSED_MARKER}: {} heartbeats lost",
                self.pings_unanswered
            )));
        }
        match self.socket.send(Message::Ping(Vec::new())) {
            Ok(()) => {}
            Err(WsError::Io(err)) if err.kind() == io::ErrorKind::WouldBlock => {}
            Err(err) => return Err(Exit::Fatal(format!("{CLOSED_MARKER}: ping failed: {err}"))),
        }
        self.pings_unanswered += 1;
        self.last_ping = Instant::now();
        Ok(())
    }

    fn send_message(&mut self, message: &ClientMessage) -> Result<(), Exit> {
        let text = match serde_json::to_string(message) {
            Ok(text) => text,
            Err(err) => {
                log::error!("failed to encode client message: {err}");
                return Ok(());
            }
        };
        if text.len() > self.config.max_chunk_bytes {
            log::warn!(
                "dropping oversized message: {} bytes exceeds the {} byte chunk limit",
                text.len(),
                self.config.max_chunk_bytes
            );
            return Ok(());
        }
        match self.socket.send(Message::Text(text)) {
            Ok(()) => Ok(()),
            // Queued by the non-blocking socket; flushed on a later iteration.
            Err(WsError::Io(err)) if err.kind() == io::ErrorKind::WouldBlock => Ok(()),
            Err(err) => Err(Exit::Fatal(format!("{CLOSED_MARKER}: write failed: {err}"))),
        }
    }

    fn emit(&self, event: SessionEvent) -> Result<(), Exit> {
        // The receiving side is gone only when the controller was dropped.
        self.events.send(event).map_err(|_| Exit::Requested)
    }
}
