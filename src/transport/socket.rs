//! WebSocket sockets for the transport engine.
//!
//! Each [`WebSocket`] is a handle to a spawned task that owns the
//! tokio-tungstenite stream. The task reports progress as [`Signal`]s on the
//! connector's channel and takes outbound text through a command channel, so
//! the engine only ever sees the synchronous [`Socket`] interface.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use futures_util::{SinkExt, StreamExt};
use log::{debug, warn};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};

use crate::core::{
    Connector, ReadyState, Signal, Socket, SocketError, SocketEvent, SocketId, WEBSOCKET_PATH,
};

/// Creates [`WebSocket`]s to one URL.
///
/// `connect` spawns onto the current tokio runtime and must be called from
/// within one.
#[derive(Debug, Clone)]
pub struct WebSocketConnector {
    url: String,
    signals: mpsc::UnboundedSender<Signal>,
}

impl WebSocketConnector {
    /// Create a connector for `url`, delivering signals on `signals`.
    pub fn new(url: impl Into<String>, signals: mpsc::UnboundedSender<Signal>) -> Self {
        Self {
            url: url.into(),
            signals,
        }
    }

    /// Create a connector for the platform socket endpoint on `host`.
    pub fn for_host(host: &str, encrypted: bool, signals: mpsc::UnboundedSender<Signal>) -> Self {
        let scheme = if encrypted { "wss" } else { "ws" };
        Self::new(format!("{scheme}://{host}{WEBSOCKET_PATH}"), signals)
    }

    /// Target URL.
    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Connector for WebSocketConnector {
    type Socket = WebSocket;

    fn connect(&mut self, id: SocketId) -> WebSocket {
        let state = Arc::new(SharedState::new(ReadyState::Connecting));
        let (commands, rx) = mpsc::unbounded_channel();
        tokio::spawn(run(
            id,
            self.url.clone(),
            Arc::clone(&state),
            rx,
            self.signals.clone(),
        ));
        WebSocket {
            id,
            state,
            commands,
        }
    }
}

#[derive(Debug)]
enum Command {
    Send(String),
    Close,
}

/// Handle to one WebSocket connection.
///
/// Dropping the handle closes the connection.
#[derive(Debug)]
pub struct WebSocket {
    id: SocketId,
    state: Arc<SharedState>,
    commands: mpsc::UnboundedSender<Command>,
}

impl WebSocket {
    /// Id this socket tags its signals with.
    pub fn id(&self) -> SocketId {
        self.id
    }
}

impl Socket for WebSocket {
    fn ready_state(&self) -> ReadyState {
        self.state.load()
    }

    fn send(&mut self, text: String) -> Result<(), SocketError> {
        let state = self.state.load();
        if state != ReadyState::Open {
            return Err(SocketError::NotOpen(state));
        }
        self.commands
            .send(Command::Send(text))
            .map_err(|_| SocketError::SendFailed(format!("{} task has stopped", self.id)))
    }

    fn close(&mut self) {
        if self.state.load() != ReadyState::Closed {
            self.state.store(ReadyState::Closing);
        }
        let _ = self.commands.send(Command::Close);
    }
}

/// Ready state shared between the handle and its task.
#[derive(Debug)]
struct SharedState(AtomicU8);

impl SharedState {
    fn new(state: ReadyState) -> Self {
        Self(AtomicU8::new(encode_state(state)))
    }

    fn load(&self) -> ReadyState {
        decode_state(self.0.load(Ordering::Acquire))
    }

    fn store(&self, state: ReadyState) {
        self.0.store(encode_state(state), Ordering::Release);
    }
}

fn encode_state(state: ReadyState) -> u8 {
    match state {
        ReadyState::Connecting => 0,
        ReadyState::Open => 1,
        ReadyState::Closing => 2,
        ReadyState::Closed => 3,
    }
}

fn decode_state(raw: u8) -> ReadyState {
    match raw {
        0 => ReadyState::Connecting,
        1 => ReadyState::Open,
        2 => ReadyState::Closing,
        _ => ReadyState::Closed,
    }
}

async fn run(
    id: SocketId,
    url: String,
    state: Arc<SharedState>,
    mut commands: mpsc::UnboundedReceiver<Command>,
    signals: mpsc::UnboundedSender<Signal>,
) {
    let emit = |event: SocketEvent| {
        // The driver may already be gone; nothing left to notify.
        let _ = signals.send(Signal::new(id, event));
    };

    debug!("{} connecting to {}", id, url);
    let stream = tokio::select! {
        result = connect_async(url.as_str()) => match result {
            Ok((stream, _)) => stream,
            Err(e) => {
                warn!("{} failed to connect: {}", id, e);
                state.store(ReadyState::Closed);
                emit(SocketEvent::Error(e.to_string()));
                emit(SocketEvent::Close);
                return;
            }
        },
        _ = commands.recv() => {
            // Only a close can be queued before the socket is open.
            state.store(ReadyState::Closed);
            emit(SocketEvent::Close);
            return;
        }
    };

    state.store(ReadyState::Open);
    emit(SocketEvent::Open);
    let (mut write, mut read) = stream.split();

    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(Command::Send(text)) => {
                    if let Err(e) = write.send(Message::Text(text)).await {
                        emit(SocketEvent::Error(e.to_string()));
                        break;
                    }
                }
                Some(Command::Close) | None => {
                    state.store(ReadyState::Closing);
                    if let Err(e) = write.close().await {
                        debug!("{} close handshake failed: {}", id, e);
                    }
                    break;
                }
            },
            message = read.next() => match message {
                Some(Ok(Message::Text(text))) => emit(SocketEvent::Message(text)),
                Some(Ok(Message::Close(frame))) => {
                    debug!("{} closed by server: {:?}", id, frame);
                    break;
                }
                // Control frames are answered by tungstenite.
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    emit(SocketEvent::Error(e.to_string()));
                    break;
                }
                None => break,
            }
        }
    }

    state.store(ReadyState::Closed);
    emit(SocketEvent::Close);
}
