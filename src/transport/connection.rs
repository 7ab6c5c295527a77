//! Connection state for the transport engine.
//!
//! Holds the current socket and the bookkeeping of its most recent teardown.
//! A socket is *bound* from the moment it is attached until it is torn down;
//! only signals from the bound socket are acted upon.
//!
//! The phase only moves on signals the engine has handled. The live ready
//! state of the socket is consulted for one thing: noticing a socket that
//! is gone before its close signal was delivered.

use std::time::Instant;

use super::timing::Heartbeat;
use crate::core::{PlatformError, ReadyState, Socket, SocketError, SocketId};

/// Connection lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionPhase {
    /// No socket has been attached yet.
    Idle,
    /// A socket is bound and its open signal has not been handled yet.
    Connecting,
    /// The bound socket's open signal was handled; frames may be sent.
    Open,
    /// The bound socket was torn down by the client.
    ForcedClose,
    /// The bound socket closed on its own.
    Closed,
}

/// The current socket plus teardown state.
#[derive(Debug)]
pub struct Connection<S> {
    socket: Option<S>,
    socket_id: SocketId,
    phase: ConnectionPhase,
    /// Error carried by the most recent teardown, consumed by the close handler.
    closed_error: Option<PlatformError>,
    /// Liveness timers for the bound socket.
    pub heartbeat: Heartbeat,
}

impl<S: Socket> Connection<S> {
    /// Create a connection with no socket.
    pub fn new(heartbeat: Heartbeat) -> Self {
        Self {
            socket: None,
            socket_id: SocketId::new(0),
            phase: ConnectionPhase::Idle,
            closed_error: None,
            heartbeat,
        }
    }

    /// Current phase.
    pub fn phase(&self) -> ConnectionPhase {
        self.phase
    }

    /// Id of the most recently attached socket.
    pub fn socket_id(&self) -> SocketId {
        self.socket_id
    }

    /// Id to hand to the connector for the next socket.
    pub fn next_socket_id(&self) -> SocketId {
        match self.phase {
            ConnectionPhase::Idle => self.socket_id,
            _ => self.socket_id.next(),
        }
    }

    /// Bind a freshly created socket.
    ///
    /// Clears the forced-close flag and any stored error. The previous
    /// socket, if any, is dropped.
    pub fn attach(&mut self, id: SocketId, socket: S) {
        self.socket = Some(socket);
        self.socket_id = id;
        self.phase = ConnectionPhase::Connecting;
        self.closed_error = None;
        self.heartbeat.stop();
    }

    fn is_bound(&self) -> bool {
        matches!(self.phase, ConnectionPhase::Connecting | ConnectionPhase::Open)
    }

    /// Check if signals from this socket should be handled.
    pub fn is_current(&self, id: SocketId) -> bool {
        self.is_bound() && self.socket_id == id
    }

    /// Ready state as seen through the handled signals.
    pub fn ready_state(&self) -> ReadyState {
        match self.phase {
            ConnectionPhase::Connecting => ReadyState::Connecting,
            ConnectionPhase::Open => ReadyState::Open,
            _ => ReadyState::Closed,
        }
    }

    /// Check if the open signal of the bound socket was handled.
    pub fn is_open(&self) -> bool {
        self.phase == ConnectionPhase::Open
    }

    /// Check if the bound socket already closed but its close signal is
    /// still on the way.
    pub fn is_lost(&self) -> bool {
        self.is_bound()
            && self
                .socket
                .as_ref()
                .is_some_and(|socket| socket.ready_state() == ReadyState::Closed)
    }

    /// Send text on the bound socket.
    pub fn send(&mut self, text: String) -> Result<(), SocketError> {
        let state = self.ready_state();
        match self.socket.as_mut() {
            Some(socket) if state == ReadyState::Open => socket.send(text),
            _ => Err(SocketError::NotOpen(state)),
        }
    }

    /// Record a socket-level error unless a teardown error is already stored.
    pub fn record_error(&mut self, error: PlatformError) {
        if self.closed_error.is_none() {
            self.closed_error = Some(error);
        }
    }

    /// Tear down the bound socket on the client's initiative.
    ///
    /// Unbinds the socket so its remaining signals are stale, stores the
    /// error for the close handler and stops the heartbeat. Returns `false`
    /// if there was nothing to tear down.
    pub fn force_close(&mut self, error: Option<PlatformError>) -> bool {
        if !self.is_bound() {
            return false;
        }
        self.phase = ConnectionPhase::ForcedClose;
        if let Some(error) = error {
            self.closed_error = Some(error);
        }
        self.heartbeat.stop();
        if let Some(socket) = self.socket.as_mut() {
            socket.close();
        }
        true
    }

    /// The bound socket closed by itself.
    pub fn mark_closed(&mut self) {
        if self.is_bound() {
            self.phase = ConnectionPhase::Closed;
        }
        self.heartbeat.stop();
    }

    /// Take the error stored by the most recent teardown.
    pub fn take_closed_error(&mut self) -> Option<PlatformError> {
        self.closed_error.take()
    }

    /// Check if a new socket must be created before the next subscribe.
    pub fn needs_reconnect(&self) -> bool {
        match self.phase {
            ConnectionPhase::Idle | ConnectionPhase::ForcedClose | ConnectionPhase::Closed => true,
            ConnectionPhase::Connecting | ConnectionPhase::Open => self.is_lost(),
        }
    }

    /// The bound socket opened: allow sending and start the heartbeat.
    pub fn on_open(&mut self, now: Instant) {
        if self.phase == ConnectionPhase::Connecting {
            self.phase = ConnectionPhase::Open;
        }
        self.heartbeat.start(now);
    }
}
