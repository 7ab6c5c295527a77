//! Socket boundary traits.
//!
//! The transport engine never touches a network API directly. It drives
//! sockets through [`Socket`], creates them through [`Connector`], and
//! consumes their open/message/error/close signals as [`Signal`] values.
//!
//! Every socket gets a fresh [`SocketId`] when it is created. Signals carry
//! the id of the socket that produced them, so once the engine moves on to a
//! new socket, anything the dying one still emits is recognisably stale.

use std::collections::BTreeMap;
use std::fmt;

use super::error::SocketError;

/// String-to-string header mapping.
pub type Headers = BTreeMap<String, String>;

/// Socket lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReadyState {
    /// Connection attempt in progress.
    Connecting,
    /// Open and able to send.
    Open,
    /// Close requested, not yet complete.
    Closing,
    /// Closed or never opened.
    Closed,
}

/// Identity of one socket instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SocketId(u64);

impl SocketId {
    /// Create a socket id.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// The id following this one.
    pub fn next(self) -> Self {
        Self(self.0.wrapping_add(1))
    }

    /// Raw value.
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SocketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "socket#{}", self.0)
    }
}

/// One of the four signals a socket delivers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketEvent {
    /// The socket is open.
    Open,
    /// A text message arrived.
    Message(String),
    /// The socket reported an error. A close signal normally follows.
    Error(String),
    /// The socket closed.
    Close,
}

/// A socket event tagged with the socket that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signal {
    /// Producing socket.
    pub socket: SocketId,
    /// What happened.
    pub event: SocketEvent,
}

impl Signal {
    /// Create a signal.
    pub fn new(socket: SocketId, event: SocketEvent) -> Self {
        Self { socket, event }
    }
}

/// A live socket as seen by the transport engine.
pub trait Socket: Send {
    /// Current lifecycle state.
    fn ready_state(&self) -> ReadyState;

    /// Send one text message. Only valid while [`ReadyState::Open`].
    fn send(&mut self, text: String) -> Result<(), SocketError>;

    /// Request the socket to close. The close signal may arrive later.
    fn close(&mut self);
}

/// Factory for sockets.
///
/// `connect` must return immediately; the socket reports progress through
/// signals tagged with the given id.
pub trait Connector: Send {
    /// Socket type produced by this connector.
    type Socket: Socket;

    /// Start connecting a new socket.
    fn connect(&mut self, id: SocketId) -> Self::Socket;
}
