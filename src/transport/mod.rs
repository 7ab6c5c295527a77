//! Subscription transport.
//!
//! This module multiplexes many logical subscriptions over one socket:
//!
//! - **Frame encoding/decoding**: [`Frame`] and the JSON-array wire format
//! - **Subscription registry**: [`SubscriptionRegistry`] with pending and active states
//! - **Heartbeat**: [`Heartbeat`] ping/pong liveness timers
//! - **Engine**: [`TransportEngine`], the sans-IO state machine tying them together
//! - **WebSocket sockets**: [`WebSocketConnector`] backed by tokio-tungstenite
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │      Client driver / facades            │
//! ├─────────────────────────────────────────┤
//! │         Transport engine                │  ← This module
//! │   frames, registry, heartbeat           │
//! ├─────────────────────────────────────────┤
//! │       Socket (WebSocket, mocks)         │
//! └─────────────────────────────────────────┘
//! ```

mod connection;
mod engine;
mod error;
mod frame;
mod registry;
#[cfg(feature = "websocket")]
mod socket;
mod timing;

pub use connection::*;
pub use engine::*;
pub use error::*;
pub use frame::*;
pub use registry::*;
#[cfg(feature = "websocket")]
pub use socket::*;
pub use timing::{Heartbeat, HeartbeatAction, constants as timing_constants};
