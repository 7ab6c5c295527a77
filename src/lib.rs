//! # platform-client
//!
//! Multiplexed subscriptions over one persistent WebSocket.
//!
//! Many logical subscriptions share a single socket. The transport replays
//! subscriptions issued while the socket was still connecting, detects dead
//! connections with a ping/pong heartbeat, tears down and reconnects on
//! protocol violations, and reports every stream's fate through its own
//! listeners. A separate retry strategy decides when a failed operation may
//! be attempted again.
//!
//! ## Feature Flags
//!
//! - `transport` (default): Codec, subscription registry, heartbeat and the sans-IO engine
//! - `websocket` (default): WebSocket sockets over tokio-tungstenite
//! - `retry` (default): Exponential backoff retry strategy
//! - `client` (default): Driver task and the instance/app facades
//!
//! ## Modules
//!
//! - [`core`]: Socket traits, constants, and error types (always included)
//! - [`transport`]: Transport layer (requires `transport` feature)
//! - [`retry`]: Retry strategy (requires `retry` feature)
//! - [`client`]: High-level API (requires `client` feature)
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use platform_client::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), ClientError> {
//!     let instance = Instance::new(
//!         InstanceOptions::new("my-instance", "chat", "v1")
//!             .with_token_provider(StaticTokenProvider::new("token")),
//!     )?;
//!
//!     let listeners = SubscriptionListeners::new()
//!         .on_event(|event| println!("{}: {}", event.event_id, event.body))
//!         .on_error(|error| eprintln!("stream failed: {error}"))
//!         .on_end(|_| println!("stream ended"));
//!
//!     let subscription = instance
//!         .subscribe("rooms/1", listeners, Headers::new())
//!         .await?;
//!     subscription.unsubscribe().await?;
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

// Core module (always included)
pub mod core;

// Transport layer (feature-gated)
#[cfg(feature = "transport")]
#[cfg_attr(docsrs, doc(cfg(feature = "transport")))]
pub mod transport;

// Retry strategy (feature-gated)
#[cfg(feature = "retry")]
#[cfg_attr(docsrs, doc(cfg(feature = "retry")))]
pub mod retry;

// Client API (feature-gated)
#[cfg(feature = "client")]
#[cfg_attr(docsrs, doc(cfg(feature = "client")))]
pub mod client;

/// Prelude module for convenient imports.
pub mod prelude {
    // Core traits and types
    pub use crate::core::*;

    #[cfg(feature = "transport")]
    pub use crate::transport::{
        Frame, SubscriptionEvent, SubscriptionId, SubscriptionListeners, TransportConfig,
        TransportEngine, TransportError, TransportResult,
    };

    #[cfg(feature = "websocket")]
    pub use crate::transport::WebSocketConnector;

    #[cfg(feature = "retry")]
    pub use crate::retry::{
        ExponentialBackoff, ExponentialBackoffRetryStrategy, RequestMethod, RetryDecision,
        RetryOptions, RetryStrategy, RetryTimer,
    };

    #[cfg(feature = "client")]
    pub use crate::client::{
        App, AppOptions, ClientConfig, ClientError, Instance, InstanceOptions,
        StaticTokenProvider, Subscription, TokenProvider, TransportClient,
    };
}

// Re-export commonly used items at crate root
pub use crate::core::{ErrorResponse, FrameError, Headers, PlatformError};

#[cfg(feature = "transport")]
pub use crate::transport::{SubscriptionEvent, SubscriptionId, SubscriptionListeners, TransportEngine};
