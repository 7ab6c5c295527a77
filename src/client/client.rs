//! Client driver for the transport engine.
//!
//! [`TransportClient`] runs a [`TransportEngine`] on its own tokio task. The
//! task is the engine's single consumer: it selects over caller commands,
//! socket signals and the engine's next timer deadline, and handles each one
//! to completion before looking at the next.

use std::time::Duration;

use log::{debug, info};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{sleep_until, Instant};

use super::instance::TokenError;
use crate::core::{Connector, Headers, Signal, DEFAULT_INSTANCE_CLUSTER};
use crate::transport::{
    IdAllocator, SubscriptionId, SubscriptionListeners, TransportConfig, TransportEngine,
    TransportError, WebSocketConnector,
};

/// Errors that can occur in the client.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The driver task has stopped.
    #[error("client disconnected")]
    Disconnected,

    /// Required options are missing or malformed.
    #[error("invalid options: {0}")]
    InvalidOptions(String),

    /// The token provider failed.
    #[error("token fetch failed: {0}")]
    Token(#[from] TokenError),

    /// The transport rejected the operation.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Client configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Host serving the socket endpoint.
    pub host: String,

    /// Use `wss://` instead of `ws://`.
    pub encrypted: bool,

    /// Engine tunables.
    pub transport: TransportConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_INSTANCE_CLUSTER.to_string(),
            encrypted: true,
            transport: TransportConfig::default(),
        }
    }
}

/// Builder for [`ClientConfig`].
#[derive(Debug, Default)]
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    /// Create a builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the host.
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.host = host.into();
        self
    }

    /// Enable or disable TLS.
    pub fn encrypted(mut self, encrypted: bool) -> Self {
        self.config.encrypted = encrypted;
        self
    }

    /// Set the heartbeat interval.
    pub fn ping_interval(mut self, interval: Duration) -> Self {
        self.config.transport.ping_interval = interval;
        self
    }

    /// Set the pong timeout.
    pub fn ping_timeout(mut self, timeout: Duration) -> Self {
        self.config.transport.ping_timeout = timeout;
        self
    }

    /// Build the configuration.
    pub fn build(self) -> ClientConfig {
        self.config
    }
}

enum Command {
    Subscribe {
        id: SubscriptionId,
        path: String,
        listeners: SubscriptionListeners,
        headers: Headers,
    },
    Unsubscribe {
        id: SubscriptionId,
        reply: oneshot::Sender<Result<(), TransportError>>,
    },
    Shutdown {
        done: oneshot::Sender<()>,
    },
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Command::Subscribe { id, path, .. } => write!(f, "Subscribe({id}, {path})"),
            Command::Unsubscribe { id, .. } => write!(f, "Unsubscribe({id})"),
            Command::Shutdown { .. } => f.write_str("Shutdown"),
        }
    }
}

/// Handle to a running transport.
///
/// Cheap to clone. The driver task stops once [`Self::shutdown`] is called
/// or every handle, including [`Subscription`]s, has been dropped.
#[derive(Debug, Clone)]
pub struct TransportClient {
    commands: mpsc::UnboundedSender<Command>,
    ids: IdAllocator,
}

impl TransportClient {
    /// Connect to the WebSocket endpoint described by `config`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn connect(config: &ClientConfig) -> Self {
        let host = config.host.clone();
        let encrypted = config.encrypted;
        Self::spawn(
            move |signals| WebSocketConnector::for_host(&host, encrypted, signals),
            config.transport,
        )
    }

    /// Run an engine over sockets from the connector built by `make_connector`.
    ///
    /// The connector must tag its signals and send them on the given channel.
    pub fn spawn<C, F>(make_connector: F, config: TransportConfig) -> Self
    where
        C: Connector + 'static,
        F: FnOnce(mpsc::UnboundedSender<Signal>) -> C + Send + 'static,
    {
        let (commands, command_rx) = mpsc::unbounded_channel();
        let ids = IdAllocator::new();
        let engine_ids = ids.clone();

        tokio::spawn(async move {
            let (signal_tx, signal_rx) = mpsc::unbounded_channel();
            let engine = TransportEngine::with_ids(make_connector(signal_tx), config, engine_ids);
            drive(engine, command_rx, signal_rx).await;
        });

        Self { commands, ids }
    }

    /// Open a subscription.
    ///
    /// Returns as soon as the request is queued; progress is reported
    /// through `listeners`.
    pub fn subscribe(
        &self,
        path: impl Into<String>,
        listeners: SubscriptionListeners,
        headers: Headers,
    ) -> Result<Subscription, ClientError> {
        let id = self.ids.allocate();
        self.commands
            .send(Command::Subscribe {
                id,
                path: path.into(),
                listeners,
                headers,
            })
            .map_err(|_| ClientError::Disconnected)?;
        Ok(Subscription {
            id,
            commands: self.commands.clone(),
        })
    }

    /// Check if the driver task is still running.
    pub fn is_running(&self) -> bool {
        !self.commands.is_closed()
    }

    /// End every subscription, close the socket and stop the driver task.
    pub async fn shutdown(&self) {
        let (done, done_rx) = oneshot::channel();
        if self.commands.send(Command::Shutdown { done }).is_ok() {
            let _ = done_rx.await;
        }
    }
}

/// Handle to one open subscription.
#[derive(Debug)]
pub struct Subscription {
    id: SubscriptionId,
    commands: mpsc::UnboundedSender<Command>,
}

impl Subscription {
    /// Transport-assigned id.
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Close the subscription. Its `on_end` listener runs before this returns.
    pub async fn unsubscribe(self) -> Result<(), ClientError> {
        let (reply, reply_rx) = oneshot::channel();
        self.commands
            .send(Command::Unsubscribe { id: self.id, reply })
            .map_err(|_| ClientError::Disconnected)?;
        reply_rx.await.map_err(|_| ClientError::Disconnected)??;
        Ok(())
    }
}

async fn drive<C: Connector>(
    mut engine: TransportEngine<C>,
    mut commands: mpsc::UnboundedReceiver<Command>,
    mut signals: mpsc::UnboundedReceiver<Signal>,
) {
    loop {
        let deadline = engine.poll_timeout().map(Instant::from_std);

        tokio::select! {
            command = commands.recv() => match command {
                Some(Command::Subscribe { id, path, listeners, headers }) => {
                    engine.subscribe_with_id(id, path, listeners, headers);
                }
                Some(Command::Unsubscribe { id, reply }) => {
                    let _ = reply.send(engine.unsubscribe(id));
                }
                Some(Command::Shutdown { done }) => {
                    engine.shutdown();
                    let _ = done.send(());
                    break;
                }
                None => {
                    debug!("all client handles dropped");
                    engine.shutdown();
                    break;
                }
            },
            Some(signal) = signals.recv() => {
                engine.handle_signal(signal, Instant::now().into_std());
            }
            _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                engine.handle_timeout(Instant::now().into_std());
            }
        }
    }
    info!("transport client stopped");
}
