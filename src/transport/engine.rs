//! Subscription-multiplexing transport engine.
//!
//! [`TransportEngine`] multiplexes many logical subscriptions over one socket.
//! It performs no I/O and owns no tasks: the driver feeds it socket
//! [`Signal`]s, sleeps until [`TransportEngine::poll_timeout`] and then calls
//! [`TransportEngine::handle_timeout`]. All listener callbacks run inside
//! these calls, one at a time.
//!
//! # Lifecycle
//!
//! ```text
//! subscribe ──► Pending ──(socket open)──► Active ──► EOS / unsubscribe
//!                  │                          │
//!                  └──────(teardown)──────────┴──► on_end / on_error
//! ```
//!
//! A teardown (server CLOSE, protocol violation, pong timeout, socket close)
//! drains both registries, notifies every listener and reconnects at once.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use serde_json::json;

use super::connection::Connection;
use super::error::{TransportError, TransportResult};
use super::frame::{Frame, SubscriptionId};
use super::registry::{
    SubscriptionListeners, SubscriptionRecord, SubscriptionRegistry, SubscriptionState,
};
use super::timing::{constants, Heartbeat, HeartbeatAction};
use crate::core::{
    Connector, ErrorResponse, FrameError, Headers, PlatformError, ReadyState, Signal, SocketEvent,
    SocketId, EOS_STATUS_NO_CONTENT,
};

/// Shared monotonic subscription id counter.
///
/// Cloning shares the counter, so a handle on another task can hand out ids
/// before the engine sees the subscription.
#[derive(Debug, Clone, Default)]
pub struct IdAllocator {
    next: Arc<AtomicU64>,
}

impl IdAllocator {
    /// Create a counter starting at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the next id.
    pub fn allocate(&self) -> SubscriptionId {
        SubscriptionId::new(self.next.fetch_add(1, Ordering::Relaxed))
    }

    /// Check if `id` was ever handed out.
    pub fn was_issued(&self, id: SubscriptionId) -> bool {
        id.as_u64() < self.next.load(Ordering::Relaxed)
    }
}

/// Engine tunables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportConfig {
    /// Interval between liveness checks.
    pub ping_interval: Duration,
    /// How long to wait for traffic after a PING.
    pub ping_timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            ping_interval: constants::PING_INTERVAL,
            ping_timeout: constants::PING_TIMEOUT,
        }
    }
}

impl TransportConfig {
    /// Set the ping interval.
    ///
    /// The heartbeat raises anything below
    /// [`MIN_PING_INTERVAL`](crate::core::MIN_PING_INTERVAL) to that minimum.
    pub fn with_ping_interval(mut self, interval: Duration) -> Self {
        self.ping_interval = interval;
        self
    }

    /// Set the pong timeout.
    pub fn with_ping_timeout(mut self, timeout: Duration) -> Self {
        self.ping_timeout = timeout;
        self
    }
}

/// Sans-IO subscription transport over sockets produced by `C`.
pub struct TransportEngine<C: Connector> {
    connector: C,
    connection: Connection<C::Socket>,
    registry: SubscriptionRegistry,
    ids: IdAllocator,
}

impl<C: Connector> TransportEngine<C> {
    /// Create an engine and start connecting.
    pub fn new(connector: C, config: TransportConfig) -> Self {
        Self::with_ids(connector, config, IdAllocator::new())
    }

    /// Create an engine that allocates ids from a shared counter.
    pub fn with_ids(connector: C, config: TransportConfig, ids: IdAllocator) -> Self {
        let heartbeat = Heartbeat::new(config.ping_interval, config.ping_timeout);
        let mut engine = Self {
            connector,
            connection: Connection::new(heartbeat),
            registry: SubscriptionRegistry::new(),
            ids,
        };
        engine.connect();
        engine
    }

    /// The id counter used by this engine.
    pub fn id_allocator(&self) -> IdAllocator {
        self.ids.clone()
    }

    /// Ready state of the current socket.
    pub fn ready_state(&self) -> ReadyState {
        self.connection.ready_state()
    }

    /// Id of the current socket.
    pub fn socket_id(&self) -> SocketId {
        self.connection.socket_id()
    }

    /// Subscription registry, for inspection.
    pub fn registry(&self) -> &SubscriptionRegistry {
        &self.registry
    }

    /// Open a subscription and return its id.
    pub fn subscribe(
        &mut self,
        path: impl Into<String>,
        listeners: SubscriptionListeners,
        headers: Headers,
    ) -> SubscriptionId {
        let id = self.ids.allocate();
        self.subscribe_with_id(id, path, listeners, headers);
        id
    }

    /// Open a subscription under an id taken from [`Self::id_allocator`].
    ///
    /// Until the socket's open signal was handled the subscription is parked,
    /// and its SUBSCRIBE is sent in id order with the others on open.
    pub fn subscribe_with_id(
        &mut self,
        id: SubscriptionId,
        path: impl Into<String>,
        listeners: SubscriptionListeners,
        headers: Headers,
    ) {
        let path = path.into();
        self.try_reconnect_if_needed();

        if !self.connection.is_open() {
            debug!("parking subscription {} to {} until the socket opens", id, path);
            self.registry
                .add(id, path, listeners, headers, SubscriptionState::Pending);
            return;
        }

        let frame = Frame::Subscribe {
            id,
            path: path.clone(),
            headers: headers.clone(),
        };
        self.registry
            .add(id, path, listeners, headers, SubscriptionState::Active);
        self.send_frame(&frame);
    }

    /// Close a subscription and notify its `on_end` listener.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> TransportResult<()> {
        if let Some(mut record) = self.registry.remove(SubscriptionState::Active, id) {
            self.send_frame(&Frame::Unsubscribe { id });
            record.listeners.end(None);
            return Ok(());
        }
        if let Some(mut record) = self.registry.remove(SubscriptionState::Pending, id) {
            record.listeners.end(None);
            return Ok(());
        }
        warn!("unsubscribe for unknown subscription {}", id);
        Err(TransportError::UnknownSubscription(id))
    }

    /// Force the connection closed.
    ///
    /// Every registered subscription is notified: `on_error(error)` when an
    /// error is given, `on_end(None)` otherwise. A new socket is created
    /// afterwards.
    pub fn close(&mut self, error: Option<PlatformError>) {
        if !self.connection.force_close(error) {
            return;
        }
        self.on_close();
    }

    /// Close the connection for good.
    ///
    /// Every subscription gets `on_end(None)` and no new socket is created.
    /// A later [`Self::subscribe`] connects again.
    pub fn shutdown(&mut self) {
        info!("shutting down {}", self.connection.socket_id());
        self.connection.force_close(None);
        // Nothing may be carried over to the next socket.
        self.connection.take_closed_error();
        self.end_all(None);
    }

    /// Feed one socket signal.
    pub fn handle_signal(&mut self, signal: Signal, now: Instant) {
        if !self.connection.is_current(signal.socket) {
            debug!("ignoring {:?} from stale {}", signal.event, signal.socket);
            return;
        }

        match signal.event {
            SocketEvent::Open => self.on_open(now),
            SocketEvent::Message(text) => self.on_message(&text, now),
            SocketEvent::Error(message) => {
                warn!("{} reported an error: {}", signal.socket, message);
                self.connection.record_error(PlatformError::network(message));
            }
            SocketEvent::Close => {
                info!("{} closed", signal.socket);
                self.connection.mark_closed();
                self.on_close();
            }
        }
    }

    /// Earliest deadline at which [`Self::handle_timeout`] must be called.
    pub fn poll_timeout(&self) -> Option<Instant> {
        self.connection.heartbeat.poll_timeout()
    }

    /// Run every timer that is due at `now`.
    pub fn handle_timeout(&mut self, now: Instant) {
        match self.connection.heartbeat.on_timeout(now) {
            HeartbeatAction::Idle => {}
            HeartbeatAction::SendPing(id) => {
                debug!("sending ping {}", id);
                self.send_frame(&Frame::Ping { id });
            }
            HeartbeatAction::Dead => {
                info!("no traffic after ping, closing {}", self.connection.socket_id());
                self.close(Some(PlatformError::network(
                    "Pong response wasn't received until timeout.",
                )));
            }
        }
    }

    fn connect(&mut self) {
        let id = self.connection.next_socket_id();
        debug!("connecting {}", id);
        let socket = self.connector.connect(id);
        self.connection.attach(id, socket);
    }

    fn try_reconnect_if_needed(&mut self) {
        if self.connection.is_lost() {
            // Its close signal turns stale once the next socket is attached.
            info!("{} closed before its close signal", self.connection.socket_id());
            self.connection.mark_closed();
            let error = self.connection.take_closed_error();
            self.end_all(error);
        }
        if self.connection.needs_reconnect() {
            self.connect();
        }
    }

    fn on_open(&mut self, now: Instant) {
        info!("{} open", self.connection.socket_id());
        self.connection.on_open(now);
        for id in self.registry.all(SubscriptionState::Pending) {
            let Some(record) = self.registry.activate(id) else {
                continue;
            };
            let frame = Frame::Subscribe {
                id,
                path: record.path.clone(),
                headers: record.headers.clone(),
            };
            self.send_frame(&frame);
        }
    }

    fn on_message(&mut self, text: &str, now: Instant) {
        self.connection.heartbeat.on_message(now);

        let frame = match Frame::decode(text) {
            Ok(frame) => frame,
            Err(e) => {
                warn!("dropping connection on malformed message: {}", e);
                self.close(Some(PlatformError::Protocol(e)));
                return;
            }
        };

        match frame {
            Frame::Ping { id } => self.send_frame(&Frame::Pong { id }),
            Frame::Pong { id } => {
                if !self.connection.heartbeat.on_pong(&id) {
                    warn!("pong id {} does not match the ping in flight", id);
                }
            }
            Frame::Close {
                status_code,
                headers,
                body,
            } => {
                info!("server closed the connection with status {}", status_code);
                let body = json!({
                    "error": body.error,
                    "error_description": body.error_description,
                });
                let response = ErrorResponse::new(status_code, headers, body);
                self.close(Some(PlatformError::Server(response)));
            }
            // Rejected by the decoder.
            Frame::Subscribe { .. } | Frame::Unsubscribe { .. } => {}
            Frame::Open { id, payload } => {
                if let Some(record) = self.active_record(id) {
                    record.listeners.open(payload);
                }
            }
            Frame::Event { id, event } => {
                if let Some(record) = self.active_record(id) {
                    record.listeners.event(event);
                }
            }
            Frame::EndOfStream {
                id,
                status_code,
                headers,
                body,
            } => {
                if self.active_record(id).is_none() {
                    return;
                }
                let Some(mut record) = self.registry.remove(SubscriptionState::Active, id) else {
                    return;
                };
                if status_code == EOS_STATUS_NO_CONTENT {
                    record.listeners.end(None);
                } else {
                    let response = ErrorResponse::new(status_code, headers, body);
                    record.listeners.error(PlatformError::Server(response));
                }
            }
        }
    }

    /// Look up the active record a subscription-scoped frame refers to.
    ///
    /// Frames for ids that were issued but are no longer active (typically
    /// an EOS racing an unsubscribe) are dropped. An id that was never issued
    /// is a protocol violation and closes the connection.
    fn active_record(
        &mut self,
        id: SubscriptionId,
    ) -> Option<&mut SubscriptionRecord> {
        if self.registry.has(SubscriptionState::Active, id) {
            return self.registry.get_mut(SubscriptionState::Active, id);
        }
        if self.ids.was_issued(id) {
            debug!("dropping message for inactive subscription {}", id);
        } else {
            warn!("message for non existing subscription {}", id);
            self.close(Some(PlatformError::Protocol(FrameError::UnknownSubscription(
                id.as_u64(),
            ))));
        }
        None
    }

    /// Transition after the current socket went away.
    fn on_close(&mut self) {
        let error = self.connection.take_closed_error();
        self.end_all(error);
        self.try_reconnect_if_needed();
    }

    /// Drain both registries, notifying every listener.
    fn end_all(&mut self, error: Option<PlatformError>) {
        for state in [SubscriptionState::Pending, SubscriptionState::Active] {
            for (id, mut record) in self.registry.remove_all(state) {
                debug!("ending subscription {} after connection close", id);
                match &error {
                    Some(error) => record.listeners.error(error.clone()),
                    None => record.listeners.end(None),
                }
            }
        }
    }

    fn send_frame(&mut self, frame: &Frame) {
        if let Err(e) = self.connection.send(frame.encode()) {
            warn!("can't send {} message: {}", frame.message_type().name(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Socket, SocketError};
    use std::sync::Mutex;

    #[derive(Debug)]
    struct Wire {
        state: ReadyState,
        sent: Vec<String>,
        close_requested: bool,
    }

    type SharedWire = Arc<Mutex<Wire>>;

    struct MockSocket(SharedWire);

    impl Socket for MockSocket {
        fn ready_state(&self) -> ReadyState {
            self.0.lock().unwrap().state
        }

        fn send(&mut self, text: String) -> Result<(), SocketError> {
            let mut wire = self.0.lock().unwrap();
            if wire.state != ReadyState::Open {
                return Err(SocketError::NotOpen(wire.state));
            }
            wire.sent.push(text);
            Ok(())
        }

        fn close(&mut self) {
            let mut wire = self.0.lock().unwrap();
            wire.close_requested = true;
            wire.state = ReadyState::Closing;
        }
    }

    #[derive(Clone, Default)]
    struct MockConnector {
        sockets: Arc<Mutex<Vec<(SocketId, SharedWire)>>>,
    }

    impl Connector for MockConnector {
        type Socket = MockSocket;

        fn connect(&mut self, id: SocketId) -> MockSocket {
            let wire = Arc::new(Mutex::new(Wire {
                state: ReadyState::Connecting,
                sent: Vec::new(),
                close_requested: false,
            }));
            self.sockets.lock().unwrap().push((id, Arc::clone(&wire)));
            MockSocket(wire)
        }
    }

    impl MockConnector {
        fn count(&self) -> usize {
            self.sockets.lock().unwrap().len()
        }

        fn wire(&self, index: usize) -> (SocketId, SharedWire) {
            let sockets = self.sockets.lock().unwrap();
            let (id, wire) = &sockets[index];
            (*id, Arc::clone(wire))
        }

        fn last(&self) -> (SocketId, SharedWire) {
            self.wire(self.count() - 1)
        }

        fn sent(&self, index: usize) -> Vec<String> {
            self.wire(index).1.lock().unwrap().sent.clone()
        }
    }

    type Log = Arc<Mutex<Vec<String>>>;

    fn recording(log: &Log, name: &str) -> SubscriptionListeners {
        let (open, event, end, error) = (log.clone(), log.clone(), log.clone(), log.clone());
        let (n1, n2, n3, n4) = (
            name.to_string(),
            name.to_string(),
            name.to_string(),
            name.to_string(),
        );
        SubscriptionListeners::new()
            .on_open(move |payload| open.lock().unwrap().push(format!("{n1} open {payload}")))
            .on_event(move |e| event.lock().unwrap().push(format!("{n2} event {}", e.event_id)))
            .on_end(move |_| end.lock().unwrap().push(format!("{n3} end")))
            .on_error(move |e| {
                let kind = match &e {
                    PlatformError::Network(_) => "network".to_string(),
                    PlatformError::Server(response) => response.status_code.to_string(),
                    PlatformError::Protocol(_) => "protocol".to_string(),
                };
                error.lock().unwrap().push(format!("{n4} error {kind}"));
            })
    }

    fn entries(log: &Log) -> Vec<String> {
        log.lock().unwrap().clone()
    }

    fn engine() -> (TransportEngine<MockConnector>, MockConnector) {
        let connector = MockConnector::default();
        let engine = TransportEngine::new(connector.clone(), TransportConfig::default());
        (engine, connector)
    }

    fn open(engine: &mut TransportEngine<MockConnector>, connector: &MockConnector, now: Instant) -> SocketId {
        let (id, wire) = connector.last();
        wire.lock().unwrap().state = ReadyState::Open;
        engine.handle_signal(Signal::new(id, SocketEvent::Open), now);
        id
    }

    fn receive(engine: &mut TransportEngine<MockConnector>, socket: SocketId, text: &str) {
        engine.handle_signal(
            Signal::new(socket, SocketEvent::Message(text.to_string())),
            Instant::now(),
        );
    }

    #[test]
    fn test_engine_connects_on_creation() {
        let (engine, connector) = engine();
        assert_eq!(connector.count(), 1);
        assert_eq!(engine.ready_state(), ReadyState::Connecting);
        assert_eq!(engine.poll_timeout(), None);
    }

    #[test]
    fn test_subscribe_before_open_is_parked() {
        let (mut engine, connector) = engine();
        let log = Log::default();

        let id = engine.subscribe("/a", recording(&log, "a"), Headers::new());
        assert_eq!(engine.registry().state_of(id), Some(SubscriptionState::Pending));
        assert!(connector.sent(0).is_empty());

        open(&mut engine, &connector, Instant::now());
        assert_eq!(engine.registry().state_of(id), Some(SubscriptionState::Active));
        assert_eq!(connector.sent(0), vec![r#"[100,0,"/a",{}]"#.to_string()]);
        assert!(engine.poll_timeout().is_some());
    }

    #[test]
    fn test_subscribe_when_open_sends_immediately() {
        let (mut engine, connector) = engine();
        open(&mut engine, &connector, Instant::now());

        let mut headers = Headers::new();
        headers.insert("Authorization".to_string(), "Bearer t".to_string());
        let first = engine.subscribe("/a", SubscriptionListeners::new(), Headers::new());
        let second = engine.subscribe("/b", SubscriptionListeners::new(), headers);

        assert_eq!(first.as_u64(), 0);
        assert_eq!(second.as_u64(), 1);
        assert_eq!(
            connector.sent(0),
            vec![
                r#"[100,0,"/a",{}]"#.to_string(),
                r#"[100,1,"/b",{"Authorization":"Bearer t"}]"#.to_string(),
            ]
        );
    }

    #[test]
    fn test_open_and_event_dispatch() {
        let (mut engine, connector) = engine();
        let log = Log::default();
        let socket = open(&mut engine, &connector, Instant::now());
        engine.subscribe("/a", recording(&log, "a"), Headers::new());
        engine.subscribe("/b", recording(&log, "b"), Headers::new());

        receive(&mut engine, socket, r#"[101,1,{"ok":true}]"#);
        receive(&mut engine, socket, r#"[102,0,"e1",{},{"n":1}]"#);

        assert_eq!(entries(&log), vec![r#"b open {"ok":true}"#, "a event e1"]);
    }

    #[test]
    fn test_end_of_stream() {
        let (mut engine, connector) = engine();
        let log = Log::default();
        let socket = open(&mut engine, &connector, Instant::now());
        let a = engine.subscribe("/a", recording(&log, "a"), Headers::new());
        let b = engine.subscribe("/b", recording(&log, "b"), Headers::new());

        receive(&mut engine, socket, "[199,0,204,{},null]");
        receive(&mut engine, socket, r#"[199,1,503,{"Retry-After":"2"},{"error":"busy"}]"#);

        assert_eq!(entries(&log), vec!["a end", "b error 503"]);
        assert_eq!(engine.registry().state_of(a), None);
        assert_eq!(engine.registry().state_of(b), None);
        assert_eq!(connector.count(), 1);
    }

    #[test]
    fn test_ping_is_echoed() {
        let (mut engine, connector) = engine();
        let socket = open(&mut engine, &connector, Instant::now());

        receive(&mut engine, socket, r#"[16,"abc"]"#);
        assert_eq!(connector.sent(0), vec![r#"[17,"abc"]"#.to_string()]);
    }

    #[test]
    fn test_server_close_notifies_and_reconnects() {
        let (mut engine, connector) = engine();
        let log = Log::default();
        let socket = open(&mut engine, &connector, Instant::now());
        engine.subscribe("/a", recording(&log, "a"), Headers::new());
        engine.subscribe("/b", recording(&log, "b"), Headers::new());

        receive(&mut engine, socket, r#"[99,500,{},{"error":"e","error_description":"d"}]"#);

        assert_eq!(entries(&log), vec!["a error 500", "b error 500"]);
        assert!(engine.registry().is_empty(SubscriptionState::Active));
        assert!(connector.wire(0).1.lock().unwrap().close_requested);
        assert_eq!(connector.count(), 2);
        assert_ne!(engine.socket_id(), socket);
    }

    #[test]
    fn test_stale_signals_are_ignored() {
        let (mut engine, connector) = engine();
        let log = Log::default();
        let old = open(&mut engine, &connector, Instant::now());
        engine.close(None);
        assert_eq!(connector.count(), 2);

        engine.subscribe("/a", recording(&log, "a"), Headers::new());
        engine.handle_signal(Signal::new(old, SocketEvent::Open), Instant::now());
        engine.handle_signal(Signal::new(old, SocketEvent::Close), Instant::now());
        receive(&mut engine, old, "[199,0,204,{},null]");

        assert!(entries(&log).is_empty());
        assert_eq!(connector.count(), 2);
        assert_eq!(engine.registry().len(SubscriptionState::Pending), 1);
    }

    #[test]
    fn test_pending_replayed_on_new_socket() {
        let (mut engine, connector) = engine();
        open(&mut engine, &connector, Instant::now());
        engine.close(None);

        engine.subscribe("/a", SubscriptionListeners::new(), Headers::new());
        assert!(connector.sent(1).is_empty());

        open(&mut engine, &connector, Instant::now());
        assert_eq!(connector.sent(1), vec![r#"[100,0,"/a",{}]"#.to_string()]);
    }

    #[test]
    fn test_close_drains_pending() {
        let (mut engine, connector) = engine();
        let log = Log::default();
        let (first, _) = connector.last();
        engine.subscribe("/a", recording(&log, "a"), Headers::new());
        engine.subscribe("/b", recording(&log, "b"), Headers::new());

        engine.close(None);

        assert_eq!(entries(&log), vec!["a end", "b end"]);
        assert!(engine.registry().is_empty(SubscriptionState::Pending));
        assert!(!engine.connection.is_current(first));
        assert_eq!(connector.count(), 2);
    }

    #[test]
    fn test_close_drains_pending_before_active() {
        let (mut engine, connector) = engine();
        let log = Log::default();
        let socket = open(&mut engine, &connector, Instant::now());
        engine.subscribe("/a", recording(&log, "a"), Headers::new());
        let b = engine.ids.allocate();
        engine.registry.add(
            b,
            "/b".to_string(),
            recording(&log, "b"),
            Headers::new(),
            SubscriptionState::Pending,
        );

        engine.handle_signal(Signal::new(socket, SocketEvent::Close), Instant::now());

        assert_eq!(entries(&log), vec!["b end", "a end"]);
        assert!(engine.registry().is_empty(SubscriptionState::Pending));
        assert!(engine.registry().is_empty(SubscriptionState::Active));
        assert_eq!(connector.count(), 2);
    }

    #[test]
    fn test_lost_socket_ends_subscriptions_before_reconnect() {
        let (mut engine, connector) = engine();
        let log = Log::default();
        let old = open(&mut engine, &connector, Instant::now());
        let a = engine.subscribe("/a", recording(&log, "a"), Headers::new());

        // The socket is gone but its close signal is still queued.
        connector.wire(0).1.lock().unwrap().state = ReadyState::Closed;
        let b = engine.subscribe("/b", recording(&log, "b"), Headers::new());

        assert_eq!(entries(&log), vec!["a end"]);
        assert_eq!(engine.registry().state_of(a), None);
        assert_eq!(engine.registry().state_of(b), Some(SubscriptionState::Pending));
        assert_eq!(connector.count(), 2);

        engine.handle_signal(Signal::new(old, SocketEvent::Close), Instant::now());
        open(&mut engine, &connector, Instant::now());

        assert_eq!(entries(&log), vec!["a end"]);
        assert_eq!(connector.sent(1), vec![r#"[100,1,"/b",{}]"#.to_string()]);
    }

    #[test]
    fn test_lost_socket_reports_stored_error() {
        let (mut engine, connector) = engine();
        let log = Log::default();
        let socket = open(&mut engine, &connector, Instant::now());
        engine.subscribe("/a", recording(&log, "a"), Headers::new());
        engine.handle_signal(
            Signal::new(socket, SocketEvent::Error("reset by peer".to_string())),
            Instant::now(),
        );

        connector.wire(0).1.lock().unwrap().state = ReadyState::Closed;
        engine.subscribe("/b", recording(&log, "b"), Headers::new());

        assert_eq!(entries(&log), vec!["a error network"]);
    }

    #[test]
    fn test_subscribe_waits_for_open_signal() {
        let (mut engine, connector) = engine();
        let (socket, wire) = connector.last();
        let a = engine.subscribe("/a", SubscriptionListeners::new(), Headers::new());

        // The handshake finished but the open signal is not handled yet.
        wire.lock().unwrap().state = ReadyState::Open;
        let b = engine.subscribe("/b", SubscriptionListeners::new(), Headers::new());

        assert!(connector.sent(0).is_empty());
        assert_eq!(engine.ready_state(), ReadyState::Connecting);
        assert_eq!(engine.registry().state_of(a), Some(SubscriptionState::Pending));
        assert_eq!(engine.registry().state_of(b), Some(SubscriptionState::Pending));

        engine.handle_signal(Signal::new(socket, SocketEvent::Open), Instant::now());
        assert_eq!(
            connector.sent(0),
            vec![
                r#"[100,0,"/a",{}]"#.to_string(),
                r#"[100,1,"/b",{}]"#.to_string(),
            ]
        );
    }

    #[test]
    fn test_wrong_arity_event_is_protocol_violation() {
        let (mut engine, connector) = engine();
        let log = Log::default();
        let socket = open(&mut engine, &connector, Instant::now());
        engine.subscribe("/a", recording(&log, "a"), Headers::new());

        receive(&mut engine, socket, r#"[102,0,"e1",{}]"#);

        assert_eq!(entries(&log), vec!["a error protocol"]);
        assert!(connector.wire(0).1.lock().unwrap().close_requested);
        assert_eq!(connector.count(), 2);
    }

    #[test]
    fn test_wrong_arity_eos_is_protocol_violation() {
        let (mut engine, connector) = engine();
        let log = Log::default();
        let socket = open(&mut engine, &connector, Instant::now());
        engine.subscribe("/a", recording(&log, "a"), Headers::new());

        receive(&mut engine, socket, "[199,0,204,{}]");

        assert_eq!(entries(&log), vec!["a error protocol"]);
        assert_eq!(connector.count(), 2);
        assert_ne!(engine.socket_id(), socket);
    }

    #[test]
    fn test_malformed_message_is_protocol_violation() {
        let (mut engine, connector) = engine();
        let log = Log::default();
        let socket = open(&mut engine, &connector, Instant::now());
        engine.subscribe("/a", recording(&log, "a"), Headers::new());

        receive(&mut engine, socket, "not json");

        assert_eq!(entries(&log), vec!["a error protocol"]);
        assert_eq!(connector.count(), 2);
    }

    #[test]
    fn test_never_issued_id_is_protocol_violation() {
        let (mut engine, connector) = engine();
        let log = Log::default();
        let socket = open(&mut engine, &connector, Instant::now());
        engine.subscribe("/a", recording(&log, "a"), Headers::new());

        receive(&mut engine, socket, r#"[102,42,"e",{},null]"#);

        assert_eq!(entries(&log), vec!["a error protocol"]);
        assert_eq!(connector.count(), 2);
    }

    #[test]
    fn test_server_subscribe_is_protocol_violation() {
        let (mut engine, connector) = engine();
        let socket = open(&mut engine, &connector, Instant::now());

        receive(&mut engine, socket, r#"[100,0,"/a",{}]"#);
        assert_eq!(connector.count(), 2);
    }

    #[test]
    fn test_unsubscribe() {
        let (mut engine, connector) = engine();
        let log = Log::default();
        let socket = open(&mut engine, &connector, Instant::now());
        let id = engine.subscribe("/a", recording(&log, "a"), Headers::new());

        assert!(engine.unsubscribe(id).is_ok());
        assert_eq!(entries(&log), vec!["a end"]);
        assert_eq!(connector.sent(0).last().map(String::as_str), Some("[198,0]"));

        // The server's EOS racing the unsubscribe is dropped quietly.
        receive(&mut engine, socket, "[199,0,204,{},null]");
        assert_eq!(entries(&log), vec!["a end"]);
        assert_eq!(connector.count(), 1);

        assert_eq!(
            engine.unsubscribe(id),
            Err(TransportError::UnknownSubscription(id))
        );
    }

    #[test]
    fn test_unsubscribe_pending_sends_nothing() {
        let (mut engine, connector) = engine();
        let log = Log::default();
        let id = engine.subscribe("/a", recording(&log, "a"), Headers::new());

        assert!(engine.unsubscribe(id).is_ok());
        open(&mut engine, &connector, Instant::now());

        assert_eq!(entries(&log), vec!["a end"]);
        assert!(connector.sent(0).is_empty());
    }

    #[test]
    fn test_socket_close_ends_subscriptions() {
        let (mut engine, connector) = engine();
        let log = Log::default();
        let socket = open(&mut engine, &connector, Instant::now());
        engine.subscribe("/a", recording(&log, "a"), Headers::new());

        engine.handle_signal(Signal::new(socket, SocketEvent::Close), Instant::now());

        assert_eq!(entries(&log), vec!["a end"]);
        assert_eq!(connector.count(), 2);
        assert_eq!(engine.poll_timeout(), None);
    }

    #[test]
    fn test_socket_error_reported_on_close() {
        let (mut engine, connector) = engine();
        let log = Log::default();
        let socket = open(&mut engine, &connector, Instant::now());
        engine.subscribe("/a", recording(&log, "a"), Headers::new());

        engine.handle_signal(
            Signal::new(socket, SocketEvent::Error("reset by peer".to_string())),
            Instant::now(),
        );
        assert!(entries(&log).is_empty());

        engine.handle_signal(Signal::new(socket, SocketEvent::Close), Instant::now());
        assert_eq!(entries(&log), vec!["a error network"]);
    }

    #[test]
    fn test_pong_timeout_closes_connection() {
        let config = TransportConfig::default()
            .with_ping_interval(Duration::from_secs(30))
            .with_ping_timeout(Duration::from_secs(10));
        let connector = MockConnector::default();
        let mut engine = TransportEngine::new(connector.clone(), config);
        let log = Log::default();
        let start = Instant::now();
        open(&mut engine, &connector, start);
        engine.subscribe("/a", recording(&log, "a"), Headers::new());

        assert_eq!(engine.poll_timeout(), Some(start + Duration::from_secs(30)));
        engine.handle_timeout(start + Duration::from_secs(30));
        let sent = connector.sent(0);
        assert!(sent.last().is_some_and(|text| text.starts_with("[16,")));

        engine.handle_timeout(start + Duration::from_secs(40));
        assert_eq!(entries(&log), vec!["a error network"]);
        assert_eq!(connector.count(), 2);
    }

    #[test]
    fn test_pong_keeps_connection() {
        let connector = MockConnector::default();
        let mut engine = TransportEngine::new(connector.clone(), TransportConfig::default());
        let start = Instant::now();
        let socket = open(&mut engine, &connector, start);

        engine.handle_timeout(start + constants::PING_INTERVAL);
        let ping = connector.sent(0).pop().unwrap();
        let id = ping.trim_start_matches("[16,").trim_end_matches(']');
        engine.handle_signal(
            Signal::new(socket, SocketEvent::Message(format!("[17,{id}]"))),
            start + constants::PING_INTERVAL + Duration::from_secs(1),
        );

        engine.handle_timeout(start + constants::PING_INTERVAL + constants::PING_TIMEOUT);
        assert_eq!(connector.count(), 1);
        assert_eq!(engine.ready_state(), ReadyState::Open);
    }

    #[test]
    fn test_shutdown_does_not_reconnect() {
        let (mut engine, connector) = engine();
        let log = Log::default();
        let socket = open(&mut engine, &connector, Instant::now());
        engine.subscribe("/a", recording(&log, "a"), Headers::new());

        engine.shutdown();

        assert_eq!(entries(&log), vec!["a end"]);
        assert_eq!(connector.count(), 1);
        assert_eq!(engine.ready_state(), ReadyState::Closed);
        assert_eq!(engine.poll_timeout(), None);
        assert!(!engine.connection.is_current(socket));

        engine.subscribe("/b", SubscriptionListeners::new(), Headers::new());
        assert_eq!(connector.count(), 2);
    }

    #[test]
    fn test_shared_id_allocator() {
        let (mut engine, _connector) = engine();
        let ids = engine.id_allocator();
        let reserved = ids.allocate();
        assert!(ids.was_issued(reserved));

        let next = engine.subscribe("/a", SubscriptionListeners::new(), Headers::new());
        assert!(next > reserved);
        assert!(!ids.was_issued(SubscriptionId::new(next.as_u64() + 1)));
    }
}
