//! In-memory sockets for driving a [`TransportClient`] in tests.

use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

use super::TransportClient;
use crate::core::{Connector, ReadyState, Signal, Socket, SocketError, SocketEvent, SocketId};
use crate::transport::TransportConfig;

/// Server side of one mock socket.
pub(crate) struct Remote {
    pub(crate) id: SocketId,
    state: Arc<Mutex<ReadyState>>,
    outbound: mpsc::UnboundedReceiver<String>,
    signals: mpsc::UnboundedSender<Signal>,
}

impl Remote {
    pub(crate) fn open(&self) {
        *self.state.lock().unwrap() = ReadyState::Open;
        self.emit(SocketEvent::Open);
    }

    pub(crate) fn emit(&self, event: SocketEvent) {
        self.signals.send(Signal::new(self.id, event)).unwrap();
    }

    pub(crate) fn deliver(&self, text: &str) {
        self.emit(SocketEvent::Message(text.to_string()));
    }

    pub(crate) async fn next_sent(&mut self) -> String {
        self.outbound.recv().await.unwrap()
    }
}

pub(crate) struct MockSocket {
    state: Arc<Mutex<ReadyState>>,
    outbound: mpsc::UnboundedSender<String>,
}

impl Socket for MockSocket {
    fn ready_state(&self) -> ReadyState {
        *self.state.lock().unwrap()
    }

    fn send(&mut self, text: String) -> Result<(), SocketError> {
        let _ = self.outbound.send(text);
        Ok(())
    }

    fn close(&mut self) {
        *self.state.lock().unwrap() = ReadyState::Closed;
    }
}

pub(crate) struct MockConnector {
    signals: mpsc::UnboundedSender<Signal>,
    remotes: mpsc::UnboundedSender<Remote>,
}

impl Connector for MockConnector {
    type Socket = MockSocket;

    fn connect(&mut self, id: SocketId) -> MockSocket {
        let state = Arc::new(Mutex::new(ReadyState::Connecting));
        let (outbound_tx, outbound) = mpsc::unbounded_channel();
        let _ = self.remotes.send(Remote {
            id,
            state: Arc::clone(&state),
            outbound,
            signals: self.signals.clone(),
        });
        MockSocket {
            state,
            outbound: outbound_tx,
        }
    }
}

pub(crate) fn spawn_client(config: TransportConfig) -> (TransportClient, mpsc::UnboundedReceiver<Remote>) {
    let (remotes, remote_rx) = mpsc::unbounded_channel();
    let client = TransportClient::spawn(move |signals| MockConnector { signals, remotes }, config);
    (client, remote_rx)
}
