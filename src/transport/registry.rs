//! Subscription registry.
//!
//! A single arena of subscription records keyed by [`SubscriptionId`]. Each
//! record carries its own [`SubscriptionState`], so an id is structurally in
//! at most one of the pending or active sets. The registry operations take
//! the state they act on, which gives the two logical registries without two
//! maps to keep in sync.

use std::collections::BTreeMap;
use std::fmt;

use serde_json::Value;

use super::frame::{SubscriptionEvent, SubscriptionId};
use crate::core::{Headers, PlatformError};

type OpenListener = Box<dyn FnMut(Value) + Send>;
type EventListener = Box<dyn FnMut(SubscriptionEvent) + Send>;
type EndListener = Box<dyn FnMut(Option<PlatformError>) + Send>;
type ErrorListener = Box<dyn FnMut(PlatformError) + Send>;

/// Callbacks attached to one subscription. Any of them may be absent.
#[derive(Default)]
pub struct SubscriptionListeners {
    on_open: Option<OpenListener>,
    on_event: Option<EventListener>,
    on_end: Option<EndListener>,
    on_error: Option<ErrorListener>,
}

impl SubscriptionListeners {
    /// Create an empty listener set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Called with the OPEN acknowledgement value.
    pub fn on_open(mut self, f: impl FnMut(Value) + Send + 'static) -> Self {
        self.on_open = Some(Box::new(f));
        self
    }

    /// Called for every EVENT frame.
    pub fn on_event(mut self, f: impl FnMut(SubscriptionEvent) + Send + 'static) -> Self {
        self.on_event = Some(Box::new(f));
        self
    }

    /// Called when the stream ends without error.
    pub fn on_end(mut self, f: impl FnMut(Option<PlatformError>) + Send + 'static) -> Self {
        self.on_end = Some(Box::new(f));
        self
    }

    /// Called when the stream fails.
    pub fn on_error(mut self, f: impl FnMut(PlatformError) + Send + 'static) -> Self {
        self.on_error = Some(Box::new(f));
        self
    }

    pub(crate) fn open(&mut self, payload: Value) {
        if let Some(f) = self.on_open.as_mut() {
            f(payload);
        }
    }

    pub(crate) fn event(&mut self, event: SubscriptionEvent) {
        if let Some(f) = self.on_event.as_mut() {
            f(event);
        }
    }

    pub(crate) fn end(&mut self, error: Option<PlatformError>) {
        if let Some(f) = self.on_end.as_mut() {
            f(error);
        }
    }

    pub(crate) fn error(&mut self, error: PlatformError) {
        if let Some(f) = self.on_error.as_mut() {
            f(error);
        }
    }
}

impl fmt::Debug for SubscriptionListeners {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionListeners")
            .field("on_open", &self.on_open.is_some())
            .field("on_event", &self.on_event.is_some())
            .field("on_end", &self.on_end.is_some())
            .field("on_error", &self.on_error.is_some())
            .finish()
    }
}

/// Which logical registry a record lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubscriptionState {
    /// Registered while the socket was not open; SUBSCRIBE not yet sent.
    Pending,
    /// SUBSCRIBE has been sent on the current socket.
    Active,
}

/// One logical stream.
#[derive(Debug)]
pub struct SubscriptionRecord {
    /// Resource path.
    pub path: String,
    /// Subscribe-time headers.
    pub headers: Headers,
    /// Callbacks.
    pub listeners: SubscriptionListeners,
    /// Current registry.
    pub state: SubscriptionState,
}

/// Arena of subscriptions keyed by id.
///
/// Ids are allocated monotonically, so id order is insertion order and
/// every snapshot iterates in the order subscriptions were issued.
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    records: BTreeMap<SubscriptionId, SubscriptionRecord>,
}

impl SubscriptionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a record in the given state, replacing any record with the same id.
    pub fn add(
        &mut self,
        id: SubscriptionId,
        path: String,
        listeners: SubscriptionListeners,
        headers: Headers,
        state: SubscriptionState,
    ) -> SubscriptionId {
        self.records.insert(
            id,
            SubscriptionRecord {
                path,
                headers,
                listeners,
                state,
            },
        );
        id
    }

    /// Get a record if it is in the given state.
    pub fn get(&self, state: SubscriptionState, id: SubscriptionId) -> Option<&SubscriptionRecord> {
        self.records.get(&id).filter(|record| record.state == state)
    }

    /// Get a record mutably if it is in the given state.
    pub fn get_mut(
        &mut self,
        state: SubscriptionState,
        id: SubscriptionId,
    ) -> Option<&mut SubscriptionRecord> {
        self.records
            .get_mut(&id)
            .filter(|record| record.state == state)
    }

    /// Check if the id is registered in the given state.
    pub fn has(&self, state: SubscriptionState, id: SubscriptionId) -> bool {
        self.get(state, id).is_some()
    }

    /// State of the id, if it is registered at all.
    pub fn state_of(&self, id: SubscriptionId) -> Option<SubscriptionState> {
        self.records.get(&id).map(|record| record.state)
    }

    /// Remove a record if it is in the given state.
    pub fn remove(
        &mut self,
        state: SubscriptionState,
        id: SubscriptionId,
    ) -> Option<SubscriptionRecord> {
        if self.has(state, id) {
            self.records.remove(&id)
        } else {
            None
        }
    }

    /// Check if no record is in the given state.
    pub fn is_empty(&self, state: SubscriptionState) -> bool {
        !self.records.values().any(|record| record.state == state)
    }

    /// Number of records in the given state.
    pub fn len(&self, state: SubscriptionState) -> usize {
        self.records
            .values()
            .filter(|record| record.state == state)
            .count()
    }

    /// Ids in the given state, in insertion order.
    ///
    /// The snapshot is detached from the registry, so it stays stable while
    /// the caller mutates records during iteration.
    pub fn all(&self, state: SubscriptionState) -> Vec<SubscriptionId> {
        self.records
            .iter()
            .filter(|(_, record)| record.state == state)
            .map(|(id, _)| *id)
            .collect()
    }

    /// Remove and return every record in the given state, in insertion order.
    pub fn remove_all(&mut self, state: SubscriptionState) -> Vec<(SubscriptionId, SubscriptionRecord)> {
        let ids = self.all(state);
        ids.into_iter()
            .filter_map(|id| self.records.remove(&id).map(|record| (id, record)))
            .collect()
    }

    /// Move a pending record to the active registry.
    ///
    /// Returns the record for sending its SUBSCRIBE frame, or `None` if the
    /// id was not pending.
    pub fn activate(&mut self, id: SubscriptionId) -> Option<&SubscriptionRecord> {
        let record = self.get_mut(SubscriptionState::Pending, id)?;
        record.state = SubscriptionState::Active;
        Some(record)
    }
}
