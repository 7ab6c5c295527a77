//! Heartbeat timing.
//!
//! The heartbeat owns two timers expressed as deadlines: the repeating ping
//! tick and the one-shot pong timeout. Arming a timer stores its deadline,
//! cancelling it clears the deadline. Whoever drives the transport sleeps
//! until [`Heartbeat::poll_timeout`] and then calls
//! [`Heartbeat::on_timeout`].
//!
//! Any inbound message counts as proof of liveness, not only PONGs.

use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use serde_json::Value;

/// Heartbeat timing defaults.
pub mod constants {
    pub use crate::core::{MIN_PING_INTERVAL, PING_INTERVAL, PING_TIMEOUT};
}

/// What the heartbeat wants done after a timer fired.
#[derive(Debug, Clone, PartialEq)]
pub enum HeartbeatAction {
    /// Nothing to do.
    Idle,
    /// Send a PING carrying this id.
    SendPing(Value),
    /// No traffic within the pong timeout; the connection is dead.
    Dead,
}

/// Ping/pong liveness tracker for one connection.
#[derive(Debug, Clone)]
pub struct Heartbeat {
    ping_interval: Duration,
    ping_timeout: Duration,
    /// Next ping tick, armed while the connection is open.
    next_tick: Option<Instant>,
    /// Pong timeout, armed while a ping is in flight.
    pong_deadline: Option<Instant>,
    last_sent_ping_id: Option<Value>,
    last_message_received: Option<Instant>,
}

impl Default for Heartbeat {
    fn default() -> Self {
        Self::new(constants::PING_INTERVAL, constants::PING_TIMEOUT)
    }
}

impl Heartbeat {
    /// Create a stopped heartbeat.
    ///
    /// An interval below [`constants::MIN_PING_INTERVAL`] is raised to it.
    pub fn new(ping_interval: Duration, ping_timeout: Duration) -> Self {
        Self {
            ping_interval: ping_interval.max(constants::MIN_PING_INTERVAL),
            ping_timeout,
            next_tick: None,
            pong_deadline: None,
            last_sent_ping_id: None,
            last_message_received: None,
        }
    }

    /// Arm the repeating tick.
    pub fn start(&mut self, now: Instant) {
        self.next_tick = Some(now + self.ping_interval);
        self.pong_deadline = None;
        self.last_sent_ping_id = None;
    }

    /// Cancel both timers.
    pub fn stop(&mut self) {
        self.next_tick = None;
        self.pong_deadline = None;
        self.last_sent_ping_id = None;
    }

    /// Check if the tick timer is armed.
    pub fn is_running(&self) -> bool {
        self.next_tick.is_some()
    }

    /// Check if a ping is in flight.
    pub fn is_awaiting_pong(&self) -> bool {
        self.pong_deadline.is_some()
    }

    /// Id of the ping in flight.
    pub fn last_sent_ping_id(&self) -> Option<&Value> {
        self.last_sent_ping_id.as_ref()
    }

    /// Record that a message of any type was received.
    pub fn on_message(&mut self, now: Instant) {
        self.last_message_received = Some(now);
    }

    /// Earliest armed deadline.
    pub fn poll_timeout(&self) -> Option<Instant> {
        match (self.next_tick, self.pong_deadline) {
            (Some(tick), Some(pong)) => Some(tick.min(pong)),
            (tick, pong) => tick.or(pong),
        }
    }

    /// Handle every timer that is due at `now`.
    pub fn on_timeout(&mut self, now: Instant) -> HeartbeatAction {
        if let Some(deadline) = self.pong_deadline
            && now >= deadline
        {
            // A message other than the matching pong may have arrived meanwhile.
            if self.received_within_timeout(now) {
                self.pong_deadline = None;
            } else {
                self.stop();
                return HeartbeatAction::Dead;
            }
        }

        let Some(tick) = self.next_tick else {
            return HeartbeatAction::Idle;
        };
        if now < tick {
            return HeartbeatAction::Idle;
        }

        // A tick that fell behind restarts the cadence from now.
        let next = tick + self.ping_interval;
        self.next_tick = Some(if next > now { next } else { now + self.ping_interval });

        if self.pong_deadline.is_some() || self.received_within_timeout(now) {
            return HeartbeatAction::Idle;
        }

        let id = Value::from(wall_clock_millis());
        self.last_sent_ping_id = Some(id.clone());
        self.pong_deadline = Some(now + self.ping_timeout);
        HeartbeatAction::SendPing(id)
    }

    /// Handle a PONG. Returns `false` if the id did not match the ping in flight.
    pub fn on_pong(&mut self, id: &Value) -> bool {
        let matched = self.last_sent_ping_id.as_ref() == Some(id);
        self.pong_deadline = None;
        self.last_sent_ping_id = None;
        matched
    }

    fn received_within_timeout(&self, now: Instant) -> bool {
        self.last_message_received
            .is_some_and(|at| now.saturating_duration_since(at) < self.ping_timeout)
    }
}

fn wall_clock_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
