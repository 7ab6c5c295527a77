//! Protocol constants and configuration defaults.
//!
//! Message type tags are fixed by the wire protocol and MUST NOT be changed.
//! Timing and backoff values are defaults that the config builders override.

use std::time::Duration;

// =============================================================================
// MESSAGE TYPES
// =============================================================================

/// Client → server: open a subscription.
pub const MESSAGE_TYPE_SUBSCRIBE: u64 = 100;

/// Server → client: subscription accepted.
pub const MESSAGE_TYPE_OPEN: u64 = 101;

/// Server → client: one event on a subscription.
pub const MESSAGE_TYPE_EVENT: u64 = 102;

/// Either direction: liveness check.
pub const MESSAGE_TYPE_PING: u64 = 16;

/// Either direction: liveness check answer.
pub const MESSAGE_TYPE_PONG: u64 = 17;

/// Server → client: connection-level close.
pub const MESSAGE_TYPE_CLOSE: u64 = 99;

/// Client → server: close a subscription.
pub const MESSAGE_TYPE_UNSUBSCRIBE: u64 = 198;

/// Server → client: end of stream for a subscription.
pub const MESSAGE_TYPE_EOS: u64 = 199;

/// EOS status code meaning the stream ended cleanly.
pub const EOS_STATUS_NO_CONTENT: u16 = 204;

// =============================================================================
// PAYLOAD ARITY
// =============================================================================

/// EVENT payload: event id, headers, body.
pub const EVENT_PAYLOAD_LEN: usize = 3;

/// EOS payload: status code, headers, body.
pub const EOS_PAYLOAD_LEN: usize = 3;

/// OPEN payload: a single acknowledgement value.
pub const OPEN_PAYLOAD_LEN: usize = 1;

/// PING/PONG payload: a single opaque id.
pub const PING_PAYLOAD_LEN: usize = 1;

/// Default `error` field of a CLOSE body.
pub const DEFAULT_CLOSE_ERROR: &str = "network_error";

/// Default `error_description` field of a CLOSE body.
pub const DEFAULT_CLOSE_ERROR_DESCRIPTION: &str = "Network error";

// =============================================================================
// HEARTBEAT
// =============================================================================

/// How often the heartbeat checks whether a ping is needed.
pub const PING_INTERVAL: Duration = Duration::from_millis(30_000);

/// How long without any inbound message before the connection is suspect.
pub const PING_TIMEOUT: Duration = Duration::from_millis(10_000);

/// Shortest accepted ping interval; smaller values are raised to it.
pub const MIN_PING_INTERVAL: Duration = Duration::from_millis(100);

// =============================================================================
// RETRY
// =============================================================================

/// First backoff delay of a retry sequence.
pub const DEFAULT_INITIAL_BACKOFF: Duration = Duration::from_millis(1_000);

/// Upper bound on any computed backoff delay.
pub const DEFAULT_MAX_BACKOFF: Duration = Duration::from_millis(5_000);

/// Response header carrying a server-supplied retry delay in seconds.
pub const RETRY_AFTER_HEADER: &str = "Retry-After";

/// Status code of an unauthenticated request.
pub const STATUS_UNAUTHORIZED: u16 = 401;

// =============================================================================
// ENDPOINTS
// =============================================================================

/// Path of the websocket endpoint on the cluster host.
pub const WEBSOCKET_PATH: &str = "/ws";

/// Cluster used by instances when none is configured.
pub const DEFAULT_INSTANCE_CLUSTER: &str = "api-ceres.pusherplatform.io";

/// Cluster used by apps when none is configured.
pub const DEFAULT_APP_CLUSTER: &str = "api-ceres.kube.pusherplatform.io";
