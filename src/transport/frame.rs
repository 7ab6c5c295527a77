//! Frame encoding and decoding.
//!
//! Every frame travels as one text message holding a JSON array whose first
//! element is the numeric message type:
//!
//! ```text
//! [100, id, path, headers]            SUBSCRIBE
//! [101, id, payload]                  OPEN
//! [102, id, eventId, headers, body]   EVENT
//! [16, pingId] / [17, pingId]         PING / PONG
//! [99, status, headers, body]         CLOSE
//! [198, id]                           UNSUBSCRIBE
//! [199, id, status, headers, body]    EOS
//! ```
//!
//! Decoding is strict: anything that is not a well-formed frame of a known
//! type with the exact payload arity is a [`FrameError`].

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::{
    DEFAULT_CLOSE_ERROR, DEFAULT_CLOSE_ERROR_DESCRIPTION, EOS_PAYLOAD_LEN, EVENT_PAYLOAD_LEN,
    FrameError, Headers, MESSAGE_TYPE_CLOSE, MESSAGE_TYPE_EOS, MESSAGE_TYPE_EVENT,
    MESSAGE_TYPE_OPEN, MESSAGE_TYPE_PING, MESSAGE_TYPE_PONG, MESSAGE_TYPE_SUBSCRIBE,
    MESSAGE_TYPE_UNSUBSCRIBE, OPEN_PAYLOAD_LEN, PING_PAYLOAD_LEN,
};

/// Message type tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    /// Open a subscription.
    Subscribe,
    /// Subscription accepted.
    Open,
    /// Subscription event.
    Event,
    /// Liveness check.
    Ping,
    /// Liveness answer.
    Pong,
    /// Connection-level close.
    Close,
    /// Close a subscription.
    Unsubscribe,
    /// End of stream.
    EndOfStream,
}

impl MessageType {
    /// Parse a message type from its tag.
    pub fn from_tag(tag: u64) -> Option<Self> {
        match tag {
            MESSAGE_TYPE_SUBSCRIBE => Some(Self::Subscribe),
            MESSAGE_TYPE_OPEN => Some(Self::Open),
            MESSAGE_TYPE_EVENT => Some(Self::Event),
            MESSAGE_TYPE_PING => Some(Self::Ping),
            MESSAGE_TYPE_PONG => Some(Self::Pong),
            MESSAGE_TYPE_CLOSE => Some(Self::Close),
            MESSAGE_TYPE_UNSUBSCRIBE => Some(Self::Unsubscribe),
            MESSAGE_TYPE_EOS => Some(Self::EndOfStream),
            _ => None,
        }
    }

    /// Numeric tag.
    pub fn tag(self) -> u64 {
        match self {
            Self::Subscribe => MESSAGE_TYPE_SUBSCRIBE,
            Self::Open => MESSAGE_TYPE_OPEN,
            Self::Event => MESSAGE_TYPE_EVENT,
            Self::Ping => MESSAGE_TYPE_PING,
            Self::Pong => MESSAGE_TYPE_PONG,
            Self::Close => MESSAGE_TYPE_CLOSE,
            Self::Unsubscribe => MESSAGE_TYPE_UNSUBSCRIBE,
            Self::EndOfStream => MESSAGE_TYPE_EOS,
        }
    }

    /// Short name used in diagnostics.
    pub fn name(self) -> &'static str {
        match self {
            Self::Subscribe => "SUBSCRIBE",
            Self::Open => "OPEN",
            Self::Event => "EVENT",
            Self::Ping => "PING",
            Self::Pong => "PONG",
            Self::Close => "CLOSE",
            Self::Unsubscribe => "UNSUBSCRIBE",
            Self::EndOfStream => "EOS",
        }
    }

    /// Whether element 1 of the frame is a subscription id.
    pub fn is_subscription_scoped(self) -> bool {
        !matches!(self, Self::Ping | Self::Pong | Self::Close)
    }
}

/// Locally assigned subscription identifier.
///
/// Monotonically allocated per transport and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    /// Create a subscription id.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Raw value.
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One event delivered on a subscription.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionEvent {
    /// Server-assigned event id.
    pub event_id: String,
    /// Event headers.
    pub headers: Headers,
    /// Event body.
    pub body: Value,
}

/// Body of a connection-level CLOSE frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloseBody {
    /// Machine-readable error code.
    pub error: String,
    /// Human-readable description.
    pub error_description: String,
}

impl Default for CloseBody {
    fn default() -> Self {
        Self {
            error: DEFAULT_CLOSE_ERROR.to_string(),
            error_description: DEFAULT_CLOSE_ERROR_DESCRIPTION.to_string(),
        }
    }
}

/// A decoded protocol frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// Open a subscription on `path`.
    Subscribe {
        /// Subscription id.
        id: SubscriptionId,
        /// Resource path.
        path: String,
        /// Subscribe-time headers.
        headers: Headers,
    },
    /// Subscription accepted; `payload` is forwarded to `on_open` whole.
    Open {
        /// Subscription id.
        id: SubscriptionId,
        /// Open acknowledgement value.
        payload: Value,
    },
    /// Subscription event.
    Event {
        /// Subscription id.
        id: SubscriptionId,
        /// The event.
        event: SubscriptionEvent,
    },
    /// Liveness check with an opaque id.
    Ping {
        /// Echoed back verbatim in the PONG.
        id: Value,
    },
    /// Liveness answer.
    Pong {
        /// Id of the PING being answered.
        id: Value,
    },
    /// Connection-level close.
    Close {
        /// Status code.
        status_code: u16,
        /// Headers.
        headers: Headers,
        /// Error details.
        body: CloseBody,
    },
    /// Close a subscription.
    Unsubscribe {
        /// Subscription id.
        id: SubscriptionId,
    },
    /// End of stream.
    EndOfStream {
        /// Subscription id.
        id: SubscriptionId,
        /// Status code; 204 means a clean end.
        status_code: u16,
        /// Headers.
        headers: Headers,
        /// Body.
        body: Value,
    },
}

impl Frame {
    /// Message type of this frame.
    pub fn message_type(&self) -> MessageType {
        match self {
            Self::Subscribe { .. } => MessageType::Subscribe,
            Self::Open { .. } => MessageType::Open,
            Self::Event { .. } => MessageType::Event,
            Self::Ping { .. } => MessageType::Ping,
            Self::Pong { .. } => MessageType::Pong,
            Self::Close { .. } => MessageType::Close,
            Self::Unsubscribe { .. } => MessageType::Unsubscribe,
            Self::EndOfStream { .. } => MessageType::EndOfStream,
        }
    }

    /// Subscription id for subscription-scoped frames.
    pub fn subscription_id(&self) -> Option<SubscriptionId> {
        match self {
            Self::Subscribe { id, .. }
            | Self::Open { id, .. }
            | Self::Event { id, .. }
            | Self::Unsubscribe { id }
            | Self::EndOfStream { id, .. } => Some(*id),
            Self::Ping { .. } | Self::Pong { .. } | Self::Close { .. } => None,
        }
    }

    /// Encode to the wire representation.
    pub fn encode(&self) -> String {
        let tag = Value::from(self.message_type().tag());
        let elements = match self {
            Self::Subscribe { id, path, headers } => vec![
                tag,
                Value::from(id.as_u64()),
                Value::from(path.as_str()),
                headers_to_value(headers),
            ],
            Self::Open { id, payload } => vec![tag, Value::from(id.as_u64()), payload.clone()],
            Self::Event { id, event } => vec![
                tag,
                Value::from(id.as_u64()),
                Value::from(event.event_id.as_str()),
                headers_to_value(&event.headers),
                event.body.clone(),
            ],
            Self::Ping { id } | Self::Pong { id } => vec![tag, id.clone()],
            Self::Close {
                status_code,
                headers,
                body,
            } => vec![
                tag,
                Value::from(*status_code),
                headers_to_value(headers),
                serde_json::json!({
                    "error": body.error,
                    "error_description": body.error_description,
                }),
            ],
            Self::Unsubscribe { id } => vec![tag, Value::from(id.as_u64())],
            Self::EndOfStream {
                id,
                status_code,
                headers,
                body,
            } => vec![
                tag,
                Value::from(id.as_u64()),
                Value::from(*status_code),
                headers_to_value(headers),
                body.clone(),
            ],
        };
        Value::Array(elements).to_string()
    }

    /// Decode one wire message sent by the server.
    ///
    /// SUBSCRIBE and UNSUBSCRIBE only travel client to server and are
    /// rejected with [`FrameError::UnexpectedType`].
    pub fn decode(text: &str) -> Result<Self, FrameError> {
        let value: Value =
            serde_json::from_str(text).map_err(|e| FrameError::InvalidJson(e.to_string()))?;

        let elements = match value {
            Value::Array(elements) => elements,
            other => return Err(FrameError::NotAnArray(other.to_string())),
        };

        let mut elements = elements.into_iter();
        let tag = elements.next().ok_or(FrameError::Empty)?;
        let tag = tag
            .as_u64()
            .ok_or_else(|| FrameError::InvalidType(tag.to_string()))?;
        let kind = MessageType::from_tag(tag).ok_or(FrameError::UnknownType(tag))?;

        match kind {
            MessageType::Ping => {
                let [id] = exact::<PING_PAYLOAD_LEN>(kind, elements.collect())?;
                Ok(Frame::Ping { id })
            }
            MessageType::Pong => {
                let [id] = exact::<PING_PAYLOAD_LEN>(kind, elements.collect())?;
                Ok(Frame::Pong { id })
            }
            MessageType::Close => decode_close(elements.collect()),
            MessageType::Open => {
                let id = subscription_id(kind, &mut elements)?;
                let [payload] = exact::<OPEN_PAYLOAD_LEN>(kind, elements.collect())?;
                Ok(Frame::Open { id, payload })
            }
            MessageType::Event => {
                let id = subscription_id(kind, &mut elements)?;
                decode_event(id, elements.collect())
            }
            MessageType::EndOfStream => {
                let id = subscription_id(kind, &mut elements)?;
                let [status, headers, body] = exact::<EOS_PAYLOAD_LEN>(kind, elements.collect())?;
                Ok(Frame::EndOfStream {
                    id,
                    status_code: status_code(kind, Some(status))?,
                    headers: headers_from_value(kind, Some(headers))?,
                    body,
                })
            }
            MessageType::Subscribe | MessageType::Unsubscribe => {
                Err(FrameError::UnexpectedType(kind.name()))
            }
        }
    }
}

fn subscription_id(
    kind: MessageType,
    elements: &mut impl Iterator<Item = Value>,
) -> Result<SubscriptionId, FrameError> {
    let raw = elements
        .next()
        .ok_or(FrameError::MissingSubscriptionId { kind: kind.name() })?;
    raw.as_u64()
        .map(SubscriptionId::new)
        .ok_or_else(|| FrameError::InvalidSubscriptionId(raw.to_string()))
}

fn decode_event(id: SubscriptionId, payload: Vec<Value>) -> Result<Frame, FrameError> {
    let kind = MessageType::Event;
    let [event_id, headers, body] = exact::<EVENT_PAYLOAD_LEN>(kind, payload)?;
    let event_id = match event_id {
        Value::String(event_id) => event_id,
        _ => {
            return Err(FrameError::InvalidField {
                kind: kind.name(),
                field: "event id",
            });
        }
    };
    let headers = headers_from_value(kind, Some(headers))?;
    Ok(Frame::Event {
        id,
        event: SubscriptionEvent {
            event_id,
            headers,
            body,
        },
    })
}

fn decode_close(payload: Vec<Value>) -> Result<Frame, FrameError> {
    let kind = MessageType::Close;
    if !(2..=3).contains(&payload.len()) {
        return Err(FrameError::Arity {
            kind: kind.name(),
            expected: 3,
            actual: payload.len(),
        });
    }
    let mut payload = payload.into_iter();
    let status_code = status_code(kind, payload.next())?;
    let headers = headers_from_value(kind, payload.next())?;
    let body = close_body(payload.next());
    Ok(Frame::Close {
        status_code,
        headers,
        body,
    })
}

fn exact<const N: usize>(kind: MessageType, payload: Vec<Value>) -> Result<[Value; N], FrameError> {
    let actual = payload.len();
    payload.try_into().map_err(|_| FrameError::Arity {
        kind: kind.name(),
        expected: N,
        actual,
    })
}

fn status_code(kind: MessageType, value: Option<Value>) -> Result<u16, FrameError> {
    value
        .as_ref()
        .and_then(Value::as_u64)
        .and_then(|code| u16::try_from(code).ok())
        .ok_or(FrameError::InvalidField {
            kind: kind.name(),
            field: "status code",
        })
}

fn headers_from_value(kind: MessageType, value: Option<Value>) -> Result<Headers, FrameError> {
    match value {
        Some(Value::Object(map)) => Ok(map
            .into_iter()
            .map(|(name, value)| {
                let value = match value {
                    Value::String(value) => value,
                    other => other.to_string(),
                };
                (name, value)
            })
            .collect()),
        _ => Err(FrameError::InvalidField {
            kind: kind.name(),
            field: "headers",
        }),
    }
}

fn headers_to_value(headers: &Headers) -> Value {
    Value::Object(
        headers
            .iter()
            .map(|(name, value)| (name.clone(), Value::from(value.as_str())))
            .collect(),
    )
}

fn close_body(value: Option<Value>) -> CloseBody {
    let defaults = CloseBody::default();
    let field = |name: &str| {
        value
            .as_ref()
            .and_then(|body| body.get(name))
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };
    CloseBody {
        error: field("error").unwrap_or(defaults.error),
        error_description: field("error_description").unwrap_or(defaults.error_description),
    }
}
