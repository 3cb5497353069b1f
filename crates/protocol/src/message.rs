//! Channel messages.
//!
//! Every frame is a JSON object tagged by `msg`. Client-to-server messages
//! are `ClientMessage`; server-to-client messages are `ServerMessage`.

use serde::{Deserialize, Serialize};
use strand_core::{
    ChangeEvent, CorrelationId, DocumentId, Error, ErrorKind, FieldDelta, Fields, SessionId,
    SubscriptionId, Value,
};

/// Protocol version spoken by this crate.
pub const PROTOCOL_VERSION: u32 = 1;

/// Messages sent by the client.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "msg", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Opens (or resumes) a session.
    Connect {
        version: u32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        session: Option<SessionId>,
    },
    Sub {
        id: SubscriptionId,
        name: String,
        #[serde(default)]
        params: Value,
    },
    Unsub {
        id: SubscriptionId,
    },
    Method {
        id: CorrelationId,
        method: String,
        #[serde(default)]
        args: Value,
    },
}

/// Messages sent by the server.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "msg", rename_all = "snake_case")]
pub enum ServerMessage {
    Connected {
        session: SessionId,
    },
    Added {
        sub: SubscriptionId,
        id: DocumentId,
        fields: Fields,
        seq: u64,
    },
    Changed {
        sub: SubscriptionId,
        id: DocumentId,
        delta: FieldDelta,
        seq: u64,
    },
    Removed {
        sub: SubscriptionId,
        id: DocumentId,
        seq: u64,
    },
    /// The initial result of a subscription has been sent.
    Ready {
        sub: SubscriptionId,
    },
    /// The subscription failed and will emit nothing.
    #[serde(rename = "nosub")]
    NoSub {
        sub: SubscriptionId,
        error: MethodError,
    },
    Result {
        id: CorrelationId,
        outcome: Outcome,
    },
    /// Every change caused by these invocations has been sent.
    Updated {
        methods: Vec<CorrelationId>,
    },
    /// Sent right before the server drops the connection.
    Error {
        reason: String,
    },
}

impl ServerMessage {
    /// Wraps a sequenced change event for subscription `sub`.
    pub fn event(sub: SubscriptionId, seq: u64, event: ChangeEvent) -> Self {
        match event {
            ChangeEvent::Added { id, fields } => ServerMessage::Added { sub, id, fields, seq },
            ChangeEvent::Changed { id, delta } => ServerMessage::Changed { sub, id, delta, seq },
            ChangeEvent::Removed { id } => ServerMessage::Removed { sub, id, seq },
        }
    }

    /// Splits a data message into its subscription, sequence and event.
    pub fn into_event(self) -> Option<(SubscriptionId, u64, ChangeEvent)> {
        match self {
            ServerMessage::Added { sub, id, fields, seq } => {
                Some((sub, seq, ChangeEvent::Added { id, fields }))
            }
            ServerMessage::Changed { sub, id, delta, seq } => {
                Some((sub, seq, ChangeEvent::Changed { id, delta }))
            }
            ServerMessage::Removed { sub, id, seq } => Some((sub, seq, ChangeEvent::Removed { id })),
            _ => None,
        }
    }

    /// The subscription a message is addressed to, if any.
    pub fn subscription(&self) -> Option<&SubscriptionId> {
        match self {
            ServerMessage::Added { sub, .. }
            | ServerMessage::Changed { sub, .. }
            | ServerMessage::Removed { sub, .. }
            | ServerMessage::Ready { sub }
            | ServerMessage::NoSub { sub, .. } => Some(sub),
            _ => None,
        }
    }
}

/// Result of one method invocation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    Ok { value: Value },
    Error { error: MethodError },
}

impl Outcome {
    #[inline]
    pub fn ok(value: impl Into<Value>) -> Self {
        Outcome::Ok {
            value: value.into(),
        }
    }

    pub fn failure(error: &Error) -> Self {
        Outcome::Error {
            error: MethodError::from(error),
        }
    }

    #[inline]
    pub fn is_ok(&self) -> bool {
        matches!(self, Outcome::Ok { .. })
    }

    pub fn into_result(self) -> std::result::Result<Value, MethodError> {
        match self {
            Outcome::Ok { value } => Ok(value),
            Outcome::Error { error } => Err(error),
        }
    }
}

impl From<strand_core::Result<Value>> for Outcome {
    fn from(result: strand_core::Result<Value>) -> Self {
        match result {
            Ok(value) => Outcome::Ok { value },
            Err(error) => Outcome::failure(&error),
        }
    }
}

/// Failure surfaced to a caller: a kind plus a human-readable message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct MethodError {
    pub kind: ErrorKind,
    pub message: String,
}

impl MethodError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// A pending call whose connection went away for good.
    pub fn connection_lost() -> Self {
        Self::new(ErrorKind::ConnectionLost, Error::ConnectionLost.to_string())
    }
}

impl From<&Error> for MethodError {
    fn from(error: &Error) -> Self {
        Self::new(error.kind(), error.to_string())
    }
}
