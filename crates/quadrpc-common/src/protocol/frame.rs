//! QuadRPC Wire Frames
//!
//! Every unit sent over a [`MessageChannel`](crate::transport::MessageChannel)
//! is a [`Frame`]. A call starts with [`Frame::Open`], carries payloads in
//! [`Frame::Message`] envelopes, and ends with a terminal status
//! ([`Frame::Trailer`] from the callee or [`Frame::Cancel`] from the caller).

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime};

use super::status::Status;

pub type CallId = u64;

static CALL_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Which directions of a call carry more than one message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CallShape {
    Unary,
    ServerStream,
    ClientStream,
    BidiStream,
}

impl CallShape {
    /// Whether the caller may send more than one request.
    pub fn client_streams(self) -> bool {
        matches!(self, CallShape::ClientStream | CallShape::BidiStream)
    }

    /// Whether the callee may send more than one response.
    pub fn server_streams(self) -> bool {
        matches!(self, CallShape::ServerStream | CallShape::BidiStream)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CallShape::Unary => "unary",
            CallShape::ServerStream => "server-stream",
            CallShape::ClientStream => "client-stream",
            CallShape::BidiStream => "bidi-stream",
        }
    }
}

impl std::fmt::Display for CallShape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// First frame of every call, sent by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallHeader {
    pub call_id: CallId,
    pub method: String,
    pub shape: CallShape,
    /// Remaining time budget at the moment the header was sent.
    pub timeout_ms: Option<u64>,
}

impl CallHeader {
    pub fn new(method: impl Into<String>, shape: CallShape) -> Self {
        CallHeader {
            call_id: generate_call_id(),
            method: method.into(),
            shape,
            timeout_ms: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        // Round up so a sub-millisecond budget is not sent as "no time left".
        let ms = timeout.as_millis().max(1);
        self.timeout_ms = Some(u64::try_from(ms).unwrap_or(u64::MAX));
        self
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}

/// One decoded payload unit plus its stream-position marker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Codec-encoded application message.
    pub payload: Vec<u8>,
    /// `true` if no further messages follow in this direction.
    pub end_of_stream: bool,
}

impl Envelope {
    pub fn more(payload: Vec<u8>) -> Self {
        Envelope {
            payload,
            end_of_stream: false,
        }
    }

    pub fn last(payload: Vec<u8>) -> Self {
        Envelope {
            payload,
            end_of_stream: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Frame {
    Open(CallHeader),
    Message(Envelope),
    /// The sender will not send further messages in this direction.
    HalfClose,
    /// Callee's terminal status.
    Trailer(Status),
    /// Caller-initiated abort.
    Cancel(Status),
}

impl Frame {
    pub fn kind(&self) -> &'static str {
        match self {
            Frame::Open(_) => "open",
            Frame::Message(_) => "message",
            Frame::HalfClose => "half-close",
            Frame::Trailer(_) => "trailer",
            Frame::Cancel(_) => "cancel",
        }
    }
}

fn generate_call_id() -> CallId {
    let timestamp = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0);

    let counter = CALL_ID_COUNTER.fetch_add(1, Ordering::SeqCst);

    // Upper 32 bits from the clock, lower 32 bits from the counter.
    (timestamp & 0xFFFFFFFF00000000) | (counter & 0xFFFFFFFF)
}
