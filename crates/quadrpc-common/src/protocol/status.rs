//! QuadRPC Status Types
//!
//! A [`Status`] is the single terminal outcome of a call: a [`Code`] from a
//! small fixed taxonomy plus a human-readable message.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Terminal status codes.
///
/// Numeric values follow the conventional RPC status numbering so that
/// logs and metrics line up with other tooling.
///
/// | Code | Meaning | Retry advice |
/// |------|---------|--------------|
/// | `Ok` | Clean completion | - |
/// | `InvalidArgument` | Caller input violates a documented precondition | Retry with different input |
/// | `DeadlineExceeded` | Call aborted because its deadline expired | Retry with a longer deadline |
/// | `FailedPrecondition` | Operation not allowed in the call's current phase | Fix the caller |
/// | `Internal` | Transport, serialization or unexpected failure | Investigate first |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Code {
    Ok,
    InvalidArgument,
    DeadlineExceeded,
    FailedPrecondition,
    Internal,
}

impl Code {
    /// All codes, in numeric order.
    pub const ALL: [Code; 5] = [
        Code::Ok,
        Code::InvalidArgument,
        Code::DeadlineExceeded,
        Code::FailedPrecondition,
        Code::Internal,
    ];

    pub fn as_u8(self) -> u8 {
        match self {
            Code::Ok => 0,
            Code::InvalidArgument => 3,
            Code::DeadlineExceeded => 4,
            Code::FailedPrecondition => 9,
            Code::Internal => 13,
        }
    }

    /// Parse a code from its numeric value. Unknown values map to `Internal`.
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => Code::Ok,
            3 => Code::InvalidArgument,
            4 => Code::DeadlineExceeded,
            9 => Code::FailedPrecondition,
            _ => Code::Internal,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Code::Ok => "OK",
            Code::InvalidArgument => "INVALID_ARGUMENT",
            Code::DeadlineExceeded => "DEADLINE_EXCEEDED",
            Code::FailedPrecondition => "FAILED_PRECONDITION",
            Code::Internal => "INTERNAL",
        }
    }

    /// Index into a `[_; 5]` table ordered like [`Code::ALL`].
    pub fn index(self) -> usize {
        match self {
            Code::Ok => 0,
            Code::InvalidArgument => 1,
            Code::DeadlineExceeded => 2,
            Code::FailedPrecondition => 3,
            Code::Internal => 4,
        }
    }
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The terminal outcome of a call.
///
/// `Status` doubles as the error type of every Send/Receive operation, so
/// handler code can use `?` on call operations and return its own
/// validation failures the same way.
///
/// # Example
///
/// ```
/// use quadrpc_common::protocol::{Code, Status};
///
/// let status = Status::invalid_argument("Received a negative number: -2");
/// assert_eq!(status.code(), Code::InvalidArgument);
/// assert!(!status.is_ok());
/// ```
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("{code}: {message}")]
pub struct Status {
    code: Code,
    message: String,
}

impl Status {
    pub fn new(code: Code, message: impl Into<String>) -> Self {
        Status {
            code,
            message: message.into(),
        }
    }

    /// Terminal success.
    pub fn ok() -> Self {
        Status::new(Code::Ok, "")
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Status::new(Code::InvalidArgument, message)
    }

    pub fn deadline_exceeded(message: impl Into<String>) -> Self {
        Status::new(Code::DeadlineExceeded, message)
    }

    pub fn failed_precondition(message: impl Into<String>) -> Self {
        Status::new(Code::FailedPrecondition, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Status::new(Code::Internal, message)
    }

    pub fn code(&self) -> Code {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn is_ok(&self) -> bool {
        self.code == Code::Ok
    }
}
