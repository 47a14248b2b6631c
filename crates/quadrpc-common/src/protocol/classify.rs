//! Error classifier.
//!
//! Maps observed failures onto the fixed [`Code`] taxonomy. Application
//! validation failures are built directly with [`Status::invalid_argument`];
//! deadline expiry is produced by the call engine itself. Anything else that
//! reaches the classifier is a transport or internal failure and becomes
//! `Internal`, never `InvalidArgument`.

use super::error::RpcError;
use super::status::{Code, Status};

impl Status {
    /// Classifies a transport-level error.
    pub fn classify(err: &RpcError) -> Status {
        match err {
            RpcError::Timeout(ms) => {
                Status::deadline_exceeded(format!("operation timed out after {}ms", ms))
            }
            RpcError::ConnectionClosed => {
                Status::internal("channel closed before the call completed")
            }
            RpcError::Serialization(_) | RpcError::JsonSerialization(_) => {
                Status::internal(format!("malformed message: {}", err))
            }
            other => Status::internal(other.to_string()),
        }
    }

    /// Classifies a failed handler task (panic or cancellation).
    pub fn from_join_error(err: &tokio::task::JoinError) -> Status {
        if err.is_panic() {
            Status::internal("handler panicked")
        } else {
            Status::internal("handler task was cancelled")
        }
    }
}

impl From<RpcError> for Status {
    fn from(err: RpcError) -> Self {
        Status::classify(&err)
    }
}

/// Returns `true` if retrying the same call with different input could
/// succeed.
pub fn retryable_with_different_input(status: &Status) -> bool {
    status.code() == Code::InvalidArgument
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_classifies_as_deadline_exceeded() {
        let status = Status::classify(&RpcError::Timeout(250));
        assert_eq!(status.code(), Code::DeadlineExceeded);
        assert!(status.message().contains("250ms"));
    }

    #[test]
    fn test_transport_failures_classify_as_internal() {
        let errors = vec![
            RpcError::Transport("reset".to_string()),
            RpcError::Connection("refused".to_string()),
            RpcError::FrameTooLarge { len: 10, max: 5 },
            RpcError::Protocol("unexpected frame".to_string()),
            RpcError::ConnectionClosed,
            RpcError::Io(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe")),
        ];

        for err in errors {
            let status: Status = err.into();
            assert_eq!(status.code(), Code::Internal);
        }
    }

    #[test]
    fn test_decode_failure_is_never_invalid_argument() {
        let err = postcard::from_bytes::<u64>(&[]).unwrap_err();
        let status = Status::from(RpcError::from(err));
        assert_eq!(status.code(), Code::Internal);
        assert!(!retryable_with_different_input(&status));
    }

    #[test]
    fn test_retry_advice() {
        assert!(retryable_with_different_input(&Status::invalid_argument("bad")));
        assert!(!retryable_with_different_input(&Status::internal("boom")));
        assert!(!retryable_with_different_input(&Status::deadline_exceeded("late")));
    }
}
