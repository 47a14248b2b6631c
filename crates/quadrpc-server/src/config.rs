//! Server configuration.

use std::time::Duration;

use quadrpc_common::transport::{ChannelConfig, DEFAULT_MAX_FRAME_SIZE};
use quadrpc_common::Codec;

use crate::services::EmitPolicy;

/// Default listen address.
pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:50051";

/// Configuration for [`RpcServer`](crate::RpcServer) and the bundled services.
///
/// # Example
///
/// ```
/// use quadrpc_server::ServerConfig;
/// use std::time::Duration;
///
/// let config = ServerConfig::new()
///     .with_bind_addr("0.0.0.0:50051")
///     .with_max_call_timeout(Duration::from_secs(60));
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub codec: Codec,
    /// Upper bound on any call's deadline, and the deadline of calls that
    /// arrive without one.
    pub max_call_timeout: Duration,
    pub max_frame_size: usize,
    /// When `calculator.FindMaximum` emits a response.
    pub emit_policy: EmitPolicy,
    /// Length of each of the three work steps of `greet.GreetWithDeadline`.
    pub greet_step: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            codec: Codec::default(),
            max_call_timeout: Duration::from_secs(300),
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            emit_policy: EmitPolicy::default(),
            greet_step: Duration::from_secs(1),
        }
    }
}

impl ServerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bind_addr(mut self, bind_addr: impl Into<String>) -> Self {
        self.bind_addr = bind_addr.into();
        self
    }

    pub fn with_codec(mut self, codec: Codec) -> Self {
        self.codec = codec;
        self
    }

    pub fn with_max_call_timeout(mut self, timeout: Duration) -> Self {
        self.max_call_timeout = timeout;
        self
    }

    pub fn with_max_frame_size(mut self, max_frame_size: usize) -> Self {
        self.max_frame_size = max_frame_size;
        self
    }

    pub fn with_emit_policy(mut self, emit_policy: EmitPolicy) -> Self {
        self.emit_policy = emit_policy;
        self
    }

    pub fn with_greet_step(mut self, step: Duration) -> Self {
        self.greet_step = step;
        self
    }

    pub fn channel_config(&self) -> ChannelConfig {
        ChannelConfig {
            codec: self.codec,
            max_frame_size: self.max_frame_size,
        }
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The bind address is empty
    /// - The maximum call timeout is zero or longer than one hour
    /// - The maximum frame size is zero
    /// - The greet step is zero
    pub fn validate(&self) -> Result<(), String> {
        if self.bind_addr.trim().is_empty() {
            return Err("bind address must not be empty".to_string());
        }

        if self.max_call_timeout.is_zero() {
            return Err("max call timeout must be greater than zero".to_string());
        }

        if self.max_call_timeout.as_secs() > 3600 {
            return Err(format!(
                "max call timeout must be <= 1 hour (got {} seconds)",
                self.max_call_timeout.as_secs()
            ));
        }

        if self.max_frame_size == 0 {
            return Err("max frame size must be greater than zero".to_string());
        }

        if self.greet_step.is_zero() {
            return Err("greet step must be greater than zero".to_string());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.bind_addr, "127.0.0.1:50051");
        assert_eq!(config.codec, Codec::Postcard);
        assert_eq!(config.emit_policy, EmitPolicy::OnIncrease);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_chaining() {
        let config = ServerConfig::new()
            .with_codec(Codec::Json)
            .with_max_frame_size(1024)
            .with_emit_policy(EmitPolicy::EveryElement)
            .with_greet_step(Duration::from_millis(10));

        assert_eq!(config.channel_config().codec, Codec::Json);
        assert_eq!(config.channel_config().max_frame_size, 1024);
        assert_eq!(config.greet_step, Duration::from_millis(10));
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let config = ServerConfig::new().with_max_call_timeout(Duration::ZERO);
        assert!(config.validate().unwrap_err().contains("greater than zero"));
    }

    #[test]
    fn test_excessive_timeout_rejected() {
        let config = ServerConfig::new().with_max_call_timeout(Duration::from_secs(3601));
        assert!(config.validate().unwrap_err().contains("1 hour"));
    }

    #[test]
    fn test_zero_frame_size_rejected() {
        let config = ServerConfig::new().with_max_frame_size(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_bind_addr_rejected() {
        let config = ServerConfig::new().with_bind_addr("  ");
        assert!(config.validate().is_err());
    }
}
