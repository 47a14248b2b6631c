use std::time::Duration;

use quadrpc_common::transport::{ChannelConfig, DEFAULT_MAX_FRAME_SIZE};
use quadrpc_common::Codec;

/// Configuration for [`RpcClient`](crate::RpcClient).
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    pub codec: Codec,
    /// Deadline applied to calls invoked without an explicit timeout.
    /// `None` leaves such calls without a caller-side deadline.
    pub default_timeout: Option<Duration>,
    pub connect_timeout: Duration,
    pub max_frame_size: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            codec: Codec::default(),
            default_timeout: None,
            connect_timeout: Duration::from_secs(5),
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }
}

impl ClientConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_codec(mut self, codec: Codec) -> Self {
        self.codec = codec;
        self
    }

    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = Some(timeout);
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_max_frame_size(mut self, max_frame_size: usize) -> Self {
        self.max_frame_size = max_frame_size;
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
    /// Returns an error if any timeout is zero or longer than one hour, or
    /// if the maximum frame size is zero.
    pub fn validate(&self) -> Result<(), String> {
        check_timeout("connect timeout", self.connect_timeout)?;
        if let Some(timeout) = self.default_timeout {
            check_timeout("default timeout", timeout)?;
        }
        if self.max_frame_size == 0 {
            return Err("max frame size must be greater than zero".to_string());
        }
        Ok(())
    }
}

fn check_timeout(name: &str, timeout: Duration) -> Result<(), String> {
    if timeout.is_zero() {
        return Err(format!("{} must be greater than zero", name));
    }
    if timeout.as_secs() > 3600 {
        return Err(format!(
            "{} must be <= 1 hour (got {} seconds)",
            name,
            timeout.as_secs()
        ));
    }
    Ok(())
}
