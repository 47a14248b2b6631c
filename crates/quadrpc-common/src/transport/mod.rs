//! QuadRPC Transport Layer
//!
//! This module provides the codecs and the framed [`MessageChannel`] that a
//! call runs over.
//!
//! # Architecture
//!
//! - **Codec**: Postcard (default) or JSON, via serde
//! - **Channel**: any `AsyncRead + AsyncWrite` stream (TCP, in-memory duplex)
//! - **Wire Format**: `[4-byte length prefix as u32 big-endian] + [encoded Frame]`
//!
//! # Components
//!
//! - **[`Codec`]** / **[`PostcardCodec`]** / **[`JsonCodec`]**: Encode/decode frames and payloads
//! - **[`MessageChannel`]**: Independent send/receive of frames with write-side half-close
//! - **[`connect_tcp`]**: Establish a TCP connection for a single call
//!
//! # Message Size Limits
//!
//! Frames above [`ChannelConfig::max_frame_size`] (16 MB by default) are
//! rejected on both send and receive.

pub mod channel;
pub mod codec;

pub use channel::{ChannelConfig, MessageChannel, DEFAULT_MAX_FRAME_SIZE};
pub use codec::{Codec, JsonCodec, PostcardCodec};

use std::time::Duration;
use tokio::net::TcpStream;

use crate::protocol::error::{Result, RpcError};

/// Connects to `addr` and wraps the stream in a [`MessageChannel`].
///
/// # Errors
///
/// Returns `RpcError::Connection` if the connection is refused or not
/// established within `connect_timeout`.
pub async fn connect_tcp(
    addr: &str,
    config: ChannelConfig,
    connect_timeout: Duration,
) -> Result<MessageChannel> {
    let stream = tokio::time::timeout(connect_timeout, TcpStream::connect(addr))
        .await
        .map_err(|_| {
            RpcError::Connection(format!(
                "Timed out connecting to {} after {}ms",
                addr,
                connect_timeout.as_millis()
            ))
        })?
        .map_err(|e| RpcError::Connection(format!("Failed to connect to {}: {}", addr, e)))?;

    tracing::debug!("Connected to {}", addr);
    Ok(MessageChannel::from_tcp(stream, config))
}

#[cfg(test)]
mod tests;
