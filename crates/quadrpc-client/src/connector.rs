//! Connection providers.
//!
//! Every call runs on its own channel, so a connector is asked for a fresh
//! [`MessageChannel`] each time a call is invoked.

use std::future::Future;
use std::time::Duration;

use quadrpc_common::protocol::error::Result;
use quadrpc_common::transport::{connect_tcp, ChannelConfig};
use quadrpc_common::{Codec, MessageChannel};

use crate::config::ClientConfig;

/// In-flight byte budget per direction of a [`LocalConnector`] pipe.
const LOCAL_BUFFER: usize = 64 * 1024;

/// Provides one established channel per call.
pub trait Connector: Send + Sync {
    fn connect(&self) -> impl Future<Output = Result<MessageChannel>> + Send;
}

/// Opens a fresh TCP connection for every call.
#[derive(Debug, Clone)]
pub struct TcpConnector {
    addr: String,
    channel: ChannelConfig,
    connect_timeout: Duration,
}

impl TcpConnector {
    pub fn new(addr: impl Into<String>, config: &ClientConfig) -> Self {
        Self {
            addr: addr.into(),
            channel: config.channel_config(),
            connect_timeout: config.connect_timeout,
        }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }
}

impl Connector for TcpConnector {
    fn connect(&self) -> impl Future<Output = Result<MessageChannel>> + Send {
        connect_tcp(&self.addr, self.channel, self.connect_timeout)
    }
}

/// Serves calls in-process over an in-memory pipe.
///
/// Each `connect` creates a connected pair of channels and hands the server
/// end to `serve`, which is expected to spawn whatever answers the call.
#[derive(Clone)]
pub struct LocalConnector<F> {
    codec: Codec,
    serve: F,
}

impl<F> LocalConnector<F>
where
    F: Fn(MessageChannel) + Send + Sync,
{
    pub fn new(serve: F) -> Self {
        Self::with_codec(Codec::default(), serve)
    }

    pub fn with_codec(codec: Codec, serve: F) -> Self {
        Self { codec, serve }
    }
}

impl<F> Connector for LocalConnector<F>
where
    F: Fn(MessageChannel) + Send + Sync,
{
    fn connect(&self) -> impl Future<Output = Result<MessageChannel>> + Send {
        let (client_end, server_end) = MessageChannel::pair(self.codec, LOCAL_BUFFER);
        (self.serve)(server_end);
        std::future::ready(Ok(client_end))
    }
}

impl<F> std::fmt::Debug for LocalConnector<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalConnector")
            .field("codec", &self.codec)
            .finish_non_exhaustive()
    }
}
