use std::time::Duration;

use quadrpc_common::{Call, CallHeader, CallShape, Deadline, Status};
use quadrpc_metrics::{MetricsSnapshot, ServerInfo, INFO_METHOD, METRICS_METHOD};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::config::ClientConfig;
use crate::connector::{Connector, TcpConnector};

/// QuadRPC client for invoking calls.
///
/// Every call gets a fresh channel from the connector, so calls made
/// through one client run fully in parallel.
#[derive(Debug, Clone)]
pub struct RpcClient<C> {
    connector: C,
    config: ClientConfig,
}

impl RpcClient<TcpConnector> {
    /// Client for the server at `addr` with the default configuration.
    pub fn connect_tcp(addr: impl Into<String>) -> Self {
        Self::tcp(addr, ClientConfig::default())
    }

    pub fn tcp(addr: impl Into<String>, config: ClientConfig) -> Self {
        let connector = TcpConnector::new(addr, &config);
        Self::with_config(connector, config)
    }
}

impl<C: Connector> RpcClient<C> {
    pub fn new(connector: C) -> Self {
        Self::with_config(connector, ClientConfig::default())
    }

    pub fn with_config(connector: C, config: ClientConfig) -> Self {
        Self { connector, config }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    /// Opens a call of `shape` to `method`.
    ///
    /// `timeout` (or the configured default) becomes the call's deadline and
    /// also bounds connection setup. The returned call is ready for the
    /// shape's first `send`.
    pub async fn invoke(
        &self,
        method: &str,
        shape: CallShape,
        timeout: Option<Duration>,
    ) -> Result<Call, Status> {
        let deadline = timeout.or(self.config.default_timeout).map(Deadline::after);

        let connect = self.connector.connect();
        let connected = match deadline {
            Some(deadline) => tokio::time::timeout_at(deadline.instant(), connect)
                .await
                .map_err(|_| Status::deadline_exceeded("deadline exceeded while connecting"))?,
            None => connect.await,
        };
        let channel = connected.map_err(|e| {
            tracing::error!("Failed to connect for {}: {}", method, e);
            Status::classify(&e)
        })?;

        Call::open(channel, CallHeader::new(method, shape), deadline).await
    }

    /// Sends one request and waits for the single response.
    pub async fn unary<Req, Resp>(
        &self,
        method: &str,
        request: &Req,
        timeout: Option<Duration>,
    ) -> Result<Resp, Status>
    where
        Req: Serialize,
        Resp: DeserializeOwned,
    {
        let call = self.invoke(method, CallShape::Unary, timeout).await?;
        call.send(request).await?;
        call.recv()
            .await?
            .ok_or_else(|| Status::internal("call completed without a response"))
    }

    /// Sends the single request of a server-stream call.
    ///
    /// Responses are read with [`Call::recv`] until it yields `None`.
    pub async fn server_stream<Req: Serialize>(
        &self,
        method: &str,
        request: &Req,
        timeout: Option<Duration>,
    ) -> Result<Call, Status> {
        let call = self.invoke(method, CallShape::ServerStream, timeout).await?;
        call.send(request).await?;
        Ok(call)
    }

    /// Opens a client-stream call. Finish it with [`Call::close_and_recv`].
    pub async fn client_stream(
        &self,
        method: &str,
        timeout: Option<Duration>,
    ) -> Result<Call, Status> {
        self.invoke(method, CallShape::ClientStream, timeout).await
    }

    /// Opens a bidi-stream call.
    ///
    /// Clone the call to drive sending and receiving from separate tasks.
    pub async fn bidi_stream(
        &self,
        method: &str,
        timeout: Option<Duration>,
    ) -> Result<Call, Status> {
        self.invoke(method, CallShape::BidiStream, timeout).await
    }

    /// Fetches the server's metrics snapshot.
    pub async fn metrics(&self) -> Result<MetricsSnapshot, Status> {
        self.unary(METRICS_METHOD, &(), None).await
    }

    /// Fetches the server's version, uptime and registered operations.
    pub async fn info(&self) -> Result<ServerInfo, Status> {
        self.unary(INFO_METHOD, &(), None).await
    }
}
