use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use quadrpc_common::protocol::error::{Result, RpcError};
use quadrpc_common::MessageChannel;
use quadrpc_metrics::{MetricsCollector, ServerMetricsCollector};
use tokio::net::TcpListener;

use crate::config::ServerConfig;
use crate::dispatch::{Dispatcher, HandlerRegistry};

/// Pause after a failed accept, so a full descriptor table is not spun on.
const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// TCP server for QuadRPC.
///
/// Every accepted connection carries exactly one call. Each connection is
/// served in its own task, so a slow or failing call never blocks others.
pub struct RpcServer {
    listener: TcpListener,
    dispatcher: Arc<Dispatcher>,
    config: ServerConfig,
}

impl RpcServer {
    /// Binds to `config.bind_addr` with a fresh metrics collector.
    pub async fn bind(config: ServerConfig, registry: HandlerRegistry) -> Result<Self> {
        Self::bind_with_metrics(config, registry, Arc::new(ServerMetricsCollector::new())).await
    }

    pub async fn bind_with_metrics(
        config: ServerConfig,
        registry: HandlerRegistry,
        metrics: Arc<dyn MetricsCollector>,
    ) -> Result<Self> {
        config.validate().map_err(RpcError::Transport)?;

        let listener = TcpListener::bind(&config.bind_addr).await.map_err(|e| {
            RpcError::Connection(format!("Failed to bind to {}: {}", config.bind_addr, e))
        })?;

        let dispatcher = Dispatcher::new(registry, metrics, config.max_call_timeout);
        Ok(Self {
            listener,
            dispatcher: Arc::new(dispatcher),
            config,
        })
    }

    /// Gets the actual bound address.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener
            .local_addr()
            .map_err(|e| RpcError::Connection(format!("Failed to get local addr: {}", e)))
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// Accepts connections forever. Failed accepts are logged and skipped.
    pub async fn run(&self) -> Result<()> {
        self.run_until(std::future::pending()).await
    }

    /// Accepts connections until `shutdown` resolves.
    ///
    /// Calls already in progress keep running in their own tasks.
    pub async fn run_until<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        tracing::info!(
            "QuadRPC server listening on {} ({} codec, {} methods)",
            self.local_addr()?,
            self.config.codec.name(),
            self.dispatcher.registry().methods().len()
        );

        loop {
            let accepted = tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("Shutting down server");
                    return Ok(());
                }
                accepted = self.listener.accept() => accepted,
            };

            let (stream, peer_addr) = match accepted {
                Ok(accepted) => accepted,
                Err(e) => {
                    tracing::error!("Failed to accept connection: {}", e);
                    tokio::time::sleep(ACCEPT_RETRY_DELAY).await;
                    continue;
                }
            };
            tracing::debug!("Connection established from {}", peer_addr);

            let channel = MessageChannel::from_tcp(stream, self.config.channel_config());
            let dispatcher = self.dispatcher.clone();
            tokio::spawn(async move {
                let status = dispatcher.serve_channel(channel).await;
                tracing::trace!("Connection from {} finished: {}", peer_addr, status.code());
            });
        }
    }
}
