//! QuadRPC
//!
//! Four-shape RPC over a single bidirectional channel per call. This crate
//! re-exports the workspace crates and adds [`in_process`], which wires a
//! client straight to a [`Dispatcher`] without a socket.

use std::sync::Arc;

pub use quadrpc_client as client;
pub use quadrpc_common as common;
pub use quadrpc_metrics as metrics;
pub use quadrpc_server as server;

pub use quadrpc_client::{CalculatorClient, ClientConfig, Connector, GreetClient, RpcClient};
pub use quadrpc_common::{Call, CallContext, CallShape, Code, Deadline, Phase, Status};
pub use quadrpc_server::{default_registry, Dispatcher, HandlerRegistry, RpcServer, ServerConfig};

use quadrpc_client::LocalConnector;
use quadrpc_common::MessageChannel;

/// Connector that serves every call on `dispatcher` in a spawned task.
pub fn in_process(
    dispatcher: Arc<Dispatcher>,
) -> LocalConnector<impl Fn(MessageChannel) + Clone + Send + Sync> {
    LocalConnector::new(move |server_end: MessageChannel| {
        let dispatcher = dispatcher.clone();
        tokio::spawn(async move { dispatcher.serve_channel(server_end).await });
    })
}
