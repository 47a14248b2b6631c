//! QuadRPC Client
//!
//! The caller side of QuadRPC. A [`Connector`] provides one fresh
//! [`MessageChannel`](quadrpc_common::MessageChannel) per call,
//! [`RpcClient::invoke`] opens a [`Call`](quadrpc_common::Call) of a given
//! shape on it, and the typed stubs wrap the bundled services.

pub mod client;
pub mod config;
pub mod connector;
pub mod stubs;

pub use client::RpcClient;
pub use config::ClientConfig;
pub use connector::{Connector, LocalConnector, TcpConnector};
pub use stubs::{CalculatorClient, GreetClient};
