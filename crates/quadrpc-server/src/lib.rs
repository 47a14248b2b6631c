//! QuadRPC Server
//!
//! This crate provides the callee side of QuadRPC: the handler registry with
//! one typed signature per call shape, the dispatcher that drives a call from
//! its `Open` frame to its trailer, the TCP accept loop, and the bundled
//! calculator and greet services.

pub mod config;
pub mod dispatch;
pub mod server;
pub mod services;

pub use config::{ServerConfig, DEFAULT_BIND_ADDR};
pub use dispatch::{Dispatcher, HandlerRegistry, RequestStream, ResponseSink};
pub use quadrpc_common::CallContext;
pub use server::RpcServer;
pub use services::{default_registry, EmitPolicy};
