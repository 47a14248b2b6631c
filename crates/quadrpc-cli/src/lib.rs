// Copyright 2025 QuadRPC Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! # QuadRPC CLI
//!
//! Command-line interface for QuadRPC.
//!
//! The `quadrpc` binary starts a server hosting the calculator and greet
//! services (`quadrpc serve`) and exposes one subcommand per service
//! operation, plus `metrics` and `info` for the built-in endpoints.
//!
//! ## Server Address
//!
//! Client subcommands and `serve` resolve the address in this order:
//!
//! 1. The `--addr` flag
//! 2. The `QUADRPC_ADDR` environment variable
//! 3. `127.0.0.1:50051`

use std::time::Duration;

use anyhow::{anyhow, Result};
use quadrpc_client::ClientConfig;
use quadrpc_common::Codec;
use quadrpc_server::{EmitPolicy, ServerConfig, DEFAULT_BIND_ADDR};

/// Environment variable holding the server address.
pub const ADDR_ENV: &str = "QUADRPC_ADDR";

/// Picks the server address: flag, then environment, then the default.
pub fn resolve_addr(flag: Option<String>, env: Option<String>) -> String {
    flag.or(env.filter(|addr| !addr.trim().is_empty()))
        .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string())
}

pub fn parse_codec(name: &str) -> Result<Codec> {
    Codec::from_name(name).ok_or_else(|| anyhow!("Unknown codec '{}' (expected postcard or json)", name))
}

pub fn parse_emit_policy(name: &str) -> Result<EmitPolicy> {
    EmitPolicy::from_name(name).ok_or_else(|| {
        anyhow!(
            "Unknown emit policy '{}' (expected on-increase or every-element)",
            name
        )
    })
}

/// Settings of `quadrpc serve`, before validation.
#[derive(Debug, Clone)]
pub struct ServeOptions {
    pub addr: String,
    pub codec: String,
    pub max_call_timeout_secs: u64,
    pub max_frame_size: Option<usize>,
    pub emit_policy: String,
    pub greet_step_ms: u64,
}

impl ServeOptions {
    pub fn server_config(&self) -> Result<ServerConfig> {
        let mut config = ServerConfig::new()
            .with_bind_addr(&self.addr)
            .with_codec(parse_codec(&self.codec)?)
            .with_max_call_timeout(Duration::from_secs(self.max_call_timeout_secs))
            .with_emit_policy(parse_emit_policy(&self.emit_policy)?)
            .with_greet_step(Duration::from_millis(self.greet_step_ms));
        if let Some(max_frame_size) = self.max_frame_size {
            config = config.with_max_frame_size(max_frame_size);
        }

        config
            .validate()
            .map_err(|e| anyhow!("Invalid server configuration: {}", e))?;
        Ok(config)
    }
}

/// Client configuration from the global flags.
pub fn client_config(codec: &str, timeout_ms: Option<u64>) -> Result<ClientConfig> {
    let mut config = ClientConfig::new().with_codec(parse_codec(codec)?);
    if let Some(ms) = timeout_ms {
        config = config.with_default_timeout(Duration::from_millis(ms));
    }
    config
        .validate()
        .map_err(|e| anyhow!("Invalid client configuration: {}", e))?;
    Ok(config)
}

/// Installs the fmt subscriber on stderr. `RUST_LOG` overrides `default_level`.
pub fn init_tracing(default_level: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();
}

#[cfg(test)]
mod tests;
