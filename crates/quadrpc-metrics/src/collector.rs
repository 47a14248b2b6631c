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

use crate::registry::{MetricsConfig, MetricsRegistry};
use crate::snapshot::{MetricsSnapshot, ServerInfo};
use quadrpc_common::Code;
use std::sync::Arc;
use std::time::Instant;

/// Operation name of the built-in metrics endpoint.
pub const METRICS_METHOD: &str = "_metrics";
/// Operation name of the built-in server info endpoint.
pub const INFO_METHOD: &str = "_info";

/// Metrics collection as seen by the dispatcher.
///
/// The dispatcher calls [`call_started`](Self::call_started) when a call is
/// accepted and [`record_call`](Self::record_call) once its terminal status
/// is known. Built-in operations (`_metrics`, `_info`) are answered by the
/// collector instead of a registered handler.
pub trait MetricsCollector: Send + Sync {
    /// Returns `true` for the built-in `_metrics` and `_info` operations.
    fn is_metrics_request(&self, method: &str) -> bool {
        method == METRICS_METHOD || method == INFO_METHOD
    }

    fn call_started(&self);

    /// Records a finished call and its latency.
    fn record_call(&self, method: &str, start_time: Instant, code: Code);

    fn snapshot(&self) -> MetricsSnapshot;

    /// Server information, given the registered operation names.
    fn info(&self, methods: Vec<String>) -> ServerInfo;
}

/// Default collector backed by a shared [`MetricsRegistry`].
#[derive(Debug, Clone)]
pub struct ServerMetricsCollector {
    registry: Arc<MetricsRegistry>,
}

impl ServerMetricsCollector {
    pub fn new() -> Self {
        Self::with_registry(Arc::new(MetricsRegistry::new()))
    }

    pub fn with_config(config: MetricsConfig) -> Self {
        Self::with_registry(Arc::new(MetricsRegistry::with_config(config)))
    }

    pub fn with_registry(registry: Arc<MetricsRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<MetricsRegistry> {
        &self.registry
    }
}

impl Default for ServerMetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsCollector for ServerMetricsCollector {
    fn call_started(&self) {
        self.registry.call_started();
    }

    fn record_call(&self, method: &str, start_time: Instant, code: Code) {
        let latency_us = start_time.elapsed().as_micros() as u64;
        self.registry.call_finished(method, latency_us, code);
    }

    fn snapshot(&self) -> MetricsSnapshot {
        self.registry.snapshot()
    }

    fn info(&self, mut methods: Vec<String>) -> ServerInfo {
        methods.sort();
        ServerInfo::new(self.registry.uptime_ms(), methods)
    }
}
