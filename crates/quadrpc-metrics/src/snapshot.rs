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

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Server information returned by `_info`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerInfo {
    pub version: String,
    pub uptime_ms: u64,
    /// Operation names the server dispatches, sorted.
    pub methods: Vec<String>,
}

impl ServerInfo {
    pub fn new(uptime_ms: u64, methods: Vec<String>) -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_ms,
            methods,
        }
    }
}

/// Metrics for one operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodMetrics {
    pub call_count: u64,
    pub success_count: u64,
    pub failure_count: u64,
    /// Terminal status counts keyed by code name (`OK`, `INVALID_ARGUMENT`, ...)
    pub codes: BTreeMap<String, u64>,
    pub avg_latency_us: u64,
    pub p50_latency_us: u64,
    pub p95_latency_us: u64,
    pub p99_latency_us: u64,
    pub max_latency_us: u64,
}

impl MethodMetrics {
    pub fn new() -> Self {
        Self {
            call_count: 0,
            success_count: 0,
            failure_count: 0,
            codes: BTreeMap::new(),
            avg_latency_us: 0,
            p50_latency_us: 0,
            p95_latency_us: 0,
            p99_latency_us: 0,
            max_latency_us: 0,
        }
    }
}

impl Default for MethodMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Complete metrics snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub total_calls: u64,
    pub successful_calls: u64,
    pub failed_calls: u64,
    pub active_calls: u64,
    pub uptime_ms: u64,
    pub codes: BTreeMap<String, u64>,
    pub methods: BTreeMap<String, MethodMetrics>,
}

impl MetricsSnapshot {
    pub fn new(uptime_ms: u64) -> Self {
        Self {
            total_calls: 0,
            successful_calls: 0,
            failed_calls: 0,
            active_calls: 0,
            uptime_ms,
            codes: BTreeMap::new(),
            methods: BTreeMap::new(),
        }
    }

    /// Number of finished calls that ended with `code`.
    pub fn code_count(&self, code: quadrpc_common::Code) -> u64 {
        self.codes.get(code.as_str()).copied().unwrap_or(0)
    }
}
