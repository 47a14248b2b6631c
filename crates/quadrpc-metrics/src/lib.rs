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

//! QuadRPC Metrics Collection
//!
//! Thread-safe call metrics for QuadRPC servers: call counts per terminal
//! status code, in-flight calls, and per-operation latency summaries.
//!
//! # Components
//!
//! - [`MetricsRegistry`]: Atomic counters plus a per-operation map
//! - [`MetricsCollector`]: What the dispatcher records into and how built-ins are answered
//! - [`MetricsSnapshot`] / [`ServerInfo`]: Serializable views returned by `_metrics` and `_info`
//!
//! # Usage Example
//!
//! ```rust
//! use quadrpc_common::Code;
//! use quadrpc_metrics::{MetricsCollector, ServerMetricsCollector};
//! use std::time::Instant;
//!
//! let collector = ServerMetricsCollector::new();
//!
//! let start = Instant::now();
//! collector.call_started();
//! // ... run the call ...
//! collector.record_call("calculator.Add", start, Code::Ok);
//!
//! assert_eq!(collector.snapshot().total_calls, 1);
//! ```

mod collector;
mod registry;
mod snapshot;

pub use collector::{MetricsCollector, ServerMetricsCollector, INFO_METHOD, METRICS_METHOD};
pub use registry::{MetricsConfig, MetricsRegistry};
pub use snapshot::{MethodMetrics, MetricsSnapshot, ServerInfo};
