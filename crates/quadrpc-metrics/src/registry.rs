use crate::snapshot::{MethodMetrics, MetricsSnapshot};
use quadrpc_common::Code;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Instant;

/// One bin per bit length of the latency in microseconds.
const NUM_HISTOGRAM_BINS: usize = 64;

/// Limits on per-method metrics storage.
#[derive(Debug, Clone)]
pub struct MetricsConfig {
    /// Maximum number of distinct operation names to track
    ///
    /// When exceeded, the least recently called operations are evicted.
    pub max_methods: usize,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { max_methods: 1000 }
    }
}

/// Base-2 logarithmic latency histogram.
///
/// Bin `i` holds samples whose value has bit length `i`, so bin 0 is 0us,
/// bin 1 is 1us, bin 2 is 2-3us, bin 3 is 4-7us and so on. Percentiles are
/// reported as the upper bound of the bin that contains them, which is
/// accurate to within a factor of two.
#[derive(Debug)]
struct LatencyHistogram {
    bins: [AtomicU64; NUM_HISTOGRAM_BINS],
    total_latency: AtomicU64,
    sample_count: AtomicU64,
    max_latency: AtomicU64,
}

impl LatencyHistogram {
    fn new() -> Self {
        Self {
            bins: std::array::from_fn(|_| AtomicU64::new(0)),
            total_latency: AtomicU64::new(0),
            sample_count: AtomicU64::new(0),
            max_latency: AtomicU64::new(0),
        }
    }

    fn record(&self, latency_us: u64) {
        self.bins[Self::bin_for(latency_us)].fetch_add(1, Ordering::Relaxed);
        self.total_latency.fetch_add(latency_us, Ordering::Relaxed);
        self.sample_count.fetch_add(1, Ordering::Relaxed);
        self.max_latency.fetch_max(latency_us, Ordering::Relaxed);
    }

    fn bin_for(latency_us: u64) -> usize {
        let bits = (u64::BITS - latency_us.leading_zeros()) as usize;
        bits.min(NUM_HISTOGRAM_BINS - 1)
    }

    /// Largest value that falls in `bin`.
    fn bin_upper_bound(bin: usize) -> u64 {
        match bin {
            0 => 0,
            b if b >= 64 => u64::MAX,
            b => (1u64 << b) - 1,
        }
    }

    fn percentile(&self, percentile: u64) -> u64 {
        let total = self.sample_count.load(Ordering::Relaxed);
        if total == 0 {
            return 0;
        }

        // Rank of the sample we are looking for, 1-based.
        let target = (total * percentile).div_ceil(100).max(1);
        let mut seen = 0;
        for (bin, count) in self.bins.iter().enumerate() {
            seen += count.load(Ordering::Relaxed);
            if seen >= target {
                return Self::bin_upper_bound(bin).min(self.max_latency.load(Ordering::Relaxed));
            }
        }
        self.max_latency.load(Ordering::Relaxed)
    }

    fn average(&self) -> u64 {
        let total = self.sample_count.load(Ordering::Relaxed);
        if total == 0 {
            return 0;
        }
        self.total_latency.load(Ordering::Relaxed) / total
    }
}

/// Counters for one operation.
#[derive(Debug)]
struct MethodStats {
    codes: [AtomicU64; 5],
    latencies: LatencyHistogram,
    /// Registry-local sequence number of the last call, for LRU eviction.
    last_used: AtomicU64,
}

impl MethodStats {
    fn new() -> Self {
        Self {
            codes: std::array::from_fn(|_| AtomicU64::new(0)),
            latencies: LatencyHistogram::new(),
            last_used: AtomicU64::new(0),
        }
    }

    fn record(&self, code: Code, latency_us: u64, sequence: u64) {
        self.codes[code.index()].fetch_add(1, Ordering::Relaxed);
        self.latencies.record(latency_us);
        self.last_used.fetch_max(sequence, Ordering::Relaxed);
    }

    fn snapshot(&self) -> MethodMetrics {
        let codes = code_map(&self.codes);
        let call_count: u64 = codes.values().sum();
        let success_count = self.codes[Code::Ok.index()].load(Ordering::Relaxed);

        MethodMetrics {
            call_count,
            success_count,
            failure_count: call_count.saturating_sub(success_count),
            codes,
            avg_latency_us: self.latencies.average(),
            p50_latency_us: self.latencies.percentile(50),
            p95_latency_us: self.latencies.percentile(95),
            p99_latency_us: self.latencies.percentile(99),
            max_latency_us: self.latencies.max_latency.load(Ordering::Relaxed),
        }
    }
}

/// Thread-safe store for call metrics.
///
/// Counters are atomics updated with `Relaxed` ordering; a snapshot is a
/// best-effort point-in-time view. The per-method map sits behind an
/// `RwLock` that is only held long enough to look up or insert an entry.
///
/// # Example
///
/// ```rust
/// use quadrpc_common::Code;
/// use quadrpc_metrics::MetricsRegistry;
///
/// let registry = MetricsRegistry::new();
/// registry.call_started();
/// registry.call_finished("calculator.Add", 120, Code::Ok);
///
/// let snapshot = registry.snapshot();
/// assert_eq!(snapshot.total_calls, 1);
/// assert_eq!(snapshot.methods["calculator.Add"].success_count, 1);
/// ```
#[derive(Debug)]
pub struct MetricsRegistry {
    codes: [AtomicU64; 5],
    active_calls: AtomicU64,
    sequence: AtomicU64,
    methods: RwLock<HashMap<String, Arc<MethodStats>>>,
    start_time: Instant,
    config: MetricsConfig,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::with_config(MetricsConfig::default())
    }

    pub fn with_config(config: MetricsConfig) -> Self {
        Self {
            codes: std::array::from_fn(|_| AtomicU64::new(0)),
            active_calls: AtomicU64::new(0),
            sequence: AtomicU64::new(0),
            methods: RwLock::new(HashMap::new()),
            start_time: Instant::now(),
            config,
        }
    }

    /// Marks a call as in flight.
    pub fn call_started(&self) {
        self.active_calls.fetch_add(1, Ordering::Relaxed);
    }

    /// Records the terminal status of a call started with [`call_started`](Self::call_started).
    pub fn call_finished(&self, method: &str, latency_us: u64, code: Code) {
        // Saturating: never wrap below zero if calls were not paired.
        let _ = self
            .active_calls
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| Some(n.saturating_sub(1)));
        self.record_call(method, latency_us, code);
    }

    /// Records a finished call without touching the in-flight gauge.
    pub fn record_call(&self, method: &str, latency_us: u64, code: Code) {
        self.codes[code.index()].fetch_add(1, Ordering::Relaxed);
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;

        let existing = self
            .methods
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(method)
            .cloned();
        let stats = match existing {
            Some(stats) => stats,
            None => {
                let mut methods = self.methods.write().unwrap_or_else(PoisonError::into_inner);
                let stats = methods
                    .entry(method.to_string())
                    .or_insert_with(|| Arc::new(MethodStats::new()))
                    .clone();
                if methods.len() > self.config.max_methods {
                    evict_least_recent(&mut methods, self.config.max_methods, method);
                }
                stats
            }
        };

        stats.record(code, latency_us, sequence);
    }

    pub fn active_calls(&self) -> u64 {
        self.active_calls.load(Ordering::Relaxed)
    }

    pub fn uptime_ms(&self) -> u64 {
        self.start_time.elapsed().as_millis() as u64
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let codes = code_map(&self.codes);
        let total_calls: u64 = codes.values().sum();
        let successful_calls = self.codes[Code::Ok.index()].load(Ordering::Relaxed);

        let methods = self
            .methods
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(name, stats)| (name.clone(), stats.snapshot()))
            .collect();

        MetricsSnapshot {
            total_calls,
            successful_calls,
            failed_calls: total_calls.saturating_sub(successful_calls),
            active_calls: self.active_calls(),
            uptime_ms: self.uptime_ms(),
            codes,
            methods,
        }
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn code_map(counters: &[AtomicU64; 5]) -> BTreeMap<String, u64> {
    Code::ALL
        .iter()
        .map(|code| {
            (
                code.as_str().to_string(),
                counters[code.index()].load(Ordering::Relaxed),
            )
        })
        .filter(|(_, count)| *count > 0)
        .collect()
}

fn evict_least_recent(methods: &mut HashMap<String, Arc<MethodStats>>, max: usize, keep: &str) {
    let mut entries: Vec<(String, u64)> = methods
        .iter()
        .filter(|(name, _)| name.as_str() != keep)
        .map(|(name, stats)| (name.clone(), stats.last_used.load(Ordering::Relaxed)))
        .collect();
    entries.sort_by_key(|&(_, last_used)| last_used);

    let excess = methods.len().saturating_sub(max);
    for (name, _) in entries.into_iter().take(excess) {
        methods.remove(&name);
    }
}
