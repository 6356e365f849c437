use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::ewma::RateTracker;
use crate::sampler::{DurationSampler, Percentiles};
use crate::status::StatusCounter;

/// One completed request as seen by an adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestOutcome {
    pub status_code: u16,
    pub duration: Duration,
    pub request_bytes: u64,
    pub response_bytes: u64,
}

impl RequestOutcome {
    pub fn new(status_code: u16, duration: Duration) -> Self {
        Self {
            status_code,
            duration,
            request_bytes: 0,
            response_bytes: 0,
        }
    }

    pub fn with_sizes(mut self, request_bytes: u64, response_bytes: u64) -> Self {
        self.request_bytes = request_bytes;
        self.response_bytes = response_bytes;
        self
    }

    pub fn is_error(&self) -> bool {
        self.status_code >= 400
    }
}

/// HTTP method plus normalized route path. Compared by exact string match.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RouteKey {
    pub method: String,
    pub path: String,
}

impl RouteKey {
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
        }
    }
}

impl fmt::Display for RouteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.path)
    }
}

/// Derived statistics for one route at one tick.
///
/// `count`, `err_count`, `min`, `max`, `mean` and the byte totals are
/// cumulative; percentiles and `codes` cover only the window since the
/// previous snapshot. Durations are milliseconds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub count: u64,
    pub m1: f64,
    pub m5: f64,
    pub m15: f64,

    pub err_count: u64,
    pub m1_err: f64,
    pub m5_err: f64,
    pub m15_err: f64,

    pub m1_err_percent: f64,
    pub m5_err_percent: f64,
    pub m15_err_percent: f64,

    pub min: u64,
    pub max: u64,
    pub mean: f64,

    #[serde(flatten)]
    pub percentiles: Percentiles,

    pub req_size: u64,
    pub resp_size: u64,

    pub codes: BTreeMap<u16, u64>,
}

/// Per-route statistics container.
///
/// `observe` takes the shared side of `gate`: counters are atomics and the
/// sampler only holds its own lock for a single record. `snapshot` takes the
/// exclusive side because it reads-then-resets the windowed parts.
pub struct RequestStatAggregator {
    gate: RwLock<()>,

    count: AtomicU64,
    rates: RateTracker,

    err_count: AtomicU64,
    err_rates: RateTracker,

    total_ms: AtomicU64,
    min_ms: AtomicU64,
    max_ms: AtomicU64,

    sampler: DurationSampler,

    req_bytes: AtomicU64,
    resp_bytes: AtomicU64,

    codes: StatusCounter,
}

impl RequestStatAggregator {
    pub fn new() -> Self {
        Self {
            gate: RwLock::new(()),
            count: AtomicU64::new(0),
            rates: RateTracker::new(),
            err_count: AtomicU64::new(0),
            err_rates: RateTracker::new(),
            total_ms: AtomicU64::new(0),
            min_ms: AtomicU64::new(u64::MAX),
            max_ms: AtomicU64::new(0),
            sampler: DurationSampler::new(),
            req_bytes: AtomicU64::new(0),
            resp_bytes: AtomicU64::new(0),
            codes: StatusCounter::new(),
        }
    }

    pub fn observe(&self, outcome: &RequestOutcome) {
        let _shared = self.gate.read();

        self.count.fetch_add(1, Ordering::Relaxed);
        self.rates.update(1);

        if outcome.is_error() {
            self.err_count.fetch_add(1, Ordering::Relaxed);
            self.err_rates.update(1);
        }

        let ms = u64::try_from(outcome.duration.as_millis()).unwrap_or(u64::MAX);
        self.total_ms.fetch_add(ms, Ordering::Relaxed);
        self.min_ms.fetch_min(ms, Ordering::Relaxed);
        self.max_ms.fetch_max(ms, Ordering::Relaxed);

        self.sampler.update(outcome.duration);

        self.req_bytes
            .fetch_add(outcome.request_bytes, Ordering::Relaxed);
        self.resp_bytes
            .fetch_add(outcome.response_bytes, Ordering::Relaxed);

        self.codes.count(i32::from(outcome.status_code));
    }

    /// Flush one tick. Expected to be called every [`crate::TICK_INTERVAL`]
    /// from a single task; the EWMAs assume that cadence.
    pub fn snapshot(&self) -> Snapshot {
        let _exclusive = self.gate.write();

        self.rates.tick();
        self.err_rates.tick();
        let rates = self.rates.rates();
        let err_rates = self.err_rates.rates();

        let percentiles = self.sampler.percentiles();
        self.sampler.reset();

        let codes = self.codes.codes();
        self.codes.reset();

        let count = self.count.load(Ordering::Relaxed);
        let (mean, min) = if count > 0 {
            (
                self.total_ms.load(Ordering::Relaxed) as f64 / count as f64,
                self.min_ms.load(Ordering::Relaxed),
            )
        } else {
            (0.0, 0)
        };

        Snapshot {
            count,
            m1: rates.m1,
            m5: rates.m5,
            m15: rates.m15,

            err_count: self.err_count.load(Ordering::Relaxed),
            m1_err: err_rates.m1,
            m5_err: err_rates.m5,
            m15_err: err_rates.m15,

            m1_err_percent: ratio(err_rates.m1, rates.m1),
            m5_err_percent: ratio(err_rates.m5, rates.m5),
            m15_err_percent: ratio(err_rates.m15, rates.m15),

            min,
            max: self.max_ms.load(Ordering::Relaxed),
            mean,

            percentiles,

            req_size: self.req_bytes.load(Ordering::Relaxed),
            resp_size: self.resp_bytes.load(Ordering::Relaxed),

            codes,
        }
    }
}

impl Default for RequestStatAggregator {
    fn default() -> Self {
        Self::new()
    }
}

fn ratio(part: f64, whole: f64) -> f64 {
    if whole > 0.0 {
        part / whole
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::Arc;

    fn ok(ms: u64) -> RequestOutcome {
        RequestOutcome::new(200, Duration::from_millis(ms)).with_sizes(100, 200)
    }

    fn failed(ms: u64) -> RequestOutcome {
        RequestOutcome::new(500, Duration::from_millis(ms)).with_sizes(100, 200)
    }

    #[test]
    fn test_orders_route_snapshot() {
        let agg = RequestStatAggregator::new();
        for _ in 0..10 {
            agg.observe(&ok(50));
        }
        for _ in 0..2 {
            agg.observe(&failed(500));
        }

        let snap = agg.snapshot();
        assert_eq!(snap.count, 12);
        assert_eq!(snap.err_count, 2);
        assert_eq!(snap.min, 50);
        assert_eq!(snap.max, 500);
        assert!((snap.mean - 125.0).abs() < 1e-9);
        assert_eq!(snap.req_size, 1200);
        assert_eq!(snap.resp_size, 2400);
        assert_eq!(snap.codes.get(&200), Some(&10));
        assert_eq!(snap.codes.get(&500), Some(&2));

        // First tick: rate = count / 5s
        assert!((snap.m1 - 12.0 / 5.0).abs() < 1e-9);
        assert!((snap.m1_err - 2.0 / 5.0).abs() < 1e-9);
        assert!((snap.m1_err_percent - 2.0 / 12.0).abs() < 1e-9);
        assert!((snap.m5_err_percent - 2.0 / 12.0).abs() < 1e-9);
        assert!((snap.m15_err_percent - 2.0 / 12.0).abs() < 1e-9);

        assert_eq!(snap.percentiles.p50, 50.0);
        assert_eq!(snap.percentiles.p99, 500.0);
        assert!(snap.percentiles.p999 <= snap.max as f64);
    }

    #[test]
    fn test_empty_snapshot() {
        let agg = RequestStatAggregator::new();
        let snap = agg.snapshot();
        assert_eq!(snap.count, 0);
        assert_eq!(snap.min, 0);
        assert_eq!(snap.max, 0);
        assert_eq!(snap.mean, 0.0);
        assert_eq!(snap.m1_err_percent, 0.0);
        assert!(snap.percentiles.is_zero());
        assert!(snap.codes.is_empty());
    }

    #[test]
    fn test_second_snapshot_resets_window_only() {
        let agg = RequestStatAggregator::new();
        agg.observe(&ok(20));
        agg.observe(&failed(80));

        let first = agg.snapshot();
        let second = agg.snapshot();

        assert!(!first.percentiles.is_zero());
        assert!(!first.codes.is_empty());

        assert!(second.percentiles.is_zero());
        assert!(second.codes.is_empty());
        assert_eq!(second.count, first.count);
        assert_eq!(second.err_count, first.err_count);
        assert_eq!(second.min, first.min);
        assert_eq!(second.max, first.max);
        assert_eq!(second.req_size, first.req_size);
        // No new traffic: the rate decays
        assert!(second.m1 < first.m1);
    }

    #[test]
    fn test_concurrent_observe_with_snapshots() {
        let agg = Arc::new(RequestStatAggregator::new());
        let threads = 8;
        let per_thread = 2_000u64;

        let mut windowed_codes = 0u64;
        std::thread::scope(|s| {
            for t in 0..threads {
                let agg = Arc::clone(&agg);
                s.spawn(move || {
                    for i in 0..per_thread {
                        let code = if i % 10 == 0 { 503 } else { 200 };
                        let ms = (t as u64 * 7 + i) % 300;
                        agg.observe(&RequestOutcome::new(code, Duration::from_millis(ms)));
                    }
                });
            }
            for _ in 0..5 {
                let snap = agg.snapshot();
                assert!(snap.err_count <= snap.count);
                windowed_codes += snap.codes.values().sum::<u64>();
            }
        });

        let last = agg.snapshot();
        windowed_codes += last.codes.values().sum::<u64>();
        let total = threads as u64 * per_thread;
        assert_eq!(last.count, total);
        assert_eq!(last.err_count, total / 10);
        assert_eq!(last.min, 0);
        assert_eq!(last.max, 299);
        // Reset races may misattribute a handful of codes, never many.
        assert!(windowed_codes.abs_diff(total) <= threads as u64 * 5);
    }

    proptest! {
        #[test]
        fn prop_counts_match_inputs(
            outcomes in prop::collection::vec((100u16..600, 0u64..5_000), 1..200)
        ) {
            let agg = RequestStatAggregator::new();
            let mut errors = 0u64;
            for (code, ms) in &outcomes {
                if *code >= 400 {
                    errors += 1;
                }
                agg.observe(&RequestOutcome::new(*code, Duration::from_millis(*ms)));
            }
            let snap = agg.snapshot();
            prop_assert_eq!(snap.count, outcomes.len() as u64);
            prop_assert_eq!(snap.err_count, errors);
            prop_assert!(snap.min as f64 <= snap.mean && snap.mean <= snap.max as f64);
            let p = snap.percentiles.as_array();
            for pair in p.windows(2) {
                prop_assert!(pair[0] <= pair[1]);
            }
            prop_assert!(p[6] <= snap.max as f64);
        }
    }
}
