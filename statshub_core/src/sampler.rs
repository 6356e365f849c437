//! Windowed latency histogram with fixed memory.
//!
//! Durations are recorded in milliseconds into an HdrHistogram with three
//! significant figures, so the sampler costs the same whether it sees ten
//! requests or ten million. Values below 2048 ms are exact.

use hdrhistogram::Histogram;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Longest trackable duration; anything slower is recorded as this.
pub const MAX_TRACKABLE_MS: u64 = 3_600_000;

const SIGNIFICANT_FIGURES: u8 = 3;

/// Fixed percentile ranks reported per window.
pub const PERCENTILE_RANKS: [f64; 7] = [0.25, 0.50, 0.75, 0.95, 0.98, 0.99, 0.999];

/// Percentile estimates in milliseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Percentiles {
    pub p25: f64,
    pub p50: f64,
    pub p75: f64,
    pub p95: f64,
    pub p98: f64,
    pub p99: f64,
    pub p999: f64,
}

impl Percentiles {
    fn from_values(v: [f64; 7]) -> Self {
        Self {
            p25: v[0],
            p50: v[1],
            p75: v[2],
            p95: v[3],
            p98: v[4],
            p99: v[5],
            p999: v[6],
        }
    }

    /// Values in rank order, P25 first.
    pub fn as_array(&self) -> [f64; 7] {
        [
            self.p25, self.p50, self.p75, self.p95, self.p98, self.p99, self.p999,
        ]
    }

    pub fn is_zero(&self) -> bool {
        self.as_array().iter().all(|v| *v == 0.0)
    }
}

struct Window {
    hist: Histogram<u64>,
    /// Exact largest value recorded; the histogram only knows its bucket.
    max_ms: u64,
}

pub struct DurationSampler {
    window: Mutex<Window>,
}

impl DurationSampler {
    pub fn new() -> Self {
        // Constant bounds: 1 ms .. 1 h, 3 significant figures.
        let hist = Histogram::<u64>::new_with_bounds(1, MAX_TRACKABLE_MS, SIGNIFICANT_FIGURES)
            .expect("valid histogram bounds");
        Self {
            window: Mutex::new(Window { hist, max_ms: 0 }),
        }
    }

    pub fn update(&self, duration: Duration) {
        let ms = u64::try_from(duration.as_millis())
            .unwrap_or(u64::MAX)
            .min(MAX_TRACKABLE_MS);

        let mut window = self.window.lock();
        window.hist.saturating_record(ms);
        window.max_ms = window.max_ms.max(ms);
    }

    /// Percentile estimates for the current window; all zero when empty.
    /// No value exceeds the largest observation of the window.
    pub fn percentiles(&self) -> Percentiles {
        let window = self.window.lock();
        if window.hist.len() == 0 {
            return Percentiles::default();
        }

        let mut values = [0.0; 7];
        for (value, q) in values.iter_mut().zip(PERCENTILE_RANKS) {
            *value = window.hist.value_at_quantile(q).min(window.max_ms) as f64;
        }
        Percentiles::from_values(values)
    }

    /// Number of observations in the current window.
    pub fn count(&self) -> u64 {
        self.window.lock().hist.len()
    }

    pub fn reset(&self) {
        let mut window = self.window.lock();
        window.hist.reset();
        window.max_ms = 0;
    }
}

impl Default for DurationSampler {
    fn default() -> Self {
        Self::new()
    }
}
