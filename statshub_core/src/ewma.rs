//! Exponentially-weighted moving average rate estimators.
//!
//! Events are counted lock-free between ticks; `tick` folds the pending count
//! into the running rate. Ticks must arrive every [`TICK_INTERVAL`], the decay
//! factor is derived from it.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crate::TICK_INTERVAL;

pub struct Ewma {
    alpha: f64,
    uncounted: AtomicU64,
    // f64 bits, events per second
    rate: AtomicU64,
    initialized: AtomicBool,
}

impl Ewma {
    /// EWMA with the given time constant in minutes.
    pub fn new(minutes: f64) -> Self {
        let tick_secs = TICK_INTERVAL.as_secs_f64();
        let alpha = 1.0 - (-tick_secs / (minutes * 60.0)).exp();
        Self {
            alpha,
            uncounted: AtomicU64::new(0),
            rate: AtomicU64::new(0f64.to_bits()),
            initialized: AtomicBool::new(false),
        }
    }

    pub fn one_minute() -> Self {
        Self::new(1.0)
    }

    pub fn five_minutes() -> Self {
        Self::new(5.0)
    }

    pub fn fifteen_minutes() -> Self {
        Self::new(15.0)
    }

    pub fn update(&self, n: u64) {
        self.uncounted.fetch_add(n, Ordering::Relaxed);
    }

    /// Decay the rate by one interval. Callers serialize ticks.
    pub fn tick(&self) {
        let count = self.uncounted.swap(0, Ordering::Relaxed);
        let instant = count as f64 / TICK_INTERVAL.as_secs_f64();

        let next = if self.initialized.swap(true, Ordering::AcqRel) {
            let current = self.rate();
            current + self.alpha * (instant - current)
        } else {
            instant
        };
        self.rate.store(next.to_bits(), Ordering::Release);
    }

    /// Events per second.
    pub fn rate(&self) -> f64 {
        f64::from_bits(self.rate.load(Ordering::Acquire))
    }
}

/// Rates for the three standard time constants, events per second.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Rates {
    pub m1: f64,
    pub m5: f64,
    pub m15: f64,
}

pub struct RateTracker {
    m1: Ewma,
    m5: Ewma,
    m15: Ewma,
}

impl RateTracker {
    pub fn new() -> Self {
        Self {
            m1: Ewma::one_minute(),
            m5: Ewma::five_minutes(),
            m15: Ewma::fifteen_minutes(),
        }
    }

    pub fn update(&self, n: u64) {
        self.m1.update(n);
        self.m5.update(n);
        self.m15.update(n);
    }

    pub fn tick(&self) {
        self.m1.tick();
        self.m5.tick();
        self.m15.tick();
    }

    pub fn rates(&self) -> Rates {
        Rates {
            m1: self.m1.rate(),
            m5: self.m5.rate(),
            m15: self.m15.rate(),
        }
    }
}

impl Default for RateTracker {
    fn default() -> Self {
        Self::new()
    }
}
