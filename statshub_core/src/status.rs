use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Size of the status code domain: codes `0..STATUS_CODE_LIMIT` are counted.
pub const STATUS_CODE_LIMIT: usize = 1000;

/// Windowed tally of HTTP status codes.
///
/// Each slot is an independent atomic, so `count` never loses increments.
/// `codes` and `reset` are meant for the tick thread; an increment racing a
/// reset lands in either the old or the new window.
pub struct StatusCounter {
    slots: Box<[AtomicU64]>,
}

impl StatusCounter {
    pub fn new() -> Self {
        let slots = (0..STATUS_CODE_LIMIT)
            .map(|_| AtomicU64::new(0))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self { slots }
    }

    /// Count one occurrence of `code`. Codes outside `[0, 999]` are dropped.
    pub fn count(&self, code: i32) {
        let Ok(idx) = usize::try_from(code) else {
            return;
        };
        if let Some(slot) = self.slots.get(idx) {
            slot.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Sparse view of the current window: only codes with a non-zero count.
    pub fn codes(&self) -> BTreeMap<u16, u64> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(code, slot)| {
                let n = slot.load(Ordering::Relaxed);
                (n > 0).then_some((code as u16, n))
            })
            .collect()
    }

    pub fn reset(&self) {
        for slot in self.slots.iter() {
            slot.store(0, Ordering::Relaxed);
        }
    }
}

impl Default for StatusCounter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_count_and_codes() {
        let counter = StatusCounter::new();
        counter.count(404);
        counter.count(404);
        counter.count(404);

        let codes = counter.codes();
        assert_eq!(codes.len(), 1);
        assert_eq!(codes.get(&404), Some(&3));
    }

    #[test]
    fn test_out_of_range_dropped() {
        let counter = StatusCounter::new();
        counter.count(-1);
        counter.count(1000);
        counter.count(i32::MAX);
        assert!(counter.codes().is_empty());

        counter.count(0);
        counter.count(999);
        let codes = counter.codes();
        assert_eq!(codes.get(&0), Some(&1));
        assert_eq!(codes.get(&999), Some(&1));
    }

    #[test]
    fn test_reset() {
        let counter = StatusCounter::new();
        counter.count(200);
        counter.count(500);
        counter.reset();
        assert!(counter.codes().is_empty());

        counter.count(201);
        assert_eq!(counter.codes().get(&201), Some(&1));
    }

    #[test]
    fn test_concurrent_count() {
        let counter = StatusCounter::new();
        std::thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| {
                    for _ in 0..1000 {
                        counter.count(200);
                    }
                });
            }
        });
        assert_eq!(counter.codes().get(&200), Some(&8000));
    }
}
