//! Circular load history and moving average.

/// Scale applied to runnable counts so averages keep two decimal places
/// without fractional arithmetic.
pub const LOAD_SCALE: u32 = 100;

/// Fixed-capacity ring of scaled load samples.
///
/// The average always divides by the full capacity, so zero-initialised
/// slots pull it down until the ring has wrapped once.
#[derive(Debug, Clone)]
pub struct LoadHistory {
    samples: Box<[u32]>,
    write_index: usize,
}

impl LoadHistory {
    /// Allocate a history of `capacity` samples (at least one).
    pub fn new(capacity: usize) -> Self {
        Self {
            samples: vec![0; capacity.max(1)].into_boxed_slice(),
            write_index: 0,
        }
    }

    /// Record a runnable count and return the truncated moving average.
    pub fn record_and_average(&mut self, runnable: u32) -> u32 {
        self.samples[self.write_index] = runnable.saturating_mul(LOAD_SCALE);
        self.write_index = (self.write_index + 1) % self.samples.len();
        self.average()
    }

    /// Average over the full capacity, truncating toward zero.
    pub fn average(&self) -> u32 {
        let sum: u64 = self.samples.iter().map(|&s| u64::from(s)).sum();
        (sum / self.samples.len() as u64) as u32
    }

    pub fn capacity(&self) -> usize {
        self.samples.len()
    }

    /// Slot the next sample will overwrite.
    pub fn write_index(&self) -> usize {
        self.write_index
    }

    /// The most recently written scaled sample.
    pub fn latest(&self) -> u32 {
        let last = (self.write_index + self.samples.len() - 1) % self.samples.len();
        self.samples[last]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn average_counts_unfilled_slots() {
        let mut h = LoadHistory::new(4);
        assert_eq!(h.record_and_average(4), 100);
        assert_eq!(h.record_and_average(4), 200);
    }

    #[test]
    fn converges_after_full_capacity() {
        let mut h = LoadHistory::new(12);
        let mut avg = 0;
        for _ in 0..12 {
            avg = h.record_and_average(6);
        }
        assert_eq!(avg, 600);
    }

    #[test]
    fn write_index_wraps() {
        let mut h = LoadHistory::new(3);
        for _ in 0..3 {
            h.record_and_average(1);
        }
        assert_eq!(h.write_index(), 0);
        h.record_and_average(2);
        assert_eq!(h.write_index(), 1);
        assert_eq!(h.latest(), 200);
    }

    #[test]
    fn oldest_sample_is_evicted() {
        let mut h = LoadHistory::new(2);
        h.record_and_average(10);
        h.record_and_average(0);
        assert_eq!(h.record_and_average(0), 0);
    }

    #[test]
    fn integer_division_truncates() {
        let mut h = LoadHistory::new(3);
        // 100 / 3 = 33.3
        assert_eq!(h.record_and_average(1), 33);
    }

    #[test]
    fn average_bounded_by_largest_sample() {
        let mut h = LoadHistory::new(5);
        let inputs = [3u32, 0, 7, 1, 7, 2, 0, 0, 9, 4, 1];
        let mut peak = 0;
        for r in inputs {
            peak = peak.max(r);
            let avg = h.record_and_average(r);
            assert!(avg <= peak * LOAD_SCALE);
        }
    }

    #[test]
    fn zero_capacity_is_clamped() {
        let mut h = LoadHistory::new(0);
        assert_eq!(h.capacity(), 1);
        assert_eq!(h.record_and_average(2), 200);
    }

    #[test]
    fn huge_counts_saturate() {
        let mut h = LoadHistory::new(1);
        assert_eq!(h.record_and_average(u32::MAX), u32::MAX);
    }
}
