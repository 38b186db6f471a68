use std::sync::atomic::{AtomicU64, Ordering};

use crate::defs::{LATENCY_BUCKET_SIZE_NS, LATENCY_MAX_NS};

/// Summary statistics computed from a [`LatencyTracker`] histogram.
///
/// Percentile values are bucket lower bounds, so their resolution is
/// the tracker's bucket size.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LatencyStats {
    /// Smallest recorded sample.
    pub min_ns: u64,
    /// Largest recorded sample.
    pub max_ns: u64,
    /// Arithmetic mean of all samples.
    pub mean_ns: u64,
    /// Median.
    pub p50_ns: u64,
    /// 95th percentile.
    pub p95_ns: u64,
    /// 99th percentile.
    pub p99_ns: u64,
    /// 99.9th percentile.
    pub p999_ns: u64,
    /// Number of samples recorded.
    pub sample_count: u64,
}

/// Lock-free bucket-histogram latency sink.
///
/// [`record`](Self::record) may be called concurrently from any number
/// of threads; it performs only relaxed atomic increments and CAS
/// min/max updates. Samples beyond the configured maximum land in the
/// final overflow bucket.
#[derive(Debug)]
pub struct LatencyTracker {
    bucket_size_ns: u64,
    histogram: Vec<AtomicU64>,
    min_latency: AtomicU64,
    max_latency: AtomicU64,
    total_samples: AtomicU64,
    total_latency: AtomicU64,
}

impl Default for LatencyTracker {
    fn default() -> Self {
        Self::new(LATENCY_BUCKET_SIZE_NS, LATENCY_MAX_NS)
    }
}

impl LatencyTracker {
    /// Creates a tracker with `(max_latency_ns / bucket_size_ns) + 1`
    /// buckets of `bucket_size_ns` each.
    pub fn new(bucket_size_ns: u64, max_latency_ns: u64) -> Self {
        let num_buckets = (max_latency_ns / bucket_size_ns) as usize + 1;
        let histogram = (0..num_buckets).map(|_| AtomicU64::new(0)).collect();

        LatencyTracker {
            bucket_size_ns,
            histogram,
            min_latency: AtomicU64::new(u64::MAX),
            max_latency: AtomicU64::new(0),
            total_samples: AtomicU64::new(0),
            total_latency: AtomicU64::new(0),
        }
    }

    /// Records one latency sample. Lock-free and safe from any thread.
    pub fn record(&self, latency_ns: u64) {
        let mut current_min = self.min_latency.load(Ordering::Relaxed);
        while latency_ns < current_min {
            match self.min_latency.compare_exchange_weak(
                current_min,
                latency_ns,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(observed) => current_min = observed,
            }
        }

        let mut current_max = self.max_latency.load(Ordering::Relaxed);
        while latency_ns > current_max {
            match self.max_latency.compare_exchange_weak(
                current_max,
                latency_ns,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(observed) => current_max = observed,
            }
        }

        let index = ((latency_ns / self.bucket_size_ns) as usize).min(self.histogram.len() - 1);
        self.histogram[index].fetch_add(1, Ordering::Relaxed);

        self.total_samples.fetch_add(1, Ordering::Relaxed);
        self.total_latency.fetch_add(latency_ns, Ordering::Relaxed);
    }

    /// Computes summary statistics from the histogram. Returns zeroed
    /// stats while no samples have been recorded.
    pub fn stats(&self) -> LatencyStats {
        let sample_count = self.total_samples.load(Ordering::Relaxed);
        if sample_count == 0 {
            return LatencyStats::default();
        }

        let mut stats = LatencyStats {
            min_ns: self.min_latency.load(Ordering::Relaxed),
            max_ns: self.max_latency.load(Ordering::Relaxed),
            mean_ns: self.total_latency.load(Ordering::Relaxed) / sample_count,
            sample_count,
            ..LatencyStats::default()
        };

        let p50_target = sample_count * 50 / 100;
        let p95_target = sample_count * 95 / 100;
        let p99_target = sample_count * 99 / 100;
        let p999_target = sample_count * 999 / 1000;

        let mut cumulative = 0u64;
        let mut found_p50 = false;
        let mut found_p95 = false;
        let mut found_p99 = false;

        for (i, bucket) in self.histogram.iter().enumerate() {
            cumulative += bucket.load(Ordering::Relaxed);
            let bucket_floor = i as u64 * self.bucket_size_ns;

            if !found_p50 && cumulative >= p50_target {
                stats.p50_ns = bucket_floor;
                found_p50 = true;
            }
            if !found_p95 && cumulative >= p95_target {
                stats.p95_ns = bucket_floor;
                found_p95 = true;
            }
            if !found_p99 && cumulative >= p99_target {
                stats.p99_ns = bucket_floor;
                found_p99 = true;
            }
            if cumulative >= p999_target {
                stats.p999_ns = bucket_floor;
                break;
            }
        }

        stats
    }

    /// Clears every bucket and counter.
    pub fn reset(&self) {
        for bucket in &self.histogram {
            bucket.store(0, Ordering::Relaxed);
        }
        self.min_latency.store(u64::MAX, Ordering::Relaxed);
        self.max_latency.store(0, Ordering::Relaxed);
        self.total_samples.store(0, Ordering::Relaxed);
        self.total_latency.store(0, Ordering::Relaxed);
    }

    /// Copies the raw bucket counts, index `i` covering
    /// `[i*bucket_size, (i+1)*bucket_size)` nanoseconds.
    pub fn histogram(&self) -> Vec<u64> {
        self.histogram
            .iter()
            .map(|bucket| bucket.load(Ordering::Relaxed))
            .collect()
    }

    /// Width of one histogram bucket in nanoseconds.
    pub fn bucket_size_ns(&self) -> u64 {
        self.bucket_size_ns
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_empty_stats_are_zeroed() {
        let tracker = LatencyTracker::new(100, 10_000);
        assert_eq!(tracker.stats(), LatencyStats::default());
    }

    #[test]
    fn test_min_max_mean() {
        let tracker = LatencyTracker::new(10, 1000);
        tracker.record(100);
        tracker.record(200);
        tracker.record(600);

        let stats = tracker.stats();
        assert_eq!(stats.sample_count, 3);
        assert_eq!(stats.min_ns, 100);
        assert_eq!(stats.max_ns, 600);
        assert_eq!(stats.mean_ns, 300);
    }

    #[test]
    fn test_percentiles_over_uniform_ramp() {
        let tracker = LatencyTracker::new(1, 10_000);
        for sample in 1..=1000u64 {
            tracker.record(sample);
        }

        let stats = tracker.stats();
        assert!(stats.p50_ns >= 490 && stats.p50_ns <= 510, "p50={}", stats.p50_ns);
        assert!(stats.p95_ns >= 940 && stats.p95_ns <= 960, "p95={}", stats.p95_ns);
        assert!(stats.p99_ns >= 980 && stats.p99_ns <= 1000, "p99={}", stats.p99_ns);
        assert!(stats.p999_ns >= 980 && stats.p999_ns <= 1000, "p999={}", stats.p999_ns);
    }

    #[test]
    fn test_overflow_bucket_catches_outliers() {
        let tracker = LatencyTracker::new(100, 1000);
        tracker.record(50_000_000);

        let buckets = tracker.histogram();
        assert_eq!(*buckets.last().unwrap(), 1);
        assert_eq!(tracker.stats().max_ns, 50_000_000);
    }

    #[test]
    fn test_reset_clears_everything() {
        let tracker = LatencyTracker::new(100, 10_000);
        tracker.record(500);
        tracker.record(900);
        tracker.reset();

        assert_eq!(tracker.stats(), LatencyStats::default());
        assert!(tracker.histogram().iter().all(|&c| c == 0));
    }

    #[test]
    fn test_concurrent_recording() {
        let tracker = Arc::new(LatencyTracker::new(100, 100_000));

        let handles: Vec<_> = (0..4u64)
            .map(|t| {
                let tracker = Arc::clone(&tracker);
                thread::spawn(move || {
                    for i in 0..10_000u64 {
                        tracker.record(t * 10_000 + i);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let stats = tracker.stats();
        assert_eq!(stats.sample_count, 40_000);
        assert_eq!(stats.min_ns, 0);
        assert_eq!(stats.max_ns, 39_999);
    }
}
