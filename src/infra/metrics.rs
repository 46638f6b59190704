//! Lock-free metrics collection and periodic reporting
//!
//! Uses atomics for hot-path operations so request handlers never contend on
//! a mutex. Counters and histogram buckets are monotonic (Prometheus scrapes
//! them as-is); only the rate window and the max latency reset on `report()`.
//!
//! NOTE: All atomics use Relaxed ordering intentionally. These are statistical
//! counters only and must not be used for coordination or logic decisions.

use crate::domain::types::ScanStatus;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

/// Prometheus-style exponential bucket boundaries (microseconds)
/// Buckets: ≤100, ≤200, ≤400, ≤800, ≤1600, ≤3200, ≤6400, ≤12800, ≤25600, ≤51200, >51200
pub const METRICS_BUCKET_BOUNDS: [u64; 10] =
    [100, 200, 400, 800, 1600, 3200, 6400, 12800, 25600, 51200];
pub const METRICS_NUM_BUCKETS: usize = 11;

/// Every scan status, in counter order
pub const SCAN_STATUSES: [ScanStatus; 7] = [
    ScanStatus::Success,
    ScanStatus::Checkin,
    ScanStatus::Checkout,
    ScanStatus::Warning,
    ScanStatus::Unknown,
    ScanStatus::Enrolled,
    ScanStatus::Error,
];

/// Compute bucket index for a latency value using binary search
#[inline]
fn bucket_index(latency_us: u64) -> usize {
    METRICS_BUCKET_BOUNDS.partition_point(|&bound| bound < latency_us)
}

#[inline]
fn status_index(status: ScanStatus) -> usize {
    match status {
        ScanStatus::Success => 0,
        ScanStatus::Checkin => 1,
        ScanStatus::Checkout => 2,
        ScanStatus::Warning => 3,
        ScanStatus::Unknown => 4,
        ScanStatus::Enrolled => 5,
        ScanStatus::Error => 6,
    }
}

/// Update an atomic max value using compare-and-swap loop
#[inline]
fn update_atomic_max(atomic_max: &AtomicU64, new_value: u64) {
    let mut current_max = atomic_max.load(Ordering::Relaxed);
    while new_value > current_max {
        match atomic_max.compare_exchange_weak(
            current_max,
            new_value,
            Ordering::Relaxed,
            Ordering::Relaxed,
        ) {
            Ok(_) => break,
            Err(actual) => current_max = actual,
        }
    }
}

/// Load all bucket values without resetting
#[inline]
fn load_buckets(buckets: &[AtomicU64; METRICS_NUM_BUCKETS]) -> [u64; METRICS_NUM_BUCKETS] {
    let mut result = [0u64; METRICS_NUM_BUCKETS];
    for (i, bucket) in buckets.iter().enumerate() {
        result[i] = bucket.load(Ordering::Relaxed);
    }
    result
}

/// Compute percentile from histogram buckets
/// Returns the upper bound of the bucket containing the percentile
fn percentile_from_buckets(buckets: &[u64; METRICS_NUM_BUCKETS], percentile: f64) -> u64 {
    let total: u64 = buckets.iter().sum();
    if total == 0 {
        return 0;
    }

    let target = ((total as f64 * percentile) as u64).max(1);
    let mut cumulative = 0u64;

    // Upper bounds for each bucket (last bucket uses 2x the previous bound)
    const BUCKET_UPPER_BOUNDS: [u64; METRICS_NUM_BUCKETS] =
        [100, 200, 400, 800, 1600, 3200, 6400, 12800, 25600, 51200, 102400];

    for (i, &count) in buckets.iter().enumerate() {
        cumulative += count;
        if cumulative >= target {
            return BUCKET_UPPER_BOUNDS[i];
        }
    }
    BUCKET_UPPER_BOUNDS[METRICS_NUM_BUCKETS - 1]
}

/// Lock-free metrics collector for the coordinator
pub struct Metrics {
    /// Total scans handled (monotonic)
    scans_total: AtomicU64,
    /// Scans since last report (reset on report)
    scans_since_report: AtomicU64,
    /// Scans per outcome status (monotonic), indexed like `SCAN_STATUSES`
    scan_status_counts: [AtomicU64; 7],
    /// Scan handling latency histogram (monotonic)
    latency_buckets: [AtomicU64; METRICS_NUM_BUCKETS],
    /// Sum of scan latencies in microseconds (monotonic)
    latency_sum_us: AtomicU64,
    /// Max scan latency in microseconds (reset on report)
    latency_max_us: AtomicU64,
    /// Identities created through /enroll (monotonic)
    enrollments_total: AtomicU64,
    /// Enrollments rejected as duplicates (monotonic)
    enrollments_rejected: AtomicU64,
    /// Accepted mode changes (monotonic)
    mode_changes_total: AtomicU64,
    /// Requests that failed on storage (monotonic)
    storage_errors_total: AtomicU64,
    /// Last report time (only accessed from reporter)
    last_report_time: parking_lot::Mutex<Instant>,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            scans_total: AtomicU64::new(0),
            scans_since_report: AtomicU64::new(0),
            scan_status_counts: std::array::from_fn(|_| AtomicU64::new(0)),
            latency_buckets: std::array::from_fn(|_| AtomicU64::new(0)),
            latency_sum_us: AtomicU64::new(0),
            latency_max_us: AtomicU64::new(0),
            enrollments_total: AtomicU64::new(0),
            enrollments_rejected: AtomicU64::new(0),
            mode_changes_total: AtomicU64::new(0),
            storage_errors_total: AtomicU64::new(0),
            last_report_time: parking_lot::Mutex::new(Instant::now()),
        }
    }

    /// Record a handled scan with its outcome and latency (lock-free)
    #[inline]
    pub fn record_scan(&self, status: ScanStatus, latency_us: u64) {
        self.scans_total.fetch_add(1, Ordering::Relaxed);
        self.scans_since_report.fetch_add(1, Ordering::Relaxed);
        self.scan_status_counts[status_index(status)].fetch_add(1, Ordering::Relaxed);
        self.latency_buckets[bucket_index(latency_us)].fetch_add(1, Ordering::Relaxed);
        self.latency_sum_us.fetch_add(latency_us, Ordering::Relaxed);
        update_atomic_max(&self.latency_max_us, latency_us);
    }

    #[inline]
    pub fn record_enrollment(&self, accepted: bool) {
        if accepted {
            self.enrollments_total.fetch_add(1, Ordering::Relaxed);
        } else {
            self.enrollments_rejected.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[inline]
    pub fn record_mode_change(&self) {
        self.mode_changes_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_storage_error(&self) {
        self.storage_errors_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn scans_total(&self) -> u64 {
        self.scans_total.load(Ordering::Relaxed)
    }

    pub fn scan_count(&self, status: ScanStatus) -> u64 {
        self.scan_status_counts[status_index(status)].load(Ordering::Relaxed)
    }

    /// Point-in-time view without resetting anything (used by /metrics)
    pub fn snapshot(&self) -> MetricsSummary {
        let lat_buckets = load_buckets(&self.latency_buckets);
        let scans_total = self.scans_total.load(Ordering::Relaxed);
        let latency_sum = self.latency_sum_us.load(Ordering::Relaxed);

        MetricsSummary {
            scans_total,
            scans_per_sec: 0.0,
            status_counts: SCAN_STATUSES.map(|s| (s, self.scan_count(s))),
            lat_buckets,
            latency_sum_us: latency_sum,
            avg_latency_us: if scans_total > 0 { latency_sum / scans_total } else { 0 },
            max_latency_us: self.latency_max_us.load(Ordering::Relaxed),
            lat_p50_us: percentile_from_buckets(&lat_buckets, 0.50),
            lat_p99_us: percentile_from_buckets(&lat_buckets, 0.99),
            enrollments_total: self.enrollments_total.load(Ordering::Relaxed),
            enrollments_rejected: self.enrollments_rejected.load(Ordering::Relaxed),
            mode_changes_total: self.mode_changes_total.load(Ordering::Relaxed),
            storage_errors_total: self.storage_errors_total.load(Ordering::Relaxed),
        }
    }

    /// Snapshot plus rate over the window since the previous report.
    /// Resets the window counter and max latency.
    pub fn report(&self) -> MetricsSummary {
        let mut summary = self.snapshot();
        let window_scans = self.scans_since_report.swap(0, Ordering::Relaxed);
        summary.max_latency_us = self.latency_max_us.swap(0, Ordering::Relaxed);

        let elapsed = {
            let mut last = self.last_report_time.lock();
            let elapsed = last.elapsed();
            *last = Instant::now();
            elapsed
        };

        summary.scans_per_sec = if elapsed.as_secs_f64() > 0.0 {
            window_scans as f64 / elapsed.as_secs_f64()
        } else {
            0.0
        };
        summary
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Metrics values captured at one instant
#[derive(Debug, Clone)]
pub struct MetricsSummary {
    pub scans_total: u64,
    pub scans_per_sec: f64,
    pub status_counts: [(ScanStatus, u64); 7],
    pub lat_buckets: [u64; METRICS_NUM_BUCKETS],
    pub latency_sum_us: u64,
    pub avg_latency_us: u64,
    pub max_latency_us: u64,
    pub lat_p50_us: u64,
    pub lat_p99_us: u64,
    pub enrollments_total: u64,
    pub enrollments_rejected: u64,
    pub mode_changes_total: u64,
    pub storage_errors_total: u64,
}

impl MetricsSummary {
    pub fn count(&self, status: ScanStatus) -> u64 {
        self.status_counts.iter().find(|(s, _)| *s == status).map_or(0, |(_, c)| *c)
    }

    pub fn log(&self) {
        info!(
            scans_total = %self.scans_total,
            scans_per_sec = format!("{:.2}", self.scans_per_sec),
            checkins = %self.count(ScanStatus::Checkin),
            checkouts = %self.count(ScanStatus::Checkout),
            warnings = %self.count(ScanStatus::Warning),
            unknown = %self.count(ScanStatus::Unknown),
            enrolled = %self.count(ScanStatus::Enrolled),
            errors = %self.count(ScanStatus::Error),
            avg_latency_us = %self.avg_latency_us,
            max_latency_us = %self.max_latency_us,
            p99_us = %self.lat_p99_us,
            storage_errors = %self.storage_errors_total,
            "metrics"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bucket_index() {
        assert_eq!(bucket_index(50), 0);
        assert_eq!(bucket_index(100), 0);
        assert_eq!(bucket_index(101), 1);
        assert_eq!(bucket_index(51200), 9);
        assert_eq!(bucket_index(1_000_000), 10);
    }

    #[test]
    fn test_record_scan_counts_per_status() {
        let metrics = Metrics::new();
        metrics.record_scan(ScanStatus::Checkin, 150);
        metrics.record_scan(ScanStatus::Checkin, 250);
        metrics.record_scan(ScanStatus::Warning, 90);

        assert_eq!(metrics.scans_total(), 3);
        assert_eq!(metrics.scan_count(ScanStatus::Checkin), 2);
        assert_eq!(metrics.scan_count(ScanStatus::Warning), 1);
        assert_eq!(metrics.scan_count(ScanStatus::Checkout), 0);

        let summary = metrics.snapshot();
        assert_eq!(summary.lat_buckets.iter().sum::<u64>(), 3);
        assert_eq!(summary.max_latency_us, 250);
        assert_eq!(summary.avg_latency_us, 163);
    }

    #[test]
    fn test_report_resets_window_but_not_totals() {
        let metrics = Metrics::new();
        metrics.record_scan(ScanStatus::Checkout, 5000);

        let first = metrics.report();
        assert_eq!(first.max_latency_us, 5000);
        assert_eq!(first.scans_total, 1);

        let second = metrics.report();
        assert_eq!(second.max_latency_us, 0);
        assert_eq!(second.scans_total, 1);
        assert_eq!(second.count(ScanStatus::Checkout), 1);
    }

    #[test]
    fn test_percentile_from_empty_buckets() {
        assert_eq!(percentile_from_buckets(&[0; METRICS_NUM_BUCKETS], 0.99), 0);
    }
}
