//! Prometheus text exposition of coordinator metrics
//!
//! Rendered on demand by the API server at `GET /metrics`.

use crate::infra::metrics::{Metrics, MetricsSummary, METRICS_BUCKET_BOUNDS, METRICS_NUM_BUCKETS};
use std::fmt::Write;

enum MetricType {
    Counter,
    Gauge,
}

impl MetricType {
    fn as_str(&self) -> &'static str {
        match self {
            MetricType::Counter => "counter",
            MetricType::Gauge => "gauge",
        }
    }
}

fn write_metric(output: &mut String, name: &str, help: &str, typ: MetricType, val: u64) {
    let _ = writeln!(output, "# HELP {name} {help}");
    let _ = writeln!(output, "# TYPE {name} {}", typ.as_str());
    let _ = writeln!(output, "{name} {val}");
}

fn write_histogram(
    output: &mut String,
    name: &str,
    help: &str,
    buckets: &[u64; METRICS_NUM_BUCKETS],
    sum: u64,
) {
    let _ = writeln!(output, "# HELP {name} {help}");
    let _ = writeln!(output, "# TYPE {name} histogram");

    let mut cumulative = 0u64;
    for (i, &bound) in METRICS_BUCKET_BOUNDS.iter().enumerate() {
        cumulative += buckets[i];
        let _ = writeln!(output, "{name}_bucket{{le=\"{bound}\"}} {cumulative}");
    }
    cumulative += buckets[METRICS_NUM_BUCKETS - 1];
    let _ = writeln!(output, "{name}_bucket{{le=\"+Inf\"}} {cumulative}");
    let _ = writeln!(output, "{name}_sum {sum}");
    let _ = writeln!(output, "{name}_count {cumulative}");
}

/// Format metrics in Prometheus text exposition format
pub fn format_prometheus_metrics(metrics: &Metrics) -> String {
    let summary = metrics.snapshot();
    let mut output = String::with_capacity(4096);

    write_scan_metrics(&mut output, &summary);
    write_latency_metrics(&mut output, &summary);
    write_ledger_metrics(&mut output, &summary);

    output
}

fn write_scan_metrics(output: &mut String, summary: &MetricsSummary) {
    write_metric(
        output,
        "presence_scans_total",
        "Total scans handled",
        MetricType::Counter,
        summary.scans_total,
    );

    let _ = writeln!(output, "# HELP presence_scan_outcomes_total Scans by reported status");
    let _ = writeln!(output, "# TYPE presence_scan_outcomes_total counter");
    for (status, count) in summary.status_counts {
        let _ = writeln!(
            output,
            "presence_scan_outcomes_total{{status=\"{}\"}} {count}",
            status.as_str()
        );
    }
}

fn write_latency_metrics(output: &mut String, summary: &MetricsSummary) {
    write_histogram(
        output,
        "presence_scan_latency_us",
        "Scan handling latency in microseconds",
        &summary.lat_buckets,
        summary.latency_sum_us,
    );
    write_metric(
        output,
        "presence_scan_latency_p50_us",
        "50th percentile scan latency",
        MetricType::Gauge,
        summary.lat_p50_us,
    );
    write_metric(
        output,
        "presence_scan_latency_p99_us",
        "99th percentile scan latency",
        MetricType::Gauge,
        summary.lat_p99_us,
    );
    write_metric(
        output,
        "presence_scan_latency_max_us",
        "Maximum scan latency since the last periodic report",
        MetricType::Gauge,
        summary.max_latency_us,
    );
}

fn write_ledger_metrics(output: &mut String, summary: &MetricsSummary) {
    write_metric(
        output,
        "presence_enrollments_total",
        "Identities enrolled by operators",
        MetricType::Counter,
        summary.enrollments_total,
    );
    write_metric(
        output,
        "presence_enrollments_rejected_total",
        "Enrollments rejected as duplicates or invalid",
        MetricType::Counter,
        summary.enrollments_rejected,
    );
    write_metric(
        output,
        "presence_mode_changes_total",
        "Accepted operating mode changes",
        MetricType::Counter,
        summary.mode_changes_total,
    );
    write_metric(
        output,
        "presence_storage_errors_total",
        "Requests that failed on ledger storage",
        MetricType::Counter,
        summary.storage_errors_total,
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ScanStatus;

    #[test]
    fn test_format_prometheus_metrics() {
        let metrics = Metrics::new();
        metrics.record_scan(ScanStatus::Checkin, 150);
        metrics.record_scan(ScanStatus::Warning, 250);
        metrics.record_enrollment(true);

        let output = format_prometheus_metrics(&metrics);

        assert!(output.contains("presence_scans_total 2"));
        assert!(output.contains("presence_scan_outcomes_total{status=\"checkin\"} 1"));
        assert!(output.contains("presence_scan_outcomes_total{status=\"unknown\"} 0"));
        assert!(output.contains("presence_scan_latency_us_bucket{le=\"+Inf\"} 2"));
        assert!(output.contains("presence_scan_latency_us_sum 400"));
        assert!(output.contains("presence_enrollments_total 1"));
    }
}
