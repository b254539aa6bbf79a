//! Shared metrics recording for the storage backends.

use std::time::Instant;

/// Records a counter and a latency histogram for one backend operation.
///
/// Emits `store_operations_total` and `store_operation_duration_ms`, labeled
/// by backend, operation, and status (`"success"` or `"error"`).
pub(crate) fn record_operation_metrics(
    backend: &'static str,
    operation: &'static str,
    start: Instant,
    status: &'static str,
) {
    metrics::counter!(
        "store_operations_total",
        "backend" => backend,
        "operation" => operation,
        "status" => status
    )
    .increment(1);
    metrics::histogram!(
        "store_operation_duration_ms",
        "backend" => backend,
        "operation" => operation,
        "status" => status
    )
    .record(start.elapsed().as_secs_f64() * 1000.0);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_operation_metrics_statuses() {
        // No recorder is installed in tests; recording must still be a no-op
        // rather than a panic.
        let start = Instant::now();
        record_operation_metrics("file", "export", start, "success");
        record_operation_metrics("sqlite", "load", start, "error");
    }
}
