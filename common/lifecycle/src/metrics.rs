pub(crate) const METRIC_SHUTDOWN_TRIGGERED: &str = "lifecycle_shutdown_triggered_total";
pub(crate) const METRIC_SHUTDOWN_SUPPRESSED: &str = "lifecycle_shutdown_suppressed_total";

pub(crate) fn emit_shutdown_triggered(service_name: &str, reason: &str) {
    metrics::counter!(
        METRIC_SHUTDOWN_TRIGGERED,
        "service_name" => service_name.to_string(),
        "reason" => reason.to_string()
    )
    .increment(1);
}

pub(crate) fn emit_shutdown_suppressed(service_name: &str) {
    metrics::counter!(
        METRIC_SHUTDOWN_SUPPRESSED,
        "service_name" => service_name.to_string()
    )
    .increment(1);
}
