use gms_telemetry::{TelemetryMetrics, new_request_ids};

#[test]
fn request_ids_non_empty() {
    let ids = new_request_ids();
    assert!(!ids.request_id.is_empty());
    assert!(!ids.trace_id.is_empty());
    assert_ne!(ids.request_id, ids.trace_id);
}

#[test]
fn fresh_metrics_start_at_zero() {
    let snapshot = TelemetryMetrics::new().snapshot();
    assert_eq!(snapshot.merges, 0);
    assert_eq!(snapshot.pushes_dropped, 0);
}

#[test]
fn recorded_pushes_accumulate() {
    let before = gms_telemetry::metrics().snapshot();
    gms_telemetry::record_pushes(3, 1);
    let after = gms_telemetry::metrics().snapshot();
    assert!(after.pushes_delivered >= before.pushes_delivered + 3);
    assert!(after.pushes_dropped >= before.pushes_dropped + 1);
}
