use domain::FieldValue;
use gms_storage::{
    InMemoryTelemetryLookup, NoopTelemetryLookup, TelemetryLookup, TelemetryRecord,
};
use std::collections::BTreeMap;

fn record(device_id: Option<&str>, device_name: &str, plant: &str, ts_ms: i64) -> TelemetryRecord {
    let mut fields = BTreeMap::new();
    fields.insert("temperature".to_string(), FieldValue::F64(ts_ms as f64 / 100.0));
    TelemetryRecord {
        device_id: device_id.map(str::to_string),
        device_name: Some(device_name.to_string()),
        plant_name: Some(plant.to_string()),
        fields,
        ts_ms,
    }
}

#[tokio::test]
async fn latest_record_by_id_or_name() {
    let lookup = InMemoryTelemetryLookup::with_records(vec![
        record(Some("dev-1"), "esp32_01", "Plant C", 1000),
        record(Some("dev-1"), "esp32_01", "Plant C", 3000),
        record(None, "esp32_01", "Plant C", 2000),
    ]);

    let latest = lookup
        .find_latest_telemetry("dev-1")
        .await
        .expect("lookup")
        .expect("record");
    assert_eq!(latest.ts_ms, 3000);

    let by_name = lookup
        .find_latest_telemetry("esp32_01")
        .await
        .expect("lookup")
        .expect("record");
    assert_eq!(by_name.ts_ms, 3000);

    assert!(
        lookup
            .find_latest_telemetry("missing")
            .await
            .expect("lookup")
            .is_none()
    );
}

#[tokio::test]
async fn devices_for_site_are_distinct() {
    let lookup = InMemoryTelemetryLookup::new();
    lookup
        .insert(record(None, "esp32_04", "Plant D", 1000))
        .expect("insert");
    lookup
        .insert(record(None, "esp32_04", "Plant D", 2000))
        .expect("insert");
    lookup
        .insert(record(None, "esp32_05", "Plant D", 1000))
        .expect("insert");
    lookup
        .insert(record(None, "esp32_01", "Plant C", 1000))
        .expect("insert");
    assert_eq!(lookup.len(), 4);

    let devices = lookup
        .list_devices_for_site("Plant D")
        .await
        .expect("list");
    assert_eq!(devices, vec!["esp32_04".to_string(), "esp32_05".to_string()]);
    assert!(
        lookup
            .list_devices_for_site("Plant X")
            .await
            .expect("list")
            .is_empty()
    );
}

#[tokio::test]
async fn noop_lookup_never_finds_anything() {
    let lookup = NoopTelemetryLookup;
    assert!(lookup.find_latest_telemetry("esp32_04").await.expect("lookup").is_none());
    assert!(lookup.list_devices_for_site("Plant D").await.expect("list").is_empty());
}
