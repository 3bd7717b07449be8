use domain::FieldValue;
use gms_normalize::{NormalizeError, Normalizer, alarm_to_json, parse_timestamp, telemetry_to_json};
use serde_json::json;

#[test]
fn telemetry_aliases_map_to_canonical_names() {
    let normalizer = Normalizer::default();
    let payload = br#"{
        "DeviceId": "esp32_04",
        "DeviceName": "Tank esp32_04",
        "Temperature": 42,
        "OilLevel": 0.75,
        "Humidity": null,
        "vibration": 3,
        "config": { "nested": true },
        "Timestamp": "2024-03-01T10:00:00Z"
    }"#;
    let event = normalizer
        .normalize_telemetry(payload, 5)
        .expect("normalize");

    assert_eq!(event.device_key(), Some("esp32_04"));
    assert_eq!(event.device_name.as_deref(), Some("Tank esp32_04"));
    assert_eq!(event.fields["temperature"], Some(FieldValue::I64(42)));
    assert_eq!(event.fields["oilLevel"], Some(FieldValue::F64(0.75)));
    assert_eq!(event.fields["humidity"], None);
    assert_eq!(event.fields["vibration"], Some(FieldValue::I64(3)));
    assert!(!event.fields.contains_key("config"));
    assert!(!event.fields.contains_key("DeviceName"));
    assert_eq!(event.ts_ms, Some(1_709_287_200_000));
    assert!(event.is_partial);
    assert_eq!(event.received_at_ms, 5);
}

#[test]
fn full_snapshot_flags_are_honoured() {
    let normalizer = Normalizer::default();
    let explicit = normalizer
        .normalize_telemetry_value(
            &json!({ "deviceId": "a", "temperature": 1, "isPartialUpdate": false }),
            0,
        )
        .expect("explicit");
    assert!(!explicit.is_partial);

    let snapshot = normalizer
        .normalize_telemetry_value(
            &json!({ "deviceId": "a", "temperature": 1, "fullSnapshot": true }),
            0,
        )
        .expect("snapshot");
    assert!(!snapshot.is_partial);

    let default = normalizer
        .normalize_telemetry_value(&json!({ "deviceId": "a", "temperature": 1 }), 0)
        .expect("default");
    assert!(default.is_partial);
}

#[test]
fn malformed_json_is_reported() {
    let normalizer = Normalizer::default();
    let err = normalizer.normalize_telemetry(b"{not json", 0).unwrap_err();
    assert!(matches!(err, NormalizeError::Malformed(_)));

    let err = normalizer.normalize_alarm(b"[1, 2]", 0).unwrap_err();
    assert!(matches!(err, NormalizeError::Malformed(_)));
}

#[test]
fn missing_device_is_invalid() {
    let normalizer = Normalizer::default();
    let err = normalizer
        .normalize_telemetry_value(&json!({ "temperature": 42 }), 0)
        .unwrap_err();
    assert!(matches!(err, NormalizeError::InvalidPayload(_)));

    let err = normalizer
        .normalize_alarm_value(&json!({ "alarmCode": "HT-01", "deviceId": " " }), 0)
        .unwrap_err();
    assert!(matches!(err, NormalizeError::InvalidPayload(_)));
}

#[test]
fn alarm_aliases_and_defaults() {
    let normalizer = Normalizer::default();
    let alarm = normalizer
        .normalize_alarm_value(
            &json!({
                "_id": "alarm-1",
                "DeviceName": "Tank esp32_04",
                "AlarmCode": "HT-01",
                "AlarmDescription": "High temperature",
                "AlarmValue": 51.5,
                "PlantId": 2
            }),
            1234,
        )
        .expect("alarm");

    assert_eq!(alarm.id.as_deref(), Some("alarm-1"));
    assert_eq!(alarm.device_key(), Some("Tank esp32_04"));
    assert_eq!(alarm.alarm_code.as_deref(), Some("HT-01"));
    assert_eq!(alarm.description.as_deref(), Some("High temperature"));
    assert_eq!(alarm.value, Some(FieldValue::F64(51.5)));
    assert_eq!(alarm.plant_id.as_deref(), Some("2"));
    assert_eq!(alarm.severity, None);
    assert_eq!(alarm.ts_ms, 1234);
}

#[test]
fn canonical_json_normalizes_back_to_the_same_event() {
    let normalizer = Normalizer::default();
    let event = normalizer
        .normalize_telemetry_value(
            &json!({ "device": "esp32_01", "Temperature": 21.5, "timestamp": 1000 }),
            0,
        )
        .expect("event");
    let canonical = telemetry_to_json(&event);
    assert_eq!(canonical["deviceId"], "esp32_01");
    assert_eq!(canonical["temperature"], 21.5);
    assert_eq!(canonical["isPartialUpdate"], true);

    let again = normalizer
        .normalize_telemetry_value(&canonical, 0)
        .expect("again");
    assert_eq!(again, event);

    let alarm = normalizer
        .normalize_alarm_value(
            &json!({ "deviceId": "esp32_01", "alarmCode": "LOW", "createdTimestamp": 99 }),
            0,
        )
        .expect("alarm");
    let canonical = alarm_to_json(&alarm);
    assert_eq!(canonical["timestamp"], 99);
    assert_eq!(
        normalizer.normalize_alarm_value(&canonical, 0).expect("again"),
        alarm
    );
}

#[test]
fn timestamps_accept_numbers_and_rfc3339() {
    assert_eq!(parse_timestamp(&json!(1_700_000_000_000_i64)), Some(1_700_000_000_000));
    assert_eq!(parse_timestamp(&json!("1700000000000")), Some(1_700_000_000_000));
    assert_eq!(
        parse_timestamp(&json!("2024-03-01T10:00:00.250+00:00")),
        Some(1_709_287_200_250)
    );
    assert_eq!(parse_timestamp(&json!("yesterday")), None);
    assert_eq!(parse_timestamp(&json!(0)), None);
}
