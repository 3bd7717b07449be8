use domain::{FieldValue, TelemetryEvent};
use gms_state::{DeviceStateStore, Payload, ReconcileError, Reconciler};
use std::collections::BTreeMap;
use std::sync::Arc;

fn payload(entries: &[(&str, Option<FieldValue>)]) -> Payload {
    entries
        .iter()
        .map(|(name, value)| (name.to_string(), value.clone()))
        .collect()
}

fn reconciler() -> Reconciler {
    Reconciler::new(Arc::new(DeviceStateStore::new()))
}

#[tokio::test]
async fn partial_merge_on_empty_state() {
    let reconciler = reconciler();
    let state = reconciler
        .merge(
            "esp32_04",
            &payload(&[("temperature", Some(FieldValue::I64(42)))]),
            true,
            Some(1000),
        )
        .expect("merge");

    assert_eq!(state.fields.len(), 1);
    assert_eq!(state.fields["temperature"], FieldValue::I64(42));
    assert_eq!(state.field_timestamps["temperature"], 1000);
    assert_eq!(state.last_updated_ms, 1000);
    assert!(state.is_partial);
    assert_eq!(reconciler.store().get("esp32_04"), Some(state));
}

#[tokio::test]
async fn partial_merge_keeps_untouched_fields() {
    let reconciler = reconciler();
    reconciler
        .merge(
            "esp32_04",
            &payload(&[("temperature", Some(FieldValue::I64(42)))]),
            true,
            Some(1000),
        )
        .expect("first merge");
    let state = reconciler
        .merge(
            "esp32_04",
            &payload(&[
                ("humidity", Some(FieldValue::I64(80))),
                ("oilLevel", None),
            ]),
            true,
            Some(2000),
        )
        .expect("second merge");

    assert_eq!(state.fields["temperature"], FieldValue::I64(42));
    assert_eq!(state.fields["humidity"], FieldValue::I64(80));
    assert!(!state.fields.contains_key("oilLevel"));
    assert_eq!(state.field_timestamps["temperature"], 1000);
    assert_eq!(state.field_timestamps["humidity"], 2000);
    assert_eq!(state.last_updated_ms, 2000);
}

#[tokio::test]
async fn full_replace_discards_previous_fields() {
    let reconciler = reconciler();
    reconciler
        .merge(
            "esp32_04",
            &payload(&[
                ("temperature", Some(FieldValue::I64(42))),
                ("oilLevel", Some(FieldValue::F64(0.7))),
            ]),
            true,
            Some(1000),
        )
        .expect("partial");
    reconciler
        .merge(
            "esp32_04",
            &payload(&[("humidity", Some(FieldValue::I64(80)))]),
            true,
            Some(2000),
        )
        .expect("partial");

    let state = reconciler
        .merge(
            "esp32_04",
            &payload(&[
                ("temperature", Some(FieldValue::I64(10))),
                ("humidity", Some(FieldValue::I64(20))),
            ]),
            false,
            Some(3000),
        )
        .expect("full");

    let expected: BTreeMap<String, FieldValue> = [
        ("humidity".to_string(), FieldValue::I64(20)),
        ("temperature".to_string(), FieldValue::I64(10)),
    ]
    .into_iter()
    .collect();
    assert_eq!(state.fields, expected);
    assert!(state.field_timestamps.values().all(|ts| *ts == 3000));
    assert_eq!(state.field_timestamps.len(), 2);
    assert_eq!(state.last_updated_ms, 3000);
    assert!(!state.is_partial);
}

#[tokio::test]
async fn repeated_full_replace_only_advances_timestamps() {
    let reconciler = reconciler();
    let body = payload(&[
        ("temperature", Some(FieldValue::I64(10))),
        ("humidity", Some(FieldValue::I64(20))),
    ]);
    let first = reconciler
        .merge("esp32_04", &body, false, Some(3000))
        .expect("first");
    let second = reconciler
        .merge("esp32_04", &body, false, Some(4000))
        .expect("second");

    assert_eq!(first.fields, second.fields);
    assert_eq!(first.is_partial, second.is_partial);
    assert_eq!(second.last_updated_ms, 4000);
    assert!(second.field_timestamps.values().all(|ts| *ts == 4000));
}

#[tokio::test]
async fn metadata_fields_never_reach_state() {
    let reconciler = reconciler();
    let state = reconciler
        .merge(
            "esp32_04",
            &payload(&[
                ("deviceId", Some(FieldValue::from("esp32_04"))),
                ("DeviceName", Some(FieldValue::from("Tank esp32_04"))),
                ("_rid", Some(FieldValue::from("abc"))),
                ("temperature", Some(FieldValue::I64(42))),
            ]),
            false,
            Some(1000),
        )
        .expect("merge");

    assert_eq!(state.fields.keys().collect::<Vec<_>>(), vec!["temperature"]);
    assert_eq!(state.field_timestamps.len(), 1);
}

#[tokio::test]
async fn invalid_input_leaves_store_untouched() {
    let reconciler = reconciler();
    let body = payload(&[("temperature", Some(FieldValue::I64(42)))]);

    let err = reconciler.merge("  ", &body, true, None).unwrap_err();
    assert!(matches!(err, ReconcileError::InvalidInput(_)));

    let err = reconciler
        .merge("esp32_04", &Payload::new(), true, None)
        .unwrap_err();
    assert!(matches!(err, ReconcileError::InvalidInput(_)));

    let err = reconciler
        .merge(
            "esp32_04",
            &payload(&[("deviceId", Some(FieldValue::from("esp32_04")))]),
            true,
            None,
        )
        .unwrap_err();
    assert!(matches!(err, ReconcileError::InvalidInput(_)));

    assert!(reconciler.store().is_empty());
}

#[tokio::test]
async fn all_null_payload_is_rejected() {
    let reconciler = reconciler();
    let body = payload(&[("temperature", None), ("humidity", None)]);

    for is_partial in [true, false] {
        let err = reconciler
            .merge("esp32_04", &body, is_partial, Some(1000))
            .unwrap_err();
        assert!(matches!(err, ReconcileError::InvalidInput(_)));
    }
    assert!(reconciler.store().get("esp32_04").is_none());
    assert!(reconciler.store().is_empty());
}

#[tokio::test]
async fn merge_event_falls_back_to_device_name() {
    let reconciler = reconciler();
    let event = TelemetryEvent {
        device_id: None,
        device_name: Some("esp32_07".to_string()),
        plant_id: None,
        plant_name: None,
        fields: payload(&[("humidity", Some(FieldValue::I64(55)))]),
        ts_ms: None,
        is_partial: true,
        received_at_ms: 0,
    };
    let state = reconciler.merge_event(&event).expect("merge");
    assert_eq!(state.device_id, "esp32_07");
    assert!(state.last_updated_ms > 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_partial_merges_lose_no_fields() {
    let reconciler = reconciler();
    let mut tasks = Vec::new();
    for index in 0..32 {
        let reconciler = reconciler.clone();
        tasks.push(tokio::spawn(async move {
            let body = payload(&[(
                format!("sensor_{index}").as_str(),
                Some(FieldValue::I64(index)),
            )]);
            reconciler
                .merge("esp32_04", &body, true, Some(1000 + index))
                .expect("merge");
        }));
    }
    for task in tasks {
        task.await.expect("join");
    }

    let state = reconciler.store().get("esp32_04").expect("state");
    assert_eq!(state.fields.len(), 32);
    assert_eq!(state.last_updated_ms, 1031);
    for index in 0..32 {
        assert_eq!(
            state.fields[&format!("sensor_{index}")],
            FieldValue::I64(index)
        );
    }
}
