use domain::{AlarmEvent, RoomId, TelemetryEvent};
use gms_realtime::{MarkerSitePolicy, ResolvedSite, SiteDirectory, SitePolicy, SubscriptionRouter};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

fn alarm(device_id: &str) -> AlarmEvent {
    AlarmEvent {
        id: None,
        device_id: Some(device_id.to_string()),
        device_name: None,
        alarm_code: Some("HT-01".to_string()),
        description: None,
        value: None,
        severity: None,
        status: None,
        ts_ms: 1000,
        plant_id: None,
        plant_name: None,
    }
}

fn telemetry(device_id: &str) -> TelemetryEvent {
    TelemetryEvent {
        device_id: Some(device_id.to_string()),
        device_name: None,
        plant_id: None,
        plant_name: None,
        fields: BTreeMap::new(),
        ts_ms: None,
        is_partial: true,
        received_at_ms: 0,
    }
}

fn rooms(items: &[RoomId]) -> BTreeSet<RoomId> {
    items.iter().cloned().collect()
}

#[test]
fn alarm_without_plant_uses_marker_policy() {
    let router = SubscriptionRouter::default();
    let mut event = alarm("esp32_04");
    event.device_name = Some("Tank esp32_04".to_string());

    let route = router.route_alarm(&event);
    assert_eq!(route.site, Some(ResolvedSite::new("2", "Plant D")));
    assert_eq!(
        route.rooms,
        rooms(&[RoomId::device("esp32_04"), RoomId::site("2"), RoomId::All])
    );
}

#[test]
fn alarm_with_plant_name_goes_to_that_site_and_global() {
    let router = SubscriptionRouter::default();
    let mut event = alarm("esp32_01");
    event.plant_name = Some("Plant D".to_string());

    let route = router.route_alarm(&event);
    assert!(route.rooms.contains(&RoomId::site("2")));
    assert!(route.rooms.contains(&RoomId::All));
    assert!(!route.rooms.contains(&RoomId::site("1")));
}

#[test]
fn telemetry_routes_to_device_and_default_site() {
    let router = SubscriptionRouter::default();
    let route = router.route_telemetry(&telemetry("esp32_01"));
    assert_eq!(
        route.rooms,
        rooms(&[RoomId::device("esp32_01"), RoomId::site("1")])
    );
    assert!(!route.rooms.contains(&RoomId::All));
}

#[test]
fn explicit_plant_id_wins_over_policy() {
    let router = SubscriptionRouter::default();
    let mut event = telemetry("esp32_04");
    event.plant_id = Some("7".to_string());
    event.plant_name = Some("Plant X".to_string());

    let route = router.route_telemetry(&event);
    assert_eq!(route.site, Some(ResolvedSite::new("7", "Plant X")));
    assert!(route.rooms.contains(&RoomId::site("7")));
}

#[test]
fn unknown_plant_name_becomes_its_own_site() {
    let directory = SiteDirectory::default();
    assert_eq!(directory.resolve("1"), ResolvedSite::new("1", "Plant C"));
    assert_eq!(directory.resolve("Plant D"), ResolvedSite::new("2", "Plant D"));
    assert_eq!(directory.resolve("North"), ResolvedSite::new("North", "North"));
}

struct NoSite;

impl SitePolicy for NoSite {
    fn site_for_device(
        &self,
        _device_id: Option<&str>,
        _device_name: Option<&str>,
    ) -> Option<String> {
        None
    }
}

#[test]
fn policy_is_replaceable() {
    let router = SubscriptionRouter::new(SiteDirectory::default(), Arc::new(NoSite));
    let route = router.route_telemetry(&telemetry("esp32_04"));
    assert_eq!(route.site, None);
    assert_eq!(route.rooms, rooms(&[RoomId::device("esp32_04")]));

    let policy = MarkerSitePolicy::new(vec![("boiler".to_string(), "Plant C".to_string())], None);
    assert_eq!(
        policy.site_for_device(None, Some("boiler-2")),
        Some("Plant C".to_string())
    );
    assert_eq!(policy.site_for_device(Some("esp32_04"), None), None);
}
