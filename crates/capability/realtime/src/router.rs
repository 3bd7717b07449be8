//! 订阅路由
//!
//! 纯计算：根据事件字段得出投递房间集合，不持有连接状态。
//!
//! 站点解析顺序：
//! 1. 事件自带 plantId
//! 2. 事件自带 plantName（经站点目录换算为 id）
//! 3. `SitePolicy` 兜底（默认按设备名标记匹配，属于近似规则）

use domain::{AlarmEvent, RoomId, TelemetryEvent};
use std::collections::BTreeSet;
use std::sync::Arc;

/// 站点 id ↔ 站点名。
#[derive(Debug, Clone)]
pub struct SiteDirectory {
    sites: Vec<(String, String)>,
}

impl SiteDirectory {
    pub fn new(sites: Vec<(String, String)>) -> Self {
        Self { sites }
    }

    pub fn name_for(&self, site_id: &str) -> Option<&str> {
        self.sites
            .iter()
            .find(|(id, _)| id == site_id)
            .map(|(_, name)| name.as_str())
    }

    pub fn id_for(&self, site_name: &str) -> Option<&str> {
        self.sites
            .iter()
            .find(|(_, name)| name == site_name)
            .map(|(id, _)| id.as_str())
    }

    /// id 或站点名 → 站点；未登记的值同时作为 id 与名称。
    pub fn resolve(&self, id_or_name: &str) -> ResolvedSite {
        let value = id_or_name.trim();
        if let Some(name) = self.name_for(value) {
            return ResolvedSite::new(value, name);
        }
        if let Some(id) = self.id_for(value) {
            return ResolvedSite::new(id, value);
        }
        ResolvedSite::new(value, value)
    }

    pub fn sites(&self) -> &[(String, String)] {
        &self.sites
    }
}

impl Default for SiteDirectory {
    fn default() -> Self {
        Self::new(vec![
            ("1".to_string(), "Plant C".to_string()),
            ("2".to_string(), "Plant D".to_string()),
        ])
    }
}

/// 解析后的站点。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSite {
    pub id: String,
    pub name: String,
}

impl ResolvedSite {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }

    pub fn room(&self) -> RoomId {
        RoomId::site(self.id.clone())
    }
}

/// 事件未携带站点信息时的兜底规则，返回站点名。
pub trait SitePolicy: Send + Sync {
    fn site_for_device(
        &self,
        device_id: Option<&str>,
        device_name: Option<&str>,
    ) -> Option<String>;
}

/// 设备 id/名称包含标记子串即归属对应站点，否则落到默认站点。
#[derive(Debug, Clone)]
pub struct MarkerSitePolicy {
    markers: Vec<(String, String)>,
    default_site: Option<String>,
}

impl MarkerSitePolicy {
    pub fn new(markers: Vec<(String, String)>, default_site: Option<String>) -> Self {
        Self {
            markers,
            default_site,
        }
    }
}

impl Default for MarkerSitePolicy {
    fn default() -> Self {
        Self::new(
            vec![("esp32_04".to_string(), "Plant D".to_string())],
            Some("Plant C".to_string()),
        )
    }
}

impl SitePolicy for MarkerSitePolicy {
    fn site_for_device(
        &self,
        device_id: Option<&str>,
        device_name: Option<&str>,
    ) -> Option<String> {
        let matches = |marker: &str| {
            [device_name, device_id]
                .into_iter()
                .flatten()
                .any(|value| value.contains(marker))
        };
        self.markers
            .iter()
            .find(|(marker, _)| matches(marker))
            .map(|(_, site)| site.clone())
            .or_else(|| self.default_site.clone())
    }
}

/// 一次路由结果。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub rooms: BTreeSet<RoomId>,
    pub site: Option<ResolvedSite>,
}

/// 订阅路由器。
#[derive(Clone)]
pub struct SubscriptionRouter {
    directory: SiteDirectory,
    policy: Arc<dyn SitePolicy>,
}

impl SubscriptionRouter {
    pub fn new(directory: SiteDirectory, policy: Arc<dyn SitePolicy>) -> Self {
        Self { directory, policy }
    }

    pub fn directory(&self) -> &SiteDirectory {
        &self.directory
    }

    /// 设备房间 + 站点房间。
    pub fn route_telemetry(&self, event: &TelemetryEvent) -> Route {
        self.route(
            event.device_key(),
            event.device_id.as_deref(),
            event.device_name.as_deref(),
            event.plant_id.as_deref(),
            event.plant_name.as_deref(),
            false,
        )
    }

    /// 设备房间 + 站点房间 + 全体连接。
    pub fn route_alarm(&self, alarm: &AlarmEvent) -> Route {
        self.route(
            alarm.device_key(),
            alarm.device_id.as_deref(),
            alarm.device_name.as_deref(),
            alarm.plant_id.as_deref(),
            alarm.plant_name.as_deref(),
            true,
        )
    }

    pub fn resolve_site(
        &self,
        device_id: Option<&str>,
        device_name: Option<&str>,
        plant_id: Option<&str>,
        plant_name: Option<&str>,
    ) -> Option<ResolvedSite> {
        if let Some(plant_id) = non_empty(plant_id) {
            let name = self
                .directory
                .name_for(plant_id)
                .map(str::to_string)
                .or_else(|| non_empty(plant_name).map(str::to_string))
                .unwrap_or_else(|| plant_id.to_string());
            return Some(ResolvedSite::new(plant_id, name));
        }
        if let Some(plant_name) = non_empty(plant_name) {
            return Some(self.directory.resolve(plant_name));
        }
        self.policy
            .site_for_device(device_id, device_name)
            .map(|site| self.directory.resolve(&site))
    }

    fn route(
        &self,
        device_key: Option<&str>,
        device_id: Option<&str>,
        device_name: Option<&str>,
        plant_id: Option<&str>,
        plant_name: Option<&str>,
        broadcast: bool,
    ) -> Route {
        let mut rooms = BTreeSet::new();
        if let Some(key) = device_key {
            rooms.insert(RoomId::device(key));
        }
        let site = self.resolve_site(device_id, device_name, plant_id, plant_name);
        if let Some(site) = &site {
            rooms.insert(site.room());
        }
        if broadcast {
            rooms.insert(RoomId::All);
        }
        Route { rooms, site }
    }
}

impl Default for SubscriptionRouter {
    fn default() -> Self {
        Self::new(SiteDirectory::default(), Arc::new(MarkerSitePolicy::default()))
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}
