//! 合并后分发
//!
//! 遥测：合并 → 路由 → 推送 `telemetry`。合并失败不会进入推送。
//! 告警：不合并，直接推送 `alarm`；延迟后向全体连接推送一次 `alarm_notification`。

use crate::catchup::DeviceIndex;
use crate::gateway::{DeliveryReport, GatewayError, PushMessage, PushSink};
use crate::router::SubscriptionRouter;
use domain::{AlarmEvent, AlarmNotification, PushEvent, TelemetryEvent, TelemetryUpdate};
use gms_state::{ReconcileError, Reconciler};
use gms_telemetry::{record_alarm, record_notification};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// 分发错误。
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error(transparent)]
    Reconcile(#[from] ReconcileError),
    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

/// 告警分发结果；`notification` 在延迟结束并推送后完成。
pub struct AlarmDispatch {
    pub report: DeliveryReport,
    pub notification: JoinHandle<DeliveryReport>,
}

/// 事件分发器。
#[derive(Clone)]
pub struct Dispatcher {
    reconciler: Reconciler,
    router: Arc<SubscriptionRouter>,
    sink: Arc<dyn PushSink>,
    index: Arc<DeviceIndex>,
    notification_delay: Duration,
}

impl Dispatcher {
    pub fn new(
        reconciler: Reconciler,
        router: Arc<SubscriptionRouter>,
        sink: Arc<dyn PushSink>,
        index: Arc<DeviceIndex>,
        notification_delay: Duration,
    ) -> Self {
        Self {
            reconciler,
            router,
            sink,
            index,
            notification_delay,
        }
    }

    /// 合并一条遥测并推送到设备房间与站点房间。
    pub async fn handle_telemetry(
        &self,
        event: &TelemetryEvent,
    ) -> Result<DeliveryReport, DispatchError> {
        let state = self.reconciler.merge_event(event)?;
        let route = self.router.route_telemetry(event);
        self.index.record(
            &state.device_id,
            event.device_name.as_deref(),
            route.site.as_ref(),
        );

        let update = TelemetryUpdate {
            state,
            device_name: event.device_name.clone(),
            plant_id: route.site.as_ref().map(|site| site.id.clone()),
            plant_name: route.site.as_ref().map(|site| site.name.clone()),
        };
        let message = PushMessage::new(PushEvent::Telemetry, &update)?;
        let report = self.sink.emit_to_rooms(&route.rooms, message).await;
        debug!(
            target: "gms.realtime",
            device_id = %update.state.device_id,
            rooms = route.rooms.len(),
            delivered = report.delivered,
            dropped = report.dropped,
            "telemetry_dispatched"
        );
        Ok(report)
    }

    /// 推送告警，并安排延迟的全局通知。
    pub async fn handle_alarm(&self, mut alarm: AlarmEvent) -> Result<AlarmDispatch, DispatchError> {
        let route = self.router.route_alarm(&alarm);
        if let Some(site) = &route.site {
            alarm.plant_id.get_or_insert_with(|| site.id.clone());
            alarm.plant_name.get_or_insert_with(|| site.name.clone());
        }
        record_alarm();

        let message = PushMessage::new(PushEvent::Alarm, &alarm)?;
        let report = self.sink.emit_to_rooms(&route.rooms, message).await;
        info!(
            target: "gms.realtime",
            device = %alarm.device_key().unwrap_or_default(),
            alarm_code = %alarm.alarm_code.as_deref().unwrap_or_default(),
            delivered = report.delivered,
            dropped = report.dropped,
            "alarm_dispatched"
        );

        let notification = AlarmNotification::from_alarm(&alarm);
        let message = PushMessage::new(PushEvent::AlarmNotification, &notification)?;
        let sink = Arc::clone(&self.sink);
        let delay = self.notification_delay;
        let notification = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let report = sink.emit_to_all(message).await;
            record_notification();
            if report.dropped > 0 {
                warn!(
                    target: "gms.realtime",
                    delivered = report.delivered,
                    dropped = report.dropped,
                    "alarm_notification_partially_dropped"
                );
            }
            report
        });

        Ok(AlarmDispatch {
            report,
            notification,
        })
    }
}
