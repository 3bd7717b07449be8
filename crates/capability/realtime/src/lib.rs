//! 设备状态实时分发：路由、连接网关、订阅补发与事件分发。

pub mod catchup;
pub mod dispatch;
pub mod engine;
pub mod gateway;
pub mod router;

pub use catchup::{CatchUp, DeviceIndex, DeviceInfo};
pub use dispatch::{AlarmDispatch, DispatchError, Dispatcher};
pub use engine::{EngineConfig, RealtimeEngine, Subscribed};
pub use gateway::{
    ConnectionId, DeliveryReport, GatewayError, PushMessage, PushSink, RealtimeGateway,
};
pub use router::{
    MarkerSitePolicy, ResolvedSite, Route, SiteDirectory, SitePolicy, SubscriptionRouter,
};
