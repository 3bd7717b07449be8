//! 设备状态能力：TTL 缓存与部分更新合并。

pub mod reconcile;
pub mod store;

pub use reconcile::{Payload, ReconcileError, Reconciler, is_metadata_field};
pub use store::{DeviceStateStore, StateStoreConfig};
