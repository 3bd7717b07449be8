//! 存储接口 Trait 定义

use crate::error::StorageError;
use crate::models::TelemetryRecord;
use async_trait::async_trait;

/// 补发回读接口。
#[async_trait]
pub trait TelemetryLookup: Send + Sync {
    /// 按设备 id 或设备名查找最近一条遥测。
    async fn find_latest_telemetry(
        &self,
        device: &str,
    ) -> Result<Option<TelemetryRecord>, StorageError>;

    /// 列出站点下的设备名（去重）。
    async fn list_devices_for_site(&self, site_name: &str) -> Result<Vec<String>, StorageError>;
}

/// 未配置持久层时使用：永远没有结果。
#[derive(Debug, Default)]
pub struct NoopTelemetryLookup;

#[async_trait]
impl TelemetryLookup for NoopTelemetryLookup {
    async fn find_latest_telemetry(
        &self,
        _device: &str,
    ) -> Result<Option<TelemetryRecord>, StorageError> {
        Ok(None)
    }

    async fn list_devices_for_site(&self, _site_name: &str) -> Result<Vec<String>, StorageError> {
        Ok(Vec::new())
    }
}
