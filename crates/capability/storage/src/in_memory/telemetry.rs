//! 遥测回读内存实现

use crate::error::StorageError;
use crate::models::TelemetryRecord;
use crate::traits::TelemetryLookup;
use std::collections::BTreeSet;
use std::sync::RwLock;

/// 遥测回读内存存储
pub struct InMemoryTelemetryLookup {
    records: RwLock<Vec<TelemetryRecord>>,
}

impl InMemoryTelemetryLookup {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(Vec::new()),
        }
    }

    pub fn with_records(records: Vec<TelemetryRecord>) -> Self {
        Self {
            records: RwLock::new(records),
        }
    }

    /// 追加一条历史记录。
    pub fn insert(&self, record: TelemetryRecord) -> Result<(), StorageError> {
        let mut records = self
            .records
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        records.push(record);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.records.read().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryTelemetryLookup {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl TelemetryLookup for InMemoryTelemetryLookup {
    async fn find_latest_telemetry(
        &self,
        device: &str,
    ) -> Result<Option<TelemetryRecord>, StorageError> {
        let records = self
            .records
            .read()
            .map_err(|_| StorageError::new("lock failed"))?;
        Ok(records
            .iter()
            .filter(|record| record.matches(device))
            .max_by_key(|record| record.ts_ms)
            .cloned())
    }

    async fn list_devices_for_site(&self, site_name: &str) -> Result<Vec<String>, StorageError> {
        let records = self
            .records
            .read()
            .map_err(|_| StorageError::new("lock failed"))?;
        let names: BTreeSet<String> = records
            .iter()
            .filter(|record| record.plant_name.as_deref() == Some(site_name))
            .filter_map(|record| record.device_name.clone())
            .collect();
        Ok(names.into_iter().collect())
    }
}
