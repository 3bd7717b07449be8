//! Postgres 遥测回读实现

use crate::error::StorageError;
use crate::models::TelemetryRecord;
use crate::traits::TelemetryLookup;
use domain::FieldValue;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use std::collections::BTreeMap;

pub struct PgTelemetryLookup {
    pub pool: PgPool,
}

impl PgTelemetryLookup {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self, StorageError> {
        let pool = crate::connection::connect_pool(database_url).await?;
        Ok(Self { pool })
    }

    pub fn connect_lazy(database_url: &str) -> Result<Self, StorageError> {
        let pool = crate::connection::connect_lazy_pool(database_url)?;
        Ok(Self { pool })
    }
}

fn record_from_row(row: &PgRow) -> Result<TelemetryRecord, StorageError> {
    let mut fields = BTreeMap::new();
    for (column, name) in [
        ("temperature", "temperature"),
        ("humidity", "humidity"),
        ("oil_level", "oilLevel"),
    ] {
        if let Some(value) = row.try_get::<Option<f64>, _>(column)? {
            fields.insert(name.to_string(), FieldValue::F64(value));
        }
    }
    if let Some(value) = row.try_get::<Option<i64>, _>("open_alerts")? {
        fields.insert("openAlerts".to_string(), FieldValue::I64(value));
    }
    Ok(TelemetryRecord {
        device_id: row.try_get("device_id")?,
        device_name: row.try_get("device_name")?,
        plant_name: row.try_get("plant_name")?,
        fields,
        ts_ms: row.try_get("ts_ms")?,
    })
}

#[async_trait::async_trait]
impl TelemetryLookup for PgTelemetryLookup {
    async fn find_latest_telemetry(
        &self,
        device: &str,
    ) -> Result<Option<TelemetryRecord>, StorageError> {
        let row = sqlx::query(
            "select device_id, device_name, plant_name, temperature, humidity, oil_level, \
             open_alerts, ts_ms from telemetry \
             where device_id = $1 or device_name = $1 \
             order by ts_ms desc limit 1",
        )
        .bind(device)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(record_from_row).transpose()
    }

    async fn list_devices_for_site(&self, site_name: &str) -> Result<Vec<String>, StorageError> {
        let rows = sqlx::query(
            "select distinct device_name from telemetry \
             where plant_name = $1 and device_name is not null \
             order by device_name",
        )
        .bind(site_name)
        .fetch_all(&self.pool)
        .await?;
        let mut names = Vec::with_capacity(rows.len());
        for row in rows {
            names.push(row.try_get::<String, _>("device_name")?);
        }
        Ok(names)
    }
}
