//! # PostgreSQL 存储实现模块
//!
//! 依赖历史遥测表 `telemetry`：
//!
//! | 列 | 类型 |
//! |----|------|
//! | device_id | text null |
//! | device_name | text null |
//! | plant_name | text null |
//! | temperature / humidity / oil_level | double precision null |
//! | open_alerts | bigint null |
//! | ts_ms | bigint |
//!
//! 建议索引：`(device_id, ts_ms desc)`、`(device_name, ts_ms desc)`、`(plant_name)`。
//! 所有查询使用参数绑定。

pub mod telemetry;

pub use telemetry::*;
