//! 内存存储实现模块
//!
//! 仅用于本地演示和测试。

pub mod telemetry;

pub use telemetry::*;
