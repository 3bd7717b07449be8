//! 数据库连接管理

use crate::error::StorageError;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use std::time::Duration;

/// 建立 Postgres 连接池。
///
/// 只承担补发回读，连接数保持较小；获取连接超时与补发超时同量级。
pub async fn connect_pool(database_url: &str) -> Result<PgPool, StorageError> {
    let pool = PgPoolOptions::new()
        .max_connections(4)
        .acquire_timeout(Duration::from_secs(2))
        .connect(database_url)
        .await?;
    Ok(pool)
}

/// 建立惰性连接池：只校验 URL，首次查询时才连接。
///
/// 启动时数据库不可达不会阻止进程启动，补发回读在查询时失败并降级。
pub fn connect_lazy_pool(database_url: &str) -> Result<PgPool, StorageError> {
    let pool = PgPoolOptions::new()
        .max_connections(4)
        .acquire_timeout(Duration::from_secs(2))
        .connect_lazy(database_url)?;
    Ok(pool)
}
