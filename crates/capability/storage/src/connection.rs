//! 数据库连接管理

use crate::error::StorageError;
use sqlx::postgres::{PgConnection, PgPoolOptions};
use sqlx::{Connection, PgPool};
use tracing::info;

/// 建立 Postgres 连接池。
///
/// # 参数
/// - `database_url`：Postgres 连接字符串
/// - `max_connections`：连接池上限（至少为 1）
pub async fn connect_pool(database_url: &str, max_connections: u32) -> Result<PgPool, StorageError> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections.max(1))
        .connect(database_url)
        .await?;
    Ok(pool)
}

/// 目标库不存在时通过维护库（通常是 `postgres`）创建，返回是否新建。
pub async fn ensure_database(maintenance_url: &str, database: &str) -> Result<bool, StorageError> {
    let mut conn = PgConnection::connect(maintenance_url).await?;
    let exists: bool = sqlx::query_scalar("select exists(select 1 from pg_database where datname = $1)")
        .bind(database)
        .fetch_one(&mut conn)
        .await?;
    if !exists {
        // create database 不接受参数绑定，只能拼接加引号的标识符
        sqlx::query(&format!("create database {}", quote_ident(database)))
            .execute(&mut conn)
            .await?;
        info!(target: "ome.storage", database, "database_created");
    }
    conn.close().await?;
    Ok(!exists)
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
