//! 存储层错误类型
//!
//! 写入失败一律以整批为粒度返回，采集循环据此决定重试。

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("sql error: {0}")]
    Sql(#[from] sqlx::Error),
    #[error("schema error: {0}")]
    Schema(String),
    #[error("write timed out after {0} ms")]
    Timeout(u64),
    #[error("injected failure: {0}")]
    Injected(String),
    #[error("lock failed")]
    Lock,
}
