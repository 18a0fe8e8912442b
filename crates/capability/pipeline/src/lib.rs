//! # 采集流水线
//!
//! 单个执行上下文驱动 拉取 → 批处理 → 写入 → 提交 的循环：
//!
//! - [`consumer`]：`ConsumerLoop` 状态机，独占持有消息源、规范化路由与设备注册表
//! - [`batch`]：批次与各分区最高 offset 记录
//! - [`registry`]：设备注册表（非破坏式合并）
//! - [`retry`]：指数退避重试策略
//! - [`config`]：批次阈值、超时与重试耗尽策略

pub mod batch;
pub mod config;
pub mod consumer;
pub mod registry;
pub mod retry;

pub use batch::{Batch, OffsetTracker};
pub use config::PipelineConfig;
pub use consumer::{ConsumerLoop, LoopReport, LoopState};
pub use registry::DeviceRegistry;
pub use retry::RetryPolicy;

use ome_ingest::IngestError;
use ome_storage::StorageError;

/// Pipeline 处理错误。
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("ingest error: {0}")]
    Ingest(#[from] IngestError),
    #[error("sink exhausted after {attempts} attempts: {error}")]
    SinkExhausted { attempts: u32, error: StorageError },
    #[error("commit error: {0}")]
    Commit(String),
}
