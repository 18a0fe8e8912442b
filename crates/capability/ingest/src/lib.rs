//! 消息接入：broker 边界抽象与实现。
//!
//! - [`MessageSource`]：拉取 / 提交 / 关闭，由采集循环独占持有
//! - [`MemorySource`]：内存队列实现（测试与本地联调）
//! - `KafkaSource`：基于 rdkafka 的消费组实现（feature `kafka`）

use async_trait::async_trait;
use domain::{PartitionOffset, RawMessage, TopicPartition};
use std::time::Duration;

#[cfg(feature = "kafka")]
pub mod kafka;
pub mod memory;

#[cfg(feature = "kafka")]
pub use kafka::{KafkaSource, KafkaSourceConfig};
pub use memory::MemorySource;

/// 接入错误。
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("broker error: {0}")]
    Broker(String),
    #[error("commit error: {0}")]
    Commit(String),
    #[error("source closed")]
    Closed,
}

/// broker 消息源。
///
/// 调用方独占持有实例（`&mut self`），拉取与提交不会并发发生。
#[async_trait]
pub trait MessageSource: Send {
    /// 在 `timeout` 内等待下一批消息，最多返回 `max_messages` 条；超时返回空批。
    async fn poll(
        &mut self,
        max_messages: usize,
        timeout: Duration,
    ) -> Result<Vec<RawMessage>, IngestError>;

    /// 提交各分区已处理的最高 offset（含该 offset 本身）。
    async fn commit(&mut self, offsets: &[PartitionOffset]) -> Result<(), IngestError>;

    /// 释放订阅。
    async fn close(&mut self) -> Result<(), IngestError>;

    /// 取出自上次调用以来被撤销的分区。
    ///
    /// 这些分区已转给其他消费者，调用方不得再提交它们的 offset。
    fn take_revoked(&mut self) -> Vec<TopicPartition> {
        Vec::new()
    }
}
