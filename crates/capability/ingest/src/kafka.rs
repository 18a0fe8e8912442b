//! Kafka 消息源
//!
//! 关闭自动提交（`enable.auto.commit=false`），offset 只在批次写入成功后
//! 由采集循环显式提交。

use crate::{IngestError, MessageSource};
use async_trait::async_trait;
use domain::{PartitionOffset, RawMessage, TopicPartition};
use rdkafka::config::{ClientConfig, RDKafkaLogLevel};
use rdkafka::consumer::{BaseConsumer, CommitMode, Consumer, ConsumerContext, Rebalance, StreamConsumer};
use rdkafka::error::KafkaError;
use rdkafka::message::{BorrowedMessage, Message};
use rdkafka::{ClientContext, Offset, TopicPartitionList};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// 首条消息到达后，继续抽取已就绪消息的等待上限。
const DRAIN_TIMEOUT: Duration = Duration::from_millis(1);

/// Kafka 消息源配置。
#[derive(Debug, Clone)]
pub struct KafkaSourceConfig {
    pub bootstrap_servers: String,
    pub group_id: String,
    pub auto_offset_reset: String,
    pub session_timeout_ms: u64,
    pub topics: Vec<String>,
}

/// 记录 librdkafka 日志与分区再均衡，并收集被撤销的分区。
#[derive(Default)]
struct IngestContext {
    revoked: Arc<Mutex<Vec<TopicPartition>>>,
}

impl ClientContext for IngestContext {
    fn log(&self, level: RDKafkaLogLevel, fac: &str, log_message: &str) {
        match level {
            RDKafkaLogLevel::Emerg
            | RDKafkaLogLevel::Alert
            | RDKafkaLogLevel::Critical
            | RDKafkaLogLevel::Error => {
                error!(target: "ome.ingest", facility = fac, "{log_message}")
            }
            RDKafkaLogLevel::Warning => warn!(target: "ome.ingest", facility = fac, "{log_message}"),
            RDKafkaLogLevel::Notice | RDKafkaLogLevel::Info => {
                info!(target: "ome.ingest", facility = fac, "{log_message}")
            }
            RDKafkaLogLevel::Debug => debug!(target: "ome.ingest", facility = fac, "{log_message}"),
        }
    }

    fn error(&self, error: KafkaError, reason: &str) {
        warn!(target: "ome.ingest", error = %error, reason, "kafka_client_error");
    }
}

impl ConsumerContext for IngestContext {
    fn pre_rebalance(&self, _base_consumer: &BaseConsumer<Self>, rebalance: &Rebalance<'_>) {
        // 撤销先于分区转移生效，此后本实例不得再提交这些分区。
        if let Rebalance::Revoke(partitions) = rebalance {
            let elements = partitions.elements();
            let revoked = elements.iter().map(|element| TopicPartition {
                topic: element.topic().to_string(),
                partition: element.partition(),
            });
            match self.revoked.lock() {
                Ok(mut pending) => pending.extend(revoked),
                Err(_) => warn!(target: "ome.ingest", "revoked_partitions_lock_failed"),
            }
        }
    }

    fn post_rebalance(&self, _base_consumer: &BaseConsumer<Self>, rebalance: &Rebalance<'_>) {
        // 再均衡后未提交的批次可能被重新投递，由幂等写入吸收。
        match rebalance {
            Rebalance::Assign(partitions) => {
                info!(target: "ome.ingest", partitions = partitions.count(), "partitions_assigned")
            }
            Rebalance::Revoke(partitions) => {
                info!(target: "ome.ingest", partitions = partitions.count(), "partitions_revoked")
            }
            Rebalance::Error(err) => warn!(target: "ome.ingest", error = %err, "rebalance_error"),
        }
    }
}

/// Kafka 消费组消息源。
pub struct KafkaSource {
    consumer: StreamConsumer<IngestContext>,
    revoked: Arc<Mutex<Vec<TopicPartition>>>,
    closed: bool,
}

impl KafkaSource {
    /// 创建消费者并订阅配置中的 topic。
    pub fn connect(config: &KafkaSourceConfig) -> Result<Self, IngestError> {
        let context = IngestContext::default();
        let revoked = context.revoked.clone();
        let consumer: StreamConsumer<IngestContext> = ClientConfig::new()
            .set("bootstrap.servers", &config.bootstrap_servers)
            .set("group.id", &config.group_id)
            .set("auto.offset.reset", &config.auto_offset_reset)
            .set("enable.auto.commit", "false")
            .set("enable.auto.offset.store", "false")
            .set("session.timeout.ms", config.session_timeout_ms.to_string())
            .set("enable.partition.eof", "false")
            .create_with_context(context)
            .map_err(|err| IngestError::Broker(err.to_string()))?;

        let topics: Vec<&str> = config.topics.iter().map(String::as_str).collect();
        consumer
            .subscribe(&topics)
            .map_err(|err| IngestError::Broker(err.to_string()))?;
        info!(
            target: "ome.ingest",
            bootstrap_servers = %config.bootstrap_servers,
            group_id = %config.group_id,
            topics = ?config.topics,
            "kafka_subscribed"
        );
        Ok(Self {
            consumer,
            revoked,
            closed: false,
        })
    }
}

fn to_raw_message(message: &BorrowedMessage<'_>) -> RawMessage {
    RawMessage {
        topic: message.topic().to_string(),
        partition: message.partition(),
        offset: message.offset(),
        payload: message.payload().map(<[u8]>::to_vec).unwrap_or_default(),
        timestamp_ms: message.timestamp().to_millis().unwrap_or_else(now_epoch_ms),
    }
}

#[async_trait]
impl MessageSource for KafkaSource {
    async fn poll(
        &mut self,
        max_messages: usize,
        timeout: Duration,
    ) -> Result<Vec<RawMessage>, IngestError> {
        if self.closed {
            return Err(IngestError::Closed);
        }
        let mut batch = Vec::new();
        match tokio::time::timeout(timeout, self.consumer.recv()).await {
            Err(_) => return Ok(batch),
            Ok(Ok(message)) => batch.push(to_raw_message(&message)),
            Ok(Err(err)) => return Err(IngestError::Broker(err.to_string())),
        }

        while batch.len() < max_messages {
            match tokio::time::timeout(DRAIN_TIMEOUT, self.consumer.recv()).await {
                Ok(Ok(message)) => batch.push(to_raw_message(&message)),
                Ok(Err(err)) => {
                    warn!(target: "ome.ingest", error = %err, "kafka_recv_failed");
                    break;
                }
                Err(_) => break,
            }
        }
        Ok(batch)
    }

    async fn commit(&mut self, offsets: &[PartitionOffset]) -> Result<(), IngestError> {
        if offsets.is_empty() {
            return Ok(());
        }
        let mut list = TopicPartitionList::new();
        for position in offsets {
            // Kafka 提交的是下一个待读 offset。
            list.add_partition_offset(
                &position.topic,
                position.partition,
                Offset::Offset(position.offset + 1),
            )
            .map_err(|err| IngestError::Commit(err.to_string()))?;
        }
        let consumer = &self.consumer;
        tokio::task::block_in_place(|| consumer.commit(&list, CommitMode::Sync))
            .map_err(|err| IngestError::Commit(err.to_string()))
    }

    fn take_revoked(&mut self) -> Vec<TopicPartition> {
        self.revoked
            .lock()
            .map(|mut pending| std::mem::take(&mut *pending))
            .unwrap_or_default()
    }

    async fn close(&mut self) -> Result<(), IngestError> {
        if !self.closed {
            self.consumer.unsubscribe();
            self.closed = true;
            info!(target: "ome.ingest", "kafka_unsubscribed");
        }
        Ok(())
    }
}

fn now_epoch_ms() -> i64 {
    let now = std::time::SystemTime::now();
    let duration = now
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default();
    duration.as_millis() as i64
}
