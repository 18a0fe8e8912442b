//! 内存消息源
//!
//! 模拟消费组语义：按分区分配 offset、记录已提交位置，
//! `restart` 从已提交位置之后重新投递，用于验证至少一次投递与幂等写入。
//! `revoke` 模拟再均衡把分区转给其他成员。

use crate::{IngestError, MessageSource};
use async_trait::async_trait;
use domain::{PartitionOffset, RawMessage, TopicPartition};
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

/// 未指定时写入的 broker 时间戳基准。
const BASE_TIMESTAMP_MS: i64 = 1_767_225_600_000;

#[derive(Default)]
struct MemoryState {
    log: Vec<RawMessage>,
    pending: VecDeque<RawMessage>,
    next_offsets: BTreeMap<(String, i32), i64>,
    committed: BTreeMap<(String, i32), i64>,
    revoked: Vec<TopicPartition>,
    commit_calls: usize,
    fail_commits: usize,
    closed: bool,
}

/// 内存消息源（克隆后共享同一队列，便于测试端投递与检查）。
#[derive(Clone, Default)]
pub struct MemorySource {
    state: Arc<Mutex<MemoryState>>,
    notify: Arc<Notify>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// 向分区 0 投递消息，broker 时间戳由 offset 推导。
    pub fn publish(&self, topic: &str, payload: impl Into<Vec<u8>>) -> i64 {
        self.publish_to(topic, 0, payload, None)
    }

    /// 向指定分区投递消息，返回分配的 offset。
    pub fn publish_to(
        &self,
        topic: &str,
        partition: i32,
        payload: impl Into<Vec<u8>>,
        timestamp_ms: Option<i64>,
    ) -> i64 {
        let offset = {
            let Ok(mut state) = self.state.lock() else {
                return -1;
            };
            let next = state
                .next_offsets
                .entry((topic.to_string(), partition))
                .or_insert(0);
            let offset = *next;
            *next += 1;
            let message = RawMessage {
                topic: topic.to_string(),
                partition,
                offset,
                payload: payload.into(),
                timestamp_ms: timestamp_ms.unwrap_or(BASE_TIMESTAMP_MS + offset * 1000),
            };
            state.log.push(message.clone());
            state.pending.push_back(message);
            offset
        };
        self.notify.notify_one();
        offset
    }

    /// 模拟消费者重启：丢弃未读队列，从各分区已提交位置之后重新投递。
    pub fn restart(&self) {
        if let Ok(mut state) = self.state.lock() {
            let replay: VecDeque<RawMessage> = state
                .log
                .iter()
                .filter(|message| {
                    let key = (message.topic.clone(), message.partition);
                    match state.committed.get(&key) {
                        Some(committed) => message.offset > *committed,
                        None => true,
                    }
                })
                .cloned()
                .collect();
            state.pending = replay;
            state.closed = false;
        }
        self.notify.notify_one();
    }

    /// 撤销分区：丢弃该分区未拉取的消息，下次 `take_revoked` 时通知消费者。
    pub fn revoke(&self, topic: &str, partition: i32) {
        if let Ok(mut state) = self.state.lock() {
            state
                .pending
                .retain(|message| !(message.topic == topic && message.partition == partition));
            state.revoked.push(TopicPartition {
                topic: topic.to_string(),
                partition,
            });
        }
    }

    /// 模拟同组其他成员提交该分区。
    pub fn commit_external(&self, topic: &str, partition: i32, offset: i64) {
        if let Ok(mut state) = self.state.lock() {
            state.committed.insert((topic.to_string(), partition), offset);
        }
    }

    /// 让接下来 `count` 次提交失败。
    pub fn fail_next_commits(&self, count: usize) {
        if let Ok(mut state) = self.state.lock() {
            state.fail_commits = count;
        }
    }

    /// 指定分区已提交的最高 offset。
    pub fn committed(&self, topic: &str, partition: i32) -> Option<i64> {
        self.state
            .lock()
            .ok()
            .and_then(|state| state.committed.get(&(topic.to_string(), partition)).copied())
    }

    pub fn commit_calls(&self) -> usize {
        self.state.lock().map(|state| state.commit_calls).unwrap_or(0)
    }

    /// 尚未被拉取的消息数量。
    pub fn pending(&self) -> usize {
        self.state.lock().map(|state| state.pending.len()).unwrap_or(0)
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().map(|state| state.closed).unwrap_or(false)
    }

    fn take(&self, max_messages: usize) -> Result<Vec<RawMessage>, IngestError> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| IngestError::Broker("lock failed".to_string()))?;
        if state.closed {
            return Err(IngestError::Closed);
        }
        let count = max_messages.min(state.pending.len());
        Ok(state.pending.drain(..count).collect())
    }
}

#[async_trait]
impl MessageSource for MemorySource {
    async fn poll(
        &mut self,
        max_messages: usize,
        timeout: Duration,
    ) -> Result<Vec<RawMessage>, IngestError> {
        let max_messages = max_messages.max(1);
        let batch = self.take(max_messages)?;
        if !batch.is_empty() {
            return Ok(batch);
        }
        let _ = tokio::time::timeout(timeout, self.notify.notified()).await;
        self.take(max_messages)
    }

    async fn commit(&mut self, offsets: &[PartitionOffset]) -> Result<(), IngestError> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| IngestError::Commit("lock failed".to_string()))?;
        state.commit_calls += 1;
        if state.fail_commits > 0 {
            state.fail_commits -= 1;
            return Err(IngestError::Commit("injected commit failure".to_string()));
        }
        // 与 broker 一致：后一次提交覆盖前一次，不取最大值。
        for position in offsets {
            state
                .committed
                .insert((position.topic.clone(), position.partition), position.offset);
        }
        Ok(())
    }

    fn take_revoked(&mut self) -> Vec<TopicPartition> {
        self.state
            .lock()
            .map(|mut state| std::mem::take(&mut state.revoked))
            .unwrap_or_default()
    }

    async fn close(&mut self) -> Result<(), IngestError> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| IngestError::Broker("lock failed".to_string()))?;
        state.closed = true;
        Ok(())
    }
}
