//! 批次与 offset 记录
//!
//! 批次只由采集循环持有；offset 记录每个分区已处理的最高位置，
//! 包含被判定为毒消息的位置，随下一次写入一并提交。

use domain::{AlertRecord, HealthRecord, MetricPoint, PartitionOffset, TopicPartition};
use ome_normalize::Normalized;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

/// 各分区已处理的最高 offset。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OffsetTracker {
    positions: BTreeMap<(String, i32), i64>,
}

impl OffsetTracker {
    pub fn track(&mut self, position: &PartitionOffset) {
        let entry = self
            .positions
            .entry((position.topic.clone(), position.partition))
            .or_insert(position.offset);
        *entry = (*entry).max(position.offset);
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn to_commit(&self) -> Vec<PartitionOffset> {
        self.positions
            .iter()
            .map(|((topic, partition), offset)| PartitionOffset {
                topic: topic.clone(),
                partition: *partition,
                offset: *offset,
            })
            .collect()
    }

    /// 丢弃已被撤销分区的位置，返回实际丢弃的数量。
    pub fn forget(&mut self, revoked: &[TopicPartition]) -> usize {
        let before = self.positions.len();
        for partition in revoked {
            self.positions
                .remove(&(partition.topic.clone(), partition.partition));
        }
        before - self.positions.len()
    }

    pub fn clear(&mut self) {
        self.positions.clear();
    }
}

/// 待写入批次。
#[derive(Debug, Default)]
pub struct Batch {
    pub metrics: Vec<MetricPoint>,
    pub alerts: Vec<AlertRecord>,
    pub health: Vec<HealthRecord>,
    pub offsets: OffsetTracker,
    /// 本批收到的毒消息数。
    pub poison: usize,
    opened_at: Option<Instant>,
}

impl Batch {
    pub fn new() -> Self {
        Self::default()
    }

    /// 登记一条已处理的消息（无论是否产出记录）。
    pub fn track(&mut self, position: &PartitionOffset) {
        self.opened_at.get_or_insert_with(Instant::now);
        self.offsets.track(position);
    }

    pub fn absorb(&mut self, normalized: Normalized) {
        self.metrics.extend(normalized.metrics);
        self.alerts.extend(normalized.alerts);
        self.health.extend(normalized.health);
    }

    pub fn record_count(&self) -> usize {
        self.metrics.len() + self.alerts.len() + self.health.len()
    }

    /// 有待写入的记录或待提交的 offset。
    pub fn has_pending(&self) -> bool {
        self.record_count() > 0 || !self.offsets.is_empty()
    }

    /// 数量阈值或时间阈值任一满足即应写入。
    pub fn should_flush(&self, max_records: usize, max_interval: Duration) -> bool {
        if !self.has_pending() {
            return false;
        }
        self.record_count() >= max_records || self.age() >= max_interval
    }

    /// 距离时间阈值的剩余时间；空批次返回 `None`。
    pub fn remaining(&self, max_interval: Duration) -> Option<Duration> {
        self.opened_at
            .map(|opened_at| max_interval.saturating_sub(opened_at.elapsed()))
    }

    fn age(&self) -> Duration {
        self.opened_at
            .map(|opened_at| opened_at.elapsed())
            .unwrap_or_default()
    }

    /// 取出记录。offset 保留到提交成功后再清除。
    pub fn take_records(&mut self) -> (Vec<MetricPoint>, Vec<AlertRecord>, Vec<HealthRecord>) {
        self.poison = 0;
        (
            std::mem::take(&mut self.metrics),
            std::mem::take(&mut self.alerts),
            std::mem::take(&mut self.health),
        )
    }

    /// 提交成功后重置。
    pub fn committed(&mut self) {
        self.offsets.clear();
        self.opened_at = None;
    }

    /// 提交失败时重新计时，offset 并入下一批。
    pub fn restart_timer(&mut self) {
        self.opened_at = if self.has_pending() {
            Some(Instant::now())
        } else {
            None
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn position(topic: &str, partition: i32, offset: i64) -> PartitionOffset {
        PartitionOffset {
            topic: topic.to_string(),
            partition,
            offset,
        }
    }

    #[test]
    fn tracker_keeps_highest_offset_per_partition() {
        let mut tracker = OffsetTracker::default();
        tracker.track(&position("t", 0, 5));
        tracker.track(&position("t", 0, 3));
        tracker.track(&position("t", 1, 9));
        tracker.track(&position("u", 0, 1));
        assert_eq!(
            tracker.to_commit(),
            vec![position("t", 0, 5), position("t", 1, 9), position("u", 0, 1)]
        );
    }

    #[test]
    fn forgotten_partitions_are_not_committed() {
        let mut tracker = OffsetTracker::default();
        tracker.track(&position("t", 0, 5));
        tracker.track(&position("t", 1, 9));
        let revoked = vec![
            TopicPartition {
                topic: "t".to_string(),
                partition: 1,
            },
            TopicPartition {
                topic: "t".to_string(),
                partition: 7,
            },
        ];
        assert_eq!(tracker.forget(&revoked), 1);
        assert_eq!(tracker.to_commit(), vec![position("t", 0, 5)]);
    }

    #[test]
    fn offsets_alone_make_a_batch_pending() {
        let mut batch = Batch::new();
        assert!(!batch.should_flush(1, Duration::ZERO));
        batch.track(&position("t", 0, 0));
        assert!(batch.has_pending());
        assert!(batch.should_flush(10, Duration::ZERO));
        assert!(!batch.should_flush(10, Duration::from_secs(60)));
        batch.committed();
        assert!(!batch.has_pending());
        assert_eq!(batch.remaining(Duration::from_secs(1)), None);
    }
}
