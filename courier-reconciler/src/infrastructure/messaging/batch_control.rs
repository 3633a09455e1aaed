//! 基于 rdkafka 消费者的批次控制面
//!
//! 每个分区批次创建一个实例：记录已解决的最高偏移量，提交时写入 `最高偏移量 + 1`。
//! 心跳会刷新分区归属快照，分区被撤销后批次即视为过期。

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

use chrono::Utc;
use courier_core::error::{Result, map_kafka_error};
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::{Offset, TopicPartitionList};
use tracing::{debug, warn};

use crate::domain::repository::BatchControl;

const NONE: i64 = -1;

pub struct KafkaBatchControl<'a> {
    consumer: &'a StreamConsumer,
    running: &'a AtomicBool,
    last_heartbeat_ms: &'a AtomicI64,
    topic: &'a str,
    partition: i32,
    resolved: AtomicI64,
    committed: AtomicI64,
    stale: AtomicBool,
}

impl<'a> KafkaBatchControl<'a> {
    pub fn new(
        consumer: &'a StreamConsumer,
        running: &'a AtomicBool,
        last_heartbeat_ms: &'a AtomicI64,
        topic: &'a str,
        partition: i32,
    ) -> Self {
        Self {
            consumer,
            running,
            last_heartbeat_ms,
            topic,
            partition,
            resolved: AtomicI64::new(NONE),
            committed: AtomicI64::new(NONE),
            stale: AtomicBool::new(false),
        }
    }

    /// 已解决的最高偏移量
    pub fn highest_resolved(&self) -> Option<i64> {
        match self.resolved.load(Ordering::SeqCst) {
            NONE => None,
            offset => Some(offset),
        }
    }

    fn still_assigned(&self) -> bool {
        match self.consumer.assignment() {
            Ok(assignment) => assignment
                .find_partition(self.topic, self.partition)
                .is_some(),
            Err(err) => {
                // 无法确认归属时保持原判断
                warn!(error = %err, "failed to read partition assignment");
                !self.stale.load(Ordering::SeqCst)
            }
        }
    }
}

impl BatchControl for KafkaBatchControl<'_> {
    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn is_stale(&self) -> bool {
        self.stale.load(Ordering::SeqCst)
    }

    fn resolve_offset(&self, offset: i64) {
        self.resolved.fetch_max(offset, Ordering::SeqCst);
    }

    fn heartbeat(&self) {
        if !self.still_assigned() {
            self.stale.store(true, Ordering::SeqCst);
        }
        self.last_heartbeat_ms
            .store(Utc::now().timestamp_millis(), Ordering::SeqCst);
    }

    fn commit_offsets_if_necessary(&self) -> Result<()> {
        let committed = match self.committed.load(Ordering::SeqCst) {
            NONE => None,
            offset => Some(offset),
        };
        let Some(next_offset) = next_commit_offset(self.highest_resolved(), committed) else {
            return Ok(());
        };

        let mut offsets = TopicPartitionList::new();
        offsets
            .add_partition_offset(self.topic, self.partition, Offset::Offset(next_offset))
            .map_err(|err| map_kafka_error(err, "failed to build offset list"))?;
        self.consumer
            .commit(&offsets, CommitMode::Async)
            .map_err(|err| map_kafka_error(err, "failed to commit offsets"))?;

        self.committed.store(next_offset - 1, Ordering::SeqCst);
        debug!(
            topic = self.topic,
            partition = self.partition,
            next_offset,
            "committed resolved offsets"
        );
        Ok(())
    }
}

/// 需要提交的下一个待消费偏移量：已解决的最高偏移量 + 1，没有新进展时为 None
pub(crate) fn next_commit_offset(resolved: Option<i64>, committed: Option<i64>) -> Option<i64> {
    match (resolved, committed) {
        (None, _) => None,
        (Some(resolved), Some(committed)) if resolved <= committed => None,
        (Some(resolved), _) => Some(resolved + 1),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 测试：提交位置为已解决的最高偏移量 + 1
    #[test]
    fn test_commit_points_past_highest_resolved() {
        assert_eq!(next_commit_offset(Some(41), None), Some(42));
        assert_eq!(next_commit_offset(Some(0), None), Some(1));
    }

    /// 测试：没有新的已解决偏移量时不提交
    #[test]
    fn test_no_commit_without_new_progress() {
        assert_eq!(next_commit_offset(None, None), None);
        assert_eq!(next_commit_offset(Some(41), Some(41)), None);
        assert_eq!(next_commit_offset(Some(43), Some(41)), Some(44));
    }
}
