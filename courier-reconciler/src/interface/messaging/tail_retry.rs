//! 未解决尾部的回退记账
//!
//! 同一分区连续回退到同一偏移量时退避逐次增长（受 `max_backoff` 封顶），
//! 超出重试预算后仍然回退，只标记为超预算。

use std::collections::HashMap;
use std::time::Duration;

use courier_core::utils::RetryPolicy;

/// 一次回退计划
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewindPlan {
    pub offset: i64,
    /// 对同一偏移量的第几次回退（从 1 开始）
    pub attempts: u32,
    pub backoff: Duration,
    pub over_budget: bool,
}

#[derive(Debug, Clone, Copy)]
struct TailRetry {
    offset: i64,
    attempts: u32,
}

pub struct TailRetryTracker {
    policy: RetryPolicy,
    entries: HashMap<(String, i32), TailRetry>,
}

impl TailRetryTracker {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            entries: HashMap::new(),
        }
    }

    /// 记录一次回退并给出退避时间；尾部位置变化时重新计数
    pub fn plan(&mut self, topic: &str, partition: i32, offset: i64) -> RewindPlan {
        let entry = self
            .entries
            .entry((topic.to_string(), partition))
            .or_insert(TailRetry {
                offset,
                attempts: 0,
            });
        if entry.offset != offset {
            *entry = TailRetry {
                offset,
                attempts: 0,
            };
        }
        entry.attempts = entry.attempts.saturating_add(1);

        RewindPlan {
            offset,
            attempts: entry.attempts,
            backoff: self.policy.backoff_for(entry.attempts - 1),
            over_budget: entry.attempts > self.policy.retries(),
        }
    }

    /// 分区尾部已全部解决
    pub fn clear(&mut self, topic: &str, partition: i32) {
        self.entries.remove(&(topic.to_string(), partition));
    }
}
