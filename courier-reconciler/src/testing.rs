//! 内存版状态仓储与批次控制面

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use courier_core::error::{CourierError, Result};
use uuid::Uuid;

use crate::domain::model::{MessageStatus, MessageStatusView};
use crate::domain::repository::{BatchControl, MessageStatusRepository};

/// 按 id 保存状态，统计写入次数
#[derive(Default)]
pub struct InMemoryStatusRepository {
    rows: Mutex<HashMap<Uuid, MessageStatus>>,
    updates: AtomicUsize,
    /// 下一次读取之后把状态推进到给定值，模拟并发写入
    race: Mutex<Option<(Uuid, MessageStatus)>>,
    fail_reads: AtomicBool,
}

impl InMemoryStatusRepository {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn insert(&self, status: MessageStatus) -> Uuid {
        let id = Uuid::new_v4();
        self.rows.lock().unwrap().insert(id, status);
        id
    }

    pub fn status(&self, id: Uuid) -> Option<MessageStatus> {
        self.rows.lock().unwrap().get(&id).copied()
    }

    pub fn update_count(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }

    pub fn advance_after_next_read(&self, id: Uuid, status: MessageStatus) {
        *self.race.lock().unwrap() = Some((id, status));
    }

    pub fn fail_reads(&self) {
        self.fail_reads.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl MessageStatusRepository for InMemoryStatusRepository {
    async fn find_status(&self, id: Uuid) -> Result<Option<MessageStatusView>> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(CourierError::storage("status lookup failed"));
        }
        let mut rows = self.rows.lock().unwrap();
        let view = rows.get(&id).map(|status| MessageStatusView {
            id,
            status: *status,
            content: "hello".to_string(),
        });
        if let Some((race_id, next)) = self.race.lock().unwrap().take() {
            rows.insert(race_id, next);
        }
        Ok(view)
    }

    async fn update_status(
        &self,
        id: Uuid,
        expected: MessageStatus,
        target: MessageStatus,
    ) -> Result<bool> {
        let mut rows = self.rows.lock().unwrap();
        match rows.get_mut(&id) {
            Some(status) if *status == expected => {
                *status = target;
                self.updates.fetch_add(1, Ordering::SeqCst);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

/// 记录已解决偏移量与提交的批次控制面
pub struct FakeBatchControl {
    running: AtomicBool,
    stale: AtomicBool,
    fail_commit: AtomicBool,
    /// 解决第 n 个偏移量后撤销分区
    revoke_after: Mutex<Option<usize>>,
    resolved: Mutex<Vec<i64>>,
    committed: Mutex<Vec<i64>>,
    heartbeats: AtomicUsize,
}

impl FakeBatchControl {
    pub fn new() -> Self {
        Self {
            running: AtomicBool::new(true),
            stale: AtomicBool::new(false),
            fail_commit: AtomicBool::new(false),
            revoke_after: Mutex::new(None),
            resolved: Mutex::new(Vec::new()),
            committed: Mutex::new(Vec::new()),
            heartbeats: AtomicUsize::new(0),
        }
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn revoke_after(&self, resolved: usize) {
        *self.revoke_after.lock().unwrap() = Some(resolved);
    }

    pub fn fail_commit(&self) {
        self.fail_commit.store(true, Ordering::SeqCst);
    }

    pub fn resolved(&self) -> Vec<i64> {
        self.resolved.lock().unwrap().clone()
    }

    /// 已提交的"下一个待消费偏移量"
    pub fn committed(&self) -> Vec<i64> {
        self.committed.lock().unwrap().clone()
    }

    pub fn heartbeats(&self) -> usize {
        self.heartbeats.load(Ordering::SeqCst)
    }
}

impl BatchControl for FakeBatchControl {
    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn is_stale(&self) -> bool {
        self.stale.load(Ordering::SeqCst)
    }

    fn resolve_offset(&self, offset: i64) {
        let mut resolved = self.resolved.lock().unwrap();
        resolved.push(offset);
        if *self.revoke_after.lock().unwrap() == Some(resolved.len()) {
            self.stale.store(true, Ordering::SeqCst);
        }
    }

    fn heartbeat(&self) {
        self.heartbeats.fetch_add(1, Ordering::SeqCst);
    }

    fn commit_offsets_if_necessary(&self) -> Result<()> {
        if self.fail_commit.load(Ordering::SeqCst) {
            return Err(CourierError::broker("offset commit failed"));
        }
        let resolved = self.resolved.lock().unwrap();
        let Some(max) = resolved.iter().max().copied() else {
            return Ok(());
        };
        let mut committed = self.committed.lock().unwrap();
        if committed.last() != Some(&(max + 1)) {
            committed.push(max + 1);
        }
        Ok(())
    }
}
