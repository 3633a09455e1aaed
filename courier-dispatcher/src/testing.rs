//! 内存版存储与 Broker，记录每一次调用，便于断言 saga 顺序与可见性

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use courier_core::error::{CourierError, Result};
use uuid::Uuid;

use crate::domain::model::{
    Message, MessageListQuery, MessageStatus, NewMessage, SendReceipt, SortField, SortOrder,
};
use crate::domain::repository::{
    BrokerCommit, BrokerTransaction, MessagePublisher, MessageQueryRepository, MessageStore,
    StorageTransaction,
};

/// 故障与延迟注入，以及调用日志
#[derive(Default)]
pub struct Scenario {
    calls: Mutex<Vec<&'static str>>,
    failures: Mutex<HashSet<&'static str>>,
    delays: Mutex<HashMap<&'static str, Duration>>,
}

impl Scenario {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail(&self, step: &'static str) {
        self.failures.lock().unwrap().insert(step);
    }

    pub fn delay(&self, step: &'static str, duration: Duration) {
        self.delays.lock().unwrap().insert(step, duration);
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }

    /// 已注入的故障，不计入调用日志
    pub fn failing(&self, step: &'static str) -> bool {
        self.failures.lock().unwrap().contains(step)
    }

    async fn step(&self, step: &'static str) -> Result<()> {
        self.calls.lock().unwrap().push(step);
        let delay = self.delays.lock().unwrap().get(step).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.failures.lock().unwrap().contains(step) {
            let err = if step.starts_with("broker") {
                CourierError::broker(format!("{step} failed"))
            } else {
                CourierError::storage(format!("{step} failed"))
            };
            return Err(err);
        }
        Ok(())
    }
}

/// 内存存储：提交后记录才对查询可见
pub struct InMemoryStore {
    scenario: Arc<Scenario>,
    rows: Arc<Mutex<Vec<Message>>>,
}

impl InMemoryStore {
    pub fn new(scenario: Arc<Scenario>) -> Arc<Self> {
        Arc::new(Self {
            scenario,
            rows: Arc::new(Mutex::new(Vec::new())),
        })
    }

    pub fn rows(&self) -> Vec<Message> {
        self.rows.lock().unwrap().clone()
    }

    pub fn seed(&self, message: Message) {
        self.rows.lock().unwrap().push(message);
    }
}

#[async_trait]
impl MessageStore for InMemoryStore {
    async fn begin(&self) -> Result<Box<dyn StorageTransaction>> {
        self.scenario.step("storage.begin").await?;
        Ok(Box::new(InMemoryStorageTransaction {
            scenario: Arc::clone(&self.scenario),
            rows: Arc::clone(&self.rows),
            pending: Vec::new(),
        }))
    }
}

struct InMemoryStorageTransaction {
    scenario: Arc<Scenario>,
    rows: Arc<Mutex<Vec<Message>>>,
    pending: Vec<Message>,
}

impl InMemoryStorageTransaction {
    fn build(&mut self, message: &NewMessage) -> Result<Message> {
        let duplicate = self.pending.iter().any(|row| row.id == message.id)
            || self.rows.lock().unwrap().iter().any(|row| row.id == message.id);
        if duplicate {
            return Err(CourierError::storage("duplicate key value violates unique constraint"));
        }
        let now = Utc::now();
        let record = Message {
            id: message.id,
            sender: message.sender.clone(),
            receiver: message.receiver.clone(),
            content: message.content.clone(),
            status: MessageStatus::Sent,
            created_at: now,
            updated_at: now,
        };
        self.pending.push(record.clone());
        Ok(record)
    }
}

#[async_trait]
impl StorageTransaction for InMemoryStorageTransaction {
    async fn insert(&mut self, message: &NewMessage) -> Result<Message> {
        self.scenario.step("storage.insert").await?;
        self.build(message)
    }

    async fn bulk_insert(&mut self, messages: &[NewMessage]) -> Result<Vec<Message>> {
        self.scenario.step("storage.bulk_insert").await?;
        messages.iter().map(|message| self.build(message)).collect()
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.scenario.step("storage.commit").await?;
        let this = *self;
        this.rows.lock().unwrap().extend(this.pending);
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.scenario.step("storage.rollback").await
    }
}

#[async_trait]
impl MessageQueryRepository for InMemoryStore {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Message>> {
        Ok(self.rows().into_iter().find(|row| row.id == id))
    }

    async fn find_all(&self, query: &MessageListQuery) -> Result<Vec<Message>> {
        let mut rows = self.rows();
        rows.sort_by(|a, b| {
            let ordering = match query.sort_by {
                SortField::CreatedAt => a.created_at.cmp(&b.created_at),
                SortField::UpdatedAt => a.updated_at.cmp(&b.updated_at),
                SortField::Status => a.status.cmp(&b.status),
                SortField::Sender => a.sender.cmp(&b.sender),
                SortField::Receiver => a.receiver.cmp(&b.receiver),
            };
            match query.sort_order {
                SortOrder::Asc => ordering,
                SortOrder::Desc => ordering.reverse(),
            }
        });
        Ok(rows
            .into_iter()
            .skip(query.offset as usize)
            .take(query.limit as usize)
            .collect())
    }
}

/// 已提交到 Broker 的记录
#[derive(Debug, Clone)]
pub struct PublishedRecord {
    pub topic: String,
    pub key: String,
    pub payload: Vec<u8>,
}

/// 内存 Broker：提交后记录才对消费者可见
pub struct InMemoryPublisher {
    scenario: Arc<Scenario>,
    committed: Arc<Mutex<Vec<PublishedRecord>>>,
}

impl InMemoryPublisher {
    pub fn new(scenario: Arc<Scenario>) -> Arc<Self> {
        Arc::new(Self {
            scenario,
            committed: Arc::new(Mutex::new(Vec::new())),
        })
    }

    pub fn committed(&self) -> Vec<PublishedRecord> {
        self.committed.lock().unwrap().clone()
    }
}

#[async_trait]
impl MessagePublisher for InMemoryPublisher {
    async fn begin(&self) -> Result<Box<dyn BrokerTransaction>> {
        self.scenario.step("broker.begin").await?;
        Ok(Box::new(InMemoryBrokerTransaction {
            scenario: Arc::clone(&self.scenario),
            committed: Arc::clone(&self.committed),
            pending: Vec::new(),
        }))
    }
}

struct InMemoryBrokerTransaction {
    scenario: Arc<Scenario>,
    committed: Arc<Mutex<Vec<PublishedRecord>>>,
    pending: Vec<PublishedRecord>,
}

#[async_trait]
impl BrokerTransaction for InMemoryBrokerTransaction {
    async fn send(&mut self, topic: &str, messages: &[Message]) -> Result<SendReceipt> {
        self.scenario.step("broker.send").await?;
        for message in messages {
            let payload = serde_json::to_vec(message)
                .map_err(|err| CourierError::internal(err.to_string()))?;
            self.pending.push(PublishedRecord {
                topic: topic.to_string(),
                key: message.id.to_string(),
                payload,
            });
        }
        Ok(SendReceipt {
            topic: topic.to_string(),
            record_count: messages.len(),
        })
    }

    async fn commit(self: Box<Self>) -> Result<BrokerCommit> {
        self.scenario.step("broker.commit").await?;
        let this = *self;
        this.committed.lock().unwrap().extend(this.pending);
        // 结果未知时按最坏情况处理：记录已对消费者可见
        if this.scenario.failing("broker.commit_unknown") {
            return Ok(BrokerCommit::OutcomeUnknown(CourierError::broker(
                "transaction commit timed out",
            )));
        }
        Ok(BrokerCommit::Committed)
    }

    async fn abort(self: Box<Self>) -> Result<()> {
        self.scenario.step("broker.abort").await
    }
}
