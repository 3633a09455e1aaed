//! 分发领域端口
//!
//! 事务句柄由 `commit` / `rollback` / `abort` 消费，同一句柄不可重复使用。

use async_trait::async_trait;
use courier_core::error::{CourierError, Result};
use uuid::Uuid;

use crate::domain::model::{Message, MessageListQuery, NewMessage, SendReceipt};

/// 消息存储
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// 开启存储事务
    async fn begin(&self) -> Result<Box<dyn StorageTransaction>>;
}

/// 存储事务句柄，提交前写入对其他读者不可见
#[async_trait]
pub trait StorageTransaction: Send {
    /// 写入单条消息，返回带存储生成时间戳的记录
    async fn insert(&mut self, message: &NewMessage) -> Result<Message>;

    /// 批量写入，返回顺序与输入一致
    async fn bulk_insert(&mut self, messages: &[NewMessage]) -> Result<Vec<Message>>;

    async fn commit(self: Box<Self>) -> Result<()>;

    async fn rollback(self: Box<Self>) -> Result<()>;
}

/// Broker 事务提交结果
///
/// `Err` 表示事务确定未提交（已中止），可以安全回滚存储。
#[derive(Debug)]
pub enum BrokerCommit {
    Committed,
    /// 提交结果无法确认，记录可能已对消费者可见
    OutcomeUnknown(CourierError),
}

/// 事务型消息发布器
#[async_trait]
pub trait MessagePublisher: Send + Sync {
    /// 开启 Broker 事务，同一生产者上的事务串行
    async fn begin(&self) -> Result<Box<dyn BrokerTransaction>>;
}

/// Broker 事务句柄，提交前发送的记录对 read_committed 消费者不可见
#[async_trait]
pub trait BrokerTransaction: Send {
    /// 每条消息一条记录：JSON 编码，以消息 ID 为 key
    async fn send(&mut self, topic: &str, messages: &[Message]) -> Result<SendReceipt>;

    /// 等待提交完成，不受调用方的截止时间约束
    async fn commit(self: Box<Self>) -> Result<BrokerCommit>;

    async fn abort(self: Box<Self>) -> Result<()>;
}

/// 消息查询仓储
#[async_trait]
pub trait MessageQueryRepository: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Message>>;

    async fn find_all(&self, query: &MessageListQuery) -> Result<Vec<Message>>;
}
