//! 对账领域端口

use async_trait::async_trait;
use courier_core::error::Result;
use uuid::Uuid;

use crate::domain::model::{MessageStatus, MessageStatusView};

/// 消息状态仓储
#[async_trait]
pub trait MessageStatusRepository: Send + Sync {
    /// 只读取 id / status / content
    async fn find_status(&self, id: Uuid) -> Result<Option<MessageStatusView>>;

    /// 条件更新：仅当当前状态等于 `expected` 时写入 `target`，返回是否生效
    async fn update_status(
        &self,
        id: Uuid,
        expected: MessageStatus,
        target: MessageStatus,
    ) -> Result<bool>;
}

/// 批次控制面
///
/// 由消费者为每个分区批次提供；处理过程中只通过它与 Broker 交互。
pub trait BatchControl: Send + Sync {
    /// 消费者仍在组内运行
    fn is_running(&self) -> bool;

    /// 分区已被撤销，批次过期
    fn is_stale(&self) -> bool;

    /// 标记偏移量已处理，可被提交
    fn resolve_offset(&self, offset: i64);

    /// 刷新成员与分区归属快照，记录处理存活时间
    fn heartbeat(&self);

    /// 提交已解决的最高偏移量 + 1（若有新的已解决偏移量）
    fn commit_offsets_if_necessary(&self) -> Result<()>;
}
