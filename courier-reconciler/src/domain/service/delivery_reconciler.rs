use std::sync::Arc;

use courier_core::error::Result;
use tracing::{debug, warn};

use crate::domain::model::{DeliveryEvent, MessageStatus};
use crate::domain::repository::MessageStatusRepository;

/// 单个事件的对账结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// 本次完成 sent → delivered
    Delivered,
    /// 已是 delivered 或更靠后的状态，无需写入
    AlreadyConverged,
    /// 存储中没有该消息
    Missing,
    /// 条件更新未命中且重读后仍未收敛
    Conflict,
}

impl ReconcileOutcome {
    /// 是否可以解决该记录的偏移量
    pub fn is_resolved(&self) -> bool {
        matches!(
            self,
            ReconcileOutcome::Delivered | ReconcileOutcome::AlreadyConverged
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ReconcileOutcome::Delivered => "delivered",
            ReconcileOutcome::AlreadyConverged => "converged",
            ReconcileOutcome::Missing => "missing",
            ReconcileOutcome::Conflict => "conflict",
        }
    }
}

/// 投递状态对账
///
/// 重复投递同一事件只会产生一次 sent → delivered 迁移，状态不会回退。
pub struct DeliveryReconciler {
    repository: Arc<dyn MessageStatusRepository>,
}

impl DeliveryReconciler {
    pub fn new(repository: Arc<dyn MessageStatusRepository>) -> Self {
        Self { repository }
    }

    pub async fn reconcile(&self, event: &DeliveryEvent) -> Result<ReconcileOutcome> {
        let target = MessageStatus::Delivered;
        let Some(current) = self.repository.find_status(event.message_id).await? else {
            debug!(message_id = %event.message_id, "message not found; leaving record unresolved");
            return Ok(ReconcileOutcome::Missing);
        };

        // 状态只前进：无法再推进到 delivered 说明已经到达或越过
        if !current.status.can_advance_to(target) {
            debug!(
                message_id = %event.message_id,
                status = %current.status,
                "message already delivered"
            );
            return Ok(ReconcileOutcome::AlreadyConverged);
        }

        if self
            .repository
            .update_status(event.message_id, current.status, target)
            .await?
        {
            debug!(message_id = %event.message_id, "message marked as delivered");
            return Ok(ReconcileOutcome::Delivered);
        }

        // 并发修改：重读一次判断是否已被他人推进
        match self.repository.find_status(event.message_id).await? {
            Some(view) if view.status.has_reached(target) => Ok(ReconcileOutcome::AlreadyConverged),
            Some(view) => {
                warn!(
                    message_id = %event.message_id,
                    status = %view.status,
                    "conditional status update matched no row"
                );
                Ok(ReconcileOutcome::Conflict)
            }
            None => Ok(ReconcileOutcome::Missing),
        }
    }
}
