//! 对账领域模型

mod delivery_event;

pub use courier_core::model::MessageStatus;
pub use delivery_event::{DecodeError, DeliveryEvent, decode_events};

use uuid::Uuid;

/// 对账所需的最小消息视图
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageStatusView {
    pub id: Uuid,
    pub status: MessageStatus,
    pub content: String,
}
