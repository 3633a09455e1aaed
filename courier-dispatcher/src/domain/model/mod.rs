//! 分发领域模型

mod message_query;

pub use courier_core::model::{Message, MessageStatus, NewMessage};
pub use message_query::{
    DEFAULT_LIMIT, MAX_LIMIT, MessageListQuery, SortField, SortOrder,
};

/// Broker 事务内一次批量发送的回执
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendReceipt {
    pub topic: String,
    pub record_count: usize,
}
