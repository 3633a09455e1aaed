//! 命令定义

use serde::Deserialize;

/// 创建单条消息
#[derive(Debug, Clone, Deserialize)]
pub struct PostMessageCommand {
    pub content: String,
    pub sender: String,
    pub receiver: String,
}

/// 批量创建消息
#[derive(Debug, Clone, Deserialize)]
#[serde(transparent)]
pub struct PostBulkMessagesCommand {
    pub messages: Vec<PostMessageCommand>,
}
