use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{CourierError, Result};

/// 发送方 / 接收方标识的最大长度（字符数）
pub const MAX_PARTICIPANT_LEN: usize = 255;

/// 投递状态，只允许向前推进：sent < delivered < read
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    Sent,
    Delivered,
    Read,
}

impl MessageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageStatus::Sent => "sent",
            MessageStatus::Delivered => "delivered",
            MessageStatus::Read => "read",
        }
    }

    /// 仅严格向前的迁移合法
    pub fn can_advance_to(&self, target: MessageStatus) -> bool {
        target > *self
    }

    /// 当前状态是否已达到（或越过）目标状态
    pub fn has_reached(&self, target: MessageStatus) -> bool {
        *self >= target
    }
}

impl fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown message status: {0}")]
pub struct ParseMessageStatusError(pub String);

impl FromStr for MessageStatus {
    type Err = ParseMessageStatusError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "sent" => Ok(MessageStatus::Sent),
            "delivered" => Ok(MessageStatus::Delivered),
            "read" => Ok(MessageStatus::Read),
            other => Err(ParseMessageStatusError(other.to_string())),
        }
    }
}

/// 已持久化的消息
///
/// 同时作为查询结果与 Broker 线上格式（camelCase JSON）。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: Uuid,
    pub sender: String,
    pub receiver: String,
    pub content: String,
    pub status: MessageStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// 待创建的消息（已通过校验）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMessage {
    pub id: Uuid,
    pub sender: String,
    pub receiver: String,
    pub content: String,
}

impl NewMessage {
    /// 校验输入并生成新的消息 ID
    pub fn new(
        sender: impl Into<String>,
        receiver: impl Into<String>,
        content: impl Into<String>,
    ) -> Result<Self> {
        let sender = sender.into();
        let receiver = receiver.into();
        let content = content.into();

        validate_participant("sender", &sender)?;
        validate_participant("receiver", &receiver)?;
        if content.is_empty() {
            return Err(CourierError::validation("content is required"));
        }

        Ok(Self {
            id: Uuid::new_v4(),
            sender,
            receiver,
            content,
        })
    }
}

fn validate_participant(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(CourierError::validation(format!("{field} is required")));
    }
    if value.chars().count() > MAX_PARTICIPANT_LEN {
        return Err(CourierError::validation(format!(
            "{field} must be at most {MAX_PARTICIPANT_LEN} characters"
        )));
    }
    Ok(())
}
