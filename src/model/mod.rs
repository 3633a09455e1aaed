//! 消息数据模型

mod message;

pub use message::{
    MAX_PARTICIPANT_LEN, Message, MessageStatus, NewMessage, ParseMessageStatusError,
};
