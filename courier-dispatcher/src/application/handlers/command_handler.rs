//! 命令处理器（编排层）- 校验输入、构建记录，然后交给分发协调器

use std::sync::Arc;

use courier_core::error::{CourierError, Result};
use tracing::instrument;

use crate::application::commands::{PostBulkMessagesCommand, PostMessageCommand};
use crate::domain::model::{Message, NewMessage};
use crate::domain::service::DispatchCoordinator;

pub struct MessageCommandHandler {
    coordinator: Arc<DispatchCoordinator>,
}

impl MessageCommandHandler {
    pub fn new(coordinator: Arc<DispatchCoordinator>) -> Self {
        Self { coordinator }
    }

    #[instrument(skip(self, command))]
    pub async fn handle_post_message(&self, command: PostMessageCommand) -> Result<Message> {
        let message = NewMessage::new(command.sender, command.receiver, command.content)?;
        self.coordinator.dispatch(message).await
    }

    /// 任意一条校验失败则整批拒绝，不会开启事务
    #[instrument(skip(self, command), fields(batch_size = command.messages.len()))]
    pub async fn handle_post_bulk_messages(
        &self,
        command: PostBulkMessagesCommand,
    ) -> Result<Vec<Message>> {
        if command.messages.is_empty() {
            return Err(CourierError::validation("messages array cannot be empty"));
        }

        let messages = command
            .messages
            .into_iter()
            .enumerate()
            .map(|(index, item)| {
                NewMessage::new(item.sender, item.receiver, item.content)
                    .map_err(|err| err.with_context(format!("invalid message at index {index}")))
            })
            .collect::<Result<Vec<_>>>()?;

        self.coordinator.dispatch_batch(messages).await
    }
}
