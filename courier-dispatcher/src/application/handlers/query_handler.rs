//! 查询处理器（编排层）

use std::sync::Arc;

use courier_core::error::{CourierError, ErrorBuilder, ErrorCode, Result};
use tracing::instrument;
use uuid::Uuid;

use crate::application::queries::{GetMessageQuery, ListMessagesQuery};
use crate::domain::model::{Message, MessageListQuery};
use crate::domain::repository::MessageQueryRepository;

pub struct MessageQueryHandler {
    repository: Arc<dyn MessageQueryRepository>,
}

impl MessageQueryHandler {
    pub fn new(repository: Arc<dyn MessageQueryRepository>) -> Self {
        Self { repository }
    }

    /// 分页列表，空页视为未找到
    #[instrument(skip(self))]
    pub async fn handle_list_messages(&self, query: ListMessagesQuery) -> Result<Vec<Message>> {
        let list_query = MessageListQuery::from_params(
            query.page,
            query.limit,
            query.sort_by.as_deref(),
            query.sort_order.as_deref(),
        )?;

        let messages = self.repository.find_all(&list_query).await?;
        if messages.is_empty() {
            return Err(ErrorBuilder::new(ErrorCode::NotFound, "No messages found")
                .details("there are no messages in the requested page")
                .build_error());
        }
        Ok(messages)
    }

    #[instrument(skip(self), fields(message_id = %query.id))]
    pub async fn handle_get_message(&self, query: GetMessageQuery) -> Result<Message> {
        let id = Uuid::parse_str(&query.id).map_err(|err| {
            ErrorBuilder::new(ErrorCode::Validation, "invalid message id")
                .details(err.to_string())
                .build_error()
        })?;

        self.repository
            .find_by_id(id)
            .await?
            .ok_or_else(|| CourierError::not_found(format!("Message with ID {id} not found")))
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration as ChronoDuration, Utc};
    use courier_core::model::MessageStatus;

    use super::*;
    use crate::testing::{InMemoryStore, Scenario};

    fn seeded_store(count: usize) -> Arc<InMemoryStore> {
        let store = InMemoryStore::new(Scenario::new());
        let base = Utc::now();
        for index in 0..count {
            let at = base + ChronoDuration::seconds(index as i64);
            store.seed(Message {
                id: Uuid::new_v4(),
                sender: format!("sender-{index}"),
                receiver: "B".to_string(),
                content: format!("message {index}"),
                status: MessageStatus::Sent,
                created_at: at,
                updated_at: at,
            });
        }
        store
    }

    #[tokio::test]
    async fn test_list_defaults_to_newest_first() {
        let store = seeded_store(3);
        let handler = MessageQueryHandler::new(store);

        let messages = handler
            .handle_list_messages(ListMessagesQuery::default())
            .await
            .unwrap();

        assert_eq!(messages[0].content, "message 2");
        assert_eq!(messages[2].content, "message 0");
    }

    #[tokio::test]
    async fn test_list_paginates() {
        let store = seeded_store(5);
        let handler = MessageQueryHandler::new(store);

        let query = ListMessagesQuery {
            page: Some(2),
            limit: Some(2),
            sort_by: Some("createdAt".to_string()),
            sort_order: Some("asc".to_string()),
        };
        let messages = handler.handle_list_messages(query).await.unwrap();

        let contents: Vec<_> = messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["message 2", "message 3"]);
    }

    #[tokio::test]
    async fn test_empty_page_is_not_found() {
        let handler = MessageQueryHandler::new(seeded_store(2));
        let query = ListMessagesQuery {
            page: Some(10),
            ..Default::default()
        };

        let err = handler.handle_list_messages(query).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::NotFound);
    }

    #[tokio::test]
    async fn test_get_message_errors() {
        let handler = MessageQueryHandler::new(seeded_store(1));

        let err = handler
            .handle_get_message(GetMessageQuery {
                id: "not-a-uuid".to_string(),
            })
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::Validation);

        let err = handler
            .handle_get_message(GetMessageQuery {
                id: Uuid::new_v4().to_string(),
            })
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::NotFound);
    }
}
