//! PostgreSQL 消息状态仓储

use async_trait::async_trait;
use courier_core::error::{CourierError, Result, map_sqlx_error};
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::model::{MessageStatus, MessageStatusView};
use crate::domain::repository::MessageStatusRepository;

#[derive(Debug, sqlx::FromRow)]
struct StatusRow {
    id: Uuid,
    status: String,
    content: String,
}

impl TryFrom<StatusRow> for MessageStatusView {
    type Error = CourierError;

    fn try_from(row: StatusRow) -> Result<Self> {
        let status = row
            .status
            .parse::<MessageStatus>()
            .map_err(|err| CourierError::internal(err.to_string()))?;
        Ok(MessageStatusView {
            id: row.id,
            status,
            content: row.content,
        })
    }
}

pub struct PostgresMessageStatusRepository {
    pool: PgPool,
}

impl PostgresMessageStatusRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MessageStatusRepository for PostgresMessageStatusRepository {
    async fn find_status(&self, id: Uuid) -> Result<Option<MessageStatusView>> {
        let row = sqlx::query_as::<_, StatusRow>(
            "SELECT id, status, content FROM messages WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|err| map_sqlx_error(err, "failed to load message status"))?;

        row.map(MessageStatusView::try_from).transpose()
    }

    async fn update_status(
        &self,
        id: Uuid,
        expected: MessageStatus,
        target: MessageStatus,
    ) -> Result<bool> {
        // 以读取到的状态作为条件，避免覆盖并发推进的状态
        let result = sqlx::query(
            "UPDATE messages SET status = $1, updated_at = now() WHERE id = $2 AND status = $3",
        )
        .bind(target.as_str())
        .bind(id)
        .bind(expected.as_str())
        .execute(&self.pool)
        .await
        .map_err(|err| map_sqlx_error(err, "failed to update message status"))?;

        Ok(result.rows_affected() == 1)
    }
}
