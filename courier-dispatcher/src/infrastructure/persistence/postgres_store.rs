//! PostgreSQL 消息存储实现
//!
//! 写侧基于显式事务（`Transaction<'static, Postgres>`），读侧直接使用连接池。

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use courier_core::error::{CourierError, Result, map_sqlx_error};
use sqlx::{PgPool, Postgres, QueryBuilder, Transaction};
use uuid::Uuid;

use crate::domain::model::{Message, MessageListQuery, MessageStatus, NewMessage};
use crate::domain::repository::{MessageQueryRepository, MessageStore, StorageTransaction};

const MESSAGE_COLUMNS: &str = "id, sender, receiver, content, status, created_at, updated_at";

#[derive(Debug, sqlx::FromRow)]
struct MessageRow {
    id: Uuid,
    sender: String,
    receiver: String,
    content: String,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<MessageRow> for Message {
    type Error = CourierError;

    fn try_from(row: MessageRow) -> Result<Self> {
        let status = row
            .status
            .parse::<MessageStatus>()
            .map_err(|err| CourierError::internal(err.to_string()))?;
        Ok(Message {
            id: row.id,
            sender: row.sender,
            receiver: row.receiver,
            content: row.content,
            status,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// PostgreSQL 消息存储
pub struct PostgresMessageStore {
    pool: PgPool,
}

impl PostgresMessageStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MessageStore for PostgresMessageStore {
    async fn begin(&self) -> Result<Box<dyn StorageTransaction>> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|err| map_sqlx_error(err, "failed to begin storage transaction"))?;
        Ok(Box::new(PostgresStorageTransaction { tx }))
    }
}

struct PostgresStorageTransaction {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl StorageTransaction for PostgresStorageTransaction {
    async fn insert(&mut self, message: &NewMessage) -> Result<Message> {
        let sql = format!(
            "INSERT INTO messages (id, sender, receiver, content, status) \
             VALUES ($1, $2, $3, $4, $5) RETURNING {MESSAGE_COLUMNS}"
        );
        let row: MessageRow = sqlx::query_as(&sql)
            .bind(message.id)
            .bind(&message.sender)
            .bind(&message.receiver)
            .bind(&message.content)
            .bind(MessageStatus::Sent.as_str())
            .fetch_one(&mut *self.tx)
            .await
            .map_err(|err| map_sqlx_error(err, "failed to insert message"))?;
        row.try_into()
    }

    async fn bulk_insert(&mut self, messages: &[NewMessage]) -> Result<Vec<Message>> {
        if messages.is_empty() {
            return Ok(Vec::new());
        }

        let mut builder: QueryBuilder<Postgres> =
            QueryBuilder::new("INSERT INTO messages (id, sender, receiver, content, status) ");
        builder.push_values(messages, |mut row, message| {
            row.push_bind(message.id)
                .push_bind(message.sender.clone())
                .push_bind(message.receiver.clone())
                .push_bind(message.content.clone())
                .push_bind(MessageStatus::Sent.as_str());
        });
        builder.push(" RETURNING ");
        builder.push(MESSAGE_COLUMNS);

        let rows: Vec<MessageRow> = builder
            .build_query_as::<MessageRow>()
            .fetch_all(&mut *self.tx)
            .await
            .map_err(|err| map_sqlx_error(err, "failed to bulk insert messages"))?;

        // RETURNING 不保证顺序，按输入顺序重排
        let mut by_id: HashMap<Uuid, MessageRow> =
            rows.into_iter().map(|row| (row.id, row)).collect();
        messages
            .iter()
            .map(|message| {
                by_id
                    .remove(&message.id)
                    .ok_or_else(|| CourierError::storage("bulk insert returned fewer rows"))
                    .and_then(Message::try_from)
            })
            .collect()
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.tx
            .commit()
            .await
            .map_err(|err| map_sqlx_error(err, "failed to commit storage transaction"))
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.tx
            .rollback()
            .await
            .map_err(|err| map_sqlx_error(err, "failed to roll back storage transaction"))
    }
}

/// PostgreSQL 消息查询仓储
pub struct PostgresMessageQueryRepository {
    pool: PgPool,
}

impl PostgresMessageQueryRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MessageQueryRepository for PostgresMessageQueryRepository {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Message>> {
        let sql = format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = $1");
        let row: Option<MessageRow> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|err| map_sqlx_error(err, "failed to fetch message"))?;
        row.map(Message::try_from).transpose()
    }

    async fn find_all(&self, query: &MessageListQuery) -> Result<Vec<Message>> {
        // 排序列来自白名单枚举
        let sql = format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages ORDER BY {} {}, id {} LIMIT $1 OFFSET $2",
            query.sort_by.column(),
            query.sort_order.as_sql(),
            query.sort_order.as_sql(),
        );
        let rows: Vec<MessageRow> = sqlx::query_as(&sql)
            .bind(i64::from(query.limit))
            .bind(i64::try_from(query.offset).unwrap_or(i64::MAX))
            .fetch_all(&self.pool)
            .await
            .map_err(|err| map_sqlx_error(err, "failed to list messages"))?;
        rows.into_iter().map(Message::try_from).collect()
    }
}
