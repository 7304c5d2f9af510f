use crate::{
    account::PublicUser,
    db,
    error::{ApiError, ApiResult},
    messaging::{ordered_pair, Conversation, Message},
    notifications::{NotificationManager, NotificationType},
};
use chrono::Utc;
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use std::sync::Arc;

pub struct MessageManager {
    db: SqlitePool,
    notifications: Arc<NotificationManager>,
}

impl MessageManager {
    pub fn new(db: SqlitePool, notifications: Arc<NotificationManager>) -> Self {
        Self { db, notifications }
    }

    /// Deliver a message from `sender` to `receiver`.
    ///
    /// `conversation_id` is honoured only when it is the pair's own
    /// conversation; otherwise the pair's conversation is found or created.
    pub async fn send(
        &self,
        sender: &str,
        receiver: &str,
        content: &str,
        conversation_id: Option<&str>,
    ) -> ApiResult<Conversation> {
        let content = content.trim();
        if content.is_empty() {
            return Err(ApiError::Validation("Message content is required".to_string()));
        }
        if sender == receiver {
            return Err(ApiError::Validation(
                "You can't send a message to yourself".to_string(),
            ));
        }

        let exists: Option<(String,)> = sqlx::query_as("SELECT id FROM users WHERE id = ?1")
            .bind(receiver)
            .fetch_optional(&self.db)
            .await?;
        if exists.is_none() {
            return Err(ApiError::NotFound("Receiver not found".to_string()));
        }

        let (a, b) = ordered_pair(sender, receiver);
        let given = match conversation_id {
            Some(id) => {
                let found: Option<(String,)> = sqlx::query_as(
                    "SELECT id FROM conversations WHERE id = ?1 AND participant_a = ?2 AND participant_b = ?3",
                )
                .bind(id)
                .bind(a)
                .bind(b)
                .fetch_optional(&self.db)
                .await?;
                found.map(|(id,)| id)
            }
            None => None,
        };

        let now = Utc::now();
        let conversation_id = match given {
            Some(id) => id,
            None => {
                sqlx::query(
                    "INSERT OR IGNORE INTO conversations (id, participant_a, participant_b, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?4)",
                )
                .bind(db::new_id())
                .bind(a)
                .bind(b)
                .bind(now)
                .execute(&self.db)
                .await?;
                sqlx::query_scalar(
                    "SELECT id FROM conversations WHERE participant_a = ?1 AND participant_b = ?2",
                )
                .bind(a)
                .bind(b)
                .fetch_one(&self.db)
                .await?
            }
        };

        let mut tx = self.db.begin().await?;
        sqlx::query(
            "INSERT INTO messages (id, conversation_id, sender_id, receiver_id, content, status,
                is_deleted, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, 'sent', 0, ?6)",
        )
        .bind(db::new_id())
        .bind(&conversation_id)
        .bind(sender)
        .bind(receiver)
        .bind(content)
        .bind(now)
        .execute(&mut *tx)
        .await?;
        sqlx::query("UPDATE conversations SET updated_at = ?2 WHERE id = ?1")
            .bind(&conversation_id)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        self.notifications
            .notify(receiver, NotificationType::Message, Some(sender), None)
            .await;

        self.get(&conversation_id).await
    }

    /// Conversations `user_id` takes part in, most recently active first
    pub async fn conversations_for(&self, user_id: &str) -> ApiResult<Vec<Conversation>> {
        let ids: Vec<String> = sqlx::query_scalar(
            "SELECT id FROM conversations
             WHERE participant_a = ?1 OR participant_b = ?1
             ORDER BY updated_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.db)
        .await?;

        let mut conversations = Vec::with_capacity(ids.len());
        for id in ids {
            conversations.push(self.get(&id).await?);
        }
        Ok(conversations)
    }

    /// Flag a message deleted. Only its sender, or an admin, may do so.
    pub async fn delete_message(
        &self,
        conversation_id: &str,
        message_id: &str,
        caller: &str,
        caller_is_admin: bool,
    ) -> ApiResult<()> {
        let conversation: Option<(String,)> = sqlx::query_as("SELECT id FROM conversations WHERE id = ?1")
            .bind(conversation_id)
            .fetch_optional(&self.db)
            .await?;
        if conversation.is_none() {
            return Err(ApiError::NotFound("Conversation not found".to_string()));
        }

        let sender: Option<String> = sqlx::query_scalar(
            "SELECT sender_id FROM messages WHERE id = ?1 AND conversation_id = ?2",
        )
        .bind(message_id)
        .bind(conversation_id)
        .fetch_optional(&self.db)
        .await?;
        let sender = sender.ok_or_else(|| ApiError::NotFound("Message not found".to_string()))?;

        if sender != caller && !caller_is_admin {
            return Err(ApiError::Authorization(
                "You can only delete your own messages".to_string(),
            ));
        }

        sqlx::query("UPDATE messages SET is_deleted = 1 WHERE id = ?1")
            .bind(message_id)
            .execute(&self.db)
            .await?;

        tracing::info!("Message {} deleted by {}", message_id, caller);
        Ok(())
    }

    pub async fn get(&self, id: &str) -> ApiResult<Conversation> {
        let sql = format!(
            "SELECT c.id, c.created_at, c.updated_at, {}, {}
             FROM conversations c
             JOIN users a ON a.id = c.participant_a
             JOIN users b ON b.id = c.participant_b
             WHERE c.id = ?1",
            PublicUser::columns("a", "a_"),
            PublicUser::columns("b", "b_")
        );
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| ApiError::NotFound("Conversation not found".to_string()))?;

        let messages = sqlx::query(
            "SELECT id, sender_id, receiver_id, content, status, is_deleted, created_at
             FROM messages WHERE conversation_id = ?1
             ORDER BY created_at, rowid",
        )
        .bind(id)
        .fetch_all(&self.db)
        .await?
        .iter()
        .map(message_from_row)
        .collect::<ApiResult<Vec<_>>>()?;

        Ok(Conversation {
            id: row.try_get("id")?,
            participants: vec![
                PublicUser::from_prefixed(&row, "a_")?,
                PublicUser::from_prefixed(&row, "b_")?,
            ],
            messages,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

fn message_from_row(row: &SqliteRow) -> ApiResult<Message> {
    let is_deleted: bool = row.try_get("is_deleted")?;
    Ok(Message {
        id: row.try_get("id")?,
        sender: row.try_get("sender_id")?,
        receiver: row.try_get("receiver_id")?,
        content: if is_deleted {
            String::new()
        } else {
            row.try_get("content")?
        },
        status: row.try_get("status")?,
        is_deleted,
        created_at: row.try_get("created_at")?,
    })
}
