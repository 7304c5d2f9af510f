use crate::{
    account::PublicUser,
    db,
    error::{ApiError, ApiResult},
    notifications::{Notification, NotificationType, RelatedPost},
};
use chrono::Utc;
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};

/// Notification store
pub struct NotificationManager {
    db: SqlitePool,
}

impl NotificationManager {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Record a notification for `recipient`
    pub async fn create(
        &self,
        recipient: &str,
        notification_type: NotificationType,
        related_user: Option<&str>,
        related_post: Option<&str>,
    ) -> ApiResult<String> {
        let id = db::new_id();
        sqlx::query(
            "INSERT INTO notifications (id, recipient_id, type, related_user_id, related_post_id,
                read, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6)",
        )
        .bind(&id)
        .bind(recipient)
        .bind(notification_type.as_str())
        .bind(related_user)
        .bind(related_post)
        .bind(Utc::now())
        .execute(&self.db)
        .await?;

        tracing::debug!(
            "Notification {} ({}) for {}",
            id,
            notification_type.as_str(),
            recipient
        );
        Ok(id)
    }

    /// Record a notification about an action that already went through.
    /// Failures are logged, never returned.
    pub async fn notify(
        &self,
        recipient: &str,
        notification_type: NotificationType,
        related_user: Option<&str>,
        related_post: Option<&str>,
    ) {
        if let Err(e) = self
            .create(recipient, notification_type, related_user, related_post)
            .await
        {
            tracing::warn!(
                "Failed to record {} notification for {}: {}",
                notification_type.as_str(),
                recipient,
                e
            );
        }
    }

    /// [`notify`](Self::notify) unless the same notification exists already
    pub async fn notify_once(
        &self,
        recipient: &str,
        notification_type: NotificationType,
        related_user: &str,
        related_post: &str,
    ) {
        match self
            .exists(recipient, notification_type, related_user, related_post)
            .await
        {
            Ok(true) => {}
            Ok(false) => {
                self.notify(recipient, notification_type, Some(related_user), Some(related_post))
                    .await
            }
            Err(e) => tracing::warn!(
                "Failed to look up {} notification for {}: {}",
                notification_type.as_str(),
                recipient,
                e
            ),
        }
    }

    /// Whether a matching notification was already recorded
    pub async fn exists(
        &self,
        recipient: &str,
        notification_type: NotificationType,
        related_user: &str,
        related_post: &str,
    ) -> ApiResult<bool> {
        let found = sqlx::query(
            "SELECT 1 FROM notifications
             WHERE recipient_id = ?1 AND type = ?2 AND related_user_id = ?3 AND related_post_id = ?4
             LIMIT 1",
        )
        .bind(recipient)
        .bind(notification_type.as_str())
        .bind(related_user)
        .bind(related_post)
        .fetch_optional(&self.db)
        .await?;
        Ok(found.is_some())
    }

    /// The recipient's notifications, newest first
    pub async fn list_for(&self, recipient: &str) -> ApiResult<Vec<Notification>> {
        let sql = format!("{} WHERE n.recipient_id = ?1 ORDER BY n.created_at DESC", select_sql());
        let rows = sqlx::query(&sql).bind(recipient).fetch_all(&self.db).await?;
        rows.iter().map(notification_from_row).collect()
    }

    /// Mark one of the recipient's notifications as read
    pub async fn mark_read(&self, id: &str, recipient: &str) -> ApiResult<Notification> {
        let updated = sqlx::query("UPDATE notifications SET read = 1 WHERE id = ?1 AND recipient_id = ?2")
            .bind(id)
            .bind(recipient)
            .execute(&self.db)
            .await?
            .rows_affected();
        if updated == 0 {
            return Err(not_found());
        }

        let sql = format!("{} WHERE n.id = ?1", select_sql());
        let row = sqlx::query(&sql).bind(id).fetch_one(&self.db).await?;
        notification_from_row(&row)
    }

    /// Delete one of the recipient's notifications
    pub async fn delete(&self, id: &str, recipient: &str) -> ApiResult<()> {
        let deleted = sqlx::query("DELETE FROM notifications WHERE id = ?1 AND recipient_id = ?2")
            .bind(id)
            .bind(recipient)
            .execute(&self.db)
            .await?
            .rows_affected();
        if deleted == 0 {
            return Err(not_found());
        }
        Ok(())
    }
}

fn not_found() -> ApiError {
    ApiError::NotFound("Notification not found".to_string())
}

fn select_sql() -> String {
    format!(
        "SELECT n.id, n.recipient_id, n.type, n.read, n.created_at, {},
                p.id AS post_ref_id, p.content AS post_ref_content, p.kind AS post_ref_kind
         FROM notifications n
         LEFT JOIN users u ON u.id = n.related_user_id
         LEFT JOIN posts p ON p.id = n.related_post_id",
        PublicUser::columns("u", "related_user_")
    )
}

fn notification_from_row(row: &SqliteRow) -> ApiResult<Notification> {
    let raw_type: String = row.try_get("type")?;
    let notification_type = NotificationType::parse(&raw_type)
        .ok_or_else(|| ApiError::Internal(format!("Unknown notification type {}", raw_type)))?;

    let post_id: Option<String> = row.try_get("post_ref_id")?;
    let related_post = match post_id {
        Some(id) => Some(RelatedPost {
            id,
            content: row.try_get("post_ref_content")?,
            kind: row.try_get("post_ref_kind")?,
        }),
        None => None,
    };

    Ok(Notification {
        id: row.try_get("id")?,
        recipient: row.try_get("recipient_id")?,
        notification_type,
        related_user: PublicUser::from_prefixed_opt(row, "related_user_")?,
        related_post,
        read: row.try_get("read")?,
        created_at: row.try_get("created_at")?,
    })
}
