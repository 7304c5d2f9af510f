use crate::{
    account::PublicUser,
    db::{self, Pagination},
    error::{ApiError, ApiResult},
    notifications::{NotificationManager, NotificationType},
    social::{ConnectionRequest, ConnectionStatus, RequestPage, RequestStatus},
};
use chrono::Utc;
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use std::sync::Arc;

/// Connection requests and the connection set
pub struct ConnectionManager {
    db: SqlitePool,
    notifications: Arc<NotificationManager>,
}

impl ConnectionManager {
    pub fn new(db: SqlitePool, notifications: Arc<NotificationManager>) -> Self {
        Self { db, notifications }
    }

    /// Ask `recipient` to connect with `sender`
    pub async fn send_request(&self, sender: &str, recipient: &str) -> ApiResult<ConnectionRequest> {
        if sender == recipient {
            return Err(ApiError::Authorization(
                "You can't send a connection request to yourself".to_string(),
            ));
        }

        let target: Option<(String,)> = sqlx::query_as("SELECT id FROM users WHERE id = ?1")
            .bind(recipient)
            .fetch_optional(&self.db)
            .await?;
        if target.is_none() {
            return Err(ApiError::NotFound("User not found".to_string()));
        }

        if self.are_connected(sender, recipient).await? {
            return Err(ApiError::Authorization("You are already connected".to_string()));
        }

        let id = db::new_id();
        let now = Utc::now();
        sqlx::query(
            "INSERT INTO connection_requests (id, sender_id, recipient_id, status, created_at, updated_at)
             VALUES (?1, ?2, ?3, 'pending', ?4, ?4)",
        )
        .bind(&id)
        .bind(sender)
        .bind(recipient)
        .bind(now)
        .execute(&self.db)
        .await
        .map_err(|e| match ApiError::duplicate_or(e, "") {
            ApiError::Validation(_) => {
                ApiError::Authorization("A connection request already exists".to_string())
            }
            other => other,
        })?;

        tracing::info!("Connection request {} from {} to {}", id, sender, recipient);
        self.get_request(&id).await
    }

    /// Accept a pending request addressed to `caller`.
    ///
    /// Both directions of the connection are stored and the sender is
    /// notified.
    pub async fn accept(&self, request_id: &str, caller: &str) -> ApiResult<ConnectionRequest> {
        let request = self.answerable(request_id, caller).await?;
        let now = Utc::now();

        let mut tx = self.db.begin().await?;
        sqlx::query("UPDATE connection_requests SET status = 'accepted', updated_at = ?2 WHERE id = ?1")
            .bind(request_id)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        for (a, b) in [
            (&request.sender.id, &request.recipient.id),
            (&request.recipient.id, &request.sender.id),
        ] {
            sqlx::query(
                "INSERT OR IGNORE INTO user_connections (user_id, connection_id, created_at)
                 VALUES (?1, ?2, ?3)",
            )
            .bind(a)
            .bind(b)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        self.notifications
            .notify(
                &request.sender.id,
                NotificationType::ConnectionAccepted,
                Some(&request.recipient.id),
                None,
            )
            .await;

        tracing::info!(
            "{} accepted connection request from {}",
            request.recipient.id,
            request.sender.id
        );
        self.get_request(request_id).await
    }

    /// Reject a pending request addressed to `caller`
    pub async fn reject(&self, request_id: &str, caller: &str) -> ApiResult<ConnectionRequest> {
        self.answerable(request_id, caller).await?;

        sqlx::query("UPDATE connection_requests SET status = 'rejected', updated_at = ?2 WHERE id = ?1")
            .bind(request_id)
            .bind(Utc::now())
            .execute(&self.db)
            .await?;

        self.get_request(request_id).await
    }

    /// Pending requests received by `user_id`, newest first
    pub async fn pending_requests(&self, user_id: &str, page: Pagination) -> ApiResult<RequestPage> {
        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM connection_requests WHERE recipient_id = ?1 AND status = 'pending'",
        )
        .bind(user_id)
        .fetch_one(&self.db)
        .await?;

        let sql = format!(
            "{} WHERE r.recipient_id = ?1 AND r.status = 'pending'
             ORDER BY r.created_at DESC LIMIT ?2 OFFSET ?3",
            request_select()
        );
        let rows = sqlx::query(&sql)
            .bind(user_id)
            .bind(page.limit)
            .bind(page.offset())
            .fetch_all(&self.db)
            .await?;

        Ok(RequestPage {
            requests: rows.iter().map(request_from_row).collect::<ApiResult<_>>()?,
            current_page: page.page,
            total_pages: page.total_pages(total),
            total,
        })
    }

    /// Users connected to `user_id`
    pub async fn connections(&self, user_id: &str) -> ApiResult<Vec<PublicUser>> {
        let sql = format!(
            "SELECT {} FROM user_connections c
             JOIN users u ON u.id = c.connection_id
             WHERE c.user_id = ?1
             ORDER BY c.created_at",
            PublicUser::columns("u", "")
        );
        let rows = sqlx::query(&sql).bind(user_id).fetch_all(&self.db).await?;
        rows.iter()
            .map(|row| PublicUser::from_prefixed(row, "").map_err(ApiError::from))
            .collect()
    }

    /// Drop the connection between two users, both directions
    pub async fn remove(&self, user_id: &str, other_id: &str) -> ApiResult<()> {
        sqlx::query(
            "DELETE FROM user_connections
             WHERE (user_id = ?1 AND connection_id = ?2) OR (user_id = ?2 AND connection_id = ?1)",
        )
        .bind(user_id)
        .bind(other_id)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    /// How `caller` relates to `other`
    pub async fn status(&self, caller: &str, other: &str) -> ApiResult<ConnectionStatus> {
        if self.are_connected(caller, other).await? {
            return Ok(ConnectionStatus::Connected);
        }

        let pending = sqlx::query(
            "SELECT id, sender_id FROM connection_requests
             WHERE status = 'pending'
               AND ((sender_id = ?1 AND recipient_id = ?2) OR (sender_id = ?2 AND recipient_id = ?1))
             ORDER BY created_at DESC LIMIT 1",
        )
        .bind(caller)
        .bind(other)
        .fetch_optional(&self.db)
        .await?;

        Ok(match pending {
            Some(row) => {
                let sender: String = row.get("sender_id");
                if sender == caller {
                    ConnectionStatus::Pending
                } else {
                    ConnectionStatus::Received {
                        request_id: row.get("id"),
                    }
                }
            }
            None => ConnectionStatus::NotConnected,
        })
    }

    pub async fn are_connected(&self, a: &str, b: &str) -> ApiResult<bool> {
        let found = sqlx::query(
            "SELECT 1 FROM user_connections WHERE user_id = ?1 AND connection_id = ?2",
        )
        .bind(a)
        .bind(b)
        .fetch_optional(&self.db)
        .await?;
        Ok(found.is_some())
    }

    pub async fn get_request(&self, id: &str) -> ApiResult<ConnectionRequest> {
        let sql = format!("{} WHERE r.id = ?1", request_select());
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| ApiError::NotFound("Connection request not found".to_string()))?;
        request_from_row(&row)
    }

    /// Load a request `caller` may answer: addressed to them and pending
    async fn answerable(&self, request_id: &str, caller: &str) -> ApiResult<ConnectionRequest> {
        let request = self.get_request(request_id).await?;

        if request.recipient.id != caller {
            return Err(ApiError::Authorization(
                "Not authorized to answer this request".to_string(),
            ));
        }
        if request.status != RequestStatus::Pending {
            return Err(ApiError::Validation(
                "This request has already been processed".to_string(),
            ));
        }
        Ok(request)
    }
}

fn request_select() -> String {
    format!(
        "SELECT r.id, r.status, r.created_at, r.updated_at, {}, {}
         FROM connection_requests r
         JOIN users s ON s.id = r.sender_id
         JOIN users t ON t.id = r.recipient_id",
        PublicUser::columns("s", "sender_"),
        PublicUser::columns("t", "recipient_")
    )
}

fn request_from_row(row: &SqliteRow) -> ApiResult<ConnectionRequest> {
    let raw_status: String = row.try_get("status")?;
    Ok(ConnectionRequest {
        id: row.try_get("id")?,
        sender: PublicUser::from_prefixed(row, "sender_")?,
        recipient: PublicUser::from_prefixed(row, "recipient_")?,
        status: RequestStatus::parse(&raw_status)
            .ok_or_else(|| ApiError::Internal(format!("Unknown request status {}", raw_status)))?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;

    async fn setup() -> (SqlitePool, ConnectionManager, Arc<NotificationManager>) {
        let pool = db::memory_pool().await.unwrap();
        let notifications = Arc::new(NotificationManager::new(pool.clone()));
        let manager = ConnectionManager::new(pool.clone(), Arc::clone(&notifications));
        (pool, manager, notifications)
    }

    #[tokio::test]
    async fn test_self_request_forbidden() {
        let (pool, manager, _) = setup().await;
        let ana = testing::insert_user(&pool, "ana").await;

        let result = manager.send_request(&ana, &ana).await;
        assert!(matches!(result, Err(ApiError::Authorization(_))));
    }

    #[tokio::test]
    async fn test_duplicate_request_forbidden() {
        let (pool, manager, _) = setup().await;
        let ana = testing::insert_user(&pool, "ana").await;
        let bob = testing::insert_user(&pool, "bob").await;

        manager.send_request(&ana, &bob).await.unwrap();
        let again = manager.send_request(&ana, &bob).await;
        assert!(matches!(again, Err(ApiError::Authorization(_))));

        let missing = manager.send_request(&ana, &db::new_id()).await;
        assert!(matches!(missing, Err(ApiError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_accept_survives_notification_failure() {
        let (pool, manager, _) = setup().await;
        let ana = testing::insert_user(&pool, "ana").await;
        let bob = testing::insert_user(&pool, "bob").await;
        let request = manager.send_request(&ana, &bob).await.unwrap();
        sqlx::query(
            "CREATE TRIGGER reject_notifications BEFORE INSERT ON notifications
             BEGIN SELECT RAISE(ABORT, 'rejected'); END",
        )
        .execute(&pool)
        .await
        .unwrap();

        let accepted = manager.accept(&request.id, &bob).await.unwrap();
        assert_eq!(accepted.status, RequestStatus::Accepted);
        assert_eq!(manager.connections(&ana).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_accept_is_symmetric_and_notifies() {
        let (pool, manager, notifications) = setup().await;
        let ana = testing::insert_user(&pool, "ana").await;
        let bob = testing::insert_user(&pool, "bob").await;

        let request = manager.send_request(&ana, &bob).await.unwrap();

        // only the recipient may answer
        assert!(matches!(
            manager.accept(&request.id, &ana).await,
            Err(ApiError::Authorization(_))
        ));

        let accepted = manager.accept(&request.id, &bob).await.unwrap();
        assert_eq!(accepted.status, RequestStatus::Accepted);

        let ana_connections = manager.connections(&ana).await.unwrap();
        let bob_connections = manager.connections(&bob).await.unwrap();
        assert_eq!(ana_connections.len(), 1);
        assert_eq!(ana_connections[0].id, bob);
        assert_eq!(bob_connections[0].id, ana);

        let notes = notifications.list_for(&ana).await.unwrap();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].notification_type, NotificationType::ConnectionAccepted);

        // answered requests cannot be answered again
        assert!(matches!(
            manager.reject(&request.id, &bob).await,
            Err(ApiError::Validation(_))
        ));

        assert!(matches!(
            manager.send_request(&ana, &bob).await,
            Err(ApiError::Authorization(_))
        ));
    }

    #[tokio::test]
    async fn test_status_and_remove() {
        let (pool, manager, _) = setup().await;
        let ana = testing::insert_user(&pool, "ana").await;
        let bob = testing::insert_user(&pool, "bob").await;

        assert_eq!(manager.status(&ana, &bob).await.unwrap(), ConnectionStatus::NotConnected);

        let request = manager.send_request(&ana, &bob).await.unwrap();
        assert_eq!(manager.status(&ana, &bob).await.unwrap(), ConnectionStatus::Pending);
        assert_eq!(
            manager.status(&bob, &ana).await.unwrap(),
            ConnectionStatus::Received {
                request_id: request.id.clone()
            }
        );

        manager.accept(&request.id, &bob).await.unwrap();
        assert_eq!(manager.status(&bob, &ana).await.unwrap(), ConnectionStatus::Connected);

        manager.remove(&bob, &ana).await.unwrap();
        assert!(!manager.are_connected(&ana, &bob).await.unwrap());
        assert!(!manager.are_connected(&bob, &ana).await.unwrap());
    }

    #[tokio::test]
    async fn test_pending_requests_paginated() {
        let (pool, manager, _) = setup().await;
        let target = testing::insert_user(&pool, "target").await;
        for i in 0..3 {
            let sender = testing::insert_user(&pool, &format!("sender{}", i)).await;
            manager.send_request(&sender, &target).await.unwrap();
        }

        let page = manager
            .pending_requests(&target, Pagination { page: 2, limit: 2 })
            .await
            .unwrap();
        assert_eq!(page.total, 3);
        assert_eq!(page.total_pages, 2);
        assert_eq!(page.current_page, 2);
        assert_eq!(page.requests.len(), 1);
    }
}
