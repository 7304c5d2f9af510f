/// Background task implementations
use crate::{context::AppContext, db, error::ApiResult};

/// Clear expired verification codes and password reset tokens
pub async fn purge_expired_tokens(ctx: &AppContext) -> ApiResult<u64> {
    ctx.account_manager.purge_expired_tokens().await
}

/// Verify the database answers
pub async fn health_check(ctx: &AppContext) -> ApiResult<()> {
    db::test_connection(&ctx.db).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_purge_clears_only_expired_tokens() {
        let dir = TempDir::new().unwrap();
        let ctx = AppContext::for_tests(dir.path().to_path_buf()).await.unwrap();
        let stale = crate::testing::insert_user(&ctx.db, "stale").await;
        let fresh = crate::testing::insert_user(&ctx.db, "fresh").await;

        for (user, expires) in [
            (&stale, Utc::now() - Duration::minutes(1)),
            (&fresh, Utc::now() + Duration::minutes(30)),
        ] {
            sqlx::query(
                "UPDATE users SET verification_token = '123456', verification_token_expires_at = ?2
                 WHERE id = ?1",
            )
            .bind(user)
            .bind(expires)
            .execute(&ctx.db)
            .await
            .unwrap();
        }

        assert_eq!(purge_expired_tokens(&ctx).await.unwrap(), 1);
        health_check(&ctx).await.unwrap();

        let remaining: Vec<String> = sqlx::query_scalar(
            "SELECT id FROM users WHERE verification_token IS NOT NULL",
        )
        .fetch_all(&ctx.db)
        .await
        .unwrap();
        assert_eq!(remaining, vec![fresh]);
    }
}
