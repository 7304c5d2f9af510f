/// Share counters and share records
use crate::{
    account::PublicUser,
    db,
    error::{ApiError, ApiResult},
    feed::{FeedManager, Share, SharePlatform},
};
use chrono::Utc;
use sqlx::{Row, SqliteConnection};
use std::collections::BTreeMap;

impl FeedManager {
    /// Bump the per-platform counter and return all counters
    pub async fn increment_share(&self, post_id: &str, platform: SharePlatform) -> ApiResult<BTreeMap<String, i64>> {
        self.author_of(post_id).await?;

        let mut conn = self.db.acquire().await?;
        bump_counter(&mut conn, post_id, platform).await?;
        drop(conn);

        self.share_counts(post_id).await
    }

    /// Record that `user_id` shared a publication on `platform`; each
    /// (publication, user, platform) is recorded once.
    pub async fn record_share(&self, post_id: &str, user_id: &str, platform: SharePlatform) -> ApiResult<Share> {
        self.author_of(post_id).await?;

        let id = db::new_id();
        let mut tx = self.db.begin().await?;
        sqlx::query(
            "INSERT INTO shares (id, post_id, user_id, platform, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(&id)
        .bind(post_id)
        .bind(user_id)
        .bind(platform.as_str())
        .bind(Utc::now())
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            ApiError::duplicate_or(e, "You have already shared this post on this platform")
        })?;
        bump_counter(&mut tx, post_id, platform).await?;
        tx.commit().await?;

        tracing::debug!("{} shared {} on {}", user_id, post_id, platform.as_str());

        self.shares_for(post_id)
            .await?
            .into_iter()
            .find(|s| s.id == id)
            .ok_or_else(|| ApiError::Internal("Share vanished after insert".to_string()))
    }

    /// Recorded shares of a publication, newest first
    pub async fn shares_for(&self, post_id: &str) -> ApiResult<Vec<Share>> {
        let sql = format!(
            "SELECT s.id, s.post_id, s.platform, s.created_at, {}
             FROM shares s JOIN users u ON u.id = s.user_id
             WHERE s.post_id = ?1
             ORDER BY s.created_at DESC",
            PublicUser::columns("u", "user_")
        );
        let rows = sqlx::query(&sql).bind(post_id).fetch_all(&self.db).await?;

        rows.iter()
            .map(|row| {
                let platform: String = row.try_get("platform")?;
                Ok(Share {
                    id: row.try_get("id")?,
                    post: row.try_get("post_id")?,
                    user: PublicUser::from_prefixed(row, "user_")?,
                    platform: SharePlatform::parse(&platform)?,
                    created_at: row.try_get("created_at")?,
                })
            })
            .collect()
    }

    async fn share_counts(&self, post_id: &str) -> ApiResult<BTreeMap<String, i64>> {
        let counts = sqlx::query_as::<_, (String, i64)>(
            "SELECT platform, count FROM post_share_counts WHERE post_id = ?1",
        )
        .bind(post_id)
        .fetch_all(&self.db)
        .await?;
        Ok(counts.into_iter().collect())
    }
}

async fn bump_counter(conn: &mut SqliteConnection, post_id: &str, platform: SharePlatform) -> ApiResult<()> {
    sqlx::query(
        "INSERT INTO post_share_counts (post_id, platform, count) VALUES (?1, ?2, 1)
         ON CONFLICT (post_id, platform) DO UPDATE SET count = count + 1",
    )
    .bind(post_id)
    .bind(platform.as_str())
    .execute(conn)
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{feed::manager::tests::fixture, feed::FeedUploads, testing};

    #[tokio::test]
    async fn test_increment_share_counter() {
        let f = fixture().await;
        let ana = testing::insert_user(&f.pool, "ana").await;
        let panneau = f.panneaux.create(&ana, "Annonce", FeedUploads::default()).await.unwrap();

        f.panneaux
            .increment_share(&panneau.id, SharePlatform::Whatsapp)
            .await
            .unwrap();
        let counts = f
            .panneaux
            .increment_share(&panneau.id, SharePlatform::Whatsapp)
            .await
            .unwrap();
        assert_eq!(counts.get("whatsapp"), Some(&2));

        let missing = f.panneaux.increment_share(&db::new_id(), SharePlatform::Email).await;
        assert!(matches!(missing, Err(ApiError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_record_share_once_per_platform() {
        let f = fixture().await;
        let ana = testing::insert_user(&f.pool, "ana").await;
        let bob = testing::insert_user(&f.pool, "bob").await;
        let post = f.posts.create(&ana, "Hello", FeedUploads::default()).await.unwrap();

        let share = f
            .posts
            .record_share(&post.id, &bob, SharePlatform::Linkedin)
            .await
            .unwrap();
        assert_eq!(share.user.id, bob);

        let again = f.posts.record_share(&post.id, &bob, SharePlatform::Linkedin).await;
        assert!(matches!(again, Err(ApiError::Validation(_))));

        f.posts
            .record_share(&post.id, &bob, SharePlatform::Email)
            .await
            .unwrap();

        let shares = f.posts.shares_for(&post.id).await.unwrap();
        assert_eq!(shares.len(), 2);
        assert_eq!(shares[0].platform, SharePlatform::Email);

        let counts = f.posts.get(&post.id).await.unwrap().shares;
        assert_eq!(counts.get("linkedin"), Some(&1));
        assert_eq!(counts.get("email"), Some(&1));
    }
}
