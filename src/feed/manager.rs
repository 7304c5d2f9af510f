use crate::{
    account::PublicUser,
    db::{self, Pagination},
    error::{ApiError, ApiResult},
    feed::{Comment, FeedKind, FeedPage, FeedUpdate, FeedUploads, LikeOutcome, Post, Reply},
    media::{MediaKind, MediaStore, UploadedMedia},
    notifications::{NotificationManager, NotificationType},
};
use chrono::Utc;
use sqlx::{sqlite::SqliteRow, Row, SqliteConnection, SqlitePool};
use std::{collections::BTreeMap, sync::Arc};

/// Posts or panneaux, depending on `kind`
pub struct FeedManager {
    pub(super) db: SqlitePool,
    pub(super) kind: FeedKind,
    pub(super) notifications: Arc<NotificationManager>,
    pub(super) media: Arc<MediaStore>,
}

impl FeedManager {
    pub fn new(
        db: SqlitePool,
        kind: FeedKind,
        notifications: Arc<NotificationManager>,
        media: Arc<MediaStore>,
    ) -> Self {
        Self {
            db,
            kind,
            notifications,
            media,
        }
    }

    pub fn kind(&self) -> FeedKind {
        self.kind
    }

    /// Publish with optional media. Files are uploaded before anything is
    /// written; if the write fails they are removed again.
    pub async fn create(&self, author: &str, content: &str, uploads: FeedUploads) -> ApiResult<Post> {
        let content = content.trim();
        if content.is_empty() {
            return Err(ApiError::Validation("Content is required".to_string()));
        }

        let uploaded = match uploads.single_category(self.kind)? {
            Some((kind, files)) => self.media.upload_all(&files, &[kind], self.kind.folder()).await?,
            None => Vec::new(),
        };

        let id = db::new_id();
        if let Err(e) = self.insert(&id, author, content, &uploaded).await {
            self.media.discard(&uploaded).await;
            return Err(e);
        }

        tracing::info!("{} {} created by {}", self.kind.label(), id, author);
        self.get(&id).await
    }

    async fn insert(&self, id: &str, author: &str, content: &str, media: &[UploadedMedia]) -> ApiResult<()> {
        let now = Utc::now();
        let mut tx = self.db.begin().await?;
        sqlx::query(
            "INSERT INTO posts (id, kind, author_id, content, search_text, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
        )
        .bind(id)
        .bind(self.kind.as_str())
        .bind(author)
        .bind(content)
        .bind(db::search_text(content))
        .bind(now)
        .execute(&mut *tx)
        .await?;

        insert_media(&mut tx, id, media, 0).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Newest first, optionally filtered by a case-insensitive substring
    pub async fn feed(&self, page: Pagination, search: Option<&str>) -> ApiResult<FeedPage> {
        let pattern = search
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(db::contains_pattern);

        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM posts
             WHERE kind = ?1 AND (?2 IS NULL OR search_text LIKE ?2 ESCAPE '\\')",
        )
        .bind(self.kind.as_str())
        .bind(&pattern)
        .fetch_one(&self.db)
        .await?;

        let sql = format!(
            "{} WHERE p.kind = ?1 AND (?2 IS NULL OR p.search_text LIKE ?2 ESCAPE '\\')
             ORDER BY p.created_at DESC LIMIT ?3 OFFSET ?4",
            post_select()
        );
        let rows = sqlx::query(&sql)
            .bind(self.kind.as_str())
            .bind(&pattern)
            .bind(page.limit)
            .bind(page.offset())
            .fetch_all(&self.db)
            .await?;

        let mut items = Vec::with_capacity(rows.len());
        for row in &rows {
            items.push(self.assemble(row).await?);
        }

        Ok(FeedPage {
            items,
            current_page: page.page,
            total_pages: page.total_pages(total),
            total,
        })
    }

    /// One publication with every relation populated
    pub async fn get(&self, id: &str) -> ApiResult<Post> {
        let sql = format!("{} WHERE p.id = ?1 AND p.kind = ?2", post_select());
        let row = sqlx::query(&sql)
            .bind(id)
            .bind(self.kind.as_str())
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| self.not_found())?;
        self.assemble(&row).await
    }

    /// Author-only edit of content and media
    pub async fn update(&self, id: &str, caller: &str, update: FeedUpdate) -> ApiResult<Post> {
        let post = self.get(id).await?;
        if post.author.id != caller {
            return Err(ApiError::Authorization(format!(
                "You are not allowed to edit this {}",
                self.kind.as_str()
            )));
        }

        let content = update.content.trim();
        if content.is_empty() {
            return Err(ApiError::Validation("Content is required".to_string()));
        }

        let drop_images = update.remove_media || update.image.is_some();
        let drop_videos = update.remove_video || update.video.is_some();
        let removed: Vec<UploadedMedia> = post
            .media
            .iter()
            .filter(|m| match m.media_type {
                MediaKind::Image => drop_images,
                MediaKind::Video => drop_videos,
                MediaKind::Pdf => false,
            })
            .cloned()
            .collect();

        let mut added = Vec::new();
        if let Some(image) = &update.image {
            added.push(self.media.upload(image, &[MediaKind::Image], self.kind.folder()).await?);
        }
        if let Some(video) = &update.video {
            match self.media.upload(video, &[MediaKind::Video], self.kind.folder()).await {
                Ok(media) => added.push(media),
                Err(e) => {
                    self.media.discard(&added).await;
                    return Err(e);
                }
            }
        }

        let write = async {
            let mut tx = self.db.begin().await?;
            for media in &removed {
                sqlx::query("DELETE FROM post_media WHERE post_id = ?1 AND public_id = ?2")
                    .bind(id)
                    .bind(&media.public_id)
                    .execute(&mut *tx)
                    .await?;
            }
            let next_position: i64 = sqlx::query_scalar(
                "SELECT COALESCE(MAX(position) + 1, 0) FROM post_media WHERE post_id = ?1",
            )
            .bind(id)
            .fetch_one(&mut *tx)
            .await?;
            insert_media(&mut tx, id, &added, next_position).await?;
            sqlx::query(
                "UPDATE posts SET content = ?2, search_text = ?3, updated_at = ?4 WHERE id = ?1",
            )
            .bind(id)
            .bind(content)
            .bind(db::search_text(content))
            .bind(Utc::now())
            .execute(&mut *tx)
            .await?;
            tx.commit().await?;
            Ok::<_, ApiError>(())
        };
        if let Err(e) = write.await {
            self.media.discard(&added).await;
            return Err(e);
        }

        self.media.discard(&removed).await;
        self.get(id).await
    }

    /// Author-only delete; hosted media goes first, best-effort
    pub async fn delete(&self, id: &str, caller: &str) -> ApiResult<()> {
        let post = self.get(id).await?;
        if post.author.id != caller {
            return Err(ApiError::Authorization(format!(
                "You are not allowed to delete this {}",
                self.kind.as_str()
            )));
        }

        self.media.discard(&post.media).await;

        sqlx::query("DELETE FROM posts WHERE id = ?1")
            .bind(id)
            .execute(&self.db)
            .await?;

        tracing::info!("{} {} deleted by {}", self.kind.label(), id, caller);
        Ok(())
    }

    /// Like if not yet liked, unlike otherwise
    pub async fn toggle_like(&self, id: &str, user_id: &str) -> ApiResult<LikeOutcome> {
        let author_id = self.author_of(id).await?;

        let removed = sqlx::query("DELETE FROM post_likes WHERE post_id = ?1 AND user_id = ?2")
            .bind(id)
            .bind(user_id)
            .execute(&self.db)
            .await?
            .rows_affected();

        let liked = removed == 0;
        if liked {
            sqlx::query(
                "INSERT OR IGNORE INTO post_likes (post_id, user_id, created_at) VALUES (?1, ?2, ?3)",
            )
            .bind(id)
            .bind(user_id)
            .bind(Utc::now())
            .execute(&self.db)
            .await?;

            if author_id != user_id {
                self.notifications
                    .notify_once(&author_id, NotificationType::Like, user_id, id)
                    .await;
            }
        }

        let likes: Vec<String> = sqlx::query_scalar(
            "SELECT user_id FROM post_likes WHERE post_id = ?1 ORDER BY created_at",
        )
        .bind(id)
        .fetch_all(&self.db)
        .await?;

        Ok(LikeOutcome {
            likes_count: likes.len(),
            likes,
            liked,
        })
    }

    /// Author id of a publication of this kind, or 404
    pub(super) async fn author_of(&self, id: &str) -> ApiResult<String> {
        sqlx::query_scalar("SELECT author_id FROM posts WHERE id = ?1 AND kind = ?2")
            .bind(id)
            .bind(self.kind.as_str())
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| self.not_found())
    }

    pub(super) fn not_found(&self) -> ApiError {
        ApiError::NotFound(format!("{} not found", self.kind.label()))
    }

    /// Load the owned collections of a post row
    async fn assemble(&self, row: &SqliteRow) -> ApiResult<Post> {
        let id: String = row.try_get("id")?;

        let media = sqlx::query(
            "SELECT url, public_id, media_type, duration FROM post_media
             WHERE post_id = ?1 ORDER BY position",
        )
        .bind(&id)
        .fetch_all(&self.db)
        .await?
        .iter()
        .map(media_from_row)
        .collect::<ApiResult<Vec<_>>>()?;

        let likes_sql = format!(
            "SELECT {} FROM post_likes l JOIN users u ON u.id = l.user_id
             WHERE l.post_id = ?1 ORDER BY l.created_at",
            PublicUser::columns("u", "")
        );
        let likes = sqlx::query(&likes_sql)
            .bind(&id)
            .fetch_all(&self.db)
            .await?
            .iter()
            .map(|r| PublicUser::from_prefixed(r, ""))
            .collect::<Result<Vec<_>, _>>()?;

        let comments = self.load_comments(&id).await?;

        let shares: BTreeMap<String, i64> = sqlx::query_as::<_, (String, i64)>(
            "SELECT platform, count FROM post_share_counts WHERE post_id = ?1",
        )
        .bind(&id)
        .fetch_all(&self.db)
        .await?
        .into_iter()
        .collect();

        let raw_kind: String = row.try_get("kind")?;
        let kind = match raw_kind.as_str() {
            "panneau" => FeedKind::Panneau,
            _ => FeedKind::Post,
        };

        Ok(Post {
            id,
            kind,
            author: PublicUser::from_prefixed(row, "author_")?,
            content: row.try_get("content")?,
            media,
            like_count: likes.len(),
            likes,
            comment_count: comments.len(),
            comments,
            shares,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    async fn load_comments(&self, post_id: &str) -> ApiResult<Vec<Comment>> {
        let comments_sql = format!(
            "SELECT c.id, c.content, c.created_at, c.updated_at, {}
             FROM comments c JOIN users u ON u.id = c.user_id
             WHERE c.post_id = ?1
             ORDER BY c.created_at, c.rowid",
            PublicUser::columns("u", "user_")
        );
        let mut comments = sqlx::query(&comments_sql)
            .bind(post_id)
            .fetch_all(&self.db)
            .await?
            .iter()
            .map(|r| {
                Ok(Comment {
                    id: r.try_get("id")?,
                    user: PublicUser::from_prefixed(r, "user_")?,
                    content: r.try_get("content")?,
                    replies: Vec::new(),
                    created_at: r.try_get("created_at")?,
                    updated_at: r.try_get("updated_at")?,
                })
            })
            .collect::<ApiResult<Vec<_>>>()?;

        let replies_sql = format!(
            "SELECT r.id, r.comment_id, r.content, r.created_at, r.updated_at, {}
             FROM comment_replies r
             JOIN comments c ON c.id = r.comment_id
             JOIN users u ON u.id = r.user_id
             WHERE c.post_id = ?1
             ORDER BY r.created_at, r.rowid",
            PublicUser::columns("u", "user_")
        );
        let rows = sqlx::query(&replies_sql).bind(post_id).fetch_all(&self.db).await?;
        for r in &rows {
            let comment_id: String = r.try_get("comment_id")?;
            let reply = Reply {
                id: r.try_get("id")?,
                user: PublicUser::from_prefixed(r, "user_")?,
                content: r.try_get("content")?,
                created_at: r.try_get("created_at")?,
                updated_at: r.try_get("updated_at")?,
            };
            if let Some(comment) = comments.iter_mut().find(|c| c.id == comment_id) {
                comment.replies.push(reply);
            }
        }

        Ok(comments)
    }
}

fn post_select() -> String {
    format!(
        "SELECT p.id, p.kind, p.content, p.created_at, p.updated_at, {}
         FROM posts p JOIN users a ON a.id = p.author_id",
        PublicUser::columns("a", "author_")
    )
}

async fn insert_media(
    conn: &mut SqliteConnection,
    post_id: &str,
    media: &[UploadedMedia],
    first_position: i64,
) -> ApiResult<()> {
    for (offset, item) in media.iter().enumerate() {
        sqlx::query(
            "INSERT INTO post_media (id, post_id, url, public_id, media_type, duration, position)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )
        .bind(db::new_id())
        .bind(post_id)
        .bind(&item.url)
        .bind(&item.public_id)
        .bind(item.media_type.as_str())
        .bind(item.duration)
        .bind(first_position + offset as i64)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

fn media_from_row(row: &SqliteRow) -> ApiResult<UploadedMedia> {
    let raw: String = row.try_get("media_type")?;
    Ok(UploadedMedia {
        url: row.try_get("url")?,
        public_id: row.try_get("public_id")?,
        media_type: MediaKind::parse(&raw)
            .ok_or_else(|| ApiError::Internal(format!("Unknown media type {}", raw)))?,
        duration: row.try_get("duration")?,
    })
}

#[cfg(test)]
pub(super) mod tests {
    use super::*;
    use crate::{media::MediaFile, testing};
    use tempfile::TempDir;

    pub(crate) struct Fixture {
        pub pool: SqlitePool,
        pub posts: FeedManager,
        pub panneaux: FeedManager,
        pub notifications: Arc<NotificationManager>,
        pub dir: TempDir,
    }

    pub(crate) async fn fixture() -> Fixture {
        let pool = db::memory_pool().await.unwrap();
        let dir = TempDir::new().unwrap();
        let media = testing::disk_media(&dir);
        let notifications = Arc::new(NotificationManager::new(pool.clone()));
        Fixture {
            posts: FeedManager::new(pool.clone(), FeedKind::Post, Arc::clone(&notifications), Arc::clone(&media)),
            panneaux: FeedManager::new(pool.clone(), FeedKind::Panneau, Arc::clone(&notifications), media),
            notifications,
            pool,
            dir,
        }
    }

    const PNG: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR";

    fn png() -> MediaFile {
        MediaFile::new(Some("pic.png".to_string()), "image/png", PNG.to_vec())
    }

    #[tokio::test]
    async fn test_create_requires_content() {
        let f = fixture().await;
        let ana = testing::insert_user(&f.pool, "ana").await;

        let result = f.posts.create(&ana, "   ", FeedUploads::default()).await;
        assert!(matches!(result, Err(ApiError::Validation(_))));
    }

    #[tokio::test]
    async fn test_create_with_images_and_feed() {
        let f = fixture().await;
        let ana = testing::insert_user(&f.pool, "ana").await;

        let uploads = FeedUploads {
            images: vec![png(), png()],
            ..Default::default()
        };
        let panneau = f.panneaux.create(&ana, "Bienvenue", uploads).await.unwrap();
        assert_eq!(panneau.kind, FeedKind::Panneau);
        assert_eq!(panneau.media.len(), 2);
        assert!(f.dir.path().join(&panneau.media[0].public_id).exists());

        f.posts.create(&ana, "Un post", FeedUploads::default()).await.unwrap();

        let feed = f.panneaux.feed(Pagination { page: 1, limit: 10 }, None).await.unwrap();
        assert_eq!(feed.total, 1);
        assert_eq!(feed.items[0].id, panneau.id);

        // kinds do not leak into each other
        assert!(matches!(f.posts.get(&panneau.id).await, Err(ApiError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_feed_search_and_order() {
        let f = fixture().await;
        let ana = testing::insert_user(&f.pool, "ana").await;
        for content in ["Droit du travail", "Fiscalité", "DROIT pénal", "100% utile"] {
            f.posts.create(&ana, content, FeedUploads::default()).await.unwrap();
        }

        let droit = f
            .posts
            .feed(Pagination { page: 1, limit: 10 }, Some("droit"))
            .await
            .unwrap();
        assert_eq!(droit.total, 2);
        assert_eq!(droit.items[0].content, "DROIT pénal");

        let percent = f.posts.feed(Pagination { page: 1, limit: 10 }, Some("%")).await.unwrap();
        assert_eq!(percent.total, 1);

        let paged = f.posts.feed(Pagination { page: 2, limit: 3 }, None).await.unwrap();
        assert_eq!(paged.items.len(), 1);
        assert_eq!(paged.total_pages, 2);
    }

    #[tokio::test]
    async fn test_feed_search_folds_accented_capitals() {
        let f = fixture().await;
        let ana = testing::insert_user(&f.pool, "ana").await;
        let post = f
            .posts
            .create(&ana, "Élection des délégués", FeedUploads::default())
            .await
            .unwrap();

        let found = f
            .posts
            .feed(Pagination { page: 1, limit: 10 }, Some("élection"))
            .await
            .unwrap();
        assert_eq!(found.total, 1);

        f.posts
            .update(
                &post.id,
                &ana,
                FeedUpdate { content: "Réunion ÉTÉ".to_string(), ..Default::default() },
            )
            .await
            .unwrap();
        let stale = f
            .posts
            .feed(Pagination { page: 1, limit: 10 }, Some("élection"))
            .await
            .unwrap();
        assert_eq!(stale.total, 0);
        let renamed = f
            .posts
            .feed(Pagination { page: 1, limit: 10 }, Some("été"))
            .await
            .unwrap();
        assert_eq!(renamed.total, 1);
    }

    #[tokio::test]
    async fn test_like_survives_notification_failure() {
        let f = fixture().await;
        let ana = testing::insert_user(&f.pool, "ana").await;
        let bob = testing::insert_user(&f.pool, "bob").await;
        let post = f.posts.create(&ana, "Hello", FeedUploads::default()).await.unwrap();
        sqlx::query(
            "CREATE TRIGGER reject_notifications BEFORE INSERT ON notifications
             BEGIN SELECT RAISE(ABORT, 'rejected'); END",
        )
        .execute(&f.pool)
        .await
        .unwrap();

        f.posts.toggle_like(&post.id, &bob).await.unwrap();
        let post = f.posts.get(&post.id).await.unwrap();
        assert!(post.liked_by(&bob));
    }

    #[tokio::test]
    async fn test_like_twice_restores_state() {
        let f = fixture().await;
        let ana = testing::insert_user(&f.pool, "ana").await;
        let bob = testing::insert_user(&f.pool, "bob").await;
        let post = f.posts.create(&ana, "Hello", FeedUploads::default()).await.unwrap();

        let first = f.posts.toggle_like(&post.id, &bob).await.unwrap();
        assert!(first.liked);
        assert_eq!(first.likes, vec![bob.clone()]);

        let second = f.posts.toggle_like(&post.id, &bob).await.unwrap();
        assert!(!second.liked);
        assert_eq!(second.likes_count, 0);
        assert!(!f.posts.get(&post.id).await.unwrap().liked_by(&bob));

        // liking again does not notify twice
        f.posts.toggle_like(&post.id, &bob).await.unwrap();
        let notes = f.notifications.list_for(&ana).await.unwrap();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].notification_type, NotificationType::Like);

        // self-likes are silent
        f.posts.toggle_like(&post.id, &ana).await.unwrap();
        assert_eq!(f.notifications.list_for(&ana).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_update_replaces_and_removes_media() {
        let f = fixture().await;
        let ana = testing::insert_user(&f.pool, "ana").await;
        let bob = testing::insert_user(&f.pool, "bob").await;
        let post = f
            .posts
            .create(
                &ana,
                "Avant",
                FeedUploads {
                    images: vec![png()],
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let old_asset = f.dir.path().join(&post.media[0].public_id);

        let denied = f
            .posts
            .update(&post.id, &bob, FeedUpdate { content: "x".to_string(), ..Default::default() })
            .await;
        assert!(matches!(denied, Err(ApiError::Authorization(_))));

        let replaced = f
            .posts
            .update(
                &post.id,
                &ana,
                FeedUpdate {
                    content: "Après".to_string(),
                    image: Some(png()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(replaced.content, "Après");
        assert_eq!(replaced.media.len(), 1);
        assert_ne!(replaced.media[0].public_id, post.media[0].public_id);
        assert!(!old_asset.exists());

        let cleared = f
            .posts
            .update(
                &post.id,
                &ana,
                FeedUpdate {
                    content: "Sans image".to_string(),
                    remove_media: true,
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(cleared.media.is_empty());
    }

    #[tokio::test]
    async fn test_delete_author_only() {
        let f = fixture().await;
        let ana = testing::insert_user(&f.pool, "ana").await;
        let bob = testing::insert_user(&f.pool, "bob").await;
        let post = f.posts.create(&ana, "Hello", FeedUploads::default()).await.unwrap();

        assert!(matches!(
            f.posts.delete(&post.id, &bob).await,
            Err(ApiError::Authorization(_))
        ));
        f.posts.delete(&post.id, &ana).await.unwrap();
        assert!(matches!(f.posts.get(&post.id).await, Err(ApiError::NotFound(_))));
    }

}
