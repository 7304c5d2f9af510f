/// Comments and replies on a publication
use crate::{
    db,
    error::{ApiError, ApiResult},
    feed::{CommentAdded, FeedManager, Post},
    notifications::NotificationType,
};
use chrono::Utc;

/// Who may change a comment or reply
enum EditRight {
    OwnerOnly,
    OwnerOrPostAuthor,
}

impl FeedManager {
    /// Append a comment. The post author is notified of a user's first
    /// comment on the post only.
    pub async fn add_comment(&self, post_id: &str, user_id: &str, content: &str) -> ApiResult<CommentAdded> {
        let content = required(content, "Comment")?;
        let author_id = self.author_of(post_id).await?;

        let first_comment = {
            let existing: i64 = sqlx::query_scalar(
                "SELECT COUNT(*) FROM comments WHERE post_id = ?1 AND user_id = ?2",
            )
            .bind(post_id)
            .bind(user_id)
            .fetch_one(&self.db)
            .await?;
            existing == 0
        };

        let id = db::new_id();
        let now = Utc::now();
        sqlx::query(
            "INSERT INTO comments (id, post_id, user_id, content, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
        )
        .bind(&id)
        .bind(post_id)
        .bind(user_id)
        .bind(content)
        .bind(now)
        .execute(&self.db)
        .await?;
        self.touch(post_id).await?;

        let notify_author = first_comment && author_id != user_id;
        if notify_author {
            self.notifications
                .notify(&author_id, NotificationType::Comment, Some(user_id), Some(post_id))
                .await;
        }

        let post = self.get(post_id).await?;
        let comment = post
            .find_comment(&id)
            .cloned()
            .ok_or_else(|| ApiError::Internal("Comment vanished after insert".to_string()))?;

        Ok(CommentAdded {
            post,
            comment,
            notify_author,
        })
    }

    /// Comment owner only
    pub async fn update_comment(
        &self,
        post_id: &str,
        comment_id: &str,
        caller: &str,
        content: &str,
    ) -> ApiResult<Post> {
        let content = required(content, "Comment")?;
        let (owner, post_author) = self.comment_owner(post_id, comment_id).await?;
        check_right(EditRight::OwnerOnly, caller, &owner, &post_author, "edit this comment")?;

        sqlx::query("UPDATE comments SET content = ?2, updated_at = ?3 WHERE id = ?1")
            .bind(comment_id)
            .bind(content)
            .bind(Utc::now())
            .execute(&self.db)
            .await?;

        self.get(post_id).await
    }

    /// Comment owner or post author; the replies go with it
    pub async fn delete_comment(&self, post_id: &str, comment_id: &str, caller: &str) -> ApiResult<Post> {
        let (owner, post_author) = self.comment_owner(post_id, comment_id).await?;
        check_right(EditRight::OwnerOrPostAuthor, caller, &owner, &post_author, "delete this comment")?;

        sqlx::query("DELETE FROM comments WHERE id = ?1")
            .bind(comment_id)
            .execute(&self.db)
            .await?;

        self.get(post_id).await
    }

    /// Append a reply to a comment's ordered reply list
    pub async fn add_reply(
        &self,
        post_id: &str,
        comment_id: &str,
        user_id: &str,
        content: &str,
    ) -> ApiResult<Post> {
        let content = required(content, "Reply")?;
        self.comment_owner(post_id, comment_id).await?;

        let now = Utc::now();
        sqlx::query(
            "INSERT INTO comment_replies (id, comment_id, user_id, content, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
        )
        .bind(db::new_id())
        .bind(comment_id)
        .bind(user_id)
        .bind(content)
        .bind(now)
        .execute(&self.db)
        .await?;

        self.get(post_id).await
    }

    /// Reply owner only
    pub async fn update_reply(
        &self,
        post_id: &str,
        comment_id: &str,
        reply_id: &str,
        caller: &str,
        content: &str,
    ) -> ApiResult<Post> {
        let content = required(content, "Reply")?;
        let (owner, post_author) = self.reply_owner(post_id, comment_id, reply_id).await?;
        check_right(EditRight::OwnerOnly, caller, &owner, &post_author, "edit this reply")?;

        sqlx::query("UPDATE comment_replies SET content = ?2, updated_at = ?3 WHERE id = ?1")
            .bind(reply_id)
            .bind(content)
            .bind(Utc::now())
            .execute(&self.db)
            .await?;

        self.get(post_id).await
    }

    /// Reply owner or post author
    pub async fn delete_reply(
        &self,
        post_id: &str,
        comment_id: &str,
        reply_id: &str,
        caller: &str,
    ) -> ApiResult<Post> {
        let (owner, post_author) = self.reply_owner(post_id, comment_id, reply_id).await?;
        check_right(EditRight::OwnerOrPostAuthor, caller, &owner, &post_author, "delete this reply")?;

        sqlx::query("DELETE FROM comment_replies WHERE id = ?1")
            .bind(reply_id)
            .execute(&self.db)
            .await?;

        self.get(post_id).await
    }

    /// (comment owner, post author)
    async fn comment_owner(&self, post_id: &str, comment_id: &str) -> ApiResult<(String, String)> {
        let post_author = self.author_of(post_id).await?;
        let owner: Option<String> =
            sqlx::query_scalar("SELECT user_id FROM comments WHERE id = ?1 AND post_id = ?2")
                .bind(comment_id)
                .bind(post_id)
                .fetch_optional(&self.db)
                .await?;
        let owner = owner.ok_or_else(|| ApiError::NotFound("Comment not found".to_string()))?;
        Ok((owner, post_author))
    }

    /// (reply owner, post author)
    async fn reply_owner(
        &self,
        post_id: &str,
        comment_id: &str,
        reply_id: &str,
    ) -> ApiResult<(String, String)> {
        let (_, post_author) = self.comment_owner(post_id, comment_id).await?;
        let owner: Option<String> =
            sqlx::query_scalar("SELECT user_id FROM comment_replies WHERE id = ?1 AND comment_id = ?2")
                .bind(reply_id)
                .bind(comment_id)
                .fetch_optional(&self.db)
                .await?;
        let owner = owner.ok_or_else(|| ApiError::NotFound("Reply not found".to_string()))?;
        Ok((owner, post_author))
    }

    async fn touch(&self, post_id: &str) -> ApiResult<()> {
        sqlx::query("UPDATE posts SET updated_at = ?2 WHERE id = ?1")
            .bind(post_id)
            .bind(Utc::now())
            .execute(&self.db)
            .await?;
        Ok(())
    }
}

fn required<'a>(content: &'a str, what: &str) -> ApiResult<&'a str> {
    let content = content.trim();
    if content.is_empty() {
        return Err(ApiError::Validation(format!("{} content is required", what)));
    }
    Ok(content)
}

fn check_right(
    right: EditRight,
    caller: &str,
    owner: &str,
    post_author: &str,
    action: &str,
) -> ApiResult<()> {
    let allowed = match right {
        EditRight::OwnerOnly => caller == owner,
        EditRight::OwnerOrPostAuthor => caller == owner || caller == post_author,
    };
    if allowed {
        Ok(())
    } else {
        Err(ApiError::Authorization(format!(
            "You are not allowed to {}",
            action
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{feed::manager::tests::fixture, feed::FeedUploads, testing};

    #[tokio::test]
    async fn test_first_comment_notifies_once() {
        let f = fixture().await;
        let ana = testing::insert_user(&f.pool, "ana").await;
        let bob = testing::insert_user(&f.pool, "bob").await;
        let post = f.posts.create(&ana, "Hello", FeedUploads::default()).await.unwrap();

        let first = f.posts.add_comment(&post.id, &bob, "Bravo").await.unwrap();
        assert!(first.notify_author);
        assert_eq!(first.post.comment_count, 1);
        assert_eq!(first.comment.user.id, bob);

        let second = f.posts.add_comment(&post.id, &bob, "Encore").await.unwrap();
        assert!(!second.notify_author);

        let own = f.posts.add_comment(&post.id, &ana, "Merci").await.unwrap();
        assert!(!own.notify_author);

        let notes = f.notifications.list_for(&ana).await.unwrap();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].notification_type, NotificationType::Comment);
        assert_eq!(notes[0].related_post.as_ref().unwrap().id, post.id);

        assert!(matches!(
            f.posts.add_comment(&post.id, &bob, "  ").await,
            Err(ApiError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_third_party_cannot_delete_comment() {
        let f = fixture().await;
        let ana = testing::insert_user(&f.pool, "ana").await;
        let bob = testing::insert_user(&f.pool, "bob").await;
        let eve = testing::insert_user(&f.pool, "eve").await;
        let post = f.posts.create(&ana, "Hello", FeedUploads::default()).await.unwrap();
        let added = f.posts.add_comment(&post.id, &bob, "Bravo").await.unwrap();

        let denied = f.posts.delete_comment(&post.id, &added.comment.id, &eve).await;
        assert!(matches!(denied, Err(ApiError::Authorization(_))));

        // editing is reserved to the comment owner, even for the post author
        let edit = f
            .posts
            .update_comment(&post.id, &added.comment.id, &ana, "censuré")
            .await;
        assert!(matches!(edit, Err(ApiError::Authorization(_))));

        // the post author may delete it
        let after = f
            .posts
            .delete_comment(&post.id, &added.comment.id, &ana)
            .await
            .unwrap();
        assert!(after.comments.is_empty());
    }

    #[tokio::test]
    async fn test_replies_are_ordered_and_guarded() {
        let f = fixture().await;
        let ana = testing::insert_user(&f.pool, "ana").await;
        let bob = testing::insert_user(&f.pool, "bob").await;
        let eve = testing::insert_user(&f.pool, "eve").await;
        let panneau = f.panneaux.create(&ana, "Annonce", FeedUploads::default()).await.unwrap();
        let comment = f.panneaux.add_comment(&panneau.id, &bob, "Question").await.unwrap().comment;

        f.panneaux.add_reply(&panneau.id, &comment.id, &ana, "Réponse 1").await.unwrap();
        let post = f
            .panneaux
            .add_reply(&panneau.id, &comment.id, &eve, "Réponse 2")
            .await
            .unwrap();
        let replies = &post.find_comment(&comment.id).unwrap().replies;
        assert_eq!(replies.len(), 2);
        assert_eq!(replies[0].content, "Réponse 1");
        assert_eq!(replies[1].content, "Réponse 2");

        let eve_reply = replies[1].id.clone();
        assert!(matches!(
            f.panneaux
                .update_reply(&panneau.id, &comment.id, &eve_reply, &bob, "x")
                .await,
            Err(ApiError::Authorization(_))
        ));
        let edited = f
            .panneaux
            .update_reply(&panneau.id, &comment.id, &eve_reply, &eve, "Réponse 2 bis")
            .await
            .unwrap();
        assert_eq!(edited.find_comment(&comment.id).unwrap().replies[1].content, "Réponse 2 bis");

        assert!(matches!(
            f.panneaux
                .delete_reply(&panneau.id, &comment.id, &eve_reply, &bob)
                .await,
            Err(ApiError::Authorization(_))
        ));
        let trimmed = f
            .panneaux
            .delete_reply(&panneau.id, &comment.id, &eve_reply, &ana)
            .await
            .unwrap();
        assert_eq!(trimmed.find_comment(&comment.id).unwrap().replies.len(), 1);

        assert!(matches!(
            f.panneaux
                .add_reply(&panneau.id, &db::new_id(), &ana, "perdu")
                .await,
            Err(ApiError::NotFound(_))
        ));
    }
}
