use crate::{
    account::PublicUser,
    db,
    error::{ApiError, ApiResult},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Review {
    pub id: String,
    pub course: String,
    pub author: PublicUser,
    pub rating: i64,
    pub comment: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ReviewInput {
    pub rating: Option<i64>,
    pub comment: Option<String>,
}

pub struct ReviewManager {
    db: SqlitePool,
}

impl ReviewManager {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Create the caller's review of a course, or overwrite it.
    /// The flag is true when a new review was created.
    pub async fn upsert(&self, course_id: &str, author_id: &str, input: ReviewInput) -> ApiResult<(Review, bool)> {
        let rating = input
            .rating
            .filter(|r| (1..=5).contains(r))
            .ok_or_else(|| ApiError::Validation("Rating must be between 1 and 5".to_string()))?;
        let comment = input.comment.as_deref().map(str::trim).unwrap_or("");

        let course = sqlx::query("SELECT 1 FROM courses WHERE id = ?1")
            .bind(course_id)
            .fetch_optional(&self.db)
            .await?;
        if course.is_none() {
            return Err(ApiError::NotFound("Course not found".to_string()));
        }

        let now = Utc::now();
        let mut tx = self.db.begin().await?;
        let existing: Option<String> = sqlx::query_scalar(
            "SELECT id FROM course_reviews WHERE course_id = ?1 AND author_id = ?2",
        )
        .bind(course_id)
        .bind(author_id)
        .fetch_optional(&mut *tx)
        .await?;

        let (id, created) = match existing {
            Some(id) => {
                sqlx::query(
                    "UPDATE course_reviews SET rating = ?2, comment = ?3, updated_at = ?4 WHERE id = ?1",
                )
                .bind(&id)
                .bind(rating)
                .bind(comment)
                .bind(now)
                .execute(&mut *tx)
                .await?;
                (id, false)
            }
            None => {
                let id = db::new_id();
                sqlx::query(
                    "INSERT INTO course_reviews (id, course_id, author_id, rating, comment, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
                )
                .bind(&id)
                .bind(course_id)
                .bind(author_id)
                .bind(rating)
                .bind(comment)
                .bind(now)
                .execute(&mut *tx)
                .await?;
                (id, true)
            }
        };
        tx.commit().await?;

        Ok((self.get(&id).await?, created))
    }

    /// Reviews of a course, oldest first
    pub async fn list(&self, course_id: &str) -> ApiResult<Vec<Review>> {
        let sql = format!("{} WHERE r.course_id = ?1 ORDER BY r.created_at, r.rowid", select_sql());
        let rows = sqlx::query(&sql).bind(course_id).fetch_all(&self.db).await?;
        rows.iter().map(review_from_row).collect()
    }

    async fn get(&self, id: &str) -> ApiResult<Review> {
        let sql = format!("{} WHERE r.id = ?1", select_sql());
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| ApiError::NotFound("Review not found".to_string()))?;
        review_from_row(&row)
    }
}

fn select_sql() -> String {
    format!(
        "SELECT r.id, r.course_id, r.rating, r.comment, r.created_at, r.updated_at, {}
         FROM course_reviews r JOIN users u ON u.id = r.author_id",
        PublicUser::columns("u", "author_")
    )
}

fn review_from_row(row: &SqliteRow) -> ApiResult<Review> {
    Ok(Review {
        id: row.try_get("id")?,
        course: row.try_get("course_id")?,
        author: PublicUser::from_prefixed(row, "author_")?,
        rating: row.try_get("rating")?,
        comment: row.try_get("comment")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        catalog::course::{tests as course_fixtures, CourseManager},
        testing,
    };
    use tempfile::TempDir;

    fn review(rating: i64, comment: &str) -> ReviewInput {
        ReviewInput {
            rating: Some(rating),
            comment: Some(comment.to_string()),
        }
    }

    #[tokio::test]
    async fn test_upsert_per_author() {
        let pool = db::memory_pool().await.unwrap();
        let dir = TempDir::new().unwrap();
        let courses = CourseManager::new(pool.clone(), testing::disk_media(&dir));
        let reviews = ReviewManager::new(pool.clone());

        let prof = testing::insert_user(&pool, "prof").await;
        let ana = testing::insert_user(&pool, "ana").await;
        let ci = testing::insert_country(&pool, "Côte d'Ivoire", "CI").await;
        let (image, video) = course_fixtures::files();
        let course = courses
            .create(&prof, course_fixtures::input(&ci), image, video)
            .await
            .unwrap();

        let (first, created) = reviews.upsert(&course.id, &ana, review(3, "Bien")).await.unwrap();
        assert!(created);
        assert_eq!(first.author.id, ana);

        let (second, created) = reviews.upsert(&course.id, &ana, review(5, "Excellent")).await.unwrap();
        assert!(!created);
        assert_eq!(second.id, first.id);
        assert_eq!(second.rating, 5);

        let listed = reviews.list(&course.id).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].comment, "Excellent");

        assert!(matches!(
            reviews.upsert(&course.id, &ana, review(6, "")).await,
            Err(ApiError::Validation(_))
        ));
        assert!(matches!(
            reviews.upsert(&course.id, &ana, ReviewInput::default()).await,
            Err(ApiError::Validation(_))
        ));
        assert!(matches!(
            reviews.upsert(&db::new_id(), &ana, review(4, "")).await,
            Err(ApiError::NotFound(_))
        ));
    }
}
