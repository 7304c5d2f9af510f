use crate::{
    account::PublicUser,
    catalog::{provided, required},
    db,
    error::{ApiError, ApiResult},
    media::{store::is_data_uri, MediaFile, MediaKind, MediaStore, UploadedMedia},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use std::sync::Arc;

const COURSE_FOLDER: &str = "courses";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Course {
    pub id: String,
    pub title: String,
    pub content: String,
    pub subject: String,
    pub country: String,
    pub country_name: String,
    pub city: String,
    pub author: Option<PublicUser>,
    pub image: String,
    pub videocour: String,
    pub last_updated: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Text fields of a course. On update `image` and `videocour` may carry
/// data URIs that replace the current assets.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CourseInput {
    pub title: Option<String>,
    pub content: Option<String>,
    pub subject: Option<String>,
    pub country: Option<String>,
    pub city: Option<String>,
    pub image: Option<String>,
    pub videocour: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseRating {
    pub average_rating: f64,
    pub review_count: i64,
}

pub struct CourseManager {
    db: SqlitePool,
    media: Arc<MediaStore>,
}

impl CourseManager {
    pub fn new(db: SqlitePool, media: Arc<MediaStore>) -> Self {
        Self { db, media }
    }

    /// Create a course authored by `author_id` with its cover image and video
    pub async fn create(
        &self,
        author_id: &str,
        input: CourseInput,
        image: Option<MediaFile>,
        video: Option<MediaFile>,
    ) -> ApiResult<Course> {
        let title = required(input.title.as_deref(), "Title")?;
        let content = required(input.content.as_deref(), "Content")?;
        let subject = required(input.subject.as_deref(), "Subject")?;
        let city = required(input.city.as_deref(), "City")?;
        let country = db::parse_id(required(input.country.as_deref(), "Country")?, "country")?;
        let image = image.ok_or_else(|| ApiError::Validation("Image is required".to_string()))?;
        let video = video.ok_or_else(|| ApiError::Validation("Video is required".to_string()))?;

        self.ensure_country(&country).await?;

        self.media.validate(&image, &[MediaKind::Image])?;
        self.media.validate(&video, &[MediaKind::Video])?;
        let image = self.media.upload(&image, &[MediaKind::Image], COURSE_FOLDER).await?;
        let video = match self.media.upload(&video, &[MediaKind::Video], COURSE_FOLDER).await {
            Ok(video) => video,
            Err(e) => {
                self.media.discard(std::slice::from_ref(&image)).await;
                return Err(e);
            }
        };

        let id = db::new_id();
        let now = Utc::now();
        let inserted = sqlx::query(
            "INSERT INTO courses (id, title, content, subject, country_id, city, author_id, image,
                videocour, last_updated, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)",
        )
        .bind(&id)
        .bind(title)
        .bind(content)
        .bind(subject)
        .bind(&country)
        .bind(city)
        .bind(author_id)
        .bind(&image.url)
        .bind(&video.url)
        .bind(now)
        .execute(&self.db)
        .await;

        if let Err(e) = inserted {
            self.media.discard(&[image, video]).await;
            return Err(e.into());
        }

        tracing::info!("Course {} created by {}", id, author_id);
        self.get(&id).await
    }

    /// Courses of one country; none at all is a 404
    pub async fn by_country(&self, country: Option<&str>) -> ApiResult<Vec<Course>> {
        let country = provided(country)
            .ok_or_else(|| ApiError::Validation("Country is required".to_string()))?;
        let country = db::parse_id(country, "country")?;

        let sql = format!("{} WHERE c.country_id = ?1 ORDER BY c.created_at, c.rowid", select_sql());
        let courses = sqlx::query(&sql)
            .bind(&country)
            .fetch_all(&self.db)
            .await?
            .iter()
            .map(course_from_row)
            .collect::<ApiResult<Vec<_>>>()?;

        if courses.is_empty() {
            return Err(ApiError::NotFound("No course found for this country".to_string()));
        }
        Ok(courses)
    }

    pub async fn get(&self, id: &str) -> ApiResult<Course> {
        let sql = format!("{} WHERE c.id = ?1", select_sql());
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| ApiError::NotFound("Course not found".to_string()))?;
        course_from_row(&row)
    }

    /// Merge non-empty fields; data URIs for `image`/`videocour` are uploaded
    /// and the previous asset is removed
    pub async fn update(&self, id: &str, input: CourseInput) -> ApiResult<Course> {
        let current = self.get(id).await?;

        let country = match provided(input.country.as_deref()) {
            Some(raw) => {
                let country = db::parse_id(raw, "country")?;
                self.ensure_country(&country).await?;
                country
            }
            None => current.country.clone(),
        };

        let mut fresh: Vec<UploadedMedia> = Vec::new();
        let image = match provided(input.image.as_deref()).filter(|v| is_data_uri(v)) {
            Some(uri) => {
                let media = self
                    .media
                    .upload_data_uri(uri, &[MediaKind::Image], COURSE_FOLDER)
                    .await?;
                fresh.push(media.clone());
                media.url
            }
            None => current.image.clone(),
        };
        let videocour = match provided(input.videocour.as_deref()).filter(|v| is_data_uri(v)) {
            Some(uri) => match self
                .media
                .upload_data_uri(uri, &[MediaKind::Video], COURSE_FOLDER)
                .await
            {
                Ok(media) => {
                    fresh.push(media.clone());
                    media.url
                }
                Err(e) => {
                    self.media.discard(&fresh).await;
                    return Err(e);
                }
            },
            None => current.videocour.clone(),
        };

        let updated = sqlx::query(
            "UPDATE courses SET title = ?2, content = ?3, subject = ?4, country_id = ?5, city = ?6,
                image = ?7, videocour = ?8, last_updated = ?9
             WHERE id = ?1",
        )
        .bind(id)
        .bind(provided(input.title.as_deref()).unwrap_or(&current.title))
        .bind(provided(input.content.as_deref()).unwrap_or(&current.content))
        .bind(provided(input.subject.as_deref()).unwrap_or(&current.subject))
        .bind(&country)
        .bind(provided(input.city.as_deref()).unwrap_or(&current.city))
        .bind(&image)
        .bind(&videocour)
        .bind(Utc::now())
        .execute(&self.db)
        .await;

        if let Err(e) = updated {
            self.media.discard(&fresh).await;
            return Err(e.into());
        }

        if image != current.image {
            self.media.destroy_url(&current.image, MediaKind::Image).await;
        }
        if videocour != current.videocour {
            self.media.destroy_url(&current.videocour, MediaKind::Video).await;
        }

        self.get(id).await
    }

    /// Delete a course with its assets and reviews
    pub async fn delete(&self, id: &str) -> ApiResult<()> {
        let course = self.get(id).await?;

        self.media.destroy_url(&course.image, MediaKind::Image).await;
        self.media.destroy_url(&course.videocour, MediaKind::Video).await;

        sqlx::query("DELETE FROM courses WHERE id = ?1")
            .bind(id)
            .execute(&self.db)
            .await?;

        tracing::info!("Course {} deleted", id);
        Ok(())
    }

    /// Mean review rating to one decimal, 0 without reviews
    pub async fn rating(&self, id: &str) -> ApiResult<CourseRating> {
        self.get(id).await?;

        let (average, count): (Option<f64>, i64) = sqlx::query_as(
            "SELECT AVG(rating), COUNT(*) FROM course_reviews WHERE course_id = ?1",
        )
        .bind(id)
        .fetch_one(&self.db)
        .await?;

        Ok(CourseRating {
            average_rating: average.map(|a| (a * 10.0).round() / 10.0).unwrap_or(0.0),
            review_count: count,
        })
    }

    async fn ensure_country(&self, country: &str) -> ApiResult<()> {
        let found = sqlx::query("SELECT 1 FROM countries WHERE id = ?1")
            .bind(country)
            .fetch_optional(&self.db)
            .await?;
        match found {
            Some(_) => Ok(()),
            None => Err(ApiError::NotFound("Country not found".to_string())),
        }
    }
}

fn select_sql() -> String {
    format!(
        "SELECT c.id, c.title, c.content, c.subject, c.country_id, k.name AS country_name, c.city,
                c.image, c.videocour, c.last_updated, c.created_at, {}
         FROM courses c
         JOIN countries k ON k.id = c.country_id
         LEFT JOIN users u ON u.id = c.author_id",
        PublicUser::columns("u", "author_")
    )
}

fn course_from_row(row: &SqliteRow) -> ApiResult<Course> {
    Ok(Course {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        content: row.try_get("content")?,
        subject: row.try_get("subject")?,
        country: row.try_get("country_id")?,
        country_name: row.try_get("country_name")?,
        city: row.try_get("city")?,
        author: PublicUser::from_prefixed_opt(row, "author_")?,
        image: row.try_get("image")?,
        videocour: row.try_get("videocour")?,
        last_updated: row.try_get("last_updated")?,
        created_at: row.try_get("created_at")?,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::testing;
    use base64::{engine::general_purpose::STANDARD, Engine};
    use tempfile::TempDir;

    pub(crate) const PNG: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR";

    pub(crate) fn files() -> (Option<MediaFile>, Option<MediaFile>) {
        (
            Some(MediaFile::new(Some("cover.png".to_string()), "image/png", PNG.to_vec())),
            Some(MediaFile::new(Some("lesson.mp4".to_string()), "video/mp4", b"mp4data".to_vec())),
        )
    }

    pub(crate) fn input(country: &str) -> CourseInput {
        CourseInput {
            title: Some("Droit du travail".to_string()),
            content: Some("Les bases du contrat".to_string()),
            subject: Some("Droit".to_string()),
            country: Some(country.to_string()),
            city: Some("Abidjan".to_string()),
            ..Default::default()
        }
    }

    async fn setup() -> (SqlitePool, TempDir, CourseManager) {
        let pool = db::memory_pool().await.unwrap();
        let dir = TempDir::new().unwrap();
        let manager = CourseManager::new(pool.clone(), testing::disk_media(&dir));
        (pool, dir, manager)
    }

    #[tokio::test]
    async fn test_create_requires_everything() {
        let (pool, _dir, manager) = setup().await;
        let author = testing::insert_user(&pool, "prof").await;
        let ci = testing::insert_country(&pool, "Côte d'Ivoire", "CI").await;

        let (image, _) = files();
        assert!(matches!(
            manager.create(&author, input(&ci), image, None).await,
            Err(ApiError::Validation(_))
        ));

        let mut untitled = input(&ci);
        untitled.title = None;
        let (image, video) = files();
        assert!(matches!(
            manager.create(&author, untitled, image, video).await,
            Err(ApiError::Validation(_))
        ));

        let (image, video) = files();
        let course = manager.create(&author, input(&ci), image, video).await.unwrap();
        assert_eq!(course.author.unwrap().id, author);
        assert_eq!(course.country_name, "Côte d'Ivoire");
        assert!(course.image.starts_with("http://localhost:5000/uploads/courses/"));
        assert!(course.videocour.ends_with(".mp4"));
    }

    #[tokio::test]
    async fn test_by_country() {
        let (pool, _dir, manager) = setup().await;
        let author = testing::insert_user(&pool, "prof").await;
        let ci = testing::insert_country(&pool, "Côte d'Ivoire", "CI").await;
        let sn = testing::insert_country(&pool, "Sénégal", "SN").await;

        let (image, video) = files();
        manager.create(&author, input(&ci), image, video).await.unwrap();

        assert_eq!(manager.by_country(Some(&ci)).await.unwrap().len(), 1);
        assert!(matches!(manager.by_country(Some(&sn)).await, Err(ApiError::NotFound(_))));
        assert!(matches!(manager.by_country(None).await, Err(ApiError::Validation(_))));
    }

    #[tokio::test]
    async fn test_update_replaces_assets() {
        let (pool, dir, manager) = setup().await;
        let author = testing::insert_user(&pool, "prof").await;
        let ci = testing::insert_country(&pool, "Côte d'Ivoire", "CI").await;
        let (image, video) = files();
        let course = manager.create(&author, input(&ci), image, video).await.unwrap();

        let updated = manager
            .update(
                &course.id,
                CourseInput {
                    title: Some("Droit social".to_string()),
                    content: Some("   ".to_string()),
                    image: Some(format!("data:image/png;base64,{}", STANDARD.encode(PNG))),
                    videocour: Some("https://elsewhere.example/video.mp4".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.title, "Droit social");
        assert_eq!(updated.content, course.content);
        assert_ne!(updated.image, course.image);
        assert_eq!(updated.videocour, course.videocour);
        assert!(updated.last_updated >= course.last_updated);

        // old cover removed, new one stored
        let covers: Vec<_> = std::fs::read_dir(dir.path().join("courses"))
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.path().extension().map(|x| x == "png").unwrap_or(false))
            .collect();
        assert_eq!(covers.len(), 1);

        manager.delete(&course.id).await.unwrap();
        assert_eq!(std::fs::read_dir(dir.path().join("courses")).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_rating_rounds() {
        let (pool, _dir, manager) = setup().await;
        let author = testing::insert_user(&pool, "prof").await;
        let ci = testing::insert_country(&pool, "Côte d'Ivoire", "CI").await;
        let (image, video) = files();
        let course = manager.create(&author, input(&ci), image, video).await.unwrap();

        let empty = manager.rating(&course.id).await.unwrap();
        assert_eq!(empty, CourseRating { average_rating: 0.0, review_count: 0 });

        for (name, rating) in [("a", 5), ("b", 4), ("c", 4)] {
            let user = testing::insert_user(&pool, name).await;
            sqlx::query(
                "INSERT INTO course_reviews (id, course_id, author_id, rating, comment, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, '', ?5, ?5)",
            )
            .bind(db::new_id())
            .bind(&course.id)
            .bind(&user)
            .bind(rating)
            .bind(Utc::now())
            .execute(&pool)
            .await
            .unwrap();
        }

        let rating = manager.rating(&course.id).await.unwrap();
        assert_eq!(rating.review_count, 3);
        assert_eq!(rating.average_rating, 4.3);
    }
}
