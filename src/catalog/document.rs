/// Document library: a PDF with its cover image and a companion video
use crate::{
    catalog::{parse_date, provided, required},
    db::{self, Pagination},
    error::{ApiError, ApiResult},
    media::{MediaFile, MediaKind, MediaStore, UploadedMedia},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use std::sync::Arc;

const UNKNOWN_AUTHOR: &str = "Inconnu";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentCategory {
    Troisieme,
    Seconde,
    Premiere,
    Terminale,
    Licences1,
    Licences2,
    Licences3,
    Autre,
}

impl DocumentCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentCategory::Troisieme => "troisieme",
            DocumentCategory::Seconde => "seconde",
            DocumentCategory::Premiere => "premiere",
            DocumentCategory::Terminale => "terminale",
            DocumentCategory::Licences1 => "licences1",
            DocumentCategory::Licences2 => "licences2",
            DocumentCategory::Licences3 => "licences3",
            DocumentCategory::Autre => "autre",
        }
    }

    pub fn parse(raw: &str) -> ApiResult<Self> {
        match raw.trim() {
            "troisieme" => Ok(DocumentCategory::Troisieme),
            "seconde" => Ok(DocumentCategory::Seconde),
            "premiere" => Ok(DocumentCategory::Premiere),
            "terminale" => Ok(DocumentCategory::Terminale),
            "licences1" => Ok(DocumentCategory::Licences1),
            "licences2" => Ok(DocumentCategory::Licences2),
            "licences3" => Ok(DocumentCategory::Licences3),
            "autre" => Ok(DocumentCategory::Autre),
            other => Err(ApiError::Validation(format!("Unknown category: {}", other))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub id: String,
    pub title: String,
    pub category: DocumentCategory,
    pub country: String,
    pub pdf_url: String,
    pub cover_url: String,
    pub video_url: String,
    pub pages: i64,
    pub excerpt: String,
    pub author: String,
    pub release_date: Option<DateTime<Utc>>,
    pub number: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Text fields of a multipart document form
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DocumentInput {
    pub title: Option<String>,
    pub category: Option<String>,
    pub country: Option<String>,
    pub pages: Option<String>,
    pub excerpt: Option<String>,
    pub author: Option<String>,
    pub release_date: Option<String>,
    pub number: Option<String>,
}

/// Uploaded files sorted by MIME type
#[derive(Debug, Clone, Default)]
pub struct DocumentFiles {
    pub pdf: Option<MediaFile>,
    pub cover: Option<MediaFile>,
    pub video: Option<MediaFile>,
}

impl DocumentFiles {
    /// Sort an unlabelled file list; the last file of each type wins
    pub fn classify(files: Vec<MediaFile>) -> ApiResult<Self> {
        let mut sorted = Self::default();
        for file in files {
            match file.kind() {
                Some(MediaKind::Pdf) => sorted.pdf = Some(file),
                Some(MediaKind::Image) => sorted.cover = Some(file),
                Some(MediaKind::Video) => sorted.video = Some(file),
                None => {
                    return Err(ApiError::Validation(format!(
                        "Unsupported file type: {}",
                        file.content_type
                    )))
                }
            }
        }
        Ok(sorted)
    }
}

#[derive(Debug, Clone, Default)]
pub struct DocumentQuery {
    pub search: Option<String>,
    pub category: Option<String>,
    pub page: Option<String>,
    pub limit: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentPage {
    pub documents: Vec<Document>,
    pub total: i64,
    pub page: i64,
    pub pages: i64,
}

pub struct DocumentManager {
    db: SqlitePool,
    media: Arc<MediaStore>,
}

impl DocumentManager {
    pub fn new(db: SqlitePool, media: Arc<MediaStore>) -> Self {
        Self { db, media }
    }

    pub async fn create(&self, input: DocumentInput, files: DocumentFiles) -> ApiResult<Document> {
        let title = required(input.title.as_deref(), "Title")?;
        let category = DocumentCategory::parse(required(input.category.as_deref(), "Category")?)?;
        let country = db::parse_id(required(input.country.as_deref(), "Country")?, "country")?;
        let (pdf, cover, video) = match (files.pdf, files.cover, files.video) {
            (Some(pdf), Some(cover), Some(video)) => (pdf, cover, video),
            _ => {
                return Err(ApiError::Validation(
                    "PDF, cover image and video are required".to_string(),
                ))
            }
        };

        let pages = parse_pages(input.pages.as_deref()).unwrap_or(1);
        let excerpt = input.excerpt.as_deref().map(str::trim).unwrap_or("");
        let author = provided(input.author.as_deref()).unwrap_or(UNKNOWN_AUTHOR);
        let release_date = parse_date(input.release_date.as_deref(), "release date")?;
        let number = parse_number(input.number.as_deref())?;

        self.ensure_country(&country).await?;

        let stored = self
            .upload_set(&[(pdf, MediaKind::Pdf), (cover, MediaKind::Image), (video, MediaKind::Video)])
            .await?;

        let id = db::new_id();
        let now = Utc::now();
        let inserted = sqlx::query(
            "INSERT INTO documents (id, title, category, country_id, pdf_url, cover_url, video_url,
                pages, excerpt, author, release_date, number, search_text, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?14)",
        )
        .bind(&id)
        .bind(title)
        .bind(category.as_str())
        .bind(&country)
        .bind(&stored[0].url)
        .bind(&stored[1].url)
        .bind(&stored[2].url)
        .bind(pages)
        .bind(excerpt)
        .bind(author)
        .bind(release_date)
        .bind(number)
        .bind(document_search_text(title, excerpt))
        .bind(now)
        .execute(&self.db)
        .await;

        if let Err(e) = inserted {
            self.media.discard(&stored).await;
            return Err(e.into());
        }

        tracing::info!("Document {} ({}) added to the library", id, category.as_str());
        self.get(&id).await
    }

    /// Search title and excerpt, filter by category, newest first
    pub async fn search(&self, query: DocumentQuery) -> ApiResult<DocumentPage> {
        let pagination = Pagination::from_query(query.page.as_deref(), query.limit.as_deref(), 10, 100);
        let category = match provided(query.category.as_deref()) {
            Some(raw) => Some(DocumentCategory::parse(raw)?.as_str()),
            None => None,
        };
        let pattern = provided(query.search.as_deref()).map(db::contains_pattern);

        let filter = "(?1 IS NULL OR category = ?1)
             AND (?2 IS NULL OR search_text LIKE ?2 ESCAPE '\\')";

        let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM documents WHERE {}", filter))
            .bind(category)
            .bind(&pattern)
            .fetch_one(&self.db)
            .await?;

        let rows = sqlx::query(&format!(
            "{} WHERE {} ORDER BY created_at DESC, rowid DESC LIMIT ?3 OFFSET ?4",
            SELECT_SQL, filter
        ))
        .bind(category)
        .bind(&pattern)
        .bind(pagination.limit)
        .bind(pagination.offset())
        .fetch_all(&self.db)
        .await?;

        Ok(DocumentPage {
            documents: rows.iter().map(document_from_row).collect::<ApiResult<_>>()?,
            total,
            page: pagination.page,
            pages: pagination.total_pages(total),
        })
    }

    pub async fn get(&self, id: &str) -> ApiResult<Document> {
        let row = sqlx::query(&format!("{} WHERE id = ?1", SELECT_SQL))
            .bind(id)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| ApiError::NotFound("Document not found".to_string()))?;
        document_from_row(&row)
    }

    /// Merge the provided fields; provided files replace the current ones
    pub async fn update(&self, id: &str, input: DocumentInput, files: DocumentFiles) -> ApiResult<Document> {
        let current = self.get(id).await?;

        let category = match provided(input.category.as_deref()) {
            Some(raw) => DocumentCategory::parse(raw)?,
            None => current.category,
        };
        let country = match provided(input.country.as_deref()) {
            Some(raw) => {
                let country = db::parse_id(raw, "country")?;
                self.ensure_country(&country).await?;
                country
            }
            None => current.country.clone(),
        };
        let pages = parse_pages(input.pages.as_deref()).unwrap_or(current.pages);
        let title = provided(input.title.as_deref()).unwrap_or(&current.title);
        let excerpt = input.excerpt.as_deref().map(str::trim).unwrap_or(&current.excerpt);
        let author = match input.author.as_deref() {
            Some(raw) => provided(Some(raw)).unwrap_or(UNKNOWN_AUTHOR).to_string(),
            None => current.author.clone(),
        };
        let release_date = match provided(input.release_date.as_deref()) {
            Some(_) => parse_date(input.release_date.as_deref(), "release date")?,
            None => current.release_date,
        };
        let number = match provided(input.number.as_deref()) {
            Some(_) => parse_number(input.number.as_deref())?,
            None => current.number,
        };

        let replacements: Vec<(MediaFile, MediaKind)> = [
            (files.pdf, MediaKind::Pdf),
            (files.cover, MediaKind::Image),
            (files.video, MediaKind::Video),
        ]
        .into_iter()
        .filter_map(|(file, kind)| file.map(|f| (f, kind)))
        .collect();
        let stored = self.upload_set(&replacements).await?;

        let mut pdf_url = current.pdf_url.clone();
        let mut cover_url = current.cover_url.clone();
        let mut video_url = current.video_url.clone();
        for media in &stored {
            match media.media_type {
                MediaKind::Pdf => pdf_url = media.url.clone(),
                MediaKind::Image => cover_url = media.url.clone(),
                MediaKind::Video => video_url = media.url.clone(),
            }
        }

        let updated = sqlx::query(
            "UPDATE documents SET title = ?2, category = ?3, country_id = ?4, pdf_url = ?5,
                cover_url = ?6, video_url = ?7, pages = ?8, excerpt = ?9, author = ?10,
                release_date = ?11, number = ?12, search_text = ?13, updated_at = ?14
             WHERE id = ?1",
        )
        .bind(id)
        .bind(title)
        .bind(category.as_str())
        .bind(&country)
        .bind(&pdf_url)
        .bind(&cover_url)
        .bind(&video_url)
        .bind(pages)
        .bind(excerpt)
        .bind(&author)
        .bind(release_date)
        .bind(number)
        .bind(document_search_text(title, excerpt))
        .bind(Utc::now())
        .execute(&self.db)
        .await;

        if let Err(e) = updated {
            self.media.discard(&stored).await;
            return Err(e.into());
        }

        if pdf_url != current.pdf_url {
            self.media.destroy_url(&current.pdf_url, MediaKind::Pdf).await;
        }
        if cover_url != current.cover_url {
            self.media.destroy_url(&current.cover_url, MediaKind::Image).await;
        }
        if video_url != current.video_url {
            self.media.destroy_url(&current.video_url, MediaKind::Video).await;
        }

        self.get(id).await
    }

    pub async fn delete(&self, id: &str) -> ApiResult<()> {
        let document = self.get(id).await?;

        futures::join!(
            self.media.destroy_url(&document.pdf_url, MediaKind::Pdf),
            self.media.destroy_url(&document.cover_url, MediaKind::Image),
            self.media.destroy_url(&document.video_url, MediaKind::Video),
        );

        sqlx::query("DELETE FROM documents WHERE id = ?1")
            .bind(id)
            .execute(&self.db)
            .await?;

        tracing::info!("Document {} deleted", id);
        Ok(())
    }

    /// Validate every file first, then upload them in order; on failure the
    /// files already stored are removed
    async fn upload_set(&self, files: &[(MediaFile, MediaKind)]) -> ApiResult<Vec<UploadedMedia>> {
        for (file, kind) in files {
            self.media.validate(file, &[*kind])?;
        }

        let mut stored = Vec::with_capacity(files.len());
        for (file, kind) in files {
            match self.media.upload(file, &[*kind], folder_for(*kind)).await {
                Ok(media) => stored.push(media),
                Err(e) => {
                    self.media.discard(&stored).await;
                    return Err(e);
                }
            }
        }
        Ok(stored)
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

const SELECT_SQL: &str = "SELECT id, title, category, country_id, pdf_url, cover_url, video_url,
        pages, excerpt, author, release_date, number, created_at, updated_at
     FROM documents";

fn folder_for(kind: MediaKind) -> &'static str {
    match kind {
        MediaKind::Pdf => "pdf",
        MediaKind::Image => "covers",
        MediaKind::Video => "videos",
    }
}

/// Positive page count, `None` when absent or not a positive integer
fn document_search_text(title: &str, excerpt: &str) -> String {
    db::search_text(&format!("{}\n{}", title, excerpt))
}

fn parse_pages(raw: Option<&str>) -> Option<i64> {
    provided(raw)
        .and_then(|p| p.parse::<i64>().ok())
        .filter(|p| *p > 0)
}

fn parse_number(raw: Option<&str>) -> ApiResult<Option<i64>> {
    match provided(raw) {
        Some(n) => n
            .parse::<i64>()
            .map(Some)
            .map_err(|_| ApiError::Validation("Invalid number".to_string())),
        None => Ok(None),
    }
}

fn document_from_row(row: &SqliteRow) -> ApiResult<Document> {
    let category: String = row.try_get("category")?;
    Ok(Document {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        category: DocumentCategory::parse(&category)?,
        country: row.try_get("country_id")?,
        pdf_url: row.try_get("pdf_url")?,
        cover_url: row.try_get("cover_url")?,
        video_url: row.try_get("video_url")?,
        pages: row.try_get("pages")?,
        excerpt: row.try_get("excerpt")?,
        author: row.try_get("author")?,
        release_date: row.try_get("release_date")?,
        number: row.try_get("number")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;
    use tempfile::TempDir;

    const PNG: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR";

    fn upload_list() -> Vec<MediaFile> {
        vec![
            MediaFile::new(Some("guide.pdf".to_string()), "application/pdf", b"%PDF-1.4".to_vec()),
            MediaFile::new(Some("cover.png".to_string()), "image/png", PNG.to_vec()),
            MediaFile::new(Some("intro.mp4".to_string()), "video/mp4", b"mp4".to_vec()),
        ]
    }

    fn input(title: &str, category: &str, country: &str) -> DocumentInput {
        DocumentInput {
            title: Some(title.to_string()),
            category: Some(category.to_string()),
            country: Some(country.to_string()),
            excerpt: Some(format!("Résumé de {}", title)),
            ..Default::default()
        }
    }

    async fn setup() -> (SqlitePool, TempDir, DocumentManager, String) {
        let pool = db::memory_pool().await.unwrap();
        let dir = TempDir::new().unwrap();
        let manager = DocumentManager::new(pool.clone(), testing::disk_media(&dir));
        let ci = testing::insert_country(&pool, "Côte d'Ivoire", "CI").await;
        (pool, dir, manager, ci)
    }

    #[test]
    fn test_classify_by_mime() {
        let files = DocumentFiles::classify(upload_list()).unwrap();
        assert_eq!(files.pdf.unwrap().content_type, "application/pdf");
        assert_eq!(files.cover.unwrap().content_type, "image/png");
        assert_eq!(files.video.unwrap().content_type, "video/mp4");

        let odd = vec![MediaFile::new(None, "text/plain", b"hi".to_vec())];
        assert!(DocumentFiles::classify(odd).is_err());
    }

    #[test]
    fn test_field_parsing() {
        assert_eq!(parse_pages(Some("12")), Some(12));
        assert_eq!(parse_pages(Some("0")), None);
        assert_eq!(parse_pages(Some("douze")), None);
        assert_eq!(parse_number(Some(" 7 ")).unwrap(), Some(7));
    }

    #[tokio::test]
    async fn test_create_requires_all_files() {
        let (_pool, dir, manager, ci) = setup().await;

        let mut partial = upload_list();
        partial.pop();
        let missing = manager
            .create(input("Maths", "terminale", &ci), DocumentFiles::classify(partial).unwrap())
            .await;
        assert!(matches!(missing, Err(ApiError::Validation(_))));
        assert!(!dir.path().join("pdf").exists());

        let document = manager
            .create(
                input("Maths", "terminale", &ci),
                DocumentFiles::classify(upload_list()).unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(document.pages, 1);
        assert_eq!(document.author, UNKNOWN_AUTHOR);
        assert!(document.pdf_url.contains("/pdf/"));
        assert!(document.cover_url.contains("/covers/"));
        assert!(document.video_url.contains("/videos/"));
    }

    #[tokio::test]
    async fn test_search_and_paginate() {
        let (_pool, _dir, manager, ci) = setup().await;
        for (title, category) in [
            ("Algèbre", "terminale"),
            ("Géométrie", "terminale"),
            ("Histoire", "seconde"),
        ] {
            manager
                .create(input(title, category, &ci), DocumentFiles::classify(upload_list()).unwrap())
                .await
                .unwrap();
        }

        let terminale = manager
            .search(DocumentQuery {
                category: Some("terminale".to_string()),
                limit: Some("1".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(terminale.total, 2);
        assert_eq!(terminale.pages, 2);
        assert_eq!(terminale.documents.len(), 1);
        assert_eq!(terminale.documents[0].title, "Géométrie");

        let found = manager
            .search(DocumentQuery {
                search: Some("HISTOIRE".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(found.total, 1);
        assert_eq!(found.page, 1);

        let accented = manager
            .search(DocumentQuery {
                search: Some("GÉOMÉTRIE".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(accented.total, 1);
        assert_eq!(accented.documents[0].title, "Géométrie");
    }

    #[tokio::test]
    async fn test_update_replaces_file_and_delete_cleans_up() {
        let (_pool, dir, manager, ci) = setup().await;
        let document = manager
            .create(input("Maths", "terminale", &ci), DocumentFiles::classify(upload_list()).unwrap())
            .await
            .unwrap();

        let new_pdf = vec![MediaFile::new(
            Some("v2.pdf".to_string()),
            "application/pdf",
            b"%PDF-1.7".to_vec(),
        )];
        let updated = manager
            .update(
                &document.id,
                DocumentInput {
                    pages: Some("40".to_string()),
                    author: Some("  ".to_string()),
                    ..Default::default()
                },
                DocumentFiles::classify(new_pdf).unwrap(),
            )
            .await
            .unwrap();
        assert_ne!(updated.pdf_url, document.pdf_url);
        assert_eq!(updated.cover_url, document.cover_url);
        assert_eq!(updated.pages, 40);
        assert_eq!(updated.author, UNKNOWN_AUTHOR);
        assert_eq!(std::fs::read_dir(dir.path().join("pdf")).unwrap().count(), 1);

        manager.delete(&document.id).await.unwrap();
        for folder in ["pdf", "covers", "videos"] {
            assert_eq!(std::fs::read_dir(dir.path().join(folder)).unwrap().count(), 0);
        }
        assert!(matches!(manager.get(&document.id).await, Err(ApiError::NotFound(_))));
    }
}
