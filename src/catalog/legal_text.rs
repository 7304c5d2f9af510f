use crate::{
    catalog::{provided, required},
    error::{ApiError, ApiResult},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};

/// The legal pages; each exists at most once
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LegalTextType {
    Mentions,
    Cookies,
    Conditions,
}

impl LegalTextType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LegalTextType::Mentions => "mentions",
            LegalTextType::Cookies => "cookies",
            LegalTextType::Conditions => "conditions",
        }
    }

    pub fn parse(raw: &str) -> ApiResult<Self> {
        match raw.trim() {
            "mentions" => Ok(LegalTextType::Mentions),
            "cookies" => Ok(LegalTextType::Cookies),
            "conditions" => Ok(LegalTextType::Conditions),
            other => Err(ApiError::Validation(format!("Unknown legal text type: {}", other))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegalText {
    #[serde(rename = "type")]
    pub text_type: LegalTextType,
    pub title: String,
    pub content: String,
    pub last_updated: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LegalTextInput {
    pub title: Option<String>,
    pub content: Option<String>,
}

pub struct LegalTextManager {
    db: SqlitePool,
}

impl LegalTextManager {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Create a page; 409 when it already exists
    pub async fn create(&self, text_type: LegalTextType, input: LegalTextInput) -> ApiResult<LegalText> {
        let content = required(input.content.as_deref(), "Content")?;
        let title = provided(input.title.as_deref()).unwrap_or("");

        let now = Utc::now();
        let inserted = sqlx::query(
            "INSERT INTO legal_texts (type, title, content, last_updated, created_at)
             VALUES (?1, ?2, ?3, ?4, ?4)
             ON CONFLICT (type) DO NOTHING",
        )
        .bind(text_type.as_str())
        .bind(title)
        .bind(content)
        .bind(now)
        .execute(&self.db)
        .await?;

        if inserted.rows_affected() == 0 {
            return Err(ApiError::Conflict(format!(
                "The {} text already exists",
                text_type.as_str()
            )));
        }
        self.get(text_type).await
    }

    pub async fn get(&self, text_type: LegalTextType) -> ApiResult<LegalText> {
        let row = sqlx::query(
            "SELECT type, title, content, last_updated, created_at FROM legal_texts WHERE type = ?1",
        )
        .bind(text_type.as_str())
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| ApiError::NotFound("Legal text not found".to_string()))?;
        legal_text_from_row(&row)
    }

    /// Create or overwrite a page, stamping `lastUpdated`
    pub async fn upsert(&self, text_type: LegalTextType, input: LegalTextInput) -> ApiResult<LegalText> {
        let now = Utc::now();
        sqlx::query(
            "INSERT INTO legal_texts (type, title, content, last_updated, created_at)
             VALUES (?1, COALESCE(?2, ''), COALESCE(?3, ''), ?4, ?4)
             ON CONFLICT (type) DO UPDATE SET
                title = COALESCE(?2, title),
                content = COALESCE(?3, content),
                last_updated = ?4",
        )
        .bind(text_type.as_str())
        .bind(input.title.as_deref().map(str::trim))
        .bind(input.content.as_deref().map(str::trim))
        .bind(now)
        .execute(&self.db)
        .await?;

        tracing::info!("Legal text {} updated", text_type.as_str());
        self.get(text_type).await
    }
}

fn legal_text_from_row(row: &SqliteRow) -> ApiResult<LegalText> {
    let raw_type: String = row.try_get("type")?;
    Ok(LegalText {
        text_type: LegalTextType::parse(&raw_type)?,
        title: row.try_get("title")?,
        content: row.try_get("content")?,
        last_updated: row.try_get("last_updated")?,
        created_at: row.try_get("created_at")?,
    })
}
