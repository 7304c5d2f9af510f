use crate::{
    catalog::{provided, required},
    db,
    error::{ApiError, ApiResult},
    media::{MediaKind, MediaStore, UploadOutcome},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use std::sync::Arc;

const FLAG_FOLDER: &str = "flags";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Continent {
    Afrique,
    Europe,
    #[serde(rename = "Amérique")]
    Amerique,
    Asie,
    #[serde(rename = "Océanie")]
    Oceanie,
}

impl Continent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Continent::Afrique => "Afrique",
            Continent::Europe => "Europe",
            Continent::Amerique => "Amérique",
            Continent::Asie => "Asie",
            Continent::Oceanie => "Océanie",
        }
    }

    pub fn parse(raw: &str) -> ApiResult<Self> {
        match raw.trim() {
            "Afrique" => Ok(Continent::Afrique),
            "Europe" => Ok(Continent::Europe),
            "Amérique" => Ok(Continent::Amerique),
            "Asie" => Ok(Continent::Asie),
            "Océanie" => Ok(Continent::Oceanie),
            other => Err(ApiError::Validation(format!("Unknown continent: {}", other))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Country {
    pub id: String,
    pub name: String,
    pub code: String,
    pub continent: Continent,
    pub flag_url: Option<String>,
    pub city: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Create and update body; every field is optional on update
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CountryInput {
    pub name: Option<String>,
    pub code: Option<String>,
    pub continent: Option<String>,
    pub flag_url: Option<String>,
    pub city: Option<String>,
}

pub struct CountryManager {
    db: SqlitePool,
    media: Arc<MediaStore>,
}

impl CountryManager {
    pub fn new(db: SqlitePool, media: Arc<MediaStore>) -> Self {
        Self { db, media }
    }

    pub async fn create(&self, input: CountryInput) -> ApiResult<Country> {
        let name = required(input.name.as_deref(), "Name")?.to_string();
        let code = required(input.code.as_deref(), "Code")?.to_uppercase();
        let continent = Continent::parse(required(input.continent.as_deref(), "Continent")?)?;
        let city = provided(input.city.as_deref()).map(str::to_string);

        self.ensure_unique(&name, &code, None).await?;

        let flag = match provided(input.flag_url.as_deref()) {
            Some(flag) => Some(
                self.media
                    .accept_reference(flag, &[MediaKind::Image], FLAG_FOLDER, true)
                    .await?,
            ),
            None => None,
        };
        let flag_url = flag.as_ref().map(|f| f.url().to_string());

        let id = db::new_id();
        let now = Utc::now();
        let inserted = sqlx::query(
            "INSERT INTO countries (id, name, code, continent, flag_url, city, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
        )
        .bind(&id)
        .bind(&name)
        .bind(&code)
        .bind(continent.as_str())
        .bind(&flag_url)
        .bind(&city)
        .bind(now)
        .execute(&self.db)
        .await;

        if let Err(e) = inserted {
            self.discard_flag(flag.as_ref()).await;
            return Err(ApiError::duplicate_or(e, "This country already exists"));
        }

        tracing::info!("Country {} ({}) created", name, code);
        self.get(&id).await
    }

    /// All countries by name
    pub async fn list(&self) -> ApiResult<Vec<Country>> {
        let rows = sqlx::query(
            "SELECT id, name, code, continent, flag_url, city, created_at, updated_at
             FROM countries ORDER BY name",
        )
        .fetch_all(&self.db)
        .await?;
        rows.iter().map(country_from_row).collect()
    }

    pub async fn get(&self, id: &str) -> ApiResult<Country> {
        let row = sqlx::query(
            "SELECT id, name, code, continent, flag_url, city, created_at, updated_at
             FROM countries WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| ApiError::NotFound("Country not found".to_string()))?;
        country_from_row(&row)
    }

    /// Merge the provided fields. A replaced hosted flag is removed.
    pub async fn update(&self, id: &str, input: CountryInput) -> ApiResult<Country> {
        let current = self.get(id).await?;

        let name = provided(input.name.as_deref())
            .map(str::to_string)
            .unwrap_or_else(|| current.name.clone());
        let code = provided(input.code.as_deref())
            .map(str::to_uppercase)
            .unwrap_or_else(|| current.code.clone());
        let continent = match provided(input.continent.as_deref()) {
            Some(raw) => Continent::parse(raw)?,
            None => current.continent,
        };
        let city = provided(input.city.as_deref())
            .map(str::to_string)
            .or_else(|| current.city.clone());

        self.ensure_unique(&name, &code, Some(id)).await?;

        let flag = match provided(input.flag_url.as_deref()) {
            Some(flag) if Some(flag) != current.flag_url.as_deref() => Some(
                self.media
                    .accept_reference(flag, &[MediaKind::Image], FLAG_FOLDER, true)
                    .await?,
            ),
            _ => None,
        };
        let flag_url = match &flag {
            Some(flag) => Some(flag.url().to_string()),
            None => current.flag_url.clone(),
        };

        let updated = sqlx::query(
            "UPDATE countries SET name = ?2, code = ?3, continent = ?4, flag_url = ?5, city = ?6,
                updated_at = ?7
             WHERE id = ?1",
        )
        .bind(id)
        .bind(&name)
        .bind(&code)
        .bind(continent.as_str())
        .bind(&flag_url)
        .bind(&city)
        .bind(Utc::now())
        .execute(&self.db)
        .await;

        if let Err(e) = updated {
            self.discard_flag(flag.as_ref()).await;
            return Err(ApiError::duplicate_or(e, "This country already exists"));
        }

        if let Some(old) = current.flag_url.as_deref() {
            if flag_url.as_deref() != Some(old) {
                self.media.destroy_url(old, MediaKind::Image).await;
            }
        }

        self.get(id).await
    }

    /// Remove a flag uploaded for a write that did not go through
    async fn discard_flag(&self, flag: Option<&UploadOutcome>) {
        if let Some(media) = flag.and_then(UploadOutcome::uploaded) {
            self.media.discard(std::slice::from_ref(media)).await;
        }
    }

    pub async fn delete(&self, id: &str) -> ApiResult<()> {
        let country = self.get(id).await?;

        sqlx::query("DELETE FROM countries WHERE id = ?1")
            .bind(id)
            .execute(&self.db)
            .await
            .map_err(|e| {
                ApiError::referenced_or(e, "Country is still used by courses or documents")
            })?;

        if let Some(flag) = country.flag_url.as_deref() {
            self.media.destroy_url(flag, MediaKind::Image).await;
        }

        tracing::info!("Country {} deleted", country.name);
        Ok(())
    }

    pub async fn exists(&self, id: &str) -> ApiResult<bool> {
        let found = sqlx::query("SELECT 1 FROM countries WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.db)
            .await?;
        Ok(found.is_some())
    }

    async fn ensure_unique(&self, name: &str, code: &str, except: Option<&str>) -> ApiResult<()> {
        let clashes: Vec<(String, String)> = sqlx::query_as(
            "SELECT name, code FROM countries
             WHERE (name = ?1 OR code = ?2) AND id <> COALESCE(?3, '')",
        )
        .bind(name)
        .bind(code)
        .bind(except)
        .fetch_all(&self.db)
        .await?;

        if clashes.iter().any(|(n, _)| n == name) {
            return Err(ApiError::Validation("This country already exists".to_string()));
        }
        if !clashes.is_empty() {
            return Err(ApiError::Validation(
                "This code is already used by another country".to_string(),
            ));
        }
        Ok(())
    }
}

fn country_from_row(row: &SqliteRow) -> ApiResult<Country> {
    let continent: String = row.try_get("continent")?;
    Ok(Country {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        code: row.try_get("code")?,
        continent: Continent::parse(&continent)?,
        flag_url: row.try_get("flag_url")?,
        city: row.try_get("city")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}
