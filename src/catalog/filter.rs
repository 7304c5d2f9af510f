use crate::{
    catalog::{provided, required},
    db,
    error::{ApiError, ApiResult},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterType {
    Juridiction,
    Thematique,
    Annee,
}

impl FilterType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterType::Juridiction => "juridiction",
            FilterType::Thematique => "thematique",
            FilterType::Annee => "annee",
        }
    }

    pub fn parse(raw: &str) -> ApiResult<Self> {
        match raw.trim() {
            "juridiction" => Ok(FilterType::Juridiction),
            "thematique" => Ok(FilterType::Thematique),
            "annee" => Ok(FilterType::Annee),
            other => Err(ApiError::Validation(format!("Unknown filter type: {}", other))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Filter {
    pub id: String,
    #[serde(rename = "type")]
    pub filter_type: FilterType,
    pub label: String,
    pub country: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterInput {
    #[serde(rename = "type")]
    pub filter_type: Option<String>,
    pub label: Option<String>,
    pub country: Option<String>,
}

/// Filters of one country (or all) grouped by type, each list by label
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GroupedFilters {
    pub juridiction: Vec<Filter>,
    pub thematique: Vec<Filter>,
    pub annee: Vec<Filter>,
}

pub struct FilterManager {
    db: SqlitePool,
}

impl FilterManager {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    pub async fn create(&self, input: FilterInput) -> ApiResult<Filter> {
        let country = required(input.country.as_deref(), "Country")?;
        let country = db::parse_id(country, "country")?;
        let filter_type = FilterType::parse(required(input.filter_type.as_deref(), "Type")?)?;
        let label = required(input.label.as_deref(), "Label")?;

        let known = sqlx::query("SELECT 1 FROM countries WHERE id = ?1")
            .bind(&country)
            .fetch_optional(&self.db)
            .await?;
        if known.is_none() {
            return Err(ApiError::NotFound("Country not found".to_string()));
        }

        let id = db::new_id();
        let now = Utc::now();
        sqlx::query(
            "INSERT INTO filters (id, type, label, country_id, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
        )
        .bind(&id)
        .bind(filter_type.as_str())
        .bind(label)
        .bind(&country)
        .bind(now)
        .execute(&self.db)
        .await
        .map_err(|e| ApiError::duplicate_or(e, "This filter already exists"))?;

        self.get(&id).await
    }

    /// Filters grouped by type, optionally restricted to one country
    pub async fn grouped(&self, country: Option<&str>) -> ApiResult<GroupedFilters> {
        let country = match provided(country) {
            Some(raw) => Some(db::parse_id(raw, "country")?),
            None => None,
        };

        let rows = sqlx::query(
            "SELECT id, type, label, country_id, created_at, updated_at FROM filters
             WHERE ?1 IS NULL OR country_id = ?1
             ORDER BY label",
        )
        .bind(&country)
        .fetch_all(&self.db)
        .await?;

        let mut grouped = GroupedFilters::default();
        for row in &rows {
            let filter = filter_from_row(row)?;
            match filter.filter_type {
                FilterType::Juridiction => grouped.juridiction.push(filter),
                FilterType::Thematique => grouped.thematique.push(filter),
                FilterType::Annee => grouped.annee.push(filter),
            }
        }
        Ok(grouped)
    }

    pub async fn get(&self, id: &str) -> ApiResult<Filter> {
        let row = sqlx::query(
            "SELECT id, type, label, country_id, created_at, updated_at FROM filters WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| ApiError::NotFound("Filter not found".to_string()))?;
        filter_from_row(&row)
    }

    /// Change the type and/or label
    pub async fn update(&self, id: &str, input: FilterInput) -> ApiResult<Filter> {
        let current = self.get(id).await?;
        let filter_type = match provided(input.filter_type.as_deref()) {
            Some(raw) => FilterType::parse(raw)?,
            None => current.filter_type,
        };
        let label = provided(input.label.as_deref()).unwrap_or(&current.label);

        sqlx::query("UPDATE filters SET type = ?2, label = ?3, updated_at = ?4 WHERE id = ?1")
            .bind(id)
            .bind(filter_type.as_str())
            .bind(label)
            .bind(Utc::now())
            .execute(&self.db)
            .await
            .map_err(|e| ApiError::duplicate_or(e, "This filter already exists"))?;

        self.get(id).await
    }

    pub async fn delete(&self, id: &str) -> ApiResult<()> {
        let result = sqlx::query("DELETE FROM filters WHERE id = ?1")
            .bind(id)
            .execute(&self.db)
            .await?;
        if result.rows_affected() == 0 {
            return Err(ApiError::NotFound("Filter not found".to_string()));
        }
        Ok(())
    }
}

fn filter_from_row(row: &SqliteRow) -> ApiResult<Filter> {
    let raw_type: String = row.try_get("type")?;
    Ok(Filter {
        id: row.try_get("id")?,
        filter_type: FilterType::parse(&raw_type)?,
        label: row.try_get("label")?,
        country: row.try_get("country_id")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}
