use crate::{
    catalog::{parse_date, provided, required},
    db,
    error::{ApiError, ApiResult},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};

/// The two mission pages share one table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MissionKind {
    /// Mission statement shown on the panneaux board
    MissionPanneau,
    /// "Notre mission" page, with its French text and objective
    NotreMission,
}

impl MissionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MissionKind::MissionPanneau => "missionpanneau",
            MissionKind::NotreMission => "notremission",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Mission {
    pub id: String,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contenu: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub objectif: Option<String>,
    pub date: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MissionInput {
    pub content: Option<String>,
    pub contenu: Option<String>,
    pub objectif: Option<String>,
    pub date: Option<String>,
}

pub struct MissionManager {
    db: SqlitePool,
    kind: MissionKind,
}

impl MissionManager {
    pub fn new(db: SqlitePool, kind: MissionKind) -> Self {
        Self { db, kind }
    }

    pub fn kind(&self) -> MissionKind {
        self.kind
    }

    pub async fn create(&self, input: MissionInput) -> ApiResult<Mission> {
        let content = required(input.content.as_deref(), "Content")?;
        let (contenu, objectif) = match self.kind {
            MissionKind::MissionPanneau => (None, None),
            MissionKind::NotreMission => (
                Some(required(input.contenu.as_deref(), "Contenu")?),
                Some(required(input.objectif.as_deref(), "Objectif")?),
            ),
        };
        let now = Utc::now();
        let date = parse_date(input.date.as_deref(), "date")?.unwrap_or(now);

        let id = db::new_id();
        sqlx::query(
            "INSERT INTO missions (id, kind, content, contenu, objectif, date, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
        )
        .bind(&id)
        .bind(self.kind.as_str())
        .bind(content)
        .bind(contenu)
        .bind(objectif)
        .bind(date)
        .bind(now)
        .execute(&self.db)
        .await?;

        self.get(&id).await
    }

    /// Newest first
    pub async fn list(&self) -> ApiResult<Vec<Mission>> {
        let rows = sqlx::query(
            "SELECT id, content, contenu, objectif, date, created_at, updated_at FROM missions
             WHERE kind = ?1 ORDER BY created_at DESC, rowid DESC",
        )
        .bind(self.kind.as_str())
        .fetch_all(&self.db)
        .await?;
        rows.iter().map(mission_from_row).collect()
    }

    pub async fn get(&self, id: &str) -> ApiResult<Mission> {
        let row = sqlx::query(
            "SELECT id, content, contenu, objectif, date, created_at, updated_at FROM missions
             WHERE id = ?1 AND kind = ?2",
        )
        .bind(id)
        .bind(self.kind.as_str())
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| ApiError::NotFound("Mission not found".to_string()))?;
        mission_from_row(&row)
    }

    pub async fn update(&self, id: &str, input: MissionInput) -> ApiResult<Mission> {
        let current = self.get(id).await?;
        let date = parse_date(input.date.as_deref(), "date")?.unwrap_or(current.date);

        sqlx::query(
            "UPDATE missions SET content = ?2, contenu = ?3, objectif = ?4, date = ?5, updated_at = ?6
             WHERE id = ?1",
        )
        .bind(id)
        .bind(provided(input.content.as_deref()).unwrap_or(&current.content))
        .bind(provided(input.contenu.as_deref()).or(current.contenu.as_deref()))
        .bind(provided(input.objectif.as_deref()).or(current.objectif.as_deref()))
        .bind(date)
        .bind(Utc::now())
        .execute(&self.db)
        .await?;

        self.get(id).await
    }

    pub async fn delete(&self, id: &str) -> ApiResult<()> {
        let result = sqlx::query("DELETE FROM missions WHERE id = ?1 AND kind = ?2")
            .bind(id)
            .bind(self.kind.as_str())
            .execute(&self.db)
            .await?;
        if result.rows_affected() == 0 {
            return Err(ApiError::NotFound("Mission not found".to_string()));
        }
        Ok(())
    }
}

fn mission_from_row(row: &SqliteRow) -> ApiResult<Mission> {
    Ok(Mission {
        id: row.try_get("id")?,
        content: row.try_get("content")?,
        contenu: row.try_get("contenu")?,
        objectif: row.try_get("objectif")?,
        date: row.try_get("date")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn content(text: &str) -> MissionInput {
        MissionInput {
            content: Some(text.to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_kinds_are_separate() {
        let pool = db::memory_pool().await.unwrap();
        let panneau = MissionManager::new(pool.clone(), MissionKind::MissionPanneau);
        let notre = MissionManager::new(pool, MissionKind::NotreMission);

        let mission = panneau.create(content("Informer")).await.unwrap();
        assert!(mission.contenu.is_none());

        assert!(matches!(
            notre.create(content("Former")).await,
            Err(ApiError::Validation(_))
        ));
        notre
            .create(MissionInput {
                content: Some("Former".to_string()),
                contenu: Some("Accompagner les citoyens".to_string()),
                objectif: Some("Rendre le droit accessible".to_string()),
                date: Some("2024-01-15".to_string()),
            })
            .await
            .unwrap();

        assert_eq!(panneau.list().await.unwrap().len(), 1);
        assert_eq!(notre.list().await.unwrap().len(), 1);
        assert!(matches!(notre.get(&mission.id).await, Err(ApiError::NotFound(_))));
        assert!(matches!(notre.delete(&mission.id).await, Err(ApiError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_update_merges() {
        let pool = db::memory_pool().await.unwrap();
        let panneau = MissionManager::new(pool, MissionKind::MissionPanneau);
        let mission = panneau.create(content("Informer")).await.unwrap();

        let updated = panneau
            .update(
                &mission.id,
                MissionInput {
                    date: Some("2025-05-01".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.content, "Informer");
        assert_eq!(updated.date.to_rfc3339(), "2025-05-01T00:00:00+00:00");

        assert!(matches!(
            panneau.create(content("  ")).await,
            Err(ApiError::Validation(_))
        ));
        assert!(matches!(
            panneau
                .update(
                    &mission.id,
                    MissionInput {
                        date: Some("demain".to_string()),
                        ..Default::default()
                    }
                )
                .await,
            Err(ApiError::Validation(_))
        ));

        panneau.delete(&mission.id).await.unwrap();
        assert!(panneau.list().await.unwrap().is_empty());
    }
}
