use crate::{
    account::PublicUser,
    db,
    error::{ApiError, ApiResult},
    scheduling::{Appointment, AppointmentStatus, AppointmentType},
};
use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};

pub struct AppointmentManager {
    db: SqlitePool,
}

impl AppointmentManager {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Whether no live appointment holds `slot`
    pub async fn is_available(&self, slot: DateTime<Utc>) -> ApiResult<bool> {
        self.slot_free(slot, None).await
    }

    /// Book `slot` for `user_id`
    pub async fn reserve(
        &self,
        user_id: &str,
        slot: DateTime<Utc>,
        appointment_type: AppointmentType,
        notes: &str,
    ) -> ApiResult<Appointment> {
        if !self.slot_free(slot, None).await? {
            return Err(taken());
        }

        let id = db::new_id();
        let now = Utc::now();
        sqlx::query(
            "INSERT INTO appointments (id, user_id, type, status, scheduled_at, notes, created_at, updated_at)
             VALUES (?1, ?2, ?3, 'pending', ?4, ?5, ?6, ?6)",
        )
        .bind(&id)
        .bind(user_id)
        .bind(appointment_type.as_str())
        .bind(slot)
        .bind(notes.trim())
        .bind(now)
        .execute(&self.db)
        .await?;

        tracing::info!("Appointment {} reserved by {} at {}", id, user_id, slot);
        self.get(&id).await
    }

    /// Cancel; the owner or a privileged caller may do so
    pub async fn cancel(&self, id: &str, caller: &str, privileged: bool) -> ApiResult<Appointment> {
        let appointment = self.get(id).await?;
        if appointment.user.id != caller && !privileged {
            return Err(ApiError::Authorization(
                "You are not allowed to cancel this appointment".to_string(),
            ));
        }

        self.set_status(id, AppointmentStatus::Cancelled).await?;
        self.get(id).await
    }

    /// Move an appointment to `slot`; owner only. The old slot is freed.
    pub async fn reschedule(&self, id: &str, caller: &str, slot: DateTime<Utc>) -> ApiResult<Appointment> {
        let appointment = self.get(id).await?;
        if appointment.user.id != caller {
            return Err(ApiError::Authorization(
                "You are not allowed to modify this appointment".to_string(),
            ));
        }
        if appointment.status == AppointmentStatus::Cancelled {
            return Err(ApiError::Validation(
                "A cancelled appointment cannot be rescheduled".to_string(),
            ));
        }
        if !self.slot_free(slot, Some(id)).await? {
            return Err(taken());
        }

        sqlx::query(
            "UPDATE appointments SET scheduled_at = ?2, status = 'rescheduled', updated_at = ?3
             WHERE id = ?1",
        )
        .bind(id)
        .bind(slot)
        .bind(Utc::now())
        .execute(&self.db)
        .await?;

        self.get(id).await
    }

    /// Every appointment in slot order
    pub async fn list_all(&self) -> ApiResult<Vec<Appointment>> {
        let sql = format!("{} ORDER BY a.scheduled_at", select_sql());
        let rows = sqlx::query(&sql).fetch_all(&self.db).await?;
        rows.iter().map(appointment_from_row).collect()
    }

    pub async fn get(&self, id: &str) -> ApiResult<Appointment> {
        let sql = format!("{} WHERE a.id = ?1", select_sql());
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| ApiError::NotFound("Appointment not found".to_string()))?;
        appointment_from_row(&row)
    }

    async fn set_status(&self, id: &str, status: AppointmentStatus) -> ApiResult<()> {
        sqlx::query("UPDATE appointments SET status = ?2, updated_at = ?3 WHERE id = ?1")
            .bind(id)
            .bind(status.as_str())
            .bind(Utc::now())
            .execute(&self.db)
            .await?;
        Ok(())
    }

    async fn slot_free(&self, slot: DateTime<Utc>, except: Option<&str>) -> ApiResult<bool> {
        let taken = sqlx::query(
            "SELECT 1 FROM appointments
             WHERE scheduled_at = ?1 AND status <> 'cancelled' AND id <> COALESCE(?2, '')
             LIMIT 1",
        )
        .bind(slot)
        .bind(except)
        .fetch_optional(&self.db)
        .await?;
        Ok(taken.is_none())
    }
}

fn taken() -> ApiError {
    ApiError::Validation("This slot is already booked".to_string())
}

fn select_sql() -> String {
    format!(
        "SELECT a.id, a.type, a.status, a.scheduled_at, a.notes, a.created_at, a.updated_at, {}
         FROM appointments a JOIN users u ON u.id = a.user_id",
        PublicUser::columns("u", "user_")
    )
}

fn appointment_from_row(row: &SqliteRow) -> ApiResult<Appointment> {
    let raw_type: String = row.try_get("type")?;
    let raw_status: String = row.try_get("status")?;
    Ok(Appointment {
        id: row.try_get("id")?,
        user: PublicUser::from_prefixed(row, "user_")?,
        appointment_type: AppointmentType::parse(Some(&raw_type))?,
        status: AppointmentStatus::parse(&raw_status)
            .ok_or_else(|| ApiError::Internal(format!("Unknown status {}", raw_status)))?,
        scheduled_at: row.try_get("scheduled_at")?,
        notes: row.try_get("notes")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{scheduling::parse_slot, testing};

    async fn setup() -> (SqlitePool, AppointmentManager) {
        let pool = db::memory_pool().await.unwrap();
        (pool.clone(), AppointmentManager::new(pool))
    }

    #[tokio::test]
    async fn test_collision_rejected() {
        let (pool, manager) = setup().await;
        let ana = testing::insert_user(&pool, "ana").await;
        let bob = testing::insert_user(&pool, "bob").await;
        let slot = parse_slot("2025-06-02", "10:00").unwrap();

        manager
            .reserve(&ana, slot, AppointmentType::Discussion, "Premier contact")
            .await
            .unwrap();
        assert!(!manager.is_available(slot).await.unwrap());

        let clash = manager.reserve(&bob, slot, AppointmentType::Installation, "").await;
        assert!(matches!(clash, Err(ApiError::Validation(_))));
    }

    #[tokio::test]
    async fn test_reschedule_frees_old_slot() {
        let (pool, manager) = setup().await;
        let ana = testing::insert_user(&pool, "ana").await;
        let bob = testing::insert_user(&pool, "bob").await;
        let old_slot = parse_slot("2025-06-02", "10:00").unwrap();
        let new_slot = parse_slot("2025-06-03", "14:30").unwrap();

        let booked = manager
            .reserve(&ana, old_slot, AppointmentType::Discussion, "")
            .await
            .unwrap();

        assert!(matches!(
            manager.reschedule(&booked.id, &bob, new_slot).await,
            Err(ApiError::Authorization(_))
        ));

        let moved = manager.reschedule(&booked.id, &ana, new_slot).await.unwrap();
        assert_eq!(moved.status, AppointmentStatus::Rescheduled);
        assert_eq!(moved.scheduled_at, new_slot);

        assert!(manager.is_available(old_slot).await.unwrap());
        manager
            .reserve(&bob, old_slot, AppointmentType::Discussion, "")
            .await
            .unwrap();

        // rescheduling onto a taken slot fails
        assert!(matches!(
            manager.reschedule(&booked.id, &ana, old_slot).await,
            Err(ApiError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_cancel_frees_slot() {
        let (pool, manager) = setup().await;
        let ana = testing::insert_user(&pool, "ana").await;
        let bob = testing::insert_user(&pool, "bob").await;
        let slot = parse_slot("2025-06-02", "10:00").unwrap();
        let booked = manager
            .reserve(&ana, slot, AppointmentType::Discussion, "")
            .await
            .unwrap();

        assert!(matches!(
            manager.cancel(&booked.id, &bob, false).await,
            Err(ApiError::Authorization(_))
        ));
        let cancelled = manager.cancel(&booked.id, &bob, true).await.unwrap();
        assert_eq!(cancelled.status, AppointmentStatus::Cancelled);
        assert!(manager.is_available(slot).await.unwrap());

        let all = manager.list_all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].user.id, ana);
    }

    #[tokio::test]
    async fn test_cancelled_appointment_cannot_be_rescheduled() {
        let (pool, manager) = setup().await;
        let ana = testing::insert_user(&pool, "ana").await;
        let slot = parse_slot("2025-06-02", "10:00").unwrap();
        let booked = manager
            .reserve(&ana, slot, AppointmentType::Discussion, "")
            .await
            .unwrap();
        manager.cancel(&booked.id, &ana, false).await.unwrap();

        let later = parse_slot("2025-06-04", "09:00").unwrap();
        assert!(matches!(
            manager.reschedule(&booked.id, &ana, later).await,
            Err(ApiError::Validation(_))
        ));
        let unchanged = manager.get(&booked.id).await.unwrap();
        assert_eq!(unchanged.status, AppointmentStatus::Cancelled);
        assert_eq!(unchanged.scheduled_at, slot);
    }
}
