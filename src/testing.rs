//! Fixtures shared by unit tests

use crate::{
    account::DEFAULT_AVATAR_URL,
    db,
    media::{disk::DiskMediaBackend, MediaStore},
};
use chrono::Utc;
use sqlx::SqlitePool;
use std::{sync::Arc, time::Duration};
use tempfile::TempDir;

/// Insert a bare user row and return its id
pub async fn insert_user(pool: &SqlitePool, username: &str) -> String {
    let id = db::new_id();
    let now = Utc::now();
    sqlx::query(
        "INSERT INTO users (id, name, username, email, phone, password_hash, profile_picture,
            banner_img, last_login, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, 'unused', ?6, ?6, ?7, ?7, ?7)",
    )
    .bind(&id)
    .bind(format!("{} name", username))
    .bind(username)
    .bind(format!("{}@example.com", username))
    .bind(format!("+33{}", &id[..8]))
    .bind(DEFAULT_AVATAR_URL)
    .bind(now)
    .execute(pool)
    .await
    .unwrap();
    id
}

/// Grant the admin flag, or the super-admin flag when `super_admin`
pub async fn promote(pool: &SqlitePool, user_id: &str, super_admin: bool) {
    let column = if super_admin { "is_super_admin" } else { "is_admin" };
    sqlx::query(&format!("UPDATE users SET {} = 1 WHERE id = ?1", column))
        .bind(user_id)
        .execute(pool)
        .await
        .unwrap();
}

/// Insert a country row and return its id
pub async fn insert_country(pool: &SqlitePool, name: &str, code: &str) -> String {
    let id = db::new_id();
    let now = Utc::now();
    sqlx::query(
        "INSERT INTO countries (id, name, code, continent, created_at, updated_at)
         VALUES (?1, ?2, ?3, 'Afrique', ?4, ?4)",
    )
    .bind(&id)
    .bind(name)
    .bind(code)
    .bind(now)
    .execute(pool)
    .await
    .unwrap();
    id
}

/// Media store writing under `dir`, served at `http://localhost:5000/uploads`
pub fn disk_media(dir: &TempDir) -> Arc<MediaStore> {
    let backend = Arc::new(DiskMediaBackend::new(
        dir.path().to_path_buf(),
        "http://localhost:5000/uploads",
    ));
    Arc::new(MediaStore::with_backend(backend, Duration::from_secs(5), 1 << 20))
}
