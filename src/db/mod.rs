/// Database layer
///
/// Manages the SQLite connection pool, embedded migrations and the row
/// models shared across managers.

pub mod account;

use crate::error::{ApiError, ApiResult};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use uuid::Uuid;

/// Database connection options
#[derive(Debug, Clone)]
pub struct DatabaseOptions {
    pub max_connections: u32,
    pub enable_wal: bool,
}

impl Default for DatabaseOptions {
    fn default() -> Self {
        Self {
            max_connections: 10,
            enable_wal: true,
        }
    }
}

/// Create a SQLite connection pool
pub async fn create_pool(path: &Path, options: DatabaseOptions) -> ApiResult<SqlitePool> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let pool = SqlitePoolOptions::new()
        .max_connections(options.max_connections)
        .connect_with(
            SqliteConnectOptions::new()
                .filename(path)
                .create_if_missing(true)
                .journal_mode(if options.enable_wal {
                    SqliteJournalMode::Wal
                } else {
                    SqliteJournalMode::Delete
                })
                .foreign_keys(true)
                .busy_timeout(std::time::Duration::from_secs(5)),
        )
        .await?;

    Ok(pool)
}

/// Run migrations embedded at compile time from ./migrations
pub async fn run_migrations(pool: &SqlitePool) -> ApiResult<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| ApiError::Internal(format!("Migration failed: {}", e)))?;

    Ok(())
}

/// Test database connection
pub async fn test_connection(pool: &SqlitePool) -> ApiResult<()> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}

/// In-memory database with the full schema applied.
///
/// A single connection keeps every query on the same in-memory database.
pub async fn memory_pool() -> ApiResult<SqlitePool> {
    let options = SqliteConnectOptions::new()
        .in_memory(true)
        .foreign_keys(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await?;
    run_migrations(&pool).await?;
    Ok(pool)
}

/// Generate a new record identifier
pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

/// Check that a path or body identifier is well formed
pub fn parse_id(raw: &str, what: &str) -> ApiResult<String> {
    Uuid::parse_str(raw.trim())
        .map(|id| id.to_string())
        .map_err(|_| ApiError::Validation(format!("Invalid {} ID", what)))
}

/// Searchable form of user text; SQLite `LIKE` only folds ASCII
pub fn search_text(text: &str) -> String {
    text.to_lowercase()
}

/// `LIKE` pattern matching `raw` as a case-insensitive substring of a
/// [`search_text`] column, wildcards in `raw` matching literally
pub fn contains_pattern(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len() + 2);
    out.push('%');
    for c in search_text(raw).chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('%');
    out
}

/// Page/limit pair read from query strings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub page: i64,
    pub limit: i64,
}

impl Pagination {
    /// Parse `page` and `limit`; missing or unparsable values fall back to
    /// page 1 and `default_limit`, and `limit` is capped at `max_limit`.
    /// `page` is capped so the offset always fits in an `i64`.
    pub fn from_query(
        page: Option<&str>,
        limit: Option<&str>,
        default_limit: i64,
        max_limit: i64,
    ) -> Self {
        let page = page
            .and_then(|p| p.trim().parse::<i64>().ok())
            .filter(|p| *p >= 1)
            .unwrap_or(1);
        let limit = limit
            .and_then(|l| l.trim().parse::<i64>().ok())
            .filter(|l| *l >= 1)
            .unwrap_or(default_limit)
            .min(max_limit)
            .max(1);
        let page = page.min(i64::MAX / limit);
        Self { page, limit }
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1).saturating_mul(self.limit)
    }

    pub fn total_pages(&self, total: i64) -> i64 {
        total.saturating_add(self.limit - 1) / self.limit
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_pool_has_schema() {
        let pool = memory_pool().await.unwrap();
        test_connection(&pool).await.unwrap();

        let tables: Vec<(String,)> =
            sqlx::query_as("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")
                .fetch_all(&pool)
                .await
                .unwrap();
        let names: Vec<&str> = tables.iter().map(|t| t.0.as_str()).collect();

        for expected in ["users", "posts", "comment_replies", "appointments", "course_reviews"] {
            assert!(names.contains(&expected), "missing table {}", expected);
        }
    }

    #[test]
    fn test_pagination() {
        let p = Pagination::from_query(Some("3"), Some("500"), 10, 50);
        assert_eq!(p, Pagination { page: 3, limit: 50 });
        assert_eq!(p.offset(), 100);

        let fallback = Pagination::from_query(Some("zero"), Some("-4"), 10, 50);
        assert_eq!(fallback, Pagination { page: 1, limit: 10 });
        assert_eq!(fallback.total_pages(0), 0);
        assert_eq!(fallback.total_pages(21), 3);
    }

    #[test]
    fn test_pagination_huge_page_does_not_overflow() {
        let p = Pagination::from_query(Some("9223372036854775807"), Some("20"), 10, 50);
        assert_eq!(p.limit, 20);
        assert_eq!(p.page, i64::MAX / 20);
        assert!(p.offset() >= 0);
        assert_eq!(p.total_pages(3), 1);
    }

    #[test]
    fn test_contains_pattern() {
        assert_eq!(contains_pattern("50%_off\\"), "%50\\%\\_off\\\\%");
        assert_eq!(contains_pattern("ÉLECTION"), "%élection%");
        assert_eq!(search_text("Réunion À Abidjan"), "réunion à abidjan");
    }

    #[test]
    fn test_parse_id() {
        let id = new_id();
        assert_eq!(parse_id(&id, "post").unwrap(), id);
        assert!(matches!(parse_id("not-an-id", "post"), Err(ApiError::Validation(_))));
    }
}
