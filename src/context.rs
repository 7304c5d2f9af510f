/// Application context and dependency injection
use crate::{
    account::AccountManager,
    catalog::{
        CountryManager, CourseManager, DocumentManager, FilterManager, LegalTextManager,
        MissionKind, MissionManager, ReviewManager,
    },
    config::{MediaBackendConfig, ServerConfig},
    db,
    error::{ApiError, ApiResult},
    feed::{FeedKind, FeedManager},
    mailer::Mailer,
    media::MediaStore,
    messaging::MessageManager,
    notifications::NotificationManager,
    rate_limit::RateLimiter,
    scheduling::AppointmentManager,
    social::ConnectionManager,
};
use sqlx::SqlitePool;
use std::{path::PathBuf, sync::Arc};

/// Application context holding all shared services
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<ServerConfig>,
    pub db: SqlitePool,
    pub account_manager: Arc<AccountManager>,
    pub connection_manager: Arc<ConnectionManager>,
    // Feed
    pub post_manager: Arc<FeedManager>,
    pub panneau_manager: Arc<FeedManager>,
    pub message_manager: Arc<MessageManager>,
    pub notification_manager: Arc<NotificationManager>,
    pub appointment_manager: Arc<AppointmentManager>,
    // Reference data
    pub country_manager: Arc<CountryManager>,
    pub filter_manager: Arc<FilterManager>,
    pub legal_text_manager: Arc<LegalTextManager>,
    pub course_manager: Arc<CourseManager>,
    pub review_manager: Arc<ReviewManager>,
    pub document_manager: Arc<DocumentManager>,
    pub mission_panneau_manager: Arc<MissionManager>,
    pub notre_mission_manager: Arc<MissionManager>,
    pub media_store: Arc<MediaStore>,
    pub mailer: Arc<Mailer>,
    pub rate_limiter: Arc<RateLimiter>,
    pub http_client: reqwest::Client,
}

impl AppContext {
    /// Create a new application context from configuration
    pub async fn new(config: ServerConfig) -> ApiResult<Self> {
        config.validate()?;

        Self::ensure_directories(&config).await?;

        let pool = db::create_pool(&config.storage.database, db::DatabaseOptions::default()).await?;
        db::run_migrations(&pool).await?;
        db::test_connection(&pool).await?;

        Self::assemble(config, pool)
    }

    /// Context over a fresh in-memory database with disk media under `media_dir`
    pub async fn for_tests(media_dir: PathBuf) -> ApiResult<Self> {
        let pool = db::memory_pool().await?;
        Self::assemble(ServerConfig::for_tests(media_dir), pool)
    }

    fn assemble(config: ServerConfig, pool: SqlitePool) -> ApiResult<Self> {
        let media_store = Arc::new(MediaStore::new(&config.media));
        let notification_manager = Arc::new(NotificationManager::new(pool.clone()));

        let feed = |kind| {
            Arc::new(FeedManager::new(
                pool.clone(),
                kind,
                Arc::clone(&notification_manager),
                Arc::clone(&media_store),
            ))
        };
        let post_manager = feed(FeedKind::Post);
        let panneau_manager = feed(FeedKind::Panneau);

        let mailer = Arc::new(Mailer::new(config.email.clone())?);
        let rate_limiter = Arc::new(RateLimiter::new(&config.rate_limit));

        let http_client = reqwest::Client::builder()
            .user_agent(concat!("panneaux-server/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ApiError::Internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            account_manager: Arc::new(AccountManager::new(pool.clone())),
            connection_manager: Arc::new(ConnectionManager::new(
                pool.clone(),
                Arc::clone(&notification_manager),
            )),
            post_manager,
            panneau_manager,
            message_manager: Arc::new(MessageManager::new(
                pool.clone(),
                Arc::clone(&notification_manager),
            )),
            appointment_manager: Arc::new(AppointmentManager::new(pool.clone())),
            country_manager: Arc::new(CountryManager::new(pool.clone(), Arc::clone(&media_store))),
            filter_manager: Arc::new(FilterManager::new(pool.clone())),
            legal_text_manager: Arc::new(LegalTextManager::new(pool.clone())),
            course_manager: Arc::new(CourseManager::new(pool.clone(), Arc::clone(&media_store))),
            review_manager: Arc::new(ReviewManager::new(pool.clone())),
            document_manager: Arc::new(DocumentManager::new(pool.clone(), Arc::clone(&media_store))),
            mission_panneau_manager: Arc::new(MissionManager::new(
                pool.clone(),
                MissionKind::MissionPanneau,
            )),
            notre_mission_manager: Arc::new(MissionManager::new(
                pool.clone(),
                MissionKind::NotreMission,
            )),
            notification_manager,
            media_store,
            mailer,
            rate_limiter,
            http_client,
            config: Arc::new(config),
            db: pool,
        })
    }

    /// Ensure required directories exist
    async fn ensure_directories(config: &ServerConfig) -> ApiResult<()> {
        tokio::fs::create_dir_all(&config.storage.data_directory)
            .await
            .map_err(|e| {
                ApiError::Internal(format!(
                    "Failed to create directory {:?}: {}",
                    config.storage.data_directory, e
                ))
            })?;

        if let Some(parent) = config.storage.database.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        if let MediaBackendConfig::Disk { location, .. } = &config.media.backend {
            tokio::fs::create_dir_all(location).await?;
        }

        Ok(())
    }

    /// Front-end URL of a user's profile, linked from emails
    pub fn profile_url(&self, username: &str) -> String {
        format!(
            "{}/profile/{}",
            self.config.service.client_url.trim_end_matches('/'),
            urlencoding::encode(username)
        )
    }

    /// Front-end URL of any client page
    pub fn client_link(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.config.service.client_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}
