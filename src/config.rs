/// Configuration management for the Panneaux server
use crate::error::{ApiError, ApiResult};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

/// Main server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub service: ServiceConfig,
    pub storage: StorageConfig,
    pub authentication: AuthConfig,
    pub email: Option<EmailConfig>,
    pub media: MediaConfig,
    pub rate_limit: RateLimitConfig,
    pub logging: LoggingConfig,
}

/// Service-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub hostname: String,
    pub port: u16,
    /// Front-end base URL, used for CORS and for links embedded in emails
    pub client_url: String,
    /// Public URL of this server, used to build links to disk-hosted media
    pub public_url: String,
    pub version: String,
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_directory: PathBuf,
    pub database: PathBuf,
}

/// Authentication configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub session_ttl_days: i64,
    /// Sets the `Secure` attribute on the session cookie
    pub cookie_secure: bool,
}

/// Email configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailConfig {
    pub smtp_url: String,
    pub from_address: String,
}

/// Media host configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaConfig {
    pub backend: MediaBackendConfig,
    pub upload_timeout_secs: u64,
    pub max_upload_bytes: u64,
}

/// Media backend selection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum MediaBackendConfig {
    Disk {
        location: PathBuf,
        /// URL prefix under which stored files are served
        public_base_url: String,
    },
    Remote {
        cloud_name: String,
        api_key: String,
        api_secret: String,
        /// API root, e.g. https://api.cloudinary.com/v1_1
        api_base_url: String,
        /// Prefix every delivered asset URL starts with
        delivery_base_url: String,
    },
}

/// Rate limiting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub enabled: bool,
    pub auth_requests_per_second: u32,
    pub auth_burst: u32,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

impl ServerConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> ApiResult<Self> {
        dotenv::dotenv().ok();

        let hostname = env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = env::var("PORT")
            .unwrap_or_else(|_| "5000".to_string())
            .parse()
            .map_err(|_| ApiError::Validation("Invalid port number".to_string()))?;
        let client_url =
            env::var("CLIENT_URL").unwrap_or_else(|_| "http://localhost:5173".to_string());
        let public_url =
            env::var("PUBLIC_URL").unwrap_or_else(|_| format!("http://localhost:{}", port));
        let version = env::var("APP_VERSION")
            .unwrap_or_else(|_| env!("CARGO_PKG_VERSION").to_string());

        let data_directory: PathBuf = env::var("DATA_DIRECTORY")
            .unwrap_or_else(|_| "./data".to_string())
            .into();
        let database = env::var("DATABASE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_directory.join("panneaux.sqlite"));

        let jwt_secret = env::var("JWT_SECRET")
            .map_err(|_| ApiError::Validation("JWT secret required".to_string()))?;
        let session_ttl_days = env::var("SESSION_TTL_DAYS")
            .unwrap_or_else(|_| "7".to_string())
            .parse()
            .unwrap_or(7);
        let cookie_secure = env::var("COOKIE_SECURE")
            .map(|v| v == "true")
            .unwrap_or_else(|_| env::var("APP_ENV").map(|e| e == "production").unwrap_or(false));

        let email = if let Ok(smtp_url) = env::var("SMTP_URL") {
            Some(EmailConfig {
                smtp_url,
                from_address: env::var("EMAIL_FROM")
                    .unwrap_or_else(|_| "Panneaux <noreply@panneaux.local>".to_string()),
            })
        } else {
            None
        };

        let backend = match env::var("MEDIA_BACKEND").as_deref() {
            Ok("remote") => MediaBackendConfig::Remote {
                cloud_name: env::var("MEDIA_CLOUD_NAME")
                    .map_err(|_| ApiError::Validation("Media cloud name required".to_string()))?,
                api_key: env::var("MEDIA_API_KEY")
                    .map_err(|_| ApiError::Validation("Media API key required".to_string()))?,
                api_secret: env::var("MEDIA_API_SECRET")
                    .map_err(|_| ApiError::Validation("Media API secret required".to_string()))?,
                api_base_url: env::var("MEDIA_API_BASE_URL")
                    .unwrap_or_else(|_| "https://api.cloudinary.com/v1_1".to_string()),
                delivery_base_url: env::var("MEDIA_DELIVERY_BASE_URL")
                    .unwrap_or_else(|_| "https://res.cloudinary.com".to_string()),
            },
            _ => MediaBackendConfig::Disk {
                location: env::var("MEDIA_DISK_LOCATION")
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| data_directory.join("uploads")),
                public_base_url: format!("{}/uploads", public_url.trim_end_matches('/')),
            },
        };
        let upload_timeout_secs = env::var("MEDIA_UPLOAD_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".to_string())
            .parse()
            .unwrap_or(30);
        let max_upload_bytes = env::var("MEDIA_MAX_UPLOAD_BYTES")
            .unwrap_or_else(|_| (2u64 * 1024 * 1024 * 1024).to_string())
            .parse()
            .unwrap_or(2 * 1024 * 1024 * 1024);

        let rate_limit_enabled = env::var("RATE_LIMIT_ENABLED")
            .unwrap_or_else(|_| "true".to_string())
            .parse()
            .unwrap_or(true);
        let auth_requests_per_second = env::var("AUTH_REQUESTS_PER_SECOND")
            .unwrap_or_else(|_| "5".to_string())
            .parse()
            .unwrap_or(5);
        let auth_burst = env::var("AUTH_BURST")
            .unwrap_or_else(|_| "20".to_string())
            .parse()
            .unwrap_or(20);

        let log_level = env::var("RUST_LOG")
            .unwrap_or_else(|_| "panneaux_server=debug,tower_http=debug".to_string());
        let log_json = env::var("LOG_FORMAT").map(|f| f == "json").unwrap_or(false);

        Ok(ServerConfig {
            service: ServiceConfig {
                hostname,
                port,
                client_url,
                public_url,
                version,
            },
            storage: StorageConfig {
                data_directory,
                database,
            },
            authentication: AuthConfig {
                jwt_secret,
                session_ttl_days,
                cookie_secure,
            },
            email,
            media: MediaConfig {
                backend,
                upload_timeout_secs,
                max_upload_bytes,
            },
            rate_limit: RateLimitConfig {
                enabled: rate_limit_enabled,
                auth_requests_per_second,
                auth_burst,
            },
            logging: LoggingConfig {
                level: log_level,
                json: log_json,
            },
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> ApiResult<()> {
        if self.service.hostname.is_empty() {
            return Err(ApiError::Validation("Hostname cannot be empty".to_string()));
        }

        if self.authentication.jwt_secret.len() < 32 {
            return Err(ApiError::Validation(
                "JWT secret must be at least 32 characters".to_string(),
            ));
        }

        if self.authentication.session_ttl_days <= 0 {
            return Err(ApiError::Validation(
                "Session lifetime must be positive".to_string(),
            ));
        }

        if self.media.upload_timeout_secs == 0 {
            return Err(ApiError::Validation(
                "Media upload timeout must be positive".to_string(),
            ));
        }

        Ok(())
    }

    /// Configuration used by tests: disk media under `media_dir`, no SMTP.
    pub fn for_tests(media_dir: PathBuf) -> Self {
        ServerConfig {
            service: ServiceConfig {
                hostname: "127.0.0.1".to_string(),
                port: 0,
                client_url: "http://localhost:5173".to_string(),
                public_url: "http://localhost:5000".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
            storage: StorageConfig {
                data_directory: media_dir.clone(),
                database: media_dir.join("test.sqlite"),
            },
            authentication: AuthConfig {
                jwt_secret: "test-secret-that-is-at-least-32-characters".to_string(),
                session_ttl_days: 7,
                cookie_secure: false,
            },
            email: None,
            media: MediaConfig {
                backend: MediaBackendConfig::Disk {
                    location: media_dir,
                    public_base_url: "http://localhost:5000/uploads".to_string(),
                },
                upload_timeout_secs: 30,
                max_upload_bytes: 2 * 1024 * 1024 * 1024,
            },
            rate_limit: RateLimitConfig {
                enabled: false,
                auth_requests_per_second: 5,
                auth_burst: 20,
            },
            logging: LoggingConfig {
                level: "debug".to_string(),
                json: false,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_secret_rejected() {
        let mut config = ServerConfig::for_tests(PathBuf::from("/tmp/panneaux"));
        assert!(config.validate().is_ok());

        config.authentication.jwt_secret = "short".to_string();
        assert!(matches!(config.validate(), Err(ApiError::Validation(_))));
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let mut config = ServerConfig::for_tests(PathBuf::from("/tmp/panneaux"));
        config.media.upload_timeout_secs = 0;
        assert!(config.validate().is_err());
    }
}
