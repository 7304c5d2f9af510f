/// Account manager implementation using runtime queries
/// This version uses sqlx runtime query building instead of compile-time macros
/// to avoid needing DATABASE_URL during compilation

use crate::{
    account::{
        phone, ProfileUpdate, PublicUser, SignupRequest, User, DEFAULT_AVATAR_URL,
        MIN_PASSWORD_LENGTH, RESET_TOKEN_TTL_HOURS, VERIFICATION_CODE_TTL_MINUTES,
    },
    db::{self, account::UserRecord},
    error::{ApiError, ApiResult},
};
use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::{DateTime, Duration, Utc};
use rand::{rngs::OsRng, Rng, RngCore};
use sqlx::{types::Json, Row, SqlitePool};
use validator::Validate;

const USER_COLUMNS: &str = "id, name, username, email, phone, password_hash, is_admin,
    is_super_admin, is_verified, profile_picture, banner_img, headline, location, about,
    skills, experience, education, verification_token, verification_token_expires_at,
    reset_password_token, reset_password_expires_at, last_login, created_at, updated_at";

/// Account manager service
pub struct AccountManager {
    db: SqlitePool,
}

impl AccountManager {
    /// Create a new account manager
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Register a new account.
    ///
    /// Returns the stored record; its `verification_token` holds the
    /// six-digit code to mail to the user.
    pub async fn register(&self, request: &SignupRequest) -> ApiResult<UserRecord> {
        let req = request.trimmed();

        if req.name.is_empty()
            || req.username.is_empty()
            || req.email.is_empty()
            || req.phone.is_empty()
            || req.password.is_empty()
            || req.confirm_password.is_empty()
        {
            return Err(ApiError::Validation("All fields are required".to_string()));
        }

        if req.password != req.confirm_password {
            return Err(ApiError::Validation("Passwords do not match".to_string()));
        }

        validate_password(&req.password)?;

        req.validate()
            .map_err(|_| ApiError::Validation("Invalid email address".to_string()))?;

        let phone = phone::parse(&req.phone)?;
        let email = req.email.to_lowercase();
        let username = req.username.to_lowercase();

        if self.email_exists(&email).await? {
            return Err(ApiError::Validation("Email already in use".to_string()));
        }
        if self.username_exists(&username, None).await? {
            return Err(ApiError::Validation("Username already taken".to_string()));
        }
        if self.name_exists(&req.name, None).await? {
            return Err(ApiError::Validation("Name already taken".to_string()));
        }
        if self.phone_exists(&phone).await? {
            return Err(ApiError::Validation("Phone number already in use".to_string()));
        }

        let password_hash = hash_password(&req.password)?;
        let code = generate_verification_code();
        let now = Utc::now();
        let id = db::new_id();

        sqlx::query(
            "INSERT INTO users (id, name, username, email, phone, password_hash,
                profile_picture, banner_img, verification_token, verification_token_expires_at,
                last_login, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?11, ?11)",
        )
        .bind(&id)
        .bind(&req.name)
        .bind(&username)
        .bind(&email)
        .bind(&phone)
        .bind(&password_hash)
        .bind(DEFAULT_AVATAR_URL)
        .bind(DEFAULT_AVATAR_URL)
        .bind(&code)
        .bind(now + Duration::minutes(VERIFICATION_CODE_TTL_MINUTES))
        .bind(now)
        .execute(&self.db)
        .await
        .map_err(|e| ApiError::duplicate_or(e, "User already exists"))?;

        tracing::info!("Registered user {} ({})", username, id);

        self.require_user(&id).await
    }

    /// Confirm an email address with the code sent at registration
    pub async fn verify_email(&self, code: &str) -> ApiResult<UserRecord> {
        let code = code.trim();
        let record = self
            .find_one(
                "verification_token = ?1 ORDER BY verification_token_expires_at DESC",
                code,
            )
            .await?
            .filter(|u| {
                u.verification_token_expires_at
                    .map(|exp| exp > Utc::now())
                    .unwrap_or(false)
            })
            .ok_or_else(|| {
                ApiError::NotFound("Invalid or expired verification code".to_string())
            })?;

        sqlx::query(
            "UPDATE users SET is_verified = 1, verification_token = NULL,
                verification_token_expires_at = NULL, updated_at = ?2
             WHERE id = ?1",
        )
        .bind(&record.id)
        .bind(Utc::now())
        .execute(&self.db)
        .await?;

        self.require_user(&record.id).await
    }

    /// Check credentials; `identifier` is an email or a username
    pub async fn login(&self, identifier: &str, password: &str) -> ApiResult<UserRecord> {
        let identifier = identifier.trim().to_lowercase();
        if identifier.is_empty() || password.is_empty() {
            return Err(ApiError::Validation(
                "Identifier and password are required".to_string(),
            ));
        }

        let record = self
            .find_one("email = ?1 OR username = ?1", &identifier)
            .await?
            .ok_or_else(|| ApiError::Validation("Invalid credentials".to_string()))?;

        if !verify_password(password, &record.password_hash)? {
            return Err(ApiError::Validation("Invalid credentials".to_string()));
        }

        let now = Utc::now();
        sqlx::query("UPDATE users SET last_login = ?2 WHERE id = ?1")
            .bind(&record.id)
            .bind(now)
            .execute(&self.db)
            .await?;

        Ok(UserRecord {
            last_login: now,
            ..record
        })
    }

    /// Issue a password reset token valid two hours
    pub async fn request_password_reset(&self, email: &str) -> ApiResult<(UserRecord, String)> {
        let email = email.trim().to_lowercase();
        let record = self
            .find_one("email = ?1", &email)
            .await?
            .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;

        let mut bytes = [0u8; 20];
        OsRng.fill_bytes(&mut bytes);
        let token = hex::encode(bytes);

        sqlx::query(
            "UPDATE users SET reset_password_token = ?2, reset_password_expires_at = ?3,
                updated_at = ?4
             WHERE id = ?1",
        )
        .bind(&record.id)
        .bind(&token)
        .bind(Utc::now() + Duration::hours(RESET_TOKEN_TTL_HOURS))
        .bind(Utc::now())
        .execute(&self.db)
        .await?;

        Ok((record, token))
    }

    /// Replace the password of the user holding `token`
    pub async fn reset_password(&self, token: &str, new_password: &str) -> ApiResult<UserRecord> {
        self.reset_password_at(token, new_password, Utc::now()).await
    }

    /// Reset evaluated at `now`; the token is accepted strictly before expiry
    pub async fn reset_password_at(
        &self,
        token: &str,
        new_password: &str,
        now: DateTime<Utc>,
    ) -> ApiResult<UserRecord> {
        let record = self
            .find_one("reset_password_token = ?1", token)
            .await?
            .filter(|u| {
                u.reset_password_expires_at
                    .map(|exp| now < exp)
                    .unwrap_or(false)
            })
            .ok_or_else(|| ApiError::NotFound("Invalid or expired reset token".to_string()))?;

        validate_password(new_password.trim())?;
        let password_hash = hash_password(new_password.trim())?;

        sqlx::query(
            "UPDATE users SET password_hash = ?2, reset_password_token = NULL,
                reset_password_expires_at = NULL, updated_at = ?3
             WHERE id = ?1",
        )
        .bind(&record.id)
        .bind(&password_hash)
        .bind(now)
        .execute(&self.db)
        .await?;

        self.require_user(&record.id).await
    }

    /// Get a user by id
    pub async fn get_user(&self, id: &str) -> ApiResult<Option<UserRecord>> {
        self.find_one("id = ?1", id).await
    }

    /// Get a user by id, failing with NotFound
    pub async fn require_user(&self, id: &str) -> ApiResult<UserRecord> {
        self.get_user(id)
            .await?
            .ok_or_else(|| ApiError::NotFound("User not found".to_string()))
    }

    /// Get a user by username
    pub async fn get_user_by_username(&self, username: &str) -> ApiResult<Option<UserRecord>> {
        self.find_one("username = ?1", &username.trim().to_lowercase())
            .await
    }

    /// Ids of the user's connections
    pub async fn connection_ids(&self, user_id: &str) -> ApiResult<Vec<String>> {
        let rows = sqlx::query(
            "SELECT connection_id FROM user_connections WHERE user_id = ?1 ORDER BY created_at",
        )
        .bind(user_id)
        .fetch_all(&self.db)
        .await?;

        Ok(rows.iter().map(|r| r.get("connection_id")).collect())
    }

    /// Record with its connection list, as served to clients
    pub async fn to_user(&self, record: UserRecord) -> ApiResult<User> {
        let connections = self.connection_ids(&record.id).await?;
        Ok(User::from_record(record, connections))
    }

    /// Up to ten users who are neither the caller nor connected to them
    pub async fn suggestions(&self, user_id: &str) -> ApiResult<Vec<PublicUser>> {
        let sql = format!(
            "SELECT {} FROM users u
             WHERE u.id <> ?1
               AND u.id NOT IN (SELECT connection_id FROM user_connections WHERE user_id = ?1)
             ORDER BY u.created_at DESC
             LIMIT 10",
            PublicUser::columns("u", "")
        );
        let rows = sqlx::query(&sql).bind(user_id).fetch_all(&self.db).await?;

        rows.iter()
            .map(|row| PublicUser::from_prefixed(row, "").map_err(ApiError::from))
            .collect()
    }

    /// Count feed posts authored by a user
    pub async fn post_count(&self, user_id: &str) -> ApiResult<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM posts WHERE author_id = ?1 AND kind = 'post'")
                .bind(user_id)
                .fetch_one(&self.db)
                .await?;
        Ok(count)
    }

    /// Apply a partial profile update. Picture URLs must already be hosted.
    pub async fn update_profile(&self, user_id: &str, update: ProfileUpdate) -> ApiResult<UserRecord> {
        let mut record = self.require_user(user_id).await?;

        if let Some(name) = update.name.map(|n| n.trim().to_string()) {
            if name.is_empty() {
                return Err(ApiError::Validation("Name cannot be empty".to_string()));
            }
            if name != record.name && self.name_exists(&name, Some(user_id)).await? {
                return Err(ApiError::Validation("Name already taken".to_string()));
            }
            record.name = name;
        }
        if let Some(username) = update.username.map(|u| u.trim().to_lowercase()) {
            if username.is_empty() {
                return Err(ApiError::Validation("Username cannot be empty".to_string()));
            }
            if username != record.username && self.username_exists(&username, Some(user_id)).await? {
                return Err(ApiError::Validation("Username already taken".to_string()));
            }
            record.username = username;
        }
        if let Some(headline) = update.headline {
            record.headline = headline;
        }
        if let Some(about) = update.about {
            record.about = about;
        }
        if let Some(location) = update.location {
            record.location = location;
        }
        if let Some(picture) = update.profile_picture {
            record.profile_picture = picture;
        }
        if let Some(banner) = update.banner_img {
            record.banner_img = banner;
        }
        if let Some(skills) = update.skills {
            record.skills = Json(skills);
        }
        if let Some(experience) = update.experience {
            record.experience = Json(experience);
        }
        if let Some(education) = update.education {
            record.education = Json(education);
        }

        sqlx::query(
            "UPDATE users SET name = ?2, username = ?3, headline = ?4, about = ?5, location = ?6,
                profile_picture = ?7, banner_img = ?8, skills = ?9, experience = ?10,
                education = ?11, updated_at = ?12
             WHERE id = ?1",
        )
        .bind(user_id)
        .bind(&record.name)
        .bind(&record.username)
        .bind(&record.headline)
        .bind(&record.about)
        .bind(&record.location)
        .bind(&record.profile_picture)
        .bind(&record.banner_img)
        .bind(&record.skills)
        .bind(&record.experience)
        .bind(&record.education)
        .bind(Utc::now())
        .execute(&self.db)
        .await
        .map_err(|e| ApiError::duplicate_or(e, "Name or username already taken"))?;

        self.require_user(user_id).await
    }

    /// Clear verification codes and reset tokens past their expiry
    pub async fn purge_expired_tokens(&self) -> ApiResult<u64> {
        let now = Utc::now();
        let verification = sqlx::query(
            "UPDATE users SET verification_token = NULL, verification_token_expires_at = NULL
             WHERE verification_token IS NOT NULL AND verification_token_expires_at <= ?1",
        )
        .bind(now)
        .execute(&self.db)
        .await?
        .rows_affected();

        let reset = sqlx::query(
            "UPDATE users SET reset_password_token = NULL, reset_password_expires_at = NULL
             WHERE reset_password_token IS NOT NULL AND reset_password_expires_at <= ?1",
        )
        .bind(now)
        .execute(&self.db)
        .await?
        .rows_affected();

        Ok(verification + reset)
    }

    async fn find_one(&self, predicate: &str, value: &str) -> ApiResult<Option<UserRecord>> {
        let sql = format!("SELECT {} FROM users WHERE {} LIMIT 1", USER_COLUMNS, predicate);
        let record = sqlx::query_as::<_, UserRecord>(&sql)
            .bind(value)
            .fetch_optional(&self.db)
            .await?;
        Ok(record)
    }

    async fn email_exists(&self, email: &str) -> ApiResult<bool> {
        self.exists("email", email, None).await
    }

    async fn phone_exists(&self, phone: &str) -> ApiResult<bool> {
        self.exists("phone", phone, None).await
    }

    async fn username_exists(&self, username: &str, except: Option<&str>) -> ApiResult<bool> {
        self.exists("username", username, except).await
    }

    async fn name_exists(&self, name: &str, except: Option<&str>) -> ApiResult<bool> {
        self.exists("name", name, except).await
    }

    /// Whether another user than `except` holds `value` in a unique column
    async fn exists(&self, column: &str, value: &str, except: Option<&str>) -> ApiResult<bool> {
        let sql = format!(
            "SELECT 1 FROM users WHERE {} = ?1 AND id <> COALESCE(?2, '') LIMIT 1",
            column
        );
        let found = sqlx::query(&sql)
            .bind(value)
            .bind(except)
            .fetch_optional(&self.db)
            .await?;
        Ok(found.is_some())
    }
}

/// Hash a password with Argon2id and a random salt
pub fn hash_password(password: &str) -> ApiResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| ApiError::Internal(format!("Password hashing failed: {}", e)))
}

/// Check a password against a stored PHC string
pub fn verify_password(password: &str, stored: &str) -> ApiResult<bool> {
    let parsed = PasswordHash::new(stored)
        .map_err(|e| ApiError::Internal(format!("Stored password hash is invalid: {}", e)))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

fn validate_password(password: &str) -> ApiResult<()> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(ApiError::Validation(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LENGTH
        )));
    }
    Ok(())
}

/// Six-digit numeric code
fn generate_verification_code() -> String {
    rand::thread_rng().gen_range(100_000..=999_999).to_string()
}
