/// Account management system
///
/// Handles registration, email verification, login, password reset and
/// profile editing.

mod manager;
pub mod phone;

pub use manager::AccountManager;

use crate::db::account::{EducationEntry, ExperienceEntry, UserRecord};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqliteRow, Row};
use validator::Validate;

/// Picture used until a user uploads their own
pub const DEFAULT_AVATAR_URL: &str =
    "https://icon-library.com/images/anonymous-avatar-icon/anonymous-avatar-icon-25.jpg";

/// Verification code lifetime
pub const VERIFICATION_CODE_TTL_MINUTES: i64 = 30;

/// Password reset token lifetime
pub const RESET_TOKEN_TTL_HOURS: i64 = 2;

/// Minimum password length
pub const MIN_PASSWORD_LENGTH: usize = 7;

/// Registration request
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase", default)]
pub struct SignupRequest {
    pub name: String,
    pub username: String,
    #[validate(email(message = "Invalid email address"))]
    pub email: String,
    pub phone: String,
    pub password: String,
    pub confirm_password: String,
}

impl SignupRequest {
    /// Copy with every field trimmed
    pub fn trimmed(&self) -> Self {
        Self {
            name: self.name.trim().to_string(),
            username: self.username.trim().to_string(),
            email: self.email.trim().to_string(),
            phone: self.phone.trim().to_string(),
            password: self.password.trim().to_string(),
            confirm_password: self.confirm_password.trim().to_string(),
        }
    }
}

/// Login request; `identifier` is an email or a username
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    #[serde(alias = "email", alias = "username")]
    pub identifier: String,
    pub password: String,
}

/// Email verification request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyEmailRequest {
    pub code: String,
}

/// Forgot password request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

/// Reset password request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResetPasswordRequest {
    pub password: String,
}

/// Partial profile update; absent fields are left untouched
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProfileUpdate {
    pub name: Option<String>,
    pub username: Option<String>,
    pub headline: Option<String>,
    pub about: Option<String>,
    pub location: Option<String>,
    pub profile_picture: Option<String>,
    pub banner_img: Option<String>,
    pub skills: Option<Vec<String>>,
    pub experience: Option<Vec<ExperienceEntry>>,
    pub education: Option<Vec<EducationEntry>>,
}

/// Full user as returned to its owner and on public profiles; never carries
/// the password hash or pending tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub name: String,
    pub username: String,
    pub email: String,
    pub phone: String,
    pub is_admin: bool,
    pub is_super_admin: bool,
    pub is_verified: bool,
    pub profile_picture: String,
    pub banner_img: String,
    pub headline: String,
    pub location: String,
    pub about: String,
    pub skills: Vec<String>,
    pub experience: Vec<ExperienceEntry>,
    pub education: Vec<EducationEntry>,
    pub connections: Vec<String>,
    pub last_login: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn from_record(record: UserRecord, connections: Vec<String>) -> Self {
        Self {
            id: record.id,
            name: record.name,
            username: record.username,
            email: record.email,
            phone: record.phone,
            is_admin: record.is_admin,
            is_super_admin: record.is_super_admin,
            is_verified: record.is_verified,
            profile_picture: record.profile_picture,
            banner_img: record.banner_img,
            headline: record.headline,
            location: record.location,
            about: record.about,
            skills: record.skills.0,
            experience: record.experience.0,
            education: record.education.0,
            connections,
            last_login: record.last_login,
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}

/// The user fields embedded wherever another record references a user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicUser {
    pub id: String,
    pub name: String,
    pub username: String,
    pub profile_picture: String,
    pub headline: String,
}

impl PublicUser {
    /// Column list selecting a joined user table under a prefix.
    ///
    /// `PublicUser::columns("u", "author_")` pairs with
    /// `PublicUser::from_prefixed(&row, "author_")`.
    pub fn columns(table: &str, prefix: &str) -> String {
        ["id", "name", "username", "profile_picture", "headline"]
            .iter()
            .map(|c| format!("{table}.{c} AS {prefix}{c}"))
            .collect::<Vec<_>>()
            .join(", ")
    }

    pub fn from_prefixed(row: &SqliteRow, prefix: &str) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get(format!("{prefix}id").as_str())?,
            name: row.try_get(format!("{prefix}name").as_str())?,
            username: row.try_get(format!("{prefix}username").as_str())?,
            profile_picture: row.try_get(format!("{prefix}profile_picture").as_str())?,
            headline: row.try_get(format!("{prefix}headline").as_str())?,
        })
    }

    /// Same as `from_prefixed` for LEFT JOINs where the user may be gone
    pub fn from_prefixed_opt(row: &SqliteRow, prefix: &str) -> Result<Option<Self>, sqlx::Error> {
        let id: Option<String> = row.try_get(format!("{prefix}id").as_str())?;
        match id {
            Some(_) => Self::from_prefixed(row, prefix).map(Some),
            None => Ok(None),
        }
    }
}

impl From<&UserRecord> for PublicUser {
    fn from(record: &UserRecord) -> Self {
        Self {
            id: record.id.clone(),
            name: record.name.clone(),
            username: record.username.clone(),
            profile_picture: record.profile_picture.clone(),
            headline: record.headline.clone(),
        }
    }
}

/// Envelope for identity endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountResponse {
    pub success: bool,
    pub message: String,
    pub user: User,
}
