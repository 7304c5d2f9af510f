/// Session cookies, authentication extractors and role checks
use crate::{
    context::AppContext,
    db::account::UserRecord,
    error::{ApiError, ApiResult},
};
use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

/// Name of the session cookie
pub const SESSION_COOKIE: &str = "panneaux";

/// Claims carried by the session token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    #[serde(rename = "userId")]
    pub user_id: String,
    pub iat: i64,
    pub exp: i64,
}

/// Sign a session token for `user_id`
pub fn issue_session_token(user_id: &str, jwt_secret: &str, ttl_days: i64) -> ApiResult<String> {
    let now = Utc::now();
    let claims = SessionClaims {
        user_id: user_id.to_string(),
        iat: now.timestamp(),
        exp: (now + Duration::days(ttl_days)).timestamp(),
    };

    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(jwt_secret.as_bytes()),
    )
    .map_err(|e| ApiError::Internal(format!("Failed to sign session token: {}", e)))
}

/// Verify a session token with full validation
///
/// This performs:
/// 1. JWT signature verification
/// 2. Expiration checking
pub fn verify_session_token(token: &str, jwt_secret: &str) -> ApiResult<SessionClaims> {
    let decoding_key = DecodingKey::from_secret(jwt_secret.as_bytes());
    let mut validation = Validation::new(Algorithm::HS256);
    validation.leeway = 60;

    decode::<SessionClaims>(token, &decoding_key, &validation)
        .map(|data| data.claims)
        .map_err(|e| {
            tracing::debug!("Session token verification failed: {}", e);
            match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                    ApiError::Authentication("Session has expired".to_string())
                }
                jsonwebtoken::errors::ErrorKind::InvalidSignature => {
                    ApiError::Authentication("Invalid session signature".to_string())
                }
                _ => ApiError::Authentication("Invalid session token".to_string()),
            }
        })
}

/// Add a freshly signed session cookie to `jar`
pub fn set_session_cookie(jar: CookieJar, ctx: &AppContext, user_id: &str) -> ApiResult<CookieJar> {
    let auth = &ctx.config.authentication;
    let token = issue_session_token(user_id, &auth.jwt_secret, auth.session_ttl_days)?;

    let cookie = Cookie::build((SESSION_COOKIE, token))
        .http_only(true)
        .same_site(SameSite::Strict)
        .secure(auth.cookie_secure)
        .path("/")
        .max_age(time::Duration::days(auth.session_ttl_days));

    Ok(jar.add(cookie))
}

/// Remove the session cookie from `jar`
pub fn clear_session_cookie(jar: CookieJar) -> CookieJar {
    jar.remove(Cookie::build(SESSION_COOKIE).path("/"))
}

/// Privileged roles a user may hold
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Admin,
    SuperAdmin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::SuperAdmin => "superadmin",
        }
    }
}

/// Roles accepted by a route; holding any one of them is sufficient
#[derive(Debug, Clone, Copy)]
pub struct RoleSet(&'static [Role]);

impl RoleSet {
    /// Administrators only
    pub const ADMIN: RoleSet = RoleSet(&[Role::Admin]);
    /// Administrators and super-administrators
    pub const STAFF: RoleSet = RoleSet(&[Role::Admin, Role::SuperAdmin]);

    pub fn allows(&self, held: &[Role]) -> bool {
        self.0.iter().any(|required| held.contains(required))
    }

    fn describe(&self) -> String {
        self.0
            .iter()
            .map(Role::as_str)
            .collect::<Vec<_>>()
            .join(" or ")
    }
}

/// Authenticated caller, resolved from the session cookie
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user: UserRecord,
}

impl AuthUser {
    pub fn id(&self) -> &str {
        &self.user.id
    }

    /// Roles derived from the account flags
    pub fn roles(&self) -> Vec<Role> {
        let mut roles = Vec::new();
        if self.user.is_admin {
            roles.push(Role::Admin);
        }
        if self.user.is_super_admin {
            roles.push(Role::SuperAdmin);
        }
        roles
    }

    pub fn has_any(&self, set: RoleSet) -> bool {
        set.allows(&self.roles())
    }

    /// Fail with 403 unless the caller holds a role in `set`
    pub fn require(&self, set: RoleSet) -> ApiResult<()> {
        if self.has_any(set) {
            Ok(())
        } else {
            tracing::warn!("User {} denied: requires {}", self.user.id, set.describe());
            Err(ApiError::Authorization(format!(
                "Access restricted to {}",
                set.describe()
            )))
        }
    }

    /// Owner of a resource, or a holder of a role in `set`
    pub fn require_owner_or(&self, owner_id: &str, set: RoleSet) -> ApiResult<()> {
        if self.user.id == owner_id {
            return Ok(());
        }
        self.require(set)
    }
}

async fn resolve_session(parts: &Parts, state: &AppContext) -> ApiResult<AuthUser> {
    let jar = CookieJar::from_headers(&parts.headers);
    let token = jar
        .get(SESSION_COOKIE)
        .map(|c| c.value().to_string())
        .ok_or_else(|| ApiError::Authentication("Not authenticated".to_string()))?;

    let claims = verify_session_token(&token, &state.config.authentication.jwt_secret)?;

    let user = state
        .account_manager
        .get_user(&claims.user_id)
        .await?
        .ok_or_else(|| ApiError::Authentication("User no longer exists".to_string()))?;

    Ok(AuthUser { user })
}

#[async_trait]
impl FromRequestParts<AppContext> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppContext,
    ) -> Result<Self, Self::Rejection> {
        resolve_session(parts, state).await
    }
}

/// Optional authenticated caller - does not fail if no session provided
#[derive(Debug, Clone)]
pub struct OptionalAuthUser {
    pub auth: Option<AuthUser>,
}

#[async_trait]
impl FromRequestParts<AppContext> for OptionalAuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppContext,
    ) -> Result<Self, Self::Rejection> {
        let auth = match resolve_session(parts, state).await {
            Ok(auth) => Some(auth),
            Err(ApiError::Authentication(_)) => None,
            Err(e) => return Err(e),
        };
        Ok(OptionalAuthUser { auth })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret-that-is-at-least-32-characters";

    #[test]
    fn test_session_token_roundtrip() {
        let token = issue_session_token("user-1", SECRET, 7).unwrap();
        let claims = verify_session_token(&token, SECRET).unwrap();
        assert_eq!(claims.user_id, "user-1");
        assert_eq!(claims.exp - claims.iat, 7 * 24 * 3600);
    }

    #[test]
    fn test_session_token_wrong_secret() {
        let token = issue_session_token("user-1", SECRET, 7).unwrap();
        let result = verify_session_token(&token, "another-secret-that-is-32-characters-long");
        assert!(matches!(result, Err(ApiError::Authentication(_))));
    }

    #[test]
    fn test_expired_session_token() {
        let claims = SessionClaims {
            user_id: "user-1".to_string(),
            iat: Utc::now().timestamp() - 10_000,
            exp: Utc::now().timestamp() - 5_000,
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap();

        assert!(verify_session_token(&token, SECRET).is_err());
    }

    #[test]
    fn test_role_sets() {
        assert!(RoleSet::STAFF.allows(&[Role::SuperAdmin]));
        assert!(RoleSet::STAFF.allows(&[Role::Admin]));
        assert!(!RoleSet::ADMIN.allows(&[Role::SuperAdmin]));
        assert!(!RoleSet::STAFF.allows(&[]));
    }
}
