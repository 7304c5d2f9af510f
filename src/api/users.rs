/// Profiles and suggestions
use crate::{
    api::extract::ApiJson,
    account::{ProfileUpdate, PublicUser, User},
    auth::AuthUser,
    context::AppContext,
    db,
    error::{ApiError, ApiResult},
    media::MediaKind,
};
use axum::{
    extract::{Path, State},
    routing::{get, put},
    Json, Router,
};
use serde_json::json;

const PROFILE_FOLDER: &str = "profiles";

/// Build user routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/users/suggestions", get(suggestions))
        .route("/users/pr/:username", get(public_profile))
        .route("/users/profile", put(update_profile))
        .route("/users/:user_id/posts/count", get(post_count))
}

async fn suggestions(State(ctx): State<AppContext>, auth: AuthUser) -> ApiResult<Json<Vec<PublicUser>>> {
    Ok(Json(ctx.account_manager.suggestions(auth.id()).await?))
}

async fn public_profile(
    State(ctx): State<AppContext>,
    _auth: AuthUser,
    Path(username): Path<String>,
) -> ApiResult<Json<User>> {
    let record = ctx
        .account_manager
        .get_user_by_username(&username)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;
    Ok(Json(ctx.account_manager.to_user(record).await?))
}

/// Partial profile edit; pictures sent as data URIs are uploaded first
async fn update_profile(
    State(ctx): State<AppContext>,
    auth: AuthUser,
    ApiJson(mut update): ApiJson<ProfileUpdate>,
) -> ApiResult<Json<serde_json::Value>> {
    if let Some(picture) = update.profile_picture.take() {
        let outcome = ctx
            .media_store
            .accept_reference(&picture, &[MediaKind::Image], PROFILE_FOLDER, false)
            .await?;
        update.profile_picture = Some(outcome.url().to_string());
    }
    if let Some(banner) = update.banner_img.take() {
        let outcome = ctx
            .media_store
            .accept_reference(&banner, &[MediaKind::Image], PROFILE_FOLDER, false)
            .await?;
        update.banner_img = Some(outcome.url().to_string());
    }

    let record = ctx.account_manager.update_profile(auth.id(), update).await?;
    let user = ctx.account_manager.to_user(record).await?;

    Ok(Json(json!({
        "message": "Profile updated successfully",
        "user": user
    })))
}

async fn post_count(
    State(ctx): State<AppContext>,
    _auth: AuthUser,
    Path(user_id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let user_id = db::parse_id(&user_id, "user")?;
    ctx.account_manager.require_user(&user_id).await?;
    let count = ctx.account_manager.post_count(&user_id).await?;
    Ok(Json(json!({ "count": count })))
}
