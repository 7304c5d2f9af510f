/// Recorded shares of feed posts
use crate::{
    api::extract::ApiJson,
    auth::AuthUser,
    context::AppContext,
    db,
    error::ApiResult,
    feed::SharePlatform,
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;

/// Build share routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/shared/:id", post(record_share))
        .route("/shared/post/:post_id", get(shares_for_post))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ShareRequest {
    platform: String,
}

async fn record_share(
    State(ctx): State<AppContext>,
    auth: AuthUser,
    Path(id): Path<String>,
    ApiJson(req): ApiJson<ShareRequest>,
) -> ApiResult<impl IntoResponse> {
    let platform = SharePlatform::parse(&req.platform)?;
    let post_id = db::parse_id(&id, "post")?;

    let share = ctx
        .post_manager
        .record_share(&post_id, auth.id(), platform)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Share recorded successfully",
            "share": share
        })),
    ))
}

async fn shares_for_post(
    State(ctx): State<AppContext>,
    Path(post_id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let post_id = db::parse_id(&post_id, "post")?;
    let shares = ctx.post_manager.shares_for(&post_id).await?;
    Ok(Json(json!({
        "count": shares.len(),
        "shares": shares
    })))
}
