/// Posts and panneaux share one set of handlers, parameterised by a
/// [`FeedRoute`] marker that picks the manager and the role policy.
use crate::{
    api::{extract::ApiJson, upload::MultipartForm},
    auth::{AuthUser, OptionalAuthUser, RoleSet},
    context::AppContext,
    db::{self, Pagination},
    error::{ApiError, ApiResult},
    feed::{FeedManager, FeedUpdate, FeedUploads, LikeOutcome, Post, SharePlatform},
};
use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

/// Which feed a route serves and who may write to it
pub trait FeedRoute: Send + Sync + 'static {
    /// Roles required to publish, edit or delete; `None` means any session
    const EDITORS: Option<RoleSet>;
    /// Whether the listing and single items are readable without a session
    const PUBLIC_READ: bool;

    fn manager(ctx: &AppContext) -> &Arc<FeedManager>;
}

/// `/api/v1/posts`
pub struct Posts;

impl FeedRoute for Posts {
    const EDITORS: Option<RoleSet> = None;
    const PUBLIC_READ: bool = false;

    fn manager(ctx: &AppContext) -> &Arc<FeedManager> {
        &ctx.post_manager
    }
}

/// `/api/v1/panneau`
pub struct Panneaux;

impl FeedRoute for Panneaux {
    const EDITORS: Option<RoleSet> = Some(RoleSet::STAFF);
    const PUBLIC_READ: bool = true;

    fn manager(ctx: &AppContext) -> &Arc<FeedManager> {
        &ctx.panneau_manager
    }
}

/// Build post routes
pub fn post_routes() -> Router<AppContext> {
    Router::new()
        .route("/posts", get(feed::<Posts>).post(create::<Posts>))
        .route("/posts/video-proxy", get(video_proxy))
        .route(
            "/posts/:id",
            get(get_one::<Posts>).put(update::<Posts>).delete(delete_one::<Posts>),
        )
        .route("/posts/:id/like", post(toggle_like::<Posts>))
        .route("/posts/:id/comment", post(add_comment::<Posts>))
        .route(
            "/posts/:id/comments/:comment_id",
            put(update_comment::<Posts>).delete(delete_comment::<Posts>),
        )
        .route("/posts/:id/:comment_id/replies", post(add_reply::<Posts>))
        .route(
            "/posts/:id/comments/:comment_id/replies/:reply_id",
            put(update_reply::<Posts>).delete(delete_reply::<Posts>),
        )
}

/// Build panneau routes
pub fn panneau_routes() -> Router<AppContext> {
    Router::new()
        .route("/panneau/create", post(create::<Panneaux>))
        .route("/panneau/get", get(feed::<Panneaux>))
        .route(
            "/panneau/:id",
            get(get_one::<Panneaux>)
                .put(update::<Panneaux>)
                .delete(delete_one::<Panneaux>),
        )
        .route("/panneau/:id/like", post(toggle_like::<Panneaux>))
        .route("/panneau/:id/comment", post(add_comment::<Panneaux>))
        .route("/panneau/:id/share", post(share_panneau))
        .route(
            "/panneau/:id/comments/:comment_id",
            put(update_comment::<Panneaux>).delete(delete_comment::<Panneaux>),
        )
        .route(
            "/panneau/:id/comments/:comment_id/replies",
            post(add_reply::<Panneaux>),
        )
        .route(
            "/panneau/:id/comments/:comment_id/replies/:reply_id",
            put(update_reply::<Panneaux>).delete(delete_reply::<Panneaux>),
        )
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FeedQuery {
    page: Option<String>,
    limit: Option<String>,
    search: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ContentBody {
    content: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ShareBody {
    platform: String,
}

#[derive(Debug, Deserialize)]
struct ProxyQuery {
    url: Option<String>,
}

fn require_reader<F: FeedRoute>(caller: &OptionalAuthUser) -> ApiResult<()> {
    if !F::PUBLIC_READ && caller.auth.is_none() {
        return Err(ApiError::Authentication("Not authenticated".to_string()));
    }
    Ok(())
}

fn require_editor<F: FeedRoute>(auth: &AuthUser) -> ApiResult<()> {
    match F::EDITORS {
        Some(roles) => auth.require(roles),
        None => Ok(()),
    }
}

async fn create<F: FeedRoute>(
    State(ctx): State<AppContext>,
    auth: AuthUser,
    mut form: MultipartForm,
) -> ApiResult<impl IntoResponse> {
    require_editor::<F>(&auth)?;

    let uploads = FeedUploads {
        images: form.take_files("images"),
        video: form.take_files("video"),
        pdf: form.take_files("pdfdoc"),
    };
    let content = form.text("content").unwrap_or_default().to_string();

    let post = F::manager(&ctx).create(auth.id(), &content, uploads).await?;
    Ok((StatusCode::CREATED, Json(post)))
}

async fn feed<F: FeedRoute>(
    State(ctx): State<AppContext>,
    caller: OptionalAuthUser,
    Query(query): Query<FeedQuery>,
) -> ApiResult<Json<serde_json::Value>> {
    require_reader::<F>(&caller)?;

    let manager = F::manager(&ctx);
    let page = Pagination::from_query(query.page.as_deref(), query.limit.as_deref(), 10, 50);
    let result = manager.feed(page, query.search.as_deref()).await?;

    let mut body = serde_json::Map::new();
    body.insert(
        manager.kind().collection_key().to_string(),
        serde_json::to_value(&result.items)
            .map_err(|e| ApiError::Internal(format!("Failed to encode feed: {}", e)))?,
    );
    body.insert("currentPage".to_string(), json!(result.current_page));
    body.insert("totalPages".to_string(), json!(result.total_pages));
    body.insert("totalPosts".to_string(), json!(result.total));
    Ok(Json(serde_json::Value::Object(body)))
}

async fn get_one<F: FeedRoute>(
    State(ctx): State<AppContext>,
    caller: OptionalAuthUser,
    Path(id): Path<String>,
) -> ApiResult<Json<Post>> {
    require_reader::<F>(&caller)?;
    let manager = F::manager(&ctx);
    let id = db::parse_id(&id, manager.kind().label())?;
    Ok(Json(manager.get(&id).await?))
}

async fn update<F: FeedRoute>(
    State(ctx): State<AppContext>,
    auth: AuthUser,
    Path(id): Path<String>,
    mut form: MultipartForm,
) -> ApiResult<Json<Post>> {
    require_editor::<F>(&auth)?;
    let manager = F::manager(&ctx);
    let id = db::parse_id(&id, manager.kind().label())?;

    let update = FeedUpdate {
        content: form.text("content").unwrap_or_default().to_string(),
        remove_media: form.flag("removeMedia"),
        remove_video: form.flag("removeVideo"),
        image: form.take_file("image"),
        video: form.take_file("video"),
    };
    Ok(Json(manager.update(&id, auth.id(), update).await?))
}

async fn delete_one<F: FeedRoute>(
    State(ctx): State<AppContext>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    require_editor::<F>(&auth)?;
    let manager = F::manager(&ctx);
    let id = db::parse_id(&id, manager.kind().label())?;

    manager.delete(&id, auth.id()).await?;
    Ok(Json(json!({
        "message": format!("{} deleted successfully", manager.kind().label())
    })))
}

async fn toggle_like<F: FeedRoute>(
    State(ctx): State<AppContext>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<Json<LikeOutcome>> {
    let manager = F::manager(&ctx);
    let id = db::parse_id(&id, manager.kind().label())?;
    Ok(Json(manager.toggle_like(&id, auth.id()).await?))
}

/// Comment, then mail the author about a user's first comment
async fn add_comment<F: FeedRoute>(
    State(ctx): State<AppContext>,
    auth: AuthUser,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<ContentBody>,
) -> ApiResult<Json<Post>> {
    let manager = F::manager(&ctx);
    let id = db::parse_id(&id, manager.kind().label())?;

    let added = manager.add_comment(&id, auth.id(), &body.content).await?;

    if added.notify_author {
        if let Some(author) = ctx.account_manager.get_user(&added.post.author.id).await? {
            let post_url = ctx.client_link(&format!("{}/{}", manager.kind().as_str(), id));
            ctx.mailer.dispatch(ctx.mailer.comment_notification_email(
                &author.email,
                &author.name,
                &auth.user.name,
                &post_url,
                &added.comment.content,
            ));
        }
    }

    Ok(Json(added.post))
}

async fn update_comment<F: FeedRoute>(
    State(ctx): State<AppContext>,
    auth: AuthUser,
    Path((id, comment_id)): Path<(String, String)>,
    ApiJson(body): ApiJson<ContentBody>,
) -> ApiResult<Json<Post>> {
    let manager = F::manager(&ctx);
    let id = db::parse_id(&id, manager.kind().label())?;
    let comment_id = db::parse_id(&comment_id, "comment")?;
    Ok(Json(
        manager
            .update_comment(&id, &comment_id, auth.id(), &body.content)
            .await?,
    ))
}

async fn delete_comment<F: FeedRoute>(
    State(ctx): State<AppContext>,
    auth: AuthUser,
    Path((id, comment_id)): Path<(String, String)>,
) -> ApiResult<Json<Post>> {
    let manager = F::manager(&ctx);
    let id = db::parse_id(&id, manager.kind().label())?;
    let comment_id = db::parse_id(&comment_id, "comment")?;
    Ok(Json(manager.delete_comment(&id, &comment_id, auth.id()).await?))
}

async fn add_reply<F: FeedRoute>(
    State(ctx): State<AppContext>,
    auth: AuthUser,
    Path((id, comment_id)): Path<(String, String)>,
    ApiJson(body): ApiJson<ContentBody>,
) -> ApiResult<impl IntoResponse> {
    let manager = F::manager(&ctx);
    let id = db::parse_id(&id, manager.kind().label())?;
    let comment_id = db::parse_id(&comment_id, "comment")?;
    let post = manager
        .add_reply(&id, &comment_id, auth.id(), &body.content)
        .await?;
    Ok((StatusCode::CREATED, Json(post)))
}

async fn update_reply<F: FeedRoute>(
    State(ctx): State<AppContext>,
    auth: AuthUser,
    Path((id, comment_id, reply_id)): Path<(String, String, String)>,
    ApiJson(body): ApiJson<ContentBody>,
) -> ApiResult<Json<Post>> {
    let manager = F::manager(&ctx);
    let id = db::parse_id(&id, manager.kind().label())?;
    let comment_id = db::parse_id(&comment_id, "comment")?;
    let reply_id = db::parse_id(&reply_id, "reply")?;
    Ok(Json(
        manager
            .update_reply(&id, &comment_id, &reply_id, auth.id(), &body.content)
            .await?,
    ))
}

async fn delete_reply<F: FeedRoute>(
    State(ctx): State<AppContext>,
    auth: AuthUser,
    Path((id, comment_id, reply_id)): Path<(String, String, String)>,
) -> ApiResult<Json<Post>> {
    let manager = F::manager(&ctx);
    let id = db::parse_id(&id, manager.kind().label())?;
    let comment_id = db::parse_id(&comment_id, "comment")?;
    let reply_id = db::parse_id(&reply_id, "reply")?;
    Ok(Json(
        manager
            .delete_reply(&id, &comment_id, &reply_id, auth.id())
            .await?,
    ))
}

/// Bump a panneau's per-platform share counter
async fn share_panneau(
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<ShareBody>,
) -> ApiResult<Json<serde_json::Value>> {
    let id = db::parse_id(&id, "panneau")?;
    let platform = SharePlatform::parse(&body.platform)?;
    let shares = ctx.panneau_manager.increment_share(&id, platform).await?;
    Ok(Json(json!({
        "message": "Share recorded successfully",
        "shares": shares
    })))
}

/// Stream a video served by the media host through this server
async fn video_proxy(
    State(ctx): State<AppContext>,
    Query(query): Query<ProxyQuery>,
) -> ApiResult<Response> {
    let url = query
        .url
        .filter(|u| !u.trim().is_empty())
        .ok_or_else(|| ApiError::Validation("Video URL is required".to_string()))?;
    if !ctx.media_store.is_hosted_url(&url) {
        return Err(ApiError::Validation("Video URL is not allowed".to_string()));
    }

    let upstream = ctx
        .http_client
        .get(&url)
        .send()
        .await
        .and_then(|r| r.error_for_status())
        .map_err(|e| {
            tracing::warn!("Video proxy fetch of {} failed: {}", url, e);
            ApiError::NotFound("Video not found".to_string())
        })?;

    let content_type = upstream
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("video/mp4")
        .to_string();
    let content_length = upstream.content_length();

    let mut response = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type)
        .header(header::ACCEPT_RANGES, "bytes");
    if let Some(length) = content_length {
        response = response.header(header::CONTENT_LENGTH, length);
    }

    response
        .body(Body::from_stream(upstream.bytes_stream()))
        .map_err(|e| ApiError::Internal(format!("Failed to build proxy response: {}", e)))
}
