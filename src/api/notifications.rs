/// The caller's notifications
use crate::{
    auth::AuthUser,
    context::AppContext,
    db,
    error::ApiResult,
    notifications::Notification,
};
use axum::{
    extract::{Path, State},
    routing::{delete, get, put},
    Json, Router,
};
use serde_json::json;

/// Build notification routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/notifications", get(list_notifications))
        .route("/notifications/:id/read", put(mark_read))
        .route("/notifications/:id", delete(delete_notification))
}

async fn list_notifications(
    State(ctx): State<AppContext>,
    auth: AuthUser,
) -> ApiResult<Json<Vec<Notification>>> {
    Ok(Json(ctx.notification_manager.list_for(auth.id()).await?))
}

async fn mark_read(
    State(ctx): State<AppContext>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<Json<Notification>> {
    let id = db::parse_id(&id, "notification")?;
    Ok(Json(ctx.notification_manager.mark_read(&id, auth.id()).await?))
}

async fn delete_notification(
    State(ctx): State<AppContext>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let id = db::parse_id(&id, "notification")?;
    ctx.notification_manager.delete(&id, auth.id()).await?;
    Ok(Json(json!({ "message": "Notification deleted successfully" })))
}
