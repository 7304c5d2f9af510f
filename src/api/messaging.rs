/// Direct messages between users
use crate::{
    api::extract::ApiJson,
    auth::{AuthUser, RoleSet},
    context::AppContext,
    db,
    error::{ApiError, ApiResult},
    messaging::{Conversation, SendMessageRequest},
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post},
    Json, Router,
};
use serde_json::json;

/// Build messaging routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/messagerie", post(send_message))
        .route("/messagerie/:id/messages", get(conversations_for))
        .route("/messagerie/:id/messages/:message_id", delete(delete_message))
}

/// Send, then tell the receiver by email
async fn send_message(
    State(ctx): State<AppContext>,
    auth: AuthUser,
    ApiJson(req): ApiJson<SendMessageRequest>,
) -> ApiResult<impl IntoResponse> {
    if req.content.trim().is_empty() {
        return Err(ApiError::Validation("Message content is required".to_string()));
    }
    let receiver_id = db::parse_id(&req.receiver_id, "receiver")?;
    let conversation_id = req
        .conversation_id
        .as_deref()
        .filter(|id| !id.trim().is_empty())
        .map(|id| db::parse_id(id, "conversation"))
        .transpose()?;

    let conversation = ctx
        .message_manager
        .send(auth.id(), &receiver_id, &req.content, conversation_id.as_deref())
        .await?;

    if let Some(receiver) = ctx.account_manager.get_user(&receiver_id).await? {
        let inbox_url = ctx.client_link("messagerie");
        ctx.mailer.dispatch(ctx.mailer.message_notification_email(
            &receiver.email,
            &receiver.name,
            &auth.user.name,
            req.content.trim(),
            &inbox_url,
        ));
    }

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Message sent successfully",
            "conversation": conversation
        })),
    ))
}

async fn conversations_for(
    State(ctx): State<AppContext>,
    auth: AuthUser,
    Path(user_id): Path<String>,
) -> ApiResult<Json<Vec<Conversation>>> {
    let user_id = db::parse_id(&user_id, "user")?;
    auth.require_owner_or(&user_id, RoleSet::ADMIN)?;
    ctx.account_manager.require_user(&user_id).await?;

    let conversations = ctx.message_manager.conversations_for(&user_id).await?;
    if conversations.is_empty() {
        return Err(ApiError::NotFound("No conversations found".to_string()));
    }
    Ok(Json(conversations))
}

async fn delete_message(
    State(ctx): State<AppContext>,
    auth: AuthUser,
    Path((conversation_id, message_id)): Path<(String, String)>,
) -> ApiResult<Json<serde_json::Value>> {
    let conversation_id = db::parse_id(&conversation_id, "conversation")?;
    let message_id = db::parse_id(&message_id, "message")?;

    ctx.message_manager
        .delete_message(
            &conversation_id,
            &message_id,
            auth.id(),
            auth.has_any(RoleSet::ADMIN),
        )
        .await?;

    Ok(Json(json!({ "message": "Message deleted successfully" })))
}
