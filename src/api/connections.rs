/// Connection requests and the connection graph
use crate::{
    account::PublicUser,
    api::PageQuery,
    auth::AuthUser,
    context::AppContext,
    db,
    error::ApiResult,
    social::{ConnectionStatus, RequestPage},
};
use axum::{
    extract::{Path, Query, State},
    routing::{delete, get, post, put},
    Json, Router,
};
use serde_json::json;

/// Build connection routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/connections", get(list_connections))
        .route("/connections/request/:user_id", post(send_request))
        .route("/connections/accept/:request_id", put(accept_request))
        .route("/connections/reject/:request_id", put(reject_request))
        .route("/connections/requests", get(pending_requests))
        .route("/connections/status/:user_id", get(connection_status))
        .route("/connections/:user_id", delete(remove_connection))
}

async fn send_request(
    State(ctx): State<AppContext>,
    auth: AuthUser,
    Path(user_id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let user_id = db::parse_id(&user_id, "user")?;
    ctx.connection_manager.send_request(auth.id(), &user_id).await?;
    Ok(Json(json!({ "message": "Connection request sent successfully" })))
}

/// Accept a request and tell its sender by email
async fn accept_request(
    State(ctx): State<AppContext>,
    auth: AuthUser,
    Path(request_id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let request_id = db::parse_id(&request_id, "request")?;
    let request = ctx.connection_manager.accept(&request_id, auth.id()).await?;

    if let Some(sender) = ctx.account_manager.get_user(&request.sender.id).await? {
        let profile_url = ctx.profile_url(&auth.user.username);
        ctx.mailer.dispatch(ctx.mailer.connection_accepted_email(
            &sender.email,
            &sender.name,
            &auth.user.name,
            &profile_url,
        ));
    }

    Ok(Json(json!({ "message": "Connection accepted successfully" })))
}

async fn reject_request(
    State(ctx): State<AppContext>,
    auth: AuthUser,
    Path(request_id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let request_id = db::parse_id(&request_id, "request")?;
    ctx.connection_manager.reject(&request_id, auth.id()).await?;
    Ok(Json(json!({ "message": "Connection request rejected" })))
}

async fn pending_requests(
    State(ctx): State<AppContext>,
    auth: AuthUser,
    Query(query): Query<PageQuery>,
) -> ApiResult<Json<RequestPage>> {
    let page = query.pagination(10, 50);
    Ok(Json(ctx.connection_manager.pending_requests(auth.id(), page).await?))
}

async fn list_connections(State(ctx): State<AppContext>, auth: AuthUser) -> ApiResult<Json<Vec<PublicUser>>> {
    Ok(Json(ctx.connection_manager.connections(auth.id()).await?))
}

async fn remove_connection(
    State(ctx): State<AppContext>,
    auth: AuthUser,
    Path(user_id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let user_id = db::parse_id(&user_id, "user")?;
    ctx.connection_manager.remove(auth.id(), &user_id).await?;
    Ok(Json(json!({ "message": "Connection removed successfully" })))
}

async fn connection_status(
    State(ctx): State<AppContext>,
    auth: AuthUser,
    Path(user_id): Path<String>,
) -> ApiResult<Json<ConnectionStatus>> {
    let user_id = db::parse_id(&user_id, "user")?;
    Ok(Json(ctx.connection_manager.status(auth.id(), &user_id).await?))
}
