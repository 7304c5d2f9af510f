/// The two mission pages, mounted under their own prefixes
use crate::{
    api::extract::ApiJson,
    auth::{AuthUser, RoleSet},
    catalog::{Mission, MissionInput, MissionManager},
    context::AppContext,
    db,
    error::ApiResult,
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post},
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;

/// Which mission page a route serves
trait MissionRoute: Send + Sync + 'static {
    const PREFIX: &'static str;

    fn manager(ctx: &AppContext) -> &Arc<MissionManager>;
}

struct MissionPanneau;

impl MissionRoute for MissionPanneau {
    const PREFIX: &'static str = "/missionpanneau";

    fn manager(ctx: &AppContext) -> &Arc<MissionManager> {
        &ctx.mission_panneau_manager
    }
}

struct NotreMission;

impl MissionRoute for NotreMission {
    const PREFIX: &'static str = "/notremission";

    fn manager(ctx: &AppContext) -> &Arc<MissionManager> {
        &ctx.notre_mission_manager
    }
}

/// Build mission routes for both pages
pub fn routes() -> Router<AppContext> {
    Router::new()
        .merge(page_routes::<MissionPanneau>())
        .merge(page_routes::<NotreMission>())
}

fn page_routes<M: MissionRoute>() -> Router<AppContext> {
    Router::new()
        .route(M::PREFIX, get(list::<M>))
        .route(&format!("{}/create", M::PREFIX), post(create::<M>))
        .route(
            &format!("{}/:id", M::PREFIX),
            get(get_one::<M>).put(update::<M>),
        )
        .route(&format!("{}/delete/:id", M::PREFIX), delete(remove::<M>))
}

async fn create<M: MissionRoute>(
    State(ctx): State<AppContext>,
    auth: AuthUser,
    ApiJson(input): ApiJson<MissionInput>,
) -> ApiResult<impl IntoResponse> {
    auth.require(RoleSet::STAFF)?;
    let mission = M::manager(&ctx).create(input).await?;
    Ok((StatusCode::CREATED, Json(mission)))
}

async fn list<M: MissionRoute>(State(ctx): State<AppContext>) -> ApiResult<Json<Vec<Mission>>> {
    Ok(Json(M::manager(&ctx).list().await?))
}

async fn get_one<M: MissionRoute>(
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
) -> ApiResult<Json<Mission>> {
    let id = db::parse_id(&id, "mission")?;
    Ok(Json(M::manager(&ctx).get(&id).await?))
}

async fn update<M: MissionRoute>(
    State(ctx): State<AppContext>,
    auth: AuthUser,
    Path(id): Path<String>,
    ApiJson(input): ApiJson<MissionInput>,
) -> ApiResult<Json<Mission>> {
    auth.require(RoleSet::STAFF)?;
    let id = db::parse_id(&id, "mission")?;
    Ok(Json(M::manager(&ctx).update(&id, input).await?))
}

async fn remove<M: MissionRoute>(
    State(ctx): State<AppContext>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    auth.require(RoleSet::STAFF)?;
    let id = db::parse_id(&id, "mission")?;
    M::manager(&ctx).delete(&id).await?;
    Ok(Json(json!({ "message": "Mission deleted successfully" })))
}
