/// Countries, search filters and legal pages
use crate::{
    api::extract::ApiJson,
    auth::{AuthUser, RoleSet},
    catalog::{Country, CountryInput, Filter, FilterInput, GroupedFilters, LegalText, LegalTextInput, LegalTextType},
    context::AppContext,
    db,
    error::ApiResult,
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;

/// Build reference data routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/country", get(list_countries).post(create_country))
        .route(
            "/country/:id",
            get(get_country).put(update_country).delete(delete_country),
        )
        .route("/filter", get(grouped_filters))
        .route("/filter/create", post(create_filter))
        .route(
            "/filter/:id",
            get(get_filter).put(update_filter).delete(delete_filter),
        )
        .route(
            "/legalText/:text_type",
            get(get_legal_text).post(create_legal_text).put(upsert_legal_text),
        )
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CountryQuery {
    country: Option<String>,
}

// Countries

async fn create_country(
    State(ctx): State<AppContext>,
    auth: AuthUser,
    ApiJson(input): ApiJson<CountryInput>,
) -> ApiResult<impl IntoResponse> {
    auth.require(RoleSet::STAFF)?;
    let country = ctx.country_manager.create(input).await?;
    Ok((StatusCode::CREATED, Json(country)))
}

async fn list_countries(State(ctx): State<AppContext>) -> ApiResult<Json<Vec<Country>>> {
    Ok(Json(ctx.country_manager.list().await?))
}

async fn get_country(State(ctx): State<AppContext>, Path(id): Path<String>) -> ApiResult<Json<Country>> {
    let id = db::parse_id(&id, "country")?;
    Ok(Json(ctx.country_manager.get(&id).await?))
}

async fn update_country(
    State(ctx): State<AppContext>,
    auth: AuthUser,
    Path(id): Path<String>,
    ApiJson(input): ApiJson<CountryInput>,
) -> ApiResult<Json<Country>> {
    auth.require(RoleSet::STAFF)?;
    let id = db::parse_id(&id, "country")?;
    Ok(Json(ctx.country_manager.update(&id, input).await?))
}

async fn delete_country(
    State(ctx): State<AppContext>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    auth.require(RoleSet::STAFF)?;
    let id = db::parse_id(&id, "country")?;
    ctx.country_manager.delete(&id).await?;
    Ok(Json(json!({ "message": "Country deleted successfully" })))
}

// Filters

async fn create_filter(
    State(ctx): State<AppContext>,
    auth: AuthUser,
    ApiJson(input): ApiJson<FilterInput>,
) -> ApiResult<impl IntoResponse> {
    auth.require(RoleSet::ADMIN)?;
    let filter = ctx.filter_manager.create(input).await?;
    Ok((StatusCode::CREATED, Json(filter)))
}

async fn grouped_filters(
    State(ctx): State<AppContext>,
    Query(query): Query<CountryQuery>,
) -> ApiResult<Json<GroupedFilters>> {
    Ok(Json(ctx.filter_manager.grouped(query.country.as_deref()).await?))
}

async fn get_filter(State(ctx): State<AppContext>, Path(id): Path<String>) -> ApiResult<Json<Filter>> {
    let id = db::parse_id(&id, "filter")?;
    Ok(Json(ctx.filter_manager.get(&id).await?))
}

async fn update_filter(
    State(ctx): State<AppContext>,
    auth: AuthUser,
    Path(id): Path<String>,
    ApiJson(input): ApiJson<FilterInput>,
) -> ApiResult<Json<Filter>> {
    auth.require(RoleSet::ADMIN)?;
    let id = db::parse_id(&id, "filter")?;
    Ok(Json(ctx.filter_manager.update(&id, input).await?))
}

async fn delete_filter(
    State(ctx): State<AppContext>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    auth.require(RoleSet::ADMIN)?;
    let id = db::parse_id(&id, "filter")?;
    ctx.filter_manager.delete(&id).await?;
    Ok(Json(json!({ "message": "Filter deleted successfully" })))
}

// Legal texts

async fn create_legal_text(
    State(ctx): State<AppContext>,
    auth: AuthUser,
    Path(text_type): Path<String>,
    ApiJson(input): ApiJson<LegalTextInput>,
) -> ApiResult<impl IntoResponse> {
    auth.require(RoleSet::STAFF)?;
    let text_type = LegalTextType::parse(&text_type)?;
    let text = ctx.legal_text_manager.create(text_type, input).await?;
    Ok((StatusCode::CREATED, Json(text)))
}

async fn get_legal_text(
    State(ctx): State<AppContext>,
    Path(text_type): Path<String>,
) -> ApiResult<Json<LegalText>> {
    let text_type = LegalTextType::parse(&text_type)?;
    Ok(Json(ctx.legal_text_manager.get(text_type).await?))
}

async fn upsert_legal_text(
    State(ctx): State<AppContext>,
    auth: AuthUser,
    Path(text_type): Path<String>,
    ApiJson(input): ApiJson<LegalTextInput>,
) -> ApiResult<Json<LegalText>> {
    auth.require(RoleSet::STAFF)?;
    let text_type = LegalTextType::parse(&text_type)?;
    Ok(Json(ctx.legal_text_manager.upsert(text_type, input).await?))
}
