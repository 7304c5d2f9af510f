/// Courses and their reviews
use crate::{
    api::{extract::ApiJson, upload::MultipartForm},
    auth::{AuthUser, RoleSet},
    catalog::{Course, CourseInput, CourseRating, Review, ReviewInput},
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

/// Build course routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/courses", get(courses_by_country))
        .route("/courses/create", post(create_course))
        .route(
            "/courses/courses/:id",
            get(get_course).put(update_course).delete(delete_course),
        )
        .route("/courses/courses/:id/rating", get(course_rating))
        .route(
            "/courses/courses/:id/reviews",
            get(list_reviews).post(submit_review),
        )
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CountryQuery {
    country: Option<String>,
}

/// Multipart create: text fields plus `image` and `videocour` files
async fn create_course(
    State(ctx): State<AppContext>,
    auth: AuthUser,
    mut form: MultipartForm,
) -> ApiResult<impl IntoResponse> {
    auth.require(RoleSet::ADMIN)?;

    let input = CourseInput {
        title: form.owned("title"),
        content: form.owned("content"),
        subject: form.owned("subject"),
        country: form.owned("country"),
        city: form.owned("city"),
        image: None,
        videocour: None,
    };
    let image = form.take_file("image");
    let video = form.take_file("videocour");

    let course = ctx.course_manager.create(auth.id(), input, image, video).await?;
    Ok((StatusCode::CREATED, Json(course)))
}

async fn courses_by_country(
    State(ctx): State<AppContext>,
    Query(query): Query<CountryQuery>,
) -> ApiResult<Json<Vec<Course>>> {
    Ok(Json(ctx.course_manager.by_country(query.country.as_deref()).await?))
}

async fn get_course(State(ctx): State<AppContext>, Path(id): Path<String>) -> ApiResult<Json<Course>> {
    let id = db::parse_id(&id, "course")?;
    Ok(Json(ctx.course_manager.get(&id).await?))
}

async fn update_course(
    State(ctx): State<AppContext>,
    auth: AuthUser,
    Path(id): Path<String>,
    ApiJson(input): ApiJson<CourseInput>,
) -> ApiResult<Json<Course>> {
    auth.require(RoleSet::ADMIN)?;
    let id = db::parse_id(&id, "course")?;
    Ok(Json(ctx.course_manager.update(&id, input).await?))
}

async fn delete_course(
    State(ctx): State<AppContext>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    auth.require(RoleSet::ADMIN)?;
    let id = db::parse_id(&id, "course")?;
    ctx.course_manager.delete(&id).await?;
    Ok(Json(json!({ "message": "Course deleted successfully" })))
}

async fn course_rating(State(ctx): State<AppContext>, Path(id): Path<String>) -> ApiResult<Json<CourseRating>> {
    let id = db::parse_id(&id, "course")?;
    Ok(Json(ctx.course_manager.rating(&id).await?))
}

/// One review per user and course: 201 the first time, 200 on later edits
async fn submit_review(
    State(ctx): State<AppContext>,
    auth: AuthUser,
    Path(id): Path<String>,
    ApiJson(input): ApiJson<ReviewInput>,
) -> ApiResult<impl IntoResponse> {
    let id = db::parse_id(&id, "course")?;
    let (review, created) = ctx.review_manager.upsert(&id, auth.id(), input).await?;
    let status = if created { StatusCode::CREATED } else { StatusCode::OK };
    Ok((status, Json(review)))
}

async fn list_reviews(State(ctx): State<AppContext>, Path(id): Path<String>) -> ApiResult<Json<Vec<Review>>> {
    let id = db::parse_id(&id, "course")?;
    Ok(Json(ctx.review_manager.list(&id).await?))
}
