/// The document library
use crate::{
    api::upload::MultipartForm,
    auth::{AuthUser, RoleSet},
    catalog::{Document, DocumentFiles, DocumentInput, DocumentPage, DocumentQuery},
    context::AppContext,
    db,
    error::{ApiError, ApiResult},
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;

/// Files accepted in one document form
const MAX_FILES: usize = 10;

/// Build documentation routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/documentations", get(search_documents).post(create_document))
        .route(
            "/documentations/:id",
            get(get_document).put(update_document).delete(delete_document),
        )
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SearchQuery {
    search: Option<String>,
    category: Option<String>,
    page: Option<String>,
    limit: Option<String>,
}

/// Split a document form into its text fields and MIME-sorted files
fn read_form(mut form: MultipartForm) -> ApiResult<(DocumentInput, DocumentFiles)> {
    let files = form.take_all_files();
    if files.len() > MAX_FILES {
        return Err(ApiError::Validation(format!(
            "At most {} files can be uploaded",
            MAX_FILES
        )));
    }

    let input = DocumentInput {
        title: form.owned("title"),
        category: form.owned("category"),
        country: form.owned("country"),
        pages: form.owned("pages"),
        excerpt: form.owned("excerpt"),
        author: form.owned("author"),
        release_date: form.owned("releaseDate"),
        number: form.owned("number"),
    };
    Ok((input, DocumentFiles::classify(files)?))
}

async fn create_document(
    State(ctx): State<AppContext>,
    auth: AuthUser,
    form: MultipartForm,
) -> ApiResult<impl IntoResponse> {
    auth.require(RoleSet::STAFF)?;
    let (input, files) = read_form(form)?;
    let document = ctx.document_manager.create(input, files).await?;
    Ok((StatusCode::CREATED, Json(document)))
}

async fn search_documents(
    State(ctx): State<AppContext>,
    Query(query): Query<SearchQuery>,
) -> ApiResult<Json<DocumentPage>> {
    let query = DocumentQuery {
        search: query.search,
        category: query.category,
        page: query.page,
        limit: query.limit,
    };
    Ok(Json(ctx.document_manager.search(query).await?))
}

async fn get_document(State(ctx): State<AppContext>, Path(id): Path<String>) -> ApiResult<Json<Document>> {
    let id = db::parse_id(&id, "document")?;
    Ok(Json(ctx.document_manager.get(&id).await?))
}

async fn update_document(
    State(ctx): State<AppContext>,
    auth: AuthUser,
    Path(id): Path<String>,
    form: MultipartForm,
) -> ApiResult<Json<Document>> {
    auth.require(RoleSet::STAFF)?;
    let id = db::parse_id(&id, "document")?;
    let (input, files) = read_form(form)?;
    Ok(Json(ctx.document_manager.update(&id, input, files).await?))
}

async fn delete_document(
    State(ctx): State<AppContext>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    auth.require(RoleSet::STAFF)?;
    let id = db::parse_id(&id, "document")?;
    ctx.document_manager.delete(&id).await?;
    Ok(Json(json!({ "message": "Document deleted successfully" })))
}
