//! Page API routes

use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;

use crate::access::authorize_page;
use crate::compose;
use crate::db::{Block, BlockRepository, CreatePage, Page, PageRepository, PageSummary, UpdatePage};
use crate::error::{AppError, Result};
use crate::identity::Principal;
use crate::routes::upload::read_file_field;
use crate::sharing::{self, SharingStatus};
use crate::state::AppState;
use crate::storage::cover_key;

/// Page with its blocks in canonical order
#[derive(Debug, Serialize)]
pub struct PageDetail {
    #[serde(flatten)]
    pub page: Page,
    pub blocks: Vec<Block>,
}

/// Create the pages router
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_pages).post(create_page))
        .route("/:id", get(get_page).patch(update_page).delete(delete_page))
        .route("/:id/children", get(list_children))
        .route("/:id/duplicate", post(duplicate_page))
        .route("/:id/cover", post(upload_cover))
        .route(
            "/:id/share",
            get(sharing_status).post(enable_sharing).delete(disable_sharing),
        )
        .route("/:id/share/regenerate", post(regenerate_token))
}

async fn page_detail(state: &AppState, page: Page) -> Result<PageDetail> {
    let blocks = BlockRepository::new(state.db()).list_for_page(page.id).await?;
    Ok(PageDetail { page, blocks })
}

/// List the caller's pages
async fn list_pages(
    State(state): State<AppState>,
    principal: Principal,
) -> Result<Json<Vec<PageSummary>>> {
    let pages = PageRepository::new(state.db())
        .list_for_owner(&principal.user_id)
        .await?;
    Ok(Json(pages))
}

/// Create a new page owned by the caller
async fn create_page(
    State(state): State<AppState>,
    principal: Principal,
    Json(data): Json<CreatePage>,
) -> Result<(StatusCode, Json<PageDetail>)> {
    let data = data.into_new_page()?;
    compose::validate_page_parent(state.db(), &principal, None, data.parent_id).await?;

    let page = PageRepository::new(state.db())
        .create(&principal.user_id, &data)
        .await?;
    Ok((StatusCode::CREATED, Json(page_detail(&state, page).await?)))
}

/// Get a page with its blocks
async fn get_page(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<i64>,
) -> Result<Json<PageDetail>> {
    let page = authorize_page(state.db(), &principal, id).await?;
    Ok(Json(page_detail(&state, page).await?))
}

/// Partially update a page
async fn update_page(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<i64>,
    Json(data): Json<UpdatePage>,
) -> Result<Json<PageDetail>> {
    let mut page = authorize_page(state.db(), &principal, id).await?;

    if let Some(parent) = data.parent {
        compose::validate_page_parent(state.db(), &principal, Some(id), parent).await?;
    }
    data.apply(&mut page)?;

    let page = PageRepository::new(state.db()).update(&page).await?;
    Ok(Json(page_detail(&state, page).await?))
}

/// Delete a page and everything beneath it
async fn delete_page(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<i64>,
) -> Result<StatusCode> {
    authorize_page(state.db(), &principal, id).await?;

    let deleted = PageRepository::new(state.db()).delete(id).await?;
    if deleted {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound(format!("Page not found: {}", id)))
    }
}

/// List direct child pages
async fn list_children(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<i64>,
) -> Result<Json<Vec<PageSummary>>> {
    authorize_page(state.db(), &principal, id).await?;

    let children = PageRepository::new(state.db())
        .list_children(id, &principal.user_id)
        .await?;
    Ok(Json(children))
}

/// Duplicate a page with its blocks
async fn duplicate_page(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<i64>,
) -> Result<(StatusCode, Json<PageDetail>)> {
    let page = compose::duplicate(state.db(), &principal, id).await?;
    Ok((StatusCode::CREATED, Json(page_detail(&state, page).await?)))
}

/// Upload a cover image
async fn upload_cover(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<i64>,
    multipart: Multipart,
) -> Result<Json<Page>> {
    authorize_page(state.db(), &principal, id).await?;

    let upload = read_file_field(multipart).await?;
    if !upload.content_type.starts_with("image/") {
        return Err(AppError::Validation(format!(
            "Cover must be an image, got {}",
            upload.content_type
        )));
    }

    let key = cover_key(&upload.file_name);
    let stored = state
        .blobs()
        .put(&key, upload.data, &upload.content_type)
        .await?;

    tracing::info!(page_id = id, key = %stored.key, "Uploaded cover");

    let page = PageRepository::new(state.db())
        .set_cover(id, &stored.key, &stored.url)
        .await?;
    Ok(Json(page))
}

/// Current sharing state
async fn sharing_status(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<i64>,
) -> Result<Json<SharingStatus>> {
    let page = authorize_page(state.db(), &principal, id).await?;
    Ok(Json(SharingStatus::from_page(
        &page,
        &state.config().server.public_base_url,
    )))
}

/// Make a page publicly readable
async fn enable_sharing(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<i64>,
) -> Result<Json<SharingStatus>> {
    let page = sharing::enable(state.db(), &principal, id).await?;
    Ok(Json(SharingStatus::from_page(
        &page,
        &state.config().server.public_base_url,
    )))
}

/// Revoke public access
async fn disable_sharing(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<i64>,
) -> Result<Json<SharingStatus>> {
    let page = sharing::disable(state.db(), &principal, id).await?;
    Ok(Json(SharingStatus::from_page(
        &page,
        &state.config().server.public_base_url,
    )))
}

/// Issue a new share token
async fn regenerate_token(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<i64>,
) -> Result<Json<SharingStatus>> {
    let page = sharing::regenerate(state.db(), &principal, id).await?;
    Ok(Json(SharingStatus::from_page(
        &page,
        &state.config().server.public_base_url,
    )))
}
