//! Block API routes

use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::access::{authorize_block, authorize_page};
use crate::compose;
use crate::db::{Attachment, Block, BlockRepository, Comment, CommentRepository, CreateBlock, UpdateBlock};
use crate::error::{AppError, Result};
use crate::identity::Principal;
use crate::ordering::{self, ReorderOutcome, ReorderRequest};
use crate::routes::upload::read_file_field;
use crate::state::AppState;
use crate::storage::block_file_key;

/// Query parameters for listing blocks
#[derive(Debug, Deserialize)]
pub struct ListBlocksQuery {
    pub page: Option<i64>,
}

/// Block with its comments
#[derive(Debug, Serialize)]
pub struct BlockDetail {
    #[serde(flatten)]
    pub block: Block,
    pub comments: Vec<Comment>,
}

/// Create the blocks router
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_blocks).post(create_block))
        .route("/reorder", post(reorder_blocks))
        .route("/:id", get(get_block).patch(update_block).delete(delete_block))
        .route("/:id/file", post(upload_file))
}

/// List the caller's blocks, optionally for one page
async fn list_blocks(
    State(state): State<AppState>,
    principal: Principal,
    Query(query): Query<ListBlocksQuery>,
) -> Result<Json<Vec<Block>>> {
    let blocks = BlockRepository::new(state.db())
        .list_for_owner(&principal.user_id, query.page)
        .await?;
    Ok(Json(blocks))
}

/// Create a block on a page the caller owns
async fn create_block(
    State(state): State<AppState>,
    principal: Principal,
    Json(data): Json<CreateBlock>,
) -> Result<(StatusCode, Json<Block>)> {
    authorize_page(state.db(), &principal, data.page).await?;
    compose::validate_block_parent(state.db(), data.page, None, data.parent).await?;

    let block = BlockRepository::new(state.db())
        .create(&data.into_new_block()?)
        .await?;
    Ok((StatusCode::CREATED, Json(block)))
}

/// Apply a client-computed ordering
async fn reorder_blocks(
    State(state): State<AppState>,
    principal: Principal,
    Json(request): Json<ReorderRequest>,
) -> Result<Json<ReorderOutcome>> {
    let outcome = ordering::reorder(state.db(), &principal, &request.blocks).await?;
    Ok(Json(outcome))
}

/// Get a block with its comments
async fn get_block(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<i64>,
) -> Result<Json<BlockDetail>> {
    let block = authorize_block(state.db(), &principal, id).await?;
    let comments = CommentRepository::new(state.db()).list_for_block(id).await?;
    Ok(Json(BlockDetail { block, comments }))
}

/// Partially update a block
async fn update_block(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<i64>,
    Json(data): Json<UpdateBlock>,
) -> Result<Json<Block>> {
    let mut block = authorize_block(state.db(), &principal, id).await?;

    if let Some(parent) = data.parent {
        compose::validate_block_parent(state.db(), block.page_id, Some(id), parent).await?;
    }
    data.apply(&mut block)?;

    let block = BlockRepository::new(state.db()).update(&block).await?;
    Ok(Json(block))
}

/// Delete a block with its nested blocks and comments
async fn delete_block(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<i64>,
) -> Result<StatusCode> {
    authorize_block(state.db(), &principal, id).await?;

    if BlockRepository::new(state.db()).delete(id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound(format!("Block not found: {}", id)))
    }
}

/// Upload an attachment for a media block
async fn upload_file(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<i64>,
    multipart: Multipart,
) -> Result<Json<Block>> {
    let block = authorize_block(state.db(), &principal, id).await?;
    if !block.block_type.is_media() {
        return Err(AppError::Validation(format!(
            "{} blocks cannot carry files",
            block.block_type
        )));
    }

    let upload = read_file_field(multipart).await?;
    let file_size = upload.size();
    let key = block_file_key(&upload.file_name);
    let stored = state
        .blobs()
        .put(&key, upload.data, &upload.content_type)
        .await?;

    tracing::info!(
        block_id = id,
        key = %stored.key,
        size = file_size,
        "Uploaded block attachment"
    );

    let attachment = Attachment {
        file: stored.key,
        file_url: stored.url,
        file_type: upload.content_type,
        file_size,
    };
    let block = BlockRepository::new(state.db())
        .attach_file(id, &attachment)
        .await?;
    Ok(Json(block))
}
