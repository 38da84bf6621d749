//! Comment API routes

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::Deserialize;

use crate::access::{authorize_block, authorize_comment};
use crate::db::{Comment, CommentRepository, CreateComment, UpdateComment};
use crate::error::{AppError, Result};
use crate::identity::Principal;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ListCommentsQuery {
    pub block: Option<i64>,
}

/// Create the comments router
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_comments).post(create_comment))
        .route(
            "/:id",
            get(get_comment).patch(update_comment).delete(delete_comment),
        )
}

async fn list_comments(
    State(state): State<AppState>,
    principal: Principal,
    Query(query): Query<ListCommentsQuery>,
) -> Result<Json<Vec<Comment>>> {
    let comments = CommentRepository::new(state.db())
        .list_for_owner(&principal.user_id, query.block)
        .await?;
    Ok(Json(comments))
}

async fn create_comment(
    State(state): State<AppState>,
    principal: Principal,
    Json(data): Json<CreateComment>,
) -> Result<(StatusCode, Json<Comment>)> {
    authorize_block(state.db(), &principal, data.block).await?;

    let comment = CommentRepository::new(state.db())
        .create(&data.validate()?)
        .await?;
    Ok((StatusCode::CREATED, Json(comment)))
}

async fn get_comment(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<i64>,
) -> Result<Json<Comment>> {
    let comment = authorize_comment(state.db(), &principal, id).await?;
    Ok(Json(comment))
}

async fn update_comment(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<i64>,
    Json(data): Json<UpdateComment>,
) -> Result<Json<Comment>> {
    authorize_comment(state.db(), &principal, id).await?;
    let content = data.validate()?;

    CommentRepository::new(state.db())
        .update(id, &content)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("Comment not found: {}", id)))
}

async fn delete_comment(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<i64>,
) -> Result<StatusCode> {
    authorize_comment(state.db(), &principal, id).await?;

    if CommentRepository::new(state.db()).delete(id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound(format!("Comment not found: {}", id)))
    }
}
