//! Anonymous read access through share tokens
//!
//! No principal is extracted here. Any failure to resolve a token is a
//! plain not-found, whether the token never existed or the page stopped
//! being public.

use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};

use crate::db::Block;
use crate::error::Result;
use crate::sharing::{self, PublicPage};
use crate::state::AppState;

/// Create the public router
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/:token", get(get_public_page))
        .route("/:token/blocks", get(get_public_blocks))
}

/// Page metadata for a share token
async fn get_public_page(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<Json<PublicPage>> {
    let page = sharing::public_page(state.db(), &token).await?;
    Ok(Json(page.into()))
}

/// Ordered blocks for a share token
async fn get_public_blocks(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<Json<Vec<Block>>> {
    let blocks = sharing::public_blocks(state.db(), &token).await?;
    Ok(Json(blocks))
}
