//! Ownership checks
//!
//! Every owner-scoped operation resolves its target through these helpers.
//! A missing entity is `NotFound`; an entity owned by someone else is
//! `PermissionDenied`.

use sqlx::{SqliteConnection, SqlitePool};

use crate::db::{Block, BlockRepository, Comment, CommentRepository, Page, PageRepository};
use crate::error::{AppError, Result};
use crate::identity::Principal;

/// Load a page the principal owns
pub async fn authorize_page(pool: &SqlitePool, principal: &Principal, page_id: i64) -> Result<Page> {
    let page = PageRepository::new(pool)
        .get(page_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Page not found: {}", page_id)))?;

    ensure_owner(principal, page.owner_id.as_deref(), "page", page_id)?;
    Ok(page)
}

/// Load a block whose page the principal owns
pub async fn authorize_block(pool: &SqlitePool, principal: &Principal, block_id: i64) -> Result<Block> {
    let block = BlockRepository::new(pool)
        .get(block_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Block not found: {}", block_id)))?;

    let mut conn = pool.acquire().await?;
    let owner = page_owner(&mut *conn, block.page_id).await?.flatten();
    ensure_owner(principal, owner.as_deref(), "block", block_id)?;
    Ok(block)
}

/// Load a comment whose block's page the principal owns
pub async fn authorize_comment(
    pool: &SqlitePool,
    principal: &Principal,
    comment_id: i64,
) -> Result<Comment> {
    let comment = CommentRepository::new(pool)
        .get(comment_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Comment not found: {}", comment_id)))?;

    let mut conn = pool.acquire().await?;
    let owner = block_owner(&mut *conn, comment.block_id).await?.flatten();
    ensure_owner(principal, owner.as_deref(), "comment", comment_id)?;
    Ok(comment)
}

/// Owner of a page: `None` if the page does not exist
pub async fn page_owner(conn: &mut SqliteConnection, page_id: i64) -> Result<Option<Option<String>>> {
    let row: Option<(Option<String>,)> = sqlx::query_as("SELECT owner_id FROM pages WHERE id = ?")
        .bind(page_id)
        .fetch_optional(&mut *conn)
        .await?;

    Ok(row.map(|(owner,)| owner))
}

/// Owner of the page holding a block: `None` if the block does not exist
pub async fn block_owner(conn: &mut SqliteConnection, block_id: i64) -> Result<Option<Option<String>>> {
    let row: Option<(Option<String>,)> = sqlx::query_as(
        "SELECT p.owner_id FROM blocks b JOIN pages p ON p.id = b.page_id WHERE b.id = ?",
    )
    .bind(block_id)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(row.map(|(owner,)| owner))
}

fn ensure_owner(principal: &Principal, owner: Option<&str>, kind: &str, id: i64) -> Result<()> {
    if principal.owns(owner) {
        Ok(())
    } else {
        tracing::warn!(user = %principal.user_id, kind, id, "Ownership check failed");
        Err(AppError::PermissionDenied(format!(
            "You do not have access to {} {}",
            kind, id
        )))
    }
}
