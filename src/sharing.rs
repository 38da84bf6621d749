//! Public share links
//!
//! A page is either private (no token) or shared (`is_public` with a token).
//! Turning sharing off discards the token, so every new share cycle issues a
//! fresh one and old links stop resolving. Token uniqueness is enforced by
//! the database; a collision is retried with a new token.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use rand::{rngs::OsRng, RngCore};
use serde::Serialize;
use sqlx::SqlitePool;

use crate::access::authorize_page;
use crate::db::{now, Block, BlockRepository, Page, PageRepository};
use crate::error::{AppError, Result};
use crate::identity::Principal;

/// Random bytes per token; encodes to 43 URL-safe characters
pub const TOKEN_BYTES: usize = 32;

/// Attempts at assigning a unique token before giving up
pub const MAX_TOKEN_ATTEMPTS: usize = 5;

/// Sharing state of a page as seen by its owner
#[derive(Debug, Clone, Serialize)]
pub struct SharingStatus {
    pub page: i64,
    pub is_public: bool,
    pub share_token: Option<String>,
    pub share_url: Option<String>,
}

impl SharingStatus {
    pub fn from_page(page: &Page, public_base_url: &str) -> Self {
        let share_url = match (&page.share_token, page.is_public) {
            (Some(token), true) => Some(share_url(public_base_url, token)),
            _ => None,
        };

        Self {
            page: page.id,
            is_public: page.is_public,
            share_token: page.share_token.clone(),
            share_url,
        }
    }
}

/// Page metadata exposed to anonymous readers; never carries owner or token
#[derive(Debug, Clone, Serialize)]
pub struct PublicPage {
    pub id: i64,
    pub title: String,
    pub icon: Option<String>,
    pub cover_image_url: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Page> for PublicPage {
    fn from(page: Page) -> Self {
        Self {
            id: page.id,
            title: page.title,
            icon: page.icon,
            cover_image_url: page.cover_image_url,
            created_at: page.created_at,
            updated_at: page.updated_at,
        }
    }
}

/// Generate a new opaque share token from the OS CSPRNG
pub fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Mount point of the anonymous read routes
pub const PUBLIC_PATH: &str = "/api/v1/public";

/// Public link for a token, served by the public page route
pub fn share_url(public_base_url: &str, token: &str) -> String {
    format!(
        "{}{}/{}",
        public_base_url.trim_end_matches('/'),
        PUBLIC_PATH,
        token
    )
}

/// Enable public access, issuing a token if the page has none
pub async fn enable(pool: &SqlitePool, principal: &Principal, page_id: i64) -> Result<Page> {
    enable_with(pool, principal, page_id, generate_token).await
}

/// Disable public access and discard the token
pub async fn disable(pool: &SqlitePool, principal: &Principal, page_id: i64) -> Result<Page> {
    authorize_page(pool, principal, page_id).await?;

    sqlx::query("UPDATE pages SET is_public = 0, share_token = NULL, updated_at = ? WHERE id = ?")
        .bind(now())
        .bind(page_id)
        .execute(pool)
        .await?;

    tracing::info!(page_id, "Disabled sharing");
    fetch(pool, page_id).await
}

/// Replace the token of a shared page, invalidating the old link
pub async fn regenerate(pool: &SqlitePool, principal: &Principal, page_id: i64) -> Result<Page> {
    regenerate_with(pool, principal, page_id, generate_token).await
}

/// [`enable`] with a caller-supplied token source
pub async fn enable_with<F>(
    pool: &SqlitePool,
    principal: &Principal,
    page_id: i64,
    next_token: F,
) -> Result<Page>
where
    F: FnMut() -> String,
{
    let page = authorize_page(pool, principal, page_id).await?;

    if page.share_token.is_some() {
        sqlx::query("UPDATE pages SET is_public = 1, updated_at = ? WHERE id = ?")
            .bind(now())
            .bind(page_id)
            .execute(pool)
            .await?;
    } else {
        assign_token(pool, page_id, next_token).await?;
    }

    tracing::info!(page_id, "Enabled sharing");
    fetch(pool, page_id).await
}

/// [`regenerate`] with a caller-supplied token source
pub async fn regenerate_with<F>(
    pool: &SqlitePool,
    principal: &Principal,
    page_id: i64,
    next_token: F,
) -> Result<Page>
where
    F: FnMut() -> String,
{
    let page = authorize_page(pool, principal, page_id).await?;

    if !page.is_public {
        return Err(AppError::Validation(format!(
            "Page {} is not shared; enable sharing first",
            page_id
        )));
    }

    assign_token(pool, page_id, next_token).await?;

    tracing::info!(page_id, "Regenerated share token");
    fetch(pool, page_id).await
}

/// Resolve a token to its page for anonymous readers.
///
/// Unknown tokens and tokens of pages that are not public are both
/// reported as not found.
pub async fn public_page(pool: &SqlitePool, token: &str) -> Result<Page> {
    PageRepository::new(pool)
        .find_public_by_token(token)
        .await?
        .ok_or_else(|| AppError::NotFound("Shared page not found".to_string()))
}

/// Blocks of a publicly shared page in canonical order
pub async fn public_blocks(pool: &SqlitePool, token: &str) -> Result<Vec<Block>> {
    let page = public_page(pool, token).await?;
    BlockRepository::new(pool).list_for_page(page.id).await
}

/// Store a fresh token and mark the page public, retrying on collisions
async fn assign_token<F>(pool: &SqlitePool, page_id: i64, mut next_token: F) -> Result<()>
where
    F: FnMut() -> String,
{
    for attempt in 1..=MAX_TOKEN_ATTEMPTS {
        let token = next_token();

        let result = sqlx::query(
            "UPDATE pages SET is_public = 1, share_token = ?, updated_at = ? WHERE id = ?",
        )
        .bind(&token)
        .bind(now())
        .bind(page_id)
        .execute(pool)
        .await
        .map_err(AppError::from);

        match result {
            Ok(_) => return Ok(()),
            Err(e) if e.is_unique_violation() => {
                tracing::warn!(page_id, attempt, "Share token collision, retrying");
            }
            Err(e) => return Err(e),
        }
    }

    Err(AppError::Conflict(format!(
        "Could not assign a unique share token after {} attempts",
        MAX_TOKEN_ATTEMPTS
    )))
}

async fn fetch(pool: &SqlitePool, page_id: i64) -> Result<Page> {
    PageRepository::new(pool)
        .get(page_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Page not found: {}", page_id)))
}
