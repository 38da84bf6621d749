//! Page database operations

use serde::{Deserialize, Serialize};
use sqlx::{SqliteConnection, SqlitePool};

use super::{begin_write, double_option, now};
use crate::error::{AppError, Result};

/// Title given to pages created without one
pub const DEFAULT_PAGE_TITLE: &str = "Untitled";

/// Maximum icon length (an emoji or short icon name)
pub const MAX_ICON_CHARS: usize = 50;

const SELECT_PAGE: &str = r#"
    SELECT id, title, icon, cover_image, cover_image_url, owner_id, parent_id,
           is_public, share_token, created_at, updated_at
    FROM pages
"#;

const SELECT_PAGE_SUMMARY: &str = r#"
    SELECT p.id, p.title, p.icon, p.parent_id, p.is_public, p.created_at, p.updated_at,
           (SELECT COUNT(*) FROM blocks b WHERE b.page_id = p.id) AS blocks_count
    FROM pages p
"#;

/// Page record
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Page {
    pub id: i64,
    pub title: String,
    pub icon: Option<String>,
    pub cover_image: Option<String>,
    pub cover_image_url: Option<String>,
    #[serde(rename = "owner")]
    pub owner_id: Option<String>,
    #[serde(rename = "parent")]
    pub parent_id: Option<i64>,
    pub is_public: bool,
    pub share_token: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Lightweight page listing entry
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct PageSummary {
    pub id: i64,
    pub title: String,
    pub icon: Option<String>,
    #[serde(rename = "parent")]
    pub parent_id: Option<i64>,
    pub is_public: bool,
    pub created_at: String,
    pub updated_at: String,
    pub blocks_count: i64,
}

/// Create page request
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreatePage {
    pub title: Option<String>,
    pub icon: Option<String>,
    pub parent: Option<i64>,
}

/// Update page request
///
/// `icon` and `parent` accept an explicit `null` to clear the value.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdatePage {
    pub title: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub icon: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub parent: Option<Option<i64>>,
}

/// Validated values for a page insert
#[derive(Debug, Clone)]
pub struct NewPage {
    pub title: String,
    pub icon: Option<String>,
    pub parent_id: Option<i64>,
}

impl CreatePage {
    /// Normalize the request, defaulting a blank title
    pub fn into_new_page(self) -> Result<NewPage> {
        let title = match self.title.as_deref().map(str::trim) {
            Some(t) if !t.is_empty() => t.to_string(),
            _ => DEFAULT_PAGE_TITLE.to_string(),
        };

        Ok(NewPage {
            title,
            icon: validate_icon(self.icon)?,
            parent_id: self.parent,
        })
    }
}

impl UpdatePage {
    /// Merge the changes into an existing page; an empty title is allowed here
    pub fn apply(self, page: &mut Page) -> Result<()> {
        if let Some(title) = self.title {
            page.title = title.trim().to_string();
        }
        if let Some(icon) = self.icon {
            page.icon = validate_icon(icon)?;
        }
        if let Some(parent) = self.parent {
            page.parent_id = parent;
        }
        Ok(())
    }
}

fn validate_icon(icon: Option<String>) -> Result<Option<String>> {
    match icon {
        Some(icon) if icon.chars().count() > MAX_ICON_CHARS => Err(AppError::Validation(
            format!("icon must be at most {} characters", MAX_ICON_CHARS),
        )),
        Some(icon) if icon.trim().is_empty() => Ok(None),
        other => Ok(other),
    }
}

/// Page repository
pub struct PageRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> PageRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Get a specific page
    pub async fn get(&self, id: i64) -> Result<Option<Page>> {
        let mut conn = self.pool.acquire().await?;
        select_page(&mut *conn, id).await
    }

    /// List all pages owned by a user, most recently updated first
    pub async fn list_for_owner(&self, owner_id: &str) -> Result<Vec<PageSummary>> {
        let pages = sqlx::query_as::<_, PageSummary>(&format!(
            "{} WHERE p.owner_id = ? ORDER BY p.updated_at DESC, p.id DESC",
            SELECT_PAGE_SUMMARY
        ))
        .bind(owner_id)
        .fetch_all(self.pool)
        .await?;

        Ok(pages)
    }

    /// List the direct children of a page
    pub async fn list_children(&self, parent_id: i64, owner_id: &str) -> Result<Vec<PageSummary>> {
        let pages = sqlx::query_as::<_, PageSummary>(&format!(
            "{} WHERE p.parent_id = ? AND p.owner_id = ? ORDER BY p.updated_at DESC, p.id DESC",
            SELECT_PAGE_SUMMARY
        ))
        .bind(parent_id)
        .bind(owner_id)
        .fetch_all(self.pool)
        .await?;

        Ok(pages)
    }

    /// Resolve a share token to a page, but only while the page is public
    pub async fn find_public_by_token(&self, token: &str) -> Result<Option<Page>> {
        let page = sqlx::query_as::<_, Page>(&format!(
            "{} WHERE share_token = ? AND is_public = 1",
            SELECT_PAGE
        ))
        .bind(token)
        .fetch_optional(self.pool)
        .await?;

        Ok(page)
    }

    /// Create a new page
    pub async fn create(&self, owner_id: &str, data: &NewPage) -> Result<Page> {
        let mut conn = self.pool.acquire().await?;
        let id = insert_page(&mut *conn, Some(owner_id), data).await?;
        drop(conn);

        tracing::info!(page_id = id, owner = %owner_id, "Created page");

        self.get(id)
            .await?
            .ok_or_else(|| AppError::Internal("Failed to fetch created page".to_string()))
    }

    /// Persist the editable fields of a page and refresh `updated_at`
    pub async fn update(&self, page: &Page) -> Result<Page> {
        sqlx::query(
            r#"
            UPDATE pages
            SET title = ?, icon = ?, parent_id = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&page.title)
        .bind(&page.icon)
        .bind(page.parent_id)
        .bind(now())
        .bind(page.id)
        .execute(self.pool)
        .await?;

        self.get(page.id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Page not found: {}", page.id)))
    }

    /// Record an uploaded cover image
    pub async fn set_cover(&self, id: i64, key: &str, url: &str) -> Result<Page> {
        sqlx::query(
            "UPDATE pages SET cover_image = ?, cover_image_url = ?, updated_at = ? WHERE id = ?",
        )
        .bind(key)
        .bind(url)
        .bind(now())
        .bind(id)
        .execute(self.pool)
        .await?;

        self.get(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Page not found: {}", id)))
    }

    /// Delete a page together with its descendant pages, their blocks and
    /// those blocks' comments, all in one transaction
    pub async fn delete(&self, id: i64) -> Result<bool> {
        let mut tx = begin_write(self.pool).await?;

        let subtree = page_subtree_ids(&mut *tx, id).await?;
        if subtree.is_empty() {
            return Ok(false);
        }

        // Deepest pages first so no parent_id ever dangles
        for page_id in subtree.iter().rev() {
            sqlx::query(
                "DELETE FROM comments WHERE block_id IN (SELECT id FROM blocks WHERE page_id = ?)",
            )
            .bind(page_id)
            .execute(&mut *tx)
            .await?;

            sqlx::query("DELETE FROM blocks WHERE page_id = ?")
                .bind(page_id)
                .execute(&mut *tx)
                .await?;

            sqlx::query("DELETE FROM pages WHERE id = ?")
                .bind(page_id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        tracing::info!(page_id = id, removed_pages = subtree.len(), "Deleted page tree");
        Ok(true)
    }
}

/// Load a page on an existing connection or transaction
pub async fn select_page(conn: &mut SqliteConnection, id: i64) -> Result<Option<Page>> {
    let page = sqlx::query_as::<_, Page>(&format!("{} WHERE id = ?", SELECT_PAGE))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

    Ok(page)
}

/// Insert a page row and return its id
pub async fn insert_page(
    conn: &mut SqliteConnection,
    owner_id: Option<&str>,
    data: &NewPage,
) -> Result<i64> {
    let now = now();

    let result = sqlx::query(
        r#"
        INSERT INTO pages (title, icon, owner_id, parent_id, is_public, created_at, updated_at)
        VALUES (?, ?, ?, ?, 0, ?, ?)
        "#,
    )
    .bind(&data.title)
    .bind(&data.icon)
    .bind(owner_id)
    .bind(data.parent_id)
    .bind(&now)
    .bind(&now)
    .execute(&mut *conn)
    .await?;

    Ok(result.last_insert_rowid())
}

/// Ids of a page and all of its descendants in breadth-first order.
///
/// Empty when the root does not exist.
pub async fn page_subtree_ids(conn: &mut SqliteConnection, root: i64) -> Result<Vec<i64>> {
    let rows: Vec<(i64,)> = sqlx::query_as(
        r#"
        WITH RECURSIVE subtree(id, depth) AS (
            SELECT id, 0 FROM pages WHERE id = ?
            UNION ALL
            SELECT p.id, s.depth + 1 FROM pages p JOIN subtree s ON p.parent_id = s.id
        )
        SELECT id FROM subtree ORDER BY depth, id
        "#,
    )
    .bind(root)
    .fetch_all(&mut *conn)
    .await?;

    Ok(rows.into_iter().map(|(id,)| id).collect())
}
