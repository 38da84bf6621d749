//! Block database operations

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};
use sqlx::{SqliteConnection, SqlitePool};

use super::{begin_write, double_option, now};
use crate::error::{AppError, Result};

const SELECT_BLOCK: &str = r#"
    SELECT id, page_id, parent_id, block_type, content, format_json,
           file, file_url, file_type, file_size, checked, sort_order,
           created_at, updated_at
    FROM blocks
"#;

/// Canonical sibling order within a page
pub const BLOCK_ORDER_BY: &str = "ORDER BY sort_order ASC, created_at ASC, id ASC";

/// Kind of content a block holds
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockType {
    #[default]
    Text,
    Heading1,
    Heading2,
    Heading3,
    Image,
    Video,
    Audio,
    File,
    Quote,
    List,
    Checkbox,
    Divider,
}

impl BlockType {
    pub const ALL: [BlockType; 12] = [
        BlockType::Text,
        BlockType::Heading1,
        BlockType::Heading2,
        BlockType::Heading3,
        BlockType::Image,
        BlockType::Video,
        BlockType::Audio,
        BlockType::File,
        BlockType::Quote,
        BlockType::List,
        BlockType::Checkbox,
        BlockType::Divider,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            BlockType::Text => "text",
            BlockType::Heading1 => "heading1",
            BlockType::Heading2 => "heading2",
            BlockType::Heading3 => "heading3",
            BlockType::Image => "image",
            BlockType::Video => "video",
            BlockType::Audio => "audio",
            BlockType::File => "file",
            BlockType::Quote => "quote",
            BlockType::List => "list",
            BlockType::Checkbox => "checkbox",
            BlockType::Divider => "divider",
        }
    }

    /// Block types that may carry an uploaded attachment
    pub fn is_media(self) -> bool {
        matches!(
            self,
            BlockType::Image | BlockType::Video | BlockType::Audio | BlockType::File
        )
    }

    /// Block types for which `checked` is meaningful
    pub fn is_checkable(self) -> bool {
        self == BlockType::Checkbox
    }
}

impl fmt::Display for BlockType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BlockType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        BlockType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| AppError::Validation(format!("Unknown block type: {}", s)))
    }
}

/// Uploaded file attached to a media block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    /// Blob storage key
    pub file: String,
    pub file_url: String,
    pub file_type: String,
    pub file_size: i64,
}

/// Block record
#[derive(Debug, Clone)]
pub struct Block {
    pub id: i64,
    pub page_id: i64,
    pub parent_id: Option<i64>,
    pub block_type: BlockType,
    pub content: String,
    pub format: Map<String, Value>,
    pub attachment: Option<Attachment>,
    pub checked: bool,
    pub order: i64,
    pub created_at: String,
    pub updated_at: String,
}

/// Wire shape of a block: attachment fields are always present, `null`
/// when the block has no file
#[derive(Serialize)]
struct BlockJson<'a> {
    id: i64,
    page: i64,
    parent: Option<i64>,
    block_type: BlockType,
    content: &'a str,
    format: &'a Map<String, Value>,
    file: Option<&'a str>,
    file_url: Option<&'a str>,
    file_type: Option<&'a str>,
    file_size: Option<i64>,
    checked: bool,
    order: i64,
    created_at: &'a str,
    updated_at: &'a str,
}

impl Serialize for Block {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let attachment = self.attachment.as_ref();

        BlockJson {
            id: self.id,
            page: self.page_id,
            parent: self.parent_id,
            block_type: self.block_type,
            content: &self.content,
            format: &self.format,
            file: attachment.map(|a| a.file.as_str()),
            file_url: attachment.map(|a| a.file_url.as_str()),
            file_type: attachment.map(|a| a.file_type.as_str()),
            file_size: attachment.map(|a| a.file_size),
            checked: self.checked,
            order: self.order,
            created_at: &self.created_at,
            updated_at: &self.updated_at,
        }
        .serialize(serializer)
    }
}

#[derive(Debug, sqlx::FromRow)]
struct BlockRow {
    id: i64,
    page_id: i64,
    parent_id: Option<i64>,
    block_type: String,
    content: String,
    format_json: String,
    file: Option<String>,
    file_url: Option<String>,
    file_type: Option<String>,
    file_size: Option<i64>,
    checked: bool,
    sort_order: i64,
    created_at: String,
    updated_at: String,
}

impl TryFrom<BlockRow> for Block {
    type Error = AppError;

    fn try_from(row: BlockRow) -> Result<Self> {
        let attachment = match (row.file, row.file_url) {
            (Some(file), Some(file_url)) => Some(Attachment {
                file,
                file_url,
                file_type: row.file_type.unwrap_or_default(),
                file_size: row.file_size.unwrap_or(0),
            }),
            _ => None,
        };

        Ok(Block {
            id: row.id,
            page_id: row.page_id,
            parent_id: row.parent_id,
            block_type: row.block_type.parse()?,
            content: row.content,
            format: serde_json::from_str(&row.format_json)?,
            attachment,
            checked: row.checked,
            order: row.sort_order,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Create block request
#[derive(Debug, Clone, Deserialize)]
pub struct CreateBlock {
    pub page: i64,
    #[serde(default)]
    pub block_type: BlockType,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub format: Map<String, Value>,
    #[serde(default)]
    pub checked: bool,
    #[serde(default)]
    pub order: i64,
    pub parent: Option<i64>,
}

/// Update block request; the owning page cannot be changed
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateBlock {
    pub block_type: Option<BlockType>,
    pub content: Option<String>,
    pub format: Option<Map<String, Value>>,
    pub checked: Option<bool>,
    pub order: Option<i64>,
    #[serde(default, deserialize_with = "double_option")]
    pub parent: Option<Option<i64>>,
}

/// Validated values for a block insert
#[derive(Debug, Clone)]
pub struct NewBlock {
    pub page_id: i64,
    pub parent_id: Option<i64>,
    pub block_type: BlockType,
    pub content: String,
    pub format: Map<String, Value>,
    pub checked: bool,
    pub order: i64,
}

impl CreateBlock {
    pub fn into_new_block(self) -> Result<NewBlock> {
        if self.checked && !self.block_type.is_checkable() {
            return Err(AppError::Validation(format!(
                "'checked' is not supported for {} blocks",
                self.block_type
            )));
        }

        Ok(NewBlock {
            page_id: self.page,
            parent_id: self.parent,
            block_type: self.block_type,
            content: self.content,
            format: self.format,
            checked: self.checked,
            order: self.order,
        })
    }
}

impl UpdateBlock {
    /// Merge the changes into an existing block, keeping per-type attributes
    /// consistent with the resulting block type
    pub fn apply(self, block: &mut Block) -> Result<()> {
        let block_type = self.block_type.unwrap_or(block.block_type);

        if self.checked == Some(true) && !block_type.is_checkable() {
            return Err(AppError::Validation(format!(
                "'checked' is not supported for {} blocks",
                block_type
            )));
        }

        block.block_type = block_type;
        if let Some(content) = self.content {
            block.content = content;
        }
        if let Some(format) = self.format {
            block.format = format;
        }
        if let Some(checked) = self.checked {
            block.checked = checked;
        }
        if let Some(order) = self.order {
            block.order = order;
        }
        if let Some(parent) = self.parent {
            block.parent_id = parent;
        }

        if !block_type.is_checkable() {
            block.checked = false;
        }
        if !block_type.is_media() {
            block.attachment = None;
        }

        Ok(())
    }
}

/// Block repository
pub struct BlockRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> BlockRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Get a specific block
    pub async fn get(&self, id: i64) -> Result<Option<Block>> {
        let row = sqlx::query_as::<_, BlockRow>(&format!("{} WHERE id = ?", SELECT_BLOCK))
            .bind(id)
            .fetch_optional(self.pool)
            .await?;

        row.map(Block::try_from).transpose()
    }

    /// List the blocks of a page in canonical order
    pub async fn list_for_page(&self, page_id: i64) -> Result<Vec<Block>> {
        let mut conn = self.pool.acquire().await?;
        select_page_blocks(&mut *conn, page_id).await
    }

    /// List blocks on pages owned by a user, optionally restricted to one page
    pub async fn list_for_owner(&self, owner_id: &str, page_id: Option<i64>) -> Result<Vec<Block>> {
        let rows = sqlx::query_as::<_, BlockRow>(&format!(
            r#"
            {}
            WHERE page_id IN (SELECT id FROM pages WHERE owner_id = ?)
              AND (? IS NULL OR page_id = ?)
            ORDER BY page_id ASC, sort_order ASC, created_at ASC, id ASC
            "#,
            SELECT_BLOCK
        ))
        .bind(owner_id)
        .bind(page_id)
        .bind(page_id)
        .fetch_all(self.pool)
        .await?;

        rows.into_iter().map(Block::try_from).collect()
    }

    /// Create a new block
    pub async fn create(&self, data: &NewBlock) -> Result<Block> {
        let mut conn = self.pool.acquire().await?;
        let id = insert_block(&mut *conn, data).await?;
        drop(conn);

        tracing::debug!(block_id = id, page_id = data.page_id, block_type = %data.block_type, "Created block");

        self.get(id)
            .await?
            .ok_or_else(|| AppError::Internal("Failed to fetch created block".to_string()))
    }

    /// Persist every mutable field of a block and refresh `updated_at`
    pub async fn update(&self, block: &Block) -> Result<Block> {
        let attachment = block.attachment.as_ref();

        sqlx::query(
            r#"
            UPDATE blocks
            SET parent_id = ?, block_type = ?, content = ?, format_json = ?,
                file = ?, file_url = ?, file_type = ?, file_size = ?,
                checked = ?, sort_order = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(block.parent_id)
        .bind(block.block_type.as_str())
        .bind(&block.content)
        .bind(serde_json::to_string(&block.format)?)
        .bind(attachment.map(|a| a.file.as_str()))
        .bind(attachment.map(|a| a.file_url.as_str()))
        .bind(attachment.map(|a| a.file_type.as_str()))
        .bind(attachment.map(|a| a.file_size))
        .bind(block.checked)
        .bind(block.order)
        .bind(now())
        .bind(block.id)
        .execute(self.pool)
        .await?;

        self.get(block.id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Block not found: {}", block.id)))
    }

    /// Record an uploaded attachment on a block
    pub async fn attach_file(&self, id: i64, attachment: &Attachment) -> Result<Block> {
        sqlx::query(
            r#"
            UPDATE blocks
            SET file = ?, file_url = ?, file_type = ?, file_size = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&attachment.file)
        .bind(&attachment.file_url)
        .bind(&attachment.file_type)
        .bind(attachment.file_size)
        .bind(now())
        .bind(id)
        .execute(self.pool)
        .await?;

        self.get(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Block not found: {}", id)))
    }

    /// Delete a block, its nested blocks and all of their comments in one
    /// transaction
    pub async fn delete(&self, id: i64) -> Result<bool> {
        let mut tx = begin_write(self.pool).await?;

        let subtree = block_subtree_ids(&mut *tx, id).await?;
        if subtree.is_empty() {
            return Ok(false);
        }

        for block_id in subtree.iter().rev() {
            sqlx::query("DELETE FROM comments WHERE block_id = ?")
                .bind(block_id)
                .execute(&mut *tx)
                .await?;

            sqlx::query("DELETE FROM blocks WHERE id = ?")
                .bind(block_id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        tracing::debug!(block_id = id, removed_blocks = subtree.len(), "Deleted block tree");
        Ok(true)
    }
}

/// Blocks of a page in canonical order, on an existing connection or
/// transaction
pub async fn select_page_blocks(conn: &mut SqliteConnection, page_id: i64) -> Result<Vec<Block>> {
    let rows = sqlx::query_as::<_, BlockRow>(&format!(
        "{} WHERE page_id = ? {}",
        SELECT_BLOCK, BLOCK_ORDER_BY
    ))
    .bind(page_id)
    .fetch_all(&mut *conn)
    .await?;

    rows.into_iter().map(Block::try_from).collect()
}

/// Insert a block row and return its id
pub async fn insert_block(conn: &mut SqliteConnection, data: &NewBlock) -> Result<i64> {
    let now = now();

    let result = sqlx::query(
        r#"
        INSERT INTO blocks (page_id, parent_id, block_type, content, format_json, checked, sort_order, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(data.page_id)
    .bind(data.parent_id)
    .bind(data.block_type.as_str())
    .bind(&data.content)
    .bind(serde_json::to_string(&data.format)?)
    .bind(data.checked)
    .bind(data.order)
    .bind(&now)
    .bind(&now)
    .execute(&mut *conn)
    .await?;

    Ok(result.last_insert_rowid())
}

/// Ids of a block and all of its nested blocks in breadth-first order.
///
/// Empty when the root does not exist.
pub async fn block_subtree_ids(conn: &mut SqliteConnection, root: i64) -> Result<Vec<i64>> {
    let rows: Vec<(i64,)> = sqlx::query_as(
        r#"
        WITH RECURSIVE subtree(id, depth) AS (
            SELECT id, 0 FROM blocks WHERE id = ?
            UNION ALL
            SELECT b.id, s.depth + 1 FROM blocks b JOIN subtree s ON b.parent_id = s.id
        )
        SELECT id FROM subtree ORDER BY depth, id
        "#,
    )
    .bind(root)
    .fetch_all(&mut *conn)
    .await?;

    Ok(rows.into_iter().map(|(id,)| id).collect())
}

#[cfg(test)]
impl CreateBlock {
    pub(crate) fn text(page: i64, content: &str) -> Self {
        CreateBlock {
            page,
            block_type: BlockType::Text,
            content: content.to_string(),
            format: Map::new(),
            checked: false,
            order: 0,
            parent: None,
        }
    }
}
