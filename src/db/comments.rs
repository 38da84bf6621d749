//! Comment database operations

use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use super::now;
use crate::error::{AppError, Result};

const SELECT_COMMENT: &str = r#"
    SELECT id, block_id, content, created_at, updated_at
    FROM comments
"#;

/// Comment record
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Comment {
    pub id: i64,
    #[serde(rename = "block")]
    pub block_id: i64,
    pub content: String,
    pub created_at: String,
    pub updated_at: String,
}

/// Create comment request
#[derive(Debug, Clone, Deserialize)]
pub struct CreateComment {
    pub block: i64,
    pub content: String,
}

/// Update comment request
#[derive(Debug, Clone, Deserialize)]
pub struct UpdateComment {
    pub content: String,
}

/// Validated values for a comment insert
#[derive(Debug, Clone)]
pub struct NewComment {
    pub block_id: i64,
    pub content: String,
}

impl CreateComment {
    pub fn validate(self) -> Result<NewComment> {
        Ok(NewComment {
            block_id: self.block,
            content: validate_content(self.content)?,
        })
    }
}

impl UpdateComment {
    pub fn validate(self) -> Result<String> {
        validate_content(self.content)
    }
}

fn validate_content(content: String) -> Result<String> {
    if content.trim().is_empty() {
        return Err(AppError::Validation("Comment content must not be empty".to_string()));
    }
    Ok(content)
}

/// Comment repository
pub struct CommentRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> CommentRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Get a specific comment
    pub async fn get(&self, id: i64) -> Result<Option<Comment>> {
        let comment = sqlx::query_as::<_, Comment>(&format!("{} WHERE id = ?", SELECT_COMMENT))
            .bind(id)
            .fetch_optional(self.pool)
            .await?;

        Ok(comment)
    }

    /// List comments on a block, oldest first
    pub async fn list_for_block(&self, block_id: i64) -> Result<Vec<Comment>> {
        let comments = sqlx::query_as::<_, Comment>(&format!(
            "{} WHERE block_id = ? ORDER BY created_at ASC, id ASC",
            SELECT_COMMENT
        ))
        .bind(block_id)
        .fetch_all(self.pool)
        .await?;

        Ok(comments)
    }

    /// List comments on blocks of pages owned by a user, optionally
    /// restricted to one block
    pub async fn list_for_owner(&self, owner_id: &str, block_id: Option<i64>) -> Result<Vec<Comment>> {
        let comments = sqlx::query_as::<_, Comment>(&format!(
            r#"
            {}
            WHERE block_id IN (
                SELECT b.id FROM blocks b JOIN pages p ON p.id = b.page_id WHERE p.owner_id = ?
            )
              AND (? IS NULL OR block_id = ?)
            ORDER BY created_at ASC, id ASC
            "#,
            SELECT_COMMENT
        ))
        .bind(owner_id)
        .bind(block_id)
        .bind(block_id)
        .fetch_all(self.pool)
        .await?;

        Ok(comments)
    }

    /// Create a new comment
    pub async fn create(&self, data: &NewComment) -> Result<Comment> {
        let now = now();

        let result = sqlx::query(
            r#"
            INSERT INTO comments (block_id, content, created_at, updated_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(data.block_id)
        .bind(&data.content)
        .bind(&now)
        .bind(&now)
        .execute(self.pool)
        .await?;

        let id = result.last_insert_rowid();
        self.get(id)
            .await?
            .ok_or_else(|| AppError::Internal("Failed to fetch created comment".to_string()))
    }

    /// Replace the content of a comment
    pub async fn update(&self, id: i64, content: &str) -> Result<Option<Comment>> {
        sqlx::query("UPDATE comments SET content = ?, updated_at = ? WHERE id = ?")
            .bind(content)
            .bind(now())
            .bind(id)
            .execute(self.pool)
            .await?;

        self.get(id).await
    }

    /// Delete a comment
    pub async fn delete(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM comments WHERE id = ?")
            .bind(id)
            .execute(self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
