//! Database schema initialization

use sqlx::SqlitePool;

use crate::error::Result;

/// Initialize the database schema
pub async fn initialize_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query(SCHEMA_SQL)
        .execute(pool)
        .await?;

    Ok(())
}

// Foreign keys carry no ON DELETE action: cascades are performed explicitly
// by the repositories so the whole subtree goes in one transaction.
const SCHEMA_SQL: &str = r#"
-- Pages table (tree via parent_id)
CREATE TABLE IF NOT EXISTS pages (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    title TEXT NOT NULL DEFAULT '',
    icon TEXT,
    cover_image TEXT,
    cover_image_url TEXT,
    owner_id TEXT,
    parent_id INTEGER REFERENCES pages(id),
    is_public INTEGER NOT NULL DEFAULT 0,
    share_token TEXT UNIQUE,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_pages_owner ON pages(owner_id);
CREATE INDEX IF NOT EXISTS idx_pages_parent ON pages(parent_id);
CREATE INDEX IF NOT EXISTS idx_pages_updated_at ON pages(updated_at);

-- Blocks table (ordered within a page, optionally nested)
CREATE TABLE IF NOT EXISTS blocks (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    page_id INTEGER NOT NULL REFERENCES pages(id),
    parent_id INTEGER REFERENCES blocks(id),
    block_type TEXT NOT NULL DEFAULT 'text',
    content TEXT NOT NULL DEFAULT '',
    format_json TEXT NOT NULL DEFAULT '{}',
    -- Attachment (media block types only)
    file TEXT,
    file_url TEXT,
    file_type TEXT,
    file_size INTEGER,
    checked INTEGER NOT NULL DEFAULT 0,
    sort_order INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_blocks_page_order ON blocks(page_id, sort_order, created_at);
CREATE INDEX IF NOT EXISTS idx_blocks_parent ON blocks(parent_id);

-- Comments table
CREATE TABLE IF NOT EXISTS comments (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    block_id INTEGER NOT NULL REFERENCES blocks(id),
    content TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_comments_block ON comments(block_id, created_at);
"#;
