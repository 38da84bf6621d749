//! Block ordering
//!
//! Clients compute the new sibling sequence after a drag-and-drop and submit
//! the whole batch. The server only persists it: every `(id, order)` pair is
//! applied inside one transaction, so readers see either the old ordering or
//! the new one, never a mix.
//!
//! Order values are taken as given. Gaps and duplicates are allowed; listing
//! breaks ties by creation time. Concurrent batches on the same page are
//! last-write-wins per row.

use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use crate::access::block_owner;
use crate::db::{begin_write, now};
use crate::error::{AppError, Result};
use crate::identity::Principal;

/// One entry of a reorder batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReorderItem {
    pub id: i64,
    pub order: i64,
}

/// Reorder request body
#[derive(Debug, Clone, Deserialize)]
pub struct ReorderRequest {
    #[serde(default)]
    pub blocks: Vec<ReorderItem>,
}

/// Outcome of a reorder batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReorderOutcome {
    /// Rows actually updated
    pub updated: usize,
    /// Ids that did not resolve to a block
    pub skipped: usize,
}

/// Apply a reorder batch atomically.
///
/// Ids that do not resolve to a block are skipped. An id resolving to a block
/// on a page the caller does not own aborts the batch and nothing is written.
pub async fn reorder(
    pool: &SqlitePool,
    principal: &Principal,
    batch: &[ReorderItem],
) -> Result<ReorderOutcome> {
    let mut tx = begin_write(pool).await?;
    let now = now();
    let mut outcome = ReorderOutcome {
        updated: 0,
        skipped: 0,
    };

    for item in batch {
        let owner = match block_owner(&mut *tx, item.id).await? {
            Some(owner) => owner,
            None => {
                tracing::debug!(block_id = item.id, "Skipping unknown block in reorder batch");
                outcome.skipped += 1;
                continue;
            }
        };

        if !principal.owns(owner.as_deref()) {
            // Dropping the transaction rolls back rows already written
            return Err(AppError::PermissionDenied(format!(
                "You do not have access to block {}",
                item.id
            )));
        }

        sqlx::query("UPDATE blocks SET sort_order = ?, updated_at = ? WHERE id = ?")
            .bind(item.order)
            .bind(&now)
            .bind(item.id)
            .execute(&mut *tx)
            .await?;
        outcome.updated += 1;
    }

    tx.commit().await?;

    tracing::info!(
        user = %principal.user_id,
        updated = outcome.updated,
        skipped = outcome.skipped,
        "Applied reorder batch"
    );

    Ok(outcome)
}
