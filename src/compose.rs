//! Page composition: duplication and nesting rules

use sqlx::SqlitePool;

use crate::access::authorize_page;
use crate::db::{
    begin_write, block_subtree_ids, insert_block, insert_page, page_subtree_ids, select_page,
    select_page_blocks, BlockRepository, NewBlock, NewPage, Page, PageRepository,
};
use crate::error::{AppError, Result};
use crate::identity::Principal;

/// Appended to the title of a duplicated page
pub const COPY_SUFFIX: &str = " (copy)";

/// Duplicate a page and its blocks as one transaction.
///
/// The copy keeps title (plus suffix), icon and parent. Each block keeps its
/// type, content, checked flag and order; attachments, formatting, nesting and
/// comments are not copied, so every copied block is top-level. Cover and
/// sharing state start fresh.
pub async fn duplicate(pool: &SqlitePool, principal: &Principal, page_id: i64) -> Result<Page> {
    authorize_page(pool, principal, page_id).await?;

    // Source and copy come from the same snapshot
    let mut tx = begin_write(pool).await?;

    let original = select_page(&mut *tx, page_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Page not found: {}", page_id)))?;
    let blocks = select_page_blocks(&mut *tx, page_id).await?;

    let new_page_id = insert_page(
        &mut *tx,
        Some(principal.user_id.as_str()),
        &NewPage {
            title: format!("{}{}", original.title, COPY_SUFFIX),
            icon: original.icon.clone(),
            parent_id: original.parent_id,
        },
    )
    .await?;

    for block in &blocks {
        insert_block(
            &mut *tx,
            &NewBlock {
                page_id: new_page_id,
                parent_id: None,
                block_type: block.block_type,
                content: block.content.clone(),
                format: Default::default(),
                checked: block.checked,
                order: block.order,
            },
        )
        .await?;
    }

    tx.commit().await?;

    tracing::info!(
        source_page = page_id,
        page_id = new_page_id,
        blocks = blocks.len(),
        "Duplicated page"
    );

    PageRepository::new(pool)
        .get(new_page_id)
        .await?
        .ok_or_else(|| AppError::Internal("Failed to fetch duplicated page".to_string()))
}

/// Check that `parent_id` may become the parent of `page_id`.
///
/// The parent must be owned by the caller and, when moving an existing page,
/// must not be the page itself or one of its descendants.
pub async fn validate_page_parent(
    pool: &SqlitePool,
    principal: &Principal,
    page_id: Option<i64>,
    parent_id: Option<i64>,
) -> Result<()> {
    let Some(parent_id) = parent_id else {
        return Ok(());
    };

    authorize_page(pool, principal, parent_id).await?;

    if let Some(page_id) = page_id {
        let mut conn = pool.acquire().await?;
        let subtree = page_subtree_ids(&mut *conn, page_id).await?;
        if subtree.contains(&parent_id) {
            return Err(AppError::Validation(
                "A page cannot be nested under itself or its descendants".to_string(),
            ));
        }
    }

    Ok(())
}

/// Check that `parent_id` may become the parent of a block on `page_id`.
///
/// The parent block must live on the same page and, when moving an existing
/// block, must not be the block itself or one of its nested blocks.
pub async fn validate_block_parent(
    pool: &SqlitePool,
    page_id: i64,
    block_id: Option<i64>,
    parent_id: Option<i64>,
) -> Result<()> {
    let Some(parent_id) = parent_id else {
        return Ok(());
    };

    let parent = BlockRepository::new(pool).get(parent_id).await?;
    match parent {
        Some(parent) if parent.page_id == page_id => {}
        _ => {
            return Err(AppError::Validation(format!(
                "Parent block {} is not on page {}",
                parent_id, page_id
            )))
        }
    }

    if let Some(block_id) = block_id {
        let mut conn = pool.acquire().await?;
        let subtree = block_subtree_ids(&mut *conn, block_id).await?;
        if subtree.contains(&parent_id) {
            return Err(AppError::Validation(
                "A block cannot be nested under itself or its descendants".to_string(),
            ));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{
        file_pool, test_pool, BlockType, CommentRepository, CreateBlock, CreateComment,
    };
    use crate::ordering::{reorder, ReorderItem};
    use serde_json::{Map, Value};

    async fn create_page(pool: &SqlitePool, owner: &str, title: &str, parent: Option<i64>) -> Page {
        PageRepository::new(pool)
            .create(
                owner,
                &NewPage {
                    title: title.to_string(),
                    icon: Some("📄".to_string()),
                    parent_id: parent,
                },
            )
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_duplicate_copies_blocks() {
        let pool = test_pool().await;
        let alice = Principal::new("alice");
        let parent = create_page(&pool, "alice", "Parent", None).await;
        let page = create_page(&pool, "alice", "Plan", Some(parent.id)).await;
        let repo = BlockRepository::new(&pool);

        let mut format = Map::new();
        format.insert("italic".to_string(), Value::Bool(true));

        let heading = repo
            .create(
                &CreateBlock {
                    block_type: BlockType::Heading1,
                    order: 0,
                    format,
                    ..CreateBlock::text(page.id, "Goals")
                }
                .into_new_block()
                .unwrap(),
            )
            .await
            .unwrap();
        repo.create(
            &CreateBlock {
                block_type: BlockType::Checkbox,
                checked: true,
                order: 3,
                parent: Some(heading.id),
                ..CreateBlock::text(page.id, "Ship it")
            }
            .into_new_block()
            .unwrap(),
        )
        .await
        .unwrap();
        CommentRepository::new(&pool)
            .create(
                &CreateComment {
                    block: heading.id,
                    content: "looks good".to_string(),
                }
                .validate()
                .unwrap(),
            )
            .await
            .unwrap();

        let copy = duplicate(&pool, &alice, page.id).await.unwrap();

        assert_ne!(copy.id, page.id);
        assert_eq!(copy.title, "Plan (copy)");
        assert_eq!(copy.icon, page.icon);
        assert_eq!(copy.parent_id, Some(parent.id));
        assert_eq!(copy.owner_id.as_deref(), Some("alice"));
        assert!(!copy.is_public);
        assert!(copy.share_token.is_none());

        let originals = repo.list_for_page(page.id).await.unwrap();
        let copies = repo.list_for_page(copy.id).await.unwrap();
        assert_eq!(copies.len(), originals.len());

        for (original, copied) in originals.iter().zip(&copies) {
            assert_eq!(copied.block_type, original.block_type);
            assert_eq!(copied.content, original.content);
            assert_eq!(copied.checked, original.checked);
            assert_eq!(copied.order, original.order);
            assert!(copied.parent_id.is_none());
            assert!(copied.format.is_empty());
            assert!(CommentRepository::new(&pool)
                .list_for_block(copied.id)
                .await
                .unwrap()
                .is_empty());
        }
    }

    #[tokio::test]
    async fn test_duplicate_empty_page() {
        let pool = test_pool().await;
        let page = create_page(&pool, "alice", "Empty", None).await;

        let copy = duplicate(&pool, &Principal::new("alice"), page.id).await.unwrap();

        assert_eq!(copy.title, "Empty (copy)");
        assert!(BlockRepository::new(&pool).list_for_page(copy.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_requires_ownership() {
        let pool = test_pool().await;
        let page = create_page(&pool, "alice", "Mine", None).await;

        let result = duplicate(&pool, &Principal::new("bob"), page.id).await;
        assert!(matches!(result, Err(AppError::PermissionDenied(_))));
        assert!(PageRepository::new(&pool).list_for_owner("bob").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_block_copy_rolls_back_page() {
        let pool = test_pool().await;
        let page = create_page(&pool, "alice", "Fragile", None).await;
        let repo = BlockRepository::new(&pool);
        repo.create(&CreateBlock::text(page.id, "fine").into_new_block().unwrap())
            .await
            .unwrap();
        repo.create(&CreateBlock { order: 1, ..CreateBlock::text(page.id, "poison") }
            .into_new_block()
            .unwrap())
            .await
            .unwrap();

        // Make the second copied insert fail
        sqlx::query(&format!(
            r#"
            CREATE TRIGGER reject_poison BEFORE INSERT ON blocks
            WHEN NEW.content = 'poison' AND NEW.page_id <> {}
            BEGIN SELECT RAISE(ABORT, 'poisoned block'); END;
            "#,
            page.id
        ))
        .execute(&pool)
        .await
        .unwrap();

        let result = duplicate(&pool, &Principal::new("alice"), page.id).await;
        assert!(result.is_err());

        let pages = PageRepository::new(&pool).list_for_owner("alice").await.unwrap();
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].id, page.id);
        assert_eq!(pages[0].blocks_count, 2);
    }

    #[tokio::test]
    async fn test_page_cannot_nest_under_descendant() {
        let pool = test_pool().await;
        let alice = Principal::new("alice");
        let root = create_page(&pool, "alice", "Root", None).await;
        let child = create_page(&pool, "alice", "Child", Some(root.id)).await;

        let result = validate_page_parent(&pool, &alice, Some(root.id), Some(child.id)).await;
        assert!(matches!(result, Err(AppError::Validation(_))));

        let result = validate_page_parent(&pool, &alice, Some(root.id), Some(root.id)).await;
        assert!(matches!(result, Err(AppError::Validation(_))));

        validate_page_parent(&pool, &alice, Some(child.id), None).await.unwrap();
    }

    #[tokio::test]
    async fn test_page_parent_must_be_owned() {
        let pool = test_pool().await;
        let foreign = create_page(&pool, "bob", "Bob's", None).await;

        let result =
            validate_page_parent(&pool, &Principal::new("alice"), None, Some(foreign.id)).await;
        assert!(matches!(result, Err(AppError::PermissionDenied(_))));
    }

    #[tokio::test]
    async fn test_block_parent_must_share_page() {
        let pool = test_pool().await;
        let first = create_page(&pool, "alice", "First", None).await;
        let second = create_page(&pool, "alice", "Second", None).await;
        let repo = BlockRepository::new(&pool);

        let outer = repo
            .create(&CreateBlock::text(first.id, "outer").into_new_block().unwrap())
            .await
            .unwrap();
        let inner = repo
            .create(
                &CreateBlock {
                    parent: Some(outer.id),
                    ..CreateBlock::text(first.id, "inner")
                }
                .into_new_block()
                .unwrap(),
            )
            .await
            .unwrap();

        validate_block_parent(&pool, first.id, None, Some(outer.id)).await.unwrap();

        let result = validate_block_parent(&pool, second.id, None, Some(outer.id)).await;
        assert!(matches!(result, Err(AppError::Validation(_))));

        let result = validate_block_parent(&pool, first.id, Some(outer.id), Some(inner.id)).await;
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_duplicate_copies_one_consistent_ordering() {
        let (pool, _dir) = file_pool().await;
        let page = create_page(&pool, "alice", "Busy", None).await;
        let repo = BlockRepository::new(&pool);

        let mut ids = Vec::new();
        for i in 0..10 {
            let block = repo
                .create(
                    &CreateBlock {
                        order: i,
                        ..CreateBlock::text(page.id, &format!("b{}", i))
                    }
                    .into_new_block()
                    .unwrap(),
                )
                .await
                .unwrap();
            ids.push(block.id);
        }
        let forward: Vec<String> = (0..10).map(|i| format!("b{}", i)).collect();
        let backward: Vec<String> = forward.iter().rev().cloned().collect();

        let reversed: Vec<ReorderItem> = ids
            .iter()
            .rev()
            .enumerate()
            .map(|(order, id)| ReorderItem {
                id: *id,
                order: order as i64,
            })
            .collect();

        let writer = {
            let pool = pool.clone();
            tokio::spawn(async move { reorder(&pool, &Principal::new("alice"), &reversed).await })
        };
        let copiers: Vec<_> = (0..3)
            .map(|_| {
                let pool = pool.clone();
                let id = page.id;
                tokio::spawn(async move { duplicate(&pool, &Principal::new("alice"), id).await })
            })
            .collect();

        writer.await.unwrap().unwrap();
        for copier in copiers {
            let copy = copier.await.unwrap().unwrap();
            let contents: Vec<String> = repo
                .list_for_page(copy.id)
                .await
                .unwrap()
                .into_iter()
                .map(|b| b.content)
                .collect();
            assert!(contents == forward || contents == backward, "{:?}", contents);
        }
    }
}
