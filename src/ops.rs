//! Management operations around the scheduling core: pages, folders, media
//! and manual post actions. These are the entry points an outer transport
//! (HTTP handlers, CLI) would call; they own input validation and the
//! transactional cascades.

use crate::db::{self, NewPage, Pool};
use crate::error::{Error, Result};
use crate::graph::PublishService;
use crate::model::{Folder, PostStatus, ScheduledPost};
use crate::storage::MediaStore;
use chrono::Utc;
use tracing::{info, instrument, warn};

/// The seeded folder that may never be deleted.
pub const DEFAULT_FOLDER_NAME: &str = "Default Folder";

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

/// Register a page after a pass-through credential check against the remote
/// service. Returns the new page id.
#[instrument(skip_all)]
pub async fn register_page(
    pool: &Pool,
    publisher: &dyn PublishService,
    page: NewPage,
) -> Result<i64> {
    if page.name.trim().is_empty() {
        return Err(Error::validation("page name must be non-empty"));
    }
    if page.external_id.trim().is_empty() || page.access_token.trim().is_empty() {
        return Err(Error::validation(
            "page external id and access token must be non-empty",
        ));
    }

    let remote_name = publisher
        .page_name(&page.external_id, &page.access_token)
        .await?;
    info!(external_id = %page.external_id, %remote_name, "credential check passed");

    db::insert_page(pool, &page).await.map_err(|err| {
        if is_unique_violation(&err) {
            Error::conflict(format!("page '{}' already registered", page.external_id))
        } else {
            err.into()
        }
    })
}

/// Delete a page and all its scheduled posts.
#[instrument(skip_all)]
pub async fn remove_page(pool: &Pool, page_id: i64) -> Result<()> {
    if !db::delete_page(pool, page_id).await? {
        return Err(Error::not_found(format!("page {page_id}")));
    }
    Ok(())
}

#[instrument(skip_all)]
pub async fn create_folder(pool: &Pool, name: &str) -> Result<i64> {
    let name = name.trim();
    if name.is_empty() {
        return Err(Error::validation("folder name must be non-empty"));
    }
    db::insert_folder(pool, name).await.map_err(|err| {
        if is_unique_violation(&err) {
            Error::conflict(format!("folder '{name}' already exists"))
        } else {
            err.into()
        }
    })
}

/// Delete a folder together with its media blobs, media rows and any posts
/// referencing them. Rows go in one transaction, children before parents;
/// a blob-removal failure rolls the whole transaction back.
#[instrument(skip_all)]
pub async fn delete_folder(pool: &Pool, store: &MediaStore, folder_id: i64) -> Result<()> {
    let folder: Folder = db::get_folder(pool, folder_id)
        .await?
        .ok_or_else(|| Error::not_found(format!("folder {folder_id}")))?;
    if folder.name == DEFAULT_FOLDER_NAME {
        return Err(Error::validation("the Default Folder cannot be deleted"));
    }

    let media = db::list_media_in_folder(pool, folder_id).await?;
    let mut tx = pool.begin().await?;
    for item in &media {
        db::delete_media_tx(&mut tx, item.id).await?;
        store.remove(&item.storage_key).await?;
    }
    db::delete_folder_tx(&mut tx, folder_id).await?;
    tx.commit().await?;
    info!(folder_id, files = media.len(), "folder deleted");
    Ok(())
}

/// Persist an uploaded blob and its media record. The blob lands under a
/// generated unique key; oversized uploads are rejected up front.
#[instrument(skip(pool, store, bytes))]
pub async fn save_media(
    pool: &Pool,
    store: &MediaStore,
    folder_id: i64,
    original_name: &str,
    content_type: &str,
    bytes: &[u8],
    max_bytes: u64,
) -> Result<i64> {
    if db::get_folder(pool, folder_id).await?.is_none() {
        return Err(Error::not_found(format!("folder {folder_id}")));
    }
    if bytes.len() as u64 > max_bytes {
        return Err(Error::validation(format!(
            "file '{}' exceeds the {} byte limit",
            original_name, max_bytes
        )));
    }

    let key = MediaStore::generate_key(original_name);
    store.save(&key, bytes).await?;
    match db::insert_media(pool, &key, original_name, content_type, Some(folder_id)).await {
        Ok(id) => Ok(id),
        Err(err) => {
            // Record failed: don't leave a dangling blob behind.
            if let Err(rm) = store.remove(&key).await {
                warn!(%key, %rm, "failed to clean up orphaned blob");
            }
            Err(err.into())
        }
    }
}

/// Delete a media item, its blob, and every post that references it.
#[instrument(skip_all)]
pub async fn delete_media(pool: &Pool, store: &MediaStore, media_id: i64) -> Result<()> {
    let item = db::get_media(pool, media_id)
        .await?
        .ok_or_else(|| Error::not_found(format!("media {media_id}")))?;

    let mut tx = pool.begin().await?;
    db::delete_media_tx(&mut tx, media_id).await?;
    store.remove(&item.storage_key).await?;
    tx.commit().await?;
    Ok(())
}

/// Reset a failed post so the next sweep picks it up immediately.
#[instrument(skip_all)]
pub async fn retry_post(pool: &Pool, post_id: i64) -> Result<()> {
    let post = require_post(pool, post_id).await?;
    if post.status() != Some(PostStatus::Failed) {
        return Err(Error::validation(
            "post status must be 'failed' to retry",
        ));
    }
    db::reset_post(pool, post_id, Utc::now().timestamp() - 5).await?;
    Ok(())
}

/// Move a post to a new future time. Re-timing a failed post also resets it
/// to `scheduled` and clears its error text.
#[instrument(skip_all)]
pub async fn set_post_time(pool: &Pool, post_id: i64, new_time: i64) -> Result<()> {
    require_post(pool, post_id).await?;
    if new_time <= Utc::now().timestamp() {
        return Err(Error::validation("scheduled time must be in the future"));
    }
    db::set_post_time(pool, post_id, new_time, true).await?;
    Ok(())
}

/// Flip the soft pause flag; returns the new value.
#[instrument(skip_all)]
pub async fn toggle_post_active(pool: &Pool, post_id: i64) -> Result<bool> {
    let post = require_post(pool, post_id).await?;
    let next = !post.is_active;
    db::set_post_active(pool, post_id, next).await?;
    Ok(next)
}

#[instrument(skip_all)]
pub async fn remove_post(pool: &Pool, post_id: i64) -> Result<()> {
    if !db::delete_post(pool, post_id).await? {
        return Err(Error::not_found(format!("post {post_id}")));
    }
    Ok(())
}

/// All posts with page and media display names resolved.
pub async fn list_posts(pool: &Pool) -> Result<Vec<db::PostOverview>> {
    Ok(db::list_posts_overview(pool).await?)
}

async fn require_post(pool: &Pool, post_id: i64) -> Result<ScheduledPost> {
    db::get_post(pool, post_id)
        .await?
        .ok_or_else(|| Error::not_found(format!("post {post_id}")))
}
