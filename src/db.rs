//! SQLite record store for pages, folders, media items and scheduled posts.
//!
//! All functions are thin async wrappers over a shared [`Pool`]. Multi-step
//! mutations (cascading deletes, the sweep's claim step) either run inside an
//! explicit transaction or as a single conditional statement so overlapping
//! callers never observe half-applied state.

use crate::model::{Folder, MediaItem, Page, PostStatus, ScheduledPost};
use sqlx::{Row, Sqlite, SqlitePool, Transaction};
use tracing::instrument;

pub type Pool = SqlitePool;

pub async fn init_pool(database_url: &str) -> Result<Pool, sqlx::Error> {
    let normalized = prepare_sqlite_url(database_url);
    let pool = SqlitePool::connect(&normalized).await?;
    // Enable WAL and stricter durability.
    sqlx::query("PRAGMA journal_mode=WAL;").execute(&pool).await?;
    sqlx::query("PRAGMA synchronous=FULL;").execute(&pool).await?;
    Ok(pool)
}

/// For file-backed SQLite URLs, expand a leading `~/` and make sure the
/// parent directory exists. In-memory URLs and other schemes pass through.
fn prepare_sqlite_url(url: &str) -> String {
    let Some(rest) = url.strip_prefix("sqlite:") else {
        return url.to_string();
    };
    if rest.starts_with(":memory") {
        return url.to_string();
    }
    let rest = rest.strip_prefix("//").unwrap_or(rest);
    let (path, query) = match rest.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (rest, None),
    };
    if path.is_empty() {
        return url.to_string();
    }

    let expanded = match (path.strip_prefix("~/"), std::env::var("HOME")) {
        (Some(tail), Ok(home)) => format!("{}/{}", home.trim_end_matches('/'), tail),
        _ => path.to_string(),
    };
    if let Some(parent) = std::path::Path::new(&expanded).parent() {
        if !parent.as_os_str().is_empty() {
            let _ = std::fs::create_dir_all(parent);
        }
    }

    match query {
        Some(q) => format!("sqlite://{}?{}", expanded, q),
        None => format!("sqlite://{}", expanded),
    }
}

pub async fn run_migrations(pool: &Pool) -> Result<(), sqlx::Error> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

// --- Pages ---

#[derive(Debug, Clone)]
pub struct NewPage {
    pub name: String,
    pub external_id: String,
    pub access_token: String,
    pub time_slots: Option<String>,
    pub allow_images: bool,
    pub allow_videos: bool,
}

/// Hourly slots from 08:00 through 20:00, applied when a page is registered
/// without an explicit slot list.
pub const DEFAULT_TIME_SLOTS: &str =
    "08:00,09:00,10:00,11:00,12:00,13:00,14:00,15:00,16:00,17:00,18:00,19:00,20:00";

#[instrument(skip_all)]
pub async fn insert_page(pool: &Pool, page: &NewPage) -> Result<i64, sqlx::Error> {
    let slots = page
        .time_slots
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(DEFAULT_TIME_SLOTS);
    let rec = sqlx::query(
        "INSERT INTO pages (name, external_id, access_token, time_slots, allow_images, allow_videos) \
         VALUES (?, ?, ?, ?, ?, ?) RETURNING id",
    )
    .bind(&page.name)
    .bind(&page.external_id)
    .bind(&page.access_token)
    .bind(slots)
    .bind(page.allow_images)
    .bind(page.allow_videos)
    .fetch_one(pool)
    .await?;
    Ok(rec.get("id"))
}

#[instrument(skip_all)]
pub async fn get_page(pool: &Pool, id: i64) -> Result<Option<Page>, sqlx::Error> {
    sqlx::query_as::<_, Page>("SELECT * FROM pages WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await
}

#[instrument(skip_all)]
pub async fn list_pages(pool: &Pool) -> Result<Vec<Page>, sqlx::Error> {
    sqlx::query_as::<_, Page>("SELECT * FROM pages ORDER BY id")
        .fetch_all(pool)
        .await
}

#[instrument(skip_all)]
pub async fn pages_by_ids(pool: &Pool, ids: &[i64]) -> Result<Vec<Page>, sqlx::Error> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let placeholders = vec!["?"; ids.len()].join(",");
    let sql = format!(
        "SELECT * FROM pages WHERE id IN ({}) ORDER BY id",
        placeholders
    );
    let mut query = sqlx::query_as::<_, Page>(&sql);
    for id in ids {
        query = query.bind(id);
    }
    query.fetch_all(pool).await
}

/// Delete a page and every post scheduled for it, in one transaction.
/// Returns false when the page does not exist.
#[instrument(skip_all)]
pub async fn delete_page(pool: &Pool, id: i64) -> Result<bool, sqlx::Error> {
    let mut tx = pool.begin().await?;
    sqlx::query("DELETE FROM scheduled_posts WHERE page_id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    let done = sqlx::query("DELETE FROM pages WHERE id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;
    Ok(done.rows_affected() > 0)
}

// --- Folders ---

#[instrument(skip_all)]
pub async fn insert_folder(pool: &Pool, name: &str) -> Result<i64, sqlx::Error> {
    let rec = sqlx::query("INSERT INTO folders (name) VALUES (?) RETURNING id")
        .bind(name)
        .fetch_one(pool)
        .await?;
    Ok(rec.get("id"))
}

#[instrument(skip_all)]
pub async fn get_folder(pool: &Pool, id: i64) -> Result<Option<Folder>, sqlx::Error> {
    sqlx::query_as::<_, Folder>("SELECT * FROM folders WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await
}

#[instrument(skip_all)]
pub async fn list_folders(pool: &Pool) -> Result<Vec<Folder>, sqlx::Error> {
    sqlx::query_as::<_, Folder>("SELECT * FROM folders ORDER BY id")
        .fetch_all(pool)
        .await
}

// --- Media items ---

#[instrument(skip_all)]
pub async fn insert_media(
    pool: &Pool,
    storage_key: &str,
    original_name: &str,
    content_type: &str,
    folder_id: Option<i64>,
) -> Result<i64, sqlx::Error> {
    let rec = sqlx::query(
        "INSERT INTO media_items (storage_key, original_name, content_type, folder_id) \
         VALUES (?, ?, ?, ?) RETURNING id",
    )
    .bind(storage_key)
    .bind(original_name)
    .bind(content_type)
    .bind(folder_id)
    .fetch_one(pool)
    .await?;
    Ok(rec.get("id"))
}

#[instrument(skip_all)]
pub async fn get_media(pool: &Pool, id: i64) -> Result<Option<MediaItem>, sqlx::Error> {
    sqlx::query_as::<_, MediaItem>("SELECT * FROM media_items WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await
}

#[instrument(skip_all)]
pub async fn media_by_ids(pool: &Pool, ids: &[i64]) -> Result<Vec<MediaItem>, sqlx::Error> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let placeholders = vec!["?"; ids.len()].join(",");
    let sql = format!(
        "SELECT * FROM media_items WHERE id IN ({}) ORDER BY id",
        placeholders
    );
    let mut query = sqlx::query_as::<_, MediaItem>(&sql);
    for id in ids {
        query = query.bind(id);
    }
    query.fetch_all(pool).await
}

#[instrument(skip_all)]
pub async fn list_media_in_folder(
    pool: &Pool,
    folder_id: i64,
) -> Result<Vec<MediaItem>, sqlx::Error> {
    sqlx::query_as::<_, MediaItem>(
        "SELECT * FROM media_items WHERE folder_id = ? ORDER BY uploaded_at DESC, id DESC",
    )
    .bind(folder_id)
    .fetch_all(pool)
    .await
}

/// Remove a media row and its dependent posts within a caller-provided
/// transaction (the caller pairs this with blob removal).
pub async fn delete_media_tx(
    tx: &mut Transaction<'_, Sqlite>,
    media_id: i64,
) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM scheduled_posts WHERE media_id = ?")
        .bind(media_id)
        .execute(&mut **tx)
        .await?;
    sqlx::query("DELETE FROM media_items WHERE id = ?")
        .bind(media_id)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

pub async fn delete_folder_tx(
    tx: &mut Transaction<'_, Sqlite>,
    folder_id: i64,
) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM folders WHERE id = ?")
        .bind(folder_id)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

// --- Scheduled posts ---

#[derive(Debug, Clone)]
pub struct NewPost {
    pub page_id: i64,
    pub media_id: i64,
    pub title: String,
    pub description: String,
    pub scheduled_time: i64,
    pub media_kind: &'static str,
    pub status: PostStatus,
}

#[instrument(skip_all)]
pub async fn insert_post(pool: &Pool, post: &NewPost) -> Result<i64, sqlx::Error> {
    let rec = sqlx::query(
        "INSERT INTO scheduled_posts \
         (page_id, media_id, title, description, scheduled_time, media_kind, status, is_active) \
         VALUES (?, ?, ?, ?, ?, ?, ?, 1) RETURNING id",
    )
    .bind(post.page_id)
    .bind(post.media_id)
    .bind(&post.title)
    .bind(&post.description)
    .bind(post.scheduled_time)
    .bind(post.media_kind)
    .bind(post.status.as_str())
    .fetch_one(pool)
    .await?;
    Ok(rec.get("id"))
}

#[instrument(skip_all)]
pub async fn get_post(pool: &Pool, id: i64) -> Result<Option<ScheduledPost>, sqlx::Error> {
    sqlx::query_as::<_, ScheduledPost>("SELECT * FROM scheduled_posts WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await
}

#[instrument(skip_all)]
pub async fn list_posts(pool: &Pool) -> Result<Vec<ScheduledPost>, sqlx::Error> {
    sqlx::query_as::<_, ScheduledPost>(
        "SELECT * FROM scheduled_posts ORDER BY scheduled_time, id",
    )
    .fetch_all(pool)
    .await
}

/// Occupancy probe for the slot allocator: true when a non-failed post
/// already targets this page at this exact timestamp.
#[instrument(skip_all)]
pub async fn slot_taken(pool: &Pool, page_id: i64, scheduled_time: i64) -> Result<bool, sqlx::Error> {
    let taken: i64 = sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM scheduled_posts \
         WHERE page_id = ? AND scheduled_time = ? AND status != 'failed')",
    )
    .bind(page_id)
    .bind(scheduled_time)
    .fetch_one(pool)
    .await?;
    Ok(taken != 0)
}

/// Atomically claim every due, active, scheduled post by flipping it to
/// `processing`, returning the claimed ids. A single conditional UPDATE, so
/// two overlapping sweeps can never claim the same post.
#[instrument(skip_all)]
pub async fn claim_due_posts(pool: &Pool, now: i64) -> Result<Vec<i64>, sqlx::Error> {
    let rows = sqlx::query(
        "UPDATE scheduled_posts SET status = 'processing' \
         WHERE status = 'scheduled' AND is_active = 1 AND scheduled_time <= ? \
         RETURNING id",
    )
    .bind(now)
    .fetch_all(pool)
    .await?;
    Ok(rows.iter().map(|r| r.get("id")).collect())
}

#[instrument(skip_all)]
pub async fn mark_posted(
    pool: &Pool,
    id: i64,
    remote_post_id: &str,
    published_at: Option<i64>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE scheduled_posts SET status = 'posted', remote_post_id = ?, \
         scheduled_time = COALESCE(?, scheduled_time), error_message = NULL WHERE id = ?",
    )
    .bind(remote_post_id)
    .bind(published_at)
    .bind(id)
    .execute(pool)
    .await?;
    Ok(())
}

#[instrument(skip_all)]
pub async fn mark_failed(pool: &Pool, id: i64, error: &str) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE scheduled_posts SET status = 'failed', error_message = ? WHERE id = ?")
        .bind(error)
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Reset a post for retry: back to `scheduled`, active, due at `due`, error
/// text cleared.
#[instrument(skip_all)]
pub async fn reset_post(pool: &Pool, id: i64, due: i64) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE scheduled_posts SET status = 'scheduled', is_active = 1, \
         scheduled_time = ?, error_message = NULL WHERE id = ?",
    )
    .bind(due)
    .bind(id)
    .execute(pool)
    .await?;
    Ok(())
}

#[instrument(skip_all)]
pub async fn set_post_time(
    pool: &Pool,
    id: i64,
    scheduled_time: i64,
    reset_failed: bool,
) -> Result<(), sqlx::Error> {
    if reset_failed {
        sqlx::query(
            "UPDATE scheduled_posts SET scheduled_time = ?, \
             status = CASE WHEN status = 'failed' THEN 'scheduled' ELSE status END, \
             error_message = CASE WHEN status = 'failed' THEN NULL ELSE error_message END \
             WHERE id = ?",
        )
        .bind(scheduled_time)
        .bind(id)
        .execute(pool)
        .await?;
    } else {
        sqlx::query("UPDATE scheduled_posts SET scheduled_time = ? WHERE id = ?")
            .bind(scheduled_time)
            .bind(id)
            .execute(pool)
            .await?;
    }
    Ok(())
}

#[instrument(skip_all)]
pub async fn set_post_active(pool: &Pool, id: i64, is_active: bool) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE scheduled_posts SET is_active = ? WHERE id = ?")
        .bind(is_active)
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

/// A post joined with its page and media display names, for listings.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PostOverview {
    pub id: i64,
    pub page_id: i64,
    pub page_name: Option<String>,
    pub title: String,
    pub description: String,
    pub scheduled_time: i64,
    pub media_kind: String,
    pub media_name: Option<String>,
    pub status: String,
    pub is_active: bool,
    pub remote_post_id: Option<String>,
    pub error_message: Option<String>,
}

#[instrument(skip_all)]
pub async fn list_posts_overview(pool: &Pool) -> Result<Vec<PostOverview>, sqlx::Error> {
    sqlx::query_as::<_, PostOverview>(
        "SELECT sp.id, sp.page_id, p.name AS page_name, sp.title, sp.description, \
                sp.scheduled_time, sp.media_kind, m.original_name AS media_name, \
                sp.status, sp.is_active, sp.remote_post_id, sp.error_message \
         FROM scheduled_posts sp \
         LEFT JOIN pages p ON p.id = sp.page_id \
         LEFT JOIN media_items m ON m.id = sp.media_id \
         ORDER BY sp.scheduled_time, sp.id",
    )
    .fetch_all(pool)
    .await
}

#[instrument(skip_all)]
pub async fn delete_post(pool: &Pool, id: i64) -> Result<bool, sqlx::Error> {
    let done = sqlx::query("DELETE FROM scheduled_posts WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(done.rows_affected() > 0)
}

#[cfg(test)]
pub async fn setup_test_pool() -> Pool {
    let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    pool
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_page() -> NewPage {
        NewPage {
            name: "Test Page".into(),
            external_id: "ext-1".into(),
            access_token: "token".into(),
            time_slots: Some("08:00,09:00".into()),
            allow_images: true,
            allow_videos: true,
        }
    }

    #[tokio::test]
    async fn default_folder_is_seeded() {
        let pool = setup_test_pool().await;
        let folders = list_folders(&pool).await.unwrap();
        assert_eq!(folders.len(), 1);
        assert_eq!(folders[0].name, "Default Folder");
    }

    #[tokio::test]
    async fn page_default_slots_applied() {
        let pool = setup_test_pool().await;
        let mut page = sample_page();
        page.time_slots = None;
        let id = insert_page(&pool, &page).await.unwrap();
        let stored = get_page(&pool, id).await.unwrap().unwrap();
        assert!(stored.time_slots.starts_with("08:00,"));
        assert!(stored.time_slots.ends_with("20:00"));
    }

    #[tokio::test]
    async fn duplicate_external_id_rejected() {
        let pool = setup_test_pool().await;
        insert_page(&pool, &sample_page()).await.unwrap();
        let err = insert_page(&pool, &sample_page()).await.unwrap_err();
        match err {
            sqlx::Error::Database(db) => assert!(db.is_unique_violation()),
            other => panic!("expected unique violation, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn slot_taken_ignores_failed_posts() {
        let pool = setup_test_pool().await;
        let page_id = insert_page(&pool, &sample_page()).await.unwrap();
        let media_id = insert_media(&pool, "k1", "a.jpg", "image/jpeg", None)
            .await
            .unwrap();

        let post_id = insert_post(
            &pool,
            &NewPost {
                page_id,
                media_id,
                title: "t".into(),
                description: "d".into(),
                scheduled_time: 1_000_000,
                media_kind: "image",
                status: PostStatus::Scheduled,
            },
        )
        .await
        .unwrap();

        assert!(slot_taken(&pool, page_id, 1_000_000).await.unwrap());
        assert!(!slot_taken(&pool, page_id, 1_000_060).await.unwrap());

        mark_failed(&pool, post_id, "boom").await.unwrap();
        assert!(!slot_taken(&pool, page_id, 1_000_000).await.unwrap());
    }

    #[tokio::test]
    async fn claim_is_exclusive_and_respects_filters() {
        let pool = setup_test_pool().await;
        let page_id = insert_page(&pool, &sample_page()).await.unwrap();
        let media_id = insert_media(&pool, "k2", "b.jpg", "image/jpeg", None)
            .await
            .unwrap();

        let mut new_post = NewPost {
            page_id,
            media_id,
            title: "t".into(),
            description: "d".into(),
            scheduled_time: 100,
            media_kind: "image",
            status: PostStatus::Scheduled,
        };
        let due = insert_post(&pool, &new_post).await.unwrap();
        new_post.scheduled_time = 10_000;
        let not_due = insert_post(&pool, &new_post).await.unwrap();
        new_post.scheduled_time = 100;
        let paused = insert_post(&pool, &new_post).await.unwrap();
        set_post_active(&pool, paused, false).await.unwrap();

        let claimed = claim_due_posts(&pool, 500).await.unwrap();
        assert_eq!(claimed, vec![due]);

        // Second claim sees nothing left.
        assert!(claim_due_posts(&pool, 500).await.unwrap().is_empty());

        let later = claim_due_posts(&pool, 20_000).await.unwrap();
        assert_eq!(later, vec![not_due]);
    }

    #[tokio::test]
    async fn cascade_deletes() {
        let pool = setup_test_pool().await;
        let page_id = insert_page(&pool, &sample_page()).await.unwrap();
        let media_id = insert_media(&pool, "k3", "c.mp4", "video/mp4", Some(1))
            .await
            .unwrap();
        insert_post(
            &pool,
            &NewPost {
                page_id,
                media_id,
                title: "t".into(),
                description: "d".into(),
                scheduled_time: 42,
                media_kind: "video",
                status: PostStatus::Scheduled,
            },
        )
        .await
        .unwrap();

        assert!(delete_page(&pool, page_id).await.unwrap());
        let remaining: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM scheduled_posts")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(remaining, 0);
        assert!(!delete_page(&pool, page_id).await.unwrap());
    }
}
