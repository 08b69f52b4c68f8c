//! Batch scheduling: fan a set of media out across a set of pages.

use crate::content;
use crate::db::{self, NewPost, Pool};
use crate::error::{Error, Result};
use crate::executor::{self, ExecOutcome};
use crate::graph::PublishService;
use crate::model::{MediaItem, MediaKind, Page, PostStatus};
use crate::slots;
use crate::storage::MediaStore;
use chrono::Utc;
use tracing::{info, instrument, warn};

#[derive(Debug, Clone)]
pub struct BatchRequest {
    pub media_ids: Vec<i64>,
    pub page_ids: Vec<i64>,
    pub title_template: String,
    pub description_template: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    /// Posts actually persisted in state `scheduled`.
    pub scheduled: usize,
    /// Pairings that survived the content-gate filter.
    pub candidates: usize,
    /// True when the allocator could not produce a slot for some candidate
    /// (empty slot list or horizon ran out); `scheduled` then reports the
    /// partial count.
    pub exhausted: bool,
}

impl BatchOutcome {
    pub fn message(&self) -> String {
        if self.candidates == 0 {
            "No posts were scheduled. Check page content restrictions against selected media types."
                .to_string()
        } else {
            format!("{} unique posts have been scheduled.", self.scheduled)
        }
    }
}

/// Schedule the filtered cross-product of (media, page) pairings.
///
/// Candidates are processed media-major (outer loop over media, inner over
/// pages) with a single cursor that starts at "now" and advances to each
/// allocated slot, so no two candidates in the batch can land on the same
/// (page, timestamp) even though none of them is committed when the next is
/// allocated. Allocator exhaustion stops the batch; the partial count is
/// reported, never an error.
#[instrument(skip_all)]
pub async fn schedule_batch(pool: &Pool, req: &BatchRequest) -> Result<BatchOutcome> {
    let (media, pages) = load_targets(pool, req).await?;

    let mut queue: Vec<(&Page, &MediaItem, MediaKind)> = Vec::new();
    for item in &media {
        for page in &pages {
            let kind = item.kind();
            if page.allows(kind) {
                queue.push((page, item, kind));
            }
        }
    }
    if queue.is_empty() {
        return Ok(BatchOutcome::default());
    }

    let mut outcome = BatchOutcome {
        candidates: queue.len(),
        ..Default::default()
    };
    let mut cursor = Utc::now();
    for (page, item, kind) in queue {
        let Some(slot) = slots::next_slot(pool, page.id, &page.time_slots, cursor).await? else {
            warn!(
                page_id = page.id,
                scheduled = outcome.scheduled,
                "no slot available; stopping batch"
            );
            outcome.exhausted = true;
            break;
        };
        let (title, description) =
            content::generate(&req.title_template, &req.description_template);
        db::insert_post(
            pool,
            &NewPost {
                page_id: page.id,
                media_id: item.id,
                title,
                description,
                scheduled_time: slot.timestamp(),
                media_kind: kind.as_str(),
                status: PostStatus::Scheduled,
            },
        )
        .await?;
        cursor = slot;
        outcome.scheduled += 1;
    }

    info!(
        scheduled = outcome.scheduled,
        candidates = outcome.candidates,
        "batch scheduled"
    );
    Ok(outcome)
}

#[derive(Debug, Clone, Default)]
pub struct PublishNowOutcome {
    pub succeeded: usize,
    /// Human-readable reasons, one per pairing that did not publish.
    pub failures: Vec<String>,
}

/// Publish the filtered cross-product right away, page-major. Each pairing
/// gets a record created in `processing` (due in the immediate past so a
/// sweep could also find it) and is executed synchronously; failures are
/// collected, not fatal.
#[instrument(skip_all)]
pub async fn publish_batch_now(
    pool: &Pool,
    store: &MediaStore,
    publisher: &dyn PublishService,
    req: &BatchRequest,
) -> Result<PublishNowOutcome> {
    let (media, pages) = load_targets(pool, req).await?;

    let mut outcome = PublishNowOutcome::default();
    for page in &pages {
        for item in &media {
            let kind = item.kind();
            if !page.allows(kind) {
                outcome.failures.push(format!(
                    "Page {}: {}s restricted.",
                    page.name,
                    kind.as_str()
                ));
                continue;
            }

            let (title, description) =
                content::generate(&req.title_template, &req.description_template);
            let post_id = db::insert_post(
                pool,
                &NewPost {
                    page_id: page.id,
                    media_id: item.id,
                    title,
                    description,
                    scheduled_time: Utc::now().timestamp() - 5,
                    media_kind: kind.as_str(),
                    status: PostStatus::Processing,
                },
            )
            .await?;

            match executor::execute(pool, store, publisher, post_id, true).await {
                Ok(ExecOutcome::Posted { .. }) => outcome.succeeded += 1,
                Ok(ExecOutcome::Failed { reason }) => outcome
                    .failures
                    .push(format!("Page {}: Failed - {}", page.name, reason)),
                Err(err) => outcome
                    .failures
                    .push(format!("Page {}: Failed - {}", page.name, err)),
            }
        }
    }
    Ok(outcome)
}

async fn load_targets(pool: &Pool, req: &BatchRequest) -> Result<(Vec<MediaItem>, Vec<Page>)> {
    if req.media_ids.is_empty() || req.page_ids.is_empty() {
        return Err(Error::validation(
            "no media or pages selected for scheduling",
        ));
    }
    let media = db::media_by_ids(pool, &req.media_ids).await?;
    let pages = db::pages_by_ids(pool, &req.page_ids).await?;
    if media.is_empty() || pages.is_empty() {
        return Err(Error::not_found("selected media or pages"));
    }
    Ok((media, pages))
}
