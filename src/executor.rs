//! Publish execution: drive one scheduled post to a terminal outcome.

use crate::db::{self, Pool};
use crate::error::Result;
use crate::graph::{PublishRequest, PublishService};
use crate::storage::MediaStore;
use chrono::Utc;
use tracing::{info, instrument, warn};

/// Posts due within this window are published immediately instead of being
/// handed to the remote service as a future schedule; absorbs clock and
/// sweep-cadence jitter.
pub const IMMEDIATE_BUFFER_SECS: i64 = 60;

/// Terminal result of one execution attempt. `Failed` covers both recorded
/// failures (remote rejection, transport error) and precondition failures
/// that leave the record untouched (missing relation or blob, content gate).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecOutcome {
    Posted { remote_id: String },
    Failed { reason: String },
}

/// Execute a post. Remote failures are persisted as `failed` on the record
/// and returned inside `Ok`; only store errors surface as `Err`, so a sweep
/// can keep going regardless of any single post's fate.
#[instrument(skip(pool, store, publisher))]
pub async fn execute(
    pool: &Pool,
    store: &MediaStore,
    publisher: &dyn PublishService,
    post_id: i64,
    publish_now: bool,
) -> Result<ExecOutcome> {
    let Some(post) = db::get_post(pool, post_id).await? else {
        warn!(post_id, "post not found");
        return Ok(failed("post, media, or page not found"));
    };
    let (Some(media_id), Some(page)) = (post.media_id, db::get_page(pool, post.page_id).await?)
    else {
        warn!(post_id, "post missing page or media relation");
        return Ok(failed("post, media, or page not found"));
    };
    let Some(media) = db::get_media(pool, media_id).await? else {
        warn!(post_id, media_id, "media record not found");
        return Ok(failed("post, media, or page not found"));
    };

    let bytes = match store.read(&media.storage_key).await {
        Ok(bytes) => bytes,
        Err(err) => {
            warn!(post_id, key = %media.storage_key, %err, "media blob missing from store");
            return Ok(failed("media file missing from store"));
        }
    };

    let kind = media.kind();
    if !page.allows(kind) {
        // Content gate: never reaches the remote service.
        return Ok(failed(format!(
            "page '{}' restricted: {}s not allowed",
            page.name,
            kind.as_str()
        )));
    }

    let now = Utc::now().timestamp();
    let immediate = publish_now || post.scheduled_time <= now + IMMEDIATE_BUFFER_SECS;
    if immediate {
        info!(post_id, "publishing immediately");
    } else {
        info!(post_id, scheduled_time = post.scheduled_time, "requesting deferred publish");
    }

    let req = PublishRequest {
        page_external_id: page.external_id.clone(),
        access_token: page.access_token.clone(),
        kind,
        caption: format!("{}\n\n{}", post.title, post.description),
        file_name: media.storage_key.clone(),
        content_type: media.content_type.clone(),
        file: bytes,
        scheduled_publish_time: (!immediate).then_some(post.scheduled_time),
    };

    match publisher.publish(req).await {
        Ok(remote_id) => {
            // For immediate publishes, make the record reflect the actual
            // publish instant rather than the originally requested time.
            let published_at = immediate.then(|| Utc::now().timestamp());
            db::mark_posted(pool, post_id, &remote_id, published_at).await?;
            info!(post_id, %remote_id, "post published");
            Ok(ExecOutcome::Posted { remote_id })
        }
        Err(err) => {
            let reason = err.to_string();
            warn!(post_id, %reason, "publish failed");
            db::mark_failed(pool, post_id, &reason).await?;
            Ok(ExecOutcome::Failed { reason })
        }
    }
}

fn failed(reason: impl Into<String>) -> ExecOutcome {
    ExecOutcome::Failed {
        reason: reason.into(),
    }
}
