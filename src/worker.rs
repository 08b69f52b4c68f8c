//! Worker sweep: the periodic entry point that publishes due posts.

use crate::db::{self, Pool};
use crate::error::Result;
use crate::executor::{self, ExecOutcome};
use crate::graph::PublishService;
use crate::storage::MediaStore;
use chrono::{DateTime, Utc};
use tracing::{info, instrument, warn};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub claimed: usize,
    pub posted: usize,
    pub failed: usize,
}

/// Run one sweep: atomically claim every due, active, scheduled post, then
/// execute each claimed post with `publish_now=true` (due-ness is already
/// established). Safe under concurrent invocation: the claim is a single
/// conditional update, so overlapping sweeps partition the due set instead
/// of double-publishing.
#[instrument(skip(pool, store, publisher))]
pub async fn run_sweep(
    pool: &Pool,
    store: &MediaStore,
    publisher: &dyn PublishService,
    now: DateTime<Utc>,
) -> Result<SweepReport> {
    let claimed = db::claim_due_posts(pool, now.timestamp()).await?;
    if claimed.is_empty() {
        return Ok(SweepReport::default());
    }
    info!(count = claimed.len(), "claimed due posts");

    let mut report = SweepReport {
        claimed: claimed.len(),
        ..Default::default()
    };
    for post_id in claimed {
        match executor::execute(pool, store, publisher, post_id, true).await {
            Ok(ExecOutcome::Posted { .. }) => report.posted += 1,
            Ok(ExecOutcome::Failed { reason }) => {
                warn!(post_id, %reason, "sweep: post failed");
                report.failed += 1;
            }
            Err(err) => {
                // Store trouble for one post must not abort the rest.
                warn!(post_id, %err, "sweep: execution error");
                report.failed += 1;
            }
        }
    }
    info!(
        posted = report.posted,
        failed = report.failed,
        "sweep finished"
    );
    Ok(report)
}
