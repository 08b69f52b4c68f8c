//! Slot allocation.
//!
//! A slot is a recurring daily time of day (`HH:MM`, interpreted in UTC) at
//! which a page may receive a post. [`next_slot`] finds the earliest minute
//! strictly after a starting point that matches one of the page's slots and
//! is not already booked by a non-failed post for that page.

use crate::db::{self, Pool};
use chrono::{DateTime, Utc};
use tracing::instrument;

/// Upper bound on the forward scan. Enough room for a couple hundred posts
/// on a single-slot page.
pub const SEARCH_HORIZON_DAYS: i64 = 60;

const MINUTE: i64 = 60;
const DAY: i64 = 86_400;

/// Parse a comma-separated `HH:MM` list into sorted, deduplicated
/// (hour, minute) pairs. Unparseable or out-of-range entries are skipped.
pub fn parse_slots(raw: &str) -> Vec<(u32, u32)> {
    let mut slots: Vec<(u32, u32)> = raw
        .split(',')
        .filter_map(|entry| {
            let (h, m) = entry.trim().split_once(':')?;
            let h: u32 = h.parse().ok()?;
            let m: u32 = m.parse().ok()?;
            (h < 24 && m < 60).then_some((h, m))
        })
        .collect();
    slots.sort_unstable();
    slots.dedup();
    slots
}

/// Find the next free slot for `page_id` strictly after `after`, or `None`
/// when the slot list is empty/unparseable or the search horizon is
/// exhausted. Deterministic for a fixed store state, and monotonically
/// non-decreasing in `after`.
#[instrument(skip(pool, raw_slots))]
pub async fn next_slot(
    pool: &Pool,
    page_id: i64,
    raw_slots: &str,
    after: DateTime<Utc>,
) -> Result<Option<DateTime<Utc>>, sqlx::Error> {
    let slots = parse_slots(raw_slots);
    let Some(&(first_h, first_m)) = slots.first() else {
        return Ok(None);
    };
    let (last_h, last_m) = *slots.last().unwrap_or(&(first_h, first_m));

    // Begin one minute past `after`, truncated to the whole minute. Working
    // in epoch seconds keeps month/day rollover exact: a UTC day is a fixed
    // 86 400 seconds.
    let mut cursor = (after.timestamp().div_euclid(MINUTE) + 1) * MINUTE;
    let limit = cursor + SEARCH_HORIZON_DAYS * DAY;

    while cursor < limit {
        let secs_of_day = cursor.rem_euclid(DAY);
        let hm = ((secs_of_day / 3600) as u32, ((secs_of_day % 3600) / 60) as u32);

        if slots.binary_search(&hm).is_ok() && !db::slot_taken(pool, page_id, cursor).await? {
            return Ok(DateTime::<Utc>::from_timestamp(cursor, 0));
        }

        if hm >= (last_h, last_m) {
            // Past the day's final slot: jump straight to tomorrow's first.
            let midnight = cursor - secs_of_day + DAY;
            cursor = midnight + (first_h as i64) * 3600 + (first_m as i64) * MINUTE;
        } else {
            cursor += MINUTE;
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{setup_test_pool, NewPage, NewPost};
    use crate::model::PostStatus;
    use chrono::TimeZone;

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    async fn make_page(pool: &Pool, slots: &str) -> i64 {
        db::insert_page(
            pool,
            &NewPage {
                name: "p".into(),
                external_id: format!("ext-{}", fastrand::u64(..)),
                access_token: "t".into(),
                time_slots: Some(slots.into()),
                allow_images: true,
                allow_videos: true,
            },
        )
        .await
        .unwrap()
    }

    async fn book(pool: &Pool, page_id: i64, when: DateTime<Utc>) -> i64 {
        let media_id = db::insert_media(
            pool,
            &format!("key-{}", fastrand::u64(..)),
            "a.jpg",
            "image/jpeg",
            None,
        )
        .await
        .unwrap();
        db::insert_post(
            pool,
            &NewPost {
                page_id,
                media_id,
                title: "t".into(),
                description: "d".into(),
                scheduled_time: when.timestamp(),
                media_kind: "image",
                status: PostStatus::Scheduled,
            },
        )
        .await
        .unwrap()
    }

    #[test]
    fn parse_dedupes_sorts_and_skips_garbage() {
        assert_eq!(parse_slots("09:00,09:00,08:00"), vec![(8, 0), (9, 0)]);
        assert_eq!(parse_slots(" 10:30 , nope, 25:00, 10:75"), vec![(10, 30)]);
        assert!(parse_slots("").is_empty());
        assert!(parse_slots(",,").is_empty());
    }

    #[tokio::test]
    async fn empty_slot_list_yields_none() {
        let pool = setup_test_pool().await;
        let page = make_page(&pool, "garbage").await;
        let got = next_slot(&pool, page, "garbage", at(2025, 3, 14, 8, 0))
            .await
            .unwrap();
        assert!(got.is_none());
    }

    #[tokio::test]
    async fn mid_morning_start_lands_on_later_slot_same_day() {
        let pool = setup_test_pool().await;
        let page = make_page(&pool, "08:00,09:00").await;
        let got = next_slot(&pool, page, "08:00,09:00", at(2025, 3, 14, 8, 30))
            .await
            .unwrap();
        assert_eq!(got, Some(at(2025, 3, 14, 9, 0)));
    }

    #[tokio::test]
    async fn past_last_slot_rolls_to_next_day_first_slot() {
        let pool = setup_test_pool().await;
        let page = make_page(&pool, "08:00,09:00").await;
        let got = next_slot(&pool, page, "08:00,09:00", at(2025, 3, 14, 9, 30))
            .await
            .unwrap();
        assert_eq!(got, Some(at(2025, 3, 15, 8, 0)));
    }

    #[tokio::test]
    async fn exactly_on_a_slot_moves_strictly_forward() {
        let pool = setup_test_pool().await;
        let page = make_page(&pool, "08:00,09:00").await;
        let got = next_slot(&pool, page, "08:00,09:00", at(2025, 3, 14, 8, 0))
            .await
            .unwrap();
        assert_eq!(got, Some(at(2025, 3, 14, 9, 0)));
    }

    #[tokio::test]
    async fn duplicate_slots_behave_like_deduplicated_list() {
        let pool = setup_test_pool().await;
        let page = make_page(&pool, "09:00,09:00,08:00").await;
        let got = next_slot(&pool, page, "09:00,09:00,08:00", at(2025, 3, 14, 7, 0))
            .await
            .unwrap();
        assert_eq!(got, Some(at(2025, 3, 14, 8, 0)));
    }

    #[tokio::test]
    async fn occupied_slots_are_skipped_not_reused() {
        let pool = setup_test_pool().await;
        let page = make_page(&pool, "08:00,09:00").await;
        book(&pool, page, at(2025, 3, 14, 9, 0)).await;

        let got = next_slot(&pool, page, "08:00,09:00", at(2025, 3, 14, 8, 30))
            .await
            .unwrap();
        assert_eq!(got, Some(at(2025, 3, 15, 8, 0)));
    }

    #[tokio::test]
    async fn failed_posts_free_their_slot() {
        let pool = setup_test_pool().await;
        let page = make_page(&pool, "09:00").await;
        let post = book(&pool, page, at(2025, 3, 14, 9, 0)).await;
        db::mark_failed(&pool, post, "boom").await.unwrap();

        let got = next_slot(&pool, page, "09:00", at(2025, 3, 14, 8, 0))
            .await
            .unwrap();
        assert_eq!(got, Some(at(2025, 3, 14, 9, 0)));
    }

    #[tokio::test]
    async fn other_pages_bookings_do_not_block() {
        let pool = setup_test_pool().await;
        let page_a = make_page(&pool, "09:00").await;
        let page_b = make_page(&pool, "09:00").await;
        book(&pool, page_b, at(2025, 3, 14, 9, 0)).await;

        let got = next_slot(&pool, page_a, "09:00", at(2025, 3, 14, 8, 0))
            .await
            .unwrap();
        assert_eq!(got, Some(at(2025, 3, 14, 9, 0)));
    }

    #[tokio::test]
    async fn month_boundary_rollover() {
        let pool = setup_test_pool().await;
        let page = make_page(&pool, "08:00").await;
        let got = next_slot(&pool, page, "08:00", at(2025, 1, 31, 21, 0))
            .await
            .unwrap();
        assert_eq!(got, Some(at(2025, 2, 1, 8, 0)));
    }

    #[tokio::test]
    async fn monotonic_in_after() {
        let pool = setup_test_pool().await;
        let page = make_page(&pool, "08:00,14:00,20:00").await;
        let starts = [
            at(2025, 3, 14, 0, 0),
            at(2025, 3, 14, 8, 0),
            at(2025, 3, 14, 13, 59),
            at(2025, 3, 14, 20, 0),
            at(2025, 3, 15, 5, 0),
        ];
        let mut prev: Option<DateTime<Utc>> = None;
        for after in starts {
            let got = next_slot(&pool, page, "08:00,14:00,20:00", after)
                .await
                .unwrap()
                .unwrap();
            assert!(got > after, "{got} must be strictly after {after}");
            if let Some(p) = prev {
                assert!(got >= p, "non-monotonic: {p} then {got}");
            }
            prev = Some(got);
        }
    }

    #[tokio::test]
    async fn horizon_exhaustion_returns_none() {
        let pool = setup_test_pool().await;
        let page = make_page(&pool, "12:00").await;
        let start = at(2025, 3, 1, 0, 0);
        // Book the single daily slot for every day the scan can reach.
        for day in 0..=SEARCH_HORIZON_DAYS {
            let when = start + chrono::Duration::days(day) + chrono::Duration::hours(12);
            book(&pool, page, when).await;
        }

        let got = next_slot(&pool, page, "12:00", start).await.unwrap();
        assert!(got.is_none());
    }
}
