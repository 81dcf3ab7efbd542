use chrono::{DateTime, NaiveDateTime, Utc};
use uuid::Uuid;

use super::parser::RssItem;
use crate::storage::Post;

/// `Mon, 02 Jan 2006 15:04:05` without the zone
const RFC1123_NO_ZONE: &str = "%a, %d %b %Y %H:%M:%S";

/// Turn a raw feed item into the post that will be committed.
///
/// Text fields are trimmed. `published_at` comes from `pubDate` when it
/// parses (see [`parse_pub_date`]) and otherwise falls back to `now`, which
/// also stamps `created_at`/`updated_at`. Every call mints a fresh id.
pub fn normalize(item: &RssItem, feed_id: Uuid, now: DateTime<Utc>) -> Post {
    let published_at = parse_pub_date(&item.pub_date).unwrap_or(now);

    Post {
        id: Uuid::new_v4(),
        feed_id,
        title: item.title.trim().to_string(),
        url: item.link.trim().to_string(),
        description: item.description.trim().to_string(),
        published_at,
        created_at: now,
        updated_at: now,
    }
}

/// Best-effort parse of an RSS `pubDate`.
///
/// Accepts RFC 1123 / RFC 2822 stamps, including the named US zones
/// (`GMT`, `EST`, `MST`, ...) and numeric offsets. A stamp in the RFC 1123
/// shape with any other alphabetic zone abbreviation (`CEST`, `JST`) is read
/// with a zero offset. Everything else is `None`; plenty of real feeds land
/// here and get the ingestion time instead.
pub fn parse_pub_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(parsed) = DateTime::parse_from_rfc2822(raw) {
        return Some(parsed.with_timezone(&Utc));
    }

    let (stamp, zone) = raw.rsplit_once(' ')?;
    if zone.is_empty() || !zone.chars().all(|c| c.is_ascii_alphabetic()) {
        return None;
    }
    NaiveDateTime::parse_from_str(stamp.trim_end(), RFC1123_NO_ZONE)
        .ok()
        .map(|naive| naive.and_utc())
}
