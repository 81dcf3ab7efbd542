//! Committing normalized posts.
//!
//! A URL collision is a skip, not an error, and a failed insert never stops
//! the remaining items of the same document.

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;

use crate::feed::{normalize, RssItem};
use crate::storage::{Database, DatabaseError, Feed, Post};

/// Why a post was not inserted although nothing went wrong
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// A post with the same URL is already stored
    DuplicateUrl,
}

/// Outcome of committing one post
#[derive(Debug)]
pub enum CommitResult {
    Inserted(Post),
    Skipped(SkipReason),
    Failed(DatabaseError),
}

/// Emitted once per inserted post for external display
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestEvent {
    pub feed_name: String,
    pub title: String,
    pub url: String,
}

/// Per-document tally of commit outcomes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestSummary {
    pub inserted: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Insert one post, classifying the outcome.
pub async fn commit(db: &Database, post: &Post) -> CommitResult {
    match db.create_post(post).await {
        Ok(stored) => CommitResult::Inserted(stored),
        Err(e) if e.is_duplicate() => CommitResult::Skipped(SkipReason::DuplicateUrl),
        Err(e) => CommitResult::Failed(e),
    }
}

/// Normalize and commit every item of one feed's document, in order.
///
/// Inserted posts are announced on `events` (if given) as they land. A send
/// to a closed receiver is ignored.
pub async fn ingest_items(
    db: &Database,
    feed: &Feed,
    items: &[RssItem],
    now: DateTime<Utc>,
    events: Option<&mpsc::Sender<IngestEvent>>,
) -> IngestSummary {
    let mut summary = IngestSummary::default();

    for item in items {
        let post = normalize(item, feed.id, now);

        match commit(db, &post).await {
            CommitResult::Inserted(stored) => {
                summary.inserted += 1;
                tracing::info!(feed = %feed.name, title = %stored.title, "Post ingested");
                if let Some(tx) = events {
                    let _ = tx
                        .send(IngestEvent {
                            feed_name: feed.name.clone(),
                            title: stored.title,
                            url: stored.url,
                        })
                        .await;
                }
            }
            CommitResult::Skipped(reason) => {
                summary.skipped += 1;
                tracing::debug!(
                    feed = %feed.url,
                    url = %post.url,
                    reason = ?reason,
                    "Post already stored, skipping"
                );
            }
            CommitResult::Failed(e) => {
                summary.failed += 1;
                tracing::warn!(
                    feed = %feed.url,
                    title = %post.title,
                    error = %e,
                    "Failed to store post"
                );
            }
        }
    }

    summary
}
