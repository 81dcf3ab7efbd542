use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::schema::Database;
use super::types::{to_millis, DatabaseError, Feed, FeedDbRow, FeedWithCreator};

const FEED_COLUMNS: &str = "id, name, url, user_id, last_fetched_at, created_at, updated_at";

impl Database {
    // ========================================================================
    // Feed Operations
    // ========================================================================

    /// Register a feed. The URL is unique; a second registration of the same
    /// URL yields `DatabaseError::Duplicate`.
    pub async fn create_feed(
        &self,
        name: &str,
        url: &str,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Feed, DatabaseError> {
        let row: FeedDbRow = sqlx::query_as(&format!(
            "INSERT INTO feeds (id, name, url, user_id, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?)
             RETURNING {FEED_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(name)
        .bind(url)
        .bind(user_id)
        .bind(to_millis(now))
        .bind(to_millis(now))
        .fetch_one(&self.pool)
        .await
        .map_err(|e| DatabaseError::from_insert(e, &format!("feed url '{}'", url)))?;
        Ok(row.into_feed())
    }

    /// All feeds in registration order
    pub async fn list_feeds(&self) -> Result<Vec<Feed>, DatabaseError> {
        let rows: Vec<FeedDbRow> = sqlx::query_as(&format!(
            "SELECT {FEED_COLUMNS} FROM feeds ORDER BY created_at, id"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(FeedDbRow::into_feed).collect())
    }

    /// Feeds with the name of the user who registered each
    pub async fn list_feeds_with_creators(&self) -> Result<Vec<FeedWithCreator>, DatabaseError> {
        let rows: Vec<(String, String, String)> = sqlx::query_as(
            r#"
                SELECT f.name, f.url, u.name
                FROM feeds f
                JOIN users u ON u.id = f.user_id
                ORDER BY f.created_at, f.id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(name, url, user_name)| FeedWithCreator {
                name,
                url,
                user_name,
            })
            .collect())
    }

    pub async fn get_feed_by_url(&self, url: &str) -> Result<Option<Feed>, DatabaseError> {
        let row: Option<FeedDbRow> =
            sqlx::query_as(&format!("SELECT {FEED_COLUMNS} FROM feeds WHERE url = ?"))
                .bind(url)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(FeedDbRow::into_feed))
    }

    // ========================================================================
    // Feed Selection
    // ========================================================================

    /// The feed that has gone longest without a fetch.
    ///
    /// Never-fetched feeds (NULL `last_fetched_at`) come first; ties are broken
    /// by id. Returns `None` when no feeds are registered.
    pub async fn get_next_feed_to_fetch(&self) -> Result<Option<Feed>, DatabaseError> {
        let row: Option<FeedDbRow> = sqlx::query_as(&format!(
            "SELECT {FEED_COLUMNS} FROM feeds
             ORDER BY last_fetched_at IS NOT NULL, last_fetched_at, id
             LIMIT 1"
        ))
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(FeedDbRow::into_feed))
    }

    /// Stamp a feed as fetched at `now`.
    ///
    /// `last_fetched_at` never moves backwards: an older `now` leaves the
    /// stored stamp in place.
    pub async fn mark_feed_fetched(
        &self,
        feed_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Feed, DatabaseError> {
        let at = to_millis(now);
        let row: Option<FeedDbRow> = sqlx::query_as(&format!(
            "UPDATE feeds
             SET last_fetched_at = MAX(COALESCE(last_fetched_at, 0), ?), updated_at = ?
             WHERE id = ?
             RETURNING {FEED_COLUMNS}"
        ))
        .bind(at)
        .bind(at)
        .bind(feed_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(FeedDbRow::into_feed)
            .ok_or_else(|| DatabaseError::NotFound(format!("feed {}", feed_id)))
    }

    /// Select the next feed and stamp it as fetched in one statement.
    ///
    /// Because selection and stamping share a single UPDATE, a concurrent
    /// claim cannot pick the same feed; it will only come round again once
    /// every other feed has been claimed. Returns `None` when no feeds exist.
    pub async fn claim_next_feed(&self, now: DateTime<Utc>) -> Result<Option<Feed>, DatabaseError> {
        self.claim_feed_fetched_before(now, i64::MAX).await
    }

    /// Like [`Database::claim_next_feed`], but only considers feeds never
    /// fetched or last fetched strictly before `due_before`. Returns `None`
    /// once every feed has been stamped at or after that instant.
    pub async fn claim_next_due_feed(
        &self,
        now: DateTime<Utc>,
        due_before: DateTime<Utc>,
    ) -> Result<Option<Feed>, DatabaseError> {
        self.claim_feed_fetched_before(now, to_millis(due_before)).await
    }

    async fn claim_feed_fetched_before(
        &self,
        now: DateTime<Utc>,
        cutoff: i64,
    ) -> Result<Option<Feed>, DatabaseError> {
        let at = to_millis(now);
        let row: Option<FeedDbRow> = sqlx::query_as(&format!(
            "UPDATE feeds
             SET last_fetched_at = MAX(COALESCE(last_fetched_at, 0), ?), updated_at = ?
             WHERE id = (
                 SELECT id FROM feeds
                 WHERE last_fetched_at IS NULL OR last_fetched_at < ?
                 ORDER BY last_fetched_at IS NOT NULL, last_fetched_at, id
                 LIMIT 1
             )
             RETURNING {FEED_COLUMNS}"
        ))
        .bind(at)
        .bind(at)
        .bind(cutoff)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(FeedDbRow::into_feed))
    }
}

#[cfg(test)]
mod tests {
    use crate::storage::{Database, Feed};
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use uuid::Uuid;

    async fn test_db() -> (Database, Uuid) {
        let db = Database::open(":memory:").await.unwrap();
        let user = db.create_user("tester", Utc::now()).await.unwrap();
        (db, user.id)
    }

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    async fn add_feed(db: &Database, user_id: Uuid, n: u32) -> Feed {
        db.create_feed(
            &format!("Feed {}", n),
            &format!("https://feed{}.example.com/rss", n),
            user_id,
            at(0),
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_create_feed_roundtrip() {
        let (db, user_id) = test_db().await;
        let feed = add_feed(&db, user_id, 1).await;

        assert_eq!(feed.name, "Feed 1");
        assert_eq!(feed.user_id, user_id);
        assert!(feed.last_fetched_at.is_none());
        assert_eq!(feed.created_at, at(0));

        let by_url = db
            .get_feed_by_url("https://feed1.example.com/rss")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(by_url, feed);
    }

    #[tokio::test]
    async fn test_duplicate_feed_url_rejected() {
        let (db, user_id) = test_db().await;
        add_feed(&db, user_id, 1).await;

        let err = db
            .create_feed("Other", "https://feed1.example.com/rss", user_id, at(1))
            .await
            .unwrap_err();
        assert!(err.is_duplicate());
    }

    #[tokio::test]
    async fn test_next_feed_empty_store() {
        let (db, _) = test_db().await;
        assert!(db.get_next_feed_to_fetch().await.unwrap().is_none());
        assert!(db.claim_next_feed(at(0)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_never_fetched_feed_comes_first() {
        let (db, user_id) = test_db().await;
        let fetched = add_feed(&db, user_id, 1).await;
        let fresh = add_feed(&db, user_id, 2).await;
        db.mark_feed_fetched(fetched.id, at(10)).await.unwrap();

        let next = db.get_next_feed_to_fetch().await.unwrap().unwrap();
        assert_eq!(next.id, fresh.id);
    }

    #[tokio::test]
    async fn test_oldest_fetch_wins() {
        let (db, user_id) = test_db().await;
        let a = add_feed(&db, user_id, 1).await;
        let b = add_feed(&db, user_id, 2).await;
        db.mark_feed_fetched(a.id, at(20)).await.unwrap();
        db.mark_feed_fetched(b.id, at(10)).await.unwrap();

        let next = db.get_next_feed_to_fetch().await.unwrap().unwrap();
        assert_eq!(next.id, b.id);
    }

    #[tokio::test]
    async fn test_ties_break_by_id() {
        let (db, user_id) = test_db().await;
        let a = add_feed(&db, user_id, 1).await;
        let b = add_feed(&db, user_id, 2).await;

        let expected = if a.id.as_bytes() < b.id.as_bytes() { a.id } else { b.id };
        let next = db.get_next_feed_to_fetch().await.unwrap().unwrap();
        assert_eq!(next.id, expected);
    }

    #[tokio::test]
    async fn test_mark_fetched_is_monotonic() {
        let (db, user_id) = test_db().await;
        let feed = add_feed(&db, user_id, 1).await;

        let stamped = db.mark_feed_fetched(feed.id, at(100)).await.unwrap();
        assert_eq!(stamped.last_fetched_at, Some(at(100)));

        let again = db.mark_feed_fetched(feed.id, at(50)).await.unwrap();
        assert_eq!(again.last_fetched_at, Some(at(100)));
    }

    #[tokio::test]
    async fn test_mark_unknown_feed_not_found() {
        let (db, _) = test_db().await;
        let err = db.mark_feed_fetched(Uuid::new_v4(), at(0)).await.unwrap_err();
        assert!(matches!(err, crate::storage::DatabaseError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_claim_stamps_selected_feed() {
        let (db, user_id) = test_db().await;
        let feed = add_feed(&db, user_id, 1).await;

        let claimed = db.claim_next_feed(at(5)).await.unwrap().unwrap();
        assert_eq!(claimed.id, feed.id);
        assert_eq!(claimed.last_fetched_at, Some(at(5)));
    }

    #[tokio::test]
    async fn test_claims_rotate_through_all_feeds() {
        let (db, user_id) = test_db().await;
        let a = add_feed(&db, user_id, 1).await;
        let b = add_feed(&db, user_id, 2).await;
        let c = add_feed(&db, user_id, 3).await;
        // Prior fetch order: b, c, a
        db.mark_feed_fetched(a.id, at(30)).await.unwrap();
        db.mark_feed_fetched(b.id, at(10)).await.unwrap();
        db.mark_feed_fetched(c.id, at(20)).await.unwrap();

        let mut claimed = Vec::new();
        for i in 0..3 {
            let feed = db
                .claim_next_feed(at(100) + Duration::seconds(i))
                .await
                .unwrap()
                .unwrap();
            claimed.push(feed.id);
        }
        assert_eq!(claimed, vec![b.id, c.id, a.id]);

        // The fourth claim starts the next rotation
        let next = db.claim_next_feed(at(200)).await.unwrap().unwrap();
        assert_eq!(next.id, b.id);
    }

    #[tokio::test]
    async fn test_due_claim_skips_feeds_stamped_since_cutoff() {
        let (db, user_id) = test_db().await;
        let a = add_feed(&db, user_id, 1).await;
        let b = add_feed(&db, user_id, 2).await;
        db.mark_feed_fetched(a.id, at(10)).await.unwrap();
        db.mark_feed_fetched(b.id, at(50)).await.unwrap();

        let first = db
            .claim_next_due_feed(at(60), at(50))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first.id, a.id);

        // b was fetched at the cutoff and a has just been claimed
        assert_eq!(db.claim_next_due_feed(at(61), at(50)).await.unwrap(), None);
        let stored = db.get_feed_by_url(&b.url).await.unwrap().unwrap();
        assert_eq!(stored.last_fetched_at, Some(at(50)));
    }

    #[tokio::test]
    async fn test_list_feeds_with_creators() {
        let (db, user_id) = test_db().await;
        add_feed(&db, user_id, 1).await;

        let listed = db.list_feeds_with_creators().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].name, "Feed 1");
        assert_eq!(listed[0].user_name, "tester");
    }
}
