use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::schema::Database;
use super::types::{to_millis, DatabaseError, FeedFollow};

impl Database {
    // ========================================================================
    // Follow Operations
    // ========================================================================

    /// Make `user_id` follow `feed_id`. Following twice yields
    /// `DatabaseError::Duplicate`.
    pub async fn create_feed_follow(
        &self,
        user_id: Uuid,
        feed_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<FeedFollow, DatabaseError> {
        let id = Uuid::new_v4();
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO feed_follows (id, user_id, feed_id, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(id)
        .bind(user_id)
        .bind(feed_id)
        .bind(to_millis(now))
        .bind(to_millis(now))
        .execute(&mut *tx)
        .await
        .map_err(|e| DatabaseError::from_insert(e, "follow"))?;

        let (feed_name, user_name): (String, String) = sqlx::query_as(
            r#"
                SELECT f.name, u.name
                FROM feed_follows ff
                JOIN feeds f ON f.id = ff.feed_id
                JOIN users u ON u.id = ff.user_id
                WHERE ff.id = ?
            "#,
        )
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(FeedFollow {
            id,
            feed_name,
            user_name,
        })
    }

    /// Names of the feeds a user follows
    pub async fn get_follows_for_user(&self, user_id: Uuid) -> Result<Vec<String>, DatabaseError> {
        let rows: Vec<(String,)> = sqlx::query_as(
            r#"
                SELECT f.name
                FROM feed_follows ff
                JOIN feeds f ON f.id = ff.feed_id
                WHERE ff.user_id = ?
                ORDER BY ff.created_at, f.name
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|(name,)| name).collect())
    }

    /// Remove a follow. Returns false when the user was not following the feed.
    pub async fn delete_feed_follow(&self, user_id: Uuid, feed_id: Uuid) -> Result<bool, DatabaseError> {
        let result = sqlx::query("DELETE FROM feed_follows WHERE user_id = ? AND feed_id = ?")
            .bind(user_id)
            .bind(feed_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
