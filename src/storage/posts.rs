use uuid::Uuid;

use super::schema::Database;
use super::types::{to_millis, DatabaseError, FeedPost, FeedPostDbRow, Post, PostDbRow};

/// Maximum number of posts to return from any single query (OOM protection)
const MAX_POSTS: i64 = 2000;

const POST_COLUMNS: &str =
    "id, feed_id, title, url, description, published_at, created_at, updated_at";

impl Database {
    // ========================================================================
    // Post Operations
    // ========================================================================

    /// Insert a post exactly as given.
    ///
    /// The URL is unique across all posts: a collision is reported as
    /// `DatabaseError::Duplicate` and leaves the stored row untouched.
    pub async fn create_post(&self, post: &Post) -> Result<Post, DatabaseError> {
        let row: PostDbRow = sqlx::query_as(&format!(
            "INSERT INTO posts ({POST_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
             RETURNING {POST_COLUMNS}"
        ))
        .bind(post.id)
        .bind(post.feed_id)
        .bind(&post.title)
        .bind(&post.url)
        .bind(&post.description)
        .bind(to_millis(post.published_at))
        .bind(to_millis(post.created_at))
        .bind(to_millis(post.updated_at))
        .fetch_one(&self.pool)
        .await
        .map_err(|e| DatabaseError::from_insert(e, &format!("post url '{}'", post.url)))?;
        Ok(row.into_post())
    }

    /// Posts of one feed, newest first
    pub async fn get_posts_for_feed(&self, feed_id: Uuid) -> Result<Vec<Post>, DatabaseError> {
        let rows: Vec<PostDbRow> = sqlx::query_as(&format!(
            "SELECT {POST_COLUMNS} FROM posts
             WHERE feed_id = ?
             ORDER BY published_at DESC, id
             LIMIT ?"
        ))
        .bind(feed_id)
        .bind(MAX_POSTS)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(PostDbRow::into_post).collect())
    }

    pub async fn count_posts(&self) -> Result<i64, DatabaseError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM posts")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Newest posts across the feeds a user follows
    pub async fn get_posts_for_user(
        &self,
        user_id: Uuid,
        limit: i64,
    ) -> Result<Vec<FeedPost>, DatabaseError> {
        let rows: Vec<FeedPostDbRow> = sqlx::query_as(
            r#"
                SELECT f.name AS feed_name, p.title, p.url, p.description, p.published_at
                FROM posts p
                JOIN feed_follows ff ON ff.feed_id = p.feed_id
                JOIN feeds f ON f.id = p.feed_id
                WHERE ff.user_id = ?
                ORDER BY p.published_at DESC, p.id
                LIMIT ?
            "#,
        )
        .bind(user_id)
        .bind(limit.clamp(0, MAX_POSTS))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(FeedPost::from).collect())
    }
}
