use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::schema::Database;
use super::types::{to_millis, DatabaseError, User, UserDbRow};

impl Database {
    // ========================================================================
    // User Operations
    // ========================================================================

    /// Create a user. A taken name yields `DatabaseError::Duplicate`.
    pub async fn create_user(&self, name: &str, now: DateTime<Utc>) -> Result<User, DatabaseError> {
        let row: UserDbRow = sqlx::query_as(
            "INSERT INTO users (id, name, created_at, updated_at) VALUES (?, ?, ?, ?)
             RETURNING id, name, created_at, updated_at",
        )
        .bind(Uuid::new_v4())
        .bind(name)
        .bind(to_millis(now))
        .bind(to_millis(now))
        .fetch_one(&self.pool)
        .await
        .map_err(|e| DatabaseError::from_insert(e, &format!("user '{}'", name)))?;
        Ok(row.into_user())
    }

    pub async fn get_user_by_name(&self, name: &str) -> Result<Option<User>, DatabaseError> {
        let row: Option<UserDbRow> =
            sqlx::query_as("SELECT id, name, created_at, updated_at FROM users WHERE name = ?")
                .bind(name)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(UserDbRow::into_user))
    }

    /// All users ordered by name
    pub async fn list_users(&self) -> Result<Vec<User>, DatabaseError> {
        let rows: Vec<UserDbRow> =
            sqlx::query_as("SELECT id, name, created_at, updated_at FROM users ORDER BY name")
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().map(UserDbRow::into_user).collect())
    }

    /// Delete every user. Feeds, follows and posts go with them (ON DELETE CASCADE).
    /// Returns the number of users removed.
    pub async fn reset(&self) -> Result<u64, DatabaseError> {
        let result = sqlx::query("DELETE FROM users").execute(&self.pool).await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use crate::storage::Database;
    use chrono::Utc;

    async fn test_db() -> Database {
        Database::open(":memory:").await.unwrap()
    }

    #[tokio::test]
    async fn test_create_and_get_user() {
        let db = test_db().await;
        let created = db.create_user("alice", Utc::now()).await.unwrap();

        let fetched = db.get_user_by_name("alice").await.unwrap().unwrap();
        assert_eq!(fetched.id, created.id);
        assert_eq!(fetched.name, "alice");
    }

    #[tokio::test]
    async fn test_duplicate_user_name_is_rejected() {
        let db = test_db().await;
        db.create_user("alice", Utc::now()).await.unwrap();

        let err = db.create_user("alice", Utc::now()).await.unwrap_err();
        assert!(err.is_duplicate(), "expected Duplicate, got {:?}", err);
    }

    #[tokio::test]
    async fn test_unknown_user_is_none() {
        let db = test_db().await;
        assert!(db.get_user_by_name("nobody").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_users_sorted() {
        let db = test_db().await;
        db.create_user("carol", Utc::now()).await.unwrap();
        db.create_user("alice", Utc::now()).await.unwrap();

        let names: Vec<String> = db
            .list_users()
            .await
            .unwrap()
            .into_iter()
            .map(|u| u.name)
            .collect();
        assert_eq!(names, vec!["alice", "carol"]);
    }

    #[tokio::test]
    async fn test_reset_cascades_to_feeds() {
        let db = test_db().await;
        let user = db.create_user("alice", Utc::now()).await.unwrap();
        db.create_feed("Blog", "https://example.com/rss", user.id, Utc::now())
            .await
            .unwrap();

        assert_eq!(db.reset().await.unwrap(), 1);
        assert!(db.list_users().await.unwrap().is_empty());
        assert!(db.list_feeds().await.unwrap().is_empty());
    }
}
