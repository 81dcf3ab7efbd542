use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

// ============================================================================
// Error Types
// ============================================================================

/// Database-specific errors with user-friendly messages
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Another process holds a lock on the database file
    #[error("The database is locked by another gleaner process. Please try again.")]
    InstanceLocked,

    /// Migration failed
    #[error("Database migration failed: {0}")]
    Migration(String),

    /// A UNIQUE constraint rejected the write
    #[error("Duplicate {0}")]
    Duplicate(String),

    /// The row addressed by an update or lookup does not exist
    #[error("{0} not found")]
    NotFound(String),

    /// Generic database error
    #[error("Database error: {0}")]
    Other(#[from] sqlx::Error),
}

impl DatabaseError {
    /// Check if a sqlx error indicates database locking
    pub(crate) fn from_sqlx(err: sqlx::Error) -> Self {
        let error_string = err.to_string().to_lowercase();

        // SQLITE_BUSY (5): database is locked
        // SQLITE_LOCKED (6): database table is locked
        // SQLITE_CANTOPEN (14): unable to open database file
        if error_string.contains("database is locked")
            || error_string.contains("database table is locked")
            || error_string.contains("sqlite_busy")
            || error_string.contains("sqlite_locked")
            || error_string.contains("unable to open database file")
        {
            return DatabaseError::InstanceLocked;
        }

        DatabaseError::Other(err)
    }

    /// Classify a failed INSERT, separating unique-constraint violations
    /// from every other failure.
    pub(crate) fn from_insert(err: sqlx::Error, what: &str) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            if db_err.is_unique_violation() {
                return DatabaseError::Duplicate(what.to_string());
            }
        }
        DatabaseError::from_sqlx(err)
    }

    /// True when the error is a unique-constraint collision.
    pub fn is_duplicate(&self) -> bool {
        matches!(self, DatabaseError::Duplicate(_))
    }
}

// ============================================================================
// Timestamp Helpers
// ============================================================================

/// Timestamps are stored as Unix milliseconds so SQL ordering is numeric.
pub(crate) fn to_millis(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

pub(crate) fn from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}

// ============================================================================
// Row Types
// ============================================================================

/// Internal row type for feed queries (used by sqlx FromRow)
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct FeedDbRow {
    pub id: Uuid,
    pub name: String,
    pub url: String,
    pub user_id: Uuid,
    pub last_fetched_at: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl FeedDbRow {
    pub(crate) fn into_feed(self) -> Feed {
        Feed {
            id: self.id,
            name: self.name,
            url: self.url,
            user_id: self.user_id,
            last_fetched_at: self.last_fetched_at.map(from_millis),
            created_at: from_millis(self.created_at),
            updated_at: from_millis(self.updated_at),
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct UserDbRow {
    pub id: Uuid,
    pub name: String,
    pub created_at: i64,
    pub updated_at: i64,
}

impl UserDbRow {
    pub(crate) fn into_user(self) -> User {
        User {
            id: self.id,
            name: self.name,
            created_at: from_millis(self.created_at),
            updated_at: from_millis(self.updated_at),
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct PostDbRow {
    pub id: Uuid,
    pub feed_id: Uuid,
    pub title: String,
    pub url: String,
    pub description: String,
    pub published_at: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

impl PostDbRow {
    pub(crate) fn into_post(self) -> Post {
        Post {
            id: self.id,
            feed_id: self.feed_id,
            title: self.title,
            url: self.url,
            description: self.description,
            published_at: from_millis(self.published_at),
            created_at: from_millis(self.created_at),
            updated_at: from_millis(self.updated_at),
        }
    }
}

/// Post joined with the name of the feed it came from (browse listing)
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct FeedPostDbRow {
    pub feed_name: String,
    pub title: String,
    pub url: String,
    pub description: String,
    pub published_at: i64,
}

// ============================================================================
// Data Structures
// ============================================================================

/// A registered user. Login is a name switch; there are no credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A registered feed source.
///
/// `last_fetched_at` is `None` until the feed is first claimed by the
/// scheduler and never moves backwards afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Feed {
    pub id: Uuid,
    pub name: String,
    pub url: String,
    /// User who registered the feed
    pub user_id: Uuid,
    pub last_fetched_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Feed listing row with the name of the registering user
#[derive(Debug, Clone)]
pub struct FeedWithCreator {
    pub name: String,
    pub url: String,
    pub user_name: String,
}

/// Result of a follow: the names on both sides of the relation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedFollow {
    pub id: Uuid,
    pub feed_name: String,
    pub user_name: String,
}

/// One ingested entry. The URL is unique across all posts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Post {
    pub id: Uuid,
    pub feed_id: Uuid,
    pub title: String,
    pub url: String,
    pub description: String,
    pub published_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Post as shown by `browse`
#[derive(Debug, Clone)]
pub struct FeedPost {
    pub feed_name: String,
    pub title: String,
    pub url: String,
    pub description: String,
    pub published_at: DateTime<Utc>,
}

impl From<FeedPostDbRow> for FeedPost {
    fn from(row: FeedPostDbRow) -> Self {
        Self {
            feed_name: row.feed_name,
            title: row.title,
            url: row.url,
            description: row.description,
            published_at: from_millis(row.published_at),
        }
    }
}
