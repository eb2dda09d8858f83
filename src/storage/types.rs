use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Database-specific errors with user-friendly messages
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Another process holds the database lock
    #[error("The database is locked by another feedimport process. Wait for it to finish and try again.")]
    InstanceLocked,

    /// Migration failed
    #[error("Database migration failed: {0}")]
    Migration(String),

    /// Generic database error
    #[error("Database error: {0}")]
    Other(#[from] sqlx::Error),
}

impl DatabaseError {
    /// Check if a sqlx error indicates database locking
    pub(crate) fn from_sqlx(err: sqlx::Error) -> Self {
        if is_lock_message(&err.to_string()) {
            return DatabaseError::InstanceLocked;
        }
        DatabaseError::Other(err)
    }
}

/// SQLITE_BUSY, SQLITE_LOCKED and SQLITE_CANTOPEN all surface as lock contention
pub(crate) fn is_lock_message(message: &str) -> bool {
    let message = message.to_lowercase();
    message.contains("database is locked")
        || message.contains("database table is locked")
        || message.contains("sqlite_busy")
        || message.contains("sqlite_locked")
        || message.contains("unable to open database file")
}

// ============================================================================
// Topics and Persons
// ============================================================================

/// Component name of topics that accept imported articles
pub const BLOG_COMPONENT: &str = "blog";

/// A collection articles live in
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Topic {
    pub id: i64,
    pub name: String,
    pub component: Option<String>,
}

/// A known identity feed authors can be matched against
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Person {
    pub id: i64,
    pub guid: String,
    pub username: Option<String>,
    pub email: Option<String>,
    pub firstname: Option<String>,
    pub lastname: Option<String>,
}

/// Input for [`Database::create_person`](super::Database::create_person)
#[derive(Debug, Clone, Default)]
pub struct NewPerson {
    pub username: Option<String>,
    pub email: Option<String>,
    pub firstname: Option<String>,
    pub lastname: Option<String>,
}

// ============================================================================
// Feeds
// ============================================================================

/// A remote feed subscription bound to a target topic
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Feed {
    pub id: i64,
    pub guid: String,
    pub title: String,
    pub url: String,
    pub topic_id: i64,
    /// Unix timestamp of the last non-cached fetch
    pub latest_fetch: Option<i64>,
    /// Unix timestamp of the newest item seen
    pub latest_update: Option<i64>,
    pub auto_approve: bool,
    pub keep_removed: bool,
    pub force_author: bool,
    /// Person id used when the item author cannot be matched
    pub default_author: Option<i64>,
    pub last_error: Option<String>,
}

/// Input for [`Database::insert_feed`](super::Database::insert_feed)
#[derive(Debug, Clone, Default)]
pub struct NewFeed {
    pub title: String,
    pub url: String,
    pub topic_id: i64,
    pub auto_approve: bool,
    pub keep_removed: bool,
    pub force_author: bool,
    pub default_author: Option<i64>,
}

// ============================================================================
// Articles
// ============================================================================

/// Internal row type for article queries; categories live in their own table
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct ArticleDbRow {
    pub id: i64,
    pub guid: String,
    pub topic_id: i64,
    pub source_feed_id: Option<i64>,
    pub name: String,
    pub title: String,
    pub content: String,
    pub url: Option<String>,
    pub external_guid: Option<String>,
    pub authors: Option<String>,
    pub published: Option<i64>,
    pub created: i64,
    pub revised: i64,
    pub approved: Option<i64>,
}

impl ArticleDbRow {
    pub(crate) fn into_article(self, categories: Vec<String>) -> Article {
        Article {
            id: Some(self.id),
            guid: self.guid,
            topic_id: self.topic_id,
            source_feed_id: self.source_feed_id,
            name: self.name,
            title: self.title,
            content: self.content,
            url: self.url,
            external_guid: self.external_guid,
            categories,
            authors: self.authors,
            published: self.published,
            created: self.created,
            revised: self.revised,
            approved: self.approved,
        }
    }
}

/// An article, either loaded from the database or not yet created.
///
/// `id` is `None` until [`Database::create_article`](super::Database::create_article)
/// succeeds. The guid is assigned up front so it can be reported before
/// the row exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Article {
    pub id: Option<i64>,
    pub guid: String,
    pub topic_id: i64,
    /// Feed this article was imported from
    pub source_feed_id: Option<i64>,
    /// URL name, unique within the topic. Empty until assigned.
    pub name: String,
    pub title: String,
    pub content: String,
    pub url: Option<String>,
    /// Native id of the feed item this article mirrors
    pub external_guid: Option<String>,
    pub categories: Vec<String>,
    /// Pipe-delimited person guids, e.g. `|<guid>|`
    pub authors: Option<String>,
    pub published: Option<i64>,
    pub created: i64,
    pub revised: i64,
    pub approved: Option<i64>,
}

impl Article {
    /// A fresh, unsaved article bound to a topic
    pub fn new_in(topic_id: i64) -> Self {
        Self {
            id: None,
            guid: uuid::Uuid::new_v4().to_string(),
            topic_id,
            source_feed_id: None,
            name: String::new(),
            title: String::new(),
            content: String::new(),
            url: None,
            external_guid: None,
            categories: Vec::new(),
            authors: None,
            published: None,
            created: 0,
            revised: 0,
            approved: None,
        }
    }

    pub fn is_persisted(&self) -> bool {
        self.id.is_some()
    }

    pub fn is_approved(&self) -> bool {
        self.approved.is_some_and(|approved| approved >= self.revised)
    }
}

/// Record types that can be purged after soft deletion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Article,
    Feed,
}
