use anyhow::Result;

use super::schema::Database;
use super::types::{Feed, NewFeed};

const FEED_COLUMNS: &str = "id, guid, title, url, topic_id, latest_fetch, latest_update, \
     auto_approve, keep_removed, force_author, default_author, last_error";

impl Database {
    // ========================================================================
    // Feed Operations
    // ========================================================================

    /// Subscribe a topic to a feed URL.
    ///
    /// Re-adding an existing (topic, url) pair updates its settings and
    /// returns the existing id.
    pub async fn insert_feed(&self, feed: &NewFeed) -> Result<i64> {
        let guid = uuid::Uuid::new_v4().to_string();
        let id: (i64,) = sqlx::query_as(
            r#"
            INSERT INTO feeds (guid, title, url, topic_id, auto_approve, keep_removed, force_author, default_author)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(topic_id, url) DO UPDATE SET
                title = excluded.title,
                auto_approve = excluded.auto_approve,
                keep_removed = excluded.keep_removed,
                force_author = excluded.force_author,
                default_author = excluded.default_author
            RETURNING id
        "#,
        )
        .bind(&guid)
        .bind(&feed.title)
        .bind(&feed.url)
        .bind(feed.topic_id)
        .bind(feed.auto_approve)
        .bind(feed.keep_removed)
        .bind(feed.force_author)
        .bind(feed.default_author)
        .fetch_one(&self.pool)
        .await?;
        Ok(id.0)
    }

    pub async fn get_feed(&self, feed_id: i64) -> Result<Option<Feed>> {
        let feed = sqlx::query_as::<_, Feed>(&format!(
            "SELECT {FEED_COLUMNS} FROM feeds WHERE id = ?"
        ))
        .bind(feed_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(feed)
    }

    /// All feeds, in subscription order
    pub async fn get_feeds(&self) -> Result<Vec<Feed>> {
        let feeds = sqlx::query_as::<_, Feed>(&format!("SELECT {FEED_COLUMNS} FROM feeds ORDER BY id"))
            .fetch_all(&self.pool)
            .await?;
        Ok(feeds)
    }

    /// Set or clear the error status for a feed
    pub async fn set_feed_error(&self, feed_id: i64, error: Option<&str>) -> Result<()> {
        sqlx::query("UPDATE feeds SET last_error = ? WHERE id = ?")
            .bind(error)
            .bind(feed_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Stamp the time of the last non-cached fetch and clear any error
    pub async fn set_feed_latest_fetch(&self, feed_id: i64, fetched_at: i64) -> Result<()> {
        sqlx::query("UPDATE feeds SET latest_fetch = ?, last_error = NULL WHERE id = ?")
            .bind(fetched_at)
            .bind(feed_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Record the timestamp of the newest item seen
    pub async fn set_feed_latest_update(&self, feed_id: i64, updated_at: i64) -> Result<()> {
        sqlx::query("UPDATE feeds SET latest_update = ? WHERE id = ?")
            .bind(updated_at)
            .bind(feed_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
