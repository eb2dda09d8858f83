use anyhow::Result;
use std::collections::BTreeMap;

use super::schema::Database;

impl Database {
    // ========================================================================
    // Tag Operations
    // ========================================================================

    /// Attach tags to an article, returns the number of tags written.
    ///
    /// `tags` maps tag name to the link it was found on. Existing tags with
    /// the same name get their link replaced; other tags are left alone.
    pub async fn tag_article(&self, article_id: i64, tags: &BTreeMap<String, String>) -> Result<usize> {
        if tags.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;
        for (tag, url) in tags {
            sqlx::query(
                r#"
                INSERT INTO article_tags (article_id, tag, url) VALUES (?, ?, ?)
                ON CONFLICT(article_id, tag) DO UPDATE SET url = excluded.url
            "#,
            )
            .bind(article_id)
            .bind(tag)
            .bind(url)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        Ok(tags.len())
    }

    /// Tags of an article as (tag, url), ordered by tag
    pub async fn get_article_tags(&self, article_id: i64) -> Result<Vec<(String, String)>> {
        let rows: Vec<(String, String)> =
            sqlx::query_as("SELECT tag, url FROM article_tags WHERE article_id = ? ORDER BY tag")
                .bind(article_id)
                .fetch_all(&self.pool)
                .await?;
        Ok(rows)
    }
}
