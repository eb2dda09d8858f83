use anyhow::Result;
use sqlx::{QueryBuilder, Sqlite, SqliteConnection};
use std::collections::HashSet;

use super::schema::Database;
use super::types::{Article, ArticleDbRow, RecordKind};

const ARTICLE_COLUMNS: &str = "id, guid, topic_id, source_feed_id, name, title, content, url, \
     external_guid, authors, published, created, revised, approved";

/// Keeps IN lists well under SQLite's bound parameter limit
const PURGE_BATCH_SIZE: usize = 500;

impl Database {
    // ========================================================================
    // Article Queries
    // ========================================================================

    /// Live article in a topic mirroring the given feed item id
    pub async fn find_article_by_external_guid(
        &self,
        topic_id: i64,
        external_guid: &str,
    ) -> Result<Option<Article>> {
        let row = sqlx::query_as::<_, ArticleDbRow>(&format!(
            "SELECT {ARTICLE_COLUMNS} FROM articles \
             WHERE topic_id = ? AND external_guid = ? AND deleted = 0 \
             ORDER BY id LIMIT 1"
        ))
        .bind(topic_id)
        .bind(external_guid)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(self.with_categories(row).await?)),
            None => Ok(None),
        }
    }

    /// Whether a live article in the topic already points at this URL
    pub async fn article_url_exists(&self, topic_id: i64, url: &str) -> Result<bool> {
        let count: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM articles WHERE topic_id = ? AND url = ? AND deleted = 0",
        )
        .bind(topic_id)
        .bind(url)
        .fetch_one(&self.pool)
        .await?;
        Ok(count.0 > 0)
    }

    pub async fn get_article_by_guid(&self, guid: &str) -> Result<Option<Article>> {
        let row = sqlx::query_as::<_, ArticleDbRow>(&format!(
            "SELECT {ARTICLE_COLUMNS} FROM articles WHERE guid = ? AND deleted = 0"
        ))
        .bind(guid)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(self.with_categories(row).await?)),
            None => Ok(None),
        }
    }

    /// Live articles of a topic in creation order
    pub async fn get_articles_for_topic(&self, topic_id: i64) -> Result<Vec<Article>> {
        let rows = sqlx::query_as::<_, ArticleDbRow>(&format!(
            "SELECT {ARTICLE_COLUMNS} FROM articles \
             WHERE topic_id = ? AND deleted = 0 ORDER BY created, id"
        ))
        .bind(topic_id)
        .fetch_all(&self.pool)
        .await?;

        let mut articles = Vec::with_capacity(rows.len());
        for row in rows {
            articles.push(self.with_categories(row).await?);
        }
        Ok(articles)
    }

    /// Live articles imported from `feed_id` whose item id is not in `keep`.
    ///
    /// Articles without an item id are never returned.
    pub async fn find_feed_articles_missing_from(
        &self,
        feed_id: i64,
        keep: &[String],
    ) -> Result<Vec<Article>> {
        let keep: HashSet<&str> = keep.iter().map(String::as_str).collect();
        let rows = sqlx::query_as::<_, ArticleDbRow>(&format!(
            "SELECT {ARTICLE_COLUMNS} FROM articles \
             WHERE source_feed_id = ? AND deleted = 0 AND external_guid IS NOT NULL \
             ORDER BY id"
        ))
        .bind(feed_id)
        .fetch_all(&self.pool)
        .await?;

        let mut missing = Vec::new();
        for row in rows {
            let listed = row
                .external_guid
                .as_deref()
                .is_some_and(|guid| keep.contains(guid));
            if !listed {
                missing.push(self.with_categories(row).await?);
            }
        }
        Ok(missing)
    }

    async fn with_categories(&self, row: ArticleDbRow) -> Result<Article> {
        let terms: Vec<(String,)> = sqlx::query_as(
            "SELECT term FROM article_categories WHERE article_id = ? ORDER BY position",
        )
        .bind(row.id)
        .fetch_all(&self.pool)
        .await?;
        Ok(row.into_article(terms.into_iter().map(|(term,)| term).collect()))
    }

    // ========================================================================
    // Article Mutations
    // ========================================================================

    /// Insert a new article.
    ///
    /// Assigns `id`, `created` and `revised`. A name already taken in the
    /// topic gets a numeric suffix (`name-1`, `name-2`, ...); an empty name
    /// falls back to the guid. `published` defaults to the creation time.
    pub async fn create_article(&self, article: &mut Article) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;

        let base = if article.name.is_empty() {
            article.guid.clone()
        } else {
            article.name.clone()
        };
        let name = free_name(&mut tx, article.topic_id, &base).await?;
        let published = article.published.unwrap_or(now);

        let id: (i64,) = sqlx::query_as(
            r#"
            INSERT INTO articles (guid, topic_id, source_feed_id, name, title, content, url,
                                  external_guid, authors, published, created, revised)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING id
        "#,
        )
        .bind(&article.guid)
        .bind(article.topic_id)
        .bind(article.source_feed_id)
        .bind(&name)
        .bind(&article.title)
        .bind(&article.content)
        .bind(&article.url)
        .bind(&article.external_guid)
        .bind(&article.authors)
        .bind(published)
        .bind(now)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        replace_categories(&mut tx, id.0, &article.categories).await?;
        tx.commit().await?;

        article.id = Some(id.0);
        article.name = name;
        article.published = Some(published);
        article.created = now;
        article.revised = now;
        Ok(())
    }

    /// Write all fields of a persisted article and bump its revision time
    pub async fn update_article(&self, article: &mut Article) -> Result<()> {
        let id = article
            .id
            .ok_or_else(|| anyhow::anyhow!("Cannot update article {} before it is created", article.guid))?;
        let now = chrono::Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;

        // revised strictly increases so an earlier approval never covers newer content
        let revised: (i64,) = sqlx::query_as(
            r#"
            UPDATE articles SET
                source_feed_id = ?, name = ?, title = ?, content = ?, url = ?,
                external_guid = ?, authors = ?, published = ?,
                revised = MAX(?, revised + 1)
            WHERE id = ? AND deleted = 0
            RETURNING revised
        "#,
        )
        .bind(article.source_feed_id)
        .bind(&article.name)
        .bind(&article.title)
        .bind(&article.content)
        .bind(&article.url)
        .bind(&article.external_guid)
        .bind(&article.authors)
        .bind(article.published)
        .bind(now)
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;

        replace_categories(&mut tx, id, &article.categories).await?;
        tx.commit().await?;

        article.revised = revised.0;
        Ok(())
    }

    /// Approve the current revision, returns whether anything changed
    pub async fn approve_article(&self, article_id: i64) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE articles SET approved = revised \
             WHERE id = ? AND (approved IS NULL OR approved < revised)",
        )
        .bind(article_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Soft-delete an article; it stays on disk until purged
    pub async fn delete_article(&self, article_id: i64) -> Result<bool> {
        let result = sqlx::query("UPDATE articles SET deleted = 1 WHERE id = ? AND deleted = 0")
            .bind(article_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    // ========================================================================
    // Purge
    // ========================================================================

    /// Permanently remove records and their parameters.
    ///
    /// Articles are only purged once soft-deleted; categories and tags go
    /// with them. Returns the number of records removed.
    pub async fn purge(&self, guids: &[String], kind: RecordKind) -> Result<u64> {
        if guids.is_empty() {
            return Ok(0);
        }

        let (prefix, suffix) = match kind {
            RecordKind::Article => ("DELETE FROM articles WHERE deleted = 1 AND guid IN (", ")"),
            RecordKind::Feed => ("DELETE FROM feeds WHERE guid IN (", ")"),
        };

        let mut removed = 0;
        let mut tx = self.pool.begin().await?;

        for chunk in guids.chunks(PURGE_BATCH_SIZE) {
            let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(prefix);
            let mut separated = builder.separated(", ");
            for guid in chunk {
                separated.push_bind(guid);
            }
            separated.push_unseparated(suffix);
            removed += builder.build().execute(&mut *tx).await?.rows_affected();

            let mut params: QueryBuilder<Sqlite> =
                QueryBuilder::new("DELETE FROM parameters WHERE parent_guid IN (");
            let mut separated = params.separated(", ");
            for guid in chunk {
                separated.push_bind(guid);
            }
            separated.push_unseparated(")");
            params.build().execute(&mut *tx).await?;
        }

        tx.commit().await?;
        tracing::debug!(kind = ?kind, requested = guids.len(), removed = removed, "Purged records");
        Ok(removed)
    }
}

/// First name in the topic not yet taken by a live article
async fn free_name(conn: &mut SqliteConnection, topic_id: i64, base: &str) -> Result<String> {
    let taken: Vec<(String,)> = sqlx::query_as(
        "SELECT name FROM articles WHERE topic_id = ? AND deleted = 0 AND (name = ? OR name LIKE ?)",
    )
    .bind(topic_id)
    .bind(base)
    .bind(format!("{}-%", base))
    .fetch_all(&mut *conn)
    .await?;

    let taken: HashSet<String> = taken.into_iter().map(|(name,)| name).collect();
    if !taken.contains(base) {
        return Ok(base.to_string());
    }

    let mut suffix = 1u32;
    loop {
        let candidate = format!("{}-{}", base, suffix);
        if !taken.contains(&candidate) {
            return Ok(candidate);
        }
        suffix += 1;
    }
}

async fn replace_categories(
    conn: &mut SqliteConnection,
    article_id: i64,
    categories: &[String],
) -> Result<()> {
    sqlx::query("DELETE FROM article_categories WHERE article_id = ?")
        .bind(article_id)
        .execute(&mut *conn)
        .await?;

    if categories.is_empty() {
        return Ok(());
    }

    let mut builder: QueryBuilder<Sqlite> =
        QueryBuilder::new("INSERT INTO article_categories (article_id, position, term) ");
    builder.push_values(categories.iter().enumerate(), |mut b, (position, term)| {
        b.push_bind(article_id)
            .push_bind(position as i64)
            .push_bind(term);
    });
    builder.build().execute(&mut *conn).await?;
    Ok(())
}
