use serde::Serialize;
use thiserror::Error;

use super::author::resolve_author;
use super::fetcher::{fetch_feed, FetchLimits, FetchOutcome};
use super::parser::FeedItem;
use super::tags::extract_rel_tags;
use crate::storage::{Article, Database, Feed, RecordKind, BLOG_COMPONENT};
use crate::util::{clean_category, slugify};

/// Parameter domain for feed-level metadata (ETag, replies URL)
pub const FEED_DOMAIN: &str = "feed";
/// Parameter domain for the last enclosure of an article
pub const ENCLOSURE_DOMAIN: &str = "enclosure";

/// Errors that abort a whole import run.
///
/// Per-item problems never surface here; they are logged and counted in
/// [`ImportStats`].
#[derive(Debug, Error)]
pub enum ImportError {
    /// Target topic holds content the importer cannot map feed items onto
    #[error("Feed import into '{0}' topics is unsupported")]
    UnsupportedComponent(String),
    #[error("Topic {0} not found")]
    TopicNotFound(i64),
    #[error("Storage error: {0}")]
    Storage(#[from] anyhow::Error),
}

/// Settings shared by every feed imported in one run
#[derive(Debug, Clone, Copy)]
pub struct ImportOptions {
    /// Person used when nothing better is known about an item's author
    pub fallback_author: i64,
    pub limits: FetchLimits,
}

/// Per-run item counters
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ImportStats {
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub skipped: usize,
    pub failed: usize,
}

enum ItemOutcome {
    Created(String),
    Updated(String),
    Unchanged(String),
    Skipped(&'static str),
}

/// Imports one feed into its target topic.
///
/// A run is [`fetch`](Self::fetch), then [`import_item`](Self::import_item)
/// for every item oldest first, then [`clean`](Self::clean) over the whole
/// batch. [`import`](Self::import) chains the three.
pub struct FeedImporter {
    db: Database,
    client: reqwest::Client,
    options: ImportOptions,
    feed: Feed,
    last_error: Option<String>,
    stats: ImportStats,
}

impl FeedImporter {
    pub fn new(db: Database, client: reqwest::Client, feed: Feed, options: ImportOptions) -> Self {
        Self {
            db,
            client,
            options,
            feed,
            last_error: None,
            stats: ImportStats::default(),
        }
    }

    /// The feed as last written by this importer
    pub fn feed(&self) -> &Feed {
        &self.feed
    }

    /// Message of the last fetch failure, if the last fetch failed
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn stats(&self) -> ImportStats {
        self.stats
    }

    /// Retrieve the feed's current items, in document order.
    ///
    /// Transport and parse failures are soft: the message is kept in
    /// [`last_error`](Self::last_error) and on the feed record, and no items
    /// are returned. An unchanged feed (304 or same ETag) also yields no
    /// items and leaves `latest_fetch` alone. Only storage failures error.
    pub async fn fetch(&mut self) -> Result<Vec<FeedItem>, ImportError> {
        let etag = self
            .db
            .get_parameter(&self.feed.guid, FEED_DOMAIN, "etag")
            .await?;

        let outcome = fetch_feed(
            &self.client,
            &self.feed.url,
            etag.as_deref(),
            &self.options.limits,
        )
        .await;

        match outcome {
            Err(e) => {
                let message = e.to_string();
                tracing::warn!(feed_id = self.feed.id, url = %self.feed.url, error = %message, "Feed fetch failed");
                self.db.set_feed_error(self.feed.id, Some(&message)).await?;
                self.feed.last_error = Some(message.clone());
                self.last_error = Some(message);
                Ok(Vec::new())
            }
            Ok(FetchOutcome::NotModified) => {
                tracing::warn!(
                    feed_id = self.feed.id,
                    url = %self.feed.url,
                    latest_fetch = ?self.feed.latest_fetch,
                    "Feed has not changed since last fetch"
                );
                self.db.set_feed_error(self.feed.id, None).await?;
                self.feed.last_error = None;
                self.last_error = None;
                Ok(Vec::new())
            }
            Ok(FetchOutcome::Fetched { etag, items }) => {
                if let Some(etag) = etag {
                    self.db
                        .set_parameter(&self.feed.guid, FEED_DOMAIN, "etag", &etag)
                        .await?;
                }
                let now = chrono::Utc::now().timestamp();
                self.db.set_feed_latest_fetch(self.feed.id, now).await?;
                self.feed.latest_fetch = Some(now);
                self.feed.last_error = None;
                self.last_error = None;
                Ok(items)
            }
        }
    }

    /// Fetch the feed and import its items into the target topic.
    ///
    /// Returns the guids of imported articles, newest item first; a failed
    /// clean is logged and does not discard them. A topic
    /// without a component imports nothing; a topic of any component other
    /// than a blog is an error, raised before anything is fetched.
    pub async fn import(&mut self) -> Result<Vec<String>, ImportError> {
        let topic = self
            .db
            .get_topic(self.feed.topic_id)
            .await?
            .ok_or(ImportError::TopicNotFound(self.feed.topic_id))?;

        let Some(component) = topic.component.as_deref() else {
            tracing::debug!(feed_id = self.feed.id, topic = topic.id, "Topic has no component, nothing to import");
            return Ok(Vec::new());
        };
        if component != BLOG_COMPONENT {
            return Err(ImportError::UnsupportedComponent(component.to_string()));
        }

        self.stats = ImportStats::default();

        let mut items = self.fetch().await?;
        if items.is_empty() {
            return Ok(Vec::new());
        }

        // Oldest first, so undated items are created in feed order
        items.reverse();

        let mut imported = Vec::with_capacity(items.len());
        for item in &items {
            if let Some(guid) = self.import_item(item).await {
                imported.push(guid);
            }
        }

        if let Err(e) = self.clean(&items).await {
            tracing::warn!(feed_id = self.feed.id, error = %e, "Failed to remove articles no longer in feed");
        }

        imported.reverse();
        tracing::info!(
            feed_id = self.feed.id,
            created = self.stats.created,
            updated = self.stats.updated,
            unchanged = self.stats.unchanged,
            skipped = self.stats.skipped,
            failed = self.stats.failed,
            "Feed imported"
        );
        Ok(imported)
    }

    /// Map one item onto an article in the feed's topic.
    ///
    /// Returns the article guid when the item is (or already was) imported,
    /// `None` when it was skipped or could not be written.
    pub async fn import_item(&mut self, item: &FeedItem) -> Option<String> {
        let outcome = match self.write_item(item).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(feed_id = self.feed.id, item = %item.id, error = %e, "Failed to import item");
                self.stats.failed += 1;
                return None;
            }
        };

        let (guid, action) = match outcome {
            ItemOutcome::Skipped(reason) => {
                tracing::debug!(feed_id = self.feed.id, item = %item.id, reason, "Item skipped");
                self.stats.skipped += 1;
                return None;
            }
            ItemOutcome::Created(guid) => {
                self.stats.created += 1;
                (guid, "created")
            }
            ItemOutcome::Updated(guid) => {
                self.stats.updated += 1;
                (guid, "updated")
            }
            ItemOutcome::Unchanged(guid) => {
                self.stats.unchanged += 1;
                (guid, "unchanged")
            }
        };
        tracing::info!(feed_id = self.feed.id, item = %item.id, article = %guid, action, "Imported item");
        Some(guid)
    }

    async fn write_item(&mut self, item: &FeedItem) -> anyhow::Result<ItemOutcome> {
        let title = item.title.trim();
        if (title.is_empty() || title == "...") && item.id.is_empty() {
            return Ok(ItemOutcome::Skipped("missing title and id"));
        }

        let external_guid = item.external_guid();
        let link = item.link.as_deref().filter(|l| !l.is_empty());
        let topic_id = self.feed.topic_id;

        let mut article = match self
            .db
            .find_article_by_external_guid(topic_id, &external_guid)
            .await?
        {
            Some(article) => article,
            None => {
                if let Some(link) = link {
                    if self.db.article_url_exists(topic_id, link).await? {
                        return Ok(ItemOutcome::Skipped("duplicate url"));
                    }
                }
                Article::new_in(topic_id)
            }
        };

        let mut changed = false;
        changed |= set_field(&mut article.title, item.title.clone());
        changed |= set_field(&mut article.external_guid, Some(external_guid));
        changed |= set_field(&mut article.content, item.content.clone());
        changed |= set_field(&mut article.url, link.map(str::to_string));
        changed |= set_field(&mut article.source_feed_id, Some(self.feed.id));
        changed |= set_field(
            &mut article.categories,
            item.categories.iter().map(|c| clean_category(c)).collect(),
        );
        if article.name.is_empty() {
            changed |= set_field(&mut article.name, slugify(&item.title));
        }

        if let Some(person) =
            resolve_author(&self.db, item, &self.feed, self.options.fallback_author).await?
        {
            changed |= set_field(&mut article.authors, Some(format!("|{}|", person.guid)));
        }

        let (date, tweaked) = match item.published {
            Some(date) => (date, false),
            None => (chrono::Utc::now().timestamp(), true),
        };
        if self.feed.latest_update.map_or(true, |latest| date > latest) {
            self.db.set_feed_latest_update(self.feed.id, date).await?;
            self.feed.latest_update = Some(date);
        }
        if !tweaked {
            changed |= set_field(&mut article.published, Some(date));
        }

        let outcome = if !article.is_persisted() {
            self.db.create_article(&mut article).await?;
            ItemOutcome::Created(article.guid.clone())
        } else if changed {
            self.db.update_article(&mut article).await?;
            ItemOutcome::Updated(article.guid.clone())
        } else {
            ItemOutcome::Unchanged(article.guid.clone())
        };

        self.after_write(&article, item).await;
        Ok(outcome)
    }

    /// Approval, tags and parameters; each step is independent and only logged on failure
    async fn after_write(&self, article: &Article, item: &FeedItem) {
        let Some(article_id) = article.id else {
            return;
        };

        if self.feed.auto_approve {
            if let Err(e) = self.db.approve_article(article_id).await {
                tracing::warn!(article = %article.guid, error = %e, "Failed to approve article");
            }
        }

        let tags = extract_rel_tags(&item.content);
        if !tags.is_empty() {
            if let Err(e) = self.db.tag_article(article_id, &tags).await {
                tracing::warn!(article = %article.guid, error = %e, "Failed to tag article");
            }
        }

        // Only one enclosure is kept per article; the last one wins
        for enclosure in &item.enclosures {
            let values = [
                ("url", Some(enclosure.url.clone())),
                ("duration", enclosure.duration.map(|d| d.to_string())),
                ("mimetype", enclosure.mimetype.clone()),
            ];
            for (name, value) in values {
                let result = match value {
                    Some(value) => {
                        self.db
                            .set_parameter(&article.guid, ENCLOSURE_DOMAIN, name, &value)
                            .await
                    }
                    None => self
                        .db
                        .delete_parameter(&article.guid, ENCLOSURE_DOMAIN, name)
                        .await
                        .map(|_| ()),
                };
                if let Err(e) = result {
                    tracing::warn!(article = %article.guid, name, error = %e, "Failed to store enclosure");
                }
            }
        }

        if let Some(replies) = item.replies_link.as_deref().filter(|r| !r.is_empty()) {
            if let Err(e) = self
                .db
                .set_parameter(&article.guid, FEED_DOMAIN, "replies_url", replies)
                .await
            {
                tracing::warn!(article = %article.guid, error = %e, "Failed to store replies URL");
            }
        }
    }

    /// Remove articles of this feed whose items are no longer in `items`.
    ///
    /// Does nothing when the feed keeps removed items. The comparison is
    /// against the complete batch, so a feed that shrinks (pagination,
    /// truncation) loses the articles that dropped out. Returns how many
    /// articles were removed.
    pub async fn clean(&self, items: &[FeedItem]) -> Result<usize, ImportError> {
        if self.feed.keep_removed {
            return Ok(0);
        }

        let keep: Vec<String> = items.iter().map(FeedItem::external_guid).collect();
        let stale = self
            .db
            .find_feed_articles_missing_from(self.feed.id, &keep)
            .await?;

        let mut purge_guids = Vec::with_capacity(stale.len());
        for article in stale {
            let Some(article_id) = article.id else {
                continue;
            };
            if self.db.delete_article(article_id).await? {
                tracing::info!(feed_id = self.feed.id, article = %article.guid, "Removed article no longer in feed");
                purge_guids.push(article.guid);
            }
        }

        self.db.purge(&purge_guids, RecordKind::Article).await?;
        Ok(purge_guids.len())
    }
}

fn set_field<T: PartialEq>(field: &mut T, value: T) -> bool {
    if *field == value {
        return false;
    }
    *field = value;
    true
}
