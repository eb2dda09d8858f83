//! Integration tests for the feed lifecycle: subscribe, import, remove.
//!
//! Each test creates its own in-memory SQLite database for isolation.
//! These tests exercise the storage layer end-to-end, verifying that
//! operations compose correctly across topics, feeds and articles.

use feedimport::feed::{FeedImporter, FeedItem, FetchLimits, ImportOptions};
use feedimport::storage::{Database, NewFeed, NewPerson, RecordKind, BLOG_COMPONENT};

async fn test_db() -> Database {
    Database::open(":memory:").await.unwrap()
}

async fn blog_topic(db: &Database) -> i64 {
    db.create_topic("News", Some(BLOG_COMPONENT)).await.unwrap()
}

fn new_feed(topic_id: i64, url: &str, title: &str) -> NewFeed {
    NewFeed {
        title: title.to_string(),
        url: url.to_string(),
        topic_id,
        ..NewFeed::default()
    }
}

fn test_item(id: &str, title: &str) -> FeedItem {
    FeedItem {
        id: id.to_string(),
        title: title.to_string(),
        content: "Test content".to_string(),
        link: Some(format!("https://example.com/{}", id)),
        published: Some(1700000000),
        ..FeedItem::default()
    }
}

// ============================================================================
// Subscribe (insert_feed) Tests
// ============================================================================

#[tokio::test]
async fn test_subscribe_feed_appears_in_list() {
    let db = test_db().await;
    let topic = blog_topic(&db).await;

    let feed_id = db
        .insert_feed(&new_feed(topic, "https://example.com/feed.xml", "Example Feed"))
        .await
        .unwrap();
    assert!(feed_id > 0);

    let feeds = db.get_feeds().await.unwrap();
    assert_eq!(feeds.len(), 1);
    assert_eq!(feeds[0].url, "https://example.com/feed.xml");
    assert_eq!(feeds[0].title, "Example Feed");
    assert_eq!(feeds[0].topic_id, topic);
    assert_eq!(feeds[0].latest_fetch, None);
    assert!(!feeds[0].auto_approve);
}

#[tokio::test]
async fn test_subscribe_duplicate_url_updates_settings() {
    let db = test_db().await;
    let topic = blog_topic(&db).await;

    let id1 = db
        .insert_feed(&new_feed(topic, "https://example.com/feed.xml", "Old Title"))
        .await
        .unwrap();
    let id2 = db
        .insert_feed(&NewFeed {
            auto_approve: true,
            ..new_feed(topic, "https://example.com/feed.xml", "New Title")
        })
        .await
        .unwrap();

    // Same feed ID (ON CONFLICT DO UPDATE)
    assert_eq!(id1, id2);

    let feeds = db.get_feeds().await.unwrap();
    assert_eq!(feeds.len(), 1);
    assert_eq!(feeds[0].title, "New Title");
    assert!(feeds[0].auto_approve);
}

#[tokio::test]
async fn test_same_url_in_two_topics_is_two_feeds() {
    let db = test_db().await;
    let news = blog_topic(&db).await;
    let archive = db.create_topic("Archive", Some(BLOG_COMPONENT)).await.unwrap();

    let a = db
        .insert_feed(&new_feed(news, "https://example.com/feed.xml", "News"))
        .await
        .unwrap();
    let b = db
        .insert_feed(&new_feed(archive, "https://example.com/feed.xml", "Archive"))
        .await
        .unwrap();
    assert_ne!(a, b);
}

// ============================================================================
// Remove Feed Tests
// ============================================================================

#[tokio::test]
async fn test_remove_feed_keeps_articles_and_drops_parameters() {
    let db = test_db().await;
    let topic = blog_topic(&db).await;
    let admin = db.create_person(&NewPerson::default()).await.unwrap();
    let feed_id = db
        .insert_feed(&new_feed(topic, "https://example.com/feed.xml", "Feed"))
        .await
        .unwrap();
    let feed = db.get_feed(feed_id).await.unwrap().unwrap();
    db.set_parameter(&feed.guid, "feed", "etag", "\"v1\"")
        .await
        .unwrap();

    let mut importer = FeedImporter::new(
        db.clone(),
        reqwest::Client::new(),
        feed.clone(),
        ImportOptions {
            fallback_author: admin.id,
            limits: FetchLimits::default(),
        },
    );
    let guid = importer.import_item(&test_item("1", "Kept")).await.unwrap();

    let removed = db.purge(&[feed.guid.clone()], RecordKind::Feed).await.unwrap();
    assert_eq!(removed, 1);
    assert!(db.get_feed(feed_id).await.unwrap().is_none());
    assert_eq!(db.get_parameter(&feed.guid, "feed", "etag").await.unwrap(), None);

    // Imported articles outlive their feed, no longer linked to it
    let article = db.get_article_by_guid(&guid).await.unwrap().unwrap();
    assert_eq!(article.source_feed_id, None);
}

#[tokio::test]
async fn test_remove_nonexistent_feed_is_idempotent() {
    let db = test_db().await;
    let removed = db
        .purge(&["no-such-guid".to_string()], RecordKind::Feed)
        .await
        .unwrap();
    assert_eq!(removed, 0);
}

// ============================================================================
// Full Lifecycle Test
// ============================================================================

#[tokio::test]
async fn test_full_lifecycle_subscribe_import_clean_remove() {
    let db = test_db().await;
    let topic = blog_topic(&db).await;
    let admin = db.create_person(&NewPerson::default()).await.unwrap();
    let feed_id = db
        .insert_feed(&new_feed(topic, "https://example.com/feed.xml", "Feed"))
        .await
        .unwrap();
    let feed = db.get_feed(feed_id).await.unwrap().unwrap();

    let mut importer = FeedImporter::new(
        db.clone(),
        reqwest::Client::new(),
        feed.clone(),
        ImportOptions {
            fallback_author: admin.id,
            limits: FetchLimits::default(),
        },
    );

    // Step 1: import three items
    let items = vec![
        test_item("a", "Alpha"),
        test_item("b", "Beta"),
        test_item("c", "Gamma"),
    ];
    for item in &items {
        assert!(importer.import_item(item).await.is_some());
    }
    assert_eq!(db.get_articles_for_topic(topic).await.unwrap().len(), 3);
    let stats = importer.stats();
    assert_eq!(stats.created, 3);

    // Step 2: the freshness marker follows the newest item
    let stored = db.get_feed(feed_id).await.unwrap().unwrap();
    assert_eq!(stored.latest_update, Some(1700000000));

    // Step 3: "b" disappears upstream
    let removed = importer.clean(&[items[0].clone(), items[2].clone()]).await.unwrap();
    assert_eq!(removed, 1);
    let titles: Vec<String> = db
        .get_articles_for_topic(topic)
        .await
        .unwrap()
        .into_iter()
        .map(|a| a.title)
        .collect();
    assert_eq!(titles, vec!["Alpha", "Gamma"]);

    // Step 4: unsubscribe
    db.purge(&[feed.guid], RecordKind::Feed).await.unwrap();
    assert!(db.get_feeds().await.unwrap().is_empty());
    assert_eq!(db.get_articles_for_topic(topic).await.unwrap().len(), 2);
}
