//! Maps the free-form author data of feed items onto known persons.
//!
//! Feeds describe authors in several shapes: a bare username, a full
//! name, `Full Name <email>` or `email (Full Name)`. [`parse_item_author`]
//! extracts what it can, [`match_item_author`] looks the pieces up, and
//! [`resolve_author`] applies the feed's default-author rules on top.

use anyhow::Result;
use regex::Regex;
use std::sync::OnceLock;

use super::parser::{FeedItem, ItemAuthor};
use crate::storage::{Database, Feed, Person};

static NAME_EMAIL: OnceLock<Regex> = OnceLock::new();
static EMAIL_NAME: OnceLock<Regex> = OnceLock::new();
static BARE_EMAIL: OnceLock<Regex> = OnceLock::new();

/// `Full Name <email>`, brackets optional, trailing separator tolerated
fn name_email() -> &'static Regex {
    NAME_EMAIL.get_or_init(|| {
        Regex::new(r"(?P<fullname>.+) <?(?P<email>[a-zA-Z0-9_.-]+?@[a-zA-Z0-9_.-]+)>?[ ,]?")
            .expect("valid regex")
    })
}

/// `email (Full Name)`
fn email_name() -> &'static Regex {
    EMAIL_NAME.get_or_init(|| {
        Regex::new(r"^(?P<email>[a-zA-Z0-9_.-]+?@[a-zA-Z0-9_.-]+) \((?P<fullname>.+)\)$")
            .expect("valid regex")
    })
}

fn bare_email() -> &'static Regex {
    BARE_EMAIL.get_or_init(|| Regex::new(r"^[a-zA-Z0-9_.+-]+@[a-zA-Z0-9_.-]+$").expect("valid regex"))
}

/// What could be learned about an item's author
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthorInfo {
    pub email: Option<String>,
    pub username: Option<String>,
    pub full_name: Option<String>,
}

/// Extract email, username and full name from an item's author data.
///
/// The display name is used when present, otherwise the email string.
/// A value without `<` or `(` is a username or full name; otherwise the
/// `Full Name <email>` and `email (Full Name)` forms are tried. A name
/// containing a space counts as a full name, anything else as a username.
/// A bare email address in the email field fills in the email when the
/// parsed string did not carry one.
pub fn parse_item_author(author: &ItemAuthor) -> AuthorInfo {
    let mut info = AuthorInfo::default();

    let display_name = author.name.as_deref().filter(|n| !n.trim().is_empty());
    let mut user_or_full = display_name.map(str::to_string);
    let name = display_name.or(author.email.as_deref()).unwrap_or("");

    if !name.contains('<') && !name.contains('(') {
        user_or_full = Some(name.to_string());
    } else {
        let pattern = if name.contains('<') {
            name_email()
        } else {
            email_name()
        };
        if let Some(captures) = pattern.captures(name) {
            info.email = Some(captures["email"].to_string());
            user_or_full = Some(captures["fullname"].to_string());
        }
    }

    if info.email.is_none() {
        info.email = author
            .email
            .as_deref()
            .map(str::trim)
            .filter(|e| bare_email().is_match(e))
            .map(str::to_string);
    }

    if let Some(value) = user_or_full {
        let value = value.trim();
        if value.contains(' ') {
            info.full_name = Some(value.to_string());
        } else if !value.is_empty() {
            info.username = Some(value.to_string());
        }
    }

    info
}

/// Look up a person by email, then username, then first and last name.
///
/// The name lookup only applies to full names of exactly two words.
pub async fn match_item_author(db: &Database, info: &AuthorInfo) -> Result<Option<Person>> {
    if let Some(email) = &info.email {
        if let Some(person) = db.find_person_by_email(email).await? {
            return Ok(Some(person));
        }
    }

    if let Some(username) = &info.username {
        if let Some(person) = db.find_person_by_username(username).await? {
            return Ok(Some(person));
        }
    }

    if let Some(full_name) = &info.full_name {
        let parts: Vec<&str> = full_name.split_whitespace().collect();
        if let [firstname, lastname] = parts.as_slice() {
            if let Some(person) = db.find_person_by_name(firstname, lastname).await? {
                return Ok(Some(person));
            }
        }
    }

    Ok(None)
}

/// Decide which person an imported item is attributed to.
///
/// A feed forcing its default author always gets it. Otherwise the item's
/// author is matched; when nothing matches, or the match is the fallback
/// identity itself, the feed's default author is used, else the fallback.
/// Returns `None` only when the chosen person record does not exist.
pub async fn resolve_author(
    db: &Database,
    item: &FeedItem,
    feed: &Feed,
    fallback_author: i64,
) -> Result<Option<Person>> {
    if feed.force_author {
        if let Some(default_author) = feed.default_author {
            return db.get_person(default_author).await;
        }
    }

    let matched = match &item.author {
        Some(author) => match_item_author(db, &parse_item_author(author)).await?,
        None => None,
    };

    match matched {
        Some(person) if person.id != fallback_author => Ok(Some(person)),
        _ => {
            let person_id = feed.default_author.unwrap_or(fallback_author);
            db.get_person(person_id).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{NewFeed, NewPerson, BLOG_COMPONENT};
    use pretty_assertions::assert_eq;

    fn named(name: &str) -> ItemAuthor {
        ItemAuthor {
            name: Some(name.to_string()),
            email: None,
        }
    }

    #[test]
    fn test_parse_username() {
        assert_eq!(
            parse_item_author(&named("jdoe")),
            AuthorInfo {
                username: Some("jdoe".to_string()),
                ..AuthorInfo::default()
            }
        );
    }

    #[test]
    fn test_parse_full_name() {
        assert_eq!(
            parse_item_author(&named("  Jane Doe ")),
            AuthorInfo {
                full_name: Some("Jane Doe".to_string()),
                ..AuthorInfo::default()
            }
        );
    }

    #[test]
    fn test_parse_name_angle_email() {
        assert_eq!(
            parse_item_author(&named("Jane Doe <jane@example.com>")),
            AuthorInfo {
                email: Some("jane@example.com".to_string()),
                full_name: Some("Jane Doe".to_string()),
                ..AuthorInfo::default()
            }
        );
    }

    #[test]
    fn test_parse_email_paren_name() {
        let author = ItemAuthor {
            name: None,
            email: Some("jane@example.com (Jane Doe)".to_string()),
        };
        assert_eq!(
            parse_item_author(&author),
            AuthorInfo {
                email: Some("jane@example.com".to_string()),
                full_name: Some("Jane Doe".to_string()),
                ..AuthorInfo::default()
            }
        );
    }

    #[test]
    fn test_parse_email_paren_single_name() {
        assert_eq!(
            parse_item_author(&named("jane@example.com (jane)")),
            AuthorInfo {
                email: Some("jane@example.com".to_string()),
                username: Some("jane".to_string()),
                ..AuthorInfo::default()
            }
        );
    }

    #[test]
    fn test_parse_unrecognized_bracket_form_keeps_raw_name() {
        assert_eq!(
            parse_item_author(&named("(anonymous)")),
            AuthorInfo {
                username: Some("(anonymous)".to_string()),
                ..AuthorInfo::default()
            }
        );
    }

    #[test]
    fn test_parse_atom_name_and_email() {
        let author = ItemAuthor {
            name: Some("Jane Doe".to_string()),
            email: Some("jane@example.com".to_string()),
        };
        assert_eq!(
            parse_item_author(&author),
            AuthorInfo {
                email: Some("jane@example.com".to_string()),
                full_name: Some("Jane Doe".to_string()),
                ..AuthorInfo::default()
            }
        );
    }

    #[test]
    fn test_parse_bare_email() {
        let author = ItemAuthor {
            name: None,
            email: Some("jane@example.com".to_string()),
        };
        let info = parse_item_author(&author);
        assert_eq!(info.email.as_deref(), Some("jane@example.com"));
    }

    #[test]
    fn test_parse_empty_author() {
        assert_eq!(parse_item_author(&ItemAuthor::default()), AuthorInfo::default());
    }

    struct Fixture {
        db: Database,
        admin: Person,
        jane: Person,
        editor: Person,
        feed: Feed,
    }

    async fn fixture(default_author: bool, force_author: bool) -> Fixture {
        let db = Database::open(":memory:").await.unwrap();
        let admin = db
            .create_person(&NewPerson {
                username: Some("admin".to_string()),
                ..NewPerson::default()
            })
            .await
            .unwrap();
        let jane = db
            .create_person(&NewPerson {
                username: Some("jane".to_string()),
                email: Some("jane@example.com".to_string()),
                firstname: Some("Jane".to_string()),
                lastname: Some("Doe".to_string()),
            })
            .await
            .unwrap();
        let editor = db
            .create_person(&NewPerson {
                username: Some("editor".to_string()),
                ..NewPerson::default()
            })
            .await
            .unwrap();
        let topic = db.create_topic("News", Some(BLOG_COMPONENT)).await.unwrap();
        let feed_id = db
            .insert_feed(&NewFeed {
                title: "Feed".to_string(),
                url: "https://example.com/rss".to_string(),
                topic_id: topic,
                force_author,
                default_author: default_author.then_some(editor.id),
                ..NewFeed::default()
            })
            .await
            .unwrap();
        let feed = db.get_feed(feed_id).await.unwrap().unwrap();
        Fixture {
            db,
            admin,
            jane,
            editor,
            feed,
        }
    }

    fn item_by(name: &str) -> FeedItem {
        FeedItem {
            id: "1".to_string(),
            title: "Item".to_string(),
            author: Some(named(name)),
            ..FeedItem::default()
        }
    }

    #[tokio::test]
    async fn test_match_by_email_username_and_name() {
        let f = fixture(false, false).await;
        for name in ["someone <jane@example.com>", "jane", "Jane Doe"] {
            let info = parse_item_author(&named(name));
            let person = match_item_author(&f.db, &info).await.unwrap();
            assert_eq!(person.map(|p| p.id), Some(f.jane.id), "{name}");
        }
    }

    #[tokio::test]
    async fn test_name_match_requires_two_words() {
        let f = fixture(false, false).await;
        let info = parse_item_author(&named("Jane Q Doe"));
        assert!(match_item_author(&f.db, &info).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_resolve_matched_author() {
        let f = fixture(true, false).await;
        let person = resolve_author(&f.db, &item_by("jane"), &f.feed, f.admin.id)
            .await
            .unwrap();
        assert_eq!(person.map(|p| p.id), Some(f.jane.id));
    }

    #[tokio::test]
    async fn test_resolve_forced_default_author() {
        let f = fixture(true, true).await;
        let person = resolve_author(&f.db, &item_by("jane"), &f.feed, f.admin.id)
            .await
            .unwrap();
        assert_eq!(person.map(|p| p.id), Some(f.editor.id));
    }

    #[tokio::test]
    async fn test_resolve_unmatched_uses_default_then_fallback() {
        let with_default = fixture(true, false).await;
        let person = resolve_author(
            &with_default.db,
            &item_by("stranger"),
            &with_default.feed,
            with_default.admin.id,
        )
        .await
        .unwrap();
        assert_eq!(person.map(|p| p.id), Some(with_default.editor.id));

        let without_default = fixture(false, false).await;
        let person = resolve_author(
            &without_default.db,
            &item_by("stranger"),
            &without_default.feed,
            without_default.admin.id,
        )
        .await
        .unwrap();
        assert_eq!(person.map(|p| p.id), Some(without_default.admin.id));
    }

    #[tokio::test]
    async fn test_resolve_match_on_fallback_identity_is_replaced() {
        let f = fixture(true, false).await;
        let person = resolve_author(&f.db, &item_by("admin"), &f.feed, f.admin.id)
            .await
            .unwrap();
        assert_eq!(person.map(|p| p.id), Some(f.editor.id));
    }

    #[tokio::test]
    async fn test_resolve_missing_fallback_person() {
        let f = fixture(false, false).await;
        let person = resolve_author(&f.db, &item_by("stranger"), &f.feed, 9999)
            .await
            .unwrap();
        assert!(person.is_none());
    }
}
