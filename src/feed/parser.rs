use feed_rs::model::{Entry, Link};
use feed_rs::parser::{self, ParseFeedError};
use serde::Serialize;
use sha2::{Digest, Sha256};

/// Longest item id stored on an article; longer ids are cut at this many characters
pub const MAX_EXTERNAL_GUID_LEN: usize = 255;

const RSS_CONTACT_ROLES: [&str; 3] = ["author", "managingEditor", "webMaster"];

/// Raw author data as the feed supplied it.
///
/// RSS usually packs everything into one string (`jane@example.com (Jane Doe)`),
/// Atom splits name and email.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ItemAuthor {
    pub name: Option<String>,
    pub email: Option<String>,
}

impl ItemAuthor {
    /// The single string author formats are parsed from: name, else email
    pub fn raw(&self) -> Option<&str> {
        self.name.as_deref().or(self.email.as_deref())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Enclosure {
    pub url: String,
    pub mimetype: Option<String>,
    /// Duration in seconds
    pub duration: Option<u64>,
}

/// One entry of a fetched feed, normalized across RSS and Atom
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FeedItem {
    /// Feed-native id, trimmed; may be empty
    pub id: String,
    pub title: String,
    pub content: String,
    pub link: Option<String>,
    /// `<link rel="replies">` target, if any
    pub replies_link: Option<String>,
    /// Category terms in feed order
    pub categories: Vec<String>,
    pub enclosures: Vec<Enclosure>,
    pub author: Option<ItemAuthor>,
    /// Unix timestamp of publication (or last update)
    pub published: Option<i64>,
}

impl FeedItem {
    /// Id used to correlate this item with an article.
    ///
    /// The native id when present, otherwise a SHA-256 over link, title
    /// and date. Cut to [`MAX_EXTERNAL_GUID_LEN`] characters.
    pub fn external_guid(&self) -> String {
        if !self.id.is_empty() {
            return self.id.chars().take(MAX_EXTERNAL_GUID_LEN).collect();
        }

        let input = format!(
            "{}|{}|{}",
            self.link.as_deref().unwrap_or(""),
            self.title,
            self.published.map(|p| p.to_string()).unwrap_or_default()
        );
        format!("{:x}", Sha256::digest(input.as_bytes()))
    }
}

/// Parse RSS, Atom or JSON Feed bytes into items, in document order.
///
/// Entries without an id keep an empty one. feed-rs would otherwise invent
/// a random id per parse, which breaks correlation across runs.
pub fn parse_feed(bytes: &[u8]) -> Result<Vec<FeedItem>, ParseFeedError> {
    let feed = parser::Builder::new()
        .id_generator(|_, _, _| String::new())
        .build()
        .parse(bytes)?;
    Ok(feed.entries.into_iter().map(to_item).collect())
}

fn to_item(entry: Entry) -> FeedItem {
    let link = entry
        .links
        .iter()
        .find(|l| matches!(l.rel.as_deref(), None | Some("alternate")))
        .map(|l| l.href.clone());
    let replies_link = entry
        .links
        .iter()
        .find(|l| l.rel.as_deref() == Some("replies"))
        .map(|l| l.href.clone());

    let mut enclosures: Vec<Enclosure> = entry
        .links
        .iter()
        .filter(|l| l.rel.as_deref() == Some("enclosure"))
        .map(link_enclosure)
        .collect();
    for media in &entry.media {
        for content in &media.content {
            if let Some(url) = &content.url {
                enclosures.push(Enclosure {
                    url: url.to_string(),
                    mimetype: content.content_type.as_ref().map(|m| m.to_string()),
                    duration: content.duration.or(media.duration).map(|d| d.as_secs()),
                });
            }
        }
    }

    let content = entry
        .content
        .and_then(|c| c.body)
        .or_else(|| entry.summary.map(|s| s.content))
        .unwrap_or_default();

    let author = entry.authors.into_iter().next().map(|person| {
        let email = person.email.filter(|e| !e.trim().is_empty());
        // RSS contact elements carry only text; the parser names the person after the element
        let placeholder = email.is_some() && RSS_CONTACT_ROLES.contains(&person.name.as_str());
        ItemAuthor {
            name: Some(person.name).filter(|n| !placeholder && !n.trim().is_empty()),
            email,
        }
    });

    FeedItem {
        id: entry.id.trim().to_string(),
        title: entry.title.map(|t| t.content).unwrap_or_default(),
        content,
        link,
        replies_link,
        categories: entry.categories.into_iter().map(|c| c.term).collect(),
        enclosures,
        author,
        published: entry.published.or(entry.updated).map(|dt| dt.timestamp()),
    }
}

fn link_enclosure(link: &Link) -> Enclosure {
    Enclosure {
        url: link.href.clone(),
        mimetype: link.media_type.clone(),
        duration: None,
    }
}
