//! Feed import pipeline: fetching, parsing, author matching and article sync.
//!
//! - **Fetching**: conditional HTTP retrieval with ETag short-circuit and size limits
//! - **Parsing**: RSS/Atom/JSON Feed normalized into [`FeedItem`]s via `feed-rs`
//! - **Authors**: free-form author strings matched against known persons
//! - **Importing**: items mapped onto topic articles, unchanged items left alone
//! - **Cleaning**: articles whose items vanished upstream are removed
//!
//! # Architecture
//!
//! - [`parser`] - feed bytes to items
//! - [`fetcher`] - HTTP client, conditional GET, body limits
//! - [`author`] - author string parsing and person lookup
//! - [`tags`] - rel-tag anchors in item content
//! - [`importer`] - [`FeedImporter`], which drives a full run for one feed
//!
//! # Example
//!
//! ```ignore
//! use feedimport::feed::{build_client, FeedImporter, ImportOptions};
//!
//! let client = build_client("feedimport", DEFAULT_TIMEOUT)?;
//! let mut importer = FeedImporter::new(db, client, feed, options);
//! let guids = importer.import().await?;
//! ```

mod author;
mod fetcher;
mod importer;
mod parser;
mod tags;

pub use author::{match_item_author, parse_item_author, resolve_author, AuthorInfo};
pub use fetcher::{
    build_client, fetch_feed, FetchError, FetchLimits, FetchOutcome, DEFAULT_MAX_FEED_SIZE,
    DEFAULT_TIMEOUT,
};
pub use importer::{
    FeedImporter, ImportError, ImportOptions, ImportStats, ENCLOSURE_DOMAIN, FEED_DOMAIN,
};
pub use parser::{parse_feed, Enclosure, FeedItem, ItemAuthor, MAX_EXTERNAL_GUID_LEN};
pub use tags::extract_rel_tags;
