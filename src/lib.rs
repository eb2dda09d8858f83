//! Imports RSS and Atom feeds into a topic-based article store.
//!
//! - [`feed`] fetches feeds and maps their items onto articles
//! - [`storage`] persists topics, persons, feeds and articles in SQLite
//! - [`config`] reads the TOML configuration
//! - [`util`] holds slug and URL helpers

pub mod config;
pub mod feed;
pub mod storage;
pub mod util;
