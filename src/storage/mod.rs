//! SQLite persistence for topics, persons, feeds and imported articles.
//!
//! [`Database`] is cheap to clone (it wraps a connection pool). Operations
//! are grouped by record type in submodules, each adding methods to the
//! same `impl Database`.

mod articles;
mod feeds;
mod parameters;
mod persons;
mod schema;
mod tags;
mod topics;
mod types;

pub use schema::Database;
pub use types::{
    Article, DatabaseError, Feed, NewFeed, NewPerson, Person, RecordKind, Topic, BLOG_COMPONENT,
};
