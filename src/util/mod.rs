//! Small helpers shared by the importer and the CLI.
//!
//! - **Names**: URL-safe slugs for article names, category cleanup
//! - **URL validation**: refuse feed URLs that point into the local network

mod text;
mod url_validator;

pub use text::{clean_category, slugify};
pub use url_validator::{validate_feed_url, UrlValidationError};
