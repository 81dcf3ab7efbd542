//! Feed retrieval and decoding.
//!
//! - [`fetcher`] - HTTP GET of a feed URL, size-limited and cancellable
//! - [`parser`] - decoding an RSS 2.0 body into an [`RssDocument`]
//! - [`normalize`] - mapping each [`RssItem`] to the [`Post`](crate::storage::Post) to commit
//!
//! # Example
//!
//! ```ignore
//! use gleaner::feed::{build_client, fetch_document, normalize};
//!
//! let client = build_client()?;
//! let doc = fetch_document(&client, &feed.url, &cancel).await?;
//! let posts: Vec<_> = doc.items.iter().map(|i| normalize(i, feed.id, now)).collect();
//! ```

mod fetcher;
mod normalize;
mod parser;

pub use fetcher::{build_client, fetch_document, FetchError, USER_AGENT};
pub use normalize::{normalize, parse_pub_date};
pub use parser::{parse_document, ParseError, RssDocument, RssItem};
