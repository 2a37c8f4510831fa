//! Client-side result-set engine for news wire and agenda browsing.
//!
//! [`feed::FeedSession`] is the entry point. It turns the user's query,
//! filter, and date selection into paginated search requests, keeps the
//! committed result set stable while background updates are staged, and
//! groups agenda items into local-day buckets.

pub mod agenda;
pub mod anchor;
pub mod config;
pub mod coverage;
pub mod dates;
pub mod error;
pub mod feed;
pub mod interaction;
pub mod notifier;
pub mod persist;
pub mod query;
pub mod selection;
pub mod store;
pub mod timer;
pub mod transport;
pub mod types;

pub use error::{FeedError, FeedNotice};
pub use feed::{FeedSession, FetchOutcome};
