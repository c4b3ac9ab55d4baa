//! redgraph exposes the Reddit HTTP API as a navigable object graph.
//!
//! A [`RedditClient`] session owns an authenticated, rate-limited, caching,
//! retrying request pipeline. Responses materialise into typed entities
//! (comments, messages, redditors, submissions, subreddits) that fetch
//! missing attributes on demand, paginated endpoints surface as lazy
//! [`listing::ListingGenerator`]s, and submission comment trees resolve
//! their `more`-placeholders through [`comments::CommentForest`].
//!
//! ```no_run
//! use redgraph::{Config, RedditClient};
//!
//! # async fn example() -> Result<(), redgraph::RedditError> {
//! let mut config = Config::load("bot1");
//! config.apply("user_agent", "demo:redgraph:0.1 (by u/example)");
//! let client = RedditClient::new(config)?;
//!
//! let mut posts = client.listing("/r/rust/new", &[]).limit(Some(50));
//! while let Some(post) = posts.next().await? {
//!     if let Some(submission) = post.into_submission() {
//!         println!("{}", submission.title().unwrap_or("<untitled>"));
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod client;
pub mod comments;
pub mod config;
pub mod errors;
pub mod listing;
pub mod models;

pub use auth::{Authorizer, FileTokenManager, GrantKind, SqliteTokenManager, TokenManager};
pub use client::handler::{DefaultHandler, Handler};
pub use client::{Call, RedditClient};
pub use config::Config;
pub use errors::{ApiError, ApiErrorKind, RedditError};
pub use listing::{ListingGenerator, ListingStream, StreamHandle};
pub use models::{
    Comment, Listing, Message, MoreComments, Redditor, Submission, Subreddit, Thing,
};
