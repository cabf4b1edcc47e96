//! # Campus Board - client core for a campus Q&A board
//!
//! Campus Board is the data layer behind a campus Q&A board with an integrated
//! chatbot. It talks to the board backend over REST and keeps a process-wide
//! query cache consistent across posts, comments and replies, so views only
//! subscribe to data and fire mutations.
//!
//! ## Architecture
//!
//! Requests flow through four layers:
//!
//! 1. **HTTP client**: base URL, JSON encoding, one error shape with a display-ready message
//! 2. **Resource accessors**: one `async fn` per backend operation, no caching
//! 3. **Query cache**: deduplicated, invalidation-aware reads and cache-patching writes
//! 4. **Board**: the board's queries and mutations wired to the right cache keys
//!
//! Views are expected to follow a message/update loop: queries are
//! [`Subscription`](subscription::Subscription)s and mutations produce
//! [`Command`](command::Command)s.
//!
//! ## Core Components
//!
//! - [`ApiClient`](api::ApiClient): The HTTP client and resource accessors
//! - [`QueryClient`](query::QueryClient): The shared cache service
//! - [`Query`](query::Query) / [`InfiniteQuery`](query::InfiniteQuery): Cached reads
//! - [`Mutation`](query::Mutation) / [`OptimisticUpdate`](query::OptimisticUpdate): Writes with rollback
//! - [`Board`](board::Board): Posts, comments, replies and the chat assistant
//!
//! ## Example
//!
//! ```rust,no_run
//! use campus_board::board::Board;
//! use campus_board::config::ClientConfig;
//! use campus_board::query::QueryError;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! campus_board::telemetry::init_tracing();
//!
//! let board = Board::from_config(&ClientConfig::load(None)?)?;
//!
//! let posts = board.posts(Some("시험"));
//! let first = posts.fetch().await?;
//! println!("{} posts", first.items().len());
//! if posts.has_next_page() {
//!     posts.fetch_next_page().await?;
//! }
//!
//! let recommend = board.toggle_comment_recommend();
//! if let Err(err) = recommend.execute("C1".to_string()).await {
//!     // The optimistic change was already rolled back.
//!     eprintln!("{}", err.message());
//! }
//!
//! match board.chat().ask("도서관 운영 시간은?").await {
//!     Ok(answer) => println!("{}", answer.answer),
//!     Err(QueryError::Busy) => {}
//!     Err(err) => eprintln!("{err}"),
//! }
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod board;
pub mod command;
pub mod config;
pub mod prelude;
pub mod query;
pub mod subscription;
pub mod telemetry;
