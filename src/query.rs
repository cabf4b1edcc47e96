//! Query/cache layer: cached reads, deduplicated fetches, invalidation and
//! optimistic writes, in the style of SWR or TanStack Query.
//!
//! # Features
//!
//! - **Queries**: [`Query`] and [`InfiniteQuery`] are subscriptions that serve
//!   cached data first and refetch stale data in the background
//! - **Mutations**: [`Mutation`] runs a server write, optionally patching the
//!   cache optimistically through an [`OptimisticUpdate`]
//! - **Cache management**: [`QueryClient`] owns the cache, deduplicates
//!   fetches per [`QueryKey`] and refetches observed keys on invalidation
//!
//! # Example
//!
//! ```rust,ignore
//! use campus_board::prelude::*;
//! use std::sync::Arc;
//!
//! struct PostScreen {
//!     board: Board,
//!     post: QueryState<Post>,
//! }
//!
//! impl PostScreen {
//!     fn subscriptions(&self, id: &str) -> Vec<Subscription<Message>> {
//!         vec![Subscription::new(self.board.post(id)).map(Message::Post)]
//!     }
//!
//!     fn update(&mut self, msg: Message) -> Command<Message> {
//!         match msg {
//!             Message::Post(result) => {
//!                 self.post = result.state;
//!                 Command::none()
//!             }
//!             Message::Refresh(id) => self.board.client().invalidate(&keys::post(&id)),
//!         }
//!     }
//! }
//! ```

mod cache;
mod client;
mod error;
mod infinite;
mod key;
mod mutation;
mod observer;
mod optimistic;

pub use cache::{CacheEntry, Snapshot};
pub use client::{CacheEvent, QueryClient, QueryObserver};
pub use error::QueryError;
pub use infinite::{InfiniteData, InfiniteQuery, Page};
pub use key::QueryKey;
pub use mutation::{Mutation, MutationResult, MutationState};
pub use observer::{Query, QueryResult, QueryState};
pub use optimistic::{OptimisticPhase, OptimisticUpdate};
