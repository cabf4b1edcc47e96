//! Prelude module for convenient imports.
//!
//! ```
//! use campus_board::prelude::*;
//! ```
//!
//! # What's included
//!
//! - [`Board`] and [`keys`] - Board queries, mutations and cache keys
//! - [`ApiClient`] and the wire models
//! - [`Command`] and [`Subscription`] - For wiring into a message/update loop
//! - The query cache types

pub use crate::api::ApiClient;
pub use crate::api::models::{
    ChatAnswer, ChatSource, Comment, CommentCreateRequest, Post, PostCreateRequest, PostPage,
    PostUpdateRequest, ReportReason,
};
pub use crate::board::{Board, ChatAssistant, PostEdit, Report, keys};
pub use crate::command::Command;
pub use crate::config::ClientConfig;
pub use crate::query::{
    InfiniteData, InfiniteQuery, Mutation, MutationState, Query, QueryClient, QueryError,
    QueryKey, QueryResult, QueryState,
};
pub use crate::subscription::{Subscription, SubscriptionSource};
