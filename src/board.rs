//! Board queries and mutations wired to the cache.
//!
//! [`Board`] ties the resource accessors of [`ApiClient`] to one shared
//! [`QueryClient`]: reads become [`Query`](crate::query::Query)s and
//! [`InfiniteQuery`](crate::query::InfiniteQuery)s under the keys in
//! [`keys`], writes become [`Mutation`](crate::query::Mutation)s that patch
//! or invalidate exactly the entries they affect.
//!
//! | Mutation | Optimistic patch | Invalidates on success |
//! |---|---|---|
//! | `create_post` | - | `posts` |
//! | `update_post` | - | `post:id`, `posts` |
//! | `delete_post` | - | `posts` (after evicting the post from every list) |
//! | `toggle_post_recommend` | - | `post:id`, `posts` |
//! | `report_post` | - | `post:id`, `posts` |
//! | `create_comment` | - | `comments:postId`, `post:postId`, `posts`, `replies:parentId` |
//! | `toggle_comment_recommend` | flag and count in `comments`/`replies` | `comments`, `replies` |
//! | `report_comment` | flag and count in `comments`/`replies` | `comments`, `replies` |
//! | `delete_comment` | - | `comments`, `replies`, `posts`, `post` |

mod chat;
mod comments;
pub mod keys;
mod posts;

use std::sync::Arc;

pub use chat::ChatAssistant;
pub use comments::{Reactable, Reaction, patch_reaction};
pub use posts::{PostEdit, Report};

use crate::api::ApiClient;
use crate::config::{ClientConfig, ConfigError};
use crate::query::{QueryClient, QueryKey};

const DEFAULT_PAGE_SIZE: u32 = 20;

#[derive(Clone, Debug)]
pub struct Board {
    api: Arc<ApiClient>,
    client: Arc<QueryClient>,
    page_size: u32,
}

impl Board {
    pub fn new(api: Arc<ApiClient>, client: Arc<QueryClient>) -> Self {
        Self {
            api,
            client,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// Builds the API client and the query cache from `config`.
    pub fn from_config(config: &ClientConfig) -> Result<Self, ConfigError> {
        let api = Arc::new(ApiClient::from_config(config)?);
        let client = Arc::new(QueryClient::with_config(config.query_config()));
        Ok(Self::new(api, client).with_page_size(config.page_size))
    }

    #[must_use]
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn api(&self) -> &Arc<ApiClient> {
        &self.api
    }

    pub fn client(&self) -> &Arc<QueryClient> {
        &self.client
    }

    pub const fn page_size(&self) -> u32 {
        self.page_size
    }
}

fn invalidate(client: &QueryClient, filters: &[QueryKey]) {
    for filter in filters {
        client.invalidate_queries(filter);
    }
}
