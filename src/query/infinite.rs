//! Cursor-paginated lists cached as one growing value.
//!
//! All loaded pages of a list live under the list's key as an
//! [`InfiniteData`]. Loading the next page fetches it under a per-cursor key
//! (so concurrent requests for the same page share one call) and appends it
//! to the cached list only if the list still ends at that cursor.

use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use futures::stream::BoxStream;
use tracing::debug;

use crate::subscription::{SubscriptionId, SubscriptionSource};

use super::cache::AnyValue;
use super::client::{QueryClient, downcast_value};
use super::error::QueryError;
use super::key::QueryKey;
use super::observer::{Query, QueryResult};

/// One page of a cursor-paginated response.
pub trait Page: Clone + Send + Sync + 'static {
    type Item: Clone;

    fn items(&self) -> &[Self::Item];

    /// Cursor for the page after this one; `None` on the last page.
    fn next_cursor(&self) -> Option<&str>;
}

/// Every page loaded so far, with the cursor each page was requested with.
#[derive(Debug, Clone, PartialEq)]
pub struct InfiniteData<P> {
    pub pages: Vec<P>,
    /// `page_params[i]` fetched `pages[i]`; the first page has no cursor.
    pub page_params: Vec<Option<String>>,
}

impl<P> Default for InfiniteData<P> {
    fn default() -> Self {
        Self {
            pages: Vec::new(),
            page_params: Vec::new(),
        }
    }
}

impl<P: Page> InfiniteData<P> {
    pub fn next_cursor(&self) -> Option<&str> {
        self.pages.last().and_then(Page::next_cursor)
    }

    pub fn has_next_page(&self) -> bool {
        self.next_cursor().is_some()
    }

    /// The items of every page, in order.
    pub fn items(&self) -> Vec<P::Item> {
        self.pages
            .iter()
            .flat_map(|page| page.items().iter().cloned())
            .collect()
    }

    fn push(&mut self, cursor: Option<String>, page: P) {
        self.page_params.push(cursor);
        self.pages.push(page);
    }
}

type PageFetcher<P> =
    Arc<dyn Fn(Option<String>) -> BoxFuture<'static, Result<P, QueryError>> + Send + Sync>;

/// A paginated query.
///
/// Streams like a [`Query`] over the whole [`InfiniteData`]. A refetch (for
/// instance after invalidation) reloads as many pages as were loaded,
/// starting from the first and following the fresh cursors.
pub struct InfiniteQuery<P> {
    query: Query<InfiniteData<P>>,
    fetch_page: PageFetcher<P>,
}

impl<P> Clone for InfiniteQuery<P> {
    fn clone(&self) -> Self {
        Self {
            query: self.query.clone(),
            fetch_page: self.fetch_page.clone(),
        }
    }
}

impl<P: Page> InfiniteQuery<P> {
    /// Creates an infinite query. `fetch_page` receives `None` for the first
    /// page and the previous page's cursor afterwards.
    pub fn new<F>(key: QueryKey, fetch_page: F, client: Arc<QueryClient>) -> Self
    where
        F: Fn(Option<String>) -> BoxFuture<'static, Result<P, QueryError>> + Send + Sync + 'static,
    {
        let fetch_page: PageFetcher<P> = Arc::new(fetch_page);
        let reload = fetch_page.clone();
        let query = Query::with_previous(
            key,
            move |previous: Option<InfiniteData<P>>| {
                let pages = previous.map_or(1, |data| data.pages.len().max(1));
                load_pages(reload.clone(), pages).boxed()
            },
            client,
        );
        Self { query, fetch_page }
    }

    #[must_use]
    pub fn enabled(self, enabled: bool) -> Self {
        Self {
            query: self.query.enabled(enabled),
            fetch_page: self.fetch_page,
        }
    }

    pub const fn key(&self) -> &QueryKey {
        self.query.key()
    }

    pub fn data(&self) -> Option<InfiniteData<P>> {
        self.query.data()
    }

    pub fn has_next_page(&self) -> bool {
        self.data().is_some_and(|data| data.has_next_page())
    }

    /// Returns the cached pages if fresh, otherwise loads them.
    pub async fn fetch(&self) -> Result<InfiniteData<P>, QueryError> {
        self.query.fetch().await
    }

    pub async fn refetch(&self) -> Result<InfiniteData<P>, QueryError> {
        self.query.refetch().await
    }

    /// Loads the page after the last loaded one.
    ///
    /// Returns `Ok(false)` without any request when the last page has no
    /// next cursor, or when the list changed while the page was loading.
    /// With nothing cached yet the first page is loaded instead.
    pub async fn fetch_next_page(&self) -> Result<bool, QueryError> {
        let key = self.query.key();
        let client = self.query.client();
        let Some(data) = client.get_query_data::<InfiniteData<P>>(key) else {
            self.query.fetch().await?;
            return Ok(true);
        };
        let Some(cursor) = data.next_cursor().map(str::to_owned) else {
            debug!(%key, "no next page, skipping fetch");
            return Ok(false);
        };

        let page_key = key.clone().with(cursor.as_str());
        let fetch_page = self.fetch_page.clone();
        let request_cursor = cursor.clone();
        let shared = client.dedupe(&page_key, false, move |_token| {
            async move {
                fetch_page(Some(request_cursor))
                    .await
                    .map(|page| Arc::new(page) as AnyValue)
            }
            .boxed()
        });
        let page: P = downcast_value(&page_key, &shared.await?)?;

        let appended = client.update_query_data::<InfiniteData<P>, _>(key, |data| {
            if data.next_cursor() != Some(cursor.as_str()) {
                return false;
            }
            data.push(Some(cursor.clone()), page);
            true
        });
        if !appended {
            debug!(%key, %cursor, "list moved on while loading page, dropping it");
        }
        Ok(appended)
    }
}

async fn load_pages<P: Page>(
    fetch_page: PageFetcher<P>,
    count: usize,
) -> Result<InfiniteData<P>, QueryError> {
    let mut data = InfiniteData::default();
    let mut cursor = None;
    for _ in 0..count {
        let page = fetch_page(cursor.clone()).await?;
        let next = page.next_cursor().map(str::to_owned);
        data.push(cursor, page);
        match next {
            Some(next) => cursor = Some(next),
            None => break,
        }
    }
    Ok(data)
}

impl<P: Page> SubscriptionSource for InfiniteQuery<P> {
    type Output = QueryResult<InfiniteData<P>>;

    fn stream(&self) -> BoxStream<'static, Self::Output> {
        self.query.stream()
    }

    fn id(&self) -> SubscriptionId {
        let mut hasher = DefaultHasher::new();
        self.query.key().hash(&mut hasher);
        self.query.is_enabled().hash(&mut hasher);
        SubscriptionId::of::<Self>(hasher.finish())
    }
}
