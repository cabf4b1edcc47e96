//! Cached read operations exposed as subscriptions.
//!
//! A [`Query`] streams the state of one cache key:
//!
//! 1. If cached data exists it is emitted immediately, stale or not
//! 2. If the data is stale or missing a fetch runs (deduplicated per key)
//! 3. Every later change of the entry is emitted: refetches landing,
//!    optimistic patches, rollbacks, invalidations and failures
//!
//! Disabled queries (for example a post id that is still empty) emit
//! [`QueryState::Disabled`] once and never fetch.

use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::Arc;

use futures::StreamExt;
use futures::future::BoxFuture;
use futures::stream::{self, BoxStream};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;

use crate::subscription::{SubscriptionId, SubscriptionSource};

use super::client::{CacheEvent, QueryClient, QueryObserver};
use super::error::QueryError;
use super::key::QueryKey;

/// The state of a query result.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryState<T> {
    /// The query has no usable parameters and will not fetch.
    Disabled,
    /// Query is loading (no data yet).
    Loading,
    /// Query has data.
    Success {
        /// The data returned by the query.
        data: T,
        /// Whether the data is stale and a refetch is pending or running.
        is_stale: bool,
    },
    /// Query failed; the message is ready for display.
    Error(String),
}

/// A query result containing the current state.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryResult<T> {
    /// The current state of the query.
    pub state: QueryState<T>,
}

impl<T> QueryResult<T> {
    const fn from_state(state: QueryState<T>) -> Self {
        Self { state }
    }

    /// Returns the data if the query has any, otherwise `None`.
    pub const fn data(&self) -> Option<&T> {
        match &self.state {
            QueryState::Success { data, .. } => Some(data),
            _ => None,
        }
    }

    pub const fn is_disabled(&self) -> bool {
        matches!(self.state, QueryState::Disabled)
    }

    /// Returns `true` if the query is currently loading.
    pub const fn is_loading(&self) -> bool {
        matches!(self.state, QueryState::Loading)
    }

    /// Returns `true` if the query succeeded.
    pub const fn is_success(&self) -> bool {
        matches!(self.state, QueryState::Success { .. })
    }

    /// Returns `true` if the query failed.
    pub const fn is_error(&self) -> bool {
        matches!(self.state, QueryState::Error(_))
    }

    /// Returns `true` if the query data is stale.
    pub const fn is_stale(&self) -> bool {
        matches!(self.state, QueryState::Success { is_stale: true, .. })
    }
}

type Fetcher<V> = Arc<dyn Fn(Option<V>) -> BoxFuture<'static, Result<V, QueryError>> + Send + Sync>;

/// A query subscription that monitors and fetches one cache key.
///
/// # Example
///
/// ```rust,ignore
/// use campus_board::query::{Query, QueryClient, QueryKey};
/// use std::sync::Arc;
///
/// let client = Arc::new(QueryClient::new());
///
/// let query = Query::new(
///     QueryKey::new("post").with("42"),
///     move || Box::pin(fetch_post("42")),
///     client.clone(),
/// );
/// ```
pub struct Query<V> {
    key: QueryKey,
    fetcher: Fetcher<V>,
    client: Arc<QueryClient>,
    enabled: bool,
}

impl<V> Clone for Query<V> {
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
            fetcher: self.fetcher.clone(),
            client: self.client.clone(),
            enabled: self.enabled,
        }
    }
}

impl<V> Query<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Creates a new query with the given key, fetcher, and client.
    ///
    /// # Arguments
    ///
    /// * `key` - Identifies the cached value
    /// * `fetcher` - An async function that fetches the data
    /// * `client` - The query client for cache management
    pub fn new<F>(key: QueryKey, fetcher: F, client: Arc<QueryClient>) -> Self
    where
        F: Fn() -> BoxFuture<'static, Result<V, QueryError>> + Send + Sync + 'static,
    {
        Self::with_previous(key, move |_previous: Option<V>| fetcher(), client)
    }

    /// Creates a query whose fetcher receives the currently cached value.
    pub fn with_previous<F>(key: QueryKey, fetcher: F, client: Arc<QueryClient>) -> Self
    where
        F: Fn(Option<V>) -> BoxFuture<'static, Result<V, QueryError>> + Send + Sync + 'static,
    {
        Self {
            key,
            fetcher: Arc::new(fetcher),
            client,
            enabled: true,
        }
    }

    /// Enables or disables the query. A disabled query never fetches.
    #[must_use]
    pub const fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub const fn key(&self) -> &QueryKey {
        &self.key
    }

    pub fn client(&self) -> &Arc<QueryClient> {
        &self.client
    }

    /// Returns the cached data, if any.
    pub fn data(&self) -> Option<V> {
        self.client.get_query_data(&self.key)
    }

    /// Returns fresh cached data, or fetches it.
    pub async fn fetch(&self) -> Result<V, QueryError> {
        self.ensure_enabled()?;
        self.register();
        if let Some(entry) = self.client.get_entry::<V>(&self.key) {
            if !entry.is_stale {
                return Ok(entry.data);
            }
        }
        self.client.fetch(&self.key).await
    }

    /// Fetches regardless of freshness (joining a fetch already in flight).
    pub async fn refetch(&self) -> Result<V, QueryError> {
        self.ensure_enabled()?;
        self.register();
        self.client.fetch(&self.key).await
    }

    fn ensure_enabled(&self) -> Result<(), QueryError> {
        if self.enabled {
            Ok(())
        } else {
            Err(QueryError::FetchError(format!("query {} is disabled", self.key)))
        }
    }

    fn register(&self) {
        let fetcher = self.fetcher.clone();
        self.client
            .register_with_previous::<V, _>(self.key.clone(), move |previous| fetcher(previous));
    }
}

impl<V> SubscriptionSource for Query<V>
where
    V: Clone + Send + Sync + 'static,
{
    type Output = QueryResult<V>;

    fn stream(&self) -> BoxStream<'static, Self::Output> {
        if !self.enabled {
            return stream::once(async { QueryResult::from_state(QueryState::Disabled) }).boxed();
        }
        self.register();

        let key = self.key.clone();
        let client = self.client.clone();

        stream::unfold(State::Initial, move |state| {
            let key = key.clone();
            let client = client.clone();
            async move { advance::<V>(state, &key, &client).await }
        })
        .boxed()
    }

    fn id(&self) -> SubscriptionId {
        let mut hasher = DefaultHasher::new();
        self.hash(&mut hasher);
        SubscriptionId::of::<Self>(hasher.finish())
    }
}

impl<V> Hash for Query<V> {
    fn hash<H>(&self, hasher: &mut H)
    where
        H: Hasher,
    {
        self.key.hash(hasher);
        self.enabled.hash(hasher);
    }
}

/// What an active subscription holds between emissions.
struct Watch {
    rx: broadcast::Receiver<CacheEvent>,
    revision: Option<u64>,
    /// The failure of our own fetch was already emitted; skip its event.
    reported_failure: bool,
    _observer: QueryObserver,
}

/// Internal state machine for the Query subscription.
enum State {
    Initial,
    Fetching(Watch),
    Watching(Watch),
}

async fn advance<V>(
    mut state: State,
    key: &QueryKey,
    client: &QueryClient,
) -> Option<(QueryResult<V>, State)>
where
    V: Clone + Send + Sync + 'static,
{
    loop {
        state = match state {
            State::Initial => {
                // Subscribe before reading so no change is missed in between.
                let mut watch = Watch {
                    rx: client.subscribe(),
                    revision: None,
                    reported_failure: false,
                    _observer: client.observe(key),
                };
                let Some((mut cached, revision)) = client.read::<V>(key) else {
                    let result = QueryResult::from_state(QueryState::Loading);
                    return Some((result, State::Fetching(watch)));
                };
                watch.revision = Some(revision);
                let is_stale = cached.check_staleness(client.config().stale_time);
                let result = QueryResult::from_state(QueryState::Success {
                    data: cached.data,
                    is_stale,
                });
                let next = if is_stale {
                    State::Fetching(watch)
                } else {
                    State::Watching(watch)
                };
                return Some((result, next));
            }

            State::Fetching(mut watch) => match client.fetch::<V>(key).await {
                Ok(data) => {
                    watch.revision = client.read::<V>(key).map(|(_, revision)| revision);
                    let result = QueryResult::from_state(QueryState::Success {
                        data,
                        is_stale: false,
                    });
                    return Some((result, State::Watching(watch)));
                }
                // Nothing cached to show: start over instead of waiting forever.
                Err(QueryError::Cancelled) if client.read::<V>(key).is_none() => {
                    State::Fetching(watch)
                }
                // Cancelled for an optimistic patch; the patch arrives as an update.
                Err(QueryError::Cancelled) => State::Watching(watch),
                Err(err) => {
                    // Failures raised by the fetcher are also broadcast.
                    watch.reported_failure = !matches!(err, QueryError::FetchError(_));
                    let result = QueryResult::from_state(QueryState::Error(err.message()));
                    return Some((result, State::Watching(watch)));
                }
            },

            State::Watching(mut watch) => match watch.rx.recv().await {
                Ok(event) if event.key() != key => State::Watching(watch),
                Ok(CacheEvent::Updated(_)) | Err(RecvError::Lagged(_)) => {
                    match client.read::<V>(key) {
                        Some((entry, revision)) if watch.revision != Some(revision) => {
                            watch.revision = Some(revision);
                            let result = QueryResult::from_state(QueryState::Success {
                                data: entry.data,
                                is_stale: entry.is_stale,
                            });
                            return Some((result, State::Watching(watch)));
                        }
                        _ => State::Watching(watch),
                    }
                }
                Ok(CacheEvent::Invalidated(_)) => {
                    // The client refetches observed keys; show what we have meanwhile.
                    let state = match client.read::<V>(key) {
                        Some((entry, _)) => QueryState::Success {
                            data: entry.data,
                            is_stale: true,
                        },
                        None => QueryState::Loading,
                    };
                    return Some((QueryResult::from_state(state), State::Watching(watch)));
                }
                Ok(CacheEvent::Failed(_, _)) if watch.reported_failure => {
                    watch.reported_failure = false;
                    State::Watching(watch)
                }
                Ok(CacheEvent::Failed(_, err)) => {
                    let result = QueryResult::from_state(QueryState::Error(err.message()));
                    return Some((result, State::Watching(watch)));
                }
                Ok(CacheEvent::Removed(_)) => {
                    watch.revision = None;
                    let result = QueryResult::from_state(QueryState::Loading);
                    return Some((result, State::Fetching(watch)));
                }
                Err(RecvError::Closed) => return None,
            },
        };
    }
}
