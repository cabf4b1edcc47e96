//! The process-wide query cache.
//!
//! [`QueryClient`] owns every cached value, tracks in-flight fetches so each
//! key is fetched at most once at a time, and broadcasts [`CacheEvent`]s so
//! active queries can re-render. Nothing outside the client writes to the
//! cache; mutations go through [`QueryClient::set_query_data`],
//! [`QueryClient::patch_queries`] and [`QueryClient::restore`].

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use parking_lot::RwLock;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::command::Command;
use crate::config::QueryConfig;

use super::cache::{AnyValue, CacheEntry, Slot, Snapshot};
use super::error::QueryError;
use super::key::QueryKey;

/// Fetch function stored per key. It receives the value currently cached
/// under that key so paginated queries can refetch what was loaded.
pub(crate) type ErasedFetcher =
    Arc<dyn Fn(Option<AnyValue>) -> BoxFuture<'static, Result<AnyValue, QueryError>> + Send + Sync>;

pub(crate) type SharedFetch = Shared<BoxFuture<'static, Result<AnyValue, QueryError>>>;

/// Notification sent to every subscriber of a [`QueryClient`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheEvent {
    /// New data was written under the key (fetch, patch or rollback).
    Updated(QueryKey),
    /// The entry was marked stale.
    Invalidated(QueryKey),
    /// A background fetch for the key failed.
    Failed(QueryKey, QueryError),
    /// The entry was removed from the cache.
    Removed(QueryKey),
}

impl CacheEvent {
    pub const fn key(&self) -> &QueryKey {
        match self {
            Self::Updated(key) | Self::Invalidated(key) | Self::Removed(key) => key,
            Self::Failed(key, _) => key,
        }
    }
}

struct InFlight {
    id: u64,
    token: CancellationToken,
    shared: SharedFetch,
    refetch: Arc<AtomicBool>,
}

/// A client for managing the query cache, fetch deduplication and invalidation.
///
/// Cloning is cheap and every clone shares the same cache.
///
/// # Example
///
/// ```rust
/// use campus_board::config::QueryConfig;
/// use campus_board::query::QueryClient;
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// let config = QueryConfig::new(
///     Duration::from_secs(30),  // stale_time
///     Duration::from_secs(300), // cache_time
/// );
///
/// let client = Arc::new(QueryClient::with_config(config));
/// ```
#[derive(Clone)]
pub struct QueryClient {
    cache: Arc<RwLock<HashMap<QueryKey, Slot>>>,
    in_flight: Arc<DashMap<QueryKey, InFlight>>,
    fetchers: Arc<DashMap<QueryKey, ErasedFetcher>>,
    observers: Arc<DashMap<QueryKey, usize>>,
    events: broadcast::Sender<CacheEvent>,
    revision: Arc<AtomicU64>,
    config: QueryConfig,
}

impl fmt::Debug for QueryClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryClient")
            .field("entries", &self.cache.read().len())
            .field("in_flight", &self.in_flight.len())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl QueryClient {
    /// Creates a new query client with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(QueryConfig::default())
    }

    /// Creates a new query client with the given configuration.
    #[must_use]
    pub fn with_config(config: QueryConfig) -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            cache: Arc::new(RwLock::new(HashMap::new())),
            in_flight: Arc::new(DashMap::new()),
            fetchers: Arc::new(DashMap::new()),
            observers: Arc::new(DashMap::new()),
            events,
            revision: Arc::new(AtomicU64::new(0)),
            config,
        }
    }

    pub const fn config(&self) -> &QueryConfig {
        &self.config
    }

    /// Subscribes to cache notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
        self.events.subscribe()
    }

    fn next_revision(&self) -> u64 {
        self.revision.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn emit(&self, event: CacheEvent) {
        trace!(?event, "cache event");
        // No receivers simply means nothing is rendering right now.
        let _ = self.events.send(event);
    }

    // ---- reads -------------------------------------------------------------

    /// Returns the cached value for `key`, stale or not.
    pub fn get_query_data<V>(&self, key: &QueryKey) -> Option<V>
    where
        V: Clone + Send + Sync + 'static,
    {
        self.get_entry::<V>(key).map(|entry| entry.data)
    }

    /// Returns the cached entry for `key` with its staleness evaluated against
    /// the configured stale time.
    pub fn get_entry<V>(&self, key: &QueryKey) -> Option<CacheEntry<V>>
    where
        V: Clone + Send + Sync + 'static,
    {
        self.read::<V>(key).map(|(mut entry, _)| {
            entry.check_staleness(self.config.stale_time);
            entry
        })
    }

    /// Typed read returning the revision the entry was written at. The stale
    /// flag is the explicit one set by invalidation.
    pub(crate) fn read<V>(&self, key: &QueryKey) -> Option<(CacheEntry<V>, u64)>
    where
        V: Clone + Send + Sync + 'static,
    {
        let cache = self.cache.read();
        let slot = cache.get(key)?;
        let entry = slot.downcast::<V>()?;
        Some((entry, slot.revision))
    }

    /// Returns `Some(true)` if the entry exists and is stale.
    pub fn is_stale(&self, key: &QueryKey) -> Option<bool> {
        let cache = self.cache.read();
        cache.get(key).map(|slot| {
            slot.entry.is_stale || slot.entry.timestamp.elapsed() >= self.config.stale_time
        })
    }

    /// Returns the explicit stale flag, ignoring the stale time.
    pub fn is_invalidated(&self, key: &QueryKey) -> Option<bool> {
        self.cache.read().get(key).map(|slot| slot.entry.is_stale)
    }

    /// All cached keys matching `filter`, sorted.
    pub fn keys(&self, filter: &QueryKey) -> Vec<QueryKey> {
        let mut keys: Vec<QueryKey> = self
            .cache
            .read()
            .keys()
            .filter(|key| filter.matches(key))
            .cloned()
            .collect();
        keys.sort();
        keys
    }

    // ---- writes ------------------------------------------------------------

    /// Stores `data` under `key` as fresh data and notifies subscribers.
    pub fn set_query_data<V>(&self, key: QueryKey, data: V)
    where
        V: Send + Sync + 'static,
    {
        let revision = self.next_revision();
        self.cache
            .write()
            .insert(key.clone(), Slot::new(Arc::new(data), revision));
        self.emit(CacheEvent::Updated(key));
    }

    /// Applies `update` to the cached value under `key`.
    ///
    /// The entry keeps its timestamp and stale flag. Returns `false` when the
    /// key is absent, holds another type, or `update` reports no change.
    pub fn update_query_data<V, F>(&self, key: &QueryKey, update: F) -> bool
    where
        V: Clone + Send + Sync + 'static,
        F: FnOnce(&mut V) -> bool,
    {
        let changed = {
            let mut cache = self.cache.write();
            let Some(slot) = cache.get_mut(key) else {
                return false;
            };
            let Some(current) = slot.entry.data.downcast_ref::<V>() else {
                return false;
            };
            let mut next = current.clone();
            if update(&mut next) {
                slot.entry.data = Arc::new(next);
                slot.revision = self.next_revision();
                true
            } else {
                false
            }
        };
        if changed {
            self.emit(CacheEvent::Updated(key.clone()));
        }
        changed
    }

    /// Applies `patch` to every entry matching any of `filters` that holds a `V`.
    ///
    /// All entries are patched under one write lock and subscribers are only
    /// notified afterwards, so no reader sees a partially applied patch. An
    /// in-flight fetch of a patched entry is cancelled under the same lock;
    /// fetches of entries the patch leaves alone keep running. The returned
    /// snapshot holds the previous state of every entry that changed.
    pub fn patch_queries<V, F>(&self, filters: &[QueryKey], mut patch: F) -> Snapshot
    where
        V: Clone + Send + Sync + 'static,
        F: FnMut(&mut V) -> bool,
    {
        let mut snapshot = Snapshot::default();
        let mut touched = Vec::new();
        {
            let mut cache = self.cache.write();
            for (key, slot) in cache.iter_mut() {
                if !filters.iter().any(|filter| filter.matches(key)) {
                    continue;
                }
                let Some(current) = slot.entry.data.downcast_ref::<V>() else {
                    continue;
                };
                let mut next = current.clone();
                if !patch(&mut next) {
                    continue;
                }
                snapshot.record(key, slot);
                slot.entry.data = Arc::new(next);
                slot.revision = self.next_revision();
                if let Some((_, flight)) = self.in_flight.remove(key) {
                    debug!(%key, "cancelled fetch of patched entry");
                    flight.token.cancel();
                }
                touched.push(key.clone());
            }
        }
        debug!(patched = touched.len(), "applied cache patch");
        for key in touched {
            self.emit(CacheEvent::Updated(key));
        }
        snapshot
    }

    /// Puts every entry captured in `snapshot` back exactly as it was.
    pub fn restore(&self, snapshot: Snapshot) {
        let entries = snapshot.into_entries();
        let mut restored = Vec::with_capacity(entries.len());
        {
            let mut cache = self.cache.write();
            for (key, mut slot) in entries {
                slot.revision = self.next_revision();
                cache.insert(key.clone(), slot);
                restored.push(key);
            }
        }
        debug!(restored = restored.len(), "restored cache snapshot");
        for key in restored {
            self.emit(CacheEvent::Updated(key));
        }
    }

    /// Removes every entry matching `filter`. Returns the number removed.
    pub fn remove_queries(&self, filter: &QueryKey) -> usize {
        let removed: Vec<QueryKey> = {
            let mut cache = self.cache.write();
            let keys: Vec<QueryKey> = cache
                .keys()
                .filter(|key| filter.matches(key))
                .cloned()
                .collect();
            for key in &keys {
                cache.remove(key);
            }
            keys
        };
        for key in &removed {
            self.emit(CacheEvent::Removed(key.clone()));
        }
        removed.len()
    }

    /// Drops unobserved, idle entries older than the configured cache time.
    pub fn collect_garbage(&self) -> usize {
        let cache_time = self.config.cache_time;
        let expired: Vec<QueryKey> = {
            let mut cache = self.cache.write();
            let keys: Vec<QueryKey> = cache
                .iter()
                .filter(|(key, slot)| {
                    slot.entry.should_gc(cache_time)
                        && self.observer_count(key) == 0
                        && !self.in_flight.contains_key(*key)
                })
                .map(|(key, _)| key.clone())
                .collect();
            for key in &keys {
                cache.remove(key);
                self.fetchers.remove(key);
            }
            keys
        };
        if !expired.is_empty() {
            debug!(collected = expired.len(), "garbage collected cache entries");
        }
        for key in &expired {
            self.emit(CacheEvent::Removed(key.clone()));
        }
        expired.len()
    }

    // ---- observers ---------------------------------------------------------

    /// Registers interest in `key` until the returned guard is dropped.
    ///
    /// Only observed keys are refetched when invalidated; unobserved ones are
    /// just marked stale and refetched on next use.
    pub fn observe(&self, key: &QueryKey) -> QueryObserver {
        *self.observers.entry(key.clone()).or_insert(0) += 1;
        QueryObserver {
            client: self.clone(),
            key: key.clone(),
        }
    }

    pub fn observer_count(&self, key: &QueryKey) -> usize {
        self.observers.get(key).map_or(0, |count| *count)
    }

    // ---- fetching ----------------------------------------------------------

    /// Registers the fetch function used whenever `key` has to be (re)fetched.
    pub fn register<V, F>(&self, key: QueryKey, fetcher: F)
    where
        V: Clone + Send + Sync + 'static,
        F: Fn() -> BoxFuture<'static, Result<V, QueryError>> + Send + Sync + 'static,
    {
        self.register_with_previous::<V, _>(key, move |_previous: Option<V>| fetcher());
    }

    /// Like [`register`](Self::register), but the fetcher receives the value
    /// currently cached under the key.
    pub fn register_with_previous<V, F>(&self, key: QueryKey, fetcher: F)
    where
        V: Clone + Send + Sync + 'static,
        F: Fn(Option<V>) -> BoxFuture<'static, Result<V, QueryError>> + Send + Sync + 'static,
    {
        let erased: ErasedFetcher = Arc::new(move |previous: Option<AnyValue>| {
            let previous = previous.and_then(|value| value.downcast_ref::<V>().cloned());
            fetcher(previous)
                .map(|result| result.map(|value| Arc::new(value) as AnyValue))
                .boxed()
        });
        self.fetchers.insert(key, erased);
    }

    pub fn is_registered(&self, key: &QueryKey) -> bool {
        self.fetchers.contains_key(key)
    }

    pub fn is_fetching(&self, key: &QueryKey) -> bool {
        self.in_flight.contains_key(key)
    }

    /// Fetches `key` with its registered fetcher and stores the result.
    ///
    /// If a fetch for the key is already in flight the caller attaches to it
    /// instead of issuing another request.
    pub async fn fetch<V>(&self, key: &QueryKey) -> Result<V, QueryError>
    where
        V: Clone + Send + Sync + 'static,
    {
        let shared = self.start_fetch(key, false).ok_or_else(|| {
            QueryError::FetchError(format!("no fetcher registered for {key}"))
        })?;
        let value = shared.await?;
        downcast_value(key, &value)
    }

    /// Registers `fetcher` for `key`, then returns fresh cached data or fetches.
    pub async fn fetch_query<V, F>(&self, key: &QueryKey, fetcher: F) -> Result<V, QueryError>
    where
        V: Clone + Send + Sync + 'static,
        F: Fn() -> BoxFuture<'static, Result<V, QueryError>> + Send + Sync + 'static,
    {
        self.register(key.clone(), fetcher);
        if let Some(entry) = self.get_entry::<V>(key) {
            if !entry.is_stale {
                return Ok(entry.data);
            }
        }
        self.fetch(key).await
    }

    /// Starts (or joins) a cache-writing fetch for `key`.
    fn start_fetch(&self, key: &QueryKey, follow_up: bool) -> Option<SharedFetch> {
        let fetcher = self.fetchers.get(key).map(|f| f.value().clone())?;
        let previous = self.cache.read().get(key).map(|slot| slot.entry.data.clone());
        let client = self.clone();
        let task_key = key.clone();
        Some(self.dedupe(key, follow_up, move |token| {
            async move {
                match fetcher(previous).await {
                    Ok(value) => client.store_fetched(&task_key, value, &token),
                    Err(QueryError::Cancelled) => Err(QueryError::Cancelled),
                    Err(err) => {
                        warn!(key = %task_key, error = %err, "query fetch failed");
                        client.emit(CacheEvent::Failed(task_key.clone(), err.clone()));
                        Err(err)
                    }
                }
            }
            .boxed()
        }))
    }

    /// Runs `work` as the single in-flight request for `key`.
    ///
    /// Concurrent callers share the pending result. With `follow_up` set, a
    /// caller that finds a fetch already running asks for one more fetch once
    /// it resolves instead of dropping the running one.
    pub(crate) fn dedupe<W>(&self, key: &QueryKey, follow_up: bool, work: W) -> SharedFetch
    where
        W: FnOnce(CancellationToken) -> BoxFuture<'static, Result<AnyValue, QueryError>>,
    {
        match self.in_flight.entry(key.clone()) {
            Entry::Occupied(occupied) => {
                let flight = occupied.get();
                if follow_up {
                    flight.refetch.store(true, Ordering::Release);
                    debug!(%key, "fetch in flight, scheduling follow-up refetch");
                } else {
                    debug!(%key, "joining in-flight fetch");
                }
                flight.shared.clone()
            }
            Entry::Vacant(vacant) => {
                let id = self.next_revision();
                let token = CancellationToken::new();
                let refetch = Arc::new(AtomicBool::new(false));
                let fut = work(token.clone());

                let client = self.clone();
                let task_key = key.clone();
                let task_token = token.clone();
                let task_refetch = refetch.clone();
                let handle = tokio::spawn(async move {
                    let result = tokio::select! {
                        biased;
                        () = task_token.cancelled() => Err(QueryError::Cancelled),
                        result = fut => result,
                    };
                    client
                        .in_flight
                        .remove_if(&task_key, |_, flight| flight.id == id);
                    if task_refetch.load(Ordering::Acquire) && !task_token.is_cancelled() {
                        debug!(key = %task_key, "running follow-up refetch");
                        client.refetch(&task_key);
                    }
                    result
                });

                let shared = async move {
                    handle
                        .await
                        .unwrap_or_else(|err| Err(QueryError::FetchError(err.to_string())))
                }
                .boxed()
                .shared();

                trace!(%key, "started fetch");
                vacant.insert(InFlight {
                    id,
                    token,
                    shared: shared.clone(),
                    refetch,
                });
                shared
            }
        }
    }

    fn store_fetched(
        &self,
        key: &QueryKey,
        value: AnyValue,
        token: &CancellationToken,
    ) -> Result<AnyValue, QueryError> {
        {
            let mut cache = self.cache.write();
            // Checked under the lock so a cancelled fetch cannot land after an
            // optimistic patch has been applied.
            if token.is_cancelled() {
                return Err(QueryError::Cancelled);
            }
            // Invalidated while in flight: the value predates the change, so
            // it lands stale and the follow-up refetch replaces it.
            let invalidated = self
                .in_flight
                .get(key)
                .is_some_and(|flight| flight.refetch.load(Ordering::Acquire));
            let mut slot = Slot::new(value.clone(), self.next_revision());
            if invalidated {
                slot.entry.mark_stale();
            }
            cache.insert(key.clone(), slot);
        }
        self.emit(CacheEvent::Updated(key.clone()));
        Ok(value)
    }

    /// Fetches `key` in the background, or marks the running fetch for a
    /// follow-up refetch.
    fn refetch(&self, key: &QueryKey) {
        if self.start_fetch(key, true).is_none() {
            trace!(%key, "no fetcher registered, skipping refetch");
        }
    }

    // ---- invalidation ------------------------------------------------------

    /// Marks every entry matching `filter` stale and refetches observed ones.
    ///
    /// A matching fetch that is already in flight is kept, and a follow-up
    /// refetch runs once it resolves, observed or not. Returns the number of
    /// keys affected. Refetches are spawned, so this must run inside a Tokio
    /// runtime when any matching key is observed or being fetched.
    pub fn invalidate_queries(&self, filter: &QueryKey) -> usize {
        let mut keys: Vec<QueryKey> = {
            let mut cache = self.cache.write();
            // Flagged under the cache lock so a landing fetch sees either the
            // flag or the stale mark below, never neither.
            for flight in self.in_flight.iter() {
                if filter.matches(flight.key()) {
                    flight.refetch.store(true, Ordering::Release);
                    debug!(key = %flight.key(), "fetch in flight, scheduling follow-up refetch");
                }
            }
            cache
                .iter_mut()
                .filter(|(key, _)| filter.matches(key))
                .map(|(key, slot)| {
                    slot.entry.mark_stale();
                    key.clone()
                })
                .collect()
        };
        // Observed keys without data (first fetch failed or still loading).
        for observed in self.observers.iter() {
            if filter.matches(observed.key()) && !keys.contains(observed.key()) {
                keys.push(observed.key().clone());
            }
        }
        debug!(%filter, affected = keys.len(), "invalidating queries");

        for key in &keys {
            self.emit(CacheEvent::Invalidated(key.clone()));
        }
        for key in &keys {
            if self.observer_count(key) > 0 {
                self.refetch(key);
            }
        }
        keys.len()
    }

    /// Invalidates the cache for the given filter, as a `Command`.
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// fn update(&mut self, msg: Message) -> Command<Message> {
    ///     match msg {
    ///         Message::CommentCreated(comment) => self
    ///             .query_client
    ///             .invalidate(&QueryKey::new("comments").with(comment.post_id)),
    ///     }
    /// }
    /// ```
    pub fn invalidate<Msg>(&self, filter: &QueryKey) -> Command<Msg>
    where
        Msg: Send + 'static,
    {
        let client = self.clone();
        let filter = filter.clone();
        Command::effect(async move {
            client.invalidate_queries(&filter);
        })
    }

    /// Cancels in-flight fetches matching `filter`. Their results are dropped.
    pub fn cancel_queries(&self, filter: &QueryKey) -> usize {
        // Holding the cache lock keeps a finishing fetch from storing between
        // the cancellation and the caller's next write.
        let _cache = self.cache.write();
        let keys: Vec<QueryKey> = self
            .in_flight
            .iter()
            .filter(|flight| filter.matches(flight.key()))
            .map(|flight| flight.key().clone())
            .collect();
        for key in &keys {
            if let Some((_, flight)) = self.in_flight.remove(key) {
                flight.token.cancel();
            }
        }
        if !keys.is_empty() {
            debug!(%filter, cancelled = keys.len(), "cancelled in-flight fetches");
        }
        keys.len()
    }
}

impl Default for QueryClient {
    fn default() -> Self {
        Self::new()
    }
}

/// Keeps a key observed while alive. See [`QueryClient::observe`].
#[must_use = "the key stops being observed when the guard is dropped"]
pub struct QueryObserver {
    client: QueryClient,
    key: QueryKey,
}

impl QueryObserver {
    pub const fn key(&self) -> &QueryKey {
        &self.key
    }
}

impl fmt::Debug for QueryObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryObserver").field("key", &self.key).finish()
    }
}

impl Drop for QueryObserver {
    fn drop(&mut self) {
        if let Some(mut count) = self.client.observers.get_mut(&self.key) {
            *count = count.saturating_sub(1);
        }
        self.client
            .observers
            .remove_if(&self.key, |_, count| *count == 0);
    }
}

pub(crate) fn downcast_value<V>(key: &QueryKey, value: &AnyValue) -> Result<V, QueryError>
where
    V: Clone + 'static,
{
    value
        .downcast_ref::<V>()
        .cloned()
        .ok_or_else(|| QueryError::FetchError(format!("cached value for {key} has an unexpected type")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    fn counting_fetcher(
        calls: Arc<AtomicUsize>,
        value: i32,
    ) -> impl Fn() -> BoxFuture<'static, Result<i32, QueryError>> + Send + Sync + 'static {
        move || {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                Ok(value)
            }
            .boxed()
        }
    }

    #[test]
    fn test_query_client_new() {
        let client = QueryClient::new();
        assert!(client.keys(&QueryKey::new("posts")).is_empty());
        assert_eq!(client.config().stale_time, Duration::from_secs(0));
    }

    #[test]
    fn test_query_client_with_config() {
        let config = QueryConfig::new(Duration::from_secs(30), Duration::from_secs(300));
        let client = QueryClient::with_config(config);
        assert_eq!(client.config().stale_time, Duration::from_secs(30));
        assert_eq!(client.config().cache_time, Duration::from_secs(300));
    }

    #[test]
    fn test_query_client_cache_operations() {
        let client = QueryClient::new();
        let key = QueryKey::from(["post", "1"]);

        assert!(client.get_query_data::<i32>(&key).is_none());

        client.set_query_data(key.clone(), 42);
        assert_eq!(client.get_query_data::<i32>(&key), Some(42));

        // Wrong type reads as absent
        assert!(client.get_query_data::<String>(&key).is_none());
    }

    #[test]
    fn test_update_query_data() {
        let client = QueryClient::new();
        let key = QueryKey::from(["post", "1"]);
        assert!(!client.update_query_data::<i32, _>(&key, |_| true));

        client.set_query_data(key.clone(), 1);
        assert!(client.update_query_data::<i32, _>(&key, |n| {
            *n += 1;
            true
        }));
        assert_eq!(client.get_query_data::<i32>(&key), Some(2));
        assert!(!client.update_query_data::<i32, _>(&key, |_| false));
    }

    #[tokio::test]
    async fn test_concurrent_fetches_share_one_request() {
        let client = QueryClient::new();
        let key = QueryKey::from(["replies", "C1"]);
        let calls = Arc::new(AtomicUsize::new(0));
        client.register(key.clone(), counting_fetcher(calls.clone(), 7));

        let (a, b) = tokio::join!(client.fetch::<i32>(&key), client.fetch::<i32>(&key));

        assert_eq!(a, Ok(7));
        assert_eq!(b, Ok(7));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(client.get_query_data::<i32>(&key), Some(7));
        assert!(!client.is_fetching(&key));
    }

    #[tokio::test]
    async fn test_fetch_without_fetcher_fails() {
        let client = QueryClient::new();
        let result = client.fetch::<i32>(&QueryKey::new("nothing")).await;
        assert!(matches!(result, Err(QueryError::FetchError(_))));
    }

    #[tokio::test]
    async fn test_fetch_query_serves_fresh_cache() {
        let config = QueryConfig::new(Duration::from_secs(60), Duration::from_secs(300));
        let client = QueryClient::with_config(config);
        let key = QueryKey::from(["post", "1"]);
        let calls = Arc::new(AtomicUsize::new(0));

        let first = client
            .fetch_query(&key, counting_fetcher(calls.clone(), 1))
            .await;
        let second = client
            .fetch_query(&key, counting_fetcher(calls.clone(), 2))
            .await;

        assert_eq!(first, Ok(1));
        assert_eq!(second, Ok(1));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_invalidate_marks_stale_without_observers() {
        let config = QueryConfig::new(Duration::from_secs(60), Duration::from_secs(300));
        let client = QueryClient::with_config(config);
        let calls = Arc::new(AtomicUsize::new(0));
        let key = QueryKey::from(["comments", "P1"]);
        client.register(key.clone(), counting_fetcher(calls.clone(), 1));
        client.set_query_data(key.clone(), 0);

        let affected = client.invalidate_queries(&QueryKey::new("comments"));

        assert_eq!(affected, 1);
        assert_eq!(client.is_invalidated(&key), Some(true));
        assert!(!client.is_fetching(&key));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_invalidate_refetches_observed_keys() {
        let client = QueryClient::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let key = QueryKey::from(["comments", "P1"]);
        client.register(key.clone(), counting_fetcher(calls.clone(), 5));
        client.set_query_data(key.clone(), 0);
        let _observer = client.observe(&key);
        let mut events = client.subscribe();

        client.invalidate_queries(&QueryKey::new("comments"));
        assert!(client.is_fetching(&key));

        assert_eq!(
            events.recv().await.expect("event"),
            CacheEvent::Invalidated(key.clone())
        );
        assert_eq!(
            events.recv().await.expect("event"),
            CacheEvent::Updated(key.clone())
        );
        assert_eq!(client.get_query_data::<i32>(&key), Some(5));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_invalidate_during_fetch_schedules_follow_up() {
        let client = QueryClient::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let key = QueryKey::from(["post", "1"]);
        client.register(key.clone(), counting_fetcher(calls.clone(), 3));
        let _observer = client.observe(&key);

        let first = client.fetch::<i32>(&key);
        let invalidate = async {
            tokio::time::sleep(Duration::from_millis(5)).await;
            client.invalidate_queries(&key);
        };
        let (result, ()) = tokio::join!(first, invalidate);
        assert_eq!(result, Ok(3));

        // The running fetch was kept and a second one follows it.
        tokio::time::timeout(Duration::from_secs(1), async {
            while calls.load(Ordering::SeqCst) < 2 || client.is_fetching(&key) {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("follow-up refetch should run");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_invalidate_during_unobserved_fetch_is_not_lost() {
        let config = QueryConfig::new(Duration::from_secs(60), Duration::from_secs(300));
        let client = QueryClient::with_config(config);
        let calls = Arc::new(AtomicUsize::new(0));
        let key = QueryKey::from(["post", "P1"]);
        let fetcher = move || {
            let calls = calls.clone();
            async move {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(50)).await;
                Ok(n)
            }
            .boxed()
        };
        client.register(key.clone(), fetcher.clone());

        let first = client.fetch::<usize>(&key);
        let invalidate = async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            client.invalidate_queries(&QueryKey::new("post"));
        };
        let (result, ()) = tokio::join!(first, invalidate);

        assert_eq!(result, Ok(0));
        assert_eq!(client.is_invalidated(&key), Some(true));
        // The follow-up is already running; a new reader joins it.
        assert_eq!(client.fetch_query(&key, fetcher).await, Ok(1));
        assert_eq!(client.is_invalidated(&key), Some(false));
    }

    #[tokio::test]
    async fn test_patch_leaves_unrelated_fetches_running() {
        let client = QueryClient::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let patched = QueryKey::from(["replies", "C1"]);
        let loading = QueryKey::from(["replies", "C2"]);
        client.set_query_data(patched.clone(), vec![1]);
        client.register(patched.clone(), || {
            async {
                tokio::time::sleep(Duration::from_millis(50)).await;
                Ok(vec![0])
            }
            .boxed()
        });
        client.register(loading.clone(), move || {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                Ok(vec![7])
            }
            .boxed()
        });

        let slow = client.fetch::<Vec<i32>>(&patched);
        let first_load = client.fetch::<Vec<i32>>(&loading);
        let patch = async {
            tokio::time::sleep(Duration::from_millis(5)).await;
            client.patch_queries::<Vec<i32>, _>(&[QueryKey::new("replies")], |values| {
                values.push(2);
                true
            })
        };
        let (slow, first_load, snapshot) = tokio::join!(slow, first_load, patch);

        assert_eq!(snapshot.len(), 1);
        assert_eq!(first_load, Ok(vec![7]));
        assert_eq!(client.get_query_data::<Vec<i32>>(&loading), Some(vec![7]));
        assert_eq!(slow, Err(QueryError::Cancelled));
        assert_eq!(client.get_query_data::<Vec<i32>>(&patched), Some(vec![1, 2]));
    }

    #[tokio::test]
    async fn test_cancelled_fetch_does_not_write() {
        let client = QueryClient::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let key = QueryKey::from(["comments", "P1"]);
        client.register(key.clone(), counting_fetcher(calls, 9));
        client.set_query_data(key.clone(), 1);

        let fetch = client.fetch::<i32>(&key);
        let cancel = async {
            tokio::time::sleep(Duration::from_millis(5)).await;
            client.cancel_queries(&QueryKey::new("comments"))
        };
        let (result, cancelled) = tokio::join!(fetch, cancel);

        assert_eq!(cancelled, 1);
        assert_eq!(result, Err(QueryError::Cancelled));
        assert_eq!(client.get_query_data::<i32>(&key), Some(1));
    }

    #[test]
    fn test_patch_and_restore_round_trip() {
        let client = QueryClient::new();
        let comments = QueryKey::from(["comments", "P1"]);
        let replies = QueryKey::from(["replies", "C1"]);
        let other = QueryKey::from(["post", "P1"]);
        client.set_query_data(comments.clone(), vec![1, 2]);
        client.set_query_data(replies.clone(), vec![3]);
        client.set_query_data(other.clone(), vec![4]);

        let snapshot = client.patch_queries::<Vec<i32>, _>(
            &[QueryKey::new("comments"), QueryKey::new("replies")],
            |values| {
                values.iter_mut().for_each(|v| *v *= 10);
                true
            },
        );

        assert_eq!(snapshot.len(), 2);
        assert_eq!(client.get_query_data::<Vec<i32>>(&comments), Some(vec![10, 20]));
        assert_eq!(client.get_query_data::<Vec<i32>>(&replies), Some(vec![30]));
        assert_eq!(client.get_query_data::<Vec<i32>>(&other), Some(vec![4]));

        client.restore(snapshot);
        assert_eq!(client.get_query_data::<Vec<i32>>(&comments), Some(vec![1, 2]));
        assert_eq!(client.get_query_data::<Vec<i32>>(&replies), Some(vec![3]));
    }

    #[test]
    fn test_observer_guard_counts() {
        let client = QueryClient::new();
        let key = QueryKey::from(["post", "1"]);
        let first = client.observe(&key);
        let second = client.observe(&key);
        assert_eq!(client.observer_count(&key), 2);
        drop(first);
        assert_eq!(client.observer_count(&key), 1);
        drop(second);
        assert_eq!(client.observer_count(&key), 0);
    }

    #[test]
    fn test_collect_garbage_skips_observed_entries() {
        let config = QueryConfig::new(Duration::ZERO, Duration::ZERO);
        let client = QueryClient::with_config(config);
        let kept = QueryKey::from(["post", "1"]);
        let dropped = QueryKey::from(["post", "2"]);
        client.set_query_data(kept.clone(), 1);
        client.set_query_data(dropped.clone(), 2);
        let _observer = client.observe(&kept);

        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(client.collect_garbage(), 1);
        assert_eq!(client.get_query_data::<i32>(&kept), Some(1));
        assert_eq!(client.get_query_data::<i32>(&dropped), None);
    }

    #[test]
    fn test_remove_queries() {
        let client = QueryClient::new();
        client.set_query_data(QueryKey::from(["posts", ""]), 1);
        client.set_query_data(QueryKey::from(["posts", "exam"]), 2);
        client.set_query_data(QueryKey::from(["post", "1"]), 3);

        assert_eq!(client.remove_queries(&QueryKey::new("posts")), 2);
        assert_eq!(client.keys(&QueryKey::new("post")).len(), 1);
    }

    #[tokio::test]
    async fn test_invalidate_command_execution() {
        use futures::StreamExt;

        let client = QueryClient::new();
        let key = QueryKey::from(["post", "1"]);
        client.set_query_data(key.clone(), 1);

        let cmd: Command<()> = client.invalidate(&key);
        let messages: Vec<()> = cmd.into_stream().collect().await;

        assert!(messages.is_empty(), "invalidate should not produce any messages");
        assert_eq!(client.is_invalidated(&key), Some(true));
    }
}
