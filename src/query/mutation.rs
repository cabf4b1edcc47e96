//! Server-side changes with optional optimistic cache patches.
//!
//! A [`Mutation`] wraps one write operation. Two hooks tie it to the cache:
//!
//! - `on_mutate` runs before the request and may return an
//!   [`OptimisticUpdate`] that is committed on success and rolled back on
//!   failure
//! - `on_success` runs after the server accepted the change, typically to
//!   invalidate the queries that depend on it
//!
//! ```rust,ignore
//! let recommend = Mutation::new(move |comment_id: String| {
//!     let api = api.clone();
//!     Box::pin(async move { api.toggle_comment_recommend(&comment_id).await })
//! })
//! .on_success(move |_, _| {
//!     client.invalidate_queries(&QueryKey::new("comments"));
//! });
//!
//! fn update(&mut self, msg: Message) -> Command<Message> {
//!     match msg {
//!         Message::Recommend(id) => self.recommend.mutate(id).map(Message::Recommended),
//!         Message::Recommended(_) => Command::none(),
//!     }
//! }
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use futures::future::BoxFuture;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::command::Command;

use super::error::QueryError;
use super::optimistic::OptimisticUpdate;

/// The state of a mutation result.
#[derive(Debug, Clone, PartialEq)]
pub enum MutationState<T> {
    /// Mutation is idle (not yet started).
    Idle,
    /// Mutation is in progress.
    Loading,
    /// Mutation succeeded with a result.
    Success(T),
    /// Mutation failed; the message is ready for display.
    Error(String),
}

/// A mutation result containing the current state.
#[derive(Debug, Clone, PartialEq)]
pub struct MutationResult<T> {
    /// The current state of the mutation.
    pub state: MutationState<T>,
}

impl<T> MutationResult<T> {
    /// Returns the result data if the mutation succeeded, otherwise `None`.
    pub const fn data(&self) -> Option<&T> {
        match &self.state {
            MutationState::Success(data) => Some(data),
            _ => None,
        }
    }

    /// Returns `true` if the mutation is currently loading.
    pub const fn is_loading(&self) -> bool {
        matches!(self.state, MutationState::Loading)
    }

    /// Returns `true` if the mutation succeeded.
    pub const fn is_success(&self) -> bool {
        matches!(self.state, MutationState::Success(_))
    }

    /// Returns `true` if the mutation failed.
    pub const fn is_error(&self) -> bool {
        matches!(self.state, MutationState::Error(_))
    }
}

type Mutator<I, O> = Arc<dyn Fn(I) -> BoxFuture<'static, Result<O, QueryError>> + Send + Sync>;
type OnMutate<I> = Arc<dyn Fn(&I) -> Option<OptimisticUpdate> + Send + Sync>;
type OnSuccess<I, O> = Arc<dyn Fn(&I, &O) + Send + Sync>;

/// A reusable server write with lifecycle state.
///
/// Cloning shares the pending counter and the state channel, so every clone
/// reports the same `is_pending` and `state`.
pub struct Mutation<I, O> {
    mutator: Mutator<I, O>,
    on_mutate: Option<OnMutate<I>>,
    on_success: Option<OnSuccess<I, O>>,
    state: Arc<watch::Sender<MutationState<O>>>,
    pending: Arc<AtomicUsize>,
}

impl<I, O> Clone for Mutation<I, O> {
    fn clone(&self) -> Self {
        Self {
            mutator: self.mutator.clone(),
            on_mutate: self.on_mutate.clone(),
            on_success: self.on_success.clone(),
            state: self.state.clone(),
            pending: self.pending.clone(),
        }
    }
}

/// Counts one running execution until dropped.
struct Pending(Arc<AtomicUsize>);

impl Pending {
    fn enter(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter.clone())
    }

    fn try_enter_alone(counter: &Arc<AtomicUsize>) -> Option<Self> {
        counter
            .compare_exchange(0, 1, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| Self(counter.clone()))
    }
}

impl Drop for Pending {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl<I, O> Mutation<I, O>
where
    I: Clone + Send + Sync + 'static,
    O: Clone + Send + Sync + 'static,
{
    /// Creates a mutation from the function performing the server call.
    pub fn new<F>(mutator: F) -> Self
    where
        F: Fn(I) -> BoxFuture<'static, Result<O, QueryError>> + Send + Sync + 'static,
    {
        let (state, _) = watch::channel(MutationState::Idle);
        Self {
            mutator: Arc::new(mutator),
            on_mutate: None,
            on_success: None,
            state: Arc::new(state),
            pending: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Sets the hook that prepares an optimistic update before the request.
    #[must_use]
    pub fn on_mutate<F>(mut self, hook: F) -> Self
    where
        F: Fn(&I) -> Option<OptimisticUpdate> + Send + Sync + 'static,
    {
        self.on_mutate = Some(Arc::new(hook));
        self
    }

    /// Sets the hook that runs after the server accepted the change.
    #[must_use]
    pub fn on_success<F>(mut self, hook: F) -> Self
    where
        F: Fn(&I, &O) + Send + Sync + 'static,
    {
        self.on_success = Some(Arc::new(hook));
        self
    }

    /// Returns `true` while any execution is running.
    pub fn is_pending(&self) -> bool {
        self.pending.load(Ordering::SeqCst) > 0
    }

    /// The state of the most recent execution.
    pub fn state(&self) -> MutationState<O> {
        self.state.borrow().clone()
    }

    pub fn result(&self) -> MutationResult<O> {
        MutationResult {
            state: self.state(),
        }
    }

    /// Watches state changes of this mutation.
    pub fn subscribe(&self) -> watch::Receiver<MutationState<O>> {
        self.state.subscribe()
    }

    /// Forgets the last outcome.
    pub fn reset(&self) {
        self.state.send_replace(MutationState::Idle);
    }

    /// Runs the mutation.
    ///
    /// An optimistic update from `on_mutate` is committed when the server
    /// call succeeds and rolled back before the error is returned otherwise.
    pub async fn execute(&self, input: I) -> Result<O, QueryError> {
        let pending = Pending::enter(&self.pending);
        self.run(input, pending).await
    }

    /// Runs the mutation unless an execution is already pending, in which
    /// case it fails with [`QueryError::Busy`] without queuing.
    pub async fn execute_exclusive(&self, input: I) -> Result<O, QueryError> {
        let Some(pending) = Pending::try_enter_alone(&self.pending) else {
            debug!("mutation already pending, rejecting submission");
            return Err(QueryError::Busy);
        };
        self.run(input, pending).await
    }

    /// Runs the mutation as a `Command` producing its result.
    ///
    /// The returned command produces `Result<O, QueryError>` which can be
    /// mapped to an application message with [`Command::map`].
    pub fn mutate(&self, input: I) -> Command<Result<O, QueryError>> {
        let mutation = self.clone();
        Command::future(async move { mutation.execute(input).await })
    }

    async fn run(&self, input: I, _pending: Pending) -> Result<O, QueryError> {
        self.state.send_replace(MutationState::Loading);
        // Declared before the update so a dropped execution rolls back first.
        let mut unsettled = Unsettled {
            state: &*self.state,
            armed: true,
        };
        let mut optimistic = self.on_mutate.as_ref().and_then(|hook| hook(&input));

        match (self.mutator)(input.clone()).await {
            Ok(output) => {
                if let Some(update) = optimistic.as_mut() {
                    update.commit();
                }
                if let Some(hook) = &self.on_success {
                    hook(&input, &output);
                }
                unsettled.armed = false;
                self.state.send_replace(MutationState::Success(output.clone()));
                Ok(output)
            }
            Err(err) => {
                if let Some(update) = optimistic.as_mut() {
                    update.rollback();
                }
                warn!(error = %err, "mutation failed");
                unsettled.armed = false;
                self.state.send_replace(MutationState::Error(err.message()));
                Err(err)
            }
        }
    }
}

/// Clears the `Loading` state of an execution dropped before it settled.
struct Unsettled<'a, O> {
    state: &'a watch::Sender<MutationState<O>>,
    armed: bool,
}

impl<O> Drop for Unsettled<'_, O> {
    fn drop(&mut self) {
        if self.armed {
            debug!("mutation dropped before settling");
            self.state.send_if_modified(|state| {
                let loading = matches!(state, MutationState::Loading);
                if loading {
                    *state = MutationState::Idle;
                }
                loading
            });
        }
    }
}
