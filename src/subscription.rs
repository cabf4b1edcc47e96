//! Long-lived event sources the view layer subscribes to.
//!
//! Queries are exposed as [`SubscriptionSource`]s: each call to
//! [`SubscriptionSource::stream`] starts an independent stream of results, and
//! [`SubscriptionId`] lets a view tell whether two sources describe the same
//! data so it can keep an existing stream instead of restarting it.

use std::any::TypeId;

use futures::StreamExt;
use futures::stream::BoxStream;

/// Identity of a subscription: the source type plus a hash of its parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId {
    type_id: TypeId,
    hash: u64,
}

impl SubscriptionId {
    pub fn of<T: 'static>(hash: u64) -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            hash,
        }
    }
}

/// A source of values that views can subscribe to.
pub trait SubscriptionSource: Send + 'static {
    type Output: Send + 'static;

    /// Starts a new stream of values.
    fn stream(&self) -> BoxStream<'static, Self::Output>;

    /// Identity used to deduplicate subscriptions.
    fn id(&self) -> SubscriptionId;
}

/// A type-erased subscription whose output can be mapped into a view's message type.
///
/// # Example
///
/// ```rust,ignore
/// use campus_board::subscription::Subscription;
///
/// let comments = Subscription::new(board.comments("P1")).map(Message::Comments);
/// ```
pub struct Subscription<T> {
    id: SubscriptionId,
    spawn: Box<dyn Fn() -> BoxStream<'static, T> + Send + Sync>,
}

impl<T: Send + 'static> Subscription<T> {
    pub fn new<S>(source: S) -> Self
    where
        S: SubscriptionSource<Output = T> + Sync,
    {
        Self {
            id: source.id(),
            spawn: Box::new(move || source.stream()),
        }
    }

    pub const fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Starts the underlying stream.
    pub fn stream(&self) -> BoxStream<'static, T> {
        (self.spawn)()
    }

    /// Converts every value produced by the subscription.
    pub fn map<U, F>(self, f: F) -> Subscription<U>
    where
        U: Send + 'static,
        F: Fn(T) -> U + Clone + Send + Sync + 'static,
    {
        let spawn = self.spawn;
        Subscription {
            id: self.id,
            spawn: Box::new(move || spawn().map(f.clone()).boxed()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    struct Numbers(Vec<i32>);

    impl SubscriptionSource for Numbers {
        type Output = i32;

        fn stream(&self) -> BoxStream<'static, i32> {
            stream::iter(self.0.clone()).boxed()
        }

        fn id(&self) -> SubscriptionId {
            SubscriptionId::of::<Self>(self.0.len() as u64)
        }
    }

    #[tokio::test]
    async fn test_map_preserves_id_and_converts() {
        let sub = Subscription::new(Numbers(vec![1, 2]));
        let id = sub.id();
        let mapped = sub.map(|n| n.to_string());

        assert_eq!(mapped.id(), id);
        let values: Vec<String> = mapped.stream().collect().await;
        assert_eq!(values, vec!["1", "2"]);
    }

    #[tokio::test]
    async fn test_each_stream_starts_fresh() {
        let sub = Subscription::new(Numbers(vec![7]));
        let first: Vec<i32> = sub.stream().collect().await;
        let second: Vec<i32> = sub.stream().collect().await;
        assert_eq!(first, second);
    }

    #[test]
    fn test_id_includes_type() {
        struct Other;
        assert_ne!(SubscriptionId::of::<Numbers>(1), SubscriptionId::of::<Other>(1));
    }
}
