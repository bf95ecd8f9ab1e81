//! Observable state streams.
//!
//! A [`StateStream`] holds the current value of one collection or record and
//! hands every new value to its subscribers in emission order. Streams are
//! independent: there is no ordering between two different streams.

use futures::Stream;
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tokio_stream::wrappers::WatchStream;

/// Emissions buffered per subscriber before it is considered lagging.
const CHANGE_BUFFER: usize = 256;

struct Shared<T> {
    current: watch::Sender<T>,
    changes: broadcast::Sender<T>,
}

/// Replace-and-notify holder of a current value.
///
/// Cloning a stream yields another handle onto the same value.
pub struct StateStream<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for StateStream<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: Clone + Send + Sync + 'static> StateStream<T> {
    pub fn new(initial: T) -> Self {
        let (current, _) = watch::channel(initial);
        let (changes, _) = broadcast::channel(CHANGE_BUFFER);
        Self {
            shared: Arc::new(Shared { current, changes }),
        }
    }

    /// Clone of the current value.
    pub fn get(&self) -> T {
        self.shared.current.borrow().clone()
    }

    /// Read the current value without cloning it.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.shared.current.borrow())
    }

    /// Replace the current value and notify subscribers.
    pub fn set(&self, value: T) {
        self.shared.current.send_replace(value.clone());
        // No receivers is fine: nobody is listening yet
        let _ = self.shared.changes.send(value);
    }

    /// Read the current value, compute a replacement and publish it.
    ///
    /// Returns the published value.
    pub fn update(&self, f: impl FnOnce(&T) -> T) -> T {
        let mut published = None;
        self.shared.current.send_modify(|value| {
            let next = f(value);
            *value = next.clone();
            published = Some(next);
        });
        // send_modify always runs the closure
        let published = published.unwrap_or_else(|| self.get());
        let _ = self.shared.changes.send(published.clone());
        published
    }

    /// Subscribe to every value published from now on.
    pub fn subscribe(&self) -> Subscription<T> {
        Subscription {
            changes: self.shared.changes.subscribe(),
            current: self.shared.current.subscribe(),
        }
    }

    /// Latest-value stream: yields the current value first, then only the
    /// newest value whenever the consumer catches up.
    pub fn latest(&self) -> impl Stream<Item = T> + Unpin {
        WatchStream::new(self.shared.current.subscribe())
    }

    /// Wait until the current value satisfies `done`, then return it.
    pub async fn wait_until(&self, done: impl Fn(&T) -> bool) -> T {
        let mut current = self.shared.current.subscribe();
        // Bound to a local so the borrowed value is released before `current` drops
        #[allow(clippy::let_and_return)]
        let found = match current.wait_for(|value| done(value)).await {
            Ok(value) => value.clone(),
            // The sender lives in `self`, so the channel cannot close here
            Err(_) => self.get(),
        };
        found
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.shared.changes.receiver_count()
    }
}

impl<T: Clone + Send + Sync + Default + 'static> Default for StateStream<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: Clone + Send + Sync + std::fmt::Debug + 'static> std::fmt::Debug for StateStream<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateStream")
            .field("current", &*self.shared.current.borrow())
            .finish()
    }
}

/// Receiving side of a [`StateStream`].
pub struct Subscription<T> {
    changes: broadcast::Receiver<T>,
    current: watch::Receiver<T>,
}

impl<T: Clone + Send + Sync + 'static> Subscription<T> {
    /// Current value of the stream.
    pub fn current(&self) -> T {
        self.current.borrow().clone()
    }

    /// Wait for the next published value.
    ///
    /// A subscriber that fell behind skips to the newest value. Returns
    /// `None` once every handle to the stream has been dropped.
    pub async fn next(&mut self) -> Option<T> {
        match self.changes.recv().await {
            Ok(value) => Some(value),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::debug!(skipped, "Subscriber lagged, resyncing to latest value");
                self.changes = self.changes.resubscribe();
                Some(self.current())
            }
            Err(broadcast::error::RecvError::Closed) => None,
        }
    }

    /// Next value if one is already waiting.
    pub fn try_next(&mut self) -> Option<T> {
        match self.changes.try_recv() {
            Ok(value) => Some(value),
            Err(broadcast::error::TryRecvError::Lagged(_)) => {
                self.changes = self.changes.resubscribe();
                Some(self.current())
            }
            Err(_) => None,
        }
    }
}
