//! Broadcast-backed event bus.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use tracing::{trace, warn};

/// Default number of events buffered per subscriber before it starts lagging
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

type EventFilter<E> = Box<dyn Fn(&E) -> bool + Send + Sync>;

/// Typed, cloneable event bus
///
/// Publishing never blocks and never fails: with no subscribers the event is
/// simply dropped. Every subscriber sees every event published after it
/// subscribed, in publish order.
///
/// # Examples
///
/// ```
/// use unimoghub_common::events::EventBus;
///
/// #[derive(Debug, Clone, PartialEq)]
/// enum Ping {
///     Sent(u32),
/// }
///
/// let bus = EventBus::new(16);
/// let mut rx = bus.subscribe();
/// bus.publish(Ping::Sent(1));
/// assert_eq!(rx.try_recv(), Some(Ping::Sent(1)));
/// ```
pub struct EventBus<E> {
    sender: broadcast::Sender<E>,
    published: Arc<AtomicU64>,
}

impl<E> Clone for EventBus<E> {
    fn clone(&self) -> Self {
        Self { sender: self.sender.clone(), published: Arc::clone(&self.published) }
    }
}

impl<E> fmt::Debug for EventBus<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.sender.receiver_count())
            .field("published", &self.published.load(Ordering::Relaxed))
            .finish()
    }
}

impl<E: Clone + Send + fmt::Debug + 'static> EventBus<E> {
    /// Create a bus buffering up to `capacity` events per subscriber
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender, published: Arc::new(AtomicU64::new(0)) }
    }

    /// Publish an event, returning how many subscribers received it
    pub fn publish(&self, event: E) -> usize {
        self.published.fetch_add(1, Ordering::Relaxed);
        trace!(?event, "event published");
        self.sender.send(event).unwrap_or(0)
    }

    /// Subscribe to every event published from now on
    pub fn subscribe(&self) -> EventSubscription<E> {
        EventSubscription { receiver: self.sender.subscribe(), filter: None }
    }

    /// Subscribe to the events accepted by `filter`
    pub fn subscribe_filtered<F>(&self, filter: F) -> EventSubscription<E>
    where
        F: Fn(&E) -> bool + Send + Sync + 'static,
    {
        EventSubscription { receiver: self.sender.subscribe(), filter: Some(Box::new(filter)) }
    }

    /// Number of live subscriptions
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Total events published over the bus lifetime
    pub fn published_count(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }
}

impl<E: Clone + Send + fmt::Debug + 'static> Default for EventBus<E> {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}

/// Receiving side of an [`EventBus`]
pub struct EventSubscription<E> {
    receiver: broadcast::Receiver<E>,
    filter: Option<EventFilter<E>>,
}

impl<E> fmt::Debug for EventSubscription<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventSubscription").field("filtered", &self.filter.is_some()).finish()
    }
}

impl<E: Clone> EventSubscription<E> {
    fn accepts(&self, event: &E) -> bool {
        self.filter.as_ref().map_or(true, |filter| filter(event))
    }

    /// Wait for the next accepted event
    ///
    /// Returns `None` once every bus handle has been dropped. A subscriber
    /// that fell behind skips the overwritten events and keeps going.
    pub async fn recv(&mut self) -> Option<E> {
        loop {
            match self.receiver.recv().await {
                Ok(event) if self.accepts(&event) => return Some(event),
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "event subscriber lagged, events dropped");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Take the next accepted event if one is already buffered
    pub fn try_recv(&mut self) -> Option<E> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) if self.accepts(&event) => return Some(event),
                Ok(_) => {}
                Err(TryRecvError::Lagged(skipped)) => {
                    warn!(skipped, "event subscriber lagged, events dropped");
                }
                Err(TryRecvError::Empty | TryRecvError::Closed) => return None,
            }
        }
    }

    /// Take every accepted event that is already buffered
    pub fn drain(&mut self) -> Vec<E> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }
}
