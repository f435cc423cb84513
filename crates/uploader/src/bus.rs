//! Publish/subscribe bus with ordered subscribers.
//!
//! Subscribers of a channel run in a deterministic order for every event:
//! first by [`SubscriberSort`] class, then by descending weight, then by
//! registration order. Emission is synchronous and never nested: an event
//! emitted while another is being delivered is queued and delivered once
//! every subscriber has seen the current one. A panicking subscriber is
//! logged and does not stop the others.

use std::collections::{HashMap, VecDeque};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use tracing::warn;

/// Ordering class of a subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum SubscriberSort {
    First,
    #[default]
    Normal,
    Last,
}

/// Position of a subscriber in the emission sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SubscriberOrder {
    pub sort: SubscriberSort,
    /// Higher weights run earlier within the same sort class.
    pub weight: u32,
}

impl SubscriberOrder {
    pub const fn new(sort: SubscriberSort, weight: u32) -> Self {
        Self { sort, weight }
    }

    pub const fn first(weight: u32) -> Self {
        Self::new(SubscriberSort::First, weight)
    }

    pub const fn last(weight: u32) -> Self {
        Self::new(SubscriberSort::Last, weight)
    }
}

/// Handle returned by [`EventBus::subscribe`], used to unsubscribe.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Subscription {
    channel: String,
    id: u64,
}

impl Subscription {
    pub fn channel(&self) -> &str {
        &self.channel
    }
}

type Handler<E> = Arc<dyn Fn(&E) + Send + Sync>;

struct Subscriber<E> {
    id: u64,
    order: SubscriberOrder,
    handler: Handler<E>,
}

struct BusInner<E> {
    next_id: u64,
    channels: HashMap<String, Vec<Subscriber<E>>>,
}

/// Events waiting for the current delivery to finish.
struct Dispatch<E> {
    draining: bool,
    pending: VecDeque<(String, E)>,
}

/// Named-channel event bus.
pub struct EventBus<E> {
    inner: RwLock<BusInner<E>>,
    dispatch: Mutex<Dispatch<E>>,
}

impl<E> Default for EventBus<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> EventBus<E> {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(BusInner {
                next_id: 0,
                channels: HashMap::new(),
            }),
            dispatch: Mutex::new(Dispatch {
                draining: false,
                pending: VecDeque::new(),
            }),
        }
    }

    /// Registers `handler` on `channel` at position `order`.
    pub fn subscribe<F>(&self, channel: &str, order: SubscriberOrder, handler: F) -> Subscription
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let id = inner.next_id;
        inner.next_id += 1;

        let subscribers = inner.channels.entry(channel.to_string()).or_default();
        // Insert after every subscriber that sorts before or equal to this one,
        // keeping registration order among equals.
        let pos = subscribers
            .iter()
            .position(|s| runs_before(order, s.order))
            .unwrap_or(subscribers.len());
        subscribers.insert(
            pos,
            Subscriber {
                id,
                order,
                handler: Arc::new(handler),
            },
        );

        Subscription {
            channel: channel.to_string(),
            id,
        }
    }

    /// Removes a subscriber. Returns `false` if it was already gone.
    pub fn unsubscribe(&self, subscription: &Subscription) -> bool {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let Some(subscribers) = inner.channels.get_mut(&subscription.channel) else {
            return false;
        };
        let before = subscribers.len();
        subscribers.retain(|s| s.id != subscription.id);
        let removed = subscribers.len() != before;
        if subscribers.is_empty() {
            inner.channels.remove(&subscription.channel);
        }
        removed
    }

    /// Delivers `event` to every subscriber of `channel`.
    ///
    /// If a delivery is already running (a handler emitting, or another
    /// thread), the event is queued behind it and this call returns 0.
    /// Otherwise this call delivers it, then drains whatever was queued
    /// meanwhile, and returns the number of handler runs that completed
    /// without panicking.
    pub fn emit(&self, channel: &str, event: E) -> usize {
        {
            let mut dispatch = self.dispatch();
            dispatch.pending.push_back((channel.to_string(), event));
            if dispatch.draining {
                return 0;
            }
            dispatch.draining = true;
        }

        let mut delivered = 0;
        loop {
            let next = {
                let mut dispatch = self.dispatch();
                let next = dispatch.pending.pop_front();
                if next.is_none() {
                    dispatch.draining = false;
                }
                next
            };
            let Some((channel, event)) = next else {
                return delivered;
            };
            delivered += self.deliver(&channel, &event);
        }
    }

    fn dispatch(&self) -> MutexGuard<'_, Dispatch<E>> {
        self.dispatch.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Runs every subscriber of `channel` on `event`. The subscriber list
    /// is snapshotted first, so handlers may subscribe or unsubscribe.
    fn deliver(&self, channel: &str, event: &E) -> usize {
        let handlers: Vec<Handler<E>> = {
            let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
            match inner.channels.get(channel) {
                Some(subscribers) => subscribers.iter().map(|s| Arc::clone(&s.handler)).collect(),
                None => return 0,
            }
        };

        let mut delivered = 0;
        for handler in handlers {
            match catch_unwind(AssertUnwindSafe(|| handler(event))) {
                Ok(()) => delivered += 1,
                Err(_) => warn!(channel, "event subscriber panicked"),
            }
        }
        delivered
    }

    pub fn subscriber_count(&self, channel: &str) -> usize {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner.channels.get(channel).map_or(0, Vec::len)
    }
}

/// Returns `true` if a subscriber at `new` must run before one at `existing`.
fn runs_before(new: SubscriberOrder, existing: SubscriberOrder) -> bool {
    new.sort < existing.sort || (new.sort == existing.sort && new.weight > existing.weight)
}
