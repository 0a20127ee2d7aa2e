use std::{
    collections::{HashMap, VecDeque},
    fmt,
    sync::Arc,
};

use parking_lot::Mutex;
use tracing::{trace, warn};

use crate::{
    Event, Subscription,
    internal::{Op, Strand},
};

/// Callback bound on a [`LocalBus`]. It observes the event and returns nothing:
/// local dispatch is fire-and-forget.
pub type LocalHandler = Arc<dyn Fn(&Event) + Send + Sync + 'static>;

/// Per-channel immediate dispatcher.
///
/// Inbound events are queued and a dispatch is scheduled on the owning
/// channel's serialization point, so local handlers never run concurrently
/// with that channel's writes. Each event is handed to its uid handlers, then
/// to the catch-all handlers, and discarded.
///
/// A bus created with [`LocalBus::new`] belongs to no channel: delivered
/// events wait until [`dispatch`](LocalBus::dispatch) is called.
///
/// Handles are cheap to clone and share the same bindings and queue.
#[derive(Clone, Default)]
pub struct LocalBus {
    inner: Arc<Mutex<Inner>>,
    strand: Option<Strand>,
}

#[derive(Default)]
struct Inner {
    handlers: HashMap<Subscription, Vec<LocalHandler>>,
    queue: VecDeque<Event>,
}

impl LocalBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn attached(strand: Strand) -> Self {
        Self {
            inner: Arc::default(),
            strand: Some(strand),
        }
    }

    /// Registers `handler` under `subscription`. Handlers sharing a key run
    /// in registration order.
    pub fn bind<F>(&self, subscription: impl Into<Subscription>, handler: F)
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.inner
            .lock()
            .handlers
            .entry(subscription.into())
            .or_default()
            .push(Arc::new(handler));
    }

    /// Removes every handler bound under `subscription`.
    pub fn unbind(&self, subscription: impl Into<Subscription>) {
        let subscription = subscription.into();
        if self.inner.lock().handlers.remove(&subscription).is_none() {
            warn!(%subscription, "unbinding a key with no local handlers");
        }
    }

    /// Drops all bindings. Queued events stay queued.
    pub fn reset(&self) {
        self.inner.lock().handlers.clear();
    }

    pub fn is_bound(&self, subscription: impl Into<Subscription>) -> bool {
        self.inner
            .lock()
            .handlers
            .get(&subscription.into())
            .is_some_and(|h| !h.is_empty())
    }

    /// Events queued and not yet dispatched.
    pub fn pending(&self) -> usize {
        self.inner.lock().queue.len()
    }

    /// Queues `event` and schedules its dispatch on the channel's
    /// serialization point.
    pub fn deliver(&self, event: Event) {
        self.inner.lock().queue.push_back(event);
        if let Some(strand) = &self.strand {
            if !strand.post(Op::Dispatch) {
                trace!("serialization point is gone, event stays queued");
            }
        }
    }

    /// Runs the handlers for `event` right away, in the caller's context.
    ///
    /// This bypasses the queue and therefore any ordering against pending
    /// writes on the channel; the caller is responsible for that.
    pub fn deliver_immediate(&self, event: Event) {
        self.run(&event);
    }

    /// Dispatches the oldest queued event. Returns false if none was queued.
    pub fn dispatch(&self) -> bool {
        let Some(event) = self.inner.lock().queue.pop_front() else {
            return false;
        };
        self.run(&event);
        true
    }

    fn run(&self, event: &Event) {
        // Handlers are cloned out so they may call back into the bus.
        let handlers: Vec<LocalHandler> = {
            let inner = self.inner.lock();
            Subscription::route(event.uid)
                .iter()
                .filter_map(|key| inner.handlers.get(key))
                .flatten()
                .cloned()
                .collect()
        };
        trace!(uid = %event.uid, handlers = handlers.len(), "dispatching local event");
        for handler in handlers {
            handler(event);
        }
    }
}

impl fmt::Debug for LocalBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("LocalBus")
            .field("bindings", &inner.handlers.len())
            .field("pending", &inner.queue.len())
            .field("attached", &self.strand.is_some())
            .finish()
    }
}
