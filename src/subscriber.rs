use std::{
    collections::{HashMap, VecDeque},
    fmt,
    sync::Arc,
};

use tokio::sync::mpsc::{UnboundedReceiver, unbounded_channel};
use tracing::{debug, trace, warn};

use crate::{Event, GlobalBus, Progress, SubscriberId, Subscription, internal::Inbox};

/// Receives events fanned out by a [`Subscriber`].
///
/// Returning `false` means "not done yet": the same event is handed to this
/// handler again on the next [`Subscriber::process_events`] call. Returning
/// `true` completes the handler for that event.
///
/// Implemented for every `FnMut(&Event) -> bool + Send` closure.
pub trait Handler: Send {
    fn handle(&mut self, event: &Event) -> bool;
}

impl<F> Handler for F
where
    F: FnMut(&Event) -> bool + Send,
{
    fn handle(&mut self, event: &Event) -> bool {
        self(event)
    }
}

type HandlerId = u64;

/// Resumable per-consumer dispatcher fed by a [`GlobalBus`].
///
/// The subscriber owns a private FIFO that only the bus fills. Each call to
/// [`process_events`](Subscriber::process_events) works on the head event
/// until every handler interested in it has returned `true`; a handler that
/// is not done yet keeps the event at the head, so later events wait.
///
/// ```rust
/// use wirebus::{Event, GlobalBus, Progress, Subscriber, Uid};
///
/// let bus = GlobalBus::new();
/// let mut hud = Subscriber::new("hud", &bus);
///
/// let mut frames = 0;
/// hud.bind(Uid::new(4), move |_: &Event| {
///     frames += 1;
///     frames == 2 // needs two ticks
/// });
///
/// bus.hook(Event::new(Uid::new(4)));
/// bus.update();
///
/// assert_eq!(hud.process_events(), Progress::Pending);
/// assert_eq!(hud.process_events(), Progress::Done);
/// assert_eq!(hud.process_events(), Progress::Idle);
/// ```
pub struct Subscriber {
    id: SubscriberId,
    bus: GlobalBus,
    inbox: Inbox,
    receiver: UnboundedReceiver<Event>,
    queue: VecDeque<Event>,
    handlers: HashMap<HandlerId, Box<dyn Handler>>,
    table: HashMap<Subscription, Vec<HandlerId>>,
    // handlers still owed the head event; `None` until it is first visited
    tracker: Option<Vec<HandlerId>>,
    next_handler: HandlerId,
}

impl Subscriber {
    pub fn new(name: impl AsRef<str>, bus: &GlobalBus) -> Self {
        let id = SubscriberId::next(Arc::from(name.as_ref()));
        let (sender, receiver) = unbounded_channel();
        Self {
            inbox: Inbox::new(id.clone(), sender),
            id,
            bus: bus.clone(),
            receiver,
            queue: VecDeque::new(),
            handlers: HashMap::new(),
            table: HashMap::new(),
            tracker: None,
            next_handler: 0,
        }
    }

    #[inline]
    pub fn id(&self) -> &SubscriberId {
        &self.id
    }

    pub(crate) fn inbox(&self) -> &Inbox {
        &self.inbox
    }

    /// Binds a closure under `subscription`. See [`bind_handler`](Subscriber::bind_handler).
    pub fn bind<F>(&mut self, subscription: impl Into<Subscription>, handler: F)
    where
        F: FnMut(&Event) -> bool + Send + 'static,
    {
        self.bind_handler(subscription, handler);
    }

    /// Adds `handler` under `subscription`. The first handler bound under a
    /// key also subscribes this subscriber to that key on the [`GlobalBus`].
    pub fn bind_handler<H>(&mut self, subscription: impl Into<Subscription>, handler: H)
    where
        H: Handler + 'static,
    {
        let subscription = subscription.into();
        let id = self.next_handler;
        self.next_handler += 1;
        self.handlers.insert(id, Box::new(handler));

        let ids = self.table.entry(subscription).or_default();
        ids.push(id);
        if ids.len() == 1 {
            self.bus.subscribe(subscription, self);
        }
        trace!(subscriber = %self.id, %subscription, "bound handler");
    }

    /// Removes every handler bound under `subscription` and the matching
    /// [`GlobalBus`] registration.
    pub fn unbind(&mut self, subscription: impl Into<Subscription>) {
        let subscription = subscription.into();
        let Some(ids) = self.table.remove(&subscription) else {
            warn!(subscriber = %self.id, %subscription, "unbinding a key with no handlers");
            return;
        };
        for id in ids {
            self.handlers.remove(&id);
        }
        self.bus.unsubscribe(subscription, self);
    }

    pub fn unbind_all(&mut self) {
        let keys: Vec<Subscription> = self.table.keys().copied().collect();
        for key in keys {
            self.unbind(key);
        }
    }

    pub fn is_bound(&self, subscription: impl Into<Subscription>) -> bool {
        self.table.contains_key(&subscription.into())
    }

    /// Events waiting in the private queue, including the one in progress.
    pub fn pending(&mut self) -> usize {
        self.drain_inbox();
        self.queue.len()
    }

    /// Advances the head of the queue by one step.
    pub fn process_events(&mut self) -> Progress {
        self.drain_inbox();
        let Some(event) = self.queue.front() else {
            return Progress::Idle;
        };

        let mut tracker = match self.tracker.take() {
            Some(tracker) => tracker,
            None => {
                let ids: Vec<HandlerId> = Subscription::route(event.uid)
                    .iter()
                    .filter_map(|key| self.table.get(key))
                    .flatten()
                    .copied()
                    .collect();
                if ids.is_empty() {
                    warn!(subscriber = %self.id, uid = %event.uid, "no handler for event, dropping");
                    self.queue.pop_front();
                    return Progress::Undeliverable;
                }
                ids
            }
        };

        // unbound handlers count as done
        let handlers = &mut self.handlers;
        tracker.retain(|id| handlers.get_mut(id).is_some_and(|h| !h.handle(event)));

        if tracker.is_empty() {
            self.queue.pop_front();
            Progress::Done
        } else {
            trace!(subscriber = %self.id, waiting = tracker.len(), "event still pending");
            self.tracker = Some(tracker);
            Progress::Pending
        }
    }

    fn drain_inbox(&mut self) {
        while let Ok(event) = self.receiver.try_recv() {
            self.queue.push_back(event);
        }
    }
}

impl Drop for Subscriber {
    fn drop(&mut self) {
        if !self.table.is_empty() {
            debug!(subscriber = %self.id, "dropping subscriber, unbinding all");
            self.unbind_all();
        }
    }
}

impl fmt::Debug for Subscriber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscriber")
            .field("id", &self.id)
            .field("keys", &self.table.len())
            .field("queued", &self.queue.len())
            .field("in_progress", &self.tracker.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::Uid;

    fn counter() -> Arc<AtomicUsize> {
        Arc::new(AtomicUsize::new(0))
    }

    #[test]
    fn test_bind_subscribes_once_per_key() {
        let bus = GlobalBus::new();
        let mut sub = Subscriber::new("s", &bus);
        sub.bind(Uid::new(1), |_: &Event| true);
        sub.bind(Uid::new(1), |_: &Event| true);
        assert!(sub.is_bound(Uid::new(1)));
        assert_eq!(bus.subscriber_count(Uid::new(1)), 1);

        sub.unbind(Uid::new(1));
        assert!(!sub.is_bound(Uid::new(1)));
        assert_eq!(bus.subscriber_count(Uid::new(1)), 0);
    }

    #[test]
    fn test_drop_unbinds_everything() {
        let bus = GlobalBus::new();
        let mut sub = Subscriber::new("s", &bus);
        sub.bind(Uid::new(1), |_: &Event| true);
        sub.bind(Subscription::All, |_: &Event| true);
        drop(sub);
        assert_eq!(bus.subscriber_count(Uid::new(1)), 0);
        assert_eq!(bus.subscriber_count(Subscription::All), 0);
    }

    #[test]
    fn test_idle_and_undeliverable() {
        let bus = GlobalBus::new();
        let mut sub = Subscriber::new("s", &bus);
        assert_eq!(sub.process_events(), Progress::Idle);
        assert!(Progress::Idle.is_settled());

        // registered directly, so no handler exists for uid 3
        bus.subscribe(Uid::new(3), &sub);
        bus.hook(Event::new(Uid::new(3)));
        bus.update();
        let progress = sub.process_events();
        assert_eq!(progress, Progress::Undeliverable);
        assert!(progress.is_settled());
        assert_eq!(sub.pending(), 0);
    }

    #[test]
    fn test_specific_then_catch_all() {
        let bus = GlobalBus::new();
        let mut sub = Subscriber::new("s", &bus);
        let order = Arc::new(parking_lot::Mutex::new(Vec::new()));

        let o = order.clone();
        sub.bind(Subscription::All, move |_: &Event| {
            o.lock().push("all");
            true
        });
        let o = order.clone();
        sub.bind(Uid::new(5), move |_: &Event| {
            o.lock().push("uid");
            true
        });

        bus.hook(Event::new(Uid::new(5)));
        // uid and catch-all registrations each hand over a copy
        assert_eq!(bus.update(), Some(2));
        assert_eq!(sub.process_events(), Progress::Done);
        assert_eq!(*order.lock(), vec!["uid", "all"]);
    }

    #[test]
    fn test_pending_handler_blocks_queue() {
        let bus = GlobalBus::new();
        let mut sub = Subscriber::new("s", &bus);
        let ready = counter();
        let calls = counter();
        let done = counter();

        let (r, c) = (ready.clone(), calls.clone());
        sub.bind(Uid::new(1), move |_: &Event| {
            c.fetch_add(1, Ordering::SeqCst);
            r.load(Ordering::SeqCst) > 0
        });
        let d = done.clone();
        sub.bind(Uid::new(1), move |_: &Event| {
            d.fetch_add(1, Ordering::SeqCst);
            true
        });

        bus.hook(Event::new(Uid::new(1)));
        bus.hook(Event::new(Uid::new(1)));
        bus.update();
        bus.update();

        assert_eq!(sub.process_events(), Progress::Pending);
        let progress = sub.process_events();
        assert_eq!(progress, Progress::Pending);
        assert!(!progress.is_settled());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        // completed handlers are not invoked again
        assert_eq!(done.load(Ordering::SeqCst), 1);
        assert_eq!(sub.pending(), 2);

        ready.store(1, Ordering::SeqCst);
        assert!(sub.process_events().is_settled());
        assert_eq!(sub.pending(), 1);
        assert_eq!(sub.process_events(), Progress::Done);
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(done.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_every_pending_handler_is_revisited() {
        let bus = GlobalBus::new();
        let mut sub = Subscriber::new("s", &bus);
        let calls: Vec<_> = (0..3).map(|_| counter()).collect();
        for c in &calls {
            let c = c.clone();
            sub.bind(Uid::new(2), move |_: &Event| c.fetch_add(1, Ordering::SeqCst) >= 1);
        }

        bus.hook(Event::new(Uid::new(2)));
        bus.update();
        assert_eq!(sub.process_events(), Progress::Pending);
        assert_eq!(sub.process_events(), Progress::Done);
        for c in &calls {
            assert_eq!(c.load(Ordering::SeqCst), 2);
        }
    }

    #[test]
    fn test_unbound_while_tracked_counts_as_done() {
        let bus = GlobalBus::new();
        let mut sub = Subscriber::new("s", &bus);
        sub.bind(Uid::new(1), |_: &Event| false);
        sub.bind(Subscription::All, |_: &Event| true);

        bus.hook(Event::new(Uid::new(1)));
        bus.update();
        assert_eq!(sub.process_events(), Progress::Pending);

        sub.unbind(Uid::new(1));
        assert_eq!(sub.process_events(), Progress::Done);
    }

    #[test]
    fn test_custom_handler_type() {
        struct Countdown(u32);
        impl Handler for Countdown {
            fn handle(&mut self, _event: &Event) -> bool {
                self.0 = self.0.saturating_sub(1);
                self.0 == 0
            }
        }

        let bus = GlobalBus::new();
        let mut sub = Subscriber::new("s", &bus);
        sub.bind_handler(Uid::new(9), Countdown(3));
        bus.hook(Event::new(Uid::new(9)));
        bus.update();

        assert_eq!(sub.process_events(), Progress::Pending);
        assert_eq!(sub.process_events(), Progress::Pending);
        assert_eq!(sub.process_events(), Progress::Done);
    }
}
