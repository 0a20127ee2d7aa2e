use std::{
    collections::{HashMap, VecDeque},
    fmt,
    sync::Arc,
};

use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use crate::{Event, Subscriber, Subscription, internal::Inbox};

/// Application-wide, deferred fan-out of events to [`Subscriber`]s.
///
/// Events are [`hook`](GlobalBus::hook)ed onto a FIFO and handed out one per
/// [`update`](GlobalBus::update): every subscriber registered under the
/// event's UID or under [`Subscription::All`] receives its own copy.
///
/// The bus is a handle: clones share the same queue and registry. Create one
/// per application and pass it to whoever needs it.
#[derive(Clone, Default)]
pub struct GlobalBus {
    inner: Arc<Mutex<Inner>>,
}

#[derive(Default)]
struct Inner {
    registry: HashMap<Subscription, Vec<Inbox>>,
    queue: VecDeque<Event>,
    shut_down: bool,
}

impl Inner {
    fn is_live(&self, call: &'static str) -> bool {
        if self.shut_down {
            warn!(call, "global bus has been shut down, ignoring");
        }
        !self.shut_down
    }
}

impl GlobalBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `subscriber` under `subscription`.
    ///
    /// Registrations are not deduplicated: subscribing twice under the same
    /// key delivers two copies per matching event.
    pub fn subscribe(&self, subscription: impl Into<Subscription>, subscriber: &Subscriber) {
        self.register(subscription.into(), subscriber.inbox().clone());
    }

    pub(crate) fn register(&self, subscription: Subscription, inbox: Inbox) {
        let mut inner = self.inner.lock();
        if !inner.is_live("subscribe") {
            return;
        }
        debug!(subscriber = %inbox.id, %subscription, "subscribed");
        inner.registry.entry(subscription).or_default().push(inbox);
    }

    /// Removes the first registration of `subscriber` under `subscription`.
    pub fn unsubscribe(&self, subscription: impl Into<Subscription>, subscriber: &Subscriber) {
        let subscription = subscription.into();
        let mut inner = self.inner.lock();
        if !inner.is_live("unsubscribe") {
            return;
        }
        let id = subscriber.id();
        let removed = inner.registry.get_mut(&subscription).and_then(|inboxes| {
            let pos = inboxes.iter().position(|inbox| &inbox.id == id)?;
            Some(inboxes.remove(pos))
        });
        match removed {
            Some(_) => {
                debug!(subscriber = %id, %subscription, "unsubscribed");
                if inner.registry.get(&subscription).is_some_and(Vec::is_empty) {
                    inner.registry.remove(&subscription);
                }
            }
            None => warn!(subscriber = %id, %subscription, "unsubscribing a subscriber that was never subscribed"),
        }
    }

    /// Appends `event` to the queue. Nothing is dispatched until the next
    /// [`update`](GlobalBus::update).
    pub fn hook(&self, event: Event) {
        let mut inner = self.inner.lock();
        if !inner.is_live("hook") {
            return;
        }
        trace!(uid = %event.uid, queued = inner.queue.len() + 1, "hooked event");
        inner.queue.push_back(event);
    }

    /// Hands the oldest queued event to every matching subscriber.
    ///
    /// Returns the number of copies delivered, or `None` if the queue was
    /// empty.
    pub fn update(&self) -> Option<usize> {
        let mut inner = self.inner.lock();
        if !inner.is_live("update") {
            return None;
        }
        let event = inner.queue.pop_front()?;

        let mut copies = 0;
        for key in Subscription::route(event.uid) {
            let Some(inboxes) = inner.registry.get_mut(&key) else {
                continue;
            };
            inboxes.retain(|inbox| {
                let alive = inbox.push(event.clone());
                if alive {
                    copies += 1;
                } else {
                    debug!(subscriber = %inbox.id, "pruning dropped subscriber");
                }
                alive
            });
            if inboxes.is_empty() {
                inner.registry.remove(&key);
            }
        }

        trace!(uid = %event.uid, copies, "fanned out event");
        Some(copies)
    }

    /// Discards every queued event.
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        if inner.is_live("clear") {
            inner.queue.clear();
        }
    }

    /// Drops the queue and every registration. Later calls are ignored.
    pub fn shutdown(&self) {
        let mut inner = self.inner.lock();
        if !inner.is_live("shutdown") {
            return;
        }
        debug!(
            queued = inner.queue.len(),
            keys = inner.registry.len(),
            "shutting down global bus"
        );
        inner.queue.clear();
        inner.registry.clear();
        inner.shut_down = true;
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.lock().shut_down
    }

    pub fn len(&self) -> usize {
        self.inner.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().queue.is_empty()
    }

    /// Live registrations under `subscription`.
    pub fn subscriber_count(&self, subscription: impl Into<Subscription>) -> usize {
        self.inner
            .lock()
            .registry
            .get(&subscription.into())
            .map_or(0, |inboxes| inboxes.iter().filter(|i| !i.is_closed()).count())
    }
}

impl fmt::Debug for GlobalBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("GlobalBus")
            .field("queued", &inner.queue.len())
            .field("keys", &inner.registry.len())
            .field("shut_down", &inner.shut_down)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Uid;

    #[test]
    fn test_update_delivers_one_event_per_call() {
        let bus = GlobalBus::new();
        let mut sub = Subscriber::new("s", &bus);
        bus.subscribe(Uid::new(1), &sub);

        bus.hook(Event::new(Uid::new(1)));
        bus.hook(Event::new(Uid::new(1)));
        assert_eq!(bus.len(), 2);

        assert_eq!(bus.update(), Some(1));
        assert_eq!(bus.len(), 1);
        assert_eq!(sub.pending(), 1);
        assert_eq!(bus.update(), Some(1));
        assert_eq!(bus.update(), None);
        assert!(bus.is_empty());
    }

    #[test]
    fn test_fan_out_by_uid_and_catch_all() {
        let bus = GlobalBus::new();
        let mut by_uid = Subscriber::new("uid", &bus);
        let mut catch_all = Subscriber::new("all", &bus);
        let mut other = Subscriber::new("other", &bus);
        bus.subscribe(Uid::new(7), &by_uid);
        bus.subscribe(Subscription::All, &catch_all);
        bus.subscribe(Uid::new(8), &other);

        bus.hook(Event::new(Uid::new(7)));
        assert_eq!(bus.update(), Some(2));
        assert_eq!(by_uid.pending(), 1);
        assert_eq!(catch_all.pending(), 1);
        assert_eq!(other.pending(), 0);
    }

    #[test]
    fn test_duplicate_subscription_delivers_twice() {
        let bus = GlobalBus::new();
        let mut sub = Subscriber::new("dup", &bus);
        bus.subscribe(Uid::new(2), &sub);
        bus.subscribe(Uid::new(2), &sub);
        assert_eq!(bus.subscriber_count(Uid::new(2)), 2);

        bus.hook(Event::new(Uid::new(2)));
        assert_eq!(bus.update(), Some(2));
        assert_eq!(sub.pending(), 2);

        bus.unsubscribe(Uid::new(2), &sub);
        assert_eq!(bus.subscriber_count(Uid::new(2)), 1);
        bus.unsubscribe(Uid::new(2), &sub);
        assert_eq!(bus.subscriber_count(Uid::new(2)), 0);
        // no match left, only logs
        bus.unsubscribe(Uid::new(2), &sub);
    }

    #[test]
    fn test_dropped_subscribers_are_pruned() {
        let bus = GlobalBus::new();
        let sub = Subscriber::new("gone", &bus);
        bus.subscribe(Subscription::All, &sub);
        let inbox = sub.inbox().clone();
        drop(sub);
        // a stale registration that outlived its subscriber
        bus.register(Subscription::All, inbox);

        bus.hook(Event::new(Uid::new(1)));
        assert_eq!(bus.update(), Some(0));
        assert_eq!(bus.subscriber_count(Subscription::All), 0);
    }

    #[test]
    fn test_clear_keeps_registrations() {
        let bus = GlobalBus::new();
        let sub = Subscriber::new("s", &bus);
        bus.subscribe(Uid::new(1), &sub);
        bus.hook(Event::new(Uid::new(1)));
        bus.clear();
        assert_eq!(bus.update(), None);
        assert_eq!(bus.subscriber_count(Uid::new(1)), 1);
    }

    #[test]
    fn test_shutdown_ignores_later_calls() {
        let bus = GlobalBus::new();
        let mut sub = Subscriber::new("s", &bus);
        bus.subscribe(Uid::new(1), &sub);
        bus.hook(Event::new(Uid::new(1)));

        bus.shutdown();
        assert!(bus.is_shut_down());
        assert!(bus.is_empty());

        bus.subscribe(Uid::new(1), &sub);
        bus.hook(Event::new(Uid::new(1)));
        assert_eq!(bus.update(), None);
        assert_eq!(bus.subscriber_count(Uid::new(1)), 0);
        assert_eq!(sub.pending(), 0);
        bus.shutdown();
    }
}
