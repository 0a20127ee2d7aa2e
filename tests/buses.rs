use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use parking_lot::Mutex;
use wirebus::{Event, GlobalBus, LocalBus, Progress, Subscriber, Subscription, Uid};

#[test]
fn test_local_bus_preserves_order_and_catch_all_sees_everything() {
    let bus = LocalBus::new();
    let specific = Arc::new(Mutex::new(Vec::new()));
    let every = Arc::new(Mutex::new(Vec::new()));

    let s = specific.clone();
    bus.bind(Uid::new(5), move |e| s.lock().push(e.property("n").map(str::to_owned)));
    let a = every.clone();
    bus.bind(Subscription::All, move |e| a.lock().push(e.uid.get()));

    for (uid, n) in [(5, 0), (6, 1), (5, 2), (7, 3), (5, 4)] {
        bus.deliver(Event::new(Uid::new(uid)).with_property("n", n));
    }
    while bus.dispatch() {}

    assert_eq!(
        *specific.lock(),
        vec![Some("0".to_owned()), Some("2".to_owned()), Some("4".to_owned())]
    );
    assert_eq!(*every.lock(), vec![5, 6, 5, 7, 5]);
}

#[test]
fn test_global_bus_fans_out_one_event_per_update() {
    let bus = GlobalBus::new();
    let seen = Arc::new(Mutex::new(Vec::new()));

    let mut subscribers: Vec<Subscriber> = ["by-uid", "catch-all", "unrelated"]
        .into_iter()
        .map(|name| Subscriber::new(name, &bus))
        .collect();

    let log = seen.clone();
    subscribers[0].bind(Uid::new(3), move |e: &Event| {
        log.lock().push(("by-uid", e.uid.get()));
        true
    });
    let log = seen.clone();
    subscribers[1].bind(Subscription::All, move |e: &Event| {
        log.lock().push(("catch-all", e.uid.get()));
        true
    });
    let log = seen.clone();
    subscribers[2].bind(Uid::new(4), move |e: &Event| {
        log.lock().push(("unrelated", e.uid.get()));
        true
    });

    bus.hook(Event::new(Uid::new(3)));
    bus.hook(Event::new(Uid::new(3)));

    assert_eq!(bus.update(), Some(2));
    for sub in subscribers.iter_mut() {
        while sub.process_events() != Progress::Idle {}
    }
    assert_eq!(*seen.lock(), vec![("by-uid", 3), ("catch-all", 3)]);
    assert_eq!(bus.len(), 1);
}

#[test]
fn test_resumable_dispatch_retries_the_same_event() {
    let bus = GlobalBus::new();
    let mut sub = Subscriber::new("retry", &bus);
    let calls = Arc::new(AtomicUsize::new(0));
    let seen = Arc::new(Mutex::new(Vec::new()));

    let (c, s) = (calls.clone(), seen.clone());
    sub.bind(Uid::new(8), move |e: &Event| {
        s.lock().push(e.property("seq").map(str::to_owned));
        // not done on the first visit
        c.fetch_add(1, Ordering::SeqCst) > 0
    });

    bus.hook(Event::new(Uid::new(8)).with_property("seq", 1));
    bus.update();

    assert_eq!(sub.process_events(), Progress::Pending);
    assert_eq!(sub.process_events(), Progress::Done);
    assert_eq!(sub.process_events(), Progress::Idle);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(*seen.lock(), vec![Some("1".to_owned()), Some("1".to_owned())]);
}

#[test]
fn test_dropped_subscriber_stops_receiving() {
    let bus = GlobalBus::new();
    {
        let mut sub = Subscriber::new("scoped", &bus);
        sub.bind(Uid::new(1), |_: &Event| true);
        assert_eq!(bus.subscriber_count(Uid::new(1)), 1);
    }
    assert_eq!(bus.subscriber_count(Uid::new(1)), 0);

    bus.hook(Event::new(Uid::new(1)));
    assert_eq!(bus.update(), Some(0));
}
