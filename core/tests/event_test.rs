use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use voxline_core::events::{EngineEvent, EngineEventKind};
use voxline_core::{VoxlineError, WeakEventBus};

#[derive(Default)]
struct Listener {
    seen: Mutex<Vec<String>>,
}

impl Listener {
    fn seen(&self) -> Vec<String> {
        self.seen.lock().unwrap().clone()
    }
}

fn started(engine: &str) -> EngineEvent {
    EngineEvent::new(engine, EngineEventKind::Started)
}

#[test]
fn post_reaches_live_listener() {
    let bus = WeakEventBus::new();
    let listener = Arc::new(Listener::default());
    bus.register(&listener, 0, |l: &Listener, e: &EngineEvent| {
        l.seen.lock().unwrap().push(e.engine.clone())
    })
    .unwrap();

    assert_eq!(bus.post(&started("piper")), 1);
    assert_eq!(listener.seen(), vec!["piper".to_string()]);
    // Other event types are not delivered.
    assert_eq!(bus.post(&42u32), 0);
}

#[test]
fn dropped_listener_stops_receiving_and_is_pruned() {
    let bus = WeakEventBus::new();
    let calls = Arc::new(AtomicUsize::new(0));
    let listener = Arc::new(Listener::default());
    let c = calls.clone();
    bus.register(&listener, 0, move |_: &Listener, _: &EngineEvent| {
        c.fetch_add(1, Ordering::SeqCst);
    })
    .unwrap();

    bus.post(&started("a"));
    drop(listener);
    assert_eq!(bus.post(&started("b")), 0);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    // Pruned lazily on the next registration.
    assert_eq!(bus.subscriber_count::<EngineEvent>(), 1);
    let other = Arc::new(Listener::default());
    bus.register(&other, 0, |_: &Listener, _: &EngineEvent| {}).unwrap();
    assert_eq!(bus.subscriber_count::<EngineEvent>(), 1);
}

#[test]
fn handlers_run_by_descending_priority() {
    let bus = WeakEventBus::new();
    let order = Arc::new(Mutex::new(Vec::new()));
    let low = Arc::new(Listener::default());
    let high = Arc::new(Listener::default());
    let mid = Arc::new(Listener::default());

    for (listener, priority) in [(&low, -5), (&high, 10), (&mid, 0)] {
        let order = order.clone();
        bus.register(listener, priority, move |_: &Listener, _: &EngineEvent| {
            order.lock().unwrap().push(priority)
        })
        .unwrap();
    }
    bus.post(&started("x"));
    assert_eq!(*order.lock().unwrap(), vec![10, 0, -5]);
}

#[test]
fn panicking_handler_is_isolated() {
    let bus = WeakEventBus::new();
    let bad = Arc::new(Listener::default());
    let good = Arc::new(Listener::default());
    bus.register(&bad, 10, |_: &Listener, _: &EngineEvent| panic!("boom"))
        .unwrap();
    bus.register(&good, 0, |l: &Listener, e: &EngineEvent| {
        l.seen.lock().unwrap().push(e.engine.clone())
    })
    .unwrap();

    assert_eq!(bus.post(&started("espeak")), 1);
    assert_eq!(good.seen(), vec!["espeak".to_string()]);
    let stats = bus.get_stats::<EngineEvent>().unwrap();
    assert_eq!(stats.handler_failures, 1);
    assert_eq!(stats.total_delivered, 1);
}

#[test]
fn second_handler_for_same_event_is_rejected() {
    let bus = WeakEventBus::new();
    let listener = Arc::new(Listener::default());
    bus.register(&listener, 0, |_: &Listener, _: &EngineEvent| {}).unwrap();
    let again = bus.register(&listener, 5, |_: &Listener, _: &EngineEvent| {});
    assert!(matches!(again, Err(VoxlineError::EventBus(_))));

    // A different event type is fine.
    bus.register(&listener, 0, |_: &Listener, _: &u32| {}).unwrap();
}

#[test]
fn unregister_removes_all_handlers() {
    let bus = WeakEventBus::new();
    let listener = Arc::new(Listener::default());
    bus.register(&listener, 0, |_: &Listener, _: &EngineEvent| {}).unwrap();
    bus.register(&listener, 0, |_: &Listener, _: &u32| {}).unwrap();
    bus.unregister(&listener);
    assert_eq!(bus.post(&started("x")), 0);
    assert_eq!(bus.post(&1u32), 0);
}
