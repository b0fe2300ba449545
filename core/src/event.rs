// Weak-reference event bus implementation
//
// Subscribers hand the bus a handler closure plus a weak liveness token. The bus
// never keeps a listener alive: once the last strong reference is dropped the
// handler stops firing, and the stale entry is pruned on the next registration.
use crate::{Result, VoxlineError};
use dashmap::DashMap;
use std::any::{Any, TypeId};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Weak};
use tracing::{debug, warn};

type ErasedHandler = Arc<dyn Fn(&dyn Any, &dyn Any) + Send + Sync>;

/// Subscription information
#[derive(Clone)]
struct Subscriber {
    listener: Weak<dyn Any + Send + Sync>,
    handler: ErasedHandler,
    priority: i32,
    listener_name: &'static str,
}

impl Subscriber {
    fn is_alive(&self) -> bool {
        self.listener.strong_count() > 0
    }

    fn same_listener(&self, other: &Weak<dyn Any + Send + Sync>) -> bool {
        Weak::ptr_eq(&self.listener, other)
    }
}

/// Event bus statistics
#[derive(Debug, Clone, Default)]
pub struct EventBusStats {
    pub total_posted: u64,
    pub total_delivered: u64,
    pub handler_failures: u64,
}

/// Event bus core implementation
#[derive(Default)]
pub struct WeakEventBus {
    // Event type -> subscribers, highest priority first. Replaced wholesale on
    // registration so `post` iterates a snapshot without holding the shard lock.
    subscriptions: DashMap<TypeId, Arc<Vec<Subscriber>>>,
    stats: DashMap<TypeId, EventBusStats>,
}

impl WeakEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe `listener` to events of type `E`.
    ///
    /// Rejects a second handler for the same listener and event type; a
    /// listener's handlers for one event type must have a single, unambiguous
    /// order.
    pub fn register<L, E, F>(&self, listener: &Arc<L>, priority: i32, handler: F) -> Result<()>
    where
        L: Any + Send + Sync,
        E: Any,
        F: Fn(&L, &E) + Send + Sync + 'static,
    {
        let erased: Arc<dyn Any + Send + Sync> = listener.clone();
        let weak: Weak<dyn Any + Send + Sync> = Arc::downgrade(&erased);
        drop(erased);

        let handler: ErasedHandler = Arc::new(move |l: &dyn Any, e: &dyn Any| {
            if let (Some(l), Some(e)) = (l.downcast_ref::<L>(), e.downcast_ref::<E>()) {
                handler(l, e);
            }
        });

        let key = TypeId::of::<E>();
        let mut entry = self.subscriptions.entry(key).or_default();
        let mut subs: Vec<Subscriber> = entry.iter().filter(|s| s.is_alive()).cloned().collect();
        let pruned = entry.len() - subs.len();
        if pruned > 0 {
            debug!(target = "bus", event = std::any::type_name::<E>(), pruned, "Pruned dead subscribers");
        }

        if subs.iter().any(|s| s.same_listener(&weak)) {
            return Err(VoxlineError::EventBus(format!(
                "{} already has a handler for {}",
                std::any::type_name::<L>(),
                std::any::type_name::<E>()
            )));
        }

        subs.push(Subscriber {
            listener: weak,
            handler,
            priority,
            listener_name: std::any::type_name::<L>(),
        });
        // Stable sort keeps registration order among equal priorities.
        subs.sort_by(|a, b| b.priority.cmp(&a.priority));
        *entry = Arc::new(subs);
        Ok(())
    }

    /// Drop every handler registered by `listener`.
    pub fn unregister<L: Any + Send + Sync>(&self, listener: &Arc<L>) {
        let erased: Arc<dyn Any + Send + Sync> = listener.clone();
        let weak = Arc::downgrade(&erased);
        drop(erased);
        for mut entry in self.subscriptions.iter_mut() {
            let kept: Vec<Subscriber> = entry
                .iter()
                .filter(|s| s.is_alive() && !s.same_listener(&weak))
                .cloned()
                .collect();
            *entry = Arc::new(kept);
        }
    }

    /// Deliver `event` to every live handler registered for its exact type.
    ///
    /// A panicking handler is logged and skipped; the remaining handlers still
    /// run. Returns the number of handlers that completed.
    pub fn post<E: Any>(&self, event: &E) -> usize {
        let key = TypeId::of::<E>();
        let subs = match self.subscriptions.get(&key) {
            Some(subs) => Arc::clone(subs.value()),
            None => return 0,
        };

        let mut delivered = 0u64;
        let mut failures = 0u64;
        for sub in subs.iter() {
            let Some(listener) = sub.listener.upgrade() else {
                continue;
            };
            let outcome = catch_unwind(AssertUnwindSafe(|| {
                (sub.handler)(listener.as_ref(), event as &dyn Any)
            }));
            match outcome {
                Ok(()) => delivered += 1,
                Err(_) => {
                    failures += 1;
                    warn!(
                        target = "bus",
                        listener = sub.listener_name,
                        event = std::any::type_name::<E>(),
                        "Event handler panicked"
                    );
                }
            }
        }

        let mut stats = self.stats.entry(key).or_default();
        stats.total_posted += 1;
        stats.total_delivered += delivered;
        stats.handler_failures += failures;
        delivered as usize
    }

    /// Registered entries for `E`, including dead ones not yet pruned.
    pub fn subscriber_count<E: Any>(&self) -> usize {
        self.subscriptions
            .get(&TypeId::of::<E>())
            .map(|s| s.len())
            .unwrap_or(0)
    }

    /// Get stats
    pub fn get_stats<E: Any>(&self) -> Option<EventBusStats> {
        self.stats.get(&TypeId::of::<E>()).map(|s| s.clone())
    }
}
