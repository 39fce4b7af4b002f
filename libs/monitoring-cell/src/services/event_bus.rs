// =====================================================================================
// EVENT BUS - IN-PROCESS PUBLISH / SUBSCRIBE
// =====================================================================================

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock, Weak};

use tracing::{debug, error, warn};

use shared_models::{BusEvent, EventKind};

/// Subscriber callback. Runs on the publisher's thread, so it must not block;
/// I/O belongs in a spawned task or a channel send.
pub type Handler = Arc<dyn Fn(&BusEvent) -> anyhow::Result<()> + Send + Sync>;

#[derive(Default)]
struct BusInner {
    next_id: AtomicU64,
    handlers: RwLock<HashMap<EventKind, Vec<(u64, Handler)>>>,
}

impl BusInner {
    fn remove(&self, kind: EventKind, id: u64) -> bool {
        let mut handlers = self.handlers.write().unwrap_or_else(|e| e.into_inner());
        match handlers.get_mut(&kind) {
            Some(list) => {
                let before = list.len();
                list.retain(|(handler_id, _)| *handler_id != id);
                before != list.len()
            }
            None => false,
        }
    }
}

/// Synchronous fan-out hub for metric and alert events.
///
/// Delivery is FIFO per subscriber and has no replay: a handler only sees
/// events published after it subscribed.
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, kind: EventKind, handler: F) -> Subscription
    where
        F: Fn(&BusEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner
            .handlers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .entry(kind)
            .or_default()
            .push((id, Arc::new(handler)));

        debug!(kind = kind.as_str(), subscription_id = id, "Subscribed to event bus");

        Subscription {
            bus: Arc::downgrade(&self.inner),
            kind,
            id,
            active: AtomicBool::new(true),
        }
    }

    /// Delivers the event to every current subscriber of its kind and returns
    /// how many handlers accepted it.
    pub fn publish(&self, event: BusEvent) -> usize {
        let kind = event.kind();
        // snapshot so handlers can (un)subscribe without deadlocking
        let snapshot: Vec<(u64, Handler)> = self
            .inner
            .handlers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&kind)
            .cloned()
            .unwrap_or_default();

        let mut delivered = 0;
        for (id, handler) in snapshot {
            match catch_unwind(AssertUnwindSafe(|| handler(&event))) {
                Ok(Ok(())) => delivered += 1,
                Ok(Err(e)) => {
                    warn!(kind = kind.as_str(), subscription_id = id, error = %e, "Event handler failed");
                }
                Err(_) => {
                    error!(kind = kind.as_str(), subscription_id = id, "Event handler panicked");
                }
            }
        }
        delivered
    }

    pub fn subscriber_count(&self, kind: EventKind) -> usize {
        self.inner
            .handlers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&kind)
            .map_or(0, Vec::len)
    }
}

/// Registration guard. Dropping it unsubscribes.
pub struct Subscription {
    bus: Weak<BusInner>,
    kind: EventKind,
    id: u64,
    active: AtomicBool,
}

impl Subscription {
    pub fn kind(&self) -> EventKind {
        self.kind
    }

    /// Idempotent; later calls are no-ops.
    pub fn unsubscribe(&self) {
        if !self.active.swap(false, Ordering::AcqRel) {
            return;
        }
        if let Some(bus) = self.bus.upgrade() {
            if bus.remove(self.kind, self.id) {
                debug!(kind = self.kind.as_str(), subscription_id = self.id, "Unsubscribed from event bus");
            }
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("kind", &self.kind)
            .field("id", &self.id)
            .field("active", &self.active.load(Ordering::Relaxed))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_models::Metric;
    use std::sync::atomic::AtomicUsize;

    fn metric_event() -> BusEvent {
        BusEvent::Metric(Metric::new("billing", 10, 200))
    }

    #[test]
    fn test_subscribe_publish_unsubscribe_delivers_twice() {
        let bus = EventBus::new();
        let received = Arc::new(AtomicUsize::new(0));
        let counter = received.clone();

        let subscription = bus.subscribe(EventKind::Metric, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        bus.publish(metric_event());
        bus.publish(metric_event());
        subscription.unsubscribe();
        bus.publish(metric_event());

        assert_eq!(received.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_failing_and_panicking_handlers_do_not_block_others() {
        let bus = EventBus::new();
        let received = Arc::new(AtomicUsize::new(0));
        let counter = received.clone();

        let _failing = bus.subscribe(EventKind::Metric, |_| Err(anyhow::anyhow!("boom")));
        let _panicking = bus.subscribe(EventKind::Metric, |_| panic!("handler bug"));
        let _healthy = bus.subscribe(EventKind::Metric, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        let delivered = bus.publish(metric_event());

        assert_eq!(delivered, 1);
        assert_eq!(received.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_kinds_are_isolated_and_guard_drop_unsubscribes() {
        let bus = EventBus::new();
        {
            let _alerts = bus.subscribe(EventKind::Alert, |_| Ok(()));
            assert_eq!(bus.subscriber_count(EventKind::Alert), 1);
            assert_eq!(bus.subscriber_count(EventKind::Metric), 0);
            assert_eq!(bus.publish(metric_event()), 0);
        }
        assert_eq!(bus.subscriber_count(EventKind::Alert), 0);
    }

    #[test]
    fn test_events_arrive_in_publish_order() {
        let bus = EventBus::new();
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink = seen.clone();

        let _sub = bus.subscribe(EventKind::Metric, move |event| {
            if let BusEvent::Metric(metric) = event {
                sink.lock().unwrap().push(metric.latency_ms);
            }
            Ok(())
        });

        for latency in [1, 2, 3, 4] {
            bus.publish(BusEvent::Metric(Metric::new("billing", latency, 200)));
        }

        assert_eq!(*seen.lock().unwrap(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_handler_may_unsubscribe_itself_during_dispatch() {
        let bus = EventBus::new();
        let slot: Arc<std::sync::Mutex<Option<Subscription>>> = Arc::new(std::sync::Mutex::new(None));
        let inner_slot = slot.clone();

        let subscription = bus.subscribe(EventKind::Metric, move |_| {
            if let Some(sub) = inner_slot.lock().unwrap().take() {
                sub.unsubscribe();
            }
            Ok(())
        });
        *slot.lock().unwrap() = Some(subscription);

        assert_eq!(bus.publish(metric_event()), 1);
        assert_eq!(bus.subscriber_count(EventKind::Metric), 0);
    }
}
