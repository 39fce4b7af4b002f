// =====================================================================================
// STREAM HUB - SERVER-SIDE OBSERVER FAN-OUT
// =====================================================================================

use std::convert::Infallible;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::response::sse::Event;
use futures::stream::{self, BoxStream, StreamExt};
use tokio::sync::{mpsc, watch};
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use monitoring_cell::{EventBus, Subscription};
use shared_config::AppConfig;
use shared_models::{BusEvent, EventKind, Heartbeat};

use crate::models::{ALERT_EVENT, METRIC_EVENT, PING_EVENT};

pub type ObserverStream = BoxStream<'static, Result<Event, Infallible>>;

/// Holds connected observers. Each observer gets a bounded queue filled
/// without blocking; an observer whose queue is full or closed is evicted so
/// the publisher never waits on a slow client.
pub struct StreamHub {
    bus: EventBus,
    heartbeat: Duration,
    buffer: usize,
    shutdown: watch::Sender<bool>,
    observers: Arc<AtomicUsize>,
}

impl StreamHub {
    pub fn new(bus: EventBus, heartbeat: Duration, buffer: usize) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            bus,
            heartbeat: heartbeat.max(Duration::from_millis(1)),
            buffer: buffer.max(1),
            shutdown,
            observers: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn from_config(bus: EventBus, config: &AppConfig) -> Self {
        Self::new(
            bus,
            Duration::from_secs(config.stream_heartbeat_secs),
            config.stream_observer_buffer,
        )
    }

    pub fn active_observers(&self) -> usize {
        self.observers.load(Ordering::SeqCst)
    }

    /// Ends every observer stream. New connections end immediately.
    pub fn shutdown(&self) {
        self.shutdown.send_replace(true);
        info!("Stream hub shutting down");
    }

    /// Registers an observer for metric and alert events.
    pub fn connect(&self) -> ObserverStream {
        let (tx, rx) = mpsc::channel::<BusEvent>(self.buffer);
        let (evict_tx, evict_rx) = watch::channel(false);
        let evict_tx = Arc::new(evict_tx);

        let subscriptions: Vec<Subscription> = EventKind::ALL
            .into_iter()
            .map(|kind| {
                let tx = tx.clone();
                let evict_tx = evict_tx.clone();
                self.bus.subscribe(kind, move |event| {
                    if *evict_tx.borrow() {
                        return Ok(());
                    }
                    match tx.try_send(event.clone()) {
                        Ok(()) => Ok(()),
                        Err(e) => {
                            evict_tx.send_replace(true);
                            Err(anyhow::anyhow!("observer evicted: {}", e))
                        }
                    }
                })
            })
            .collect();

        let count = self.observers.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(observers = count, "Observer connected");

        let mut heartbeat = interval_at(Instant::now() + self.heartbeat, self.heartbeat);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let observer = Observer {
            rx,
            heartbeat,
            shutdown: self.shutdown.subscribe(),
            evicted: evict_rx,
            _guard: ObserverGuard {
                _subscriptions: subscriptions,
                observers: self.observers.clone(),
            },
        };

        stream::unfold(observer, |mut observer| async move {
            observer.next_event().await.map(|event| (Ok(event), observer))
        })
        .boxed()
    }
}

/// Releases bus subscriptions and the observer count on every exit path.
struct ObserverGuard {
    _subscriptions: Vec<Subscription>,
    observers: Arc<AtomicUsize>,
}

impl Drop for ObserverGuard {
    fn drop(&mut self) {
        let remaining = self.observers.fetch_sub(1, Ordering::SeqCst).saturating_sub(1);
        debug!(observers = remaining, "Observer disconnected");
    }
}

struct Observer {
    rx: mpsc::Receiver<BusEvent>,
    heartbeat: Interval,
    shutdown: watch::Receiver<bool>,
    evicted: watch::Receiver<bool>,
    _guard: ObserverGuard,
}

enum Next {
    End,
    Recheck,
    Relay(BusEvent),
    Ping,
}

impl Observer {
    async fn next_event(&mut self) -> Option<Event> {
        loop {
            if *self.shutdown.borrow_and_update() {
                return None;
            }
            if *self.evicted.borrow_and_update() {
                warn!("Observer dropped after falling behind");
                return None;
            }

            let next = tokio::select! {
                biased;
                changed = self.shutdown.changed() => changed.map_or(Next::End, |_| Next::Recheck),
                changed = self.evicted.changed() => changed.map_or(Next::End, |_| Next::Recheck),
                event = self.rx.recv() => event.map_or(Next::End, Next::Relay),
                _ = self.heartbeat.tick() => Next::Ping,
            };

            let encoded = match next {
                Next::End => return None,
                Next::Recheck => continue,
                Next::Relay(BusEvent::Metric(metric)) => Event::default().event(METRIC_EVENT).json_data(&metric),
                Next::Relay(BusEvent::Alert(alert)) => Event::default().event(ALERT_EVENT).json_data(&alert),
                Next::Ping => Event::default().event(PING_EVENT).json_data(Heartbeat::now()),
            };

            match encoded {
                Ok(event) => return Some(event),
                Err(e) => warn!(error = %e, "Failed to encode stream event"),
            }
        }
    }
}
