use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, warn};

use crate::protocol::{EventKind, TaskEvent};

/// Publishing half of the bus; daemons depend on this so tests can observe
/// (or drop) events without a live bus.
pub trait EventBus: Send + Sync {
    fn publish(&self, event: TaskEvent);
}

struct Subscription {
    /// `None` receives every topic.
    topic: Option<EventKind>,
    tx: flume::Sender<TaskEvent>,
}

struct BusState {
    subscriptions: Vec<Subscription>,
    delivered: u64,
}

/// In-process event fabric over flume channels.
///
/// Subscriptions are topic-aware: a consumer can take the full firehose or
/// a single [`EventKind`] (the QA escalation feed, say) without filtering on
/// its side. Delivery is fan-out per matching subscription, in publish
/// order per subscriber; closed receivers fall off at the next publish that
/// addresses them. Cloning is cheap and shares the subscription table.
#[derive(Clone)]
pub struct FlumeBus {
    state: Arc<Mutex<BusState>>,
}

impl FlumeBus {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(BusState {
                subscriptions: Vec::new(),
                delivered: 0,
            })),
        }
    }

    /// Subscribe to every topic.
    pub fn subscribe(&self) -> flume::Receiver<TaskEvent> {
        self.add_subscription(None)
    }

    /// Subscribe to a single topic; other events never reach this receiver.
    pub fn subscribe_topic(&self, topic: EventKind) -> flume::Receiver<TaskEvent> {
        self.add_subscription(Some(topic))
    }

    fn add_subscription(&self, topic: Option<EventKind>) -> flume::Receiver<TaskEvent> {
        let (tx, rx) = flume::unbounded();
        self.lock().subscriptions.push(Subscription { topic, tx });
        rx
    }

    /// Number of live subscriptions (any topic).
    pub fn subscriber_count(&self) -> usize {
        self.lock().subscriptions.len()
    }

    /// Total deliveries since the bus was created; a cheap health counter
    /// for dashboards.
    pub fn delivered(&self) -> u64 {
        self.lock().delivered
    }

    fn lock(&self) -> MutexGuard<'_, BusState> {
        self.state.lock().unwrap_or_else(|e| {
            warn!("event bus lock was poisoned, recovering");
            e.into_inner()
        })
    }
}

impl EventBus for FlumeBus {
    fn publish(&self, event: TaskEvent) {
        let topic = event.event_type.topic();
        let mut state = self.lock();

        let mut listeners = 0u64;
        state.subscriptions.retain(|sub| {
            if let Some(wanted) = sub.topic {
                if wanted != event.event_type {
                    // Not addressed; the subscription stays untouched.
                    return true;
                }
            }
            match sub.tx.send(event.clone()) {
                Ok(()) => {
                    listeners += 1;
                    true
                }
                // Receiver dropped; the subscription is dead.
                Err(_) => false,
            }
        });
        state.delivered += listeners;

        if listeners == 0 {
            // Events signalling escalations must not vanish silently.
            debug!(topic, task_id = %event.task_id, "event published with no listeners");
        } else {
            debug!(topic, task_id = %event.task_id, listeners, "event delivered");
        }
    }
}

impl Default for FlumeBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Bus that drops everything; for wiring daemons in tests that don't care.
pub struct NullBus;

impl EventBus for NullBus {
    fn publish(&self, _event: TaskEvent) {}
}
