//! In-process multi-producer, multi-consumer event bus.
//!
//! `publish` delivers to all current subscribers sequentially. The
//! subscriber list is copy-on-write: publishing iterates an immutable
//! snapshot, so a subscriber may unsubscribe (or new ones may subscribe)
//! mid-dispatch without affecting the current round. A panicking subscriber
//! is logged at `warn` and does not disrupt the others.

use std::{
    panic::{AssertUnwindSafe, catch_unwind},
    sync::{Arc, Mutex, RwLock},
};

use tracing::warn;

use crate::diagnostics::{DiagnosticEvent, LogEvent};

/// Events published by the pipeline and its collaborators.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// A pipeline stage began.
    StageStarted { stage: String },
    /// A pipeline stage finished successfully.
    StageCompleted { stage: String, duration_ms: u64 },
    /// A pipeline stage failed; the error text is carried for reporters.
    StageFailed { stage: String, message: String },
    /// A non-fatal diagnostic from any subsystem.
    Diagnostic(DiagnosticEvent),
    /// A structured log/report event.
    Log(LogEvent),
}

type Handler = Arc<dyn Fn(&EngineEvent) + Send + Sync>;

struct SubscriberEntry {
    id: u64,
    handler: Handler,
}

struct BusState {
    subscribers: Arc<Vec<Arc<SubscriberEntry>>>,
    next_id: u64,
}

/// The bus itself. Cheap to clone; clones share the subscriber list.
#[derive(Clone)]
pub struct EventBus {
    state: Arc<RwLock<BusState>>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(BusState {
                subscribers: Arc::new(Vec::new()),
                next_id: 0,
            })),
        }
    }

    /// Register a handler; dropping or disposing the returned subscription
    /// removes it.
    pub fn subscribe<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&EngineEvent) + Send + Sync + 'static,
    {
        let mut state = self.state.write().expect("event bus lock poisoned");
        let id = state.next_id;
        state.next_id += 1;

        let mut next = state.subscribers.as_ref().clone();
        next.push(Arc::new(SubscriberEntry {
            id,
            handler: Arc::new(handler),
        }));
        state.subscribers = Arc::new(next);

        Subscription {
            id,
            state: Arc::downgrade(&self.state),
            disposed: Mutex::new(false),
        }
    }

    /// Deliver an event to every subscriber present at publish time.
    pub fn publish(&self, event: EngineEvent) {
        let snapshot = {
            let state = self.state.read().expect("event bus lock poisoned");
            state.subscribers.clone()
        };
        for entry in snapshot.iter() {
            let handler = entry.handler.clone();
            if catch_unwind(AssertUnwindSafe(|| handler(&event))).is_err() {
                warn!("event bus subscriber {} panicked; continuing", entry.id);
            }
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.state
            .read()
            .expect("event bus lock poisoned")
            .subscribers
            .len()
    }

    fn remove(state: &Arc<RwLock<BusState>>, id: u64) {
        if let Ok(mut state) = state.write() {
            let next: Vec<Arc<SubscriberEntry>> = state
                .subscribers
                .iter()
                .filter(|entry| entry.id != id)
                .cloned()
                .collect();
            state.subscribers = Arc::new(next);
        }
    }
}

/// Disposer handle for a subscription. Unsubscribes on `dispose` or drop;
/// both paths are idempotent.
pub struct Subscription {
    id: u64,
    state: std::sync::Weak<RwLock<BusState>>,
    disposed: Mutex<bool>,
}

impl Subscription {
    pub fn dispose(&self) {
        let mut disposed = self.disposed.lock().expect("subscription lock poisoned");
        if *disposed {
            return;
        }
        *disposed = true;
        if let Some(state) = self.state.upgrade() {
            EventBus::remove(&state, self.id);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.dispose();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    };

    use super::{EngineEvent, EventBus};

    fn stage_event() -> EngineEvent {
        EngineEvent::StageStarted {
            stage: "dtifx.pipeline.plan".into(),
        }
    }

    /// Every subscriber sees every published event.
    #[test]
    fn delivers_to_all_subscribers() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        let a = {
            let count = count.clone();
            bus.subscribe(move |_| {
                count.fetch_add(1, Ordering::SeqCst);
            })
        };
        let b = {
            let count = count.clone();
            bus.subscribe(move |_| {
                count.fetch_add(1, Ordering::SeqCst);
            })
        };
        bus.publish(stage_event());
        assert_eq!(count.load(Ordering::SeqCst), 2);
        drop((a, b));
    }

    /// Disposal removes the handler; double-dispose is a no-op.
    #[test]
    fn unsubscribe_stops_delivery() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        let subscription = {
            let count = count.clone();
            bus.subscribe(move |_| {
                count.fetch_add(1, Ordering::SeqCst);
            })
        };
        bus.publish(stage_event());
        subscription.dispose();
        subscription.dispose();
        bus.publish(stage_event());
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(bus.subscriber_count(), 0);
    }

    /// A panicking subscriber does not disrupt the rest of the round.
    #[test]
    fn panicking_subscriber_is_contained() {
        crate::testutil::init_test_logging();
        let bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        let _panicker = bus.subscribe(|_| panic!("boom"));
        let _counter = {
            let count = count.clone();
            bus.subscribe(move |_| {
                count.fetch_add(1, Ordering::SeqCst);
            })
        };
        bus.publish(stage_event());
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    /// Dropping the handle also unsubscribes.
    #[test]
    fn drop_unsubscribes() {
        let bus = EventBus::new();
        {
            let _subscription = bus.subscribe(|_| {});
            assert_eq!(bus.subscriber_count(), 1);
        }
        assert_eq!(bus.subscriber_count(), 0);
    }
}
