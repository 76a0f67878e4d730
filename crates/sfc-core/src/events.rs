//! Lifecycle notifications.
//!
//! Two delivery paths share one [`ObjectEvent`] value:
//!
//! - observers are called synchronously, in registration order, before the
//!   operation that raised the event continues
//! - subscribers receive a copy over a broadcast channel, filtered by kind
//!   and URN prefix

use std::fmt;
use std::sync::{Arc, RwLock};

use sfc_types::Urn;
use tokio::sync::broadcast;
use tracing::trace;

use crate::instance::Instance;

/// What happened to an object.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventKind {
    Created,
    Altered,
    Dropped,
    BeforeRenamed,
    AfterRenamed,
    BeforeMoved,
    AfterMoved,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// One lifecycle notification.
#[derive(Clone, Debug)]
pub struct ObjectEvent {
    pub kind: EventKind,
    /// URN of the object when the event was raised.
    pub urn: Urn,
    /// For `Before*` events the URN the object is about to take; for
    /// `After*` events the URN it had before.
    pub related_urn: Option<Urn>,
    pub instance: Arc<Instance>,
}

impl ObjectEvent {
    pub fn new(kind: EventKind, instance: &Arc<Instance>) -> Self {
        Self {
            kind,
            urn: instance.urn(),
            related_urn: None,
            instance: instance.clone(),
        }
    }

    pub fn with_related(mut self, urn: Urn) -> Self {
        self.related_urn = Some(urn);
        self
    }
}

/// Synchronous event callback.
pub trait ObjectObserver: Send + Sync {
    fn on_event(&self, event: &ObjectEvent);
}

/// Filter for subscribing to a subset of events.
#[derive(Clone, Debug, Default)]
pub struct EventFilter {
    /// If set, only events of these kinds are delivered.
    pub kinds: Option<Vec<EventKind>>,
    /// If set, only events for objects at or below this URN are delivered.
    pub urn_prefix: Option<Urn>,
}

impl EventFilter {
    pub fn matches(&self, event: &ObjectEvent) -> bool {
        if let Some(ref kinds) = self.kinds {
            if !kinds.contains(&event.kind) {
                return false;
            }
        }
        if let Some(ref prefix) = self.urn_prefix {
            if !prefix.is_prefix_of(&event.urn) {
                return false;
            }
        }
        true
    }
}

/// A broadcast channel receiver for object events.
pub type EventStream = broadcast::Receiver<ObjectEvent>;

struct Subscriber {
    filter: EventFilter,
    sender: broadcast::Sender<ObjectEvent>,
}

/// Per-domain event hub.
pub struct EventBus {
    observers: RwLock<Vec<Arc<dyn ObjectObserver>>>,
    subscribers: RwLock<Vec<Subscriber>>,
    capacity: usize,
}

impl EventBus {
    /// `capacity` bounds each subscriber's channel; slow subscribers lag.
    pub fn new(capacity: usize) -> Self {
        Self {
            observers: RwLock::new(Vec::new()),
            subscribers: RwLock::new(Vec::new()),
            capacity: capacity.max(1),
        }
    }

    pub fn add_observer(&self, observer: Arc<dyn ObjectObserver>) {
        self.observers
            .write()
            .expect("event bus lock poisoned")
            .push(observer);
    }

    /// Returns `false` if `observer` was not registered.
    pub fn remove_observer(&self, observer: &Arc<dyn ObjectObserver>) -> bool {
        let mut observers = self.observers.write().expect("event bus lock poisoned");
        let before = observers.len();
        observers.retain(|o| !Arc::ptr_eq(o, observer));
        observers.len() != before
    }

    pub fn subscribe(&self, filter: EventFilter) -> EventStream {
        let (tx, rx) = broadcast::channel(self.capacity);
        self.subscribers
            .write()
            .expect("event bus lock poisoned")
            .push(Subscriber { filter, sender: tx });
        rx
    }

    /// Notify observers, then route to matching subscribers. Subscribers
    /// whose receivers are gone are pruned.
    pub fn publish(&self, event: ObjectEvent) {
        trace!(kind = %event.kind, urn = %event.urn, "publishing event");
        let observers = self
            .observers
            .read()
            .expect("event bus lock poisoned")
            .clone();
        for observer in &observers {
            observer.on_event(&event);
        }

        let mut subs = self.subscribers.write().expect("event bus lock poisoned");
        subs.retain(|sub| {
            if sub.filter.matches(&event) {
                sub.sender.send(event.clone()).is_ok()
            } else {
                sub.sender.receiver_count() > 0
            }
        });
    }

    pub fn observer_count(&self) -> usize {
        self.observers.read().expect("event bus lock poisoned").len()
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().expect("event bus lock poisoned").len()
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("observers", &self.observer_count())
            .field("subscribers", &self.subscriber_count())
            .field("capacity", &self.capacity)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::offline_catalog;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<EventKind>>);

    impl ObjectObserver for Recorder {
        fn on_event(&self, event: &ObjectEvent) {
            self.0.lock().unwrap().push(event.kind);
        }
    }

    #[test]
    fn filter_by_kind_and_prefix() {
        let domain = offline_catalog();
        let root = domain.root().clone();
        let event = ObjectEvent::new(EventKind::Created, &root);

        assert!(EventFilter::default().matches(&event));
        let kinds = EventFilter {
            kinds: Some(vec![EventKind::Dropped]),
            ..Default::default()
        };
        assert!(!kinds.matches(&event));
        let prefix = EventFilter {
            urn_prefix: Some(root.urn()),
            ..Default::default()
        };
        assert!(prefix.matches(&event));
        let elsewhere = EventFilter {
            urn_prefix: Some(Urn::parse("Other[@Name='x']").unwrap()),
            ..Default::default()
        };
        assert!(!elsewhere.matches(&event));
    }

    #[test]
    fn observers_and_subscribers_both_receive() {
        let domain = offline_catalog();
        let bus = EventBus::new(8);
        let recorder = Arc::new(Recorder::default());
        bus.add_observer(recorder.clone());
        let mut stream = bus.subscribe(EventFilter {
            kinds: Some(vec![EventKind::Altered]),
            ..Default::default()
        });

        bus.publish(ObjectEvent::new(EventKind::Created, domain.root()));
        bus.publish(ObjectEvent::new(EventKind::Altered, domain.root()));

        assert_eq!(*recorder.0.lock().unwrap(), vec![EventKind::Created, EventKind::Altered]);
        assert_eq!(stream.try_recv().unwrap().kind, EventKind::Altered);
        assert!(stream.try_recv().is_err());
    }

    #[test]
    fn dropped_subscribers_are_pruned() {
        let domain = offline_catalog();
        let bus = EventBus::new(8);
        let stream = bus.subscribe(EventFilter::default());
        assert_eq!(bus.subscriber_count(), 1);
        drop(stream);
        bus.publish(ObjectEvent::new(EventKind::Created, domain.root()));
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn remove_observer_by_identity() {
        let bus = EventBus::new(8);
        let observer: Arc<dyn ObjectObserver> = Arc::new(Recorder::default());
        bus.add_observer(observer.clone());
        assert!(bus.remove_observer(&observer));
        assert!(!bus.remove_observer(&observer));
        assert_eq!(bus.observer_count(), 0);
    }
}
