//! Named-event dispatcher with signature-matched subscribers.
//!
//! Architecture:
//! - Subscribers are kept in insertion order; dispatch order = subscription order
//! - dispatch() snapshots the list, then calls each subscriber through
//!   `call_matching_params` with the same positional/named context
//! - The first failing subscriber aborts the chain and its error is returned
//!
//! Subscribing or unsubscribing from inside a subscriber is allowed: the running
//! dispatch keeps iterating its snapshot, the change applies to the next one.

use log::debug;
use std::sync::{Arc, RwLock, Weak};

use super::matcher::{DispatchError, Signature, Subscriber, call_matching_params, handler};
use crate::entities::{AttrValue, Attrs};

type SubscriberList = Arc<RwLock<Vec<Subscriber>>>;

/// Ordered subscriber collection for browser events.
///
/// Cloning shares the subscriber list.
#[derive(Clone, Default)]
pub struct EventsDispatcher {
    subscribers: SubscriberList,
}

impl std::fmt::Debug for EventsDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventsDispatcher")
            .field("subscribers", &self.len())
            .finish()
    }
}

impl EventsDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a subscriber. The returned handle removes exactly this instance.
    pub fn subscribe(&self, subscriber: Subscriber) -> SubscriptionHandle {
        debug!("Subscribing {}", subscriber.signature().name());
        self.subscribers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(Arc::clone(&subscriber));
        SubscriptionHandle {
            subscribers: Arc::downgrade(&self.subscribers),
            subscriber,
        }
    }

    /// Subscribe a closure with the given signature.
    ///
    /// # Example
    /// ```ignore
    /// dispatcher.on(Signature::new("on_move").required("x").required("y"), |args| {
    ///     info!("moved to {:?},{:?}", args.get("x"), args.get("y"));
    ///     Ok(())
    /// });
    /// ```
    pub fn on<F>(&self, signature: Signature, func: F) -> SubscriptionHandle
    where
        F: Fn(&Attrs) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.subscribe(handler(signature, func))
    }

    /// Remove the first registered occurrence of `subscriber`.
    pub fn unsubscribe(&self, subscriber: &Subscriber) -> Result<(), DispatchError> {
        remove_first(&self.subscribers, subscriber)
    }

    /// Invoke every subscriber, in subscription order, with the same context.
    pub fn dispatch(&self, positional: &[AttrValue], named: &Attrs) -> Result<(), DispatchError> {
        let snapshot: Vec<Subscriber> = self
            .subscribers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();

        for subscriber in &snapshot {
            call_matching_params(subscriber.as_ref(), positional, named)?;
        }
        Ok(())
    }

    /// Dispatch a browser event: event name first positional, payload entries named.
    pub fn dispatch_event(&self, event: &str, data: &Attrs) -> Result<(), DispatchError> {
        debug!("Dispatching event '{}' with keys {:?}", event, data.keys_sorted());
        self.dispatch(&[AttrValue::from(event)], data)
    }

    pub fn len(&self) -> usize {
        self.subscribers.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop all subscribers
    pub fn clear(&self) {
        self.subscribers.write().unwrap_or_else(|e| e.into_inner()).clear();
    }
}

/// Unsubscribe handle returned by [`EventsDispatcher::subscribe`].
///
/// Holds the dispatcher weakly; once the dispatcher is gone, unsubscribing
/// reports `NotSubscribed`.
pub struct SubscriptionHandle {
    subscribers: Weak<RwLock<Vec<Subscriber>>>,
    subscriber: Subscriber,
}

impl std::fmt::Debug for SubscriptionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionHandle")
            .field("subscriber", &self.subscriber.signature().name())
            .finish()
    }
}

impl SubscriptionHandle {
    /// The subscriber this handle controls
    pub fn subscriber(&self) -> &Subscriber {
        &self.subscriber
    }

    /// Remove the subscriber from its dispatcher.
    pub fn unsubscribe(self) -> Result<(), DispatchError> {
        match self.subscribers.upgrade() {
            Some(list) => remove_first(&list, &self.subscriber),
            None => Err(not_subscribed(&self.subscriber)),
        }
    }
}

fn remove_first(list: &RwLock<Vec<Subscriber>>, subscriber: &Subscriber) -> Result<(), DispatchError> {
    let mut subs = list.write().unwrap_or_else(|e| e.into_inner());
    match subs.iter().position(|s| Arc::ptr_eq(s, subscriber)) {
        Some(idx) => {
            subs.remove(idx);
            debug!("Unsubscribed {}", subscriber.signature().name());
            Ok(())
        }
        None => Err(not_subscribed(subscriber)),
    }
}

fn not_subscribed(subscriber: &Subscriber) -> DispatchError {
    DispatchError::NotSubscribed {
        subscriber: subscriber.signature().name().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicI32, Ordering};

    /// Subscriber that records its name into a shared log.
    fn recorder(name: &'static str, log: &Arc<Mutex<Vec<String>>>) -> Subscriber {
        let log = Arc::clone(log);
        handler(Signature::new(name), move |_| {
            log.lock().unwrap().push(name.to_string());
            Ok(())
        })
    }

    #[test]
    fn test_dispatch_order_and_unsubscribe() {
        let bus = EventsDispatcher::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let a = recorder("A", &log);
        let b = recorder("B", &log);
        let c = recorder("C", &log);
        bus.subscribe(Arc::clone(&a));
        bus.subscribe(Arc::clone(&b));
        bus.subscribe(Arc::clone(&c));

        bus.dispatch(&[], &Attrs::new()).unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["A", "B", "C"]);

        bus.unsubscribe(&b).unwrap();
        log.lock().unwrap().clear();
        bus.dispatch(&[], &Attrs::new()).unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["A", "C"]);
    }

    #[test]
    fn test_unsubscribe_unknown_fails() {
        let bus = EventsDispatcher::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let a = recorder("A", &log);
        let err = bus.unsubscribe(&a).unwrap_err();
        assert!(matches!(err, DispatchError::NotSubscribed { ref subscriber } if subscriber == "A"));
    }

    #[test]
    fn test_handle_removes_exactly_one_instance() {
        let bus = EventsDispatcher::new();
        let counter = Arc::new(AtomicI32::new(0));
        let c = Arc::clone(&counter);
        let sub = handler(Signature::new("count"), move |_| {
            c.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        // Same instance twice: duplicates are allowed
        let first = bus.subscribe(Arc::clone(&sub));
        bus.subscribe(Arc::clone(&sub));
        bus.dispatch(&[], &Attrs::new()).unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 2);

        first.unsubscribe().unwrap();
        assert_eq!(bus.len(), 1);
        bus.dispatch(&[], &Attrs::new()).unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_handle_after_dispatcher_dropped() {
        let bus = EventsDispatcher::new();
        let handle = bus.on(Signature::new("gone"), |_| Ok(()));
        drop(bus);
        assert!(matches!(handle.unsubscribe(), Err(DispatchError::NotSubscribed { .. })));
    }

    #[test]
    fn test_dispatch_event_routes_name_and_payload() {
        let bus = EventsDispatcher::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let s = Arc::clone(&seen);
        bus.on(Signature::new("by_name").required("event"), move |args| {
            s.lock().unwrap().push(format!("event={}", args.get_str("event").unwrap_or("?")));
            Ok(())
        });
        let s = Arc::clone(&seen);
        bus.on(Signature::new("by_payload").required("x").optional("y"), move |args| {
            s.lock().unwrap().push(format!("x={:?} y={:?}", args.get_i64("x"), args.get_i64("y")));
            Ok(())
        });

        bus.dispatch_event("click", &Attrs::new().with("x", 3)).unwrap();
        assert_eq!(*seen.lock().unwrap(), vec!["event=click", "x=Some(3) y=None"]);
    }

    #[test]
    fn test_failure_aborts_remaining_subscribers() {
        let bus = EventsDispatcher::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        bus.subscribe(recorder("A", &log));
        bus.on(Signature::new("needs_z").required("z"), |_| Ok(()));
        bus.subscribe(recorder("C", &log));

        let err = bus.dispatch(&[], &Attrs::new()).unwrap_err();
        assert!(matches!(err, DispatchError::Unsatisfied { ref param, .. } if param == "z"));
        assert_eq!(*log.lock().unwrap(), vec!["A"]);
    }

    #[test]
    fn test_mutation_during_dispatch_uses_snapshot() {
        let bus = EventsDispatcher::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let late = recorder("late", &log);
        let b = recorder("B", &log);

        // First subscriber adds `late` and removes `B` mid-dispatch
        let inner = bus.clone();
        let (late_c, b_c, log_c) = (Arc::clone(&late), Arc::clone(&b), Arc::clone(&log));
        let mutator = handler(Signature::new("mutator"), move |_| {
            log_c.lock().unwrap().push("mutator".to_string());
            inner.subscribe(Arc::clone(&late_c));
            inner.unsubscribe(&b_c)?;
            Ok(())
        });
        bus.subscribe(Arc::clone(&mutator));
        bus.subscribe(Arc::clone(&b));

        bus.dispatch(&[], &Attrs::new()).unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["mutator", "B"]);

        bus.unsubscribe(&mutator).unwrap();
        log.lock().unwrap().clear();
        bus.dispatch(&[], &Attrs::new()).unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["late"]);
    }
}
