//! Change-notification bus for synchronized viewer state.
//!
//! Architecture:
//! - Bindings subscribe to change types with callbacks (immediate invocation)
//! - emit() invokes callbacks immediately AND queues the change
//! - poll() drains queued changes, so a sync layer can push them in one batch
//!
//! Callback order: FIFO within the same change type.
//! Cross-type order is the emit order of the queue only.

use log::{trace, warn};
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

/// Maximum queued changes before oldest are evicted
const MAX_QUEUE_SIZE: usize = 1000;

/// Marker trait for change events. Must be Send + Sync + 'static.
pub trait StateEvent: Any + Send + Sync + 'static {
    fn as_any(&self) -> &dyn Any;
    fn type_name(&self) -> &'static str;
}

impl<T: Any + Send + Sync + 'static> StateEvent for T {
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn type_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }
}

type Callback = Arc<dyn Fn(&dyn Any) + Send + Sync>;
type CallbackMap = Arc<RwLock<HashMap<TypeId, Vec<Callback>>>>;

/// Boxed change for queue storage
pub type BoxedEvent = Box<dyn StateEvent>;

/// Typed pub/sub with a pending-change queue.
///
/// Cloning shares callbacks and queue.
#[derive(Clone, Default)]
pub struct StateBus {
    subscribers: CallbackMap,
    queue: Arc<Mutex<Vec<BoxedEvent>>>,
}

impl std::fmt::Debug for StateBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateBus")
            .field("subscriber_types", &self.subscribers.read().map(|s| s.len()).unwrap_or(0))
            .field("queue_len", &self.queue_len())
            .finish()
    }
}

impl StateBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to changes of type E; the callback runs inside emit().
    ///
    /// # Example
    /// ```ignore
    /// bus.subscribe::<TransformChanged, _>(|e| push_to_browser("_transform", e.transform));
    /// ```
    pub fn subscribe<E, F>(&self, callback: F)
    where
        E: StateEvent,
        F: Fn(&E) + Send + Sync + 'static,
    {
        let wrapped: Callback = Arc::new(move |any: &dyn Any| {
            if let Some(event) = any.downcast_ref::<E>() {
                callback(event);
            }
        });
        self.subscribers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .entry(TypeId::of::<E>())
            .or_default()
            .push(wrapped);
    }

    /// Invoke callbacks for E, then queue the change for poll().
    pub fn emit<E: StateEvent>(&self, event: E) {
        notify(&self.subscribers, &event);
        enqueue(&self.queue, Box::new(event));
    }

    /// Drain all queued changes (oldest first).
    pub fn poll(&self) -> Vec<BoxedEvent> {
        std::mem::take(&mut *self.queue.lock().unwrap_or_else(|e| e.into_inner()))
    }

    /// Clear subscribers for type E
    pub fn unsubscribe_all<E: StateEvent>(&self) {
        self.subscribers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&TypeId::of::<E>());
    }

    /// Clear all subscribers and queue
    pub fn clear(&self) {
        self.subscribers.write().unwrap_or_else(|e| e.into_inner()).clear();
        self.queue.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }

    pub fn has_subscribers<E: StateEvent>(&self) -> bool {
        self.subscribers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&TypeId::of::<E>())
            .is_some_and(|v| !v.is_empty())
    }

    pub fn queue_len(&self) -> usize {
        self.queue.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

fn notify<E: StateEvent>(subscribers: &CallbackMap, event: &E) {
    // Clone the callback list so callbacks may subscribe without deadlocking
    let callbacks: Vec<Callback> = subscribers
        .read()
        .unwrap_or_else(|e| e.into_inner())
        .get(&TypeId::of::<E>())
        .cloned()
        .unwrap_or_default();
    trace!("emit {} -> {} callbacks", event.type_name(), callbacks.len());
    for cb in &callbacks {
        cb(event.as_any());
    }
}

fn enqueue(queue: &Mutex<Vec<BoxedEvent>>, event: BoxedEvent) {
    let mut queue = queue.lock().unwrap_or_else(|e| e.into_inner());
    if queue.len() >= MAX_QUEUE_SIZE {
        let evict_count = queue.len() / 2;
        warn!("StateBus queue full ({} changes), evicting oldest {}", queue.len(), evict_count);
        queue.drain(0..evict_count);
    }
    queue.push(event);
}

/// Downcast a polled change to its concrete type.
///
/// Deref to `dyn StateEvent` first: the blanket impl also covers
/// `Box<dyn StateEvent>` itself, whose `as_any` would return the box.
#[inline]
pub fn downcast_event<E: StateEvent>(event: &BoxedEvent) -> Option<&E> {
    (**event).as_any().downcast_ref::<E>()
}
