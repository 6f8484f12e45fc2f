//! Pub/Sub Event Bus for player state notifications.
//!
//! Architecture:
//! - Subscribers register callbacks per event type (immediate invocation)
//! - channel() turns a subscription into a crossbeam receiver stream
//! - A bus built with `with_queue()` also queues every event; poll() returns
//!   them for batch processing in the caller's loop. Plain `new()` keeps no
//!   queue, so subscribers that never poll pay nothing.
//!
//! Player sessions emit from worker threads, so callbacks must be cheap and
//! must not call back into the pool.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use crossbeam_channel::{unbounded, Receiver};
use log::warn;

/// Maximum events in queue before oldest are evicted
const MAX_QUEUE_SIZE: usize = 1000;

/// Marker trait for events. Events must be Send + Sync + 'static.
pub trait Event: Any + Send + Sync + 'static {
    fn as_any(&self) -> &dyn Any;
    fn type_name(&self) -> &'static str;
}

impl<T: Any + Send + Sync + 'static> Event for T {
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn type_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }
}

type Callback = Arc<dyn Fn(&dyn Any) + Send + Sync>;
type Subscribers = Arc<RwLock<HashMap<TypeId, Vec<Callback>>>>;
type Queue = Option<Arc<Mutex<Vec<BoxedEvent>>>>;

/// Boxed event for queue storage
pub type BoxedEvent = Box<dyn Event>;

/// Shared emit path for bus and emitter handles
fn dispatch<E: Event + Clone>(subscribers: &Subscribers, queue: &Queue, event: E) {
    if let Some(cbs) = subscribers
        .read()
        .unwrap_or_else(|e| e.into_inner())
        .get(&TypeId::of::<E>())
    {
        for cb in cbs {
            cb(&event);
        }
    }

    let Some(queue) = queue else {
        return;
    };
    let mut queue = queue.lock().unwrap_or_else(|e| e.into_inner());
    if queue.len() >= MAX_QUEUE_SIZE {
        let evict_count = queue.len() / 2;
        warn!("Event queue full ({} events), evicting oldest {}", queue.len(), evict_count);
        queue.drain(0..evict_count);
    }
    queue.push(Box::new(event));
}

/// Pub/Sub Event Bus with deferred processing support.
#[derive(Clone)]
pub struct EventBus {
    subscribers: Subscribers,
    queue: Queue,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_types", &self.subscribers.read().map(|s| s.len()).unwrap_or(0))
            .field("queue_len", &self.queue_len())
            .finish()
    }
}

impl EventBus {
    /// Bus with immediate delivery only
    pub fn new() -> Self {
        Self {
            subscribers: Arc::new(RwLock::new(HashMap::new())),
            queue: None,
        }
    }

    /// Bus that also queues every event for `poll()`.
    ///
    /// The owner must poll regularly; past `MAX_QUEUE_SIZE` the oldest half is dropped.
    pub fn with_queue() -> Self {
        Self {
            subscribers: Arc::new(RwLock::new(HashMap::new())),
            queue: Some(Arc::new(Mutex::new(Vec::new()))),
        }
    }

    /// Subscribe to events of type E.
    ///
    /// # Example
    /// ```ignore
    /// bus.subscribe::<PlayerEvent, _>(|e| log::info!("{} -> {:?}", e.url, e.kind));
    /// ```
    pub fn subscribe<E, F>(&self, callback: F)
    where
        E: Event,
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

    /// Subscribe to events of type E as a stream.
    ///
    /// The receiver sees every event emitted after this call. Dropping it turns
    /// the subscription into a no-op.
    pub fn channel<E: Event + Clone>(&self) -> Receiver<E> {
        let (tx, rx) = unbounded();
        self.subscribe::<E, _>(move |e| {
            let _ = tx.send(e.clone());
        });
        rx
    }

    /// Emit event: invoke callbacks immediately, and queue for poll() if enabled.
    pub fn emit<E: Event + Clone>(&self, event: E) {
        dispatch(&self.subscribers, &self.queue, event);
    }

    /// Drain all queued events. Always empty without `with_queue()`.
    pub fn poll(&self) -> Vec<BoxedEvent> {
        match &self.queue {
            Some(queue) => std::mem::take(&mut *queue.lock().unwrap_or_else(|e| e.into_inner())),
            None => Vec::new(),
        }
    }

    /// Get an emitter handle for player sessions.
    pub fn emitter(&self) -> EventEmitter {
        EventEmitter {
            subscribers: Arc::clone(&self.subscribers),
            queue: self.queue.clone(),
        }
    }

    /// Clear subscribers for type E
    pub fn unsubscribe_all<E: Event>(&self) {
        self.subscribers.write().unwrap_or_else(|e| e.into_inner()).remove(&TypeId::of::<E>());
    }

    pub fn queue_len(&self) -> usize {
        self.queue
            .as_ref()
            .map_or(0, |q| q.lock().unwrap_or_else(|e| e.into_inner()).len())
    }
}

/// Lightweight cloneable emitter, handed to every player session.
#[derive(Clone)]
pub struct EventEmitter {
    subscribers: Subscribers,
    queue: Queue,
}

impl std::fmt::Debug for EventEmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventEmitter")
            .field("subscriber_types", &self.subscribers.read().map(|s| s.len()).unwrap_or(0))
            .field("queued", &self.queue.is_some())
            .finish()
    }
}

impl EventEmitter {
    pub fn emit<E: Event + Clone>(&self, event: E) {
        dispatch(&self.subscribers, &self.queue, event);
    }
}

/// Helper: downcast BoxedEvent to concrete type
///
/// Must deref to `dyn Event` before `as_any()`, otherwise the blanket impl for
/// `Box<dyn Event>` answers and the downcast always fails.
#[inline]
pub fn downcast_event<E: Event>(event: &BoxedEvent) -> Option<&E> {
    (**event).as_any().downcast_ref::<E>()
}
