//! Push capabilities and the adapter that turns them into sequences.
//!
//! An [`EventTarget`] is anything that can register and unregister a listener
//! for a named event. [`on`] subscribes to one event name eagerly and returns
//! a [`EventSequence`] that queues every occurrence until it is pulled.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;
use tracing::debug;

use crate::error::{Error, Result};
use crate::subscription::{BufferedSequence, Teardown};

/// Callback invoked once per event occurrence.
pub type Listener<E> = Arc<dyn Fn(E) + Send + Sync>;

/// Handle identifying a registered listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

impl ListenerId {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// A push source of named events.
///
/// Listeners may be invoked any number of times, at any time, from any
/// thread. Closures have no identity, so registration hands back a
/// [`ListenerId`] used for removal.
pub trait EventTarget: Send + Sync + 'static {
    type Event: Send + 'static;

    fn register_listener(
        &self,
        event_name: &str,
        listener: Listener<Self::Event>,
    ) -> anyhow::Result<ListenerId>;

    fn unregister_listener(&self, event_name: &str, id: ListenerId) -> anyhow::Result<()>;
}

impl<T: EventTarget + ?Sized> EventTarget for Arc<T> {
    type Event = T::Event;

    fn register_listener(
        &self,
        event_name: &str,
        listener: Listener<Self::Event>,
    ) -> anyhow::Result<ListenerId> {
        (**self).register_listener(event_name, listener)
    }

    fn unregister_listener(&self, event_name: &str, id: ListenerId) -> anyhow::Result<()> {
        (**self).unregister_listener(event_name, id)
    }
}

/// Sequence of events produced by [`on`].
pub type EventSequence<E> = BufferedSequence<E>;

// ---------------------------------------------------------------------------
// Adapter: two-phase construction
// ---------------------------------------------------------------------------

/// An event subscription that has been described but not yet established.
///
/// `create` has no side effect; `subscribe` registers the listener and starts
/// buffering.
pub struct Adapter<T: EventTarget> {
    event_name: String,
    target: T,
}

impl<T: EventTarget> Adapter<T> {
    pub fn create(event_name: impl Into<String>, target: T) -> Self {
        Self {
            event_name: event_name.into(),
            target,
        }
    }

    /// Register the listener. Events emitted from here on are queued.
    pub fn subscribe(self) -> Result<EventSequence<T::Event>> {
        let Adapter { event_name, target } = self;
        let (tx, rx) = mpsc::unbounded_channel();

        let listener: Listener<T::Event> = Arc::new(move |event| {
            // The receiver only disappears after cancellation.
            let _ = tx.send(event);
        });

        let id = target
            .register_listener(&event_name, listener)
            .map_err(|e| Error::subscription(&event_name, e))?;
        debug!(event = %event_name, listener = id.raw(), "Subscribed to event source");

        let label = event_name.clone();
        let teardown = Teardown::new(label, move || target.unregister_listener(&event_name, id));

        Ok(BufferedSequence::new(rx, teardown))
    }
}

/// Subscribe to `event_name` on `target` and return the event sequence.
pub fn on<T: EventTarget>(event_name: &str, target: T) -> Result<EventSequence<T::Event>> {
    Adapter::create(event_name, target).subscribe()
}

// ---------------------------------------------------------------------------
// Emitter: in-memory event target
// ---------------------------------------------------------------------------

struct Registry<E> {
    next_id: u64,
    listeners: HashMap<String, Vec<(ListenerId, Listener<E>)>>,
}

/// In-memory [`EventTarget`]. Cloning yields another handle to the same
/// listener registry.
pub struct Emitter<E> {
    registry: Arc<Mutex<Registry<E>>>,
}

impl<E> Clone for Emitter<E> {
    fn clone(&self) -> Self {
        Self {
            registry: self.registry.clone(),
        }
    }
}

impl<E> Default for Emitter<E> {
    fn default() -> Self {
        Self {
            registry: Arc::new(Mutex::new(Registry {
                next_id: 1,
                listeners: HashMap::new(),
            })),
        }
    }
}

impl<E: Clone + Send + 'static> Emitter<E> {
    pub fn new() -> Self {
        Self::default()
    }

    fn registry(&self) -> MutexGuard<'_, Registry<E>> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Deliver `event` to every listener of `event_name`, in registration
    /// order. Returns how many listeners were invoked.
    pub fn emit(&self, event_name: &str, event: E) -> usize {
        // Listeners run outside the lock so they may (un)register.
        let listeners: Vec<Listener<E>> = self
            .registry()
            .listeners
            .get(event_name)
            .map(|entries| entries.iter().map(|(_, l)| l.clone()).collect())
            .unwrap_or_default();

        for listener in &listeners {
            listener(event.clone());
        }
        listeners.len()
    }

    /// Drop every listener, as when the underlying element goes away.
    /// Sequences fed by this emitter finish once their backlog is drained.
    pub fn close(&self) {
        let removed: Vec<_> = self.registry().listeners.drain().collect();
        debug!(events = removed.len(), "Emitter closed");
    }

    pub fn listener_count(&self, event_name: &str) -> usize {
        self.registry()
            .listeners
            .get(event_name)
            .map_or(0, Vec::len)
    }
}

impl<E: Clone + Send + 'static> EventTarget for Emitter<E> {
    type Event = E;

    fn register_listener(&self, event_name: &str, listener: Listener<E>) -> anyhow::Result<ListenerId> {
        let mut registry = self.registry();
        let id = ListenerId::new(registry.next_id);
        registry.next_id += 1;
        registry
            .listeners
            .entry(event_name.to_string())
            .or_default()
            .push((id, listener));
        Ok(id)
    }

    fn unregister_listener(&self, event_name: &str, id: ListenerId) -> anyhow::Result<()> {
        let mut registry = self.registry();
        if let Some(entries) = registry.listeners.get_mut(event_name) {
            entries.retain(|(existing, _)| *existing != id);
            if entries.is_empty() {
                registry.listeners.remove(event_name);
            }
        }
        Ok(())
    }
}
