//! State container with change notification and named actions.
//!
//! A [`Store`] holds an immutable [`Snapshot`] of its state. Every update
//! shallow-merges a partial state into a *new* snapshot, records the pair
//! (new, previous) and synchronously notifies subscribers. The change history
//! is also available as a pull sequence via [`Store::listen_state`], built on
//! the same eager-subscribe bridge as the event adapter.

mod actions;

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, Weak};

use serde_json::Value;
use tokio::sync::mpsc;
use tracing::debug;

use crate::subscription::{BufferedSequence, Teardown};

pub use actions::{ActionTable, Dispatch, DispatchHandle, Outcome};

use actions::Thunk;

/// An immutable state value. Cloning shares it.
pub type Snapshot<S> = Arc<S>;

/// Callback receiving `(new, previous)` after each update.
pub type Subscriber<S> = Arc<dyn Fn(&Snapshot<S>, &Snapshot<S>) + Send + Sync>;

/// Sequence of `(new, previous)` snapshot pairs from [`Store::listen_state`].
pub type StateSequence<S> = BufferedSequence<(Snapshot<S>, Snapshot<S>)>;

/// State that can absorb a partial update.
pub trait Mergeable: Send + Sync + 'static {
    type Partial: Send + 'static;

    /// Build the next state from `self` and `partial`. `self` is left as is.
    fn merge(&self, partial: Self::Partial) -> Self;
}

/// JSON objects merge key by key, one level deep. A partial that is not an
/// object (including `null`) leaves the state unchanged.
impl Mergeable for Value {
    type Partial = Value;

    fn merge(&self, partial: Value) -> Value {
        match partial {
            Value::Object(patch) => {
                let mut next = match self {
                    Value::Object(current) => current.clone(),
                    _ => serde_json::Map::new(),
                };
                next.extend(patch);
                Value::Object(next)
            }
            _ => self.clone(),
        }
    }
}

struct Cells<S> {
    current: Snapshot<S>,
    previous: Option<Snapshot<S>>,
    subscribers: Vec<(u64, Subscriber<S>)>,
    next_id: u64,
    // Transitions not yet delivered, oldest first.
    outbox: VecDeque<(Snapshot<S>, Snapshot<S>)>,
    // Set while some caller is delivering the outbox.
    draining: bool,
}

struct Inner<S: Mergeable> {
    cells: Mutex<Cells<S>>,
    actions: RwLock<HashMap<String, Thunk<S>>>,
}

/// Handle to a state container. Clones share the same state.
pub struct Store<S: Mergeable> {
    inner: Arc<Inner<S>>,
}

impl<S: Mergeable> Clone for Store<S> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<S: Mergeable> Store<S> {
    pub fn new(initial: S) -> Self {
        Self {
            inner: Arc::new(Inner {
                cells: Mutex::new(Cells {
                    current: Arc::new(initial),
                    previous: None,
                    subscribers: Vec::new(),
                    next_id: 1,
                    outbox: VecDeque::new(),
                    draining: false,
                }),
                actions: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Create a store with an initial action table.
    pub fn with_actions(initial: S, actions: ActionTable<S>) -> Self {
        let store = Self::new(initial);
        store.register_actions(actions);
        store
    }

    fn cells(&self) -> MutexGuard<'_, Cells<S>> {
        self.inner.cells.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get_state(&self) -> Snapshot<S> {
        self.cells().current.clone()
    }

    /// The snapshot replaced by the most recent update, if any.
    pub fn previous_state(&self) -> Option<Snapshot<S>> {
        self.cells().previous.clone()
    }

    /// Merge `partial` into the current state and notify subscribers.
    /// Returns the new snapshot.
    ///
    /// Transitions are delivered in the order they were applied. If another
    /// caller is already delivering (another thread, or a subscriber that
    /// updates the store), this transition is queued and that caller
    /// delivers it.
    pub fn update_state(&self, partial: S::Partial) -> Snapshot<S> {
        let next = {
            let mut cells = self.cells();
            let next = Arc::new(cells.current.merge(partial));
            let previous = std::mem::replace(&mut cells.current, next.clone());
            cells.previous = Some(previous.clone());
            cells.outbox.push_back((next.clone(), previous));
            if cells.draining {
                return next;
            }
            cells.draining = true;
            next
        };

        let _guard = DrainGuard { store: self };
        loop {
            let ((new, previous), subscribers) = {
                let mut cells = self.cells();
                let Some(transition) = cells.outbox.pop_front() else {
                    cells.draining = false;
                    break;
                };
                let subscribers: Vec<Subscriber<S>> =
                    cells.subscribers.iter().map(|(_, s)| s.clone()).collect();
                (transition, subscribers)
            };

            // Subscribers run unlocked so they may read or update the store.
            for subscriber in &subscribers {
                subscriber(&new, &previous);
            }
        }
        next
    }

    /// Compute the partial from the current state, then merge it.
    pub fn update_state_with<F>(&self, reducer: F) -> Snapshot<S>
    where
        F: FnOnce(&S) -> S::Partial,
    {
        let current = self.get_state();
        self.update_state(reducer(&current))
    }

    /// Register a callback for every future update.
    pub fn subscribe<F>(&self, callback: F) -> Unsubscribe<S>
    where
        F: Fn(&Snapshot<S>, &Snapshot<S>) + Send + Sync + 'static,
    {
        let mut cells = self.cells();
        let id = cells.next_id;
        cells.next_id += 1;
        cells.subscribers.push((id, Arc::new(callback)));
        Unsubscribe {
            inner: Arc::downgrade(&self.inner),
            id,
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.cells().subscribers.len()
    }

    /// Sequence of `(new, previous)` pairs. Subscribes immediately, so
    /// updates made before the first pull are queued.
    pub fn listen_state(&self) -> StateSequence<S> {
        let (tx, rx) = mpsc::unbounded_channel();
        let unsubscribe = self.subscribe(move |next, previous| {
            let _ = tx.send((next.clone(), previous.clone()));
        });
        debug!(subscriber = unsubscribe.id, "Listening to store changes");

        let teardown = Teardown::new("state", move || {
            unsubscribe.unsubscribe();
            Ok(())
        });
        BufferedSequence::new(rx, teardown)
    }
}

/// Releases the delivery role if a subscriber panics mid-delivery.
struct DrainGuard<'a, S: Mergeable> {
    store: &'a Store<S>,
}

impl<S: Mergeable> Drop for DrainGuard<'_, S> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            let mut cells = self.store.cells();
            cells.outbox.clear();
            cells.draining = false;
        }
    }
}

/// Removes a subscriber. Calling it more than once is harmless.
pub struct Unsubscribe<S: Mergeable> {
    inner: Weak<Inner<S>>,
    id: u64,
}

impl<S: Mergeable> Unsubscribe<S> {
    /// Returns whether a subscriber was actually removed.
    pub fn unsubscribe(&self) -> bool {
        let Some(inner) = self.inner.upgrade() else {
            return false;
        };
        let mut cells = inner.cells.lock().unwrap_or_else(PoisonError::into_inner);
        let before = cells.subscribers.len();
        cells.subscribers.retain(|(id, _)| *id != self.id);
        before != cells.subscribers.len()
    }
}
