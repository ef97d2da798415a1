//! Named actions dispatched against a store.
//!
//! An action receives its arguments, the snapshot current at dispatch time
//! and a [`Dispatch`] handle. It returns an [`Outcome`]: a partial state to
//! merge right away, a deferred computation whose result is merged when it
//! settles, or nothing.
//!
//! Deferred results are merged into whatever state is current when they
//! settle. Updates issued in between are not reconciled: the last update
//! applied wins. Callers that need ordering between asynchronous actions
//! must serialize them. If a deferred action fails, updates it already made
//! through its `Dispatch` handle stay applied.

use std::future::Future;
use std::sync::{Arc, PoisonError};

use futures::future::BoxFuture;
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::{Mergeable, Snapshot, Store};
use crate::error::{Error, Result};

pub(super) type Thunk<S> = Arc<dyn Fn(Value, Snapshot<S>, Dispatch<S>) -> Outcome<S> + Send + Sync>;

/// What an action produced.
pub enum Outcome<S: Mergeable> {
    /// Merge this partial state immediately.
    Partial(S::Partial),
    /// Merge the partial once the future resolves; `Ok(None)` merges nothing.
    Deferred(BoxFuture<'static, anyhow::Result<Option<S::Partial>>>),
    /// No state change.
    Nothing,
}

impl<S: Mergeable> Outcome<S> {
    pub fn deferred<F>(future: F) -> Self
    where
        F: Future<Output = anyhow::Result<Option<S::Partial>>> + Send + 'static,
    {
        Self::Deferred(Box::pin(future))
    }
}

/// Restricted store handle passed to actions. Same update surface as the
/// store itself.
pub struct Dispatch<S: Mergeable> {
    store: Store<S>,
}

impl<S: Mergeable> Clone for Dispatch<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
        }
    }
}

impl<S: Mergeable> Dispatch<S> {
    pub fn update_state(&self, partial: S::Partial) -> Snapshot<S> {
        self.store.update_state(partial)
    }

    pub fn update_state_with<F>(&self, reducer: F) -> Snapshot<S>
    where
        F: FnOnce(&S) -> S::Partial,
    {
        self.store.update_state_with(reducer)
    }

    pub fn get_state(&self) -> Snapshot<S> {
        self.store.get_state()
    }
}

/// Builder for a set of named actions.
pub struct ActionTable<S: Mergeable> {
    entries: Vec<(String, Thunk<S>)>,
}

impl<S: Mergeable> Default for ActionTable<S> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<S: Mergeable> ActionTable<S> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an action. A later entry with the same name replaces the earlier.
    pub fn action<F>(mut self, name: impl Into<String>, action: F) -> Self
    where
        F: Fn(Value, Snapshot<S>, Dispatch<S>) -> Outcome<S> + Send + Sync + 'static,
    {
        self.entries.push((name.into(), Arc::new(action)));
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Completion handle for a dispatched action.
///
/// Dropping it does not cancel a deferred action; it keeps running.
pub struct DispatchHandle {
    name: String,
    task: Option<JoinHandle<Result<()>>>,
}

impl DispatchHandle {
    /// Whether the action returned a deferred outcome.
    pub fn is_deferred(&self) -> bool {
        self.task.is_some()
    }

    /// Wait until the action's outcome has been applied.
    pub async fn settled(self) -> Result<()> {
        let Some(task) = self.task else {
            return Ok(());
        };
        match task.await {
            Ok(result) => result,
            Err(join) => Err(Error::Action {
                name: self.name,
                source: join.into(),
            }),
        }
    }
}

impl<S: Mergeable> Store<S> {
    /// Replace the action table.
    pub fn register_actions(&self, table: ActionTable<S>) {
        let mut actions = self
            .inner
            .actions
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        actions.clear();
        actions.extend(table.entries);
        debug!(count = actions.len(), "Registered store actions");
    }

    /// Names of the registered actions, sorted.
    pub fn action_names(&self) -> Vec<String> {
        let actions = self
            .inner
            .actions
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        let mut names: Vec<String> = actions.keys().cloned().collect();
        names.sort();
        names
    }

    /// Invoke the action registered under `name`.
    ///
    /// Immediate outcomes are merged before this returns. Deferred outcomes
    /// are driven on the current Tokio runtime; await the returned handle to
    /// observe their completion or failure.
    pub fn dispatch(&self, name: &str, args: Value) -> Result<DispatchHandle> {
        let thunk = self
            .inner
            .actions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
            .ok_or_else(|| Error::UnknownAction(name.to_string()))?;

        let dispatch = Dispatch {
            store: self.clone(),
        };

        match thunk(args, self.get_state(), dispatch) {
            Outcome::Partial(partial) => {
                self.update_state(partial);
                Ok(DispatchHandle {
                    name: name.to_string(),
                    task: None,
                })
            }
            Outcome::Nothing => Ok(DispatchHandle {
                name: name.to_string(),
                task: None,
            }),
            Outcome::Deferred(future) => {
                let runtime = tokio::runtime::Handle::try_current().map_err(|e| Error::Action {
                    name: name.to_string(),
                    source: e.into(),
                })?;

                let store = self.clone();
                let action = name.to_string();
                let task = runtime.spawn(async move {
                    match future.await {
                        Ok(Some(partial)) => {
                            store.update_state(partial);
                            Ok(())
                        }
                        Ok(None) => Ok(()),
                        Err(source) => {
                            warn!(action = %action, error = %source, "Deferred action failed");
                            Err(Error::Action {
                                name: action,
                                source,
                            })
                        }
                    }
                });

                Ok(DispatchHandle {
                    name: name.to_string(),
                    task: Some(task),
                })
            }
        }
    }
}
