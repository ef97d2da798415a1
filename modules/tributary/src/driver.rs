//! Runs several sequence-consuming routines side by side.
//!
//! Each task is spawned onto the Tokio runtime inside its own tracing span.
//! [`Driver::run`] waits for all of them. The first failure is returned to
//! the caller; what happens to the remaining tasks is decided by the
//! [`FailurePolicy`].

use std::collections::HashMap;
use std::future::Future;

use futures::future::BoxFuture;
use serde::Deserialize;
use tokio::task::JoinSet;
use tracing::{error, info, info_span, Instrument};

use crate::error::{Error, Result};

/// What to do with sibling tasks once one task fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Leave siblings running, detached. The caller gets the error at once
    /// but sequences held by the siblings stay subscribed until those tasks
    /// end on their own.
    #[default]
    Abandon,
    /// Abort siblings and wait for them to unwind, which drops their
    /// sequences and releases every subscription before `run` returns.
    Cancel,
}

impl std::str::FromStr for FailurePolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "abandon" => Ok(Self::Abandon),
            "cancel" => Ok(Self::Cancel),
            other => Err(anyhow::anyhow!("unknown failure policy: {other}")),
        }
    }
}

type Task = BoxFuture<'static, anyhow::Result<()>>;

/// Collects named tasks and runs them concurrently to completion.
#[derive(Default)]
pub struct Driver {
    tasks: Vec<(String, Task)>,
    policy: FailurePolicy,
}

impl Driver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Add a task. Nothing runs until [`Driver::run`].
    pub fn task<F>(mut self, name: impl Into<String>, task: F) -> Self
    where
        F: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.tasks.push((name.into(), Box::pin(task)));
        self
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Start every task and wait for all of them.
    ///
    /// Returns the first failure (an error or a panic) as [`Error::Task`].
    pub async fn run(self) -> Result<()> {
        let mut set = JoinSet::new();
        let mut names = HashMap::new();

        for (name, task) in self.tasks {
            let span = info_span!("task", name = %name);
            let handle = set.spawn(task.instrument(span));
            names.insert(handle.id(), name);
        }
        info!(tasks = names.len(), policy = ?self.policy, "Driver started");

        while let Some(joined) = set.join_next_with_id().await {
            let (id, source) = match joined {
                Ok((id, Ok(()))) => {
                    if let Some(name) = names.remove(&id) {
                        info!(task = %name, "Task finished");
                    }
                    continue;
                }
                Ok((id, Err(source))) => (id, source),
                Err(join) => (join.id(), anyhow::Error::new(join)),
            };

            let name = names.remove(&id).unwrap_or_default();
            error!(task = %name, error = %source, remaining = set.len(), "Task failed");

            match self.policy {
                FailurePolicy::Abandon => set.detach_all(),
                FailurePolicy::Cancel => set.shutdown().await,
            }
            return Err(Error::Task { name, source });
        }

        Ok(())
    }
}
