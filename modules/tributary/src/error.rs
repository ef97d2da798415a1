//! Typed errors for sequences, subscriptions, actions and driven tasks.

use thiserror::Error;

/// Errors surfaced by sequences, the store and the driver.
#[derive(Debug, Error)]
pub enum Error {
    /// A mapper, predicate or selector failed. Aborts the sequence it ran in.
    #[error("transform failed: {0}")]
    Transform(#[source] anyhow::Error),

    /// Registering or removing a listener on an event target failed
    #[error("subscription to '{event}' failed: {source}")]
    Subscription {
        event: String,
        #[source]
        source: anyhow::Error,
    },

    /// No action registered under this name
    #[error("unknown action: {0}")]
    UnknownAction(String),

    /// A deferred action rejected. Updates it already applied remain.
    #[error("action '{name}' failed: {source}")]
    Action {
        name: String,
        #[source]
        source: anyhow::Error,
    },

    /// A task joined by the driver failed or panicked
    #[error("task '{name}' failed: {source}")]
    Task {
        name: String,
        #[source]
        source: anyhow::Error,
    },
}

impl Error {
    pub(crate) fn subscription(event: &str, source: anyhow::Error) -> Self {
        Self::Subscription {
            event: event.to_string(),
            source,
        }
    }
}

/// Result type alias for sequence and store operations.
pub type Result<T> = std::result::Result<T, Error>;
