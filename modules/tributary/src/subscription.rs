//! Exactly-once teardown and the buffered push-to-pull bridge shared by the
//! event adapter and the store's change sequence.

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::sequence::Sequence;

type Release = Box<dyn FnOnce() -> anyhow::Result<()> + Send>;

/// Guard around a release action. The action runs on the first `run()` or
/// on drop, whichever comes first, and never again.
pub struct Teardown {
    label: String,
    release: Option<Release>,
}

impl Teardown {
    pub fn new<F>(label: impl Into<String>, release: F) -> Self
    where
        F: FnOnce() -> anyhow::Result<()> + Send + 'static,
    {
        Self {
            label: label.into(),
            release: Some(Box::new(release)),
        }
    }

    /// Run the release action if it has not run yet.
    pub fn run(&mut self) -> Result<()> {
        let Some(release) = self.release.take() else {
            return Ok(());
        };
        debug!(subscription = %self.label, "Releasing subscription");
        release().map_err(|e| Error::subscription(&self.label, e))
    }

    pub fn is_released(&self) -> bool {
        self.release.is_none()
    }
}

impl Drop for Teardown {
    fn drop(&mut self) {
        if let Err(e) = self.run() {
            warn!(error = %e, "Teardown failed while dropping subscription");
        }
    }
}

// ---------------------------------------------------------------------------
// BufferedSequence
// ---------------------------------------------------------------------------

/// A sequence fed by a push callback through an unbounded queue.
///
/// The subscription that feeds the queue is established before this value
/// exists, so pushes that happen before the first pull are kept. Nothing is
/// ever dropped: a slow consumer accumulates backlog.
pub struct BufferedSequence<T> {
    rx: mpsc::UnboundedReceiver<T>,
    teardown: Teardown,
    done: bool,
}

impl<T> BufferedSequence<T> {
    pub(crate) fn new(rx: mpsc::UnboundedReceiver<T>, teardown: Teardown) -> Self {
        Self {
            rx,
            teardown,
            done: false,
        }
    }

    /// Number of values queued and not yet pulled.
    pub fn pending(&self) -> usize {
        if self.done {
            0
        } else {
            self.rx.len()
        }
    }

    /// Whether the underlying subscription has been released.
    pub fn is_released(&self) -> bool {
        self.teardown.is_released()
    }
}

impl<T> std::fmt::Debug for BufferedSequence<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferedSequence")
            .field("pending", &self.pending())
            .field("released", &self.is_released())
            .finish()
    }
}

#[async_trait]
impl<T: Send + 'static> Sequence for BufferedSequence<T> {
    type Item = T;

    async fn pull_next(&mut self) -> Result<Option<T>> {
        if self.done {
            return Ok(None);
        }
        match self.rx.recv().await {
            Some(value) => Ok(Some(value)),
            None => {
                // Every sender is gone: the source dropped our listener.
                self.done = true;
                self.teardown.run()?;
                Ok(None)
            }
        }
    }

    fn cancel(&mut self) -> Result<()> {
        self.done = true;
        self.rx.close();
        self.teardown.run()
    }
}
