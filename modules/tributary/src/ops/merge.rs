//! Race-based fan-in.
//!
//! Every live source has exactly one pull in flight. Each step yields the
//! first pull to settle and immediately re-issues a pull on that same source;
//! the other pulls keep running untouched. A pull holds its source's lock
//! for as long as it runs, so a source is never pulled twice concurrently,
//! and the merge can still reach every source to cancel it.

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::stream::FuturesUnordered;
use futures::{FutureExt, StreamExt};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::Result;
use crate::sequence::{BoxSequence, Sequence};

type Slot<T> = Arc<Mutex<BoxSequence<T>>>;
type InFlight<T> = BoxFuture<'static, (usize, Result<Option<T>>)>;

fn queue_next<T: Send + 'static>(index: usize, slot: Slot<T>) -> InFlight<T> {
    async move {
        let result = slot.lock().await.pull_next().await;
        (index, result)
    }
    .boxed()
}

/// Cancel a source that no pull is holding.
fn cancel_slot<T: Send + 'static>(slot: &Slot<T>) -> Result<()> {
    match slot.try_lock() {
        Ok(mut source) => source.cancel(),
        // Unreachable once in-flight pulls are settled or dropped; the
        // source is then released when its last handle drops.
        Err(_) => Ok(()),
    }
}

/// Interleaves several sequences in arrival order. See [`merge`](super::merge).
pub struct Merge<T> {
    // Indexed by source; `None` once a source has been released.
    sources: Vec<Option<Slot<T>>>,
    in_flight: FuturesUnordered<InFlight<T>>,
    started: bool,
    done: bool,
}

impl<T: Send + 'static> Merge<T> {
    pub(crate) fn new(sources: Vec<BoxSequence<T>>) -> Self {
        Self {
            sources: sources
                .into_iter()
                .map(|source| Some(Arc::new(Mutex::new(source))))
                .collect(),
            in_flight: FuturesUnordered::new(),
            started: false,
            done: false,
        }
    }

    /// Number of sources still live.
    pub fn live(&self) -> usize {
        self.sources.iter().flatten().count()
    }

    /// Drop every pending pull, then cancel every remaining source.
    /// Reports the first teardown failure after trying all of them.
    fn release(&mut self) -> Result<()> {
        self.done = true;
        self.in_flight = FuturesUnordered::new();

        let mut first_err = None;
        for slot in self.sources.iter_mut().filter_map(Option::take) {
            if let Err(e) = cancel_slot(&slot) {
                first_err.get_or_insert(e);
            }
        }
        first_err.map_or(Ok(()), Err)
    }
}

#[async_trait]
impl<T: Send + 'static> Sequence for Merge<T> {
    type Item = T;

    async fn pull_next(&mut self) -> Result<Option<T>> {
        if self.done {
            return Ok(None);
        }
        if !self.started {
            self.started = true;
            for (index, slot) in self.sources.iter().enumerate() {
                if let Some(slot) = slot {
                    self.in_flight.push(queue_next(index, slot.clone()));
                }
            }
        }

        while let Some((index, result)) = self.in_flight.next().await {
            match result {
                Ok(Some(value)) => {
                    if let Some(slot) = &self.sources[index] {
                        self.in_flight.push(queue_next(index, slot.clone()));
                    }
                    return Ok(Some(value));
                }
                Ok(None) => {
                    debug!(remaining = self.in_flight.len(), "Merge source exhausted");
                    let Some(slot) = self.sources[index].take() else {
                        continue;
                    };
                    if let Err(e) = cancel_slot(&slot) {
                        if let Err(teardown) = self.release() {
                            warn!(error = %teardown, "Teardown after failed merge release also failed");
                        }
                        return Err(e);
                    }
                }
                Err(e) => {
                    if let Err(teardown) = self.release() {
                        warn!(error = %teardown, "Teardown after failed merge source also failed");
                    }
                    return Err(e);
                }
            }
        }

        self.done = true;
        Ok(None)
    }

    fn cancel(&mut self) -> Result<()> {
        self.release()
    }
}
