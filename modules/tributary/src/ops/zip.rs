//! Lockstep joins. Every step pulls each input once, concurrently, and
//! yields only when all of them produced a value. The first completion ends
//! the whole sequence; values pulled from the other inputs in that step are
//! discarded, never buffered.

use async_trait::async_trait;
use futures::future::join_all;
use tracing::warn;

use super::cancel_all;
use crate::error::Result;
use crate::sequence::{BoxSequence, Sequence};

/// Pairwise zip of two typed sequences. See [`zip`](super::zip).
pub struct Zip<A, B> {
    left: A,
    right: B,
    done: bool,
}

impl<A, B> Zip<A, B> {
    pub(crate) fn new(left: A, right: B) -> Self {
        Self {
            left,
            right,
            done: false,
        }
    }
}

impl<A: Sequence, B: Sequence> Zip<A, B> {
    /// Cancel both sides, reporting the first failure after trying both.
    fn release(&mut self) -> Result<()> {
        self.done = true;
        let left = self.left.cancel();
        let right = self.right.cancel();
        left.and(right)
    }
}

#[async_trait]
impl<A: Sequence, B: Sequence> Sequence for Zip<A, B> {
    type Item = (A::Item, B::Item);

    async fn pull_next(&mut self) -> Result<Option<Self::Item>> {
        if self.done {
            return Ok(None);
        }
        let (left, right) = futures::join!(self.left.pull_next(), self.right.pull_next());
        match (left, right) {
            (Ok(Some(a)), Ok(Some(b))) => Ok(Some((a, b))),
            (Err(e), _) | (_, Err(e)) => {
                if let Err(teardown) = self.release() {
                    warn!(error = %teardown, "Teardown after failed zip step also failed");
                }
                Err(e)
            }
            _ => {
                self.release()?;
                Ok(None)
            }
        }
    }

    fn cancel(&mut self) -> Result<()> {
        self.release()
    }
}

/// N-ary zip over inputs sharing an item type. See [`zip_all`](super::zip_all).
pub struct ZipAll<T> {
    inputs: Vec<BoxSequence<T>>,
    done: bool,
}

impl<T> ZipAll<T> {
    pub(crate) fn new(inputs: Vec<BoxSequence<T>>) -> Self {
        Self {
            done: inputs.is_empty(),
            inputs,
        }
    }
}

#[async_trait]
impl<T: Send + 'static> Sequence for ZipAll<T> {
    type Item = Vec<T>;

    async fn pull_next(&mut self) -> Result<Option<Vec<T>>> {
        if self.done {
            return Ok(None);
        }
        let results = join_all(self.inputs.iter_mut().map(|input| input.pull_next())).await;

        let mut values = Vec::with_capacity(results.len());
        let mut exhausted = false;
        for result in results {
            match result {
                Ok(Some(value)) => values.push(value),
                Ok(None) => exhausted = true,
                Err(e) => {
                    self.done = true;
                    if let Err(teardown) = cancel_all(&mut self.inputs) {
                        warn!(error = %teardown, "Teardown after failed zip step also failed");
                    }
                    return Err(e);
                }
            }
        }

        if exhausted {
            self.done = true;
            cancel_all(&mut self.inputs)?;
            return Ok(None);
        }
        Ok(Some(values))
    }

    fn cancel(&mut self) -> Result<()> {
        self.done = true;
        cancel_all(&mut self.inputs)
    }
}
