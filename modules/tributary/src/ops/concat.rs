use std::collections::VecDeque;

use async_trait::async_trait;
use tracing::warn;

use super::cancel_all;
use crate::error::Result;
use crate::sequence::{BoxSequence, Sequence};

/// Drains each input to completion, in order. See [`concat`](super::concat).
pub struct Concat<T> {
    inputs: VecDeque<BoxSequence<T>>,
    done: bool,
}

impl<T> Concat<T> {
    pub(crate) fn new(inputs: Vec<BoxSequence<T>>) -> Self {
        Self {
            inputs: inputs.into(),
            done: false,
        }
    }

    /// Inputs not yet fully drained, including the current one.
    pub fn remaining(&self) -> usize {
        self.inputs.len()
    }
}

#[async_trait]
impl<T: Send + 'static> Sequence for Concat<T> {
    type Item = T;

    async fn pull_next(&mut self) -> Result<Option<T>> {
        if self.done {
            return Ok(None);
        }
        while let Some(current) = self.inputs.front_mut() {
            match current.pull_next().await {
                Ok(Some(value)) => return Ok(Some(value)),
                Ok(None) => {
                    let Some(mut drained) = self.inputs.pop_front() else {
                        continue;
                    };
                    if let Err(e) = drained.cancel() {
                        self.done = true;
                        if let Err(teardown) = cancel_all(self.inputs.make_contiguous()) {
                            warn!(error = %teardown, "Teardown after failed concat release also failed");
                        }
                        return Err(e);
                    }
                }
                Err(e) => {
                    self.done = true;
                    if let Err(teardown) = cancel_all(self.inputs.make_contiguous()) {
                        warn!(error = %teardown, "Teardown after failed concat input also failed");
                    }
                    return Err(e);
                }
            }
        }
        self.done = true;
        Ok(None)
    }

    fn cancel(&mut self) -> Result<()> {
        self.done = true;
        cancel_all(self.inputs.make_contiguous())
    }
}
