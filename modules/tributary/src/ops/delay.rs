use std::time::Duration;

use async_trait::async_trait;

use super::{abort, finish};
use crate::error::Result;
use crate::sequence::Sequence;

/// Holds every value for a fixed period before yielding it.
///
/// The next upstream pull only happens after the previous value has been
/// yielded, so this also paces the upstream: draining N values takes at
/// least N periods.
pub struct Delay<S> {
    upstream: S,
    period: Duration,
    done: bool,
}

impl<S> Delay<S> {
    pub(crate) fn new(upstream: S, period: Duration) -> Self {
        Self {
            upstream,
            period,
            done: false,
        }
    }
}

#[async_trait]
impl<S: Sequence> Sequence for Delay<S> {
    type Item = S::Item;

    async fn pull_next(&mut self) -> Result<Option<S::Item>> {
        if self.done {
            return Ok(None);
        }
        match self.upstream.pull_next().await {
            Ok(Some(value)) => {
                tokio::time::sleep(self.period).await;
                Ok(Some(value))
            }
            Ok(None) => finish(&mut self.done, &mut self.upstream),
            Err(e) => Err(abort(&mut self.done, &mut self.upstream, e)),
        }
    }

    fn cancel(&mut self) -> Result<()> {
        self.done = true;
        self.upstream.cancel()
    }
}
