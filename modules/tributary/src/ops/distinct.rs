use async_trait::async_trait;

use super::{abort, finish};
use crate::error::Result;
use crate::sequence::Sequence;

/// Suppresses values whose selector output equals that of the previously
/// yielded value. See [`distinct_by`](super::distinct_by).
pub struct Distinct<S, F, K> {
    upstream: S,
    selector: F,
    // `None` until the first value is yielded, so any key is accepted first.
    last: Option<K>,
    done: bool,
}

impl<S, F, K> Distinct<S, F, K> {
    pub(crate) fn new(upstream: S, selector: F) -> Self {
        Self {
            upstream,
            selector,
            last: None,
            done: false,
        }
    }
}

#[async_trait]
impl<S, F, K> Sequence for Distinct<S, F, K>
where
    S: Sequence,
    F: FnMut(&S::Item) -> K + Send,
    K: PartialEq + Send,
{
    type Item = S::Item;

    async fn pull_next(&mut self) -> Result<Option<S::Item>> {
        if self.done {
            return Ok(None);
        }
        loop {
            let value = match self.upstream.pull_next().await {
                Ok(Some(value)) => value,
                Ok(None) => return finish(&mut self.done, &mut self.upstream),
                Err(e) => return Err(abort(&mut self.done, &mut self.upstream, e)),
            };
            let key = (self.selector)(&value);
            if self.last.as_ref() != Some(&key) {
                self.last = Some(key);
                return Ok(Some(value));
            }
        }
    }

    fn cancel(&mut self) -> Result<()> {
        self.done = true;
        self.upstream.cancel()
    }
}
