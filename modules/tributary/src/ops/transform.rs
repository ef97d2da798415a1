//! Stateless pull-through transforms: map and filter, infallible and
//! fallible forms.

use async_trait::async_trait;

use super::{abort, finish};
use crate::error::{Error, Result};
use crate::sequence::Sequence;

/// 1:1 transform. See [`map`](super::map).
pub struct Map<S, F> {
    upstream: S,
    mapper: F,
    done: bool,
}

impl<S, F> Map<S, F> {
    pub(crate) fn new(upstream: S, mapper: F) -> Self {
        Self {
            upstream,
            mapper,
            done: false,
        }
    }
}

#[async_trait]
impl<S, F, U> Sequence for Map<S, F>
where
    S: Sequence,
    F: FnMut(S::Item) -> U + Send,
    U: Send + 'static,
{
    type Item = U;

    async fn pull_next(&mut self) -> Result<Option<U>> {
        if self.done {
            return Ok(None);
        }
        match self.upstream.pull_next().await {
            Ok(Some(value)) => Ok(Some((self.mapper)(value))),
            Ok(None) => finish(&mut self.done, &mut self.upstream),
            Err(e) => Err(abort(&mut self.done, &mut self.upstream, e)),
        }
    }

    fn cancel(&mut self) -> Result<()> {
        self.done = true;
        self.upstream.cancel()
    }
}

/// 1:1 transform whose mapper may fail. A failure aborts the sequence.
pub struct TryMap<S, F> {
    upstream: S,
    mapper: F,
    done: bool,
}

impl<S, F> TryMap<S, F> {
    pub(crate) fn new(upstream: S, mapper: F) -> Self {
        Self {
            upstream,
            mapper,
            done: false,
        }
    }
}

#[async_trait]
impl<S, F, U> Sequence for TryMap<S, F>
where
    S: Sequence,
    F: FnMut(S::Item) -> anyhow::Result<U> + Send,
    U: Send + 'static,
{
    type Item = U;

    async fn pull_next(&mut self) -> Result<Option<U>> {
        if self.done {
            return Ok(None);
        }
        match self.upstream.pull_next().await {
            Ok(Some(value)) => match (self.mapper)(value) {
                Ok(mapped) => Ok(Some(mapped)),
                Err(e) => Err(abort(&mut self.done, &mut self.upstream, Error::Transform(e))),
            },
            Ok(None) => finish(&mut self.done, &mut self.upstream),
            Err(e) => Err(abort(&mut self.done, &mut self.upstream, e)),
        }
    }

    fn cancel(&mut self) -> Result<()> {
        self.done = true;
        self.upstream.cancel()
    }
}

/// 1:{0,1} transform. See [`filter`](super::filter).
pub struct Filter<S, P> {
    upstream: S,
    predicate: P,
    done: bool,
}

impl<S, P> Filter<S, P> {
    pub(crate) fn new(upstream: S, predicate: P) -> Self {
        Self {
            upstream,
            predicate,
            done: false,
        }
    }
}

#[async_trait]
impl<S, P> Sequence for Filter<S, P>
where
    S: Sequence,
    P: FnMut(&S::Item) -> bool + Send,
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
            if (self.predicate)(&value) {
                return Ok(Some(value));
            }
        }
    }

    fn cancel(&mut self) -> Result<()> {
        self.done = true;
        self.upstream.cancel()
    }
}

/// Filter whose predicate may fail. A failure aborts the sequence.
pub struct TryFilter<S, P> {
    upstream: S,
    predicate: P,
    done: bool,
}

impl<S, P> TryFilter<S, P> {
    pub(crate) fn new(upstream: S, predicate: P) -> Self {
        Self {
            upstream,
            predicate,
            done: false,
        }
    }
}

#[async_trait]
impl<S, P> Sequence for TryFilter<S, P>
where
    S: Sequence,
    P: FnMut(&S::Item) -> anyhow::Result<bool> + Send,
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
            match (self.predicate)(&value) {
                Ok(true) => return Ok(Some(value)),
                Ok(false) => continue,
                Err(e) => {
                    return Err(abort(&mut self.done, &mut self.upstream, Error::Transform(e)))
                }
            }
        }
    }

    fn cancel(&mut self) -> Result<()> {
        self.done = true;
        self.upstream.cancel()
    }
}
