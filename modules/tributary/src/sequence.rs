//! The pull-based sequence contract.
//!
//! A sequence is pulled one value at a time and can be cancelled at any
//! point. `Ok(None)` signals exhaustion; once a sequence has returned it (or
//! has been cancelled) every later pull returns `Ok(None)` again without
//! touching upstream. Dropping a sequence releases it the same way `cancel`
//! does.

use async_trait::async_trait;
use futures::Stream;

use crate::error::Result;

/// A cancellable, lazily-driven source of values.
#[async_trait]
pub trait Sequence: Send {
    type Item: Send + 'static;

    /// Pull the next value, suspending until one is available.
    async fn pull_next(&mut self) -> Result<Option<Self::Item>>;

    /// Release upstream resources. Idempotent: teardown runs at most once.
    fn cancel(&mut self) -> Result<()>;
}

/// Type-erased sequence, used wherever inputs of different concrete types
/// share an item type (merge, concat, zip_all).
pub type BoxSequence<T> = Box<dyn Sequence<Item = T>>;

#[async_trait]
impl<S: Sequence + ?Sized> Sequence for Box<S> {
    type Item = S::Item;

    async fn pull_next(&mut self) -> Result<Option<Self::Item>> {
        (**self).pull_next().await
    }

    fn cancel(&mut self) -> Result<()> {
        (**self).cancel()
    }
}

// ---------------------------------------------------------------------------
// FromIter: finite sequence over an iterator
// ---------------------------------------------------------------------------

/// A finite sequence yielding the items of an iterator.
pub struct FromIter<I> {
    iter: Option<I>,
}

/// Build a finite sequence from anything iterable.
pub fn from_iter<I>(values: I) -> FromIter<I::IntoIter>
where
    I: IntoIterator,
    I::IntoIter: Send,
    I::Item: Send + 'static,
{
    FromIter {
        iter: Some(values.into_iter()),
    }
}

#[async_trait]
impl<I> Sequence for FromIter<I>
where
    I: Iterator + Send,
    I::Item: Send + 'static,
{
    type Item = I::Item;

    async fn pull_next(&mut self) -> Result<Option<Self::Item>> {
        let next = self.iter.as_mut().and_then(Iterator::next);
        if next.is_none() {
            // Iterators are not required to be fused.
            self.iter = None;
        }
        Ok(next)
    }

    fn cancel(&mut self) -> Result<()> {
        self.iter = None;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Stream bridge
// ---------------------------------------------------------------------------

/// Expose a sequence as a `futures::Stream`.
///
/// The stream ends after exhaustion or after yielding the first error.
/// Dropping the stream drops (and so releases) the sequence.
pub fn into_stream<S>(sequence: S) -> impl Stream<Item = Result<S::Item>> + Send
where
    S: Sequence + 'static,
{
    futures::stream::unfold(Some(sequence), |state| async move {
        let mut sequence = state?;
        match sequence.pull_next().await {
            Ok(Some(value)) => Some((Ok(value), Some(sequence))),
            Ok(None) => None,
            Err(e) => Some((Err(e), None)),
        }
    })
}
