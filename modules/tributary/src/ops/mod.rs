//! Sequence combinators.
//!
//! Single-upstream operators (`map`, `filter`, `distinct`, `delay`) pull
//! through and preserve arrival order. `concat` drains inputs one after the
//! other. `zip` and `merge` drive several inputs at once: `zip` in lockstep,
//! `merge` as a race.
//!
//! Every combinator forwards cancellation to every upstream it still holds,
//! and tears itself down when it finishes or fails.

mod concat;
mod delay;
mod distinct;
mod merge;
mod transform;
mod zip;

use std::time::Duration;

use tracing::warn;

use crate::error::{Error, Result};
use crate::sequence::{BoxSequence, Sequence};

pub use concat::Concat;
pub use delay::Delay;
pub use distinct::Distinct;
pub use merge::Merge;
pub use transform::{Filter, Map, TryFilter, TryMap};
pub use zip::{Zip, ZipAll};

// ---------------------------------------------------------------------------
// Shared teardown helpers
// ---------------------------------------------------------------------------

/// Upstream reported exhaustion: mark done and release it.
pub(crate) fn finish<S, T>(done: &mut bool, upstream: &mut S) -> Result<Option<T>>
where
    S: Sequence + ?Sized,
{
    *done = true;
    upstream.cancel()?;
    Ok(None)
}

/// A pull failed: mark done, release upstream, hand back the pull error.
pub(crate) fn abort<S>(done: &mut bool, upstream: &mut S, err: Error) -> Error
where
    S: Sequence + ?Sized,
{
    *done = true;
    if let Err(teardown) = upstream.cancel() {
        warn!(error = %teardown, "Teardown after failed pull also failed");
    }
    err
}

/// Cancel every input, even after a failure; report the first failure.
pub(crate) fn cancel_all<T: Send + 'static>(inputs: &mut [BoxSequence<T>]) -> Result<()> {
    let mut first_err = None;
    for input in inputs.iter_mut() {
        if let Err(e) = input.cancel() {
            first_err.get_or_insert(e);
        }
    }
    first_err.map_or(Ok(()), Err)
}

// ---------------------------------------------------------------------------
// Constructors
// ---------------------------------------------------------------------------

/// Apply `mapper` to every value.
pub fn map<S, F, U>(sequence: S, mapper: F) -> Map<S, F>
where
    S: Sequence,
    F: FnMut(S::Item) -> U + Send,
{
    Map::new(sequence, mapper)
}

/// Apply a fallible `mapper`; the first error aborts the sequence.
pub fn try_map<S, F, U>(sequence: S, mapper: F) -> TryMap<S, F>
where
    S: Sequence,
    F: FnMut(S::Item) -> anyhow::Result<U> + Send,
{
    TryMap::new(sequence, mapper)
}

/// Keep only values matching `predicate`.
pub fn filter<S, P>(sequence: S, predicate: P) -> Filter<S, P>
where
    S: Sequence,
    P: FnMut(&S::Item) -> bool + Send,
{
    Filter::new(sequence, predicate)
}

/// Keep values matching a fallible `predicate`; the first error aborts.
pub fn try_filter<S, P>(sequence: S, predicate: P) -> TryFilter<S, P>
where
    S: Sequence,
    P: FnMut(&S::Item) -> anyhow::Result<bool> + Send,
{
    TryFilter::new(sequence, predicate)
}

/// Drop values equal to the previously yielded one.
pub fn distinct<S>(sequence: S) -> Distinct<S, fn(&S::Item) -> S::Item, S::Item>
where
    S: Sequence,
    S::Item: Clone + PartialEq,
{
    let identity: fn(&S::Item) -> S::Item = <S::Item as Clone>::clone;
    Distinct::new(sequence, identity)
}

/// Drop values whose `selector` output equals that of the previously
/// yielded value. The first value always passes.
pub fn distinct_by<S, F, K>(sequence: S, selector: F) -> Distinct<S, F, K>
where
    S: Sequence,
    F: FnMut(&S::Item) -> K + Send,
    K: PartialEq + Send,
{
    Distinct::new(sequence, selector)
}

/// Hold each value for `period` before yielding it.
pub fn delay<S: Sequence>(sequence: S, period: Duration) -> Delay<S> {
    Delay::new(sequence, period)
}

/// Pair up two sequences step by step; ends with the shorter one.
pub fn zip<A: Sequence, B: Sequence>(left: A, right: B) -> Zip<A, B> {
    Zip::new(left, right)
}

/// Zip any number of same-typed sequences into vectors. With no inputs the
/// result is immediately exhausted.
pub fn zip_all<T: Send + 'static>(inputs: Vec<BoxSequence<T>>) -> ZipAll<T> {
    ZipAll::new(inputs)
}

/// Interleave sequences in the order their values arrive.
pub fn merge<T: Send + 'static>(sources: Vec<BoxSequence<T>>) -> Merge<T> {
    Merge::new(sources)
}

/// Drain each sequence to completion before starting the next.
pub fn concat<T: Send + 'static>(inputs: Vec<BoxSequence<T>>) -> Concat<T> {
    Concat::new(inputs)
}

// ---------------------------------------------------------------------------
// SequenceExt
// ---------------------------------------------------------------------------

/// Fluent combinator methods for every [`Sequence`].
pub trait SequenceExt: Sequence + Sized {
    fn map<F, U>(self, mapper: F) -> Map<Self, F>
    where
        F: FnMut(Self::Item) -> U + Send,
    {
        map(self, mapper)
    }

    fn try_map<F, U>(self, mapper: F) -> TryMap<Self, F>
    where
        F: FnMut(Self::Item) -> anyhow::Result<U> + Send,
    {
        try_map(self, mapper)
    }

    fn filter<P>(self, predicate: P) -> Filter<Self, P>
    where
        P: FnMut(&Self::Item) -> bool + Send,
    {
        filter(self, predicate)
    }

    fn try_filter<P>(self, predicate: P) -> TryFilter<Self, P>
    where
        P: FnMut(&Self::Item) -> anyhow::Result<bool> + Send,
    {
        try_filter(self, predicate)
    }

    fn distinct(self) -> Distinct<Self, fn(&Self::Item) -> Self::Item, Self::Item>
    where
        Self::Item: Clone + PartialEq,
    {
        distinct(self)
    }

    fn distinct_by<F, K>(self, selector: F) -> Distinct<Self, F, K>
    where
        F: FnMut(&Self::Item) -> K + Send,
        K: PartialEq + Send,
    {
        distinct_by(self, selector)
    }

    fn delay(self, period: Duration) -> Delay<Self> {
        delay(self, period)
    }

    fn zip<B: Sequence>(self, other: B) -> Zip<Self, B> {
        zip(self, other)
    }

    fn merge<B>(self, other: B) -> Merge<Self::Item>
    where
        Self: 'static,
        B: Sequence<Item = Self::Item> + 'static,
    {
        merge(vec![self.boxed(), other.boxed()])
    }

    fn concat<B>(self, other: B) -> Concat<Self::Item>
    where
        Self: 'static,
        B: Sequence<Item = Self::Item> + 'static,
    {
        concat(vec![self.boxed(), other.boxed()])
    }

    fn boxed(self) -> BoxSequence<Self::Item>
    where
        Self: 'static,
    {
        Box::new(self)
    }
}

impl<S: Sequence> SequenceExt for S {}
