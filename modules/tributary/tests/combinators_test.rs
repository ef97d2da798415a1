//! Behavior of the combinator set: ordering, pacing, termination and
//! teardown under early cancellation.
//! Timing tests run on paused Tokio time, so they are deterministic.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;
use tokio::time::{sleep, Instant};
use tributary::{
    concat, distinct_by, from_iter, merge, on, zip, zip_all, Emitter, Error, EventTarget,
    Listener, ListenerId, Result, Sequence, SequenceExt,
};

// ---------------------------------------------------------------------------
// Test sequences and targets
// ---------------------------------------------------------------------------

async fn drain<S: Sequence>(seq: &mut S) -> Vec<S::Item> {
    let mut out = Vec::new();
    while let Some(value) = seq.pull_next().await.unwrap() {
        out.push(value);
    }
    out
}

/// Yields each value after its own delay (relative to the previous pull).
struct Timed<T> {
    steps: VecDeque<(u64, T)>,
}

fn timed<T>(steps: Vec<(u64, T)>) -> Timed<T> {
    Timed {
        steps: steps.into(),
    }
}

#[async_trait]
impl<T: Send + 'static> Sequence for Timed<T> {
    type Item = T;

    async fn pull_next(&mut self) -> Result<Option<T>> {
        match self.steps.pop_front() {
            Some((ms, value)) => {
                sleep(Duration::from_millis(ms)).await;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    fn cancel(&mut self) -> Result<()> {
        self.steps.clear();
        Ok(())
    }
}

/// Records every pull result into a shared journal.
struct Tracked<S> {
    label: &'static str,
    inner: S,
    journal: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl<S> Sequence for Tracked<S>
where
    S: Sequence,
    S::Item: std::fmt::Display,
{
    type Item = S::Item;

    async fn pull_next(&mut self) -> Result<Option<S::Item>> {
        let next = self.inner.pull_next().await?;
        let entry = match &next {
            Some(value) => format!("{}:{}", self.label, value),
            None => format!("{}:done", self.label),
        };
        self.journal.lock().unwrap().push(entry);
        Ok(next)
    }

    fn cancel(&mut self) -> Result<()> {
        self.inner.cancel()
    }
}

/// Emitter wrapper that counts listener removals.
#[derive(Clone, Default)]
struct CountingTarget {
    emitter: Emitter<u32>,
    removed: Arc<AtomicUsize>,
}

impl CountingTarget {
    fn removed(&self) -> usize {
        self.removed.load(Ordering::SeqCst)
    }
}

impl EventTarget for CountingTarget {
    type Event = u32;

    fn register_listener(&self, name: &str, listener: Listener<u32>) -> anyhow::Result<ListenerId> {
        self.emitter.register_listener(name, listener)
    }

    fn unregister_listener(&self, name: &str, id: ListenerId) -> anyhow::Result<()> {
        self.removed.fetch_add(1, Ordering::SeqCst);
        self.emitter.unregister_listener(name, id)
    }
}

/// Emitter wrapper whose listener removal always fails after removing.
#[derive(Clone, Default)]
struct Sticky {
    emitter: Emitter<u32>,
}

impl EventTarget for Sticky {
    type Event = u32;

    fn register_listener(&self, name: &str, listener: Listener<u32>) -> anyhow::Result<ListenerId> {
        self.emitter.register_listener(name, listener)
    }

    fn unregister_listener(&self, name: &str, id: ListenerId) -> anyhow::Result<()> {
        self.emitter.unregister_listener(name, id)?;
        Err(anyhow!("element detached"))
    }
}

/// A sequence whose only pull fails.
fn failing() -> impl Sequence<Item = u32> {
    from_iter(vec![0u32]).try_map(|_| Err::<u32, _>(anyhow!("bad payload")))
}

/// Exhausted from the start; releasing it fails.
struct FailsOnRelease;

#[async_trait]
impl Sequence for FailsOnRelease {
    type Item = u32;

    async fn pull_next(&mut self) -> Result<Option<u32>> {
        Ok(None)
    }

    fn cancel(&mut self) -> Result<()> {
        Err(Error::Subscription {
            event: "finished".into(),
            source: anyhow!("element detached"),
        })
    }
}

// =========================================================================
// distinct
// =========================================================================

#[tokio::test]
async fn distinct_drops_adjacent_duplicates() {
    let mut seq = from_iter(vec![1, 1, 2, 2, 2, 3, 1, 1]).distinct();
    assert_eq!(drain(&mut seq).await, vec![1, 2, 3, 1]);
}

#[tokio::test]
async fn distinct_by_compares_selector_output() {
    let words = vec!["apple", "avocado", "banana", "blueberry", "apricot"];
    let mut seq = distinct_by(from_iter(words), |w: &&str| w.chars().next());
    assert_eq!(drain(&mut seq).await, vec!["apple", "banana", "apricot"]);
}

#[tokio::test]
async fn distinct_always_yields_first_value() {
    // A first key of `None` or a default value must not look like "unset".
    let mut seq = from_iter(vec![None, None, Some(1)]).distinct();
    assert_eq!(drain(&mut seq).await, vec![None, Some(1)]);

    let mut seq = from_iter(vec![0, 0, 0]).distinct();
    assert_eq!(drain(&mut seq).await, vec![0]);
}

#[tokio::test]
async fn distinct_never_yields_adjacent_equal_keys() {
    let input: Vec<i32> = (0..200).map(|i| (i * 7 % 5) / 2).collect();
    let out = drain(&mut distinct_by(from_iter(input), |v: &i32| *v % 3)).await;
    assert!(!out.is_empty());
    for pair in out.windows(2) {
        assert_ne!(pair[0] % 3, pair[1] % 3);
    }
}

// =========================================================================
// delay
// =========================================================================

#[tokio::test(start_paused = true)]
async fn delay_takes_at_least_n_periods() {
    let start = Instant::now();
    let mut seq = from_iter(vec!['a', 'b', 'c']).delay(Duration::from_millis(100));

    assert_eq!(drain(&mut seq).await, vec!['a', 'b', 'c']);
    assert!(start.elapsed() >= Duration::from_millis(300));
}

#[tokio::test(start_paused = true)]
async fn delay_gates_the_next_upstream_pull() {
    let journal = Arc::new(Mutex::new(Vec::new()));
    let upstream = Tracked {
        label: "up",
        inner: from_iter(vec![1, 2, 3]),
        journal: journal.clone(),
    };
    let mut seq = upstream.delay(Duration::from_millis(50));

    assert_eq!(seq.pull_next().await.unwrap(), Some(1));
    assert_eq!(*journal.lock().unwrap(), vec!["up:1"]);

    assert_eq!(seq.pull_next().await.unwrap(), Some(2));
    assert_eq!(*journal.lock().unwrap(), vec!["up:1", "up:2"]);
}

// =========================================================================
// zip
// =========================================================================

#[tokio::test]
async fn zip_stops_at_shortest_input() {
    let mut seq = zip(from_iter(vec![1, 2, 3]), from_iter(vec!['x', 'y']));
    assert_eq!(drain(&mut seq).await, vec![(1, 'x'), (2, 'y')]);
    assert_eq!(seq.pull_next().await.unwrap(), None);
}

#[tokio::test(start_paused = true)]
async fn zip_pairs_in_lockstep_regardless_of_speed() {
    let fast = timed(vec![(1, "f1"), (1, "f2"), (1, "f3")]);
    let slow = timed(vec![(50, "s1"), (50, "s2")]);

    let mut seq = zip(fast, slow);
    assert_eq!(drain(&mut seq).await, vec![("f1", "s1"), ("f2", "s2")]);
}

#[tokio::test]
async fn zip_all_joins_many_inputs() {
    let mut seq = zip_all(vec![
        from_iter(vec![1, 2]).boxed(),
        from_iter(vec![10, 20, 30]).boxed(),
        from_iter(vec![100, 200]).boxed(),
    ]);
    assert_eq!(drain(&mut seq).await, vec![vec![1, 10, 100], vec![2, 20, 200]]);
}

#[tokio::test]
async fn zip_all_without_inputs_is_exhausted() {
    let mut seq = zip_all::<u8>(Vec::new());
    assert_eq!(seq.pull_next().await.unwrap(), None);
}

// =========================================================================
// map / filter
// =========================================================================

#[tokio::test]
async fn map_and_filter_pull_through() {
    let mut seq = from_iter(1..=6).filter(|v| v % 2 == 0).map(|v| v * 10);
    assert_eq!(drain(&mut seq).await, vec![20, 40, 60]);
}

#[tokio::test]
async fn failing_mapper_aborts_and_releases_upstream() {
    let target = CountingTarget::default();
    let events = on("n", target.clone()).unwrap();
    for n in 1..=3 {
        target.emitter.emit("n", n);
    }

    let mut seq = events.try_map(|n| {
        if n == 2 {
            Err(anyhow!("cannot map {n}"))
        } else {
            Ok(n * 2)
        }
    });

    assert_eq!(seq.pull_next().await.unwrap(), Some(2));
    let err = seq.pull_next().await.unwrap_err();
    assert!(matches!(err, Error::Transform(_)));
    assert_eq!(target.removed(), 1);

    // Aborted: nothing more, even though 3 was queued.
    assert_eq!(seq.pull_next().await.unwrap(), None);
    seq.cancel().unwrap();
    assert_eq!(target.removed(), 1);
}

#[tokio::test]
async fn failing_predicate_aborts() {
    let mut seq = from_iter(vec!["1", "2", "x", "4"]).try_filter(|s| Ok(s.parse::<u8>()? > 1));
    assert_eq!(seq.pull_next().await.unwrap(), Some("2"));
    assert!(matches!(seq.pull_next().await, Err(Error::Transform(_))));
    assert_eq!(seq.pull_next().await.unwrap(), None);
}

// =========================================================================
// merge
// =========================================================================

#[tokio::test(start_paused = true)]
async fn merge_emits_in_arrival_order() {
    // A settles at t=10 and t=30, B at t=5 and t=20.
    let a = timed(vec![(10, "a1"), (20, "a2")]);
    let b = timed(vec![(5, "b1"), (15, "b2")]);

    let mut seq = merge(vec![a.boxed(), b.boxed()]);
    assert_eq!(drain(&mut seq).await, vec!["b1", "a1", "b2", "a2"]);
}

#[tokio::test(start_paused = true)]
async fn merge_keeps_other_pulls_pending() {
    // B's slow pull must not be restarted each time A emits; if it were,
    // b1 would never arrive before A is exhausted.
    let a = timed(vec![(10, "a1"), (10, "a2"), (10, "a3"), (10, "a4")]);
    let b = timed(vec![(25, "b1")]);

    let mut seq = a.merge(b);
    assert_eq!(drain(&mut seq).await, vec!["a1", "a2", "b1", "a3", "a4"]);
}

#[tokio::test]
async fn merge_completes_when_all_sources_exhausted() {
    let mut seq = merge(vec![
        from_iter(vec![1]).boxed(),
        from_iter(Vec::<i32>::new()).boxed(),
        from_iter(vec![2, 3]).boxed(),
    ]);
    let mut values = drain(&mut seq).await;
    values.sort();
    assert_eq!(values, vec![1, 2, 3]);
    assert_eq!(seq.live(), 0);
    assert_eq!(seq.pull_next().await.unwrap(), None);
}

#[tokio::test]
async fn cancelling_merge_tears_down_every_input_once() {
    let left = CountingTarget::default();
    let right = CountingTarget::default();

    let mut seq = merge(vec![
        on("tick", left.clone()).unwrap().boxed(),
        on("tick", right.clone()).unwrap().boxed(),
    ]);

    left.emitter.emit("tick", 1);
    assert_eq!(seq.pull_next().await.unwrap(), Some(1));

    seq.cancel().unwrap();
    seq.cancel().unwrap();
    drop(seq);

    assert_eq!(left.removed(), 1);
    assert_eq!(right.removed(), 1);
    assert_eq!(left.emitter.listener_count("tick"), 0);
    assert_eq!(right.emitter.listener_count("tick"), 0);
}

#[tokio::test]
async fn cancelling_zip_tears_down_every_input_once() {
    let left = CountingTarget::default();
    let right = CountingTarget::default();

    let mut seq = zip(
        on("tick", left.clone()).unwrap(),
        on("tick", right.clone()).unwrap().map(|n| n + 100),
    );

    left.emitter.emit("tick", 1);
    right.emitter.emit("tick", 2);
    assert_eq!(seq.pull_next().await.unwrap(), Some((1, 102)));

    seq.cancel().unwrap();
    seq.cancel().unwrap();
    drop(seq);

    assert_eq!(left.removed(), 1);
    assert_eq!(right.removed(), 1);
}

#[tokio::test]
async fn failing_merge_source_releases_every_sibling_once() {
    let left = CountingTarget::default();
    let right = CountingTarget::default();

    let mut seq = merge(vec![
        on("tick", left.clone()).unwrap().boxed(),
        failing().boxed(),
        on("tick", right.clone()).unwrap().boxed(),
    ]);

    let err = seq.pull_next().await.unwrap_err();
    assert!(matches!(err, Error::Transform(_)));
    assert_eq!(left.removed(), 1);
    assert_eq!(right.removed(), 1);
    assert_eq!(seq.live(), 0);

    assert_eq!(seq.pull_next().await.unwrap(), None);
    seq.cancel().unwrap();
    drop(seq);
    assert_eq!(left.removed(), 1);
    assert_eq!(right.removed(), 1);
}

#[tokio::test]
async fn cancelling_merge_reports_failed_removal() {
    let sticky = Sticky::default();
    let other = CountingTarget::default();

    let mut seq = merge(vec![
        on("tick", sticky.clone()).unwrap().boxed(),
        on("tick", other.clone()).unwrap().boxed(),
    ]);

    sticky.emitter.emit("tick", 1);
    assert_eq!(seq.pull_next().await.unwrap(), Some(1));

    // Both sources have a pull in flight at this point.
    let err = seq.cancel().unwrap_err();
    assert!(matches!(err, Error::Subscription { ref event, .. } if event == "tick"));
    assert_eq!(other.removed(), 1);
    assert_eq!(sticky.emitter.listener_count("tick"), 0);

    assert!(seq.cancel().is_ok());
}

#[tokio::test]
async fn failing_zip_side_releases_both_sides() {
    let left = CountingTarget::default();
    let mut seq = zip(on("tick", left.clone()).unwrap(), failing());

    left.emitter.emit("tick", 1);
    let err = seq.pull_next().await.unwrap_err();
    assert!(matches!(err, Error::Transform(_)));
    assert_eq!(left.removed(), 1);

    assert_eq!(seq.pull_next().await.unwrap(), None);
    drop(seq);
    assert_eq!(left.removed(), 1);
}

#[tokio::test]
async fn failing_zip_all_input_releases_every_input_once() {
    let a = CountingTarget::default();
    let b = CountingTarget::default();
    let mut seq = zip_all(vec![
        on("tick", a.clone()).unwrap().boxed(),
        failing().boxed(),
        on("tick", b.clone()).unwrap().boxed(),
    ]);

    a.emitter.emit("tick", 1);
    b.emitter.emit("tick", 2);
    let err = seq.pull_next().await.unwrap_err();
    assert!(matches!(err, Error::Transform(_)));
    assert_eq!(a.removed(), 1);
    assert_eq!(b.removed(), 1);

    drop(seq);
    assert_eq!(a.removed(), 1);
    assert_eq!(b.removed(), 1);
}

#[tokio::test]
async fn dropping_nested_combinators_releases_each_source_once() {
    let target = CountingTarget::default();
    let seq = on("n", target.clone())
        .unwrap()
        .filter(|n| *n > 0)
        .distinct()
        .map(|n| n.to_string());
    let mut outer = concat(vec![seq.boxed(), from_iter(vec!["end".to_string()]).boxed()]);

    target.emitter.emit("n", 5);
    assert_eq!(outer.pull_next().await.unwrap().as_deref(), Some("5"));

    drop(outer);
    assert_eq!(target.removed(), 1);
}

// =========================================================================
// concat
// =========================================================================

#[tokio::test]
async fn concat_drains_inputs_in_order() {
    let journal = Arc::new(Mutex::new(Vec::new()));
    let first = Tracked {
        label: "a",
        inner: from_iter(vec![1, 2]),
        journal: journal.clone(),
    };
    let second = Tracked {
        label: "b",
        inner: from_iter(vec![3]),
        journal: journal.clone(),
    };

    let mut seq = first.concat(second);
    assert_eq!(drain(&mut seq).await, vec![1, 2, 3]);
    assert_eq!(
        *journal.lock().unwrap(),
        vec!["a:1", "a:2", "a:done", "b:3", "b:done"]
    );
}

#[tokio::test]
async fn cancelling_concat_releases_inputs_not_yet_started() {
    let target = CountingTarget::default();
    let mut seq = concat(vec![
        from_iter(vec![1]).boxed(),
        on("late", target.clone()).unwrap().boxed(),
    ]);

    assert_eq!(seq.pull_next().await.unwrap(), Some(1));
    assert_eq!(seq.remaining(), 2);

    seq.cancel().unwrap();
    assert_eq!(target.removed(), 1);
    assert_eq!(seq.pull_next().await.unwrap(), None);
}

#[tokio::test]
async fn failed_release_of_drained_input_ends_concat() {
    let late = CountingTarget::default();
    let mut seq = concat(vec![
        FailsOnRelease.boxed(),
        on("late", late.clone()).unwrap().boxed(),
    ]);

    let err = seq.pull_next().await.unwrap_err();
    assert!(matches!(err, Error::Subscription { ref event, .. } if event == "finished"));
    assert_eq!(late.removed(), 1);

    late.emitter.emit("late", 9);
    assert_eq!(seq.pull_next().await.unwrap(), None);
}
