//! Composable pull-based async sequences.
//!
//! Push-style producers (UI events, state changes) become cancellable
//! sequences that are pulled one value at a time. Sequences compose with
//! `map`, `filter`, `distinct`, `delay`, `zip`, `merge` and `concat`, and
//! a [`Store`] exposes its own change history the same way.
//!
//! Teardown is exactly-once: however many layers cancel or drop a sequence,
//! each underlying listener is removed once.

pub mod driver;
pub mod error;
pub mod ops;
pub mod sequence;
pub mod sink;
pub mod source;
pub mod store;
pub mod subscription;

pub use driver::{Driver, FailurePolicy};
pub use error::{Error, Result};
pub use ops::{
    concat, delay, distinct, distinct_by, filter, map, merge, try_filter, try_map, zip, zip_all,
    SequenceExt,
};
pub use sequence::{from_iter, into_stream, BoxSequence, FromIter, Sequence};
pub use sink::{format_log, LogSink, MemoryLog, TracingLog};
pub use source::{on, Adapter, Emitter, EventSequence, EventTarget, Listener, ListenerId};
pub use store::{
    ActionTable, Dispatch, DispatchHandle, Mergeable, Outcome, Snapshot, StateSequence, Store,
    Unsubscribe,
};
pub use subscription::{BufferedSequence, Teardown};
