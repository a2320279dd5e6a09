#![forbid(unsafe_code)]

//! Model values and the batched observer protocol for stitch.
//!
//! This crate provides the reactive primitives the template engine is built
//! on:
//!
//! - [`Value`], [`Object`], [`Array`]: a dynamic model graph where containers
//!   have reference identity.
//! - [`Path`]: parsed accessor chains into that graph.
//! - [`Scheduler`]: an injectable, manually flushed delivery queue.
//! - [`PathObserver`], [`CompoundObserver`], [`ObserverTransform`]: value
//!   observers implementing [`Observer`].
//! - [`ArrayObserver`]: reports collection edits as [`Splice`]s computed by
//!   [`calculate_splices`].
//!
//! # Architecture
//!
//! Everything is single-threaded and uses `Rc`/`RefCell`. Model mutations do
//! not notify; opened observers register with their scheduler, and
//! [`Scheduler::flush`] dirty-checks them, delivering at most one coalesced
//! change per observer per cycle.

pub mod array_observer;
pub mod observer;
pub mod path;
pub mod scheduler;
pub mod splice;
pub mod value;

pub use array_observer::{ArrayObserver, SpliceCallback};
pub use observer::{
    CompoundObserver, Disposable, Observer, ObserverState, ObserverTransform, PathObserver,
    ValueCallback,
};
pub use path::{Path, PathError, Segment};
pub use scheduler::{FlushReport, Scheduler, SchedulerConfig};
pub use splice::{Splice, apply_splices, calculate_splices};
pub use value::{Array, IdentityKey, Object, Value};
