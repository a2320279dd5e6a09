#![forbid(unsafe_code)]

//! The observer protocol.
//!
//! Every observer follows the same lifecycle:
//!
//! ```text
//! Unopened --open--> Opened --close--> Closed
//!     \______________close_____________/
//! ```
//!
//! - [`Observer::open`] registers a callback and returns the current value.
//!   It never invokes the callback itself.
//! - [`Observer::discard_changes`] synchronously re-derives the value and
//!   records it as delivered, so the next flush does not report it.
//! - [`Disposable::close`] unsubscribes. Idempotent.
//!
//! Implementations:
//!
//! - [`PathObserver`]: one path against one model.
//! - [`CompoundObserver`]: several sources, delivered together as an array
//!   of current values in registration order.
//! - [`ObserverTransform`]: maps another observer's value through a function.
//!
//! Collection mutations are observed by
//! [`ArrayObserver`](crate::ArrayObserver), which reports splices instead of
//! values.
//!
//! # Invariants
//!
//! 1. A callback never runs after `close`, even if a flush was already
//!    under way when `close` was called.
//! 2. Values are compared with [`Value::same`]; an observer whose value is
//!    replaced by an identical scalar or the same container reports nothing.
//! 3. A callback may call `discard_changes` or `close` on its own observer.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use crate::path::Path;
use crate::scheduler::{Checkable, Scheduler};
use crate::value::{Array, Value};

/// Value-change callback: `(new_value, old_value)`.
pub type ValueCallback = Box<dyn FnMut(&Value, &Value)>;

/// Lifecycle state of an observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObserverState {
    Unopened,
    Opened,
    Closed,
}

/// Anything that owns live subscriptions and can release them.
pub trait Disposable {
    /// Release all subscriptions. Calling this more than once is a no-op.
    fn close(&self);

    fn is_closed(&self) -> bool;
}

/// A value observer.
pub trait Observer: Disposable {
    /// Begin observing. Returns the value at the moment of opening.
    fn open(&self, callback: ValueCallback) -> Value;

    /// Re-derive the current value now, without notifying.
    fn discard_changes(&self) -> Value;

    /// Last derived value.
    fn value(&self) -> Value;

    fn state(&self) -> ObserverState;
}

// ---------------------------------------------------------------------------
// Shared delivery core
// ---------------------------------------------------------------------------

struct Core {
    state: ObserverState,
    value: Value,
    callback: Option<ValueCallback>,
}

impl Core {
    fn new() -> RefCell<Self> {
        RefCell::new(Self {
            state: ObserverState::Unopened,
            value: Value::Undefined,
            callback: None,
        })
    }
}

/// Record `callback` and `value` on open. Returns `false` (and leaves the core
/// untouched) if the observer was not in the unopened state.
fn open_core(core: &RefCell<Core>, callback: ValueCallback, value: &Value) -> bool {
    let mut c = core.borrow_mut();
    if c.state != ObserverState::Unopened {
        tracing::warn!(state = ?c.state, "observer opened more than once");
        return false;
    }
    c.state = ObserverState::Opened;
    c.value = value.clone();
    c.callback = Some(callback);
    true
}

/// Deliver `new` if it differs from the last value. The callback is moved
/// out while it runs so it may re-enter its own observer.
fn deliver(core: &RefCell<Core>, new: Value) -> bool {
    let (callback, old) = {
        let mut c = core.borrow_mut();
        if c.state != ObserverState::Opened || c.value.same(&new) {
            return false;
        }
        let old = std::mem::replace(&mut c.value, new.clone());
        (c.callback.take(), old)
    };

    if let Some(mut callback) = callback {
        callback(&new, &old);
        let mut c = core.borrow_mut();
        if c.state == ObserverState::Opened && c.callback.is_none() {
            c.callback = Some(callback);
        }
    }
    true
}

fn discard_core(core: &RefCell<Core>, value: &Value) {
    let mut c = core.borrow_mut();
    if c.state == ObserverState::Opened {
        c.value = value.clone();
    }
}

/// Mark closed. Returns `true` if this call performed the transition.
fn close_core(core: &RefCell<Core>) -> bool {
    let callback = {
        let mut c = core.borrow_mut();
        if c.state == ObserverState::Closed {
            return false;
        }
        c.state = ObserverState::Closed;
        c.callback.take()
    };
    // Dropped outside the borrow: captured handles may close other observers.
    drop(callback);
    true
}

// ---------------------------------------------------------------------------
// PathObserver
// ---------------------------------------------------------------------------

/// Observes `path` resolved against `model`.
pub struct PathObserver {
    scheduler: Scheduler,
    model: Value,
    path: Path,
    core: RefCell<Core>,
    me: Weak<PathObserver>,
}

impl PathObserver {
    #[must_use]
    pub fn new(scheduler: &Scheduler, model: Value, path: Path) -> Rc<Self> {
        Rc::new_cyclic(|me| Self {
            scheduler: scheduler.clone(),
            model,
            path,
            core: Core::new(),
            me: me.clone(),
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Value {
        self.path.get_value_from(&self.model)
    }
}

impl Observer for PathObserver {
    fn open(&self, callback: ValueCallback) -> Value {
        let value = self.read();
        if open_core(&self.core, callback, &value) {
            let me: Weak<dyn Checkable> = self.me.clone();
            self.scheduler.register(me);
        }
        self.value()
    }

    fn discard_changes(&self) -> Value {
        let value = self.read();
        discard_core(&self.core, &value);
        value
    }

    fn value(&self) -> Value {
        self.core.borrow().value.clone()
    }

    fn state(&self) -> ObserverState {
        self.core.borrow().state
    }
}

impl Disposable for PathObserver {
    fn close(&self) {
        close_core(&self.core);
    }

    fn is_closed(&self) -> bool {
        self.state() == ObserverState::Closed
    }
}

impl Checkable for PathObserver {
    fn check(&self) -> bool {
        deliver(&self.core, self.read())
    }

    fn is_live(&self) -> bool {
        self.state() == ObserverState::Opened
    }
}

impl fmt::Debug for PathObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PathObserver")
            .field("path", &self.path)
            .field("state", &self.state())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// CompoundObserver
// ---------------------------------------------------------------------------

enum Source {
    Path { model: Value, path: Path },
    Constant(Value),
    Observer(Rc<dyn Observer>),
}

impl Source {
    fn read(&self) -> Value {
        match self {
            Source::Path { model, path } => path.get_value_from(model),
            Source::Constant(value) => value.clone(),
            Source::Observer(observer) => observer.discard_changes(),
        }
    }
}

/// Aggregates several sources into one synchronized callback.
///
/// The delivered value is a fresh [`Array`] of the current source values in
/// the order the sources were added. Sources must be added before `open`.
pub struct CompoundObserver {
    scheduler: Scheduler,
    sources: RefCell<Vec<Source>>,
    last: RefCell<Vec<Value>>,
    core: RefCell<Core>,
    me: Weak<CompoundObserver>,
}

impl CompoundObserver {
    #[must_use]
    pub fn new(scheduler: &Scheduler) -> Rc<Self> {
        Rc::new_cyclic(|me| Self {
            scheduler: scheduler.clone(),
            sources: RefCell::new(Vec::new()),
            last: RefCell::new(Vec::new()),
            core: Core::new(),
            me: me.clone(),
        })
    }

    /// Observe `path` against `model`.
    pub fn add_path(&self, model: Value, path: Path) {
        self.add_source(Source::Path { model, path });
    }

    /// Contribute a fixed value (a one-time expression).
    pub fn add_constant(&self, value: Value) {
        self.add_source(Source::Constant(value));
    }

    /// Contribute another observer; it is opened with this one and closed
    /// with it.
    pub fn add_observer(&self, observer: Rc<dyn Observer>) {
        self.add_source(Source::Observer(observer));
    }

    #[must_use]
    pub fn source_count(&self) -> usize {
        self.sources.borrow().len()
    }

    fn add_source(&self, source: Source) {
        if self.state() != ObserverState::Unopened {
            tracing::warn!("sources must be added to a compound observer before open");
            return;
        }
        self.sources.borrow_mut().push(source);
    }

    fn read_all(&self) -> Vec<Value> {
        self.sources.borrow().iter().map(Source::read).collect()
    }

    fn changed(&self, current: &[Value]) -> bool {
        let last = self.last.borrow();
        last.len() != current.len() || last.iter().zip(current).any(|(a, b)| !a.same(b))
    }
}

impl Observer for CompoundObserver {
    fn open(&self, callback: ValueCallback) -> Value {
        if self.state() != ObserverState::Unopened {
            open_core(&self.core, callback, &Value::Undefined);
            return self.value();
        }
        let inner: Vec<Rc<dyn Observer>> = self
            .sources
            .borrow()
            .iter()
            .filter_map(|s| match s {
                Source::Observer(o) => Some(Rc::clone(o)),
                _ => None,
            })
            .collect();
        for observer in inner {
            // The compound pulls inner values itself on every check.
            observer.open(Box::new(|_, _| {}));
        }

        let values = self.read_all();
        let value = Value::from(Array::from_values(values.iter().cloned()));
        *self.last.borrow_mut() = values;
        if open_core(&self.core, callback, &value) {
            let me: Weak<dyn Checkable> = self.me.clone();
            self.scheduler.register(me);
        }
        value
    }

    fn discard_changes(&self) -> Value {
        let values = self.read_all();
        let opened = self.state() == ObserverState::Opened;
        if opened && !self.changed(&values) {
            return self.value();
        }
        let value = Value::from(Array::from_values(values.iter().cloned()));
        if opened {
            *self.last.borrow_mut() = values;
            discard_core(&self.core, &value);
        }
        value
    }

    fn value(&self) -> Value {
        self.core.borrow().value.clone()
    }

    fn state(&self) -> ObserverState {
        self.core.borrow().state
    }
}

impl Disposable for CompoundObserver {
    fn close(&self) {
        if !close_core(&self.core) {
            return;
        }
        let sources = std::mem::take(&mut *self.sources.borrow_mut());
        for source in sources {
            if let Source::Observer(observer) = source {
                observer.close();
            }
        }
        self.last.borrow_mut().clear();
    }

    fn is_closed(&self) -> bool {
        self.state() == ObserverState::Closed
    }
}

impl Checkable for CompoundObserver {
    fn check(&self) -> bool {
        if self.state() != ObserverState::Opened {
            return false;
        }
        let values = self.read_all();
        if !self.changed(&values) {
            return false;
        }
        let value = Value::from(Array::from_values(values.iter().cloned()));
        *self.last.borrow_mut() = values;
        deliver(&self.core, value)
    }

    fn is_live(&self) -> bool {
        self.state() == ObserverState::Opened
    }
}

impl fmt::Debug for CompoundObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompoundObserver")
            .field("sources", &self.source_count())
            .field("state", &self.state())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// ObserverTransform
// ---------------------------------------------------------------------------

/// Maps the value of an inner observer through a pure function.
///
/// Closing the transform closes the inner observer. A panic in the mapping
/// function propagates to whoever triggered the evaluation (usually
/// [`Scheduler::flush`]).
pub struct ObserverTransform {
    inner: Rc<dyn Observer>,
    map: Rc<dyn Fn(&Value) -> Value>,
    core: RefCell<Core>,
    me: Weak<ObserverTransform>,
}

impl ObserverTransform {
    pub fn new(inner: Rc<dyn Observer>, map: impl Fn(&Value) -> Value + 'static) -> Rc<Self> {
        Rc::new_cyclic(|me| Self {
            inner,
            map: Rc::new(map),
            core: Core::new(),
            me: me.clone(),
        })
    }

    fn on_inner(&self, value: &Value) {
        let mapped = (self.map)(value);
        deliver(&self.core, mapped);
    }
}

impl Observer for ObserverTransform {
    fn open(&self, callback: ValueCallback) -> Value {
        if self.state() != ObserverState::Unopened {
            open_core(&self.core, callback, &Value::Undefined);
            return self.value();
        }
        let me = self.me.clone();
        let raw = self.inner.open(Box::new(move |value, _| {
            if let Some(transform) = me.upgrade() {
                transform.on_inner(value);
            }
        }));
        let value = (self.map)(&raw);
        open_core(&self.core, callback, &value);
        value
    }

    fn discard_changes(&self) -> Value {
        let value = (self.map)(&self.inner.discard_changes());
        discard_core(&self.core, &value);
        value
    }

    fn value(&self) -> Value {
        self.core.borrow().value.clone()
    }

    fn state(&self) -> ObserverState {
        self.core.borrow().state
    }
}

impl Disposable for ObserverTransform {
    fn close(&self) {
        if close_core(&self.core) {
            self.inner.close();
        }
    }

    fn is_closed(&self) -> bool {
        self.state() == ObserverState::Closed
    }
}

impl fmt::Debug for ObserverTransform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObserverTransform")
            .field("state", &self.state())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
