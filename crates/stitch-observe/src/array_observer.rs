#![forbid(unsafe_code)]

//! Collection-mutation observer.
//!
//! An [`ArrayObserver`] watches one [`Array`] (not a path) and reports the
//! edit script between the contents it last reported and the current
//! contents as a list of [`Splice`]s. Any number of mutations between two
//! flushes collapse into one splice list.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use crate::observer::{Disposable, ObserverState};
use crate::scheduler::{Checkable, Scheduler};
use crate::splice::{Splice, calculate_splices};
use crate::value::{Array, Value};

/// Splice callback.
pub type SpliceCallback = Box<dyn FnMut(&[Splice])>;

struct ArrayState {
    state: ObserverState,
    snapshot: Vec<Value>,
    callback: Option<SpliceCallback>,
}

/// Observes structural changes of an [`Array`].
pub struct ArrayObserver {
    scheduler: Scheduler,
    array: Array,
    inner: RefCell<ArrayState>,
    me: Weak<ArrayObserver>,
}

impl ArrayObserver {
    #[must_use]
    pub fn new(scheduler: &Scheduler, array: Array) -> Rc<Self> {
        Rc::new_cyclic(|me| Self {
            scheduler: scheduler.clone(),
            array,
            inner: RefCell::new(ArrayState {
                state: ObserverState::Unopened,
                snapshot: Vec::new(),
                callback: None,
            }),
            me: me.clone(),
        })
    }

    /// Begin observing. Returns the observed array.
    pub fn open(&self, callback: SpliceCallback) -> Array {
        {
            let mut inner = self.inner.borrow_mut();
            if inner.state != ObserverState::Unopened {
                tracing::warn!(state = ?inner.state, "array observer opened more than once");
                return self.array.clone();
            }
            inner.state = ObserverState::Opened;
            inner.snapshot = self.array.snapshot();
            inner.callback = Some(callback);
        }
        let me: Weak<dyn Checkable> = self.me.clone();
        self.scheduler.register(me);
        self.array.clone()
    }

    /// Accept the current contents as reported, without notifying.
    pub fn discard_changes(&self) -> Array {
        let mut inner = self.inner.borrow_mut();
        if inner.state == ObserverState::Opened {
            inner.snapshot = self.array.snapshot();
        }
        self.array.clone()
    }

    /// Contents as of the last report (or open). Splices delivered to the
    /// callback transform the previously reported contents into these.
    #[must_use]
    pub fn reported(&self) -> Vec<Value> {
        self.inner.borrow().snapshot.clone()
    }

    #[must_use]
    pub fn array(&self) -> &Array {
        &self.array
    }

    #[must_use]
    pub fn state(&self) -> ObserverState {
        self.inner.borrow().state
    }
}

impl Checkable for ArrayObserver {
    fn check(&self) -> bool {
        let current = self.array.snapshot();
        let (splices, callback) = {
            let mut inner = self.inner.borrow_mut();
            if inner.state != ObserverState::Opened {
                return false;
            }
            let splices = calculate_splices(&current, &inner.snapshot);
            if splices.is_empty() {
                return false;
            }
            inner.snapshot = current;
            (splices, inner.callback.take())
        };

        tracing::trace!(splices = splices.len(), "array observer delivering splices");
        if let Some(mut callback) = callback {
            callback(&splices);
            let mut inner = self.inner.borrow_mut();
            if inner.state == ObserverState::Opened && inner.callback.is_none() {
                inner.callback = Some(callback);
            }
        }
        true
    }

    fn is_live(&self) -> bool {
        self.state() == ObserverState::Opened
    }
}

impl Disposable for ArrayObserver {
    fn close(&self) {
        let callback = {
            let mut inner = self.inner.borrow_mut();
            if inner.state == ObserverState::Closed {
                return;
            }
            inner.state = ObserverState::Closed;
            inner.snapshot.clear();
            inner.callback.take()
        };
        drop(callback);
    }

    fn is_closed(&self) -> bool {
        self.state() == ObserverState::Closed
    }
}

impl fmt::Debug for ArrayObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArrayObserver")
            .field("len", &self.array.len())
            .field("state", &self.state())
            .finish()
    }
}
