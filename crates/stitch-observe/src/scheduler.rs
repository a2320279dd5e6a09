#![forbid(unsafe_code)]

//! Injectable delivery scheduler.
//!
//! Observers never call back from inside `open`. Instead every opened
//! observer registers with a [`Scheduler`], and change delivery happens when
//! the host (or a test) calls [`Scheduler::flush`]. A flush runs dirty-check
//! cycles: each live observer re-derives its value and, if it differs from
//! the last delivered one, invokes its callback once. Cycles repeat until a
//! cycle delivers nothing, so callbacks that mutate the model are observed in
//! the same flush.
//!
//! # Invariants
//!
//! 1. Coalescing: however many mutations happen between two flushes, each
//!    observer delivers at most one change per cycle, carrying the latest value.
//! 2. A closed observer is never checked, even if it was closed mid-cycle.
//! 3. `flush` is not re-entrant: a nested call from a callback is a no-op
//!    that returns an empty report.
//! 4. The scheduler holds observers weakly; dropping the last strong handle
//!    unregisters an observer at the next flush.
//!
//! # Failure Modes
//!
//! | Condition | Behavior |
//! |-----------|----------|
//! | Callbacks keep mutating the model | Stop after `max_dirty_check_cycles`, log a warning |
//! | Callback or transform panics | Panic propagates out of `flush`; the scheduler stays usable |

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

/// Scheduler configuration.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Upper bound on dirty-check cycles per flush.
    /// Default: 1000
    pub max_dirty_check_cycles: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_dirty_check_cycles: 1000,
        }
    }
}

impl SchedulerConfig {
    fn sanitized(&self) -> Self {
        Self {
            max_dirty_check_cycles: self.max_dirty_check_cycles.max(1),
        }
    }
}

/// Something the scheduler can dirty-check.
pub(crate) trait Checkable {
    /// Re-derive the value and deliver it if changed. Returns `true` if a
    /// change was delivered.
    fn check(&self) -> bool;

    /// `false` once closed.
    fn is_live(&self) -> bool;
}

/// Outcome of one [`Scheduler::flush`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
    /// Dirty-check cycles run, including the final quiet one.
    pub cycles: usize,
    /// Total callbacks delivered.
    pub deliveries: usize,
    /// `false` if the cycle cap was hit before the model settled.
    pub converged: bool,
}

struct SchedulerInner {
    config: SchedulerConfig,
    observers: RefCell<Vec<Weak<dyn Checkable>>>,
    flushing: Cell<bool>,
    flush_count: Cell<u64>,
}

/// Batched, manually driven delivery queue. Clones share the same queue.
#[derive(Clone)]
pub struct Scheduler {
    inner: Rc<SchedulerInner>,
}

impl Scheduler {
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(SchedulerConfig::default())
    }

    #[must_use]
    pub fn with_config(config: SchedulerConfig) -> Self {
        Self {
            inner: Rc::new(SchedulerInner {
                config: config.sanitized(),
                observers: RefCell::new(Vec::new()),
                flushing: Cell::new(false),
                flush_count: Cell::new(0),
            }),
        }
    }

    #[must_use]
    pub fn config(&self) -> &SchedulerConfig {
        &self.inner.config
    }

    pub(crate) fn register(&self, observer: Weak<dyn Checkable>) {
        self.inner.observers.borrow_mut().push(observer);
    }

    /// Number of registered observers that are still open.
    #[must_use]
    pub fn live_observer_count(&self) -> usize {
        self.inner
            .observers
            .borrow()
            .iter()
            .filter_map(Weak::upgrade)
            .filter(|o| o.is_live())
            .count()
    }

    /// Number of completed top-level flushes.
    #[must_use]
    pub fn flush_count(&self) -> u64 {
        self.inner.flush_count.get()
    }

    /// `true` while a flush is delivering callbacks.
    #[must_use]
    pub fn is_flushing(&self) -> bool {
        self.inner.flushing.get()
    }

    /// Deliver all pending changes.
    pub fn flush(&self) -> FlushReport {
        if self.is_flushing() {
            return FlushReport::default();
        }
        let _guard = FlushGuard::enter(&self.inner.flushing);

        let max_cycles = self.inner.config.max_dirty_check_cycles;
        let mut report = FlushReport::default();
        loop {
            if report.cycles >= max_cycles {
                tracing::warn!(
                    cycles = report.cycles,
                    deliveries = report.deliveries,
                    "observer flush hit the dirty-check cycle limit"
                );
                break;
            }
            report.cycles += 1;

            let batch = self.live_snapshot();
            let mut delivered = 0;
            for observer in batch {
                if observer.is_live() && observer.check() {
                    delivered += 1;
                }
            }
            report.deliveries += delivered;
            if delivered == 0 {
                report.converged = true;
                break;
            }
        }

        self.inner.flush_count.set(self.inner.flush_count.get() + 1);
        tracing::trace!(
            cycles = report.cycles,
            deliveries = report.deliveries,
            "observer flush complete"
        );
        report
    }

    /// Prune dead entries and return strong handles to the live ones, in
    /// registration order.
    fn live_snapshot(&self) -> Vec<Rc<dyn Checkable>> {
        let mut observers = self.inner.observers.borrow_mut();
        let mut live = Vec::with_capacity(observers.len());
        observers.retain(|weak| match weak.upgrade() {
            Some(observer) if observer.is_live() => {
                live.push(observer);
                true
            }
            _ => false,
        });
        live
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("registered", &self.inner.observers.borrow().len())
            .field("flushing", &self.inner.flushing.get())
            .field("flush_count", &self.inner.flush_count.get())
            .finish()
    }
}

/// Resets the re-entrancy flag even if a callback panics.
struct FlushGuard<'a> {
    flag: &'a Cell<bool>,
}

impl<'a> FlushGuard<'a> {
    fn enter(flag: &'a Cell<bool>) -> Self {
        flag.set(true);
        Self { flag }
    }
}

impl Drop for FlushGuard<'_> {
    fn drop(&mut self) {
        self.flag.set(false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    /// Counts down a budget of changes, one per check.
    struct Countdown {
        remaining: Cell<usize>,
        live: Cell<bool>,
        checks: Cell<usize>,
    }

    impl Countdown {
        fn new(remaining: usize) -> Rc<Self> {
            Rc::new(Self {
                remaining: Cell::new(remaining),
                live: Cell::new(true),
                checks: Cell::new(0),
            })
        }
    }

    impl Checkable for Countdown {
        fn check(&self) -> bool {
            self.checks.set(self.checks.get() + 1);
            let left = self.remaining.get();
            if left == 0 {
                return false;
            }
            self.remaining.set(left - 1);
            true
        }

        fn is_live(&self) -> bool {
            self.live.get()
        }
    }

    fn register(scheduler: &Scheduler, obs: &Rc<Countdown>) {
        let rc: Rc<dyn Checkable> = obs.clone();
        scheduler.register(Rc::downgrade(&rc));
    }

    #[test]
    fn flush_runs_until_quiet() {
        let scheduler = Scheduler::new();
        let obs = Countdown::new(3);
        register(&scheduler, &obs);
        let report = scheduler.flush();
        assert_eq!(report.deliveries, 3);
        assert_eq!(report.cycles, 4);
        assert!(report.converged);
        assert_eq!(scheduler.flush_count(), 1);
    }

    #[test]
    #[traced_test]
    fn cycle_limit_stops_runaway() {
        let scheduler = Scheduler::with_config(SchedulerConfig {
            max_dirty_check_cycles: 5,
        });
        let obs = Countdown::new(usize::MAX);
        register(&scheduler, &obs);
        let report = scheduler.flush();
        assert_eq!(report.cycles, 5);
        assert!(!report.converged);
        assert!(logs_contain("dirty-check cycle limit"));
    }

    #[test]
    fn zero_cycle_config_is_sanitized() {
        let scheduler = Scheduler::with_config(SchedulerConfig {
            max_dirty_check_cycles: 0,
        });
        assert_eq!(scheduler.config().max_dirty_check_cycles, 1);
    }

    #[test]
    fn closed_and_dropped_observers_are_pruned() {
        let scheduler = Scheduler::new();
        let closed = Countdown::new(1);
        register(&scheduler, &closed);
        closed.live.set(false);
        {
            let dropped = Countdown::new(1);
            register(&scheduler, &dropped);
        }
        assert_eq!(scheduler.live_observer_count(), 0);
        let report = scheduler.flush();
        assert_eq!(report.deliveries, 0);
        assert_eq!(closed.checks.get(), 0);
    }
}
