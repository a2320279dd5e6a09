#![forbid(unsafe_code)]

//! Engine context.
//!
//! An [`Engine`] bundles what every instantiation shares: the scheduler
//! observers register with, the binding configuration, the directive cache,
//! the region registry, and counters. Clones share the same context.

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

use stitch_dom::{Node, NodeKind};
use stitch_observe::{FlushReport, Path, PathObserver, Scheduler, Value};

use crate::config::BindingConfig;
use crate::directive::{DirectiveCache, RegionDirectives};
use crate::error::BindError;
use crate::instance::{Slot, create_instance};
use crate::iterator::{RegionIterator, process_template_bindings};
use crate::registry::RegionRegistry;

/// Snapshot of engine counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineStats {
    /// Instances materialized by the factory.
    pub instances_created: u64,
    /// Instances moved to a new position instead of being recreated.
    pub instances_reused: u64,
    /// Instances whose bindings were released.
    pub instances_closed: u64,
    /// Reconciliation passes that applied at least one splice.
    pub reconcile_passes: u64,
    /// Directive trees built (one per distinct template content).
    pub directive_builds: u64,
}

#[derive(Default)]
struct Counters {
    created: Cell<u64>,
    reused: Cell<u64>,
    closed: Cell<u64>,
    passes: Cell<u64>,
}

fn bump(cell: &Cell<u64>, by: usize) {
    cell.set(cell.get() + by as u64);
}

struct EngineInner {
    scheduler: Scheduler,
    config: BindingConfig,
    directives: DirectiveCache,
    registry: RegionRegistry,
    counters: Counters,
}

/// Shared binding context.
#[derive(Clone)]
pub struct Engine {
    inner: Rc<EngineInner>,
}

impl Engine {
    #[must_use]
    pub fn new(scheduler: &Scheduler) -> Self {
        Self::with_config(scheduler, BindingConfig::default())
    }

    #[must_use]
    pub fn with_config(scheduler: &Scheduler, config: BindingConfig) -> Self {
        Self {
            inner: Rc::new(EngineInner {
                scheduler: scheduler.clone(),
                config: config.sanitized(),
                directives: DirectiveCache::new(),
                registry: RegionRegistry::new(),
                counters: Counters::default(),
            }),
        }
    }

    #[must_use]
    pub fn scheduler(&self) -> &Scheduler {
        &self.inner.scheduler
    }

    #[must_use]
    pub fn config(&self) -> &BindingConfig {
        &self.inner.config
    }

    #[must_use]
    pub fn directives(&self) -> &DirectiveCache {
        &self.inner.directives
    }

    #[must_use]
    pub fn registry(&self) -> &RegionRegistry {
        &self.inner.registry
    }

    #[must_use]
    pub fn stats(&self) -> EngineStats {
        let c = &self.inner.counters;
        EngineStats {
            instances_created: c.created.get(),
            instances_reused: c.reused.get(),
            instances_closed: c.closed.get(),
            reconcile_passes: c.passes.get(),
            directive_builds: self.inner.directives.builds(),
        }
    }

    /// Deliver pending changes. Shorthand for `self.scheduler().flush()`.
    pub fn flush(&self) -> FlushReport {
        self.inner.scheduler.flush()
    }

    /// Materialize `template`'s content against `model` without inserting
    /// it anywhere.
    pub fn create_instance(&self, template: &Node, model: &Value) -> Result<Slot, BindError> {
        ensure_template(template)?;
        Ok(create_instance(self, template, model))
    }

    /// Bind the region declared by `template`'s `if`/`bind`/`repeat`
    /// attributes to `model`, rendering instances after the template.
    ///
    /// Returns `None` (closing any previous iterator) when the template
    /// declares no region. Binding an already bound template rebinds its
    /// iterator. The returned handle owns the region: dropping every handle
    /// releases its observers and leaves the rendered content static.
    pub fn bind_region(
        &self,
        template: &Node,
        model: &Value,
    ) -> Result<Option<Rc<RegionIterator>>, BindError> {
        ensure_template(template)?;
        let region = RegionDirectives::from_template(template, self.config());
        Ok(process_template_bindings(self, template, &region, model))
    }

    /// The open iterator of `template`, if any.
    #[must_use]
    pub fn region_of(&self, template: &Node) -> Option<Rc<RegionIterator>> {
        self.inner.registry.lookup(template)
    }

    /// Unopened observer of `path` against `model` on this engine's
    /// scheduler.
    pub fn observe(&self, model: &Value, path: &str) -> Result<Rc<PathObserver>, BindError> {
        let path = Path::parse(path)?;
        Ok(PathObserver::new(&self.inner.scheduler, model.clone(), path))
    }

    pub(crate) fn note_created(&self) {
        bump(&self.inner.counters.created, 1);
    }

    pub(crate) fn note_pass(&self, reused: usize, closed: usize) {
        let c = &self.inner.counters;
        bump(&c.passes, 1);
        bump(&c.reused, reused);
        bump(&c.closed, closed);
    }

    pub(crate) fn note_closed(&self, closed: usize) {
        bump(&self.inner.counters.closed, closed);
    }
}

fn ensure_template(node: &Node) -> Result<(), BindError> {
    match node.kind() {
        NodeKind::Template => Ok(()),
        kind => Err(BindError::NotATemplate(kind)),
    }
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("scheduler", &self.inner.scheduler)
            .field("config", &self.inner.config)
            .field("stats", &self.stats())
            .finish()
    }
}
