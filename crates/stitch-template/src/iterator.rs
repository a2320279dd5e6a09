#![forbid(unsafe_code)]

//! Region iterator: keeps a template's rendered instances in sync with its
//! bound value.
//!
//! A region is a template carrying `if`, `bind`, or `repeat`. Its instances
//! are rendered as siblings directly after the template node, in model
//! order. The iterator observes the conditional and the value; a repeated
//! array is additionally watched by an [`ArrayObserver`] whose splices are
//! applied as minimal structural edits.
//!
//! ```text
//! uninitialized --update_dependencies--> bound --close--> closed
//!                                         |  ^
//!                                         +--+ update_dependencies (rebind)
//! ```
//!
//! # Reconciliation
//!
//! Each pass (see [`RegionIterator::handle_splices`]) first removes every
//! instance named by the splices, parking real instances in a reuse cache
//! keyed by the identity of the removed model value, then inserts: a cached
//! instance for the same value is moved back in, `Undefined` gets an empty
//! slot, anything else is freshly created. Whatever is left in the cache is
//! closed. The cache lives for exactly one pass.
//!
//! # Invariants
//!
//! 1. After every pass, `instances.len() == iterated_value.len()`.
//! 2. Identity, not content, decides reuse.
//! 3. All removals of a pass complete before any insertion.
//! 4. A closed iterator ignores late deliveries; `close` is idempotent.
//!
//! # Failure Modes
//!
//! | Condition | Behavior |
//! |-----------|----------|
//! | Template detached when a pass starts | Iterator closes itself, logs a warning |
//! | `repeat` value is not an array | Rendered as a single-element list |
//! | Conditional false | Value observer stays open; content is removed |

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::rc::{Rc, Weak};

use ahash::AHashMap;
use stitch_dom::{Node, NodeKind};
use stitch_observe::{
    Array, ArrayObserver, Disposable, IdentityKey, Splice, Value, apply_splices,
    calculate_splices,
};
use tracing::field;

use crate::directive::RegionDirectives;
use crate::engine::Engine;
use crate::instance::{Instance, Slot, create_instance};
use crate::mustache::{BindingExpression, BindingValue};

/// Observers a region's content depends on.
struct Dependencies {
    conditional: Option<BindingValue>,
    repeat: bool,
    /// `None` only when a one-time conditional was false.
    value: Option<BindingValue>,
}

impl Dependencies {
    fn close(self) {
        for dependency in [self.conditional, self.value].into_iter().flatten() {
            if let BindingValue::Live(observer) = dependency {
                observer.close();
            }
        }
    }
}

#[derive(Default)]
struct IteratorState {
    closed: bool,
    instances: Vec<Slot>,
    deps: Option<Dependencies>,
    iterated_value: Vec<Value>,
    array_observer: Option<Rc<ArrayObserver>>,
}

/// Live list of rendered instances for one region.
pub struct RegionIterator {
    engine: Engine,
    template: Node,
    me: Weak<RegionIterator>,
    state: RefCell<IteratorState>,
}

impl RegionIterator {
    pub(crate) fn new(engine: &Engine, template: &Node) -> Rc<Self> {
        Rc::new_cyclic(|me| Self {
            engine: engine.clone(),
            template: template.clone(),
            me: me.clone(),
            state: RefCell::new(IteratorState::default()),
        })
    }

    /// The region's template node.
    #[must_use]
    pub fn template(&self) -> &Node {
        &self.template
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state.borrow().closed
    }

    /// Number of slots, including empty ones.
    #[must_use]
    pub fn instance_count(&self) -> usize {
        self.state.borrow().instances.len()
    }

    /// Number of slots holding real content.
    #[must_use]
    pub fn rendered_count(&self) -> usize {
        self.state
            .borrow()
            .instances
            .iter()
            .filter(|slot| !slot.is_empty())
            .count()
    }

    /// The values the current instances were rendered for, in order.
    #[must_use]
    pub fn iterated_values(&self) -> Vec<Value> {
        self.state.borrow().iterated_value.clone()
    }

    /// `true` while a repeated array is watched for splices.
    #[must_use]
    pub fn is_observing_collection(&self) -> bool {
        self.state.borrow().array_observer.is_some()
    }

    // -----------------------------------------------------------------------
    // Dependencies
    // -----------------------------------------------------------------------

    /// Close the conditional and value observers. Instances are kept.
    pub fn close_deps(&self) {
        let deps = self.state.borrow_mut().deps.take();
        if let Some(deps) = deps {
            deps.close();
        }
    }

    /// (Re)bind the region to `model`.
    pub fn update_dependencies(&self, region: &RegionDirectives, model: &Value) {
        self.close_deps();
        if self.is_closed() {
            return;
        }
        let scheduler = self.engine.scheduler().clone();

        let mut condition = true;
        let mut conditional = None;
        if let Some(expression) = &region.conditional {
            match expression.create_observer(&scheduler, model) {
                BindingValue::OneTime(value) => {
                    condition = value.is_truthy();
                    conditional = Some(BindingValue::OneTime(value));
                    if !condition {
                        self.state.borrow_mut().deps = Some(Dependencies {
                            conditional,
                            repeat: region.repeat.is_some(),
                            value: None,
                        });
                        self.value_changed(Vec::new(), None);
                        return;
                    }
                }
                BindingValue::Live(observer) => {
                    let me = self.me.clone();
                    let value = observer.open(Box::new(move |value, _| {
                        if let Some(iterator) = me.upgrade() {
                            iterator.update_if_value(value);
                        }
                    }));
                    condition = value.is_truthy();
                    conditional = Some(BindingValue::Live(observer));
                }
            }
        }

        let expression = region
            .value_expression()
            .cloned()
            .unwrap_or_else(|| Rc::new(BindingExpression::identity()));
        let (value, dependency) = match expression.create_observer(&scheduler, model) {
            BindingValue::Live(observer) => {
                let me = self.me.clone();
                let value = observer.open(Box::new(move |value, _| {
                    if let Some(iterator) = me.upgrade() {
                        iterator.update_iterated_value(value);
                    }
                }));
                (value, BindingValue::Live(observer))
            }
            BindingValue::OneTime(value) => (value.clone(), BindingValue::OneTime(value)),
        };

        self.state.borrow_mut().deps = Some(Dependencies {
            conditional,
            repeat: region.repeat.is_some(),
            value: Some(dependency),
        });

        if !condition {
            self.value_changed(Vec::new(), None);
            return;
        }
        self.update_value(value);
    }

    /// Current value without waiting for delivery.
    fn updated_value(&self) -> Value {
        let dependency = self
            .state
            .borrow()
            .deps
            .as_ref()
            .and_then(|deps| deps.value.clone());
        match dependency {
            Some(BindingValue::Live(observer)) => observer.discard_changes(),
            Some(BindingValue::OneTime(value)) => value,
            None => Value::Undefined,
        }
    }

    fn update_if_value(&self, condition: &Value) {
        if !condition.is_truthy() {
            self.value_changed(Vec::new(), None);
            return;
        }
        let value = self.updated_value();
        self.update_value(value);
    }

    fn update_iterated_value(&self, value: &Value) {
        let conditional = self
            .state
            .borrow()
            .deps
            .as_ref()
            .and_then(|deps| deps.conditional.clone());
        if let Some(conditional) = conditional {
            let condition = match conditional {
                BindingValue::Live(observer) => observer.discard_changes(),
                BindingValue::OneTime(value) => value,
            };
            if !condition.is_truthy() {
                self.value_changed(Vec::new(), None);
                return;
            }
        }
        self.update_value(value.clone());
    }

    fn update_value(&self, value: Value) {
        let (repeat, live) = match &self.state.borrow().deps {
            Some(deps) => (
                deps.repeat,
                matches!(deps.value, Some(BindingValue::Live(_))),
            ),
            None => (false, false),
        };

        if !repeat {
            self.value_changed(vec![value], None);
            return;
        }
        match value.as_array() {
            Some(array) if live => self.value_changed(array.snapshot(), Some(array.clone())),
            Some(array) => self.value_changed(array.snapshot(), None),
            None => {
                tracing::debug!(value = ?value, "repeat value is not an array, rendering it once");
                self.value_changed(vec![value], None);
            }
        }
    }

    fn value_changed(&self, values: Vec<Value>, observe: Option<Array>) {
        self.unobserve();
        if let Some(array) = observe {
            let observer = ArrayObserver::new(self.engine.scheduler(), array);
            let me = self.me.clone();
            observer.open(Box::new(move |splices| {
                if let Some(iterator) = me.upgrade() {
                    iterator.handle_collection_splices(splices);
                }
            }));
            self.state.borrow_mut().array_observer = Some(observer);
        }

        let splices = calculate_splices(&values, &self.state.borrow().iterated_value);
        self.handle_splices(&splices, &values);
    }

    fn handle_collection_splices(&self, splices: &[Splice]) {
        let observer = self.state.borrow().array_observer.clone();
        if let Some(observer) = observer {
            let current = observer.reported();
            self.handle_splices(splices, &current);
        }
    }

    fn unobserve(&self) {
        let observer = self.state.borrow_mut().array_observer.take();
        if let Some(observer) = observer {
            observer.close();
        }
    }

    // -----------------------------------------------------------------------
    // Boundaries
    // -----------------------------------------------------------------------

    /// Last rendered node of the instance at `index`, or of the closest
    /// earlier instance that has one; the template itself for `None`.
    fn last_instance_node(&self, index: Option<usize>) -> Node {
        let mut index = index;
        loop {
            let Some(i) = index else {
                return self.template.clone();
            };
            let terminator = self
                .state
                .borrow()
                .instances
                .get(i)
                .and_then(Slot::terminator);
            let Some(terminator) = terminator else {
                index = i.checked_sub(1);
                continue;
            };

            if !matches!(terminator.kind(), NodeKind::Element | NodeKind::Template)
                || terminator.ptr_eq(&self.template)
            {
                return terminator;
            }
            // A nested region's extent depends on its own live content.
            return match self.engine.registry().lookup(&terminator) {
                Some(nested) => nested.last_template_node(),
                None => terminator,
            };
        }
    }

    /// Last node rendered by this region (the template when it is empty).
    #[must_use]
    pub fn last_template_node(&self) -> Node {
        let count = self.instance_count();
        self.last_instance_node(count.checked_sub(1))
    }

    fn insert_instance_at(&self, index: usize, slot: Slot, parent: &Node) {
        let previous = self.last_instance_node(index.checked_sub(1));
        if let Slot::Filled(instance) = &slot {
            parent.insert_after(instance.fragment(), Some(&previous));
        }
        let mut state = self.state.borrow_mut();
        let index = index.min(state.instances.len());
        state.instances.insert(index, slot);
    }

    /// Remove the slot at `index`, moving its nodes back into its fragment.
    fn extract_instance_at(&self, index: usize) -> Slot {
        let previous = self.last_instance_node(index.checked_sub(1));
        let mut last = self.last_instance_node(Some(index));
        let slot = {
            let mut state = self.state.borrow_mut();
            if index >= state.instances.len() {
                tracing::warn!(index, "splice names a slot past the end of the region");
                return Slot::Empty;
            }
            state.instances.remove(index)
        };

        if let Slot::Filled(instance) = &slot {
            while !last.ptr_eq(&previous) {
                let Some(node) = previous.next_sibling() else {
                    tracing::warn!("instance end not found among the template's siblings");
                    break;
                };
                if node.ptr_eq(&last) {
                    last = previous.clone();
                }
                instance.fragment().append_child(&node);
            }
        }
        slot
    }

    // -----------------------------------------------------------------------
    // Reconciliation
    // -----------------------------------------------------------------------

    /// Apply `splices`, which transform the previously iterated values into
    /// `current`. Splices that do not describe an edit from the current
    /// slots to `current` are ignored with a warning.
    pub fn handle_splices(&self, splices: &[Splice], current: &[Value]) {
        if self.is_closed() || splices.is_empty() {
            return;
        }
        let slots = self.instance_count();
        if !splices_fit(splices, slots, current.len()) {
            tracing::warn!(
                splices = splices.len(),
                slots,
                values = current.len(),
                "splices do not fit the region, ignoring them"
            );
            return;
        }
        let Some(parent) = self.template.parent() else {
            tracing::warn!("region template was detached, closing its iterator");
            self.close();
            return;
        };

        let span = tracing::debug_span!(
            "region_reconcile",
            splices = splices.len(),
            removed = field::Empty,
            added = field::Empty,
            reused = field::Empty,
            created = field::Empty,
            closed = field::Empty,
        );
        let _enter = span.enter();

        let iterated = {
            let mut state = self.state.borrow_mut();
            apply_splices(&mut state.iterated_value, current, splices);
            state.iterated_value.clone()
        };

        let mut cache: AHashMap<IdentityKey, VecDeque<Instance>> = AHashMap::new();
        let mut removed = 0usize;
        let mut remove_delta = 0isize;
        for splice in splices {
            for value in &splice.removed {
                let Some(index) = splice.index.checked_add_signed(remove_delta) else {
                    continue;
                };
                removed += 1;
                if let Slot::Filled(instance) = self.extract_instance_at(index) {
                    cache
                        .entry(value.identity_key())
                        .or_default()
                        .push_back(instance);
                }
            }
            remove_delta -= splice.added_count as isize;
        }

        let (mut added, mut reused, mut created) = (0usize, 0usize, 0usize);
        for splice in splices {
            for index in splice.index..splice.index + splice.added_count {
                let model = iterated.get(index).cloned().unwrap_or_default();
                let cached = cache
                    .get_mut(&model.identity_key())
                    .and_then(VecDeque::pop_front);
                let slot = match cached {
                    Some(instance) => {
                        reused += 1;
                        Slot::Filled(instance)
                    }
                    None if model.is_undefined() => Slot::Empty,
                    None => {
                        let slot = create_instance(&self.engine, &self.template, &model);
                        if !slot.is_empty() {
                            created += 1;
                        }
                        slot
                    }
                };
                self.insert_instance_at(index, slot, &parent);
                added += 1;
            }
        }

        let mut closed = 0usize;
        for instance in cache.into_values().flatten() {
            if instance.close() {
                closed += 1;
            }
        }

        self.engine.note_pass(reused, closed);
        span.record("removed", removed);
        span.record("added", added);
        span.record("reused", reused);
        span.record("created", created);
        span.record("closed", closed);
        debug_assert_eq!(
            self.instance_count(),
            self.state.borrow().iterated_value.len(),
            "region slots out of step with iterated values"
        );
    }

    // -----------------------------------------------------------------------
    // Teardown
    // -----------------------------------------------------------------------

    /// Close every instance and observer, remove rendered content if the
    /// template is still attached, and unregister. Idempotent.
    pub fn close(&self) {
        if self.is_closed() {
            return;
        }
        self.unobserve();

        let mut slots = Vec::new();
        if self.template.parent().is_some() {
            while let Some(last) = self.instance_count().checked_sub(1) {
                slots.push(self.extract_instance_at(last));
            }
        }
        let deps = {
            let mut state = self.state.borrow_mut();
            state.closed = true;
            state.iterated_value.clear();
            slots.append(&mut state.instances);
            state.deps.take()
        };

        let mut closed = 0usize;
        for slot in slots {
            if let Slot::Filled(instance) = slot {
                if instance.close() {
                    closed += 1;
                }
            }
        }
        if let Some(deps) = deps {
            deps.close();
        }
        self.engine.registry().unregister(&self.template, self);
        self.engine.note_closed(closed);
        tracing::trace!(closed, "region closed");
    }
}

/// `true` if `splices`, applied in order, edit `old_len` slots into `new_len`
/// values without reaching past either end.
fn splices_fit(splices: &[Splice], old_len: usize, new_len: usize) -> bool {
    let mut remaining = old_len;
    let mut added = 0usize;
    let mut delta = 0isize;
    for splice in splices {
        let Some(at) = splice.index.checked_add_signed(delta) else {
            return false;
        };
        if at + splice.removed.len() > remaining || splice.index + splice.added_count > new_len {
            return false;
        }
        remaining -= splice.removed.len();
        added += splice.added_count;
        delta -= splice.added_count as isize;
    }
    remaining + added == new_len
}

/// Apply a template's region directives, creating, rebinding, or closing
/// its iterator. Returns the live iterator, if any.
pub(crate) fn process_template_bindings(
    engine: &Engine,
    template: &Node,
    region: &RegionDirectives,
    model: &Value,
) -> Option<Rc<RegionIterator>> {
    let existing = engine.registry().lookup(template);
    if let Some(iterator) = &existing {
        iterator.close_deps();
    }

    if region.is_empty() {
        if let Some(iterator) = existing {
            iterator.close();
        }
        return None;
    }

    let iterator = existing.unwrap_or_else(|| {
        let iterator = RegionIterator::new(engine, template);
        engine.registry().register(template, &iterator);
        iterator
    });
    iterator.update_dependencies(region, model);
    Some(iterator)
}

impl Disposable for RegionIterator {
    fn close(&self) {
        RegionIterator::close(self);
    }

    fn is_closed(&self) -> bool {
        RegionIterator::is_closed(self)
    }
}

impl fmt::Debug for RegionIterator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("RegionIterator")
            .field("instances", &state.instances.len())
            .field("observing_collection", &state.array_observer.is_some())
            .field("closed", &state.closed)
            .finish()
    }
}
