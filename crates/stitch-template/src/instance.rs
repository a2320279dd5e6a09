#![forbid(unsafe_code)]

//! Instance factory.
//!
//! [`create_instance`] materializes a template's content against one model
//! value: every static node is cloned structure-only, bound properties get
//! live observers (or one-time values), event handlers are wired, and
//! nested templates get their own [`RegionIterator`]. Everything opened
//! along the way is recorded in the [`Instance`] so it can be closed as a
//! unit.
//!
//! # Invariants
//!
//! 1. The terminator is the clone of the *last static child*, recorded when
//!    it is produced. A nested region cloned last may still grow siblings
//!    after it, so the last node of the finished fragment is not used.
//! 2. Content comes from [`Node::instance_source`]: the source template's
//!    content for a cloned nested template, else the template's own. Empty
//!    content yields [`Slot::Empty`] without allocating.
//! 3. Closing an instance closes each binding exactly once.

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

use stitch_dom::{Event, Node, NodeKind, WeakNode};
use stitch_observe::{Disposable, Observer, Value};

use crate::directive::{DirectiveNode, EventHandlerSpec};
use crate::dispatch::bind_node;
use crate::engine::Engine;
use crate::iterator::{RegionIterator, process_template_bindings};

/// Something an instance owns and must close.
#[derive(Clone)]
pub enum InstanceBinding {
    Observer(Rc<dyn Observer>),
    Region(Rc<RegionIterator>),
}

impl InstanceBinding {
    pub fn close(&self) {
        match self {
            InstanceBinding::Observer(observer) => observer.close(),
            InstanceBinding::Region(region) => region.close(),
        }
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        match self {
            InstanceBinding::Observer(observer) => observer.is_closed(),
            InstanceBinding::Region(region) => region.is_closed(),
        }
    }
}

impl fmt::Debug for InstanceBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstanceBinding::Observer(observer) => {
                f.debug_tuple("Observer").field(&observer.state()).finish()
            }
            InstanceBinding::Region(region) => f.debug_tuple("Region").field(region).finish(),
        }
    }
}

/// One materialization of a template's content.
pub struct Instance {
    fragment: Node,
    bindings: Vec<InstanceBinding>,
    terminator: WeakNode,
    closed: Cell<bool>,
}

impl Instance {
    /// Holds the instance's nodes while it is not inserted.
    #[must_use]
    pub fn fragment(&self) -> &Node {
        &self.fragment
    }

    #[must_use]
    pub fn bindings(&self) -> &[InstanceBinding] {
        &self.bindings
    }

    /// Last top-level node of the instance, while it is alive.
    #[must_use]
    pub fn terminator(&self) -> Option<Node> {
        self.terminator.upgrade()
    }

    /// Close all bindings. Returns `true` if this call did the closing.
    pub fn close(&self) -> bool {
        if self.closed.replace(true) {
            return false;
        }
        for binding in &self.bindings {
            binding.close();
        }
        true
    }
}

impl Disposable for Instance {
    fn close(&self) {
        Instance::close(self);
    }

    fn is_closed(&self) -> bool {
        self.closed.get()
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("bindings", &self.bindings.len())
            .field("terminator", &self.terminator)
            .field("closed", &self.closed.get())
            .finish()
    }
}

/// A position in a region: real content, or nothing.
#[derive(Debug)]
pub enum Slot {
    /// No content: zero nodes, zero bindings, no terminator. Never cached
    /// for reuse and never closed.
    Empty,
    Filled(Instance),
}

impl Slot {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        matches!(self, Slot::Empty)
    }

    #[must_use]
    pub fn instance(&self) -> Option<&Instance> {
        match self {
            Slot::Empty => None,
            Slot::Filled(instance) => Some(instance),
        }
    }

    #[must_use]
    pub fn terminator(&self) -> Option<Node> {
        self.instance().and_then(Instance::terminator)
    }
}

/// Materialize `template`'s content against `model`.
pub(crate) fn create_instance(engine: &Engine, template: &Node, model: &Value) -> Slot {
    let content = template
        .instance_source()
        .filter(|content| content.first_child().is_some());
    let Some(content) = content else {
        return Slot::Empty;
    };

    let directives = engine.directives().get_or_build(&content, engine.config());
    let fragment = Node::fragment();
    let mut bindings = Vec::new();
    let mut terminator = WeakNode::new();
    for child in directives.children() {
        if let Some(clone) = clone_and_bind(engine, &fragment, child, model, &mut bindings) {
            terminator = clone.downgrade();
        }
    }

    engine.note_created();
    Slot::Filled(Instance {
        fragment,
        bindings,
        terminator,
        closed: Cell::new(false),
    })
}

fn clone_and_bind(
    engine: &Engine,
    parent: &Node,
    directive: &DirectiveNode,
    model: &Value,
    bindings: &mut Vec<InstanceBinding>,
) -> Option<Node> {
    let Some(clone) = directive.clone_node() else {
        tracing::warn!("static template node was dropped while its directives were cached");
        return None;
    };
    parent.append_child(&clone);

    for child in directive.children() {
        clone_and_bind(engine, &clone, child, model, bindings);
    }

    if clone.kind() == NodeKind::Template {
        clone.set_instance_ref(directive.node().and_then(|source| source.template_content()));
    }

    for handler in directive.event_handlers() {
        add_event_handler(&clone, handler);
    }

    process_bindings(engine, &clone, directive, model, bindings);
    Some(clone)
}

fn process_bindings(
    engine: &Engine,
    node: &Node,
    directive: &DirectiveNode,
    model: &Value,
    bindings: &mut Vec<InstanceBinding>,
) {
    for property in directive.properties() {
        let value = property.expression.create_observer(engine.scheduler(), model);
        if let Some(observer) = bind_node(node, &property.name, value, engine.config()) {
            bindings.push(InstanceBinding::Observer(observer));
        }
    }

    if node.kind() == NodeKind::Template {
        if let Some(region) = process_template_bindings(engine, node, directive.region(), model) {
            bindings.push(InstanceBinding::Region(region));
        }
    }
}

/// Dispatching `event` on `node` invokes `method` on the host of the node's
/// owner scope. A missing host or method is ignored.
fn add_event_handler(node: &Node, handler: &EventHandlerSpec) {
    let method = handler.method.clone();
    node.add_event_listener(
        handler.event.clone(),
        Rc::new(move |target: &Node, event: &Event| {
            let handled = target
                .owner_host()
                .is_some_and(|host| host.handle_event(&method, target, event));
            if !handled {
                tracing::trace!(method = %method, event = %event.name, "no handler on owner scope host");
            }
        }),
    );
}
