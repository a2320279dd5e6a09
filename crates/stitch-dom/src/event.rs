#![forbid(unsafe_code)]

//! Event listeners and owner-scope hosts.
//!
//! Listeners are attached per node and keyed by event name. Dispatch is
//! target-only (no bubbling). A tree root can carry an [`EventHost`]: the
//! object that declarative `on-<event>` handlers resolve their method names
//! against.

use std::fmt;
use std::rc::Rc;

use stitch_observe::Value;

use crate::node::Node;

/// An event delivered to listeners.
#[derive(Debug, Clone)]
pub struct Event {
    pub name: String,
    pub detail: Value,
}

impl Event {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            detail: Value::Undefined,
        }
    }

    #[must_use]
    pub fn with_detail(mut self, detail: impl Into<Value>) -> Self {
        self.detail = detail.into();
        self
    }
}

/// Receiver of named handler invocations for a tree.
pub trait EventHost {
    /// Invoke `method`. Returns `false` if the host has no such method.
    fn handle_event(&self, method: &str, target: &Node, event: &Event) -> bool;
}

/// Listener callback: `(current_target, event)`.
pub type ListenerFn = Rc<dyn Fn(&Node, &Event)>;

#[derive(Clone)]
pub(crate) struct Listener {
    pub(crate) event: String,
    pub(crate) callback: ListenerFn,
}

impl fmt::Debug for Listener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listener").field("event", &self.event).finish()
    }
}

impl Node {
    pub fn add_event_listener(&self, event: impl Into<String>, callback: ListenerFn) {
        self.0.listeners.borrow_mut().push(Listener {
            event: event.into(),
            callback,
        });
    }

    #[must_use]
    pub fn listener_count(&self, event: &str) -> usize {
        self.0
            .listeners
            .borrow()
            .iter()
            .filter(|l| l.event == event)
            .count()
    }

    /// Invoke this node's listeners for `event.name`, in registration order.
    /// Returns how many ran.
    pub fn dispatch_event(&self, event: &Event) -> usize {
        let matching: Vec<ListenerFn> = self
            .0
            .listeners
            .borrow()
            .iter()
            .filter(|l| l.event == event.name)
            .map(|l| Rc::clone(&l.callback))
            .collect();
        for callback in &matching {
            callback(self, event);
        }
        matching.len()
    }

    /// Attach (or clear) the host that handler names on this tree resolve
    /// against. Only meaningful on a root.
    pub fn set_host(&self, host: Option<Rc<dyn EventHost>>) {
        *self.0.host.borrow_mut() = host;
    }

    #[must_use]
    pub fn host(&self) -> Option<Rc<dyn EventHost>> {
        self.0.host.borrow().clone()
    }

    /// Host of this node's owner scope (the root of its tree).
    #[must_use]
    pub fn owner_host(&self) -> Option<Rc<dyn EventHost>> {
        self.root().host()
    }
}
