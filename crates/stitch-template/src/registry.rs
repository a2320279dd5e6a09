#![forbid(unsafe_code)]

//! Template-node to region-iterator association.
//!
//! Nodes never own their iterator. The registry maps node identity to a weak
//! iterator handle; iterators are owned by the instance that created them
//! (or by the caller of [`Engine::bind_region`](crate::Engine::bind_region)).
//! Entries whose node or iterator is gone are pruned on access.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use ahash::AHashMap;
use stitch_dom::{Node, WeakNode};

use crate::iterator::RegionIterator;

struct Entry {
    node: WeakNode,
    iterator: Weak<RegionIterator>,
}

/// Weak registry of live region iterators.
#[derive(Default)]
pub struct RegionRegistry {
    entries: RefCell<AHashMap<usize, Entry>>,
}

impl RegionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn register(&self, node: &Node, iterator: &Rc<RegionIterator>) {
        self.entries.borrow_mut().insert(
            node.key(),
            Entry {
                node: node.downgrade(),
                iterator: Rc::downgrade(iterator),
            },
        );
    }

    /// The open iterator for `node`, if any.
    #[must_use]
    pub fn lookup(&self, node: &Node) -> Option<Rc<RegionIterator>> {
        let key = node.key();
        let found = {
            let entries = self.entries.borrow();
            let entry = entries.get(&key)?;
            let same_node = entry.node.upgrade().is_some_and(|n| n.ptr_eq(node));
            same_node
                .then(|| entry.iterator.upgrade())
                .flatten()
                .filter(|iterator| !iterator.is_closed())
        };
        if found.is_none() {
            self.entries.borrow_mut().remove(&key);
        }
        found
    }

    /// Remove `node`'s entry if it refers to `iterator`.
    pub(crate) fn unregister(&self, node: &Node, iterator: &RegionIterator) {
        let mut entries = self.entries.borrow_mut();
        let owned = entries
            .get(&node.key())
            .is_some_and(|entry| std::ptr::eq(entry.iterator.as_ptr(), iterator));
        if owned {
            entries.remove(&node.key());
        }
    }

    /// Number of live entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.prune();
        self.entries.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn prune(&self) {
        self.entries.borrow_mut().retain(|_, entry| {
            entry.node.upgrade().is_some()
                && entry
                    .iterator
                    .upgrade()
                    .is_some_and(|iterator| !iterator.is_closed())
        });
    }
}

impl fmt::Debug for RegionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegionRegistry")
            .field("entries", &self.entries.borrow().len())
            .finish()
    }
}
