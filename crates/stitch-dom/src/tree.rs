#![forbid(unsafe_code)]

//! Structural operations: traversal, insertion, removal.
//!
//! Inserting a node that already has a parent moves it. Inserting a
//! [`NodeKind::Fragment`] moves the fragment's children, in order, and
//! leaves the fragment empty.
//!
//! # Failure Modes
//!
//! | Condition | Behavior |
//! |-----------|----------|
//! | Reference node is not a child of the parent | Append, log a warning |
//! | Removing a node that is not a child | No-op, returns `None` |
//! | Inserting into a text node | No-op, log a warning |

use std::rc::Rc;

use crate::node::{Node, NodeKind};

impl Node {
    #[must_use]
    pub fn parent(&self) -> Option<Node> {
        self.0.parent.borrow().upgrade().map(Node)
    }

    /// Handles to the children, in order.
    #[must_use]
    pub fn children(&self) -> Vec<Node> {
        self.0.children.borrow().clone()
    }

    #[must_use]
    pub fn child_count(&self) -> usize {
        self.0.children.borrow().len()
    }

    #[must_use]
    pub fn first_child(&self) -> Option<Node> {
        self.0.children.borrow().first().cloned()
    }

    /// Position of this node in its parent's child list.
    #[must_use]
    pub fn index_in_parent(&self) -> Option<usize> {
        let parent = self.parent()?;
        parent.position_of(self)
    }

    #[must_use]
    pub fn next_sibling(&self) -> Option<Node> {
        let parent = self.parent()?;
        let index = parent.position_of(self)?;
        parent.0.children.borrow().get(index + 1).cloned()
    }

    #[must_use]
    pub fn previous_sibling(&self) -> Option<Node> {
        let parent = self.parent()?;
        let index = parent.position_of(self)?;
        index
            .checked_sub(1)
            .and_then(|i| parent.0.children.borrow().get(i).cloned())
    }

    /// Topmost ancestor (the node itself when detached).
    #[must_use]
    pub fn root(&self) -> Node {
        let mut current = self.clone();
        while let Some(parent) = current.parent() {
            current = parent;
        }
        current
    }

    /// `true` if `self` is `other` or one of its descendants.
    #[must_use]
    pub fn is_inclusive_descendant_of(&self, other: &Node) -> bool {
        let mut current = Some(self.clone());
        while let Some(node) = current {
            if node.ptr_eq(other) {
                return true;
            }
            current = node.parent();
        }
        false
    }

    fn position_of(&self, child: &Node) -> Option<usize> {
        self.0
            .children
            .borrow()
            .iter()
            .position(|c| c.ptr_eq(child))
    }

    /// Append `child` (or a fragment's children) as last child.
    pub fn append_child(&self, child: &Node) {
        self.insert_before(child, None);
    }

    /// Insert `child` before `reference`, or at the end when `reference` is
    /// `None`.
    pub fn insert_before(&self, child: &Node, reference: Option<&Node>) {
        if self.kind() == NodeKind::Text {
            tracing::warn!("cannot insert children into a text node");
            return;
        }
        if reference.is_some_and(|r| r.ptr_eq(child)) {
            // Already in place.
            return;
        }
        let moved = take_for_insertion(child);
        if moved.is_empty() {
            return;
        }
        debug_assert!(
            moved.iter().all(|n| !self.is_inclusive_descendant_of(n)),
            "inserting a node into its own subtree"
        );

        let index = match reference {
            None => self.child_count(),
            Some(reference) => self.position_of(reference).unwrap_or_else(|| {
                tracing::warn!("insertion reference is not a child, appending");
                self.child_count()
            }),
        };
        for node in &moved {
            *node.0.parent.borrow_mut() = Rc::downgrade(&self.0);
        }
        let mut children = self.0.children.borrow_mut();
        for (offset, node) in moved.into_iter().enumerate() {
            children.insert(index + offset, node);
        }
    }

    /// Insert `child` directly after `anchor`, which must be a child of
    /// `self`. With `anchor == None` the child becomes the first child.
    pub fn insert_after(&self, child: &Node, anchor: Option<&Node>) {
        let reference = match anchor {
            None => self.first_child(),
            Some(anchor) => anchor.next_sibling(),
        };
        self.insert_before(child, reference.as_ref());
    }

    /// Detach `child` from `self`. Returns the detached node.
    pub fn remove_child(&self, child: &Node) -> Option<Node> {
        let index = self.position_of(child)?;
        let removed = self.0.children.borrow_mut().remove(index);
        *removed.0.parent.borrow_mut() = std::rc::Weak::new();
        Some(removed)
    }

    /// Detach this node from its parent, if any.
    pub fn detach(&self) {
        if let Some(parent) = self.parent() {
            parent.remove_child(self);
        }
    }

    /// Nodes in document order, starting with `self`.
    #[must_use]
    pub fn descendants(&self) -> Vec<Node> {
        let mut out = Vec::new();
        let mut stack = vec![self.clone()];
        while let Some(node) = stack.pop() {
            stack.extend(node.children().into_iter().rev());
            out.push(node);
        }
        out
    }
}

/// Detach what `child` contributes to an insertion: its children if it is a
/// fragment, otherwise the node itself.
fn take_for_insertion(child: &Node) -> Vec<Node> {
    if child.kind() == NodeKind::Fragment {
        let children = std::mem::take(&mut *child.0.children.borrow_mut());
        for node in &children {
            *node.0.parent.borrow_mut() = std::rc::Weak::new();
        }
        children
    } else {
        child.detach();
        vec![child.clone()]
    }
}
