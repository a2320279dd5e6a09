#![forbid(unsafe_code)]

//! In-memory view tree for stitch.
//!
//! A small retained tree of text nodes, elements, templates, and fragments,
//! with exactly the primitives the binding engine needs:
//!
//! - structure-only cloning ([`Node::clone_static`]);
//! - insertion and removal ([`Node::insert_before`], [`Node::insert_after`],
//!   [`Node::remove_child`]), where inserting a fragment moves its children;
//! - parent and sibling traversal;
//! - text, attribute, and property mutation;
//! - per-node event listeners plus a root-level [`EventHost`];
//! - a markup serializer ([`Node::to_markup`]) for assertions.
//!
//! The tree is single-threaded (`Rc`/`RefCell`).

pub mod event;
pub mod markup;
pub mod node;
pub mod tree;

pub use event::{Event, EventHost, ListenerFn};
pub use node::{Node, NodeKind, WeakNode};
