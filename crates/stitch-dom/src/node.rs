#![forbid(unsafe_code)]

//! View-tree nodes.
//!
//! A [`Node`] is a shared handle (`Rc`) to one node of an in-memory view
//! tree. Children are owned by their parent; the parent link is weak, so a
//! detached subtree is freed as soon as the last handle to its root goes
//! away.
//!
//! There are four kinds of node, see [`NodeKind`]. Templates carry an inert
//! content fragment that is never part of the live tree; their content is
//! the static source that instances are cloned from.
//!
//! # Invariants
//!
//! 1. A node has at most one parent, and appears exactly once in that
//!    parent's child list.
//! 2. Template content is a `Fragment` with no parent.
//! 3. Node identity is handle identity: two handles are the same node iff
//!    [`Node::ptr_eq`] holds.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use ahash::AHashMap;
use stitch_observe::Value;

use crate::event::{EventHost, Listener};

/// Closed set of node kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    /// Character data.
    Text,
    /// Ordinary element with attributes and properties.
    Element,
    /// Region-bearing element: owns an inert content fragment.
    Template,
    /// Parentless container; inserting it moves its children instead.
    Fragment,
}

#[derive(Default)]
pub(crate) struct ElementData {
    pub(crate) tag: String,
    /// Insertion-ordered.
    pub(crate) attributes: Vec<(String, String)>,
    pub(crate) properties: AHashMap<String, Value>,
}

pub(crate) struct TemplateData {
    pub(crate) content: Node,
    /// Static content a cloned template instantiates from.
    pub(crate) instance_ref: Option<Node>,
}

pub(crate) enum NodeData {
    Text(String),
    Element(ElementData),
    Template(ElementData, TemplateData),
    Fragment,
}

pub(crate) struct NodeInner {
    pub(crate) data: RefCell<NodeData>,
    pub(crate) parent: RefCell<Weak<NodeInner>>,
    pub(crate) children: RefCell<Vec<Node>>,
    pub(crate) listeners: RefCell<Vec<Listener>>,
    pub(crate) host: RefCell<Option<Rc<dyn EventHost>>>,
}

/// Shared handle to a view-tree node. Cloning the handle does not clone the
/// node; see [`Node::clone_static`].
#[derive(Clone)]
pub struct Node(pub(crate) Rc<NodeInner>);

/// Non-owning handle to a [`Node`].
#[derive(Clone, Default)]
pub struct WeakNode(Weak<NodeInner>);

impl WeakNode {
    #[must_use]
    pub fn new() -> Self {
        Self(Weak::new())
    }

    #[must_use]
    pub fn upgrade(&self) -> Option<Node> {
        self.0.upgrade().map(Node)
    }
}

impl fmt::Debug for WeakNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.upgrade() {
            Some(node) => write!(f, "WeakNode({node:?})"),
            None => f.write_str("WeakNode(<dropped>)"),
        }
    }
}

impl Node {
    fn from_data(data: NodeData) -> Self {
        Self(Rc::new(NodeInner {
            data: RefCell::new(data),
            parent: RefCell::new(Weak::new()),
            children: RefCell::new(Vec::new()),
            listeners: RefCell::new(Vec::new()),
            host: RefCell::new(None),
        }))
    }

    #[must_use]
    pub fn text(content: impl Into<String>) -> Self {
        Self::from_data(NodeData::Text(content.into()))
    }

    #[must_use]
    pub fn element(tag: impl Into<String>) -> Self {
        Self::from_data(NodeData::Element(ElementData {
            tag: tag.into(),
            ..ElementData::default()
        }))
    }

    /// A `<template>` with empty content.
    #[must_use]
    pub fn template() -> Self {
        Self::from_data(NodeData::Template(
            ElementData {
                tag: "template".to_owned(),
                ..ElementData::default()
            },
            TemplateData {
                content: Self::fragment(),
                instance_ref: None,
            },
        ))
    }

    #[must_use]
    pub fn fragment() -> Self {
        Self::from_data(NodeData::Fragment)
    }

    // -----------------------------------------------------------------------
    // Builders
    // -----------------------------------------------------------------------

    /// Set an attribute and return `self`. No-op on text and fragments.
    #[must_use]
    pub fn with_attribute(self, name: &str, value: &str) -> Self {
        self.set_attribute(name, value);
        self
    }

    /// Append a child and return `self`. For a template, the child goes into
    /// its content fragment, the way markup inside `<template>` does.
    #[must_use]
    pub fn with_child(self, child: Node) -> Self {
        match self.template_content() {
            Some(content) => content.append_child(&child),
            None => self.append_child(&child),
        }
        self
    }

    // -----------------------------------------------------------------------
    // Identity
    // -----------------------------------------------------------------------

    #[must_use]
    pub fn ptr_eq(&self, other: &Node) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Address-based identity key. Only meaningful while the node is alive.
    #[must_use]
    pub fn key(&self) -> usize {
        Rc::as_ptr(&self.0) as *const () as usize
    }

    #[must_use]
    pub fn downgrade(&self) -> WeakNode {
        WeakNode(Rc::downgrade(&self.0))
    }

    // -----------------------------------------------------------------------
    // Data access
    // -----------------------------------------------------------------------

    #[must_use]
    pub fn kind(&self) -> NodeKind {
        match &*self.0.data.borrow() {
            NodeData::Text(_) => NodeKind::Text,
            NodeData::Element(_) => NodeKind::Element,
            NodeData::Template(..) => NodeKind::Template,
            NodeData::Fragment => NodeKind::Fragment,
        }
    }

    #[must_use]
    pub fn is_template(&self) -> bool {
        self.kind() == NodeKind::Template
    }

    /// Tag name for elements and templates.
    #[must_use]
    pub fn tag(&self) -> Option<String> {
        match &*self.0.data.borrow() {
            NodeData::Element(el) | NodeData::Template(el, _) => Some(el.tag.clone()),
            NodeData::Text(_) | NodeData::Fragment => None,
        }
    }

    /// Character data of a text node.
    #[must_use]
    pub fn text_content(&self) -> Option<String> {
        match &*self.0.data.borrow() {
            NodeData::Text(text) => Some(text.clone()),
            _ => None,
        }
    }

    /// Replace the character data of a text node. Ignored on other kinds.
    pub fn set_text(&self, text: &str) {
        if let NodeData::Text(current) = &mut *self.0.data.borrow_mut() {
            text.clone_into(current);
        }
    }

    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<String> {
        self.with_element(|el| {
            el.attributes
                .iter()
                .find(|(n, _)| n == name)
                .map(|(_, v)| v.clone())
        })
        .flatten()
    }

    #[must_use]
    pub fn has_attribute(&self, name: &str) -> bool {
        self.attribute(name).is_some()
    }

    /// All attributes in insertion order.
    #[must_use]
    pub fn attributes(&self) -> Vec<(String, String)> {
        self.with_element(|el| el.attributes.clone())
            .unwrap_or_default()
    }

    pub fn set_attribute(&self, name: &str, value: &str) {
        self.with_element_mut(|el| {
            match el.attributes.iter_mut().find(|(n, _)| n == name) {
                Some((_, v)) => value.clone_into(v),
                None => el.attributes.push((name.to_owned(), value.to_owned())),
            }
        });
    }

    /// Returns `true` if the attribute was present.
    pub fn remove_attribute(&self, name: &str) -> bool {
        self.with_element_mut(|el| {
            let before = el.attributes.len();
            el.attributes.retain(|(n, _)| n != name);
            before != el.attributes.len()
        })
        .unwrap_or(false)
    }

    /// Property value, `Undefined` if never assigned.
    #[must_use]
    pub fn property(&self, name: &str) -> Value {
        self.with_element(|el| el.properties.get(name).cloned())
            .flatten()
            .unwrap_or_default()
    }

    pub fn set_property(&self, name: &str, value: Value) {
        self.with_element_mut(|el| {
            el.properties.insert(name.to_owned(), value);
        });
    }

    /// Content fragment of a template.
    #[must_use]
    pub fn template_content(&self) -> Option<Node> {
        match &*self.0.data.borrow() {
            NodeData::Template(_, tpl) => Some(tpl.content.clone()),
            _ => None,
        }
    }

    /// Static source content of a cloned template, if set.
    #[must_use]
    pub fn instance_ref(&self) -> Option<Node> {
        match &*self.0.data.borrow() {
            NodeData::Template(_, tpl) => tpl.instance_ref.clone(),
            _ => None,
        }
    }

    pub fn set_instance_ref(&self, source: Option<Node>) {
        if let NodeData::Template(_, tpl) = &mut *self.0.data.borrow_mut() {
            tpl.instance_ref = source;
        }
    }

    /// Content a template instantiates from: its `instance_ref` if set,
    /// else its own content.
    #[must_use]
    pub fn instance_source(&self) -> Option<Node> {
        self.instance_ref().or_else(|| self.template_content())
    }

    fn with_element<R>(&self, f: impl FnOnce(&ElementData) -> R) -> Option<R> {
        match &*self.0.data.borrow() {
            NodeData::Element(el) | NodeData::Template(el, _) => Some(f(el)),
            NodeData::Text(_) | NodeData::Fragment => None,
        }
    }

    fn with_element_mut<R>(&self, f: impl FnOnce(&mut ElementData) -> R) -> Option<R> {
        match &mut *self.0.data.borrow_mut() {
            NodeData::Element(el) | NodeData::Template(el, _) => Some(f(el)),
            NodeData::Text(_) | NodeData::Fragment => None,
        }
    }

    /// Structure-only shallow clone: kind, tag, attributes and text. No
    /// children, properties, listeners, or host. A cloned template has empty
    /// content.
    #[must_use]
    pub fn clone_static(&self) -> Node {
        let data = match &*self.0.data.borrow() {
            NodeData::Text(text) => NodeData::Text(text.clone()),
            NodeData::Element(el) => NodeData::Element(shallow_element(el)),
            NodeData::Template(el, _) => NodeData::Template(
                shallow_element(el),
                TemplateData {
                    content: Node::fragment(),
                    instance_ref: None,
                },
            ),
            NodeData::Fragment => NodeData::Fragment,
        };
        Node::from_data(data)
    }
}

fn shallow_element(el: &ElementData) -> ElementData {
    ElementData {
        tag: el.tag.clone(),
        attributes: el.attributes.clone(),
        properties: AHashMap::new(),
    }
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for Node {}

impl std::hash::Hash for Node {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &*self.0.data.borrow() {
            NodeData::Text(text) => write!(f, "#text({text:?})"),
            NodeData::Element(el) | NodeData::Template(el, _) => {
                write!(f, "<{}>", el.tag)?;
                let children = self.0.children.borrow().len();
                if children > 0 {
                    write!(f, "[{children}]")?;
                }
                Ok(())
            }
            NodeData::Fragment => write!(f, "#fragment[{}]", self.0.children.borrow().len()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_are_reported() {
        assert_eq!(Node::text("x").kind(), NodeKind::Text);
        assert_eq!(Node::element("div").kind(), NodeKind::Element);
        assert_eq!(Node::template().kind(), NodeKind::Template);
        assert_eq!(Node::fragment().kind(), NodeKind::Fragment);
    }

    #[test]
    fn attributes_keep_insertion_order_and_overwrite_in_place() {
        let node = Node::element("a")
            .with_attribute("href", "/x")
            .with_attribute("class", "c");
        node.set_attribute("href", "/y");
        assert_eq!(
            node.attributes(),
            vec![
                ("href".to_owned(), "/y".to_owned()),
                ("class".to_owned(), "c".to_owned())
            ]
        );
        assert!(node.remove_attribute("href"));
        assert!(!node.remove_attribute("href"));
        assert!(!node.has_attribute("href"));
    }

    #[test]
    fn template_children_go_into_content() {
        let tpl = Node::template().with_child(Node::text("hi"));
        assert_eq!(tpl.child_count(), 0);
        let content = tpl.template_content().unwrap();
        assert_eq!(content.child_count(), 1);
        assert!(content.parent().is_none());
    }

    #[test]
    fn clone_static_is_shallow() {
        let el = Node::element("p")
            .with_attribute("id", "x")
            .with_child(Node::text("t"));
        el.set_property("value", Value::from(3));
        let copy = el.clone_static();
        assert!(!copy.ptr_eq(&el));
        assert_eq!(copy.attribute("id").as_deref(), Some("x"));
        assert_eq!(copy.child_count(), 0);
        assert!(copy.property("value").is_undefined());
    }

    #[test]
    fn cloned_template_has_empty_content_and_no_instance_ref() {
        let tpl = Node::template()
            .with_attribute("repeat", "")
            .with_child(Node::element("li"));
        tpl.set_instance_ref(tpl.template_content());
        let copy = tpl.clone_static();
        assert_eq!(copy.template_content().unwrap().child_count(), 0);
        assert!(copy.instance_ref().is_none());
        assert_eq!(copy.attribute("repeat").as_deref(), Some(""));
    }

    #[test]
    fn instance_source_prefers_instance_ref() {
        let source = Node::template().with_child(Node::text("a"));
        let copy = source.clone_static();
        assert!(copy.instance_source().unwrap().children().is_empty());
        copy.set_instance_ref(source.template_content());
        assert_eq!(copy.instance_source().unwrap().child_count(), 1);
    }

    #[test]
    fn weak_node_does_not_keep_node_alive() {
        let weak = Node::element("div").downgrade();
        assert!(weak.upgrade().is_none());
    }

    #[test]
    fn text_and_properties_ignore_wrong_kinds() {
        let el = Node::element("div");
        el.set_text("nope");
        assert_eq!(el.text_content(), None);
        let text = Node::text("a");
        text.set_property("x", Value::from(1));
        assert!(text.property("x").is_undefined());
        text.set_text("b");
        assert_eq!(text.text_content().as_deref(), Some("b"));
    }
}
