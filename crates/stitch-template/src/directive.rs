#![forbid(unsafe_code)]

//! Directive model.
//!
//! A [`DirectiveNode`] tree mirrors the static structure of a template's
//! content once: which attributes and text are bound, which nested
//! templates declare `if`/`bind`/`repeat`, and which event handlers to
//! wire. Every instantiation of the same template walks this tree instead
//! of re-parsing markup.
//!
//! # Invariants
//!
//! 1. Directive trees are immutable after construction and shared by all
//!    instantiations of a template.
//! 2. The cache is keyed by the identity of the content fragment and keeps
//!    that fragment alive, so a key is never reused for different content.
//! 3. A region with a conditional but neither `bind` nor `repeat` gets a
//!    synthesized `{{}}` bind.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use ahash::AHashMap;
use stitch_dom::{Node, NodeKind, WeakNode};

use crate::config::BindingConfig;
use crate::mustache::BindingExpression;

/// One bound attribute or text node.
#[derive(Debug, Clone)]
pub struct PropertyBinding {
    pub name: String,
    pub expression: Rc<BindingExpression>,
}

/// `on-<event>="method"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventHandlerSpec {
    pub event: String,
    pub method: String,
}

/// Region directives declared on a template.
#[derive(Debug, Clone, Default)]
pub struct RegionDirectives {
    pub conditional: Option<Rc<BindingExpression>>,
    pub bind: Option<Rc<BindingExpression>>,
    pub repeat: Option<Rc<BindingExpression>>,
}

impl RegionDirectives {
    /// Parse the reserved attributes of a template node.
    #[must_use]
    pub fn from_template(template: &Node, config: &BindingConfig) -> Self {
        let mut region = Self::default();
        for (name, value) in template.attributes() {
            region.accept(&name, &value, config);
        }
        region.finish();
        region
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.conditional.is_none() && self.bind.is_none() && self.repeat.is_none()
    }

    /// Expression producing the region's value: `repeat`, else `bind`.
    #[must_use]
    pub fn value_expression(&self) -> Option<&Rc<BindingExpression>> {
        self.repeat.as_ref().or(self.bind.as_ref())
    }

    /// Returns `true` if `name` is a region attribute.
    fn accept(&mut self, name: &str, value: &str, config: &BindingConfig) -> bool {
        let slot = if name == config.if_attribute {
            &mut self.conditional
        } else if name == config.bind_attribute {
            &mut self.bind
        } else if name == config.repeat_attribute {
            &mut self.repeat
        } else {
            return false;
        };
        *slot = BindingExpression::parse_with_default(value).map(Rc::new);
        true
    }

    fn finish(&mut self) {
        if self.conditional.is_some() && self.bind.is_none() && self.repeat.is_none() {
            self.bind = Some(Rc::new(BindingExpression::identity()));
        }
    }
}

/// Static description of one node of a template's content.
pub struct DirectiveNode {
    node: WeakNode,
    kind: NodeKind,
    properties: Vec<PropertyBinding>,
    region: RegionDirectives,
    event_handlers: Vec<EventHandlerSpec>,
    children: Vec<DirectiveNode>,
}

impl DirectiveNode {
    /// Walk `node` and its descendants.
    #[must_use]
    pub fn build(node: &Node, config: &BindingConfig) -> Self {
        let kind = node.kind();
        let mut properties = Vec::new();
        let mut region = RegionDirectives::default();
        let mut event_handlers = Vec::new();

        match kind {
            NodeKind::Text => {
                let text = node.text_content().unwrap_or_default();
                if let Some(expression) = BindingExpression::parse(&text) {
                    properties.push(PropertyBinding {
                        name: config.text_property.clone(),
                        expression: Rc::new(expression),
                    });
                }
            }
            NodeKind::Element | NodeKind::Template => {
                for (name, value) in node.attributes() {
                    if kind == NodeKind::Template && region.accept(&name, &value, config) {
                        continue;
                    }
                    if let Some(event) = config.event_name(&name) {
                        event_handlers.push(EventHandlerSpec {
                            event: event.to_owned(),
                            method: value,
                        });
                        continue;
                    }
                    if let Some(expression) = BindingExpression::parse(&value) {
                        properties.push(PropertyBinding {
                            name,
                            expression: Rc::new(expression),
                        });
                    }
                }
                region.finish();
            }
            NodeKind::Fragment => {}
        }

        let children = node
            .children()
            .iter()
            .map(|child| Self::build(child, config))
            .collect();

        Self {
            node: node.downgrade(),
            kind,
            properties,
            region,
            event_handlers,
            children,
        }
    }

    /// The static node this directive describes.
    #[must_use]
    pub fn node(&self) -> Option<Node> {
        self.node.upgrade()
    }

    #[must_use]
    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    #[must_use]
    pub fn properties(&self) -> &[PropertyBinding] {
        &self.properties
    }

    #[must_use]
    pub fn region(&self) -> &RegionDirectives {
        &self.region
    }

    #[must_use]
    pub fn event_handlers(&self) -> &[EventHandlerSpec] {
        &self.event_handlers
    }

    #[must_use]
    pub fn children(&self) -> &[DirectiveNode] {
        &self.children
    }

    /// Structure-only clone of the static node.
    #[must_use]
    pub fn clone_node(&self) -> Option<Node> {
        self.node.upgrade().map(|node| node.clone_static())
    }
}

impl fmt::Debug for DirectiveNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DirectiveNode")
            .field("kind", &self.kind)
            .field("properties", &self.properties.len())
            .field("region", &!self.region.is_empty())
            .field("event_handlers", &self.event_handlers.len())
            .field("children", &self.children)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Cache
// ---------------------------------------------------------------------------

/// Directive trees keyed by content-fragment identity.
#[derive(Default)]
pub struct DirectiveCache {
    entries: RefCell<AHashMap<usize, (Node, Rc<DirectiveNode>)>>,
    builds: Cell<u64>,
}

impl DirectiveCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Directive tree for `content`, building it on first request.
    pub fn get_or_build(&self, content: &Node, config: &BindingConfig) -> Rc<DirectiveNode> {
        if let Some((_, directives)) = self.entries.borrow().get(&content.key()) {
            return Rc::clone(directives);
        }
        let directives = Rc::new(DirectiveNode::build(content, config));
        self.builds.set(self.builds.get() + 1);
        tracing::trace!(
            children = directives.children().len(),
            "built directive tree for template content"
        );
        self.entries
            .borrow_mut()
            .insert(content.key(), (content.clone(), Rc::clone(&directives)));
        directives
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of directive trees built so far.
    #[must_use]
    pub fn builds(&self) -> u64 {
        self.builds.get()
    }
}

impl fmt::Debug for DirectiveCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DirectiveCache")
            .field("entries", &self.len())
            .field("builds", &self.builds.get())
            .finish()
    }
}
