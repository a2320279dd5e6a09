#![forbid(unsafe_code)]

//! Binding dispatch: route a value to text, attribute, or property.
//!
//! | Node kind | Bound name | Primitive |
//! |-----------|------------|-----------|
//! | Text | any | `set_text`, nullish as `""` |
//! | Element/Template | in [`BindingConfig::attribute_names`] | `set_attribute`, nullish as `""` |
//! | Element/Template | other | `set_property`, raw value |
//! | Fragment | any | ignored |

use std::rc::Rc;

use stitch_dom::{Node, NodeKind};
use stitch_observe::{Observer, Value};

use crate::config::BindingConfig;
use crate::mustache::BindingValue;

/// Where a bound value is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindTarget {
    Text,
    Attribute,
    Property,
}

impl BindTarget {
    /// Select the target for `name` on a node of `kind`. `None` for
    /// fragments, which cannot hold values.
    #[must_use]
    pub fn select(kind: NodeKind, name: &str, config: &BindingConfig) -> Option<Self> {
        match kind {
            NodeKind::Text => Some(BindTarget::Text),
            NodeKind::Element | NodeKind::Template if config.is_attribute_name(name) => {
                Some(BindTarget::Attribute)
            }
            NodeKind::Element | NodeKind::Template => Some(BindTarget::Property),
            NodeKind::Fragment => None,
        }
    }

    /// Write `value` to `node`.
    pub fn apply(self, node: &Node, name: &str, value: &Value) {
        match self {
            BindTarget::Text => node.set_text(&value.to_text()),
            BindTarget::Attribute => node.set_attribute(name, &value.to_text()),
            BindTarget::Property => node.set_property(name, value.clone()),
        }
    }
}

/// Bind `node.name` to `value`.
///
/// A live observer is opened, its current value applied, and every later
/// delivery applied again; the opened observer is returned so the caller
/// can close it. A one-time value is applied once and `None` is returned.
pub fn bind_node(
    node: &Node,
    name: &str,
    value: BindingValue,
    config: &BindingConfig,
) -> Option<Rc<dyn Observer>> {
    let Some(target) = BindTarget::select(node.kind(), name, config) else {
        tracing::warn!(name, "cannot bind a value to a fragment");
        return None;
    };

    match value {
        BindingValue::OneTime(value) => {
            target.apply(node, name, &value);
            None
        }
        BindingValue::Live(observer) => {
            let weak = node.downgrade();
            let bound_name = name.to_owned();
            let initial = observer.open(Box::new(move |value, _| {
                if let Some(node) = weak.upgrade() {
                    target.apply(&node, &bound_name, value);
                }
            }));
            target.apply(node, name, &initial);
            Some(observer)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stitch_observe::{Object, Path, PathObserver, Scheduler};

    fn live(scheduler: &Scheduler, model: &Object, path: &str) -> BindingValue {
        BindingValue::Live(PathObserver::new(
            scheduler,
            model.clone().into(),
            Path::parse(path).unwrap(),
        ))
    }

    #[test]
    fn target_selection() {
        let config = BindingConfig::default();
        assert_eq!(
            BindTarget::select(NodeKind::Text, "anything", &config),
            Some(BindTarget::Text)
        );
        assert_eq!(
            BindTarget::select(NodeKind::Element, "class", &config),
            Some(BindTarget::Attribute)
        );
        assert_eq!(
            BindTarget::select(NodeKind::Template, "value", &config),
            Some(BindTarget::Property)
        );
        assert_eq!(BindTarget::select(NodeKind::Fragment, "x", &config), None);
    }

    #[test]
    fn text_binding_sanitizes_nullish_and_tracks_changes() {
        let scheduler = Scheduler::new();
        let model = Object::from_pairs([("name", Value::Null)]);
        let node = Node::text("");
        let observer = bind_node(
            &node,
            "textContent",
            live(&scheduler, &model, "name"),
            &BindingConfig::default(),
        )
        .unwrap();
        assert_eq!(node.text_content().as_deref(), Some(""));

        model.set("name", "Ada");
        scheduler.flush();
        assert_eq!(node.text_content().as_deref(), Some("Ada"));

        observer.close();
        model.set("name", "Grace");
        scheduler.flush();
        assert_eq!(node.text_content().as_deref(), Some("Ada"));
    }

    #[test]
    fn attribute_binding_writes_attribute() {
        let scheduler = Scheduler::new();
        let model = Object::from_pairs([("kind", "primary")]);
        let node = Node::element("button");
        bind_node(
            &node,
            "class",
            live(&scheduler, &model, "kind"),
            &BindingConfig::default(),
        );
        assert_eq!(node.attribute("class").as_deref(), Some("primary"));
        model.set("kind", Value::Undefined);
        scheduler.flush();
        assert_eq!(node.attribute("class").as_deref(), Some(""));
    }

    #[test]
    fn property_binding_keeps_raw_value() {
        let scheduler = Scheduler::new();
        let model = Object::from_pairs([("checked", true)]);
        let node = Node::element("input");
        bind_node(
            &node,
            "checked",
            live(&scheduler, &model, "checked"),
            &BindingConfig::default(),
        );
        assert_eq!(node.property("checked"), Value::from(true));
        assert!(!node.has_attribute("checked"));
    }

    #[test]
    fn one_time_binding_applies_once_and_returns_nothing() {
        let node = Node::element("div");
        let bound = bind_node(
            &node,
            "style",
            BindingValue::OneTime(Value::Null),
            &BindingConfig::default(),
        );
        assert!(bound.is_none());
        assert_eq!(node.attribute("style").as_deref(), Some(""));
    }
}
