#![forbid(unsafe_code)]

//! Bind the region templates of an existing tree.

use std::rc::Rc;

use stitch_dom::{Node, NodeKind};
use stitch_observe::Value;
use stitch_template::{BindError, Engine, RegionDirectives, RegionIterator};

/// Bind every template under `root` (inclusive) that declares a region, in
/// document order, against `model`.
///
/// Templates are collected before any region renders, so content produced
/// by one region is not revisited. Templates that already have an open
/// iterator are left alone. The returned handles own the regions.
pub fn bind_tree(
    engine: &Engine,
    root: &Node,
    model: &Value,
) -> Result<Vec<Rc<RegionIterator>>, BindError> {
    let templates: Vec<Node> = root
        .descendants()
        .into_iter()
        .filter(|node| node.kind() == NodeKind::Template)
        .filter(|node| !RegionDirectives::from_template(node, engine.config()).is_empty())
        .collect();

    let mut regions = Vec::with_capacity(templates.len());
    for template in &templates {
        if engine.region_of(template).is_some() {
            tracing::trace!("template already bound, skipping");
            continue;
        }
        if let Some(region) = engine.bind_region(template, model)? {
            regions.push(region);
        }
    }
    tracing::debug!(
        templates = templates.len(),
        bound = regions.len(),
        "bound region templates"
    );
    Ok(regions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use stitch_observe::{Array, Object, Scheduler};
    use tracing_test::traced_test;

    #[test]
    #[traced_test]
    fn binds_each_region_once() {
        let engine = Engine::new(&Scheduler::new());
        let names = Node::template()
            .with_attribute("repeat", "{{ names }}")
            .with_child(Node::text("{{}} "));
        let plain = Node::template().with_child(Node::text("static"));
        let root = Node::element("main")
            .with_child(names.clone())
            .with_child(Node::element("section").with_child(plain));
        let model = Object::from_pairs([("names", Array::from_values(["a", "b"]))]);
        let model = Value::from(model);

        let regions = bind_tree(&engine, &root, &model).unwrap();
        assert_eq!(regions.len(), 1);
        assert_eq!(
            root.inner_markup(),
            "<template repeat=\"{{ names }}\"></template>a b <section><template></template></section>"
        );

        let again = bind_tree(&engine, &root, &model).unwrap();
        assert!(again.is_empty());
        assert!(logs_contain("bound region templates"));
    }

    #[test]
    fn root_template_is_included() {
        let engine = Engine::new(&Scheduler::new());
        let template = Node::template()
            .with_attribute("bind", "{{ user }}")
            .with_child(Node::text("{{ name }}"));
        let parent = Node::element("div").with_child(template.clone());
        let model = Object::from_pairs([("user", Object::from_pairs([("name", "Ada")]))]);

        let regions = bind_tree(&engine, &template, &model.into()).unwrap();
        assert_eq!(regions.len(), 1);
        assert!(parent.inner_markup().ends_with("Ada"));
    }
}
