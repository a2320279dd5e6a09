use std::cell::RefCell;
use std::rc::Rc;

use stitch_dom::{Event, EventHost, Node};
use stitch_observe::{Array, Object, Scheduler, Value};
use stitch_template::{Engine, RegionIterator};

fn item(name: &str) -> Value {
    Object::from_pairs([("name", name)]).into()
}

/// `<div><template repeat="{{ items }}"><li>{{ name }}</li></template></div>`
fn list() -> (Node, Node) {
    let template = Node::template()
        .with_attribute("repeat", "{{ items }}")
        .with_child(Node::element("li").with_child(Node::text("{{ name }}")));
    let parent = Node::element("div").with_child(template.clone());
    (parent, template)
}

fn bind(engine: &Engine, template: &Node, model: &Object) -> Rc<RegionIterator> {
    engine
        .bind_region(template, &model.clone().into())
        .unwrap()
        .unwrap()
}

const LIST_MARKER: &str = "<template repeat=\"{{ items }}\"></template>";

#[test]
fn repeat_renders_one_instance_per_item_after_the_template() {
    let engine = Engine::new(&Scheduler::new());
    let (parent, template) = list();
    let items = Array::from_values([item("A"), item("B")]);
    let model = Object::from_pairs([("items", items)]);

    let region = bind(&engine, &template, &model);
    assert_eq!(
        parent.inner_markup(),
        format!("{LIST_MARKER}<li>A</li><li>B</li>")
    );
    assert_eq!(region.instance_count(), 2);
    assert!(region.is_observing_collection());
    assert_eq!(engine.region_of(&template).map(|r| Rc::ptr_eq(&r, &region)), Some(true));
}

#[test]
fn rotation_moves_instances_without_creating_any() {
    let engine = Engine::new(&Scheduler::new());
    let (parent, template) = list();
    let items = Array::from_values([item("A"), item("B"), item("C")]);
    let model = Object::from_pairs([("items", items.clone())]);
    let _region = bind(&engine, &template, &model);

    let c_node = parent.children()[3].clone();
    let before = engine.stats();
    assert_eq!(before.instances_created, 3);

    items.rotate_right(1);
    engine.flush();

    assert_eq!(
        parent.inner_markup(),
        format!("{LIST_MARKER}<li>C</li><li>A</li><li>B</li>")
    );
    let after = engine.stats();
    assert_eq!(after.instances_created, before.instances_created);
    assert_eq!(after.instances_closed, 0);
    assert!(after.instances_reused >= 1);
    assert!(parent.children()[1].ptr_eq(&c_node));
}

#[test]
fn item_mutation_updates_in_place() {
    let engine = Engine::new(&Scheduler::new());
    let (parent, template) = list();
    let first = Object::from_pairs([("name", "A")]);
    let items = Array::from_values([Value::from(first.clone()), item("B")]);
    let model = Object::from_pairs([("items", items)]);
    let _region = bind(&engine, &template, &model);

    first.set("name", "Z");
    engine.flush();
    assert_eq!(
        parent.inner_markup(),
        format!("{LIST_MARKER}<li>Z</li><li>B</li>")
    );
    assert_eq!(engine.stats().instances_created, 2);
}

#[test]
fn undefined_items_hold_empty_slots() {
    let engine = Engine::new(&Scheduler::new());
    let template = Node::template()
        .with_attribute("repeat", "{{ items }}")
        .with_child(Node::element("b").with_child(Node::text("{{}}")));
    let parent = Node::element("div").with_child(template.clone());
    let items = Array::from_values([Value::from("x"), Value::Undefined, Value::from("y")]);
    let model = Object::from_pairs([("items", items.clone())]);

    let region = bind(&engine, &template, &model);
    assert_eq!(region.instance_count(), 3);
    assert_eq!(region.rendered_count(), 2);
    assert_eq!(engine.stats().instances_created, 2);
    let marker = "<template repeat=\"{{ items }}\"></template>";
    assert_eq!(parent.inner_markup(), format!("{marker}<b>x</b><b>y</b>"));

    items.set(1, "m");
    engine.flush();
    assert_eq!(
        parent.inner_markup(),
        format!("{marker}<b>x</b><b>m</b><b>y</b>")
    );
    assert_eq!(region.rendered_count(), 3);
}

#[test]
fn removed_instances_are_closed_once() {
    let engine = Engine::new(&Scheduler::new());
    let scheduler = engine.scheduler().clone();
    let (parent, template) = list();
    let items = Array::from_values([item("A"), item("B"), item("C")]);
    let model = Object::from_pairs([("items", items.clone())]);
    let region = bind(&engine, &template, &model);

    let live = scheduler.live_observer_count();
    items.clear();
    engine.flush();

    assert_eq!(parent.inner_markup(), LIST_MARKER);
    assert_eq!(engine.stats().instances_closed, 3);
    assert_eq!(scheduler.live_observer_count(), live - 3);

    region.close();
    region.close();
    assert!(region.is_closed());
    assert_eq!(scheduler.live_observer_count(), 0);
    assert_eq!(engine.stats().instances_closed, 3);
    assert!(engine.region_of(&template).is_none());
}

#[test]
fn close_removes_rendered_content() {
    let engine = Engine::new(&Scheduler::new());
    let (parent, template) = list();
    let items = Array::from_values([item("A"), item("B")]);
    let model = Object::from_pairs([("items", items.clone())]);
    let region = bind(&engine, &template, &model);

    region.close();
    assert_eq!(parent.inner_markup(), LIST_MARKER);
    assert_eq!(engine.stats().instances_closed, 2);

    items.push(item("C"));
    engine.flush();
    assert_eq!(parent.inner_markup(), LIST_MARKER);
}

#[test]
fn appends_in_one_batch_reconcile_once() {
    let engine = Engine::new(&Scheduler::new());
    let (parent, template) = list();
    let items = Array::from_values([item("A")]);
    let model = Object::from_pairs([("items", items.clone())]);
    let _region = bind(&engine, &template, &model);

    let passes = engine.stats().reconcile_passes;
    items.push(item("B"));
    items.push(item("C"));
    items.push(item("D"));
    engine.flush();

    assert_eq!(engine.stats().reconcile_passes, passes + 1);
    assert_eq!(
        parent.inner_markup(),
        format!("{LIST_MARKER}<li>A</li><li>B</li><li>C</li><li>D</li>")
    );
}

#[test]
fn replacing_the_array_switches_collections() {
    let engine = Engine::new(&Scheduler::new());
    let (parent, template) = list();
    let old = Array::from_values([item("A")]);
    let model = Object::from_pairs([("items", old.clone())]);
    let _region = bind(&engine, &template, &model);

    let new = Array::from_values([item("S"), item("B")]);
    model.set("items", new.clone());
    engine.flush();
    assert_eq!(
        parent.inner_markup(),
        format!("{LIST_MARKER}<li>S</li><li>B</li>")
    );

    // Only the new array is watched.
    old.push(item("X"));
    new.push(item("C"));
    engine.flush();
    assert_eq!(
        parent.inner_markup(),
        format!("{LIST_MARKER}<li>S</li><li>B</li><li>C</li>")
    );
}

#[test]
fn non_array_repeat_renders_once() {
    let engine = Engine::new(&Scheduler::new());
    let (parent, template) = list();
    let model = Object::from_pairs([("items", item("solo"))]);
    let region = bind(&engine, &template, &model);
    assert_eq!(parent.inner_markup(), format!("{LIST_MARKER}<li>solo</li>"));
    assert!(!region.is_observing_collection());
}

#[test]
fn bind_renders_the_bound_value_once() {
    let engine = Engine::new(&Scheduler::new());
    let template = Node::template()
        .with_attribute("bind", "{{ user }}")
        .with_child(Node::element("p").with_child(Node::text("{{ name }}")));
    let parent = Node::element("div").with_child(template.clone());
    let model = Object::from_pairs([("user", item("Ada"))]);
    let _region = bind(&engine, &template, &model);
    assert_eq!(
        parent.inner_markup(),
        "<template bind=\"{{ user }}\"></template><p>Ada</p>"
    );

    model.set("user", item("Grace"));
    engine.flush();
    assert_eq!(
        parent.inner_markup(),
        "<template bind=\"{{ user }}\"></template><p>Grace</p>"
    );
}

// ---------------------------------------------------------------------------
// Conditionals
// ---------------------------------------------------------------------------

fn conditional_list() -> (Node, Node) {
    let template = Node::template()
        .with_attribute("if", "{{ show }}")
        .with_attribute("repeat", "{{ items }}")
        .with_child(Node::element("li").with_child(Node::text("{{ name }}")));
    let parent = Node::element("div").with_child(template.clone());
    (parent, template)
}

const CONDITIONAL_MARKER: &str = "<template if=\"{{ show }}\" repeat=\"{{ items }}\"></template>";

#[test]
fn conditional_toggle_within_one_batch_is_invisible() {
    let engine = Engine::new(&Scheduler::new());
    let (parent, template) = conditional_list();
    let items = Array::from_values([item("A")]);
    let model = Object::from_pairs([("show", Value::from(true)), ("items", items.into())]);
    let _region = bind(&engine, &template, &model);
    let rendered = parent.children()[1].clone();

    model.set("show", false);
    model.set("show", true);
    engine.flush();

    assert_eq!(parent.inner_markup(), format!("{CONDITIONAL_MARKER}<li>A</li>"));
    assert!(parent.children()[1].ptr_eq(&rendered));
    assert_eq!(engine.stats().instances_created, 1);
}

#[test]
fn false_conditional_hides_content_and_keeps_tracking_the_value() {
    let engine = Engine::new(&Scheduler::new());
    let (parent, template) = conditional_list();
    let items = Array::from_values([item("A")]);
    let model = Object::from_pairs([("show", Value::from(true)), ("items", items.clone().into())]);
    let region = bind(&engine, &template, &model);

    model.set("show", false);
    engine.flush();
    assert_eq!(parent.inner_markup(), CONDITIONAL_MARKER);
    assert_eq!(region.instance_count(), 0);
    assert!(!region.is_observing_collection());

    items.push(item("B"));
    engine.flush();
    assert_eq!(parent.inner_markup(), CONDITIONAL_MARKER);

    model.set("show", true);
    engine.flush();
    assert_eq!(
        parent.inner_markup(),
        format!("{CONDITIONAL_MARKER}<li>A</li><li>B</li>")
    );
    assert!(region.is_observing_collection());
}

#[test]
fn one_time_false_conditional_renders_nothing_and_observes_nothing() {
    let engine = Engine::new(&Scheduler::new());
    let template = Node::template()
        .with_attribute("if", "[[ show ]]")
        .with_child(Node::text("visible"));
    let parent = Node::element("div").with_child(template.clone());
    let model = Object::from_pairs([("show", false)]);
    let region = bind(&engine, &template, &model);

    assert_eq!(region.instance_count(), 0);
    assert_eq!(engine.scheduler().live_observer_count(), 0);

    model.set("show", true);
    engine.flush();
    assert_eq!(parent.inner_markup(), "<template if=\"[[ show ]]\"></template>");
}

#[test]
fn one_time_repeat_renders_a_snapshot() {
    let engine = Engine::new(&Scheduler::new());
    let template = Node::template()
        .with_attribute("repeat", "[[ items ]]")
        .with_child(Node::text("{{}}"));
    let parent = Node::element("div").with_child(template.clone());
    let items = Array::from_values(["a", "b"]);
    let model = Object::from_pairs([("items", items.clone())]);
    let region = bind(&engine, &template, &model);

    let expected = "<template repeat=\"[[ items ]]\"></template>ab";
    assert_eq!(parent.inner_markup(), expected);
    assert!(!region.is_observing_collection());

    items.push("c");
    model.set("items", Array::from_values(["z"]));
    engine.flush();
    assert_eq!(parent.inner_markup(), expected);
    assert_eq!(region.instance_count(), 2);
    assert!(!region.is_observing_collection());
}

#[test]
fn one_time_true_conditional_keeps_a_live_repeat() {
    let engine = Engine::new(&Scheduler::new());
    let template = Node::template()
        .with_attribute("if", "[[ show ]]")
        .with_attribute("repeat", "{{ items }}")
        .with_child(Node::text("{{}}"));
    let parent = Node::element("div").with_child(template.clone());
    let items = Array::from_values(["a", "b"]);
    let model = Object::from_pairs([("show", Value::from(true)), ("items", items.clone().into())]);
    let region = bind(&engine, &template, &model);

    let marker = "<template if=\"[[ show ]]\" repeat=\"{{ items }}\"></template>";
    assert_eq!(parent.inner_markup(), format!("{marker}ab"));
    assert!(region.is_observing_collection());

    items.push("c");
    engine.flush();
    assert_eq!(parent.inner_markup(), format!("{marker}abc"));

    // The conditional was resolved once; later changes to it are ignored.
    model.set("show", false);
    engine.flush();
    assert_eq!(parent.inner_markup(), format!("{marker}abc"));

    model.set("items", Array::from_values(["z"]));
    engine.flush();
    assert_eq!(parent.inner_markup(), format!("{marker}z"));
    assert!(region.is_observing_collection());
}

#[test]
fn conditional_alone_binds_the_model() {
    let engine = Engine::new(&Scheduler::new());
    let template = Node::template()
        .with_attribute("if", "{{ show }}")
        .with_child(Node::text("{{ label }}"));
    let parent = Node::element("div").with_child(template.clone());
    let model = Object::from_pairs([("show", Value::from(true)), ("label", "on".into())]);
    let _region = bind(&engine, &template, &model);
    assert_eq!(parent.inner_markup(), "<template if=\"{{ show }}\"></template>on");
}

// ---------------------------------------------------------------------------
// Rebinding and teardown
// ---------------------------------------------------------------------------

#[test]
fn rebinding_reuses_the_iterator() {
    let engine = Engine::new(&Scheduler::new());
    let (parent, template) = list();
    let first = Object::from_pairs([("items", Array::from_values([item("A")]))]);
    let second = Object::from_pairs([("items", Array::from_values([item("B"), item("C")]))]);

    let region = bind(&engine, &template, &first);
    let rebound = bind(&engine, &template, &second);
    assert!(Rc::ptr_eq(&region, &rebound));
    assert_eq!(
        parent.inner_markup(),
        format!("{LIST_MARKER}<li>B</li><li>C</li>")
    );

    // The first model is no longer observed.
    first.set("items", Array::from_values([item("X")]));
    engine.flush();
    assert_eq!(
        parent.inner_markup(),
        format!("{LIST_MARKER}<li>B</li><li>C</li>")
    );
}

#[test]
fn removing_region_attributes_closes_the_region() {
    let engine = Engine::new(&Scheduler::new());
    let (parent, template) = list();
    let model = Object::from_pairs([("items", Array::from_values([item("A")]))]);
    let region = bind(&engine, &template, &model);

    template.remove_attribute("repeat");
    let rebound = engine.bind_region(&template, &model.into()).unwrap();
    assert!(rebound.is_none());
    assert!(region.is_closed());
    assert_eq!(parent.inner_markup(), "<template></template>");
    assert_eq!(engine.scheduler().live_observer_count(), 0);
}

#[test]
fn detached_template_closes_its_region_on_next_change() {
    let engine = Engine::new(&Scheduler::new());
    let (parent, template) = list();
    let items = Array::from_values([item("A")]);
    let model = Object::from_pairs([("items", items.clone())]);
    let region = bind(&engine, &template, &model);

    template.detach();
    items.push(item("B"));
    engine.flush();

    assert!(region.is_closed());
    assert_eq!(engine.scheduler().live_observer_count(), 0);
    // Orphaned content is left where it was.
    assert_eq!(parent.inner_markup(), "<li>A</li>");
}

#[test]
fn dropping_the_handle_leaves_static_content() {
    let engine = Engine::new(&Scheduler::new());
    let (parent, template) = list();
    let items = Array::from_values([item("A")]);
    let model = Object::from_pairs([("items", items.clone())]);
    drop(bind(&engine, &template, &model));

    items.push(item("B"));
    engine.flush();
    assert_eq!(parent.inner_markup(), format!("{LIST_MARKER}<li>A</li>"));
    assert!(engine.region_of(&template).is_none());
    assert_eq!(engine.scheduler().live_observer_count(), 0);
}

// ---------------------------------------------------------------------------
// Nesting
// ---------------------------------------------------------------------------

fn group(name: &str, members: &Array) -> Value {
    Object::from_pairs([("name", Value::from(name)), ("members", members.clone().into())]).into()
}

#[test]
fn nested_regions_anchor_on_their_own_content() {
    let engine = Engine::new(&Scheduler::new());
    let nested = Node::template()
        .with_attribute("repeat", "{{ members }}")
        .with_child(Node::element("i").with_child(Node::text("{{}}")));
    let template = Node::template()
        .with_attribute("repeat", "{{ groups }}")
        .with_child(Node::element("h").with_child(Node::text("{{ name }}")))
        .with_child(nested);
    let parent = Node::element("div").with_child(template.clone());

    let empty = Array::new();
    let one = Array::from_values(["x"]);
    let groups = Array::from_values([group("A", &empty), group("B", &one)]);
    let model = Object::from_pairs([("groups", groups.clone())]);
    let _region = bind(&engine, &template, &model);

    let outer = "<template repeat=\"{{ groups }}\"></template>";
    let inner = "<template repeat=\"{{ members }}\"></template>";
    assert_eq!(
        parent.inner_markup(),
        format!("{outer}<h>A</h>{inner}<h>B</h>{inner}<i>x</i>")
    );

    // The empty nested region ends at its own template marker.
    empty.push("y");
    groups.push(group("C", &Array::new()));
    engine.flush();
    assert_eq!(
        parent.inner_markup(),
        format!("{outer}<h>A</h>{inner}<i>y</i><h>B</h>{inner}<i>x</i><h>C</h>{inner}")
    );

    // Removing a group takes its nested content with it.
    groups.remove(0);
    engine.flush();
    assert_eq!(
        parent.inner_markup(),
        format!("{outer}<h>B</h>{inner}<i>x</i><h>C</h>{inner}")
    );
}

#[test]
fn closing_the_outer_region_closes_nested_regions() {
    let engine = Engine::new(&Scheduler::new());
    let nested = Node::template()
        .with_attribute("repeat", "{{ members }}")
        .with_child(Node::text("{{}}"));
    let template = Node::template()
        .with_attribute("repeat", "{{ groups }}")
        .with_child(nested);
    let _parent = Node::element("div").with_child(template.clone());
    let members = Array::from_values(["x", "y"]);
    let model = Object::from_pairs([("groups", Array::from_values([group("A", &members)]))]);

    let region = bind(&engine, &template, &model);
    assert!(engine.scheduler().live_observer_count() > 0);
    region.close();
    assert_eq!(engine.scheduler().live_observer_count(), 0);
    assert!(engine.registry().is_empty());
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Recorder {
    calls: RefCell<Vec<(String, String)>>,
}

impl EventHost for Recorder {
    fn handle_event(&self, method: &str, target: &Node, _event: &Event) -> bool {
        let label = target
            .first_child()
            .and_then(|text| text.text_content())
            .unwrap_or_default();
        self.calls.borrow_mut().push((method.to_owned(), label));
        true
    }
}

#[test]
fn repeated_event_handlers_reach_the_scope_host() {
    let engine = Engine::new(&Scheduler::new());
    let template = Node::template()
        .with_attribute("repeat", "{{ items }}")
        .with_child(
            Node::element("button")
                .with_attribute("on-click", "select")
                .with_child(Node::text("{{ name }}")),
        );
    let root = Node::element("app").with_child(template.clone());
    let host = Rc::new(Recorder::default());
    root.set_host(Some(host.clone()));

    let model = Object::from_pairs([("items", Array::from_values([item("A"), item("B")]))]);
    let _region = bind(&engine, &template, &model);

    let second = root.children()[2].clone();
    assert_eq!(second.dispatch_event(&Event::new("click")), 1);
    assert_eq!(
        *host.calls.borrow(),
        vec![("select".to_owned(), "B".to_owned())]
    );
}
