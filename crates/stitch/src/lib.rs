#![forbid(unsafe_code)]

//! Stitch: reactive template binding over a retained node tree.
//!
//! This crate re-exports the workspace crates and adds [`bind_tree`], which
//! binds every region template already present in a tree.
//!
//! ```
//! use stitch::prelude::*;
//!
//! let scheduler = Scheduler::new();
//! let engine = Engine::new(&scheduler);
//!
//! let template = Node::template()
//!     .with_attribute("repeat", "{{ todos }}")
//!     .with_child(Node::element("li").with_child(Node::text("{{ title }}")));
//! let list = Node::element("ul").with_child(template.clone());
//!
//! let todos = Array::from_values([Object::from_pairs([("title", "write")])]);
//! let model = Object::from_pairs([("todos", todos.clone())]);
//! let _regions = stitch::bind_tree(&engine, &list, &model.into()).unwrap();
//!
//! todos.push(Object::from_pairs([("title", "ship")]));
//! scheduler.flush();
//! assert!(list.inner_markup().ends_with("<li>write</li><li>ship</li>"));
//! ```

mod bootstrap;

pub use bootstrap::bind_tree;

pub use stitch_dom as dom;
pub use stitch_observe as observe;
pub use stitch_template as template;

pub mod prelude {
    pub use stitch_dom::{Event, EventHost, Node, NodeKind};
    pub use stitch_observe::{
        Array, Disposable, Object, Observer, Path, PathObserver, Scheduler, SchedulerConfig, Value,
    };
    pub use stitch_template::{
        BindError, BindingConfig, Engine, EngineStats, Instance, RegionIterator, Slot,
    };
}
