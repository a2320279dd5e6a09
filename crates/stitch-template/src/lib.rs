#![forbid(unsafe_code)]

//! Template directives, instance factory, and list reconciliation.
//!
//! A template's content is parsed once into a [`DirectiveNode`] tree.
//! [`Engine::create_instance`] clones that content against a model value,
//! wiring mustache bindings through [`bind_node`]. A template carrying
//! `if`, `bind`, or `repeat` is a region: [`Engine::bind_region`] returns a
//! [`RegionIterator`] that keeps one instance per iterated value rendered
//! after the template, reusing instances by model identity when the bound
//! array is spliced.
//!
//! ```text
//! model ──PathObserver──► RegionIterator ──splices──► instances after <template>
//!                              │
//!                              └── create_instance ──► bind_node per property
//! ```
//!
//! Delivery is batched: nothing updates until the engine's
//! [`Scheduler`](stitch_observe::Scheduler) is flushed.

pub mod config;
pub mod directive;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod instance;
pub mod iterator;
pub mod mustache;
pub mod registry;

pub use config::BindingConfig;
pub use directive::{
    DirectiveCache, DirectiveNode, EventHandlerSpec, PropertyBinding, RegionDirectives,
};
pub use dispatch::{BindTarget, bind_node};
pub use engine::{Engine, EngineStats};
pub use error::BindError;
pub use instance::{Instance, InstanceBinding, Slot};
pub use iterator::RegionIterator;
pub use mustache::{BindingExpression, BindingValue, Expression};
pub use registry::RegionRegistry;
