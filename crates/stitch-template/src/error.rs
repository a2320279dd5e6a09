#![forbid(unsafe_code)]

//! Engine errors.
//!
//! Only misuse of the entry points is an error. Detached regions,
//! non-array `repeat` values, and double closes are handled as policy and
//! never surface here.

use stitch_dom::NodeKind;
use stitch_observe::PathError;

/// Errors returned by [`Engine`](crate::Engine) entry points.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BindError {
    /// A region operation was given a node that is not a template.
    #[error("expected a template node, found {0:?}")]
    NotATemplate(NodeKind),

    #[error(transparent)]
    Path(#[from] PathError),
}
