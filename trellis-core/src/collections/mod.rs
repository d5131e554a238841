//! Observable collections.
//!
//! Collections are observable leaves whose mutations describe themselves.
//! Each effective mutation bumps the collection's version like any write
//! and also hands a typed delta to the change handlers of direct
//! dependents, so an observer can apply changes incrementally instead of
//! diffing snapshots.
//!
//! Contents are stored behind an `Rc` and mutated in place; the data is
//! copied only while a reader still holds an older snapshot.

mod map;
mod set;

use std::any::Any;
use std::rc::Rc;

use crate::graph::EqualsFn;

pub use map::{MapDelta, ObservableMap};
pub use set::{ObservableSet, SetDelta};

/// Collections bypass value comparison; their mutators know exactly
/// whether anything changed.
fn never_equal() -> EqualsFn {
    Rc::new(|_: &dyn Any, _: &dyn Any| false)
}
