//! Change summaries.
//!
//! Observers built with a change handler see every direct upstream change
//! before they are invalidated. The handler gets a [`ChangeContext`] naming
//! the changed node and the hint that came with the write (for example a
//! collection delta), folds it into a summary, and decides whether the
//! change matters. Declined changes do not invalidate the observer.

use std::any::Any;
use std::fmt;

use super::context::Readable;
use crate::graph::NodeId;

/// One upstream change, as offered to a change handler.
pub struct ChangeContext<'a> {
    changed: NodeId,
    hint: Option<&'a dyn Any>,
}

impl<'a> ChangeContext<'a> {
    pub(crate) fn new(changed: NodeId, hint: Option<&'a dyn Any>) -> Self {
        Self { changed, hint }
    }

    /// The node that changed.
    pub fn changed(&self) -> NodeId {
        self.changed
    }

    pub fn did_change<R: Readable + ?Sized>(&self, source: &R) -> bool {
        self.changed == source.node_id()
    }

    /// The hint attached to the write, if it has type `H`.
    ///
    /// Plain `set` writes and changes of derived values carry no hint.
    pub fn hint<H: 'static>(&self) -> Option<&'a H> {
        self.hint.and_then(|h| h.downcast_ref::<H>())
    }

    /// The hint, but only if `source` is the node that changed.
    pub fn hint_from<R: Readable + ?Sized, H: 'static>(&self, source: &R) -> Option<&'a H> {
        if self.did_change(source) {
            self.hint()
        } else {
            None
        }
    }
}

impl fmt::Debug for ChangeContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangeContext")
            .field("changed", &self.changed)
            .field("has_hint", &self.hint.is_some())
            .finish()
    }
}

/// Change handler that collects every hint of type `H` from `source`.
///
/// Other changes are accepted without being recorded.
pub fn collect_hints<R, H>(source: &R) -> impl Fn(&ChangeContext<'_>, &mut Vec<H>) -> bool
where
    R: Readable + ?Sized,
    H: Clone + 'static,
{
    let id = source.node_id();
    move |ctx: &ChangeContext<'_>, summary: &mut Vec<H>| {
        if ctx.changed() == id {
            if let Some(hint) = ctx.hint::<H>() {
                summary.push(hint.clone());
            }
        }
        true
    }
}
