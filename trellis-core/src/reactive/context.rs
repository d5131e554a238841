//! Reactive Context
//!
//! A [`Reader`] is the evaluation context handed to every compute and effect
//! function. Reading a node through it records a dependency edge; reading a
//! node any other way does not.
//!
//! # Implementation
//!
//! There is no ambient "current observer". The reader is created by the
//! runtime right before an evaluation and consumed right after it, and user
//! code only ever sees it as `&Reader`. A reader therefore cannot be kept
//! past the evaluation it belongs to.
//!
//! Each read is linked into the graph immediately, so a node that reads
//! itself (directly or through a chain) is seen in the `Recomputing` state
//! and the read fails with a cycle error.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use smallvec::SmallVec;

use super::runtime::Runtime;
use crate::error::ReactiveError;
use crate::graph::{AnyValue, Edge, NodeId};

/// Anything a [`Reader`] can read: observables, derived values, collections
/// and bridges.
pub trait Readable {
    type Value: Clone + 'static;

    fn node_id(&self) -> NodeId;
}

/// Dependency-tracking context of one running evaluation.
pub struct Reader {
    runtime: Runtime,
    observer: NodeId,
    reads: RefCell<SmallVec<[Edge; 4]>>,
}

impl Reader {
    pub(crate) fn new(runtime: Runtime, observer: NodeId) -> Self {
        Self {
            runtime,
            observer,
            reads: RefCell::new(SmallVec::new()),
        }
    }

    /// The node being evaluated.
    pub fn observer(&self) -> NodeId {
        self.observer
    }

    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    /// Read `source` and record it as a dependency of the running evaluation.
    ///
    /// Derived sources are brought up to date first. A derived source whose
    /// last computation failed yields its cached error, and the dependency
    /// is still recorded.
    pub fn read<R: Readable + ?Sized>(&self, source: &R) -> Result<R::Value, ReactiveError> {
        let id = source.node_id();
        let value = self.read_any(id)?;
        value
            .downcast_ref::<R::Value>()
            .cloned()
            .ok_or(ReactiveError::TypeMismatch { node: id })
    }

    /// Like [`read`](Self::read) but hands out the shared snapshot instead of
    /// a clone. Used for large values such as collections.
    pub fn read_rc<T: 'static>(&self, source: NodeId) -> Result<Rc<T>, ReactiveError> {
        self.read_any(source)?
            .downcast::<T>()
            .map_err(|_| ReactiveError::TypeMismatch { node: source })
    }

    pub(crate) fn read_any(&self, source: NodeId) -> Result<AnyValue, ReactiveError> {
        let (value, version) = self.runtime.read_tracked(self.observer, source)?;
        let mut reads = self.reads.borrow_mut();
        match reads.iter_mut().find(|e| e.source == source) {
            Some(edge) => edge.version = version,
            None => reads.push(Edge { source, version }),
        }
        value
    }

    /// Number of distinct nodes read so far.
    pub fn dependency_count(&self) -> usize {
        self.reads.borrow().len()
    }

    pub(crate) fn finish(self) -> SmallVec<[Edge; 4]> {
        self.reads.into_inner()
    }
}

impl fmt::Debug for Reader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reader")
            .field("observer", &self.observer)
            .field("reads", &self.reads.borrow().len())
            .finish()
    }
}
