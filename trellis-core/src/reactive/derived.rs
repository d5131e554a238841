//! Derived Value Implementation
//!
//! A derived value is a cached computation over other nodes. It is both an
//! observer (of what it reads) and observable (by what reads it).
//!
//! # How Derived Values Work
//!
//! 1. Nothing is computed at construction. The first read runs the compute
//!    function and caches the result (value or error).
//!
//! 2. A change upstream marks the node possibly stale. No work is done.
//!
//! 3. The next read validates: each dependency is brought up to date and
//!    its version compared with the one seen last time. Only if one differs
//!    does the function run again.
//!
//! 4. If the new result equals the cached one, the version stays put and
//!    observers further down skip their own recomputation.
//!
//! # Dynamic Dependencies
//!
//! Dependencies are whatever the last run read. A branch not taken in the
//! last run is not a dependency, so writes to it do not invalidate the node.

use std::cell::RefCell;
use std::fmt;
use std::marker::PhantomData;
use std::rc::Rc;

use super::change::ChangeContext;
use super::context::{Readable, Reader};
use super::observable::downcast;
use super::options::Options;
use super::runtime::{erase_equals, Runtime};
use crate::error::ReactiveError;
use crate::graph::{AnyValue, ChangeHandler, ComputeFn, Node, NodeId, ObserverState};

/// A lazily computed, cached value of type `T`.
///
/// # Example
///
/// ```
/// use trellis_core::{Derived, Observable, Runtime};
///
/// let rt = Runtime::new();
/// let count = Observable::new(&rt, 2);
/// let c = count.clone();
/// let doubled = Derived::new(&rt, move |r| Ok(c.read(r)? * 2));
/// assert_eq!(doubled.get(), Ok(4));
/// ```
pub struct Derived<T> {
    runtime: Runtime,
    id: NodeId,
    marker: PhantomData<fn() -> T>,
}

impl<T: Clone + PartialEq + 'static> Derived<T> {
    pub fn new<F>(runtime: &Runtime, compute: F) -> Self
    where
        F: Fn(&Reader) -> Result<T, ReactiveError> + 'static,
    {
        Self::with_options(runtime, Options::default(), compute)
    }

    /// A derived value whose observer sees each upstream change first.
    ///
    /// `handle_change` folds every direct upstream change into a summary
    /// and returns whether it matters. Declined changes do not trigger a
    /// recomputation. `compute` receives the summary collected since the
    /// previous run; a fresh one from `create_summary` starts collecting.
    pub fn with_changes<S, C, H, F>(
        runtime: &Runtime,
        create_summary: C,
        handle_change: H,
        compute: F,
    ) -> Self
    where
        S: 'static,
        C: Fn() -> S + 'static,
        H: Fn(&ChangeContext<'_>, &mut S) -> bool + 'static,
        F: Fn(&Reader, S) -> Result<T, ReactiveError> + 'static,
    {
        let summary = Rc::new(RefCell::new(create_summary()));
        let handler_summary = Rc::clone(&summary);
        let handler: ChangeHandler = Rc::new(move |ctx: &ChangeContext<'_>| {
            handle_change(ctx, &mut *handler_summary.borrow_mut())
        });
        let options: Options<T> = Options::default();
        let node = Node::derived(
            Rc::new(move |reader: &Reader| {
                let collected = std::mem::replace(&mut *summary.borrow_mut(), create_summary());
                compute(reader, collected).map(|v| Rc::new(v) as AnyValue)
            }),
            erase_equals(options.equals),
        )
        .with_change_handler(Some(handler));
        Self::from_node(runtime, node)
    }
}

impl<T: Clone + 'static> Derived<T> {
    pub fn with_options<F>(runtime: &Runtime, options: Options<T>, compute: F) -> Self
    where
        F: Fn(&Reader) -> Result<T, ReactiveError> + 'static,
    {
        let compute: ComputeFn =
            Rc::new(move |reader: &Reader| compute(reader).map(|v| Rc::new(v) as AnyValue));
        let node = Node::derived(compute, erase_equals(options.equals)).with_name(options.name);
        Self::from_node(runtime, node)
    }

    fn from_node(runtime: &Runtime, node: Node) -> Self {
        Self {
            runtime: runtime.clone(),
            id: runtime.create_node(node),
            marker: PhantomData,
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    /// Get the up-to-date value without recording a dependency.
    ///
    /// Validates the node first, recomputing it only if an input changed.
    /// A failed computation yields its cached error.
    pub fn get(&self) -> Result<T, ReactiveError> {
        let value = self.runtime.read_untracked(self.id)?;
        downcast(self.id, &value)
    }

    /// Get the up-to-date value and record a dependency of the running
    /// evaluation.
    pub fn read(&self, reader: &Reader) -> Result<T, ReactiveError> {
        reader.read(self)
    }

    pub fn dispose(&self) {
        self.runtime.dispose_node(self.id);
    }

    pub fn is_disposed(&self) -> bool {
        !self.runtime.contains(self.id)
    }

    pub fn state(&self) -> Option<ObserverState> {
        self.runtime.with_node(self.id, |n| n.state)
    }

    pub fn version(&self) -> Option<u64> {
        self.runtime.with_node(self.id, |n| n.version)
    }

    /// Get the number of nodes read by the last computation.
    pub fn dependency_count(&self) -> usize {
        self.runtime
            .with_node(self.id, |n| n.dependencies.len())
            .unwrap_or(0)
    }

    pub fn dependent_count(&self) -> usize {
        self.runtime
            .with_node(self.id, |n| n.dependents.len())
            .unwrap_or(0)
    }
}

impl<T> Clone for Derived<T> {
    fn clone(&self) -> Self {
        Self {
            runtime: self.runtime.clone(),
            id: self.id,
            marker: PhantomData,
        }
    }
}

impl<T: Clone + 'static> Readable for Derived<T> {
    type Value = T;

    fn node_id(&self) -> NodeId {
        self.id
    }
}

impl<T> fmt::Debug for Derived<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Derived").field("id", &self.id).finish()
    }
}

// ---- Tests ----
