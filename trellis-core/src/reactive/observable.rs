//! Observable Implementation
//!
//! An observable is a settable leaf of the graph. It holds a value and knows
//! which observers read it; it never depends on anything itself.
//!
//! # How Observables Work
//!
//! 1. When an observable is read through a [`Reader`], the running
//!    evaluation is registered as its dependent.
//!
//! 2. When a write changes the value (as judged by the comparer), the
//!    version is bumped and every dependent is marked possibly stale.
//!
//! 3. Reactions downstream run when the surrounding transaction closes.
//!    A write outside any transaction opens and closes one implicitly.
//!
//! # Memory Layout
//!
//! The handle is a runtime handle plus a node id. The value lives in the
//! runtime's arena behind an `Rc`, so reads hand out clones of the value,
//! never references into the arena.

use std::fmt;
use std::marker::PhantomData;
use std::rc::Rc;

use super::context::{Readable, Reader};
use super::options::Options;
use super::runtime::{erase_equals, Runtime};
use crate::error::ReactiveError;
use crate::graph::{AnyValue, Node, NodeId};

/// A settable reactive value of type `T`.
///
/// Handles are cheap to clone; all clones refer to the same node.
///
/// # Example
///
/// ```
/// use trellis_core::{Observable, Runtime};
///
/// let rt = Runtime::new();
/// let count = Observable::new(&rt, 0);
/// count.set(5).unwrap();
/// assert_eq!(count.get(), Ok(5));
/// ```
pub struct Observable<T> {
    runtime: Runtime,
    id: NodeId,
    marker: PhantomData<fn() -> T>,
}

impl<T: Clone + PartialEq + 'static> Observable<T> {
    /// Create an observable compared with `PartialEq`.
    pub fn new(runtime: &Runtime, value: T) -> Self {
        Self::with_options(runtime, value, Options::default())
    }

    /// Create a lazy observable: writes are not propagated while nothing
    /// depends on it.
    pub fn lazy(runtime: &Runtime, value: T) -> Self {
        Self::with_options(runtime, value, Options::default().lazy())
    }
}

impl<T: Clone + 'static> Observable<T> {
    pub fn with_options(runtime: &Runtime, value: T, options: Options<T>) -> Self {
        let node = Node::source(Rc::new(value), erase_equals(options.equals), options.lazy)
            .with_name(options.name);
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

    /// Get the current value without recording a dependency.
    pub fn get(&self) -> Result<T, ReactiveError> {
        let value = self.runtime.read_untracked(self.id)?;
        downcast(self.id, &value)
    }

    /// Get the current value and record a dependency of the running
    /// evaluation.
    pub fn read(&self, reader: &Reader) -> Result<T, ReactiveError> {
        reader.read(self)
    }

    /// Set a new value.
    ///
    /// Nothing happens if the comparer judges it equal to the current one.
    pub fn set(&self, value: T) -> Result<(), ReactiveError> {
        self.runtime.write(self.id, Rc::new(value), Vec::new())?;
        Ok(())
    }

    /// Set a new value and hand `hint` to the change handlers of direct
    /// dependents. See [`ChangeContext::hint`](super::ChangeContext::hint).
    pub fn set_with_hint<H: 'static>(&self, value: T, hint: H) -> Result<(), ReactiveError> {
        let hint: AnyValue = Rc::new(hint);
        self.runtime.write(self.id, Rc::new(value), vec![hint])?;
        Ok(())
    }

    /// Update the value using a function of the current one.
    pub fn update<F>(&self, f: F) -> Result<(), ReactiveError>
    where
        F: FnOnce(&T) -> T,
    {
        let current = self.get()?;
        self.set(f(&current))
    }

    /// Remove the observable from the graph. Dependents keep their cached
    /// results; later reads through this handle fail with `Disposed`.
    pub fn dispose(&self) {
        self.runtime.dispose_node(self.id);
    }

    pub fn is_disposed(&self) -> bool {
        !self.runtime.contains(self.id)
    }

    pub fn version(&self) -> Option<u64> {
        self.runtime.with_node(self.id, |n| n.version)
    }

    /// Get the number of observers currently depending on this observable.
    pub fn dependent_count(&self) -> usize {
        self.runtime
            .with_node(self.id, |n| n.dependents.len())
            .unwrap_or(0)
    }
}

impl<T> Clone for Observable<T> {
    fn clone(&self) -> Self {
        Self {
            runtime: self.runtime.clone(),
            id: self.id,
            marker: PhantomData,
        }
    }
}

impl<T: Clone + 'static> Readable for Observable<T> {
    type Value = T;

    fn node_id(&self) -> NodeId {
        self.id
    }
}

impl<T> fmt::Debug for Observable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observable").field("id", &self.id).finish()
    }
}

pub(crate) fn downcast<T: Clone + 'static>(
    id: NodeId,
    value: &AnyValue,
) -> Result<T, ReactiveError> {
    value
        .downcast_ref::<T>()
        .cloned()
        .ok_or(ReactiveError::TypeMismatch { node: id })
}

// ---- Tests ----
