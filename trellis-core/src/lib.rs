//! Trellis Core
//!
//! This crate provides a fine-grained reactive engine: observable values,
//! derived values and reactions wired into a dependency graph that keeps
//! itself consistent.
//!
//! It implements:
//!
//! - Push-pull propagation: writes invalidate cheaply, reads recompute
//!   lazily in dependency order
//! - Glitch freedom: no observer ever sees a mix of old and new values
//! - Transactions that group writes and run each reaction at most once
//! - Equality-based change suppression and dynamic dependency tracking
//! - Observable collections with typed deltas, and bridges from events,
//!   futures and streams
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `graph`: node arena, dependency edges and the update worklist
//! - `reactive`: the runtime and the user-facing primitives
//! - `collections`: observable sets and maps
//! - `bridge`: event, future and stream adapters
//! - `trace`: structured diagnostic records for external tooling
//!
//! # Example
//!
//! ```
//! use trellis_core::{autorun, Derived, Observable, Runtime};
//! use std::cell::RefCell;
//! use std::rc::Rc;
//!
//! let rt = Runtime::new();
//! let count = Observable::new(&rt, 0);
//!
//! let c = count.clone();
//! let is_even = Derived::new(&rt, move |r| Ok(c.read(r)? % 2 == 0));
//!
//! let log = Rc::new(RefCell::new(Vec::new()));
//! let (e, l) = (is_even.clone(), log.clone());
//! let _reaction = autorun(&rt, move |r| {
//!     l.borrow_mut().push(e.read(r)?);
//!     Ok(())
//! });
//!
//! rt.transaction(|| {
//!     count.set(2).unwrap();
//!     count.set(4).unwrap();
//! })
//! .unwrap();
//!
//! // `is_even` stayed true, so the reaction did not run again.
//! assert_eq!(*log.borrow(), vec![true]);
//! ```

pub mod bridge;
pub mod collections;
pub mod config;
pub mod error;
pub mod graph;
pub mod reactive;
pub mod trace;

pub use config::RuntimeConfig;
pub use error::{ComputeError, ReactiveError};
pub use graph::{NodeId, NodeKind, ObserverState};
pub use reactive::equality;
pub use reactive::{
    autorun, autorun_delta, autorun_handle_changes, autorun_iterable_delta, autorun_named,
    autorun_with_store, ChangeContext, Derived, Disposable, DisposableStore, NodeInfo,
    Observable, Options, Reaction, Readable, Reader, Runtime, Transaction,
};

/// Create an observable compared with `PartialEq`.
pub fn observable<T: Clone + PartialEq + 'static>(runtime: &Runtime, value: T) -> Observable<T> {
    Observable::new(runtime, value)
}

/// Create a lazily computed derived value.
pub fn derived<T, F>(runtime: &Runtime, compute: F) -> Derived<T>
where
    T: Clone + PartialEq + 'static,
    F: Fn(&Reader) -> Result<T, ReactiveError> + 'static,
{
    Derived::new(runtime, compute)
}
