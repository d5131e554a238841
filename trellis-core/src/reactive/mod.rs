//! Reactive Primitives
//!
//! This module implements the core reactive system: observables, derived
//! values and reactions, tied together by a [`Runtime`].
//!
//! # Concepts
//!
//! ## Observables
//!
//! An [`Observable`] is a container for mutable state. When it is read
//! through a [`Reader`], the running evaluation is registered as a
//! dependent. When its value changes, all dependents are invalidated.
//!
//! ## Derived values
//!
//! A [`Derived`] value caches the result of a computation over other nodes.
//! It is computed on first read and re-evaluated only when a dependency
//! really changed.
//!
//! ## Reactions
//!
//! A [`Reaction`] is a side effect that runs whenever its dependencies
//! change, once per transaction. Reactions synchronize reactive state with
//! the outside world.
//!
//! # Implementation Notes
//!
//! Dependency tracking is explicit: compute and effect functions receive a
//! `&Reader` and every read through it becomes an edge. Reads through
//! `get()` are untracked. Invalidation is pushed eagerly but cheaply;
//! recomputation is pulled lazily, in dependency order, on demand.

mod autorun;
mod change;
mod context;
mod derived;
pub mod equality;
mod observable;
mod options;
mod runtime;
mod store;
mod transaction;

pub use autorun::{
    autorun, autorun_delta, autorun_handle_changes, autorun_iterable_delta, autorun_named,
    autorun_with_store, ItemDelta, Reaction,
};
pub use change::{collect_hints, ChangeContext};
pub use context::{Readable, Reader};
pub use derived::Derived;
pub use observable::Observable;
pub use options::Options;
pub use runtime::{NodeInfo, Runtime};
pub use store::{Disposable, DisposableStore};
pub use transaction::Transaction;
