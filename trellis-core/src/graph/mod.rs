//! Dependency Graph
//!
//! This module implements the arena that stores every node of a runtime and
//! the edges between them.
//!
//! # Overview
//!
//! The dependency graph is a directed acyclic graph (DAG) where:
//!
//! - Nodes are settable sources, derived values or reactions
//! - Edges point from an observer to each node it read during its last
//!   evaluation, stamped with the version it saw
//!
//! # Design Decisions
//!
//! 1. Nodes live in a slot arena and refer to each other by [`NodeId`]
//!    (index plus generation). There are no `Rc` cycles and no weak
//!    references; disposing a node removes its edges explicitly.
//!
//! 2. Both directions are stored: dependencies on the observer for
//!    validation, dependents on the observed node for invalidation.
//!
//! 3. Edges are rebuilt from scratch on every evaluation, so the graph only
//!    ever contains the dependencies of the latest run.

mod arena;
mod node;
mod scheduler;

pub use node::{NodeId, NodeKind, ObserverState};

pub(crate) use arena::Graph;
pub(crate) use node::{AnyValue, ChangeHandler, ComputeFn, Edge, EffectFn, EqualsFn, Node, Payload};
pub(crate) use scheduler::UpdateScheduler;
