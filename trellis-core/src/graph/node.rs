//! Graph Nodes
//!
//! This module defines the node types that live in the dependency graph.
//! Every node shares the same bookkeeping (version, state, edges); what
//! differs per kind lives in a [`Payload`] variant.

use std::any::Any;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexSet;
use serde::Serialize;
use smallvec::SmallVec;

use crate::error::ReactiveError;
use crate::reactive::{ChangeContext, DisposableStore, Reader};

/// Type-erased node value. Values are immutable once stored; a write
/// replaces the whole `Rc`.
pub(crate) type AnyValue = Rc<dyn Any>;

pub(crate) type EqualsFn = Rc<dyn Fn(&dyn Any, &dyn Any) -> bool>;

pub(crate) type ComputeFn = Rc<dyn Fn(&Reader) -> Result<AnyValue, ReactiveError>>;

pub(crate) type EffectFn = Box<dyn FnMut(&Reader, &DisposableStore) -> Result<(), ReactiveError>>;

/// Decides whether a direct upstream change should invalidate the observer.
pub(crate) type ChangeHandler = Rc<dyn Fn(&ChangeContext<'_>) -> bool>;

/// Stable handle to a node in the arena.
///
/// The generation distinguishes a live node from an earlier, disposed
/// occupant of the same slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct NodeId {
    index: u32,
    generation: u32,
}

impl NodeId {
    pub(crate) fn from_parts(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    pub(crate) fn index(&self) -> usize {
        self.index as usize
    }

    pub(crate) fn generation(&self) -> u32 {
        self.generation
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.generation == 0 {
            write!(f, "#{}", self.index)
        } else {
            write!(f, "#{}v{}", self.index, self.generation)
        }
    }
}

/// The kind of node in the dependency graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    /// A settable leaf. Only dependents, never dependencies.
    Source,

    /// A lazily recomputed value. Both observer and observable.
    Derived,

    /// A terminal observer running a side effect.
    Reaction,
}

/// Evaluation state of an observer.
///
/// Sources are always `Clean`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObserverState {
    /// Never evaluated.
    Uninitialized,

    /// The cached result is up to date.
    Clean,

    /// An upstream node reported a change that has not been validated yet.
    PossiblyStale,

    /// The compute or effect function is on the stack right now.
    Recomputing,

    /// The last evaluation failed; the error is cached.
    Errored,
}

/// Dependency edge, stamped with the source version as last observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Edge {
    pub source: NodeId,
    pub version: u64,
}

/// Kind-specific node data.
pub(crate) enum Payload {
    Source {
        value: AnyValue,
        equals: EqualsFn,
        lazy: bool,
    },
    Derived {
        compute: ComputeFn,
        equals: EqualsFn,
        cached: Option<Result<AnyValue, ReactiveError>>,
    },
    Reaction {
        effect: Option<EffectFn>,
        store: Option<DisposableStore>,
        runs: usize,
    },
}

/// A node in the dependency graph.
pub(crate) struct Node {
    pub name: Option<Rc<str>>,
    pub version: u64,
    pub state: ObserverState,

    /// Upstream change notifications received since the last clean evaluation.
    pub stale_count: u32,

    /// A change handler accepted a change since the node last settled.
    pub change_accepted: bool,

    /// Nodes this node read during its last evaluation.
    pub dependencies: SmallVec<[Edge; 4]>,

    /// Nodes that read this node. Insertion-ordered so propagation is
    /// deterministic.
    pub dependents: IndexSet<NodeId>,

    pub change_handler: Option<ChangeHandler>,
    pub payload: Payload,
}

impl Node {
    pub fn source(value: AnyValue, equals: EqualsFn, lazy: bool) -> Self {
        Self::new(
            ObserverState::Clean,
            Payload::Source {
                value,
                equals,
                lazy,
            },
        )
    }

    pub fn derived(compute: ComputeFn, equals: EqualsFn) -> Self {
        Self::new(
            ObserverState::Uninitialized,
            Payload::Derived {
                compute,
                equals,
                cached: None,
            },
        )
    }

    pub fn reaction(effect: EffectFn) -> Self {
        Self::new(
            ObserverState::Uninitialized,
            Payload::Reaction {
                effect: Some(effect),
                store: None,
                runs: 0,
            },
        )
    }

    fn new(state: ObserverState, payload: Payload) -> Self {
        Self {
            name: None,
            version: 0,
            state,
            stale_count: 0,
            change_accepted: false,
            dependencies: SmallVec::new(),
            dependents: IndexSet::new(),
            change_handler: None,
            payload,
        }
    }

    pub fn with_name(mut self, name: Option<Rc<str>>) -> Self {
        self.name = name;
        self
    }

    pub fn with_change_handler(mut self, handler: Option<ChangeHandler>) -> Self {
        self.change_handler = handler;
        self
    }

    pub fn kind(&self) -> NodeKind {
        match self.payload {
            Payload::Source { .. } => NodeKind::Source,
            Payload::Derived { .. } => NodeKind::Derived,
            Payload::Reaction { .. } => NodeKind::Reaction,
        }
    }

    /// Current value as seen by a reader.
    ///
    /// `None` for reactions and for derived nodes that never ran.
    pub fn current(&self) -> Option<Result<AnyValue, ReactiveError>> {
        match &self.payload {
            Payload::Source { value, .. } => Some(Ok(Rc::clone(value))),
            Payload::Derived { cached, .. } => cached.clone(),
            Payload::Reaction { .. } => None,
        }
    }

    /// State to settle in once validation finds nothing changed.
    pub fn settled_state(&self) -> ObserverState {
        match &self.payload {
            Payload::Derived {
                cached: Some(Err(_)),
                ..
            } => ObserverState::Errored,
            _ => ObserverState::Clean,
        }
    }

    pub fn mark_settled(&mut self) {
        self.state = self.settled_state();
        self.stale_count = 0;
        self.change_accepted = false;
    }

    /// Record a change notification. Returns true if this is the first one
    /// since the node was last settled, i.e. the caller must propagate.
    pub fn mark_possibly_stale(&mut self) -> bool {
        self.stale_count += 1;
        match self.state {
            ObserverState::Clean | ObserverState::Errored => {
                self.state = ObserverState::PossiblyStale;
                true
            }
            _ => false,
        }
    }

    pub fn is_lazy_without_dependents(&self) -> bool {
        matches!(self.payload, Payload::Source { lazy: true, .. }) && self.dependents.is_empty()
    }

    pub fn stamp_dependency(&mut self, source: NodeId, version: u64) {
        if let Some(edge) = self.dependencies.iter_mut().find(|e| e.source == source) {
            edge.version = version;
        }
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("kind", &self.kind())
            .field("name", &self.name)
            .field("version", &self.version)
            .field("state", &self.state)
            .field("dependencies", &self.dependencies.len())
            .field("dependents", &self.dependents.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int_source(v: i32) -> Node {
        Node::source(Rc::new(v), Rc::new(|_: &dyn Any, _: &dyn Any| false), false)
    }

    fn const_derived() -> Node {
        Node::derived(
            Rc::new(|_: &Reader| Ok::<AnyValue, ReactiveError>(Rc::new(1))),
            Rc::new(|_: &dyn Any, _: &dyn Any| false),
        )
    }

    #[test]
    fn source_node_starts_clean() {
        let node = int_source(1);
        assert_eq!(node.kind(), NodeKind::Source);
        assert_eq!(node.state, ObserverState::Clean);
        let value = node.current().unwrap().unwrap();
        assert_eq!(value.downcast_ref::<i32>(), Some(&1));
    }

    #[test]
    fn derived_node_starts_uninitialized() {
        let node = const_derived();
        assert_eq!(node.kind(), NodeKind::Derived);
        assert_eq!(node.state, ObserverState::Uninitialized);
        assert!(node.current().is_none());
    }

    #[test]
    fn possibly_stale_only_propagates_once() {
        let mut node = const_derived();
        node.state = ObserverState::Clean;

        assert!(node.mark_possibly_stale());
        assert!(!node.mark_possibly_stale());
        assert_eq!(node.stale_count, 2);
        assert_eq!(node.state, ObserverState::PossiblyStale);

        node.mark_settled();
        assert_eq!(node.state, ObserverState::Clean);
        assert_eq!(node.stale_count, 0);
    }

    #[test]
    fn errored_node_settles_back_to_errored() {
        let mut node = const_derived();
        if let Payload::Derived { cached, .. } = &mut node.payload {
            *cached = Some(Err(ReactiveError::compute("boom")));
        }
        node.state = ObserverState::Errored;
        assert!(node.mark_possibly_stale());
        node.mark_settled();
        assert_eq!(node.state, ObserverState::Errored);
    }

    #[test]
    fn uninitialized_node_does_not_propagate() {
        let mut node = const_derived();
        assert!(!node.mark_possibly_stale());
        assert_eq!(node.state, ObserverState::Uninitialized);
    }

    #[test]
    fn node_id_display() {
        assert_eq!(NodeId::from_parts(4, 0).to_string(), "#4");
        assert_eq!(NodeId::from_parts(4, 2).to_string(), "#4v2");
    }
}
