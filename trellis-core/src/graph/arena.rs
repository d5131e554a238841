//! Node Arena
//!
//! All nodes of one runtime live in a slot vector addressed by [`NodeId`].
//! Edges are id pairs stored on both ends: the observer keeps its
//! dependency edges, the observed node keeps its set of dependents. Nothing
//! holds a reference to another node, so disposal is explicit edge removal.

use smallvec::SmallVec;

use super::node::{Edge, Node, NodeId};
use crate::error::ReactiveError;

struct Slot {
    generation: u32,
    node: Option<Node>,
}

/// Slot arena holding every live node of a runtime.
#[derive(Default)]
pub(crate) struct Graph {
    slots: Vec<Slot>,
    free: Vec<u32>,
    live: usize,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node to the arena, reusing a free slot when one exists.
    pub fn insert(&mut self, node: Node) -> NodeId {
        self.live += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.node = Some(node);
            return NodeId::from_parts(index, slot.generation);
        }
        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            node: Some(node),
        });
        NodeId::from_parts(index, 0)
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.slots
            .get(id.index())
            .filter(|slot| slot.generation == id.generation())
            .and_then(|slot| slot.node.as_ref())
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.slots
            .get_mut(id.index())
            .filter(|slot| slot.generation == id.generation())
            .and_then(|slot| slot.node.as_mut())
    }

    pub fn node(&self, id: NodeId) -> Result<&Node, ReactiveError> {
        self.get(id).ok_or(ReactiveError::Disposed { node: id })
    }

    pub fn node_mut(&mut self, id: NodeId) -> Result<&mut Node, ReactiveError> {
        self.get_mut(id).ok_or(ReactiveError::Disposed { node: id })
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.get(id).is_some()
    }

    /// Remove a node and every edge touching it.
    ///
    /// The removed node is handed back so the caller can drop its payload
    /// (user closures, captured handles) outside of any graph borrow.
    pub fn remove(&mut self, id: NodeId) -> Option<Node> {
        let slot = self
            .slots
            .get_mut(id.index())
            .filter(|slot| slot.generation == id.generation())?;
        let node = slot.node.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index() as u32);
        self.live -= 1;

        for edge in &node.dependencies {
            if let Some(source) = self.get_mut(edge.source) {
                source.dependents.shift_remove(&id);
            }
        }
        for dependent in &node.dependents {
            if let Some(observer) = self.get_mut(*dependent) {
                observer.dependencies.retain(|e| e.source != id);
            }
        }
        Some(node)
    }

    /// Register `observer` as a dependent of `source`.
    pub fn link(&mut self, source: NodeId, observer: NodeId) {
        if let Some(node) = self.get_mut(source) {
            node.dependents.insert(observer);
        }
    }

    pub fn unlink(&mut self, source: NodeId, observer: NodeId) {
        if let Some(node) = self.get_mut(source) {
            node.dependents.shift_remove(&observer);
        }
        if let Some(node) = self.get_mut(observer) {
            node.dependencies.retain(|e| e.source != source);
        }
    }

    /// Install the dependency set of a finished evaluation, dropping every
    /// old edge that was not read again.
    pub fn replace_dependencies(&mut self, observer: NodeId, edges: SmallVec<[Edge; 4]>) {
        let Some(node) = self.get_mut(observer) else {
            return;
        };
        let old = std::mem::replace(&mut node.dependencies, edges.clone());
        for stale in old
            .iter()
            .filter(|old| !edges.iter().any(|e| e.source == old.source))
        {
            if let Some(source) = self.get_mut(stale.source) {
                source.dependents.shift_remove(&observer);
            }
        }
        // Sources disposed while the evaluation ran cannot be depended upon.
        let live: SmallVec<[Edge; 4]> = edges
            .into_iter()
            .filter(|e| self.contains(e.source))
            .collect();
        if let Some(node) = self.get_mut(observer) {
            node.dependencies = live;
        }
    }

    pub fn ids(&self) -> Vec<NodeId> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.node.is_some())
            .map(|(index, slot)| NodeId::from_parts(index as u32, slot.generation))
            .collect()
    }

    /// Get the total number of live nodes.
    pub fn node_count(&self) -> usize {
        self.live
    }
}
