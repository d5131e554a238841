//! Error types for the reactive engine.

use std::fmt;
use std::rc::Rc;

use thiserror::Error;

use crate::graph::NodeId;

/// Errors surfaced by the engine.
///
/// Every variant except [`ReactiveError::Compute`] is a programming error
/// detected at the point it happens. `Compute` carries a failure produced by
/// user code and is cached on the node that produced it.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ReactiveError {
    #[error("cycle detected: {} is already being recomputed", display_node(.node, .name))]
    Cycle { node: NodeId, name: Option<Rc<str>> },

    #[error("node {node} has been disposed")]
    Disposed { node: NodeId },

    #[error("runtime has been shut down")]
    Shutdown,

    #[error("node {node} is not a settable observable")]
    NotSettable { node: NodeId },

    #[error("node {node} does not hold a value of the requested type")]
    TypeMismatch { node: NodeId },

    #[error("reactions did not settle after {limit} runs")]
    FlushLimitExceeded { limit: usize },

    #[error("computation failed: {0}")]
    Compute(#[from] ComputeError),
}

impl ReactiveError {
    /// Shorthand for a user-level failure inside a compute or effect function.
    pub fn compute(message: impl fmt::Display) -> Self {
        ReactiveError::Compute(ComputeError::new(message))
    }

    /// True if this error signals a dependency cycle.
    pub fn is_cycle(&self) -> bool {
        matches!(self, ReactiveError::Cycle { .. })
    }
}

fn display_node(node: &NodeId, name: &Option<Rc<str>>) -> String {
    match name {
        Some(name) => format!("{name} ({node})"),
        None => node.to_string(),
    }
}

/// A failure raised by user code.
///
/// Cheap to clone so the engine can cache it on an errored node and hand a
/// copy to every reader until the node recomputes successfully.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct ComputeError {
    message: Rc<str>,
}

impl ComputeError {
    pub fn new(message: impl fmt::Display) -> Self {
        Self {
            message: Rc::from(message.to_string()),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}
