//! Reaction Implementation
//!
//! A reaction is a terminal observer that runs a side effect. It runs once
//! when created and again whenever a transaction that changed one of its
//! dependencies closes.
//!
//! # How Reactions Work
//!
//! 1. Creation runs the effect immediately to establish dependencies.
//!
//! 2. A change upstream enqueues the reaction on the open transaction,
//!    once, regardless of how many paths reach it.
//!
//! 3. When the outermost transaction closes, the reaction validates its
//!    dependencies and runs only if one of them really changed.
//!
//! 4. Each run gets a fresh [`DisposableStore`]; the previous run's store is
//!    disposed first. Disposing the reaction disposes the last store.
//!
//! Errors returned by the effect are handed to the runtime's error handler
//! and never abort other reactions.

use std::cell::RefCell;
use std::collections::HashSet;
use std::fmt;
use std::hash::Hash;
use std::rc::Rc;

use super::change::ChangeContext;
use super::context::{Readable, Reader};
use super::runtime::Runtime;
use super::store::{Disposable, DisposableStore};
use crate::error::ReactiveError;
use crate::graph::{ChangeHandler, EffectFn, Node, NodeId, ObserverState, Payload};

/// Handle to a running reaction.
///
/// The reaction lives as long as the handle: dropping it disposes the
/// reaction. Keep it in a [`DisposableStore`] or call [`Reaction::forget`]
/// to detach its lifetime from the handle.
#[must_use = "a reaction is disposed as soon as its handle is dropped"]
pub struct Reaction {
    runtime: Runtime,
    id: NodeId,
    detached: bool,
}

impl Reaction {
    /// Create a reaction and run it immediately.
    pub fn new<F>(runtime: &Runtime, effect: F) -> Self
    where
        F: FnMut(&Reader) -> Result<(), ReactiveError> + 'static,
    {
        let mut effect = effect;
        Self::build(
            runtime,
            None,
            None,
            Box::new(move |r: &Reader, _: &DisposableStore| effect(r)),
        )
    }

    fn build(
        runtime: &Runtime,
        name: Option<&str>,
        handler: Option<ChangeHandler>,
        effect: EffectFn,
    ) -> Self {
        let node = Node::reaction(effect)
            .with_name(name.map(Rc::from))
            .with_change_handler(handler);
        let id = runtime.create_node(node);
        let first_run = runtime.check_alive().and_then(|()| runtime.ensure_fresh(id));
        if let Err(err) = first_run {
            runtime.report_error(&err, name);
        }
        Self {
            runtime: runtime.clone(),
            id,
            detached: false,
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn dispose(&self) {
        self.runtime.dispose_node(self.id);
    }

    pub fn is_disposed(&self) -> bool {
        !self.runtime.contains(self.id)
    }

    /// Get the number of times the effect has run.
    pub fn run_count(&self) -> usize {
        self.runtime
            .with_node(self.id, |n| match &n.payload {
                Payload::Reaction { runs, .. } => *runs,
                _ => 0,
            })
            .unwrap_or(0)
    }

    pub fn state(&self) -> Option<ObserverState> {
        self.runtime.with_node(self.id, |n| n.state)
    }

    pub fn dependency_count(&self) -> usize {
        self.runtime
            .with_node(self.id, |n| n.dependencies.len())
            .unwrap_or(0)
    }

    /// Keep the reaction alive after the handle is dropped. It can still be
    /// disposed through [`Runtime::shutdown`].
    pub fn forget(mut self) -> NodeId {
        self.detached = true;
        self.id
    }
}

impl Disposable for Reaction {
    fn dispose(&self) {
        Reaction::dispose(self);
    }
}

impl Drop for Reaction {
    fn drop(&mut self) {
        if !self.detached {
            self.runtime.dispose_node(self.id);
        }
    }
}

impl fmt::Debug for Reaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reaction")
            .field("id", &self.id)
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

/// Run `effect` now and whenever something it read changes.
pub fn autorun<F>(runtime: &Runtime, effect: F) -> Reaction
where
    F: FnMut(&Reader) -> Result<(), ReactiveError> + 'static,
{
    Reaction::new(runtime, effect)
}

/// [`autorun`] with a debug name used in logs, errors and trace records.
pub fn autorun_named<F>(runtime: &Runtime, name: &str, effect: F) -> Reaction
where
    F: FnMut(&Reader) -> Result<(), ReactiveError> + 'static,
{
    let mut effect = effect;
    Reaction::build(
        runtime,
        Some(name),
        None,
        Box::new(move |r: &Reader, _: &DisposableStore| effect(r)),
    )
}

/// [`autorun`] whose effect also receives the resource scope of the run.
///
/// Everything added to the store is disposed before the next run and when
/// the reaction is disposed.
pub fn autorun_with_store<F>(runtime: &Runtime, effect: F) -> Reaction
where
    F: FnMut(&Reader, &DisposableStore) -> Result<(), ReactiveError> + 'static,
{
    Reaction::build(runtime, None, None, Box::new(effect))
}

/// [`autorun`] that sees each direct upstream change before it is
/// invalidated.
///
/// `handle_change` folds changes into a summary and returns whether the
/// reaction should re-run. The effect receives the summary collected since
/// its previous run.
pub fn autorun_handle_changes<S, C, H, F>(
    runtime: &Runtime,
    create_summary: C,
    handle_change: H,
    effect: F,
) -> Reaction
where
    S: 'static,
    C: Fn() -> S + 'static,
    H: Fn(&ChangeContext<'_>, &mut S) -> bool + 'static,
    F: FnMut(&Reader, S) -> Result<(), ReactiveError> + 'static,
{
    let summary = Rc::new(RefCell::new(create_summary()));
    let handler_summary = Rc::clone(&summary);
    let handler: ChangeHandler = Rc::new(move |ctx: &ChangeContext<'_>| {
        handle_change(ctx, &mut *handler_summary.borrow_mut())
    });
    let mut effect = effect;
    Reaction::build(
        runtime,
        None,
        Some(handler),
        Box::new(move |r: &Reader, _: &DisposableStore| {
            let collected = std::mem::replace(&mut *summary.borrow_mut(), create_summary());
            effect(r, collected)
        }),
    )
}

/// Run `effect` with the previous and the current value of `source` each
/// time it changes. The first run sees `None` as the previous value.
pub fn autorun_delta<R, F>(runtime: &Runtime, source: &R, effect: F) -> Reaction
where
    R: Readable + 'static,
    F: FnMut(Option<R::Value>, R::Value) -> Result<(), ReactiveError> + 'static,
{
    let id = source.node_id();
    let mut effect = effect;
    let mut previous: Option<R::Value> = None;
    Reaction::build(
        runtime,
        None,
        None,
        Box::new(move |r: &Reader, _: &DisposableStore| {
            let current: R::Value = r.read(&ById::<R::Value>::new(id))?;
            let last = previous.replace(current.clone());
            effect(last, current)
        }),
    )
}

/// Items that entered and left an iterable between two runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemDelta<T> {
    pub added: Vec<T>,
    pub removed: Vec<T>,
}

/// Run `effect` with the items that were added to and removed from the
/// value of `items` since the previous run. The first run reports every
/// item as added. Runs with no difference are skipped.
pub fn autorun_iterable_delta<T, I, F>(runtime: &Runtime, items: I, effect: F) -> Reaction
where
    T: Clone + Eq + Hash + 'static,
    I: Fn(&Reader) -> Result<Vec<T>, ReactiveError> + 'static,
    F: FnMut(ItemDelta<T>) -> Result<(), ReactiveError> + 'static,
{
    let mut effect = effect;
    let mut last: Vec<T> = Vec::new();
    Reaction::build(
        runtime,
        None,
        None,
        Box::new(move |r: &Reader, _: &DisposableStore| {
            let current = items(r)?;
            let before: HashSet<&T> = last.iter().collect();
            let after: HashSet<&T> = current.iter().collect();
            let delta = ItemDelta {
                added: current.iter().filter(|t| !before.contains(t)).cloned().collect(),
                removed: last.iter().filter(|t| !after.contains(t)).cloned().collect(),
            };
            last = current;
            if delta.added.is_empty() && delta.removed.is_empty() {
                return Ok(());
            }
            effect(delta)
        }),
    )
}

/// Readable addressed by id, for closures that must not hold the handle.
struct ById<T> {
    id: NodeId,
    marker: std::marker::PhantomData<fn() -> T>,
}

impl<T> ById<T> {
    fn new(id: NodeId) -> Self {
        Self {
            id,
            marker: std::marker::PhantomData,
        }
    }
}

impl<T: Clone + 'static> Readable for ById<T> {
    type Value = T;

    fn node_id(&self) -> NodeId {
        self.id
    }
}

// ---- Tests ----
