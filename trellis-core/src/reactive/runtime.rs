//! Reactive Runtime
//!
//! The runtime is the central coordinator that connects observables, derived
//! values and reactions. It owns the node arena, the transaction worklist,
//! the diagnostic sink and the host error handler. There is no global
//! runtime; every constructor takes one explicitly.
//!
//! # How It Works
//!
//! 1. A write to an observable bumps its version and walks its dependents,
//!    marking each reachable observer possibly stale (push, cheap). Every
//!    reaction reached this way is enqueued on the open transaction.
//!
//! 2. When the outermost transaction closes, queued reactions are
//!    validated. Validation pulls: each dependency edge is brought up to
//!    date first (derived nodes recompute on demand) and then its version is
//!    compared with the version the observer last saw.
//!
//! 3. Only an observer with at least one genuinely changed dependency
//!    re-runs. A derived value that recomputes to an equal value keeps its
//!    version, so nothing downstream of it re-runs.
//!
//! # Borrowing
//!
//! User code (compute functions, effects, comparers, change handlers) is
//! never called while the graph is borrowed. The runtime copies out what it
//! needs, releases the borrow, calls out, and re-borrows to store results.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::fmt;
use std::rc::Rc;

use smallvec::SmallVec;

use super::change::ChangeContext;
use super::context::Reader;
use super::store::DisposableStore;
use crate::config::RuntimeConfig;
use crate::error::ReactiveError;
use crate::graph::{
    AnyValue, Edge, Graph, Node, NodeId, NodeKind, ObserverState, Payload, UpdateScheduler,
};
use crate::trace::{TraceEvent, TraceRecord, TraceSink};

type ErrorHandler = Rc<dyn Fn(&ReactiveError, Option<&str>)>;

/// Transaction bookkeeping.
#[derive(Debug, Default)]
pub(crate) struct BatchState {
    pub depth: usize,
    pub draining: bool,
    pub scheduler: UpdateScheduler,
}

struct RuntimeInner {
    config: RuntimeConfig,
    graph: RefCell<Graph>,
    batch: RefCell<BatchState>,
    sink: RefCell<Option<Rc<dyn TraceSink>>>,
    error_handler: RefCell<Option<ErrorHandler>>,
    /// Evaluations currently on the stack.
    evaluating: Cell<usize>,
    shut_down: Cell<bool>,
}

/// Handle to one reactive engine.
///
/// Cloning is cheap and yields another handle to the same engine. The
/// engine is single-threaded: handles are neither `Send` nor `Sync`.
#[derive(Clone)]
pub struct Runtime {
    inner: Rc<RuntimeInner>,
}

/// Snapshot of a node for tooling and tests.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeInfo {
    pub id: NodeId,
    pub kind: NodeKind,
    pub name: Option<String>,
    pub state: ObserverState,
    pub version: u64,
    pub possibly_stale_count: u32,
    pub dependencies: Vec<NodeId>,
    pub dependents: Vec<NodeId>,
}

impl Runtime {
    pub fn new() -> Self {
        Self::with_config(RuntimeConfig::default())
    }

    pub fn with_config(config: RuntimeConfig) -> Self {
        tracing::debug!(runtime = %config.name, "runtime created");
        Self {
            inner: Rc::new(RuntimeInner {
                config,
                graph: RefCell::new(Graph::new()),
                batch: RefCell::new(BatchState::default()),
                sink: RefCell::new(None),
                error_handler: RefCell::new(None),
                evaluating: Cell::new(0),
                shut_down: Cell::new(false),
            }),
        }
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.inner.config
    }

    /// Install a diagnostic sink, replacing any previous one.
    pub fn set_trace_sink(&self, sink: impl TraceSink + 'static) {
        *self.inner.sink.borrow_mut() = Some(Rc::new(sink));
    }

    pub fn clear_trace_sink(&self) {
        self.inner.sink.borrow_mut().take();
    }

    /// Install the handler that receives errors returned by reaction effects.
    ///
    /// The second argument is the reaction's debug name, if it has one.
    /// Without a handler, errors are logged with `tracing::error!`.
    pub fn set_error_handler(&self, handler: impl Fn(&ReactiveError, Option<&str>) + 'static) {
        *self.inner.error_handler.borrow_mut() = Some(Rc::new(handler));
    }

    /// Dispose every live node and refuse all further work.
    ///
    /// Reactions go first so their resource scopes are torn down while the
    /// nodes they reference still exist.
    pub fn shutdown(&self) {
        if self.inner.shut_down.get() {
            return;
        }
        let ids = self.inner.graph.borrow().ids();
        let (reactions, others): (Vec<NodeId>, Vec<NodeId>) = ids.into_iter().partition(|id| {
            self.inner
                .graph
                .borrow()
                .get(*id)
                .is_some_and(|n| n.kind() == NodeKind::Reaction)
        });
        for id in reactions.into_iter().chain(others) {
            self.dispose_node(id);
        }
        self.inner.batch.borrow_mut().scheduler.clear();
        self.inner.shut_down.set(true);
        tracing::debug!(runtime = %self.inner.config.name, "runtime shut down");
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.shut_down.get()
    }

    /// Get the total number of live nodes.
    pub fn node_count(&self) -> usize {
        self.inner.graph.borrow().node_count()
    }

    pub fn node_info(&self, id: NodeId) -> Option<NodeInfo> {
        let graph = self.inner.graph.borrow();
        let node = graph.get(id)?;
        Some(NodeInfo {
            id,
            kind: node.kind(),
            name: node.name.as_deref().map(str::to_owned),
            state: node.state,
            version: node.version,
            possibly_stale_count: node.stale_count,
            dependencies: node.dependencies.iter().map(|e| e.source).collect(),
            dependents: node.dependents.iter().copied().collect(),
        })
    }

    pub fn ptr_eq(&self, other: &Runtime) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    // ------------------------------------------------------------------
    // Node lifecycle
    // ------------------------------------------------------------------

    pub(crate) fn create_node(&self, node: Node) -> NodeId {
        let kind = node.kind();
        let name = node.name.clone();
        let id = self.inner.graph.borrow_mut().insert(node);
        tracing::debug!(node = %id, ?kind, name = name.as_deref().unwrap_or(""), "node created");
        self.emit(|| TraceRecord::node(TraceEvent::Created, id, kind, name.as_deref(), 0));
        id
    }

    /// Dispose a node: drop it from the worklist, remove all its edges and
    /// tear down its resource scope. Disposing twice is a no-op.
    pub(crate) fn dispose_node(&self, id: NodeId) {
        let removed = self.inner.graph.borrow_mut().remove(id);
        let Some(mut node) = removed else {
            return;
        };
        self.inner.batch.borrow_mut().scheduler.remove(id);
        let kind = node.kind();
        if let Payload::Reaction { store, .. } = &mut node.payload {
            if let Some(store) = store.take() {
                store.dispose();
            }
        }
        tracing::debug!(node = %id, ?kind, "node disposed");
        self.emit(|| {
            TraceRecord::node(TraceEvent::Disposed, id, kind, node.name.as_deref(), node.version)
        });
        drop(node);
    }

    pub(crate) fn contains(&self, id: NodeId) -> bool {
        self.inner.graph.borrow().contains(id)
    }

    pub(crate) fn check_alive(&self) -> Result<(), ReactiveError> {
        if self.inner.shut_down.get() {
            return Err(ReactiveError::Shutdown);
        }
        Ok(())
    }

    pub(crate) fn with_node<R>(&self, id: NodeId, f: impl FnOnce(&Node) -> R) -> Option<R> {
        self.inner.graph.borrow().get(id).map(f)
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    /// Bring a node up to date and return its value without recording a
    /// dependency.
    pub(crate) fn read_untracked(&self, id: NodeId) -> Result<AnyValue, ReactiveError> {
        self.check_alive()?;
        self.ensure_fresh(id)?;
        let graph = self.inner.graph.borrow();
        let node = graph.node(id)?;
        node.current().unwrap_or(Err(ReactiveError::Disposed { node: id }))
    }

    /// Bring `source` up to date, register `observer` as its dependent and
    /// return the value together with the version the observer saw.
    ///
    /// The outer error means no edge was recorded (cycle, disposed node).
    /// The inner error is a cached compute failure of `source`; the edge is
    /// recorded so the observer is invalidated once the source recovers.
    pub(crate) fn read_tracked(
        &self,
        observer: NodeId,
        source: NodeId,
    ) -> Result<(Result<AnyValue, ReactiveError>, u64), ReactiveError> {
        self.check_alive()?;
        self.ensure_fresh(source)?;
        let (value, version, kind) = {
            let mut graph = self.inner.graph.borrow_mut();
            let node = graph.node(source)?;
            let value = node
                .current()
                .unwrap_or(Err(ReactiveError::Disposed { node: source }));
            let version = node.version;
            let kind = node.kind();
            if graph.contains(observer) {
                graph.link(source, observer);
            }
            (value, version, kind)
        };
        tracing::trace!(%observer, %source, version, "read");
        if self.inner.config.trace_reads {
            self.emit(|| TraceRecord::node(TraceEvent::Read, source, kind, None, version));
        }
        Ok((value, version))
    }

    // ------------------------------------------------------------------
    // Writes (push phase)
    // ------------------------------------------------------------------

    /// Replace the value of a source node.
    ///
    /// Returns false when the comparer judged the new value equal to the
    /// old one; nothing is bumped or notified in that case.
    pub(crate) fn write(
        &self,
        id: NodeId,
        value: AnyValue,
        hints: Vec<AnyValue>,
    ) -> Result<bool, ReactiveError> {
        self.check_alive()?;
        let (old, equals, lazy_idle) = {
            let graph = self.inner.graph.borrow();
            let node = graph.node(id)?;
            match &node.payload {
                Payload::Source { value, equals, .. } => (
                    Rc::clone(value),
                    Rc::clone(equals),
                    node.is_lazy_without_dependents(),
                ),
                _ => return Err(ReactiveError::NotSettable { node: id }),
            }
        };
        if equals(&*old, &*value) {
            return Ok(false);
        }
        drop(old);
        if lazy_idle {
            self.store_source_value(id, value)?;
            return Ok(true);
        }
        self.check_write_cycle(id)?;
        self.store_source_value(id, value)?;
        self.notify(id, hints)?;
        Ok(true)
    }

    /// Mutate a source value in place. `f` returns the change hints of the
    /// mutation; an empty list means nothing changed.
    ///
    /// The stored value is only deep-copied if a reader still holds the
    /// previous snapshot.
    pub(crate) fn modify<T, H>(
        &self,
        id: NodeId,
        f: impl FnOnce(&mut T) -> Vec<H>,
    ) -> Result<Vec<H>, ReactiveError>
    where
        T: Clone + 'static,
        H: Clone + 'static,
    {
        self.check_alive()?;
        let (mut typed, lazy_idle) = {
            let mut graph = self.inner.graph.borrow_mut();
            let node = graph.node_mut(id)?;
            let lazy_idle = node.is_lazy_without_dependents();
            let Payload::Source { value, .. } = &mut node.payload else {
                return Err(ReactiveError::NotSettable { node: id });
            };
            let taken = std::mem::replace(value, Rc::new(()));
            match taken.downcast::<T>() {
                Ok(typed) => (typed, lazy_idle),
                Err(original) => {
                    *value = original;
                    return Err(ReactiveError::TypeMismatch { node: id });
                }
            }
        };
        // Keep the pre-mutation snapshot only if a cycle may have to roll
        // the write back.
        let backup = (self.inner.evaluating.get() > 0).then(|| Rc::clone(&typed));
        let hints = f(Rc::make_mut(&mut typed));

        if hints.is_empty() {
            self.put_source_value(id, typed);
            return Ok(hints);
        }
        if !lazy_idle {
            if let Err(err) = self.check_write_cycle(id) {
                if let Some(backup) = backup {
                    self.put_source_value(id, backup);
                }
                return Err(err);
            }
        }
        self.store_source_value(id, typed)?;
        if !lazy_idle {
            let erased = hints
                .iter()
                .cloned()
                .map(|h| Rc::new(h) as AnyValue)
                .collect();
            self.notify(id, erased)?;
        }
        Ok(hints)
    }

    fn put_source_value(&self, id: NodeId, value: AnyValue) {
        let displaced = {
            let mut graph = self.inner.graph.borrow_mut();
            match graph.get_mut(id).map(|n| &mut n.payload) {
                Some(Payload::Source { value: slot, .. }) => Some(std::mem::replace(slot, value)),
                _ => None,
            }
        };
        drop(displaced);
    }

    fn store_source_value(&self, id: NodeId, value: AnyValue) -> Result<(), ReactiveError> {
        let (displaced, version, name) = {
            let mut graph = self.inner.graph.borrow_mut();
            let node = graph.node_mut(id)?;
            let Payload::Source { value: slot, .. } = &mut node.payload else {
                return Err(ReactiveError::NotSettable { node: id });
            };
            let displaced = std::mem::replace(slot, value);
            node.version += 1;
            (displaced, node.version, node.name.clone())
        };
        drop(displaced);
        tracing::trace!(node = %id, version, "write");
        self.emit(|| {
            TraceRecord::node(TraceEvent::Written, id, NodeKind::Source, name.as_deref(), version)
        });
        Ok(())
    }

    /// Propagate a source change inside an (implicit) transaction.
    fn notify(&self, source: NodeId, hints: Vec<AnyValue>) -> Result<(), ReactiveError> {
        self.begin_batch();
        self.propagate(source, &hints);
        self.end_batch()
    }

    /// A write while an evaluation is on the stack must not reach a node that
    /// is currently recomputing: that evaluation read (or previously read)
    /// the written source, so the write would feed back into itself.
    fn check_write_cycle(&self, source: NodeId) -> Result<(), ReactiveError> {
        if self.inner.evaluating.get() == 0 {
            return Ok(());
        }
        let graph = self.inner.graph.borrow();
        let mut visited = HashSet::new();
        let mut stack: Vec<NodeId> = graph.node(source)?.dependents.iter().copied().collect();
        while let Some(id) = stack.pop() {
            if !visited.insert(id) {
                continue;
            }
            let Some(node) = graph.get(id) else { continue };
            if node.state == ObserverState::Recomputing {
                return Err(ReactiveError::Cycle {
                    node: id,
                    name: node.name.clone(),
                });
            }
            stack.extend(node.dependents.iter().copied());
        }
        Ok(())
    }

    fn propagate(&self, source: NodeId, hints: &[AnyValue]) {
        let (direct, version): (SmallVec<[NodeId; 8]>, u64) = {
            let graph = self.inner.graph.borrow();
            match graph.get(source) {
                Some(node) => (node.dependents.iter().copied().collect(), node.version),
                None => return,
            }
        };
        for dependent in direct {
            let handler = self.with_node(dependent, |n| n.change_handler.clone()).flatten();
            if let Some(handler) = handler {
                let accepted = if hints.is_empty() {
                    handler(&ChangeContext::new(source, None))
                } else {
                    // Every hint is offered; a handler that folds them into a
                    // summary must see all of them.
                    hints.iter().fold(false, |accepted, hint| {
                        handler(&ChangeContext::new(source, Some(&**hint))) || accepted
                    })
                };
                let mut graph = self.inner.graph.borrow_mut();
                let Some(node) = graph.get_mut(dependent) else {
                    continue;
                };
                if !accepted {
                    // A change accepted earlier in this transaction must still
                    // reach validation, so the edge keeps its older stamp.
                    if !node.change_accepted {
                        node.stamp_dependency(source, version);
                    }
                    continue;
                }
                node.change_accepted = true;
            }
            self.mark_possibly_stale(dependent);
        }
    }

    /// Mark `start` and, through derived nodes, everything downstream of it.
    /// A node that is already possibly stale stops the walk: its dependents
    /// were marked by the first notification.
    fn mark_possibly_stale(&self, start: NodeId) {
        let mut graph = self.inner.graph.borrow_mut();
        let mut batch = self.inner.batch.borrow_mut();
        let mut stack = vec![start];
        while let Some(id) = stack.pop() {
            let Some(node) = graph.get_mut(id) else {
                continue;
            };
            if !node.mark_possibly_stale() {
                continue;
            }
            tracing::trace!(node = %id, count = node.stale_count, "possibly stale");
            match node.kind() {
                NodeKind::Derived => stack.extend(node.dependents.iter().copied()),
                NodeKind::Reaction => {
                    batch.scheduler.enqueue(id);
                }
                NodeKind::Source => {}
            }
        }
    }

    // ------------------------------------------------------------------
    // Transactions
    // ------------------------------------------------------------------

    pub(crate) fn begin_batch(&self) {
        self.inner.batch.borrow_mut().depth += 1;
    }

    /// Close one transaction level. Closing the outermost level drains the
    /// worklist, unless a drain is already running further up the stack.
    pub(crate) fn end_batch(&self) -> Result<(), ReactiveError> {
        let should_flush = {
            let mut batch = self.inner.batch.borrow_mut();
            batch.depth = batch.depth.saturating_sub(1);
            batch.depth == 0 && !batch.draining
        };
        if should_flush {
            self.flush()
        } else {
            Ok(())
        }
    }

    pub(crate) fn batch_depth(&self) -> usize {
        self.inner.batch.borrow().depth
    }

    pub(crate) fn pending_count(&self) -> usize {
        self.inner.batch.borrow().scheduler.len()
    }

    fn flush(&self) -> Result<(), ReactiveError> {
        self.inner.batch.borrow_mut().draining = true;
        let limit = self.inner.config.max_flush_iterations;
        let mut processed = 0usize;
        let result = loop {
            let next = self.inner.batch.borrow_mut().scheduler.next();
            let Some(id) = next else {
                break Ok(());
            };
            processed += 1;
            if processed > limit {
                let mut dropped = vec![id];
                dropped.extend(self.inner.batch.borrow_mut().scheduler.drain());
                for id in dropped {
                    self.abandon(id);
                }
                tracing::warn!(
                    runtime = %self.inner.config.name,
                    limit,
                    "reactions did not settle, dropping pending work"
                );
                break Err(ReactiveError::FlushLimitExceeded { limit });
            }
            // A reaction disposed while queued is dropped silently.
            if !self.contains(id) {
                continue;
            }
            if let Err(err) = self.ensure_fresh(id) {
                let name = self.with_node(id, |n| n.name.clone()).flatten();
                self.report_error(&err, name.as_deref());
            }
        };
        self.inner.batch.borrow_mut().draining = false;
        tracing::debug!(processed, "transaction closed");
        self.emit(|| TraceRecord::runtime(TraceEvent::TransactionClosed));
        result
    }

    // ------------------------------------------------------------------
    // Validation (pull phase)
    // ------------------------------------------------------------------

    /// Make sure the cached state of `id` reflects its current inputs.
    ///
    /// Errors returned here are engine errors (cycle, disposed); compute
    /// failures are cached on the node instead.
    pub(crate) fn ensure_fresh(&self, id: NodeId) -> Result<(), ReactiveError> {
        let state = self.inner.graph.borrow().node(id)?.state;
        match state {
            ObserverState::Clean | ObserverState::Errored => Ok(()),
            ObserverState::Recomputing => Err(self.cycle_error(id)),
            ObserverState::Uninitialized => self.evaluate(id),
            ObserverState::PossiblyStale => {
                if self.dependencies_changed(id)? {
                    self.evaluate(id)
                } else {
                    if let Some(node) = self.inner.graph.borrow_mut().get_mut(id) {
                        node.mark_settled();
                    }
                    Ok(())
                }
            }
        }
    }

    /// Settle a queued reaction without running it. Its dependencies are
    /// brought up to date so later changes reach it again; its edges keep
    /// the old version stamps, so the next validation re-runs it.
    fn abandon(&self, id: NodeId) {
        let edges: SmallVec<[Edge; 4]> = match self.inner.graph.borrow().get(id) {
            Some(node) => node.dependencies.clone(),
            None => return,
        };
        for edge in edges {
            if let Err(err) = self.ensure_fresh(edge.source) {
                tracing::debug!(
                    node = %id,
                    source = %edge.source,
                    "dependency not settled: {}",
                    err
                );
            }
        }
        if let Some(node) = self.inner.graph.borrow_mut().get_mut(id) {
            node.mark_settled();
        }
    }

    /// Cheap validation: refresh each dependency and compare its version
    /// against the stamp on the edge.
    fn dependencies_changed(&self, id: NodeId) -> Result<bool, ReactiveError> {
        let (edges, handler): (SmallVec<[Edge; 4]>, _) = {
            let graph = self.inner.graph.borrow();
            let node = graph.node(id)?;
            (node.dependencies.clone(), node.change_handler.clone())
        };
        for edge in edges {
            if !self.contains(edge.source) {
                return Ok(true);
            }
            self.ensure_fresh(edge.source)?;
            let Some((version, kind)) = self.with_node(edge.source, |n| (n.version, n.kind()))
            else {
                return Ok(true);
            };
            if version == edge.version {
                continue;
            }
            match &handler {
                // Source changes were offered to the handler when they were
                // written; derived changes are offered now.
                Some(handler) if kind == NodeKind::Derived => {
                    if handler(&ChangeContext::new(edge.source, None)) {
                        return Ok(true);
                    }
                    if let Some(node) = self.inner.graph.borrow_mut().get_mut(id) {
                        node.stamp_dependency(edge.source, version);
                    }
                }
                _ => return Ok(true),
            }
        }
        Ok(false)
    }

    fn evaluate(&self, id: NodeId) -> Result<(), ReactiveError> {
        let kind = self.inner.graph.borrow().node(id)?.kind();
        match kind {
            NodeKind::Derived => self.recompute_derived(id),
            NodeKind::Reaction => self.run_reaction(id),
            NodeKind::Source => Ok(()),
        }
    }

    fn recompute_derived(&self, id: NodeId) -> Result<(), ReactiveError> {
        let (compute, equals, previous) = {
            let mut graph = self.inner.graph.borrow_mut();
            let node = graph.node_mut(id)?;
            node.state = ObserverState::Recomputing;
            match &node.payload {
                Payload::Derived {
                    compute,
                    equals,
                    cached,
                } => (Rc::clone(compute), Rc::clone(equals), cached.clone()),
                _ => return Ok(()),
            }
        };

        let reader = Reader::new(self.clone(), id);
        self.inner.evaluating.set(self.inner.evaluating.get() + 1);
        let result = compute(&reader);
        self.inner.evaluating.set(self.inner.evaluating.get() - 1);
        let edges = reader.finish();

        if !self.install_dependencies(id, edges) {
            return Ok(());
        }

        let changed = match (&previous, &result) {
            (Some(Ok(old)), Ok(new)) => !equals(&**old, &**new),
            (Some(Err(old)), Err(new)) => old != new,
            _ => true,
        };
        let (displaced, version, name) = {
            let mut graph = self.inner.graph.borrow_mut();
            let node = graph.node_mut(id)?;
            let displaced = if changed {
                node.version += 1;
                match &mut node.payload {
                    Payload::Derived { cached, .. } => cached.replace(result),
                    _ => None,
                }
            } else {
                Some(result)
            };
            node.mark_settled();
            (displaced, node.version, node.name.clone())
        };
        drop(displaced);
        drop(previous);

        tracing::trace!(node = %id, version, changed, "recomputed");
        self.emit(|| {
            let name = name.as_deref();
            TraceRecord::node(TraceEvent::Recomputed, id, NodeKind::Derived, name, version)
        });
        Ok(())
    }

    fn run_reaction(&self, id: NodeId) -> Result<(), ReactiveError> {
        let (effect, previous_store) = {
            let mut graph = self.inner.graph.borrow_mut();
            let node = graph.node_mut(id)?;
            node.state = ObserverState::Recomputing;
            match &mut node.payload {
                Payload::Reaction { effect, store, .. } => (effect.take(), store.take()),
                _ => return Ok(()),
            }
        };
        let Some(mut effect) = effect else {
            return Ok(());
        };
        // Resources of the previous run are released before the next run.
        if let Some(store) = previous_store {
            store.dispose();
        }

        let store = DisposableStore::new();
        let reader = Reader::new(self.clone(), id);
        self.begin_batch();
        self.inner.evaluating.set(self.inner.evaluating.get() + 1);
        let result = effect(&reader, &store);
        self.inner.evaluating.set(self.inner.evaluating.get() - 1);
        let edges = reader.finish();

        let (runs, name) = if self.install_dependencies(id, edges) {
            let mut graph = self.inner.graph.borrow_mut();
            let node = graph.node_mut(id)?;
            node.version += 1;
            node.mark_settled();
            let name = node.name.clone();
            match &mut node.payload {
                Payload::Reaction {
                    effect: slot,
                    store: store_slot,
                    runs,
                } => {
                    *slot = Some(effect);
                    *store_slot = Some(store);
                    *runs += 1;
                    (*runs, name)
                }
                _ => (0, name),
            }
        } else {
            // Disposed by its own effect.
            store.dispose();
            drop(effect);
            (0, None)
        };

        tracing::debug!(node = %id, runs, "reaction ran");
        self.emit(|| {
            let (name, runs) = (name.as_deref(), runs as u64);
            TraceRecord::node(TraceEvent::ReactionRun, id, NodeKind::Reaction, name, runs)
        });
        if let Err(err) = result {
            self.report_error(&err, name.as_deref());
        }
        // Writes made by the effect are flushed after it finished.
        self.end_batch()
    }

    /// Store the edges recorded by a finished evaluation. Returns false if
    /// the observer was disposed while it ran; its freshly linked edges are
    /// removed in that case.
    fn install_dependencies(&self, id: NodeId, edges: SmallVec<[Edge; 4]>) -> bool {
        let mut graph = self.inner.graph.borrow_mut();
        if graph.contains(id) {
            graph.replace_dependencies(id, edges);
            true
        } else {
            for edge in edges {
                graph.unlink(edge.source, id);
            }
            false
        }
    }

    fn cycle_error(&self, id: NodeId) -> ReactiveError {
        let name = self.with_node(id, |n| n.name.clone()).flatten();
        tracing::debug!(node = %id, "cycle detected");
        ReactiveError::Cycle { node: id, name }
    }

    // ------------------------------------------------------------------
    // Diagnostics
    // ------------------------------------------------------------------

    pub(crate) fn report_error(&self, err: &ReactiveError, name: Option<&str>) {
        let handler = self.inner.error_handler.borrow().clone();
        match handler {
            Some(handler) => handler(err, name),
            None => tracing::error!(
                runtime = %self.inner.config.name,
                reaction = name.unwrap_or("<anonymous>"),
                "reaction failed: {}",
                err
            ),
        }
    }

    fn emit(&self, record: impl FnOnce() -> TraceRecord) {
        let sink = self.inner.sink.borrow().clone();
        if let Some(sink) = sink {
            sink.record(&record());
        }
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("name", &self.inner.config.name)
            .field("node_count", &self.node_count())
            .field("batch_depth", &self.batch_depth())
            .field("shut_down", &self.is_shut_down())
            .finish()
    }
}

/// Wrap a typed comparer so it can compare erased values.
pub(crate) fn erase_equals<T: 'static>(
    equals: Rc<dyn Fn(&T, &T) -> bool>,
) -> crate::graph::EqualsFn {
    Rc::new(move |a: &dyn Any, b: &dyn Any| {
        match (a.downcast_ref::<T>(), b.downcast_ref::<T>()) {
            (Some(a), Some(b)) => equals(a, b),
            _ => false,
        }
    })
}
