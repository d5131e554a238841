//! Async bridge.
//!
//! Feeds the result of a future, or the items of a stream, into an
//! observable. The driving task is spawned with
//! [`tokio::task::spawn_local`], so these functions must be called from
//! within a [`tokio::task::LocalSet`]: the engine is single-threaded and its
//! handles are not `Send`.
//!
//! Disposing the bridge aborts the task. A value already on its way is
//! dropped: the task checks a liveness flag before writing.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::future::Future;
use std::rc::Rc;

use futures_util::{Stream, StreamExt};
use tokio::task::JoinHandle;

use crate::error::ReactiveError;
use crate::graph::NodeId;
use crate::reactive::{Disposable, Observable, Readable, Reader, Runtime};

/// An observable driven by an async task.
pub struct AsyncObservable<T> {
    value: Observable<T>,
    alive: Rc<Cell<bool>>,
    settled: Rc<Cell<bool>>,
    task: RefCell<Option<JoinHandle<()>>>,
}

/// Observable holding `None` until `future` resolves, then `Some(output)`.
pub fn from_future<F>(runtime: &Runtime, future: F) -> AsyncObservable<Option<F::Output>>
where
    F: Future + 'static,
    F::Output: Clone + PartialEq + 'static,
{
    let value = Observable::new(runtime, None);
    let alive = Rc::new(Cell::new(true));
    let settled = Rc::new(Cell::new(false));
    let (task_value, task_alive, task_settled) = (value.clone(), alive.clone(), settled.clone());
    let task = tokio::task::spawn_local(async move {
        let output = future.await;
        if !task_alive.get() {
            return;
        }
        deliver(&task_value, Some(output));
        task_settled.set(true);
    });
    AsyncObservable {
        value,
        alive,
        settled,
        task: RefCell::new(Some(task)),
    }
}

/// Observable holding `initial`, then the latest item of `stream`.
pub fn from_stream<S>(runtime: &Runtime, stream: S, initial: S::Item) -> AsyncObservable<S::Item>
where
    S: Stream + 'static,
    S::Item: Clone + PartialEq + 'static,
{
    let value = Observable::new(runtime, initial);
    let alive = Rc::new(Cell::new(true));
    let settled = Rc::new(Cell::new(false));
    let (task_value, task_alive, task_settled) = (value.clone(), alive.clone(), settled.clone());
    let task = tokio::task::spawn_local(async move {
        let mut stream = std::pin::pin!(stream);
        while let Some(item) = stream.next().await {
            if !task_alive.get() {
                return;
            }
            deliver(&task_value, item);
        }
        task_settled.set(true);
    });
    AsyncObservable {
        value,
        alive,
        settled,
        task: RefCell::new(Some(task)),
    }
}

fn deliver<T: Clone + PartialEq + 'static>(value: &Observable<T>, next: T) {
    let written = value
        .runtime()
        .transaction(|| value.set(next))
        .and_then(|inner| inner);
    if let Err(err) = written {
        tracing::warn!(node = %value.id(), "async value dropped: {}", err);
    }
}

impl<T: Clone + 'static> AsyncObservable<T> {
    pub fn get(&self) -> Result<T, ReactiveError> {
        self.value.get()
    }

    pub fn read(&self, reader: &Reader) -> Result<T, ReactiveError> {
        self.value.read(reader)
    }

    pub fn id(&self) -> NodeId {
        self.value.id()
    }

    /// True once the future resolved or the stream ended.
    pub fn is_settled(&self) -> bool {
        self.settled.get()
    }

    /// Abort the task and remove the node.
    pub fn dispose(&self) {
        self.alive.set(false);
        if let Some(task) = self.task.borrow_mut().take() {
            task.abort();
        }
        self.value.dispose();
    }
}

impl<T: Clone + 'static> Readable for AsyncObservable<T> {
    type Value = T;

    fn node_id(&self) -> NodeId {
        self.value.id()
    }
}

impl<T: Clone + 'static> Disposable for AsyncObservable<T> {
    fn dispose(&self) {
        AsyncObservable::dispose(self);
    }
}

impl<T> fmt::Debug for AsyncObservable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncObservable")
            .field("value", &self.value)
            .field("alive", &self.alive.get())
            .field("settled", &self.settled.get())
            .finish()
    }
}
