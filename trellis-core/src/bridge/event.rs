//! Event bridge.
//!
//! Turns a push-based event source into an observable. Each event is
//! projected to a value and written in its own transaction.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use crate::error::ReactiveError;
use crate::graph::NodeId;
use crate::reactive::{Disposable, Observable, Readable, Reader, Runtime};

type Listener<E> = Rc<dyn Fn(&E)>;

/// Anything listeners can subscribe to.
pub trait EventSource<E> {
    fn subscribe(&self, listener: Box<dyn Fn(&E)>) -> Subscription;
}

/// Handle to a listener registration. Dropping it unsubscribes.
#[must_use = "the listener is removed as soon as the subscription is dropped"]
pub struct Subscription {
    unsubscribe: RefCell<Option<Box<dyn FnOnce()>>>,
}

impl Subscription {
    pub fn new(unsubscribe: impl FnOnce() + 'static) -> Self {
        Self {
            unsubscribe: RefCell::new(Some(Box::new(unsubscribe))),
        }
    }

    pub fn unsubscribe(&self) {
        let unsubscribe = self.unsubscribe.borrow_mut().take();
        if let Some(unsubscribe) = unsubscribe {
            unsubscribe();
        }
    }
}

impl Disposable for Subscription {
    fn dispose(&self) {
        self.unsubscribe();
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.unsubscribe.borrow().is_some())
            .finish()
    }
}

struct Listeners<E> {
    next_id: u64,
    entries: Vec<(u64, Listener<E>)>,
}

/// A simple in-process event source.
pub struct EventEmitter<E> {
    listeners: Rc<RefCell<Listeners<E>>>,
}

impl<E: 'static> EventEmitter<E> {
    pub fn new() -> Self {
        Self {
            listeners: Rc::new(RefCell::new(Listeners {
                next_id: 0,
                entries: Vec::new(),
            })),
        }
    }

    /// Deliver `event` to every listener registered at the time of the call.
    pub fn emit(&self, event: &E) {
        let snapshot: Vec<Listener<E>> = self
            .listeners
            .borrow()
            .entries
            .iter()
            .map(|(_, l)| Rc::clone(l))
            .collect();
        for listener in snapshot {
            listener(event);
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.borrow().entries.len()
    }
}

impl<E: 'static> Default for EventEmitter<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> Clone for EventEmitter<E> {
    fn clone(&self) -> Self {
        Self {
            listeners: Rc::clone(&self.listeners),
        }
    }
}

impl<E: 'static> EventSource<E> for EventEmitter<E> {
    fn subscribe(&self, listener: Box<dyn Fn(&E)>) -> Subscription {
        let id = {
            let mut listeners = self.listeners.borrow_mut();
            let id = listeners.next_id;
            listeners.next_id += 1;
            listeners.entries.push((id, Rc::from(listener)));
            id
        };
        let weak = Rc::downgrade(&self.listeners);
        Subscription::new(move || {
            if let Some(listeners) = weak.upgrade() {
                listeners.borrow_mut().entries.retain(|(i, _)| *i != id);
            }
        })
    }
}

/// An observable fed by an event source.
pub struct EventObservable<T> {
    value: Observable<T>,
    alive: Rc<Cell<bool>>,
    subscription: RefCell<Option<Subscription>>,
}

/// Create an observable holding `initial` until the first event, then the
/// projection of the latest event.
///
/// Events delivered after [`EventObservable::dispose`] are ignored.
pub fn from_event<E, T, S, P>(
    runtime: &Runtime,
    source: &S,
    initial: T,
    projector: P,
) -> EventObservable<T>
where
    E: 'static,
    T: Clone + PartialEq + 'static,
    S: EventSource<E> + ?Sized,
    P: Fn(&E) -> T + 'static,
{
    let value = Observable::new(runtime, initial);
    let alive = Rc::new(Cell::new(true));
    let listener_value = value.clone();
    let listener_alive = Rc::clone(&alive);
    let subscription = source.subscribe(Box::new(move |event: &E| {
        if !listener_alive.get() {
            return;
        }
        let next = projector(event);
        let written = listener_value
            .runtime()
            .transaction(|| listener_value.set(next))
            .and_then(|inner| inner);
        if let Err(err) = written {
            tracing::warn!(node = %listener_value.id(), "event dropped: {}", err);
        }
    }));
    EventObservable {
        value,
        alive,
        subscription: RefCell::new(Some(subscription)),
    }
}

impl<T: Clone + 'static> EventObservable<T> {
    pub fn get(&self) -> Result<T, ReactiveError> {
        self.value.get()
    }

    pub fn read(&self, reader: &Reader) -> Result<T, ReactiveError> {
        self.value.read(reader)
    }

    pub fn id(&self) -> NodeId {
        self.value.id()
    }

    /// Unsubscribe from the source and remove the node.
    pub fn dispose(&self) {
        self.alive.set(false);
        let subscription = self.subscription.borrow_mut().take();
        drop(subscription);
        self.value.dispose();
    }
}

impl<T: Clone + 'static> Readable for EventObservable<T> {
    type Value = T;

    fn node_id(&self) -> NodeId {
        self.value.id()
    }
}

impl<T: Clone + 'static> Disposable for EventObservable<T> {
    fn dispose(&self) {
        EventObservable::dispose(self);
    }
}

impl<T> fmt::Debug for EventObservable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventObservable")
            .field("value", &self.value)
            .field("alive", &self.alive.get())
            .finish()
    }
}
