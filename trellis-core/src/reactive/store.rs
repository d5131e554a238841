//! Disposable resource scopes.
//!
//! Every reaction run gets a fresh [`DisposableStore`]. Anything registered
//! in it (subscriptions, nested reactions, cleanup callbacks) is released
//! right before the next run and when the reaction is disposed.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// Something that holds resources and can release them.
pub trait Disposable {
    fn dispose(&self);
}

#[derive(Default)]
struct StoreInner {
    items: Vec<Box<dyn FnOnce()>>,
    disposed: bool,
}

/// A scope of resources released together, last registered first.
///
/// Clones share the same scope. Disposal is idempotent; anything added to a
/// store that is already disposed is released immediately.
#[derive(Clone, Default)]
pub struct DisposableStore {
    inner: Rc<RefCell<StoreInner>>,
}

impl DisposableStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take ownership of a resource until the store is disposed.
    pub fn add<D: Disposable + 'static>(&self, item: D) {
        self.on_dispose(move || item.dispose());
    }

    /// Run `f` when the store is disposed.
    pub fn on_dispose(&self, f: impl FnOnce() + 'static) {
        let mut inner = self.inner.borrow_mut();
        if inner.disposed {
            drop(inner);
            f();
            return;
        }
        inner.items.push(Box::new(f));
    }

    pub fn dispose(&self) {
        let items = {
            let mut inner = self.inner.borrow_mut();
            if inner.disposed {
                return;
            }
            inner.disposed = true;
            std::mem::take(&mut inner.items)
        };
        // Callbacks run without the store borrowed; they may add to it.
        for item in items.into_iter().rev() {
            item();
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.borrow().disposed
    }

    pub fn len(&self) -> usize {
        self.inner.borrow().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Disposable for DisposableStore {
    fn dispose(&self) {
        DisposableStore::dispose(self);
    }
}

impl fmt::Debug for DisposableStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("DisposableStore")
            .field("items", &inner.items.len())
            .field("disposed", &inner.disposed)
            .finish()
    }
}

// ---- Tests ----
