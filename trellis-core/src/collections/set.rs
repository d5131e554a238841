//! Observable set.

use std::fmt;
use std::hash::Hash;
use std::marker::PhantomData;
use std::rc::Rc;

use indexmap::IndexSet;
use serde::Serialize;

use crate::error::ReactiveError;
use crate::graph::{Node, NodeId};
use crate::reactive::{
    autorun_handle_changes, collect_hints, Reaction, Readable, Reader, Runtime,
};

use super::never_equal;

/// A single change to an [`ObservableSet`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SetDelta<T> {
    Added(T),
    Removed(T),
}

/// An insertion-ordered set whose mutations notify observers.
///
/// Every effective mutation bumps the set's version and carries a
/// [`SetDelta`] hint for change handlers. Mutations that change nothing
/// (adding a present value, deleting an absent one) notify nobody.
pub struct ObservableSet<T> {
    runtime: Runtime,
    id: NodeId,
    marker: PhantomData<fn() -> T>,
}

impl<T: Clone + Eq + Hash + 'static> ObservableSet<T> {
    pub fn new(runtime: &Runtime) -> Self {
        Self::with_values(runtime, std::iter::empty())
    }

    pub fn with_values(runtime: &Runtime, values: impl IntoIterator<Item = T>) -> Self {
        let set: IndexSet<T> = values.into_iter().collect();
        let node = Node::source(Rc::new(set), never_equal(), false);
        Self {
            runtime: runtime.clone(),
            id: runtime.create_node(node),
            marker: PhantomData,
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Add `value`. Returns false if it was already present.
    pub fn add(&self, value: T) -> Result<bool, ReactiveError> {
        let deltas = self.runtime.modify(self.id, |set: &mut IndexSet<T>| {
            if set.insert(value.clone()) {
                vec![SetDelta::Added(value)]
            } else {
                Vec::new()
            }
        })?;
        Ok(!deltas.is_empty())
    }

    /// Remove `value`. Returns false if it was absent.
    pub fn delete(&self, value: &T) -> Result<bool, ReactiveError> {
        let deltas = self.runtime.modify(self.id, |set: &mut IndexSet<T>| {
            match set.shift_take(value) {
                Some(removed) => vec![SetDelta::Removed(removed)],
                None => Vec::new(),
            }
        })?;
        Ok(!deltas.is_empty())
    }

    /// Add every value in one notification. Returns how many were new.
    pub fn extend(&self, values: impl IntoIterator<Item = T>) -> Result<usize, ReactiveError> {
        let deltas = self.runtime.modify(self.id, |set: &mut IndexSet<T>| {
            values
                .into_iter()
                .filter(|v| set.insert(v.clone()))
                .map(SetDelta::Added)
                .collect::<Vec<_>>()
        })?;
        Ok(deltas.len())
    }

    pub fn clear(&self) -> Result<(), ReactiveError> {
        self.runtime.modify(self.id, |set: &mut IndexSet<T>| {
            set.drain(..).map(SetDelta::Removed).collect::<Vec<_>>()
        })?;
        Ok(())
    }

    /// Current contents, untracked.
    pub fn snapshot(&self) -> Result<Rc<IndexSet<T>>, ReactiveError> {
        let value = self.runtime.read_untracked(self.id)?;
        value
            .downcast::<IndexSet<T>>()
            .map_err(|_| ReactiveError::TypeMismatch { node: self.id })
    }

    /// Current contents, recorded as a dependency.
    pub fn read(&self, reader: &Reader) -> Result<Rc<IndexSet<T>>, ReactiveError> {
        reader.read_rc(self.id)
    }

    pub fn has(&self, reader: &Reader, value: &T) -> Result<bool, ReactiveError> {
        Ok(self.read(reader)?.contains(value))
    }

    pub fn values(&self, reader: &Reader) -> Result<Vec<T>, ReactiveError> {
        Ok(self.read(reader)?.iter().cloned().collect())
    }

    pub fn len(&self, reader: &Reader) -> Result<usize, ReactiveError> {
        Ok(self.read(reader)?.len())
    }

    /// Subscribe to the deltas of this set.
    ///
    /// The callback first receives the current contents as `Added` deltas
    /// (if any), then one call per transaction with every delta made in it.
    pub fn on_delta<F>(&self, callback: F) -> Reaction
    where
        F: FnMut(&[SetDelta<T>]) -> Result<(), ReactiveError> + 'static,
    {
        let mut callback = callback;
        let mut initial = true;
        let id = self.id;
        autorun_handle_changes(
            &self.runtime,
            Vec::new,
            collect_hints::<_, SetDelta<T>>(self),
            move |reader, deltas| {
                let set = reader.read_rc::<IndexSet<T>>(id)?;
                if std::mem::take(&mut initial) {
                    let added: Vec<_> = set.iter().cloned().map(SetDelta::Added).collect();
                    if added.is_empty() {
                        return Ok(());
                    }
                    return callback(&added);
                }
                if deltas.is_empty() {
                    return Ok(());
                }
                callback(&deltas)
            },
        )
    }

    pub fn dispose(&self) {
        self.runtime.dispose_node(self.id);
    }
}

impl<T> Clone for ObservableSet<T> {
    fn clone(&self) -> Self {
        Self {
            runtime: self.runtime.clone(),
            id: self.id,
            marker: PhantomData,
        }
    }
}

impl<T: Clone + Eq + Hash + 'static> Readable for ObservableSet<T> {
    type Value = IndexSet<T>;

    fn node_id(&self) -> NodeId {
        self.id
    }
}

impl<T> fmt::Debug for ObservableSet<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObservableSet").field("id", &self.id).finish()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};

    use super::*;
    use crate::reactive::{autorun, Derived};

    #[test]
    fn add_and_delete() {
        let rt = Runtime::new();
        let set = ObservableSet::new(&rt);
        assert!(set.add("a").unwrap());
        assert!(!set.add("a").unwrap());
        assert!(set.add("b").unwrap());
        assert!(set.delete(&"a").unwrap());
        assert!(!set.delete(&"z").unwrap());

        let snapshot = set.snapshot().unwrap();
        assert_eq!(snapshot.iter().copied().collect::<Vec<_>>(), vec!["b"]);
    }

    #[test]
    fn noop_mutations_do_not_notify() {
        let rt = Runtime::new();
        let set = ObservableSet::with_values(&rt, [1, 2]);
        let runs = Rc::new(Cell::new(0));
        let (set2, runs2) = (set.clone(), runs.clone());
        let _r = autorun(&rt, move |r| {
            set2.len(r)?;
            runs2.set(runs2.get() + 1);
            Ok(())
        });

        set.add(1).unwrap();
        set.delete(&3).unwrap();
        assert_eq!(runs.get(), 1);
        set.add(3).unwrap();
        assert_eq!(runs.get(), 2);
    }

    #[test]
    fn derived_over_set() {
        let rt = Runtime::new();
        let set = ObservableSet::with_values(&rt, [1, 2, 3]);
        let set2 = set.clone();
        let sum = Derived::new(&rt, move |r| Ok(set2.read(r)?.iter().sum::<i32>()));
        assert_eq!(sum.get(), Ok(6));
        set.extend([4, 5]).unwrap();
        assert_eq!(sum.get(), Ok(15));
        set.clear().unwrap();
        assert_eq!(sum.get(), Ok(0));
    }

    #[test]
    fn deltas_are_batched_per_transaction() {
        let rt = Runtime::new();
        let set = ObservableSet::with_values(&rt, ["x"]);
        let seen = Rc::new(RefCell::new(Vec::new()));
        let seen2 = seen.clone();
        let _sub = set.on_delta(move |deltas| {
            seen2.borrow_mut().push(deltas.to_vec());
            Ok(())
        });

        rt.transaction(|| {
            set.add("y").unwrap();
            set.delete(&"x").unwrap();
        })
        .unwrap();
        set.add("y").unwrap();

        assert_eq!(
            *seen.borrow(),
            vec![
                vec![SetDelta::Added("x")],
                vec![SetDelta::Added("y"), SetDelta::Removed("x")],
            ]
        );
    }
}
