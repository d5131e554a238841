//! Observable map.

use std::fmt;
use std::hash::Hash;
use std::marker::PhantomData;
use std::rc::Rc;

use indexmap::IndexMap;
use serde::Serialize;

use crate::error::ReactiveError;
use crate::graph::{Node, NodeId};
use crate::reactive::{
    autorun_handle_changes, collect_hints, Reaction, Readable, Reader, Runtime,
};

use super::never_equal;

/// A single change to an [`ObservableMap`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MapDelta<K, V> {
    Added { key: K, value: V },
    Removed { key: K, value: V },
    Updated { key: K, old: V, new: V },
}

impl<K, V> MapDelta<K, V> {
    pub fn key(&self) -> &K {
        match self {
            MapDelta::Added { key, .. }
            | MapDelta::Removed { key, .. }
            | MapDelta::Updated { key, .. } => key,
        }
    }
}

/// An insertion-ordered map whose mutations notify observers.
///
/// Inserting a value equal to the one already stored under the key is a
/// no-op and notifies nobody.
pub struct ObservableMap<K, V> {
    runtime: Runtime,
    id: NodeId,
    marker: PhantomData<fn() -> (K, V)>,
}

impl<K, V> ObservableMap<K, V>
where
    K: Clone + Eq + Hash + 'static,
    V: Clone + PartialEq + 'static,
{
    pub fn new(runtime: &Runtime) -> Self {
        Self::with_entries(runtime, std::iter::empty())
    }

    pub fn with_entries(runtime: &Runtime, entries: impl IntoIterator<Item = (K, V)>) -> Self {
        let map: IndexMap<K, V> = entries.into_iter().collect();
        let node = Node::source(Rc::new(map), never_equal(), false);
        Self {
            runtime: runtime.clone(),
            id: runtime.create_node(node),
            marker: PhantomData,
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Insert or replace the value under `key`, returning the previous one.
    pub fn insert(&self, key: K, value: V) -> Result<Option<V>, ReactiveError> {
        let mut previous = None;
        self.runtime.modify(self.id, |map: &mut IndexMap<K, V>| {
            match map.get_mut(&key) {
                Some(slot) if *slot == value => {
                    previous = Some(slot.clone());
                    Vec::new()
                }
                Some(slot) => {
                    let old = std::mem::replace(slot, value.clone());
                    previous = Some(old.clone());
                    vec![MapDelta::Updated {
                        key,
                        old,
                        new: value,
                    }]
                }
                None => {
                    map.insert(key.clone(), value.clone());
                    vec![MapDelta::Added { key, value }]
                }
            }
        })?;
        Ok(previous)
    }

    /// Remove `key`, returning its value if it was present.
    pub fn remove(&self, key: &K) -> Result<Option<V>, ReactiveError> {
        let deltas = self.runtime.modify(self.id, |map: &mut IndexMap<K, V>| {
            match map.shift_remove_entry(key) {
                Some((key, value)) => vec![MapDelta::Removed { key, value }],
                None => Vec::new(),
            }
        })?;
        Ok(deltas.into_iter().next().and_then(|d| match d {
            MapDelta::Removed { value, .. } => Some(value),
            _ => None,
        }))
    }

    pub fn clear(&self) -> Result<(), ReactiveError> {
        self.runtime.modify(self.id, |map: &mut IndexMap<K, V>| {
            map.drain(..)
                .map(|(key, value)| MapDelta::Removed { key, value })
                .collect::<Vec<_>>()
        })?;
        Ok(())
    }

    /// Current contents, untracked.
    pub fn snapshot(&self) -> Result<Rc<IndexMap<K, V>>, ReactiveError> {
        self.runtime
            .read_untracked(self.id)?
            .downcast::<IndexMap<K, V>>()
            .map_err(|_| ReactiveError::TypeMismatch { node: self.id })
    }

    /// Current contents, recorded as a dependency.
    pub fn read(&self, reader: &Reader) -> Result<Rc<IndexMap<K, V>>, ReactiveError> {
        reader.read_rc(self.id)
    }

    pub fn get(&self, reader: &Reader, key: &K) -> Result<Option<V>, ReactiveError> {
        Ok(self.read(reader)?.get(key).cloned())
    }

    pub fn contains_key(&self, reader: &Reader, key: &K) -> Result<bool, ReactiveError> {
        Ok(self.read(reader)?.contains_key(key))
    }

    pub fn keys(&self, reader: &Reader) -> Result<Vec<K>, ReactiveError> {
        Ok(self.read(reader)?.keys().cloned().collect())
    }

    pub fn values(&self, reader: &Reader) -> Result<Vec<V>, ReactiveError> {
        Ok(self.read(reader)?.values().cloned().collect())
    }

    pub fn len(&self, reader: &Reader) -> Result<usize, ReactiveError> {
        Ok(self.read(reader)?.len())
    }

    /// Subscribe to the deltas of this map.
    ///
    /// The callback first receives the current entries as `Added` deltas
    /// (if any), then one call per transaction with every delta made in it.
    pub fn on_delta<F>(&self, callback: F) -> Reaction
    where
        F: FnMut(&[MapDelta<K, V>]) -> Result<(), ReactiveError> + 'static,
    {
        let mut callback = callback;
        let mut initial = true;
        let id = self.id;
        autorun_handle_changes(
            &self.runtime,
            Vec::new,
            collect_hints::<_, MapDelta<K, V>>(self),
            move |reader, deltas| {
                let map = reader.read_rc::<IndexMap<K, V>>(id)?;
                if std::mem::take(&mut initial) {
                    let added: Vec<_> = map
                        .iter()
                        .map(|(key, value)| MapDelta::Added {
                            key: key.clone(),
                            value: value.clone(),
                        })
                        .collect();
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

impl<K, V> Clone for ObservableMap<K, V> {
    fn clone(&self) -> Self {
        Self {
            runtime: self.runtime.clone(),
            id: self.id,
            marker: PhantomData,
        }
    }
}

impl<K, V> Readable for ObservableMap<K, V>
where
    K: Clone + Eq + Hash + 'static,
    V: Clone + 'static,
{
    type Value = IndexMap<K, V>;

    fn node_id(&self) -> NodeId {
        self.id
    }
}

impl<K, V> fmt::Debug for ObservableMap<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObservableMap").field("id", &self.id).finish()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};

    use super::*;
    use crate::reactive::autorun;

    #[test]
    fn insert_reports_previous_value() {
        let rt = Runtime::new();
        let map = ObservableMap::new(&rt);
        assert_eq!(map.insert("a", 1).unwrap(), None);
        assert_eq!(map.insert("a", 2).unwrap(), Some(1));
        assert_eq!(map.remove(&"a").unwrap(), Some(2));
        assert_eq!(map.remove(&"a").unwrap(), None);
    }

    #[test]
    fn equal_insert_does_not_notify() {
        let rt = Runtime::new();
        let map = ObservableMap::with_entries(&rt, [("a", 1)]);
        let runs = Rc::new(Cell::new(0));
        let (map2, runs2) = (map.clone(), runs.clone());
        let _r = autorun(&rt, move |r| {
            map2.get(r, &"a")?;
            runs2.set(runs2.get() + 1);
            Ok(())
        });

        assert_eq!(map.insert("a", 1).unwrap(), Some(1));
        assert_eq!(runs.get(), 1);
        map.insert("a", 5).unwrap();
        assert_eq!(runs.get(), 2);
    }

    #[test]
    fn deltas_describe_each_mutation() {
        let rt = Runtime::new();
        let map = ObservableMap::with_entries(&rt, [("a", 1), ("b", 2)]);
        let seen = Rc::new(RefCell::new(Vec::new()));
        let seen2 = seen.clone();
        let _sub = map.on_delta(move |deltas| {
            seen2.borrow_mut().extend(deltas.iter().cloned());
            Ok(())
        });
        seen.borrow_mut().clear();

        rt.transaction(|| {
            map.insert("a", 10).unwrap();
            map.insert("c", 3).unwrap();
            map.remove(&"b").unwrap();
        })
        .unwrap();

        assert_eq!(
            *seen.borrow(),
            vec![
                MapDelta::Updated { key: "a", old: 1, new: 10 },
                MapDelta::Added { key: "c", value: 3 },
                MapDelta::Removed { key: "b", value: 2 },
            ]
        );
        assert_eq!(seen.borrow()[2].key(), &"b");
    }

    #[test]
    fn keys_keep_insertion_order() {
        let rt = Runtime::new();
        let map = ObservableMap::with_entries(&rt, [("z", 1), ("a", 2)]);
        let map2 = map.clone();
        let keys = crate::reactive::Derived::new(&rt, move |r| map2.keys(r));
        assert_eq!(keys.get(), Ok(vec!["z", "a"]));
        map.insert("m", 3).unwrap();
        assert_eq!(keys.get(), Ok(vec!["z", "a", "m"]));
    }
}
