//! `RMap<K, V>`: an observable, insertion-ordered key/value store.

use std::cell::RefCell;
use std::collections::HashMap;
use std::hash::Hash;

use indexmap::IndexMap;

use crate::connection::Connection;
use crate::error::Result;
use crate::reactor::Reactor;
use crate::value::Value;

/// A structural change to an `RMap`.
#[derive(Debug, Clone)]
pub enum MapChange<K, V> {
    /// A key was inserted or its value replaced. `old` is `None` for a fresh key.
    Put(K, V, Option<V>),
    /// A key was removed. Only emitted when the key was actually present.
    Removed(K, V),
}

/// An observable, insertion-ordered map from `K` to `V`.
pub struct RMap<K, V> {
    items: IndexMap<K, V>,
    reactor: Reactor<MapChange<K, V>>,
    size_view: Value<usize>,
    key_views: RefCell<HashMap<K, (Value<bool>, Value<Option<V>>)>>,
}

impl<K: Eq + Hash + Clone + 'static, V: Clone + PartialEq + 'static> Default for RMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Eq + Hash + Clone + 'static, V: Clone + PartialEq + 'static> RMap<K, V> {
    /// Create an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::wrap(IndexMap::new())
    }

    /// Wrap an existing map as the initial contents.
    #[must_use]
    pub fn wrap(items: IndexMap<K, V>) -> Self {
        let size_view = Value::new(items.len());
        Self {
            items,
            reactor: Reactor::new(),
            size_view,
            key_views: RefCell::new(HashMap::new()),
        }
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// `true` if empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Read the value for `key`, if present.
    #[must_use]
    pub fn get(&self, key: &K) -> Option<&V> {
        self.items.get(key)
    }

    /// Read the value for `key`, or `default` if absent, without borrowing the map.
    #[must_use]
    pub fn get_or_else(&self, key: &K, default: impl FnOnce() -> V) -> V {
        self.items.get(key).cloned().unwrap_or_else(default)
    }

    /// `true` if `key` is present.
    #[must_use]
    pub fn contains_key(&self, key: &K) -> bool {
        self.items.contains_key(key)
    }

    fn after_mutation(&self, change: &MapChange<K, V>) -> Result<()> {
        let result = self.reactor.notify(change);
        self.size_view.update(self.items.len()).ok();
        let key = match change {
            MapChange::Put(k, ..) | MapChange::Removed(k, ..) => k,
        };
        if let Some((present_view, value_view)) = self.key_views.borrow().get(key) {
            present_view.update(self.items.contains_key(key)).ok();
            value_view.update(self.items.get(key).cloned()).ok();
        }
        result
    }

    /// Insert or replace `key`'s value, emitting `MapChange::Put` iff the value actually
    /// differs from the previous one (or the key was absent).
    ///
    /// # Errors
    /// Returns the aggregated failures (if any) reported by listeners.
    pub fn put(&mut self, key: K, value: V) -> Result<()> {
        let old = self.items.get(&key).cloned();
        if old.as_ref() == Some(&value) {
            return Ok(());
        }
        self.items.insert(key.clone(), value.clone());
        self.after_mutation(&MapChange::Put(key, value, old))
    }

    /// Insert or replace `key`'s value, unconditionally emitting `MapChange::Put`.
    ///
    /// # Errors
    /// Returns the aggregated failures (if any) reported by listeners.
    pub fn put_force(&mut self, key: K, value: V) -> Result<()> {
        let old = self.items.insert(key.clone(), value.clone());
        self.after_mutation(&MapChange::Put(key, value, old))
    }

    /// Remove `key`, emitting `MapChange::Removed` iff it was present.
    ///
    /// # Errors
    /// Returns the aggregated failures (if any) reported by listeners.
    pub fn remove(&mut self, key: &K) -> Result<bool> {
        let Some(old) = self.items.shift_remove(key) else {
            return Ok(false);
        };
        self.after_mutation(&MapChange::Removed(key.clone(), old))?;
        Ok(true)
    }

    /// Remove `key` unconditionally; a no-op (no emission) if it was never present, matching
    /// `RList::remove_force`'s "emit only on an actual change or a synthetic one" split, except
    /// the map variant has nothing meaningful to emit for a key that was never present, so unlike
    /// the list it simply reports `false`.
    ///
    /// # Errors
    /// Returns the aggregated failures (if any) reported by listeners.
    pub fn remove_force(&mut self, key: &K) -> Result<bool> {
        self.remove(key)
    }

    /// Remove all entries, emitting one `MapChange::Removed` per entry (snapshot-then-clear).
    ///
    /// # Errors
    /// Returns the aggregated failures (if any) reported by listeners.
    pub fn clear(&mut self) -> Result<()> {
        let removed = std::mem::take(&mut self.items);
        let mut failures = Vec::new();
        for (key, value) in removed {
            if let Err(err) = self.after_mutation(&MapChange::Removed(key, value)) {
                failures.push(err);
            }
        }
        match crate::error::ReactiveError::from_many(failures) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Register an infallible listener for structural changes.
    pub fn connect(&self, listener: impl FnMut(&MapChange<K, V>) + 'static) -> Connection {
        self.reactor.connect(listener)
    }

    /// Register a listener invoked once per current entry (as synthetic `Put` events)
    /// immediately, then again on every subsequent change.
    pub fn connect_notify(&self, mut listener: impl FnMut(&MapChange<K, V>) + 'static) -> Connection {
        for (key, value) in &self.items {
            listener(&MapChange::Put(key.clone(), value.clone(), None));
        }
        self.reactor.connect(listener)
    }

    /// A reactive view of this map's current size.
    #[must_use]
    pub fn size_view(&self) -> Value<usize> {
        self.size_view.clone()
    }

    fn key_view_pair(&self, key: &K) -> (Value<bool>, Value<Option<V>>) {
        if let Some(existing) = self.key_views.borrow().get(key) {
            return existing.clone();
        }
        let present = Value::new(self.items.contains_key(key));
        let value = Value::new(self.items.get(key).cloned());
        self.key_views
            .borrow_mut()
            .insert(key.clone(), (present.clone(), value.clone()));
        (present, value)
    }

    /// A derived `Value<bool>` tracking whether `key` is present, updated on `Put`/`Removed`.
    #[must_use]
    pub fn contains_key_view(&self, key: &K) -> Value<bool> {
        self.key_view_pair(key).0
    }

    /// A derived `Value<Option<V>>` tracking `key`'s current value, updated on every
    /// `Put`/`Removed` for that key.
    #[must_use]
    pub fn get_view(&self, key: &K) -> Value<Option<V>> {
        self.key_view_pair(key).1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_skips_notify_when_value_unchanged() {
        let mut map: RMap<&str, i32> = RMap::new();
        map.put("a", 1).expect("no failures");
        let count = std::rc::Rc::new(std::cell::RefCell::new(0));
        let count_clone = std::rc::Rc::clone(&count);
        let _conn = map.connect(move |_| *count_clone.borrow_mut() += 1);

        map.put("a", 1).expect("no failures");
        assert_eq!(*count.borrow(), 0);
        map.put("a", 2).expect("no failures");
        assert_eq!(*count.borrow(), 1);
    }

    #[test]
    fn get_view_tracks_key() {
        let mut map: RMap<&str, i32> = RMap::new();
        let view = map.get_view("a");
        assert_eq!(view.get(), None);

        map.put("a", 5).expect("no failures");
        assert_eq!(view.get(), Some(5));

        map.remove(&"a").expect("no failures");
        assert_eq!(view.get(), None);
    }

    #[test]
    fn contains_key_view_tracks_presence() {
        let mut map: RMap<&str, i32> = RMap::new();
        let present = map.contains_key_view("a");
        assert!(!present.get());
        map.put("a", 1).expect("no failures");
        assert!(present.get());
        map.remove(&"a").expect("no failures");
        assert!(!present.get());
    }
}
