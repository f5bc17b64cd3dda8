//! `RSet<E>`: an observable, insertion-ordered set.

use std::cell::RefCell;
use std::collections::HashMap;
use std::hash::Hash;

use indexmap::IndexSet;

use crate::connection::Connection;
use crate::error::Result;
use crate::reactor::Reactor;
use crate::value::Value;

/// A structural change to an `RSet`.
#[derive(Debug, Clone)]
pub enum SetChange<E> {
    /// `elem` was inserted.
    Added(E),
    /// `elem` was removed.
    Removed(E),
}

/// An observable, insertion-ordered set of `E`.
pub struct RSet<E> {
    items: IndexSet<E>,
    reactor: Reactor<SetChange<E>>,
    size_view: Value<usize>,
    member_views: RefCell<HashMap<E, Value<bool>>>,
}

impl<E: Eq + Hash + Clone + 'static> Default for RSet<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Eq + Hash + Clone + 'static> RSet<E> {
    /// Create an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::wrap(IndexSet::new())
    }

    /// Wrap an existing set as the initial contents.
    #[must_use]
    pub fn wrap(items: IndexSet<E>) -> Self {
        let size_view = Value::new(items.len());
        Self {
            items,
            reactor: Reactor::new(),
            size_view,
            member_views: RefCell::new(HashMap::new()),
        }
    }

    /// Number of elements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// `true` if empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// `true` if `elem` is a member.
    #[must_use]
    pub fn contains(&self, elem: &E) -> bool {
        self.items.contains(elem)
    }

    fn after_mutation(&self, change: &SetChange<E>) -> Result<()> {
        let result = self.reactor.notify(change);
        self.size_view.update(self.items.len()).ok();
        let elem = match change {
            SetChange::Added(e) | SetChange::Removed(e) => e,
        };
        if let Some(view) = self.member_views.borrow().get(elem) {
            view.update(self.items.contains(elem)).ok();
        }
        result
    }

    /// Insert `elem`, emitting `SetChange::Added` iff it wasn't already a member.
    ///
    /// # Errors
    /// Returns the aggregated failures (if any) reported by listeners.
    pub fn add(&mut self, elem: E) -> Result<bool> {
        if !self.items.insert(elem.clone()) {
            return Ok(false);
        }
        self.after_mutation(&SetChange::Added(elem))?;
        Ok(true)
    }

    /// Insert `elem`, unconditionally emitting `SetChange::Added` even if it was already a
    /// member.
    ///
    /// # Errors
    /// Returns the aggregated failures (if any) reported by listeners.
    pub fn add_force(&mut self, elem: E) -> Result<()> {
        self.items.insert(elem.clone());
        self.after_mutation(&SetChange::Added(elem))
    }

    /// Remove `elem`, emitting `SetChange::Removed` iff it was a member.
    ///
    /// # Errors
    /// Returns the aggregated failures (if any) reported by listeners.
    pub fn remove(&mut self, elem: &E) -> Result<bool> {
        if !self.items.shift_remove(elem) {
            return Ok(false);
        }
        self.after_mutation(&SetChange::Removed(elem.clone()))?;
        Ok(true)
    }

    /// Remove `elem` unconditionally, emitting `SetChange::Removed` even if it was never a
    /// member.
    ///
    /// # Errors
    /// Returns the aggregated failures (if any) reported by listeners.
    pub fn remove_force(&mut self, elem: E) -> Result<()> {
        self.items.shift_remove(&elem);
        self.after_mutation(&SetChange::Removed(elem))
    }

    /// Remove all elements, emitting one `SetChange::Removed` per element (snapshot-then-clear).
    ///
    /// # Errors
    /// Returns the aggregated failures (if any) reported by listeners.
    pub fn clear(&mut self) -> Result<()> {
        let removed = std::mem::take(&mut self.items);
        let mut failures = Vec::new();
        for elem in removed {
            if let Err(err) = self.after_mutation(&SetChange::Removed(elem)) {
                failures.push(err);
            }
        }
        match crate::error::ReactiveError::from_many(failures) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Register an infallible listener for structural changes.
    pub fn connect(&self, listener: impl FnMut(&SetChange<E>) + 'static) -> Connection {
        self.reactor.connect(listener)
    }

    /// Register a listener invoked once per current member (as synthetic `Added` events)
    /// immediately, then again on every subsequent change.
    pub fn connect_notify(&self, mut listener: impl FnMut(&SetChange<E>) + 'static) -> Connection {
        for elem in &self.items {
            listener(&SetChange::Added(elem.clone()));
        }
        self.reactor.connect(listener)
    }

    /// A reactive view of this set's current size.
    #[must_use]
    pub fn size_view(&self) -> Value<usize> {
        self.size_view.clone()
    }

    /// A derived `Value<bool>` tracking whether `elem` is a member, updated on every
    /// `Added`/`Removed` for that element.
    #[must_use]
    pub fn contains_view(&self, elem: &E) -> Value<bool> {
        if let Some(existing) = self.member_views.borrow().get(elem) {
            return existing.clone();
        }
        let view = Value::new(self.items.contains(elem));
        self.member_views.borrow_mut().insert(elem.clone(), view.clone());
        view
    }
}
