//! `RList<E>`: an observable, order-preserving sequence.

use crate::connection::Connection;
use crate::error::Result;
use crate::reactor::Reactor;
use crate::value::Value;

/// A structural change to an `RList`.
#[derive(Debug, Clone)]
pub enum ListChange<E> {
    /// An element was inserted at this index.
    Added(usize, E),
    /// The element at this index was replaced; carries the new and old value.
    Updated(usize, E, E),
    /// An element was removed. The index is `None` when the removal was forced on an element that
    /// was never actually present (`remove_force` on a missing value).
    Removed(Option<usize>, E),
}

/// An observable, order-preserving sequence of `E`.
pub struct RList<E> {
    items: Vec<E>,
    reactor: Reactor<ListChange<E>>,
    size_view: Value<usize>,
}

impl<E: Clone + PartialEq + 'static> Default for RList<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Clone + PartialEq + 'static> RList<E> {
    /// Create an empty list.
    #[must_use]
    pub fn new() -> Self {
        Self::wrap(Vec::new())
    }

    /// Wrap an existing `Vec` as the initial contents.
    #[must_use]
    pub fn wrap(items: Vec<E>) -> Self {
        let size_view = Value::new(items.len());
        Self {
            items,
            reactor: Reactor::new(),
            size_view,
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

    /// Read the element at `index`, if present.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&E> {
        self.items.get(index)
    }

    /// Borrow the full backing slice.
    #[must_use]
    pub fn as_slice(&self) -> &[E] {
        &self.items
    }

    fn notify_and_sync_size(&self, change: &ListChange<E>) -> Result<()> {
        let result = self.reactor.notify(change);
        self.size_view.update(self.items.len()).ok();
        result
    }

    /// Append `elem` to the end, emitting `ListChange::Added`.
    ///
    /// # Errors
    /// Returns the aggregated failures (if any) reported by listeners.
    pub fn add(&mut self, elem: E) -> Result<()> {
        self.items.push(elem.clone());
        let index = self.items.len().saturating_sub(1);
        self.notify_and_sync_size(&ListChange::Added(index, elem))
    }

    /// Insert `elem` at `index`, emitting `ListChange::Added`.
    ///
    /// # Errors
    /// Returns the aggregated failures (if any) reported by listeners.
    pub fn insert(&mut self, index: usize, elem: E) -> Result<()> {
        self.items.insert(index, elem.clone());
        self.notify_and_sync_size(&ListChange::Added(index, elem))
    }

    /// Replace the element at `index`, emitting `ListChange::Updated`.
    ///
    /// # Errors
    /// Returns the aggregated failures (if any) reported by listeners. Also returns an
    /// `IllegalState` error if `index` is out of bounds.
    pub fn set(&mut self, index: usize, value: E) -> Result<()> {
        let Some(slot) = self.items.get_mut(index) else {
            return Err(crate::error::ReactiveError::IllegalState(format!(
                "RList::set index {index} out of bounds"
            )));
        };
        let old = std::mem::replace(slot, value.clone());
        self.notify_and_sync_size(&ListChange::Updated(index, value, old))
    }

    /// Remove and return the element at `index`, emitting `ListChange::Removed`.
    ///
    /// # Errors
    /// Returns the aggregated failures (if any) reported by listeners. Also returns an
    /// `IllegalState` error if `index` is out of bounds.
    pub fn remove_at(&mut self, index: usize) -> Result<E> {
        if index >= self.items.len() {
            return Err(crate::error::ReactiveError::IllegalState(format!(
                "RList::remove_at index {index} out of bounds"
            )));
        }
        let removed = self.items.remove(index);
        self.notify_and_sync_size(&ListChange::Removed(Some(index), removed.clone()))?;
        Ok(removed)
    }

    /// Remove the first occurrence of `elem` (by `PartialEq`). Returns `true` and emits iff found.
    ///
    /// # Errors
    /// Returns the aggregated failures (if any) reported by listeners.
    pub fn remove(&mut self, elem: &E) -> Result<bool> {
        let Some(index) = self.items.iter().position(|existing| existing == elem) else {
            return Ok(false);
        };
        self.remove_at(index)?;
        Ok(true)
    }

    /// Remove the first occurrence of `elem` if present; unconditionally emits
    /// `ListChange::Removed`, with a `None` index if `elem` was never present.
    ///
    /// # Errors
    /// Returns the aggregated failures (if any) reported by listeners.
    pub fn remove_force(&mut self, elem: E) -> Result<()> {
        let position = self.items.iter().position(|existing| existing == &elem);
        if let Some(index) = position {
            self.items.remove(index);
            self.notify_and_sync_size(&ListChange::Removed(Some(index), elem))
        } else {
            self.notify_and_sync_size(&ListChange::Removed(None, elem))
        }
    }

    /// Remove all elements, emitting one `ListChange::Removed` per element (snapshot-then-clear,
    /// so the backing store is already empty during each emission).
    ///
    /// # Errors
    /// Returns the aggregated failures (if any) reported by listeners.
    pub fn clear(&mut self) -> Result<()> {
        let removed = std::mem::take(&mut self.items);
        let mut failures = Vec::new();
        for elem in removed {
            if let Err(err) = self.notify_and_sync_size(&ListChange::Removed(None, elem)) {
                failures.push(err);
            }
        }
        match crate::error::ReactiveError::from_many(failures) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Register an infallible listener for structural changes.
    pub fn connect(&self, listener: impl FnMut(&ListChange<E>) + 'static) -> Connection {
        self.reactor.connect(listener)
    }

    /// Register a listener that is invoked once per current element (as synthetic `Added`
    /// events) immediately, and again on every subsequent change.
    pub fn connect_notify(&self, mut listener: impl FnMut(&ListChange<E>) + 'static) -> Connection
    where
        E: Clone,
    {
        for (index, elem) in self.items.iter().enumerate() {
            listener(&ListChange::Added(index, elem.clone()));
        }
        self.reactor.connect(listener)
    }

    /// A reactive view of this list's current size.
    #[must_use]
    pub fn size_view(&self) -> Value<usize> {
        self.size_view.clone()
    }
}
