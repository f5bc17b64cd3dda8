//! `Closeable`: a single-method disposal capability, and `CloseableSet` for aggregating them.
//!
//! The logical-aggregation combinators named alongside this module (`and`/`or`/`not`/`toggler`/
//! `as_value`) operate on `Value<bool>` rather than on a `Closeable`, so they live in
//! `crate::value` next to the type they return.

use std::cell::RefCell;

use crate::error::{ReactiveError, Result};

/// Anything that can be torn down exactly once.
///
/// `crate::connection::Connection` satisfies this shape informally (`close` takes `&self` and is
/// idempotent); `Closeable` exists separately so non-connection resources (a `CloseableSet`
/// itself, an embedder's own disposable handle) can be composed the same way.
pub trait Closeable {
    /// Tear down this resource. Implementations must tolerate being called more than once.
    ///
    /// # Errors
    /// Returns any failure encountered while tearing down.
    fn close(&self) -> Result<()>;
}

/// A closeable that does nothing, for the "uninitialized"/placeholder pattern.
pub struct Noop;

impl Closeable for Noop {
    fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// The shared `NOOP` instance.
pub const NOOP: Noop = Noop;

/// Aggregates several `Closeable`s; closing the set closes each member in turn, accumulates any
/// failures into a single `ReactiveError::MultiFailure`, clears its contents, and then re-raises
/// the aggregate.
#[derive(Default)]
pub struct CloseableSet {
    members: RefCell<Vec<Box<dyn Closeable>>>,
}

impl CloseableSet {
    /// Create an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self {
            members: RefCell::new(Vec::new()),
        }
    }

    /// Add a member to be closed when this set closes.
    pub fn add(&self, closeable: impl Closeable + 'static) {
        self.members.borrow_mut().push(Box::new(closeable));
    }
}

impl Closeable for CloseableSet {
    fn close(&self) -> Result<()> {
        let members = std::mem::take(&mut *self.members.borrow_mut());
        let mut failures = Vec::new();
        for member in members {
            if let Err(err) = member.close() {
                failures.push(err);
            }
        }
        match ReactiveError::from_many(failures) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// A closeable that closes every closeable given to it in one call.
struct Joined(Vec<Box<dyn Closeable>>);

impl Closeable for Joined {
    fn close(&self) -> Result<()> {
        let mut failures = Vec::new();
        for member in &self.0 {
            if let Err(err) = member.close() {
                failures.push(err);
            }
        }
        match ReactiveError::from_many(failures) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// Combine several closeables into one that closes all of them.
pub fn join(closeables: Vec<Box<dyn Closeable>>) -> impl Closeable {
    Joined(closeables)
}

impl Closeable for crate::connection::Connection {
    fn close(&self) -> Result<()> {
        crate::connection::Connection::close(self);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use super::*;

    struct Counting(Rc<RefCell<u32>>);
    impl Closeable for Counting {
        fn close(&self) -> Result<()> {
            *self.0.borrow_mut() += 1;
            Ok(())
        }
    }

    struct Failing;
    impl Closeable for Failing {
        fn close(&self) -> Result<()> {
            Err(ReactiveError::IllegalState("always fails".to_owned()))
        }
    }

    #[test]
    fn set_closes_all_members_and_clears() {
        let count = Rc::new(RefCell::new(0));
        let set = CloseableSet::new();
        set.add(Counting(Rc::clone(&count)));
        set.add(Counting(Rc::clone(&count)));

        set.close().expect("no failures");
        assert_eq!(*count.borrow(), 2);

        // Closing again is a no-op since members were cleared.
        set.close().expect("no failures");
        assert_eq!(*count.borrow(), 2);
    }

    #[test]
    fn set_aggregates_failures() {
        let set = CloseableSet::new();
        set.add(Failing);
        set.add(Failing);

        match set.close() {
            Err(ReactiveError::MultiFailure(count, _)) => assert_eq!(count, 2),
            other => panic!("expected MultiFailure, got {other:?}"),
        }
    }

    #[test]
    fn noop_does_nothing() {
        assert!(NOOP.close().is_ok());
    }
}
