//! The type-erased handle returned by every `connect`-style call.
//!
//! Dispatch itself (`crate::reactor::Reactor<Event>`) stays generic over the listener's event
//! shape; `Connection` is the one place that shape gets erased, via `dyn ConnectionHandle`, so
//! unrelated reactors' connections can be stored, compared, and joined together uniformly.

use std::rc::Rc;

use crate::error::Result;

/// Operations a concrete registration must support to back a `Connection`.
///
/// Implemented once, by `crate::reactor::RegHandle<Event>`, for every `Event` this crate ever
/// instantiates a reactor with.
pub(crate) trait ConnectionHandle {
    fn close(&self);
    fn once(&self);
    fn at_prio(&self, priority: i32) -> Result<()>;
    fn hold_weakly(&self) -> Result<()>;
}

/// A handle to a single listener registration on some reactor.
///
/// Dropping a `Connection` does not close it — closing is explicit (`close`) or implicit (via
/// `once` firing, or the reactor itself being dropped). Clone is cheap (an `Rc` bump) and all
/// clones refer to the same underlying registration.
#[derive(Clone)]
pub struct Connection {
    handle: Rc<dyn ConnectionHandle>,
}

impl Connection {
    pub(crate) fn new(handle: Rc<dyn ConnectionHandle>) -> Self {
        Self { handle }
    }

    /// A `Connection` that refers to nothing; `close`/`once`/`at_prio`/`hold_weakly` on it are
    /// all no-ops. Useful as a default/placeholder value.
    #[must_use]
    pub fn noop() -> Self {
        struct Noop;
        impl ConnectionHandle for Noop {
            fn close(&self) {}
            fn once(&self) {}
            fn at_prio(&self, _priority: i32) -> Result<()> {
                Ok(())
            }
            fn hold_weakly(&self) -> Result<()> {
                Ok(())
            }
        }
        Self::new(Rc::new(Noop))
    }

    /// Permanently stop this listener from receiving further notifications.
    ///
    /// If the reactor is mid-dispatch, the removal is made visible immediately (the listener is
    /// skipped for the remainder of the current and all future dispatch frames) even though the
    /// underlying storage slot is reclaimed only once the frame finishes.
    pub fn close(&self) {
        self.handle.close();
    }

    /// Mark this listener to auto-close after its next successful invocation.
    pub fn once(&self) -> Result<()> {
        self.handle.once();
        Ok(())
    }

    /// Change this listener's dispatch priority. Higher values run earlier; ties break by
    /// registration order.
    ///
    /// # Errors
    /// Returns `ReactiveError::IllegalState` if the connection has already been closed.
    pub fn at_prio(&self, priority: i32) -> Result<()> {
        self.handle.at_prio(priority)
    }

    /// Downgrade the reactor's hold on this listener from strong to weak, so the listener stops
    /// receiving events as soon as every other owner drops their `Rc` to it.
    ///
    /// # Errors
    /// Returns `ReactiveError::IllegalState` if the connection has already been closed.
    pub fn hold_weakly(&self) -> Result<()> {
        self.handle.hold_weakly()
    }

    /// Combine several connections into one handle that closes all of them together.
    #[must_use]
    pub fn join(connections: impl IntoIterator<Item = Connection>) -> Connection {
        struct Joined(Vec<Connection>);
        impl ConnectionHandle for Joined {
            fn close(&self) {
                for conn in &self.0 {
                    conn.close();
                }
            }
            fn once(&self) {
                for conn in &self.0 {
                    let _ = conn.once();
                }
            }
            fn at_prio(&self, priority: i32) -> Result<()> {
                let mut failures = Vec::new();
                for conn in &self.0 {
                    if let Err(err) = conn.at_prio(priority) {
                        failures.push(err);
                    }
                }
                match crate::error::ReactiveError::from_many(failures) {
                    Some(err) => Err(err),
                    None => Ok(()),
                }
            }
            fn hold_weakly(&self) -> Result<()> {
                let mut failures = Vec::new();
                for conn in &self.0 {
                    if let Err(err) = conn.hold_weakly() {
                        failures.push(err);
                    }
                }
                match crate::error::ReactiveError::from_many(failures) {
                    Some(err) => Err(err),
                    None => Ok(()),
                }
            }
        }
        Connection::new(Rc::new(Joined(connections.into_iter().collect())))
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection").finish_non_exhaustive()
    }
}
