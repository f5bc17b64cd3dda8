//! `Signal<T>`: an event stream with no retained value.
//!
//! Structurally this is a thin wrapper around `crate::reactor::Reactor<T>`; it supplies the
//! public combinator surface (`map`, `filter`, `next`) that SPEC_FULL.md §4.2 asks for.

use std::cell::RefCell;
use std::rc::Rc;

use crate::connection::Connection;
use crate::future::Future;
use crate::reactor::Reactor;

/// A stream of discrete events of type `T`. Nothing is retained between emissions; a listener
/// that connects after an emission never observes it (contrast `crate::value::Value`, which
/// always has a current value to read).
#[derive(Clone)]
pub struct Signal<T> {
    reactor: Reactor<T>,
}

impl<T: Clone + 'static> Default for Signal<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + 'static> Signal<T> {
    /// Create a signal with no listeners yet.
    #[must_use]
    pub fn new() -> Self {
        Self {
            reactor: Reactor::new(),
        }
    }

    /// Emit an event to every current listener, in priority order.
    ///
    /// # Errors
    /// Returns the aggregated failures (if any) reported by listeners invoked during this
    /// dispatch.
    pub fn emit(&self, event: &T) -> crate::error::Result<()> {
        self.reactor.notify(event)
    }

    /// Register an infallible listener.
    pub fn connect(&self, listener: impl FnMut(&T) + 'static) -> Connection {
        self.reactor.connect(listener)
    }

    /// Register a listener that may report failure.
    pub fn connect_try(
        &self,
        listener: impl FnMut(&T) -> crate::error::Result<()> + 'static,
    ) -> Connection {
        self.reactor.connect_try(listener)
    }

    /// `true` if at least one live listener is currently connected.
    #[must_use]
    pub fn has_connections(&self) -> bool {
        self.reactor.has_connections()
    }

    /// Derive a signal that re-emits each event transformed by `f`.
    ///
    /// The derived signal holds no connection to this one while it has no listeners of its own:
    /// subscribing to the first listener attaches upstream, and closing the last one detaches it
    /// again.
    #[must_use]
    pub fn map<U: Clone + 'static>(&self, f: impl FnMut(&T) -> U + 'static) -> Signal<U> {
        let derived = Signal::new();
        let source = self.clone();
        let mapper = Rc::new(RefCell::new(f));
        let upstream: Rc<RefCell<Option<Connection>>> = Rc::new(RefCell::new(None));
        let derived_emit = derived.clone();

        derived.reactor.on_liveness_change(move |attached| {
            if attached {
                let derived_emit = derived_emit.clone();
                let mapper = Rc::clone(&mapper);
                let conn = source.connect(move |event| {
                    let mapped = (mapper.borrow_mut())(event);
                    if let Err(err) = derived_emit.emit(&mapped) {
                        log::debug!("listener failure while re-emitting a mapped signal: {err}");
                    }
                });
                *upstream.borrow_mut() = Some(conn);
            } else if let Some(conn) = upstream.borrow_mut().take() {
                conn.close();
            }
        });

        derived
    }

    /// Derive a signal that only re-emits events for which `predicate` returns `true`.
    ///
    /// Attaches upstream on the first listener and detaches on the last, same as [`Signal::map`].
    #[must_use]
    pub fn filter(&self, predicate: impl FnMut(&T) -> bool + 'static) -> Signal<T> {
        let derived = Signal::new();
        let source = self.clone();
        let predicate = Rc::new(RefCell::new(predicate));
        let upstream: Rc<RefCell<Option<Connection>>> = Rc::new(RefCell::new(None));
        let derived_emit = derived.clone();

        derived.reactor.on_liveness_change(move |attached| {
            if attached {
                let derived_emit = derived_emit.clone();
                let predicate = Rc::clone(&predicate);
                let conn = source.connect(move |event| {
                    if (predicate.borrow_mut())(event) {
                        if let Err(err) = derived_emit.emit(event) {
                            log::debug!(
                                "listener failure while re-emitting a filtered signal: {err}"
                            );
                        }
                    }
                });
                *upstream.borrow_mut() = Some(conn);
            } else if let Some(conn) = upstream.borrow_mut().take() {
                conn.close();
            }
        });

        derived
    }

    /// A future that resolves with the next event this signal emits.
    #[must_use]
    pub fn next(&self) -> Future<T> {
        let future = Future::pending();
        let resolver = future.clone();
        let conn = self.connect(move |event: &T| {
            resolver.succeed(event.clone()).ok();
        });
        conn.once().ok();
        future
    }
}

/// A signal carrying no payload, used for plain "something happened" notifications.
pub type UnitSignal = Signal<()>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[test]
    fn emit_reaches_connected_listeners() {
        let signal: Signal<i32> = Signal::new();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let seen_clone = Rc::clone(&seen);
        let _conn = signal.connect(move |v| seen_clone.borrow_mut().push(*v));

        signal.emit(&7).expect("no failures");
        assert_eq!(*seen.borrow(), vec![7]);
    }

    #[test]
    fn map_transforms_events() {
        let signal: Signal<i32> = Signal::new();
        let doubled = signal.map(|v| v * 2);
        let seen = Rc::new(RefCell::new(Vec::new()));
        let seen_clone = Rc::clone(&seen);
        let _conn = doubled.connect(move |v| seen_clone.borrow_mut().push(*v));

        signal.emit(&21).expect("no failures");
        assert_eq!(*seen.borrow(), vec![42]);
    }

    #[test]
    fn filter_drops_non_matching_events() {
        let signal: Signal<i32> = Signal::new();
        let evens = signal.filter(|v| v % 2 == 0);
        let seen = Rc::new(RefCell::new(Vec::new()));
        let seen_clone = Rc::clone(&seen);
        let _conn = evens.connect(move |v| seen_clone.borrow_mut().push(*v));

        signal.emit(&1).expect("no failures");
        signal.emit(&2).expect("no failures");
        signal.emit(&3).expect("no failures");
        signal.emit(&4).expect("no failures");
        assert_eq!(*seen.borrow(), vec![2, 4]);
    }

    #[test]
    fn map_attaches_upstream_only_while_subscribed() {
        let signal: Signal<i32> = Signal::new();
        let doubled = signal.map(|v| v * 2);
        assert!(!signal.has_connections());

        let conn = doubled.connect(|_| {});
        assert!(signal.has_connections());

        conn.close();
        assert!(!signal.has_connections());
    }

    #[test]
    fn next_resolves_once() {
        let signal: Signal<i32> = Signal::new();
        let fut = signal.next();
        signal.emit(&1).expect("no failures");
        signal.emit(&2).expect("no failures");
        assert_eq!(fut.result().and_then(crate::error::Try::ok), Some(1));
    }
}
