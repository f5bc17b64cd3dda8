//! `Value<T>`: an observable cell that always holds a current value.
//!
//! Structurally grounded on the teacher's `reactivity/signal.rs::Signal<T>` (a dependency-tracked
//! single-value cell) — renamed here to `Value` to free up `Signal` for this crate's event-stream
//! meaning (see `crate::signal`), per SPEC_FULL.md §4.2/§4.4 and the naming note in DESIGN.md.

use std::cell::RefCell;
use std::rc::Rc;

use crate::connection::Connection;
use crate::future::Future;
use crate::reactor::Reactor;
use crate::signal::Signal;

/// The event shape a `Value<T>`'s reactor dispatches: the new value and the value it replaced.
#[derive(Clone)]
pub struct ValueChange<T> {
    pub new: T,
    pub old: T,
}

/// An observable cell holding a current value of type `T`, notifying listeners on change.
///
/// A plain `Value::new(...)` stores its current value directly. A derived value (`map`,
/// `flat_map`, `and`, `or`, `not`) instead recomputes `get()` from its upstream on every call, so
/// it stays correct even while detached — see the lazy attach/detach note on `map` below.
#[derive(Clone)]
pub struct Value<T> {
    current: Rc<RefCell<T>>,
    reactor: Reactor<ValueChange<T>>,
    recompute: Option<Rc<dyn Fn() -> T>>,
}

impl<T: Clone + PartialEq + 'static> Value<T> {
    /// Create a value cell holding `initial`.
    #[must_use]
    pub fn new(initial: T) -> Self {
        Self {
            current: Rc::new(RefCell::new(initial)),
            reactor: Reactor::new(),
            recompute: None,
        }
    }

    /// Read the current value.
    #[must_use]
    pub fn get(&self) -> T {
        match &self.recompute {
            Some(recompute) => recompute(),
            None => self.current.borrow().clone(),
        }
    }

    /// Replace the current value, notifying listeners only if it actually differs (by
    /// `PartialEq`) from the previous value.
    ///
    /// # Errors
    /// Returns the aggregated failures (if any) reported by listeners invoked during this
    /// change's dispatch.
    pub fn update(&self, new_value: T) -> crate::error::Result<()> {
        let old = {
            let mut current = self.current.borrow_mut();
            if *current == new_value {
                return Ok(());
            }
            std::mem::replace(&mut *current, new_value)
        };
        let new = self.current.borrow().clone();
        self.reactor.notify(&ValueChange { new, old })
    }

    /// Replace the current value and notify listeners unconditionally, even if the new value is
    /// equal to the old one (SPEC_FULL.md §4.2's "forced" update variant).
    ///
    /// # Errors
    /// Returns the aggregated failures (if any) reported by listeners invoked during this
    /// change's dispatch.
    pub fn update_force(&self, new_value: T) -> crate::error::Result<()> {
        let old = std::mem::replace(&mut *self.current.borrow_mut(), new_value);
        let new = self.current.borrow().clone();
        self.reactor.notify(&ValueChange { new, old })
    }

    /// Register a listener invoked with `(new, old)` on every change.
    pub fn connect(&self, mut listener: impl FnMut(&T, &T) + 'static) -> Connection {
        self.reactor
            .connect(move |change: &ValueChange<T>| listener(&change.new, &change.old))
    }

    /// Register a listener invoked with the current value immediately, and again with every
    /// subsequent new value on change.
    ///
    /// The connection is registered *before* the synthetic initial invocation, so if that first
    /// call panics, the connection it just created is torn down before the panic keeps
    /// propagating rather than leaking a half-subscribed listener.
    pub fn connect_notify(&self, listener: impl FnMut(&T) + 'static) -> Connection {
        let listener = Rc::new(RefCell::new(listener));
        let listener_for_changes = Rc::clone(&listener);
        let conn = self.reactor.connect(move |change: &ValueChange<T>| {
            (listener_for_changes.borrow_mut())(&change.new);
        });

        struct CloseOnUnwind {
            conn: Connection,
            disarmed: bool,
        }
        impl Drop for CloseOnUnwind {
            fn drop(&mut self) {
                if !self.disarmed {
                    self.conn.close();
                }
            }
        }
        let mut guard = CloseOnUnwind {
            conn: conn.clone(),
            disarmed: false,
        };
        let current = self.get();
        (listener.borrow_mut())(&current);
        guard.disarmed = true;

        conn
    }

    /// `true` if at least one live listener is currently connected.
    #[must_use]
    pub fn has_connections(&self) -> bool {
        self.reactor.has_connections()
    }

    /// An event stream of this value's changes, carrying the new value.
    #[must_use]
    pub fn changes(&self) -> Signal<T> {
        let signal = Signal::new();
        let signal_emit = signal.clone();
        // The registration lives inside `self.reactor`'s own storage, not in the returned
        // `Connection`, so dropping the connection here is harmless: the forwarding listener
        // stays registered for as long as this value itself is kept alive.
        let _conn = self.reactor.connect(move |change: &ValueChange<T>| {
            if let Err(err) = signal_emit.emit(&change.new) {
                log::debug!("listener failure while re-emitting a value change: {err}");
            }
        });
        signal
    }

    /// A future that resolves with the first value for which `predicate` returns `true`,
    /// checking the current value immediately before waiting on further changes.
    #[must_use]
    pub fn when(&self, mut predicate: impl FnMut(&T) -> bool + 'static) -> Future<T> {
        let future = Future::pending();
        if predicate(&self.get()) {
            future.succeed(self.get()).ok();
            return future;
        }
        let resolver = future.clone();
        let holder: Rc<RefCell<Option<Connection>>> = Rc::new(RefCell::new(None));
        let holder_for_close = Rc::clone(&holder);
        let conn = self.connect(move |new, _old| {
            if predicate(new) {
                resolver.succeed(new.clone()).ok();
                if let Some(conn) = holder_for_close.borrow_mut().take() {
                    conn.close();
                }
            }
        });
        *holder.borrow_mut() = Some(conn);
        future
    }
}

impl<T: Clone + PartialEq + 'static> Value<T> {
    /// Derive a value that tracks `f` applied to this value's current value.
    ///
    /// The derived value holds no connection to this one while it has no listeners of its own —
    /// subscribing to the first listener attaches upstream, closing the last one detaches it
    /// again — and `get()` always recomputes from the upstream rather than trusting a possibly
    /// stale cache, so it stays correct across attach/detach cycles either way.
    #[must_use]
    pub fn map<U: Clone + PartialEq + 'static>(
        &self,
        f: impl FnMut(&T) -> U + 'static,
    ) -> Value<U> {
        let source = self.clone();
        let mapper = Rc::new(RefCell::new(f));

        let recompute: Rc<dyn Fn() -> U> = {
            let source = source.clone();
            let mapper = Rc::clone(&mapper);
            Rc::new(move || (mapper.borrow_mut())(&source.get()))
        };
        let initial = recompute();
        let mut derived = Value::new(initial);
        derived.recompute = Some(Rc::clone(&recompute));

        let upstream: Rc<RefCell<Option<Connection>>> = Rc::new(RefCell::new(None));
        let derived_for_hook = derived.clone();

        derived.reactor.on_liveness_change(move |attached| {
            if attached {
                let derived_for_update = derived_for_hook.clone();
                let mapper = Rc::clone(&mapper);
                let conn = source.connect(move |new, _old| {
                    let mapped = (mapper.borrow_mut())(new);
                    if let Err(err) = derived_for_update.update(mapped) {
                        log::debug!("listener failure while propagating a mapped value: {err}");
                    }
                });
                *upstream.borrow_mut() = Some(conn);
            } else if let Some(conn) = upstream.borrow_mut().take() {
                conn.close();
            }
        });

        derived
    }

    /// Derive a value that tracks whichever `Value<U>` the current value selects, re-subscribing
    /// to the newly selected source on every change.
    ///
    /// Same lazy attach/detach contract as `map`: both the outer and the currently-selected inner
    /// subscription exist only while this derived value has subscribers of its own.
    #[must_use]
    pub fn flat_map<U: Clone + PartialEq + 'static>(
        &self,
        selector: impl FnMut(&T) -> Value<U> + 'static,
    ) -> Value<U> {
        let source = self.clone();
        let selector = Rc::new(RefCell::new(selector));

        let recompute: Rc<dyn Fn() -> U> = {
            let source = source.clone();
            let selector = Rc::clone(&selector);
            Rc::new(move || (selector.borrow_mut())(&source.get()).get())
        };
        let initial = recompute();
        let mut derived = Value::new(initial);
        derived.recompute = Some(Rc::clone(&recompute));

        let inner_conn: Rc<RefCell<Option<Connection>>> = Rc::new(RefCell::new(None));
        let outer_conn: Rc<RefCell<Option<Connection>>> = Rc::new(RefCell::new(None));
        let derived_for_hook = derived.clone();

        derived.reactor.on_liveness_change(move |attached| {
            if attached {
                let inner_value = (selector.borrow_mut())(&source.get());
                let derived_for_inner = derived_for_hook.clone();
                let conn = inner_value.connect(move |new, _old| {
                    if let Err(err) = derived_for_inner.update(new.clone()) {
                        log::debug!(
                            "listener failure while propagating a flat-mapped value: {err}"
                        );
                    }
                });
                *inner_conn.borrow_mut() = Some(conn);

                let derived_for_outer = derived_for_hook.clone();
                let selector_for_outer = Rc::clone(&selector);
                let inner_conn_for_outer = Rc::clone(&inner_conn);
                let outer = source.connect(move |new, _old| {
                    if let Some(conn) = inner_conn_for_outer.borrow_mut().take() {
                        conn.close();
                    }
                    let next_inner = (selector_for_outer.borrow_mut())(new);
                    if let Err(err) = derived_for_outer.update(next_inner.get()) {
                        log::debug!(
                            "listener failure while switching a flat-mapped value source: {err}"
                        );
                    }
                    let derived_for_new_inner = derived_for_outer.clone();
                    let conn = next_inner.connect(move |new, _old| {
                        if let Err(err) = derived_for_new_inner.update(new.clone()) {
                            log::debug!(
                                "listener failure while propagating a flat-mapped value: {err}"
                            );
                        }
                    });
                    *inner_conn_for_outer.borrow_mut() = Some(conn);
                });
                *outer_conn.borrow_mut() = Some(outer);
            } else {
                if let Some(conn) = inner_conn.borrow_mut().take() {
                    conn.close();
                }
                if let Some(conn) = outer_conn.borrow_mut().take() {
                    conn.close();
                }
            }
        });

        derived
    }
}

/// Derive a boolean value from several sources, attaching to every one of them only while the
/// derived value itself has subscribers.
fn logical_aggregate(
    sources: Vec<Value<bool>>,
    combine: impl Fn(&[bool]) -> bool + 'static,
) -> Value<bool> {
    let combine = Rc::new(combine);
    let recompute: Rc<dyn Fn() -> bool> = {
        let sources = sources.clone();
        let combine = Rc::clone(&combine);
        Rc::new(move || {
            let current: Vec<bool> = sources.iter().map(Value::get).collect();
            combine(&current)
        })
    };
    let initial = recompute();
    let mut derived = Value::new(initial);
    derived.recompute = Some(Rc::clone(&recompute));

    let upstream_conns: Rc<RefCell<Vec<Connection>>> = Rc::new(RefCell::new(Vec::new()));
    let derived_for_hook = derived.clone();

    derived.reactor.on_liveness_change(move |attached| {
        if attached {
            for source in &sources {
                let derived_for_update = derived_for_hook.clone();
                let recompute = Rc::clone(&recompute);
                let conn = source.connect(move |_new, _old| {
                    if let Err(err) = derived_for_update.update(recompute()) {
                        log::debug!(
                            "listener failure while propagating a logical aggregation: {err}"
                        );
                    }
                });
                upstream_conns.borrow_mut().push(conn);
            }
        } else {
            for conn in upstream_conns.borrow_mut().drain(..) {
                conn.close();
            }
        }
    });

    derived
}

impl Value<bool> {
    /// Derive a boolean value that's `true` only while this value and every value in `others`
    /// are `true`.
    #[must_use]
    pub fn and(&self, others: &[Value<bool>]) -> Value<bool> {
        let sources: Vec<Value<bool>> = std::iter::once(self.clone())
            .chain(others.iter().cloned())
            .collect();
        logical_aggregate(sources, |values| values.iter().all(|v| *v))
    }

    /// Derive a boolean value that's `true` while this value or at least one of `others` is
    /// `true`.
    #[must_use]
    pub fn or(&self, others: &[Value<bool>]) -> Value<bool> {
        let sources: Vec<Value<bool>> = std::iter::once(self.clone())
            .chain(others.iter().cloned())
            .collect();
        logical_aggregate(sources, |values| values.iter().any(|v| *v))
    }

    /// Derive the logical negation of this value.
    #[must_use]
    pub fn not(&self) -> Value<bool> {
        self.map(|v| !*v)
    }
}

/// Build a listener that flips `value` each time it fires, ignoring whatever event it carries.
/// Meant to be handed straight to `Signal::connect`/`UnitSignal::connect` to wire an action (a
/// click, a key press) to a boolean `Value` without writing the toggle by hand each time.
pub fn toggler<E>(value: Value<bool>) -> impl FnMut(&E) + 'static {
    move |_event: &E| {
        let current = value.get();
        if let Err(err) = value.update(!current) {
            log::debug!("listener failure while toggling a value: {err}");
        }
    }
}

/// View a signal as a value: derive a `Value<T>` seeded with `initial` that updates to the latest
/// event each time `signal` emits, attaching to `signal` only while the derived value itself has
/// subscribers (and so necessarily keeping its own memoized copy, since a signal has no `get()`
/// of its own to recompute from once detached).
pub fn as_value<T: Clone + PartialEq + 'static>(signal: &Signal<T>, initial: T) -> Value<T> {
    let derived = Value::new(initial);
    let source = signal.clone();
    let upstream: Rc<RefCell<Option<Connection>>> = Rc::new(RefCell::new(None));
    let derived_for_hook = derived.clone();

    derived.reactor.on_liveness_change(move |attached| {
        if attached {
            let derived_for_update = derived_for_hook.clone();
            let conn = source.connect(move |event: &T| {
                if let Err(err) = derived_for_update.update(event.clone()) {
                    log::debug!("listener failure while tracking a signal as a value: {err}");
                }
            });
            *upstream.borrow_mut() = Some(conn);
        } else if let Some(conn) = upstream.borrow_mut().take() {
            conn.close();
        }
    });

    derived
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[test]
    fn update_skips_notification_when_unchanged() {
        let value = Value::new(1);
        let count = Rc::new(RefCell::new(0));
        let count_clone = Rc::clone(&count);
        let _conn = value.connect(move |_new, _old| *count_clone.borrow_mut() += 1);

        value.update(1).expect("no failures");
        assert_eq!(*count.borrow(), 0);

        value.update(2).expect("no failures");
        assert_eq!(*count.borrow(), 1);
    }

    #[test]
    fn update_force_always_notifies() {
        let value = Value::new(1);
        let count = Rc::new(RefCell::new(0));
        let count_clone = Rc::clone(&count);
        let _conn = value.connect(move |_new, _old| *count_clone.borrow_mut() += 1);

        value.update_force(1).expect("no failures");
        value.update_force(1).expect("no failures");
        assert_eq!(*count.borrow(), 2);
    }

    #[test]
    fn connect_notify_fires_immediately() {
        let value = Value::new(5);
        let seen = Rc::new(RefCell::new(Vec::new()));
        let seen_clone = Rc::clone(&seen);
        let _conn = value.connect_notify(move |v| seen_clone.borrow_mut().push(*v));
        value.update(6).expect("no failures");
        assert_eq!(*seen.borrow(), vec![5, 6]);
    }

    #[test]
    fn connect_notify_registers_before_invoking() {
        let value = Value::new(5);
        let conn = value.connect_notify(|_v| {});
        // If the initial invocation ran before registration, this connection would already be
        // the only listener, and closing it here would be closing a listener that never got a
        // chance to observe anything — instead we confirm it was live the whole time.
        assert!(value.has_connections());
        conn.close();
        assert!(!value.has_connections());
    }

    #[test]
    fn changes_emits_the_new_value() {
        let value = Value::new(1);
        let seen = Rc::new(RefCell::new(Vec::new()));
        let seen_clone = Rc::clone(&seen);
        let _conn = value.changes().connect(move |v| seen_clone.borrow_mut().push(*v));
        value.update(2).expect("no failures");
        value.update(3).expect("no failures");
        assert_eq!(*seen.borrow(), vec![2, 3]);
    }

    #[test]
    fn map_tracks_source() {
        let value = Value::new(2);
        let doubled = value.map(|v| v * 2);
        assert_eq!(doubled.get(), 4);
        value.update(3).expect("no failures");
        assert_eq!(doubled.get(), 6);
    }

    #[test]
    fn map_attaches_upstream_only_while_subscribed() {
        let value = Value::new(2);
        let doubled = value.map(|v| v * 2);
        assert!(!value.has_connections());

        // Even detached, `get()` recomputes straight from the source rather than trusting a
        // stale cache.
        value.update(5).expect("no failures");
        assert_eq!(doubled.get(), 10);

        let conn = doubled.connect(|_, _| {});
        assert!(value.has_connections());
        conn.close();
        assert!(!value.has_connections());
    }

    #[test]
    fn flat_map_switches_source_on_outer_change() {
        let source_a = Value::new(1);
        let source_b = Value::new(100);
        let selector_input = Value::new(true);

        let source_a_for_selector = source_a.clone();
        let source_b_for_selector = source_b.clone();
        let derived = selector_input.flat_map(move |use_a| {
            if *use_a {
                source_a_for_selector.clone()
            } else {
                source_b_for_selector.clone()
            }
        });
        assert_eq!(derived.get(), 1);

        source_a.update(2).expect("no failures");
        assert_eq!(derived.get(), 2);

        selector_input.update(false).expect("no failures");
        assert_eq!(derived.get(), 100);

        // No longer tracking source_a now that the selector switched away from it.
        source_a.update(3).expect("no failures");
        assert_eq!(derived.get(), 100);

        source_b.update(200).expect("no failures");
        assert_eq!(derived.get(), 200);
    }

    #[test]
    fn when_resolves_on_matching_value() {
        let value = Value::new(0);
        let future = value.when(|v| *v > 2);
        assert!(future.result().is_none());
        value.update(1).expect("no failures");
        value.update(3).expect("no failures");
        assert_eq!(future.result().and_then(crate::error::Try::ok), Some(3));
    }

    #[test]
    fn and_or_not_combine_boolean_values() {
        let a = Value::new(true);
        let b = Value::new(false);

        let conjunction = a.and(&[b.clone()]);
        let disjunction = a.or(&[b.clone()]);
        let negation = b.not();

        assert!(!conjunction.get());
        assert!(disjunction.get());
        assert!(negation.get());

        b.update(true).expect("no failures");
        assert!(conjunction.get());
        assert!(!negation.get());
    }

    #[test]
    fn toggler_flips_on_each_invocation() {
        let flag = Value::new(false);
        let mut flip = toggler::<()>(flag.clone());
        flip(&());
        assert!(flag.get());
        flip(&());
        assert!(!flag.get());
    }

    #[test]
    fn as_value_tracks_latest_signal_emission() {
        let signal: Signal<i32> = Signal::new();
        let tracked = as_value(&signal, 0);
        assert!(!signal.has_connections());

        let conn = tracked.connect(|_, _| {});
        assert!(signal.has_connections());
        signal.emit(&7).expect("no failures");
        assert_eq!(tracked.get(), 7);

        conn.close();
        assert!(!signal.has_connections());
    }
}
