//! The dispatch core: a reactor owns a priority-ordered list of listener registrations and
//! performs safe re-entrant notification.
//!
//! This mirrors the teacher framework's `HookStore`/`State` split (slotmap-keyed storage plus a
//! secondary insertion-order counter) but generalizes "hooks of one component" into "listeners of
//! any reactor", and replaces the cons-list-with-sentinel the original design describes with an
//! explicit `ListState` enum, per the design notes.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use slotmap::{SlotMap, new_key_type};
use smallvec::SmallVec;

use crate::connection::{Connection, ConnectionHandle};
use crate::error::{ReactiveError, Result};

new_key_type! {
    /// Stable identity for a single registration, used by `Connection` to refer back to its slot
    /// regardless of reordering.
    pub(crate) struct RegKey;
}

/// A listener of a reactor's declared event shape.
///
/// Fallible: a listener may report a failure, which dispatch captures and aggregates rather than
/// letting propagate as a panic (see `Reactor::notify`).
pub(crate) type ListenerFn<Event> = dyn FnMut(&Event) -> Result<()>;

/// The reactor's hold on a registered listener.
enum Holding<Event> {
    /// The reactor is the (possibly shared) owner keeping the listener alive.
    Strong(Rc<RefCell<ListenerFn<Event>>>),
    /// The reactor refers to the listener without extending its lifetime.
    Weak(Weak<RefCell<ListenerFn<Event>>>),
}

impl<Event> Holding<Event> {
    fn upgrade(&self) -> Option<Rc<RefCell<ListenerFn<Event>>>> {
        match self {
            Holding::Strong(rc) => Some(Rc::clone(rc)),
            Holding::Weak(weak) => weak.upgrade(),
        }
    }
}

struct Registration<Event> {
    holding: Holding<Event>,
    priority: i32,
    once: bool,
    closed: bool,
    insertion_seq: u64,
}

/// The listener-list pointer's state machine: `Idle(head) -> Dispatching -> Idle(head')`.
enum ListState {
    /// The sorted registration order; not currently being walked.
    Idle(Vec<RegKey>),
    /// A dispatch frame is active; the pre-dispatch order is held on the call stack of `notify`,
    /// not here, so any concurrent/re-entrant structural change must go through `deferred`.
    Dispatching,
}

/// An operation that couldn't be applied immediately because a dispatch frame was active.
enum DeferredOp<Event> {
    InsertOrder(RegKey),
    Remove(RegKey),
    AtPrio(RegKey, i32),
    Notify(Event),
}

struct ReactorInner<Event> {
    registrations: SlotMap<RegKey, Registration<Event>>,
    state: ListState,
    deferred: SmallVec<[DeferredOp<Event>; 1]>,
    next_insertion_seq: u64,
    /// Fired with `true` on the zero-to-one live-registration transition and `false` on the
    /// one-to-zero transition, so an owner (`Signal::map`, `Value::flat_map`, ...) can attach to
    /// its upstream lazily and detach once nobody is listening, per SPEC_FULL.md §4.3.
    lifecycle_hook: Option<Rc<RefCell<dyn FnMut(bool)>>>,
}

/// Number of registrations not yet marked closed. Recomputed by scan rather than tracked
/// incrementally, since it's only read around the handful of mutation points that can change it
/// (register/close/clear), never in the `notify` hot path.
fn live_count<Event>(inner: &ReactorInner<Event>) -> usize {
    inner.registrations.values().filter(|reg| !reg.closed).count()
}

/// The dispatch core shared by every reactive entity in this crate.
///
/// `Event` is the reactor's statically declared listener shape (a signal's emitted value, a
/// value's `(new, old)` pair, a collection's structural change enum, ...). There is no runtime
/// type erasure in the dispatch path itself; erasure (via `dyn ConnectionHandle`) only happens at
/// the `Connection` handle boundary, which doesn't need to know `Event`.
pub(crate) struct Reactor<Event> {
    inner: Rc<RefCell<ReactorInner<Event>>>,
}

impl<Event> Clone for Reactor<Event> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<Event: Clone + 'static> Default for Reactor<Event> {
    fn default() -> Self {
        Self::new()
    }
}

fn sorted_insert<Event>(
    order: &mut Vec<RegKey>,
    key: RegKey,
    registrations: &SlotMap<RegKey, Registration<Event>>,
) {
    let Some(new_reg) = registrations.get(key) else {
        log::warn!("sorted_insert called with a key missing from storage");
        return;
    };
    let position = order.partition_point(|existing| {
        let Some(existing_reg) = registrations.get(*existing) else {
            return true;
        };
        // priority descending, insertion order ascending among ties
        (existing_reg.priority, existing_reg.insertion_seq)
            > (new_reg.priority, new_reg.insertion_seq)
    });
    order.insert(position, key);
}

impl<Event: Clone + 'static> Reactor<Event> {
    /// Create an empty reactor.
    pub(crate) fn new() -> Self {
        Self {
            inner: Rc::new(RefCell::new(ReactorInner {
                registrations: SlotMap::with_key(),
                state: ListState::Idle(Vec::new()),
                deferred: SmallVec::new(),
                next_insertion_seq: 0,
                lifecycle_hook: None,
            })),
        }
    }

    /// Register a hook fired on the zero-to-one and one-to-zero live-registration transitions.
    /// Only one hook is supported per reactor, since every caller in this crate owns its reactor
    /// outright and installs exactly one.
    pub(crate) fn on_liveness_change(&self, hook: impl FnMut(bool) + 'static) {
        self.inner.borrow_mut().lifecycle_hook = Some(Rc::new(RefCell::new(hook)));
    }

    fn fire_lifecycle_if_changed(&self, before: usize, after: usize) {
        if before == after {
            return;
        }
        let hook = self.inner.borrow().lifecycle_hook.clone();
        let Some(hook) = hook else { return };
        if before == 0 && after > 0 {
            hook.borrow_mut()(true);
        } else if before > 0 && after == 0 {
            hook.borrow_mut()(false);
        }
    }

    /// `true` if at least one live listener is registered. Weakly-held listeners that have
    /// already been reclaimed are pruned as a side effect (closed and queued for removal), so
    /// this call is an active liveness check, not just "is the list non-empty".
    pub(crate) fn has_connections(&self) -> bool {
        let (any_live, to_close) = {
            let inner = self.inner.borrow();
            let mut any_live = false;
            let mut to_close = SmallVec::<[RegKey; 4]>::new();
            for (key, reg) in &inner.registrations {
                if reg.closed {
                    continue;
                }
                if reg.holding.upgrade().is_some() {
                    any_live = true;
                } else {
                    to_close.push(key);
                }
            }
            (any_live, to_close)
        };
        for key in to_close {
            self.close_now(key);
        }
        any_live
    }

    fn next_seq(inner: &mut ReactorInner<Event>) -> u64 {
        let seq = inner.next_insertion_seq;
        inner.next_insertion_seq = match inner.next_insertion_seq.checked_add(1) {
            Some(v) => v,
            None => {
                log::error!("reactor insertion-order counter overflowed; wrapping to 0");
                0
            }
        };
        seq
    }

    fn register(&self, holding: Holding<Event>) -> Connection {
        let before = live_count(&self.inner.borrow());

        let key = {
            let mut inner = self.inner.borrow_mut();
            let seq = Self::next_seq(&mut inner);
            let key = inner.registrations.insert(Registration {
                holding,
                priority: 0,
                once: false,
                closed: false,
                insertion_seq: seq,
            });

            let ReactorInner {
                state,
                registrations,
                deferred,
                ..
            } = &mut *inner;
            match state {
                ListState::Idle(order) => sorted_insert(order, key, registrations),
                ListState::Dispatching => deferred.push(DeferredOp::InsertOrder(key)),
            }
            key
        };

        let after = live_count(&self.inner.borrow());
        self.fire_lifecycle_if_changed(before, after);

        Connection::new(Rc::new(RegHandle {
            reactor: Rc::downgrade(&self.inner),
            key,
        }))
    }

    /// Register an infallible listener, strongly held by the reactor.
    pub(crate) fn connect(&self, mut listener: impl FnMut(&Event) + 'static) -> Connection {
        self.register(Holding::Strong(Rc::new(RefCell::new(move |event: &Event| {
            listener(event);
            Ok(())
        }))))
    }

    /// Register a fallible listener, strongly held by the reactor.
    pub(crate) fn connect_try(
        &self,
        listener: impl FnMut(&Event) -> Result<()> + 'static,
    ) -> Connection {
        self.register(Holding::Strong(Rc::new(RefCell::new(listener))))
    }

    /// Register a listener the caller already owns an `Rc` to, so `Connection::hold_weakly` has
    /// something meaningful to degrade to: the reactor's hold becomes the *only* thing keeping it
    /// alive unless the caller keeps their own clone around.
    pub(crate) fn connect_shared(&self, listener: Rc<RefCell<ListenerFn<Event>>>) -> Connection {
        self.register(Holding::Strong(listener))
    }

    fn close_now(&self, key: RegKey) {
        let before = live_count(&self.inner.borrow());
        {
            let mut inner = self.inner.borrow_mut();
            if let Some(reg) = inner.registrations.get_mut(key) {
                reg.closed = true;
            }
            match &mut inner.state {
                ListState::Idle(order) => {
                    order.retain(|existing| *existing != key);
                    inner.registrations.remove(key);
                }
                ListState::Dispatching => inner.deferred.push(DeferredOp::Remove(key)),
            }
        }
        let after = live_count(&self.inner.borrow());
        self.fire_lifecycle_if_changed(before, after);
    }

    fn at_prio_now(&self, key: RegKey, priority: i32) -> Result<()> {
        let mut inner = self.inner.borrow_mut();
        let Some(reg) = inner.registrations.get_mut(key) else {
            return Ok(());
        };
        if reg.closed {
            return Err(ReactiveError::IllegalState(
                "at_prio called on a closed connection".to_owned(),
            ));
        }
        reg.priority = priority;

        let ReactorInner {
            state,
            registrations,
            deferred,
            ..
        } = &mut *inner;
        match state {
            ListState::Idle(order) => {
                order.retain(|existing| *existing != key);
                sorted_insert(order, key, registrations);
            }
            ListState::Dispatching => deferred.push(DeferredOp::AtPrio(key, priority)),
        }
        Ok(())
    }

    fn hold_weakly_now(&self, key: RegKey) -> Result<()> {
        let mut inner = self.inner.borrow_mut();
        let Some(reg) = inner.registrations.get_mut(key) else {
            return Ok(());
        };
        if reg.closed {
            return Err(ReactiveError::IllegalState(
                "hold_weakly called on a closed connection".to_owned(),
            ));
        }
        if let Holding::Strong(rc) = &reg.holding {
            reg.holding = Holding::Weak(Rc::downgrade(rc));
        }
        Ok(())
    }

    fn once_now(&self, key: RegKey) {
        let mut inner = self.inner.borrow_mut();
        if let Some(reg) = inner.registrations.get_mut(key) {
            reg.once = true;
        }
    }

    /// Forbidden while dispatching or while deferred operations remain (see SPEC_FULL.md §9, Open
    /// Questions: the throw is preserved deliberately for diagnosability rather than silently
    /// draining first).
    pub(crate) fn clear_connections(&self) -> Result<()> {
        let before = {
            let inner = self.inner.borrow();
            if matches!(inner.state, ListState::Dispatching) {
                return Err(ReactiveError::IllegalState(
                    "clear_connections called while a dispatch frame is active".to_owned(),
                ));
            }
            if !inner.deferred.is_empty() {
                return Err(ReactiveError::IllegalState(
                    "clear_connections called with deferred operations pending".to_owned(),
                ));
            }
            live_count(&inner)
        };
        {
            let mut inner = self.inner.borrow_mut();
            inner.registrations = SlotMap::with_key();
            inner.state = ListState::Idle(Vec::new());
        }
        self.fire_lifecycle_if_changed(before, 0);
        Ok(())
    }

    /// Dispatch `event` to every live listener, in priority-descending / insertion-ascending
    /// order, per the algorithm in SPEC_FULL.md §4.1.
    pub(crate) fn notify(&self, event: &Event) -> Result<()> {
        let snapshot = {
            let mut inner = self.inner.borrow_mut();
            match &mut inner.state {
                ListState::Dispatching => {
                    cfg_if::cfg_if! {
                        if #[cfg(feature = "performance_lints")] {
                            log::warn!(
                                "notify called re-entrantly from within one of this reactor's own listeners; the event is queued and dispatched after the current frame finishes, not inline"
                            );
                        }
                    }
                    inner.deferred.push(DeferredOp::Notify(event.clone()));
                    return Ok(());
                }
                ListState::Idle(order) => {
                    let snapshot = std::mem::take(order);
                    inner.state = ListState::Dispatching;
                    snapshot
                }
            }
        };

        let mut failures = Vec::new();
        for key in &snapshot {
            let (listener, dead_weak) = {
                let mut inner = self.inner.borrow_mut();
                let Some(reg) = inner.registrations.get_mut(*key) else {
                    continue;
                };
                if reg.closed {
                    continue;
                }
                match reg.holding.upgrade() {
                    Some(rc) => (Some(rc), false),
                    None => (None, true),
                }
            };
            if dead_weak {
                self.close_now(*key);
                continue;
            }
            let Some(listener) = listener else { continue };

            let invoked = match listener.try_borrow_mut() {
                Ok(mut callback) => {
                    if let Err(failure) = callback(event) {
                        log::debug!("listener reported a failure during dispatch");
                        failures.push(failure);
                    }
                    true
                }
                Err(_) => {
                    log::warn!(
                        "skipped a listener already executing higher up the call stack (re-entrant self-subscription)"
                    );
                    false
                }
            };
            // A skipped (re-entrant) pass never ran the listener, so a `once` registration must
            // stay open for its actual next chance to fire — closing it here would silently
            // drop the one invocation `once()` promises.
            if !invoked {
                continue;
            }

            let should_close_once = {
                let inner = self.inner.borrow();
                inner
                    .registrations
                    .get(*key)
                    .is_some_and(|reg| reg.once && !reg.closed)
            };
            if should_close_once {
                self.close_now(*key);
            }
        }

        {
            let mut inner = self.inner.borrow_mut();
            inner.state = ListState::Idle(snapshot);
        }

        if let Some(drain_failure) = self.drain_deferred() {
            failures.push(drain_failure);
        }

        match ReactiveError::from_many(failures) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Drain the deferred-operations FIFO to a fixed point, in insertion order. Returns the
    /// aggregated failure (if any) from nested `Notify` ops processed along the way.
    fn drain_deferred(&self) -> Option<ReactiveError> {
        let mut failures = Vec::new();
        loop {
            let next = {
                let mut inner = self.inner.borrow_mut();
                if inner.deferred.is_empty() {
                    None
                } else {
                    Some(inner.deferred.remove(0))
                }
            };
            let Some(op) = next else { break };
            match op {
                DeferredOp::InsertOrder(key) => {
                    let mut inner = self.inner.borrow_mut();
                    let ReactorInner {
                        state,
                        registrations,
                        ..
                    } = &mut *inner;
                    if let ListState::Idle(order) = state {
                        if registrations.get(key).is_some_and(|reg| !reg.closed) {
                            sorted_insert(order, key, registrations);
                        }
                    }
                }
                DeferredOp::Remove(key) => {
                    let mut inner = self.inner.borrow_mut();
                    match &mut inner.state {
                        ListState::Idle(order) => order.retain(|existing| *existing != key),
                        ListState::Dispatching => {
                            log::error!("deferred Remove processed while still dispatching");
                        }
                    }
                    inner.registrations.remove(key);
                }
                DeferredOp::AtPrio(key, priority) => {
                    let mut inner = self.inner.borrow_mut();
                    if let Some(reg) = inner.registrations.get_mut(key) {
                        if !reg.closed {
                            reg.priority = priority;
                        }
                    }
                    let ReactorInner {
                        state,
                        registrations,
                        ..
                    } = &mut *inner;
                    if let ListState::Idle(order) = state {
                        order.retain(|existing| *existing != key);
                        if registrations.get(key).is_some_and(|reg| !reg.closed) {
                            sorted_insert(order, key, registrations);
                        }
                    }
                }
                DeferredOp::Notify(event) => {
                    if let Err(err) = self.notify(&event) {
                        match err {
                            ReactiveError::MultiFailure(_, nested) => failures.extend(nested),
                            other => failures.push(other),
                        }
                    }
                }
            }
        }
        ReactiveError::from_many(failures)
    }
}

/// Bridges a type-erased `Connection` back to a specific `Reactor<Event>` registration.
struct RegHandle<Event> {
    reactor: Weak<RefCell<ReactorInner<Event>>>,
    key: RegKey,
}

impl<Event: Clone + 'static> ConnectionHandle for RegHandle<Event> {
    fn close(&self) {
        let Some(inner) = self.reactor.upgrade() else {
            return;
        };
        Reactor { inner }.close_now(self.key);
    }

    fn once(&self) {
        let Some(inner) = self.reactor.upgrade() else {
            return;
        };
        Reactor { inner }.once_now(self.key);
    }

    fn at_prio(&self, priority: i32) -> Result<()> {
        let Some(inner) = self.reactor.upgrade() else {
            return Ok(());
        };
        Reactor { inner }.at_prio_now(self.key, priority)
    }

    fn hold_weakly(&self) -> Result<()> {
        let Some(inner) = self.reactor.upgrade() else {
            return Ok(());
        };
        Reactor { inner }.hold_weakly_now(self.key)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;

    #[test]
    fn priority_ordering() {
        let reactor: Reactor<i32> = Reactor::new();
        let order = Rc::new(RefCell::new(Vec::new()));

        let mut connect_at = |prio: i32| {
            let order = Rc::clone(&order);
            let conn = reactor.connect(move |_| order.borrow_mut().push(prio));
            conn.at_prio(prio).expect("not closed");
        };
        connect_at(2);
        connect_at(4);
        connect_at(3);
        connect_at(1);

        reactor.notify(&0).expect("no failures");
        assert_eq!(*order.borrow(), vec![4, 3, 2, 1]);
    }

    #[test]
    fn add_during_dispatch_is_not_visible_to_current_frame() {
        let reactor: Reactor<i32> = Reactor::new();
        let events = Rc::new(RefCell::new(Vec::new()));

        let reactor_for_l1 = reactor.clone();
        let events_for_l2 = Rc::clone(&events);
        let conn1 = reactor.connect(move |_| {
            let events = Rc::clone(&events_for_l2);
            reactor_for_l1.connect(move |v| events.borrow_mut().push(*v));
        });
        conn1.once().expect("not closed");

        reactor.notify(&5).expect("no failures");
        assert!(events.borrow().is_empty());

        reactor.notify(&42).expect("no failures");
        assert_eq!(*events.borrow(), vec![42]);
    }

    #[test]
    fn remove_during_dispatch_is_visible() {
        let reactor: Reactor<i32> = Reactor::new();
        let seen = Rc::new(RefCell::new(Vec::new()));

        let seen_for_rem = Rc::clone(&seen);
        let rem_conn = reactor.connect(move |v| seen_for_rem.borrow_mut().push(*v));

        // Same (default) priority as `rem_conn`, inserted later, so insertion-order tie-breaking
        // runs it *after* `rem_conn` within the same dispatch frame.
        let closer_target = rem_conn.clone();
        let _closer = reactor.connect(move |_| closer_target.close());

        reactor.notify(&5).expect("no failures");
        assert_eq!(*seen.borrow(), vec![5]);

        reactor.notify(&42).expect("no failures");
        assert_eq!(*seen.borrow(), vec![5]);

        reactor.notify(&9).expect("no failures");
        assert_eq!(*seen.borrow(), vec![5]);
    }

    #[test]
    fn one_shot_fires_once() {
        let reactor: Reactor<i32> = Reactor::new();
        let count = Rc::new(RefCell::new(0));
        let count_clone = Rc::clone(&count);
        let conn = reactor.connect(move |_| *count_clone.borrow_mut() += 1);
        conn.once().expect("not closed");

        reactor.notify(&1).expect("no failures");
        reactor.notify(&2).expect("no failures");
        assert_eq!(*count.borrow(), 1);
    }

    #[test]
    fn weak_listener_collected_stops_dispatch() {
        let reactor: Reactor<i32> = Reactor::new();
        let listener: Rc<RefCell<ListenerFn<i32>>> = Rc::new(RefCell::new(|_: &i32| Ok(())));
        let conn = reactor.connect_shared(Rc::clone(&listener));
        conn.hold_weakly().expect("not closed");
        assert!(reactor.has_connections());

        drop(listener);
        assert!(!reactor.has_connections());

        reactor.notify(&1).expect("no failures");
    }

    #[test]
    fn unreachable_weak_self_owner_degenerates_to_immediate_reclaim() {
        // Connecting through `connect` gives the reactor sole ownership; marking it weak with no
        // external owner means the very next dispatch finds it already gone. This is weak holding
        // behaving exactly as specified (SPEC_FULL.md §9), not a bug.
        let reactor: Reactor<i32> = Reactor::new();
        let fired = Rc::new(RefCell::new(false));
        let fired_clone = Rc::clone(&fired);
        let conn = reactor.connect(move |_| *fired_clone.borrow_mut() = true);
        conn.hold_weakly().expect("not closed");

        reactor.notify(&1).expect("no failures");
        assert!(!*fired.borrow());
    }

    #[test]
    fn clear_connections_fails_while_dispatching() {
        let reactor: Reactor<i32> = Reactor::new();
        let reactor_clone = reactor.clone();
        let result = Rc::new(RefCell::new(None));
        let result_clone = Rc::clone(&result);
        reactor.connect(move |_| {
            *result_clone.borrow_mut() = Some(reactor_clone.clear_connections());
        });
        reactor.notify(&1).expect("outer notify itself does not fail");
        match result.borrow().as_ref() {
            Some(Err(ReactiveError::IllegalState(_))) => {}
            other => panic!("expected IllegalState, got {other:?}"),
        }
    }
}
