//! `Future<T>` / `Promise<T>`: a one-shot reactive result.
//!
//! This is not `std::future::Future` — nothing here is polled or awaited by an executor. A
//! `Future<T>` is a reactive cell that starts empty and transitions exactly once to holding a
//! `crate::error::Try<T>`, notifying interested listeners as it does (SPEC_FULL.md §4.5). The
//! split mirrors natrix's `async_state.rs`, which tracks completion of a background computation
//! as ordinary reactive state rather than as a pollable task.

use std::cell::RefCell;
use std::rc::Rc;

use crate::connection::Connection;
use crate::error::{ReactiveError, Result, Try};
use crate::reactor::Reactor;
use crate::value::Value;

struct Inner<T> {
    result: RefCell<Option<Try<T>>>,
    reactor: Reactor<Try<T>>,
    is_complete: Value<bool>,
}

/// A one-shot reactive result: empty until `complete`/`succeed`/`fail` is called, after which it
/// is permanently settled.
pub struct Future<T> {
    inner: Rc<Inner<T>>,
}

impl<T> Clone for Future<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

/// A writable handle to a `Future`. In this crate `Promise<T>` and `Future<T>` are the same
/// underlying handle (both can read and write) — the distinction is documentary, matching
/// SPEC_FULL.md §6's split between "producer-facing" and "consumer-facing" naming.
pub type Promise<T> = Future<T>;

impl<T: Clone + 'static> Default for Future<T> {
    fn default() -> Self {
        Self::pending()
    }
}

impl<T: Clone + 'static> Future<T> {
    /// Create a future with no result yet.
    #[must_use]
    pub fn pending() -> Self {
        Self {
            inner: Rc::new(Inner {
                result: RefCell::new(None),
                reactor: Reactor::new(),
                is_complete: Value::new(false),
            }),
        }
    }

    /// Create an already-succeeded future.
    #[must_use]
    pub fn success(value: T) -> Self {
        let future = Self::pending();
        future.complete(Try::success(value)).ok();
        future
    }

    /// Create an already-failed future.
    #[must_use]
    pub fn failure(reason: ReactiveError) -> Self {
        let future = Self::pending();
        future.complete(Try::failure(reason)).ok();
        future
    }

    /// The current result, if this future has completed.
    #[must_use]
    pub fn result(&self) -> Option<Try<T>> {
        self.inner.result.borrow().clone()
    }

    /// A reactive view of whether this future has completed yet. Constructed eagerly at
    /// `pending()` time rather than lazily on first access (SPEC_FULL.md §9 open question,
    /// resolved in DESIGN.md): the underlying `Value` is cheap to hold and this keeps
    /// `is_complete` a pure accessor with no interior first-call special case.
    #[must_use]
    pub fn is_complete(&self) -> Value<bool> {
        self.inner.is_complete.clone()
    }

    /// `true` if this future has already settled, without cloning a `Value`.
    #[must_use]
    pub fn is_complete_now(&self) -> bool {
        self.inner.result.borrow().is_some()
    }

    /// Settle this future with an already-built `Try`.
    ///
    /// # Errors
    /// Returns `ReactiveError::IllegalState` if this future has already settled; completing twice
    /// is a programming error, not a silently-ignored no-op.
    pub fn complete(&self, value: Try<T>) -> Result<()> {
        if self.is_complete_now() {
            return Err(ReactiveError::IllegalState(
                "Future::complete called on an already-completed future".to_owned(),
            ));
        }
        *self.inner.result.borrow_mut() = Some(value.clone());
        self.inner.is_complete.update(true).ok();
        let dispatch_result = self.inner.reactor.notify(&value);
        if let Err(err) = self.inner.reactor.clear_connections() {
            log::debug!("could not clear future listeners after completion: {err}");
        }
        dispatch_result
    }

    /// Settle this future with a success value.
    ///
    /// # Errors
    /// Returns `ReactiveError::IllegalState` if this future has already settled.
    pub fn succeed(&self, value: T) -> Result<()> {
        self.complete(Try::success(value))
    }

    /// Settle this future with a failure.
    ///
    /// # Errors
    /// Returns `ReactiveError::IllegalState` if this future has already settled.
    pub fn fail(&self, reason: ReactiveError) -> Result<()> {
        self.complete(Try::failure(reason))
    }

    /// Register a listener invoked once, whenever this future settles (success or failure). If
    /// the future has already settled, the listener is invoked immediately and synchronously.
    pub fn on_complete(&self, mut listener: impl FnMut(&Try<T>) + 'static) -> Connection {
        if let Some(result) = self.result() {
            listener(&result);
            return Connection::noop();
        }
        let conn = self.inner.reactor.connect(move |result: &Try<T>| listener(result));
        conn.once().ok();
        conn
    }

    /// Register a listener invoked only if/when this future settles successfully.
    pub fn on_success(&self, mut listener: impl FnMut(&T) + 'static) -> Connection {
        self.on_complete(move |result| {
            if let Try::Success(value) = result {
                listener(value);
            }
        })
    }

    /// Register a listener invoked only if/when this future settles with a failure.
    pub fn on_failure(&self, mut listener: impl FnMut(&ReactiveError) + 'static) -> Connection {
        self.on_complete(move |result| {
            if let Try::Failure(reason) = result {
                listener(reason);
            }
        })
    }

    /// Derive a future that resolves to `f` applied to this future's success value, or passes a
    /// failure through unchanged.
    #[must_use]
    pub fn map<U: Clone + 'static>(&self, f: impl FnOnce(T) -> U + 'static) -> Future<U> {
        self.transform(move |result| result.map(f))
    }

    /// Chain a future-returning computation onto this future's success value, where the inner
    /// future may settle at a different type than the outer one.
    #[must_use]
    pub fn flat_map<U: Clone + 'static>(
        &self,
        f: impl FnOnce(T) -> Future<U> + 'static,
    ) -> Future<U> {
        let derived = Future::pending();
        let derived_for_complete = derived.clone();
        let mut f = Some(f);
        self.on_complete(move |result| match result {
            Try::Success(value) => {
                let Some(f) = f.take() else {
                    log::error!("Future::flat_map callback invoked more than once");
                    return;
                };
                let inner_future = f(value.clone());
                let derived_for_inner = derived_for_complete.clone();
                inner_future.on_complete(move |inner_result| {
                    derived_for_inner.complete(inner_result.clone()).ok();
                });
            }
            Try::Failure(reason) => {
                derived_for_complete
                    .complete(Try::failure(reason.clone()))
                    .ok();
            }
        });
        derived
    }

    /// Derive a future that turns a failure into a success by applying `f`, passing a success
    /// through unchanged.
    #[must_use]
    pub fn recover(&self, f: impl FnOnce(&ReactiveError) -> T + 'static) -> Future<T> {
        self.transform(move |result| result.recover(f))
    }

    /// Derive a future whose result is `f` applied to this future's raw `Try`, the most general
    /// combinator `map`/`recover` are both expressed in terms of.
    #[must_use]
    pub fn transform<U: Clone + 'static>(&self, f: impl FnOnce(Try<T>) -> Try<U> + 'static) -> Future<U> {
        let derived = Future::pending();
        let derived_for_complete = derived.clone();
        let mut f = Some(f);
        self.on_complete(move |result| {
            let Some(f) = f.take() else {
                log::error!("Future::transform callback invoked more than once");
                return;
            };
            derived_for_complete.complete(f(result.clone())).ok();
        });
        derived
    }

    /// Settle once every future in `futures` has settled, with a `Vec` of their results in the
    /// same order as the input. If any input fails, the aggregate fails with a multi-failure
    /// aggregating every individual failure in the order they arrived (not input order); an
    /// empty input succeeds immediately with an empty list.
    #[must_use]
    pub fn sequence(futures: Vec<Future<T>>) -> Future<Vec<T>> {
        let total = futures.len();
        let combined = Future::pending();
        if total == 0 {
            combined.succeed(Vec::new()).ok();
            return combined;
        }

        let collected: Rc<RefCell<Vec<Option<T>>>> =
            Rc::new(RefCell::new((0..total).map(|_| None).collect()));
        let failures: Rc<RefCell<Vec<ReactiveError>>> = Rc::new(RefCell::new(Vec::new()));
        let remaining = Rc::new(RefCell::new(total));

        for (index, future) in futures.into_iter().enumerate() {
            let collected = Rc::clone(&collected);
            let failures = Rc::clone(&failures);
            let remaining = Rc::clone(&remaining);
            let combined = combined.clone();
            future.on_complete(move |result| {
                match result {
                    Try::Success(v) => {
                        if let Some(slot) = collected.borrow_mut().get_mut(index) {
                            *slot = Some(v.clone());
                        } else {
                            log::error!("Future::sequence index out of range");
                        }
                    }
                    // Pushed as each failure actually arrives, so the aggregate's failure list
                    // reflects completion order rather than input position.
                    Try::Failure(e) => failures.borrow_mut().push(e.clone()),
                }
                let mut remaining_ref = remaining.borrow_mut();
                *remaining_ref = remaining_ref.saturating_sub(1);
                if *remaining_ref == 0 {
                    let failures = std::mem::take(&mut *failures.borrow_mut());
                    let outcome = match ReactiveError::from_many(failures) {
                        Some(err) => Try::failure(err),
                        None => {
                            let mut values = Vec::with_capacity(total);
                            for slot in std::mem::take(&mut *collected.borrow_mut()) {
                                match slot {
                                    Some(v) => values.push(v),
                                    None => log::error!(
                                        "Future::sequence finished with an unsettled slot"
                                    ),
                                }
                            }
                            Try::success(values)
                        }
                    };
                    combined.complete(outcome).ok();
                }
            });
        }
        combined
    }

    /// Settle once every future in `futures` has settled, with only the successful results, in
    /// arrival order. Failures are silently dropped; always succeeds, possibly with an empty list.
    #[must_use]
    pub fn collect(futures: Vec<Future<T>>) -> Future<Vec<T>> {
        let total = futures.len();
        let combined = Future::pending();
        if total == 0 {
            combined.succeed(Vec::new()).ok();
            return combined;
        }

        let collected: Rc<RefCell<Vec<T>>> = Rc::new(RefCell::new(Vec::new()));
        let remaining = Rc::new(RefCell::new(total));

        for future in futures {
            let collected = Rc::clone(&collected);
            let remaining = Rc::clone(&remaining);
            let combined = combined.clone();
            future.on_complete(move |result| {
                if let Try::Success(value) = result {
                    collected.borrow_mut().push(value.clone());
                }
                let mut remaining_ref = remaining.borrow_mut();
                *remaining_ref = remaining_ref.saturating_sub(1);
                if *remaining_ref == 0 {
                    let results = std::mem::take(&mut *collected.borrow_mut());
                    combined.succeed(results).ok();
                }
            });
        }
        combined
    }
}

/// Settle once both `a` and `b` have settled, pairing their results. If either (or both) fails,
/// the aggregate fails with a multi-failure aggregating every individual failure in arrival
/// order. The heterogeneous-type counterpart of `Future::sequence` for the common fixed-arity
/// case named in SPEC_FULL.md §4.5.
#[must_use]
pub fn sequence2<A: Clone + 'static, B: Clone + 'static>(
    a: Future<A>,
    b: Future<B>,
) -> Future<(A, B)> {
    let combined = Future::pending();
    let state: Rc<RefCell<(Option<Try<A>>, Option<Try<B>>)>> =
        Rc::new(RefCell::new((None, None)));

    {
        let state = Rc::clone(&state);
        let combined = combined.clone();
        a.on_complete(move |result| {
            state.borrow_mut().0 = Some(result.clone());
            finish_pair(&state, &combined);
        });
    }
    {
        let state = Rc::clone(&state);
        let combined = combined.clone();
        b.on_complete(move |result| {
            state.borrow_mut().1 = Some(result.clone());
            finish_pair(&state, &combined);
        });
    }
    combined
}

fn finish_pair<A: Clone, B: Clone>(
    state: &Rc<RefCell<(Option<Try<A>>, Option<Try<B>>)>>,
    combined: &Future<(A, B)>,
) {
    let (a, b) = {
        let state = state.borrow();
        let (Some(a), Some(b)) = (state.0.clone(), state.1.clone()) else {
            return;
        };
        (a, b)
    };
    let mut failures = Vec::new();
    let a_value = match a {
        Try::Success(v) => Some(v),
        Try::Failure(e) => {
            failures.push(e);
            None
        }
    };
    let b_value = match b {
        Try::Success(v) => Some(v),
        Try::Failure(e) => {
            failures.push(e);
            None
        }
    };
    let outcome = match (ReactiveError::from_many(failures), a_value, b_value) {
        (Some(err), _, _) => Try::failure(err),
        (None, Some(a_value), Some(b_value)) => Try::success((a_value, b_value)),
        (None, _, _) => {
            log::error!("Future::sequence2 finished with no failures but a missing value");
            return;
        }
    };
    combined.complete(outcome).ok();
}

/// Settle once `a`, `b`, and `c` have all settled, pairing their results into a triple. Same
/// failure-aggregation semantics as `sequence2`.
#[must_use]
pub fn sequence3<A: Clone + 'static, B: Clone + 'static, C: Clone + 'static>(
    a: Future<A>,
    b: Future<B>,
    c: Future<C>,
) -> Future<(A, B, C)> {
    let combined = Future::pending();
    let state: Rc<RefCell<(Option<Try<A>>, Option<Try<B>>, Option<Try<C>>)>> =
        Rc::new(RefCell::new((None, None, None)));

    {
        let state = Rc::clone(&state);
        let combined = combined.clone();
        a.on_complete(move |result| {
            state.borrow_mut().0 = Some(result.clone());
            finish_triple(&state, &combined);
        });
    }
    {
        let state = Rc::clone(&state);
        let combined = combined.clone();
        b.on_complete(move |result| {
            state.borrow_mut().1 = Some(result.clone());
            finish_triple(&state, &combined);
        });
    }
    {
        let state = Rc::clone(&state);
        let combined = combined.clone();
        c.on_complete(move |result| {
            state.borrow_mut().2 = Some(result.clone());
            finish_triple(&state, &combined);
        });
    }
    combined
}

fn finish_triple<A: Clone, B: Clone, C: Clone>(
    state: &Rc<RefCell<(Option<Try<A>>, Option<Try<B>>, Option<Try<C>>)>>,
    combined: &Future<(A, B, C)>,
) {
    let (a, b, c) = {
        let state = state.borrow();
        let (Some(a), Some(b), Some(c)) = (state.0.clone(), state.1.clone(), state.2.clone())
        else {
            return;
        };
        (a, b, c)
    };
    let mut failures = Vec::new();
    let a_value = match a {
        Try::Success(v) => Some(v),
        Try::Failure(e) => {
            failures.push(e);
            None
        }
    };
    let b_value = match b {
        Try::Success(v) => Some(v),
        Try::Failure(e) => {
            failures.push(e);
            None
        }
    };
    let c_value = match c {
        Try::Success(v) => Some(v),
        Try::Failure(e) => {
            failures.push(e);
            None
        }
    };
    let outcome = match (
        ReactiveError::from_many(failures),
        a_value,
        b_value,
        c_value,
    ) {
        (Some(err), ..) => Try::failure(err),
        (None, Some(a_value), Some(b_value), Some(c_value)) => {
            Try::success((a_value, b_value, c_value))
        }
        (None, ..) => {
            log::error!("Future::sequence3 finished with no failures but a missing value");
            return;
        }
    };
    combined.complete(outcome).ok();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[test]
    fn completes_successfully_and_notifies() {
        let future: Future<i32> = Future::pending();
        let seen = Rc::new(RefCell::new(None));
        let seen_clone = Rc::clone(&seen);
        future.on_success(move |v| *seen_clone.borrow_mut() = Some(*v));

        future.succeed(42).expect("not yet completed");
        assert_eq!(*seen.borrow(), Some(42));
        assert!(future.is_complete().get());
    }

    #[test]
    fn completing_twice_is_an_illegal_state() {
        let future: Future<i32> = Future::pending();
        future.succeed(1).expect("not yet completed");
        match future.succeed(2) {
            Err(ReactiveError::IllegalState(_)) => {}
            other => panic!("expected IllegalState, got {other:?}"),
        }
    }

    #[test]
    fn on_complete_fires_immediately_if_already_settled() {
        let future = Future::success(7);
        let seen = Rc::new(RefCell::new(None));
        let seen_clone = Rc::clone(&seen);
        future.on_success(move |v| *seen_clone.borrow_mut() = Some(*v));
        assert_eq!(*seen.borrow(), Some(7));
    }

    #[test]
    fn map_transforms_success() {
        let future: Future<i32> = Future::pending();
        let mapped = future.map(|v| v * 2);
        future.succeed(21).expect("not yet completed");
        assert_eq!(mapped.result().and_then(Try::ok), Some(42));
    }

    #[test]
    fn flat_map_chains_to_a_different_type() {
        let future: Future<i32> = Future::pending();
        let chained = future.flat_map(|v| Future::success(format!("value={v}")));
        future.succeed(7).expect("not yet completed");
        assert_eq!(
            chained.result().and_then(Try::ok),
            Some("value=7".to_owned())
        );
    }

    #[test]
    fn recover_turns_failure_into_success() {
        let future: Future<i32> = Future::pending();
        let recovered = future.recover(|_| -1);
        future
            .fail(ReactiveError::IllegalState("boom".into()))
            .expect("not yet completed");
        assert_eq!(recovered.result().and_then(Try::ok), Some(-1));
    }

    #[test]
    fn sequence_waits_for_all_and_preserves_order() {
        let a: Future<i32> = Future::pending();
        let b: Future<i32> = Future::pending();
        let c: Future<i32> = Future::pending();
        let combined = Future::sequence(vec![a.clone(), b.clone(), c.clone()]);

        b.succeed(2).expect("not yet completed");
        assert!(combined.result().is_none());
        a.succeed(1).expect("not yet completed");
        assert!(combined.result().is_none());
        c.succeed(3).expect("not yet completed");

        assert_eq!(combined.result().and_then(Try::ok), Some(vec![1, 2, 3]));
    }

    #[test]
    fn sequence_collapses_failures() {
        let a: Future<i32> = Future::pending();
        let b: Future<i32> = Future::pending();
        let combined = Future::sequence(vec![a.clone(), b.clone()]);

        a.fail(ReactiveError::IllegalState("first".into()))
            .expect("not yet completed");
        b.fail(ReactiveError::IllegalState("second".into()))
            .expect("not yet completed");

        match combined.result() {
            Some(Try::Failure(ReactiveError::MultiFailure(count, _))) => assert_eq!(count, 2),
            other => panic!("expected MultiFailure, got {other:?}"),
        }
    }

    #[test]
    fn sequence_orders_failures_by_arrival_not_input_position() {
        let a: Future<i32> = Future::pending();
        let b: Future<i32> = Future::pending();
        let c: Future<i32> = Future::pending();
        // Input order is [a, b, c], but c fails first, then a, then b succeeds.
        let combined = Future::sequence(vec![a.clone(), b.clone(), c.clone()]);

        c.fail(ReactiveError::IllegalState("from c".into()))
            .expect("not yet completed");
        a.fail(ReactiveError::IllegalState("from a".into()))
            .expect("not yet completed");
        b.succeed(2).expect("not yet completed");

        match combined.result() {
            Some(Try::Failure(ReactiveError::MultiFailure(2, reasons))) => {
                let messages: Vec<String> = reasons.iter().map(ToString::to_string).collect();
                assert_eq!(
                    messages,
                    vec![
                        "listener failed: from c".to_owned(),
                        "listener failed: from a".to_owned(),
                    ]
                );
            }
            other => panic!("expected ordered MultiFailure, got {other:?}"),
        }
    }

    #[test]
    fn sequence2_pairs_results() {
        let a: Future<i32> = Future::pending();
        let b: Future<&'static str> = Future::pending();
        let combined = sequence2(a.clone(), b.clone());

        b.succeed("ok").expect("not yet completed");
        assert!(combined.result().is_none());
        a.succeed(1).expect("not yet completed");

        assert_eq!(combined.result().and_then(Try::ok), Some((1, "ok")));
    }

    #[test]
    fn sequence2_fails_if_either_input_fails() {
        let a: Future<i32> = Future::pending();
        let b: Future<i32> = Future::pending();
        let combined = sequence2(a.clone(), b.clone());

        a.succeed(1).expect("not yet completed");
        b.fail(ReactiveError::IllegalState("boom".into()))
            .expect("not yet completed");

        match combined.result() {
            Some(Try::Failure(ReactiveError::IllegalState(_))) => {}
            other => panic!("expected IllegalState, got {other:?}"),
        }
    }

    #[test]
    fn sequence3_pairs_three_results() {
        let a: Future<i32> = Future::pending();
        let b: Future<i32> = Future::pending();
        let c: Future<i32> = Future::pending();
        let combined = sequence3(a.clone(), b.clone(), c.clone());

        c.succeed(3).expect("not yet completed");
        a.succeed(1).expect("not yet completed");
        b.succeed(2).expect("not yet completed");

        assert_eq!(combined.result().and_then(Try::ok), Some((1, 2, 3)));
    }

    #[test]
    fn collect_drops_failures_and_keeps_successes_in_arrival_order() {
        let a: Future<i32> = Future::pending();
        let b: Future<i32> = Future::pending();
        let c: Future<i32> = Future::pending();
        let combined = Future::collect(vec![a.clone(), b.clone(), c.clone()]);

        b.succeed(2).expect("not yet completed");
        a.fail(ReactiveError::IllegalState("dropped".into()))
            .expect("not yet completed");
        c.succeed(3).expect("not yet completed");

        assert_eq!(combined.result().and_then(Try::ok), Some(vec![2, 3]));
    }
}
