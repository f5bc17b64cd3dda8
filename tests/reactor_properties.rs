//! Property tests for `Try` monad laws and dispatch priority ordering.
//!
//! These exercise the crate purely through its public surface (`reactive_core::prelude`);
//! the dispatch core itself (`reactor::Reactor`) is crate-private, so priority ordering is
//! observed through `Signal`, the thinnest public wrapper around it.

use proptest::prelude::*;
use reactive_core::error::{ReactiveError, Try};
use reactive_core::signal::Signal;
use std::cell::RefCell;
use std::rc::Rc;

proptest! {
    /// `Try::map(identity)` changes nothing.
    #[test]
    fn try_map_identity_law(value in any::<i32>()) {
        let t = Try::success(value).map(|v: i32| v);
        prop_assert!(matches!(t, Try::Success(v) if v == value));
    }

    /// `Try::map` composes: `map(f).map(g) == map(|v| g(f(v)))`.
    #[test]
    fn try_map_composition_law(value in any::<i32>(), add in -100i32..100, mul in -10i32..10) {
        let f = move |v: i32| v.wrapping_add(add);
        let g = move |v: i32| v.wrapping_mul(mul);

        let sequential = Try::success(value).map(f).map(g);
        let composed = Try::success(value).map(move |v| g(f(v)));

        match (sequential, composed) {
            (Try::Success(a), Try::Success(b)) => prop_assert_eq!(a, b),
            other => prop_assert!(false, "expected two successes, got {other:?}"),
        }
    }

    /// A `Failure` is a fixed point of `map`: no amount of mapping turns it into a success, and
    /// the carried reason is untouched.
    #[test]
    fn try_map_short_circuits_on_failure(reason in ".*", add in -100i32..100) {
        let failed: Try<i32> = Try::failure(ReactiveError::ListenerFailure(reason.clone()));
        let mapped = failed.map(move |v| v.wrapping_add(add));
        match mapped {
            Try::Failure(ReactiveError::ListenerFailure(msg)) => prop_assert_eq!(msg, reason),
            other => prop_assert!(false, "expected the original failure preserved, got {other:?}"),
        }
    }

    /// `recover` always yields a `Success`, whether the input already was one or not.
    #[test]
    fn try_recover_always_succeeds(value in any::<i32>(), is_failure in any::<bool>()) {
        let input = if is_failure {
            Try::failure(ReactiveError::ListenerFailure("boom".to_owned()))
        } else {
            Try::success(value)
        };
        let recovered = input.recover(|_| -1);
        prop_assert!(recovered.is_success());
    }

    /// Listeners registered at arbitrary priorities always dispatch in priority-descending order,
    /// breaking ties by registration order, regardless of how many listeners or what the
    /// priorities are.
    #[test]
    fn priority_ordering_is_descending_with_stable_ties(
        priorities in prop::collection::vec(-20i32..20, 1..30)
    ) {
        let signal: Signal<i32> = Signal::new();
        let order = Rc::new(RefCell::new(Vec::new()));

        for (seq, priority) in priorities.iter().enumerate() {
            let order = Rc::clone(&order);
            let conn = signal.connect(move |_| order.borrow_mut().push(seq));
            conn.at_prio(*priority).expect("connection is not yet closed");
        }

        signal.emit(&0).expect("no listener failures");

        let fired = order.borrow().clone();
        let mut indexed: Vec<(usize, i32)> = priorities
            .iter()
            .copied()
            .enumerate()
            .collect();
        indexed.sort_by(|(seq_a, prio_a), (seq_b, prio_b)| {
            prio_b.cmp(prio_a).then(seq_a.cmp(seq_b))
        });
        let expected: Vec<usize> = indexed.into_iter().map(|(seq, _)| seq).collect();

        prop_assert_eq!(fired, expected);
    }
}
