//! Error kinds and the `Try` success-or-failure carrier.

use std::fmt;

/// The failure kinds raised by this crate.
///
/// Dispatch never panics on a listener failure (see [`crate::reactor`]); instead failures are
/// captured as values of this type and surfaced through the return value of the operation that
/// triggered dispatch (`emit`, `update`, `complete`, a collection mutation, ...).
#[derive(Debug, thiserror::Error)]
pub enum ReactiveError {
    /// An operation was attempted in a state that forbids it: clearing connections while
    /// dispatching or with deferred operations pending, completing an already-completed promise,
    /// or calling `at_prio`/`hold_weakly` on an already-closed connection.
    #[error("illegal state: {0}")]
    IllegalState(String),

    /// A single listener invocation failed.
    #[error("listener failed: {0}")]
    ListenerFailure(String),

    /// More than one failure accumulated during a single dispatch frame (or deferred-op drain),
    /// or more than one input to `Future::sequence` failed.
    #[error("{0} failures occurred: {1:?}")]
    MultiFailure(usize, Vec<ReactiveError>),

    /// An attempt to register a listener that was already dead (a `Weak` that fails to upgrade
    /// at registration time).
    #[error("attempted to register a null/already-dead listener")]
    NullListener,
}

impl ReactiveError {
    /// Build a `MultiFailure` from an accumulated list, collapsing to the single failure when
    /// there is exactly one, matching the propagation policy in the spec: "surface a MultiFailure
    /// (if more than one) or the single failure (if one)".
    pub(crate) fn from_many(mut failures: Vec<ReactiveError>) -> Option<ReactiveError> {
        match failures.len() {
            0 => None,
            1 => failures.pop(),
            _ => Some(ReactiveError::MultiFailure(failures.len(), failures)),
        }
    }
}

/// The crate's `Result` alias.
pub type Result<T> = std::result::Result<T, ReactiveError>;

/// An algebraic success-or-failure carrier with monadic combinators.
///
/// `Try` is distinct from `Result` in that it's the value-level type exchanged by `Future`s and
/// `Promise`s (a completed future holds an `Option<Try<T>>`), whereas `Result<T, ReactiveError>` is
/// used for fallible *operations* on the reactive types themselves (`at_prio`, `clear_connections`,
/// ...).
#[derive(Debug, Clone)]
pub enum Try<T> {
    /// The carried computation succeeded with this value.
    Success(T),
    /// The carried computation failed with this reason.
    Failure(ReactiveError),
}

impl<T> Try<T> {
    /// Build a successful `Try`.
    pub fn success(value: T) -> Self {
        Try::Success(value)
    }

    /// Build a failed `Try`.
    pub fn failure(reason: ReactiveError) -> Self {
        Try::Failure(reason)
    }

    /// `true` if this is a `Success`.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Try::Success(_))
    }

    /// `true` if this is a `Failure`.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(self, Try::Failure(_))
    }

    /// Apply `f` to the success value, passing a failure through unchanged.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Try<U> {
        match self {
            Try::Success(v) => Try::Success(f(v)),
            Try::Failure(e) => Try::Failure(e),
        }
    }

    /// Chain a `Try`-returning computation onto the success value.
    pub fn flat_map<U>(self, f: impl FnOnce(T) -> Try<U>) -> Try<U> {
        match self {
            Try::Success(v) => f(v),
            Try::Failure(e) => Try::Failure(e),
        }
    }

    /// Turn a failure into a success by applying `f` to the failure reason; a success passes
    /// through unchanged.
    pub fn recover(self, f: impl FnOnce(&ReactiveError) -> T) -> Try<T> {
        match self {
            Try::Success(v) => Try::Success(v),
            Try::Failure(e) => {
                let recovered = f(&e);
                Try::Success(recovered)
            }
        }
    }

    /// Convert to a plain `Option`, discarding the failure reason.
    #[must_use]
    pub fn ok(self) -> Option<T> {
        match self {
            Try::Success(v) => Some(v),
            Try::Failure(_) => None,
        }
    }

    /// Convert to a `Result`.
    pub fn into_result(self) -> Result<T> {
        match self {
            Try::Success(v) => Ok(v),
            Try::Failure(e) => Err(e),
        }
    }
}

impl<T> From<Result<T>> for Try<T> {
    fn from(result: Result<T>) -> Self {
        match result {
            Ok(v) => Try::Success(v),
            Err(e) => Try::Failure(e),
        }
    }
}

impl<T: fmt::Debug> fmt::Display for Try<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Try::Success(v) => write!(f, "Success({v:?})"),
            Try::Failure(e) => write!(f, "Failure({e})"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn map_roundtrip() {
        let doubled = Try::success(21).map(|v: i32| v * 2);
        match doubled {
            Try::Success(v) => assert_eq!(v, 42),
            Try::Failure(_) => panic!("expected success"),
        }
    }

    #[test]
    fn recover_roundtrip() {
        let err = ReactiveError::IllegalState("boom".into());
        let recovered: Try<i32> = Try::failure(err).recover(|_| 7);
        match recovered {
            Try::Success(v) => assert_eq!(v, 7),
            Try::Failure(_) => panic!("expected recovered success"),
        }
    }

    #[test]
    fn flat_map_short_circuits_on_failure() {
        let err = ReactiveError::IllegalState("boom".into());
        let result: Try<i32> = Try::<i32>::failure(err).flat_map(|v| Try::success(v + 1));
        assert!(result.is_failure());
    }
}
