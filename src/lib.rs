//! Low-level reactive dispatch primitives.
//!
//! This crate provides a single-threaded reactive core built around one idea: a
//! [`reactor::Reactor`] that dispatches an event to a priority-ordered list of listeners, safely
//! even when those listeners themselves add, remove, or re-prioritize listeners on the same
//! reactor. Everything else in the crate — [`signal::Signal`], [`value::Value`],
//! [`future::Future`], and the observable collections — is a `Reactor` wearing a particular shape
//! of event.
//!
//! Every type here is `!Send`/`!Sync` by construction (built on `Rc`/`RefCell`, not
//! `Arc`/`Mutex`): the library assumes a single-threaded, cooperative embedding, the same way a UI
//! event loop or a test harness drives things, and leans on the type system rather than runtime
//! checks to keep it that way.
//!
//! ```
//! use reactive_core::signal::Signal;
//!
//! let ticks: Signal<u32> = Signal::new();
//! let seen = std::rc::Rc::new(std::cell::RefCell::new(0));
//! let seen_clone = std::rc::Rc::clone(&seen);
//! let _conn = ticks.connect(move |tick| *seen_clone.borrow_mut() = *tick);
//!
//! ticks.emit(&7).expect("no listener failures");
//! assert_eq!(*seen.borrow(), 7);
//! ```

#![forbid(unsafe_code)]
#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::panic,
        clippy::arithmetic_side_effects
    )
)]

pub mod closeable;
pub mod collections;
pub mod connection;
pub mod error;
pub mod future;
mod reactor;
pub mod signal;
pub mod value;


/// Commonly used types, re-exported for a single `use reactive_core::prelude::*;`.
pub mod prelude {
    pub use crate::closeable::{Closeable, CloseableSet};
    pub use crate::collections::{ListChange, MapChange, RList, RMap, RSet, SetChange};
    pub use crate::connection::Connection;
    pub use crate::error::{ReactiveError, Try};
    pub use crate::future::{sequence2, sequence3, Future, Promise};
    pub use crate::signal::{Signal, UnitSignal};
    pub use crate::value::{as_value, toggler, Value, ValueChange};
}
