//! Observable containers: `RList`, `RMap`, `RSet`.
//!
//! Each wraps a plain backing store plus a `crate::reactor::Reactor` declared over the
//! container's own change-event enum, and follows the same "mutate backing store, then notify"
//! sequencing the teacher's DOM-backed `dom::list::List` uses for keeping rendered children in
//! sync with application state — generalized here to plain data with no DOM step.

pub mod list;
pub mod map;
pub mod set;

pub use list::{ListChange, RList};
pub use map::{MapChange, RMap};
pub use set::{RSet, SetChange};
