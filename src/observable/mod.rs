//! Push-based observable streams.
//!
//! [`Observable`] is a reusable description of a value sequence; subscribing
//! runs it. Events are delivered synchronously in the calling stack; the
//! only asynchronous boundaries in this module are `from_future`/`to_future`
//! (task boundary) and `poll` (timer).

pub mod combinators;
pub mod constructors;
pub mod core;
pub mod merge;
pub mod utility;

// Re-export core types
pub use self::core::{Cleanup, Observable, Observer, Sink, Subscription};
