//!
//! Concurrency primitives shared by the weave crates
//!

pub mod refcount;
pub mod sync;
