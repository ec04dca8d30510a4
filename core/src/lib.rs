extern crate self as weave_core;

pub mod assert;
pub mod log;
pub mod time;
