//! # Event intake and consensus ordering
//!
//! Events flow through a fixed graph of pipeline stages:
//!
//! ```text
//! hasher -> orphan buffer -> linker -> { shadowgraph, consensus engine }
//!                 ^            ^            ^              |
//!                 +------------+------------+-- windows ---+
//! ```
//!
//! The consensus engine emits decided rounds together with the non-ancient event window which follows them.
//! Windows are fed back to every stage which retains events, so memory stays bounded by the window size.
//!
//! ## Invariants
//!
//! - The linker only ever receives events whose non-ancient parents were linked before them. The orphan buffer
//!   holds events back until this holds, hence the linker output is a topological order.
//! - Windows never regress. Every stage ignores a window which is behind the one it already applied.
//! - Consensus data of linked events is written by the consensus engine only.

pub mod errors;
pub mod model;
pub mod nexus;
pub mod pipeline;
pub mod processes;
pub mod test_helpers;
