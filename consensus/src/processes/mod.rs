pub mod hasher;
pub mod hashgraph;
pub mod linker;
pub mod orphan_buffer;
pub mod shadowgraph;
pub mod window_manager;
