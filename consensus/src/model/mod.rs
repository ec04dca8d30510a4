pub mod arena;
pub mod event;
pub mod stores;
