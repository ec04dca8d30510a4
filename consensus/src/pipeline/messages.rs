//!
//! Messages exchanged between the intake stages. Besides events, stages which retain events receive window
//! updates from the consensus feedback loop and reset requests.
//!

use crate::model::arena::EventHandle;
use std::sync::Arc;
use weave_consensus_core::{
    event::{GossipEvent, HashedEvent},
    snapshot::ConsensusSnapshot,
    window::EventWindow,
};

pub enum HasherMessage {
    Event(GossipEvent),
    /// Hashed in parallel, released in input order
    Batch(Vec<GossipEvent>),
}

pub enum OrphanBufferMessage {
    Event(Arc<HashedEvent>),
    EventWindow(EventWindow),
    Clear,
}

pub enum LinkerMessage {
    Event(Arc<HashedEvent>),
    EventWindow(EventWindow),
    Clear,
}

pub enum ShadowgraphMessage {
    Event(EventHandle),
    EventWindow(EventWindow),
    /// Drops everything and adopts the window, even if it is behind the current one
    StartWith(EventWindow),
    Clear,
}

pub enum ConsensusMessage {
    Event(EventHandle),
    LoadSnapshot(Box<ConsensusSnapshot>),
    /// Toggles dropping of the consensus output
    Squelch(bool),
    Clear,
}
