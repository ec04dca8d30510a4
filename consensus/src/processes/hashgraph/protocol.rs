//!
//! Ancestry primitives of the virtual voting protocol.
//!
//! All of them rely on the `last_see` vectors: for an event `x` and creator `c`, `last_see(x)[c]` is the latest
//! event by `c` which `x` can reach (`x` itself for its own creator). Creators are assumed not to fork, hence `x`
//! sees `y` exactly when `last_see(x)[creator(y)]` is at least as high as `y`.
//!

use crate::model::{
    arena::EventHandle,
    event::{ConsensusData, SeenEvent},
    stores::events::EventsStoreReader,
};
use weave_consensus_core::roster::Roster;

/// Element-wise maximum by generation over the parents' vectors, with the event itself in its own slot
pub(super) fn merge_last_see(
    store: &impl EventsStoreReader,
    creators: usize,
    parents: &[EventHandle],
    own: SeenEvent,
    own_index: usize,
) -> Vec<Option<SeenEvent>> {
    let mut last_see = vec![None; creators];
    for parent in parents.iter().filter_map(|p| store.get(*p)) {
        for (slot, seen) in last_see.iter_mut().zip(parent.consensus.last_see.iter()) {
            if let Some(seen) = seen
                && slot.is_none_or(|current: SeenEvent| current.generation < seen.generation)
            {
                *slot = Some(*seen);
            }
        }
    }
    last_see[own_index] = Some(own);
    last_see
}

/// True if the event behind `handle` sees an event of creator `creator_index` with generation `generation`
#[inline]
pub(super) fn sees(store: &impl EventsStoreReader, handle: EventHandle, creator_index: usize, generation: u64) -> bool {
    store.get(handle).is_some_and(|event| event.consensus.sees(creator_index, generation))
}

/// True if the creators through which `x` sees the target event hold a supermajority of the weight
pub(super) fn strongly_sees(
    store: &impl EventsStoreReader,
    roster: &Roster,
    x: &ConsensusData,
    creator_index: usize,
    generation: u64,
) -> bool {
    let weight: u64 = x
        .last_see
        .iter()
        .enumerate()
        .filter_map(|(c, seen)| seen.map(|seen| (c, seen)))
        .filter(|(_, seen)| sees(store, seen.handle, creator_index, generation))
        .map(|(c, _)| roster.weight(c))
        .sum();
    roster.is_supermajority(weight)
}
