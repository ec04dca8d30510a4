use super::arena::EventHandle;
use std::sync::Arc;
use weave_consensus_core::{Round, event::HashedEvent};

/// Fame of a witness. Once decided it never changes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Fame {
    #[default]
    Undecided,
    Famous,
    NotFamous,
}

impl Fame {
    pub fn is_decided(self) -> bool {
        self != Fame::Undecided
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum EventRole {
    #[default]
    Ordinary,
    Witness(Fame),
}

impl EventRole {
    pub fn is_witness(self) -> bool {
        matches!(self, EventRole::Witness(_))
    }

    pub fn fame(self) -> Option<Fame> {
        match self {
            EventRole::Ordinary => None,
            EventRole::Witness(fame) => Some(fame),
        }
    }

    pub fn is_famous(self) -> bool {
        self == EventRole::Witness(Fame::Famous)
    }
}

/// The latest event of some creator which is an ancestor of (or is) a given event
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SeenEvent {
    pub handle: EventHandle,
    pub generation: u64,
}

/// Metadata maintained by the consensus engine. `round_created` is `None` until the engine processed the event.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ConsensusData {
    pub creator_index: usize,
    pub round_created: Option<Round>,
    pub role: EventRole,
    pub round_received: Option<Round>,
    pub consensus_timestamp: Option<u64>,
    pub consensus_order: Option<u64>,
    pub stale: bool,
    /// Indexed by creator index
    pub last_see: Vec<Option<SeenEvent>>,
}

impl ConsensusData {
    pub fn is_processed(&self) -> bool {
        self.round_created.is_some()
    }

    /// True if this event sees an event of creator `creator_index` with generation `generation`
    #[inline]
    pub fn sees(&self, creator_index: usize, generation: u64) -> bool {
        matches!(self.last_see.get(creator_index), Some(Some(seen)) if seen.generation >= generation)
    }
}

/// A hashed event with resolved parent links. A `None` parent was ancient when the event was linked.
#[derive(Clone, Debug)]
pub struct LinkedEvent {
    pub event: Arc<HashedEvent>,
    pub self_parent: Option<EventHandle>,
    pub other_parent: Option<EventHandle>,
    pub consensus: ConsensusData,
}

impl LinkedEvent {
    pub fn new(event: Arc<HashedEvent>, self_parent: Option<EventHandle>, other_parent: Option<EventHandle>) -> Self {
        Self { event, self_parent, other_parent, consensus: Default::default() }
    }

    pub fn parents(&self) -> impl Iterator<Item = EventHandle> {
        self.self_parent.into_iter().chain(self.other_parent)
    }

    pub fn is_ordered(&self) -> bool {
        self.consensus.consensus_order.is_some()
    }
}
