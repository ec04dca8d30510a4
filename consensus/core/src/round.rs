use crate::{Round, event::HashedEvent, snapshot::ConsensusSnapshot, window::EventWindow};
use std::sync::Arc;
use weave_hashes::Hash;

/// An event which reached consensus, with its position in the total order
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConsensusEvent {
    pub event: Arc<HashedEvent>,
    /// Strictly increasing across all consensus events
    pub consensus_timestamp: u64,
    /// Global position in the consensus order, starting at 0
    pub consensus_order: u64,
}

impl ConsensusEvent {
    pub fn hash(&self) -> Hash {
        self.event.hash()
    }
}

/// The outcome of deciding one round: the events it received in consensus order, the judges that decided it,
/// the window after it and a snapshot to resume from it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConsensusRound {
    pub round: Round,
    pub events: Vec<ConsensusEvent>,
    pub event_window: EventWindow,
    pub snapshot: ConsensusSnapshot,
}

impl ConsensusRound {
    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn judges(&self) -> &[Hash] {
        &self.snapshot.judge_hashes
    }

    pub fn event_hashes(&self) -> Vec<Hash> {
        self.events.iter().map(ConsensusEvent::hash).collect()
    }
}
