use crate::model::arena::EventHandle;
use std::collections::{BTreeMap, HashMap};
use weave_consensus_core::Round;

/// Witnesses by round created, in arrival order
#[derive(Default)]
pub(super) struct RoundWitnesses {
    rounds: BTreeMap<Round, Vec<EventHandle>>,
}

impl RoundWitnesses {
    pub fn witnesses(&self, round: Round) -> &[EventHandle] {
        self.rounds.get(&round).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn add(&mut self, round: Round, witness: EventHandle) {
        self.rounds.entry(round).or_default().push(witness);
    }

    /// Drops all rounds below `round`
    pub fn prune_below(&mut self, round: Round) {
        self.rounds = self.rounds.split_off(&round);
    }

    pub fn oldest(&self) -> Option<Round> {
        self.rounds.keys().next().copied()
    }

    pub fn clear(&mut self) {
        self.rounds.clear();
    }
}

/// Votes cast by witnesses on the fame of earlier witnesses
#[derive(Default)]
pub(super) struct Votes {
    by_voter: HashMap<EventHandle, HashMap<EventHandle, bool>>,
}

impl Votes {
    pub fn get(&self, voter: EventHandle, candidate: EventHandle) -> Option<bool> {
        self.by_voter.get(&voter).and_then(|votes| votes.get(&candidate)).copied()
    }

    pub fn set(&mut self, voter: EventHandle, candidate: EventHandle, vote: bool) {
        self.by_voter.entry(voter).or_default().insert(candidate, vote);
    }

    pub fn forget_voter(&mut self, voter: EventHandle) {
        self.by_voter.remove(&voter);
    }

    pub fn forget_candidates(&mut self, candidates: &[EventHandle]) {
        for votes in self.by_voter.values_mut() {
            for candidate in candidates {
                votes.remove(candidate);
            }
        }
        self.by_voter.retain(|_, votes| !votes.is_empty());
    }

    pub fn voter_count(&self) -> usize {
        self.by_voter.len()
    }

    pub fn clear(&mut self) {
        self.by_voter.clear();
    }
}
