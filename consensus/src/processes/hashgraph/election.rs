use super::{ConsensusEngine, protocol};
use crate::model::{
    arena::EventHandle,
    event::{EventRole, Fame},
    stores::events::{EventsStore, EventsStoreReader, MemoryEventsStore},
};
use weave_consensus_core::Round;

/// A vote together with the fame it decides, if it does
type Ballot = (bool, Option<Fame>);

impl ConsensusEngine {
    /// Casts the votes of `voter`, a new witness of `voter_round`, on all undecided witnesses of earlier rounds
    pub(super) fn vote_as_voter(&mut self, store: &mut MemoryEventsStore, voter: EventHandle, voter_round: Round) {
        for round in (self.last_decided + 1)..voter_round {
            for candidate in self.rounds.witnesses(round).to_vec() {
                if fame_of(store, candidate) != Some(Fame::Undecided) {
                    continue;
                }
                self.cast(store, voter, voter_round, candidate, round);
            }
        }
    }

    /// Collects the votes of the already known witnesses of later rounds on `candidate`, a new witness of
    /// `candidate_round`. Rounds are visited in ascending order since votes of a round build on the previous one.
    pub(super) fn vote_as_candidate(&mut self, store: &mut MemoryEventsStore, candidate: EventHandle, candidate_round: Round) {
        for round in (candidate_round + 1)..=self.max_round {
            for voter in self.rounds.witnesses(round).to_vec() {
                if fame_of(store, candidate) != Some(Fame::Undecided) {
                    return;
                }
                self.cast(store, voter, round, candidate, candidate_round);
            }
        }
    }

    fn cast(
        &mut self,
        store: &mut MemoryEventsStore,
        voter: EventHandle,
        voter_round: Round,
        candidate: EventHandle,
        candidate_round: Round,
    ) {
        let Some((vote, decision)) = self.ballot(store, voter, voter_round, candidate, candidate_round) else {
            return;
        };
        self.votes.set(voter, candidate, vote);
        if let Some(fame) = decision
            && let Some(event) = store.get_mut(candidate)
        {
            event.consensus.role = EventRole::Witness(fame);
        }
    }

    fn ballot(
        &self,
        store: &MemoryEventsStore,
        voter: EventHandle,
        voter_round: Round,
        candidate: EventHandle,
        candidate_round: Round,
    ) -> Option<Ballot> {
        let voter_event = store.get(voter)?;
        let candidate_event = store.get(candidate)?;
        let (creator_index, generation) = (candidate_event.consensus.creator_index, candidate_event.event.generation());
        let distance = voter_round - candidate_round;
        if distance == 1 {
            return Some((voter_event.consensus.sees(creator_index, generation), None));
        }

        let (mut yes, mut no) = (0u64, 0u64);
        for witness in self.rounds.witnesses(voter_round - 1) {
            let Some(witness_event) = store.get(*witness) else { continue };
            let witness_index = witness_event.consensus.creator_index;
            if !protocol::strongly_sees(store, &self.roster, &voter_event.consensus, witness_index, witness_event.event.generation()) {
                continue;
            }
            match self.votes.get(*witness, candidate) {
                Some(true) => yes += self.roster.weight(witness_index),
                Some(false) => no += self.roster.weight(witness_index),
                None => {}
            }
        }

        let vote = yes >= no;
        let decisive = self.roster.is_supermajority(if vote { yes } else { no });
        if distance % self.params.coin_freq != 0 {
            let decision = decisive.then_some(if vote { Fame::Famous } else { Fame::NotFamous });
            Some((vote, decision))
        } else if decisive {
            Some((vote, None))
        } else {
            Some((coin(voter_event.event.signature()), None))
        }
    }
}

fn fame_of(store: &MemoryEventsStore, witness: EventHandle) -> Option<Fame> {
    store.get(witness).and_then(|event| event.consensus.role.fame())
}

/// The low bit of the middle signature byte
fn coin(signature: &[u8]) -> bool {
    signature.get(signature.len() / 2).is_some_and(|byte| byte & 1 == 1)
}
