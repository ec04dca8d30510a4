//!
//! The consensus engine: assigns rounds to linked events, elects famous witnesses through virtual voting and
//! orders the events received by each decided round.
//!
//! The engine consumes events in the topological order produced by the linker. All state which depends on the
//! order of arrival (votes, pending events) is derived from ancestry only, so every node which is fed the same DAG
//! produces the same rounds, whatever the arrival order.
//!

mod election;
mod ordering;
mod protocol;
mod rounds;

use crate::model::{
    arena::EventHandle,
    event::{EventRole, Fame, SeenEvent},
    stores::events::{EventsStore, EventsStoreReader, MemoryEventsStore, SharedEventsStore},
};
use rounds::{RoundWitnesses, Votes};
use smallvec::SmallVec;
use std::{
    collections::{BTreeMap, HashSet},
    sync::Arc,
};
use weave_consensus_core::{
    ROUND_FIRST, ROUND_NEGATIVE_INFINITY, Round,
    config::params::Params,
    event::{EventDescriptor, HashedEvent},
    roster::Roster,
    round::ConsensusRound,
    snapshot::ConsensusSnapshot,
    window::EventWindow,
};
use weave_core::{info, warn};
use weave_hashes::Hash;

/// Everything produced by adding one event
#[derive(Debug, Default)]
pub struct ConsensusOutput {
    /// Rounds decided, in increasing order
    pub rounds: Vec<ConsensusRound>,
    /// Events which became ancient before reaching consensus
    pub stale: Vec<Arc<HashedEvent>>,
}

impl ConsensusOutput {
    pub fn is_empty(&self) -> bool {
        self.rounds.is_empty() && self.stale.is_empty()
    }
}

/// Tracks the judges of a loaded snapshot until all of them were received again
struct ResumeState {
    round: Round,
    awaited: HashSet<Hash>,
    judges: Vec<EventHandle>,
}

pub struct ConsensusEngine {
    roster: Arc<Roster>,
    params: Params,
    store: SharedEventsStore,

    rounds: RoundWitnesses,
    votes: Votes,
    /// Processed events not yet received by any round, in arrival order
    pending: Vec<EventHandle>,
    /// Minimum judge generation per decided round
    min_gens: BTreeMap<Round, u64>,

    window: EventWindow,
    last_decided: Round,
    max_round: Round,
    next_consensus_order: u64,
    last_timestamp: Option<u64>,
    resume: Option<ResumeState>,
}

impl ConsensusEngine {
    pub fn new(roster: Arc<Roster>, params: Params, store: SharedEventsStore) -> Self {
        let window = params.genesis_window();
        Self {
            roster,
            params,
            store,
            rounds: Default::default(),
            votes: Default::default(),
            pending: Vec::new(),
            min_gens: BTreeMap::new(),
            window,
            last_decided: ROUND_NEGATIVE_INFINITY,
            max_round: ROUND_NEGATIVE_INFINITY,
            next_consensus_order: 0,
            last_timestamp: None,
            resume: None,
        }
    }

    /// Processes a linked event and returns the rounds it caused to be decided
    pub fn add_event(&mut self, handle: EventHandle) -> ConsensusOutput {
        let store = self.store.clone();
        let mut store = store.write();
        if !self.process(&mut store, handle) {
            return ConsensusOutput::default();
        }
        self.decide_rounds(&mut store)
    }

    fn process(&mut self, store: &mut MemoryEventsStore, handle: EventHandle) -> bool {
        let Some(linked) = store.get(handle) else {
            return false;
        };
        if linked.consensus.is_processed() || self.window.is_ancient(linked.event.as_ref()) {
            return false;
        }
        let event = linked.event.clone();
        let Some(creator_index) = self.roster.index_of(event.creator()) else {
            warn!("Ignoring event {} by {} which is not a roster member", event.hash(), event.creator());
            return false;
        };

        let usable = |parent: Option<EventHandle>, descriptor: Option<&EventDescriptor>| {
            let descriptor = descriptor?;
            if self.window.is_ancient(descriptor) {
                return None;
            }
            parent.filter(|p| store.get(*p).is_some_and(|e| e.consensus.is_processed()))
        };
        let self_parent = usable(linked.self_parent, event.self_parent());
        let other_parent = usable(linked.other_parent, event.other_parent());
        let parents = self_parent.into_iter().chain(other_parent).collect::<SmallVec<[EventHandle; 2]>>();

        let own = SeenEvent { handle, generation: event.generation() };
        let last_see = protocol::merge_last_see(&*store, self.roster.len(), &parents, own, creator_index);
        let Some(linked) = store.get_mut(handle) else {
            return false;
        };
        linked.consensus.creator_index = creator_index;
        linked.consensus.last_see = last_see;

        let forced = self.resume.as_ref().filter(|resume| resume.awaited.contains(&event.hash())).map(|resume| resume.round);
        let (round, role) = match forced {
            Some(round) => (round, EventRole::Witness(Fame::Famous)),
            None => {
                let round = self.round_created(store, handle, &parents, event.parents().is_empty());
                let self_parent_round = self_parent.and_then(|p| store.get(p)).and_then(|p| p.consensus.round_created);
                let is_witness = round > self_parent_round.unwrap_or(ROUND_NEGATIVE_INFINITY);
                let role = match is_witness {
                    false => EventRole::Ordinary,
                    true if round <= self.last_decided => EventRole::Witness(Fame::NotFamous),
                    true => EventRole::Witness(Fame::Undecided),
                };
                (round, role)
            }
        };

        if let Some(linked) = store.get_mut(handle) {
            linked.consensus.round_created = Some(round);
            linked.consensus.role = role;
        }
        self.max_round = self.max_round.max(round);
        if role.is_witness() {
            self.rounds.add(round, handle);
        }
        self.pending.push(handle);

        if role == EventRole::Witness(Fame::Undecided) {
            self.vote_as_candidate(store, handle, round);
        }
        if role.is_witness() {
            self.vote_as_voter(store, handle, round);
        }
        if forced.is_some() {
            self.judge_arrived(store, handle, event.hash());
        }
        true
    }

    fn round_created(&self, store: &MemoryEventsStore, handle: EventHandle, parents: &[EventHandle], genesis: bool) -> Round {
        if genesis {
            return ROUND_FIRST;
        }
        let Some(consensus) = store.get(handle).map(|e| &e.consensus) else {
            return ROUND_NEGATIVE_INFINITY;
        };
        let parent_round = parents
            .iter()
            .filter_map(|p| store.get(*p))
            .filter_map(|p| p.consensus.round_created)
            .max()
            .unwrap_or(ROUND_NEGATIVE_INFINITY);
        if parent_round == ROUND_NEGATIVE_INFINITY {
            return ROUND_NEGATIVE_INFINITY;
        }

        let weight: u64 = self
            .rounds
            .witnesses(parent_round)
            .iter()
            .filter_map(|w| store.get(*w))
            .filter(|w| protocol::strongly_sees(store, &self.roster, consensus, w.consensus.creator_index, w.event.generation()))
            .map(|w| self.roster.weight(w.consensus.creator_index))
            .sum();
        if self.roster.is_supermajority(weight) { parent_round + 1 } else { parent_round }
    }

    fn judge_arrived(&mut self, store: &MemoryEventsStore, handle: EventHandle, hash: Hash) {
        let Some(resume) = self.resume.as_mut() else {
            return;
        };
        resume.awaited.remove(&hash);
        resume.judges.push(handle);
        if !resume.awaited.is_empty() {
            return;
        }
        let judges = std::mem::take(&mut resume.judges);
        self.resume = None;
        // Whatever all judges see was ordered before the snapshot was taken
        self.pending.retain(|pending| !ordering::seen_by_all(store, &judges, *pending));
        info!("All {} judges of round {} were received, consensus resumed", judges.len(), self.last_decided);
    }

    /// Resets the engine to continue from `snapshot`. Returns the event window implied by the snapshot.
    pub fn load_snapshot(&mut self, snapshot: &ConsensusSnapshot) -> EventWindow {
        self.clear();
        self.last_decided = snapshot.round;
        self.max_round = snapshot.round;
        self.min_gens = snapshot.min_gen_infos.iter().map(|info| (info.round, info.min_generation)).collect();
        self.next_consensus_order = snapshot.next_consensus_number;
        self.last_timestamp = snapshot.consensus_timestamp;
        self.window = snapshot.event_window(self.params.rounds_non_ancient, self.params.ancient_mode);
        if !snapshot.judge_hashes.is_empty() {
            let awaited = snapshot.judge_hashes.iter().copied().collect();
            self.resume = Some(ResumeState { round: snapshot.round, awaited, judges: Vec::new() });
        }
        info!("Loaded consensus snapshot of round {} with {} judges, {}", snapshot.round, snapshot.judge_hashes.len(), self.window);
        self.window
    }

    pub fn clear(&mut self) {
        self.rounds.clear();
        self.votes.clear();
        self.pending.clear();
        self.min_gens.clear();
        self.window = self.params.genesis_window();
        self.last_decided = ROUND_NEGATIVE_INFINITY;
        self.max_round = ROUND_NEGATIVE_INFINITY;
        self.next_consensus_order = 0;
        self.last_timestamp = None;
        self.resume = None;
    }

    pub fn last_decided_round(&self) -> Round {
        self.last_decided
    }

    pub fn event_window(&self) -> EventWindow {
        self.window
    }

    pub fn max_round(&self) -> Round {
        self.max_round
    }

    /// Number of processed events waiting to be received by a round
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        model::event::{ConsensusData, LinkedEvent},
        processes::linker::{InOrderLinker, LinkStatus},
        test_helpers::{DagGenerator, EventBuilder},
    };
    use itertools::Itertools;
    use weave_consensus_core::{
        config::params::{MAINNET_PARAMS, SIMNET_PARAMS},
        roster::RosterEntry,
        window::AncientMode,
    };

    /// Links `events` in order and feeds them to the engine, collecting the output
    struct Harness {
        linker: InOrderLinker,
        engine: ConsensusEngine,
        rounds: Vec<ConsensusRound>,
        stale: Vec<Arc<HashedEvent>>,
    }

    impl Harness {
        fn new(roster: Roster, params: Params) -> Self {
            let store = MemoryEventsStore::new_shared(params.ancient_mode);
            let linker = InOrderLinker::new(params.genesis_window(), store.clone());
            Self { linker, engine: ConsensusEngine::new(Arc::new(roster), params, store), rounds: vec![], stale: vec![] }
        }

        fn feed(&mut self, events: &[HashedEvent]) {
            for event in events {
                if let Ok(LinkStatus::Linked(handle)) = self.linker.link(Arc::new(event.clone())) {
                    let output = self.engine.add_event(handle);
                    if let Some(last) = output.rounds.last() {
                        self.linker.set_event_window(last.event_window);
                    }
                    self.rounds.extend(output.rounds);
                    self.stale.extend(output.stale);
                }
            }
        }

        fn consensus_data(&self, event: &HashedEvent) -> Option<ConsensusData> {
            self.engine.store.read().get_by_hash(event.hash()).map(|(_, linked)| linked.consensus.clone())
        }
    }

    fn received(events: &[HashedEvent], round: Round) -> Vec<Hash> {
        let positions = if round == 1 { 0..=0 } else { (4 * (round - 2) + 1) as usize..=(4 * (round - 1)) as usize };
        events[positions].iter().map(|e| e.hash()).collect()
    }

    #[test]
    fn test_chain_rounds_and_fame() {
        let events = DagGenerator::new(4, 1).sequential_chain(12);
        let mut harness = Harness::new(Roster::uniform(4), MAINNET_PARAMS);
        harness.feed(&events);

        for (k, event) in events.iter().enumerate() {
            let data = harness.consensus_data(event).unwrap();
            assert_eq!(data.round_created, Some(k as u64 / 4 + 1), "event {k}");
            assert!(data.role.is_witness(), "event {k}");
        }
        assert_eq!(harness.rounds.iter().map(|r| r.round).collect_vec(), (1..=10).collect_vec());
        assert_eq!(harness.engine.last_decided_round(), 10);
        assert_eq!(harness.engine.max_round(), 12);

        let mut order = 0;
        let mut timestamp = 0;
        for round in harness.rounds.iter() {
            let layer = (4 * (round.round - 1)) as usize..(4 * round.round) as usize;
            let judges = events[layer].iter().map(|e| e.hash()).sorted().collect_vec();
            assert_eq!(round.judges(), judges.as_slice());
            assert_eq!(round.event_hashes(), received(&events, round.round), "round {}", round.round);
            for event in round.events.iter() {
                assert_eq!(event.consensus_order, order);
                assert!(event.consensus_timestamp > timestamp);
                order += 1;
                timestamp = event.consensus_timestamp;
            }
            assert_eq!(round.snapshot.next_consensus_number, order);
        }
    }

    #[test]
    fn test_chain_windows() {
        let events = DagGenerator::new(4, 1).sequential_chain(12);
        let mut harness = Harness::new(Roster::uniform(4), SIMNET_PARAMS);
        harness.feed(&events);

        assert_eq!(harness.rounds.len(), 10);
        for round in harness.rounds.iter() {
            let min_round = round.round.saturating_sub(3).max(1);
            let expected = EventWindow::new(round.round, 4 * (min_round - 1), min_round, AncientMode::GenerationThreshold);
            assert_eq!(round.event_window, expected, "round {}", round.round);
            assert_eq!(round.snapshot.min_gen_infos.first().map(|info| info.round), Some(min_round));
        }
        assert_eq!(harness.engine.event_window(), harness.rounds.last().unwrap().event_window);
        assert!(harness.stale.is_empty());
    }

    #[test]
    fn test_resume_from_snapshot() {
        let events = DagGenerator::new(4, 1).sequential_chain(12);
        let mut original = Harness::new(Roster::uniform(4), SIMNET_PARAMS);
        original.feed(&events);
        let snapshot = original.rounds[4].snapshot.clone();
        assert_eq!(snapshot.round, 5);
        assert_eq!(snapshot.next_consensus_number, 17);

        let mut resumed = Harness::new(Roster::uniform(4), SIMNET_PARAMS);
        let window = resumed.engine.load_snapshot(&snapshot);
        assert_eq!(window, original.rounds[4].event_window);
        resumed.linker.set_event_window(window);
        resumed.feed(&events[..20]);

        // Parents below the snapshot window make a layer 3 event round-less, while judges of round 5 are famous
        assert_eq!(resumed.consensus_data(&events[8]).unwrap().round_created, Some(ROUND_NEGATIVE_INFINITY));
        assert!(resumed.consensus_data(&events[17]).unwrap().role.is_famous());

        // Round 10 makes both ancient
        resumed.feed(&events[20..]);
        assert!(resumed.consensus_data(&events[8]).is_none());
        assert!(resumed.consensus_data(&events[17]).is_none());
        assert_eq!(resumed.rounds, original.rounds[5..]);
    }

    #[test]
    fn test_stale_events() {
        // A silent member without weight creates a single genesis event nobody builds on
        let entries = (0..5).map(|id| RosterEntry { node_id: id.into(), weight: if id == 4 { 0 } else { 1 } }).collect();
        let events = DagGenerator::new(4, 1).sequential_chain(8);
        let side = EventBuilder::new(4).time_created(5).build_hashed();

        let mut harness = Harness::new(Roster::new(entries), SIMNET_PARAMS);
        harness.feed(&events[..1]);
        harness.feed(std::slice::from_ref(&side));
        harness.feed(&events[1..24]);
        assert!(harness.stale.is_empty());
        assert_eq!(harness.consensus_data(&side).unwrap().role, EventRole::Witness(Fame::NotFamous));
        assert_eq!(harness.engine.last_decided_round(), 4);

        // Deciding round 5 makes generation 0 ancient
        harness.feed(&events[24..25]);
        assert_eq!(harness.engine.last_decided_round(), 5);
        assert_eq!(harness.stale.iter().map(|e| e.hash()).collect_vec(), vec![side.hash()]);
        assert!(harness.rounds.iter().all(|r| !r.event_hashes().contains(&side.hash())));
    }

    #[test]
    fn test_coin_round_defers_fame() {
        // Nobody sees the silent genesis event, so every voter votes against it
        let silent = EventBuilder::new(4).time_created(5).build_hashed();
        let events = DagGenerator::new(4, 1).sequential_chain(5);

        // With coin rounds every other voting round, the round 3 votes cannot decide and round 4 ones do
        for (coin_freq, deciding) in [(MAINNET_PARAMS.coin_freq, 8), (2, 12)] {
            let entries = (0..5).map(|id| RosterEntry { node_id: id.into(), weight: if id == 4 { 0 } else { 1 } }).collect();
            let mut harness = Harness::new(Roster::new(entries), Params { coin_freq, ..MAINNET_PARAMS });
            harness.feed(std::slice::from_ref(&silent));
            harness.feed(&events[..deciding]);
            assert_eq!(harness.engine.last_decided_round(), ROUND_NEGATIVE_INFINITY, "coin_freq {coin_freq}");
            assert_eq!(harness.consensus_data(&silent).unwrap().role, EventRole::Witness(Fame::Undecided));
            assert!(events[..4].iter().all(|e| !harness.consensus_data(e).unwrap().role.is_famous()));

            harness.feed(&events[deciding..=deciding]);
            assert_eq!(harness.engine.last_decided_round(), 1, "coin_freq {coin_freq}");
            assert_eq!(harness.consensus_data(&silent).unwrap().role, EventRole::Witness(Fame::NotFamous));
            assert!(events[..4].iter().all(|e| harness.consensus_data(e).unwrap().role.is_famous()));
            assert_eq!(harness.rounds[0].judges().len(), 4);
            assert!(!harness.rounds[0].event_hashes().contains(&silent.hash()));
        }
    }

    #[test]
    fn test_unknown_creator_and_clear() {
        let store = MemoryEventsStore::new_shared(AncientMode::GenerationThreshold);
        let mut engine = ConsensusEngine::new(Arc::new(Roster::uniform(2)), MAINNET_PARAMS, store.clone());
        let stranger = store.write().insert(LinkedEvent::new(Arc::new(EventBuilder::new(7).build_hashed()), None, None));
        assert!(engine.add_event(stranger).is_empty());
        assert_eq!(engine.pending_count(), 0);

        let member = store.write().insert(LinkedEvent::new(Arc::new(EventBuilder::new(1).build_hashed()), None, None));
        assert!(engine.add_event(member).is_empty());
        assert!(engine.add_event(member).is_empty());
        assert_eq!(engine.pending_count(), 1);
        assert_eq!(engine.max_round(), ROUND_FIRST);

        engine.clear();
        assert_eq!(engine.pending_count(), 0);
        assert_eq!(engine.max_round(), ROUND_NEGATIVE_INFINITY);
        assert_eq!(engine.event_window(), EventWindow::genesis(AncientMode::GenerationThreshold));
    }
}
