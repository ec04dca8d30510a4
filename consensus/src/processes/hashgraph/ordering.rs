use super::{ConsensusEngine, ConsensusOutput};
use crate::model::{
    arena::EventHandle,
    event::Fame,
    stores::events::{EventsStore, EventsStoreReader, MemoryEventsStore},
};
use itertools::Itertools;
use std::sync::Arc;
use weave_consensus_core::{
    Round,
    event::HashedEvent,
    round::{ConsensusEvent, ConsensusRound},
    snapshot::{ConsensusSnapshot, MinGenInfo},
    window::EventWindow,
};
use weave_core::debug;

impl ConsensusEngine {
    /// Decides as many consecutive rounds as possible, starting with the one after the last decided round
    pub(super) fn decide_rounds(&mut self, store: &mut MemoryEventsStore) -> ConsensusOutput {
        let mut output = ConsensusOutput::default();
        loop {
            let round = self.last_decided + 1;
            let witnesses = self.rounds.witnesses(round);
            let undecided = witnesses.iter().any(|w| store.get(*w).and_then(|e| e.consensus.role.fame()) == Some(Fame::Undecided));
            if witnesses.is_empty() || undecided {
                break;
            }
            let witnesses = witnesses.to_vec();
            let judges =
                witnesses.iter().copied().filter(|w| store.get(*w).is_some_and(|e| e.consensus.role.is_famous())).collect_vec();

            let events = self.receive(store, &judges, round);
            self.record_min_generation(store, round, &judges, &witnesses);
            self.last_decided = round;
            self.window = self.window_after(round);
            let snapshot = self.snapshot(store, round, &judges);
            output.stale.extend(self.collect_stale(store));
            self.prune(round, &witnesses);

            debug!("Round {} decided by {} judges, {} events received, {}", round, judges.len(), events.len(), self.window);
            output.rounds.push(ConsensusRound { round, events, event_window: self.window, snapshot });
        }
        output
    }

    /// Moves the pending events seen by all judges to the consensus order
    fn receive(&mut self, store: &mut MemoryEventsStore, judges: &[EventHandle], round: Round) -> Vec<ConsensusEvent> {
        if judges.is_empty() {
            return Vec::new();
        }
        let (received, pending): (Vec<_>, Vec<_>) =
            std::mem::take(&mut self.pending).into_iter().partition(|pending| seen_by_all(store, judges, *pending));
        self.pending = pending;

        let sorted = received
            .into_iter()
            .filter_map(|handle| {
                let event = store.get(handle)?.event.clone();
                median_timestamp(store, judges, handle).map(|median| (median, event, handle))
            })
            .sorted_by_key(|(median, event, _)| (*median, event.generation(), event.creator(), event.hash()))
            .collect_vec();

        let mut events = Vec::with_capacity(sorted.len());
        for (median, event, handle) in sorted {
            let Some(linked) = store.get_mut(handle) else { continue };
            let consensus_timestamp = self.last_timestamp.map_or(median, |last| median.max(last + 1));
            let consensus_order = self.next_consensus_order;
            linked.consensus.round_received = Some(round);
            linked.consensus.consensus_timestamp = Some(consensus_timestamp);
            linked.consensus.consensus_order = Some(consensus_order);
            self.last_timestamp = Some(consensus_timestamp);
            self.next_consensus_order += 1;
            events.push(ConsensusEvent { event, consensus_timestamp, consensus_order });
        }
        events
    }

    fn record_min_generation(&mut self, store: &MemoryEventsStore, round: Round, judges: &[EventHandle], witnesses: &[EventHandle]) {
        let min_generation =
            |handles: &[EventHandle]| handles.iter().filter_map(|h| store.get(*h)).map(|e| e.event.generation()).min();
        if let Some(generation) = min_generation(judges).or_else(|| min_generation(witnesses)) {
            self.min_gens.insert(round, generation);
        }
    }

    fn window_after(&self, round: Round) -> EventWindow {
        let min_round = EventWindow::min_non_ancient_round_for(round, self.params.rounds_non_ancient);
        let min_gen = self.min_gens.range(min_round..).next().map_or(self.window.min_gen_non_ancient, |(_, generation)| *generation);
        EventWindow::new(round, min_gen, min_round, self.params.ancient_mode).max(&self.window)
    }

    fn snapshot(&self, store: &MemoryEventsStore, round: Round, judges: &[EventHandle]) -> ConsensusSnapshot {
        ConsensusSnapshot {
            round,
            judge_hashes: judges.iter().filter_map(|j| store.get(*j)).map(|e| e.event.hash()).sorted().collect(),
            min_gen_infos: self
                .min_gens
                .range(self.window.min_round_non_ancient..=round)
                .map(|(round, min_generation)| MinGenInfo { round: *round, min_generation: *min_generation })
                .collect(),
            next_consensus_number: self.next_consensus_order,
            consensus_timestamp: self.last_timestamp,
        }
    }

    /// Marks and returns the pending events the current window made ancient. Events evicted from the store are
    /// dropped silently.
    fn collect_stale(&mut self, store: &mut MemoryEventsStore) -> Vec<Arc<HashedEvent>> {
        let window = self.window;
        let mut stale = Vec::new();
        self.pending.retain(|handle| match store.get_mut(*handle) {
            None => false,
            Some(linked) if window.is_ancient(linked.event.as_ref()) => {
                linked.consensus.stale = true;
                stale.push(linked.event.clone());
                false
            }
            Some(_) => true,
        });
        stale.sort_by_key(|e| (e.generation(), e.creator(), e.hash()));
        stale
    }

    fn prune(&mut self, round: Round, witnesses: &[EventHandle]) {
        // Votes of the next round only ever concern candidates of this round or earlier
        self.votes.forget_candidates(witnesses);
        for voter in self.rounds.witnesses(round).iter().chain(self.rounds.witnesses(round + 1)) {
            self.votes.forget_voter(*voter);
        }
        let min_round = self.window.min_round_non_ancient;
        self.rounds.prune_below(min_round);
        self.min_gens.retain(|r, _| *r >= min_round);
    }
}

/// True if every judge sees the event behind `handle`
pub(super) fn seen_by_all(store: &MemoryEventsStore, judges: &[EventHandle], handle: EventHandle) -> bool {
    let Some(event) = store.get(handle) else {
        return false;
    };
    let (creator_index, generation) = (event.consensus.creator_index, event.event.generation());
    judges.iter().all(|judge| super::protocol::sees(store, *judge, creator_index, generation))
}

/// The median over all judges of the creation time of the earliest self-ancestor of the judge seeing the event
fn median_timestamp(store: &MemoryEventsStore, judges: &[EventHandle], handle: EventHandle) -> Option<u64> {
    let target = store.get(handle)?;
    let (creator_index, generation) = (target.consensus.creator_index, target.event.generation());
    let mut times = judges
        .iter()
        .filter_map(|judge| {
            let mut earliest = store.get(*judge)?;
            while let Some(parent) = earliest.self_parent.and_then(|p| store.get(p))
                && parent.consensus.sees(creator_index, generation)
            {
                earliest = parent;
            }
            Some(earliest.event.time_created())
        })
        .collect_vec();
    times.sort_unstable();
    times.get(times.len() / 2).copied()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        model::event::{LinkedEvent, SeenEvent},
        test_helpers::EventBuilder,
    };
    use weave_consensus_core::window::AncientMode;

    /// Inserts an event of a 3-creator DAG which sees itself and, optionally, `target`
    fn insert(
        store: &mut MemoryEventsStore,
        creator: usize,
        time: u64,
        self_parent: Option<EventHandle>,
        target: Option<EventHandle>,
    ) -> EventHandle {
        let event = EventBuilder::new(creator as u64).time_created(time).build_hashed();
        let handle = store.insert(LinkedEvent::new(Arc::new(event), self_parent, None));
        let consensus = &mut store.get_mut(handle).unwrap().consensus;
        consensus.creator_index = creator;
        consensus.last_see = vec![None; 3];
        consensus.last_see[creator] = Some(SeenEvent { handle, generation: 0 });
        if let Some(target) = target {
            consensus.last_see[0] = Some(SeenEvent { handle: target, generation: 0 });
        }
        handle
    }

    #[test]
    fn test_median_timestamp() {
        let mut store = MemoryEventsStore::new(AncientMode::GenerationThreshold);
        let target = insert(&mut store, 0, 100, None, None);
        let b0 = insert(&mut store, 1, 110, None, None);
        let b1 = insert(&mut store, 1, 120, Some(b0), Some(target));
        let b2 = insert(&mut store, 1, 150, Some(b1), Some(target));
        let c0 = insert(&mut store, 2, 130, None, Some(target));

        // The judges' earliest self-ancestors seeing the target were created at 100, 120 and 130
        let judges = [target, b2, c0];
        assert!(seen_by_all(&store, &judges, target));
        assert!(!seen_by_all(&store, &judges, b0));
        assert_eq!(median_timestamp(&store, &judges, target), Some(120));
        assert_eq!(median_timestamp(&store, &judges[1..], target), Some(130));
        assert_eq!(median_timestamp(&store, &[], target), None);
    }
}
