//!
//! The shadowgraph: an index over the retained part of the DAG, serving gossip with tips, ancestry queries and
//! sync deltas. It keeps its own copy of the parent relation, so pruning the event store does not affect it.
//!

use crate::model::{
    arena::EventHandle,
    stores::events::{EventsStoreReader, SharedEventsStore},
};
use itertools::Itertools;
use smallvec::SmallVec;
use std::{
    collections::{BTreeMap, HashMap, HashSet, VecDeque},
    sync::Arc,
};
use weave_consensus_core::{
    event::{EventDescriptor, HashedEvent},
    window::{AncientIndicator, EventWindow},
};
use weave_hashes::Hash;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Ancestry {
    Ancestor,
    NotAncestor,
    /// At least one of the queried events is not retained
    Unknown,
}

struct ShadowEntry {
    event: Arc<HashedEvent>,
    /// Parents which were retained when the event was added
    parents: SmallVec<[Hash; 2]>,
}

pub struct Shadowgraph {
    window: EventWindow,
    store: SharedEventsStore,
    entries: HashMap<Hash, ShadowEntry>,
    tips: HashSet<Hash>,
    by_indicator: BTreeMap<u64, Vec<Hash>>,
}

impl Shadowgraph {
    pub fn new(window: EventWindow, store: SharedEventsStore) -> Self {
        Self { window, store, entries: HashMap::new(), tips: HashSet::new(), by_indicator: BTreeMap::new() }
    }

    pub fn event_window(&self) -> &EventWindow {
        &self.window
    }

    /// Adds a linked event. Returns false if the event is gone from the store, ancient or already present.
    pub fn add_event(&mut self, handle: EventHandle) -> bool {
        let event = match self.store.read().get(handle) {
            Some(linked) => linked.event.clone(),
            None => return false,
        };
        if self.window.is_ancient(event.as_ref()) || self.entries.contains_key(&event.hash()) {
            return false;
        }

        let hash = event.hash();
        let parents = event.parents().iter().map(|p| p.hash).filter(|h| self.entries.contains_key(h)).collect::<SmallVec<[Hash; 2]>>();
        for parent in parents.iter() {
            self.tips.remove(parent);
        }
        self.tips.insert(hash);
        self.by_indicator.entry(event.ancient_indicator(self.window.ancient_mode)).or_default().push(hash);
        self.entries.insert(hash, ShadowEntry { event, parents });
        true
    }

    pub fn get(&self, hash: Hash) -> Option<Arc<HashedEvent>> {
        self.entries.get(&hash).map(|entry| entry.event.clone())
    }

    /// Returns the retained event matching `descriptor` in every attribute
    pub fn get_by_descriptor(&self, descriptor: &EventDescriptor) -> Option<Arc<HashedEvent>> {
        self.entries.get(&descriptor.hash).filter(|entry| entry.event.descriptor() == *descriptor).map(|entry| entry.event.clone())
    }

    pub fn contains(&self, hash: Hash) -> bool {
        self.entries.contains_key(&hash)
    }

    /// Retained events without retained children, sorted by hash
    pub fn tips(&self) -> Vec<Arc<HashedEvent>> {
        self.tips.iter().sorted().filter_map(|hash| self.get(*hash)).collect()
    }

    /// Answers whether `ancestor` is in the past of `descendant` or equal to it
    pub fn is_ancestor_of(&self, ancestor: Hash, descendant: Hash) -> Ancestry {
        let (Some(target), Some(_)) = (self.entries.get(&ancestor), self.entries.get(&descendant)) else {
            return Ancestry::Unknown;
        };
        let target_generation = target.event.generation();
        let mut visited = HashSet::new();
        let mut queue = VecDeque::from([descendant]);
        while let Some(current) = queue.pop_front() {
            if current == ancestor {
                return Ancestry::Ancestor;
            }
            let Some(entry) = self.entries.get(&current) else { continue };
            for parent in entry.parents.iter() {
                let reachable = self.entries.get(parent).is_some_and(|p| p.event.generation() >= target_generation);
                if reachable && visited.insert(*parent) {
                    queue.push_back(*parent);
                }
            }
        }
        Ancestry::NotAncestor
    }

    /// Returns the retained events which are not ancestors of any of `peer_tips`, ordered topologically.
    /// Peer tips which are not retained locally are ignored.
    pub fn missing_for(&self, peer_tips: &[Hash]) -> Vec<Arc<HashedEvent>> {
        let mut known = HashSet::new();
        let mut queue = peer_tips.iter().copied().filter(|h| self.entries.contains_key(h)).collect::<VecDeque<_>>();
        while let Some(current) = queue.pop_front() {
            if !known.insert(current) {
                continue;
            }
            if let Some(entry) = self.entries.get(&current) {
                queue.extend(entry.parents.iter().copied().filter(|p| !known.contains(p)));
            }
        }
        self.entries
            .values()
            .filter(|entry| !known.contains(&entry.event.hash()))
            .map(|entry| entry.event.clone())
            .sorted_by_key(|event| (event.generation(), event.hash()))
            .collect()
    }

    /// Prunes the events which are ancient according to `window`. Windows behind the current one are ignored.
    pub fn set_event_window(&mut self, window: EventWindow) -> usize {
        if !window.is_at_least(&self.window) {
            return 0;
        }
        self.window = window;
        let retained = self.by_indicator.split_off(&window.ancient_threshold());
        let ancient = std::mem::replace(&mut self.by_indicator, retained);
        let mut pruned = 0;
        for hash in ancient.into_values().flatten() {
            if self.entries.remove(&hash).is_some() {
                self.tips.remove(&hash);
                pruned += 1;
            }
        }
        pruned
    }

    /// Drops everything and adopts `window`, which may be behind the current one
    pub fn start_with_event_window(&mut self, window: EventWindow) {
        self.clear();
        self.window = window;
    }

    pub fn clear(&mut self) {
        self.window = EventWindow::genesis(self.window.ancient_mode);
        self.entries.clear();
        self.tips.clear();
        self.by_indicator.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        model::{event::LinkedEvent, stores::events::{EventsStore, MemoryEventsStore}},
        test_helpers::{DagGenerator, EventBuilder},
    };
    use weave_consensus_core::window::AncientMode;

    /// Inserts `events` into a fresh store, unlinked, and returns the store with the handles
    fn stored(events: &[HashedEvent]) -> (SharedEventsStore, Vec<EventHandle>) {
        let store = MemoryEventsStore::new_shared(AncientMode::GenerationThreshold);
        let handles = events.iter().map(|e| store.write().insert(LinkedEvent::new(Arc::new(e.clone()), None, None))).collect();
        (store, handles)
    }

    #[test]
    fn test_tips_and_ancestry() {
        let events = DagGenerator::new(4, 9).sequential_chain(2);
        let (store, handles) = stored(&events);
        let mut graph = Shadowgraph::new(EventWindow::genesis(AncientMode::GenerationThreshold), store);
        for handle in handles[..6].iter() {
            assert!(graph.add_event(*handle));
        }
        assert!(!graph.add_event(handles[5]));
        assert_eq!(graph.len(), 6);
        assert_eq!(graph.tips().iter().map(|e| e.hash()).collect::<Vec<_>>(), vec![events[5].hash()]);

        assert_eq!(graph.is_ancestor_of(events[0].hash(), events[5].hash()), Ancestry::Ancestor);
        assert_eq!(graph.is_ancestor_of(events[5].hash(), events[5].hash()), Ancestry::Ancestor);
        assert_eq!(graph.is_ancestor_of(events[5].hash(), events[0].hash()), Ancestry::NotAncestor);
        assert_eq!(graph.is_ancestor_of(events[0].hash(), events[7].hash()), Ancestry::Unknown);

        // A second genesis event by creator 0 forms a new tip
        let side = EventBuilder::new(0).time_created(777).build_hashed();
        let handle = graph.store.write().insert(LinkedEvent::new(Arc::new(side.clone()), None, None));
        assert!(graph.add_event(handle));
        let mut expected = vec![events[5].hash(), side.hash()];
        expected.sort();
        assert_eq!(graph.tips().iter().map(|e| e.hash()).collect::<Vec<_>>(), expected);
        assert_eq!(graph.is_ancestor_of(side.hash(), events[5].hash()), Ancestry::NotAncestor);

        assert!(graph.get_by_descriptor(&events[2].descriptor()).is_some());
        let mut forged = events[2].descriptor();
        forged.generation += 1;
        assert!(graph.get_by_descriptor(&forged).is_none());
    }

    #[test]
    fn test_missing_for() {
        let events = DagGenerator::new(4, 9).sequential_chain(2);
        let (store, handles) = stored(&events);
        let mut graph = Shadowgraph::new(EventWindow::genesis(AncientMode::GenerationThreshold), store);
        handles.iter().for_each(|h| assert!(graph.add_event(*h)));

        let missing = graph.missing_for(&[events[4].hash()]);
        assert_eq!(missing.iter().map(|e| e.hash()).collect::<Vec<_>>(), events[5..].iter().map(|e| e.hash()).collect::<Vec<_>>());
        assert!(graph.missing_for(&[events[7].hash()]).is_empty());
        assert_eq!(graph.missing_for(&[1.into()]).len(), events.len());
    }

    #[test]
    fn test_pruning_and_no_readmission() {
        let events = DagGenerator::new(4, 9).sequential_chain(3);
        let (store, handles) = stored(&events);
        let mut graph = Shadowgraph::new(EventWindow::genesis(AncientMode::GenerationThreshold), store);
        handles.iter().for_each(|h| assert!(graph.add_event(*h)));

        let window = EventWindow::new(2, 8, 1, AncientMode::GenerationThreshold);
        assert_eq!(graph.set_event_window(window), 8);
        assert_eq!(graph.set_event_window(window), 0);
        assert_eq!(graph.len(), 4);
        assert!(!graph.contains(events[7].hash()));
        assert!(!graph.add_event(handles[7]));
        assert_eq!(graph.is_ancestor_of(events[8].hash(), events[11].hash()), Ancestry::Ancestor);

        graph.start_with_event_window(EventWindow::genesis(AncientMode::GenerationThreshold));
        assert!(graph.is_empty());
        assert!(graph.add_event(handles[7]));
    }
}
