use crate::model::{
    arena::{Arena, EventHandle},
    event::LinkedEvent,
};
use parking_lot::RwLock;
use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};
use weave_consensus_core::window::{AncientIndicator, AncientMode, EventWindow};
use weave_hashes::Hash;

/// Reader API for `EventsStore`.
pub trait EventsStoreReader {
    fn get(&self, handle: EventHandle) -> Option<&LinkedEvent>;
    fn handle_of(&self, hash: Hash) -> Option<EventHandle>;
    fn has(&self, hash: Hash) -> bool;
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn get_by_hash(&self, hash: Hash) -> Option<(EventHandle, &LinkedEvent)> {
        let handle = self.handle_of(hash)?;
        self.get(handle).map(|event| (handle, event))
    }
}

/// Write API for `EventsStore`. Linked events are inserted by the linker, while their consensus data is
/// written by the consensus engine through `get_mut`.
pub trait EventsStore: EventsStoreReader {
    fn insert(&mut self, event: LinkedEvent) -> EventHandle;
    fn get_mut(&mut self, handle: EventHandle) -> Option<&mut LinkedEvent>;
    /// Removes all events which are ancient according to `window` and returns their number
    fn evict_ancient(&mut self, window: &EventWindow) -> usize;
    fn clear(&mut self);
}

pub type SharedEventsStore = Arc<RwLock<MemoryEventsStore>>;

/// An in-memory arena of linked events indexed by hash and by ancient indicator
pub struct MemoryEventsStore {
    ancient_mode: AncientMode,
    arena: Arena<LinkedEvent>,
    hashes: HashMap<Hash, EventHandle>,
    by_indicator: BTreeMap<u64, Vec<EventHandle>>,
}

impl MemoryEventsStore {
    pub fn new(ancient_mode: AncientMode) -> Self {
        Self { ancient_mode, arena: Arena::new(), hashes: HashMap::new(), by_indicator: BTreeMap::new() }
    }

    pub fn new_shared(ancient_mode: AncientMode) -> SharedEventsStore {
        Arc::new(RwLock::new(Self::new(ancient_mode)))
    }

    pub fn iter(&self) -> impl Iterator<Item = (EventHandle, &LinkedEvent)> {
        self.arena.iter()
    }
}

impl EventsStoreReader for MemoryEventsStore {
    fn get(&self, handle: EventHandle) -> Option<&LinkedEvent> {
        self.arena.get(handle)
    }

    fn handle_of(&self, hash: Hash) -> Option<EventHandle> {
        self.hashes.get(&hash).copied()
    }

    fn has(&self, hash: Hash) -> bool {
        self.hashes.contains_key(&hash)
    }

    fn len(&self) -> usize {
        self.arena.len()
    }
}

impl EventsStore for MemoryEventsStore {
    fn insert(&mut self, event: LinkedEvent) -> EventHandle {
        let hash = event.event.hash();
        let indicator = event.event.ancient_indicator(self.ancient_mode);
        let handle = self.arena.insert(event);
        self.hashes.insert(hash, handle);
        self.by_indicator.entry(indicator).or_default().push(handle);
        handle
    }

    fn get_mut(&mut self, handle: EventHandle) -> Option<&mut LinkedEvent> {
        self.arena.get_mut(handle)
    }

    fn evict_ancient(&mut self, window: &EventWindow) -> usize {
        let retained = self.by_indicator.split_off(&window.ancient_threshold());
        let ancient = std::mem::replace(&mut self.by_indicator, retained);
        let mut evicted = 0;
        for handle in ancient.into_values().flatten() {
            if let Some(event) = self.arena.remove(handle) {
                self.hashes.remove(&event.event.hash());
                evicted += 1;
            }
        }
        evicted
    }

    fn clear(&mut self) {
        self.arena.clear();
        self.hashes.clear();
        self.by_indicator.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::EventBuilder;

    fn linked(parent: Option<&LinkedEvent>, creator: u64, time: u64) -> LinkedEvent {
        let mut builder = EventBuilder::new(creator).time_created(time);
        if let Some(parent) = parent {
            builder = builder.other_parent(parent.event.descriptor());
        }
        LinkedEvent::new(Arc::new(builder.build_hashed()), None, None)
    }

    #[test]
    fn test_insert_and_lookup() {
        let mut store = MemoryEventsStore::new(AncientMode::GenerationThreshold);
        let genesis = linked(None, 0, 1);
        let hash = genesis.event.hash();
        let handle = store.insert(genesis);
        assert!(store.has(hash));
        assert_eq!(store.handle_of(hash), Some(handle));
        assert_eq!(store.get_by_hash(hash).map(|(h, e)| (h, e.event.hash())), Some((handle, hash)));
        assert_eq!(store.len(), 1);

        store.get_mut(handle).unwrap().consensus.round_created = Some(1);
        assert!(store.get(handle).unwrap().consensus.is_processed());
    }

    #[test]
    fn test_eviction_is_idempotent() {
        let mut store = MemoryEventsStore::new(AncientMode::GenerationThreshold);
        let mut handles = vec![];
        let mut prev: Option<LinkedEvent> = None;
        for i in 0..6 {
            let event = linked(prev.as_ref(), i % 2, i);
            prev = Some(event.clone());
            handles.push(store.insert(event));
        }

        let window = EventWindow::new(3, 4, 1, AncientMode::GenerationThreshold);
        assert_eq!(store.evict_ancient(&window), 4);
        assert_eq!(store.evict_ancient(&window), 0);
        assert_eq!(store.len(), 2);
        assert!(handles[..4].iter().all(|&h| store.get(h).is_none()));
        assert!(handles[4..].iter().all(|&h| store.get(h).is_some()));

        store.clear();
        assert!(store.is_empty());
        assert!(store.get(handles[5]).is_none());
    }
}
