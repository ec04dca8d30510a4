use indexmap::IndexMap;
use smallvec::SmallVec;
use std::{
    collections::{HashMap, VecDeque},
    sync::Arc,
};
use weave_consensus_core::{
    event::{EventDescriptor, HashedEvent},
    window::EventWindow,
};
use weave_core::{trace, warn};
use weave_hashes::Hash;

/// Reasons for dropping a submitted event
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Rejection {
    Ancient,
    Duplicate,
    ParentMismatch,
}

struct Orphan {
    event: Arc<HashedEvent>,
    missing: SmallVec<[Hash; 2]>,
}

struct MissingParent {
    /// The descriptor claimed by the first orphan referencing the parent
    descriptor: EventDescriptor,
    waiting: Vec<Hash>,
}

/// Holds events until each of their parents was observed or became ancient, then releases them in topological
/// order.
pub struct OrphanBuffer {
    window: EventWindow,
    released: HashMap<Hash, EventDescriptor>,
    missing: IndexMap<Hash, MissingParent>,
    orphans: IndexMap<Hash, Orphan>,
}

impl OrphanBuffer {
    pub fn new(window: EventWindow) -> Self {
        Self { window, released: HashMap::new(), missing: IndexMap::new(), orphans: IndexMap::new() }
    }

    pub fn event_window(&self) -> &EventWindow {
        &self.window
    }

    pub fn orphan_count(&self) -> usize {
        self.orphans.len()
    }

    pub fn is_orphan(&self, hash: Hash) -> bool {
        self.orphans.contains_key(&hash)
    }

    /// Submits a hashed event. Returns the events released as a result, in release order, which is empty if the
    /// event is buffered.
    pub fn submit(&mut self, event: Arc<HashedEvent>) -> Result<Vec<Arc<HashedEvent>>, Rejection> {
        if self.window.is_ancient(event.as_ref()) {
            return Err(Rejection::Ancient);
        }
        let hash = event.hash();
        if self.released.contains_key(&hash) || self.orphans.contains_key(&hash) {
            return Err(Rejection::Duplicate);
        }

        let mut missing: SmallVec<[EventDescriptor; 2]> = SmallVec::new();
        for parent in event.parents() {
            if self.window.is_ancient(&parent) {
                continue;
            }
            match self.released.get(&parent.hash) {
                Some(known) if *known != parent => {
                    warn!("Dropping event {}: parent {} is known as {}", hash, parent, known);
                    return Err(Rejection::ParentMismatch);
                }
                Some(_) => {}
                None => missing.push(parent),
            }
        }

        if missing.is_empty() {
            return Ok(self.release(event));
        }

        trace!("Buffering orphan {} missing {} parent(s)", hash, missing.len());
        for parent in missing.iter() {
            let entry = self.missing.entry(parent.hash).or_insert_with(|| MissingParent { descriptor: *parent, waiting: vec![] });
            entry.waiting.push(hash);
        }
        self.orphans.insert(hash, Orphan { event, missing: missing.iter().map(|p| p.hash).collect() });
        Ok(vec![])
    }

    /// Records `descriptor` as observed and releases the orphans which no longer miss any parent, cascading in
    /// topological order
    pub fn event_available(&mut self, descriptor: EventDescriptor) -> Vec<Arc<HashedEvent>> {
        if self.window.is_ancient(&descriptor) {
            return vec![];
        }
        let mut queue = VecDeque::new();
        self.observe(descriptor, &mut queue);
        self.drain(queue)
    }

    /// Applies a new window: evicts ancient orphans and treats parents which became ancient as resolved.
    /// Windows behind the current one are ignored.
    pub fn set_event_window(&mut self, window: EventWindow) -> Vec<Arc<HashedEvent>> {
        if !window.is_at_least(&self.window) {
            return vec![];
        }
        self.window = window;

        let ancient_orphans = self
            .orphans
            .iter()
            .filter(|(_, orphan)| window.is_ancient(orphan.event.as_ref()))
            .map(|(hash, _)| *hash)
            .collect::<Vec<_>>();
        for hash in ancient_orphans {
            if let Some(orphan) = self.orphans.shift_remove(&hash) {
                self.forget_waiting(hash, &orphan.missing);
            }
        }

        let ancient_parents =
            self.missing.iter().filter(|(_, parent)| window.is_ancient(&parent.descriptor)).map(|(hash, _)| *hash).collect::<Vec<_>>();
        let mut queue = VecDeque::new();
        for hash in ancient_parents {
            self.resolve_parent(hash, None, &mut queue);
        }

        self.released.retain(|_, descriptor| !window.is_ancient(descriptor));
        self.drain(queue)
    }

    pub fn clear(&mut self) {
        self.window = EventWindow::genesis(self.window.ancient_mode);
        self.released.clear();
        self.missing.clear();
        self.orphans.clear();
    }

    /// Marks `parent` as no longer missing for all orphans waiting on it. When `observed` is given, orphans which
    /// claimed a different descriptor for the parent are dropped.
    fn resolve_parent(&mut self, parent: Hash, observed: Option<EventDescriptor>, queue: &mut VecDeque<Arc<HashedEvent>>) {
        let Some(entry) = self.missing.shift_remove(&parent) else {
            return;
        };
        for orphan_hash in entry.waiting {
            let Some(orphan) = self.orphans.get_mut(&orphan_hash) else {
                continue;
            };
            if let Some(observed) = observed
                && orphan.event.parents().iter().any(|p| p.hash == parent && *p != observed)
            {
                warn!("Dropping orphan {}: parent {} does not match its claim", orphan_hash, observed);
                if let Some(orphan) = self.orphans.shift_remove(&orphan_hash) {
                    self.forget_waiting(orphan_hash, &orphan.missing);
                }
                continue;
            }
            orphan.missing.retain(|h| *h != parent);
            if orphan.missing.is_empty()
                && let Some(orphan) = self.orphans.shift_remove(&orphan_hash)
            {
                queue.push_back(orphan.event);
            }
        }
    }

    fn forget_waiting(&mut self, orphan: Hash, missing: &[Hash]) {
        for parent in missing {
            if let Some(entry) = self.missing.get_mut(parent) {
                entry.waiting.retain(|h| *h != orphan);
                if entry.waiting.is_empty() {
                    self.missing.shift_remove(parent);
                }
            }
        }
    }

    fn observe(&mut self, descriptor: EventDescriptor, queue: &mut VecDeque<Arc<HashedEvent>>) {
        self.released.insert(descriptor.hash, descriptor);
        self.resolve_parent(descriptor.hash, Some(descriptor), queue);
    }

    fn release(&mut self, event: Arc<HashedEvent>) -> Vec<Arc<HashedEvent>> {
        let descriptor = event.descriptor();
        let mut released = vec![event];
        released.extend(self.event_available(descriptor));
        released
    }

    /// Releases queued events, cascading into the orphans they unblock
    fn drain(&mut self, mut queue: VecDeque<Arc<HashedEvent>>) -> Vec<Arc<HashedEvent>> {
        let mut released = Vec::with_capacity(queue.len());
        while let Some(event) = queue.pop_front() {
            self.observe(event.descriptor(), &mut queue);
            released.push(event);
        }
        released
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{DagGenerator, EventBuilder};
    use itertools::Itertools;
    use weave_consensus_core::window::AncientMode;

    fn hashes(events: &[Arc<HashedEvent>]) -> Vec<Hash> {
        events.iter().map(|e| e.hash()).collect()
    }

    #[test]
    fn test_in_order_events_are_released_immediately() {
        let events = DagGenerator::new(4, 1).sequential_chain(3);
        let mut buffer = OrphanBuffer::new(EventWindow::genesis(AncientMode::GenerationThreshold));
        for event in events.iter() {
            let released = buffer.submit(Arc::new(event.clone())).unwrap();
            assert_eq!(hashes(&released), vec![event.hash()]);
        }
        assert_eq!(buffer.orphan_count(), 0);
        assert_eq!(buffer.submit(Arc::new(events[3].clone())), Err(Rejection::Duplicate));
    }

    #[test]
    fn test_cascading_release() {
        let events = DagGenerator::new(4, 1).sequential_chain(3).into_iter().map(Arc::new).collect_vec();
        let mut buffer = OrphanBuffer::new(EventWindow::genesis(AncientMode::GenerationThreshold));

        // Deliver everything in reverse: each event waits for its predecessor
        for event in events.iter().skip(1).rev() {
            assert!(buffer.submit(event.clone()).unwrap().is_empty());
            assert_eq!(buffer.submit(event.clone()), Err(Rejection::Duplicate));
        }
        assert_eq!(buffer.orphan_count(), events.len() - 1);

        let released = buffer.submit(events[0].clone()).unwrap();
        assert_eq!(hashes(&released), hashes(&events));
        assert_eq!(buffer.orphan_count(), 0);
    }

    #[test]
    fn test_ancient_parents_resolve_orphans() {
        let events = DagGenerator::new(4, 1).sequential_chain(3).into_iter().map(Arc::new).collect_vec();
        let mut buffer = OrphanBuffer::new(EventWindow::genesis(AncientMode::GenerationThreshold));

        // Event 6 misses event 5 (other parent) and event 2 (self parent)
        assert!(buffer.submit(events[6].clone()).unwrap().is_empty());
        assert!(buffer.is_orphan(events[6].hash()));

        // Generations below 6 become ancient, event 6 is released and event 4 is dropped
        let released = buffer.set_event_window(EventWindow::new(2, 6, 1, AncientMode::GenerationThreshold));
        assert_eq!(hashes(&released), vec![events[6].hash()]);
        assert_eq!(buffer.submit(events[4].clone()), Err(Rejection::Ancient));

        // A regressing window is ignored
        assert!(buffer.set_event_window(EventWindow::genesis(AncientMode::GenerationThreshold)).is_empty());
        assert_eq!(buffer.event_window().min_gen_non_ancient, 6);
    }

    #[test]
    fn test_ancient_orphans_are_evicted() {
        let events = DagGenerator::new(4, 1).sequential_chain(3).into_iter().map(Arc::new).collect_vec();
        let mut buffer = OrphanBuffer::new(EventWindow::genesis(AncientMode::GenerationThreshold));
        for event in events[2..5].iter() {
            assert!(buffer.submit(event.clone()).unwrap().is_empty());
        }
        assert_eq!(buffer.orphan_count(), 3);

        // Events 2 and 3 are evicted, while event 4 is released since both of its parents became ancient
        let released = buffer.set_event_window(EventWindow::new(1, 4, 1, AncientMode::GenerationThreshold));
        assert_eq!(hashes(&released), vec![events[4].hash()]);
        assert_eq!(buffer.orphan_count(), 0);
    }

    #[test]
    fn test_parent_mismatch() {
        let mut buffer = OrphanBuffer::new(EventWindow::genesis(AncientMode::GenerationThreshold));
        let parent = Arc::new(EventBuilder::new(0).build_hashed());
        buffer.submit(parent.clone()).unwrap();

        let mut forged = parent.descriptor();
        forged.generation = 3;
        let child = EventBuilder::new(1).other_parent(forged).build_hashed();
        assert_eq!(buffer.submit(Arc::new(child)), Err(Rejection::ParentMismatch));

        // An orphan whose claim turns out wrong once the parent arrives is dropped
        let missing = EventBuilder::new(2).time_created(1).build_hashed();
        let mut forged = missing.descriptor();
        forged.creator = 3.into();
        let orphan = EventBuilder::new(1).other_parent(forged).build_hashed();
        assert!(buffer.submit(Arc::new(orphan.clone())).unwrap().is_empty());
        assert_eq!(hashes(&buffer.submit(Arc::new(missing.clone())).unwrap()), vec![missing.hash()]);
        assert!(!buffer.is_orphan(orphan.hash()));
    }

    #[test]
    fn test_event_available_releases_waiting() {
        let mut buffer = OrphanBuffer::new(EventWindow::genesis(AncientMode::GenerationThreshold));
        let events = DagGenerator::new(2, 5).sequential_chain(2);
        // Everything but the genesis event waits on it, directly or through its descendants
        for event in events[1..].iter() {
            assert!(buffer.submit(Arc::new(event.clone())).unwrap().is_empty());
        }
        assert_eq!(buffer.orphan_count(), 3);
        let released = buffer.event_available(events[0].descriptor());
        assert_eq!(hashes(&released), events[1..].iter().map(|e| e.hash()).collect_vec());
        assert_eq!(buffer.orphan_count(), 0);

        // The genesis event was recorded as observed
        assert_eq!(buffer.submit(Arc::new(events[0].clone())), Err(Rejection::Duplicate));
        assert!(buffer.event_available(events[1].descriptor()).is_empty());
    }

    #[test]
    fn test_clear_forgets_orphans() {
        let mut buffer = OrphanBuffer::new(EventWindow::genesis(AncientMode::GenerationThreshold));
        let parent = EventBuilder::new(0).build_hashed();
        let child = Arc::new(EventBuilder::new(1).other_parent(parent.descriptor()).build_hashed());
        assert!(buffer.submit(child.clone()).unwrap().is_empty());

        buffer.clear();
        assert_eq!(buffer.orphan_count(), 0);
        assert_eq!(hashes(&buffer.submit(Arc::new(parent.clone())).unwrap()), vec![parent.hash()]);
        assert_eq!(hashes(&buffer.submit(child.clone()).unwrap()), vec![child.hash()]);
    }
}
