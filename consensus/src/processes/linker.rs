use crate::{
    errors::{LinkError, LinkResult},
    model::{
        arena::EventHandle,
        event::LinkedEvent,
        stores::events::{EventsStore, EventsStoreReader, SharedEventsStore},
    },
};
use std::sync::Arc;
use weave_consensus_core::{
    event::{EventDescriptor, HashedEvent},
    window::EventWindow,
};
use weave_core::trace;

/// The outcome of linking a single event
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LinkStatus {
    Linked(EventHandle),
    Ancient,
    Duplicate,
}

/// Resolves parent descriptors of events arriving in topological order to handles of previously linked events
pub struct InOrderLinker {
    window: EventWindow,
    store: SharedEventsStore,
}

impl InOrderLinker {
    pub fn new(window: EventWindow, store: SharedEventsStore) -> Self {
        Self { window, store }
    }

    pub fn event_window(&self) -> &EventWindow {
        &self.window
    }

    pub fn link(&mut self, event: Arc<HashedEvent>) -> LinkResult<LinkStatus> {
        if self.window.is_ancient(event.as_ref()) {
            return Ok(LinkStatus::Ancient);
        }
        let mut store = self.store.write();
        if store.has(event.hash()) {
            return Ok(LinkStatus::Duplicate);
        }

        let self_parent = self.resolve(&*store, &event, event.self_parent())?;
        let other_parent = self.resolve(&*store, &event, event.other_parent())?;
        let handle = store.insert(LinkedEvent::new(event, self_parent, other_parent));
        Ok(LinkStatus::Linked(handle))
    }

    fn resolve(
        &self,
        store: &impl EventsStoreReader,
        child: &HashedEvent,
        parent: Option<&EventDescriptor>,
    ) -> LinkResult<Option<EventHandle>> {
        let Some(parent) = parent else {
            return Ok(None);
        };
        if self.window.is_ancient(parent) {
            return Ok(None);
        }
        match store.get_by_hash(parent.hash) {
            Some((handle, linked)) => {
                let found = linked.event.descriptor();
                if found.creator != parent.creator || found.generation != parent.generation {
                    return Err(LinkError::ParentMismatch { child: child.hash(), expected: *parent, found });
                }
                Ok(Some(handle))
            }
            None => Err(LinkError::MissingParent { child: child.hash(), parent: *parent }),
        }
    }

    /// Applies a new window and evicts the events it makes ancient. Returns the number of evicted events.
    pub fn set_event_window(&mut self, window: EventWindow) -> usize {
        if !window.is_at_least(&self.window) {
            return 0;
        }
        self.window = window;
        let evicted = self.store.write().evict_ancient(&window);
        if evicted > 0 {
            trace!("Evicted {} ancient events below {}", evicted, window);
        }
        evicted
    }

    pub fn clear(&mut self) {
        self.window = EventWindow::genesis(self.window.ancient_mode);
        self.store.write().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{model::stores::events::MemoryEventsStore, test_helpers::DagGenerator};
    use weave_consensus_core::window::AncientMode;
    use weave_core::assert_match;

    fn linker() -> InOrderLinker {
        let mode = AncientMode::GenerationThreshold;
        InOrderLinker::new(EventWindow::genesis(mode), MemoryEventsStore::new_shared(mode))
    }

    #[test]
    fn test_link_in_order() {
        let events = DagGenerator::new(4, 3).sequential_chain(2).into_iter().map(Arc::new).collect::<Vec<_>>();
        let mut linker = linker();
        let handles = events
            .iter()
            .map(|e| match linker.link(e.clone()).unwrap() {
                LinkStatus::Linked(handle) => handle,
                status => panic!("unexpected status {status:?}"),
            })
            .collect::<Vec<_>>();
        assert_eq!(linker.link(events[5].clone()), Ok(LinkStatus::Duplicate));

        let store = linker.store.read();
        let linked = store.get(handles[5]).unwrap();
        assert_eq!(linked.self_parent, Some(handles[1]));
        assert_eq!(linked.other_parent, Some(handles[4]));
        assert_eq!(store.get(handles[2]).unwrap().self_parent, None);
    }

    #[test]
    fn test_ancient_parents_link_to_none() {
        let events = DagGenerator::new(4, 3).sequential_chain(3).into_iter().map(Arc::new).collect::<Vec<_>>();
        let mut linker = linker();
        for event in events[..8].iter() {
            linker.link(event.clone()).unwrap();
        }

        // Generations 0..=4 are ancient: event 8 keeps its other parent only
        assert_eq!(linker.set_event_window(EventWindow::new(2, 5, 1, AncientMode::GenerationThreshold)), 5);
        assert_eq!(linker.set_event_window(EventWindow::new(2, 5, 1, AncientMode::GenerationThreshold)), 0);
        assert_eq!(linker.link(events[3].clone()), Ok(LinkStatus::Ancient));

        let LinkStatus::Linked(handle) = linker.link(events[8].clone()).unwrap() else { panic!("event 8 is not ancient") };
        let store = linker.store.read();
        let linked = store.get(handle).unwrap();
        assert_eq!(linked.self_parent, None);
        assert_eq!(linked.other_parent, store.handle_of(events[7].hash()));
    }

    #[test]
    fn test_link_errors() {
        let events = DagGenerator::new(4, 3).sequential_chain(2).into_iter().map(Arc::new).collect::<Vec<_>>();
        let mut linker = linker();
        linker.link(events[0].clone()).unwrap();
        assert_match!(linker.link(events[2].clone()), Err(LinkError::MissingParent { parent, .. }) if parent.hash == events[1].hash());

        let mut forged = events[1].gossip_event().clone();
        forged.other_parent.as_mut().unwrap().generation = 7;
        let forged = HashedEvent::new(forged, 1.into(), 99.into(), 8);
        assert_match!(linker.link(Arc::new(forged)), Err(LinkError::ParentMismatch { found, .. }) if found.hash == events[0].hash());

        linker.clear();
        assert!(linker.store.read().is_empty());
    }
}
