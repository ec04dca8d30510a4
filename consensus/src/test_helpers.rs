use rand::{RngCore, SeedableRng, rngs::StdRng, seq::SliceRandom};
use weave_consensus_core::{
    FIRST_GENERATION, ROUND_FIRST, Round,
    event::{EventDescriptor, GossipEvent, HashedEvent, SIGNATURE_LENGTH, Transaction},
    hashing::event_hash,
    roster::Roster,
};

/// Fluent builder of raw events. Builds valid events by default, hashing does not validate.
pub struct EventBuilder {
    event: GossipEvent,
}

impl EventBuilder {
    pub fn new(creator: u64) -> Self {
        Self {
            event: GossipEvent {
                creator: Some(creator.into()),
                time_created: 0,
                birth_round: ROUND_FIRST,
                self_parent: None,
                other_parent: None,
                transactions: vec![],
                signature: vec![0; SIGNATURE_LENGTH],
            },
        }
    }

    pub fn without_creator(mut self) -> Self {
        self.event.creator = None;
        self
    }

    pub fn time_created(mut self, time_created: u64) -> Self {
        self.event.time_created = time_created;
        self
    }

    pub fn birth_round(mut self, birth_round: Round) -> Self {
        self.event.birth_round = birth_round;
        self
    }

    pub fn self_parent(mut self, parent: EventDescriptor) -> Self {
        self.event.self_parent = Some(parent);
        self
    }

    pub fn other_parent(mut self, parent: EventDescriptor) -> Self {
        self.event.other_parent = Some(parent);
        self
    }

    pub fn transaction(mut self, payload: &[u8]) -> Self {
        self.event.transactions.push(Transaction::new(payload.to_vec()));
        self
    }

    pub fn signature(mut self, signature: Vec<u8>) -> Self {
        self.event.signature = signature;
        self
    }

    pub fn build(self) -> GossipEvent {
        self.event
    }

    /// Hashes the event without validating it
    pub fn build_hashed(self) -> HashedEvent {
        let generation = self.event.parents().map(|p| p.generation + 1).max().unwrap_or(FIRST_GENERATION);
        let creator = self.event.creator.unwrap_or_default();
        let hash = event_hash(&self.event);
        HashedEvent::new(self.event, creator, hash, generation)
    }
}

/// Deterministic DAG generator driven by a seeded rng
pub struct DagGenerator {
    creators: u64,
    rng: StdRng,
    latest: Vec<Option<EventDescriptor>>,
    last: Option<EventDescriptor>,
    layer: u64,
    time: u64,
}

impl DagGenerator {
    pub fn new(creators: u64, seed: u64) -> Self {
        Self {
            creators,
            rng: StdRng::seed_from_u64(seed),
            latest: vec![None; creators as usize],
            last: None,
            layer: 0,
            time: 1_000_000,
        }
    }

    pub fn roster(&self) -> Roster {
        Roster::uniform(self.creators)
    }

    /// Creators take turns and every event uses the previous one as other parent. Each layer of `creators` events
    /// is exactly one round, and every round is decided two rounds later.
    pub fn sequential_chain(&mut self, layers: u64) -> Vec<HashedEvent> {
        let mut events = Vec::with_capacity((layers * self.creators) as usize);
        for _ in 0..layers {
            self.layer += 1;
            for creator in 0..self.creators {
                let event = self.next_event(creator, self.last);
                events.push(event);
            }
        }
        events
    }

    /// Every layer, each creator creates one event in random order, choosing the other parent among the latest
    /// events of all other creators
    pub fn random_gossip(&mut self, layers: u64) -> Vec<HashedEvent> {
        let mut events = Vec::with_capacity((layers * self.creators) as usize);
        for _ in 0..layers {
            self.layer += 1;
            let mut order = (0..self.creators).collect::<Vec<_>>();
            order.shuffle(&mut self.rng);
            for creator in order {
                let candidates = self
                    .latest
                    .iter()
                    .enumerate()
                    .filter(|&(c, latest)| c as u64 != creator && latest.is_some())
                    .filter_map(|(_, latest)| *latest)
                    .collect::<Vec<_>>();
                let other_parent = candidates.choose(&mut self.rng).copied();
                events.push(self.next_event(creator, other_parent));
            }
        }
        events
    }

    /// Returns a seeded permutation of `items`
    pub fn shuffled<T: Clone>(&mut self, items: &[T]) -> Vec<T> {
        let mut items = items.to_vec();
        items.shuffle(&mut self.rng);
        items
    }

    fn next_event(&mut self, creator: u64, other_parent: Option<EventDescriptor>) -> HashedEvent {
        self.time += 10;
        let mut signature = vec![0; SIGNATURE_LENGTH];
        self.rng.fill_bytes(&mut signature);

        let mut builder = EventBuilder::new(creator).time_created(self.time).birth_round(self.layer).signature(signature);
        if let Some(parent) = self.latest[creator as usize] {
            builder = builder.self_parent(parent);
        }
        if let Some(parent) = other_parent {
            builder = builder.other_parent(parent);
        }
        let event = builder.transaction(&self.time.to_le_bytes()).build_hashed();
        self.latest[creator as usize] = Some(event.descriptor());
        self.last = Some(event.descriptor());
        event
    }
}

pub fn gossip_events(events: &[HashedEvent]) -> Vec<GossipEvent> {
    events.iter().map(|e| e.gossip_event().clone()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequential_chain_shape() {
        let events = DagGenerator::new(4, 7).sequential_chain(3);
        assert_eq!(events.len(), 12);
        for (k, event) in events.iter().enumerate() {
            assert_eq!(event.generation(), k as u64);
            assert_eq!(event.creator().id(), k as u64 % 4);
            assert_eq!(event.birth_round(), k as u64 / 4 + 1);
            assert_eq!(event.other_parent().map(|p| p.hash), k.checked_sub(1).map(|p| events[p].hash()));
            assert_eq!(event.self_parent().map(|p| p.hash), k.checked_sub(4).map(|p| events[p].hash()));
        }
    }

    #[test]
    fn test_generators_are_deterministic() {
        let a = DagGenerator::new(5, 42).random_gossip(6);
        let b = DagGenerator::new(5, 42).random_gossip(6);
        assert_eq!(a, b);
        assert_ne!(a, DagGenerator::new(5, 43).random_gossip(6));

        // Other parents always come from another creator
        assert!(a.iter().all(|e| e.other_parent().is_none_or(|p| p.creator != e.creator())));
    }
}
