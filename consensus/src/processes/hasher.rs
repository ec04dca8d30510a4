use rayon::{ThreadPool, prelude::*};
use std::sync::Arc;
use weave_consensus_core::{
    FIRST_GENERATION,
    errors::{EventError, EventResult},
    event::{GossipEvent, HashedEvent, SIGNATURE_LENGTH},
    hashing::event_hash,
    roster::Roster,
};

/// Validates raw events against the roster and hashes them
#[derive(Clone)]
pub struct EventHasher {
    roster: Arc<Roster>,
}

impl EventHasher {
    pub fn new(roster: Arc<Roster>) -> Self {
        Self { roster }
    }

    pub fn hash_event(&self, event: GossipEvent) -> EventResult<HashedEvent> {
        let creator = event.creator.ok_or(EventError::MissingCreator)?;
        if !self.roster.contains(creator) {
            return Err(EventError::UnknownCreator(creator));
        }
        if event.signature.len() != SIGNATURE_LENGTH {
            return Err(EventError::SignatureLength(event.signature.len(), SIGNATURE_LENGTH));
        }
        if let Some(self_parent) = event.self_parent.as_ref()
            && self_parent.creator != creator
        {
            let (parent, parent_creator) = (self_parent.hash, self_parent.creator);
            return Err(EventError::SelfParentCreatorMismatch { parent, parent_creator, creator });
        }
        if let (Some(self_parent), Some(other_parent)) = (event.self_parent.as_ref(), event.other_parent.as_ref())
            && self_parent.hash == other_parent.hash
        {
            return Err(EventError::IdenticalParents(self_parent.hash));
        }

        let mut generation = FIRST_GENERATION;
        for parent in event.parents() {
            let next = parent.generation.checked_add(1).ok_or(EventError::GenerationOverflow(parent.generation))?;
            generation = generation.max(next);
            if event.birth_round < parent.birth_round {
                return Err(EventError::BirthRoundBelowParent(event.birth_round, parent.birth_round));
            }
        }

        let hash = event_hash(&event);
        Ok(HashedEvent::new(event, creator, hash, generation))
    }

    /// Hashes a batch on `pool`. Results keep the order of `events`.
    pub fn hash_batch(&self, pool: &ThreadPool, events: Vec<GossipEvent>) -> Vec<EventResult<HashedEvent>> {
        pool.install(|| events.into_par_iter().map(|event| self.hash_event(event)).collect())
    }
}
