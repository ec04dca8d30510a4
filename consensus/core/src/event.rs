use crate::{NodeId, Round};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::fmt::{Display, Formatter};
use weave_hashes::{Hash, Hasher, TransactionHash};

/// Expected length of a detached event signature
pub const SIGNATURE_LENGTH: usize = 64;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub payload: Vec<u8>,
}

impl Transaction {
    pub fn new(payload: Vec<u8>) -> Self {
        Self { payload }
    }

    pub fn id(&self) -> Hash {
        TransactionHash::hash(&self.payload)
    }

    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

/// Identifies an event by hash along with the attributes needed to reason about it without having it locally
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventDescriptor {
    pub hash: Hash,
    pub creator: NodeId,
    pub generation: u64,
    pub birth_round: Round,
}

impl EventDescriptor {
    pub fn new(hash: Hash, creator: NodeId, generation: u64, birth_round: Round) -> Self {
        Self { hash, creator, generation, birth_round }
    }
}

impl Display for EventDescriptor {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}(gen {}, {})", self.hash, self.generation, self.creator)
    }
}

/// An event as received from a peer, before hashing and validation
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GossipEvent {
    /// The claimed creator, missing when the sender did not provide one
    pub creator: Option<NodeId>,
    /// Creation time in milliseconds since the unix epoch, as claimed by the creator
    pub time_created: u64,
    pub birth_round: Round,
    pub self_parent: Option<EventDescriptor>,
    pub other_parent: Option<EventDescriptor>,
    pub transactions: Vec<Transaction>,
    /// Detached signature over the event hash
    pub signature: Vec<u8>,
}

impl GossipEvent {
    pub fn parents(&self) -> impl Iterator<Item = &EventDescriptor> {
        self.self_parent.iter().chain(self.other_parent.iter())
    }

    pub fn has_parents(&self) -> bool {
        self.self_parent.is_some() || self.other_parent.is_some()
    }
}

/// A validated event with its hash and derived generation. Immutable and cheaply shared via `Arc`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HashedEvent {
    hash: Hash,
    creator: NodeId,
    generation: u64,
    event: GossipEvent,
}

impl HashedEvent {
    /// Builds a hashed event. Validation of `event` against `creator` and `generation` is the caller's responsibility.
    pub fn new(event: GossipEvent, creator: NodeId, hash: Hash, generation: u64) -> Self {
        Self { hash, creator, generation, event }
    }

    #[inline]
    pub fn hash(&self) -> Hash {
        self.hash
    }

    #[inline]
    pub fn creator(&self) -> NodeId {
        self.creator
    }

    #[inline]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    #[inline]
    pub fn birth_round(&self) -> Round {
        self.event.birth_round
    }

    #[inline]
    pub fn time_created(&self) -> u64 {
        self.event.time_created
    }

    pub fn self_parent(&self) -> Option<&EventDescriptor> {
        self.event.self_parent.as_ref()
    }

    pub fn other_parent(&self) -> Option<&EventDescriptor> {
        self.event.other_parent.as_ref()
    }

    pub fn parents(&self) -> SmallVec<[EventDescriptor; 2]> {
        self.event.parents().copied().collect()
    }

    pub fn transactions(&self) -> &[Transaction] {
        &self.event.transactions
    }

    pub fn signature(&self) -> &[u8] {
        &self.event.signature
    }

    pub fn gossip_event(&self) -> &GossipEvent {
        &self.event
    }

    pub fn descriptor(&self) -> EventDescriptor {
        EventDescriptor::new(self.hash, self.creator, self.generation, self.event.birth_round)
    }
}

impl Display for HashedEvent {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.descriptor(), f)
    }
}
