use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

pub mod config;
pub mod errors;
pub mod event;
pub mod hashing;
pub mod roster;
pub mod round;
pub mod snapshot;
pub mod state;
pub mod window;

/// Consensus round number
pub type Round = u64;

/// The round of events whose parents are all unknown or ancient. Such events can never be witnesses.
pub const ROUND_NEGATIVE_INFINITY: Round = 0;

/// The round of genesis events
pub const ROUND_FIRST: Round = 1;

/// The generation of an event without parents
pub const FIRST_GENERATION: u64 = 0;

/// Identity of an event creator (a roster member)
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub u64);

impl NodeId {
    pub fn id(self) -> u64 {
        self.0
    }
}

impl From<u64> for NodeId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl Display for NodeId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "node{}", self.0)
    }
}
