use crate::{NodeId, Round};
use thiserror::Error;
use weave_hashes::Hash;

/// Reasons for rejecting a raw event before it enters the pipeline
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EventError {
    #[error("event has no creator")]
    MissingCreator,

    #[error("event creator {0} is not a roster member")]
    UnknownCreator(NodeId),

    #[error("signature length is {0} while {1} is expected")]
    SignatureLength(usize, usize),

    #[error("self parent {parent} was created by {parent_creator} rather than by {creator}")]
    SelfParentCreatorMismatch { parent: Hash, parent_creator: NodeId, creator: NodeId },

    #[error("self parent and other parent are the same event {0}")]
    IdenticalParents(Hash),

    #[error("parent generation {0} overflows")]
    GenerationOverflow(u64),

    #[error("birth round {0} is lower than parent birth round {1}")]
    BirthRoundBelowParent(Round, Round),
}

pub type EventResult<T> = std::result::Result<T, EventError>;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;
