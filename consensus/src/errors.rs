use thiserror::Error;
use weave_consensus_core::event::EventDescriptor;
use weave_hashes::Hash;

/// Violations of the linker input contract. Any of these halts the pipeline.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LinkError {
    #[error("event {child} references non-ancient parent {parent} which was never linked")]
    MissingParent { child: Hash, parent: EventDescriptor },

    #[error("event {child} references parent {expected} while the linked parent is {found}")]
    ParentMismatch { child: Hash, expected: EventDescriptor, found: EventDescriptor },
}

pub type LinkResult<T> = std::result::Result<T, LinkError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IntakeError {
    #[error("event intake halted: {0}")]
    Link(#[from] LinkError),

    #[error("event intake is halted and accepts no events")]
    Halted,

    #[error("event intake is exiting")]
    Exiting,

    #[error("invalid intake configuration: {0}")]
    Config(String),

    #[error("failed building the hasher thread pool: {0}")]
    ThreadPool(String),

    #[error("failed spawning thread {0}: {1}")]
    Spawn(&'static str, String),
}

pub type IntakeResult<T> = std::result::Result<T, IntakeError>;
