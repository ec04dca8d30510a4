use crate::{
    FIRST_GENERATION, ROUND_FIRST, ROUND_NEGATIVE_INFINITY, Round,
    event::{EventDescriptor, HashedEvent},
};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Selects which event attribute is compared against the window to decide ancientness
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AncientMode {
    #[default]
    GenerationThreshold,
    BirthRoundThreshold,
}

/// Anything that can be tested against an [`EventWindow`]
pub trait AncientIndicator {
    fn generation(&self) -> u64;
    fn birth_round(&self) -> Round;

    fn ancient_indicator(&self, mode: AncientMode) -> u64 {
        match mode {
            AncientMode::GenerationThreshold => self.generation(),
            AncientMode::BirthRoundThreshold => self.birth_round(),
        }
    }
}

impl AncientIndicator for EventDescriptor {
    fn generation(&self) -> u64 {
        self.generation
    }

    fn birth_round(&self) -> Round {
        self.birth_round
    }
}

impl AncientIndicator for HashedEvent {
    fn generation(&self) -> u64 {
        HashedEvent::generation(self)
    }

    fn birth_round(&self) -> Round {
        HashedEvent::birth_round(self)
    }
}

/// The non-ancient event window.
///
/// Produced by the consensus engine after each decided round and broadcast to every component that prunes.
/// Events below the window are ancient: they are no longer needed for ordering and can be dropped.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventWindow {
    /// The latest round which reached consensus, [`ROUND_NEGATIVE_INFINITY`] if none did yet
    pub latest_consensus_round: Round,
    /// Events with a lower generation are ancient (generation mode)
    pub min_gen_non_ancient: u64,
    /// Events with a lower birth round are ancient (birth round mode)
    pub min_round_non_ancient: Round,
    pub ancient_mode: AncientMode,
}

impl EventWindow {
    pub fn new(
        latest_consensus_round: Round,
        min_gen_non_ancient: u64,
        min_round_non_ancient: Round,
        ancient_mode: AncientMode,
    ) -> Self {
        Self { latest_consensus_round, min_gen_non_ancient, min_round_non_ancient, ancient_mode }
    }

    /// The window before any round has reached consensus. Nothing is ancient.
    pub fn genesis(ancient_mode: AncientMode) -> Self {
        Self::new(ROUND_NEGATIVE_INFINITY, FIRST_GENERATION, ROUND_FIRST, ancient_mode)
    }

    /// The threshold in the units of the current ancient mode
    pub fn ancient_threshold(&self) -> u64 {
        match self.ancient_mode {
            AncientMode::GenerationThreshold => self.min_gen_non_ancient,
            AncientMode::BirthRoundThreshold => self.min_round_non_ancient,
        }
    }

    #[inline]
    pub fn is_ancient<T: AncientIndicator + ?Sized>(&self, item: &T) -> bool {
        item.ancient_indicator(self.ancient_mode) < self.ancient_threshold()
    }

    /// The first round considered non-ancient after `latest_consensus_round` reached consensus
    pub fn min_non_ancient_round_for(latest_consensus_round: Round, rounds_non_ancient: u64) -> Round {
        (latest_consensus_round + 1).saturating_sub(rounds_non_ancient).max(ROUND_FIRST)
    }

    /// Returns a window which is at least as advanced as both `self` and `other` in every bound
    pub fn max(&self, other: &Self) -> Self {
        Self {
            latest_consensus_round: self.latest_consensus_round.max(other.latest_consensus_round),
            min_gen_non_ancient: self.min_gen_non_ancient.max(other.min_gen_non_ancient),
            min_round_non_ancient: self.min_round_non_ancient.max(other.min_round_non_ancient),
            ancient_mode: self.ancient_mode,
        }
    }

    /// True if no bound of `self` is behind the corresponding bound of `other`
    pub fn is_at_least(&self, other: &Self) -> bool {
        self.latest_consensus_round >= other.latest_consensus_round
            && self.min_gen_non_ancient >= other.min_gen_non_ancient
            && self.min_round_non_ancient >= other.min_round_non_ancient
    }
}

impl Display for EventWindow {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "window(round {}, min gen {}, min round {}, {:?})",
            self.latest_consensus_round, self.min_gen_non_ancient, self.min_round_non_ancient, self.ancient_mode
        )
    }
}
