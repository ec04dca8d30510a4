use crate::{
    Round,
    window::{AncientMode, EventWindow},
};
use serde::{Deserialize, Serialize};
use weave_hashes::Hash;

/// The minimum generation among the judges of a decided round
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MinGenInfo {
    pub round: Round,
    pub min_generation: u64,
}

/// The consensus state needed to resume ordering after a restart without the pruned history
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsensusSnapshot {
    /// The latest decided round
    pub round: Round,
    /// Hashes of the famous witnesses of `round`, sorted
    pub judge_hashes: Vec<Hash>,
    /// Minimum judge generations of the retained decided rounds, ascending by round
    pub min_gen_infos: Vec<MinGenInfo>,
    /// The consensus order the next ordered event receives
    pub next_consensus_number: u64,
    /// The consensus timestamp of the last ordered event, if any
    pub consensus_timestamp: Option<u64>,
}

impl ConsensusSnapshot {
    /// The minimum judge generation of the oldest retained round at or above `round`
    pub fn min_generation_from(&self, round: Round) -> Option<u64> {
        self.min_gen_infos.iter().find(|info| info.round >= round).map(|info| info.min_generation)
    }

    /// The event window implied by this snapshot
    pub fn event_window(&self, rounds_non_ancient: u64, ancient_mode: AncientMode) -> EventWindow {
        let min_round_non_ancient = EventWindow::min_non_ancient_round_for(self.round, rounds_non_ancient);
        let min_gen_non_ancient = self.min_generation_from(min_round_non_ancient).unwrap_or_default();
        EventWindow::new(self.round, min_gen_non_ancient, min_round_non_ancient, ancient_mode)
    }
}
