use super::constants::consensus::{DEFAULT_COIN_FREQ, DEFAULT_ROUNDS_NON_ANCIENT};
use crate::window::{AncientMode, EventWindow};
use serde::{Deserialize, Serialize};

/// Consensus parameters. Every node of a network must use identical values, since they affect the order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Params {
    /// Number of decided rounds, counting the latest one, whose events stay non-ancient
    pub rounds_non_ancient: u64,

    /// Every `coin_freq`-th voting round is a coin round
    pub coin_freq: u64,

    /// Whether ancientness is decided by generation or by birth round
    pub ancient_mode: AncientMode,
}

impl Params {
    pub fn genesis_window(&self) -> EventWindow {
        EventWindow::genesis(self.ancient_mode)
    }
}

impl Default for Params {
    fn default() -> Self {
        MAINNET_PARAMS
    }
}

pub const MAINNET_PARAMS: Params = Params {
    rounds_non_ancient: DEFAULT_ROUNDS_NON_ANCIENT,
    coin_freq: DEFAULT_COIN_FREQ,
    ancient_mode: AncientMode::GenerationThreshold,
};

/// Short retention so pruning is exercised quickly
pub const SIMNET_PARAMS: Params =
    Params { rounds_non_ancient: 4, coin_freq: DEFAULT_COIN_FREQ, ancient_mode: AncientMode::GenerationThreshold };
