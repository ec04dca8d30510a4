pub mod constants;
pub mod params;

use crate::errors::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use std::ops::Deref;
use {
    constants::{
        consensus::MIN_COIN_FREQ,
        perf::{PERF_PARAMS, PerfParams, SchedulerType},
        state::DEFAULT_STATE_RETENTION_ROUNDS,
    },
    params::{MAINNET_PARAMS, Params},
};

/// Various consensus configurations all bundled up under a single struct. Use `Config::new` for directly building from
/// a `Params` instance. For anything more complex it is recommended to use `ConfigBuilder`. NOTE: this struct can be
/// implicitly de-refed into `Params`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Consensus params
    pub params: Params,
    /// Performance params
    pub perf: PerfParams,

    /// Rounds a complete signed state is held for while later rounds stay incomplete
    pub state_retention_rounds: u64,
}

impl Config {
    pub fn new(params: Params) -> Self {
        Self { params, perf: PERF_PARAMS, state_retention_rounds: DEFAULT_STATE_RETENTION_ROUNDS }
    }

    /// Parses a toml document. Missing fields take their defaults.
    pub fn from_toml_str(s: &str) -> ConfigResult<Self> {
        let config: Config = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.params.rounds_non_ancient == 0 {
            return Err(ConfigError::Invalid("rounds_non_ancient must be positive".into()));
        }
        if self.params.coin_freq < MIN_COIN_FREQ {
            return Err(ConfigError::Invalid(format!("coin_freq must be at least {}", MIN_COIN_FREQ)));
        }
        if self.state_retention_rounds == 0 {
            return Err(ConfigError::Invalid("state_retention_rounds must be positive".into()));
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new(MAINNET_PARAMS)
    }
}

impl AsRef<Params> for Config {
    fn as_ref(&self) -> &Params {
        &self.params
    }
}

impl Deref for Config {
    type Target = Params;

    fn deref(&self) -> &Self::Target {
        &self.params
    }
}

pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new(params: Params) -> Self {
        Self { config: Config::new(params) }
    }

    pub fn set_perf_params(mut self, perf: PerfParams) -> Self {
        self.config.perf = perf;
        self
    }

    pub fn edit_consensus_params<F>(mut self, edit_func: F) -> Self
    where
        F: Fn(&mut Params),
    {
        edit_func(&mut self.config.params);
        self
    }

    pub fn set_scheduler(mut self, scheduler: SchedulerType) -> Self {
        self.config.perf.scheduler = scheduler;
        self
    }

    pub fn set_state_retention_rounds(mut self, rounds: u64) -> Self {
        self.config.state_retention_rounds = rounds;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::window::AncientMode;
    use weave_core::assert_match;

    #[test]
    fn test_builder() {
        let config = ConfigBuilder::new(MAINNET_PARAMS)
            .edit_consensus_params(|p| p.rounds_non_ancient = 5)
            .set_scheduler(SchedulerType::Direct)
            .set_state_retention_rounds(3)
            .build();
        assert_eq!(config.rounds_non_ancient, 5);
        assert_eq!(config.perf.scheduler, SchedulerType::Direct);
        assert_eq!(config.state_retention_rounds, 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_toml_partial_document() {
        let config = Config::from_toml_str(
            r#"
            state_retention_rounds = 10

            [params]
            rounds_non_ancient = 8
            ancient_mode = "birth_round_threshold"

            [perf]
            scheduler = "direct"
            intake_queue_capacity = 64
            "#,
        )
        .unwrap();
        assert_eq!(config.rounds_non_ancient, 8);
        assert_eq!(config.coin_freq, MAINNET_PARAMS.coin_freq);
        assert_eq!(config.ancient_mode, AncientMode::BirthRoundThreshold);
        assert_eq!(config.perf.scheduler, SchedulerType::Direct);
        assert_eq!(config.perf.intake_queue_capacity, Some(64));
        assert_eq!(config.perf.hasher_queue_capacity, PERF_PARAMS.hasher_queue_capacity);
        assert_eq!(config.state_retention_rounds, 10);

        assert_eq!(Config::from_toml_str("").unwrap(), Config::default());
    }

    #[test]
    fn test_toml_rejects_invalid() {
        assert_match!(Config::from_toml_str("[params]\ncoin_freq = 2"), Err(ConfigError::Invalid(_)));
        assert_match!(Config::from_toml_str("[params]\nrounds_non_ancient = -1"), Err(ConfigError::Parse(_)));
        assert_match!(Config::from_toml_str("state_retention_rounds = 0"), Err(ConfigError::Invalid(_)));
    }
}
