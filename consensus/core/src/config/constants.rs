pub mod consensus {
    /// Number of decided rounds, counting the latest one, whose events stay non-ancient
    pub const DEFAULT_ROUNDS_NON_ANCIENT: u64 = 26;

    /// Every `coin_freq`-th voting round is a coin round
    pub const DEFAULT_COIN_FREQ: u64 = 12;

    /// The smallest coin frequency for which a normal round always precedes a coin round
    pub const MIN_COIN_FREQ: u64 = 3;
}

pub mod state {
    /// Rounds a complete signed state is retained for while later rounds fail to collect signatures
    pub const DEFAULT_STATE_RETENTION_ROUNDS: u64 = 26;
}

pub mod perf {
    //!
    //! Performance related constants. None of these affect the consensus outcome.
    //!

    use serde::{Deserialize, Serialize};

    /// How pipeline stages are executed
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(rename_all = "snake_case")]
    pub enum SchedulerType {
        /// Each stage runs inline on the thread which hands it work
        Direct,
        /// Each stage owns a worker thread consuming a queue
        #[default]
        Sequential,
    }

    #[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(default)]
    pub struct PerfParams {
        pub scheduler: SchedulerType,

        /// Capacity of the hasher input queue, `None` for unbounded
        pub hasher_queue_capacity: Option<usize>,

        /// Capacity of each intake stage queue following the hasher, `None` for unbounded
        pub intake_queue_capacity: Option<usize>,

        /// Defaults to 0 which indicates using system default
        /// which is typically the number of logical CPU cores
        pub hasher_num_threads: usize,

        /// Interval between two processing monitor reports
        pub monitor_interval_millis: u64,
    }

    impl PerfParams {
        pub fn hasher_threads(&self) -> usize {
            if self.hasher_num_threads == 0 { num_cpus::get() } else { self.hasher_num_threads }
        }
    }

    impl Default for PerfParams {
        fn default() -> Self {
            PERF_PARAMS
        }
    }

    pub const PERF_PARAMS: PerfParams = PerfParams {
        scheduler: SchedulerType::Sequential,
        hasher_queue_capacity: Some(5000),
        intake_queue_capacity: Some(1000),
        hasher_num_threads: 0,
        monitor_interval_millis: 10_000,
    };
}
