#![allow(dead_code)]

use itertools::Itertools;
use std::{sync::Arc, thread::JoinHandle};
use weave_consensus::{pipeline::intake::EventIntake, test_helpers::gossip_events};
use weave_consensus_core::{
    config::{ConfigBuilder, constants::perf::SchedulerType, params::Params},
    event::HashedEvent,
    roster::Roster,
    round::ConsensusRound,
};

pub fn init_logger() {
    weave_core::log::try_init_logger("info,weave_consensus=debug");
}

/// A started intake which is shut down on drop
pub struct TestIntake {
    pub intake: EventIntake,
    handles: Vec<JoinHandle<()>>,
}

impl TestIntake {
    pub fn start(params: Params, scheduler: SchedulerType, roster: Roster) -> Self {
        init_logger();
        let config = ConfigBuilder::new(params).set_scheduler(scheduler).build();
        let intake = EventIntake::new(Arc::new(config), Arc::new(roster)).unwrap();
        let handles = intake.run_processors().unwrap();
        Self { intake, handles }
    }

    /// Submits `events` one by one and waits until the pipeline is idle
    pub fn submit(&self, events: &[HashedEvent]) {
        for event in gossip_events(events) {
            self.intake.add_event(event).unwrap();
        }
        self.intake.flush();
    }

    /// Decided rounds received since the last call
    pub fn rounds(&self) -> Vec<ConsensusRound> {
        self.intake.consensus_rounds().try_iter().collect_vec()
    }
}

impl Drop for TestIntake {
    fn drop(&mut self) {
        self.intake.shutdown(std::mem::take(&mut self.handles));
    }
}

/// Feeds `events` in the given order to a fresh intake and returns every decided round
pub fn run(params: Params, scheduler: SchedulerType, roster: Roster, events: &[HashedEvent]) -> Vec<ConsensusRound> {
    let test = TestIntake::start(params, scheduler, roster);
    test.submit(events);
    test.rounds()
}
