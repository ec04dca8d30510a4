use super::ProcessingCounters;
use crossbeam_channel::{Receiver, Sender, select, tick};
use std::{
    io,
    sync::Arc,
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};
use weave_core::{info, trace};

const MONITOR: &str = "consensus-monitor";

pub struct ConsensusMonitor {
    interval: Duration,
    exit_sender: Sender<()>,
    exit_receiver: Receiver<()>,
    // Counters
    counters: Arc<ProcessingCounters>,
}

impl ConsensusMonitor {
    pub fn new(counters: Arc<ProcessingCounters>, interval: Duration) -> ConsensusMonitor {
        let (exit_sender, exit_receiver) = crossbeam_channel::bounded(1);
        ConsensusMonitor { interval, exit_sender, exit_receiver, counters }
    }

    pub fn start(self: &Arc<Self>) -> io::Result<JoinHandle<()>> {
        let monitor = self.clone();
        thread::Builder::new().name(MONITOR.to_string()).spawn(move || monitor.worker())
    }

    pub fn worker(self: &Arc<ConsensusMonitor>) {
        let ticker = tick(self.interval);
        let mut last_snapshot = self.counters.snapshot();
        let mut last_log_time = Instant::now();
        loop {
            select! {
                recv(self.exit_receiver) -> _ => break,
                recv(ticker) -> _ => {}
            }

            let snapshot = self.counters.snapshot();
            if snapshot == last_snapshot {
                // No update, avoid printing useless info
                last_log_time = Instant::now();
                continue;
            }

            // Subtract the snapshots
            let delta = &snapshot - &last_snapshot;
            let now = Instant::now();

            info!(
                "Processed {} events and ordered {} in {} rounds in the last {:.2}s \
                ({} submitted; {} invalid; {} duplicates; {} ancient; {} stale; {} evicted)",
                delta.events_linked,
                delta.events_ordered,
                delta.rounds_decided,
                (now - last_log_time).as_secs_f64(),
                delta.events_submitted,
                delta.invalid_events,
                delta.duplicate_events,
                delta.ancient_events,
                delta.stale_events,
                delta.evicted_events,
            );

            last_snapshot = snapshot;
            last_log_time = now;
        }

        trace!("monitor thread exiting");
    }

    pub fn signal_exit(&self) {
        trace!("sending an exit signal to {}", MONITOR);
        let _ = self.exit_sender.try_send(());
    }
}
