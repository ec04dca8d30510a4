//!
//! The event intake: wires the intake stages into a pipeline and exposes it to the embedding node.
//!

use super::{
    ProcessingCounters,
    messages::{ConsensusMessage, HasherMessage, LinkerMessage, OrphanBufferMessage, ShadowgraphMessage},
    monitor::ConsensusMonitor,
    scheduler::{Stage, StageInput},
};
use crate::{
    errors::{IntakeError, IntakeResult},
    model::stores::events::{EventsStoreReader, MemoryEventsStore, SharedEventsStore},
    processes::{
        hasher::EventHasher,
        hashgraph::ConsensusEngine,
        linker::{InOrderLinker, LinkStatus},
        orphan_buffer::{OrphanBuffer, Rejection},
        shadowgraph::Shadowgraph,
        window_manager::EventWindowManager,
    },
};
use crossbeam_channel::{Receiver, Sender, unbounded};
use parking_lot::{Mutex, RwLock};
use rayon::ThreadPool;
use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread::JoinHandle,
    time::Duration,
};
use weave_consensus_core::{
    config::Config,
    event::{GossipEvent, HashedEvent},
    roster::Roster,
    round::ConsensusRound,
    snapshot::ConsensusSnapshot,
};
use weave_core::{error, info, time::Stopwatch, trace, warn};

const HASHER: &str = "intake-hasher";
const ORPHAN_BUFFER: &str = "intake-orphan-buffer";
const LINKER: &str = "intake-linker";
const SHADOWGRAPH: &str = "intake-shadowgraph";
const CONSENSUS: &str = "intake-consensus";

/// Whether the pipeline still accepts events
#[derive(Default)]
struct IntakeStatus {
    exiting: AtomicBool,
    halted: AtomicBool,
    fatal_error: Mutex<Option<IntakeError>>,
}

impl IntakeStatus {
    fn halt(&self, err: IntakeError) {
        self.fatal_error.lock().get_or_insert(err);
        self.halted.store(true, Ordering::SeqCst);
    }

    fn reset(&self) {
        self.fatal_error.lock().take();
        self.halted.store(false, Ordering::SeqCst);
    }

    fn is_halted(&self) -> bool {
        self.halted.load(Ordering::SeqCst)
    }
}

/// Stages which were wired but not started yet
struct Stages {
    hasher: Stage<HasherMessage>,
    orphan_buffer: Stage<OrphanBufferMessage>,
    linker: Stage<LinkerMessage>,
    shadowgraph: Stage<ShadowgraphMessage>,
    consensus: Stage<ConsensusMessage>,
}

pub struct EventIntake {
    config: Arc<Config>,
    roster: Arc<Roster>,

    // Stage inputs
    hasher: StageInput<HasherMessage>,
    orphan_buffer: StageInput<OrphanBufferMessage>,
    linker: StageInput<LinkerMessage>,
    shadowgraph_input: StageInput<ShadowgraphMessage>,
    consensus: StageInput<ConsensusMessage>,
    stages: Mutex<Option<Stages>>,

    // Shared state
    store: SharedEventsStore,
    shadowgraph: Arc<RwLock<Shadowgraph>>,
    status: Arc<IntakeStatus>,

    // Outputs
    rounds_receiver: Receiver<ConsensusRound>,
    stale_receiver: Receiver<Arc<HashedEvent>>,

    // Counters
    counters: Arc<ProcessingCounters>,
    monitor: Arc<ConsensusMonitor>,
}

impl EventIntake {
    pub fn new(config: Arc<Config>, roster: Arc<Roster>) -> IntakeResult<Self> {
        config.validate().map_err(|err| IntakeError::Config(err.to_string()))?;
        let perf = &config.perf;
        let thread_pool = Arc::new(
            rayon::ThreadPoolBuilder::new()
                .num_threads(perf.hasher_threads())
                .thread_name(|i| format!("hasher-pool-{i}"))
                .build()
                .map_err(|err| IntakeError::ThreadPool(err.to_string()))?,
        );

        let counters = Arc::new(ProcessingCounters::default());
        let status = Arc::new(IntakeStatus::default());
        let store = MemoryEventsStore::new_shared(config.ancient_mode);
        let shadowgraph = Arc::new(RwLock::new(Shadowgraph::new(config.genesis_window(), store.clone())));
        let (rounds_sender, rounds_receiver) = unbounded();
        let (stale_sender, stale_receiver) = unbounded();

        let scheduler = perf.scheduler;
        let hasher = Stage::new(HASHER, scheduler, perf.hasher_queue_capacity);
        let orphan_buffer = Stage::new(ORPHAN_BUFFER, scheduler, perf.intake_queue_capacity);
        let linker = Stage::new(LINKER, scheduler, perf.intake_queue_capacity);
        let shadowgraph_stage = Stage::new(SHADOWGRAPH, scheduler, perf.intake_queue_capacity);
        let consensus = Stage::new(CONSENSUS, scheduler, perf.intake_queue_capacity);
        let inputs = (hasher.input(), orphan_buffer.input(), linker.input(), shadowgraph_stage.input(), consensus.input());

        let stages = Stages {
            hasher: hasher.bind(hasher_handler(EventHasher::new(roster.clone()), thread_pool, inputs.1.clone(), counters.clone())),
            orphan_buffer: orphan_buffer.bind(orphan_buffer_handler(
                OrphanBuffer::new(config.genesis_window()),
                inputs.2.clone(),
                counters.clone(),
            )),
            linker: linker.bind(linker_handler(
                InOrderLinker::new(config.genesis_window(), store.clone()),
                inputs.3.clone(),
                inputs.4.clone(),
                status.clone(),
                counters.clone(),
            )),
            shadowgraph: shadowgraph_stage.bind(shadowgraph_handler(shadowgraph.clone())),
            consensus: consensus.bind(consensus_handler(
                ConsensusEngine::new(roster.clone(), config.params.clone(), store.clone()),
                EventWindowManager::new(config.ancient_mode, inputs.1.clone(), inputs.2.clone(), inputs.3.clone()),
                rounds_sender,
                stale_sender,
                counters.clone(),
            )),
        };

        let monitor = Arc::new(ConsensusMonitor::new(counters.clone(), Duration::from_millis(perf.monitor_interval_millis)));
        let (hasher, orphan_buffer, linker, shadowgraph_input, consensus) = inputs;
        Ok(Self {
            config,
            roster,
            hasher,
            orphan_buffer,
            linker,
            shadowgraph_input,
            consensus,
            stages: Mutex::new(Some(stages)),
            store,
            shadowgraph,
            status,
            rounds_receiver,
            stale_receiver,
            counters,
            monitor,
        })
    }

    /// Starts all stages and the monitor. With the direct scheduler stages have no threads, hence only the monitor
    /// handle is returned.
    pub fn run_processors(&self) -> IntakeResult<Vec<JoinHandle<()>>> {
        let stages =
            self.stages.lock().take().ok_or_else(|| IntakeError::Spawn("intake", "processors were already started".to_string()))?;
        let spawn_err = |name: &'static str| move |err: std::io::Error| IntakeError::Spawn(name, err.to_string());

        let mut handles = Vec::new();
        handles.extend(stages.hasher.start().map_err(spawn_err(HASHER))?);
        handles.extend(stages.orphan_buffer.start().map_err(spawn_err(ORPHAN_BUFFER))?);
        handles.extend(stages.linker.start().map_err(spawn_err(LINKER))?);
        handles.extend(stages.shadowgraph.start().map_err(spawn_err(SHADOWGRAPH))?);
        handles.extend(stages.consensus.start().map_err(spawn_err(CONSENSUS))?);
        handles.push(self.monitor.start().map_err(spawn_err("consensus-monitor"))?);
        info!("Event intake started with {} members and {:?} scheduling", self.roster.len(), self.config.perf.scheduler);
        Ok(handles)
    }

    fn accepting(&self) -> IntakeResult<()> {
        if self.status.exiting.load(Ordering::SeqCst) {
            Err(IntakeError::Exiting)
        } else if self.status.is_halted() {
            Err(IntakeError::Halted)
        } else {
            Ok(())
        }
    }

    /// Submits a raw event. Blocks while the hasher queue is full.
    pub fn add_event(&self, event: GossipEvent) -> IntakeResult<()> {
        self.accepting()?;
        self.counters.events_submitted.fetch_add(1, Ordering::Relaxed);
        if !self.hasher.put(HasherMessage::Event(event)) {
            return Err(IntakeError::Exiting);
        }
        Ok(())
    }

    /// Submits a batch of raw events, hashed in parallel. Their relative order is kept.
    pub fn add_events(&self, events: Vec<GossipEvent>) -> IntakeResult<()> {
        self.accepting()?;
        if events.is_empty() {
            return Ok(());
        }
        self.counters.events_submitted.fetch_add(events.len() as u64, Ordering::Relaxed);
        if !self.hasher.put(HasherMessage::Batch(events)) {
            return Err(IntakeError::Exiting);
        }
        Ok(())
    }

    /// Blocks until every event submitted so far went through the whole pipeline, including the effects of the
    /// windows it produced
    pub fn flush(&self) {
        self.hasher.flush();
        loop {
            let before = self.counters.snapshot();
            self.orphan_buffer.flush();
            self.linker.flush();
            self.shadowgraph_input.flush();
            self.consensus.flush();
            if self.counters.snapshot() == before {
                break;
            }
        }
    }

    /// Drops the consensus output until [`Self::stop_squelching`], including the windows decided rounds would
    /// produce. Events keep flowing through every stage and consensus keeps ordering them. Takes effect for events
    /// reaching the consensus stage after the call.
    pub fn start_squelching(&self) {
        self.consensus.inject(ConsensusMessage::Squelch(true));
    }

    pub fn stop_squelching(&self) {
        self.consensus.inject(ConsensusMessage::Squelch(false));
    }

    /// Resets every stage to the genesis state and lifts a halt. Must not race with event submission.
    pub fn clear(&self) {
        self.flush();
        self.orphan_buffer.inject(OrphanBufferMessage::Clear);
        self.linker.inject(LinkerMessage::Clear);
        self.shadowgraph_input.inject(ShadowgraphMessage::Clear);
        self.consensus.inject(ConsensusMessage::Clear);
        self.flush();
        self.status.reset();
        info!("Event intake cleared");
    }

    /// Clears the pipeline and resumes consensus from `snapshot`. Events have to be submitted again from the
    /// snapshot window on, including the judges of the snapshot round.
    pub fn load_snapshot(&self, snapshot: ConsensusSnapshot) {
        self.clear();
        self.consensus.inject(ConsensusMessage::LoadSnapshot(Box::new(snapshot)));
        self.flush();
    }

    pub fn shadowgraph(&self) -> Arc<RwLock<Shadowgraph>> {
        self.shadowgraph.clone()
    }

    /// Decided rounds, in increasing order
    pub fn consensus_rounds(&self) -> Receiver<ConsensusRound> {
        self.rounds_receiver.clone()
    }

    /// Events which became ancient before reaching consensus
    pub fn stale_events(&self) -> Receiver<Arc<HashedEvent>> {
        self.stale_receiver.clone()
    }

    pub fn counters(&self) -> &Arc<ProcessingCounters> {
        &self.counters
    }

    /// Number of linked events currently retained
    pub fn retained_events(&self) -> usize {
        self.store.read().len()
    }

    pub fn is_halted(&self) -> bool {
        self.status.is_halted()
    }

    /// The error which halted the pipeline, if any
    pub fn fatal_error(&self) -> Option<IntakeError> {
        self.status.fatal_error.lock().clone()
    }

    pub fn signal_exit(&self) {
        trace!("sending an exit signal to the event intake");
        self.status.exiting.store(true, Ordering::SeqCst);
        self.hasher.exit();
        self.orphan_buffer.exit();
        self.linker.exit();
        self.shadowgraph_input.exit();
        self.consensus.exit();
        self.monitor.signal_exit();
    }

    pub fn shutdown(&self, wait_handles: Vec<JoinHandle<()>>) {
        self.signal_exit();
        // Wait for the stage threads to exit
        for handle in wait_handles {
            if handle.join().is_err() {
                error!("an intake thread panicked");
            }
        }
    }
}

fn hasher_handler(
    hasher: EventHasher,
    thread_pool: Arc<ThreadPool>,
    orphan_buffer: StageInput<OrphanBufferMessage>,
    counters: Arc<ProcessingCounters>,
) -> impl FnMut(HasherMessage) + Send + 'static {
    move |message| {
        let results = match message {
            HasherMessage::Event(event) => vec![hasher.hash_event(event)],
            HasherMessage::Batch(events) => {
                let _sw = Stopwatch::<500>::with_threshold("hash_batch");
                hasher.hash_batch(&thread_pool, events)
            }
        };
        for result in results {
            match result {
                Ok(event) => {
                    counters.events_hashed.fetch_add(1, Ordering::Relaxed);
                    orphan_buffer.put(OrphanBufferMessage::Event(Arc::new(event)));
                }
                Err(err) => {
                    counters.invalid_events.fetch_add(1, Ordering::Relaxed);
                    warn!("Dropping invalid event: {}", err);
                }
            }
        }
    }
}

fn orphan_buffer_handler(
    mut buffer: OrphanBuffer,
    linker: StageInput<LinkerMessage>,
    counters: Arc<ProcessingCounters>,
) -> impl FnMut(OrphanBufferMessage) + Send + 'static {
    move |message| {
        let released = match message {
            OrphanBufferMessage::Event(event) => match buffer.submit(event) {
                Ok(released) => released,
                Err(rejection) => {
                    let counter = match rejection {
                        Rejection::Ancient => &counters.ancient_events,
                        Rejection::Duplicate => &counters.duplicate_events,
                        Rejection::ParentMismatch => &counters.parent_mismatches,
                    };
                    counter.fetch_add(1, Ordering::Relaxed);
                    return;
                }
            },
            OrphanBufferMessage::EventWindow(window) => buffer.set_event_window(window),
            OrphanBufferMessage::Clear => {
                buffer.clear();
                return;
            }
        };
        counters.events_released.fetch_add(released.len() as u64, Ordering::Relaxed);
        for event in released {
            linker.put(LinkerMessage::Event(event));
        }
    }
}

fn linker_handler(
    mut linker: InOrderLinker,
    shadowgraph: StageInput<ShadowgraphMessage>,
    consensus: StageInput<ConsensusMessage>,
    status: Arc<IntakeStatus>,
    counters: Arc<ProcessingCounters>,
) -> impl FnMut(LinkerMessage) + Send + 'static {
    move |message| match message {
        LinkerMessage::Event(event) => {
            if status.is_halted() {
                return;
            }
            match linker.link(event) {
                Ok(LinkStatus::Linked(handle)) => {
                    counters.events_linked.fetch_add(1, Ordering::Relaxed);
                    shadowgraph.put(ShadowgraphMessage::Event(handle));
                    consensus.put(ConsensusMessage::Event(handle));
                }
                Ok(LinkStatus::Ancient) => {
                    counters.ancient_events.fetch_add(1, Ordering::Relaxed);
                }
                Ok(LinkStatus::Duplicate) => {
                    counters.duplicate_events.fetch_add(1, Ordering::Relaxed);
                }
                Err(err) => {
                    error!("Event intake halted: {}", err);
                    status.halt(err.into());
                }
            }
        }
        LinkerMessage::EventWindow(window) => {
            let evicted = linker.set_event_window(window);
            counters.evicted_events.fetch_add(evicted as u64, Ordering::Relaxed);
        }
        LinkerMessage::Clear => linker.clear(),
    }
}

fn shadowgraph_handler(shadowgraph: Arc<RwLock<Shadowgraph>>) -> impl FnMut(ShadowgraphMessage) + Send + 'static {
    move |message| match message {
        ShadowgraphMessage::Event(handle) => {
            shadowgraph.write().add_event(handle);
        }
        ShadowgraphMessage::EventWindow(window) => {
            shadowgraph.write().set_event_window(window);
        }
        ShadowgraphMessage::StartWith(window) => shadowgraph.write().start_with_event_window(window),
        ShadowgraphMessage::Clear => shadowgraph.write().clear(),
    }
}

fn consensus_handler(
    mut engine: ConsensusEngine,
    mut window_manager: EventWindowManager,
    rounds_sender: Sender<ConsensusRound>,
    stale_sender: Sender<Arc<HashedEvent>>,
    counters: Arc<ProcessingCounters>,
) -> impl FnMut(ConsensusMessage) + Send + 'static {
    let mut squelching = false;
    move |message| match message {
        ConsensusMessage::Event(handle) => {
            let output = engine.add_event(handle);
            for round in output.rounds {
                counters.rounds_decided.fetch_add(1, Ordering::Relaxed);
                counters.events_ordered.fetch_add(round.len() as u64, Ordering::Relaxed);
                if squelching {
                    trace!("Dropping consensus round {} while squelching", round.round);
                    continue;
                }
                window_manager.set_event_window(round.event_window);
                let _ = rounds_sender.send(round);
            }
            for event in output.stale {
                counters.stale_events.fetch_add(1, Ordering::Relaxed);
                if !squelching {
                    let _ = stale_sender.send(event);
                }
            }
        }
        ConsensusMessage::Squelch(on) => {
            info!("Consensus output squelching {}", if on { "started" } else { "stopped" });
            squelching = on;
        }
        ConsensusMessage::LoadSnapshot(snapshot) => {
            let window = engine.load_snapshot(&snapshot);
            window_manager.start_with_event_window(window);
        }
        ConsensusMessage::Clear => {
            engine.clear();
            window_manager.reset();
        }
    }
}
