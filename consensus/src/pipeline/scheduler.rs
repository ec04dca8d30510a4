//!
//! Stage scheduling.
//!
//! A [`Stage`] wraps the handler of one pipeline component. Producers hand it work through cloneable
//! [`StageInput`]s. Depending on the [`SchedulerType`] the handler either runs inline on the producing thread or on a
//! dedicated worker thread consuming a queue. In both modes a stage processes its messages one at a time and in the
//! order they were accepted.
//!

use crossbeam_channel::{Receiver, Sender, unbounded};
use parking_lot::Mutex;
use std::{
    collections::VecDeque,
    io,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread::{self, JoinHandle},
    time::Duration,
};
use weave_consensus_core::config::constants::perf::SchedulerType;
use weave_core::trace;
use weave_utils::sync::backpressure::BackpressureCounter;

/// Interval at which a producer blocked on a full stage rechecks whether the stage exited
const PUT_RETRY_INTERVAL: Duration = Duration::from_millis(50);

pub type StageHandler<T> = Box<dyn FnMut(T) + Send>;

/// Messages accepted by a stage. Control messages are ordered with data.
pub enum StageCommand<T> {
    Data(T),
    /// Acknowledged once every message accepted before it was processed
    Flush(Sender<()>),
    Exit,
}

struct StageCore<T> {
    handler: Option<StageHandler<T>>,
}

impl<T> StageCore<T> {
    /// Handles one message. Returns false once the stage should stop.
    fn handle(&mut self, command: StageCommand<T>) -> bool {
        match command {
            StageCommand::Data(data) => {
                if let Some(handler) = self.handler.as_mut() {
                    handler(data);
                }
            }
            StageCommand::Flush(ack) => {
                let _ = ack.send(());
            }
            StageCommand::Exit => return false,
        }
        true
    }
}

enum Dispatch<T> {
    Direct { queue: Mutex<VecDeque<StageCommand<T>>>, core: Mutex<StageCore<T>> },
    Sequential { sender: Sender<StageCommand<T>>, counter: Arc<BackpressureCounter> },
}

struct StageShared<T> {
    name: &'static str,
    dispatch: Dispatch<T>,
    exited: AtomicBool,
}

impl<T> StageShared<T> {
    fn submit(&self, command: StageCommand<T>, force: bool) -> bool {
        if self.exited.load(Ordering::Acquire) {
            return false;
        }
        match &self.dispatch {
            Dispatch::Direct { queue, core } => {
                queue.lock().push_back(command);
                self.drain(queue, core);
                true
            }
            Dispatch::Sequential { sender, counter } => {
                if force {
                    counter.force_acquire();
                } else {
                    while !counter.acquire_timeout(PUT_RETRY_INTERVAL) {
                        if self.exited.load(Ordering::Acquire) {
                            return false;
                        }
                    }
                }
                if sender.send(command).is_err() {
                    counter.release();
                    return false;
                }
                true
            }
        }
    }

    /// Processes queued messages inline. A caller which finds the stage busy leaves its message to the active
    /// caller, which keeps draining until the queue is observed empty after releasing the stage.
    fn drain(&self, queue: &Mutex<VecDeque<StageCommand<T>>>, core: &Mutex<StageCore<T>>) {
        loop {
            let Some(mut guard) = core.try_lock() else {
                return;
            };
            loop {
                let next = queue.lock().pop_front();
                let Some(command) = next else { break };
                if !guard.handle(command) {
                    self.exited.store(true, Ordering::Release);
                    queue.lock().clear();
                    return;
                }
            }
            drop(guard);
            if queue.lock().is_empty() {
                return;
            }
        }
    }
}

/// A cloneable handle for feeding a stage
pub struct StageInput<T> {
    shared: Arc<StageShared<T>>,
}

impl<T> Clone for StageInput<T> {
    fn clone(&self) -> Self {
        Self { shared: self.shared.clone() }
    }
}

impl<T: Send + 'static> StageInput<T> {
    /// Hands `data` to the stage, blocking while a sequential stage is at capacity. Returns false if the stage
    /// exited.
    pub fn put(&self, data: T) -> bool {
        self.shared.submit(StageCommand::Data(data), false)
    }

    /// Like [`Self::put`] but never blocks on capacity
    pub fn inject(&self, data: T) -> bool {
        self.shared.submit(StageCommand::Data(data), true)
    }

    /// Waits until all messages accepted so far were processed
    pub fn flush(&self) {
        let (ack_sender, ack_receiver) = crossbeam_channel::bounded(1);
        if self.shared.submit(StageCommand::Flush(ack_sender), true) {
            let _ = ack_receiver.recv();
        }
    }

    pub fn exit(&self) {
        self.shared.submit(StageCommand::Exit, true);
        if let Dispatch::Direct { .. } = self.shared.dispatch {
            self.shared.exited.store(true, Ordering::Release);
        }
    }
}

/// A pipeline stage under construction. Inputs can be handed out before the handler is bound, which allows wiring
/// stages that feed each other.
pub struct Stage<T> {
    shared: Arc<StageShared<T>>,
    receiver: Option<Receiver<StageCommand<T>>>,
    handler: Option<StageHandler<T>>,
}

impl<T: Send + 'static> Stage<T> {
    pub fn new(name: &'static str, scheduler: SchedulerType, capacity: Option<usize>) -> Self {
        let (dispatch, receiver) = match scheduler {
            SchedulerType::Direct => {
                let core = StageCore { handler: None };
                (Dispatch::Direct { queue: Mutex::new(VecDeque::new()), core: Mutex::new(core) }, None)
            }
            SchedulerType::Sequential => {
                let (sender, receiver) = unbounded();
                (Dispatch::Sequential { sender, counter: Arc::new(BackpressureCounter::new(capacity)) }, Some(receiver))
            }
        };
        Self { shared: Arc::new(StageShared { name, dispatch, exited: AtomicBool::new(false) }), receiver, handler: None }
    }

    pub fn input(&self) -> StageInput<T> {
        StageInput { shared: self.shared.clone() }
    }

    pub fn bind(mut self, handler: impl FnMut(T) + Send + 'static) -> Self {
        self.handler = Some(Box::new(handler));
        self
    }

    /// Starts the stage. A sequential stage spawns its named worker thread, whose handle is returned.
    pub fn start(self) -> io::Result<Option<JoinHandle<()>>> {
        let Self { shared, receiver, handler } = self;
        let counter = match &shared.dispatch {
            Dispatch::Direct { core, .. } => {
                core.lock().handler = handler;
                return Ok(None);
            }
            Dispatch::Sequential { counter, .. } => counter.clone(),
        };
        let Some(receiver) = receiver else {
            return Err(io::Error::other(format!("stage {} has no queue", shared.name)));
        };

        let name = shared.name;
        let mut core = StageCore { handler };
        let handle = thread::Builder::new().name(name.to_string()).spawn(move || {
            while let Ok(command) = receiver.recv() {
                let running = core.handle(command);
                counter.release();
                if !running {
                    break;
                }
            }
            shared.exited.store(true, Ordering::Release);
            trace!("[{}] stage exiting", name);
        })?;
        Ok(Some(handle))
    }
}
