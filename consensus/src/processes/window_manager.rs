use crate::pipeline::{
    messages::{LinkerMessage, OrphanBufferMessage, ShadowgraphMessage},
    scheduler::StageInput,
};
use weave_consensus_core::window::{AncientMode, EventWindow};
use weave_core::trace;

/// Fans the windows produced by the consensus engine out to every stage which retains events. Windows are
/// injected, so a stage blocked on feeding the engine can never hold the broadcast back.
///
/// The linker always receives a window before the orphan buffer: events released because of a window must meet a
/// linker which already applied it, or their ancient parents would count as missing.
pub struct EventWindowManager {
    window: EventWindow,
    orphan_buffer: StageInput<OrphanBufferMessage>,
    linker: StageInput<LinkerMessage>,
    shadowgraph: StageInput<ShadowgraphMessage>,
}

impl EventWindowManager {
    pub fn new(
        ancient_mode: AncientMode,
        orphan_buffer: StageInput<OrphanBufferMessage>,
        linker: StageInput<LinkerMessage>,
        shadowgraph: StageInput<ShadowgraphMessage>,
    ) -> Self {
        Self { window: EventWindow::genesis(ancient_mode), orphan_buffer, linker, shadowgraph }
    }

    pub fn event_window(&self) -> EventWindow {
        self.window
    }

    /// Broadcasts `window` unless it is behind the last broadcast one or equal to it. Returns whether it was sent.
    pub fn set_event_window(&mut self, window: EventWindow) -> bool {
        if window == self.window || !window.is_at_least(&self.window) {
            return false;
        }
        trace!("Broadcasting {}", window);
        self.window = window;
        self.linker.inject(LinkerMessage::EventWindow(window));
        self.shadowgraph.inject(ShadowgraphMessage::EventWindow(window));
        self.orphan_buffer.inject(OrphanBufferMessage::EventWindow(window));
        true
    }

    /// Restarts the broadcast from `window`, which may be behind the current one
    pub fn start_with_event_window(&mut self, window: EventWindow) {
        trace!("Restarting from {}", window);
        self.window = window;
        self.linker.inject(LinkerMessage::EventWindow(window));
        self.shadowgraph.inject(ShadowgraphMessage::StartWith(window));
        self.orphan_buffer.inject(OrphanBufferMessage::EventWindow(window));
    }

    pub fn reset(&mut self) {
        self.window = EventWindow::genesis(self.window.ancient_mode);
    }
}
