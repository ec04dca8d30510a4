use super::SignedStateNexus;
use parking_lot::Mutex;
use weave_consensus_core::{Round, state::ReservedSignedState};
use weave_core::debug;

/// Holds the latest state which collected enough signatures to be complete. The state is released once
/// `retention_rounds` consecutive rounds passed without a newer complete state.
pub struct LatestCompleteStateNexus<S> {
    retention_rounds: u64,
    current: Mutex<Option<ReservedSignedState<S>>>,
}

impl<S> LatestCompleteStateNexus<S> {
    pub fn new(retention_rounds: u64) -> Self {
        Self { retention_rounds, current: Mutex::new(None) }
    }

    /// Holds `state` if it is strictly newer than the held state. Otherwise the incoming reservation is released.
    /// Returns whether `state` is now held.
    pub fn set_if_newer(&self, state: ReservedSignedState<S>) -> bool {
        let mut current = self.current.lock();
        if current.as_ref().is_some_and(|current| current.round() >= state.round()) {
            drop(current);
            state.close();
            return false;
        }
        let previous = current.replace(state);
        drop(current);
        drop(previous);
        true
    }

    /// Notifies that `round` did not complete. Releases the held state if it is older than the retention range
    /// ending at `round`.
    pub fn on_incomplete_round(&self, round: Round) {
        let earliest_retained = (round + 1).saturating_sub(self.retention_rounds);
        let mut current = self.current.lock();
        if current.as_ref().is_some_and(|current| current.round() < earliest_retained) {
            let released = current.take();
            drop(current);
            if let Some(released) = released {
                debug!("Releasing complete state of round {} after incomplete round {}", released.round(), round);
            }
        }
    }
}

impl<S: Send + Sync> SignedStateNexus<S> for LatestCompleteStateNexus<S> {
    fn get_state(&self, reason: &str) -> Option<ReservedSignedState<S>> {
        self.current.lock().as_ref().and_then(|current| current.try_get_and_reserve(reason))
    }

    fn set_state(&self, state: Option<ReservedSignedState<S>>) {
        let previous = std::mem::replace(&mut *self.current.lock(), state);
        drop(previous);
    }

    fn round(&self) -> Option<Round> {
        self.current.lock().as_ref().map(|current| current.round())
    }
}
